//! The persistent job catalog.
//!
//! Single source of truth for job descriptions, lifecycle state and runtime
//! statistics. Every mutation flushes the whole catalog to disk with a
//! write-to-temporary-then-rename, so a crash leaves either the previous or
//! the next state on disk, never a torn file.

pub mod job;

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::Utc;
use tokio::sync::Mutex;

pub use job::{Job, JobDescriptor, JobPatch, JobStatus};

use crate::cron::CronSpec;
use crate::error::{KiwibesError, Result};

pub struct Catalog {
    path: PathBuf,
    jobs: Mutex<BTreeMap<String, Job>>,
}

impl Catalog {
    /// Create an empty catalog persisted at `path`. Call [`Catalog::load`]
    /// to populate it from disk.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            jobs: Mutex::new(BTreeMap::new()),
        }
    }

    /// Load the catalog from disk, replacing the in-memory state.
    ///
    /// Every job comes back `stopped` with no start instant and no queued
    /// start requests; the runtime statistics are preserved as stored.
    pub async fn load(&self) -> Result<()> {
        let mut jobs = self.jobs.lock().await;

        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %self.path.display(), "jobs catalog file not found");
                return Err(KiwibesError::NoDatabaseFile);
            }
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "failed to read the jobs catalog");
                return Err(KiwibesError::NoDatabaseFile);
            }
        };

        let parsed: BTreeMap<String, serde_json::Value> =
            serde_json::from_str(&raw).map_err(|e| {
                tracing::error!(path = %self.path.display(), error = %e, "jobs catalog is not valid JSON");
                KiwibesError::JsonParseFail
            })?;

        let mut loaded = BTreeMap::new();
        for (name, value) in parsed {
            let mut job: Job = serde_json::from_value(value).map_err(|e| {
                tracing::error!(job = %name, error = %e, "job description is incomplete");
                KiwibesError::JobDescriptionInvalid
            })?;
            validate_description(&job.program, &job.schedule).map_err(|e| {
                tracing::error!(job = %name, "job description is invalid");
                e
            })?;
            job.reset_runtime_state();
            loaded.insert(name, job);
        }

        *jobs = loaded;
        tracing::info!(jobs = jobs.len(), path = %self.path.display(), "loaded the jobs catalog");
        Ok(())
    }

    /// Persist the current in-memory state.
    pub async fn save(&self) -> std::io::Result<()> {
        let jobs = self.jobs.lock().await;
        self.persist(&jobs).await
    }

    /// Insert a new job with zeroed statistics and persist.
    pub async fn create(&self, name: &str, descriptor: JobDescriptor) -> Result<()> {
        validate_description(&descriptor.program, &descriptor.schedule)?;

        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(name) {
            return Err(KiwibesError::JobNameTaken);
        }
        jobs.insert(name.to_string(), Job::new(descriptor));
        tracing::info!(job = %name, "created job");
        self.persist_logged(&jobs).await;
        Ok(())
    }

    /// Apply a partial description to a stopped job and persist.
    pub async fn edit(&self, name: &str, patch: JobPatch) -> Result<()> {
        if let Some(program) = &patch.program {
            if program.is_empty() {
                return Err(KiwibesError::JobDescriptionInvalid);
            }
        }
        if let Some(schedule) = &patch.schedule {
            if !schedule.is_empty() && !CronSpec::is_valid(schedule) {
                return Err(KiwibesError::JobDescriptionInvalid);
            }
        }

        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(name).ok_or(KiwibesError::JobNameUnknown)?;
        if job.status == JobStatus::Running {
            return Err(KiwibesError::JobIsRunning);
        }

        if let Some(program) = patch.program {
            job.program = program;
        }
        if let Some(schedule) = patch.schedule {
            job.schedule = schedule;
        }
        if let Some(max_runtime) = patch.max_runtime {
            job.max_runtime = max_runtime;
        }
        tracing::info!(job = %name, "edited job");
        self.persist_logged(&jobs).await;
        Ok(())
    }

    /// Remove a stopped job and persist.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get(name).ok_or(KiwibesError::JobNameUnknown)?;
        if job.status == JobStatus::Running {
            return Err(KiwibesError::JobIsRunning);
        }
        jobs.remove(name);
        tracing::info!(job = %name, "deleted job");
        self.persist_logged(&jobs).await;
        Ok(())
    }

    /// Snapshot of a job description.
    pub async fn get(&self, name: &str) -> Result<Job> {
        let jobs = self.jobs.lock().await;
        jobs.get(name).cloned().ok_or(KiwibesError::JobNameUnknown)
    }

    /// Names of every job in the catalog.
    pub async fn list_names(&self) -> Vec<String> {
        let jobs = self.jobs.lock().await;
        jobs.keys().cloned().collect()
    }

    /// Names of the jobs whose schedule parses as a cron expression.
    pub async fn list_schedulable(&self) -> Vec<String> {
        let jobs = self.jobs.lock().await;
        jobs.iter()
            .filter(|(_, job)| CronSpec::is_valid(&job.schedule))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Mark a job as running, stamping the start instant.
    pub async fn job_started(&self, name: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(name).ok_or(KiwibesError::JobNameUnknown)?;
        if job.status == JobStatus::Running {
            return Err(KiwibesError::JobIsRunning);
        }
        job.status = JobStatus::Running;
        job.start_time = Utc::now().timestamp();
        tracing::info!(job = %name, "job started");
        self.persist_logged(&jobs).await;
        Ok(())
    }

    /// Mark a job as stopped, folding the elapsed runtime into its statistics.
    pub async fn job_stopped(&self, name: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(name).ok_or(KiwibesError::JobNameUnknown)?;
        if job.status == JobStatus::Stopped {
            return Err(KiwibesError::JobIsNotRunning);
        }
        let elapsed = (Utc::now().timestamp() - job.start_time).max(0) as f64;
        job.record_run(elapsed);
        job.status = JobStatus::Stopped;
        job.start_time = 0;
        tracing::info!(job = %name, elapsed, runs = job.nbr_runs, "job stopped");
        self.persist_logged(&jobs).await;
        Ok(())
    }

    /// Queue one more start request behind the running instance.
    pub async fn incr_pending(&self, name: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(name).ok_or(KiwibesError::JobNameUnknown)?;
        job.pending_start += 1;
        tracing::info!(job = %name, pending = job.pending_start, "queued start request");
        self.persist_logged(&jobs).await;
        Ok(())
    }

    /// Consume one queued start request.
    ///
    /// Returns the count remaining after the decrement, or `-1` when there
    /// was nothing to consume.
    pub async fn decr_pending(&self, name: &str) -> Result<i64> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(name).ok_or(KiwibesError::JobNameUnknown)?;
        if job.pending_start == 0 {
            return Ok(-1);
        }
        job.pending_start -= 1;
        let remaining = job.pending_start as i64;
        self.persist_logged(&jobs).await;
        Ok(remaining)
    }

    /// Drop every queued start request for a job.
    pub async fn clear_pending(&self, name: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(name).ok_or(KiwibesError::JobNameUnknown)?;
        job.pending_start = 0;
        tracing::info!(job = %name, "cleared pending start requests");
        self.persist_logged(&jobs).await;
        Ok(())
    }

    async fn persist(&self, jobs: &BTreeMap<String, Job>) -> std::io::Result<()> {
        let body = serde_json::to_string_pretty(jobs)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await
    }

    async fn persist_logged(&self, jobs: &BTreeMap<String, Job>) {
        if let Err(e) = self.persist(jobs).await {
            tracing::error!(path = %self.path.display(), error = %e, "failed to persist the jobs catalog");
        }
    }
}

fn validate_description(program: &[String], schedule: &str) -> Result<()> {
    if program.is_empty() {
        return Err(KiwibesError::JobDescriptionInvalid);
    }
    if !schedule.is_empty() && !CronSpec::is_valid(schedule) {
        return Err(KiwibesError::JobDescriptionInvalid);
    }
    Ok(())
}
