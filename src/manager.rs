//! Job execution manager.
//!
//! Owns the table of live child processes, one per running job. A job has at
//! most one concurrent execution; further start requests are queued as a
//! counter in the catalog and consumed one by one as executions finish. A
//! background reaper task polls the children every 250 ms, records their
//! completion in the catalog and respawns queued starts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::catalog::{Catalog, Job};
use crate::error::{KiwibesError, Result};

const REAP_INTERVAL: Duration = Duration::from_millis(250);

pub struct Manager {
    catalog: Arc<Catalog>,
    active: Arc<Mutex<HashMap<String, Child>>>,
    reaper: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl Manager {
    /// Create the manager and start its reaper task.
    pub fn new(catalog: Arc<Catalog>) -> Self {
        let active = Arc::new(Mutex::new(HashMap::new()));
        let cancel = CancellationToken::new();

        let reaper_catalog = catalog.clone();
        let reaper_active = active.clone();
        let reaper_cancel = cancel.clone();
        let reaper = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = reaper_cancel.cancelled() => break,
                    _ = tokio::time::sleep(REAP_INTERVAL) => {}
                }
                reap_finished(&reaper_catalog, &reaper_active).await;
            }
        });

        Self {
            catalog,
            active,
            reaper: Mutex::new(Some(reaper)),
            cancel,
        }
    }

    /// Start a job, or queue the request if it is already running.
    pub async fn start(&self, name: &str) -> Result<()> {
        let mut active = self.active.lock().await;

        if active.contains_key(name) {
            tracing::info!(job = %name, "job is already running, queueing the start request");
            return self.catalog.incr_pending(name).await;
        }

        let job = self.catalog.get(name).await?;
        let child = spawn_process(name, &job)?;
        active.insert(name.to_string(), child);
        self.catalog.job_started(name).await?;
        Ok(())
    }

    /// Hard-kill a running job. The reaper observes the exit and updates the
    /// catalog; queued start requests are left untouched.
    pub async fn stop(&self, name: &str) -> Result<()> {
        let mut active = self.active.lock().await;

        self.catalog.get(name).await?;
        match active.get_mut(name) {
            None => {
                tracing::warn!(job = %name, "job is not running, not stopping it");
                Err(KiwibesError::JobIsNotRunning)
            }
            Some(child) => {
                tracing::info!(job = %name, "killing job process");
                if let Err(e) = child.start_kill() {
                    // Already exited; the reaper will pick it up.
                    tracing::debug!(job = %name, error = %e, "kill failed");
                }
                Ok(())
            }
        }
    }

    /// Hard-kill every running job.
    pub async fn stop_all(&self) {
        let mut active = self.active.lock().await;
        for (name, child) in active.iter_mut() {
            tracing::info!(job = %name, "killing job process");
            if let Err(e) = child.start_kill() {
                tracing::debug!(job = %name, error = %e, "kill failed");
            }
        }
    }

    /// Names of the jobs with a live child process.
    pub async fn running(&self) -> Vec<String> {
        let active = self.active.lock().await;
        let mut names: Vec<String> = active.keys().cloned().collect();
        names.sort();
        names
    }

    /// Kill all children, then stop and join the reaper task.
    pub async fn shutdown(&self) {
        self.stop_all().await;
        self.cancel.cancel();
        if let Some(handle) = self.reaper.lock().await.take() {
            tracing::info!("waiting for the reaper task to finish");
            let _ = handle.await;
        }
    }
}

/// Drain every finished child, record the completions and consume queued
/// start requests. Polling each child with `try_wait` keeps the drain
/// non-blocking so it coexists with concurrent spawns.
async fn reap_finished(catalog: &Catalog, active: &Mutex<HashMap<String, Child>>) {
    let mut active = active.lock().await;

    let mut finished = Vec::new();
    for (name, child) in active.iter_mut() {
        match child.try_wait() {
            Ok(Some(status)) => finished.push((name.clone(), status)),
            Ok(None) => {}
            Err(e) => tracing::warn!(job = %name, error = %e, "failed to poll child process"),
        }
    }

    for (name, status) in finished {
        active.remove(&name);
        tracing::info!(job = %name, exit_code = ?status.code(), "child process exited");

        if let Err(e) = catalog.job_stopped(&name).await {
            tracing::warn!(job = %name, error = %e, "could not record job completion");
        }

        match catalog.decr_pending(&name).await {
            Ok(remaining) if remaining >= 0 => {
                tracing::info!(job = %name, remaining, "job has queued start requests, starting it again");
                let Ok(job) = catalog.get(&name).await else {
                    continue;
                };
                match spawn_process(&name, &job) {
                    Ok(child) => {
                        active.insert(name.clone(), child);
                        if let Err(e) = catalog.job_started(&name).await {
                            tracing::warn!(job = %name, error = %e, "could not record job start");
                        }
                    }
                    // Spawn failures are not retried; the queue only advances
                    // on child exit.
                    Err(e) => tracing::error!(job = %name, error = %e, "failed to launch queued start"),
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(job = %name, error = %e, "could not consume queued start"),
        }
    }
}

fn spawn_process(name: &str, job: &Job) -> Result<Child> {
    let (program, args) = job
        .program
        .split_first()
        .ok_or(KiwibesError::ProcessLaunchFailed)?;

    match Command::new(program).args(args).spawn() {
        Ok(child) => {
            tracing::info!(job = %name, program = %program, pid = ?child.id(), "started job");
            Ok(child)
        }
        Err(e) => {
            tracing::error!(job = %name, program = %program, error = %e, "failed to launch process");
            Err(KiwibesError::ProcessLaunchFailed)
        }
    }
}
