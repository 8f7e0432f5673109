use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Stopped,
    Running,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Stopped => write!(f, "stopped"),
            JobStatus::Running => write!(f, "running"),
        }
    }
}

/// A catalog entry: the program invocation plus its runtime statistics.
///
/// The serialized field spellings are the on-disk and REST contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Job {
    /// argv of the program; the first element is the executable path.
    pub program: Vec<String>,
    /// Cron expression; empty means the job only runs on demand.
    pub schedule: String,
    /// Advisory runtime cap in seconds, not enforced.
    pub max_runtime: u64,
    #[serde(default)]
    pub status: JobStatus,
    /// Wall-clock start instant in epoch seconds; 0 while stopped.
    #[serde(default)]
    pub start_time: i64,
    /// Running mean of completed-run durations, in seconds.
    #[serde(default)]
    pub avg_runtime: f64,
    /// Welford M2 accumulator (sum of squared deltas).
    #[serde(default)]
    pub var_runtime: f64,
    /// Completions observed since the job was created.
    #[serde(default)]
    pub nbr_runs: u64,
    /// Start requests queued behind the currently-running instance.
    #[serde(default)]
    pub pending_start: u64,
}

impl Job {
    pub fn new(descriptor: JobDescriptor) -> Self {
        Self {
            program: descriptor.program,
            schedule: descriptor.schedule,
            max_runtime: descriptor.max_runtime,
            status: JobStatus::Stopped,
            start_time: 0,
            avg_runtime: 0.0,
            var_runtime: 0.0,
            nbr_runs: 0,
            pending_start: 0,
        }
    }

    /// Fold one completed-run duration into the statistics.
    ///
    /// Welford's update keeps the mean and the M2 accumulator numerically
    /// stable over long histories.
    pub fn record_run(&mut self, elapsed: f64) {
        let runs = self.nbr_runs + 1;
        let delta = elapsed - self.avg_runtime;
        self.avg_runtime += delta / runs as f64;
        self.var_runtime += delta * (elapsed - self.avg_runtime);
        self.nbr_runs = runs;
    }

    /// Sample variance of the recorded run durations.
    pub fn sample_variance(&self) -> f64 {
        if self.nbr_runs >= 2 {
            self.var_runtime / (self.nbr_runs - 1) as f64
        } else {
            0.0
        }
    }

    /// Clear the transient execution state, keeping the statistics.
    pub(crate) fn reset_runtime_state(&mut self) {
        self.status = JobStatus::Stopped;
        self.start_time = 0;
        self.pending_start = 0;
    }
}

/// The caller-supplied part of a job description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JobDescriptor {
    pub program: Vec<String>,
    pub schedule: String,
    pub max_runtime: u64,
}

/// A partial description, as accepted by `edit`.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub program: Option<Vec<String>>,
    pub schedule: Option<String>,
    pub max_runtime: Option<u64>,
}

impl JobPatch {
    pub fn is_empty(&self) -> bool {
        self.program.is_none() && self.schedule.is_none() && self.max_runtime.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sleeper() -> JobDescriptor {
        JobDescriptor {
            program: vec!["/bin/sleep".to_string(), "2".to_string()],
            schedule: String::new(),
            max_runtime: 10,
        }
    }

    #[test]
    fn test_new_job_has_zeroed_statistics() {
        let job = Job::new(sleeper());
        assert_eq!(job.status, JobStatus::Stopped);
        assert_eq!(job.start_time, 0);
        assert_eq!(job.nbr_runs, 0);
        assert_eq!(job.avg_runtime, 0.0);
        assert_eq!(job.var_runtime, 0.0);
        assert_eq!(job.pending_start, 0);
    }

    #[test]
    fn test_welford_matches_batch_statistics() {
        let samples = [2.0, 3.0, 5.0, 7.0, 11.0, 13.0];

        let mut job = Job::new(sleeper());
        for s in samples {
            job.record_run(s);
        }

        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1.0);

        assert_eq!(job.nbr_runs, samples.len() as u64);
        assert!((job.avg_runtime - mean).abs() < 1e-9);
        assert!((job.sample_variance() - variance).abs() < 1e-9);
    }

    #[test]
    fn test_variance_of_single_run_is_zero() {
        let mut job = Job::new(sleeper());
        job.record_run(2.5);
        assert_eq!(job.nbr_runs, 1);
        assert_eq!(job.avg_runtime, 2.5);
        assert_eq!(job.sample_variance(), 0.0);
    }

    #[test]
    fn test_serialized_field_spellings() {
        let job = Job::new(sleeper());
        let value = serde_json::to_value(&job).unwrap();
        for field in [
            "program",
            "schedule",
            "max-runtime",
            "status",
            "start-time",
            "avg-runtime",
            "var-runtime",
            "nbr-runs",
            "pending-start",
        ] {
            assert!(value.get(field).is_some(), "missing field {field}");
        }
        assert_eq!(value["status"], "stopped");
    }
}
