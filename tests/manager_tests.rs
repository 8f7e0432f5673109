use std::sync::Arc;
use std::time::Duration;

use kiwibes::catalog::{Catalog, JobDescriptor, JobStatus};
use kiwibes::error::KiwibesError;
use kiwibes::manager::Manager;
use tempfile::TempDir;

fn setup(dir: &TempDir) -> (Arc<Catalog>, Manager) {
    let catalog = Arc::new(Catalog::new(dir.path().join("kiwibes.json")));
    let manager = Manager::new(catalog.clone());
    (catalog, manager)
}

fn shell_job(command: String) -> JobDescriptor {
    JobDescriptor {
        program: vec!["/bin/sh".to_string(), "-c".to_string(), command],
        schedule: String::new(),
        max_runtime: 10,
    }
}

/// Poll until the condition holds or the timeout expires.
async fn wait_for<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

#[tokio::test]
async fn test_single_manual_run() {
    let dir = TempDir::new().unwrap();
    let (catalog, manager) = setup(&dir);

    catalog
        .create(
            "sleep_2",
            JobDescriptor {
                program: vec!["/bin/sleep".to_string(), "2".to_string()],
                schedule: String::new(),
                max_runtime: 10,
            },
        )
        .await
        .unwrap();

    manager.start("sleep_2").await.unwrap();

    let job = catalog.get("sleep_2").await.unwrap();
    assert_eq!(job.status, JobStatus::Running);
    assert!(job.start_time > 0);
    assert_eq!(manager.running().await, vec!["sleep_2"]);

    let done = wait_for(Duration::from_secs(5), || async {
        catalog.get("sleep_2").await.unwrap().status == JobStatus::Stopped
    })
    .await;
    assert!(done, "job did not finish in time");

    let job = catalog.get("sleep_2").await.unwrap();
    assert_eq!(job.start_time, 0);
    assert_eq!(job.nbr_runs, 1);
    assert!((2.0..=3.0).contains(&job.avg_runtime), "avg {}", job.avg_runtime);
    assert_eq!(job.var_runtime, 0.0);
    assert!(manager.running().await.is_empty());

    manager.shutdown().await;
}

#[tokio::test]
async fn test_overlapping_starts_are_queued() {
    let dir = TempDir::new().unwrap();
    let (catalog, manager) = setup(&dir);
    let out = dir.path().join("out");

    catalog
        .create("hello", shell_job(format!("echo hi >> {}", out.display())))
        .await
        .unwrap();

    manager.start("hello").await.unwrap();
    manager.start("hello").await.unwrap();
    manager.start("hello").await.unwrap();

    assert_eq!(manager.running().await, vec!["hello"]);
    assert_eq!(catalog.get("hello").await.unwrap().pending_start, 2);

    // Each exit consumes one queued request; three runs in total.
    let drained = wait_for(Duration::from_secs(5), || async {
        let job = catalog.get("hello").await.unwrap();
        job.nbr_runs == 3 && job.pending_start == 0 && job.status == JobStatus::Stopped
    })
    .await;
    assert!(drained, "queued starts were not drained");

    let lines = std::fs::read_to_string(&out).unwrap();
    assert_eq!(lines.lines().filter(|l| *l == "hi").count(), 3);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_clear_pending_truncates_the_queue() {
    let dir = TempDir::new().unwrap();
    let (catalog, manager) = setup(&dir);
    let out = dir.path().join("out");

    catalog
        .create(
            "hello",
            shell_job(format!("sleep 1; echo hi >> {}", out.display())),
        )
        .await
        .unwrap();

    manager.start("hello").await.unwrap();
    manager.start("hello").await.unwrap();
    manager.start("hello").await.unwrap();
    assert_eq!(catalog.get("hello").await.unwrap().pending_start, 2);

    // Drop the queue while the first invocation is still running.
    catalog.clear_pending("hello").await.unwrap();

    let finished = wait_for(Duration::from_secs(5), || async {
        catalog.get("hello").await.unwrap().status == JobStatus::Stopped
    })
    .await;
    assert!(finished);

    // Give the reaper a chance to (wrongly) respawn before checking.
    tokio::time::sleep(Duration::from_millis(600)).await;

    let job = catalog.get("hello").await.unwrap();
    assert_eq!(job.nbr_runs, 1);
    assert_eq!(job.pending_start, 0);
    let lines = std::fs::read_to_string(&out).unwrap();
    assert_eq!(lines.lines().count(), 1);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_stop_kills_the_running_job() {
    let dir = TempDir::new().unwrap();
    let (catalog, manager) = setup(&dir);

    catalog
        .create(
            "long",
            JobDescriptor {
                program: vec!["/bin/sleep".to_string(), "30".to_string()],
                schedule: String::new(),
                max_runtime: 60,
            },
        )
        .await
        .unwrap();

    manager.start("long").await.unwrap();
    manager.stop("long").await.unwrap();

    let reaped = wait_for(Duration::from_secs(5), || async {
        catalog.get("long").await.unwrap().status == JobStatus::Stopped
    })
    .await;
    assert!(reaped, "killed job was not reaped");
    assert_eq!(catalog.get("long").await.unwrap().nbr_runs, 1);
    assert!(manager.running().await.is_empty());

    manager.shutdown().await;
}

#[tokio::test]
async fn test_stop_errors() {
    let dir = TempDir::new().unwrap();
    let (catalog, manager) = setup(&dir);

    assert_eq!(
        manager.stop("missing").await.unwrap_err(),
        KiwibesError::JobNameUnknown
    );

    catalog
        .create("idle", shell_job("true".to_string()))
        .await
        .unwrap();
    assert_eq!(
        manager.stop("idle").await.unwrap_err(),
        KiwibesError::JobIsNotRunning
    );

    manager.shutdown().await;
}

#[tokio::test]
async fn test_start_errors() {
    let dir = TempDir::new().unwrap();
    let (catalog, manager) = setup(&dir);

    assert_eq!(
        manager.start("missing").await.unwrap_err(),
        KiwibesError::JobNameUnknown
    );

    catalog
        .create(
            "broken",
            JobDescriptor {
                program: vec!["/nonexistent/binary".to_string()],
                schedule: String::new(),
                max_runtime: 10,
            },
        )
        .await
        .unwrap();

    assert_eq!(
        manager.start("broken").await.unwrap_err(),
        KiwibesError::ProcessLaunchFailed
    );
    // A failed launch leaves no trace.
    assert_eq!(catalog.get("broken").await.unwrap().status, JobStatus::Stopped);
    assert!(manager.running().await.is_empty());

    manager.shutdown().await;
}

#[tokio::test]
async fn test_stop_all_kills_everything() {
    let dir = TempDir::new().unwrap();
    let (catalog, manager) = setup(&dir);

    for name in ["a", "b"] {
        catalog
            .create(
                name,
                JobDescriptor {
                    program: vec!["/bin/sleep".to_string(), "30".to_string()],
                    schedule: String::new(),
                    max_runtime: 60,
                },
            )
            .await
            .unwrap();
        manager.start(name).await.unwrap();
    }
    assert_eq!(manager.running().await.len(), 2);

    manager.stop_all().await;

    let reaped = wait_for(Duration::from_secs(5), || async {
        manager.running().await.is_empty()
    })
    .await;
    assert!(reaped);

    manager.shutdown().await;
}
