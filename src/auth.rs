//! Token authentication with live reload.
//!
//! Tokens live in a JSON string-array file that operators may rewrite while
//! the server runs. A watcher task polls the file's modification time every
//! second and swaps in the new set atomically. A file that fails to parse
//! leaves the previous set in place; a missing file empties the set, which
//! rejects every request.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct Authenticator {
    tokens: Arc<RwLock<HashSet<String>>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl Authenticator {
    /// Load the token file once and start the watcher task.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        let mut last_modified = file_mtime(&path);
        let initial = match read_tokens(&path) {
            Ok(set) => {
                tracing::info!(count = set.len(), path = %path.display(), "loaded authentication tokens");
                set
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "no authentication tokens loaded");
                HashSet::new()
            }
        };

        let tokens = Arc::new(RwLock::new(initial));
        let cancel = CancellationToken::new();

        let watcher_tokens = tokens.clone();
        let watcher_cancel = cancel.clone();
        let watcher = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = watcher_cancel.cancelled() => break,
                    _ = tokio::time::sleep(POLL_INTERVAL) => {}
                }

                let modified = file_mtime(&path);
                if modified == last_modified {
                    continue;
                }

                match modified {
                    Some(_) => match read_tokens(&path) {
                        Ok(set) => {
                            tracing::info!(count = set.len(), path = %path.display(), "reloaded authentication tokens");
                            *watcher_tokens.write().await = set;
                        }
                        Err(e) => {
                            tracing::error!(path = %path.display(), error = %e, "failed to reload authentication tokens, keeping the previous set");
                        }
                    },
                    None => {
                        tracing::warn!(path = %path.display(), "authentication tokens file removed, rejecting all requests");
                        watcher_tokens.write().await.clear();
                    }
                }
                last_modified = modified;
            }
        });

        Self {
            tokens,
            watcher: Mutex::new(Some(watcher)),
            cancel,
        }
    }

    /// Whether the token is in the current set.
    pub async fn is_valid(&self, token: &str) -> bool {
        self.tokens.read().await.contains(token)
    }

    /// Stop the watcher task and wait for it.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.watcher.lock().await.take() {
            let _ = handle.await;
        }
    }
}

fn file_mtime(path: &std::path::Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn read_tokens(path: &std::path::Path) -> std::io::Result<HashSet<String>> {
    let raw = std::fs::read_to_string(path)?;
    let tokens: Vec<String> = serde_json::from_str(&raw)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    Ok(tokens.into_iter().collect())
}
