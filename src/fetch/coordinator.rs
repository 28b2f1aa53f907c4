// ── Task coordinator – one background operation per kind, ordered events ─────

use crate::fetch::config::FetchConfig;
use crate::fetch::search::SearchOperation;
use crate::fetch::session::SessionFactory;
use crate::fetch::transfer::TransferOperation;
use crate::fetch::types::{FetchError, FetchEvent, LogLevel, OperationKind, RemoteFileRef};
use log::{error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Runs searches and transfers on the blocking pool (ssh2 is synchronous),
/// guarantees at most one in-flight operation per kind, and relays every
/// status/result through one ordered event channel.
///
/// A search and a transfer may run concurrently; each opens its own session.
pub struct TaskCoordinator {
    factory: Arc<SessionFactory>,
    search: SearchOperation,
    transfer: TransferOperation,
    events: mpsc::UnboundedSender<FetchEvent>,
    search_running: Arc<AtomicBool>,
    transfer_running: Arc<AtomicBool>,
}

impl TaskCoordinator {
    /// Returns the coordinator and the receiving end of the event channel,
    /// which the caller drains on its own schedule.
    pub fn new(config: FetchConfig) -> (Self, mpsc::UnboundedReceiver<FetchEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let search = SearchOperation::new(config.remote_base_dir.clone());
        let transfer = TransferOperation::new(config.destination_dir.clone());
        let coordinator = TaskCoordinator {
            factory: Arc::new(SessionFactory::new(config)),
            search,
            transfer,
            events,
            search_running: Arc::new(AtomicBool::new(false)),
            transfer_running: Arc::new(AtomicBool::new(false)),
        };
        (coordinator, rx)
    }

    pub fn search_running(&self) -> bool {
        self.search_running.load(Ordering::SeqCst)
    }

    pub fn transfer_running(&self) -> bool {
        self.transfer_running.load(Ordering::SeqCst)
    }

    /// Non-blocking. Rejected while a search is already running; otherwise the
    /// lookup runs in the background and ends with exactly one terminal event.
    /// Returns the operation id carried by all of this search's events.
    pub fn submit_search(&self, pattern: &str) -> Result<String, FetchError> {
        let pattern = pattern.trim().to_string();
        if pattern.is_empty() {
            return Err(FetchError::EmptyPattern);
        }
        self.acquire(OperationKind::Search)?;

        let search_id = Uuid::new_v4().to_string();
        let factory = self.factory.clone();
        let op = self.search.clone();
        let tx = self.events.clone();
        let gate = self.search_running.clone();
        let id = search_id.clone();

        tokio::task::spawn_blocking(move || {
            let _ = tx.send(FetchEvent::SearchStarted {
                search_id: id.clone(),
                pattern: pattern.clone(),
            });

            let outcome = match factory.open() {
                Ok(session) => {
                    let result = op.run(&id, &pattern, &session);
                    session.close();
                    result
                }
                Err(e) => Err(e),
            };

            gate.store(false, Ordering::SeqCst);
            match outcome {
                Ok(result) => {
                    for diagnostic in &result.diagnostics {
                        let _ = tx.send(FetchEvent::Log {
                            level: LogLevel::Warning,
                            message: format!("search diagnostic: {}", diagnostic),
                        });
                    }
                    let _ = tx.send(FetchEvent::Log {
                        level: LogLevel::Info,
                        message: format!("found {} matching file(s)", result.files.len()),
                    });
                    let _ = tx.send(FetchEvent::SearchFinished { result });
                }
                Err(e) => {
                    error!("search for '{}' failed: {}", pattern, e);
                    let _ = tx.send(FetchEvent::SearchFailed {
                        search_id: id,
                        error: e.to_string(),
                    });
                }
            }
        });
        Ok(search_id)
    }

    /// Non-blocking. Rejected while a transfer is already running; otherwise
    /// the batch runs in the background, emitting per-file progress and one
    /// terminal event. Returns the job id carried by all of this job's events.
    pub fn submit_transfer(&self, files: Vec<RemoteFileRef>) -> Result<String, FetchError> {
        if files.is_empty() {
            return Err(FetchError::EmptyTransfer);
        }
        self.acquire(OperationKind::Transfer)?;

        let job_id = Uuid::new_v4().to_string();
        let factory = self.factory.clone();
        let op = self.transfer.clone();
        let tx = self.events.clone();
        let gate = self.transfer_running.clone();
        let id = job_id.clone();

        tokio::task::spawn_blocking(move || {
            let total = files.len();
            let _ = tx.send(FetchEvent::TransferStarted {
                job_id: id.clone(),
                total,
            });

            let session = match factory.open() {
                Ok(session) => session,
                Err(e) => {
                    error!("transfer aborted, connection failed: {}", e);
                    gate.store(false, Ordering::SeqCst);
                    let _ = tx.send(FetchEvent::TransferFailed {
                        job_id: id,
                        error: e.to_string(),
                    });
                    return;
                }
            };
            let sftp = match session.sftp() {
                Ok(sftp) => sftp,
                Err(e) => {
                    error!("transfer aborted: {}", e);
                    session.close();
                    gate.store(false, Ordering::SeqCst);
                    let _ = tx.send(FetchEvent::TransferFailed {
                        job_id: id,
                        error: e.to_string(),
                    });
                    return;
                }
            };

            let username = factory.config().username.clone();
            let host = factory.config().host.clone();
            let job = op.run(&id, &files, &sftp, |index, total, file| {
                let dest = op.destination_dir().join(file.destination_name());
                let _ = tx.send(FetchEvent::Log {
                    level: LogLevel::Info,
                    message: format!(
                        "copying {} -> {}",
                        file.scp_target(&username, &host),
                        dest.display()
                    ),
                });
                let _ = tx.send(FetchEvent::TransferProgress {
                    job_id: id.clone(),
                    index,
                    total,
                    file: file.clone(),
                });
            });

            // Transfer sub-channel first, then the session.
            drop(sftp);
            session.close();

            info!(
                "transfer done: {} copied, {} missing, {} failed; saved to {}",
                job.copied(),
                job.not_found(),
                job.failed(),
                job.destination_dir
            );
            gate.store(false, Ordering::SeqCst);
            let _ = tx.send(FetchEvent::TransferFinished { job });
        });
        Ok(job_id)
    }

    /// Idle -> Running, or AlreadyRunning if the kind is still in flight.
    fn acquire(&self, kind: OperationKind) -> Result<(), FetchError> {
        let gate = match kind {
            OperationKind::Search => &self.search_running,
            OperationKind::Transfer => &self.transfer_running,
        };
        gate.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| FetchError::AlreadyRunning(kind))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    fn unreachable_config(dest: PathBuf) -> FetchConfig {
        // Bind then drop a listener so the port is known-closed.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        FetchConfig {
            host: "127.0.0.1".into(),
            port,
            username: "tester".into(),
            private_key_path: PathBuf::from("/nonexistent/id_ed25519"),
            remote_base_dir: "/srv/data".into(),
            destination_dir: dest,
            timeout_secs: 2,
        }
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<FetchEvent>) -> FetchEvent {
        tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn test_empty_pattern_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, _rx) = TaskCoordinator::new(unreachable_config(dir.path().into()));
        assert!(matches!(
            coordinator.submit_search("   "),
            Err(FetchError::EmptyPattern)
        ));
        assert!(!coordinator.search_running());
    }

    #[tokio::test]
    async fn test_empty_transfer_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, _rx) = TaskCoordinator::new(unreachable_config(dir.path().into()));
        assert!(matches!(
            coordinator.submit_transfer(Vec::new()),
            Err(FetchError::EmptyTransfer)
        ));
        assert!(!coordinator.transfer_running());
    }

    #[tokio::test]
    async fn test_second_search_rejected_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, _rx) = TaskCoordinator::new(unreachable_config(dir.path().into()));

        coordinator.search_running.store(true, Ordering::SeqCst);
        assert!(matches!(
            coordinator.submit_search("report"),
            Err(FetchError::AlreadyRunning(OperationKind::Search))
        ));
        // The other kind is unaffected by the search gate.
        assert!(!coordinator.transfer_running());
    }

    #[tokio::test]
    async fn test_second_transfer_rejected_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, _rx) = TaskCoordinator::new(unreachable_config(dir.path().into()));

        coordinator.transfer_running.store(true, Ordering::SeqCst);
        let file = RemoteFileRef::new("/base/a/x.txt").unwrap();
        assert!(matches!(
            coordinator.submit_transfer(vec![file]),
            Err(FetchError::AlreadyRunning(OperationKind::Transfer))
        ));
    }

    #[tokio::test]
    async fn test_failed_search_emits_started_then_one_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, mut rx) = TaskCoordinator::new(unreachable_config(dir.path().into()));

        let id = coordinator.submit_search("report").unwrap();

        match next_event(&mut rx).await {
            FetchEvent::SearchStarted { search_id, pattern } => {
                assert_eq!(search_id, id);
                assert_eq!(pattern, "report");
            }
            other => panic!("expected SearchStarted, got {:?}", other),
        }
        match next_event(&mut rx).await {
            FetchEvent::SearchFailed { search_id, error } => {
                assert_eq!(search_id, id);
                assert!(error.contains("connection failed"), "error: {}", error);
            }
            other => panic!("expected SearchFailed, got {:?}", other),
        }

        // Terminal event means the gate is already back to Idle.
        assert!(!coordinator.search_running());
        assert!(coordinator.submit_search("report").is_ok());
    }

    #[tokio::test]
    async fn test_failed_transfer_emits_started_then_one_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, mut rx) = TaskCoordinator::new(unreachable_config(dir.path().into()));

        let file = RemoteFileRef::new("/base/a/x.txt").unwrap();
        let id = coordinator.submit_transfer(vec![file]).unwrap();

        match next_event(&mut rx).await {
            FetchEvent::TransferStarted { job_id, total } => {
                assert_eq!(job_id, id);
                assert_eq!(total, 1);
            }
            other => panic!("expected TransferStarted, got {:?}", other),
        }
        match next_event(&mut rx).await {
            FetchEvent::TransferFailed { job_id, error } => {
                assert_eq!(job_id, id);
                assert!(error.contains("connection failed"), "error: {}", error);
            }
            other => panic!("expected TransferFailed, got {:?}", other),
        }
        assert!(!coordinator.transfer_running());
    }

    #[tokio::test]
    async fn test_resubmitted_search_events_carry_their_own_id() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, mut rx) = TaskCoordinator::new(unreachable_config(dir.path().into()));

        // Back-to-back submissions must stay attributable even when the second
        // one is accepted the moment the first turns terminal.
        let first = coordinator.submit_search("alpha").unwrap();
        match next_event(&mut rx).await {
            FetchEvent::SearchStarted { search_id, .. } => assert_eq!(search_id, first),
            other => panic!("expected SearchStarted, got {:?}", other),
        }
        match next_event(&mut rx).await {
            FetchEvent::SearchFailed { search_id, .. } => assert_eq!(search_id, first),
            other => panic!("expected SearchFailed, got {:?}", other),
        }

        let second = coordinator.submit_search("beta").unwrap();
        assert_ne!(second, first);
        match next_event(&mut rx).await {
            FetchEvent::SearchStarted { search_id, pattern } => {
                assert_eq!(search_id, second);
                assert_eq!(pattern, "beta");
            }
            other => panic!("expected SearchStarted, got {:?}", other),
        }
        match next_event(&mut rx).await {
            FetchEvent::SearchFailed { search_id, .. } => assert_eq!(search_id, second),
            other => panic!("expected SearchFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_search_and_transfer_gates_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, _rx) = TaskCoordinator::new(unreachable_config(dir.path().into()));

        coordinator.search_running.store(true, Ordering::SeqCst);
        let file = RemoteFileRef::new("/base/a/x.txt").unwrap();
        // A transfer submission is still accepted while a search runs.
        assert!(coordinator.submit_transfer(vec![file]).is_ok());
    }
}
