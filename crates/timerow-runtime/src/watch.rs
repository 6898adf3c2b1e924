//! Background intake watcher.
//!
//! Polls the intake directory in a tokio task and hands every new raw export
//! to the [`PublishOrchestrator`], forwarding each [`PublishOutcome`] through
//! an `mpsc` channel. Runs are strictly sequential: the orchestrator is owned
//! by the loop and moved into a blocking task for the duration of one run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use timerow_core::models::PublishOutcome;
use tokio::sync::mpsc;
use tokio::time;

use crate::intake::list_raw_exports;
use crate::orchestrator::PublishOrchestrator;

// ── IntakeWatcher ─────────────────────────────────────────────────────────────

/// Polling watcher over the orchestrator's intake directory.
pub struct IntakeWatcher {
    orchestrator: PublishOrchestrator,
    poll_interval: Duration,
}

impl IntakeWatcher {
    pub fn new(orchestrator: PublishOrchestrator, poll_interval: Duration) -> Self {
        Self {
            orchestrator,
            poll_interval,
        }
    }

    /// Start polling.
    ///
    /// Returns the outcome channel and a [`WatchHandle`] that stops the loop.
    /// The loop also exits once the receiver is dropped.
    pub fn start(self) -> (mpsc::Receiver<PublishOutcome>, WatchHandle) {
        let (tx, rx) = mpsc::channel(16);

        let handle = tokio::spawn(async move {
            self.watch_loop(tx).await;
        });

        (rx, WatchHandle { handle })
    }

    // ── Private implementation ────────────────────────────────────────────

    async fn watch_loop(self, tx: mpsc::Sender<PublishOutcome>) {
        let intake_dir = self.orchestrator.config().intake_dir.clone();
        let mut orchestrator = Some(self.orchestrator);
        // Exports that failed, keyed by path, with the mtime they failed at.
        let mut rejected: HashMap<PathBuf, Option<SystemTime>> = HashMap::new();

        let mut interval = time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            if tx.is_closed() {
                tracing::debug!("outcome channel closed; exiting watch loop");
                break;
            }

            let pending = list_raw_exports(&intake_dir);
            rejected.retain(|path, _| pending.contains(path));

            for path in pending {
                let mtime = modified_at(&path);
                if rejected.get(&path) == Some(&mtime) {
                    continue;
                }

                let Some(orch) = orchestrator.take() else {
                    return;
                };
                let run_path = path.clone();
                let joined = tokio::task::spawn_blocking(move || {
                    let mut orch = orch;
                    let outcome = orch.run(Some(&run_path));
                    (orch, outcome)
                })
                .await;

                let outcome = match joined {
                    Ok((orch, outcome)) => {
                        orchestrator = Some(orch);
                        outcome
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "publish run aborted; stopping watcher");
                        return;
                    }
                };

                if !outcome.is_success() && path.exists() {
                    tracing::warn!("{} will be skipped until it changes", path.display());
                    rejected.insert(path, mtime);
                }

                if let Err(e) = tx.send(outcome).await {
                    tracing::warn!(error = %e, "failed to send outcome; receiver dropped");
                    return;
                }
            }
        }
    }
}

fn modified_at(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

// ── Heartbeat ─────────────────────────────────────────────────────────────────

/// Periodic liveness log line for long-running watch sessions.
pub struct Heartbeat;

impl Heartbeat {
    /// Default period: five minutes.
    pub const DEFAULT_PERIOD: Duration = Duration::from_secs(300);

    /// Log a status line every `period` until the handle is aborted.
    pub fn start(period: Duration) -> WatchHandle {
        let started = Instant::now();
        let handle = tokio::spawn(async move {
            let mut interval = time::interval(period);
            // The first tick fires immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                tracing::info!(
                    "timerow is running (up {}s)",
                    started.elapsed().as_secs()
                );
            }
        });
        WatchHandle { handle }
    }
}

// ── WatchHandle ───────────────────────────────────────────────────────────────

/// Handle to a background task started by this module.
pub struct WatchHandle {
    handle: tokio::task::JoinHandle<()>,
}

impl WatchHandle {
    /// Immediately abort the task.
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::PublishConfig;
    use crate::vcs::GitCli;
    use tempfile::TempDir;
    use timerow_core::error::ErrorKind;

    const EXPORT: &str = "\
Glucose data,Generated on,01-03-2024 10:00
Device,Serial Number,Device Timestamp,Record Type,Historic Glucose mmol/L,Scan Glucose mmol/L
FreeStyle,ABC,01-03-2024 08:15,0,\"5,6\",
FreeStyle,ABC,01-03-2024 08:32,1,,7.4
";

    fn watcher(dir: &TempDir) -> IntakeWatcher {
        let mut config = PublishConfig::for_project(dir.path());
        config.publish = false;
        let orchestrator = PublishOrchestrator::new(config, Box::new(GitCli::new(dir.path())));
        IntakeWatcher::new(orchestrator, Duration::from_millis(20))
    }

    fn drop_export(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let intake = dir.path().join("input");
        std::fs::create_dir_all(&intake).unwrap();
        let path = intake.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_watcher_processes_new_export() {
        let dir = TempDir::new().unwrap();
        let raw = drop_export(&dir, "export.csv", EXPORT);
        let (mut rx, handle) = watcher(&dir).start();

        let outcome = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for outcome")
            .expect("channel closed before outcome");

        assert!(outcome.is_success(), "{}", outcome.message);
        assert!(outcome.changed);
        assert!(!raw.exists());
        assert!(dir.path().join("output").join("prepared_dataset.csv").exists());

        handle.abort();
    }

    #[tokio::test]
    async fn test_watcher_skips_rejected_export_until_changed() {
        let dir = TempDir::new().unwrap();
        let raw = drop_export(&dir, "bad.csv", "banner\nd,s,garbage,0,5.0,\n");
        let (mut rx, handle) = watcher(&dir).start();

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for outcome")
            .expect("channel closed before outcome");
        assert_eq!(first.error, Some(ErrorKind::MalformedInput));
        assert!(raw.exists());

        let again = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(again.is_err(), "rejected export must not be retried");

        handle.abort();
    }

    #[tokio::test]
    async fn test_watcher_stops_when_receiver_dropped() {
        let dir = TempDir::new().unwrap();
        let (rx, handle) = watcher(&dir).start();
        drop(rx);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn test_heartbeat_start_and_abort() {
        let handle = Heartbeat::start(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());
        handle.abort();
    }
}
