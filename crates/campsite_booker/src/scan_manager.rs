use std::sync::Arc;

use campground_scan::{RunExecutor, RunOutcome};
use tokio::task::JoinHandle;

/// Manager for the scan execution system
/// Runs the executor's polling loop in a background task
pub struct ScanManager {
    executor: Arc<RunExecutor>,
    executor_handle: Option<JoinHandle<RunOutcome>>,
}

impl ScanManager {
    /// Create a new scan manager
    pub fn new(executor: RunExecutor) -> Self {
        Self {
            executor: Arc::new(executor),
            executor_handle: None,
        }
    }

    /// Start the scan execution engine
    pub fn start(&mut self) {
        if self.is_running() {
            log::warn!("⚠️ Scan executor already running");
            return;
        }

        log::info!("🔎 Starting scan execution system");

        let executor = self.executor.clone();
        self.executor_handle = Some(tokio::spawn(async move { executor.start().await }));
    }

    /// Whether the background task is still alive
    pub fn is_running(&self) -> bool {
        self.executor_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Wait for the executor to finish on its own
    ///
    /// Dropping the returned future leaves the task running so [`stop`](Self::stop)
    /// can still abort it.
    pub async fn wait(&mut self) -> Option<RunOutcome> {
        let handle = self.executor_handle.as_mut()?;
        let result = handle.await;
        self.executor_handle = None;

        match result {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                log::error!("❌ Scan executor failed: {}", e);
                None
            }
        }
    }

    /// Stop the scan execution engine
    pub async fn stop(&mut self) {
        if let Some(handle) = self.executor_handle.take() {
            log::info!("🛑 Stopping scan execution system");
            handle.abort();
            let _ = handle.await;
            log::info!("Scan execution system stopped");
        }
    }
}

impl Drop for ScanManager {
    fn drop(&mut self) {
        if let Some(handle) = self.executor_handle.take() {
            handle.abort();
        }
    }
}
