use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notification_services::Notifier;
use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::booking::BookingTransaction;
use crate::orchestrator::{ScanOrchestrator, ScanOutcome};
use crate::page::BrowsingEngine;
use crate::probe::ProbeSettings;
use crate::profile::BookingProfile;
use crate::scan_types::*;

/// Polling and reporting settings for [`RunExecutor`]
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Pause between scan cycles (default: 60 seconds)
    pub poll_interval: Duration,

    /// Upper bound of the random delay added to each pause (default: 15 seconds)
    pub poll_jitter: Duration,

    /// Stop after this many cycles without a booking attempt (default: unlimited)
    pub max_cycles: Option<u32>,

    /// Where the final page is captured after a booking attempt
    pub screenshot_path: PathBuf,

    /// Also notify when a cycle finds nothing (default: false)
    pub notify_no_inventory: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            poll_jitter: Duration::from_secs(15),
            max_cycles: None,
            screenshot_path: PathBuf::from("testresult.png"),
            notify_no_inventory: false,
        }
    }
}

/// Main scan-and-book engine
pub struct RunExecutor {
    engine: Arc<dyn BrowsingEngine>,
    notifier: Arc<dyn Notifier>,
    targets: Vec<Target>,
    settings: ProbeSettings,
    profile: BookingProfile,
    config: ExecutorConfig,
}

impl RunExecutor {
    /// Create an executor over a shared browsing engine
    pub fn new(
        engine: Arc<dyn BrowsingEngine>,
        notifier: Arc<dyn Notifier>,
        targets: Vec<Target>,
        settings: ProbeSettings,
        profile: BookingProfile,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            engine,
            notifier,
            targets,
            settings,
            profile,
            config,
        }
    }

    /// Start the polling loop
    ///
    /// Returns after the first booking attempt, successful or not, or once
    /// `max_cycles` cycles found nothing.
    pub async fn start(&self) -> RunOutcome {
        info!(
            "Starting scan executor for {} campgrounds, {}",
            self.targets.len(),
            self.settings.window
        );

        let mut cycle: u32 = 0;
        loop {
            cycle += 1;
            debug!("Scan cycle {}", cycle);

            let outcome = self.run_once().await;

            if outcome.is_booking_attempt() {
                info!("Booking attempted, stopping scan executor");
                return outcome;
            }

            if self.config.max_cycles.is_some_and(|max| cycle >= max) {
                info!("Stopping after {} cycles without inventory", cycle);
                return outcome;
            }

            let delay = self.next_delay();
            debug!("Next scan in {}s", delay.as_secs());
            sleep(delay).await;
        }
    }

    /// One scan followed, if anything is available, by one booking attempt
    pub async fn run_once(&self) -> RunOutcome {
        let run_id = Uuid::new_v4();
        debug!("Run {} started", run_id);

        let orchestrator = ScanOrchestrator::new(self.engine.as_ref(), &self.settings);

        let outcome = match orchestrator.scan(&self.targets).await {
            ScanOutcome::NoInventory => RunOutcome::NoInventory,
            ScanOutcome::Winner(site) => self.book(site).await,
        };

        self.report(run_id, &outcome).await;
        outcome
    }

    async fn book(&self, mut site: AvailableSite) -> RunOutcome {
        let transaction = BookingTransaction::new(
            &self.profile,
            &self.settings.selectors,
            self.settings.timeouts,
        );
        let result = transaction.execute(&mut site).await;

        // Capture whatever page the attempt ended on
        let path = &self.config.screenshot_path;
        match site.session.screenshot(path).await {
            Ok(()) => info!("Saved screenshot to {}", path.display()),
            Err(e) => warn!("Failed to save screenshot: {}", e),
        }

        let target = site.target.clone();
        site.release().await;

        match result {
            TransactionResult::Success => RunOutcome::Booked { target },
            TransactionResult::Failed { stage, cause } => RunOutcome::BookingFailed {
                target,
                stage,
                cause,
            },
        }
    }

    async fn report(&self, run_id: Uuid, outcome: &RunOutcome) {
        match outcome {
            RunOutcome::NoInventory => {
                info!("Run {}: no sites found across all grounds", run_id);
                if !self.config.notify_no_inventory {
                    return;
                }
            }
            RunOutcome::Booked { target } => {
                info!("Run {}: booked {} ✨", run_id, target);
            }
            RunOutcome::BookingFailed {
                target,
                stage,
                cause,
            } => {
                error!(
                    "Run {}: failed to book {} at {}: {}",
                    run_id, target, stage, cause
                );
            }
        }

        let notification = outcome.notification(&self.settings.window);
        match self.notifier.notify(&notification).await {
            Ok(message_id) => debug!(
                "Run {} reported via {} ({})",
                run_id,
                self.notifier.channel(),
                message_id
            ),
            Err(e) => error!("Failed to send notification for run {}: {}", run_id, e),
        }
    }

    fn next_delay(&self) -> Duration {
        let jitter_ms = self.config.poll_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_ms)
        };
        self.config.poll_interval + Duration::from_millis(jitter)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use notification_services::{Notification, NotificationError};

    use super::*;
    use crate::fake_page::*;
    use crate::page::PageError;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<Notification>>,
        fail: bool,
    }

    impl RecordingNotifier {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn titles(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|n| n.title.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, notification: &Notification) -> Result<String, NotificationError> {
            self.sent.lock().unwrap().push(notification.clone());
            if self.fail {
                return Err(NotificationError::PushError("503 Service Unavailable".to_string()));
            }
            Ok("msg-1".to_string())
        }

        fn channel(&self) -> &'static str {
            "recording"
        }
    }

    fn url(i: usize) -> String {
        format!("https://camp.test/{}", i)
    }

    fn targets(n: usize) -> Vec<Target> {
        (0..n)
            .map(|i| Target::new(format!("camp-{}", i), url(i)))
            .collect()
    }

    fn executor(
        engine: &Arc<FakeEngine>,
        notifier: &Arc<RecordingNotifier>,
        n: usize,
        config: ExecutorConfig,
    ) -> RunExecutor {
        RunExecutor::new(
            engine.clone(),
            notifier.clone(),
            targets(n),
            test_settings(),
            test_profile(),
            config,
        )
    }

    fn quick_config() -> ExecutorConfig {
        ExecutorConfig {
            poll_interval: Duration::from_secs(30),
            poll_jitter: Duration::ZERO,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_single_available_target_is_booked() {
        let engine = Arc::new(
            FakeEngine::new()
                .with_site(&url(0), FakeSite::available(0))
                .with_site(&url(1), FakeSite::available(0))
                .with_site(&url(2), FakeSite::available(1))
                .with_site(&url(3), FakeSite::available(0)),
        );
        let notifier = Arc::new(RecordingNotifier::default());

        let outcome = executor(&engine, &notifier, 4, quick_config())
            .run_once()
            .await;

        assert_eq!(
            outcome,
            RunOutcome::Booked {
                target: Target::new("camp-2", url(2))
            }
        );
        assert!(engine.clicked(&url(2), "#confirm"));
        assert!(engine.ops_for(&url(2)).contains(&Op::Screenshot));
        assert_eq!(engine.open_sessions(), 0);
        assert_eq!(notifier.titles(), vec!["Booked camp-2".to_string()]);
    }

    #[tokio::test]
    async fn test_claim_failure_after_runner_up_released() {
        let engine = Arc::new(
            FakeEngine::new()
                .with_site(&url(0), FakeSite::available(1).failing_click("#claim"))
                .with_site(&url(1), FakeSite::available(1))
                .with_site(&url(2), FakeSite::available(0)),
        );
        let notifier = Arc::new(RecordingNotifier::default());

        let outcome = executor(&engine, &notifier, 3, quick_config())
            .run_once()
            .await;

        match &outcome {
            RunOutcome::BookingFailed { target, stage, .. } => {
                assert_eq!(target.name, "camp-0");
                assert_eq!(*stage, TransactionStage::Claim);
            }
            other => panic!("expected claim failure, got {:?}", other),
        }
        assert!(!engine.touched(&url(0), "#sign-in"));
        assert!(!engine.touched(&url(0), "#checkout"));

        let runner_up_closed = engine.position(&url(1), &Op::Close).unwrap();
        let claim_clicked = engine
            .position(&url(0), &Op::Click("#claim".to_string()))
            .unwrap();
        assert!(runner_up_closed < claim_clicked);
        assert_eq!(engine.closes_for(&url(1)), 1);
        assert_eq!(engine.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_notifier_failure_keeps_outcome() {
        let engine = Arc::new(FakeEngine::new().with_site(&url(0), FakeSite::available(1)));
        let notifier = Arc::new(RecordingNotifier::failing());

        let outcome = executor(&engine, &notifier, 1, quick_config())
            .run_once()
            .await;

        assert_eq!(
            outcome,
            RunOutcome::Booked {
                target: Target::new("camp-0", url(0))
            }
        );
        assert_eq!(notifier.titles().len(), 1);
    }

    #[tokio::test]
    async fn test_no_inventory_is_quiet_by_default() {
        let engine = Arc::new(FakeEngine::new().with_site(&url(0), FakeSite::available(0)));
        let notifier = Arc::new(RecordingNotifier::default());

        let outcome = executor(&engine, &notifier, 1, quick_config())
            .run_once()
            .await;
        assert_eq!(outcome, RunOutcome::NoInventory);
        assert!(notifier.titles().is_empty());

        let config = ExecutorConfig {
            notify_no_inventory: true,
            ..quick_config()
        };
        executor(&engine, &notifier, 1, config).run_once().await;
        assert_eq!(notifier.titles(), vec!["No campsites found".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_stops_after_booking_attempt() {
        let engine = Arc::new(
            FakeEngine::new().with_site(&url(0), FakeSite::available(1).without("#email")),
        );
        let notifier = Arc::new(RecordingNotifier::default());

        let outcome = executor(&engine, &notifier, 1, quick_config())
            .start()
            .await;

        assert!(matches!(
            outcome,
            RunOutcome::BookingFailed {
                stage: TransactionStage::Authenticate,
                cause: PageError::NotFound(_),
                ..
            }
        ));
        let navigations = engine
            .ops_for(&url(0))
            .into_iter()
            .filter(|op| matches!(op, Op::Navigate(_)))
            .count();
        assert_eq!(navigations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_honours_max_cycles() {
        let engine = Arc::new(
            FakeEngine::new()
                .with_site(&url(0), FakeSite::available(0))
                .with_site(&url(1), FakeSite::available(0)),
        );
        let notifier = Arc::new(RecordingNotifier::default());
        let config = ExecutorConfig {
            max_cycles: Some(3),
            ..quick_config()
        };

        let started = tokio::time::Instant::now();
        let outcome = executor(&engine, &notifier, 2, config).start().await;

        assert_eq!(outcome, RunOutcome::NoInventory);
        assert_eq!(engine.closes_for(&url(0)), 3);
        assert_eq!(engine.closes_for(&url(1)), 3);
        assert!(started.elapsed() >= Duration::from_secs(60));
    }

    #[test]
    fn test_delay_stays_within_jitter() {
        let engine = Arc::new(FakeEngine::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let executor = executor(&engine, &notifier, 0, ExecutorConfig::default());

        for _ in 0..50 {
            let delay = executor.next_delay();
            assert!(delay >= Duration::from_secs(60));
            assert!(delay <= Duration::from_secs(75));
        }
    }
}
