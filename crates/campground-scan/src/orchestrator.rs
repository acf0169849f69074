use futures_util::future::join_all;
use tracing::{debug, info};

use crate::page::BrowsingEngine;
use crate::probe::{AvailabilityProbe, ProbeSettings};
use crate::scan_types::*;

/// Result of probing every configured target once.
#[derive(Debug)]
pub enum ScanOutcome {
    /// No target showed inventory; every session has been released.
    NoInventory,
    /// Earliest-configured available target. Every other session has been released.
    Winner(AvailableSite),
}

/// Runs one probe per target concurrently and picks the winner.
pub struct ScanOrchestrator<'a> {
    engine: &'a dyn BrowsingEngine,
    settings: &'a ProbeSettings,
}

impl<'a> ScanOrchestrator<'a> {
    /// Creates an orchestrator.
    pub fn new(engine: &'a dyn BrowsingEngine, settings: &'a ProbeSettings) -> Self {
        Self { engine, settings }
    }

    /// Probes all `targets` and waits for every probe to settle.
    ///
    /// The winner is chosen by position in `targets`, never by completion order.
    pub async fn scan(&self, targets: &[Target]) -> ScanOutcome {
        info!(
            "Scanning {} campgrounds for {}",
            targets.len(),
            self.settings.window
        );

        let probe = AvailabilityProbe::new(self.engine, self.settings);
        let outcomes = join_all(targets.iter().map(|target| probe.probe(target))).await;

        select_winner(outcomes).await
    }
}

/// Keeps the first available outcome and releases the sessions of all later ones.
pub async fn select_winner(outcomes: Vec<ProbeOutcome>) -> ScanOutcome {
    let mut winner: Option<AvailableSite> = None;

    for outcome in outcomes {
        match outcome {
            ProbeOutcome::Available(site) if winner.is_none() => {
                info!("{} selected for booking", site.target);
                winner = Some(site);
            }
            ProbeOutcome::Available(site) => {
                debug!("Releasing runner-up {}", site.target);
                site.release().await;
            }
            ProbeOutcome::Unavailable { target, reason } => {
                debug!("{}: {}", target, reason);
            }
        }
    }

    match winner {
        Some(site) => ScanOutcome::Winner(site),
        None => ScanOutcome::NoInventory,
    }
}
