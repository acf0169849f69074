use std::sync::Arc;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::page::{
    BrowsingEngine, ElementHandle, PageError, PageSession, WaitCondition, fill, require_element,
    wait_for_element,
};
use crate::request_filter::RequestFilter;
use crate::scan_types::*;
use crate::selectors::{SiteSelectors, StepTimeouts};

/// Inputs shared read-only by every probe of a run.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    /// Site selectors.
    pub selectors: Arc<SiteSelectors>,
    /// Wait limits.
    pub timeouts: StepTimeouts,
    /// Dates entered on every listing.
    pub window: DateWindow,
    /// Outbound request policy attached to each session.
    pub filter: Arc<RequestFilter>,
}

/// Checks one target for bookable inventory.
pub struct AvailabilityProbe<'a> {
    engine: &'a dyn BrowsingEngine,
    settings: &'a ProbeSettings,
}

type StepResult<T> = Result<T, (ProbeStep, PageError)>;

impl<'a> AvailabilityProbe<'a> {
    /// Creates a probe over a shared engine.
    pub fn new(engine: &'a dyn BrowsingEngine, settings: &'a ProbeSettings) -> Self {
        Self { engine, settings }
    }

    /// Runs the probe sequence against `target`.
    ///
    /// Never fails: errors become [`ProbeOutcome::Unavailable`] and the session is
    /// released. On inventory the session stays open inside the outcome.
    pub async fn probe(&self, target: &Target) -> ProbeOutcome {
        debug!("Probing {} for {}", target, self.settings.window);

        let mut session = match self.engine.open_session().await {
            Ok(session) => session,
            Err(e) => {
                warn!("Probe of {} failed at {}: {}", target, ProbeStep::OpenSession, e);
                return ProbeOutcome::Unavailable {
                    target: target.clone(),
                    reason: UnavailableReason::Failed {
                        step: ProbeStep::OpenSession,
                        cause: e,
                    },
                };
            }
        };

        match self.inspect(session.as_mut(), target).await {
            Ok(controls) => match ClaimControls::new(controls) {
                Some(claims) => {
                    info!("Found {} available sites at {}", claims.count(), target);
                    ProbeOutcome::Available(AvailableSite {
                        target: target.clone(),
                        session,
                        claims,
                    })
                }
                None => {
                    info!("No sites available at {}", target);
                    release(session, target).await;
                    ProbeOutcome::Unavailable {
                        target: target.clone(),
                        reason: UnavailableReason::NoInventory,
                    }
                }
            },
            Err((step, cause)) => {
                warn!("Probe of {} failed at {}: {}", target, step, cause);
                release(session, target).await;
                ProbeOutcome::Unavailable {
                    target: target.clone(),
                    reason: UnavailableReason::Failed { step, cause },
                }
            }
        }
    }

    async fn inspect(
        &self,
        session: &mut dyn PageSession,
        target: &Target,
    ) -> StepResult<Vec<Box<dyn ElementHandle>>> {
        let selectors = self.settings.selectors.as_ref();
        let timeouts = self.settings.timeouts;

        session
            .attach_filter(self.settings.filter.clone())
            .await
            .map_err(|e| (ProbeStep::AttachFilter, e))?;

        session
            .navigate(&target.url)
            .await
            .map_err(|e| (ProbeStep::Navigate, e))?;

        self.dismiss_modal(session)
            .await
            .map_err(|e| (ProbeStep::DismissModal, e))?;

        let list_view = wait_for_element(session, &selectors.list_view, timeouts.element)
            .await
            .map_err(|e| (ProbeStep::ListView, e))?;
        list_view
            .click()
            .await
            .map_err(|e| (ProbeStep::ListView, e))?;

        self.set_dates(session)
            .await
            .map_err(|e| (ProbeStep::SetDates, e))?;

        session
            .wait_for(&WaitCondition::NetworkIdle, timeouts.settle)
            .await
            .map_err(|e| (ProbeStep::CollectAvailability, e))?;

        session
            .find_all(&selectors.claim_control)
            .await
            .map_err(|e| (ProbeStep::CollectAvailability, e))
    }

    async fn dismiss_modal(&self, session: &dyn PageSession) -> Result<(), PageError> {
        if let Some(button) = session
            .find_element(&self.settings.selectors.close_modal)
            .await?
        {
            debug!("Closing interstitial modal");
            button.click().await?;
        }
        Ok(())
    }

    async fn set_dates(&self, session: &dyn PageSession) -> Result<(), PageError> {
        let selectors = self.settings.selectors.as_ref();
        let window = self.settings.window;
        let start = window.start().format(&selectors.date_format).to_string();
        let end = window.end().format(&selectors.date_format).to_string();

        // Both inputs must exist before either is touched.
        let start_field = require_element(session, &selectors.start_date).await?;
        let end_field = require_element(session, &selectors.end_date).await?;

        fill(start_field.as_ref(), &start).await?;
        sleep(self.settings.timeouts.date_entry_pause).await;
        fill(end_field.as_ref(), &end).await
    }
}

async fn release(session: Box<dyn PageSession>, target: &Target) {
    if let Err(e) = session.close().await {
        warn!("Failed to close session for {}: {}", target, e);
    }
}
