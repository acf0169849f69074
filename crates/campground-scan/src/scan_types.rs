use std::fmt;

use chrono::NaiveDate;
use notification_services::{Notification, Urgency};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::page::{ElementHandle, PageError, PageSession};

/// One probeable campground listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Display name, e.g. `Upper Pines`.
    pub name: String,
    /// Listing URL the probe navigates to.
    pub url: String,
}

impl Target {
    /// Creates a target.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Check-in and check-out dates shared by every probe of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateWindow {
    /// Creates a window; check-out must be after check-in.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ScanError> {
        if end <= start {
            return Err(ScanError::InvalidDateRange);
        }
        Ok(Self { start, end })
    }

    /// Check-in date.
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Check-out date.
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of nights in the window.
    pub fn nights(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}",
            self.start.format("%m/%d/%Y"),
            self.end.format("%m/%d/%Y")
        )
    }
}

/// Ordered claim controls of an available listing. Never empty.
pub struct ClaimControls(Vec<Box<dyn ElementHandle>>);

impl ClaimControls {
    /// Wraps the collected controls, or `None` when nothing is bookable.
    pub fn new(controls: Vec<Box<dyn ElementHandle>>) -> Option<Self> {
        if controls.is_empty() {
            None
        } else {
            Some(Self(controls))
        }
    }

    /// The designated claim action.
    pub fn primary(&self) -> &dyn ElementHandle {
        self.0[0].as_ref()
    }

    /// Number of bookable controls found.
    pub fn count(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Debug for ClaimControls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ClaimControls").field(&self.0.len()).finish()
    }
}

/// A target that showed inventory, together with the session that found it.
///
/// Owns the session until it is released or handed to a booking transaction.
pub struct AvailableSite {
    /// The listing.
    pub target: Target,
    /// Session still sitting on the listing page.
    pub session: Box<dyn PageSession>,
    /// Bookable controls on that page.
    pub claims: ClaimControls,
}

impl AvailableSite {
    /// Closes the session. Close failures are logged and swallowed.
    pub async fn release(self) {
        if let Err(e) = self.session.close().await {
            warn!("Failed to close session for {}: {}", self.target, e);
        }
    }
}

impl fmt::Debug for AvailableSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AvailableSite")
            .field("target", &self.target)
            .field("claims", &self.claims)
            .finish_non_exhaustive()
    }
}

/// Steps of an availability probe, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProbeStep {
    /// Acquire a session.
    OpenSession,
    /// Install the request filter.
    AttachFilter,
    /// Load the listing.
    Navigate,
    /// Close the interstitial modal.
    DismissModal,
    /// Switch to the campsite list view.
    ListView,
    /// Enter the date window.
    SetDates,
    /// Collect claim controls.
    CollectAvailability,
}

impl fmt::Display for ProbeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProbeStep::OpenSession => "open_session",
            ProbeStep::AttachFilter => "attach_filter",
            ProbeStep::Navigate => "navigate",
            ProbeStep::DismissModal => "dismiss_modal",
            ProbeStep::ListView => "list_view",
            ProbeStep::SetDates => "set_dates",
            ProbeStep::CollectAvailability => "collect_availability",
        };
        f.write_str(name)
    }
}

/// Why a probe produced no bookable listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnavailableReason {
    /// The list loaded and had no claim controls.
    NoInventory,
    /// A step failed; the probe gave up for this cycle.
    Failed {
        /// Failing step.
        step: ProbeStep,
        /// Underlying error.
        cause: PageError,
    },
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnavailableReason::NoInventory => f.write_str("no sites available"),
            UnavailableReason::Failed { step, cause } => write!(f, "{} failed: {}", step, cause),
        }
    }
}

/// Result of probing one target.
#[derive(Debug)]
pub enum ProbeOutcome {
    /// Inventory found; the session stays open.
    Available(AvailableSite),
    /// Nothing bookable; the session was released.
    Unavailable {
        /// The listing.
        target: Target,
        /// Why.
        reason: UnavailableReason,
    },
}

impl ProbeOutcome {
    /// Target this outcome belongs to.
    pub fn target(&self) -> &Target {
        match self {
            ProbeOutcome::Available(site) => &site.target,
            ProbeOutcome::Unavailable { target, .. } => target,
        }
    }

    /// Whether the probe found inventory.
    pub fn is_available(&self) -> bool {
        matches!(self, ProbeOutcome::Available(_))
    }
}

/// Stages of a booking transaction, in their only legal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum TransactionStage {
    /// Click the claim control.
    Claim,
    /// Sign in.
    Authenticate,
    /// Fill order details.
    FillDetails,
    /// Pay and confirm.
    Checkout,
}

impl TransactionStage {
    /// Every stage in execution order.
    pub const ALL: [TransactionStage; 4] = [
        TransactionStage::Claim,
        TransactionStage::Authenticate,
        TransactionStage::FillDetails,
        TransactionStage::Checkout,
    ];
}

impl fmt::Display for TransactionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionStage::Claim => "claim",
            TransactionStage::Authenticate => "authenticate",
            TransactionStage::FillDetails => "fill_details",
            TransactionStage::Checkout => "checkout",
        };
        f.write_str(name)
    }
}

/// Terminal result of one booking transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionResult {
    /// Every stage completed.
    Success,
    /// A stage failed; later stages never ran.
    Failed {
        /// Failing stage.
        stage: TransactionStage,
        /// Underlying error.
        cause: PageError,
    },
}

/// Terminal state of one scan-and-book run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// No target showed inventory.
    NoInventory,
    /// The winner was booked.
    Booked {
        /// Booked listing.
        target: Target,
    },
    /// Booking the winner failed.
    BookingFailed {
        /// Attempted listing.
        target: Target,
        /// Failing stage.
        stage: TransactionStage,
        /// Underlying error.
        cause: PageError,
    },
}

impl RunOutcome {
    /// Whether a purchase was attempted. Attempts are never repeated automatically.
    pub fn is_booking_attempt(&self) -> bool {
        !matches!(self, RunOutcome::NoInventory)
    }

    /// Message describing this outcome.
    pub fn notification(&self, window: &DateWindow) -> Notification {
        match self {
            RunOutcome::NoInventory => Notification::new(
                "No campsites found",
                format!("No sites found across all grounds for {}.", window),
                Urgency::Low,
            )
            .with_tag("no_inventory"),
            RunOutcome::Booked { target } => Notification::new(
                format!("Booked {}", target.name),
                format!(
                    "🏕️ {} is booked for {} ({} nights).\n{}",
                    target.name,
                    window,
                    window.nights(),
                    target.url
                ),
                Urgency::High,
            )
            .with_tag("booked"),
            RunOutcome::BookingFailed {
                target,
                stage,
                cause,
            } => Notification::new(
                format!("Booking {} failed at {}", target.name, stage),
                format!(
                    "A site at {} was available for {} but booking stopped at the {} stage: {}.\n\
                     The cart may hold a partial reservation, check {}",
                    target.name, window, stage, cause, target.url
                ),
                Urgency::High,
            )
            .with_tag("booking_failed"),
        }
    }
}

/// Errors raised while assembling or launching a run.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Invalid date range
    #[error("Invalid date range: check-out date must be after check-in date")]
    InvalidDateRange,

    /// Campground not found
    #[error("Campground not found: {0}")]
    UnknownCampground(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    /// Browser launch error
    #[error("Browser error: {0}")]
    Browser(String),
}
