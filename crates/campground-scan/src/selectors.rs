use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Selectors for every control the probe and the booking flow touch.
///
/// Each entry is CSS or an accessible-name query (see [`AriaQuery`](crate::AriaQuery)).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteSelectors {
    /// Interstitial close button (optional on the page).
    pub close_modal: String,
    /// Button switching to the campsite list view.
    pub list_view: String,
    /// Check-in date input.
    pub start_date: String,
    /// Check-out date input.
    pub end_date: String,
    /// Availability marker on bookable rows.
    pub claim_control: String,
    /// Proceed button of the prompt shown after claiming (optional on the page).
    pub proceed_prompt: String,
    /// Sign-in submit button.
    pub sign_in_button: String,
    /// Sign-in email input.
    pub email_field: String,
    /// Sign-in password input.
    pub password_field: String,
    /// Party size input.
    pub party_size_field: String,
    /// Equipment choice.
    pub equipment_option: String,
    /// Vehicle count input.
    pub vehicle_count_field: String,
    /// Mandatory acknowledgment checkbox.
    pub acknowledgment: String,
    /// Order-details submit button.
    pub details_submit: String,
    /// Cart checkout button.
    pub checkout_button: String,
    /// Cardholder name input.
    pub cardholder_name_field: String,
    /// Card number input.
    pub card_number_field: String,
    /// Expiry month select.
    pub expiry_month_select: String,
    /// Expiry year select.
    pub expiry_year_select: String,
    /// Security code input.
    pub security_code_field: String,
    /// Payment "next" button.
    pub payment_next_button: String,
    /// Final confirmation button.
    pub confirm_button: String,
    /// strftime format the date inputs expect.
    pub date_format: String,
}

/// Limits for every explicit wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepTimeouts {
    /// Waiting for a control to appear.
    pub element: Duration,
    /// Waiting for network settlement.
    pub settle: Duration,
    /// Waiting for a navigation to finish.
    pub navigation: Duration,
    /// Waiting for optional prompts.
    pub prompt: Duration,
    /// Pause between typing the check-in and check-out dates.
    pub date_entry_pause: Duration,
}

impl Default for StepTimeouts {
    fn default() -> Self {
        Self {
            element: Duration::from_secs(4),
            settle: Duration::from_secs(5),
            navigation: Duration::from_secs(30),
            prompt: Duration::from_secs(2),
            date_entry_pause: Duration::from_secs(1),
        }
    }
}
