//! Claim, sign-in, order details and payment for the winning listing.
//!
//! The transaction is a single forward pass over [`TransactionStage::ALL`].
//! A failed stage ends it; nothing is retried and nothing already submitted
//! to the site is undone.

use tracing::{debug, info, warn};

use crate::page::{
    PageError, PageSession, WaitCondition, fill, optional_element, require_element,
    wait_for_element,
};
use crate::profile::BookingProfile;
use crate::scan_types::*;
use crate::selectors::{SiteSelectors, StepTimeouts};

/// Drives the checkout flow on a session that already shows inventory.
pub struct BookingTransaction<'a> {
    profile: &'a BookingProfile,
    selectors: &'a SiteSelectors,
    timeouts: StepTimeouts,
}

impl<'a> BookingTransaction<'a> {
    /// Creates a transaction for one booking attempt.
    pub fn new(
        profile: &'a BookingProfile,
        selectors: &'a SiteSelectors,
        timeouts: StepTimeouts,
    ) -> Self {
        Self {
            profile,
            selectors,
            timeouts,
        }
    }

    /// Runs every stage in order against `site`.
    ///
    /// Takes the site mutably so a second transaction cannot drive the same
    /// session concurrently.
    pub async fn execute(&self, site: &mut AvailableSite) -> TransactionResult {
        info!(
            "Booking {} ({} sites available)",
            site.target,
            site.claims.count()
        );

        for stage in TransactionStage::ALL {
            debug!("{}: entering {}", site.target, stage);
            if let Err(cause) = self.run_stage(stage, site).await {
                warn!("Booking {} failed at {}: {}", site.target, stage, cause);
                return TransactionResult::Failed { stage, cause };
            }
        }

        info!("Booking {} completed", site.target);
        TransactionResult::Success
    }

    async fn run_stage(
        &self,
        stage: TransactionStage,
        site: &mut AvailableSite,
    ) -> Result<(), PageError> {
        match stage {
            TransactionStage::Claim => self.claim(site).await,
            TransactionStage::Authenticate => self.authenticate(site.session.as_ref()).await,
            TransactionStage::FillDetails => self.fill_details(site.session.as_ref()).await,
            TransactionStage::Checkout => self.checkout(site.session.as_ref()).await,
        }
    }

    async fn claim(&self, site: &AvailableSite) -> Result<(), PageError> {
        site.claims.primary().click().await?;

        if let Some(prompt) = optional_element(
            site.session.as_ref(),
            &self.selectors.proceed_prompt,
            self.timeouts.prompt,
        )
        .await?
        {
            debug!("Dismissing proceed prompt");
            prompt.click().await?;
        }
        Ok(())
    }

    async fn authenticate(&self, session: &dyn PageSession) -> Result<(), PageError> {
        let selectors = self.selectors;
        let credentials = &self.profile.credentials;

        let sign_in =
            wait_for_element(session, &selectors.sign_in_button, self.timeouts.element).await?;
        let email = require_element(session, &selectors.email_field).await?;
        let password = require_element(session, &selectors.password_field).await?;

        fill(email.as_ref(), &credentials.username).await?;
        fill(password.as_ref(), &credentials.password).await?;

        session
            .click_and_wait(
                sign_in.as_ref(),
                &WaitCondition::Navigation,
                self.timeouts.navigation,
            )
            .await
    }

    async fn fill_details(&self, session: &dyn PageSession) -> Result<(), PageError> {
        let selectors = self.selectors;
        let order = &self.profile.order;

        session
            .wait_for(&WaitCondition::NetworkIdle, self.timeouts.settle)
            .await?;

        // Every field must resolve before the form is touched.
        let party_size = require_element(session, &selectors.party_size_field).await?;
        let equipment = require_element(session, &selectors.equipment_option).await?;
        let vehicles = require_element(session, &selectors.vehicle_count_field).await?;
        let acknowledgment = require_element(session, &selectors.acknowledgment).await?;
        let submit = require_element(session, &selectors.details_submit).await?;

        party_size.type_text(&order.party_size.to_string()).await?;
        equipment.click().await?;
        vehicles.type_text(&order.vehicle_count.to_string()).await?;
        acknowledgment.click().await?;

        session
            .click_and_wait(
                submit.as_ref(),
                &WaitCondition::Navigation,
                self.timeouts.navigation,
            )
            .await
    }

    async fn checkout(&self, session: &dyn PageSession) -> Result<(), PageError> {
        let selectors = self.selectors;
        let payment = &self.profile.payment;

        let checkout =
            wait_for_element(session, &selectors.checkout_button, self.timeouts.element).await?;
        session
            .click_and_wait(
                checkout.as_ref(),
                &WaitCondition::Navigation,
                self.timeouts.navigation,
            )
            .await?;

        let name =
            wait_for_element(session, &selectors.cardholder_name_field, self.timeouts.settle)
                .await?;
        let number = require_element(session, &selectors.card_number_field).await?;
        let security_code = require_element(session, &selectors.security_code_field).await?;
        let next = require_element(session, &selectors.payment_next_button).await?;

        fill(name.as_ref(), &payment.cardholder_name).await?;
        fill(number.as_ref(), &payment.card_number).await?;
        session
            .select_option(&selectors.expiry_month_select, &payment.expiry_month)
            .await?;
        session
            .select_option(&selectors.expiry_year_select, &payment.expiry_year)
            .await?;
        fill(security_code.as_ref(), &payment.security_code).await?;
        session
            .click_and_wait(next.as_ref(), &WaitCondition::NetworkIdle, self.timeouts.settle)
            .await?;

        let confirm =
            wait_for_element(session, &selectors.confirm_button, self.timeouts.element).await?;
        session
            .click_and_wait(
                confirm.as_ref(),
                &WaitCondition::Navigation,
                self.timeouts.navigation,
            )
            .await
    }
}
