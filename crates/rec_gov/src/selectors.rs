use campground_scan::SiteSelectors;

/// Controls of the recreation.gov campground, cart and checkout pages.
pub fn recreation_gov_selectors() -> SiteSelectors {
    SiteSelectors {
        close_modal: r#"aria/Close modal[role="button"]"#.to_string(),
        list_view: "#tabs-panel-0 > div.sarsa-stack.md.campsite-list-tab.v2-tab > \
                    div.mb-2.grid-header-container > \
                    button.sarsa-button.sarsa-button-tertiary.sarsa-button-md"
            .to_string(),
        start_date: "#campground-start-date-calendar".to_string(),
        end_date: "#campground-end-date-calendar".to_string(),
        claim_control: ".list-map-book-now-button-tracker".to_string(),
        proceed_prompt: r#"button[aria-label="Proceed with Reservation"]"#.to_string(),
        sign_in_button: ".rec-acct-sign-in-btn".to_string(),
        email_field: "#email".to_string(),
        password_field: "#rec-acct-sign-in-password".to_string(),
        party_size_field: "aria/Number of people".to_string(),
        equipment_option: "label.rec-label-checkbox.equip-checkbox.mb-1".to_string(),
        vehicle_count_field: "aria/Number of Vehicles".to_string(),
        acknowledgment: "div.rec-form-check-wrap > label".to_string(),
        details_submit: "#action-bar-submit".to_string(),
        checkout_button: "div.cart-order-summary-actions > button.rec-button-primary-large"
            .to_string(),
        cardholder_name_field: r#"input[name="name"]"#.to_string(),
        card_number_field: r#"input[name="number"]"#.to_string(),
        expiry_month_select: r#"select[name="month"]"#.to_string(),
        expiry_year_select: r#"select[name="year"]"#.to_string(),
        security_code_field: r#"input[name="cvc"]"#.to_string(),
        payment_next_button: "#page-body > div > div > div:nth-child(1) > div:nth-child(2) > \
                              div.flex-col-md-8 > div > \
                              div.flex-col-sm-12.flex-col-lg-6.flex-col-xl-7 > button"
            .to_string(),
        confirm_button: ".sarsa-button.ml-1.sarsa-button-primary.sarsa-button-md".to_string(),
        date_format: "%m/%d/%Y".to_string(),
    }
}
