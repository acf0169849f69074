use std::fmt;

use serde::Deserialize;
use validator::{Validate, ValidationError};

/// Account credentials for the reservation site.
#[derive(Clone, Deserialize, Validate)]
pub struct Credentials {
    /// Sign-in email.
    #[validate(length(min = 1, message = "Account username is required"))]
    pub username: String,

    /// Sign-in password.
    #[validate(length(min = 1, message = "Account password is required"))]
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Card used at checkout.
#[derive(Clone, Deserialize, Validate)]
pub struct PaymentDetails {
    /// Name printed on the card.
    #[validate(length(min = 1, message = "Cardholder name is required"))]
    pub cardholder_name: String,

    /// Card number, spaces allowed.
    #[validate(custom(function = "validate_card_number"))]
    pub card_number: String,

    /// Value of the expiry month `<select>`.
    #[validate(custom(function = "validate_expiry_month"))]
    pub expiry_month: String,

    /// Value of the expiry year `<select>`.
    #[validate(custom(function = "validate_expiry_year"))]
    pub expiry_year: String,

    /// Card security code.
    #[validate(custom(function = "validate_security_code"))]
    pub security_code: String,
}

impl fmt::Debug for PaymentDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits: String = self
            .card_number
            .chars()
            .filter(char::is_ascii_digit)
            .collect();
        let last_four = &digits[digits.len().saturating_sub(4)..];

        f.debug_struct("PaymentDetails")
            .field("cardholder_name", &self.cardholder_name)
            .field("card_number", &format!("**** {}", last_four))
            .field("expiry_month", &self.expiry_month)
            .field("expiry_year", &self.expiry_year)
            .field("security_code", &"<redacted>")
            .finish()
    }
}

/// Order-detail form values.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct OrderDetails {
    /// Number of people in the party.
    #[validate(range(min = 1, max = 12, message = "Party size must be between 1 and 12"))]
    pub party_size: u32,

    /// Number of vehicles.
    #[validate(range(max = 4, message = "At most 4 vehicles are allowed"))]
    pub vehicle_count: u32,
}

impl Default for OrderDetails {
    fn default() -> Self {
        Self {
            party_size: 6,
            vehicle_count: 2,
        }
    }
}

/// Everything a booking transaction types into the site.
#[derive(Debug, Clone, Validate)]
pub struct BookingProfile {
    /// Sign-in credentials.
    #[validate(nested)]
    pub credentials: Credentials,

    /// Payment card.
    #[validate(nested)]
    pub payment: PaymentDetails,

    /// Order-detail values.
    #[validate(nested)]
    pub order: OrderDetails,
}

fn validate_card_number(card_number: &str) -> Result<(), ValidationError> {
    let digits: Vec<u32> = card_number
        .chars()
        .filter(|c| *c != ' ' && *c != '-')
        .map(|c| c.to_digit(10))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| ValidationError::new("invalid_card_number"))?;

    if !(12..=19).contains(&digits.len()) {
        return Err(ValidationError::new("invalid_card_number"));
    }

    // Luhn checksum
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                *d
            }
        })
        .sum();

    if sum % 10 == 0 {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_card_number"))
    }
}

fn validate_expiry_month(month: &str) -> Result<(), ValidationError> {
    match month.trim().parse::<u32>() {
        Ok(1..=12) => Ok(()),
        _ => Err(ValidationError::new("invalid_expiry_month")),
    }
}

fn validate_expiry_year(year: &str) -> Result<(), ValidationError> {
    let year = year.trim();
    if year.len() == 4 && year.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_expiry_year"))
    }
}

fn validate_security_code(code: &str) -> Result<(), ValidationError> {
    let code = code.trim();
    if (3..=4).contains(&code.len()) && code.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_security_code"))
    }
}
