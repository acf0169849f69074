use serde::{Deserialize, Serialize};

/// Errors raised while delivering a notification.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    /// Simple email service (SES) errors.
    #[error("AWS SES error: {0}")]
    SesError(String),

    /// Simple notification service (SNS) errors.
    #[error("AWS SNS error: {0}")]
    SnsError(String),

    /// HTTP push endpoint errors.
    #[error("Push error: {0}")]
    PushError(String),

    /// Invalid phone number format.
    #[error("Invalid phone number format")]
    InvalidPhoneNumber,

    /// Channel is misconfigured.
    #[error("Notification configuration error: {0}")]
    Config(String),
}

/// How loudly a notification should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    /// Informational, e.g. an empty scan.
    Low,
    /// Default delivery.
    #[default]
    Normal,
    /// Needs attention now (booked, or failed mid-purchase).
    High,
}

impl Urgency {
    /// Lowercase tag used in logs and push headers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Normal => "normal",
            Urgency::High => "high",
        }
    }

    /// Numeric priority on the ntfy 1..=5 scale.
    pub fn priority(&self) -> u8 {
        match self {
            Urgency::Low => 2,
            Urgency::Normal => 3,
            Urgency::High => 5,
        }
    }
}

/// A terminal message handed to a notification channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Short headline.
    pub title: String,
    /// Message body.
    pub body: String,
    /// Delivery urgency.
    pub urgency: Urgency,
    /// Free-form tags, forwarded to channels that support them.
    pub tags: Vec<String>,
}

impl Notification {
    /// Creates a notification without tags.
    pub fn new(title: impl Into<String>, body: impl Into<String>, urgency: Urgency) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            urgency,
            tags: Vec::new(),
        }
    }

    /// Adds a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Single-line rendering for SMS-sized channels.
    pub fn sms_text(&self) -> String {
        let text = format!("{}: {}", self.title, self.body.replace('\n', " "));
        // SNS rejects SMS bodies above 1600 characters.
        text.chars().take(1600).collect()
    }
}

/// Destination of an SNS publish call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnsTarget {
    /// Topic fan-out.
    Topic(String),
    /// Direct SMS to an E.164 number.
    Phone(String),
}

impl SnsTarget {
    /// Parses a topic ARN or a phone number.
    pub fn parse(raw: &str) -> Result<Self, NotificationError> {
        let raw = raw.trim();
        if raw.starts_with("arn:") {
            return Ok(SnsTarget::Topic(raw.to_string()));
        }
        format_e164(raw).map(SnsTarget::Phone)
    }
}

/// Formats a phone number as E.164, keeping a leading `+` and dropping separators.
pub fn format_e164(phone: &str) -> Result<String, NotificationError> {
    let digits: String = phone
        .chars()
        .filter(|c| !matches!(c, '(' | ')' | '-' | ' ' | '.' | '+'))
        .collect();

    if digits.len() < 8 || digits.len() > 15 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(NotificationError::InvalidPhoneNumber);
    }

    Ok(format!("+{}", digits))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_e164() {
        assert_eq!(format_e164("+1 (555) 123-4567").unwrap(), "+15551234567");
        assert_eq!(format_e164("1.555.123.4567").unwrap(), "+15551234567");
        assert!(matches!(
            format_e164("12ab"),
            Err(NotificationError::InvalidPhoneNumber)
        ));
    }

    #[test]
    fn test_sns_target_parse() {
        assert_eq!(
            SnsTarget::parse("arn:aws:sns:us-west-2:123456789012:bookings").unwrap(),
            SnsTarget::Topic("arn:aws:sns:us-west-2:123456789012:bookings".to_string())
        );
        assert_eq!(
            SnsTarget::parse("15551234567").unwrap(),
            SnsTarget::Phone("+15551234567".to_string())
        );
    }

    #[test]
    fn test_sms_text_is_single_line() {
        let notification = Notification::new("Booked", "Upper Pines\n06/01 - 06/03", Urgency::High);
        assert_eq!(notification.sms_text(), "Booked: Upper Pines 06/01 - 06/03");
        assert_eq!(notification.urgency.priority(), 5);
    }
}
