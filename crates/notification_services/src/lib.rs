//! # Notification Services
//!
//! This crate delivers terminal booking results to people.
//! It defines the [`Notifier`] capability and ships SNS, SES, HTTP push and log-only channels.

/// Notifier trait and channel implementations.
pub mod service;
/// Notification message and error types.
pub mod types;

pub use service::{FanoutNotifier, LogNotifier, Notifier, PushNotifier, SesNotifier, SnsNotifier};
pub use types::{Notification, NotificationError, SnsTarget, Urgency, format_e164};
