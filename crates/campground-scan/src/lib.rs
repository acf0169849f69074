//! # Campground Scan
//!
//! This crate scans campground listings for bookable sites and books the first
//! one found. Each configured listing is probed concurrently in its own browser
//! session; the earliest-configured listing with inventory wins and goes
//! through a single claim, sign-in, order-details and checkout pass.

/// Browsing capability traits and wait helpers
pub mod page;
pub use page::*;

/// Outbound request filtering
mod request_filter;
pub use request_filter::*;

/// Types for campground scan operations
mod scan_types;
pub use scan_types::*;

/// Site selectors and wait limits
mod selectors;
pub use selectors::*;

/// Account, payment and order details
mod profile;
pub use profile::*;

/// Single-target availability probe
mod probe;
pub use probe::*;

/// Concurrent probing and winner selection
mod orchestrator;
pub use orchestrator::*;

/// Booking state machine
mod booking;
pub use booking::*;

/// Scan-and-book runs and the polling loop
mod executor;
pub use executor::*;

/// Chromium-backed browsing engine
mod session_manager;
pub use session_manager::*;

#[cfg(test)]
mod fake_page;
