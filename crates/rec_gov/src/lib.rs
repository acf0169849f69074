//! # RecGov
//!
//! This crate knows the recreation.gov side of a scan: which campground ids
//! exist, how their listing URLs are built and which page controls the probe
//! and the booking flow drive.

/// Campground names, ids and listing URLs.
mod campgrounds;
pub use campgrounds::*;

/// Selector table for recreation.gov pages.
mod selectors;
pub use selectors::*;
