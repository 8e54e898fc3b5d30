//! attend-geo: Where is this machine?
//!
//! A hostel's location is captured once, as a free-text address, when the
//! warden registers a student. At attendance time the address is looked up
//! again and compared case-insensitively with the stored one.

pub mod error;
pub mod ip;

use std::future::Future;

pub use error::GeoError;
pub use ip::{IpLocator, DEFAULT_ENDPOINT};

/// A resolved location.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    /// "City, Region, Country" with empty parts left out.
    pub address: String,
    /// Public IP the lookup resolved, when known.
    pub ip: Option<String>,
    /// Latitude and longitude, when known.
    pub coordinates: Option<(f64, f64)>,
}

/// Source of the current location.
pub trait Locator {
    fn locate(&self) -> impl Future<Output = Result<Location, GeoError>> + Send;
}

/// A fixed, configured address. Used on machines without outbound access.
#[derive(Debug, Clone)]
pub struct FixedLocator {
    address: String,
}

impl FixedLocator {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

impl Locator for FixedLocator {
    async fn locate(&self) -> Result<Location, GeoError> {
        if self.address.is_empty() {
            return Err(GeoError::Incomplete);
        }
        Ok(Location {
            address: self.address.clone(),
            ip: None,
            coordinates: None,
        })
    }
}

/// Locator picked from configuration at startup.
#[derive(Debug, Clone)]
pub enum ConfiguredLocator {
    Ip(IpLocator),
    Fixed(FixedLocator),
}

impl Locator for ConfiguredLocator {
    async fn locate(&self) -> Result<Location, GeoError> {
        match self {
            ConfiguredLocator::Ip(l) => l.locate().await,
            ConfiguredLocator::Fixed(l) => l.locate().await,
        }
    }
}

/// Whether a freshly looked-up address matches the registered hostel address.
///
/// Comparison is case-insensitive and otherwise exact.
pub fn same_place(registered: &str, current: &str) -> bool {
    registered.to_lowercase() == current.to_lowercase()
}
