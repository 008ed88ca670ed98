//! Remote sources of booked appointments.
//!
//! The cache only sees the [`RemoteAppointmentSource`] trait, so tests can
//! drive it with a scripted source instead of a live backend. Sources make a
//! single attempt per call; retrying is the cache's job.

pub mod http;
#[cfg(test)]
pub(crate) mod scripted;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::models::appointment::AppointmentSnapshot;

pub use http::HttpAppointmentSource;

/// Authoritative list of the current user's booked appointments.
#[async_trait]
pub trait RemoteAppointmentSource: Send + Sync {
    async fn fetch(&self) -> Result<AppointmentSnapshot, FetchError>;
}
