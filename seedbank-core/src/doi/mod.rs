//! DOI registration service boundary.
//!
//! The lifecycle operations only need the four operations of
//! [`DoiService`]; the HTTP implementation with its signed requests lives
//! in [`client`].

pub mod citation;
pub mod client;
pub mod metadata;

use crate::error::Result;
use crate::model::Doi;
use async_trait::async_trait;

/// Registration state of a DOI at the external service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoiStatus {
    Reserved,
    Registered,
    Deleted,
}

#[async_trait]
pub trait DoiService: Send + Sync {
    /// Request a new DOI, or confirm an already-supplied one, for the
    /// given rendered metadata document.
    async fn register(
        &self,
        metadata: &str,
        user: &str,
        existing: Option<&Doi>,
    ) -> Result<Doi>;

    /// Update the descriptive metadata of an existing DOI. The DOI value
    /// itself never changes.
    async fn update(&self, metadata: &str, user: &str, doi: &Doi) -> Result<()>;

    /// Deregister a DOI. Callers treat failures here as best-effort during
    /// package delete.
    async fn delete(&self, doi: &Doi) -> Result<()>;

    /// Current registration status; `None` when the service has never seen
    /// the DOI. Used by health checks.
    async fn get(&self, doi: &Doi) -> Result<Option<DoiStatus>>;
}

pub use citation::render_citation;
pub use client::{HttpDoiService, HttpDoiServiceConfig};
pub use metadata::render_metadata;
