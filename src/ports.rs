use crate::domain::Coordinates;
use crate::error::Result;
use async_trait::async_trait;

/// Narrow contract for the external geocoding collaborator.
///
/// `Ok(None)` means the provider answered but had no acceptable candidate;
/// `Err` covers transport and provider failures. Callers decide what a
/// failure means — the cache manager downgrades both to unknown coordinates
/// rather than aborting a batch.
#[async_trait]
pub trait GeocoderPort: Send + Sync {
    async fn lookup(&self, address: &str) -> Result<Option<Coordinates>>;
}
