// # Target Provider Trait
//
// Defines the interface for reading and writing records at the DNS provider
// a zone is being migrated to.
//
// ## Implementations
//
// - Constellix: `zonemigrate-provider-constellix` crate
//
// ## Usage
//
// ```rust,ignore
// use zonemigrate_core::TargetProvider;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let provider = /* TargetProvider implementation */;
//
//     let domain = provider.ensure_domain("example.com").await?;
//     let existing = provider.list_records(&domain).await?;
//     println!("{} record(s) already at the target", existing.len());
//
//     Ok(())
// }
// ```

use crate::mapper::ProviderWriteOp;
use crate::record::{ProviderRecord, RecordType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A domain as known to the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainHandle {
    /// Provider-assigned domain id
    pub id: String,
    /// Domain name without a trailing dot
    pub name: String,
}

/// Trait for target provider implementations
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Trust Level: Untrusted
///
/// Providers are isolated, stateless, single-shot API clients:
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/HTTPS API calls to their endpoints only
/// - ✅ Parse provider-specific responses
/// - ✅ Fall back from a failed domain create to a list-and-match lookup
///
/// ## Forbidden Capabilities
/// - ❌ Retry, back off or pace requests (owned by `Executor`)
/// - ❌ Spawn tasks or threads
/// - ❌ Decide what to change (owned by the plan synthesizer)
///
/// An HTTP 429 must be reported as [`crate::Error::RateLimited`] so the
/// executor can apply its backoff policy.
#[async_trait]
pub trait TargetProvider: Send + Sync {
    /// Look up an existing domain by name
    ///
    /// # Returns
    ///
    /// - `Ok(Some(DomainHandle))`: The domain exists
    /// - `Ok(None)`: The provider has no such domain
    /// - `Err(Error)`: If the lookup failed
    async fn find_domain(&self, domain: &str) -> Result<Option<DomainHandle>, crate::Error>;

    /// Create a domain, or resolve it if it already exists
    ///
    /// A create rejected because the domain exists (409/400) is resolved
    /// through [`TargetProvider::find_domain`].
    async fn ensure_domain(&self, domain: &str) -> Result<DomainHandle, crate::Error>;

    /// Fetch every record of a domain, in the provider's order
    async fn list_records(&self, domain: &DomainHandle)
    -> Result<Vec<ProviderRecord>, crate::Error>;

    /// Create a record (or round-robin set)
    ///
    /// # Returns
    ///
    /// The provider-assigned id of the new record
    async fn create_record(
        &self,
        domain: &DomainHandle,
        op: &ProviderWriteOp,
    ) -> Result<String, crate::Error>;

    /// Replace an existing record with the given write
    async fn update_record(
        &self,
        domain: &DomainHandle,
        record_id: &str,
        op: &ProviderWriteOp,
    ) -> Result<(), crate::Error>;

    /// Delete an existing record
    async fn delete_record(
        &self,
        domain: &DomainHandle,
        record_type: RecordType,
        record_id: &str,
    ) -> Result<(), crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing target providers from configuration
pub trait TargetProviderFactory: Send + Sync {
    /// Create a TargetProvider instance from configuration
    fn create(
        &self,
        config: &crate::config::ProviderConfig,
    ) -> Result<Box<dyn TargetProvider>, crate::Error>;
}
