//! Plugin-based provider registry
//!
//! The registry allows target providers and DNS queriers to be registered
//! dynamically at runtime, avoiding hardcoded if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use zonemigrate_core::registry::ProviderRegistry;
//! use zonemigrate_core::config::ProviderConfig;
//!
//! // Create a registry
//! let registry = ProviderRegistry::new();
//!
//! // Register plugins
//! zonemigrate_provider_constellix::register(&registry);
//! zonemigrate_query_hickory::register(&registry);
//! zonemigrate_query_doh::register(&registry);
//!
//! // Create provider from config
//! let config = ProviderConfig::Constellix { ... };
//! let provider = registry.create_provider(&config)?;
//! ```
//!
//! ## Querier Selection
//!
//! A source with a hostname is answered by the [`NAMESERVER_QUERIER`]
//! factory, a source without one by the [`PUBLIC_RESOLVER_QUERIER`]
//! factory. [`ProviderRegistry::querier_factory`] wraps that choice as a
//! single [`DnsQuerierFactory`] the aggregator can use.

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::traits::{DnsQuerier, DnsQuerierFactory, QuerySource, TargetProvider, TargetProviderFactory};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Querier kind for sources pinned to an explicit nameserver
pub const NAMESERVER_QUERIER: &str = "nameserver";

/// Querier kind for sources answered by the public resolver
pub const PUBLIC_RESOLVER_QUERIER: &str = "public";

type ProviderMap = HashMap<String, Arc<dyn TargetProviderFactory>>;
type QuerierMap = HashMap<String, Arc<dyn DnsQuerierFactory>>;

/// Provider registry for plugin-based provider and querier creation
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct ProviderRegistry {
    /// Registered target provider factories
    providers: RwLock<ProviderMap>,

    /// Registered DNS querier factories, by querier kind
    queriers: RwLock<QuerierMap>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a target provider factory
    ///
    /// # Parameters
    ///
    /// - `name`: Provider type name (e.g., "constellix")
    /// - `factory`: Factory object for creating provider instances
    pub fn register_provider(&self, name: impl Into<String>, factory: Box<dyn TargetProviderFactory>) {
        self.providers_mut().insert(name.into(), Arc::from(factory));
    }

    /// Register a DNS querier factory
    ///
    /// # Parameters
    ///
    /// - `kind`: [`NAMESERVER_QUERIER`] or [`PUBLIC_RESOLVER_QUERIER`]
    /// - `factory`: Factory object for creating querier instances
    pub fn register_querier(&self, kind: impl Into<String>, factory: Box<dyn DnsQuerierFactory>) {
        self.queriers_mut().insert(kind.into(), Arc::from(factory));
    }

    /// Create a target provider from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn TargetProvider>)`: Created provider instance
    /// - `Err(Error)`: If provider type is not registered or creation fails
    pub fn create_provider(&self, config: &ProviderConfig) -> Result<Box<dyn TargetProvider>> {
        let provider_type = config.type_name();
        let factory = self
            .providers()
            .get(provider_type)
            .cloned()
            .ok_or_else(|| Error::config(format!("Unknown provider type: {}", provider_type)))?;

        factory.create(config)
    }

    /// Create a DNS querier for a source
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn DnsQuerier>)`: Querier answering for `source`
    /// - `Err(Error)`: If no querier of the needed kind is registered
    pub fn create_querier(&self, source: &QuerySource) -> Result<Box<dyn DnsQuerier>> {
        let kind = querier_kind(source);
        let factory = self
            .queriers()
            .get(kind)
            .cloned()
            .ok_or_else(|| Error::config(format!("No '{}' querier registered", kind)))?;

        factory.create(source)
    }

    /// Snapshot of the registered queriers as one factory
    pub fn querier_factory(&self) -> Arc<dyn DnsQuerierFactory> {
        Arc::new(RegisteredQueriers {
            queriers: self.queriers().clone(),
        })
    }

    /// List all registered provider types
    pub fn list_providers(&self) -> Vec<String> {
        self.providers().keys().cloned().collect()
    }

    /// List all registered querier kinds
    pub fn list_queriers(&self) -> Vec<String> {
        self.queriers().keys().cloned().collect()
    }

    /// Check if a provider type is registered
    pub fn has_provider(&self, name: &str) -> bool {
        self.providers().contains_key(name)
    }

    /// Check if a querier kind is registered
    pub fn has_querier(&self, kind: &str) -> bool {
        self.queriers().contains_key(kind)
    }

    // Map inserts are single operations, so a poisoned lock holds no partial state
    fn providers(&self) -> RwLockReadGuard<'_, ProviderMap> {
        self.providers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn providers_mut(&self) -> RwLockWriteGuard<'_, ProviderMap> {
        self.providers.write().unwrap_or_else(|e| e.into_inner())
    }

    fn queriers(&self) -> RwLockReadGuard<'_, QuerierMap> {
        self.queriers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn queriers_mut(&self) -> RwLockWriteGuard<'_, QuerierMap> {
        self.queriers.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn querier_kind(source: &QuerySource) -> &'static str {
    if source.is_public_resolver() {
        PUBLIC_RESOLVER_QUERIER
    } else {
        NAMESERVER_QUERIER
    }
}

struct RegisteredQueriers {
    queriers: QuerierMap,
}

impl DnsQuerierFactory for RegisteredQueriers {
    fn create(&self, source: &QuerySource) -> Result<Box<dyn DnsQuerier>> {
        let kind = querier_kind(source);
        self.queriers
            .get(kind)
            .ok_or_else(|| Error::config(format!("No '{}' querier registered", kind)))?
            .create(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockProviderFactory;

    impl TargetProviderFactory for MockProviderFactory {
        fn create(&self, _config: &ProviderConfig) -> Result<Box<dyn TargetProvider>> {
            Err(Error::not_found("Mock provider not implemented"))
        }
    }

    struct MockQuerierFactory;

    impl DnsQuerierFactory for MockQuerierFactory {
        fn create(&self, _source: &QuerySource) -> Result<Box<dyn DnsQuerier>> {
            Err(Error::not_found("Mock querier not implemented"))
        }
    }

    #[test]
    fn test_registry_registration() {
        let registry = ProviderRegistry::new();

        assert!(!registry.has_provider("mock"));
        registry.register_provider("mock", Box::new(MockProviderFactory));
        assert!(registry.has_provider("mock"));
        assert!(registry.list_providers().contains(&"mock".to_string()));
    }

    #[test]
    fn test_unknown_provider_is_config_error() {
        let registry = ProviderRegistry::new();
        let result = registry.create_provider(&ProviderConfig::default());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_querier_kind_follows_hostname() {
        let registry = ProviderRegistry::new();
        registry.register_querier(NAMESERVER_QUERIER, Box::new(MockQuerierFactory));

        let pinned = QuerySource::new("old", "Old", "ns1.old.net");
        let public = QuerySource::public("pub", "Public");

        assert!(matches!(registry.create_querier(&pinned), Err(Error::NotFound(_))));
        assert!(matches!(registry.create_querier(&public), Err(Error::Config(_))));

        let factory = registry.querier_factory();
        assert!(matches!(factory.create(&public), Err(Error::Config(_))));
    }
}
