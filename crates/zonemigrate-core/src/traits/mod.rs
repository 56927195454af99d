//! Core traits for the migration engine
//!
//! This module defines the abstract interfaces that plugin crates implement.
//!
//! - [`TargetProvider`]: Read and write records at the migration target
//! - [`DnsQuerier`]: Answer live DNS queries for one labeled source

pub mod dns_querier;
pub mod target_provider;

pub use dns_querier::{DnsAnswer, DnsQuerier, DnsQuerierFactory, QuerySource};
pub use target_provider::{DomainHandle, TargetProvider, TargetProviderFactory};
