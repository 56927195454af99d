// # DNS Querier Trait
//
// Defines the interface for asking one labeled source what it currently
// serves for a name and type.
//
// ## Implementations
//
// - Explicit nameserver: `zonemigrate-query-hickory` crate
// - Public JSON-over-HTTPS resolver: `zonemigrate-query-doh` crate
//
// ## Usage
//
// ```rust,ignore
// use zonemigrate_core::{DnsQuerier, RecordType};
//
// let answers = querier.query("www.example.com", RecordType::A).await?;
// for answer in answers {
//     println!("{} {} {}", answer.name, answer.ttl, answer.data);
// }
// ```

use crate::record::RecordType;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A labeled origin of live DNS data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySource {
    /// Stable id recorded in `CanonicalRecord::sources`
    pub id: String,
    /// Human-readable label used in progress reporting
    pub label: String,
    /// Nameserver to pin queries to; `None` means the public resolver
    #[serde(default)]
    pub hostname: Option<String>,
}

impl QuerySource {
    /// Source pinned to an explicit nameserver (empty hostname = public resolver)
    pub fn new(id: impl Into<String>, label: impl Into<String>, hostname: impl Into<String>) -> Self {
        let hostname = hostname.into();
        Self {
            id: id.into(),
            label: label.into(),
            hostname: if hostname.trim().is_empty() {
                None
            } else {
                Some(hostname.trim().to_string())
            },
        }
    }

    /// Source answered by the public recursive resolver
    pub fn public(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(id, label, "")
    }

    pub fn is_public_resolver(&self) -> bool {
        self.hostname.is_none()
    }
}

/// One resource record in a query answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsAnswer {
    /// Owner name as returned (absolute, trailing dot optional)
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub ttl: u32,
    /// Value in zone presentation form (TXT quoted, MX "prio host", ...)
    pub data: String,
}

/// Trait for DNS querier implementations
///
/// A querier answers for exactly one source. A name or type with no data
/// (NXDOMAIN, NODATA) is `Ok(vec![])`; transport failures and timeouts are
/// errors, which the aggregator folds into "no data" for that query.
#[async_trait]
pub trait DnsQuerier: Send + Sync {
    /// Query one name for one record type
    async fn query(
        &self,
        fqdn: &str,
        record_type: RecordType,
    ) -> Result<Vec<DnsAnswer>, crate::Error>;

    /// Whether queries hit a live nameserver that should be paced
    fn is_live_nameserver(&self) -> bool;

    /// Get the querier name (for logging/debugging)
    fn querier_name(&self) -> &'static str;
}

/// Helper trait for constructing queriers for a source
pub trait DnsQuerierFactory: Send + Sync {
    /// Create a DnsQuerier that answers for `source`
    fn create(&self, source: &QuerySource) -> Result<Box<dyn DnsQuerier>, crate::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_hostname_is_public_resolver() {
        assert!(QuerySource::new("g", "Google", "  ").is_public_resolver());
        assert!(QuerySource::public("g", "Google").is_public_resolver());

        let pinned = QuerySource::new("old", "Old NS", " ns1.old.net ");
        assert_eq!(pinned.hostname.as_deref(), Some("ns1.old.net"));
    }
}
