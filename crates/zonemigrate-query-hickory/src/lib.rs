// # Nameserver DNS Querier
//
// This crate asks one explicit nameserver what it serves, through
// `hickory-resolver` with a single-server configuration.
//
// ## Behavior
//
// - The nameserver hostname is resolved once, on first query
// - Caching is disabled and every query makes a single attempt, so the
//   aggregator sees what the server answers right now
// - NXDOMAIN and NODATA are empty answers, not errors
// - Answers are returned in zone presentation form (TXT quoted, MX
//   "preference exchange", SRV "priority weight port target")
//
// ## Platform Support
//
// Any platform tokio supports. Queries go out over UDP with TCP fallback
// on port 53.

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::proto::rr::{RData, RecordType as WireType};
use std::time::Duration;
use tokio::sync::OnceCell;
use zonemigrate_core::registry::NAMESERVER_QUERIER;
use zonemigrate_core::traits::{DnsAnswer, DnsQuerier, DnsQuerierFactory, QuerySource};
use zonemigrate_core::{Error, ProviderRegistry, RecordType, Result};

/// DNS port
const DNS_PORT: u16 = 53;

/// Per-query timeout handed to the resolver
///
/// The aggregator applies its own deadline on top of this.
const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Querier pinned to one nameserver
pub struct HickoryQuerier {
    /// Nameserver hostname or IP address
    nameserver: String,

    /// Resolver, built on first use
    resolver: OnceCell<TokioAsyncResolver>,

    timeout: Duration,
}

impl HickoryQuerier {
    /// Create a querier for `nameserver` (hostname or IP address)
    pub fn new(nameserver: impl Into<String>) -> Self {
        Self {
            nameserver: nameserver.into().trim().trim_end_matches('.').to_string(),
            resolver: OnceCell::new(),
            timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// Override the resolver's per-query timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn nameserver(&self) -> &str {
        &self.nameserver
    }

    async fn resolver(&self) -> Result<&TokioAsyncResolver> {
        self.resolver
            .get_or_try_init(|| async {
                let ips: Vec<_> = tokio::net::lookup_host((self.nameserver.as_str(), DNS_PORT))
                    .await
                    .map_err(|e| {
                        Error::query(format!("Cannot resolve nameserver {}: {}", self.nameserver, e))
                    })?
                    .map(|addr| addr.ip())
                    .collect();

                if ips.is_empty() {
                    return Err(Error::query(format!(
                        "Nameserver {} has no address",
                        self.nameserver
                    )));
                }
                tracing::debug!("Pinning queries to {} ({:?})", self.nameserver, ips);

                let group = NameServerConfigGroup::from_ips_clear(&ips, DNS_PORT, true);
                let config = ResolverConfig::from_parts(None, vec![], group);

                let mut opts = ResolverOpts::default();
                opts.timeout = self.timeout;
                opts.attempts = 1;
                opts.cache_size = 0;

                Ok::<_, Error>(TokioAsyncResolver::tokio(config, opts))
            })
            .await
    }
}

#[async_trait]
impl DnsQuerier for HickoryQuerier {
    async fn query(&self, fqdn: &str, record_type: RecordType) -> Result<Vec<DnsAnswer>> {
        let resolver = self.resolver().await?;
        let name = format!("{}.", fqdn.trim_end_matches('.'));

        let lookup = match resolver
            .lookup(name.as_str(), WireType::from(record_type.code()))
            .await
        {
            Ok(lookup) => lookup,
            Err(e) => {
                return match e.kind() {
                    ResolveErrorKind::NoRecordsFound { .. } => {
                        tracing::debug!("{} {} @{}: no records", name, record_type, self.nameserver);
                        Ok(Vec::new())
                    }
                    ResolveErrorKind::Timeout => Err(Error::timeout(format!(
                        "{} {} @{}",
                        name, record_type, self.nameserver
                    ))),
                    _ => Err(Error::query(format!(
                        "{} {} @{}: {}",
                        name, record_type, self.nameserver, e
                    ))),
                };
            }
        };

        let answers = lookup
            .record_iter()
            .filter_map(|record| {
                let record_type = RecordType::from_code(u16::from(record.record_type()))?;
                let data = presentation(record.data()?);
                Some(DnsAnswer {
                    name: record.name().to_utf8(),
                    record_type,
                    ttl: record.ttl(),
                    data,
                })
            })
            .collect();

        Ok(answers)
    }

    fn is_live_nameserver(&self) -> bool {
        true
    }

    fn querier_name(&self) -> &'static str {
        "hickory"
    }
}

/// Zone presentation form of record data
fn presentation(rdata: &RData) -> String {
    match rdata {
        RData::TXT(txt) => txt
            .txt_data()
            .iter()
            .map(|part| format!("\"{}\"", String::from_utf8_lossy(part)))
            .collect::<Vec<_>>()
            .join(" "),
        RData::MX(mx) => format!("{} {}", mx.preference(), mx.exchange()),
        RData::SRV(srv) => format!(
            "{} {} {} {}",
            srv.priority(),
            srv.weight(),
            srv.port(),
            srv.target()
        ),
        other => other.to_string(),
    }
}

/// Factory for creating nameserver-pinned queriers
pub struct HickoryFactory;

impl DnsQuerierFactory for HickoryFactory {
    fn create(&self, source: &QuerySource) -> Result<Box<dyn DnsQuerier>> {
        match &source.hostname {
            Some(hostname) => Ok(Box::new(HickoryQuerier::new(hostname.clone()))),
            None => Err(Error::config(format!(
                "Source '{}' has no nameserver to query",
                source.id
            ))),
        }
    }
}

/// Register the nameserver querier with a registry
pub fn register(registry: &ProviderRegistry) {
    registry.register_querier(NAMESERVER_QUERIER, Box::new(HickoryFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_resolver::proto::rr::Name;
    use hickory_resolver::proto::rr::rdata::{A, CNAME, MX, SRV, TXT};
    use std::str::FromStr;

    #[test]
    fn test_presentation_forms() {
        let mx = RData::MX(MX::new(10, Name::from_str("mail.example.com.").unwrap()));
        assert_eq!(presentation(&mx), "10 mail.example.com.");

        let srv = RData::SRV(SRV::new(10, 60, 5060, Name::from_str("sip.example.com.").unwrap()));
        assert_eq!(presentation(&srv), "10 60 5060 sip.example.com.");

        let txt = RData::TXT(TXT::new(vec!["v=spf1 -all".to_string()]));
        assert_eq!(presentation(&txt), "\"v=spf1 -all\"");

        let cname = RData::CNAME(CNAME(Name::from_str("cdn.example.net.").unwrap()));
        assert_eq!(presentation(&cname), "cdn.example.net.");

        let a = RData::A(A::new(192, 0, 2, 1));
        assert_eq!(presentation(&a), "192.0.2.1");
    }

    #[test]
    fn test_record_type_codes_round_trip() {
        for record_type in RecordType::ALL {
            let wire = WireType::from(record_type.code());
            assert_eq!(RecordType::from_code(u16::from(wire)), Some(record_type));
        }
    }

    #[test]
    fn test_factory_requires_hostname() {
        let factory = HickoryFactory;

        let pinned = factory
            .create(&QuerySource::new("old", "Old NS", "ns1.old-host.net."))
            .unwrap();
        assert!(pinned.is_live_nameserver());
        assert_eq!(pinned.querier_name(), "hickory");

        assert!(factory.create(&QuerySource::public("g", "Public")).is_err());
    }

    #[test]
    fn test_nameserver_trimmed() {
        let querier = HickoryQuerier::new(" ns1.old-host.net. ");
        assert_eq!(querier.nameserver(), "ns1.old-host.net");
    }

    #[tokio::test]
    async fn test_unresolvable_nameserver_is_query_error() {
        let querier = HickoryQuerier::new("nameserver.invalid");
        let result = querier.query("example.com", RecordType::A).await;
        assert!(matches!(result, Err(Error::Query(_))));
    }

    #[test]
    fn test_register() {
        let registry = ProviderRegistry::new();
        register(&registry);
        assert!(registry.has_querier(NAMESERVER_QUERIER));
    }
}
