// # Public Resolver DNS Querier
//
// This crate answers queries for sources that have no explicit nameserver,
// through a public resolver's JSON-over-HTTPS endpoint.
//
// ## Wire Format
//
// ```http
// GET /resolve?name=www.example.com&type=A
// Accept: application/dns-json
// ```
//
// ```json
// { "Status": 0, "Answer": [{ "name": "www.example.com.", "type": 1, "TTL": 300, "data": "192.0.2.1" }] }
// ```
//
// `type` is the numeric record type code. `Status` is the DNS RCODE:
// 0 (NOERROR) and 3 (NXDOMAIN) are answers, anything else is a failure.
//
// ## Purpose
//
// A public resolver reflects what the world currently sees, caches
// included. It is not paced like a live nameserver.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use zonemigrate_core::registry::PUBLIC_RESOLVER_QUERIER;
use zonemigrate_core::traits::{DnsAnswer, DnsQuerier, DnsQuerierFactory, QuerySource};
use zonemigrate_core::{Error, ProviderRegistry, RecordType, Result};

/// Default JSON-over-HTTPS endpoint
pub const DEFAULT_DOH_ENDPOINT: &str = "https://dns.google/resolve";

/// HTTP timeout for one query
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

const RCODE_NOERROR: u32 = 0;
const RCODE_NXDOMAIN: u32 = 3;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DohResponse {
    status: u32,
    #[serde(default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    name: String,
    #[serde(rename = "type")]
    record_type: u16,
    #[serde(rename = "TTL", default)]
    ttl: u32,
    data: String,
}

impl DohAnswer {
    /// `None` for record types outside the migration model (RRSIG, ...)
    fn into_answer(self) -> Option<DnsAnswer> {
        let record_type = RecordType::from_code(self.record_type)?;
        let data = match record_type {
            RecordType::Txt if !self.data.starts_with('"') => format!("\"{}\"", self.data),
            _ => self.data,
        };
        Some(DnsAnswer {
            name: self.name,
            record_type,
            ttl: self.ttl,
            data,
        })
    }
}

/// JSON-over-HTTPS querier
pub struct DohQuerier {
    /// Resolve endpoint URL
    endpoint: String,

    /// HTTP client
    client: reqwest::Client,
}

impl DohQuerier {
    /// Create a querier against [`DEFAULT_DOH_ENDPOINT`]
    pub fn new() -> Result<Self> {
        Self::with_endpoint(DEFAULT_DOH_ENDPOINT)
    }

    /// Create a querier against a custom endpoint
    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl DnsQuerier for DohQuerier {
    async fn query(&self, fqdn: &str, record_type: RecordType) -> Result<Vec<DnsAnswer>> {
        let name = fqdn.trim_end_matches('.');
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("name", name), ("type", record_type.as_str())])
            .header("Accept", "application/dns-json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::timeout(format!("{} {}: {}", name, record_type, e))
                } else {
                    Error::http(format!("{} {}: Request failed: {}", name, record_type, e))
                }
            })?;

        if response.status().as_u16() == 429 {
            return Err(Error::rate_limited(format!("{} {}", name, record_type)));
        }
        if !response.status().is_success() {
            return Err(Error::query(format!(
                "{} {}: HTTP error: {}",
                name,
                record_type,
                response.status()
            )));
        }

        let body: DohResponse = response.json().await.map_err(|e| {
            Error::query(format!("{} {}: Failed to parse response: {}", name, record_type, e))
        })?;

        match body.status {
            RCODE_NOERROR => {}
            RCODE_NXDOMAIN => {
                tracing::debug!("{} {}: NXDOMAIN", name, record_type);
                return Ok(Vec::new());
            }
            rcode => {
                return Err(Error::query(format!(
                    "{} {}: resolver returned RCODE {}",
                    name, record_type, rcode
                )));
            }
        }

        Ok(body
            .answer
            .into_iter()
            .filter_map(DohAnswer::into_answer)
            .collect())
    }

    fn is_live_nameserver(&self) -> bool {
        false
    }

    fn querier_name(&self) -> &'static str {
        "doh"
    }
}

/// Factory for creating public resolver queriers
pub struct DohFactory {
    endpoint: String,
}

impl DohFactory {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

impl Default for DohFactory {
    fn default() -> Self {
        Self::new(DEFAULT_DOH_ENDPOINT)
    }
}

impl DnsQuerierFactory for DohFactory {
    fn create(&self, source: &QuerySource) -> Result<Box<dyn DnsQuerier>> {
        if !source.is_public_resolver() {
            return Err(Error::config(format!(
                "Source '{}' is pinned to a nameserver",
                source.id
            )));
        }
        Ok(Box::new(DohQuerier::with_endpoint(self.endpoint.clone())?))
    }
}

/// Register the public resolver querier with a registry
pub fn register(registry: &ProviderRegistry) {
    registry.register_querier(PUBLIC_RESOLVER_QUERIER, Box::new(DohFactory::default()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn querier(server: &MockServer) -> DohQuerier {
        DohQuerier::with_endpoint(format!("{}/resolve", server.uri())).unwrap()
    }

    #[tokio::test]
    async fn test_answers_mapped_from_numeric_types() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/resolve"))
            .and(query_param("name", "example.com"))
            .and(query_param("type", "MX"))
            .and(header("Accept", "application/dns-json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Status": 0,
                "TC": false,
                "Answer": [
                    { "name": "example.com.", "type": 15, "TTL": 3600, "data": "10 mail.example.com." },
                    { "name": "example.com.", "type": 46, "TTL": 3600, "data": "MX 8 2 3600 ..." }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let answers = querier(&server)
            .await
            .query("example.com.", RecordType::Mx)
            .await
            .unwrap();

        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].record_type, RecordType::Mx);
        assert_eq!(answers[0].ttl, 3600);
        assert_eq!(answers[0].data, "10 mail.example.com.");
    }

    #[tokio::test]
    async fn test_unquoted_txt_is_quoted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/resolve"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Status": 0,
                "Answer": [{ "name": "example.com.", "type": 16, "TTL": 300, "data": "v=spf1 -all" }]
            })))
            .mount(&server)
            .await;

        let answers = querier(&server)
            .await
            .query("example.com", RecordType::Txt)
            .await
            .unwrap();
        assert_eq!(answers[0].data, "\"v=spf1 -all\"");
    }

    #[tokio::test]
    async fn test_nxdomain_and_nodata_are_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("name", "missing.example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Status": 3 })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("name", "www.example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Status": 0 })))
            .mount(&server)
            .await;

        let querier = querier(&server).await;
        assert!(querier.query("missing.example.com", RecordType::A).await.unwrap().is_empty());
        assert!(querier.query("www.example.com", RecordType::A).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_servfail_and_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("name", "broken.example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Status": 2 })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("name", "busy.example.com"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let querier = querier(&server).await;
        let servfail = querier.query("broken.example.com", RecordType::A).await;
        assert!(matches!(servfail, Err(Error::Query(_))));

        let busy = querier.query("busy.example.com", RecordType::A).await;
        assert!(busy.unwrap_err().is_rate_limited());
    }

    #[test]
    fn test_factory_only_serves_public_sources() {
        let factory = DohFactory::default();

        let public = factory.create(&QuerySource::public("g", "Public")).unwrap();
        assert!(!public.is_live_nameserver());
        assert_eq!(public.querier_name(), "doh");

        assert!(
            factory
                .create(&QuerySource::new("old", "Old NS", "ns1.old-host.net"))
                .is_err()
        );
    }

    #[test]
    fn test_register() {
        let registry = ProviderRegistry::new();
        register(&registry);
        assert!(registry.has_querier(PUBLIC_RESOLVER_QUERIER));
    }
}
