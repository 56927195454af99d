// # Constellix DNS Provider
//
// This crate provides the Constellix target provider for zone migration.
//
// ## Behavior
//
// - One HTTP request per trait call (domain create falls back to one list)
// - HTTP 429 surfaces as `Error::RateLimited`; the executor owns retry and
//   pacing
// - HTTP timeout configured (30 seconds)
// - Record CRUD is per type: `/domains/{id}/records/{type}[/{recordId}]`
// - Round-robin types (A, AAAA, TXT, NS) are written as one record carrying
//   a `roundRobin` list; CNAME carries a scalar `host`
//
// ## Trust Level: Untrusted (Target Provider)
//
// **Allowed Capabilities**:
// - ✅ Perform HTTP/HTTPS API calls to their endpoints only
// - ✅ Parse provider-specific responses
//
// **Forbidden Capabilities**:
// - ❌ Spawn tasks or threads
// - ❌ Implement retry logic (owned by Executor)
// - ❌ Decide what to change (owned by the plan synthesizer)
//
// ## Security Requirements
//
// - API key and secret NEVER appear in logs or `Debug` output
// - Every request is signed: `x-cns-security-token` carries
//   `{apiKey}:{base64(hmac_sha1(secret, timestamp_ms))}:{timestamp_ms}`
//
// ## API Reference
//
// - Create domain: POST `/domains` `{"names": ["example.com"]}`
// - List domains: GET `/domains`
// - List records: GET `/domains/:id/records/:type`
// - Create record: POST `/domains/:id/records/:type`
// - Update record: PUT `/domains/:id/records/:type/:record_id`
// - Delete record: DELETE `/domains/:id/records/:type/:record_id`

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use ring::hmac;
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use zonemigrate_core::config::ProviderConfig;
use zonemigrate_core::record::{APEX, VALUE_SEPARATOR};
use zonemigrate_core::traits::{DomainHandle, TargetProvider, TargetProviderFactory};
use zonemigrate_core::{Error, ProviderRecord, ProviderWriteOp, RecordType, Result, WritePayload};

/// Constellix API base URL
pub const CONSTELLIX_API_BASE: &str = "https://api.dns.constellix.com/v1";

/// Header carrying the request signature
pub const SECURITY_TOKEN_HEADER: &str = "x-cns-security-token";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const PROVIDER_NAME: &str = "constellix";

/// Constellix target provider
///
/// # Trust Level: Untrusted
///
/// Stateless and single-shot. All coordination (retries, backoff, pacing)
/// is owned by the `Executor`.
pub struct ConstellixProvider {
    /// Account API key
    /// ⚠️ NEVER log this value
    api_key: String,

    /// HMAC key derived from the account secret
    signing_key: hmac::Key,

    /// API base URL without a trailing slash
    base_url: String,

    /// HTTP client for API requests
    client: reqwest::Client,
}

// Custom Debug implementation that hides the credentials
impl fmt::Debug for ConstellixProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstellixProvider")
            .field("api_key", &"<REDACTED>")
            .field("secret_key", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl ConstellixProvider {
    /// Create a new Constellix provider
    ///
    /// # Parameters
    ///
    /// - `api_key`: Account API key
    /// - `secret_key`: Account secret used to sign requests
    /// - `base_url`: API endpoint override (defaults to [`CONSTELLIX_API_BASE`])
    pub fn new(
        api_key: impl Into<String>,
        secret_key: impl AsRef<[u8]>,
        base_url: Option<String>,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(Error::config("Constellix API key cannot be empty"));
        }
        if secret_key.as_ref().is_empty() {
            return Err(Error::config("Constellix secret key cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        let base_url = base_url
            .unwrap_or_else(|| CONSTELLIX_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            api_key,
            signing_key: hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, secret_key.as_ref()),
            base_url,
            client,
        })
    }

    /// Signature header value for a millisecond timestamp
    fn security_token(&self, timestamp_ms: u128) -> String {
        let timestamp = timestamp_ms.to_string();
        let tag = hmac::sign(&self.signing_key, timestamp.as_bytes());
        format!("{}:{}:{}", self.api_key, BASE64.encode(tag.as_ref()), timestamp)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();

        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header(SECURITY_TOKEN_HEADER, self.security_token(timestamp_ms))
            .header("Content-Type", "application/json")
    }

    /// Send a request and map non-success statuses to errors
    async fn send(&self, request: reqwest::RequestBuilder, context: &str) -> Result<reqwest::Response> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::timeout(format!("{}: {}", context, e))
            } else {
                Error::http(format!("{}: HTTP request failed: {}", context, e))
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());
        Err(status_error(status.as_u16(), &error_text, context))
    }

    async fn json_body(response: reqwest::Response, context: &str) -> Result<Value> {
        response.json().await.map_err(|e| {
            Error::provider(PROVIDER_NAME, format!("{}: Failed to parse response: {}", context, e))
        })
    }

    fn records_path(domain: &DomainHandle, record_type: RecordType) -> String {
        format!(
            "/domains/{}/records/{}",
            domain.id,
            record_type.as_str().to_ascii_lowercase()
        )
    }
}

/// Map an HTTP error status to the error class the executor acts on
fn status_error(status: u16, body: &str, context: &str) -> Error {
    match status {
        401 | 403 => Error::auth(format!(
            "{}: Invalid API key or secret. Status: {}",
            context, status
        )),
        404 => Error::not_found(format!("{}: {}", context, body)),
        429 => Error::rate_limited(format!("{}: Status: {}", context, status)),
        500..=599 => Error::http(format!(
            "{}: Constellix server error (transient): {} - {}",
            context, status, body
        )),
        _ => Error::provider(PROVIDER_NAME, format!("{}: {} - {}", context, status, body)),
    }
}

/// Ids come back as numbers; accept strings too
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WireId {
    Number(u64),
    Text(String),
}

impl fmt::Display for WireId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireId::Number(n) => write!(f, "{}", n),
            WireId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DomainEntry {
    id: WireId,
    name: String,
}

impl DomainEntry {
    fn into_handle(self) -> DomainHandle {
        DomainHandle {
            id: self.id.to_string(),
            name: self.name.trim_end_matches('.').to_ascii_lowercase(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordEntry {
    id: WireId,
    #[serde(default)]
    name: String,
    #[serde(default)]
    ttl: u32,
    #[serde(default)]
    round_robin: Vec<RoundRobinEntry>,
    #[serde(default)]
    host: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RoundRobinEntry {
    value: Option<String>,
    #[serde(alias = "level")]
    priority: Option<u16>,
    weight: Option<u16>,
    port: Option<u16>,
    flag: Option<u8>,
    tag: Option<String>,
    data: Option<String>,
}

impl RoundRobinEntry {
    /// Presentation value for one list entry of a record of `record_type`
    fn presentation(&self, record_type: RecordType) -> Option<String> {
        match record_type {
            RecordType::Mx => Some(format!("{} {}", self.priority?, self.value.as_deref()?)),
            RecordType::Srv => Some(format!(
                "{} {} {} {}",
                self.priority?,
                self.weight?,
                self.port?,
                self.value.as_deref()?
            )),
            RecordType::Caa => Some(format!(
                "{} {} \"{}\"",
                self.flag.unwrap_or(0),
                self.tag.as_deref()?,
                self.data.as_deref()?
            )),
            _ => self.value.clone(),
        }
    }
}

/// Convert a listed record; `None` when it carries no usable value
fn to_provider_record(record_type: RecordType, entry: RecordEntry) -> Option<ProviderRecord> {
    let values: Vec<String> = match record_type {
        RecordType::Cname => entry.host.into_iter().collect(),
        _ => entry
            .round_robin
            .iter()
            .filter_map(|rr| rr.presentation(record_type))
            .collect(),
    };
    if values.is_empty() {
        return None;
    }

    let name = if entry.name.is_empty() {
        APEX.to_string()
    } else {
        entry.name
    };

    Some(ProviderRecord {
        id: entry.id.to_string(),
        name,
        record_type,
        ttl: entry.ttl,
        value: values.join(&VALUE_SEPARATOR.to_string()),
    })
}

/// Request body for a create or update
fn write_body(op: &ProviderWriteOp) -> Value {
    let name = if op.name == APEX { "" } else { op.name.as_str() };
    let mut body = json!({ "name": name, "ttl": op.ttl });

    let (field, content) = match &op.payload {
        WritePayload::RoundRobin { values } => (
            "roundRobin",
            Value::Array(
                values
                    .iter()
                    .map(|v| json!({ "value": v, "disableFlag": false }))
                    .collect(),
            ),
        ),
        WritePayload::Host { host } => ("host", json!(host)),
        WritePayload::Mx { value, priority } => (
            "roundRobin",
            json!([{ "value": value, "priority": priority, "disableFlag": false }]),
        ),
        WritePayload::Srv {
            value,
            priority,
            weight,
            port,
        } => (
            "roundRobin",
            json!([{
                "value": value,
                "priority": priority,
                "weight": weight,
                "port": port,
                "disableFlag": false
            }]),
        ),
        WritePayload::Caa { flag, tag, data } => (
            "roundRobin",
            json!([{ "flag": flag, "tag": tag, "data": data, "disableFlag": false }]),
        ),
    };
    body[field] = content;
    body
}

/// First element of an array response, or the response itself
fn first_entry(value: Value) -> Value {
    match value {
        Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        other => other,
    }
}

#[async_trait]
impl TargetProvider for ConstellixProvider {
    async fn find_domain(&self, domain: &str) -> Result<Option<DomainHandle>> {
        let wanted = domain.trim_end_matches('.').to_ascii_lowercase();
        tracing::debug!("Looking up Constellix domain {}", wanted);

        let response = self
            .send(self.request(reqwest::Method::GET, "/domains"), "list domains")
            .await?;
        let entries: Vec<DomainEntry> =
            serde_json::from_value(Self::json_body(response, "list domains").await?)?;

        Ok(entries
            .into_iter()
            .map(DomainEntry::into_handle)
            .find(|d| d.name == wanted))
    }

    /// Create the domain; a 409/400 means it (probably) exists already and
    /// is resolved through the domain list
    async fn ensure_domain(&self, domain: &str) -> Result<DomainHandle> {
        let name = domain.trim_end_matches('.').to_ascii_lowercase();
        tracing::info!("Creating Constellix domain {}", name);

        let request = self
            .request(reqwest::Method::POST, "/domains")
            .json(&json!({ "names": [name] }));

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                let body = Self::json_body(response, "create domain").await?;
                let entry: DomainEntry = serde_json::from_value(first_entry(body))?;
                Ok(entry.into_handle())
            }
            Ok(response) if matches!(response.status().as_u16(), 400 | 409) => {
                tracing::info!(
                    "Domain {} not created (status {}), looking it up",
                    name,
                    response.status()
                );
                self.find_domain(&name).await?.ok_or_else(|| {
                    Error::domain(format!("{} could not be created and is not listed", name))
                })
            }
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                Err(status_error(status, &body, "create domain"))
            }
            Err(e) => Err(Error::http(format!("create domain: HTTP request failed: {}", e))),
        }
    }

    async fn list_records(&self, domain: &DomainHandle) -> Result<Vec<ProviderRecord>> {
        let mut records = Vec::new();

        for record_type in RecordType::MIGRATABLE {
            let path = Self::records_path(domain, record_type);
            let context = format!("list {} records", record_type);

            let response = match self
                .send(self.request(reqwest::Method::GET, &path), &context)
                .await
            {
                Ok(response) => response,
                Err(Error::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };

            let entries: Vec<RecordEntry> =
                serde_json::from_value(Self::json_body(response, &context).await?)?;
            let before = records.len();
            records.extend(
                entries
                    .into_iter()
                    .filter_map(|entry| to_provider_record(record_type, entry)),
            );
            tracing::debug!(
                "{} {} record(s) at Constellix for {}",
                records.len() - before,
                record_type,
                domain.name
            );
        }

        Ok(records)
    }

    async fn create_record(&self, domain: &DomainHandle, op: &ProviderWriteOp) -> Result<String> {
        let context = format!("create {} {}", op.name, op.record_type);
        let request = self
            .request(reqwest::Method::POST, &Self::records_path(domain, op.record_type))
            .json(&write_body(op));

        let response = self.send(request, &context).await?;
        let body = first_entry(Self::json_body(response, &context).await?);
        let id = match body.get("id") {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) => s.clone(),
            _ => {
                return Err(Error::provider(
                    PROVIDER_NAME,
                    format!("{}: response carries no record id", context),
                ));
            }
        };

        tracing::debug!("Created {} (id {})", context, id);
        Ok(id)
    }

    async fn update_record(
        &self,
        domain: &DomainHandle,
        record_id: &str,
        op: &ProviderWriteOp,
    ) -> Result<()> {
        let context = format!("update {} {} ({})", op.name, op.record_type, record_id);
        let path = format!("{}/{}", Self::records_path(domain, op.record_type), record_id);
        let request = self
            .request(reqwest::Method::PUT, &path)
            .json(&write_body(op));

        self.send(request, &context).await?;
        Ok(())
    }

    async fn delete_record(
        &self,
        domain: &DomainHandle,
        record_type: RecordType,
        record_id: &str,
    ) -> Result<()> {
        let context = format!("delete {} {}", record_type, record_id);
        let path = format!("{}/{}", Self::records_path(domain, record_type), record_id);

        self.send(self.request(reqwest::Method::DELETE, &path), &context)
            .await?;
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

/// Factory for creating Constellix providers
pub struct ConstellixFactory;

impl TargetProviderFactory for ConstellixFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn TargetProvider>> {
        match config {
            ProviderConfig::Constellix {
                api_key,
                secret_key,
                base_url,
            } => Ok(Box::new(ConstellixProvider::new(
                api_key.clone(),
                secret_key.as_bytes(),
                base_url.clone(),
            )?)),
            _ => Err(Error::config("Invalid config for Constellix provider")),
        }
    }
}

/// Register the Constellix provider with a registry
///
/// # Example
///
/// ```rust
/// use zonemigrate_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// zonemigrate_provider_constellix::register(&registry);
/// assert!(registry.has_provider("constellix"));
/// ```
pub fn register(registry: &zonemigrate_core::ProviderRegistry) {
    registry.register_provider(PROVIDER_NAME, Box::new(ConstellixFactory));
}
