//! Canonical record model
//!
//! Every source of DNS data (zone exports, live nameservers, public
//! resolvers) is reduced to [`CanonicalRecord`]s before anything is compared
//! or planned. Provider-side state is read into [`ProviderRecord`]s.
//!
//! ## Normalization
//!
//! Equality between values is decided on a normalized form (trailing dot,
//! surrounding quotes and whitespace stripped, lowercased). The normalized
//! form is only ever used as a comparison key: records keep their raw value.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Label used for the zone apex
pub const APEX: &str = "@";

/// Separator used when a provider returns a multi-value record as one string
pub const VALUE_SEPARATOR: char = '\n';

/// Identifier of the source that observed a record
pub type SourceId = String;

/// DNS record types the engine understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    A,
    Aaaa,
    Cname,
    Mx,
    Txt,
    Ns,
    Srv,
    Caa,
    Soa,
}

impl RecordType {
    /// Every supported type, in a stable order
    pub const ALL: [RecordType; 9] = [
        RecordType::A,
        RecordType::Aaaa,
        RecordType::Cname,
        RecordType::Mx,
        RecordType::Txt,
        RecordType::Ns,
        RecordType::Srv,
        RecordType::Caa,
        RecordType::Soa,
    ];

    /// Types that can be migrated to a provider (everything but SOA)
    pub const MIGRATABLE: [RecordType; 8] = [
        RecordType::A,
        RecordType::Aaaa,
        RecordType::Cname,
        RecordType::Mx,
        RecordType::Txt,
        RecordType::Ns,
        RecordType::Srv,
        RecordType::Caa,
    ];

    /// Presentation mnemonic ("A", "AAAA", ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Cname => "CNAME",
            RecordType::Mx => "MX",
            RecordType::Txt => "TXT",
            RecordType::Ns => "NS",
            RecordType::Srv => "SRV",
            RecordType::Caa => "CAA",
            RecordType::Soa => "SOA",
        }
    }

    /// IANA numeric type code
    pub fn code(&self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::Ns => 2,
            RecordType::Cname => 5,
            RecordType::Soa => 6,
            RecordType::Mx => 15,
            RecordType::Txt => 16,
            RecordType::Aaaa => 28,
            RecordType::Srv => 33,
            RecordType::Caa => 257,
        }
    }

    /// Map an IANA numeric type code back to a supported type
    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    /// Whether the target groups records of this type into round-robin sets
    pub fn is_multi_value(&self) -> bool {
        matches!(
            self,
            RecordType::A | RecordType::Aaaa | RecordType::Txt | RecordType::Ns
        )
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == upper)
            .ok_or_else(|| crate::Error::unsupported_type(s.trim()))
    }
}

/// One observation of a DNS resource record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Owner name relative to the zone apex ("@" for the apex)
    pub name: String,
    /// Record type
    #[serde(rename = "type")]
    pub record_type: RecordType,
    /// Time-to-live in seconds
    pub ttl: u32,
    /// Type-specific presentation value (e.g. "10 mail.example.com." for MX)
    pub value: String,
    /// Sources that observed this exact record
    #[serde(default)]
    pub sources: BTreeSet<SourceId>,
}

impl CanonicalRecord {
    /// Create a record with no source attribution
    pub fn new(
        name: impl Into<String>,
        record_type: RecordType,
        ttl: u32,
        value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            record_type,
            ttl,
            value: value.into(),
            sources: BTreeSet::new(),
        }
    }

    /// Attribute this record to a source
    pub fn with_source(mut self, source: impl Into<SourceId>) -> Self {
        self.sources.insert(source.into());
        self
    }

    /// Name used for grouping and comparison
    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }

    /// Value used for comparison
    pub fn normalized_value(&self) -> String {
        normalize_value(&self.value)
    }

    /// `(name, type)` identity key
    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.name, self.record_type)
    }

    /// `(name, type, value)` identity used when merging observations
    pub fn value_key(&self) -> ValueKey {
        ValueKey {
            key: self.key(),
            value: self.normalized_value(),
        }
    }

    /// SOA and apex NS records describe delegation, not zone content
    pub fn is_migratable(&self) -> bool {
        is_migratable(&self.name, self.record_type)
    }
}

/// `(normalizedName, type)` identity of a record set
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    pub name: String,
    pub record_type: RecordType,
}

impl RecordKey {
    pub fn new(name: &str, record_type: RecordType) -> Self {
        Self {
            name: normalize_name(name),
            record_type,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.name, self.record_type)
    }
}

/// `(normalizedName, type, normalizedValue)` identity of a single record
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueKey {
    pub key: RecordKey,
    pub value: String,
}

/// A record as it currently exists at the target provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRecord {
    /// Provider-assigned opaque handle
    pub id: String,
    /// Owner name relative to the zone apex ("@" for the apex)
    pub name: String,
    /// Record type
    #[serde(rename = "type")]
    pub record_type: RecordType,
    /// Time-to-live in seconds
    pub ttl: u32,
    /// Value; round-robin sets are joined with [`VALUE_SEPARATOR`]
    pub value: String,
}

impl ProviderRecord {
    /// Individual values of a (possibly multi-value) provider record
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.value
            .split(VALUE_SEPARATOR)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// `(name, type)` identity key
    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.name, self.record_type)
    }

    pub fn is_migratable(&self) -> bool {
        is_migratable(&self.name, self.record_type)
    }
}

/// Whether a `(name, type)` pair takes part in comparison and planning
pub fn is_migratable(name: &str, record_type: RecordType) -> bool {
    match record_type {
        RecordType::Soa => false,
        RecordType::Ns => normalize_name(name) != APEX,
        _ => true,
    }
}

/// Normalize an owner name for grouping: lowercase, trimmed, no trailing
/// dot, empty treated as apex
pub fn normalize_name(name: &str) -> String {
    let trimmed = name.trim().trim_end_matches('.').to_ascii_lowercase();
    if trimmed.is_empty() {
        APEX.to_string()
    } else {
        trimmed
    }
}

/// Normalize a value for equality comparison
///
/// Strips a trailing dot and surrounding quotes, lowercases, and trims
/// whitespace. TXT payloads are folded the same way, so values differing
/// only in case compare equal.
pub fn normalize_value(value: &str) -> String {
    let trimmed = value.trim();
    let trimmed = trimmed.strip_suffix('.').unwrap_or(trimmed);
    let trimmed = trimmed.trim_matches('"');
    trimmed.to_lowercase().trim().to_string()
}

/// Make an absolute owner name relative to `origin`
///
/// `origin` itself becomes "@", names under the origin lose the suffix, and
/// names outside the origin are returned lowercased without a trailing dot.
pub fn relativize(fqdn: &str, origin: &str) -> String {
    let name = normalize_name(fqdn);
    let origin = normalize_name(origin);

    if origin == APEX || origin.is_empty() {
        return name;
    }
    if name == origin {
        return APEX.to_string();
    }
    match name.strip_suffix(&format!(".{}", origin)) {
        Some(prefix) if !prefix.is_empty() => prefix.to_string(),
        _ => name,
    }
}

/// Absolute name (with trailing dot) for a relative owner name
pub fn absolutize(name: &str, origin: &str) -> String {
    let origin = origin.trim().trim_end_matches('.');
    let name = name.trim();
    if name.is_empty() || name == APEX {
        format!("{}.", origin)
    } else if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{}.{}.", name, origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_value() {
        assert_eq!(normalize_value("Mail.Example.COM."), "mail.example.com");
        assert_eq!(normalize_value("  \"v=spf1 -all\" "), "v=spf1 -all");
        assert_eq!(normalize_value("1.2.3.4"), "1.2.3.4");
        assert_eq!(normalize_value(""), "");
    }

    #[test]
    fn test_raw_value_preserved() {
        let record = CanonicalRecord::new("www", RecordType::Cname, 300, "Target.Example.com.");
        assert_eq!(record.value, "Target.Example.com.");
        assert_eq!(record.normalized_value(), "target.example.com");
    }

    #[test]
    fn test_relativize() {
        assert_eq!(relativize("example.com.", "example.com"), "@");
        assert_eq!(relativize("WWW.example.com.", "example.com."), "www");
        assert_eq!(relativize("a.b.example.com", "example.com"), "a.b");
        assert_eq!(relativize("other.org.", "example.com"), "other.org");
        assert_eq!(relativize("notexample.com.", "example.com"), "notexample.com");
    }

    #[test]
    fn test_absolutize() {
        assert_eq!(absolutize("@", "example.com"), "example.com.");
        assert_eq!(absolutize("www", "example.com."), "www.example.com.");
        assert_eq!(absolutize("host.other.org.", "example.com"), "host.other.org.");
    }

    #[test]
    fn test_record_type_codes() {
        for t in RecordType::ALL {
            assert_eq!(RecordType::from_code(t.code()), Some(t));
        }
        assert_eq!(RecordType::from_code(12), None);
        assert_eq!("aaaa".parse::<RecordType>().unwrap(), RecordType::Aaaa);
        assert!("PTR".parse::<RecordType>().is_err());
    }

    #[test]
    fn test_migratable() {
        assert!(!is_migratable("@", RecordType::Soa));
        assert!(!is_migratable("@", RecordType::Ns));
        assert!(is_migratable("sub", RecordType::Ns));
        assert!(is_migratable("@", RecordType::A));
    }

    #[test]
    fn test_provider_record_values() {
        let record = ProviderRecord {
            id: "1".to_string(),
            name: "@".to_string(),
            record_type: RecordType::A,
            ttl: 300,
            value: "1.1.1.1\n2.2.2.2\n".to_string(),
        };
        assert_eq!(record.values().collect::<Vec<_>>(), vec!["1.1.1.1", "2.2.2.2"]);
    }

    #[test]
    fn test_record_serializes_type_field() {
        let record = CanonicalRecord::new("@", RecordType::Mx, 600, "10 mail.example.com.")
            .with_source("old");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "MX");
        assert_eq!(json["sources"][0], "old");
    }
}
