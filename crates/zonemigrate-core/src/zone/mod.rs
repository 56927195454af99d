//! Zone export parsing
//!
//! Turns exported zone text into [`CanonicalRecord`]s. Two dialects are
//! understood:
//!
//! - **BIND**: `name ttl IN type value...` lines with `$ORIGIN`, comments
//!   and quoted strings ([`bind`]).
//! - **Tabular**: a pasted table where each record starts with an
//!   `fqdn. ttl TYPE` header line and its value follows on the next lines
//!   ([`tabular`]).
//!
//! Parsing is best-effort and infallible: lines that cannot be understood
//! are skipped. An empty [`ParsedZone`] is a valid outcome that callers are
//! expected to report.
//!
//! ## Usage
//!
//! ```rust
//! use zonemigrate_core::zone::parse_zone;
//!
//! let zone = parse_zone("$ORIGIN example.com.\n@ 600 IN A 1.2.3.4\n");
//! assert_eq!(zone.origin, "example.com");
//! assert_eq!(zone.records[0].name, "@");
//! ```

pub mod bind;
pub mod tabular;

use crate::error::Result;
use crate::record::{CanonicalRecord, SourceId, normalize_name};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Source id stamped on records parsed from an export
pub const DEFAULT_ZONE_SOURCE: &str = "zone-file";

/// TTL used when a record line carries none
pub const DEFAULT_TTL: u32 = 3600;

/// Zone export dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneDialect {
    /// Line-oriented BIND master file
    Bind,
    /// Header line followed by value lines
    Tabular,
}

/// Result of parsing a zone export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedZone {
    /// Zone apex without a trailing dot (empty if it could not be determined)
    pub origin: String,
    /// Dialect the text was parsed as
    pub dialect: ZoneDialect,
    /// Records with names relative to `origin`
    pub records: Vec<CanonicalRecord>,
}

impl ParsedZone {
    /// Whether nothing usable was found
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Configurable zone parser
#[derive(Debug, Clone)]
pub struct ZoneParser {
    default_origin: Option<String>,
    source_id: SourceId,
}

impl ZoneParser {
    /// Create a parser with no known origin
    pub fn new() -> Self {
        Self {
            default_origin: None,
            source_id: DEFAULT_ZONE_SOURCE.to_string(),
        }
    }

    /// Origin to use when the text declares none
    pub fn with_origin(mut self, origin: impl AsRef<str>) -> Self {
        let origin = normalize_name(origin.as_ref());
        self.default_origin = if origin == crate::record::APEX {
            None
        } else {
            Some(origin)
        };
        self
    }

    /// Source id attached to every parsed record
    pub fn with_source(mut self, source_id: impl Into<SourceId>) -> Self {
        self.source_id = source_id.into();
        self
    }

    /// Parse zone text, auto-detecting the dialect
    pub fn parse(&self, text: &str) -> ParsedZone {
        let dialect = detect_dialect(text);
        let (origin, records) = match dialect {
            ZoneDialect::Bind => bind::parse(text, self.default_origin.as_deref()),
            ZoneDialect::Tabular => tabular::parse(text, self.default_origin.as_deref()),
        };

        let records: Vec<CanonicalRecord> = records
            .into_iter()
            .map(|r| r.with_source(self.source_id.clone()))
            .collect();

        debug!(
            "Parsed {} record(s) as {:?} dialect (origin: {})",
            records.len(),
            dialect,
            if origin.is_empty() { "<unknown>" } else { &origin }
        );

        ParsedZone {
            origin,
            dialect,
            records,
        }
    }

    /// Read and parse a zone export from disk
    ///
    /// # Returns
    ///
    /// - `Ok(ParsedZone)`: Parsed (possibly empty) zone
    /// - `Err(Error)`: If the file could not be read
    pub async fn parse_file(&self, path: impl AsRef<Path>) -> Result<ParsedZone> {
        let text = tokio::fs::read_to_string(path.as_ref()).await?;
        Ok(self.parse(&text))
    }
}

impl Default for ZoneParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse zone text with default options
pub fn parse_zone(text: &str) -> ParsedZone {
    ZoneParser::new().parse(text)
}

/// Read and parse a zone export with default options
pub async fn parse_zone_file(path: impl AsRef<Path>) -> Result<ParsedZone> {
    ZoneParser::new().parse_file(path).await
}

/// Decide which dialect a piece of zone text is written in
///
/// Tabular if the first non-empty line is a column header
/// ("name ttl type record") or any line is a bare `fqdn. ttl TYPE` header;
/// BIND otherwise.
pub fn detect_dialect(text: &str) -> ZoneDialect {
    let first = text.lines().map(str::trim).find(|l| !l.is_empty());

    if first.is_some_and(tabular::is_column_header) {
        return ZoneDialect::Tabular;
    }
    if text.lines().any(tabular::is_record_header) {
        return ZoneDialect::Tabular;
    }
    ZoneDialect::Bind
}

/// Guess an apex from an absolute name by keeping its last two labels
pub(crate) fn infer_origin(fqdn: &str) -> Option<String> {
    let name = normalize_name(fqdn);
    let labels: Vec<&str> = name.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() < 2 {
        return None;
    }
    Some(labels[labels.len() - 2..].join("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordType;

    #[test]
    fn test_origin_and_apex_a() {
        let zone = parse_zone("$ORIGIN example.com.\n@ 600 IN A 1.2.3.4");
        assert_eq!(zone.dialect, ZoneDialect::Bind);
        assert_eq!(zone.origin, "example.com");
        assert_eq!(zone.records.len(), 1);

        let record = &zone.records[0];
        assert_eq!(record.name, "@");
        assert_eq!(record.record_type, RecordType::A);
        assert_eq!(record.ttl, 600);
        assert_eq!(record.value, "1.2.3.4");
        assert!(record.sources.contains(DEFAULT_ZONE_SOURCE));
    }

    #[test]
    fn test_detect_tabular_by_column_header() {
        let text = "Name TTL Type Record\nwww.example.com. 300 A\n1.2.3.4\n";
        assert_eq!(detect_dialect(text), ZoneDialect::Tabular);
    }

    #[test]
    fn test_detect_tabular_by_record_header() {
        let text = "\nexample.com. 3600 MX\nPriority: 10\nDestination: mail.example.com.\n";
        assert_eq!(detect_dialect(text), ZoneDialect::Tabular);
    }

    #[test]
    fn test_detect_bind_default() {
        assert_eq!(detect_dialect("www 300 IN A 1.2.3.4"), ZoneDialect::Bind);
        assert_eq!(detect_dialect(""), ZoneDialect::Bind);
    }

    #[test]
    fn test_empty_text_is_empty_zone() {
        let zone = parse_zone("   \n; only a comment\n");
        assert!(zone.is_empty());
        assert_eq!(zone.origin, "");
    }

    #[test]
    fn test_custom_source_and_origin() {
        let zone = ZoneParser::new()
            .with_origin("Example.com.")
            .with_source("legacy-export")
            .parse("www 300 IN CNAME @\n");
        assert_eq!(zone.origin, "example.com");
        assert_eq!(zone.records[0].name, "www");
        assert!(zone.records[0].sources.contains("legacy-export"));
    }

    #[test]
    fn test_infer_origin() {
        assert_eq!(infer_origin("a.b.example.com."), Some("example.com".to_string()));
        assert_eq!(infer_origin("localhost"), None);
    }

    #[tokio::test]
    async fn test_parse_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "$ORIGIN example.org.").unwrap();
        writeln!(file, "www 300 IN A 10.0.0.1").unwrap();

        let zone = parse_zone_file(file.path()).await.unwrap();
        assert_eq!(zone.origin, "example.org");
        assert_eq!(zone.records.len(), 1);
    }

    #[tokio::test]
    async fn test_parse_missing_file_is_error() {
        let result = parse_zone_file("/nonexistent/zone.txt").await;
        tokio_test::assert_err!(result);
    }
}
