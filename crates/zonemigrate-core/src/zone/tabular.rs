//! Tabular ("paste") dialect
//!
//! Produced by copying a provider's record table. Each record starts with a
//! header line and its value follows on one or more lines:
//!
//! ```text
//! example.com. 3600 MX
//! Priority: 10
//! Destination: mail.example.com.
//! www.example.com. 300 A
//! 192.0.2.10
//! ```
//!
//! MX and SRV values are rebuilt from their labeled sub-lines, TXT values
//! are quoted if they are not already, and other types join their value
//! lines with a space.

use super::{DEFAULT_TTL, infer_origin};
use crate::record::{APEX, CanonicalRecord, RecordType, normalize_name, relativize};
use tracing::debug;

struct Block {
    fqdn: String,
    ttl: u32,
    record_type: String,
    lines: Vec<String>,
}

/// Whether a line is the table's column header ("Name TTL Type Record")
pub(crate) fn is_column_header(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();
    ["name", "ttl", "type"].iter().all(|w| words.contains(w))
        && ["record", "value", "data"].iter().any(|w| words.contains(w))
}

/// Whether a line is a record header: `fqdn. <ttl> <TYPE>`
pub(crate) fn is_record_header(line: &str) -> bool {
    parse_header(line).is_some()
}

fn parse_header(line: &str) -> Option<(String, u32, String)> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let [fqdn, ttl, record_type] = tokens.as_slice() else {
        return None;
    };

    let name = fqdn.strip_suffix('.')?;
    if !name.contains('.') || name.starts_with('.') {
        return None;
    }
    if ttl.is_empty() || !ttl.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if record_type.is_empty() || !record_type.bytes().all(|b| b.is_ascii_uppercase()) {
        return None;
    }
    Some((fqdn.to_string(), ttl.parse().unwrap_or(DEFAULT_TTL), record_type.to_string()))
}

/// Parse tabular text into `(origin, records)`
pub(crate) fn parse(text: &str, default_origin: Option<&str>) -> (String, Vec<CanonicalRecord>) {
    let mut blocks: Vec<Block> = Vec::new();

    for line in text.lines().map(str::trim) {
        if line.is_empty() || is_column_header(line) {
            continue;
        }
        if let Some((fqdn, ttl, record_type)) = parse_header(line) {
            blocks.push(Block {
                fqdn,
                ttl,
                record_type,
                lines: Vec::new(),
            });
        } else if let Some(block) = blocks.last_mut() {
            block.lines.push(line.to_string());
        } else {
            debug!("Value line before any record header, skipping: {}", line);
        }
    }

    let origin = default_origin
        .map(str::to_string)
        .or_else(|| blocks.first().and_then(|b| infer_origin(&b.fqdn)))
        .unwrap_or_default();

    let records = blocks
        .into_iter()
        .filter_map(|block| {
            let Ok(record_type) = block.record_type.parse::<RecordType>() else {
                debug!("Unsupported record type {} for {}, skipping", block.record_type, block.fqdn);
                return None;
            };
            let value = build_value(record_type, &block.lines)?;
            let name = relativize(&block.fqdn, &origin);
            if record_type == RecordType::Ns && name == APEX {
                return None;
            }
            Some(CanonicalRecord::new(name, record_type, block.ttl, value))
        })
        .collect();

    (normalize_origin(origin), records)
}

fn normalize_origin(origin: String) -> String {
    if origin.is_empty() {
        origin
    } else {
        normalize_name(&origin)
    }
}

fn build_value(record_type: RecordType, lines: &[String]) -> Option<String> {
    if lines.is_empty() {
        return None;
    }

    let value = match record_type {
        RecordType::Mx => labeled(lines, &["priority", "destination"])
            .unwrap_or_else(|| joined(lines)),
        RecordType::Srv => labeled(lines, &["priority", "weight", "port", "target"])
            .unwrap_or_else(|| joined(lines)),
        RecordType::Txt => {
            let value = joined(lines);
            if value.starts_with('"') {
                value
            } else {
                format!("\"{}\"", value)
            }
        }
        _ => joined(lines),
    };

    if value.is_empty() { None } else { Some(value) }
}

/// Collect `Label: value` sub-lines in the given label order
fn labeled(lines: &[String], labels: &[&str]) -> Option<String> {
    let parts: Option<Vec<String>> = labels
        .iter()
        .map(|label| {
            lines.iter().find_map(|line| {
                let (key, value) = line.split_once(':')?;
                if key.trim().eq_ignore_ascii_case(label) {
                    Some(value.trim().to_string())
                } else {
                    None
                }
            })
        })
        .collect();
    parts.map(|p| p.join(" "))
}

fn joined(lines: &[String]) -> String {
    lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
