//! Canonical → provider write shape
//!
//! Records sharing `(name, type)` collapse into a single round-robin write
//! for the types the provider groups (A, AAAA, TXT, NS). Singular types get
//! one write each with their fields split out (CNAME host, MX priority,
//! SRV priority/weight/port, CAA flag/tag/data). Hostnames are qualified
//! against the zone origin. Anything the provider cannot express is dropped.

use crate::record::{APEX, CanonicalRecord, RecordKey, RecordType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Type-specific body of a provider write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WritePayload {
    /// Ordered value list for multi-value types
    RoundRobin { values: Vec<String> },
    /// CNAME target
    Host { host: String },
    /// Mail exchanger
    Mx { value: String, priority: u16 },
    /// Service locator
    Srv {
        value: String,
        priority: u16,
        weight: u16,
        port: u16,
    },
    /// Certification authority authorization
    Caa { flag: u8, tag: String, data: String },
}

/// One write against the provider: a record set or a singular record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderWriteOp {
    /// Owner name relative to the apex ("@" for the apex)
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub ttl: u32,
    pub payload: WritePayload,
}

impl ProviderWriteOp {
    /// Values in presentation form, one per record the write produces
    pub fn presentation_values(&self) -> Vec<String> {
        match &self.payload {
            WritePayload::RoundRobin { values } => values.clone(),
            WritePayload::Host { host } => vec![host.clone()],
            WritePayload::Mx { value, priority } => vec![format!("{} {}", priority, value)],
            WritePayload::Srv {
                value,
                priority,
                weight,
                port,
            } => vec![format!("{} {} {} {}", priority, weight, port, value)],
            WritePayload::Caa { flag, tag, data } => vec![format!("{} {} \"{}\"", flag, tag, data)],
        }
    }
}

/// Group and convert canonical records into provider writes
///
/// Output order follows the first appearance of each `(name, type)`.
pub fn map_records(records: &[CanonicalRecord], origin: &str) -> Vec<ProviderWriteOp> {
    let mut ops: Vec<ProviderWriteOp> = Vec::new();
    let mut sets: HashMap<RecordKey, usize> = HashMap::new();

    for record in records {
        if record.record_type.is_multi_value() {
            let value = round_robin_value(record, origin);
            match sets.get(&record.key()) {
                Some(&idx) => {
                    if let WritePayload::RoundRobin { values } = &mut ops[idx].payload
                        && !values.contains(&value)
                    {
                        values.push(value);
                    }
                }
                None => {
                    sets.insert(record.key(), ops.len());
                    ops.push(ProviderWriteOp {
                        name: record.name.clone(),
                        record_type: record.record_type,
                        ttl: record.ttl,
                        payload: WritePayload::RoundRobin {
                            values: vec![value],
                        },
                    });
                }
            }
        } else if let Some(op) = map_record(record, origin) {
            ops.push(op);
        }
    }

    ops
}

/// Convert a single record; `None` for unsupported types or malformed values
pub fn map_record(record: &CanonicalRecord, origin: &str) -> Option<ProviderWriteOp> {
    let payload = match record.record_type {
        RecordType::A | RecordType::Aaaa | RecordType::Txt | RecordType::Ns => {
            WritePayload::RoundRobin {
                values: vec![round_robin_value(record, origin)],
            }
        }
        RecordType::Cname => WritePayload::Host {
            host: qualify(record.value.trim(), origin),
        },
        RecordType::Mx => {
            let mut fields = record.value.split_whitespace();
            let priority = fields.next()?.parse().ok()?;
            let host = fields.next()?;
            WritePayload::Mx {
                value: qualify(host, origin),
                priority,
            }
        }
        RecordType::Srv => {
            let fields: Vec<&str> = record.value.split_whitespace().collect();
            let [priority, weight, port, target] = fields.as_slice() else {
                debug!("Malformed SRV value for {}: {}", record.name, record.value);
                return None;
            };
            WritePayload::Srv {
                value: qualify(target, origin),
                priority: priority.parse().ok()?,
                weight: weight.parse().ok()?,
                port: port.parse().ok()?,
            }
        }
        RecordType::Caa => {
            let mut fields = record.value.trim().splitn(3, char::is_whitespace);
            let flag = fields.next()?.parse().ok()?;
            let tag = fields.next()?.to_string();
            let data = fields.next()?.trim().trim_matches('"').to_string();
            WritePayload::Caa { flag, tag, data }
        }
        RecordType::Soa => {
            debug!("Dropping unsupported {} record for {}", record.record_type, record.name);
            return None;
        }
    };

    Some(ProviderWriteOp {
        name: record.name.clone(),
        record_type: record.record_type,
        ttl: record.ttl,
        payload,
    })
}

fn round_robin_value(record: &CanonicalRecord, origin: &str) -> String {
    match record.record_type {
        RecordType::Ns => qualify(record.value.trim(), origin),
        _ => record.value.trim().to_string(),
    }
}

/// Qualify a hostname value against the zone origin
///
/// `@` expands to `origin.`, dotted names are taken as absolute and get a
/// trailing dot, bare labels are placed under the origin.
pub fn qualify(value: &str, origin: &str) -> String {
    let origin = origin.trim().trim_end_matches('.');
    let value = value.trim();

    if value.is_empty() || value == APEX {
        format!("{}.", origin)
    } else if value.ends_with('.') {
        value.to_string()
    } else if value.contains('.') {
        format!("{}.", value)
    } else {
        format!("{}.{}.", value, origin)
    }
}
