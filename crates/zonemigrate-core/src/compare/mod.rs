//! Pairwise record set comparison
//!
//! Rows are emitted per value, not per key, because round-robin sets on
//! the two sides can partially overlap.

use crate::record::{CanonicalRecord, RecordKey, RecordType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Classification of one compared value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Same value on both sides
    Match,
    /// Key on both sides, value only on one
    Mismatch,
    /// Key only on the old side
    MissingNew,
    /// Key only on the new side
    New,
}

/// One line of a comparison report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub status: MatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_ttl: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_ttl: Option<u32>,
}

impl ComparisonRow {
    fn new(key: &RecordKey, status: MatchStatus) -> Self {
        Self {
            name: key.name.clone(),
            record_type: key.record_type,
            status,
            old_value: None,
            old_ttl: None,
            new_value: None,
            new_ttl: None,
        }
    }

    fn with_old(mut self, record: &CanonicalRecord) -> Self {
        self.old_value = Some(record.value.clone());
        self.old_ttl = Some(record.ttl);
        self
    }

    fn with_new(mut self, record: &CanonicalRecord) -> Self {
        self.new_value = Some(record.value.clone());
        self.new_ttl = Some(record.ttl);
        self
    }

    /// Same row seen from the other side
    pub fn swapped(&self) -> Self {
        let status = match self.status {
            MatchStatus::MissingNew => MatchStatus::New,
            MatchStatus::New => MatchStatus::MissingNew,
            other => other,
        };
        Self {
            name: self.name.clone(),
            record_type: self.record_type,
            status,
            old_value: self.new_value.clone(),
            old_ttl: self.new_ttl,
            new_value: self.old_value.clone(),
            new_ttl: self.old_ttl,
        }
    }
}

/// Row totals per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonCounts {
    pub matched: usize,
    pub mismatched: usize,
    pub missing_new: usize,
    pub new: usize,
}

impl ComparisonCounts {
    fn record(&mut self, status: MatchStatus) {
        match status {
            MatchStatus::Match => self.matched += 1,
            MatchStatus::Mismatch => self.mismatched += 1,
            MatchStatus::MissingNew => self.missing_new += 1,
            MatchStatus::New => self.new += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.matched + self.mismatched + self.missing_new + self.new
    }
}

/// Result of [`compare`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comparison {
    pub rows: Vec<ComparisonRow>,
    pub counts: ComparisonCounts,
}

impl Comparison {
    /// True when every row is a match
    pub fn is_identical(&self) -> bool {
        self.counts.total() == self.counts.matched
    }
}

/// Compare an old and a new record set
///
/// SOA and apex NS records are ignored. Output is sorted by `(name, type)`;
/// within a key, old-side rows come first in input order, followed by the
/// unclaimed new-side values.
pub fn compare(old: &[CanonicalRecord], new: &[CanonicalRecord]) -> Comparison {
    let old_groups = group(old);
    let new_groups = group(new);

    let mut keys: Vec<&RecordKey> = old_groups.keys().chain(new_groups.keys()).collect();
    keys.sort();
    keys.dedup();

    let mut comparison = Comparison::default();
    let mut push = |row: ComparisonRow| {
        comparison.counts.record(row.status);
        comparison.rows.push(row);
    };

    for key in keys {
        match (old_groups.get(key), new_groups.get(key)) {
            (Some(olds), None) => {
                for record in olds {
                    push(ComparisonRow::new(key, MatchStatus::MissingNew).with_old(record));
                }
            }
            (None, Some(news)) => {
                for record in news {
                    push(ComparisonRow::new(key, MatchStatus::New).with_new(record));
                }
            }
            (Some(olds), Some(news)) => {
                let mut claimed = vec![false; news.len()];
                for record in olds {
                    let value = record.normalized_value();
                    let found = news
                        .iter()
                        .enumerate()
                        .find(|(idx, n)| !claimed[*idx] && n.normalized_value() == value);
                    match found {
                        Some((idx, matched)) => {
                            claimed[idx] = true;
                            push(
                                ComparisonRow::new(key, MatchStatus::Match)
                                    .with_old(record)
                                    .with_new(matched),
                            );
                        }
                        None => {
                            push(ComparisonRow::new(key, MatchStatus::Mismatch).with_old(record))
                        }
                    }
                }
                for (record, _) in news.iter().zip(&claimed).filter(|(_, c)| !**c) {
                    push(ComparisonRow::new(key, MatchStatus::Mismatch).with_new(record));
                }
            }
            (None, None) => {}
        }
    }

    comparison
}

fn group(records: &[CanonicalRecord]) -> BTreeMap<RecordKey, Vec<&CanonicalRecord>> {
    let mut groups: BTreeMap<RecordKey, Vec<&CanonicalRecord>> = BTreeMap::new();
    for record in records.iter().filter(|r| r.is_migratable()) {
        groups.entry(record.key()).or_default().push(record);
    }
    groups
}
