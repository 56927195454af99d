//! Migration plan synthesis
//!
//! Diffs the records an operator selected for migration against a snapshot
//! of what the target provider already holds, producing an ordered,
//! reviewable plan.
//!
//! ## Matching
//!
//! ```text
//! selected record ──► exact (name, type, value) at provider? ── yes ──► skip
//!                          │ no
//!                          ▼
//!                     same (name, type) at provider?        ── yes ──► update (first in provider order)
//!                          │ no
//!                          ▼
//!                        create
//!
//! provider record never matched ──► delete candidate (include_delete = false)
//! ```
//!
//! Delete candidates are never executed unless opted in through
//! [`MigrationPlan::set_include_delete`] or [`MigrationPlan::include_all_deletes`].
//! Items get stable ids after sorting; callers refer to items by id only.

use crate::record::{CanonicalRecord, ProviderRecord, RecordKey, RecordType, ValueKey, normalize_value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Stable identity of a plan item, assigned once at synthesis time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanItemId(pub u32);

impl fmt::Display for PlanItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a plan item does at the provider
///
/// The declaration order is the execution and display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanAction {
    Create,
    Update,
    Skip,
    Delete,
}

impl PlanAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanAction::Create => "create",
            PlanAction::Update => "update",
            PlanAction::Skip => "skip",
            PlanAction::Delete => "delete",
        }
    }
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of a migration plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanItem {
    pub id: PlanItemId,
    pub action: PlanAction,
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub value: String,
    pub ttl: u32,
    /// Provider record this item skips, updates or deletes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing: Option<ProviderRecord>,
    /// Opt-in flag; only meaningful for `delete`
    #[serde(default)]
    pub include_delete: bool,
}

impl PlanItem {
    fn from_selected(record: &CanonicalRecord, action: PlanAction, existing: Option<&ProviderRecord>) -> Self {
        Self {
            id: PlanItemId(0),
            action,
            name: record.name.clone(),
            record_type: record.record_type,
            value: record.value.clone(),
            ttl: record.ttl,
            existing: existing.cloned(),
            include_delete: false,
        }
    }

    fn orphan(record: &ProviderRecord) -> Self {
        Self {
            id: PlanItemId(0),
            action: PlanAction::Delete,
            name: record.name.clone(),
            record_type: record.record_type,
            value: record.value.clone(),
            ttl: record.ttl,
            existing: Some(record.clone()),
            include_delete: false,
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.name, self.record_type)
    }

    /// Whether the executor will touch the provider for this item
    pub fn is_executable(&self) -> bool {
        match self.action {
            PlanAction::Create | PlanAction::Update => true,
            PlanAction::Skip => false,
            PlanAction::Delete => self.include_delete,
        }
    }

    /// Provider id of the referenced record, if any
    pub fn existing_id(&self) -> Option<&str> {
        self.existing.as_ref().map(|r| r.id.as_str())
    }
}

/// Item totals per action
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanCounts {
    pub create: usize,
    pub update: usize,
    pub skip: usize,
    pub delete: usize,
    /// Delete candidates that are opted in
    pub delete_included: usize,
}

/// A reviewable migration plan for one domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationPlan {
    /// Zone apex without a trailing dot
    pub domain: String,
    /// Provider-assigned domain id, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_id: Option<String>,
    pub items: Vec<PlanItem>,
}

impl MigrationPlan {
    /// Synthesize a plan for `domain`
    pub fn build(
        domain: impl Into<String>,
        selected: &[CanonicalRecord],
        existing: &[ProviderRecord],
    ) -> Self {
        Self {
            domain: domain.into(),
            domain_id: None,
            items: synthesize(selected, existing),
        }
    }

    /// Wrap already-ordered items, assigning ids in order
    pub fn from_items(domain: impl Into<String>, mut items: Vec<PlanItem>) -> Self {
        assign_ids(&mut items);
        Self {
            domain: domain.into(),
            domain_id: None,
            items,
        }
    }

    pub fn with_domain_id(mut self, domain_id: impl Into<String>) -> Self {
        self.domain_id = Some(domain_id.into());
        self
    }

    pub fn get(&self, id: PlanItemId) -> Option<&PlanItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Opt a delete candidate in or out
    ///
    /// # Returns
    ///
    /// `true` if `id` names a delete item, `false` otherwise (nothing changes)
    pub fn set_include_delete(&mut self, id: PlanItemId, include: bool) -> bool {
        match self
            .items
            .iter_mut()
            .find(|item| item.id == id && item.action == PlanAction::Delete)
        {
            Some(item) => {
                item.include_delete = include;
                true
            }
            None => false,
        }
    }

    /// Opt every delete candidate in
    pub fn include_all_deletes(&mut self) {
        for item in self.items.iter_mut().filter(|i| i.action == PlanAction::Delete) {
            item.include_delete = true;
        }
    }

    pub fn counts(&self) -> PlanCounts {
        let mut counts = PlanCounts::default();
        for item in &self.items {
            match item.action {
                PlanAction::Create => counts.create += 1,
                PlanAction::Update => counts.update += 1,
                PlanAction::Skip => counts.skip += 1,
                PlanAction::Delete => {
                    counts.delete += 1;
                    if item.include_delete {
                        counts.delete_included += 1;
                    }
                }
            }
        }
        counts
    }

    /// Items the executor will apply, in execution order
    pub fn executable_items(&self) -> impl Iterator<Item = &PlanItem> {
        self.items.iter().filter(|item| item.is_executable())
    }

    /// True when applying the plan would not change anything
    pub fn is_noop(&self) -> bool {
        self.executable_items().next().is_none()
    }
}

/// Diff `selected` against `existing` into sorted, id-stamped plan items
///
/// Pure and deterministic: the only order dependence is the documented
/// tie-break, where an update targets the first provider record (in the
/// provider's return order) sharing `(name, type)`.
pub fn synthesize(selected: &[CanonicalRecord], existing: &[ProviderRecord]) -> Vec<PlanItem> {
    let existing: Vec<&ProviderRecord> = existing.iter().filter(|r| r.is_migratable()).collect();

    let mut by_exact_key: HashMap<ValueKey, usize> = HashMap::new();
    let mut by_name_type: HashMap<RecordKey, Vec<usize>> = HashMap::new();
    for (idx, record) in existing.iter().enumerate() {
        for value in record.values() {
            by_exact_key
                .entry(ValueKey {
                    key: record.key(),
                    value: normalize_value(value),
                })
                .or_insert(idx);
        }
        by_name_type.entry(record.key()).or_default().push(idx);
    }

    let mut matched = vec![false; existing.len()];
    let mut items = Vec::with_capacity(selected.len() + existing.len());

    for record in selected.iter().filter(|r| r.is_migratable()) {
        if let Some(&idx) = by_exact_key.get(&record.value_key()) {
            matched[idx] = true;
            items.push(PlanItem::from_selected(record, PlanAction::Skip, Some(existing[idx])));
        } else if let Some(&idx) = by_name_type.get(&record.key()).and_then(|v| v.first()) {
            matched[idx] = true;
            items.push(PlanItem::from_selected(record, PlanAction::Update, Some(existing[idx])));
        } else {
            items.push(PlanItem::from_selected(record, PlanAction::Create, None));
        }
    }

    for (record, _) in existing.iter().zip(&matched).filter(|(_, m)| !**m) {
        items.push(PlanItem::orphan(record));
    }

    items.sort_by(|a, b| {
        a.action
            .cmp(&b.action)
            .then_with(|| a.key().cmp(&b.key()))
    });
    assign_ids(&mut items);
    items
}

fn assign_ids(items: &mut [PlanItem]) {
    for (idx, item) in items.iter_mut().enumerate() {
        item.id = PlanItemId(idx as u32 + 1);
    }
}
