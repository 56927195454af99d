//! Changeset import / export
//!
//! A changeset is an offline, JSON-encoded list of changes for one domain:
//!
//! ```json
//! {
//!   "domain": "example.com",
//!   "domainId": 12345,
//!   "description": "move mail",
//!   "createdAt": "2024-05-01T12:00:00Z",
//!   "createdBy": "ops",
//!   "changes": [
//!     { "action": "create", "type": "A", "name": "www", "value": "1.2.3.4", "ttl": 300 },
//!     { "action": "delete", "recordId": 77, "type": "CNAME", "name": "old" },
//!     { "action": "delete", "recordId": 78 }
//!   ]
//! }
//! ```
//!
//! Only `create` must carry a `type`. An update or delete that names just a
//! record id gets its type from the provider's listing through
//! [`Changeset::resolve_types`] before it can become a plan.
//!
//! Validation never stops at the first problem: every issue is reported as
//! a [`ChangesetError`] pointing at the offending change and field.

use crate::plan::{MigrationPlan, PlanAction, PlanItem, PlanItemId};
use crate::record::{ProviderRecord, RecordType};
use crate::zone::DEFAULT_TTL;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Action of one change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

impl ChangeAction {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(ChangeAction::Create),
            "update" => Some(ChangeAction::Update),
            "delete" => Some(ChangeAction::Delete),
            _ => None,
        }
    }

    fn plan_action(self) -> PlanAction {
        match self {
            ChangeAction::Create => PlanAction::Create,
            ChangeAction::Update => PlanAction::Update,
            ChangeAction::Delete => PlanAction::Delete,
        }
    }
}

/// One change of a changeset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub action: ChangeAction,
    #[serde(
        default,
        deserialize_with = "deserialize_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub record_id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub record_type: Option<RecordType>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
}

/// An offline change document for one domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Changeset {
    pub domain: String,
    #[serde(default, deserialize_with = "deserialize_id")]
    pub domain_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    pub changes: Vec<Change>,
}

/// One validation problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangesetError {
    /// Index into `changes`; `None` for document-level problems
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    pub field: String,
    pub message: String,
}

impl ChangesetError {
    fn document(field: &str, message: impl Into<String>) -> Self {
        Self {
            index: None,
            field: field.to_string(),
            message: message.into(),
        }
    }

    fn change(index: usize, field: &str, message: impl Into<String>) -> Self {
        Self {
            index: Some(index),
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ChangesetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "changes[{}].{}: {}", index, self.field, self.message),
            None => write!(f, "{}: {}", self.field, self.message),
        }
    }
}

/// Check a changeset document, collecting every problem
///
/// An empty result means [`parse_changeset`] will succeed on the same
/// document.
pub fn validate_changeset(doc: &Value) -> Vec<ChangesetError> {
    let mut errors = Vec::new();

    let Some(obj) = doc.as_object() else {
        errors.push(ChangesetError::document("", "changeset must be a JSON object"));
        return errors;
    };

    match obj.get("domain").and_then(Value::as_str) {
        Some(domain) if !domain.trim().is_empty() => {}
        _ => errors.push(ChangesetError::document("domain", "domain is required")),
    }

    if let Some(id) = obj.get("domainId")
        && !is_id(id)
        && !id.is_null()
    {
        errors.push(ChangesetError::document("domainId", "domainId must be a string or number"));
    }

    for field in ["description", "createdBy"] {
        if let Some(v) = obj.get(field)
            && !v.is_string()
            && !v.is_null()
        {
            errors.push(ChangesetError::document(field, format!("{} must be a string", field)));
        }
    }

    if let Some(v) = obj.get("createdAt")
        && !v.is_null()
        && v.as_str().and_then(|s| DateTime::parse_from_rfc3339(s).ok()).is_none()
    {
        errors.push(ChangesetError::document("createdAt", "createdAt must be an RFC 3339 timestamp"));
    }

    let Some(changes) = obj.get("changes").and_then(Value::as_array) else {
        errors.push(ChangesetError::document("changes", "changes must be an array"));
        return errors;
    };

    for (index, change) in changes.iter().enumerate() {
        validate_change(index, change, &mut errors);
    }

    errors
}

fn validate_change(index: usize, change: &Value, errors: &mut Vec<ChangesetError>) {
    let Some(obj) = change.as_object() else {
        errors.push(ChangesetError::change(index, "", "change must be a JSON object"));
        return;
    };

    let action = obj.get("action").and_then(Value::as_str).and_then(ChangeAction::parse);
    if action.is_none() {
        errors.push(ChangesetError::change(
            index,
            "action",
            "action must be one of create, update, delete",
        ));
    }

    let present = |field: &str| {
        obj.get(field)
            .and_then(Value::as_str)
            .is_some_and(|s| !s.trim().is_empty())
    };

    match obj.get("type") {
        Some(Value::String(t)) if t.parse::<RecordType>().is_ok() => {}
        Some(Value::String(t)) => errors.push(ChangesetError::change(
            index,
            "type",
            format!("unsupported record type '{}'", t),
        )),
        None | Some(Value::Null) => {}
        Some(_) => errors.push(ChangesetError::change(index, "type", "type must be a string")),
    }

    match action {
        Some(ChangeAction::Create) => {
            if obj.get("type").is_none_or(Value::is_null) {
                errors.push(ChangesetError::change(index, "type", "type is required for create"));
            }
            for field in ["name", "value"] {
                if !present(field) {
                    errors.push(ChangesetError::change(
                        index,
                        field,
                        format!("{} is required for create", field),
                    ));
                }
            }
        }
        Some(ChangeAction::Update) | Some(ChangeAction::Delete) => {
            if !obj.get("recordId").is_some_and(is_id) {
                errors.push(ChangesetError::change(
                    index,
                    "recordId",
                    "recordId is required for update and delete",
                ));
            }
        }
        None => {}
    }

    for field in ["name", "value"] {
        if let Some(v) = obj.get(field)
            && !v.is_string()
            && !v.is_null()
        {
            errors.push(ChangesetError::change(index, field, format!("{} must be a string", field)));
        }
    }

    if let Some(ttl) = obj.get("ttl")
        && !ttl.is_null()
        && ttl.as_u64().is_none_or(|t| t > u32::MAX as u64)
    {
        errors.push(ChangesetError::change(
            index,
            "ttl",
            "ttl must be a non-negative integer",
        ));
    }
}

/// Validate and decode a changeset
///
/// # Returns
///
/// - `Ok(Changeset)`: The document is valid
/// - `Err(Vec<ChangesetError>)`: Every problem found
pub fn parse_changeset(text: &str) -> Result<Changeset, Vec<ChangesetError>> {
    let doc: Value = serde_json::from_str(text)
        .map_err(|e| vec![ChangesetError::document("", format!("invalid JSON: {}", e))])?;
    changeset_from_value(doc)
}

/// Validate and decode an already-parsed changeset document
pub fn changeset_from_value(doc: Value) -> Result<Changeset, Vec<ChangesetError>> {
    let errors = validate_changeset(&doc);
    if !errors.is_empty() {
        return Err(errors);
    }
    serde_json::from_value(doc).map_err(|e| vec![ChangesetError::document("", e.to_string())])
}

impl Changeset {
    /// Whether some change names only a record id and needs its type looked up
    pub fn needs_type_lookup(&self) -> bool {
        self.changes.iter().any(|c| c.record_type.is_none())
    }

    /// Fill in missing types (and empty names) from the provider's records
    ///
    /// Changes are matched by record id. Returns how many changes were
    /// resolved; ids the listing does not contain are left untyped.
    pub fn resolve_types(&mut self, existing: &[ProviderRecord]) -> usize {
        let by_id: HashMap<&str, &ProviderRecord> =
            existing.iter().map(|r| (r.id.as_str(), r)).collect();

        let mut resolved = 0;
        for change in self.changes.iter_mut().filter(|c| c.record_type.is_none()) {
            let Some(record) = change.record_id.as_deref().and_then(|id| by_id.get(id)) else {
                continue;
            };
            change.record_type = Some(record.record_type);
            if change.name.trim().is_empty() {
                change.name = record.name.clone();
            }
            resolved += 1;
        }
        resolved
    }

    /// Convert into an executable plan
    ///
    /// The document is an explicit operator decision, so its deletes are
    /// opted in. Item ids follow document order.
    ///
    /// # Returns
    ///
    /// - `Ok(MigrationPlan)`: Every change has a record type
    /// - `Err(Vec<ChangesetError>)`: One entry per change whose type is
    ///   still unknown
    pub fn into_plan(self) -> Result<MigrationPlan, Vec<ChangesetError>> {
        let mut items = Vec::with_capacity(self.changes.len());
        let mut errors = Vec::new();

        for (index, change) in self.changes.into_iter().enumerate() {
            let Some(record_type) = change.record_type else {
                errors.push(ChangesetError::change(
                    index,
                    "type",
                    format!(
                        "type of record {} is unknown at the provider",
                        change.record_id.as_deref().unwrap_or("?")
                    ),
                ));
                continue;
            };
            let existing = change.record_id.map(|id| ProviderRecord {
                id,
                name: change.name.clone(),
                record_type,
                ttl: change.ttl,
                value: String::new(),
            });
            items.push(PlanItem {
                id: PlanItemId(0),
                action: change.action.plan_action(),
                name: change.name,
                record_type,
                value: change.value,
                ttl: change.ttl,
                existing,
                include_delete: change.action == ChangeAction::Delete,
            });
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        let plan = MigrationPlan::from_items(self.domain, items);
        Ok(match self.domain_id {
            Some(id) => plan.with_domain_id(id),
            None => plan,
        })
    }
}

impl MigrationPlan {
    /// Export the executable part of this plan as a changeset
    ///
    /// Skips and delete candidates that are not opted in are left out.
    pub fn to_changeset(&self, created_by: Option<String>, description: Option<String>) -> Changeset {
        let changes = self
            .executable_items()
            .map(|item| Change {
                action: match item.action {
                    PlanAction::Update => ChangeAction::Update,
                    PlanAction::Delete => ChangeAction::Delete,
                    _ => ChangeAction::Create,
                },
                record_id: match item.action {
                    PlanAction::Create => None,
                    _ => item.existing_id().map(str::to_string),
                },
                record_type: Some(item.record_type),
                name: item.name.clone(),
                value: item.value.clone(),
                ttl: item.ttl,
            })
            .collect();

        Changeset {
            domain: self.domain.clone(),
            domain_id: self.domain_id.clone(),
            description,
            created_at: Some(Utc::now()),
            created_by,
            changes,
        }
    }
}

fn is_id(v: &Value) -> bool {
    match v {
        Value::String(s) => !s.trim().is_empty(),
        Value::Number(_) => true,
        _ => false,
    }
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Null) | None => Ok(None),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

fn default_ttl() -> u32 {
    DEFAULT_TTL
}
