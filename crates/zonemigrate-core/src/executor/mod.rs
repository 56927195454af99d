//! Remote mutation executor
//!
//! Applies a [`MigrationPlan`] against a [`TargetProvider`], one write at a
//! time.
//!
//! ## Architecture
//!
//! ```text
//!                   ┌──────────────────┐
//!  MigrationPlan ──►│ compile          │── creates, updates, opted-in deletes
//!                   └──────────────────┘
//!                            │
//!                            ▼
//!                   ┌──────────────────┐       ┌──────────────────┐
//!  ExecutionControl►│ Executor         │──────►│ TargetProvider   │
//!  (pause/cancel)   │ (sequential)     │       │ (single-shot)    │
//!                   └──────────────────┘       └──────────────────┘
//!                            │
//!                            ▼
//!                 ExecutorEvent / ExecutionSummary
//! ```
//!
//! ## State Machine
//!
//! `idle → creating_domain → pushing_records → done | error`
//!
//! Failing to resolve or create the domain aborts the run before any record
//! is touched. After that, each operation fails independently.
//!
//! ## Pacing
//!
//! Writes are never concurrent. A fixed delay separates operations. A
//! transient failure is retried exactly once: an HTTP 429 after the
//! rate-limit backoff, anything else (timeouts, transport errors) after the
//! regular operation delay.

pub mod control;

pub use control::{ControlState, ExecutionControl};

use crate::config::ExecutorConfig;
use crate::error::{Error, Result};
use crate::mapper::{ProviderWriteOp, map_records};
use crate::plan::{MigrationPlan, PlanAction, PlanItem, PlanItemId};
use crate::record::{CanonicalRecord, RecordKey, RecordType};
use crate::traits::{DomainHandle, TargetProvider};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Executor lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    Idle,
    CreatingDomain,
    PushingRecords,
    Done,
    Error,
}

/// Outcome of one plan item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Success,
    Failed,
    Skipped,
}

/// Per-item entry of an [`ExecutionSummary`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemResult {
    pub item_id: PlanItemId,
    pub action: PlanAction,
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Final report of an execution run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub results: Vec<ItemResult>,
}

impl ExecutionSummary {
    fn push(&mut self, item: &PlanItem, status: ItemStatus, error: Option<String>) {
        match status {
            ItemStatus::Success => self.success += 1,
            ItemStatus::Failed => self.failed += 1,
            ItemStatus::Skipped => self.skipped += 1,
        }
        self.results.push(ItemResult {
            item_id: item.id,
            action: item.action,
            name: item.name.clone(),
            record_type: item.record_type,
            status,
            error,
        });
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

/// Events emitted by the Executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorEvent {
    /// Phase transition
    PhaseChanged { phase: ExecutionPhase },

    /// Target domain resolved or created
    DomainReady { domain: String, domain_id: String },

    /// Provider write started
    OperationStarted {
        action: PlanAction,
        name: String,
        record_type: RecordType,
        items: Vec<PlanItemId>,
    },

    /// Provider write succeeded
    OperationSucceeded {
        action: PlanAction,
        name: String,
        record_type: RecordType,
        items: Vec<PlanItemId>,
    },

    /// Provider write failed (after the retry, if any)
    OperationFailed {
        action: PlanAction,
        name: String,
        record_type: RecordType,
        items: Vec<PlanItemId>,
        error: String,
    },

    /// Provider answered 429; retrying once after `backoff_ms`
    RateLimited {
        name: String,
        record_type: RecordType,
        backoff_ms: u64,
    },

    /// Transient failure other than 429; retrying once after `delay_ms`
    Retrying {
        name: String,
        record_type: RecordType,
        error: String,
        delay_ms: u64,
    },

    /// Item not attempted
    ItemSkipped { item: PlanItemId, reason: String },

    /// Run paused between operations
    Paused,

    /// Run resumed
    Resumed,

    /// Run finished
    Finished {
        success: usize,
        failed: usize,
        skipped: usize,
    },
}

/// What one provider call does
#[derive(Debug, Clone, PartialEq, Eq)]
enum OperationKind {
    Create(ProviderWriteOp),
    Update {
        record_id: String,
        op: ProviderWriteOp,
    },
    Delete {
        record_id: String,
    },
    /// Nothing the provider can express
    Unmappable,
}

/// One provider call and the plan items it settles
#[derive(Debug, Clone)]
struct Operation<'a> {
    action: PlanAction,
    name: String,
    record_type: RecordType,
    kind: OperationKind,
    items: Vec<&'a PlanItem>,
}

impl Operation<'_> {
    fn item_ids(&self) -> Vec<PlanItemId> {
        self.items.iter().map(|i| i.id).collect()
    }
}

/// Sequential plan executor
///
/// ## Lifecycle
///
/// 1. Create with [`Executor::new()`], keeping the event receiver
/// 2. Hand [`Executor::control()`] clones to whoever may pause or cancel
/// 3. Run with [`Executor::execute()`]
pub struct Executor {
    /// Target provider
    provider: Box<dyn TargetProvider>,

    /// Pacing and retry settings
    config: ExecutorConfig,

    /// Pause / cancel handle
    control: ExecutionControl,

    /// Current phase
    phase: watch::Sender<ExecutionPhase>,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<ExecutorEvent>,
}

impl Executor {
    /// Create a new executor
    ///
    /// # Returns
    ///
    /// A tuple of (executor, event_receiver) where event_receiver yields
    /// executor events
    pub fn new(
        provider: Box<dyn TargetProvider>,
        config: ExecutorConfig,
    ) -> Result<(Self, mpsc::Receiver<ExecutorEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);
        let (phase, _) = watch::channel(ExecutionPhase::Idle);

        let executor = Self {
            provider,
            config,
            control: ExecutionControl::new(),
            phase,
            event_tx: tx,
        };

        Ok((executor, rx))
    }

    /// Handle for pausing, resuming or cancelling this executor
    pub fn control(&self) -> ExecutionControl {
        self.control.clone()
    }

    pub fn phase(&self) -> ExecutionPhase {
        *self.phase.borrow()
    }

    /// Apply a plan
    ///
    /// # Returns
    ///
    /// - `Ok(ExecutionSummary)`: Every executable item, with its outcome
    /// - `Err(Error::Domain)`: The domain could not be resolved or created;
    ///   no record was touched
    pub async fn execute(&self, plan: &MigrationPlan) -> Result<ExecutionSummary> {
        let operations = compile(plan);
        let mut summary = ExecutionSummary::default();

        if self.control.is_cancelled() {
            info!("Execution cancelled before start");
            self.skip_remaining(&operations, &mut summary);
            return Ok(self.finish(summary));
        }

        self.set_phase(ExecutionPhase::CreatingDomain);
        let domain = match self.resolve_domain(plan).await {
            Ok(domain) => domain,
            Err(e) => {
                error!("Cannot resolve domain {}: {}", plan.domain, e);
                self.set_phase(ExecutionPhase::Error);
                return Err(Error::domain(format!("{}: {}", plan.domain, e)));
            }
        };
        info!("Domain {} ready (id {})", domain.name, domain.id);
        self.emit_event(ExecutorEvent::DomainReady {
            domain: domain.name.clone(),
            domain_id: domain.id.clone(),
        });

        self.set_phase(ExecutionPhase::PushingRecords);
        info!(
            "Applying {} operation(s) via {}",
            operations.len(),
            self.provider.provider_name()
        );

        for (idx, operation) in operations.iter().enumerate() {
            if idx > 0 && self.config.operation_delay_ms > 0 {
                tokio::time::sleep(self.config.operation_delay()).await;
            }

            if !self.wait_until_runnable().await {
                info!("Execution cancelled, skipping {} operation(s)", operations.len() - idx);
                self.skip_remaining(&operations[idx..], &mut summary);
                break;
            }

            self.apply(&domain, operation, &mut summary).await;
        }

        Ok(self.finish(summary))
    }

    async fn resolve_domain(&self, plan: &MigrationPlan) -> Result<DomainHandle> {
        match &plan.domain_id {
            Some(id) => Ok(DomainHandle {
                id: id.clone(),
                name: plan.domain.clone(),
            }),
            None => self.provider.ensure_domain(&plan.domain).await,
        }
    }

    async fn wait_until_runnable(&self) -> bool {
        if !self.control.is_paused() {
            return !self.control.is_cancelled();
        }

        info!("Execution paused");
        self.emit_event(ExecutorEvent::Paused);
        let runnable = self.control.wait_until_runnable().await;
        if runnable {
            info!("Execution resumed");
            self.emit_event(ExecutorEvent::Resumed);
        }
        runnable
    }

    async fn apply(&self, domain: &DomainHandle, operation: &Operation<'_>, summary: &mut ExecutionSummary) {
        if operation.kind == OperationKind::Unmappable {
            let reason = format!(
                "{} {} cannot be expressed at {}",
                operation.name,
                operation.record_type,
                self.provider.provider_name()
            );
            debug!("{}", reason);
            for item in &operation.items {
                self.emit_event(ExecutorEvent::ItemSkipped {
                    item: item.id,
                    reason: reason.clone(),
                });
                summary.push(item, ItemStatus::Skipped, Some(reason.clone()));
            }
            return;
        }

        self.emit_event(ExecutorEvent::OperationStarted {
            action: operation.action,
            name: operation.name.clone(),
            record_type: operation.record_type,
            items: operation.item_ids(),
        });

        let result = match self.call(domain, operation).await {
            Err(e) if e.is_rate_limited() => {
                warn!(
                    "Rate limited on {} {} {}, retrying once in {}ms",
                    operation.action, operation.name, operation.record_type, self.config.rate_limit_backoff_ms
                );
                self.emit_event(ExecutorEvent::RateLimited {
                    name: operation.name.clone(),
                    record_type: operation.record_type,
                    backoff_ms: self.config.rate_limit_backoff_ms,
                });
                tokio::time::sleep(self.config.rate_limit_backoff()).await;
                self.call(domain, operation).await
            }
            Err(e) if e.is_transient() => {
                warn!(
                    "{} {} {} failed ({}), retrying once in {}ms",
                    operation.action, operation.name, operation.record_type, e, self.config.operation_delay_ms
                );
                self.emit_event(ExecutorEvent::Retrying {
                    name: operation.name.clone(),
                    record_type: operation.record_type,
                    error: e.to_string(),
                    delay_ms: self.config.operation_delay_ms,
                });
                tokio::time::sleep(self.config.operation_delay()).await;
                self.call(domain, operation).await
            }
            other => other,
        };

        match result {
            Ok(()) => {
                info!("{} {} {} succeeded", operation.action, operation.name, operation.record_type);
                self.emit_event(ExecutorEvent::OperationSucceeded {
                    action: operation.action,
                    name: operation.name.clone(),
                    record_type: operation.record_type,
                    items: operation.item_ids(),
                });
                for item in &operation.items {
                    summary.push(item, ItemStatus::Success, None);
                }
            }
            Err(e) => {
                let message = format!(
                    "{} {} {}: {}",
                    operation.action, operation.name, operation.record_type, e
                );
                warn!("Operation failed: {}", message);
                self.emit_event(ExecutorEvent::OperationFailed {
                    action: operation.action,
                    name: operation.name.clone(),
                    record_type: operation.record_type,
                    items: operation.item_ids(),
                    error: e.to_string(),
                });
                for item in &operation.items {
                    summary.push(item, ItemStatus::Failed, Some(message.clone()));
                }
            }
        }
    }

    /// Perform a single provider call
    async fn call(&self, domain: &DomainHandle, operation: &Operation<'_>) -> Result<()> {
        match &operation.kind {
            OperationKind::Create(op) => {
                let id = self.provider.create_record(domain, op).await?;
                debug!("Created {} {} as record {}", op.name, op.record_type, id);
                Ok(())
            }
            OperationKind::Update { record_id, op } => {
                self.provider.update_record(domain, record_id, op).await
            }
            OperationKind::Delete { record_id } => {
                self.provider
                    .delete_record(domain, operation.record_type, record_id)
                    .await
            }
            OperationKind::Unmappable => Ok(()),
        }
    }

    fn skip_remaining(&self, operations: &[Operation<'_>], summary: &mut ExecutionSummary) {
        for operation in operations {
            for item in &operation.items {
                self.emit_event(ExecutorEvent::ItemSkipped {
                    item: item.id,
                    reason: "cancelled".to_string(),
                });
                summary.push(item, ItemStatus::Skipped, Some("cancelled".to_string()));
            }
        }
    }

    fn finish(&self, summary: ExecutionSummary) -> ExecutionSummary {
        self.set_phase(ExecutionPhase::Done);
        info!(
            "Execution finished: {} succeeded, {} failed, {} skipped",
            summary.success, summary.failed, summary.skipped
        );
        self.emit_event(ExecutorEvent::Finished {
            success: summary.success,
            failed: summary.failed,
            skipped: summary.skipped,
        });
        summary
    }

    fn set_phase(&self, phase: ExecutionPhase) {
        debug!("Executor phase: {:?}", phase);
        self.phase.send_replace(phase);
        self.emit_event(ExecutorEvent::PhaseChanged { phase });
    }

    /// Emit an executor event, dropping it if the channel is full
    fn emit_event(&self, event: ExecutorEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}

/// Turn executable plan items into provider operations
///
/// - Creates of a round-robin type sharing `(name, type)` become one write.
/// - Updates are grouped by the provider record they target. For
///   round-robin types the write carries the update values plus the values
///   of skip items already on that record, so existing members survive.
///   For singular types the first item updates the record and the rest are
///   created alongside it.
/// - Opted-in deletes map one to one.
fn compile(plan: &MigrationPlan) -> Vec<Operation<'_>> {
    let mut operations = Vec::new();

    let mut seen: HashMap<RecordKey, usize> = HashMap::new();
    let mut create_order: Vec<Vec<&PlanItem>> = Vec::new();
    for item in plan.items.iter().filter(|i| i.action == PlanAction::Create) {
        if item.record_type.is_multi_value() {
            let slot = *seen.entry(item.key()).or_insert_with(|| {
                create_order.push(Vec::new());
                create_order.len() - 1
            });
            create_order[slot].push(item);
        } else {
            create_order.push(vec![item]);
        }
    }
    for group in create_order {
        operations.push(write_operation(plan, PlanAction::Create, group, None));
    }

    let mut updates: Vec<(String, Vec<&PlanItem>)> = Vec::new();
    for item in plan.items.iter().filter(|i| i.action == PlanAction::Update) {
        let Some(record_id) = item.existing_id() else {
            continue;
        };
        match updates.iter_mut().find(|(id, _)| id == record_id) {
            Some((_, group)) => group.push(item),
            None => updates.push((record_id.to_string(), vec![item])),
        }
    }
    for (record_id, group) in updates {
        if group[0].record_type.is_multi_value() {
            let kept: Vec<&PlanItem> = plan
                .items
                .iter()
                .filter(|i| i.action == PlanAction::Skip && i.existing_id() == Some(record_id.as_str()))
                .collect();
            operations.push(write_update(plan, group, kept, record_id));
        } else {
            let mut group = group.into_iter();
            if let Some(first) = group.next() {
                operations.push(write_update(plan, vec![first], Vec::new(), record_id));
            }
            for extra in group {
                operations.push(write_operation(plan, PlanAction::Create, vec![extra], None));
            }
        }
    }

    for item in plan
        .items
        .iter()
        .filter(|i| i.action == PlanAction::Delete && i.include_delete)
    {
        let kind = match item.existing_id() {
            Some(id) => OperationKind::Delete {
                record_id: id.to_string(),
            },
            None => OperationKind::Unmappable,
        };
        operations.push(Operation {
            action: PlanAction::Delete,
            name: item.name.clone(),
            record_type: item.record_type,
            kind,
            items: vec![item],
        });
    }

    operations
}

fn write_update<'a>(
    plan: &MigrationPlan,
    items: Vec<&'a PlanItem>,
    kept: Vec<&'a PlanItem>,
    record_id: String,
) -> Operation<'a> {
    let values: Vec<&PlanItem> = items.iter().chain(kept.iter()).copied().collect();
    let mut operation = write_operation(plan, PlanAction::Update, values, Some(record_id));
    operation.items = items;
    operation
}

fn write_operation<'a>(
    plan: &MigrationPlan,
    action: PlanAction,
    items: Vec<&'a PlanItem>,
    record_id: Option<String>,
) -> Operation<'a> {
    let records: Vec<CanonicalRecord> = items
        .iter()
        .map(|i| CanonicalRecord::new(i.name.clone(), i.record_type, i.ttl, i.value.clone()))
        .collect();
    let op = map_records(&records, &plan.domain).into_iter().next();

    let kind = match (op, record_id) {
        (Some(op), Some(record_id)) => OperationKind::Update { record_id, op },
        (Some(op), None) => OperationKind::Create(op),
        (None, _) => OperationKind::Unmappable,
    };

    Operation {
        action,
        name: items[0].name.clone(),
        record_type: items[0].record_type,
        kind,
        items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ProviderRecord;

    fn existing(id: &str, name: &str, record_type: RecordType, value: &str) -> ProviderRecord {
        ProviderRecord {
            id: id.to_string(),
            name: name.to_string(),
            record_type,
            ttl: 300,
            value: value.to_string(),
        }
    }

    #[test]
    fn test_compile_groups_round_robin_creates() {
        let plan = MigrationPlan::build(
            "example.com",
            &[
                CanonicalRecord::new("@", RecordType::A, 300, "1.1.1.1"),
                CanonicalRecord::new("www", RecordType::Cname, 300, "@"),
                CanonicalRecord::new("@", RecordType::A, 300, "2.2.2.2"),
            ],
            &[],
        );
        let operations = compile(&plan);
        assert_eq!(operations.len(), 2);
        assert_eq!(operations[0].items.len(), 2);
        match &operations[0].kind {
            OperationKind::Create(op) => {
                assert_eq!(op.presentation_values(), vec!["1.1.1.1", "2.2.2.2"])
            }
            other => panic!("unexpected operation {:?}", other),
        }
    }

    #[test]
    fn test_compile_update_keeps_skipped_values() {
        let plan = MigrationPlan::build(
            "example.com",
            &[
                CanonicalRecord::new("@", RecordType::A, 300, "1.1.1.1"),
                CanonicalRecord::new("@", RecordType::A, 300, "3.3.3.3"),
            ],
            &[existing("5", "@", RecordType::A, "1.1.1.1\n2.2.2.2")],
        );
        let operations = compile(&plan);
        assert_eq!(operations.len(), 1);
        assert_eq!(operations[0].items.len(), 1);
        match &operations[0].kind {
            OperationKind::Update { record_id, op } => {
                assert_eq!(record_id, "5");
                assert_eq!(op.presentation_values(), vec!["3.3.3.3", "1.1.1.1"]);
            }
            other => panic!("unexpected operation {:?}", other),
        }
    }

    #[test]
    fn test_compile_singular_update_collision_creates_rest() {
        let plan = MigrationPlan::build(
            "example.com",
            &[
                CanonicalRecord::new("@", RecordType::Mx, 300, "10 mx1.example.com."),
                CanonicalRecord::new("@", RecordType::Mx, 300, "20 mx2.example.com."),
            ],
            &[existing("9", "@", RecordType::Mx, "5 old.example.net.")],
        );
        let operations = compile(&plan);
        assert_eq!(operations.len(), 2);
        assert!(matches!(operations[0].kind, OperationKind::Update { .. }));
        assert!(matches!(operations[1].kind, OperationKind::Create(_)));
    }

    #[test]
    fn test_compile_only_opted_in_deletes() {
        let mut plan = MigrationPlan::build(
            "example.com",
            &[],
            &[
                existing("1", "a", RecordType::A, "1.1.1.1"),
                existing("2", "b", RecordType::A, "2.2.2.2"),
            ],
        );
        assert!(compile(&plan).is_empty());

        plan.set_include_delete(PlanItemId(2), true);
        let operations = compile(&plan);
        assert_eq!(operations.len(), 1);
        assert_eq!(
            operations[0].kind,
            OperationKind::Delete {
                record_id: "2".to_string()
            }
        );
    }

    #[test]
    fn test_summary_serializes_status() {
        let summary = ExecutionSummary {
            success: 0,
            failed: 1,
            skipped: 0,
            results: vec![ItemResult {
                item_id: PlanItemId(1),
                action: PlanAction::Create,
                name: "www".to_string(),
                record_type: RecordType::A,
                status: ItemStatus::Failed,
                error: Some("boom".to_string()),
            }],
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["results"][0]["status"], "failed");
        assert_eq!(json["results"][0]["item_id"], 1);
    }
}
