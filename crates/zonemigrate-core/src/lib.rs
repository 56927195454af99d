// # zonemigrate-core
//
// Core library for DNS zone reconciliation and migration.
//
// ## Architecture Overview
//
// - **zone**: Parses BIND-style and tabular zone exports into canonical records
// - **Aggregator**: Queries N labeled sources live and merges what they serve
// - **compare**: Row-per-value diff between two record sets
// - **plan**: Diffs selected records against the target into create/update/skip/delete
// - **mapper**: Denormalizes canonical records into provider writes
// - **Executor**: Applies a plan sequentially with pacing, retry, pause and cancel
// - **changeset**: Offline JSON change documents (validate, import, export)
// - **ProviderRegistry**: Plugin-based registry for target providers and queriers
//
// ## Design Principles
//
// 1. **Pure core stages**: Parsing, comparing, planning and mapping never fail
// 2. **Plugin-Based**: Providers and queriers are registered dynamically
// 3. **Library-First**: All core functionality can be used as a library
// 4. **Never silently delete**: Orphans are candidates until opted in

pub mod aggregator;
pub mod changeset;
pub mod compare;
pub mod config;
pub mod error;
pub mod executor;
pub mod mapper;
pub mod plan;
pub mod record;
pub mod registry;
pub mod traits;
pub mod zone;

// Re-export core types for convenience
pub use aggregator::{AggregateProgress, AggregateRequest, Aggregator};
pub use changeset::{Change, ChangeAction, Changeset, ChangesetError, parse_changeset, validate_changeset};
pub use compare::{Comparison, ComparisonCounts, ComparisonRow, MatchStatus, compare};
pub use config::{AggregatorConfig, ExecutorConfig, MigrationConfig, ProviderConfig};
pub use error::{Error, Result};
pub use executor::{
    ExecutionControl, ExecutionPhase, ExecutionSummary, Executor, ExecutorEvent, ItemResult,
    ItemStatus,
};
pub use mapper::{ProviderWriteOp, WritePayload, map_records};
pub use plan::{MigrationPlan, PlanAction, PlanCounts, PlanItem, PlanItemId, synthesize};
pub use record::{CanonicalRecord, ProviderRecord, RecordKey, RecordType};
pub use registry::ProviderRegistry;
pub use traits::{
    DnsAnswer, DnsQuerier, DnsQuerierFactory, DomainHandle, QuerySource, TargetProvider,
    TargetProviderFactory,
};
pub use zone::{ParsedZone, ZoneDialect, ZoneParser, parse_zone, parse_zone_file};
