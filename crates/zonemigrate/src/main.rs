// # zonemigrate - DNS zone migration driver
//
// A THIN integration layer over zonemigrate-core:
// - Reads configuration from environment variables
// - Registers the target provider and DNS queriers
// - Runs parse → (compare) → plan → (apply)
//
// Reconciliation, pacing and retry logic all live in zonemigrate-core.
//
// ## Configuration
//
// ### Input
// - `ZONEMIGRATE_ZONE_FILE`: Zone export to migrate (BIND or tabular paste)
// - `ZONEMIGRATE_CHANGESET`: Changeset JSON to apply instead of a zone file
// - `ZONEMIGRATE_DOMAIN`: Zone apex (defaults to, and must agree with, the origin of the zone file)
//
// ### Target Provider
// - `ZONEMIGRATE_CONSTELLIX_API_KEY`: API key
// - `ZONEMIGRATE_CONSTELLIX_SECRET_KEY`: Secret used to sign requests
// - `ZONEMIGRATE_CONSTELLIX_BASE_URL`: API endpoint override (optional)
//
// ### Run
// - `ZONEMIGRATE_MODE`: `plan` (print plan JSON), `export` (print changeset
//   JSON) or `apply` (execute). Default `plan`
// - `ZONEMIGRATE_INCLUDE_DELETES`: `true` to opt every delete candidate in
// - `ZONEMIGRATE_OPERATION_DELAY_MS`: Delay between provider writes
// - `ZONEMIGRATE_NAMESERVERS`: `label=host,...` sources to compare before
//   planning (`label=` queries the public resolver)
// - `ZONEMIGRATE_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export ZONEMIGRATE_ZONE_FILE=./example.com.zone
// export ZONEMIGRATE_CONSTELLIX_API_KEY=...
// export ZONEMIGRATE_CONSTELLIX_SECRET_KEY=...
// export ZONEMIGRATE_NAMESERVERS=old=ns1.old-host.net,new=ns11.constellix.com
// export ZONEMIGRATE_MODE=apply
//
// zonemigrate
// ```

use anyhow::{Context, Result};
use std::env;
use std::process::ExitCode;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use zonemigrate_core::{
    AggregateRequest, Aggregator, AggregatorConfig, ChangesetError, DomainHandle, Executor,
    ExecutorConfig, ExecutorEvent, MatchStatus, MigrationConfig, MigrationPlan, ParsedZone,
    ProviderConfig, ProviderRegistry, QuerySource, TargetProvider, ZoneParser, compare,
    parse_changeset,
};

/// Exit codes for different termination scenarios
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ZonemigrateExitCode {
    /// Finished; every executed item succeeded
    Success = 0,
    /// Configuration error or unusable input
    ConfigError = 1,
    /// Runtime error (domain could not be created, provider unreachable)
    RuntimeError = 2,
    /// Run finished but at least one item failed
    PartialFailure = 3,
    /// Cancelled by Ctrl-C
    Cancelled = 130,
}

impl From<ZonemigrateExitCode> for ExitCode {
    fn from(code: ZonemigrateExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// What to do with the plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Plan,
    Export,
    Apply,
}

impl Mode {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "plan" => Ok(Mode::Plan),
            "export" => Ok(Mode::Export),
            "apply" => Ok(Mode::Apply),
            other => anyhow::bail!(
                "ZONEMIGRATE_MODE '{}' is not valid. Valid modes: plan, export, apply",
                other
            ),
        }
    }
}

/// Application configuration
struct Config {
    zone_file: Option<String>,
    changeset: Option<String>,
    domain: Option<String>,
    api_key: Option<String>,
    secret_key: Option<String>,
    base_url: Option<String>,
    mode: Mode,
    include_deletes: bool,
    operation_delay_ms: Option<u64>,
    sources: Vec<QuerySource>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        let operation_delay_ms = match non_empty("ZONEMIGRATE_OPERATION_DELAY_MS") {
            Some(value) => Some(value.parse().with_context(|| {
                format!("ZONEMIGRATE_OPERATION_DELAY_MS must be a number. Got: {}", value)
            })?),
            None => None,
        };

        Ok(Self {
            zone_file: non_empty("ZONEMIGRATE_ZONE_FILE"),
            changeset: non_empty("ZONEMIGRATE_CHANGESET"),
            domain: non_empty("ZONEMIGRATE_DOMAIN")
                .map(|d| d.trim_end_matches('.').to_ascii_lowercase()),
            api_key: non_empty("ZONEMIGRATE_CONSTELLIX_API_KEY"),
            secret_key: non_empty("ZONEMIGRATE_CONSTELLIX_SECRET_KEY"),
            base_url: non_empty("ZONEMIGRATE_CONSTELLIX_BASE_URL"),
            mode: Mode::parse(&env::var("ZONEMIGRATE_MODE").unwrap_or_else(|_| "plan".to_string()))?,
            include_deletes: non_empty("ZONEMIGRATE_INCLUDE_DELETES")
                .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes")),
            operation_delay_ms,
            sources: parse_nameservers(&env::var("ZONEMIGRATE_NAMESERVERS").unwrap_or_default())?,
            log_level: env::var("ZONEMIGRATE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        match (&self.zone_file, &self.changeset) {
            (None, None) => anyhow::bail!(
                "ZONEMIGRATE_ZONE_FILE or ZONEMIGRATE_CHANGESET is required. \
                Set it via: export ZONEMIGRATE_ZONE_FILE=./example.com.zone"
            ),
            (Some(_), Some(_)) => anyhow::bail!(
                "ZONEMIGRATE_ZONE_FILE and ZONEMIGRATE_CHANGESET are mutually exclusive"
            ),
            _ => {}
        }

        if self.mode == Mode::Apply && self.provider_config().is_none() {
            anyhow::bail!(
                "ZONEMIGRATE_CONSTELLIX_API_KEY and ZONEMIGRATE_CONSTELLIX_SECRET_KEY \
                are required when ZONEMIGRATE_MODE=apply"
            );
        }

        if let Some(provider) = self.provider_config() {
            provider.validate()?;
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "ZONEMIGRATE_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    fn provider_config(&self) -> Option<ProviderConfig> {
        Some(ProviderConfig::Constellix {
            api_key: self.api_key.clone()?,
            secret_key: self.secret_key.clone()?,
            base_url: self.base_url.clone(),
        })
    }

    fn executor_config(&self) -> ExecutorConfig {
        let mut config = ExecutorConfig::default();
        if let Some(delay) = self.operation_delay_ms {
            config.operation_delay_ms = delay;
        }
        config
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse `label=host,label=` into query sources
fn parse_nameservers(value: &str) -> Result<Vec<QuerySource>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (label, host) = entry.split_once('=').with_context(|| {
                format!(
                    "ZONEMIGRATE_NAMESERVERS entry '{}' must be label=host (or label= for the public resolver)",
                    entry
                )
            })?;
            let label = label.trim();
            if label.is_empty() {
                anyhow::bail!("ZONEMIGRATE_NAMESERVERS entry '{}' has no label", entry);
            }
            Ok(QuerySource::new(label, label, host))
        })
        .collect()
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return ZonemigrateExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return ZonemigrateExitCode::ConfigError.into();
    }

    // Initialize tracing; stdout is reserved for JSON output
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return ZonemigrateExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return ZonemigrateExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match run(config).await {
            Ok(code) => code,
            Err(e) => {
                error!("{:#}", e);
                ZonemigrateExitCode::RuntimeError
            }
        }
    })
    .into()
}

fn build_registry() -> ProviderRegistry {
    let registry = ProviderRegistry::new();

    #[cfg(feature = "constellix")]
    zonemigrate_provider_constellix::register(&registry);

    #[cfg(feature = "hickory")]
    zonemigrate_query_hickory::register(&registry);

    #[cfg(feature = "doh")]
    zonemigrate_query_doh::register(&registry);

    info!(
        "Registered providers: {:?}, queriers: {:?}",
        registry.list_providers(),
        registry.list_queriers()
    );
    registry
}

async fn run(config: Config) -> Result<ZonemigrateExitCode> {
    let registry = build_registry();

    let mut plan = match &config.changeset {
        Some(path) => plan_from_changeset(path, &config, &registry).await?,
        None => plan_from_zone(&config, &registry).await?,
    };
    if config.include_deletes {
        plan.include_all_deletes();
    }

    let counts = plan.counts();
    info!(
        "Plan for {}: {} create, {} update, {} skip, {} delete candidate(s) ({} opted in)",
        plan.domain, counts.create, counts.update, counts.skip, counts.delete, counts.delete_included
    );

    match config.mode {
        Mode::Plan => {
            println!("{}", serde_json::to_string_pretty(&plan)?);
            Ok(ZonemigrateExitCode::Success)
        }
        Mode::Export => {
            let changeset = plan.to_changeset(Some("zonemigrate".to_string()), None);
            println!("{}", serde_json::to_string_pretty(&changeset)?);
            Ok(ZonemigrateExitCode::Success)
        }
        Mode::Apply => apply(&config, &registry, &plan).await,
    }
}

async fn plan_from_changeset(
    path: &str,
    config: &Config,
    registry: &ProviderRegistry,
) -> Result<MigrationPlan> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Cannot read changeset {}", path))?;

    let invalid = |errors: Vec<ChangesetError>| {
        let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
        anyhow::anyhow!("Invalid changeset {}:\n  {}", path, details.join("\n  "))
    };

    let mut changeset = parse_changeset(&text).map_err(invalid)?;
    info!(
        "Loaded changeset for {} with {} change(s)",
        changeset.domain,
        changeset.changes.len()
    );

    if changeset.needs_type_lookup() {
        let Some(provider_config) = config.provider_config() else {
            anyhow::bail!(
                "Changeset {} has changes without a type. Provider credentials are \
                required to look them up",
                path
            );
        };
        let provider: Box<dyn TargetProvider> = registry.create_provider(&provider_config)?;
        let handle = match &changeset.domain_id {
            Some(id) => DomainHandle {
                id: id.clone(),
                name: changeset.domain.clone(),
            },
            None => provider.find_domain(&changeset.domain).await?.with_context(|| {
                format!(
                    "{} does not exist at {}",
                    changeset.domain,
                    provider.provider_name()
                )
            })?,
        };
        let existing = provider.list_records(&handle).await?;
        let resolved = changeset.resolve_types(&existing);
        info!("Resolved the type of {} change(s) from {}", resolved, provider.provider_name());
    }

    changeset.into_plan().map_err(invalid)
}

/// Domain a zone file is planned for
///
/// A configured domain must agree with the `$ORIGIN` the file declares;
/// otherwise record names would be relative to a different apex.
fn zone_domain(configured: Option<&str>, origin: &str, path: &str) -> Result<String> {
    match (configured, origin) {
        (Some(domain), "") => Ok(domain.to_string()),
        (Some(domain), origin) if domain == origin => Ok(domain.to_string()),
        (Some(domain), origin) => anyhow::bail!(
            "{} declares origin {} but ZONEMIGRATE_DOMAIN is {}",
            path,
            origin,
            domain
        ),
        (None, "") => anyhow::bail!(
            "Cannot determine the zone apex of {}. Set ZONEMIGRATE_DOMAIN",
            path
        ),
        (None, origin) => Ok(origin.to_string()),
    }
}

async fn plan_from_zone(config: &Config, registry: &ProviderRegistry) -> Result<MigrationPlan> {
    let Some(path) = &config.zone_file else {
        anyhow::bail!("ZONEMIGRATE_ZONE_FILE is required");
    };

    let mut parser = ZoneParser::new();
    if let Some(domain) = &config.domain {
        parser = parser.with_origin(domain);
    }
    let zone: ParsedZone = parser
        .parse_file(path)
        .await
        .with_context(|| format!("Cannot read zone file {}", path))?;

    let domain = zone_domain(config.domain.as_deref(), &zone.origin, path)?;
    if zone.is_empty() {
        anyhow::bail!("No records found in {}", path);
    }
    info!(
        "Parsed {} record(s) for {} from {} ({:?})",
        zone.records.len(),
        domain,
        path,
        zone.dialect
    );

    if !config.sources.is_empty() {
        compare_sources(registry, &config.sources, &domain).await?;
    }

    let Some(provider_config) = config.provider_config() else {
        warn!("No provider credentials configured; planning against an empty target");
        return Ok(MigrationPlan::build(domain, &zone.records, &[]));
    };

    // Validate the combined settings before touching the provider
    MigrationConfig::new(domain.clone(), provider_config.clone()).validate()?;

    let provider: Box<dyn TargetProvider> = registry.create_provider(&provider_config)?;
    let plan = match provider.find_domain(&domain).await? {
        Some(handle) => {
            let existing = provider.list_records(&handle).await?;
            info!(
                "{} record(s) already at {} for {}",
                existing.len(),
                provider.provider_name(),
                domain
            );
            MigrationPlan::build(domain, &zone.records, &existing).with_domain_id(handle.id)
        }
        None => {
            info!("{} does not exist at {} yet", domain, provider.provider_name());
            MigrationPlan::build(domain, &zone.records, &[])
        }
    };
    Ok(plan)
}

/// Query the configured sources and report how the first two differ
async fn compare_sources(
    registry: &ProviderRegistry,
    sources: &[QuerySource],
    domain: &str,
) -> Result<()> {
    let config = AggregatorConfig::default();
    let request = AggregateRequest::from_config(domain, &config);
    let aggregator = Aggregator::new(registry.querier_factory(), config)?;

    let records = aggregator
        .aggregate(sources, &request, |progress| {
            info!(
                "Querying {}: {}/{}",
                progress.source_label, progress.done, progress.total
            );
        })
        .await?;

    let [old, new, ..] = sources else {
        info!("{} record(s) observed", records.len());
        return Ok(());
    };

    let observed_by = |source: &QuerySource| -> Vec<_> {
        records
            .iter()
            .filter(|r| r.sources.contains(&source.id))
            .cloned()
            .collect()
    };
    let comparison = compare(&observed_by(old), &observed_by(new));

    info!(
        "{} vs {}: {} match, {} mismatch, {} missing at {}, {} only at {}",
        old.label,
        new.label,
        comparison.counts.matched,
        comparison.counts.mismatched,
        comparison.counts.missing_new,
        new.label,
        comparison.counts.new,
        new.label
    );
    for row in comparison.rows.iter().filter(|r| r.status != MatchStatus::Match) {
        warn!(
            "{:?} {} {}: {} -> {}",
            row.status,
            row.name,
            row.record_type,
            row.old_value.as_deref().unwrap_or("-"),
            row.new_value.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

async fn apply(
    config: &Config,
    registry: &ProviderRegistry,
    plan: &MigrationPlan,
) -> Result<ZonemigrateExitCode> {
    let Some(provider_config) = config.provider_config() else {
        anyhow::bail!("Provider credentials are required to apply a plan");
    };

    if plan.is_noop() {
        info!("Nothing to apply for {}", plan.domain);
        return Ok(ZonemigrateExitCode::Success);
    }

    let provider = registry.create_provider(&provider_config)?;
    let (executor, mut events) =
        Executor::new(provider, config.executor_config())?;

    let control = executor.control();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling after the current operation");
            control.cancel();
        }
    });

    let total = plan.executable_items().count();
    let reporter = tokio::spawn(async move {
        let mut finished = 0;
        while let Some(event) = events.recv().await {
            match event {
                ExecutorEvent::OperationSucceeded { items, .. }
                | ExecutorEvent::OperationFailed { items, .. } => {
                    finished += items.len();
                    info!("Progress: {}/{}", finished.min(total), total);
                }
                ExecutorEvent::Finished { .. } => break,
                _ => {}
            }
        }
    });

    let summary = executor.execute(plan).await;
    let cancelled = executor.control().is_cancelled();
    drop(executor);
    let _ = reporter.await;

    let summary = summary?;
    info!(
        "Finished {}: {} succeeded, {} failed, {} skipped",
        plan.domain, summary.success, summary.failed, summary.skipped
    );
    for result in summary.results.iter().filter(|r| r.error.is_some()) {
        warn!(
            "{} {} {} ({:?}): {}",
            result.action,
            result.name,
            result.record_type,
            result.status,
            result.error.as_deref().unwrap_or_default()
        );
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(if cancelled {
        ZonemigrateExitCode::Cancelled
    } else if summary.failed > 0 {
        ZonemigrateExitCode::PartialFailure
    } else {
        ZonemigrateExitCode::Success
    })
}
