//! Multi-source live DNS aggregation
//!
//! Asks every [`QuerySource`] about the same `subdomains × types`
//! cross-product and merges the answers into one deduplicated record set in
//! which each record lists the sources that served it.
//!
//! ## Concurrency
//!
//! Queries are independent and idempotent, so each source's query list is
//! run in bounded batches (`batch_size` in flight). Live nameservers get a
//! short pause between batches; the stateless public resolver does not. A
//! query that fails or exceeds `query_timeout_ms` contributes nothing and
//! never aborts its batch.
//!
//! ```text
//! source 1 ──► [batch][pause][batch]... ──┐
//! source 2 ──► [batch][batch]...        ──┼──► merge by (name, type, value)
//! source N ──► ...                      ──┘
//! ```

use crate::config::AggregatorConfig;
use crate::error::{Error, Result};
use crate::record::{APEX, CanonicalRecord, RecordType, ValueKey, normalize_name, relativize};
use crate::traits::{DnsAnswer, DnsQuerier, DnsQuerierFactory, QuerySource};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Progress report emitted after every batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateProgress {
    /// Queries finished so far, across all sources
    pub done: usize,
    /// Total queries for the whole run
    pub total: usize,
    /// Label of the source currently being queried
    pub source_label: String,
}

/// What to ask every source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateRequest {
    /// Zone apex without a trailing dot
    pub domain: String,
    /// Subdomains relative to the apex ("@" or "" for the apex itself)
    pub subdomains: Vec<String>,
    /// Record types to ask for
    pub record_types: Vec<RecordType>,
}

impl AggregateRequest {
    /// Request covering the configured subdomains and types
    pub fn from_config(domain: impl Into<String>, config: &AggregatorConfig) -> Self {
        Self {
            domain: domain.into(),
            subdomains: config.subdomains.clone(),
            record_types: config.record_types.clone(),
        }
    }

    /// `(fqdn, type)` pairs for one source
    fn queries(&self) -> Vec<(String, RecordType)> {
        let domain = normalize_name(&self.domain);
        self.subdomains
            .iter()
            .flat_map(|sub| {
                let sub = sub.trim().trim_end_matches('.');
                let fqdn = if sub.is_empty() || sub == APEX {
                    domain.clone()
                } else {
                    format!("{}.{}", sub.to_ascii_lowercase(), domain)
                };
                self.record_types.iter().map(move |t| (fqdn.clone(), *t))
            })
            .collect()
    }
}

/// Fans live queries out across sources and merges the observations
pub struct Aggregator {
    factory: Arc<dyn DnsQuerierFactory>,
    config: AggregatorConfig,
}

impl Aggregator {
    /// Create an aggregator that builds one querier per source from `factory`
    pub fn new(factory: Arc<dyn DnsQuerierFactory>, config: AggregatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { factory, config })
    }

    /// Query every source and merge the results
    ///
    /// # Parameters
    ///
    /// - `sources`: Labeled sources, queried one after another
    /// - `request`: Domain, subdomains and types to ask about
    /// - `progress`: Called after every batch with `(done, total, label)`
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<CanonicalRecord>)`: Deduplicated records, sorted by
    ///   `(name, type, value)`, with `sources` populated
    /// - `Err(Error)`: If a querier could not be created for a source
    pub async fn aggregate<F>(
        &self,
        sources: &[QuerySource],
        request: &AggregateRequest,
        mut progress: F,
    ) -> Result<Vec<CanonicalRecord>>
    where
        F: FnMut(AggregateProgress) + Send,
    {
        let queries = request.queries();
        let total = queries.len() * sources.len();
        let mut done = 0;
        let mut merged: BTreeMap<ValueKey, CanonicalRecord> = BTreeMap::new();

        info!(
            "Aggregating {} quer(ies) across {} source(s) for {}",
            total,
            sources.len(),
            request.domain
        );

        for source in sources {
            let querier = self.factory.create(source).map_err(|e| {
                Error::query(format!("Cannot query source '{}': {}", source.label, e))
            })?;

            let observed = self
                .query_source(querier.as_ref(), source, &queries, request, &mut |batch_done| {
                    done += batch_done;
                    progress(AggregateProgress {
                        done,
                        total,
                        source_label: source.label.clone(),
                    });
                })
                .await;

            debug!("Source '{}' returned {} record(s)", source.label, observed.len());
            merge_observations(&mut merged, observed, &source.id);
        }

        Ok(merged.into_values().collect())
    }

    async fn query_source(
        &self,
        querier: &dyn DnsQuerier,
        source: &QuerySource,
        queries: &[(String, RecordType)],
        request: &AggregateRequest,
        on_batch: &mut (dyn FnMut(usize) + Send),
    ) -> Vec<CanonicalRecord> {
        let mut observed = Vec::new();
        let pace = querier.is_live_nameserver();
        let batches: Vec<&[(String, RecordType)]> =
            queries.chunks(self.config.batch_size).collect();

        for (idx, batch) in batches.iter().enumerate() {
            if pace && idx > 0 && self.config.batch_pause_ms > 0 {
                tokio::time::sleep(self.config.batch_pause()).await;
            }

            let results = join_all(
                batch
                    .iter()
                    .map(|(fqdn, record_type)| self.query_one(querier, source, fqdn, *record_type)),
            )
            .await;

            for answers in results {
                observed.extend(answers_to_records(answers, &request.domain));
            }
            on_batch(batch.len());
        }

        observed
    }

    /// Run one query; failures and timeouts become "no data"
    async fn query_one(
        &self,
        querier: &dyn DnsQuerier,
        source: &QuerySource,
        fqdn: &str,
        record_type: RecordType,
    ) -> Vec<DnsAnswer> {
        let query = querier.query(fqdn, record_type);
        match tokio::time::timeout(self.config.query_timeout(), query).await {
            Ok(Ok(answers)) => answers
                .into_iter()
                .filter(|a| a.record_type == record_type && normalize_name(&a.name) == fqdn)
                .collect(),
            Ok(Err(e)) => {
                debug!("{} {} via '{}' failed: {}", fqdn, record_type, source.label, e);
                Vec::new()
            }
            Err(_) => {
                warn!(
                    "{} {} via '{}' timed out after {}ms",
                    fqdn, record_type, source.label, self.config.query_timeout_ms
                );
                Vec::new()
            }
        }
    }
}

fn answers_to_records(answers: Vec<DnsAnswer>, domain: &str) -> Vec<CanonicalRecord> {
    answers
        .into_iter()
        .map(|a| CanonicalRecord::new(relativize(&a.name, domain), a.record_type, a.ttl, a.data))
        .collect()
}

/// Fold one source's observations into the running merge
///
/// Records equal by `(name, type, normalizedValue)` are one record whose
/// `sources` gains `source_id`; everything else is inserted as new.
pub fn merge_observations(
    merged: &mut BTreeMap<ValueKey, CanonicalRecord>,
    observed: Vec<CanonicalRecord>,
    source_id: &str,
) {
    for record in observed {
        merged
            .entry(record.value_key())
            .and_modify(|existing| {
                existing.sources.insert(source_id.to_string());
            })
            .or_insert_with(|| record.with_source(source_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_cross_product() {
        let request = AggregateRequest {
            domain: "Example.com.".to_string(),
            subdomains: vec!["@".to_string(), "www".to_string(), "".to_string()],
            record_types: vec![RecordType::A, RecordType::Mx],
        };
        let queries = request.queries();
        assert_eq!(queries.len(), 6);
        assert_eq!(queries[0], ("example.com".to_string(), RecordType::A));
        assert_eq!(queries[3], ("www.example.com".to_string(), RecordType::Mx));
    }

    #[test]
    fn test_merge_unions_sources() {
        let mut merged = BTreeMap::new();
        merge_observations(
            &mut merged,
            vec![CanonicalRecord::new("www", RecordType::A, 300, "1.2.3.4")],
            "old",
        );
        merge_observations(
            &mut merged,
            vec![
                CanonicalRecord::new("WWW", RecordType::A, 60, "1.2.3.4"),
                CanonicalRecord::new("www", RecordType::A, 60, "5.6.7.8"),
            ],
            "new",
        );

        let records: Vec<CanonicalRecord> = merged.into_values().collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sources.len(), 2);
        assert_eq!(records[0].ttl, 300);
        assert_eq!(records[1].sources.iter().collect::<Vec<_>>(), vec!["new"]);
    }
}
