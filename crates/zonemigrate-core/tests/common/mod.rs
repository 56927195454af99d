//! Test doubles and common utilities for contract tests
//!
//! This module provides minimal test doubles that record how the core
//! drives its collaborators without talking to any real DNS service.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use zonemigrate_core::config::ExecutorConfig;
use zonemigrate_core::error::{Error, Result};
use zonemigrate_core::traits::{
    DnsAnswer, DnsQuerier, DnsQuerierFactory, DomainHandle, QuerySource, TargetProvider,
};
use zonemigrate_core::{CanonicalRecord, ProviderRecord, ProviderWriteOp, RecordType};

/// Scripted failure for one provider write call
#[derive(Debug, Clone)]
pub enum Fault {
    /// HTTP 429
    RateLimited,
    /// Request deadline exceeded
    Timeout,
    /// Any other failure
    Fail(String),
}

impl Fault {
    fn into_error(self) -> Error {
        match self {
            Fault::RateLimited => Error::rate_limited("429 Too Many Requests"),
            Fault::Timeout => Error::timeout("request deadline exceeded"),
            Fault::Fail(msg) => Error::provider("mock", msg),
        }
    }
}

/// A mock TargetProvider that tracks calls
///
/// Write calls (create / update / delete, retries included) are numbered
/// from 1; a fault scripted for call N is returned once on that call.
#[derive(Clone)]
pub struct MockTargetProvider {
    /// Every write call, as "create www A" / "update 7 @ MX" / "delete 9 A"
    writes: Arc<Mutex<Vec<String>>>,
    /// Write payloads, in call order
    ops: Arc<Mutex<Vec<ProviderWriteOp>>>,
    /// Call counter for ensure_domain()
    domain_call_count: Arc<AtomicUsize>,
    /// Scripted faults by write call number
    faults: Arc<Mutex<HashMap<usize, Fault>>>,
    /// Fail ensure_domain()
    domain_fails: bool,
    /// Records returned by list_records()
    existing: Arc<Mutex<Vec<ProviderRecord>>>,
    /// Writes currently in progress
    in_flight: Arc<AtomicUsize>,
    /// Highest number of concurrent writes observed
    max_in_flight: Arc<AtomicUsize>,
    /// Time each write takes
    write_latency: Duration,
}

impl MockTargetProvider {
    pub fn new() -> Self {
        Self {
            writes: Arc::new(Mutex::new(Vec::new())),
            ops: Arc::new(Mutex::new(Vec::new())),
            domain_call_count: Arc::new(AtomicUsize::new(0)),
            faults: Arc::new(Mutex::new(HashMap::new())),
            domain_fails: false,
            existing: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            write_latency: Duration::ZERO,
        }
    }

    /// Provider whose domain cannot be resolved or created
    pub fn with_failing_domain() -> Self {
        Self {
            domain_fails: true,
            ..Self::new()
        }
    }

    pub fn with_write_latency(mut self, latency: Duration) -> Self {
        self.write_latency = latency;
        self
    }

    pub fn with_existing(self, records: Vec<ProviderRecord>) -> Self {
        *self.existing.lock().unwrap() = records;
        self
    }

    /// Fail write call number `call` (1-based) once
    pub fn fail_call(&self, call: usize, fault: Fault) {
        self.faults.lock().unwrap().insert(call, fault);
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    pub fn ops(&self) -> Vec<ProviderWriteOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn domain_call_count(&self) -> usize {
        self.domain_call_count.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn write(&self, label: String, op: Option<&ProviderWriteOp>) -> Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let call = {
            let mut writes = self.writes.lock().unwrap();
            writes.push(label);
            writes.len()
        };
        if let Some(op) = op {
            self.ops.lock().unwrap().push(op.clone());
        }

        if !self.write_latency.is_zero() {
            tokio::time::sleep(self.write_latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.faults.lock().unwrap().remove(&call) {
            Some(fault) => Err(fault.into_error()),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl TargetProvider for MockTargetProvider {
    async fn find_domain(&self, domain: &str) -> Result<Option<DomainHandle>> {
        Ok(Some(DomainHandle {
            id: "100".to_string(),
            name: domain.to_string(),
        }))
    }

    async fn ensure_domain(&self, domain: &str) -> Result<DomainHandle> {
        self.domain_call_count.fetch_add(1, Ordering::SeqCst);
        if self.domain_fails {
            return Err(Error::auth("invalid API key"));
        }
        Ok(DomainHandle {
            id: "100".to_string(),
            name: domain.to_string(),
        })
    }

    async fn list_records(&self, _domain: &DomainHandle) -> Result<Vec<ProviderRecord>> {
        Ok(self.existing.lock().unwrap().clone())
    }

    async fn create_record(&self, _domain: &DomainHandle, op: &ProviderWriteOp) -> Result<String> {
        self.write(format!("create {} {}", op.name, op.record_type), Some(op))
            .await?;
        Ok(format!("new-{}", self.write_count()))
    }

    async fn update_record(
        &self,
        _domain: &DomainHandle,
        record_id: &str,
        op: &ProviderWriteOp,
    ) -> Result<()> {
        self.write(
            format!("update {} {} {}", record_id, op.name, op.record_type),
            Some(op),
        )
        .await
    }

    async fn delete_record(
        &self,
        _domain: &DomainHandle,
        record_type: RecordType,
        record_id: &str,
    ) -> Result<()> {
        self.write(format!("delete {} {}", record_id, record_type), None)
            .await
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// What one mock source serves
#[derive(Default)]
pub struct MockZone {
    /// Answers by (fqdn, type)
    answers: HashMap<(String, RecordType), Vec<DnsAnswer>>,
    /// Names whose queries never answer
    hanging: Vec<String>,
    /// Names whose queries fail
    failing: Vec<String>,
    /// Query counter
    query_count: AtomicUsize,
    /// Time each query takes
    latency: Duration,
    /// Queries currently in progress
    in_flight: AtomicUsize,
    /// Highest number of concurrent queries observed
    max_in_flight: AtomicUsize,
}

impl MockZone {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(mut self, fqdn: &str, record_type: RecordType, ttl: u32, data: &str) -> Self {
        self.answers
            .entry((fqdn.to_string(), record_type))
            .or_default()
            .push(DnsAnswer {
                name: format!("{}.", fqdn),
                record_type,
                ttl,
                data: data.to_string(),
            });
        self
    }

    /// Add an answer record served for a query of `(fqdn, record_type)`
    /// whose owner or type differs from the question (e.g. a CNAME chain)
    pub fn extra(
        mut self,
        fqdn: &str,
        record_type: RecordType,
        owner: &str,
        owner_type: RecordType,
        data: &str,
    ) -> Self {
        self.answers
            .entry((fqdn.to_string(), record_type))
            .or_default()
            .push(DnsAnswer {
                name: format!("{}.", owner),
                record_type: owner_type,
                ttl: 300,
                data: data.to_string(),
            });
        self
    }

    pub fn hang(mut self, fqdn: &str) -> Self {
        self.hanging.push(fqdn.to_string());
        self
    }

    pub fn fail(mut self, fqdn: &str) -> Self {
        self.failing.push(fqdn.to_string());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn query_count(&self) -> usize {
        self.query_count.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// A mock DnsQuerier serving one [`MockZone`]
pub struct MockDnsQuerier {
    zone: Arc<MockZone>,
    live: bool,
}

#[async_trait::async_trait]
impl DnsQuerier for MockDnsQuerier {
    async fn query(&self, fqdn: &str, record_type: RecordType) -> Result<Vec<DnsAnswer>> {
        self.zone.query_count.fetch_add(1, Ordering::SeqCst);

        let now = self.zone.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.zone.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.zone.latency.is_zero() {
            tokio::time::sleep(self.zone.latency).await;
        }
        self.zone.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.zone.hanging.iter().any(|n| n == fqdn) {
            std::future::pending::<()>().await;
        }
        if self.zone.failing.iter().any(|n| n == fqdn) {
            return Err(Error::query(format!("SERVFAIL for {}", fqdn)));
        }

        Ok(self
            .zone
            .answers
            .get(&(fqdn.to_string(), record_type))
            .cloned()
            .unwrap_or_default())
    }

    fn is_live_nameserver(&self) -> bool {
        self.live
    }

    fn querier_name(&self) -> &'static str {
        "mock"
    }
}

/// A factory handing out queriers by source id
#[derive(Default)]
pub struct MockQuerierFactory {
    zones: HashMap<String, Arc<MockZone>>,
}

impl MockQuerierFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_zone(mut self, source_id: &str, zone: MockZone) -> Self {
        self.zones.insert(source_id.to_string(), Arc::new(zone));
        self
    }

    pub fn zone(&self, source_id: &str) -> Arc<MockZone> {
        Arc::clone(&self.zones[source_id])
    }
}

impl DnsQuerierFactory for MockQuerierFactory {
    fn create(&self, source: &QuerySource) -> Result<Box<dyn DnsQuerier>> {
        let zone = self
            .zones
            .get(&source.id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("no mock zone for {}", source.id)))?;
        Ok(Box::new(MockDnsQuerier {
            zone,
            live: !source.is_public_resolver(),
        }))
    }
}

/// Executor settings fast enough for tests
pub fn fast_executor_config() -> ExecutorConfig {
    ExecutorConfig {
        operation_delay_ms: 0,
        rate_limit_backoff_ms: 10,
        event_channel_capacity: 100,
    }
}

pub fn record(name: &str, record_type: RecordType, value: &str) -> CanonicalRecord {
    CanonicalRecord::new(name, record_type, 300, value)
}

pub fn provider_record(id: &str, name: &str, record_type: RecordType, value: &str) -> ProviderRecord {
    ProviderRecord {
        id: id.to_string(),
        name: name.to_string(),
        record_type,
        ttl: 300,
        value: value.to_string(),
    }
}
