//! Test utilities for strata - in-memory stores and engine doubles
//!
//! This module provides utilities to speed up test execution:
//! - An all-in-memory [`TierStore`] that needs no disk or LanceDB
//! - Scripted lexical and vector engines with call counters and failure injection
//! - A [`TierBackend`] wrapper that fails writes or deletes on demand

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{Result, StrataError};
use crate::memory::types::MemoryRecord;
use crate::search::engine::{
    LexicalEngine, LexicalHit, LexicalQuery, VectorEngine, VectorHit, VectorQuery,
};
use crate::storage::{BlockStore, RecordFilter, TierBackend, TierConfig, TierStore, WarmStore};

/// A [`TierStore`] whose three tiers all live in memory
///
/// The cold tier is a second [`WarmStore`], so tests exercise placement and
/// migration without a LanceDB table. Fails on an invalid `config`.
pub fn in_memory_store(config: TierConfig) -> Result<TierStore> {
    let core = BlockStore::in_memory(config.core_max_record_bytes, config.core_max_total_bytes);
    TierStore::with_backends(
        Box::new(core),
        Box::new(WarmStore::in_memory()),
        Box::new(WarmStore::in_memory()),
        config,
    )
}

pub fn lexical_hit(record: &MemoryRecord, score: f64) -> LexicalHit {
    LexicalHit {
        record: record.clone(),
        score,
    }
}

pub fn vector_hit(record: &MemoryRecord, score: f64) -> VectorHit {
    VectorHit {
        record: record.clone(),
        score,
        match_type: "semantic".to_string(),
    }
}

/// Shared failure and delay switches for the engine doubles
#[derive(Debug, Default)]
struct Faults {
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl Faults {
    async fn apply(&self, engine: &str) -> Result<()> {
        let delay = *self.delay.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StrataError::Search(format!("{engine} engine unavailable")));
        }
        Ok(())
    }
}

/// Lexical engine that returns scripted hits
#[derive(Debug, Default)]
pub struct MockLexicalEngine {
    hits: Mutex<Vec<LexicalHit>>,
    faults: Faults,
    calls: AtomicUsize,
}

impl MockLexicalEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hits(hits: Vec<LexicalHit>) -> Self {
        let engine = Self::new();
        engine.set_hits(hits);
        engine
    }

    pub fn set_hits(&self, hits: Vec<LexicalHit>) {
        *self.hits.lock().unwrap_or_else(|p| p.into_inner()) = hits;
    }

    /// Make every following search return an error
    pub fn set_failing(&self, failing: bool) {
        self.faults.failing.store(failing, Ordering::SeqCst);
    }

    /// Sleep this long before answering
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.faults.delay.lock().unwrap_or_else(|p| p.into_inner()) = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LexicalEngine for MockLexicalEngine {
    async fn search(&self, _query: &str, params: &LexicalQuery) -> Result<Vec<LexicalHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.faults.apply("lexical").await?;

        let hits = self.hits.lock().unwrap_or_else(|p| p.into_inner()).clone();
        Ok(hits
            .into_iter()
            .filter(|h| params.category_filter.is_none_or(|c| h.record.category == c))
            .take(params.limit)
            .collect())
    }
}

/// Vector engine that returns scripted hits and counts index builds
#[derive(Debug, Default)]
pub struct MockVectorEngine {
    hits: Mutex<Vec<VectorHit>>,
    faults: Faults,
    calls: AtomicUsize,
    builds: AtomicUsize,
    indexed: AtomicUsize,
}

impl MockVectorEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hits(hits: Vec<VectorHit>) -> Self {
        let engine = Self::new();
        engine.set_hits(hits);
        engine
    }

    pub fn set_hits(&self, hits: Vec<VectorHit>) {
        *self.hits.lock().unwrap_or_else(|p| p.into_inner()) = hits;
    }

    pub fn set_failing(&self, failing: bool) {
        self.faults.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.faults.delay.lock().unwrap_or_else(|p| p.into_inner()) = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    /// Corpus size of the most recent index build
    pub fn indexed_size(&self) -> usize {
        self.indexed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorEngine for MockVectorEngine {
    async fn build_index(&self, corpus: &[MemoryRecord]) -> Result<()> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        self.indexed.store(corpus.len(), Ordering::SeqCst);
        Ok(())
    }

    async fn search(
        &self,
        _query: &str,
        _corpus: &[MemoryRecord],
        params: &VectorQuery,
    ) -> Result<Vec<VectorHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.faults.apply("vector").await?;

        let hits = self.hits.lock().unwrap_or_else(|p| p.into_inner()).clone();
        Ok(hits.into_iter().take(params.max_results).collect())
    }
}

/// Wraps a backend and fails writes or deletes while the matching switch is on
pub struct FlakyBackend {
    inner: Box<dyn TierBackend>,
    fail_writes: Arc<AtomicBool>,
    fail_deletes: Arc<AtomicBool>,
}

impl FlakyBackend {
    pub fn new(inner: Box<dyn TierBackend>) -> Self {
        Self {
            inner,
            fail_writes: Arc::new(AtomicBool::new(false)),
            fail_deletes: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Switch that makes `put` fail while set
    pub fn write_switch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.fail_writes)
    }

    /// Switch that makes `delete` fail while set
    pub fn delete_switch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.fail_deletes)
    }
}

#[async_trait]
impl TierBackend for FlakyBackend {
    async fn put(&mut self, record: &MemoryRecord) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StrataError::Storage(format!("Injected write failure for {}", record.id)));
        }
        self.inner.put(record).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<MemoryRecord>> {
        self.inner.get(id).await
    }

    async fn delete(&mut self, id: Uuid) -> Result<bool> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StrataError::Storage(format!("Injected delete failure for {id}")));
        }
        self.inner.delete(id).await
    }

    async fn scan(&self) -> Result<Vec<MemoryRecord>> {
        self.inner.scan().await
    }

    async fn query(&self, filter: &RecordFilter) -> Result<Vec<MemoryRecord>> {
        self.inner.query(filter).await
    }

    async fn len(&self) -> Result<usize> {
        self.inner.len().await
    }

    async fn total_bytes(&self) -> Result<u64> {
        self.inner.total_bytes().await
    }
}
