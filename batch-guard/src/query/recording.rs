//! A store wrapper that records every query it forwards.
//!
//! Used to verify query counts (one per rule group per batch) in tests and
//! benchmarks.

use super::store::{StoreBackend, StoreQuery};
use crate::core::ValueSet;
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};

/// Which store operation a query used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Fetch,
    Count,
}

/// Summary of one forwarded query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryRecord {
    pub kind: QueryKind,
    pub connection: Option<String>,
    pub table: String,
    pub column: String,
    pub candidates: usize,
    pub conditions: usize,
}

impl QueryRecord {
    fn new(kind: QueryKind, query: &StoreQuery) -> Self {
        Self {
            kind,
            connection: query.connection.clone(),
            table: query.table.clone(),
            column: query.column.clone(),
            candidates: query.values.len(),
            conditions: query.conditions.len(),
        }
    }
}

/// Forwards to an inner [`StoreBackend`], logging each non-empty query.
#[derive(Debug)]
pub struct RecordingStore<S> {
    inner: S,
    log: Mutex<Vec<QueryRecord>>,
}

impl<S: StoreBackend> RecordingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            log: Mutex::new(Vec::new()),
        }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of queries forwarded so far.
    pub fn query_count(&self) -> usize {
        self.entries().len()
    }

    /// Snapshot of the forwarded queries.
    pub fn queries(&self) -> Vec<QueryRecord> {
        self.entries().clone()
    }

    /// Number of forwarded queries against `column`.
    pub fn count_for_column(&self, column: &str) -> usize {
        self.entries().iter().filter(|q| q.column == column).count()
    }

    /// Clears the log.
    pub fn reset(&self) {
        self.entries().clear();
    }

    fn entries(&self) -> MutexGuard<'_, Vec<QueryRecord>> {
        // a poisoned log is still a valid log
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, kind: QueryKind, query: &StoreQuery) {
        if !query.values.is_empty() {
            self.entries().push(QueryRecord::new(kind, query));
        }
    }
}

#[async_trait]
impl<S: StoreBackend> StoreBackend for RecordingStore<S> {
    async fn fetch_matching(&self, query: &StoreQuery) -> Result<ValueSet> {
        self.record(QueryKind::Fetch, query);
        self.inner.fetch_matching(query).await
    }

    async fn count_matching(&self, query: &StoreQuery) -> Result<usize> {
        self.record(QueryKind::Count, query);
        self.inner.count_matching(query).await
    }
}
