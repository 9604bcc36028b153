//! Registry of accepted plans, keyed by statement fingerprint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::plan::{QueryPlan, UpdatePlan};
use crate::statement::{Query, StatementFingerprint, Write};

/// Plans chosen for a workload.
///
/// Query plans are stored once per query shape; updates keep one plan per
/// affected index. Lookups are lock-free for readers.
#[derive(Debug, Default)]
pub struct PlanRegistry {
    queries: DashMap<StatementFingerprint, Arc<QueryPlan>>,
    updates: DashMap<StatementFingerprint, Vec<Arc<UpdatePlan>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PlanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the plan for its query, replacing any earlier one.
    pub fn register_query(&self, plan: QueryPlan) -> StatementFingerprint {
        let fingerprint = StatementFingerprint::from_query(plan.query());
        debug!(fingerprint = fingerprint.hash_value(), plan = %plan, "registered query plan");
        self.queries.insert(fingerprint, Arc::new(plan));
        fingerprint
    }

    /// Register the update plans of one write, replacing any earlier ones.
    pub fn register_update(
        &self,
        write: &Write,
        plans: impl IntoIterator<Item = UpdatePlan>,
    ) -> StatementFingerprint {
        let fingerprint = StatementFingerprint::from_write(write);
        let plans: Vec<Arc<UpdatePlan>> = plans.into_iter().map(Arc::new).collect();
        debug!(
            fingerprint = fingerprint.hash_value(),
            indexes = plans.len(),
            "registered update plans"
        );
        self.updates.insert(fingerprint, plans);
        fingerprint
    }

    pub fn query_plan(&self, query: &Query) -> Option<Arc<QueryPlan>> {
        let found = self
            .queries
            .get(&StatementFingerprint::from_query(query))
            .map(|entry| Arc::clone(entry.value()));
        self.record(found.is_some());
        found
    }

    pub fn update_plans(&self, write: &Write) -> Option<Vec<Arc<UpdatePlan>>> {
        let found = self
            .updates
            .get(&StatementFingerprint::from_write(write))
            .map(|entry| entry.value().clone());
        self.record(found.is_some());
        found
    }

    fn record(&self, hit: bool) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Lookups that found a plan, and lookups that did not.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits.load(Ordering::Relaxed), self.misses.load(Ordering::Relaxed))
    }

    /// Number of registered statements.
    pub fn len(&self) -> usize {
        self.queries.len() + self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.queries.clear();
        self.updates.clear();
    }
}
