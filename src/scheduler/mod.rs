//! Policy Scheduler (spec.md §4.H).
//!
//! Generic over the policy kind being scheduled (ConfigurationPolicy vs
//! OperatorPolicy get their own evaluator loops per spec.md §5: "Single
//! evaluator task per policy-kind runs serial loop"), this module supplies
//! the shared pieces: discovery caching with the fresh-and-cached-both-empty
//! skip rule, in-memory dedup by (name, resourceVersion), the process-wide
//! mutex each policy evaluation takes, and the timed-sleep pass loop.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::locator::DiscoverySnapshot;
use crate::metrics;

/// Caches the most recent non-empty [`DiscoverySnapshot`] so a transient
/// discovery failure doesn't immediately report every resource as missing
/// (spec.md §3 "Discovery Snapshot": "reused on refresh failure if previous
/// exists").
#[derive(Default)]
pub struct DiscoveryCache {
    cached: RwLock<Option<DiscoverySnapshot>>,
}

pub enum DiscoveryOutcome {
    /// Use this snapshot for the pass.
    Use(DiscoverySnapshot),
    /// Both the freshly fetched snapshot and the cache are empty; skip the
    /// whole pass rather than reporting false non-compliance (spec.md §4.H
    /// item 2, §7 "API transient").
    SkipPass,
}

impl DiscoveryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a freshly fetched snapshot: if it's non-empty, it becomes the
    /// new cache and is used as-is. If it's empty but a previous non-empty
    /// snapshot is cached, that cached snapshot is reused for this pass. If
    /// both are empty, the pass is skipped.
    pub fn refresh(&self, fresh: DiscoverySnapshot) -> DiscoveryOutcome {
        if !fresh.is_empty() {
            metrics::POLICY_DISCOVERY_REFRESH_TOTAL
                .with_label_values(&["ok"])
                .inc();
            if let Ok(mut cached) = self.cached.write() {
                *cached = Some(fresh.clone());
            }
            return DiscoveryOutcome::Use(fresh);
        }

        let cached = self.cached.read().ok().and_then(|c| c.clone());
        match cached {
            Some(snapshot) if !snapshot.is_empty() => {
                metrics::POLICY_DISCOVERY_REFRESH_TOTAL
                    .with_label_values(&["cached"])
                    .inc();
                warn!("discovery refresh returned no resources, reusing last cached snapshot");
                DiscoveryOutcome::Use(snapshot)
            },
            _ => {
                metrics::POLICY_DISCOVERY_REFRESH_TOTAL
                    .with_label_values(&["empty"])
                    .inc();
                DiscoveryOutcome::SkipPass
            },
        }
    }
}

/// Dedupe an in-memory policy list by (name, resourceVersion) — spec.md
/// §4.H item 1. Keeps the first occurrence of each distinct pair.
pub fn dedupe_by_name_and_resource_version<T: Clone>(
    policies: Vec<T>,
    key_fn: impl Fn(&T) -> (String, String),
) -> Vec<T> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(policies.len());

    for policy in policies {
        let key = key_fn(&policy);
        if seen.insert(key) {
            out.push(policy);
        }
    }

    out
}

/// The process-wide write lock taken around each policy's evaluation
/// (spec.md §4.H item 3 / §5: "within iteration policies processed one at a
/// time under process-wide mutex").
#[derive(Clone, Default)]
pub struct EvaluationLock(Arc<Mutex<()>>);

impl EvaluationLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.0.lock().await
    }
}

/// Runs `pass` repeatedly, sleeping `freq - elapsed` between passes
/// (spec.md §4.H item 4). In test mode, runs exactly one pass and returns.
pub async fn run_scheduler_loop<F, Fut>(kind: &str, freq_seconds: u64, test_mode: bool, mut pass: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    loop {
        let start = Instant::now();
        let timer = metrics::POLICY_SCHEDULER_PASS_DURATION.start_timer();

        pass().await;

        timer.observe_duration();
        debug!(kind, "scheduler pass complete");

        if test_mode {
            info!(kind, "test mode: exiting after one scheduler pass");
            return;
        }

        let elapsed = start.elapsed();
        let period = Duration::from_secs(freq_seconds);
        if let Some(remaining) = period.checked_sub(elapsed) {
            if remaining > Duration::ZERO {
                tokio::time::sleep(remaining).await;
            }
        }
    }
}
