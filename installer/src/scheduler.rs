//! Parallel execution with per-identifier serialisation.
//!
//! Actions for different identifiers run concurrently on a `rayon` pool.
//! Actions for the same identifier are serialised by [`IdentifierLocks`],
//! which the executor acquires for the whole of each action.

use crate::executor::{ActionError, ActionReport, Executor};
use crate::manifest::ManifestId;
use crate::planner::Action;
use dashmap::DashMap;
use log::debug;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use rayon::prelude::*;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Guard proving exclusive access to one identifier.
pub type IdentifierGuard = ArcMutexGuard<RawMutex, ()>;

/// One mutex per identifier, created on first use.
#[derive(Debug, Default)]
pub struct IdentifierLocks {
    locks: DashMap<ManifestId, Arc<Mutex<()>>>,
}

impl IdentifierLocks {
    /// Create an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `id` is free, then hold it until the guard drops.
    #[must_use]
    pub fn lock(&self, id: &ManifestId) -> IdentifierGuard {
        let mutex = Arc::clone(
            self.locks
                .entry(id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        mutex.lock_arc()
    }

    /// Return the number of identifiers seen so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Return `true` when no identifier has been locked yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Errors raised while setting up the worker pool.
#[derive(Debug, thiserror::Error)]
#[error("failed to start worker pool: {0}")]
pub struct SchedulerError(#[from] rayon::ThreadPoolBuildError);

/// Return the default worker count.
#[must_use]
pub fn default_jobs() -> usize {
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

/// Execute `actions` on `jobs` workers and return one result per action, in
/// input order. Failed actions are not retried.
///
/// # Errors
///
/// Returns [`SchedulerError`] when the worker pool cannot be created.
pub fn run_actions(
    executor: &Executor<'_>,
    actions: &[Action],
    jobs: usize,
) -> Result<Vec<Result<ActionReport, ActionError>>, SchedulerError> {
    let jobs = jobs.max(1);
    debug!("running {} action(s) on {jobs} worker(s)", actions.len());
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .thread_name(|index| format!("caskwright-worker-{index}"))
        .build()?;
    Ok(pool.install(|| {
        actions
            .par_iter()
            .map(|action| executor.execute(action))
            .collect()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn id(value: &str) -> ManifestId {
        ManifestId::try_from(value).expect("valid id")
    }

    #[test]
    fn same_identifier_is_exclusive() {
        let locks = IdentifierLocks::new();
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    let _guard = locks.lock(&id("font-a"));
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(10));
                    active.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn different_identifiers_do_not_block() {
        let locks = IdentifierLocks::new();
        let _a = locks.lock(&id("font-a"));
        let _b = locks.lock(&id("font-b"));
        assert_eq!(locks.len(), 2);
    }

    #[test]
    fn default_jobs_is_positive() {
        assert!(default_jobs() >= 1);
    }
}
