//! The abstract bulk-parallel executor the tick pipeline consumes.
//!
//! Any implementation is acceptable as long as `bulk` runs every iteration
//! to completion before returning (the join is the stage boundary and must
//! publish all writes) and iterations stay independent.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

use crate::error::SimError;

/// How bulk iterations are distributed over workers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScheduleKind {
    /// Fixed contiguous index ranges, one per worker.
    Static,
    /// Work-stealing; free workers take the next chunk.
    #[default]
    Dynamic,
}

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Degree of parallelism. Must be positive.
    pub worker_count: usize,
    pub schedule_kind: ScheduleKind,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: std::thread::available_parallelism().map_or(1, |n| n.get()),
            schedule_kind: ScheduleKind::Dynamic,
        }
    }
}

/// External abort signal. The pipeline polls it at stage boundaries and the
/// driver between ticks; a mid-bulk abort is never attempted.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub trait Scheduler: Sync {
    /// Apply `f(i)` for every `i` in `0..n` with unspecified parallelism
    /// and ordering. Returns once every call has completed; the join makes
    /// all writes visible to the caller.
    fn bulk(&self, n: usize, f: &(dyn Fn(usize) + Sync));

    /// Run one unit of work on some worker, sequenced after everything
    /// submitted before it.
    fn then(&self, work: &mut (dyn FnMut() + Send));
}

/// Executor backed by an owned rayon thread pool.
pub struct RayonScheduler {
    pool: rayon::ThreadPool,
    kind: ScheduleKind,
}

impl RayonScheduler {
    pub fn new(config: &SchedulerConfig) -> Result<Self, SimError> {
        assert!(config.worker_count > 0);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_count)
            .thread_name(|i| format!("nbody-worker-{i}"))
            .build()
            .map_err(|e| SimError::SchedulerFault(e.to_string()))?;
        Ok(Self {
            pool,
            kind: config.schedule_kind,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl Scheduler for RayonScheduler {
    fn bulk(&self, n: usize, f: &(dyn Fn(usize) + Sync)) {
        match self.kind {
            ScheduleKind::Dynamic => self.pool.install(|| (0..n).into_par_iter().for_each(|i| f(i))),
            ScheduleKind::Static => {
                let workers = self.pool.current_num_threads().max(1);
                let chunk = n.div_ceil(workers).max(1);
                self.pool.install(|| {
                    (0..workers).into_par_iter().for_each(|worker| {
                        let start = n.min(worker * chunk);
                        let end = n.min(start + chunk);
                        for i in start..end {
                            f(i);
                        }
                    });
                });
            }
        }
    }

    fn then(&self, work: &mut (dyn FnMut() + Send)) {
        self.pool.install(|| work());
    }
}

/// Single-thread fallback. Trivially conformant; useful as a baseline and
/// for bit-exact comparisons in tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct SequentialScheduler;

impl Scheduler for SequentialScheduler {
    fn bulk(&self, n: usize, f: &(dyn Fn(usize) + Sync)) {
        for i in 0..n {
            f(i);
        }
    }

    fn then(&self, work: &mut (dyn FnMut() + Send)) {
        work();
    }
}
