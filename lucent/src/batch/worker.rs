//! Worker lifetime budget and the per-worker thread pool.

use std::sync::atomic::{AtomicU32, Ordering};

use rand::Rng;

use crate::config::WorkerConfig;
use crate::error::{Error, Result};

/// Counts batches accepted by one worker. Once the limit is reached every further
/// batch is refused with [`Error::WorkerExhausted`] so the host can recycle the worker
/// and return whatever memory the allocator kept.
#[derive(Debug)]
pub struct WorkerBudget {
    limit: Option<u32>,
    used: AtomicU32,
}

impl WorkerBudget {
    /// Limit is `max_operations` plus a random `0..=max_operations_jitter`, so a fleet of
    /// workers started together does not recycle in lockstep.
    pub fn new(config: &WorkerConfig) -> Self {
        let limit = config.max_operations.map(|max| {
            let jitter = if config.max_operations_jitter > 0 {
                rand::rng().random_range(0..=config.max_operations_jitter)
            } else {
                0
            };
            max.saturating_add(jitter)
        });
        Self::with_limit(limit)
    }

    pub fn with_limit(limit: Option<u32>) -> Self {
        Self {
            limit,
            used: AtomicU32::new(0),
        }
    }

    pub fn limit(&self) -> Option<u32> {
        self.limit
    }

    pub fn used(&self) -> u32 {
        self.used.load(Ordering::Acquire)
    }

    pub fn remaining(&self) -> Option<u32> {
        self.limit.map(|limit| limit.saturating_sub(self.used()))
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == Some(0)
    }

    /// Reserves one operation.
    pub fn acquire(&self) -> Result<()> {
        let Some(limit) = self.limit else {
            self.used.fetch_add(1, Ordering::AcqRel);
            return Ok(());
        };

        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used < limit).then_some(used + 1)
            })
            .map(|_| ())
            .map_err(|_| {
                tracing::warn!(limit, "Worker operation budget exhausted");
                Error::WorkerExhausted { limit }
            })
    }
}

/// Builds the rayon pool a batch runs in. `threads == 0` means one per core.
pub fn build_thread_pool(threads: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("lucent-worker-{i}"))
        .build()
        .map_err(|e| Error::Unexpected(format!("Failed to build worker thread pool: {e}")))
}
