//! Parallel fan-out over snapshot indices.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::util::{Error, Result};

/// Fixed-size worker pool running one job per snapshot index.
///
/// Each job owns its output exclusively; results come back in index order.
pub struct SnapshotScheduler {
    pool: ThreadPool,
}

impl SnapshotScheduler {
    /// Pool with `threads` workers, rayon's default when `None`.
    pub fn new(threads: Option<usize>) -> Result<Self> {
        let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("cdx-worker-{}", i));
        if let Some(n) = threads {
            if n == 0 {
                return Err(Error::validation("thread count must be at least 1"));
            }
            builder = builder.num_threads(n);
        }
        let pool = builder.build()?;
        debug!("snapshot scheduler with {} threads", pool.current_num_threads());
        Ok(Self { pool })
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `job` for every index in `0..count` and collect the results in order.
    pub fn run<T, F>(&self, count: usize, job: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        self.pool
            .install(|| (0..count).into_par_iter().map(job).collect())
    }

    /// Like [`run`](Self::run), stopping at the first failed job.
    pub fn try_run<T, F>(&self, count: usize, job: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> Result<T> + Sync + Send,
    {
        self.pool
            .install(|| (0..count).into_par_iter().map(job).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_results_in_index_order() {
        let scheduler = SnapshotScheduler::new(Some(4)).unwrap();
        assert_eq!(scheduler.threads(), 4);
        let squares = scheduler.run(1000, |i| i * i);
        assert_eq!(squares.len(), 1000);
        assert!(squares.iter().enumerate().all(|(i, &v)| v == i * i));
    }

    #[test]
    fn test_every_index_runs_once() {
        let scheduler = SnapshotScheduler::new(None).unwrap();
        let calls = AtomicUsize::new(0);
        scheduler.run(257, |_| calls.fetch_add(1, Ordering::Relaxed));
        assert_eq!(calls.load(Ordering::Relaxed), 257);
    }

    #[test]
    fn test_try_run_propagates_errors() {
        let scheduler = SnapshotScheduler::new(Some(2)).unwrap();
        let result = scheduler.try_run(10, |i| {
            if i == 7 {
                Err(Error::validation("bad snapshot 7"))
            } else {
                Ok(i)
            }
        });
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(matches!(SnapshotScheduler::new(Some(0)), Err(Error::Validation(_))));
    }
}
