//! Compute many latitude slices on a thread pool.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use log::info;
use rayon::prelude::*;

use super::aggregate::{CloudOptics, SliceInputs};
use super::tables::TableStore;
use super::OpticsParameters;
use crate::error::OpticsError;

/// Shared progress of a batch: how many slices have finished and whether the
/// remaining ones should be skipped.
#[derive(Debug, Default)]
pub struct BatchProgress {
    completed: AtomicUsize,
    cancelled: AtomicBool,
}

impl BatchProgress {
    /// Number of slices that have finished, successfully or not.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    /// Ask the batch to stop. Slices that haven't started yet fail with
    /// [`OpticsError::Cancelled`].
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether [`BatchProgress::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Build a rayon pool with `num_threads` workers, or rayon's default if `None`.
pub fn thread_pool(num_threads: Option<usize>) -> Result<rayon::ThreadPool, OpticsError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads.unwrap_or(0))
        .build()
        .map_err(|e| OpticsError::ThreadPool(e.to_string()))
}

impl TableStore {
    /// Compute each slice independently on the current rayon pool, reporting
    /// through `progress`.
    ///
    /// The results are in the same order as `slices`. Each slice gets its own
    /// result so one bad slice doesn't hide the others.
    pub fn compute_slices_with_progress(
        &self,
        parameters: &OpticsParameters,
        slices: &[SliceInputs<'_>],
        progress: &BatchProgress,
    ) -> Vec<Result<CloudOptics, OpticsError>> {
        let mut results = Vec::new();
        slices
            .par_iter()
            .map(|slice| {
                if progress.is_cancelled() {
                    return Err(OpticsError::Cancelled);
                }
                self.compute(parameters, slice)
            })
            .inspect(|_| {
                progress.completed.fetch_add(1, Ordering::Relaxed);
            })
            .collect_into_vec(&mut results);
        results
    }

    /// Compute many latitude slices in parallel.
    ///
    /// The number of worker threads is controlled by `num_threads`: a positive
    /// integer, or `None` to automatically choose the number of threads.
    /// Returns the outputs in slice order, or the first error by slice order.
    pub fn compute_slices(
        &self,
        parameters: &OpticsParameters,
        slices: &[SliceInputs<'_>],
        num_threads: Option<usize>,
    ) -> Result<Vec<CloudOptics>, OpticsError> {
        let pool = thread_pool(num_threads)?;
        info!(
            "Processing cloud optics for {} slices on {} threads",
            slices.len(),
            pool.current_num_threads()
        );

        let progress = BatchProgress::default();
        let results =
            pool.install(|| self.compute_slices_with_progress(parameters, slices, &progress));
        info!("Completed cloud optics for {} slices", progress.completed());

        results.into_iter().collect()
    }
}
