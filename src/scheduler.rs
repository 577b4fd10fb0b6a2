//! Wave-based ingestion scheduler.
//!
//! Per file the scheduler moves through planning, a warm wave, steady
//! state, draining and done. It submits batches in waves sized as a
//! fraction of the file's total, waits for a wave's worth of completions
//! before submitting more, and consults the memory monitor between waves.
//! Peak resident batch memory is therefore bounded by roughly one wave,
//! not the whole file.

use crate::config::LoadConfig;
use crate::connection::BulkConnection;
use crate::error::Result;
use crate::memory::MemoryMonitor;
use crate::pool::ConnectionPool;
use crate::producer::ChunkProducer;
use crate::progress::ProgressReporter;
use crate::worker;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

/// Per-file plan fixed once pass one has counted the batches.
#[derive(Clone, Debug)]
pub struct FilePlan {
    pub total_batches: u64,
    pub batch_rows: usize,
    pub remaining: u64,
}

impl FilePlan {
    pub fn new(total_batches: u64, batch_rows: usize) -> Self {
        Self {
            total_batches,
            batch_rows,
            remaining: total_batches,
        }
    }

    /// Warm-wave size: ceil(total / denominator). Later waves shrink to
    /// what actually remains, so wave sizes always sum to the total.
    pub fn wave_size(&self, denominator: u64) -> u64 {
        self.total_batches.div_ceil(denominator.max(1))
    }
}

/// Outcome of one file load.
#[derive(Clone, Debug)]
pub struct FileSummary {
    pub run_id: Uuid,
    pub total_batches: u64,
    pub failed_batches: u64,
    pub rows_inserted: u64,
    pub elapsed: Duration,
}

/// Orchestrates the producer, the worker pool and the connection pool for
/// one file at a time. Runs on a single controlling task; `remaining` and
/// the wave size are only ever touched here, so they need no locking.
pub struct IngestionScheduler<C: BulkConnection> {
    pool: Arc<ConnectionPool<C>>,
    config: LoadConfig,
    memory: MemoryMonitor,
}

impl<C: BulkConnection> IngestionScheduler<C> {
    pub fn new(pool: Arc<ConnectionPool<C>>, config: LoadConfig) -> Self {
        let memory = MemoryMonitor::new(config.memory_threshold_bytes);
        Self {
            pool,
            config,
            memory,
        }
    }

    /// Load one CSV file through the worker pool, wave by wave.
    ///
    /// A failed batch is logged, counted toward progress and never
    /// retried; the file keeps going and the summary carries the tally.
    pub async fn load_file(&mut self, path: &Path) -> Result<FileSummary> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();

        // Planning: pass one counts batches so waves and checkpoints can
        // be sized up front.
        info!("Reading and splitting {} into batches...", path.display());
        let count_started = Instant::now();
        let total_batches = ChunkProducer::count_batches(path, self.config.batch_rows)?;
        info!(
            "Split {} into {} batches in {:.2} minutes",
            path.display(),
            total_batches,
            minutes(count_started.elapsed())
        );

        // Zero-batch fast path: no waves, no workers, no division.
        if total_batches == 0 {
            info!("{} has no data rows; nothing to import", path.display());
            return Ok(FileSummary {
                run_id,
                total_batches: 0,
                failed_batches: 0,
                rows_inserted: 0,
                elapsed: started.elapsed(),
            });
        }

        let mut plan = FilePlan::new(total_batches, self.config.batch_rows);
        let mut wave_size = plan.wave_size(self.config.wave_denominator);
        let mut producer = ChunkProducer::open(path, self.config.batch_rows)?;
        let mut progress =
            ProgressReporter::new(total_batches, self.config.progress_step_percent);
        let completed = AtomicU64::new(0);
        self.memory.maybe_reclaim();

        // Warm wave.
        let mut jobs: JoinSet<Result<u64>> = JoinSet::new();
        let mut last_wave = self.submit_wave(&mut producer, &mut plan, wave_size, &mut jobs)?;
        self.memory.maybe_reclaim();

        let mut failed: u64 = 0;
        let mut rows_inserted: u64 = 0;
        let mut since_wave: u64 = 0;

        // Steady state: consume completions in whatever order jobs finish;
        // once a wave's worth has completed, submit the next wave. When the
        // producer is spent the same loop simply drains the stragglers.
        while let Some(joined) = jobs.join_next().await {
            match joined {
                Ok(Ok(rows)) => rows_inserted += rows,
                Ok(Err(err)) => {
                    failed += 1;
                    warn!("{}", err);
                }
                Err(join_err) => {
                    failed += 1;
                    warn!("Load worker panicked: {}", join_err);
                }
            }
            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(milestone) = progress.observe(done) {
                info!(
                    "{}: {}% ({}/{} batches) in {:.2} minutes",
                    path.display(),
                    milestone.percent,
                    milestone.completed,
                    total_batches,
                    minutes(milestone.elapsed)
                );
            }
            since_wave += 1;
            if since_wave >= last_wave && plan.remaining > 0 {
                // Wave boundary: completed batch buffers are already
                // dropped; check whether the system wants more back.
                self.memory.maybe_reclaim();
                wave_size = wave_size.min(plan.remaining);
                last_wave = self.submit_wave(&mut producer, &mut plan, wave_size, &mut jobs)?;
                since_wave = 0;
            }
        }

        let done = completed.load(Ordering::SeqCst);
        debug_assert_eq!(done, total_batches);

        // End of file: wave buffers are gone, one more pressure check.
        self.memory.maybe_reclaim();
        let summary = FileSummary {
            run_id,
            total_batches,
            failed_batches: failed,
            rows_inserted,
            elapsed: started.elapsed(),
        };
        info!(
            "Data import completed in {:.2} minutes (run {})",
            minutes(summary.elapsed),
            run_id
        );
        if failed > 0 {
            warn!(
                "{}/{} batches failed for {}; their rows were not loaded",
                failed,
                total_batches,
                path.display()
            );
        }
        Ok(summary)
    }

    /// Pull up to `wave_size` batches and submit each as an independent
    /// job. Returns how many were actually submitted (the producer may run
    /// out first on the final wave).
    fn submit_wave(
        &self,
        producer: &mut ChunkProducer,
        plan: &mut FilePlan,
        wave_size: u64,
        jobs: &mut JoinSet<Result<u64>>,
    ) -> Result<u64> {
        let mut submitted: u64 = 0;
        for _ in 0..wave_size {
            match producer.next_batch()? {
                Some(batch) => {
                    let pool = Arc::clone(&self.pool);
                    let table = self.config.table.clone();
                    jobs.spawn(worker::run_insert(batch, pool, table));
                    submitted += 1;
                }
                None => break,
            }
        }
        plan.remaining = plan.remaining.saturating_sub(submitted);
        Ok(submitted)
    }
}

fn minutes(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() / 60.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wave_size_is_fifth_of_total() {
        assert_eq!(FilePlan::new(10, 100).wave_size(5), 2);
        assert_eq!(FilePlan::new(11, 100).wave_size(5), 3);
        assert_eq!(FilePlan::new(1, 100).wave_size(5), 1);
        assert_eq!(FilePlan::new(4, 100).wave_size(5), 1);
    }

    #[test]
    fn test_wave_size_guards_zero_denominator() {
        assert_eq!(FilePlan::new(10, 100).wave_size(0), 10);
    }

    #[test]
    fn test_shrinking_wave_sequence_sums_to_total() {
        // Mirror of the steady-state shrink rule: wave = min(wave, remaining).
        for total in [1u64, 4, 5, 7, 10, 23, 100, 101] {
            let plan = FilePlan::new(total, 100);
            let mut wave = plan.wave_size(5);
            let mut remaining = total;
            let mut submitted = Vec::new();
            while remaining > 0 {
                wave = wave.min(remaining);
                submitted.push(wave);
                remaining -= wave;
            }
            assert_eq!(submitted.iter().sum::<u64>(), total);
            assert!(submitted.iter().all(|w| *w <= total.div_ceil(5)));
        }
    }
}
