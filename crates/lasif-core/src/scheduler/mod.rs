//! Distribution of independent work items over a fixed set of workers.
//!
//! A coordinator feeds items into a bounded queue, workers report one outcome
//! per item on a result channel, and all workers are joined before
//! [`TaskScheduler::distribute`] returns. A failing or panicking item never
//! aborts the batch. Only the coordinator logs progress and writes to the
//! processing log.

mod log;

pub use log::{EventScope, LogHeader, ProcessingLog};

use crate::domain::{LasifError, LasifResult, ProjectConfig};
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionStrategy {
    /// Workers pull from one shared queue.
    #[default]
    SharedQueue,
    /// Worker `i` receives items `i, i + n, i + 2n, ...` up front.
    Interleaved,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("worker count must be at least one")]
    NoWorkers,
    #[error("queue depth must be at least one")]
    NoQueueCapacity,
}

impl From<SchedulerError> for LasifError {
    fn from(error: SchedulerError) -> Self {
        LasifError::configuration("CONFIG.SCHEDULER", error.to_string())
    }
}

/// Splits `items` into `count` interleaved partitions: partition `i` holds
/// `items[i], items[i + count], ...`. A `count` of zero is treated as one.
pub fn partition_interleaved<T>(items: impl IntoIterator<Item = T>, count: usize) -> Vec<Vec<T>> {
    let count = count.max(1);
    let mut partitions: Vec<Vec<T>> = (0..count).map(|_| Vec::new()).collect();
    for (index, item) in items.into_iter().enumerate() {
        partitions[index % count].push(item);
    }
    partitions
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemFailure {
    pub name: String,
    pub error: LasifError,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DistributionReport {
    pub total: usize,
    pub succeeded: Vec<String>,
    pub failures: Vec<ItemFailure>,
}

impl DistributionReport {
    pub fn processed(&self) -> usize {
        self.succeeded.len() + self.failures.len()
    }

    pub fn is_complete(&self) -> bool {
        self.processed() == self.total
    }
}

struct Outcome {
    worker: usize,
    name: String,
    result: LasifResult<()>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskScheduler {
    workers: usize,
    queue_depth: usize,
    strategy: DistributionStrategy,
}

impl TaskScheduler {
    pub fn new(workers: usize, queue_depth: usize) -> Result<Self, SchedulerError> {
        if workers == 0 {
            return Err(SchedulerError::NoWorkers);
        }
        if queue_depth == 0 {
            return Err(SchedulerError::NoQueueCapacity);
        }
        Ok(Self {
            workers,
            queue_depth,
            strategy: DistributionStrategy::default(),
        })
    }

    pub fn from_config(config: &ProjectConfig) -> LasifResult<Self> {
        Ok(Self::new(config.workers, config.queue_depth)?)
    }

    pub fn with_strategy(mut self, strategy: DistributionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Runs `task` once for every item. Failures, including panics, are
    /// reported per item; the returned report accounts for every input.
    pub fn distribute<T, N, F>(
        &self,
        label: &str,
        items: Vec<T>,
        name_of: N,
        task: F,
        log: Option<&ProcessingLog>,
    ) -> DistributionReport
    where
        T: Send,
        N: Fn(&T) -> String + Sync,
        F: Fn(&T) -> LasifResult<()> + Sync,
    {
        let total = items.len();
        let mut report = DistributionReport {
            total,
            ..DistributionReport::default()
        };
        if total == 0 {
            info!(label, "nothing to distribute");
            return report;
        }

        let workers = self.workers.min(total);
        debug!(label, total, workers, strategy = ?self.strategy, "distributing work items");
        let (result_tx, result_rx) = unbounded::<Outcome>();

        thread::scope(|scope| {
            match self.strategy {
                DistributionStrategy::SharedQueue => {
                    let (work_tx, work_rx) = bounded::<T>(self.queue_depth);
                    for worker in 0..workers {
                        let work_rx = work_rx.clone();
                        let result_tx = result_tx.clone();
                        let (name_of, task) = (&name_of, &task);
                        scope.spawn(move || {
                            worker_loop(worker, work_rx.iter(), name_of, task, &result_tx)
                        });
                    }
                    scope.spawn(move || feed(items, &work_tx));
                }
                DistributionStrategy::Interleaved => {
                    for (worker, partition) in
                        partition_interleaved(items, workers).into_iter().enumerate()
                    {
                        let result_tx = result_tx.clone();
                        let (name_of, task) = (&name_of, &task);
                        scope.spawn(move || {
                            worker_loop(worker, partition.into_iter(), name_of, task, &result_tx)
                        });
                    }
                }
            }
            drop(result_tx);
            collect(label, total, &result_rx, log, &mut report);
        });

        info!(
            label,
            total,
            succeeded = report.succeeded.len(),
            failed = report.failures.len(),
            "distribution finished"
        );
        report
    }
}

fn feed<T>(items: Vec<T>, work_tx: &Sender<T>) {
    for item in items {
        if work_tx.send(item).is_err() {
            break;
        }
    }
}

fn worker_loop<T, N, F>(
    worker: usize,
    items: impl Iterator<Item = T>,
    name_of: &N,
    task: &F,
    result_tx: &Sender<Outcome>,
) where
    N: Fn(&T) -> String,
    F: Fn(&T) -> LasifResult<()>,
{
    for item in items {
        let name = name_of(&item);
        let result = catch_unwind(AssertUnwindSafe(|| task(&item)))
            .unwrap_or_else(|payload| Err(panic_error(&name, payload.as_ref())));
        if result_tx.send(Outcome { worker, name, result }).is_err() {
            break;
        }
    }
}

fn collect(
    label: &str,
    total: usize,
    result_rx: &Receiver<Outcome>,
    log: Option<&ProcessingLog>,
    report: &mut DistributionReport,
) {
    let step = (total / 10).max(1);
    for outcome in result_rx.iter() {
        let Outcome {
            worker,
            name,
            result,
        } = outcome;

        if let Some(log) = log {
            if let Err(error) = log.record(&name, &result) {
                warn!(label, error = %error, "failed to write processing log");
            }
        }
        match result {
            Ok(()) => report.succeeded.push(name),
            Err(error) => {
                warn!(label, item = %name, worker, error = %error, "work item failed");
                report.failures.push(ItemFailure { name, error });
            }
        }

        let processed = report.processed();
        if processed % step == 0 || processed == total {
            info!(label, processed, total, "progress");
        }
    }
}

fn panic_error(name: &str, payload: &(dyn Any + Send)) -> LasifError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    LasifError::internal(
        "RUN.TASK_PANIC",
        format!("processing '{}' panicked: {}", name, message),
    )
}
