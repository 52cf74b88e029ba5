//! Fan-out/fan-in of partition work.
//!
//! An executor maps every partition through
//! [`process_partition`](crate::pipeline::aggregate::process_partition) and
//! hands back the complete list of partial aggregates. A partition that fails
//! fails the whole map step; it is never reported as zero demand.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Semaphore;
use tracing::{Instrument, debug, error};

use crate::error::PipelineError;
use crate::pipeline::aggregate::process_partition;
use crate::pipeline::types::{PartialAggregate, Partition};

#[async_trait]
pub trait PartitionExecutor: Send + Sync {
    /// Returns one partial aggregate per input partition, in no particular order.
    async fn map_partitions(
        &self,
        partitions: Vec<Partition>,
    ) -> Result<Vec<PartialAggregate>, PipelineError>;
}

/// Runs partitions one after another on the calling task.
#[derive(Debug, Default, Clone, Copy)]
pub struct SequentialExecutor;

#[async_trait]
impl PartitionExecutor for SequentialExecutor {
    async fn map_partitions(
        &self,
        partitions: Vec<Partition>,
    ) -> Result<Vec<PartialAggregate>, PipelineError> {
        partitions.iter().map(process_partition).collect()
    }
}

/// Runs partitions on the tokio blocking pool, at most `concurrency` at a time.
///
/// Once a partition fails, workers that have not started their partition skip
/// it. Blocking work already running cannot be interrupted and finishes in the
/// background; its result is discarded.
#[derive(Debug, Clone, Copy)]
pub struct TokioExecutor {
    concurrency: usize,
}

impl TokioExecutor {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }
}

#[async_trait]
impl PartitionExecutor for TokioExecutor {
    #[tracing::instrument(skip_all, fields(partitions = partitions.len(), concurrency = self.concurrency))]
    async fn map_partitions(
        &self,
        partitions: Vec<Partition>,
    ) -> Result<Vec<PartialAggregate>, PipelineError> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut tasks = Vec::with_capacity(partitions.len());

        for partition in partitions {
            let sem = semaphore.clone();
            let cancelled = cancelled.clone();
            let service = partition.service.clone();
            let span = tracing::info_span!(
                "partition_worker",
                service = %partition.service,
                tickets = partition.tickets.len(),
            );

            let task = tokio::spawn(
                async move {
                    let _permit = match sem.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(e) => return Err(e.to_string()),
                    };
                    let span = tracing::Span::current();
                    tokio::task::spawn_blocking(move || {
                        let _entered = span.enter();
                        if cancelled.load(Ordering::Acquire) {
                            return Err(PipelineError::WorkerFailed {
                                service: partition.service.clone(),
                                message: "cancelled after an earlier failure".to_string(),
                            });
                        }
                        let result = process_partition(&partition);
                        if result.is_err() {
                            cancelled.store(true, Ordering::Release);
                        }
                        result
                    })
                    .await
                    .map_err(|e| e.to_string())
                }
                .instrument(span),
            );

            tasks.push((service, task));
        }

        let mut partials = Vec::with_capacity(tasks.len());
        let mut failure: Option<PipelineError> = None;

        // Wait for every worker; after the first failure the rest are aborted.
        for (service, task) in tasks {
            if failure.is_some() {
                task.abort();
                continue;
            }

            let outcome = match task.await {
                Ok(Ok(result)) => result,
                Ok(Err(message)) => Err(PipelineError::WorkerFailed {
                    service: service.clone(),
                    message,
                }),
                Err(e) => Err(PipelineError::WorkerFailed {
                    service: service.clone(),
                    message: e.to_string(),
                }),
            };

            match outcome {
                Ok(partial) => {
                    debug!(service = %service, keys = partial.len(), "Partition collected");
                    partials.push(partial);
                }
                Err(e) => {
                    error!(service = %service, error = %e, "Partition failed");
                    cancelled.store(true, Ordering::Release);
                    failure = Some(e);
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(partials),
        }
    }
}
