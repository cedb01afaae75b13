//! Queue polling worker pool.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::{watch, Semaphore};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::processor::IngestionProcessor;
use super::queue::{MessageQueue, QueueMessage};
use crate::config::QueueConfig;
use crate::{ErrorCategory, RelayError, Result};

/// Outcome of one receive-and-process round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub received: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub dead_lettered: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Acknowledged,
    DeadLettered,
}

/// Pulls notification batches and processes them concurrently.
///
/// A message is deleted from the queue only after it was processed
/// successfully. Messages that can never succeed (malformed payloads) are
/// dead-lettered; other failures stay queued for redelivery.
pub struct QueuePoller {
    queue: Arc<dyn MessageQueue>,
    processor: Arc<IngestionProcessor>,
    semaphore: Arc<Semaphore>,
    batch_size: usize,
    poll_interval: Duration,
}

impl QueuePoller {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        processor: Arc<IngestionProcessor>,
        config: &QueueConfig,
    ) -> Self {
        Self {
            queue,
            processor,
            semaphore: Arc::new(Semaphore::new(config.workers.max(1))),
            batch_size: config.batch_size.max(1),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
        }
    }

    /// Receive one batch and process it to completion.
    pub async fn poll_once(&self) -> Result<BatchSummary> {
        let messages = self.queue.receive(self.batch_size).await?;
        if messages.is_empty() {
            debug!("No queued messages");
            return Ok(BatchSummary::default());
        }

        let started = Instant::now();
        let received = messages.len();
        debug!("Received {} message(s)", received);

        let handles = messages
            .into_iter()
            .map(|message| {
                let queue = self.queue.clone();
                let processor = self.processor.clone();
                let semaphore = self.semaphore.clone();
                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.map_err(|_| {
                        RelayError::Io(std::io::Error::other("worker pool closed"))
                    })?;
                    handle_message(queue.as_ref(), &processor, message).await
                })
            })
            .collect::<Vec<_>>();

        let mut summary = BatchSummary {
            received,
            ..BatchSummary::default()
        };
        for result in join_all(handles).await {
            match result {
                Ok(Ok(Outcome::Acknowledged)) => summary.succeeded += 1,
                Ok(Ok(Outcome::DeadLettered)) => summary.dead_lettered += 1,
                Ok(Err(_)) => summary.failed += 1,
                Err(e) => {
                    error!("Worker task panicked: {}", e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            received = summary.received,
            succeeded = summary.succeeded,
            failed = summary.failed,
            dead_lettered = summary.dead_lettered,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch processed"
        );
        Ok(summary)
    }

    /// Poll until `shutdown` turns true or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Queue poller started (batch size: {}, interval: {} seconds)",
            self.batch_size,
            self.poll_interval.as_secs()
        );

        let mut timer = interval(self.poll_interval.max(Duration::from_millis(10)));
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = timer.tick() => {
                    if let Err(e) = self.poll_once().await {
                        error!("Failed to poll queue: {}", e);
                    }
                }
            }
        }

        info!("Queue poller stopped");
    }
}

async fn handle_message(
    queue: &dyn MessageQueue,
    processor: &IngestionProcessor,
    message: QueueMessage,
) -> Result<Outcome> {
    if let Err(e) = processor.process_message(&message.body).await {
        if e.category() == ErrorCategory::Malformed {
            queue
                .dead_letter(&message.receipt, &e.to_string())
                .await
                .inspect_err(|err| {
                    error!("Failed to dead-letter message {}: {}", message.receipt, err);
                })?;
            return Ok(Outcome::DeadLettered);
        }
        warn!(
            receipt = %message.receipt,
            kind = e.kind(),
            "Message left for redelivery: {}",
            e
        );
        return Err(e);
    }

    queue.delete(&message.receipt).await.inspect_err(|e| {
        error!("Failed to delete message {}: {}", message.receipt, e);
    })?;
    Ok(Outcome::Acknowledged)
}
