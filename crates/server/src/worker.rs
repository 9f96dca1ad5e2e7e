//! Triangulation worker pool: durable pull consumers over the new-report
//! queue, one scoring run per message.
//!
//! Handlers run under the worker's own context, never the context of the
//! HTTP request that published the event; the request completes before
//! processing starts.

use async_nats::jetstream::{consumer::PullConsumer, AckKind, Message};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::bus::{BusError, EventBus, ReportEvent};
use crate::triangulation::{TriangulationError, TriangulationService};

/// Messages fetched per pull request.
const FETCH_BATCH: usize = 8;

/// How long a pull request waits for messages before returning empty.
const FETCH_EXPIRES: Duration = Duration::from_secs(5);

/// What to do with a message after its handler ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    /// Handled; remove from the queue.
    Ack,
    /// Failed permanently; remove without redelivery.
    Discard,
    /// Failed; hand back for redelivery.
    Redeliver,
}

/// Map a scoring failure onto a message disposition.
///
/// Not-found is permanent and expected (the report was deleted after
/// enqueue), so the message is plainly acknowledged. Storage failures are
/// terminally nacked by default to avoid poison-message loops; the
/// redeliver switch trades that protection for automatic retries.
fn failure_disposition(err: &TriangulationError, redeliver_on_handler_error: bool) -> Disposition {
    match err {
        TriangulationError::NotFound(_) => Disposition::Ack,
        TriangulationError::Storage { .. } if redeliver_on_handler_error => Disposition::Redeliver,
        TriangulationError::Storage { .. } => Disposition::Discard,
    }
}

/// Pool of consumer tasks feeding the triangulation service.
#[derive(Clone)]
pub struct ReportWorker {
    bus: EventBus,
    triangulation: TriangulationService,
    concurrency: usize,
    running: Arc<RwLock<bool>>,
}

impl ReportWorker {
    /// Create a new worker pool.
    pub fn new(bus: EventBus, triangulation: TriangulationService, concurrency: usize) -> Self {
        Self {
            bus,
            triangulation,
            concurrency,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Run the pool until [`stop`](Self::stop) is called.
    ///
    /// Spawns one consumer task per configured slot; all tasks share the
    /// durable consumer, so the broker balances messages across them.
    pub async fn run(&self) -> Result<(), BusError> {
        *self.running.write().await = true;

        info!(
            "Starting triangulation worker pool ({} consumers)",
            self.concurrency
        );

        let mut handles = Vec::with_capacity(self.concurrency);
        for slot in 0..self.concurrency {
            let worker = self.clone();
            handles.push(tokio::spawn(async move { worker.consume_loop(slot).await }));
        }

        for handle in handles {
            match handle.await {
                Ok(result) => result?,
                Err(e) => error!("Worker task panicked: {}", e),
            }
        }

        info!("Triangulation worker pool stopped");
        Ok(())
    }

    /// Ask every consumer task to stop after its in-flight batch.
    pub async fn stop(&self) {
        *self.running.write().await = false;
    }

    async fn consume_loop(&self, slot: usize) -> Result<(), BusError> {
        let consumer = self.bus.consumer(self.concurrency).await?;
        debug!(slot, "Consumer task started");

        while *self.running.read().await {
            match self.process_batch(&consumer).await {
                Ok(count) => {
                    if count > 0 {
                        debug!(slot, count, "Processed batch");
                    }
                }
                Err(e) => {
                    error!(slot, "Error processing batch: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        debug!(slot, "Consumer task stopped");
        Ok(())
    }

    async fn process_batch(&self, consumer: &PullConsumer) -> Result<usize, BusError> {
        let mut messages = consumer
            .fetch()
            .max_messages(FETCH_BATCH)
            .expires(FETCH_EXPIRES)
            .messages()
            .await
            .map_err(|e| BusError::Consumer(e.to_string()))?;

        let mut count = 0;

        while let Some(message) = messages.next().await {
            match message {
                Ok(message) => {
                    count += 1;
                    self.process_message(message).await;
                }
                Err(e) => {
                    warn!("Error receiving message: {}", e);
                }
            }
        }

        Ok(count)
    }

    async fn process_message(&self, message: Message) {
        let event: ReportEvent = match serde_json::from_slice(&message.payload) {
            Ok(event) => event,
            Err(e) => {
                // Malformed payloads can never succeed; discarding them
                // keeps the queue from looping.
                error!("Malformed report event, discarding: {}", e);
                finish(message, Disposition::Discard).await;
                return;
            }
        };

        debug!(report_id = %event.id, "Processing report event");

        let disposition = match self.triangulation.score(&event.id).await {
            Ok(outcome) => {
                debug!(report_id = %event.id, ?outcome, "Scoring complete");
                Disposition::Ack
            }
            Err(e) => {
                let disposition =
                    failure_disposition(&e, self.bus.redeliver_on_handler_error());
                match disposition {
                    Disposition::Ack => {
                        warn!(report_id = %event.id, "Scoring failed, dropping event: {}", e)
                    }
                    Disposition::Redeliver => {
                        warn!(report_id = %event.id, "Scoring failed, redelivering: {}", e)
                    }
                    Disposition::Discard => {
                        error!(report_id = %event.id, "Scoring failed, discarding: {}", e)
                    }
                }
                disposition
            }
        };

        finish(message, disposition).await;
    }
}

async fn finish(message: Message, disposition: Disposition) {
    let result = match disposition {
        Disposition::Ack => message.ack().await,
        Disposition::Discard => message.ack_with(AckKind::Term).await,
        Disposition::Redeliver => message.ack_with(AckKind::Nak(None)).await,
    };

    if let Err(e) = result {
        warn!("Failed to acknowledge message: {}", e);
    }
}
