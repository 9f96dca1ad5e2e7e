//! NATS JetStream event bus for new-report events.
//!
//! One durable, file-backed work queue carries one message per accepted
//! report. Delivery is at-least-once with explicit acknowledgement; the
//! triangulation handler is idempotent, so redeliveries are harmless.

use async_nats::jetstream::{self, consumer::PullConsumer, stream::Stream};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use vigil_core::Report;

use crate::config::BusConfig;

/// JetStream stream holding report events.
pub const STREAM_NAME: &str = "NEW_REPORTS";

/// Subject new-report events are published on.
pub const SUBJECT: &str = "reports.new";

/// Durable consumer shared by the triangulation worker pool.
pub const CONSUMER_NAME: &str = "triangulation";

/// Initial connection timeout; fail fast when the broker is down.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Event bus errors.
#[derive(Debug, Error)]
pub enum BusError {
    /// Could not reach the broker.
    #[error("Failed to connect to NATS: {0}")]
    Connect(String),

    /// Stream provisioning failed.
    #[error("Failed to provision stream: {0}")]
    Stream(String),

    /// Publish was rejected by the broker.
    #[error("Publish failed: {0}")]
    Publish(String),

    /// Publish did not get a stream acknowledgement within the deadline.
    #[error("Publish timed out after {0} ms")]
    PublishTimeout(u64),

    /// Consumer provisioning failed.
    #[error("Failed to provision consumer: {0}")]
    Consumer(String),

    /// Event serialization failed.
    #[error("Failed to encode report event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The envelope the worker reads back from the queue.
///
/// Publishers send the full [`Report`] entity as a convenience for other
/// consumers; only `id` is semantically required, so unknown fields are
/// ignored on decode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEvent {
    /// Identifier of the report to score.
    pub id: String,
}

/// JetStream-backed publisher/consumer pair for the new-report queue.
#[derive(Clone)]
pub struct EventBus {
    jetstream: jetstream::Context,
    publish_deadline: Duration,
    redeliver_on_handler_error: bool,
}

impl EventBus {
    /// Connect to the broker and set up the JetStream context.
    pub async fn connect(config: &BusConfig) -> Result<Self, BusError> {
        info!("Connecting to NATS at {}", config.url);

        let client = async_nats::ConnectOptions::new()
            .name("vigil-server")
            .connection_timeout(CONNECT_TIMEOUT)
            .connect(&config.url)
            .await
            .map_err(|e| BusError::Connect(e.to_string()))?;

        info!("Connected to NATS at {}", config.url);

        Ok(Self {
            jetstream: jetstream::new(client),
            publish_deadline: Duration::from_millis(config.publish_deadline_ms),
            redeliver_on_handler_error: config.redeliver_on_handler_error,
        })
    }

    /// Ensure the durable report stream exists.
    ///
    /// Work-queue retention: a message is deleted once a consumer
    /// acknowledges it, and survives broker restarts until then.
    pub async fn ensure_stream(&self) -> Result<Stream, BusError> {
        let stream = self
            .jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: STREAM_NAME.to_string(),
                subjects: vec![SUBJECT.to_string()],
                retention: jetstream::stream::RetentionPolicy::WorkQueue,
                storage: jetstream::stream::StorageType::File,
                ..Default::default()
            })
            .await
            .map_err(|e| BusError::Stream(e.to_string()))?;

        info!("Using stream {} with subject {}", STREAM_NAME, SUBJECT);
        Ok(stream)
    }

    /// Publish one new-report event, bounded by the configured deadline.
    ///
    /// The call completes only once the stream has acknowledged the message,
    /// so a success here means the event is durably queued.
    pub async fn publish_report(&self, report: &Report) -> Result<(), BusError> {
        let body = serde_json::to_vec(report)?;
        let mut headers = async_nats::HeaderMap::new();
        headers.insert("Content-Type", "application/json");

        let publish = async {
            let ack = self
                .jetstream
                .publish_with_headers(SUBJECT.to_string(), headers, body.into())
                .await
                .map_err(|e| BusError::Publish(e.to_string()))?;
            ack.await.map_err(|e| BusError::Publish(e.to_string()))?;
            Ok(())
        };

        match tokio::time::timeout(self.publish_deadline, publish).await {
            Ok(result) => result,
            Err(_) => Err(BusError::PublishTimeout(
                self.publish_deadline.as_millis() as u64
            )),
        }
    }

    /// Get the durable pull consumer for the triangulation worker pool.
    pub async fn consumer(&self, max_ack_pending: usize) -> Result<PullConsumer, BusError> {
        let stream = self.ensure_stream().await?;

        let consumer = stream
            .get_or_create_consumer(
                CONSUMER_NAME,
                jetstream::consumer::pull::Config {
                    durable_name: Some(CONSUMER_NAME.to_string()),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    filter_subject: SUBJECT.to_string(),
                    max_ack_pending: max_ack_pending as i64,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| BusError::Consumer(e.to_string()))?;

        info!("Using consumer {}", CONSUMER_NAME);
        Ok(consumer)
    }

    /// Whether handler storage failures should be redelivered instead of
    /// discarded.
    pub fn redeliver_on_handler_error(&self) -> bool {
        self.redeliver_on_handler_error
    }
}
