//! Sharded asynchronous dispatch of alert-store work.
//!
//! Readings are evaluated and published by the submitter; only the resulting
//! store mutations are queued. Events are routed to a worker by sensor id, so
//! everything about one sensor is applied in submission order while different
//! sensors run in parallel. Each event runs in its own task; a panic is logged
//! and the worker moves on.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::alerts::{AlertIntent, StoreError};
use crate::pipeline::AlertPipeline;
use crate::reading::{Reading, SensorId};

/// How long a sensor deletion may wait for room in a full shard queue.
const DELETE_ENQUEUE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub enum PipelineEvent {
    AlertIntents {
        sensor_id: SensorId,
        intents: Vec<AlertIntent>,
    },
    SensorDeleted {
        sensor_id: SensorId,
        reply: Option<oneshot::Sender<Result<u64, StoreError>>>,
    },
}

impl PipelineEvent {
    fn sensor_id(&self) -> SensorId {
        match self {
            Self::AlertIntents { sensor_id, .. } | Self::SensorDeleted { sensor_id, .. } => {
                *sensor_id
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Dispatch queue {0} is full")]
    QueueFull(usize),

    #[error("Dispatcher is shut down")]
    Closed,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct ReadingDispatcher {
    pipeline: AlertPipeline,
    shards: Arc<[mpsc::Sender<PipelineEvent>]>,
}

impl ReadingDispatcher {
    /// Spawn `shards` workers onto the current runtime. Workers exit once every
    /// clone of the dispatcher is dropped and their queues drain.
    pub fn spawn(pipeline: AlertPipeline, shards: usize, capacity: usize) -> Self {
        let shards = shards.max(1);
        let capacity = capacity.max(1);

        let senders: Vec<_> = (0..shards)
            .map(|index| {
                let (sender, receiver) = mpsc::channel(capacity);
                tokio::spawn(run_worker(index, pipeline.clone(), receiver));
                sender
            })
            .collect();

        tracing::info!(shards, capacity, "Reading dispatcher started");

        Self {
            pipeline,
            shards: senders.into(),
        }
    }

    fn shard_index(&self, sensor_id: SensorId) -> usize {
        // rem_euclid keeps negative ids in range
        sensor_id.rem_euclid(self.shards.len() as i64) as usize
    }

    /// Evaluate a persisted reading, publish its live update, then queue its
    /// alert intents without waiting on the store.
    ///
    /// # Errors
    ///
    /// Returns `QueueFull` when the sensor's shard is saturated and `Closed`
    /// after shutdown. The live update has been published in either case;
    /// only the alert mutations are lost.
    pub async fn submit_reading(&self, reading: Reading) -> Result<(), DispatchError> {
        let evaluation = self.pipeline.evaluate(&reading);
        self.pipeline.publish(&evaluation.envelope).await;

        if evaluation.intents.is_empty() {
            return Ok(());
        }

        self.try_submit(PipelineEvent::AlertIntents {
            sensor_id: reading.sensor_id,
            intents: evaluation.intents,
        })
    }

    /// Queue an event without waiting.
    ///
    /// # Errors
    ///
    /// Returns `QueueFull` when the shard is saturated and `Closed` after
    /// shutdown.
    pub fn try_submit(&self, event: PipelineEvent) -> Result<(), DispatchError> {
        let index = self.shard_index(event.sensor_id());

        self.shards[index].try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(event) => {
                tracing::warn!(
                    shard = index,
                    sensor_id = event.sensor_id(),
                    "Dispatch queue full, dropping event"
                );
                DispatchError::QueueFull(index)
            }
            mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
        })
    }

    /// Resolve a deleted sensor's open alerts after every reading already
    /// queued for it, and wait for the result.
    ///
    /// # Errors
    ///
    /// Returns `QueueFull` if the shard stays saturated, `Closed` after
    /// shutdown, or the store error that made resolution fail.
    pub async fn sensor_deleted(&self, sensor_id: SensorId) -> Result<u64, DispatchError> {
        let index = self.shard_index(sensor_id);
        let (reply, response) = oneshot::channel();

        let event = PipelineEvent::SensorDeleted {
            sensor_id,
            reply: Some(reply),
        };

        self.shards[index]
            .send_timeout(event, DELETE_ENQUEUE_TIMEOUT)
            .await
            .map_err(|e| match e {
                mpsc::error::SendTimeoutError::Timeout(_) => DispatchError::QueueFull(index),
                mpsc::error::SendTimeoutError::Closed(_) => DispatchError::Closed,
            })?;

        let resolved = response.await.map_err(|_| DispatchError::Closed)??;
        Ok(resolved)
    }
}

async fn run_worker(index: usize, pipeline: AlertPipeline, mut receiver: mpsc::Receiver<PipelineEvent>) {
    tracing::debug!(shard = index, "Dispatch worker started");

    while let Some(event) = receiver.recv().await {
        let pipeline = pipeline.clone();
        let handled = tokio::spawn(async move {
            match event {
                PipelineEvent::AlertIntents { intents, .. } => {
                    pipeline.apply_intents(intents).await;
                }
                PipelineEvent::SensorDeleted { sensor_id, reply } => {
                    let result = pipeline.handle_sensor_deleted(sensor_id).await;
                    if let Some(reply) = reply {
                        // The requester may have given up; nothing to do then.
                        let _ = reply.send(result);
                    }
                }
            }
        })
        .await;

        if let Err(e) = handled {
            tracing::error!(shard = index, error = %e, "Pipeline event handler panicked");
        }
    }

    tracing::debug!(shard = index, "Dispatch worker stopped");
}
