//! Live subscriber connections grouped by greenhouse.
//!
//! Each connection is represented by the sending half of a bounded channel;
//! the transport task owning the receiver writes payloads to its socket. The
//! registry never blocks on a subscriber:
//!
//! - a closed channel means the connection is gone, so it is evicted;
//! - a full channel means a slow consumer, so that one update is dropped.
//!
//! Broadcast snapshots the group under the lock and sends after releasing it,
//! which lets `disconnect` race with an in-flight broadcast safely.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::live::envelope::GroupKey;

pub type ConnectionId = Uuid;

/// A connection is `Connecting` until `connect` hands out its id, `Joined`
/// while registered and `Left` once removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Joined(GroupKey),
    Left,
}

/// Handle returned by `connect`. Dropping the receiver makes the next
/// broadcast evict the connection.
#[derive(Debug)]
pub struct Subscription {
    pub id: ConnectionId,
    pub group: GroupKey,
    pub receiver: mpsc::Receiver<Arc<str>>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
    pub evicted: usize,
}

#[derive(Debug, Default)]
struct Groups {
    members: HashMap<GroupKey, HashMap<ConnectionId, mpsc::Sender<Arc<str>>>>,
    joined: HashMap<ConnectionId, GroupKey>,
}

impl Groups {
    fn remove(&mut self, id: ConnectionId) -> Option<GroupKey> {
        let group = self.joined.remove(&id)?;
        if let Some(connections) = self.members.get_mut(&group) {
            connections.remove(&id);
            if connections.is_empty() {
                self.members.remove(&group);
            }
        }
        Some(group)
    }
}

#[derive(Debug)]
pub struct SubscriptionRegistry {
    groups: RwLock<Groups>,
    buffer: usize,
}

impl SubscriptionRegistry {
    /// `buffer` is the number of undelivered payloads a connection may queue.
    #[must_use]
    pub fn new(buffer: usize) -> Self {
        Self {
            groups: RwLock::new(Groups::default()),
            buffer: buffer.max(1),
        }
    }

    pub async fn connect(&self, group: GroupKey) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let id = Uuid::new_v4();

        {
            let mut groups = self.groups.write().await;
            groups.members.entry(group).or_default().insert(id, sender);
            groups.joined.insert(id, group);
        }

        tracing::info!(connection_id = %id, group = %group, "Subscriber joined");

        Subscription {
            id,
            group,
            receiver,
        }
    }

    /// Remove a connection from its group. Safe to call repeatedly; returns
    /// whether the connection was still joined.
    pub async fn disconnect(&self, id: ConnectionId, close_code: Option<u16>) -> bool {
        let removed = self.groups.write().await.remove(id);

        match removed {
            Some(group) => {
                tracing::info!(
                    connection_id = %id,
                    group = %group,
                    close_code = ?close_code,
                    "Subscriber left"
                );
                true
            }
            None => {
                tracing::debug!(connection_id = %id, "Disconnect for unknown connection");
                false
            }
        }
    }

    /// Deliver `payload` to every connection joined to `group` at call time.
    pub async fn broadcast(&self, group: GroupKey, payload: Arc<str>) -> BroadcastReport {
        let targets: Vec<(ConnectionId, mpsc::Sender<Arc<str>>)> = {
            let groups = self.groups.read().await;
            match groups.members.get(&group) {
                Some(connections) => connections
                    .iter()
                    .map(|(id, sender)| (*id, sender.clone()))
                    .collect(),
                None => return BroadcastReport::default(),
            }
        };

        let mut report = BroadcastReport::default();
        let mut dead = Vec::new();

        for (id, sender) in targets {
            match sender.try_send(payload.clone()) {
                Ok(()) => report.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    report.dropped += 1;
                    tracing::warn!(
                        connection_id = %id,
                        group = %group,
                        "Subscriber buffer full, dropping update"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => dead.push(id),
            }
        }

        if !dead.is_empty() {
            let mut groups = self.groups.write().await;
            for id in dead {
                if groups.remove(id).is_some() {
                    report.evicted += 1;
                    tracing::warn!(connection_id = %id, group = %group, "Evicted dead subscriber");
                }
            }
        }

        report
    }

    pub async fn state(&self, id: ConnectionId) -> ConnectionState {
        match self.groups.read().await.joined.get(&id) {
            Some(group) => ConnectionState::Joined(*group),
            None => ConnectionState::Left,
        }
    }

    pub async fn group_size(&self, group: GroupKey) -> usize {
        self.groups
            .read()
            .await
            .members
            .get(&group)
            .map_or(0, HashMap::len)
    }

    pub async fn connection_count(&self) -> usize {
        self.groups.read().await.joined.len()
    }
}
