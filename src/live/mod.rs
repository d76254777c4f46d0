//! Live update fan-out to WebSocket subscribers, grouped per greenhouse.

pub mod envelope;
pub mod publisher;
pub mod registry;

pub use envelope::{GroupKey, InvalidGroupId, UpdateEnvelope};
pub use publisher::UpdatePublisher;
pub use registry::{BroadcastReport, ConnectionId, ConnectionState, Subscription, SubscriptionRegistry};
