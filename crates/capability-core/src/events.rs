//! Fire-and-forget events emitted by the pipeline (spec §6, ordering in §5).

use crate::capability::{CapabilityId, DependencyEdgeType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CapabilityEvent {
    /// `capability.learned { isNew }`
    CapabilityLearned { capability_id: CapabilityId, is_new: bool },
    /// `capability.zone.created` | `capability.zone.updated`
    ZoneCreated { capability_id: CapabilityId },
    ZoneUpdated { capability_id: CapabilityId },
    /// `capability.dependency.created`, one per new `contains` (or other) edge.
    DependencyCreated {
        from: CapabilityId,
        to: CapabilityId,
        edge_type: DependencyEdgeType,
    },
    DependencyRemoved { from: CapabilityId, to: CapabilityId },
    /// `capability.matched`, emitted for the matcher's winning candidate.
    CapabilityMatched {
        capability_id: CapabilityId,
        intent: String,
        score: f64,
    },
    /// `algorithm.scored`, emitted for every scored candidate (winner or not).
    AlgorithmScored {
        capability_id: CapabilityId,
        semantic_score: f64,
        reliability_factor: f64,
        score: f64,
        decision: String,
    },
    /// `execution.trace.saved`
    ExecutionTraceSaved { trace_id: uuid::Uuid, capability_id: CapabilityId },
    /// `capability.permission.updated`
    PermissionUpdated { capability_id: CapabilityId },
}

/// A best-effort, in-process event bus backed by `tokio::sync::broadcast` (spec §9: "treat the
/// event bus as best-effort. Do not await its sink"). `publish` never blocks on subscribers and
/// never fails the caller if there are none.
pub struct BroadcastEventBus {
    sender: tokio::sync::broadcast::Sender<CapabilityEvent>,
}

impl BroadcastEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<CapabilityEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait::async_trait]
impl crate::traits::EventBus for BroadcastEventBus {
    async fn publish(&self, event: CapabilityEvent) {
        // A send error just means there are currently no subscribers; correctness of the save
        // pipeline never depends on anyone having received this (spec §9).
        let _ = self.sender.send(event);
    }
}

/// An event bus that discards everything, for tests that don't care about notifications.
#[derive(Debug, Default)]
pub struct NullEventBus;

#[async_trait::async_trait]
impl crate::traits::EventBus for NullEventBus {
    async fn publish(&self, _event: CapabilityEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::EventBus;

    #[tokio::test]
    async fn broadcast_bus_delivers_to_subscribers_without_blocking_publish() {
        let bus = BroadcastEventBus::new(16);
        let mut rx = bus.subscribe();
        let capability_id = uuid::Uuid::new_v4();
        bus.publish(CapabilityEvent::CapabilityLearned {
            capability_id,
            is_new: true,
        })
        .await;
        let received = rx.try_recv().expect("event should be queued");
        match received {
            CapabilityEvent::CapabilityLearned { capability_id: id, is_new } => {
                assert_eq!(id, capability_id);
                assert!(is_new);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_error_or_block() {
        let bus = BroadcastEventBus::new(4);
        bus.publish(CapabilityEvent::PermissionUpdated {
            capability_id: uuid::Uuid::new_v4(),
        })
        .await;
    }
}
