//! WebSocket fan-out of workflow events to subscribed viewers.
//!
//! Each run owns a broadcast channel; a subscriber is identified by
//! `(run_id, user_id, role)`. Role gates which events reach that viewer —
//! `shadow.hint` payloads are filtered to `Driver`/`Approver` roles only, a
//! `Shadow` viewer never sees another deployment's candidate output. Dead
//! subscribers (lagged past the channel's buffer) are dropped on next send
//! rather than tracked explicitly; `tokio::sync::broadcast` already reports
//! that as a lag error to each receiver independently.

use super::bus::{EventType, WorkflowEvent};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewerRole {
    Driver,
    Approver,
    Shadow,
}

const CHANNEL_CAPACITY: usize = 256;
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FanoutMessage {
    Event(WorkflowEvent),
    Presence { user_id: String, role: ViewerRole },
    Heartbeat,
}

/// One broadcast channel per run. Channels are created lazily and dropped
/// once their last sender/receiver goes away (DashMap entry removal is the
/// caller's responsibility via [`FanoutRegistry::close_run`]).
#[derive(Default)]
pub struct FanoutRegistry {
    channels: DashMap<Uuid, broadcast::Sender<FanoutMessage>>,
}

impl FanoutRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn channel_for(&self, run_id: Uuid) -> broadcast::Sender<FanoutMessage> {
        self.channels
            .entry(run_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Publish an event to every subscriber of `run_id`, filtering
    /// shadow-hint payloads away from `Shadow` viewers at subscribe time —
    /// see [`Subscription::recv`].
    pub fn publish(&self, run_id: Uuid, event: WorkflowEvent) {
        let sender = self.channel_for(run_id);
        let _ = sender.send(FanoutMessage::Event(event));
    }

    pub fn announce_presence(&self, run_id: Uuid, user_id: String, role: ViewerRole) {
        let sender = self.channel_for(run_id);
        let _ = sender.send(FanoutMessage::Presence { user_id, role });
    }

    pub fn heartbeat(&self, run_id: Uuid) {
        let sender = self.channel_for(run_id);
        let _ = sender.send(FanoutMessage::Heartbeat);
    }

    pub fn subscribe(self: &Arc<Self>, run_id: Uuid, user_id: String, role: ViewerRole) -> Subscription {
        let sender = self.channel_for(run_id);
        self.announce_presence(run_id, user_id.clone(), role);
        Subscription {
            run_id,
            user_id,
            role,
            receiver: sender.subscribe(),
        }
    }

    pub fn close_run(&self, run_id: Uuid) {
        self.channels.remove(&run_id);
    }
}

pub struct Subscription {
    pub run_id: Uuid,
    pub user_id: String,
    pub role: ViewerRole,
    receiver: broadcast::Receiver<FanoutMessage>,
}

impl Subscription {
    /// Receive the next message visible to this viewer's role, silently
    /// skipping messages a `Shadow` viewer isn't permitted to see and
    /// resynchronizing past any lagged messages.
    pub async fn recv(&mut self) -> Option<FanoutMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(FanoutMessage::Event(event)) => {
                    if self.role == ViewerRole::Shadow && is_shadow_hint(&event) {
                        continue;
                    }
                    return Some(FanoutMessage::Event(event));
                }
                Ok(other) => return Some(other),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

fn is_shadow_hint(event: &WorkflowEvent) -> bool {
    event.event_type == EventType::ShadowHint
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::bus::EventType;

    #[tokio::test]
    async fn subscriber_receives_presence_then_events() {
        let registry = Arc::new(FanoutRegistry::new());
        let run_id = Uuid::new_v4();
        let mut sub = registry.subscribe(run_id, "alice".to_string(), ViewerRole::Driver);

        registry.publish(run_id, WorkflowEvent::new(run_id, EventType::WorkflowStarted));

        let presence = sub.recv().await.unwrap();
        assert!(matches!(presence, FanoutMessage::Presence { .. }));

        let event = sub.recv().await.unwrap();
        assert!(matches!(event, FanoutMessage::Event(_)));
    }

    #[tokio::test]
    async fn shadow_viewer_never_sees_shadow_hint_events() {
        let registry = Arc::new(FanoutRegistry::new());
        let run_id = Uuid::new_v4();
        let mut sub = registry.subscribe(run_id, "shadow-user".to_string(), ViewerRole::Shadow);
        let _ = sub.recv().await; // drain presence announcement

        let hinted = WorkflowEvent::new(run_id, EventType::ShadowHint)
            .with_payload(serde_json::json!({"candidate_output": "..."}));
        registry.publish(run_id, hinted);

        let visible = WorkflowEvent::new(run_id, EventType::WorkflowProgress);
        registry.publish(run_id, visible);

        let received = sub.recv().await.unwrap();
        match received {
            FanoutMessage::Event(event) => {
                assert_eq!(event.event_type, EventType::WorkflowProgress);
            }
            other => panic!("expected event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn driver_and_approver_roles_receive_shadow_hint_events() {
        let registry = Arc::new(FanoutRegistry::new());
        let run_id = Uuid::new_v4();
        let mut driver = registry.subscribe(run_id, "bob".to_string(), ViewerRole::Driver);
        let mut approver = registry.subscribe(run_id, "carol".to_string(), ViewerRole::Approver);
        let _ = driver.recv().await; // drain presence
        let _ = driver.recv().await; // drain the approver's own presence announcement
        let _ = approver.recv().await; // drain own presence

        registry.publish(run_id, WorkflowEvent::new(run_id, EventType::ShadowHint));

        for sub in [&mut driver, &mut approver] {
            let received = sub.recv().await.unwrap();
            match received {
                FanoutMessage::Event(event) => assert_eq!(event.event_type, EventType::ShadowHint),
                other => panic!("expected event, got {:?}", other),
            }
        }
    }
}
