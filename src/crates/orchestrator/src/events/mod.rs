//! Workflow event bus and WebSocket fan-out.

pub mod bus;
pub mod fanout;

pub use bus::{EventBus, EventType, WorkflowEvent};
pub use fanout::{FanoutMessage, FanoutRegistry, Subscription, ViewerRole, HEARTBEAT_INTERVAL};
