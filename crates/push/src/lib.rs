//! Push status channel
//!
//! The backend publishes dispense status envelopes to a topic. Consumers
//! see that channel through [`PushSubscriber`], which yields raw message
//! bodies; decoding is left to the caller.
//!
//! - [`PushBus`]: in-memory topic fan-out, used by tests and embedding shells
//! - [`StompClient`]: STOMP 1.2 over WebSocket with fixed-delay reconnect

pub mod bus;
pub mod error;
pub mod frame;
pub mod stomp;
pub mod subscriber;

pub use bus::*;
pub use error::*;
pub use frame::*;
pub use stomp::*;
pub use subscriber::*;
