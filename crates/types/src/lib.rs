pub mod operation;
pub mod plan;
pub mod plate;
pub mod push;
pub mod reagent;

pub use operation::*;
pub use plan::*;
pub use plate::*;
pub use push::*;
pub use reagent::*;

/// Destination the backend publishes dispense status envelopes to
pub const DISPENSE_STATUS_TOPIC: &str = "/topic/dispense-status";
