//! Engine collaborators
//!
//! The clock (time source and wake-up alarm) and the change feed that
//! carries every state write and phase event to the surfaces.

pub mod clock;
pub mod feed;

// Re-export main types
pub use clock::{Clock, ManualClock, SystemClock};
pub use feed::{ChangeFeed, EngineEvent, Snapshot, Subscription};
