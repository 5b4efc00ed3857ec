//! Background tasks module
//!
//! The authoritative engine task and the per-surface mirror tasks.

pub mod engine;
pub mod mirror;

// Re-export main types
pub use engine::{spawn_engine, CommandTransport, EngineHandle, TimerEngine};
pub use mirror::{ClientMirror, FollowUp, LogView, MirrorDisplay, MirrorView};
