//! Focus Vigil - authoritative focus/pomodoro timer for a devotional dashboard
//!
//! One engine owns the timer record, persists every write, and wakes itself
//! at each phase boundary. Any number of surfaces mirror it through the
//! change feed and drive it through the command channel.

pub mod api;
pub mod config;
pub mod services;
pub mod state;
pub mod tasks;
pub mod utils;

// Re-export commonly used types
pub use api::{create_router, Command, CommandError, CommandResponse};
pub use config::Config;
pub use services::{ChangeFeed, Clock, EngineEvent, ManualClock, Snapshot, SystemClock};
pub use state::{AppState, Phase, SettingsUpdate, TimerSettings, TimerState};
pub use tasks::{spawn_engine, ClientMirror, EngineHandle, TimerEngine};
pub use utils::signals::shutdown_signal;
