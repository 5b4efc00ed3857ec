//! State management module
//!
//! The timer record, its persistence, and the server-wide shared state.

pub mod app_state;
pub mod store;
pub mod timer_state;

// Re-export main types
pub use app_state::AppState;
pub use store::{JsonFileStore, MemoryStore, StateStore, StoreError};
pub use timer_state::{compute_remaining, Phase, SettingsUpdate, TimerSettings, TimerState, CYCLE_LENGTH};
