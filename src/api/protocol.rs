//! Command vocabulary shared by every transport

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::state::{SettingsUpdate, TimerState};

/// Operations a surface may ask the engine to perform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Command {
    GetState,
    Start,
    Pause,
    Reset,
    Skip,
    UpdateSettings {
        #[serde(default)]
        settings: SettingsUpdate,
    },
    /// UI dismissal; acknowledged without touching state
    Close,
}

impl Command {
    pub const ACTIONS: [&'static str; 7] = [
        "getState",
        "start",
        "pause",
        "reset",
        "skip",
        "updateSettings",
        "close",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Command::GetState => "getState",
            Command::Start => "start",
            Command::Pause => "pause",
            Command::Reset => "reset",
            Command::Skip => "skip",
            Command::UpdateSettings { .. } => "updateSettings",
            Command::Close => "close",
        }
    }

    /// Whether the command may change the timer record
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Command::GetState | Command::Close)
    }

    /// Decode a request body, telling unknown actions apart from bad payloads
    pub fn from_json(body: Value) -> Result<Self, CommandError> {
        let action = body
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| CommandError::InvalidRequest("missing \"action\" field".to_string()))?;
        if !Self::ACTIONS.contains(&action) {
            return Err(CommandError::UnknownCommand(action.to_string()));
        }
        serde_json::from_value(body).map_err(|e| CommandError::InvalidRequest(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("engine not reachable")]
    EngineUnavailable,
    #[error("engine did not respond within {0} ms")]
    Timeout(u64),
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl CommandError {
    /// Transport failures, as opposed to the caller sending something wrong
    pub fn is_transport(&self) -> bool {
        matches!(self, CommandError::EngineUnavailable | CommandError::Timeout(_))
    }
}

/// Wire reply: either the resulting state or the reason it failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandResponse {
    State { state: TimerState },
    Error { error: String },
}

impl From<Result<TimerState, CommandError>> for CommandResponse {
    fn from(result: Result<TimerState, CommandError>) -> Self {
        match result {
            Ok(state) => CommandResponse::State { state },
            Err(e) => CommandResponse::Error {
                error: e.to_string(),
            },
        }
    }
}
