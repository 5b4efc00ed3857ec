//! Timer state structure and its phase transitions
//!
//! `TimerState` is the single authoritative record. Every mutation here is a
//! pure function of the current value and a caller-supplied `now` (epoch
//! milliseconds); scheduling, persistence and notification live in the engine.

use serde::{Deserialize, Serialize};

/// Number of focus completions per cycle; the last one earns a long pause.
pub const CYCLE_LENGTH: u64 = 4;

/// A named countdown segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Focus,
    Pause,
    LongPause,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Focus => "focus",
            Phase::Pause => "pause",
            Phase::LongPause => "longPause",
        }
    }

    pub fn is_break(&self) -> bool {
        !matches!(self, Phase::Focus)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase lengths in minutes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSettings {
    pub focus: u32,
    pub pause: u32,
    pub long_pause: u32,
}

impl TimerSettings {
    pub const FOCUS_RANGE: (u32, u32) = (1, 120);
    pub const PAUSE_RANGE: (u32, u32) = (1, 30);
    pub const LONG_PAUSE_RANGE: (u32, u32) = (1, 60);

    /// Copy of these settings with every field forced into its range
    pub fn clamped(self) -> Self {
        Self {
            focus: clamp_minutes(self.focus as i64, Self::FOCUS_RANGE),
            pause: clamp_minutes(self.pause as i64, Self::PAUSE_RANGE),
            long_pause: clamp_minutes(self.long_pause as i64, Self::LONG_PAUSE_RANGE),
        }
    }

    /// Merge a partial update; absent fields keep their value, present ones are clamped
    pub fn merged(self, update: &SettingsUpdate) -> Self {
        Self {
            focus: update
                .focus
                .map_or(self.focus, |m| clamp_minutes(m, Self::FOCUS_RANGE)),
            pause: update
                .pause
                .map_or(self.pause, |m| clamp_minutes(m, Self::PAUSE_RANGE)),
            long_pause: update
                .long_pause
                .map_or(self.long_pause, |m| clamp_minutes(m, Self::LONG_PAUSE_RANGE)),
        }
        .clamped()
    }

    pub fn minutes_for(&self, phase: Phase) -> u32 {
        match phase {
            Phase::Focus => self.focus,
            Phase::Pause => self.pause,
            Phase::LongPause => self.long_pause,
        }
    }

    pub fn seconds_for(&self, phase: Phase) -> u64 {
        self.minutes_for(phase) as u64 * 60
    }
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            focus: 25,
            pause: 5,
            long_pause: 15,
        }
    }
}

fn clamp_minutes(value: i64, (min, max): (u32, u32)) -> u32 {
    value.clamp(min as i64, max as i64) as u32
}

/// Settings payload as sent by callers. Values are unchecked until merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_pause: Option<i64>,
}

impl From<TimerSettings> for SettingsUpdate {
    fn from(settings: TimerSettings) -> Self {
        Self {
            focus: Some(settings.focus as i64),
            pause: Some(settings.pause as i64),
            long_pause: Some(settings.long_pause as i64),
        }
    }
}

/// Whole seconds left until `expected_end_ms`, rounded up and never negative
pub fn compute_remaining(now_ms: i64, expected_end_ms: i64) -> u64 {
    let delta = expected_end_ms.saturating_sub(now_ms);
    if delta <= 0 {
        0
    } else {
        (delta as u64).div_ceil(1000)
    }
}

/// The authoritative countdown record, persisted as camelCase JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub phase: Phase,
    pub is_running: bool,
    /// Seconds, fixed when the phase was entered
    pub total_duration: u64,
    /// Seconds; frozen value while paused
    pub time_remaining: u64,
    /// Epoch milliseconds; only set while running
    #[serde(default)]
    pub expected_end_time: Option<i64>,
    #[serde(default)]
    pub pomodoro_count: u64,
    #[serde(default)]
    pub total_focus_seconds: u64,
    #[serde(default)]
    pub settings: TimerSettings,
}

impl TimerState {
    /// A stopped focus phase sized from `settings`
    pub fn new(settings: TimerSettings) -> Self {
        let settings = settings.clamped();
        let total = settings.seconds_for(Phase::Focus);
        Self {
            phase: Phase::Focus,
            is_running: false,
            total_duration: total,
            time_remaining: total,
            expected_end_time: None,
            pomodoro_count: 0,
            total_focus_seconds: 0,
            settings,
        }
    }

    /// Repair a loaded record so every invariant holds again
    pub fn normalized(mut self) -> Self {
        self.settings = self.settings.clamped();
        if self.total_duration == 0 {
            self.total_duration = self.settings.seconds_for(self.phase);
        }
        self.time_remaining = self.time_remaining.min(self.total_duration);
        match (self.is_running, self.expected_end_time) {
            (true, None) => self.is_running = false,
            (false, Some(_)) => self.expected_end_time = None,
            _ => {}
        }
        self
    }

    /// Remaining seconds as seen at `now_ms`
    pub fn remaining_at(&self, now_ms: i64) -> u64 {
        match (self.is_running, self.expected_end_time) {
            (true, Some(end)) => compute_remaining(now_ms, end).min(self.total_duration),
            _ => self.time_remaining,
        }
    }

    /// End timestamp of a running phase that has already elapsed at `now_ms`
    pub fn due_end(&self, now_ms: i64) -> Option<i64> {
        match (self.is_running, self.expected_end_time) {
            (true, Some(end)) if end <= now_ms => Some(end),
            _ => None,
        }
    }

    /// Resize a stopped phase to its configured length.
    ///
    /// Only valid for an instance that has never been started; the caller
    /// tracks that, since the record cannot tell a fresh phase from one
    /// paused within its first second.
    pub fn adopt_configured_length(&mut self) -> bool {
        let configured = self.settings.seconds_for(self.phase);
        if self.is_running || self.total_duration == configured {
            return false;
        }
        self.total_duration = configured;
        self.time_remaining = configured;
        true
    }

    /// Begin counting down. Returns `false` when already running.
    pub fn start(&mut self, now_ms: i64) -> bool {
        if self.is_running {
            return false;
        }
        self.expected_end_time = Some(now_ms + self.time_remaining as i64 * 1000);
        self.is_running = true;
        true
    }

    /// Freeze the countdown. Returns `false` when not running.
    pub fn pause(&mut self, now_ms: i64) -> bool {
        if !self.is_running {
            return false;
        }
        self.time_remaining = self.remaining_at(now_ms);
        self.expected_end_time = None;
        self.is_running = false;
        true
    }

    /// Back to a stopped focus phase; counters and settings survive
    pub fn reset(&mut self) {
        let total = self.settings.seconds_for(Phase::Focus);
        self.phase = Phase::Focus;
        self.is_running = false;
        self.total_duration = total;
        self.time_remaining = total;
        self.expected_end_time = None;
    }

    /// Store new settings without resizing the phase in progress
    pub fn apply_settings(&mut self, update: &SettingsUpdate) -> bool {
        let merged = self.settings.merged(update);
        if merged == self.settings {
            return false;
        }
        self.settings = merged;
        true
    }

    /// The phase that follows the current one, given the counter after completion
    fn next_phase(&self, count_after: u64) -> Phase {
        match self.phase {
            Phase::Focus if count_after % CYCLE_LENGTH == 0 => Phase::LongPause,
            Phase::Focus => Phase::Pause,
            Phase::Pause | Phase::LongPause => Phase::Focus,
        }
    }

    /// Finish the current phase and enter the next one.
    ///
    /// A running timer keeps running and is re-armed from `rearm_from_ms`; a
    /// stopped one lands on the next phase still stopped. Returns the phase
    /// that just completed.
    pub fn complete_phase(&mut self, rearm_from_ms: i64) -> Phase {
        let completed = self.phase;
        if completed == Phase::Focus {
            self.total_focus_seconds += self.total_duration;
            self.pomodoro_count += 1;
        }
        let next = self.next_phase(self.pomodoro_count);
        let total = self.settings.seconds_for(next);
        self.phase = next;
        self.total_duration = total;
        self.time_remaining = total;
        self.expected_end_time = if self.is_running {
            Some(rearm_from_ms + total as i64 * 1000)
        } else {
            None
        };
        completed
    }
}

impl Default for TimerState {
    fn default() -> Self {
        Self::new(TimerSettings::default())
    }
}
