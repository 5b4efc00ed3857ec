//! Per-surface replica of the timer
//!
//! A mirror never owns the timer. It applies pushed snapshots, recomputes
//! the countdown locally from `expectedEndTime` once a second, and sends
//! commands through a [`CommandTransport`]. Clones share one surface, so
//! the copy driving [`ClientMirror::run`] and the copy the surface issues
//! commands through paint the same view.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::{
    sync::broadcast::error::RecvError,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    api::protocol::{Command, CommandError},
    services::{ChangeFeed, Clock, EngineEvent, Snapshot},
    state::{Phase, SettingsUpdate, TimerState, CYCLE_LENGTH},
};

use super::engine::CommandTransport;

/// Local display tick
pub const TICK: Duration = Duration::from_secs(1);

/// Prompt a surface may show after a phase ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    /// After a focus block: suggest praying a decade of the rosary
    RosarySuggestion,
    /// After the long pause that closes a cycle
    CheckIn,
}

impl FollowUp {
    pub fn after(completed: Phase) -> Option<Self> {
        match completed {
            Phase::Focus => Some(FollowUp::RosarySuggestion),
            Phase::LongPause => Some(FollowUp::CheckIn),
            Phase::Pause => None,
        }
    }
}

/// What a surface paints: countdown text, progress ring and cycle dots
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorDisplay {
    pub phase: Phase,
    pub is_running: bool,
    pub remaining: u64,
    /// `MM:SS`
    pub label: String,
    /// Elapsed fraction of the phase, 0.0 to 1.0
    pub progress: f64,
    /// Completed focus blocks in the current cycle
    pub dots: [bool; CYCLE_LENGTH as usize],
    /// Accumulated focus time, e.g. `1h 05m`
    pub total_focus: String,
}

impl MirrorDisplay {
    pub fn render(state: &TimerState, now_ms: i64) -> Self {
        let remaining = state.remaining_at(now_ms);
        let progress = if state.total_duration == 0 {
            0.0
        } else {
            1.0 - remaining as f64 / state.total_duration as f64
        };

        let filled = if state.phase == Phase::LongPause && state.pomodoro_count > 0 {
            CYCLE_LENGTH
        } else {
            state.pomodoro_count % CYCLE_LENGTH
        };
        let mut dots = [false; CYCLE_LENGTH as usize];
        for dot in dots.iter_mut().take(filled as usize) {
            *dot = true;
        }

        Self {
            phase: state.phase,
            is_running: state.is_running,
            remaining,
            label: format_clock(remaining),
            progress: progress.clamp(0.0, 1.0),
            dots,
            total_focus: format_focus_total(state.total_focus_seconds),
        }
    }
}

pub fn format_clock(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

pub fn format_focus_total(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    if hours > 0 {
        format!("{}h {:02}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

/// Rendering seam for a surface
pub trait MirrorView: Send + 'static {
    fn repaint(&mut self, display: &MirrorDisplay);

    /// Local side effects of a completion: tone, follow-up prompt
    fn phase_complete(&mut self, completed: Phase, follow_up: Option<FollowUp>);
}

/// Applied snapshot and what is currently painted
struct Surface<V> {
    view: V,
    applied: Option<Snapshot>,
    shown: Option<MirrorDisplay>,
}

pub struct ClientMirror<V: MirrorView> {
    name: Arc<str>,
    transport: Arc<dyn CommandTransport>,
    feed: ChangeFeed,
    clock: Arc<dyn Clock>,
    surface: Arc<Mutex<Surface<V>>>,
}

impl<V: MirrorView> Clone for ClientMirror<V> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            transport: Arc::clone(&self.transport),
            feed: self.feed.clone(),
            clock: Arc::clone(&self.clock),
            surface: Arc::clone(&self.surface),
        }
    }
}

impl<V: MirrorView> ClientMirror<V> {
    pub fn new(
        name: impl Into<String>,
        transport: Arc<dyn CommandTransport>,
        feed: ChangeFeed,
        clock: Arc<dyn Clock>,
        view: V,
    ) -> Self {
        Self {
            name: Arc::from(name.into()),
            transport,
            feed,
            clock,
            surface: Arc::new(Mutex::new(Surface {
                view,
                applied: None,
                shown: None,
            })),
        }
    }

    // A poisoned lock still holds the last applied state
    fn surface(&self) -> MutexGuard<'_, Surface<V>> {
        self.surface.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> Option<TimerState> {
        self.surface()
            .applied
            .as_ref()
            .map(|snapshot| snapshot.state.clone())
    }

    pub fn is_ticking(&self) -> bool {
        self.surface()
            .applied
            .as_ref()
            .is_some_and(|snapshot| snapshot.state.is_running)
    }

    /// Adopt a snapshot unless an equal or newer one is already applied
    pub fn apply(&self, snapshot: Snapshot) -> bool {
        let mut surface = self.surface();
        if let Some(current) = &surface.applied {
            if snapshot.revision <= current.revision {
                debug!(
                    "[{}] ignoring stale revision {} (have {})",
                    self.name, snapshot.revision, current.revision
                );
                return false;
            }
        }
        surface.applied = Some(snapshot);
        self.repaint(&mut surface);
        true
    }

    /// Recompute the display and repaint if anything visible changed
    pub fn refresh(&self) -> bool {
        let mut surface = self.surface();
        self.repaint(&mut surface)
    }

    fn repaint(&self, surface: &mut Surface<V>) -> bool {
        let Some(snapshot) = &surface.applied else {
            return false;
        };
        let display = MirrorDisplay::render(&snapshot.state, self.clock.now_ms());
        if surface.shown.as_ref() == Some(&display) {
            return false;
        }
        surface.view.repaint(&display);
        surface.shown = Some(display);
        true
    }

    pub fn on_event(&self, event: EngineEvent) {
        match event {
            EngineEvent::PhaseComplete { phase } => {
                self.surface().view.phase_complete(phase, FollowUp::after(phase));
            }
        }
    }

    /// Send a command; on transport failure keep showing the last state
    pub async fn command(&self, command: Command) -> Result<TimerState, CommandError> {
        let name = command.name();
        match self.transport.send(command).await {
            Ok(snapshot) => {
                let state = snapshot.state.clone();
                self.apply(snapshot);
                Ok(state)
            }
            Err(e) => {
                warn!("[{}] {} failed, keeping last known state: {}", self.name, name, e);
                Err(e)
            }
        }
    }

    pub async fn start(&self) -> Result<TimerState, CommandError> {
        self.command(Command::Start).await
    }

    pub async fn pause(&self) -> Result<TimerState, CommandError> {
        self.command(Command::Pause).await
    }

    pub async fn reset(&self) -> Result<TimerState, CommandError> {
        self.command(Command::Reset).await
    }

    pub async fn skip(&self) -> Result<TimerState, CommandError> {
        self.command(Command::Skip).await
    }

    pub async fn close(&self) -> Result<TimerState, CommandError> {
        self.command(Command::Close).await
    }

    /// Settings form submit
    pub async fn update_settings(
        &self,
        settings: SettingsUpdate,
    ) -> Result<TimerState, CommandError> {
        self.command(Command::UpdateSettings { settings }).await
    }

    /// Follow the feed until it closes, ticking locally while running.
    ///
    /// Spawn this on a clone and keep issuing commands through the original.
    pub async fn run(self) {
        let mut states = self.feed.watch();
        let mut events = self.feed.events();
        let initial = states.borrow_and_update().clone();
        self.apply(initial);

        let mut ticker = interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let ticking = self.is_ticking();
            tokio::select! {
                changed = states.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = states.borrow_and_update().clone();
                    self.apply(snapshot);
                    if !ticking && self.is_ticking() {
                        debug!("[{}] local tick started", self.name);
                        ticker.reset();
                    } else if ticking && !self.is_ticking() {
                        debug!("[{}] local tick stopped", self.name);
                    }
                }

                event = events.recv() => match event {
                    Ok(event) => self.on_event(event),
                    Err(RecvError::Lagged(missed)) => {
                        warn!("[{}] missed {} engine events", self.name, missed);
                    }
                    Err(RecvError::Closed) => break,
                },

                _ = ticker.tick(), if ticking => {
                    self.refresh();
                }
            }
        }

        info!("[{}] mirror detached", self.name);
    }
}

/// View that writes to the log; used by the `--mirror` flag
#[derive(Debug, Default)]
pub struct LogView;

impl MirrorView for LogView {
    fn repaint(&mut self, shown: &MirrorDisplay) {
        let dots: String = shown
            .dots
            .iter()
            .map(|&filled| if filled { '●' } else { '○' })
            .collect();
        let paused = if shown.is_running { "" } else { " (paused)" };
        info!(
            "{} {} {} {:>3.0}% | focus today {}{}",
            shown.phase,
            shown.label,
            dots,
            shown.progress * 100.0,
            shown.total_focus,
            paused
        );
    }

    fn phase_complete(&mut self, completed: Phase, follow_up: Option<FollowUp>) {
        info!("♪ {} finished", completed);
        match follow_up {
            Some(FollowUp::RosarySuggestion) => info!("Suggestion: pray a decade of the rosary"),
            Some(FollowUp::CheckIn) => info!("Cycle complete: time for a check-in"),
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_and_total_formatting() {
        assert_eq!(format_clock(1500), "25:00");
        assert_eq!(format_clock(61), "01:01");
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_focus_total(25 * 60), "25m");
        assert_eq!(format_focus_total(3900), "1h 05m");
    }

    #[test]
    fn dots_fill_per_cycle() {
        let mut state = TimerState::default();
        state.pomodoro_count = 2;
        assert_eq!(MirrorDisplay::render(&state, 0).dots, [true, true, false, false]);

        state.pomodoro_count = 4;
        state.phase = Phase::LongPause;
        assert_eq!(MirrorDisplay::render(&state, 0).dots, [true; 4]);

        state.phase = Phase::Focus;
        assert_eq!(MirrorDisplay::render(&state, 0).dots, [false; 4]);
    }

    #[test]
    fn progress_tracks_running_countdown() {
        let mut state = TimerState::default();
        state.start(0);
        let display = MirrorDisplay::render(&state, 750_000);
        assert_eq!(display.remaining, 750);
        assert!((display.progress - 0.5).abs() < f64::EPSILON);
        assert_eq!(display.label, "12:30");
    }

    #[test]
    fn follow_ups_by_completed_phase() {
        assert_eq!(FollowUp::after(Phase::Focus), Some(FollowUp::RosarySuggestion));
        assert_eq!(FollowUp::after(Phase::Pause), None);
        assert_eq!(FollowUp::after(Phase::LongPause), Some(FollowUp::CheckIn));
    }
}
