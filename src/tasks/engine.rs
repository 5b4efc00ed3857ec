//! The timer engine and the background task that serializes access to it

use std::{sync::Arc, time::Duration};

use chrono::DateTime;
use futures::future::BoxFuture;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    api::protocol::{Command, CommandError},
    services::{ChangeFeed, Clock, EngineEvent, Snapshot},
    state::{Phase, StateStore, TimerSettings, TimerState},
};

/// Capacity of the request queue in front of the engine task
const REQUEST_QUEUE: usize = 64;

/// Owner of the authoritative `TimerState`.
///
/// Every mutation is persisted and published before the caller sees the
/// result. Nothing here is async; the engine task drives it.
pub struct TimerEngine {
    state: TimerState,
    /// Whether the current phase instance has been started since it was
    /// entered. Kept off the record; a stopped instance that never ran picks
    /// up edited settings when it is first started.
    phase_started: bool,
    clock: Arc<dyn Clock>,
    store: Arc<dyn StateStore>,
    feed: ChangeFeed,
}

impl TimerEngine {
    /// Load the persisted record (or defaults) and replay any phases that
    /// elapsed while nothing was running.
    pub fn load(clock: Arc<dyn Clock>, store: Arc<dyn StateStore>, feed: ChangeFeed) -> Self {
        let state = match store.load() {
            Ok(Some(state)) => {
                info!("Restored timer state: phase={}, running={}", state.phase, state.is_running);
                state.normalized()
            }
            Ok(None) => {
                info!("No persisted timer state, starting from defaults");
                TimerState::new(TimerSettings::default())
            }
            Err(e) => {
                warn!("Persisted timer state unreadable ({}), starting from defaults", e);
                TimerState::new(TimerSettings::default())
            }
        };

        // A restored record only shows a phase has run once time has left it
        let phase_started = state.is_running || state.time_remaining < state.total_duration;
        let mut engine = Self {
            state,
            phase_started,
            clock,
            store,
            feed,
        };
        engine.feed.publish(engine.state.clone());

        let replayed = engine.catch_up();
        if replayed > 0 {
            info!("Replayed {} phase(s) that elapsed while dormant", replayed);
        }
        if let Some(deadline) = engine.alarm_deadline() {
            debug!("Wake-up armed for {}", format_deadline(deadline));
        }
        engine
    }

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    /// When the pending wake-up should fire, if one is armed
    pub fn alarm_deadline(&self) -> Option<i64> {
        if self.state.is_running {
            self.state.expected_end_time
        } else {
            None
        }
    }

    /// Apply one command and return the state it produced.
    ///
    /// Overdue phase completions are applied first, so a command never acts
    /// on a phase that has already ended.
    pub fn handle(&mut self, command: Command) -> Snapshot {
        self.catch_up();
        let now = self.clock.now_ms();

        let changed = match &command {
            Command::GetState | Command::Close => false,
            Command::Start => self.start(now),
            Command::Pause => self.state.pause(now),
            Command::Reset => {
                self.state.reset();
                self.phase_started = false;
                true
            }
            Command::Skip => {
                self.advance(now);
                return self.feed.current();
            }
            Command::UpdateSettings { settings } => self.state.apply_settings(settings),
        };

        if changed {
            info!(
                "{}: phase={}, running={}, remaining={}s",
                command.name(),
                self.state.phase,
                self.state.is_running,
                self.state.remaining_at(now)
            );
            self.commit()
        } else {
            if command.is_mutating() {
                debug!("{} left the timer unchanged", command.name());
            }
            self.feed.current()
        }
    }

    fn start(&mut self, now: i64) -> bool {
        if self.state.is_running {
            return false;
        }
        if !self.phase_started && self.state.adopt_configured_length() {
            debug!("Sized {} to current settings before first start", self.state.phase);
        }
        self.phase_started = true;
        self.state.start(now)
    }

    /// Run every phase completion whose end time has passed; returns how many.
    ///
    /// The final state is written once, then one event per completed phase
    /// is emitted in order.
    pub fn catch_up(&mut self) -> usize {
        let now = self.clock.now_ms();
        let mut completed = Vec::new();
        while let Some(end) = self.state.due_end(now) {
            completed.push(self.complete(end));
        }
        if !completed.is_empty() {
            self.commit();
            for phase in &completed {
                self.feed.emit(EngineEvent::PhaseComplete { phase: *phase });
            }
        }
        completed.len()
    }

    /// Complete the current phase and publish it on its own
    fn advance(&mut self, rearm_from_ms: i64) -> Phase {
        let completed = self.complete(rearm_from_ms);
        self.commit();
        self.feed.emit(EngineEvent::PhaseComplete { phase: completed });
        completed
    }

    /// Enter the next phase, re-arming from `rearm_from_ms` if running
    fn complete(&mut self, rearm_from_ms: i64) -> Phase {
        let completed = self.state.complete_phase(rearm_from_ms);
        self.phase_started = self.state.is_running;
        info!(
            "Phase {} complete, entering {} (pomodoros: {}, running: {})",
            completed, self.state.phase, self.state.pomodoro_count, self.state.is_running
        );
        completed
    }

    /// Persist then publish the current state
    fn commit(&mut self) -> Snapshot {
        if let Err(e) = self.store.save(&self.state) {
            error!("Failed to persist timer state, continuing in memory: {}", e);
        }
        self.feed.publish(self.state.clone())
    }
}

fn format_deadline(deadline_ms: i64) -> String {
    DateTime::from_timestamp_millis(deadline_ms)
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| deadline_ms.to_string())
}

struct EngineRequest {
    command: Command,
    reply: oneshot::Sender<Snapshot>,
}

/// Request/response transport to the engine
pub trait CommandTransport: Send + Sync {
    fn send(&self, command: Command) -> BoxFuture<'_, Result<Snapshot, CommandError>>;
}

/// Cloneable in-process channel to the engine task
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    feed: ChangeFeed,
    timeout: Duration,
}

impl std::fmt::Debug for EngineRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRequest")
            .field("command", &self.command)
            .finish()
    }
}

impl EngineHandle {
    /// Issue a command and wait for the resulting snapshot
    pub async fn call_snapshot(&self, command: Command) -> Result<Snapshot, CommandError> {
        let (reply, response) = oneshot::channel();
        let exchange = async {
            self.tx
                .send(EngineRequest { command, reply })
                .await
                .map_err(|_| CommandError::EngineUnavailable)?;
            response.await.map_err(|_| CommandError::EngineUnavailable)
        };
        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| CommandError::Timeout(self.timeout.as_millis() as u64))?
    }

    pub async fn call(&self, command: Command) -> Result<TimerState, CommandError> {
        self.call_snapshot(command).await.map(|snapshot| snapshot.state)
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }
}

impl CommandTransport for EngineHandle {
    fn send(&self, command: Command) -> BoxFuture<'_, Result<Snapshot, CommandError>> {
        Box::pin(self.call_snapshot(command))
    }
}

/// Start the engine task; it stops once every handle has been dropped
pub fn spawn_engine(engine: TimerEngine, timeout: Duration) -> (EngineHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(REQUEST_QUEUE);
    let handle = EngineHandle {
        tx,
        feed: engine.feed.clone(),
        timeout,
    };
    let task = tokio::spawn(engine_task(engine, rx));
    (handle, task)
}

/// Serve commands and wake-ups one at a time.
///
/// The alarm is re-derived from `expectedEndTime` on every pass, so any
/// command that pauses, resets or re-arms the timer replaces it atomically.
async fn engine_task(mut engine: TimerEngine, mut rx: mpsc::Receiver<EngineRequest>) {
    info!("Starting timer engine task");

    loop {
        let alarm: BoxFuture<'static, ()> = match engine.alarm_deadline() {
            Some(deadline) => engine.clock.sleep_until(deadline),
            None => Box::pin(futures::future::pending()),
        };

        tokio::select! {
            biased;

            request = rx.recv() => {
                let Some(EngineRequest { command, reply }) = request else {
                    break;
                };
                debug!("Engine received {}", command.name());
                let snapshot = engine.handle(command);
                if reply.send(snapshot).is_err() {
                    debug!("Caller went away before the engine replied");
                }
            }

            _ = alarm => {
                let advanced = engine.catch_up();
                debug!("Wake-up fired, {} phase(s) advanced", advanced);
            }
        }
    }

    info!("Timer engine task stopped");
}
