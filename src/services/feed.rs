//! Change feed: every persisted timer write and every phase completion,
//! fanned out to all subscribed surfaces

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::state::{Phase, TimerState};

/// Named broadcast sent to every surface when a phase ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineEvent {
    /// Carries the phase that just finished, not the one entered
    PhaseComplete { phase: Phase },
}

/// A published timer state and its position in the write sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub revision: u64,
    pub state: TimerState,
}

#[derive(Debug)]
struct FeedChannels {
    state_tx: watch::Sender<Snapshot>,
    event_tx: broadcast::Sender<EngineEvent>,
}

/// Cloneable handle to the publish/subscribe channels
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    channels: Arc<FeedChannels>,
}

impl ChangeFeed {
    pub fn new(initial: TimerState) -> Self {
        let (state_tx, _) = watch::channel(Snapshot {
            revision: 0,
            state: initial,
        });
        let (event_tx, _) = broadcast::channel(64);
        Self {
            channels: Arc::new(FeedChannels { state_tx, event_tx }),
        }
    }

    /// Publish a written state; returns it stamped with the next revision
    pub fn publish(&self, state: TimerState) -> Snapshot {
        self.channels.state_tx.send_modify(|current| {
            current.revision += 1;
            current.state = state;
        });
        let snapshot = self.current();
        debug!(revision = snapshot.revision, "Published timer state");
        snapshot
    }

    pub fn emit(&self, event: EngineEvent) {
        // No receivers simply means no surface is open right now
        if self.channels.event_tx.send(event).is_err() {
            debug!(?event, "No surfaces listening for engine event");
        }
    }

    pub fn current(&self) -> Snapshot {
        self.channels.state_tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Snapshot> {
        self.channels.state_tx.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<EngineEvent> {
        self.channels.event_tx.subscribe()
    }

    /// Call `callback` with every state published after this call.
    ///
    /// Must be called inside a tokio runtime.
    pub fn subscribe<F>(&self, mut callback: F) -> Subscription
    where
        F: FnMut(&Snapshot) + Send + 'static,
    {
        let mut rx = self.watch();
        rx.borrow_and_update();
        let task = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let snapshot = rx.borrow_and_update().clone();
                callback(&snapshot);
            }
        });
        Subscription { task: Some(task) }
    }

    /// Call `callback` for every engine event emitted after this call
    pub fn on_event<F>(&self, mut callback: F) -> Subscription
    where
        F: FnMut(EngineEvent) + Send + 'static,
    {
        let mut rx = self.events();
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => callback(event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Event subscriber lagged behind");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Subscription { task: Some(task) }
    }
}

/// Live subscription; delivery stops on `unsubscribe` or drop
#[derive(Debug)]
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}
