//! Wall-clock access and the durable wake-up primitive

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use futures::future::BoxFuture;
use tokio::sync::watch;

/// Source of "now" plus an alarm that fires once wall time reaches a deadline.
///
/// Alarms are keyed on wall time (epoch milliseconds), not on elapsed
/// monotonic time, so a host that slept through the deadline still fires
/// as soon as it is awake again.
pub trait Clock: Send + Sync + 'static {
    fn now_ms(&self) -> i64;

    /// Resolve once `now_ms() >= deadline_ms`
    fn sleep_until(&self, deadline_ms: i64) -> BoxFuture<'static, ()>;
}

/// Real clock. Sleeps in slices no longer than `recheck` and re-reads wall
/// time after each one.
#[derive(Debug, Clone)]
pub struct SystemClock {
    recheck: Duration,
}

impl SystemClock {
    pub fn new(recheck: Duration) -> Self {
        Self {
            recheck: recheck.max(Duration::from_millis(10)),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    fn sleep_until(&self, deadline_ms: i64) -> BoxFuture<'static, ()> {
        let recheck = self.recheck;
        Box::pin(async move {
            loop {
                let remaining = deadline_ms - Utc::now().timestamp_millis();
                if remaining <= 0 {
                    return;
                }
                let slice = Duration::from_millis(remaining as u64).min(recheck);
                tokio::time::sleep(slice).await;
            }
        })
    }
}

/// Hand-driven clock for deterministic tests. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<watch::Sender<i64>>,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        let (tx, _) = watch::channel(start_ms);
        Self { now: Arc::new(tx) }
    }

    pub fn set(&self, now_ms: i64) {
        self.now.send_modify(|now| *now = now_ms);
    }

    pub fn advance(&self, by: Duration) {
        let by = by.as_millis() as i64;
        self.now.send_modify(|now| *now += by);
    }

    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        *self.now.borrow()
    }

    fn sleep_until(&self, deadline_ms: i64) -> BoxFuture<'static, ()> {
        let mut rx = self.now.subscribe();
        Box::pin(async move {
            loop {
                if *rx.borrow_and_update() >= deadline_ms {
                    return;
                }
                if rx.changed().await.is_err() {
                    futures::future::pending::<()>().await;
                }
            }
        })
    }
}
