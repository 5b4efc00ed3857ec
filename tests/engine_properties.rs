use std::{sync::Arc, time::Duration};

use focus_vigil::{
    services::{ChangeFeed, EngineEvent, ManualClock},
    state::{MemoryStore, Phase, SettingsUpdate, TimerSettings, TimerState},
    tasks::{spawn_engine, EngineHandle, TimerEngine},
    Clock, Command,
};

const T0: i64 = 1_700_000_000_000;

struct Harness {
    clock: ManualClock,
    store: Arc<MemoryStore>,
    handle: EngineHandle,
}

fn spawn_with(store: Arc<MemoryStore>) -> Harness {
    let clock = ManualClock::new(T0);
    let feed = ChangeFeed::new(TimerState::default());
    let engine = TimerEngine::load(Arc::new(clock.clone()), store.clone(), feed);
    let (handle, _task) = spawn_engine(engine, Duration::from_secs(2));
    Harness {
        clock,
        store,
        handle,
    }
}

fn spawn_fresh() -> Harness {
    spawn_with(Arc::new(MemoryStore::new()))
}

async fn settings(h: &Harness, focus: i64, pause: i64, long_pause: i64) -> TimerState {
    h.handle
        .call(Command::UpdateSettings {
            settings: SettingsUpdate {
                focus: Some(focus),
                pause: Some(pause),
                long_pause: Some(long_pause),
            },
        })
        .await
        .unwrap()
}

fn assert_invariants(state: &TimerState) {
    assert!(state.time_remaining <= state.total_duration, "{:?}", state);
    assert_eq!(state.is_running, state.expected_end_time.is_some(), "{:?}", state);
}

#[tokio::test]
async fn focus_elapses_into_the_configured_break() {
    for (focus, pause, long_pause) in [(25, 5, 15), (1, 1, 1), (120, 30, 60), (50, 10, 30)] {
        let h = spawn_fresh();
        settings(&h, focus, pause, long_pause).await;
        h.handle.call(Command::Start).await.unwrap();

        h.clock.advance_secs(focus as u64 * 60);
        let state = h.handle.call(Command::GetState).await.unwrap();

        assert_eq!(state.phase, Phase::Pause);
        assert!(state.is_running);
        assert_eq!(state.time_remaining, pause as u64 * 60);
        assert_eq!(state.total_duration, pause as u64 * 60);
        assert_invariants(&state);
    }
}

#[tokio::test]
async fn every_fourth_focus_completion_earns_a_long_pause() {
    let h = spawn_fresh();
    let s = TimerSettings::default();
    h.handle.call(Command::Start).await.unwrap();

    for n in 1..=12u64 {
        h.clock.advance_secs(s.seconds_for(Phase::Focus));
        let state = h.handle.call(Command::GetState).await.unwrap();
        assert_eq!(state.pomodoro_count, n);
        let expected = if n % 4 == 0 { Phase::LongPause } else { Phase::Pause };
        assert_eq!(state.phase, expected, "completion #{}", n);
        assert_invariants(&state);

        h.clock.advance_secs(state.total_duration);
        let state = h.handle.call(Command::GetState).await.unwrap();
        assert_eq!(state.phase, Phase::Focus);
        assert_eq!(state.pomodoro_count, n);
    }

    let state = h.handle.call(Command::GetState).await.unwrap();
    assert_eq!(state.total_focus_seconds, 12 * 25 * 60);
}

#[tokio::test]
async fn pause_then_start_resumes_frozen_remaining() {
    let h = spawn_fresh();
    h.handle.call(Command::Start).await.unwrap();
    h.clock.advance(Duration::from_millis(95_300));

    let paused = h.handle.call(Command::Pause).await.unwrap();
    assert!(!paused.is_running);
    assert_eq!(paused.time_remaining, 1500 - 95);
    assert_invariants(&paused);

    h.clock.advance_secs(600);
    let resumed = h.handle.call(Command::Start).await.unwrap();
    assert_eq!(resumed.phase, Phase::Focus);
    assert_eq!(resumed.time_remaining, 1405);
    assert_eq!(resumed.expected_end_time, Some(h.clock.now_ms() + 1_405_000));
}

#[tokio::test]
async fn skip_while_paused_on_fourth_focus_lands_on_paused_long_pause() {
    let h = spawn_fresh();
    for _ in 0..3 {
        let on_break = h.handle.call(Command::Skip).await.unwrap();
        assert!(on_break.phase.is_break());
        h.handle.call(Command::Skip).await.unwrap();
    }
    let before = h.handle.call(Command::GetState).await.unwrap();
    assert_eq!(before.phase, Phase::Focus);
    assert_eq!(before.pomodoro_count, 3);

    let after = h.handle.call(Command::Skip).await.unwrap();
    assert_eq!(after.phase, Phase::LongPause);
    assert!(!after.is_running);
    assert_eq!(after.pomodoro_count, 4);
    assert_eq!(after.time_remaining, 15 * 60);
}

#[tokio::test]
async fn skipping_a_break_does_not_count_a_pomodoro() {
    let h = spawn_fresh();
    h.handle.call(Command::Skip).await.unwrap();
    let state = h.handle.call(Command::Skip).await.unwrap();
    assert_eq!(state.phase, Phase::Focus);
    assert_eq!(state.pomodoro_count, 1);
}

#[tokio::test]
async fn skip_while_running_rearms_from_now() {
    let h = spawn_fresh();
    h.handle.call(Command::Start).await.unwrap();
    h.clock.advance_secs(100);
    let state = h.handle.call(Command::Skip).await.unwrap();
    assert_eq!(state.phase, Phase::Pause);
    assert!(state.is_running);
    assert_eq!(state.expected_end_time, Some(T0 + 100_000 + 300_000));
    assert_eq!(state.total_focus_seconds, 1500);
}

#[tokio::test]
async fn restart_replays_exactly_the_elapsed_phases() {
    // Focus ended at `end`; then pause, focus, pause, focus have also elapsed
    // and we are 100s into the third pause.
    let end = T0 - 3_700_000;
    let mut persisted = TimerState::default();
    persisted.start(end - 1_500_000);
    assert_eq!(persisted.expected_end_time, Some(end));
    let store = Arc::new(MemoryStore::with_state(&persisted).unwrap());

    let clock = ManualClock::new(T0);
    let feed = ChangeFeed::new(TimerState::default());
    let mut events = feed.events();
    let engine = TimerEngine::load(Arc::new(clock.clone()), store.clone(), feed);

    let mut completed = Vec::new();
    while let Ok(EngineEvent::PhaseComplete { phase }) = events.try_recv() {
        completed.push(phase);
    }
    assert_eq!(
        completed,
        vec![Phase::Focus, Phase::Pause, Phase::Focus, Phase::Pause, Phase::Focus]
    );

    let (handle, _task) = spawn_engine(engine, Duration::from_secs(2));
    let state = handle.call(Command::GetState).await.unwrap();
    assert_eq!(state.phase, Phase::Pause);
    assert!(state.is_running);
    assert_eq!(state.pomodoro_count, 3);
    assert_eq!(state.expected_end_time, Some(T0 + 200_000));
    assert_eq!(state.remaining_at(T0), 200);

    let saved: TimerState = serde_json::from_str(&store.raw().unwrap()).unwrap();
    assert_eq!(saved, state);
}

#[tokio::test]
async fn settings_are_clamped_and_leave_live_phase_alone() {
    let h = spawn_fresh();
    h.handle.call(Command::Start).await.unwrap();
    h.clock.advance_secs(60);

    let state = h
        .handle
        .call(Command::UpdateSettings {
            settings: SettingsUpdate {
                focus: Some(200),
                ..Default::default()
            },
        })
        .await
        .unwrap();

    assert_eq!(state.settings.focus, 120);
    assert_eq!(state.total_duration, 1500);
    assert_eq!(state.expected_end_time, Some(T0 + 1_500_000));

    // The new length applies the next time focus is entered
    let state = h.handle.call(Command::Reset).await.unwrap();
    assert_eq!(state.total_duration, 120 * 60);
}

#[tokio::test]
async fn concurrent_starts_arm_once() {
    let h = spawn_fresh();
    let before = h.handle.feed().current().revision;
    let other = h.handle.clone();

    let (a, b) = tokio::join!(h.handle.call(Command::Start), other.call(Command::Start));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(a.is_running && b.is_running);
    assert_eq!(a.expected_end_time, Some(T0 + 1_500_000));
    assert_eq!(a.expected_end_time, b.expected_end_time);
    assert_eq!(h.handle.feed().current().revision, before + 1);
}

#[tokio::test]
async fn alarm_fires_without_any_command() {
    let h = spawn_fresh();
    let mut states = h.handle.feed().watch();
    settings(&h, 1, 1, 1).await;
    h.handle.call(Command::Start).await.unwrap();
    states.borrow_and_update();

    h.clock.advance_secs(60);
    let advanced = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            states.changed().await.unwrap();
            let snapshot = states.borrow_and_update().clone();
            if snapshot.state.phase == Phase::Pause {
                return snapshot.state;
            }
        }
    })
    .await
    .expect("wake-up should advance the phase on its own");

    assert!(advanced.is_running);
    assert_eq!(advanced.expected_end_time, Some(T0 + 120_000));

    let saved: TimerState = serde_json::from_str(&h.store.raw().unwrap()).unwrap();
    assert_eq!(saved.phase, Phase::Pause);
}

#[tokio::test]
async fn dropped_engine_reports_unavailable() {
    let clock = ManualClock::new(T0);
    let feed = ChangeFeed::new(TimerState::default());
    let engine = TimerEngine::load(Arc::new(clock), Arc::new(MemoryStore::new()), feed);
    let (handle, task) = spawn_engine(engine, Duration::from_millis(200));
    task.abort();
    let _ = task.await;

    let err = handle.call(Command::GetState).await.unwrap_err();
    assert!(err.is_transport());
}
