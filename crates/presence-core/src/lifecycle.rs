//! Presence lifecycle state machine
//!
//! ```text
//! Starting ──start()──▶ Running{paused: false} ⇄ Running{paused: true}
//!                              │                        │
//!                              └──── terminate ─────────┴──▶ Stopped
//! ```
//!
//! The machine is the sole owner of the paused flag, the session timing anchor
//! and the current snapshot. It is driven one event at a time by a single
//! consumer; every transition runs to completion (connect, publish, clear or
//! disconnect included) before the next event is looked at.
//!
//! Failures of the host channel are logged, never raised. After any
//! transition `state().connected` mirrors the connection manager's ground
//! truth, and a settled pause always leaves the session closed.

use crate::activity::Activity;
use crate::config::{ConfigError, ConfigurationSnapshot, SnapshotSource};
use crate::connection::ConnectionManager;
use crate::event::PresenceEvent;
use crate::ipc::PresenceTransport;
use crate::timestamp::{Clock, Refresh, SessionTiming, resolve_start_timestamp};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Unrecoverable startup conditions. Nothing has been connected or published
/// when one of these is returned.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("no configuration found in {origin}: the file is empty")]
    MissingConfig { origin: String },

    #[error("invalid configuration in {origin}: {source}")]
    InvalidConfig {
        origin: String,
        #[source]
        source: ConfigError,
    },

    #[error("start() called twice")]
    AlreadyStarted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Running,
    Stopped,
}

/// The machine's memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleState {
    pub phase: Phase,
    pub paused: bool,
    /// Mirror of the connection manager's ground truth.
    pub connected: bool,
}

impl LifecycleState {
    fn initial() -> Self {
        Self {
            phase: Phase::Starting,
            paused: false,
            connected: false,
        }
    }
}

/// What the event loop should do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

pub struct PresenceMachine<T> {
    connection: ConnectionManager<T>,
    source: Box<dyn SnapshotSource>,
    clock: Arc<dyn Clock>,
    snapshot: Option<Arc<ConfigurationSnapshot>>,
    timing: SessionTiming,
    state: LifecycleState,
}

impl<T: PresenceTransport> PresenceMachine<T> {
    /// Build a machine; the process start time is read from `clock` here.
    pub fn new(transport: T, source: impl SnapshotSource + 'static, clock: Arc<dyn Clock>) -> Self {
        let timing = SessionTiming::new(clock.now());
        Self {
            connection: ConnectionManager::new(transport),
            source: Box::new(source),
            clock,
            snapshot: None,
            timing,
            state: LifecycleState::initial(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn timing(&self) -> SessionTiming {
        self.timing
    }

    pub fn snapshot(&self) -> Option<&ConfigurationSnapshot> {
        self.snapshot.as_deref()
    }

    pub fn connection(&self) -> &ConnectionManager<T> {
        &self.connection
    }

    /// Load the configuration, connect and publish the first activity.
    ///
    /// A missing or invalid configuration aborts before any connection is
    /// attempted. A failed connect is logged and leaves the machine running
    /// disconnected; the next reload or resume tries again.
    pub async fn start(&mut self) -> Result<(), StartupError> {
        if self.state.phase != Phase::Starting {
            return Err(StartupError::AlreadyStarted);
        }

        let origin = self.source.describe();
        let snapshot = match self.source.try_load() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return Err(StartupError::MissingConfig { origin }),
            Err(source) => return Err(StartupError::InvalidConfig { origin, source }),
        };
        debug!("Loaded configuration from {}", origin);

        self.snapshot = Some(Arc::new(snapshot));
        self.state.phase = Phase::Running;
        let now = self.clock.now();
        self.connect_and_publish(Refresh::Carry, now).await;
        Ok(())
    }

    /// Apply one event. Returns [`Flow::Stop`] once the machine is stopped.
    pub async fn handle(&mut self, event: PresenceEvent) -> Flow {
        debug!("Handling {} in {:?}", event, self.state);

        match (self.state.phase, event) {
            (Phase::Stopped, _) => {
                debug!("Ignoring {} after stop", event);
                return Flow::Stop;
            }
            (_, PresenceEvent::TerminateRequested) => self.on_terminate().await,
            (Phase::Starting, _) => warn!("Ignoring {} before startup completed", event),
            (Phase::Running, PresenceEvent::ConfigChanged) => self.on_config_changed().await,
            (Phase::Running, PresenceEvent::PauseRequested) => self.on_pause().await,
            (Phase::Running, PresenceEvent::ResumeRequested) => self.on_resume().await,
        }

        self.sync_connected();
        match self.state.phase {
            Phase::Stopped => Flow::Stop,
            _ => Flow::Continue,
        }
    }

    async fn on_config_changed(&mut self) {
        if self.state.paused {
            info!("Configuration change ignored while paused");
            return;
        }

        info!("Configuration file changed. Reloading...");
        let Some(snapshot) = self.source.load() else {
            self.withdraw().await;
            return;
        };

        // One reading serves both the anchor and the published start, however
        // long the connect below takes.
        let now = self.clock.now();
        if snapshot.refresh_time_on_reload {
            self.timing.mark_refresh(now);
        }
        self.snapshot = Some(Arc::new(snapshot));

        if self.connect_and_publish(Refresh::Fresh, now).await {
            info!("Configuration reloaded and activity updated.");
        }
    }

    /// Configuration went away: stop broadcasting but keep running.
    async fn withdraw(&mut self) {
        info!("Configuration withdrawn; clearing presence");
        self.snapshot = None;
        if self.connection.is_connected()
            && let Err(e) = self.connection.clear().await
        {
            warn!("Failed to clear activity: {}", e);
        }
        self.connection.disconnect().await;
    }

    async fn on_pause(&mut self) {
        if self.state.paused {
            debug!("Already paused");
            return;
        }

        self.connection.disconnect().await;
        self.state.paused = true;
        info!("Presence paused");
    }

    async fn on_resume(&mut self) {
        if !self.state.paused {
            debug!("Not paused; nothing to resume");
            return;
        }

        self.state.paused = false;
        if self.snapshot.is_none() {
            info!("Resumed with no configuration; nothing to publish");
            return;
        }
        let now = self.clock.now();
        if self.connect_and_publish(Refresh::Carry, now).await {
            info!("Presence resumed");
        }
    }

    async fn on_terminate(&mut self) {
        self.connection.disconnect().await;
        self.state.phase = Phase::Stopped;
        info!("Stopped");
    }

    /// Connect for the current snapshot (reconnecting if its application id
    /// changed) and publish it with timing resolved at `now`. Returns whether
    /// the publish went through.
    async fn connect_and_publish(&mut self, refresh: Refresh, now: i64) -> bool {
        let Some(snapshot) = self.snapshot.clone() else {
            return false;
        };

        if let Err(e) = self.connection.ensure_session(&snapshot.application_id).await {
            error!("Failed to connect to host: {}", e);
            self.sync_connected();
            return false;
        }

        let start = resolve_start_timestamp(&snapshot, &self.timing, refresh, now);
        let activity = Activity::from_snapshot(&snapshot, start);
        let published = match self.connection.publish(&activity).await {
            Ok(()) => {
                debug!("Published activity starting at {}", start);
                true
            }
            Err(e) => {
                error!("Failed to publish activity: {}", e);
                false
            }
        };
        self.sync_connected();
        published
    }

    fn sync_connected(&mut self) {
        self.state.connected = self.connection.is_connected();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_snapshot;
    use crate::ipc::{MockCall, MockTransport};
    use crate::timestamp::ManualClock;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const START: i64 = 1_000;

    /// Returns queued results in order, then repeats the last one.
    #[derive(Clone, Default)]
    struct ScriptedSource {
        queue: Arc<Mutex<VecDeque<String>>>,
        last: Arc<Mutex<String>>,
    }

    impl ScriptedSource {
        fn push(&self, text: &str) {
            self.queue.lock().unwrap().push_back(text.to_string());
        }
    }

    impl SnapshotSource for ScriptedSource {
        fn try_load(&self) -> Result<Option<ConfigurationSnapshot>, ConfigError> {
            let mut last = self.last.lock().unwrap();
            if let Some(next) = self.queue.lock().unwrap().pop_front() {
                *last = next;
            }
            parse_snapshot(&last)
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    struct Harness {
        machine: PresenceMachine<MockTransport>,
        mock: MockTransport,
        source: ScriptedSource,
        clock: ManualClock,
    }

    fn harness(initial: &str) -> Harness {
        let mock = MockTransport::new();
        let source = ScriptedSource::default();
        source.push(initial);
        let clock = ManualClock::new(START);
        let machine = PresenceMachine::new(mock.clone(), source.clone(), Arc::new(clock.clone()));
        Harness {
            machine,
            mock,
            source,
            clock,
        }
    }

    async fn started(initial: &str) -> Harness {
        let mut h = harness(initial);
        h.machine.start().await.unwrap();
        h
    }

    const BASIC: &str = r#"{"applicationId": "A", "name": "N", "refreshTimeOnReload": true}"#;

    #[tokio::test]
    async fn test_startup_connects_and_publishes_once() {
        let h = started(BASIC).await;

        assert_eq!(h.mock.connect_count(), 1);
        let published = h.mock.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].start_timestamp(), START);
        assert_eq!(published[0].name, "N");
        assert_eq!(
            h.machine.state(),
            LifecycleState {
                phase: Phase::Running,
                paused: false,
                connected: true,
            }
        );
    }

    #[tokio::test]
    async fn test_startup_without_config_is_fatal() {
        for text in ["", "{}", r#"{"name": "N"}"#, r#"{"applicationId": "A"}"#, "{ broken"] {
            let mut h = harness(text);
            assert!(h.machine.start().await.is_err(), "expected fatal for {text:?}");
            assert!(h.mock.calls().is_empty());
            assert_eq!(h.machine.state().phase, Phase::Starting);
        }
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let mut h = started(BASIC).await;
        assert!(matches!(
            h.machine.start().await,
            Err(StartupError::AlreadyStarted)
        ));
        assert_eq!(h.mock.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_startup_connect_failure_keeps_running() {
        let mut h = harness(BASIC);
        h.mock.set_connect_error(Some("host not running".to_string()));

        h.machine.start().await.unwrap();

        assert_eq!(h.machine.state().phase, Phase::Running);
        assert!(!h.machine.state().connected);
        assert!(h.mock.published().is_empty());

        // Next reload retries.
        h.mock.set_connect_error(None);
        h.clock.advance(5);
        h.machine.handle(PresenceEvent::ConfigChanged).await;
        assert!(h.machine.state().connected);
        assert_eq!(h.mock.published().len(), 1);
    }

    #[tokio::test]
    async fn test_startup_uses_manual_timestamp() {
        let h = started(r#"{"applicationId": "A", "name": "N", "manualTimestamp": 77}"#).await;
        assert_eq!(h.mock.published()[0].start_timestamp(), 77);
    }

    #[tokio::test]
    async fn test_reload_with_refresh_moves_anchor() {
        let mut h = started(BASIC).await;
        h.clock.set(2_000);
        h.source.push(r#"{"applicationId": "A", "name": "N2"}"#);

        let flow = h.machine.handle(PresenceEvent::ConfigChanged).await;

        assert_eq!(flow, Flow::Continue);
        assert_eq!(h.machine.timing().last_refresh_time(), 2_000);
        assert_eq!(h.machine.timing().process_start_time(), START);
        let published = h.mock.published();
        assert_eq!(published.last().unwrap().name, "N2");
        assert_eq!(published.last().unwrap().start_timestamp(), 2_000);
        assert_eq!(h.mock.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_reload_without_refresh_keeps_old_anchor() {
        let mut h = started(BASIC).await;

        h.clock.set(2_000);
        h.machine.handle(PresenceEvent::ConfigChanged).await;
        assert_eq!(h.machine.timing().last_refresh_time(), 2_000);

        h.clock.set(3_000);
        h.source
            .push(r#"{"applicationId": "A", "name": "N2", "refreshTimeOnReload": false}"#);
        h.machine.handle(PresenceEvent::ConfigChanged).await;

        assert_eq!(h.machine.timing().last_refresh_time(), 2_000);
        let last = h.mock.published().pop().unwrap();
        assert_eq!(last.name, "N2");
        assert_eq!(last.start_timestamp(), 2_000);

        // Frozen across further non-refreshing reloads.
        h.clock.set(4_000);
        h.machine.handle(PresenceEvent::ConfigChanged).await;
        assert_eq!(h.mock.published().pop().unwrap().start_timestamp(), 2_000);
    }

    #[tokio::test]
    async fn test_reload_to_empty_mapping_withdraws() {
        let mut h = started(BASIC).await;
        h.source.push("{}");

        h.machine.handle(PresenceEvent::ConfigChanged).await;

        assert_eq!(h.mock.disconnect_count(), 1);
        assert_eq!(h.mock.published().len(), 1);
        let state = h.machine.state();
        assert!(!state.paused);
        assert!(!state.connected);
        assert_eq!(state.phase, Phase::Running);
        assert!(h.machine.snapshot().is_none());
    }

    #[tokio::test]
    async fn test_withdraw_clears_before_disconnecting() {
        let mut h = started(BASIC).await;
        h.mock.clear_calls();
        h.source.push("");

        h.machine.handle(PresenceEvent::ConfigChanged).await;

        assert_eq!(h.mock.calls(), vec![MockCall::Clear, MockCall::Disconnect]);
    }

    #[tokio::test]
    async fn test_withdraw_while_disconnected_sends_nothing() {
        let mut h = harness(BASIC);
        h.mock.set_connect_error(Some("host not running".to_string()));
        h.machine.start().await.unwrap();
        h.mock.clear_calls();
        h.source.push("");

        h.machine.handle(PresenceEvent::ConfigChanged).await;

        assert!(h.mock.calls().is_empty());
        assert!(h.machine.snapshot().is_none());
    }

    /// Transport whose connect takes `latency` seconds of clock time.
    struct SlowConnect {
        inner: MockTransport,
        clock: ManualClock,
        latency: i64,
    }

    #[async_trait::async_trait]
    impl PresenceTransport for SlowConnect {
        async fn connect(&mut self, application_id: &str) -> crate::ipc::Result<()> {
            self.clock.advance(self.latency);
            self.inner.connect(application_id).await
        }

        async fn set_activity(&mut self, activity: &Activity) -> crate::ipc::Result<()> {
            self.inner.set_activity(activity).await
        }

        async fn clear_activity(&mut self) -> crate::ipc::Result<()> {
            self.inner.clear_activity().await
        }

        async fn disconnect(&mut self) -> crate::ipc::Result<()> {
            self.inner.disconnect().await
        }
    }

    #[tokio::test]
    async fn test_reload_reconnect_publishes_the_stored_anchor() {
        let mock = MockTransport::new();
        let source = ScriptedSource::default();
        source.push(BASIC);
        let clock = ManualClock::new(START);
        let transport = SlowConnect {
            inner: mock.clone(),
            clock: clock.clone(),
            latency: 5,
        };
        let mut machine = PresenceMachine::new(transport, source.clone(), Arc::new(clock.clone()));
        machine.start().await.unwrap();

        source.push("");
        machine.handle(PresenceEvent::ConfigChanged).await;
        clock.set(2_000);
        source.push(BASIC);
        machine.handle(PresenceEvent::ConfigChanged).await;

        let reloaded = mock.published().pop().unwrap().start_timestamp();
        assert_eq!(reloaded, 2_000);
        assert_eq!(machine.timing().last_refresh_time(), reloaded);

        machine.handle(PresenceEvent::PauseRequested).await;
        machine.handle(PresenceEvent::ResumeRequested).await;

        assert_eq!(mock.published().pop().unwrap().start_timestamp(), reloaded);
    }

    #[tokio::test]
    async fn test_reload_parse_error_withdraws() {
        let mut h = started(BASIC).await;
        h.source.push("{ oops");

        h.machine.handle(PresenceEvent::ConfigChanged).await;

        assert_eq!(h.mock.disconnect_count(), 1);
        assert!(!h.machine.state().connected);
    }

    #[tokio::test]
    async fn test_withdrawn_then_restored_reconnects() {
        let mut h = started(BASIC).await;
        h.source.push("");
        h.machine.handle(PresenceEvent::ConfigChanged).await;

        h.clock.set(5_000);
        h.source.push(BASIC);
        h.machine.handle(PresenceEvent::ConfigChanged).await;

        assert_eq!(h.mock.connect_count(), 2);
        assert!(h.machine.state().connected);
        assert_eq!(h.mock.published().pop().unwrap().start_timestamp(), 5_000);
    }

    #[tokio::test]
    async fn test_reload_with_new_application_id_reconnects() {
        let mut h = started(BASIC).await;
        h.source.push(r#"{"applicationId": "B", "name": "N"}"#);

        h.machine.handle(PresenceEvent::ConfigChanged).await;

        assert_eq!(h.machine.connection().session_application_id(), Some("B"));
        assert_eq!(h.mock.disconnect_count(), 1);
        assert_eq!(h.mock.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_pause_disconnects_and_is_idempotent() {
        let mut h = started(BASIC).await;

        h.machine.handle(PresenceEvent::PauseRequested).await;
        let once = (h.machine.state(), h.mock.calls());
        h.machine.handle(PresenceEvent::PauseRequested).await;
        let twice = (h.machine.state(), h.mock.calls());

        assert_eq!(once, twice);
        assert!(once.0.paused);
        assert!(!once.0.connected);
        assert_eq!(h.mock.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_config_change_while_paused_is_dropped() {
        let mut h = started(BASIC).await;
        h.machine.handle(PresenceEvent::PauseRequested).await;
        h.mock.clear_calls();
        let anchor = h.machine.timing();

        h.clock.set(9_000);
        h.source.push(r#"{"applicationId": "A", "name": "while paused"}"#);
        h.machine.handle(PresenceEvent::ConfigChanged).await;

        assert!(h.mock.calls().is_empty());
        assert_eq!(h.machine.timing(), anchor);
        assert_eq!(h.machine.snapshot().unwrap().name, "N");
    }

    #[tokio::test]
    async fn test_resume_reconnects_with_existing_anchor() {
        let mut h = started(BASIC).await;
        h.machine.handle(PresenceEvent::PauseRequested).await;

        h.clock.set(8_000);
        h.machine.handle(PresenceEvent::ResumeRequested).await;

        let state = h.machine.state();
        assert!(!state.paused);
        assert!(state.connected);
        assert_eq!(h.mock.connect_count(), 2);
        assert_eq!(h.mock.published().pop().unwrap().start_timestamp(), START);
        assert_eq!(h.machine.timing().last_refresh_time(), START);
    }

    #[tokio::test]
    async fn test_resume_honours_manual_duration() {
        let mut h = started(r#"{"applicationId": "A", "name": "N", "manualDurationSeconds": 60}"#)
            .await;
        h.machine.handle(PresenceEvent::PauseRequested).await;

        h.clock.set(8_000);
        h.machine.handle(PresenceEvent::ResumeRequested).await;

        assert_eq!(h.mock.published().pop().unwrap().start_timestamp(), 7_940);
    }

    #[tokio::test]
    async fn test_resume_while_running_is_noop() {
        let mut h = started(BASIC).await;
        let before = (h.machine.state(), h.machine.timing(), h.mock.calls());

        h.clock.set(6_000);
        h.machine.handle(PresenceEvent::ResumeRequested).await;

        assert_eq!(before, (h.machine.state(), h.machine.timing(), h.mock.calls()));
    }

    #[tokio::test]
    async fn test_resume_without_config_only_unpauses() {
        let mut h = started(BASIC).await;
        h.source.push("");
        h.machine.handle(PresenceEvent::ConfigChanged).await;
        h.machine.handle(PresenceEvent::PauseRequested).await;
        h.mock.clear_calls();

        h.machine.handle(PresenceEvent::ResumeRequested).await;

        assert!(!h.machine.state().paused);
        assert!(h.mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_resume_connect_failure_still_unpauses() {
        let mut h = started(BASIC).await;
        h.machine.handle(PresenceEvent::PauseRequested).await;
        h.mock.set_connect_error(Some("gone".to_string()));

        h.machine.handle(PresenceEvent::ResumeRequested).await;

        let state = h.machine.state();
        assert!(!state.paused);
        assert!(!state.connected);
    }

    #[tokio::test]
    async fn test_publish_failure_reflects_ground_truth() {
        let mut h = started(BASIC).await;
        h.mock.drop_on_next_publish();

        h.machine.handle(PresenceEvent::ConfigChanged).await;

        assert!(!h.machine.state().connected);
        assert_eq!(h.machine.state().phase, Phase::Running);
    }

    #[tokio::test]
    async fn test_terminate_disconnects_and_stops() {
        let mut h = started(BASIC).await;

        let flow = h.machine.handle(PresenceEvent::TerminateRequested).await;

        assert_eq!(flow, Flow::Stop);
        assert_eq!(h.machine.state().phase, Phase::Stopped);
        assert_eq!(h.mock.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_terminate_while_paused_skips_disconnect() {
        let mut h = started(BASIC).await;
        h.machine.handle(PresenceEvent::PauseRequested).await;
        h.mock.clear_calls();

        let flow = h.machine.handle(PresenceEvent::TerminateRequested).await;

        assert_eq!(flow, Flow::Stop);
        assert!(h.mock.calls().is_empty());
        assert_eq!(h.machine.state().phase, Phase::Stopped);
    }

    #[tokio::test]
    async fn test_events_after_stop_are_ignored() {
        let mut h = started(BASIC).await;
        h.machine.handle(PresenceEvent::TerminateRequested).await;
        h.mock.clear_calls();

        for event in [
            PresenceEvent::ConfigChanged,
            PresenceEvent::ResumeRequested,
            PresenceEvent::PauseRequested,
            PresenceEvent::TerminateRequested,
        ] {
            assert_eq!(h.machine.handle(event).await, Flow::Stop);
        }
        assert!(h.mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_terminate_before_start() {
        let mut h = harness(BASIC);
        assert_eq!(
            h.machine.handle(PresenceEvent::TerminateRequested).await,
            Flow::Stop
        );
        assert!(h.mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_events_before_start_are_ignored() {
        let mut h = harness(BASIC);
        assert_eq!(
            h.machine.handle(PresenceEvent::ConfigChanged).await,
            Flow::Continue
        );
        assert!(h.mock.calls().is_empty());
        assert_eq!(h.machine.state().phase, Phase::Starting);
    }

    #[tokio::test]
    async fn test_reload_publishes_full_activity() {
        let mut h = started(BASIC).await;
        h.source.push(
            r#"{
                "applicationId": "A",
                "name": "N",
                "details": "d",
                "largeImageKey": "img",
                "activityType": 2,
            }"#,
        );

        h.machine.handle(PresenceEvent::ConfigChanged).await;

        match h.mock.calls().pop().unwrap() {
            MockCall::SetActivity(activity) => {
                assert_eq!(activity.details.as_deref(), Some("d"));
                assert_eq!(activity.assets.large_image.as_deref(), Some("img"));
                assert_eq!(activity.activity_type, Some(2));
            }
            other => panic!("expected SetActivity, got {other:?}"),
        }
    }
}
