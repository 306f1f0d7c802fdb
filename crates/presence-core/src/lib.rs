//! Core library for presence-keeper
//!
//! Keeps a single activity status published to a long-running host process
//! over its local IPC channel, reconciling three independent inputs:
//!
//! - the configuration file (initial load and hot reloads)
//! - availability of the host connection
//! - pause / resume / terminate requests from the operating process
//!
//! The [`lifecycle::PresenceMachine`] is the only stateful component. Everything
//! it talks to sits behind a seam so it can be driven without a live host:
//! [`config::SnapshotSource`] for configuration, [`ipc::PresenceTransport`] for
//! the channel and [`timestamp::Clock`] for wall-clock time.

pub mod activity;
pub mod config;
pub mod connection;
pub mod event;
pub mod ipc;
pub mod lifecycle;
pub mod logging;
pub mod timestamp;

pub use activity::Activity;
pub use config::{ConfigError, ConfigFile, ConfigurationSnapshot, SnapshotSource};
pub use connection::{ConnectionError, ConnectionManager};
pub use event::{PresenceEvent, ProcessSignal};
pub use lifecycle::{Flow, LifecycleState, Phase, PresenceMachine, StartupError};
pub use timestamp::{Clock, ManualClock, Refresh, SessionTiming, SystemClock};
