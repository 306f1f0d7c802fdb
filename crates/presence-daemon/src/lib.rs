//! Presence daemon: adapters that turn file changes and process signals into
//! [`presence_core::PresenceEvent`]s, and the single-consumer loop that feeds
//! them to the lifecycle state machine.

pub mod daemon;
