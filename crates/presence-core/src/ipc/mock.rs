//! Mock transport implementation for testing
//!
//! Records every call and lets tests inject connect / publish failures without
//! a running host. Clones share state, so a test can keep one handle while the
//! state machine owns another.

use super::{PresenceTransport, Result, TransportError};
use crate::activity::Activity;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Call record for mock transport operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Connect { application_id: String },
    SetActivity(Activity),
    Clear,
    Disconnect,
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<MockCall>,
    connected: bool,
    fail_connect: Option<String>,
    fail_publish: Option<String>,
    drop_on_publish: bool,
}

/// In-memory [`PresenceTransport`].
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Clear all recorded calls
    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Whether the simulated session is open
    pub fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    /// Every connect fails with `message` until reset to `None`
    pub fn set_connect_error(&self, message: Option<String>) {
        self.state.lock().unwrap().fail_connect = message;
    }

    /// Every set_activity fails with `message` until reset to `None`
    pub fn set_publish_error(&self, message: Option<String>) {
        self.state.lock().unwrap().fail_publish = message;
    }

    /// The next set_activity finds the session gone
    pub fn drop_on_next_publish(&self) {
        self.state.lock().unwrap().drop_on_publish = true;
    }

    pub fn connect_count(&self) -> usize {
        self.count(|call| matches!(call, MockCall::Connect { .. }))
    }

    pub fn disconnect_count(&self) -> usize {
        self.count(|call| matches!(call, MockCall::Disconnect))
    }

    pub fn published(&self) -> Vec<Activity> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MockCall::SetActivity(activity) => Some(activity),
                _ => None,
            })
            .collect()
    }

    fn count(&self, pred: impl Fn(&MockCall) -> bool) -> usize {
        self.state.lock().unwrap().calls.iter().filter(|c| pred(c)).count()
    }
}

#[async_trait]
impl PresenceTransport for MockTransport {
    async fn connect(&mut self, application_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(MockCall::Connect {
            application_id: application_id.to_string(),
        });

        if let Some(message) = state.fail_connect.clone() {
            return Err(TransportError::Rejected { message });
        }
        state.connected = true;
        Ok(())
    }

    async fn set_activity(&mut self, activity: &Activity) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(MockCall::SetActivity(activity.clone()));

        if !state.connected {
            return Err(TransportError::Closed {
                message: "not connected".to_string(),
            });
        }
        if state.drop_on_publish {
            state.drop_on_publish = false;
            state.connected = false;
            return Err(TransportError::Closed {
                message: "host went away".to_string(),
            });
        }
        if let Some(message) = state.fail_publish.clone() {
            return Err(TransportError::Rejected { message });
        }
        Ok(())
    }

    async fn clear_activity(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(MockCall::Clear);

        if !state.connected {
            return Err(TransportError::Closed {
                message: "not connected".to_string(),
            });
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(MockCall::Disconnect);
        state.connected = false;
        Ok(())
    }
}
