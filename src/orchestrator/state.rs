//! Lifecycle state shared between the orchestrator and its periodic tasks.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// `Running` until stopped; there is no restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    Running,
    Stopped,
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorState::Running => f.write_str("running"),
            OrchestratorState::Stopped => f.write_str("stopped"),
        }
    }
}

/// Cloneable handle that stops an orchestrator from anywhere.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<OrchestratorState>>,
}

impl StopHandle {
    pub(crate) fn new(tx: Arc<watch::Sender<OrchestratorState>>) -> Self {
        Self { tx }
    }

    /// Move to `Stopped`. Returns `false` if already stopped.
    pub fn stop(&self) -> bool {
        let previous = self.tx.send_replace(OrchestratorState::Stopped);
        if previous == OrchestratorState::Running {
            log::info!("Orchestrator stopping");
            true
        } else {
            false
        }
    }

    pub fn state(&self) -> OrchestratorState {
        *self.tx.borrow()
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == OrchestratorState::Stopped
    }

    /// Receiver notified on the transition to `Stopped`.
    pub fn subscribe(&self) -> watch::Receiver<OrchestratorState> {
        self.tx.subscribe()
    }
}
