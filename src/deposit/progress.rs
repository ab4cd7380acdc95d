//! Deposit progress as seen by observers.
//!
//! The orchestrator is the only writer; observers subscribe to a watch channel
//! and each read is a point-in-time snapshot.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DepositPhase {
    #[default]
    Idle,
    CreatingBroker,
    TransferringToBroker,
    ClearingBroker,
    Done,
    Failed,
}

#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct DepositProgressState {
    /// 0 to 100
    pub progress: u8,
    pub progress_message: String,
    pub error_message: String,
    pub phase: DepositPhase,
    pub attempt: Option<Uuid>,
}

#[derive(Clone)]
pub struct ProgressHandle {
    sender: Arc<watch::Sender<DepositProgressState>>,
}

impl Default for ProgressHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressHandle {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(DepositProgressState::default());
        ProgressHandle {
            sender: Arc::new(sender),
        }
    }

    pub fn snapshot(&self) -> DepositProgressState {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DepositProgressState> {
        self.sender.subscribe()
    }

    /// Back to (0, "", "") for a fresh attempt.
    /// Resets to a blank state owned by `attempt`.
    pub(crate) fn start(&self, attempt: Uuid) {
        self.sender.send_replace(DepositProgressState {
            progress: 0,
            progress_message: String::new(),
            error_message: String::new(),
            phase: DepositPhase::CreatingBroker,
            attempt: Some(attempt),
        });
    }

    pub(crate) fn advance(&self, phase: DepositPhase, progress: u8, message: &str) {
        self.sender.send_modify(|state| {
            state.phase = phase;
            state.progress = progress;
            state.progress_message = message.to_string();
            state.error_message.clear();
        });
    }

    pub(crate) fn set_message(&self, message: &str) {
        self.sender.send_modify(|state| {
            state.progress_message = message.to_string();
        });
    }

    pub(crate) fn fail(&self, error: &str) {
        self.sender.send_modify(|state| {
            state.phase = DepositPhase::Failed;
            state.progress = 0;
            state.progress_message.clear();
            state.error_message = error.to_string();
        });
    }

    /// Clears progress and message if `attempt` is still the finished one on display.
    pub(crate) fn reset_after_done(&self, attempt: Uuid) -> bool {
        self.sender.send_if_modified(|state| {
            if state.attempt != Some(attempt) || state.phase != DepositPhase::Done {
                return false;
            }
            state.phase = DepositPhase::Idle;
            state.progress = 0;
            state.progress_message.clear();
            true
        })
    }

    /// Puts back a phase persisted before a restart.
    pub(crate) fn restore(&self, attempt: Uuid, phase: DepositPhase) {
        self.sender.send_modify(|state| {
            state.attempt = Some(attempt);
            state.phase = phase;
        });
    }
}
