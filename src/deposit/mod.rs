//! # Broker Deposit Workflow
//!
//! A deposit takes three transactions, each submitted only after the receipt
//! of the previous one was observed:
//!
//! 1. `create_broker` on the wrapper token; its receipt announces the broker
//! 2. `transfer` of the deposit amount into the broker
//! 3. `clear` on the broker, which credits the wrapped tokens
//!
//! A receipt without logs means the transaction reverted and ends the attempt.
//! The orchestrator runs on a single task and handles one command or outcome at
//! a time; progress is published through [`ProgressHandle`].

pub mod progress;
pub mod tracker;

use crate::chain::{ChainClient, ChainError, DepositContext, PendingTransaction, Receipt, TxKind};
use crate::state::AppSettings;
use crate::storage::Storage;
use crate::utils::constants::*;
use crate::utils::pretty_error;
use num_bigint::BigUint;
use num_traits::Zero;
use progress::{DepositPhase, ProgressHandle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracker::{TrackedOutcome, TransactionTracker};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DepositError {
    #[error("deposit amount must be greater than zero")]
    ZeroAmount,
    #[error("{0}")]
    Submission(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("deposit service stopped")]
    Stopped,
}

pub enum DepositCommand {
    Begin {
        amount: BigUint,
        reply: oneshot::Sender<Result<Uuid, DepositError>>,
    },
}

/// Cheap handle for starting deposits on the orchestrator task.
#[derive(Clone)]
pub struct DepositHandle {
    commands: mpsc::Sender<DepositCommand>,
}

impl DepositHandle {
    pub async fn begin(&self, amount: BigUint) -> Result<Uuid, DepositError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(DepositCommand::Begin { amount, reply })
            .await
            .map_err(|_| DepositError::Stopped)?;
        response.await.map_err(|_| DepositError::Stopped)?
    }
}

#[derive(Debug, Clone)]
pub struct DepositSettings {
    pub deposit_token: String,
    pub wrapper_token: String,
    pub reset_delay: Duration,
}

impl From<&AppSettings> for DepositSettings {
    fn from(settings: &AppSettings) -> Self {
        DepositSettings {
            deposit_token: settings.deposit_token.clone(),
            wrapper_token: settings.wrapper_token.clone(),
            reset_delay: settings.progress_reset_delay(),
        }
    }
}

fn phase_of(kind: TxKind) -> DepositPhase {
    match kind {
        TxKind::CreateBroker => DepositPhase::CreatingBroker,
        TxKind::TransferToBroker => DepositPhase::TransferringToBroker,
        TxKind::ClearBroker => DepositPhase::ClearingBroker,
    }
}

pub struct DepositOrchestrator {
    client: Arc<dyn ChainClient>,
    tracker: TransactionTracker,
    progress: ProgressHandle,
    storage: Arc<Storage>,
    settings: DepositSettings,
    attempt: Option<Uuid>,
}

impl DepositOrchestrator {
    /// Picks up the attempt persisted before a restart if it still has a pending transaction.
    pub fn new(
        client: Arc<dyn ChainClient>,
        tracker: TransactionTracker,
        progress: ProgressHandle,
        storage: Arc<Storage>,
        settings: DepositSettings,
    ) -> Self {
        let mut orchestrator = DepositOrchestrator {
            client,
            tracker,
            progress,
            storage,
            settings,
            attempt: None,
        };
        orchestrator.restore_attempt();
        orchestrator
    }

    fn restore_attempt(&mut self) {
        let stored = match self.storage.get_setting(DEPOSIT_ATTEMPT_KEY) {
            Ok(stored) => stored,
            Err(e) => {
                log::error!("Failed to read deposit attempt: {}", e);
                return;
            }
        };
        let Some(attempt) = stored.and_then(|s| Uuid::parse_str(&s).ok()) else {
            return;
        };

        let pending = self
            .tracker
            .get_pending_transactions()
            .into_iter()
            .find(|p| p.context.attempt == attempt);
        match pending {
            Some(pending) => {
                log::info!(
                    "Resuming deposit {} at {} ({})",
                    attempt,
                    pending.kind,
                    pending.tx_hash
                );
                self.attempt = Some(attempt);
                self.progress.restore(attempt, phase_of(pending.kind));
            }
            None => self.forget_attempt(),
        }
    }

    pub fn current_attempt(&self) -> Option<Uuid> {
        self.attempt
    }

    /// Starts a new deposit of `amount` (smallest token unit) by creating a broker.
    ///
    /// Any earlier attempt is superseded; its late receipts are ignored.
    pub async fn begin(&mut self, amount: BigUint) -> Result<Uuid, DepositError> {
        if amount.is_zero() {
            return Err(DepositError::ZeroAmount);
        }

        let attempt = Uuid::new_v4();
        if let Some(previous) = self.attempt.replace(attempt) {
            log::warn!("Deposit {} superseded by {}", previous, attempt);
        }
        if let Err(e) = self
            .storage
            .save_setting(DEPOSIT_ATTEMPT_KEY, &attempt.to_string())
        {
            log::error!("Failed to persist deposit attempt {}: {}", attempt, e);
        }
        self.progress.start(attempt);
        self.progress.set_message(MSG_CREATING_APPROVAL);
        log::info!("Deposit {}: creating broker for {}", attempt, amount);

        let submitted = match self.client.get_token(&self.settings.wrapper_token).await {
            Ok(wrapper) => wrapper.create_broker().await,
            Err(e) => Err(e),
        };
        let tx_hash = match submitted {
            Ok(tx_hash) => tx_hash,
            Err(e) => {
                let message = self.fail_submission(&e);
                return Err(DepositError::Submission(message));
            }
        };

        self.progress.set_message(MSG_CREATING_CONFIRMATION);
        let context = DepositContext::new(attempt, amount.to_str_radix(10));
        if let Err(e) = self.track(PendingTransaction::new(TxKind::CreateBroker, tx_hash, context)) {
            self.fail(&e);
            return Err(DepositError::Storage(e));
        }
        Ok(attempt)
    }

    /// Advances the workflow with the receipt of one of its transactions.
    pub async fn handle(&mut self, outcome: TrackedOutcome) {
        let TrackedOutcome { pending, receipt } = outcome;

        if self.attempt != Some(pending.context.attempt) {
            log::warn!(
                "Ignoring {} receipt {} of superseded deposit {}",
                pending.kind,
                pending.tx_hash,
                pending.context.attempt
            );
            return;
        }
        let phase = self.progress.snapshot().phase;
        if phase != phase_of(pending.kind) {
            log::warn!(
                "Ignoring {} receipt {} while deposit is {:?}",
                pending.kind,
                pending.tx_hash,
                phase
            );
            return;
        }

        match pending.kind {
            TxKind::CreateBroker => self.on_broker_created(pending.context, receipt).await,
            TxKind::TransferToBroker => self.on_broker_funded(pending.context, receipt).await,
            TxKind::ClearBroker => self.on_broker_cleared(pending.context, receipt),
        }
    }

    async fn on_broker_created(&mut self, context: DepositContext, receipt: Receipt) {
        if receipt.is_reverted() {
            return self.fail(ERR_CREATING_BROKER);
        }
        let Some(broker) = receipt.broker_address() else {
            log::warn!(
                "Deposit {}: create_broker receipt {} names no broker",
                context.attempt,
                receipt.transaction_hash
            );
            return self.fail(ERR_CREATING_BROKER);
        };
        log::info!("Deposit {}: broker {}", context.attempt, broker);
        self.progress.advance(
            DepositPhase::TransferringToBroker,
            PROGRESS_BROKER_CREATED,
            MSG_TRANSFERRING_APPROVAL,
        );

        let Some(amount) = BigUint::parse_bytes(context.amount.as_bytes(), 10) else {
            return self.fail(&format!("Invalid deposit amount {}", context.amount));
        };
        let submitted = match self.client.get_token(&self.settings.deposit_token).await {
            Ok(token) => token.transfer(&broker, &amount).await,
            Err(e) => Err(e),
        };
        match submitted {
            Ok(tx_hash) => {
                log::info!("Deposit {}: transfer to broker {}", context.attempt, tx_hash);
                self.progress.set_message(MSG_TRANSFERRING_CONFIRMATION);
                let next = context.with_broker(broker);
                if let Err(e) = self.track(PendingTransaction::new(TxKind::TransferToBroker, tx_hash, next)) {
                    self.fail(&e);
                }
            }
            Err(e) => {
                self.fail_submission(&e);
            }
        }
    }

    async fn on_broker_funded(&mut self, context: DepositContext, receipt: Receipt) {
        if receipt.is_reverted() {
            return self.fail(ERR_TRANSFERRING_TO_BROKER);
        }
        let Some(broker) = context.broker.clone() else {
            log::warn!("Deposit {}: no broker in transfer context", context.attempt);
            return self.fail(ERR_TRANSFERRING_TO_BROKER);
        };
        self.progress.advance(
            DepositPhase::ClearingBroker,
            PROGRESS_BROKER_FUNDED,
            MSG_CLEARING_APPROVAL,
        );

        match self.client.broker_at(&broker).clear().await {
            Ok(tx_hash) => {
                log::info!("Deposit {}: clear broker {}", context.attempt, tx_hash);
                self.progress.set_message(MSG_CLEARING_CONFIRMATION);
                if let Err(e) = self.track(PendingTransaction::new(TxKind::ClearBroker, tx_hash, context)) {
                    self.fail(&e);
                }
            }
            Err(e) => {
                self.fail_submission(&e);
            }
        }
    }

    fn on_broker_cleared(&mut self, context: DepositContext, receipt: Receipt) {
        if receipt.is_reverted() {
            return self.fail(ERR_CLEARING_BROKER);
        }
        self.progress
            .advance(DepositPhase::Done, PROGRESS_DONE, MSG_DEPOSIT_DONE);
        self.forget_attempt();
        log::info!("Deposit {} done", context.attempt);

        let progress = self.progress.clone();
        let delay = self.settings.reset_delay;
        let attempt = context.attempt;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            progress.reset_after_done(attempt);
        });
    }

    fn track(&self, tx: PendingTransaction) -> Result<(), String> {
        self.tracker
            .register(tx)
            .map_err(|e| format!("Could not track the transaction: {}", e))
    }

    fn fail(&mut self, error: &str) {
        log::warn!("Deposit {:?} failed: {}", self.attempt, error);
        self.progress.fail(error);
        self.forget_attempt();
    }

    fn fail_submission(&mut self, error: &ChainError) -> String {
        let message = pretty_error(error);
        self.fail(&message);
        message
    }

    /// Drops the persisted attempt; the in-memory one stays so late receipts are recognised.
    fn forget_attempt(&mut self) {
        if let Err(e) = self.storage.remove_setting(DEPOSIT_ATTEMPT_KEY) {
            log::warn!("Failed to clear persisted deposit attempt: {}", e);
        }
    }

    /// Processes commands and outcomes one at a time until both channels close.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<DepositCommand>,
        mut outcomes: mpsc::UnboundedReceiver<TrackedOutcome>,
    ) {
        log::info!("Deposit orchestrator: Started");
        loop {
            tokio::select! {
                Some(command) = commands.recv() => match command {
                    DepositCommand::Begin { amount, reply } => {
                        let result = self.begin(amount).await;
                        let _ = reply.send(result);
                    }
                },
                Some(outcome) = outcomes.recv() => self.handle(outcome).await,
                else => break,
            }
        }
        log::info!("Deposit orchestrator: Terminated");
    }
}

/// Spawns the orchestrator task and returns the handle used to start deposits.
pub fn spawn_deposit_orchestrator(
    orchestrator: DepositOrchestrator,
    outcomes: mpsc::UnboundedReceiver<TrackedOutcome>,
) -> (DepositHandle, JoinHandle<()>) {
    let (commands, command_rx) = mpsc::channel(16);
    let task = tokio::spawn(orchestrator.run(command_rx, outcomes));
    (DepositHandle { commands }, task)
}
