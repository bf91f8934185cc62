//! Account task
//!
//! Every account runs in its own tokio task which is the only code allowed
//! to touch it. Backend pushes and caller commands are taken one at a time
//! from a single `select!` loop, so a fee negotiation or a send never sees
//! the utxo set change underneath it. Pushes are served first, but every
//! push is followed by at most one waiting command.
//!
//! The task publishes a `SyncStatus` snapshot on a watch channel after
//! every change and flags subscriptions that produce no balance within
//! `SLOW_SUBSCRIPTION`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};

use crate::account::{Account, SentTransaction};
use crate::backend::BalanceUpdate;
use crate::error::WalletError;
use crate::signer::Signer;
use crate::tx_builder::{CandidateOutput, TxCandidate};
use crate::Result;

/// Time after which a subscription still loading is reported as slow
pub const SLOW_SUBSCRIPTION: Duration = Duration::from_secs(30);

const COMMAND_BUFFER: usize = 32;

/// Observable state of an account task
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
    pub loading: bool,
    pub subscribing_is_slow: bool,
    pub offline: bool,
    pub balance: Option<u64>,
    /// Number of history entries; `None` while the history is reloading
    pub transactions: Option<usize>,
    pub inconsistent: bool,
}

impl SyncStatus {
    pub fn of(account: &Account) -> Self {
        Self {
            loading: account.is_loading(),
            subscribing_is_slow: account.subscribing_is_slow(),
            offline: account.is_offline(),
            balance: account.balance(),
            transactions: account.transactions().map(<[_]>::len),
            inconsistent: account.is_inconsistent(),
        }
    }
}

type Inspector = Box<dyn FnOnce(&Account) + Send>;

enum Command {
    BuildTx {
        outputs: Vec<CandidateOutput>,
        reply: oneshot::Sender<Result<TxCandidate>>,
    },
    SendTx {
        candidate: TxCandidate,
        signer: Arc<dyn Signer>,
        reply: oneshot::Sender<Result<SentTransaction>>,
    },
    Inspect(Inspector),
    Unsubscribe {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle to a running account task
///
/// The task stops once every handle is dropped.
#[derive(Clone)]
pub struct AccountHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<SyncStatus>,
}

impl AccountHandle {
    /// Move `account` into a new task and subscribe it to the backend
    ///
    /// The returned receiver resolves once the first history load finishes,
    /// or with the error if connecting or subscribing fails. It is dropped
    /// without a value if the account is unsubscribed first.
    pub fn spawn(account: Account) -> (Self, oneshot::Receiver<Result<()>>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (status_tx, status_rx) = watch::channel(SyncStatus::of(&account));

        let task = AccountTask {
            account,
            commands: command_rx,
            updates: Some(update_rx),
            ready: Some(ready_tx),
            status: status_tx,
        };
        tokio::spawn(task.run(update_tx));

        (
            Self {
                commands: command_tx,
                status: status_rx,
            },
            ready_rx,
        )
    }

    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }

    pub async fn build_tx(&self, outputs: Vec<CandidateOutput>) -> Result<TxCandidate> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::BuildTx { outputs, reply }).await?;
        rx.await.map_err(|_| WalletError::Closed)?
    }

    pub async fn send_tx(
        &self,
        candidate: TxCandidate,
        signer: Arc<dyn Signer>,
    ) -> Result<SentTransaction> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::SendTx {
            candidate,
            signer,
            reply,
        })
        .await?;
        rx.await.map_err(|_| WalletError::Closed)?
    }

    /// Run a read-only query against the account inside its task
    pub async fn inspect<R, F>(&self, query: F) -> Result<R>
    where
        F: FnOnce(&Account) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        let inspector: Inspector = Box::new(move |account| {
            let _ = reply.send(query(account));
        });
        self.request(Command::Inspect(inspector)).await?;
        rx.await.map_err(|_| WalletError::Closed)
    }

    /// Stop receiving pushes; pending readiness is abandoned
    pub async fn unsubscribe(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Unsubscribe { reply }).await?;
        rx.await.map_err(|_| WalletError::Closed)
    }

    async fn request(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| WalletError::Closed)
    }
}

struct AccountTask {
    account: Account,
    commands: mpsc::Receiver<Command>,
    updates: Option<mpsc::UnboundedReceiver<BalanceUpdate>>,
    ready: Option<oneshot::Sender<Result<()>>>,
    status: watch::Sender<SyncStatus>,
}

async fn next_update(updates: &mut Option<mpsc::UnboundedReceiver<BalanceUpdate>>) -> Option<BalanceUpdate> {
    match updates {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl AccountTask {
    async fn run(mut self, update_tx: mpsc::UnboundedSender<BalanceUpdate>) {
        if let Err(e) = self.account.subscribe(update_tx).await {
            log::error!("Failed to subscribe {}: {}", self.account.label(), e);
            self.updates = None;
            if let Some(ready) = self.ready.take() {
                let _ = ready.send(Err(e));
            }
        }

        let watchdog = tokio::time::sleep(SLOW_SUBSCRIPTION);
        tokio::pin!(watchdog);
        let mut watchdog_armed = true;

        loop {
            tokio::select! {
                biased;

                update = next_update(&mut self.updates) => match update {
                    Some(update) => {
                        self.on_update(update).await;
                        if let Ok(command) = self.commands.try_recv() {
                            self.handle(command).await;
                        }
                    }
                    None => {
                        log::warn!("Backend closed the update stream for {}", self.account.label());
                        self.updates = None;
                    }
                },
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                () = &mut watchdog, if watchdog_armed => {
                    watchdog_armed = false;
                    if self.account.mark_slow_if_loading() {
                        self.publish();
                    }
                }
            }
        }

        log::debug!("Task for {} stopped", self.account.label());
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::BuildTx { outputs, reply } => {
                let _ = reply.send(self.account.build_tx(&outputs).await);
            }
            Command::SendTx {
                candidate,
                signer,
                reply,
            } => {
                let _ = reply.send(self.account.send_tx(&candidate, signer.as_ref()).await);
            }
            Command::Inspect(inspector) => inspector(&self.account),
            Command::Unsubscribe { reply } => {
                self.account.unsubscribe();
                self.updates = None;
                self.ready = None;
                self.publish();
                let _ = reply.send(());
            }
        }
    }

    async fn on_update(&mut self, update: BalanceUpdate) {
        if !self.account.process_balance_update(&update) {
            return;
        }
        self.publish();

        match self.account.load_transactions().await {
            Ok(()) => {
                if let Some(ready) = self.ready.take() {
                    let _ = ready.send(Ok(()));
                }
            }
            Err(e) => log::error!(
                "Failed to load transactions for {}: {}",
                self.account.label(),
                e
            ),
        }
        self.publish();
    }

    fn publish(&self) {
        self.status.send_replace(SyncStatus::of(&self.account));
    }
}
