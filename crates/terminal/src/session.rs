use std::ops::Deref;
use std::sync::Arc;

use common::models::AccountInfo;
use tokio::runtime::Handle;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, warn};

use crate::{errors::TerminalError, traits::ExecutionTerminal};

/// Hands out one terminal session at a time.
///
/// The terminal is never held connected between operations: every caller connects, does its
/// work and releases, and the gate's lock keeps those windows from overlapping.
#[derive(Clone)]
pub struct TerminalGate {
    terminal: Arc<dyn ExecutionTerminal>,
    lock: Arc<Mutex<()>>,
}

impl TerminalGate {
    pub fn new(terminal: Arc<dyn ExecutionTerminal>) -> Self {
        Self {
            terminal,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Waits for the terminal, initializes it and reads the account.
    ///
    /// If the account cannot be read the terminal is shut down again before returning.
    pub async fn connect(&self) -> Result<TerminalSession, TerminalError> {
        let guard = self.lock.clone().lock_owned().await;

        self.terminal.initialize().await?;

        let account = match self.terminal.account_info().await {
            Ok(account) => account,
            Err(e) => {
                self.terminal.shutdown().await;
                return Err(e);
            }
        };

        debug!(
            "Terminal connected. Account: {}, Server: {}, Balance: {:.2}",
            account.login, account.server, account.balance
        );

        Ok(TerminalSession {
            terminal: self.terminal.clone(),
            account,
            guard: Some(guard),
        })
    }
}

/// An initialized terminal plus the account snapshot taken at connect time.
///
/// Call [`TerminalSession::release`] when done. A session dropped without release (a panic or
/// a cancelled future) shuts the terminal down on the runtime and keeps the gate locked until
/// that finishes.
pub struct TerminalSession {
    terminal: Arc<dyn ExecutionTerminal>,
    account: AccountInfo,
    guard: Option<OwnedMutexGuard<()>>,
}

impl TerminalSession {
    pub fn account(&self) -> &AccountInfo {
        &self.account
    }

    pub async fn release(mut self) {
        if let Some(guard) = self.guard.take() {
            self.terminal.shutdown().await;
            debug!("Terminal released");
            drop(guard);
        }
    }
}

impl Deref for TerminalSession {
    type Target = dyn ExecutionTerminal;

    fn deref(&self) -> &Self::Target {
        self.terminal.as_ref()
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };

        warn!("Terminal session dropped without release, shutting down in background");
        let terminal = self.terminal.clone();
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    terminal.shutdown().await;
                    drop(guard);
                });
            }
            Err(_) => error!("No runtime available to shut the terminal down"),
        }
    }
}
