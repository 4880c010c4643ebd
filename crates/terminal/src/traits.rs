use async_trait::async_trait;
use common::models::{AccountInfo, OpenPosition, OrderRequest, OrderResult, SymbolInfo, Tick};

use crate::errors::TerminalError;

/// Operations of a broker terminal. Callers go through [`crate::TerminalGate`] so that
/// `initialize` and `shutdown` are always paired.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait ExecutionTerminal: Send + Sync {
    async fn initialize(&self) -> Result<(), TerminalError>;

    async fn shutdown(&self);

    async fn account_info(&self) -> Result<AccountInfo, TerminalError>;

    async fn symbol_info(&self, symbol: &str) -> Result<SymbolInfo, TerminalError>;

    /// Makes the symbol visible in the terminal's market watch.
    async fn symbol_select(&self, symbol: &str) -> Result<(), TerminalError>;

    async fn symbol_tick(&self, symbol: &str) -> Result<Tick, TerminalError>;

    /// Synchronous submission. A transport failure is an `Err`; a broker refusal is an
    /// `Ok` result whose retcode is not done.
    async fn order_send(&self, request: &OrderRequest) -> Result<OrderResult, TerminalError>;

    async fn positions(&self) -> Result<Vec<OpenPosition>, TerminalError>;
}
