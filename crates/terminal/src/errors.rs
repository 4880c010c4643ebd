use thiserror::Error;

#[derive(Error, Debug)]
pub enum TerminalError {
    #[error("Terminal initialize failed: {0}")]
    Initialize(String),
    #[error("Account info unavailable: {0}")]
    AccountUnavailable(String),
    #[error("Symbol {0} not found")]
    SymbolNotFound(String),
    #[error("Failed to select symbol {0}")]
    SymbolSelect(String),
    #[error("No tick available for {0}")]
    TickUnavailable(String),
    #[error("Terminal is not connected")]
    NotConnected,
    #[error("Terminal request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Terminal returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Failed to decode terminal response: {0}")]
    Decode(String),
}

impl TerminalError {
    /// The terminal could not be reached at all, as opposed to refusing one request.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Self::Initialize(_)
                | Self::AccountUnavailable(_)
                | Self::NotConnected
                | Self::Transport(_)
        )
    }
}
