use terminal::TerminalError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error(transparent)]
    Terminal(#[from] TerminalError),
    #[error("Calculated volume {0} is invalid")]
    InvalidVolume(f64),
    #[error("Order rejected, retcode={retcode} ({comment})")]
    Rejected { retcode: u32, comment: String },
}

impl ExecutionError {
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Terminal(e) if e.is_connectivity())
    }
}
