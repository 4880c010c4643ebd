use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignalError {
    #[error("Failed to reach signal endpoint: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Signal endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Malformed signal payload: {0}")]
    Decode(#[from] serde_json::Error),
}
