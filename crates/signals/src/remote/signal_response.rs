use common::models::Signal;
use serde::Deserialize;

/// Body of the signal endpoint. `signal` is absent or null when nothing is pending.
#[derive(Deserialize, Debug, Default)]
pub struct SignalEnvelope {
    #[serde(default)]
    pub signal: Option<Signal>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub age_seconds: Option<u64>,
    #[serde(default)]
    pub is_fresh: Option<bool>,
}

impl SignalEnvelope {
    pub fn into_signal(self) -> Option<Signal> {
        self.signal
    }
}
