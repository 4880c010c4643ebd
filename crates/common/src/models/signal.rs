use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalStrength {
    Weak,
    Moderate,
    Strong,
    #[serde(other)]
    Unknown,
}

/// The endpoint sends the symbol either as a bare ticker or as the full symbol descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SymbolField {
    Ticker(String),
    Descriptor { symbol: String },
}

impl SymbolField {
    pub fn ticker(&self) -> &str {
        match self {
            Self::Ticker(s) => s,
            Self::Descriptor { symbol } => symbol,
        }
    }
}

/// A trade directive as fetched from the signal endpoint. Nothing here is validated yet.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Signal {
    #[serde(default)]
    pub action: Option<SignalAction>,
    #[serde(default)]
    pub symbol: Option<SymbolField>,
    #[serde(default)]
    pub strength: Option<SignalStrength>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub entry_price: Option<f64>,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    #[serde(default)]
    pub take_profit: Option<f64>,
    /// Epoch milliseconds.
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub probability: Option<f64>,
}

impl Signal {
    /// Non-empty ticker, if the signal names one.
    pub fn symbol(&self) -> Option<&str> {
        self.symbol
            .as_ref()
            .map(SymbolField::ticker)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}
