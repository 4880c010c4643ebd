use serde::{Deserialize, Serialize};

use crate::models::Side;

/// Terminal return code for an executed request.
pub const RETCODE_DONE: u32 = 10009;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillPolicy {
    /// Immediate or cancel
    Ioc,
    /// Fill or kill
    Fok,
    Return,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimePolicy {
    #[default]
    Gtc,
}

/// A market deal request. `position` is set when the request closes an existing ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub volume: f64,
    pub side: Side,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(rename = "sl", skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<f64>,
    #[serde(rename = "tp", skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u64>,
    pub deviation: u32,
    pub magic: u64,
    pub comment: String,
    pub type_time: TimePolicy,
    pub type_filling: FillPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub retcode: u32,
    #[serde(default)]
    pub order: u64,
    #[serde(default)]
    pub deal: u64,
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub comment: String,
}

impl OrderResult {
    pub fn is_done(&self) -> bool {
        self.retcode == RETCODE_DONE
    }
}
