use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub login: u64,
    pub server: String,
    pub balance: f64,
    #[serde(default)]
    pub equity: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
}

/// Lot grid a broker accepts for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeConstraints {
    pub volume_min: f64,
    pub volume_max: f64,
    pub volume_step: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub name: String,
    #[serde(flatten)]
    pub volume: VolumeConstraints,
    #[serde(default)]
    pub digits: Option<u32>,
    #[serde(default)]
    pub visible: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub bid: f64,
    pub ask: f64,
    #[serde(default)]
    pub time: Option<i64>,
}
