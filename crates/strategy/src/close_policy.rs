use common::config::MonitorConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CloseDecision {
    Close { profit: f64, profit_pct: f64 },
    Hold { profit: f64, profit_pct: Option<f64> },
}

impl CloseDecision {
    pub fn should_close(&self) -> bool {
        matches!(self, Self::Close { .. })
    }
}

/// Take-profit rule: profit must clear an absolute floor and a share of the balance at open.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosePolicy {
    pub min_profit: f64,
    pub min_profit_pct: f64,
}

impl ClosePolicy {
    pub fn new(min_profit: f64, min_profit_pct: f64) -> Self {
        Self {
            min_profit,
            min_profit_pct,
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(config.min_profit, config.min_profit_pct)
    }

    /// Profit as a percentage of `balance`. `None` when the balance cannot be a base.
    pub fn profit_pct(profit: f64, balance: f64) -> Option<f64> {
        (balance > 0.0 && balance.is_finite()).then(|| profit / balance * 100.0)
    }

    pub fn meets_target(&self, profit: f64, profit_pct: f64) -> bool {
        profit > self.min_profit && profit_pct >= self.min_profit_pct
    }

    pub fn evaluate(&self, profit: f64, balance_at_open: f64) -> CloseDecision {
        match Self::profit_pct(profit, balance_at_open) {
            Some(profit_pct) if self.meets_target(profit, profit_pct) => {
                CloseDecision::Close { profit, profit_pct }
            }
            profit_pct => CloseDecision::Hold { profit, profit_pct },
        }
    }
}

impl Default for ClosePolicy {
    fn default() -> Self {
        Self::new(1.0, 20.0)
    }
}
