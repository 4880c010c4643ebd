use common::models::{Position, Side};

/// Trading events worth telling the operator about.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Opened(Position),
    Rejected {
        side: Side,
        symbol: String,
        retcode: u32,
        comment: String,
    },
    Closed {
        ticket: u64,
        symbol: String,
        volume: f64,
        profit: f64,
        profit_pct: f64,
    },
    CloseFailed {
        ticket: u64,
        reason: String,
    },
}
