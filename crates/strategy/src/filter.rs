use common::config::{FilterMode, StrategyConfig};
use common::models::{Side, Signal, SignalAction, SignalStrength};
use thiserror::Error;

/// A signal that passed a filter. Only this type can be turned into an order.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionableSignal {
    pub side: Side,
    pub symbol: String,
    pub entry_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub timestamp: Option<i64>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error("action {0:?} is not tradable")]
    NotTradable(SignalAction),
    #[error("strength {0:?} is not STRONG")]
    NotStrong(Option<SignalStrength>),
    #[error("reason does not mention '{0}'")]
    KeywordMissing(String),
    #[error("signal {timestamp} is not newer than {last_processed}")]
    Stale { timestamp: i64, last_processed: i64 },
    #[error("required field {0} is missing")]
    MissingField(&'static str),
}

/// Decides whether a fetched signal should be traded.
pub trait SignalFilter: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(&self, signal: &Signal) -> Result<ActionableSignal, Rejection>;

    /// Called once the order for `signal` has been filled.
    fn record_submitted(&mut self, _signal: &ActionableSignal) {}
}

pub fn build_filter(config: &StrategyConfig) -> Box<dyn SignalFilter> {
    match config.mode {
        FilterMode::StrongKeyword => Box::new(StrongKeywordFilter::new(
            &config.keyword,
            &config.default_symbol,
        )),
        FilterMode::FreshSignal => Box::new(FreshSignalFilter::new()),
    }
}

fn tradable_side(action: Option<SignalAction>) -> Result<Side, Rejection> {
    match action {
        Some(SignalAction::Buy) => Ok(Side::Buy),
        Some(SignalAction::Sell) => Ok(Side::Sell),
        Some(other) => Err(Rejection::NotTradable(other)),
        None => Err(Rejection::MissingField("action")),
    }
}

/// A zero price is as good as no price for a signal level.
fn price_level(value: Option<f64>, field: &'static str) -> Result<f64, Rejection> {
    value
        .filter(|v| v.is_finite() && *v != 0.0)
        .ok_or(Rejection::MissingField(field))
}

/// Trades BUY/SELL signals marked STRONG whose reason mentions a keyword.
pub struct StrongKeywordFilter {
    keyword: String,
    default_symbol: String,
}

impl StrongKeywordFilter {
    pub fn new(keyword: &str, default_symbol: &str) -> Self {
        Self {
            keyword: keyword.to_lowercase(),
            default_symbol: default_symbol.to_string(),
        }
    }
}

impl SignalFilter for StrongKeywordFilter {
    fn name(&self) -> &'static str {
        "strong_keyword"
    }

    fn evaluate(&self, signal: &Signal) -> Result<ActionableSignal, Rejection> {
        let side = tradable_side(signal.action)?;

        if signal.strength != Some(SignalStrength::Strong) {
            return Err(Rejection::NotStrong(signal.strength));
        }

        let mentions_keyword = signal
            .reason
            .as_deref()
            .is_some_and(|reason| reason.to_lowercase().contains(&self.keyword));
        if !mentions_keyword {
            return Err(Rejection::KeywordMissing(self.keyword.clone()));
        }

        Ok(ActionableSignal {
            side,
            symbol: signal
                .symbol()
                .unwrap_or(self.default_symbol.as_str())
                .to_string(),
            entry_price: signal.entry_price,
            stop_loss: signal.stop_loss,
            take_profit: signal.take_profit,
            timestamp: signal.timestamp,
        })
    }
}

/// Trades complete signals newer than the last one that was filled.
///
/// The watermark only moves in [`SignalFilter::record_submitted`], so a signal whose order
/// failed is tried again when it is fetched again.
#[derive(Debug, Default)]
pub struct FreshSignalFilter {
    last_processed: i64,
}

impl FreshSignalFilter {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn last_processed(&self) -> i64 {
        self.last_processed
    }
}

impl SignalFilter for FreshSignalFilter {
    fn name(&self) -> &'static str {
        "fresh_signal"
    }

    fn evaluate(&self, signal: &Signal) -> Result<ActionableSignal, Rejection> {
        let timestamp = signal.timestamp.unwrap_or(0);
        if timestamp <= self.last_processed {
            return Err(Rejection::Stale {
                timestamp,
                last_processed: self.last_processed,
            });
        }

        let side = tradable_side(signal.action)?;
        let symbol = signal.symbol().ok_or(Rejection::MissingField("symbol"))?;
        let entry_price = price_level(signal.entry_price, "entry_price")?;
        let stop_loss = price_level(signal.stop_loss, "stop_loss")?;
        let take_profit = price_level(signal.take_profit, "take_profit")?;

        Ok(ActionableSignal {
            side,
            symbol: symbol.to_string(),
            entry_price: Some(entry_price),
            stop_loss: Some(stop_loss),
            take_profit: Some(take_profit),
            timestamp: Some(timestamp),
        })
    }

    fn record_submitted(&mut self, signal: &ActionableSignal) {
        if let Some(timestamp) = signal.timestamp {
            self.last_processed = self.last_processed.max(timestamp);
        }
    }
}
