use chrono::Utc;
use common::config::OrderProfile;
use common::models::{OpenPosition, OrderRequest, OrderResult, Position, Side, TimePolicy};
use storage::PositionStore;
use strategy::{ActionableSignal, PositionSizer};
use terminal::{TerminalGate, TerminalSession};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::errors::ExecutionError;
use crate::services::notification::Notification;

pub const CLOSE_COMMENT: &str = "Auto_Close_Profit";

/// Opens positions for actionable signals and closes tracked ones.
pub struct OrderService {
    gate: TerminalGate,
    store: PositionStore,
    sizer: PositionSizer,
    profile: OrderProfile,
    notify_tx: broadcast::Sender<Notification>,
}

impl OrderService {
    pub fn new(
        gate: TerminalGate,
        store: PositionStore,
        sizer: PositionSizer,
        profile: OrderProfile,
        notify_tx: broadcast::Sender<Notification>,
    ) -> Self {
        Self {
            gate,
            store,
            sizer,
            profile,
            notify_tx,
        }
    }

    pub fn gate(&self) -> &TerminalGate {
        &self.gate
    }

    pub fn store(&self) -> &PositionStore {
        &self.store
    }

    /// Best effort; nobody listening is fine.
    pub fn notify(&self, notification: Notification) {
        let _ = self.notify_tx.send(notification);
    }

    /// Connects, places a market order for `signal`, tracks the fill and releases the terminal.
    pub async fn open_position(
        &self,
        signal: &ActionableSignal,
    ) -> Result<Position, ExecutionError> {
        let session = self.gate.connect().await?;
        let result = self.open_with(&session, signal).await;
        session.release().await;

        match &result {
            Ok(position) => self.notify(Notification::Opened(position.clone())),
            Err(ExecutionError::Rejected { retcode, comment }) => {
                self.notify(Notification::Rejected {
                    side: signal.side,
                    symbol: signal.symbol.clone(),
                    retcode: *retcode,
                    comment: comment.clone(),
                });
            }
            Err(_) => {}
        }

        result
    }

    async fn open_with(
        &self,
        session: &TerminalSession,
        signal: &ActionableSignal,
    ) -> Result<Position, ExecutionError> {
        let symbol = signal.symbol.as_str();
        let balance = session.account().balance;
        info!("Current account balance: {:.2}", balance);

        session.symbol_select(symbol).await?;
        let tick = session.symbol_tick(symbol).await?;

        let constraints = match session.symbol_info(symbol).await {
            Ok(info) => Some(info.volume),
            Err(e) => {
                warn!("Could not get symbol info for {}: {}", symbol, e);
                None
            }
        };

        let volume = self.sizer.size(symbol, balance, constraints.as_ref());
        if !volume.is_finite() || volume <= 0.0 {
            warn!(
                "Calculated lot size {} is invalid or too small. Skipping order placement.",
                volume
            );
            return Err(ExecutionError::InvalidVolume(volume));
        }

        let price = match signal.side {
            Side::Buy => tick.ask,
            Side::Sell => tick.bid,
        };

        let request = self.open_request(signal, volume, price);
        info!(
            "Placing order: {} {} {} at {} (sl {:?}, tp {:?})",
            request.side,
            request.volume,
            request.symbol,
            price,
            request.stop_loss,
            request.take_profit
        );

        let result = session.order_send(&request).await?;
        if !result.is_done() {
            error!(
                "Order send failed, retcode={} comment={}",
                result.retcode, result.comment
            );
            return Err(ExecutionError::Rejected {
                retcode: result.retcode,
                comment: result.comment,
            });
        }

        let position = Position {
            ticket: result.order,
            symbol: symbol.to_string(),
            side: signal.side,
            volume,
            open_price: if result.price > 0.0 { result.price } else { price },
            open_time: Utc::now(),
            balance_at_open: balance,
        };
        if self.store.insert(position.clone()).await.is_some() {
            warn!("Ticket {} was already tracked, replaced", position.ticket);
        }

        info!(
            "Order placed successfully: {} {} {} at {}, ticket {} ({} tracked)",
            position.side,
            position.volume,
            position.symbol,
            position.open_price,
            position.ticket,
            self.store.len().await
        );
        Ok(position)
    }

    /// Sends the opposite deal for `open` on an already connected session.
    pub async fn close_position(
        &self,
        session: &TerminalSession,
        open: &OpenPosition,
    ) -> Result<OrderResult, ExecutionError> {
        let request = self.close_request(open);
        let result = session.order_send(&request).await?;

        if !result.is_done() {
            return Err(ExecutionError::Rejected {
                retcode: result.retcode,
                comment: result.comment,
            });
        }
        Ok(result)
    }

    fn open_request(&self, signal: &ActionableSignal, volume: f64, price: f64) -> OrderRequest {
        let (stop_loss, take_profit) = if self.profile.attach_stops {
            (signal.stop_loss, signal.take_profit)
        } else {
            (None, None)
        };

        OrderRequest {
            symbol: signal.symbol.clone(),
            volume,
            side: signal.side,
            price: Some(price),
            stop_loss,
            take_profit,
            position: None,
            deviation: self.profile.deviation,
            magic: self.profile.magic,
            comment: self.profile.comment_for(signal.side.as_str()),
            type_time: TimePolicy::Gtc,
            type_filling: self.profile.filling,
        }
    }

    fn close_request(&self, open: &OpenPosition) -> OrderRequest {
        OrderRequest {
            symbol: open.symbol.clone(),
            volume: open.volume,
            side: open.side.inverse(),
            price: None,
            stop_loss: None,
            take_profit: None,
            position: Some(open.ticket),
            deviation: self.profile.deviation,
            magic: self.profile.magic,
            comment: CLOSE_COMMENT.to_string(),
            type_time: TimePolicy::Gtc,
            type_filling: self.profile.filling,
        }
    }
}
