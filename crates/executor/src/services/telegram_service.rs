use common::config::TelegramConfig;
use teloxide::prelude::*;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::services::notification::Notification;

/// Relays trading events to one Telegram chat. Send failures never reach the trading loops.
pub struct TelegramService {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramService {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            bot: Bot::new(&config.bot_token),
            chat_id: ChatId(config.chat_id),
        }
    }

    pub async fn start(self, mut rx: broadcast::Receiver<Notification>) {
        info!("Telegram notifications enabled for chat {}", self.chat_id.0);

        loop {
            match rx.recv().await {
                Ok(notification) => {
                    let text = render(&notification);
                    debug!("Notifying: {}", text);
                    if let Err(e) = self.bot.send_message(self.chat_id, text).await {
                        error!("Failed to send Telegram message: {}", e);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    error!("Telegram notifier fell behind, {} event(s) dropped", n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Notification channel closed, Telegram notifier stopping");
                    break;
                }
            }
        }
    }
}

pub fn render(notification: &Notification) -> String {
    match notification {
        Notification::Opened(position) => format!(
            "Opened {} {} {} @ {}\nticket {}, balance {:.2}",
            position.side,
            position.volume,
            position.symbol,
            position.open_price,
            position.ticket,
            position.balance_at_open
        ),
        Notification::Rejected {
            side,
            symbol,
            retcode,
            comment,
        } => format!("{} {} rejected (retcode {}): {}", side, symbol, retcode, comment),
        Notification::Closed {
            ticket,
            symbol,
            volume,
            profit,
            profit_pct,
        } => format!(
            "Closed {} {} (ticket {})\nprofit {:.2} ({:.2}% of balance at open)",
            volume, symbol, ticket, profit, profit_pct
        ),
        Notification::CloseFailed { ticket, reason } => {
            format!("Could not close ticket {}: {}", ticket, reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::models::{Position, Side};

    #[test]
    fn renders_opened_position() {
        let text = render(&Notification::Opened(Position {
            ticket: 41,
            symbol: "BTCUSDT".to_string(),
            side: Side::Buy,
            volume: 18.35,
            open_price: 64_010.0,
            open_time: Utc::now(),
            balance_at_open: 10_000.0,
        }));

        assert_eq!(
            text,
            "Opened BUY 18.35 BTCUSDT @ 64010\nticket 41, balance 10000.00"
        );
    }

    #[test]
    fn renders_rejection_with_retcode() {
        let text = render(&Notification::Rejected {
            side: Side::Sell,
            symbol: "EURUSD".to_string(),
            retcode: 10019,
            comment: "No money".to_string(),
        });

        assert_eq!(text, "SELL EURUSD rejected (retcode 10019): No money");
    }

    #[test]
    fn renders_close_with_profit_share() {
        let text = render(&Notification::Closed {
            ticket: 7,
            symbol: "BTCUSDT".to_string(),
            volume: 1.83,
            profit: 366.0,
            profit_pct: 36.6,
        });

        assert!(text.starts_with("Closed 1.83 BTCUSDT (ticket 7)"));
        assert!(text.ends_with("profit 366.00 (36.60% of balance at open)"));
    }
}
