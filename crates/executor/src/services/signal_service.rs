use std::sync::Arc;

use async_trait::async_trait;
use common::actors::{Actor, ActorType, ControlMessage, Shutdown};
use common::config::SignalConfig;
use common::models::Position;
use signals::SignalSource;
use strategy::{Rejection, SignalFilter};
use terminal::TerminalError;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::errors::ExecutionError;
use crate::services::order_service::OrderService;

/// Filter state outlives any single poller so the dedup watermark survives restarts.
pub type SharedFilter = Arc<Mutex<Box<dyn SignalFilter>>>;

#[derive(Debug)]
pub enum PollOutcome {
    NoSignal,
    FetchFailed,
    Rejected(Rejection),
    Placed(Position),
    OrderFailed,
    TerminalUnavailable,
}

/// Polls the signal endpoint and places an order for every signal the filter lets through.
pub struct SignalService {
    id: Uuid,
    source: Arc<dyn SignalSource>,
    filter: SharedFilter,
    orders: Arc<OrderService>,
    config: SignalConfig,
}

#[async_trait]
impl Actor for SignalService {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> ActorType {
        ActorType::SignalPoller
    }

    async fn run(
        &mut self,
        supervisor_tx: mpsc::Sender<ControlMessage>,
        mut shutdown: Shutdown,
    ) -> anyhow::Result<()> {
        let _heartbeat = self.spawn_heartbeat(supervisor_tx.clone());

        info!(
            "Starting signal poller ({} filter, every {}s)",
            self.filter.lock().await.name(),
            self.config.poll_interval_secs
        );

        while !shutdown.is_triggered() {
            let delay = match self.poll_once().await {
                Ok(outcome) => {
                    debug!("Poll outcome: {:?}", outcome);
                    self.config.poll_interval()
                }
                Err(e) => {
                    error!("Error in main loop: {:#}", e);
                    let _ = supervisor_tx
                        .send(ControlMessage::Error(self.id, format!("{:#}", e)))
                        .await;
                    self.config.error_backoff()
                }
            };

            if shutdown.sleep(delay).await {
                break;
            }
        }

        info!("Signal poller stopped");
        Ok(())
    }
}

impl SignalService {
    pub fn new(
        source: Arc<dyn SignalSource>,
        filter: SharedFilter,
        orders: Arc<OrderService>,
        config: SignalConfig,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            filter,
            orders,
            config,
        }
    }

    /// Fetch, filter and (maybe) trade once.
    ///
    /// An unreachable terminal is a normal outcome retried at the poll interval. Only a
    /// terminal reply that cannot be decoded, leaving the order state unknown, is an error.
    pub async fn poll_once(&self) -> anyhow::Result<PollOutcome> {
        let signal = match self.source.fetch_signal().await {
            Ok(Some(signal)) => signal,
            Ok(None) => return Ok(PollOutcome::NoSignal),
            Err(e) => {
                warn!("Error fetching signal: {}", e);
                return Ok(PollOutcome::FetchFailed);
            }
        };

        let mut filter = self.filter.lock().await;
        let actionable = match filter.evaluate(&signal) {
            Ok(actionable) => actionable,
            Err(rejection) => {
                debug!("Signal skipped by {} filter: {}", filter.name(), rejection);
                return Ok(PollOutcome::Rejected(rejection));
            }
        };

        info!(
            "Actionable signal: {} {} (entry {:?}, sl {:?}, tp {:?})",
            actionable.side,
            actionable.symbol,
            actionable.entry_price,
            actionable.stop_loss,
            actionable.take_profit
        );

        match self.orders.open_position(&actionable).await {
            Ok(position) => {
                filter.record_submitted(&actionable);
                Ok(PollOutcome::Placed(position))
            }
            Err(e) if e.is_connectivity() => {
                warn!("Terminal unavailable, {} kept for the next poll: {}", actionable.symbol, e);
                Ok(PollOutcome::TerminalUnavailable)
            }
            Err(e @ ExecutionError::Terminal(TerminalError::Decode(_))) => Err(e.into()),
            Err(e) => {
                warn!("Failed to execute trade for {}: {}", actionable.symbol, e);
                Ok(PollOutcome::OrderFailed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::services::order_service::tests::{paper_config, service_for};
    use common::actors::ShutdownTrigger;
    use common::config::{FilterMode, StrategyConfig};
    use common::models::{Signal, SignalAction, SignalStrength, SymbolField};
    use signals::{MockSignalSource, SignalError};
    use strategy::build_filter;
    use terminal::{MockExecutionTerminal, PaperTerminal, TerminalError};

    fn signal_config() -> SignalConfig {
        SignalConfig {
            url: "http://localhost:5000/api/trading-signals".to_string(),
            poll_interval_secs: 5,
            request_timeout_secs: 10,
            error_backoff_secs: 30,
        }
    }

    fn shared_filter(mode: FilterMode) -> SharedFilter {
        Arc::new(Mutex::new(build_filter(&StrategyConfig {
            mode,
            keyword: "doji".to_string(),
            default_symbol: "EURUSD".to_string(),
        })))
    }

    fn fresh_btc(timestamp: i64) -> Signal {
        Signal {
            action: Some(SignalAction::Buy),
            symbol: Some(SymbolField::Ticker("BTCUSDT".to_string())),
            entry_price: Some(100.0),
            stop_loss: Some(90.0),
            take_profit: Some(130.0),
            timestamp: Some(timestamp),
            ..Default::default()
        }
    }

    fn source_returning(signal: Option<Signal>) -> Arc<dyn SignalSource> {
        let mut source = MockSignalSource::new();
        source
            .expect_fetch_signal()
            .returning(move || Ok(signal.clone()));
        Arc::new(source)
    }

    #[tokio::test]
    async fn same_signal_is_traded_once() {
        let paper = Arc::new(PaperTerminal::from_config(&paper_config()));
        let orders = Arc::new(service_for(paper.clone(), FilterMode::FreshSignal));
        let service = SignalService::new(
            source_returning(Some(fresh_btc(1_000))),
            shared_filter(FilterMode::FreshSignal),
            orders.clone(),
            signal_config(),
        );

        assert!(matches!(service.poll_once().await.unwrap(), PollOutcome::Placed(_)));
        assert!(matches!(
            service.poll_once().await.unwrap(),
            PollOutcome::Rejected(Rejection::Stale { .. })
        ));
        assert_eq!(orders.store().len().await, 1);
        assert_eq!(paper.open_tickets().await.len(), 1);
    }

    #[tokio::test]
    async fn failed_order_is_retried() {
        let paper = Arc::new(PaperTerminal::from_config(&paper_config()));
        let orders = Arc::new(service_for(paper.clone(), FilterMode::FreshSignal));
        let service = SignalService::new(
            source_returning(Some(fresh_btc(2_000))),
            shared_filter(FilterMode::FreshSignal),
            orders.clone(),
            signal_config(),
        );

        paper.reject_next_order(10_019).await;
        assert!(matches!(service.poll_once().await.unwrap(), PollOutcome::OrderFailed));
        assert!(orders.store().is_empty().await);

        assert!(matches!(service.poll_once().await.unwrap(), PollOutcome::Placed(_)));
    }

    #[tokio::test]
    async fn incomplete_signal_never_touches_terminal() {
        let mut terminal = MockExecutionTerminal::new();
        terminal.expect_initialize().never();
        terminal.expect_order_send().never();
        let orders = Arc::new(service_for(Arc::new(terminal), FilterMode::FreshSignal));

        let mut signal = fresh_btc(3_000);
        signal.stop_loss = None;
        let service = SignalService::new(
            source_returning(Some(signal)),
            shared_filter(FilterMode::FreshSignal),
            orders,
            signal_config(),
        );

        assert!(matches!(
            service.poll_once().await.unwrap(),
            PollOutcome::Rejected(Rejection::MissingField("stop_loss"))
        ));
    }

    #[tokio::test]
    async fn fetch_failure_is_not_an_error() {
        let mut source = MockSignalSource::new();
        source.expect_fetch_signal().times(1).returning(|| {
            Err(SignalError::Status {
                status: 503,
                body: "unavailable".to_string(),
            })
        });
        let mut terminal = MockExecutionTerminal::new();
        terminal.expect_initialize().never();

        let service = SignalService::new(
            Arc::new(source),
            shared_filter(FilterMode::StrongKeyword),
            Arc::new(service_for(Arc::new(terminal), FilterMode::StrongKeyword)),
            signal_config(),
        );

        assert!(matches!(service.poll_once().await.unwrap(), PollOutcome::FetchFailed));
    }

    #[tokio::test]
    async fn no_signal_is_quiet() {
        let mut terminal = MockExecutionTerminal::new();
        terminal.expect_initialize().never();
        let service = SignalService::new(
            source_returning(None),
            shared_filter(FilterMode::StrongKeyword),
            Arc::new(service_for(Arc::new(terminal), FilterMode::StrongKeyword)),
            signal_config(),
        );

        assert!(matches!(service.poll_once().await.unwrap(), PollOutcome::NoSignal));
    }

    fn unreachable_terminal() -> MockExecutionTerminal {
        let mut terminal = MockExecutionTerminal::new();
        terminal
            .expect_initialize()
            .returning(|| Err(TerminalError::Initialize("no terminal".to_string())));
        terminal.expect_order_send().never();
        terminal
    }

    #[tokio::test]
    async fn unreachable_terminal_keeps_signal_for_next_poll() {
        let service = SignalService::new(
            source_returning(Some(fresh_btc(4_000))),
            shared_filter(FilterMode::FreshSignal),
            Arc::new(service_for(Arc::new(unreachable_terminal()), FilterMode::FreshSignal)),
            signal_config(),
        );

        assert!(matches!(
            service.poll_once().await.unwrap(),
            PollOutcome::TerminalUnavailable
        ));
        // Watermark untouched, the same signal reaches the terminal again.
        assert!(matches!(
            service.poll_once().await.unwrap(),
            PollOutcome::TerminalUnavailable
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_terminal_keeps_poll_cadence() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let counted = fetches.clone();
        let mut source = MockSignalSource::new();
        source.expect_fetch_signal().returning(move || {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(Some(fresh_btc(4_500)))
        });
        let mut service = SignalService::new(
            Arc::new(source),
            shared_filter(FilterMode::FreshSignal),
            Arc::new(service_for(Arc::new(unreachable_terminal()), FilterMode::FreshSignal)),
            signal_config(),
        );

        let trigger = ShutdownTrigger::new();
        let shutdown = trigger.subscribe();
        let (tx, _rx) = mpsc::channel(128);
        let handle = tokio::spawn(async move { service.run(tx, shutdown).await });

        tokio::time::sleep(Duration::from_secs(29)).await;
        trigger.trigger();
        handle.await.unwrap().unwrap();

        // Polls at 0, 5, ..., 25s; the 30s error backoff never kicks in.
        assert_eq!(fetches.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn garbled_terminal_reply_is_an_error() {
        let mut terminal = MockExecutionTerminal::new();
        terminal.expect_initialize().returning(|| Ok(()));
        terminal.expect_account_info().returning(|| {
            Ok(common::models::AccountInfo {
                login: 1,
                server: "Mock".to_string(),
                balance: 1_000.0,
                equity: None,
                currency: None,
            })
        });
        terminal.expect_symbol_select().returning(|_| Ok(()));
        terminal.expect_symbol_tick().returning(|_| {
            Ok(common::models::Tick {
                bid: 100.0,
                ask: 100.0,
                time: None,
            })
        });
        terminal
            .expect_symbol_info()
            .returning(|s| Err(TerminalError::SymbolNotFound(s.to_string())));
        terminal
            .expect_order_send()
            .times(1)
            .returning(|_| Err(TerminalError::Decode("truncated body".to_string())));
        terminal.expect_shutdown().return_const(());

        let orders = Arc::new(service_for(Arc::new(terminal), FilterMode::FreshSignal));
        let service = SignalService::new(
            source_returning(Some(fresh_btc(4_800))),
            shared_filter(FilterMode::FreshSignal),
            orders.clone(),
            signal_config(),
        );

        assert!(service.poll_once().await.is_err());
        assert!(orders.store().is_empty().await);
    }

    #[tokio::test]
    async fn watermark_survives_a_new_poller() {
        let paper = Arc::new(PaperTerminal::from_config(&paper_config()));
        let orders = Arc::new(service_for(paper, FilterMode::FreshSignal));
        let filter = shared_filter(FilterMode::FreshSignal);
        let source = source_returning(Some(fresh_btc(5_000)));

        let first = SignalService::new(
            source.clone(),
            filter.clone(),
            orders.clone(),
            signal_config(),
        );
        assert!(matches!(first.poll_once().await.unwrap(), PollOutcome::Placed(_)));
        drop(first);

        let restarted = SignalService::new(source, filter, orders, signal_config());
        assert!(matches!(
            restarted.poll_once().await.unwrap(),
            PollOutcome::Rejected(Rejection::Stale { .. })
        ));
    }

    #[tokio::test]
    async fn strong_doji_goes_to_default_symbol() {
        let mut paper_cfg = paper_config();
        paper_cfg.symbols.insert(
            "EURUSD".to_string(),
            common::config::PaperSymbol {
                price: 1.1,
                spread: 0.0,
                volume_min: 0.01,
                volume_max: 100.0,
                volume_step: 0.01,
                contract_size: 100_000.0,
            },
        );
        let paper = Arc::new(PaperTerminal::from_config(&paper_cfg));
        let orders = Arc::new(service_for(paper, FilterMode::StrongKeyword));
        let service = SignalService::new(
            source_returning(Some(Signal {
                action: Some(SignalAction::Sell),
                strength: Some(SignalStrength::Strong),
                reason: Some("Gravestone Doji at resistance".to_string()),
                ..Default::default()
            })),
            shared_filter(FilterMode::StrongKeyword),
            orders,
            signal_config(),
        );

        match service.poll_once().await.unwrap() {
            PollOutcome::Placed(position) => {
                assert_eq!(position.symbol, "EURUSD");
                assert_eq!(position.side, common::models::Side::Sell);
                // 1% of 1000 / 10000, clamped up to the minimum lot
                assert_eq!(position.volume, 0.01);
            }
            other => panic!("expected a placed order, got {:?}", other),
        }
    }
}
