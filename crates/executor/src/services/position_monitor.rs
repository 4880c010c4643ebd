use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use common::actors::{Actor, ActorType, ControlMessage, Shutdown};
use common::config::MonitorConfig;
use common::models::{OpenPosition, Position};
use strategy::{CloseDecision, ClosePolicy};
use terminal::TerminalSession;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::services::notification::Notification;
use crate::services::order_service::OrderService;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MonitorReport {
    pub checked: usize,
    pub closed: usize,
    pub failed: usize,
    /// Tracked tickets the terminal no longer reports.
    pub missing: usize,
    pub terminal_unavailable: bool,
}

/// Closes tracked positions once they reach the profit target.
pub struct PositionMonitor {
    id: Uuid,
    orders: Arc<OrderService>,
    policy: ClosePolicy,
    config: MonitorConfig,
    warned_missing: Mutex<HashSet<u64>>,
}

#[async_trait]
impl Actor for PositionMonitor {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> ActorType {
        ActorType::PositionMonitor
    }

    async fn run(
        &mut self,
        supervisor_tx: mpsc::Sender<ControlMessage>,
        mut shutdown: Shutdown,
    ) -> anyhow::Result<()> {
        let _heartbeat = self.spawn_heartbeat(supervisor_tx.clone());

        info!(
            "Starting position monitor (min profit {}, min {}% of balance)",
            self.policy.min_profit, self.policy.min_profit_pct
        );

        while !shutdown.is_triggered() {
            let delay = match self.check_and_close().await {
                Ok(report) => {
                    if report.closed > 0 || report.failed > 0 {
                        info!(
                            "Monitor pass: checked {}, closed {}, failed {}",
                            report.checked, report.closed, report.failed
                        );
                    } else if report.checked > 0 {
                        debug!("Monitor pass: {} position(s) kept open", report.checked);
                    }
                    self.config.interval()
                }
                Err(e) => {
                    error!("Error in monitor_positions: {:#}", e);
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

        info!("Position monitor stopped");
        Ok(())
    }
}

impl PositionMonitor {
    pub fn new(orders: Arc<OrderService>, config: MonitorConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            orders,
            policy: ClosePolicy::from_config(&config),
            config,
            warned_missing: Mutex::new(HashSet::new()),
        }
    }

    /// One pass over the tracked positions. Connects only when something is tracked.
    pub async fn check_and_close(&self) -> anyhow::Result<MonitorReport> {
        if self.orders.store().is_empty().await {
            return Ok(MonitorReport::default());
        }

        let session = match self.orders.gate().connect().await {
            Ok(session) => session,
            Err(e) if e.is_connectivity() => {
                warn!("Terminal unavailable, skipping position check: {}", e);
                return Ok(MonitorReport {
                    terminal_unavailable: true,
                    ..MonitorReport::default()
                });
            }
            Err(e) => return Err(e.into()),
        };
        let result = self.review(&session).await;
        session.release().await;
        result
    }

    async fn review(&self, session: &TerminalSession) -> anyhow::Result<MonitorReport> {
        let store = self.orders.store();
        let open_positions = session.positions().await?;
        let by_ticket: HashMap<u64, Position> = store
            .snapshot()
            .await
            .into_iter()
            .map(|position| (position.ticket, position))
            .collect();

        let mut report = MonitorReport {
            missing: self.note_missing(&by_ticket, &open_positions).await,
            ..MonitorReport::default()
        };

        for open in &open_positions {
            let Some(tracked) = by_ticket.get(&open.ticket) else {
                continue;
            };
            report.checked += 1;

            match self.policy.evaluate(open.profit, tracked.balance_at_open) {
                CloseDecision::Hold { profit, profit_pct } => {
                    debug!(
                        "Keeping position {} open: profit {:.2} ({})",
                        open.ticket,
                        profit,
                        profit_pct.map_or_else(|| "n/a".to_string(), |p| format!("{:.2}%", p))
                    );
                }
                CloseDecision::Close { profit, profit_pct } => {
                    info!(
                        "Closing position {} {}: profit {:.2} ({:.2}% of {:.2})",
                        open.ticket, open.symbol, profit, profit_pct, tracked.balance_at_open
                    );

                    match self.orders.close_position(session, open).await {
                        Ok(result) => {
                            store.remove(open.ticket).await;
                            report.closed += 1;
                            info!(
                                "Position {} closed at {} with profit {:.2}",
                                open.ticket, result.price, profit
                            );
                            self.orders.notify(Notification::Closed {
                                ticket: open.ticket,
                                symbol: open.symbol.clone(),
                                volume: open.volume,
                                profit,
                                profit_pct,
                            });
                        }
                        Err(e) => {
                            report.failed += 1;
                            warn!("Failed to close position {}: {}", open.ticket, e);
                            self.orders.notify(Notification::CloseFailed {
                                ticket: open.ticket,
                                reason: e.to_string(),
                            });
                        }
                    }
                }
            }
        }

        Ok(report)
    }

    /// Counts tracked tickets absent from `open_positions`, warning once per ticket.
    async fn note_missing(
        &self,
        tracked: &HashMap<u64, Position>,
        open_positions: &[OpenPosition],
    ) -> usize {
        let reported: HashSet<u64> = open_positions.iter().map(|open| open.ticket).collect();
        let missing: Vec<&Position> = tracked
            .values()
            .filter(|position| !reported.contains(&position.ticket))
            .collect();

        let mut warned = self.warned_missing.lock().await;
        warned.retain(|ticket| missing.iter().any(|position| position.ticket == *ticket));
        for position in &missing {
            if warned.insert(position.ticket) {
                warn!(
                    "Tracked position {} {} is no longer reported by the terminal, \
                     it stays tracked until restart",
                    position.ticket, position.symbol
                );
            }
        }

        missing.len()
    }
}
