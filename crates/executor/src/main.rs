use anyhow::Context;
use dotenvy::dotenv;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, error, info};

use common::actors::ActorType;
use common::config::{BridgeConfig, ConfigLoader, TerminalKind};
use common::logger;
use signals::{SignalClient, SignalSource};
use storage::PositionStore;
use strategy::{PositionSizer, build_filter};
use terminal::{BridgeTerminal, ExecutionTerminal, PaperTerminal, TerminalGate};

use crate::actors::supervisor::Supervisor;
use crate::services::notification::Notification;
use crate::services::order_service::OrderService;
use crate::services::position_monitor::PositionMonitor;
use crate::services::signal_service::{SharedFilter, SignalService};
use crate::services::telegram_service::TelegramService;

mod actors;
mod errors;
mod services;

fn build_terminal(config: &BridgeConfig) -> anyhow::Result<Arc<dyn ExecutionTerminal>> {
    Ok(match config.terminal.kind {
        TerminalKind::Paper => {
            info!("Using paper terminal, no orders leave this process");
            Arc::new(PaperTerminal::from_config(&config.terminal.paper))
        }
        TerminalKind::Bridge => {
            let bridge = BridgeTerminal::from_config(&config.terminal)
                .context("Failed to build bridge terminal client")?;
            info!("Using bridge terminal at {}", bridge.base_url());
            Arc::new(bridge)
        }
    })
}

/// Connects once so a dead terminal or bad credentials stop the bot before any cycle runs.
async fn check_terminal(gate: &TerminalGate) -> anyhow::Result<()> {
    let session = gate
        .connect()
        .await
        .context("Terminal startup check failed")?;
    let account = session.account();
    info!(
        "Connected to account {} on {}, balance {:.2}",
        account.login, account.server, account.balance
    );
    session.release().await;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let config = ConfigLoader::load().context("Failed to load configuration")?;
    logger::setup_logger(&config.logging).context("Failed to open log file")?;
    debug!("System starting up...");
    if let Some(file) = &config.logging.file {
        info!("Logging to {}", file.display());
    }
    info!(
        "Signal endpoint {}, {:?} mode",
        config.signal.url, config.strategy.mode
    );

    let gate = TerminalGate::new(build_terminal(&config)?);
    check_terminal(&gate).await?;

    let (notify_tx, _) = broadcast::channel::<Notification>(100);
    if let Some(telegram) = &config.telegram {
        let telegram_svc = TelegramService::new(telegram);
        tokio::spawn(telegram_svc.start(notify_tx.subscribe()));
    }

    let orders = Arc::new(OrderService::new(
        gate,
        PositionStore::new(),
        PositionSizer::new(config.sizing()),
        config.order_profile(),
        notify_tx.clone(),
    ));

    let source: Arc<dyn SignalSource> = Arc::new(
        SignalClient::from_config(&config.signal).context("Failed to build signal client")?,
    );
    let filter: SharedFilter = Arc::new(Mutex::new(build_filter(&config.strategy)));

    let mut supervisor = Supervisor::new();

    let orders_for_poller = orders.clone();
    let signal_config = config.signal.clone();
    supervisor.register_actor(
        ActorType::SignalPoller,
        Box::new(move || {
            Box::new(SignalService::new(
                source.clone(),
                filter.clone(),
                orders_for_poller.clone(),
                signal_config.clone(),
            ))
        }),
    );

    let orders_for_monitor = orders.clone();
    let monitor_config = config.monitor.clone();
    supervisor.register_actor(
        ActorType::PositionMonitor,
        Box::new(move || {
            Box::new(PositionMonitor::new(
                orders_for_monitor.clone(),
                monitor_config.clone(),
            ))
        }),
    );

    info!("Signal bridge running, press Ctrl-C to stop");
    supervisor
        .start(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Unable to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!("Signal bridge stopped");
    Ok(())
}
