use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use common::config::{PaperConfig, PaperSymbol};
use common::models::{
    AccountInfo, OpenPosition, OrderRequest, OrderResult, RETCODE_DONE, Side, SymbolInfo, Tick,
    VolumeConstraints,
};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{errors::TerminalError, traits::ExecutionTerminal};

pub const RETCODE_INVALID_VOLUME: u32 = 10014;
pub const RETCODE_POSITION_CLOSED: u32 = 10036;

struct PaperPosition {
    symbol: String,
    side: Side,
    volume: f64,
    price_open: f64,
    magic: u64,
}

struct PaperState {
    connected: bool,
    login: u64,
    server: String,
    balance: f64,
    symbols: HashMap<String, PaperSymbol>,
    selected: HashSet<String>,
    positions: BTreeMap<u64, PaperPosition>,
    next_ticket: u64,
    forced_retcode: Option<u32>,
}

impl PaperState {
    fn ensure_connected(&self) -> Result<(), TerminalError> {
        if self.connected {
            Ok(())
        } else {
            Err(TerminalError::NotConnected)
        }
    }

    fn symbol(&self, symbol: &str) -> Result<&PaperSymbol, TerminalError> {
        self.symbols
            .get(symbol)
            .ok_or_else(|| TerminalError::SymbolNotFound(symbol.to_string()))
    }

    fn tick(book: &PaperSymbol) -> Tick {
        Tick {
            bid: book.price - book.spread / 2.0,
            ask: book.price + book.spread / 2.0,
            time: None,
        }
    }

    /// Mark-to-market profit, valued at the price the position would close at.
    fn profit(book: &PaperSymbol, position: &PaperPosition) -> f64 {
        let tick = Self::tick(book);
        let diff = match position.side {
            Side::Buy => tick.bid - position.price_open,
            Side::Sell => position.price_open - tick.ask,
        };
        diff * position.volume * book.contract_size
    }

    fn rejected(retcode: u32, comment: &str) -> OrderResult {
        OrderResult {
            retcode,
            order: 0,
            deal: 0,
            volume: 0.0,
            price: 0.0,
            comment: comment.to_string(),
        }
    }
}

/// Simulated terminal for dry runs. Fills every valid market order at the current quote and
/// never touches the network.
pub struct PaperTerminal {
    state: Mutex<PaperState>,
}

impl PaperTerminal {
    pub fn from_config(config: &PaperConfig) -> Self {
        Self {
            state: Mutex::new(PaperState {
                connected: false,
                login: config.login,
                server: config.server.clone(),
                balance: config.balance,
                symbols: config.symbols.clone(),
                selected: HashSet::new(),
                positions: BTreeMap::new(),
                next_ticket: 1,
                forced_retcode: None,
            }),
        }
    }

    /// Moves the mid price of `symbol`, which re-values its open positions.
    pub async fn set_price(&self, symbol: &str, price: f64) -> Result<(), TerminalError> {
        let mut state = self.state.lock().await;
        let book = state
            .symbols
            .get_mut(symbol)
            .ok_or_else(|| TerminalError::SymbolNotFound(symbol.to_string()))?;
        book.price = price;
        Ok(())
    }

    /// The next `order_send` answers with `retcode` instead of executing.
    pub async fn reject_next_order(&self, retcode: u32) {
        self.state.lock().await.forced_retcode = Some(retcode);
    }

    pub async fn balance(&self) -> f64 {
        self.state.lock().await.balance
    }

    pub async fn open_tickets(&self) -> Vec<u64> {
        self.state.lock().await.positions.keys().copied().collect()
    }
}

impl Default for PaperTerminal {
    fn default() -> Self {
        Self::from_config(&PaperConfig::default())
    }
}

#[async_trait]
impl ExecutionTerminal for PaperTerminal {
    async fn initialize(&self) -> Result<(), TerminalError> {
        self.state.lock().await.connected = true;
        Ok(())
    }

    async fn shutdown(&self) {
        self.state.lock().await.connected = false;
    }

    async fn account_info(&self) -> Result<AccountInfo, TerminalError> {
        let state = self.state.lock().await;
        state.ensure_connected()?;

        let floating: f64 = state
            .positions
            .values()
            .filter_map(|p| state.symbols.get(&p.symbol).map(|s| PaperState::profit(s, p)))
            .sum();

        Ok(AccountInfo {
            login: state.login,
            server: state.server.clone(),
            balance: state.balance,
            equity: Some(state.balance + floating),
            currency: Some("USD".to_string()),
        })
    }

    async fn symbol_info(&self, symbol: &str) -> Result<SymbolInfo, TerminalError> {
        let state = self.state.lock().await;
        state.ensure_connected()?;
        let book = state.symbol(symbol)?;

        Ok(SymbolInfo {
            name: symbol.to_string(),
            volume: VolumeConstraints {
                volume_min: book.volume_min,
                volume_max: book.volume_max,
                volume_step: book.volume_step,
            },
            digits: None,
            visible: state.selected.contains(symbol),
        })
    }

    async fn symbol_select(&self, symbol: &str) -> Result<(), TerminalError> {
        let mut state = self.state.lock().await;
        state.ensure_connected()?;
        state.symbol(symbol)?;
        state.selected.insert(symbol.to_string());
        Ok(())
    }

    async fn symbol_tick(&self, symbol: &str) -> Result<Tick, TerminalError> {
        let state = self.state.lock().await;
        state.ensure_connected()?;
        Ok(PaperState::tick(state.symbol(symbol)?))
    }

    async fn order_send(&self, request: &OrderRequest) -> Result<OrderResult, TerminalError> {
        let mut state = self.state.lock().await;
        state.ensure_connected()?;

        if let Some(retcode) = state.forced_retcode.take() {
            debug!("Paper terminal forcing retcode {}", retcode);
            return Ok(PaperState::rejected(retcode, "Forced rejection"));
        }

        let book = *state.symbol(&request.symbol)?;
        let tick = PaperState::tick(&book);
        let fill_price = match request.side {
            Side::Buy => tick.ask,
            Side::Sell => tick.bid,
        };

        if let Some(ticket) = request.position {
            let matches = state.positions.get(&ticket).is_some_and(|p| {
                p.side == request.side.inverse() && (p.volume - request.volume).abs() < 1e-9
            });
            if !matches {
                return Ok(PaperState::rejected(
                    RETCODE_POSITION_CLOSED,
                    "Position not found",
                ));
            }

            if let Some(position) = state.positions.remove(&ticket) {
                let profit = PaperState::profit(&book, &position);
                state.balance += profit;
                info!(
                    "Paper close of {} {} at {:.5}, profit {:.2}",
                    ticket, position.symbol, fill_price, profit
                );
            }

            let deal = state.next_ticket;
            state.next_ticket += 1;
            return Ok(OrderResult {
                retcode: RETCODE_DONE,
                order: deal,
                deal,
                volume: request.volume,
                price: fill_price,
                comment: "Request executed".to_string(),
            });
        }

        let valid_volume = request.volume >= book.volume_min - 1e-9
            && request.volume <= book.volume_max + 1e-9;
        if !valid_volume {
            return Ok(PaperState::rejected(RETCODE_INVALID_VOLUME, "Invalid volume"));
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.positions.insert(
            ticket,
            PaperPosition {
                symbol: request.symbol.clone(),
                side: request.side,
                volume: request.volume,
                price_open: fill_price,
                magic: request.magic,
            },
        );
        info!(
            "Paper fill {} {} {} at {:.5}, ticket {}",
            request.side, request.volume, request.symbol, fill_price, ticket
        );

        Ok(OrderResult {
            retcode: RETCODE_DONE,
            order: ticket,
            deal: ticket,
            volume: request.volume,
            price: fill_price,
            comment: "Request executed".to_string(),
        })
    }

    async fn positions(&self) -> Result<Vec<OpenPosition>, TerminalError> {
        let state = self.state.lock().await;
        state.ensure_connected()?;

        Ok(state
            .positions
            .iter()
            .filter_map(|(&ticket, p)| {
                let book = state.symbols.get(&p.symbol)?;
                let tick = PaperState::tick(book);
                Some(OpenPosition {
                    ticket,
                    symbol: p.symbol.clone(),
                    side: p.side,
                    volume: p.volume,
                    price_open: p.price_open,
                    price_current: match p.side {
                        Side::Buy => tick.bid,
                        Side::Sell => tick.ask,
                    },
                    profit: PaperState::profit(book, p),
                    magic: p.magic,
                })
            })
            .collect())
    }
}
