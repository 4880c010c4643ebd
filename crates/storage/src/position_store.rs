use std::collections::HashMap;
use std::sync::Arc;

use common::models::Position;
use tokio::sync::Mutex;
use tracing::debug;

/// Positions opened by this process, keyed by broker ticket.
///
/// Cloning shares the same map. Contents live in memory only and are gone after a restart.
#[derive(Clone, Default)]
pub struct PositionStore {
    positions: Arc<Mutex<HashMap<u64, Position>>>,
}

impl PositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks `position`, returning the entry it replaced if the ticket was already known.
    pub async fn insert(&self, position: Position) -> Option<Position> {
        let mut positions = self.positions.lock().await;
        debug!("Tracking position {}", position.ticket);
        positions.insert(position.ticket, position)
    }

    pub async fn remove(&self, ticket: u64) -> Option<Position> {
        let mut positions = self.positions.lock().await;
        positions.remove(&ticket)
    }

    pub async fn get(&self, ticket: u64) -> Option<Position> {
        let positions = self.positions.lock().await;
        positions.get(&ticket).cloned()
    }

    /// Copy of the tracked positions ordered by ticket.
    pub async fn snapshot(&self) -> Vec<Position> {
        let positions = self.positions.lock().await;
        let mut all: Vec<Position> = positions.values().cloned().collect();
        all.sort_by_key(|p| p.ticket);
        all
    }

    pub async fn len(&self) -> usize {
        self.positions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.positions.lock().await.is_empty()
    }
}
