use std::time::Duration;

use async_trait::async_trait;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorType {
    SignalPoller,
    PositionMonitor,
}

/// Messages sent from Actors to the Supervisor
pub enum ControlMessage {
    Heartbeat(Uuid),
    Error(Uuid, String),
}

impl std::fmt::Debug for ControlMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Heartbeat(id) => write!(f, "Heartbeat({})", id),
            Self::Error(id, err) => write!(f, "Error({}, {})", id, err),
        }
    }
}

/// Owner side of the process-wide stop flag.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for ShutdownTrigger {
    fn default() -> Self {
        Self::new()
    }
}

/// Listener side of the stop flag. A dropped trigger counts as a stop request.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    pub async fn wait(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Sleeps for `duration` unless a stop is requested first. Returns `true` on stop.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        let stopped = tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = self.wait() => true,
        };
        stopped || self.is_triggered()
    }
}

/// Heartbeat task of one actor instance. Stops when dropped, so an aborted or crashed actor
/// goes quiet.
#[derive(Debug)]
pub struct Heartbeat(JoinHandle<()>);

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// The trait that all restartable services must implement
#[async_trait]
pub trait Actor: Send + Sync {
    fn name(&self) -> ActorType;

    fn id(&self) -> Uuid;

    /// The main loop of the actor. Returns once `shutdown` fires.
    /// It must periodically send `ControlMessage::Heartbeat` to the supervisor.
    async fn run(
        &mut self,
        supervisor_tx: mpsc::Sender<ControlMessage>,
        shutdown: Shutdown,
    ) -> anyhow::Result<()>;

    fn spawn_heartbeat(&self, supervisor_tx: mpsc::Sender<ControlMessage>) -> Heartbeat {
        let id = self.id();
        Heartbeat(tokio::spawn(async move {
            loop {
                if supervisor_tx
                    .send(ControlMessage::Heartbeat(id))
                    .await
                    .is_err()
                {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }))
    }
}
