use std::{collections::HashMap, future::Future, time::Duration};
use tracing::{error, info, warn};

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Instant},
};
use uuid::Uuid;

use crate::actors::{Actor, ActorType, ControlMessage, ShutdownTrigger};

pub type ActorFactory = Box<dyn Fn() -> Box<dyn Actor> + Send + Sync>;

pub struct Supervisor {
    actor_factories: HashMap<ActorType, ActorFactory>,
    ids: HashMap<Uuid, ActorType>,
    pulses: HashMap<ActorType, Instant>,
    handles: HashMap<ActorType, JoinHandle<()>>,
    shutdown: ShutdownTrigger,
    check_interval: Duration,
    heartbeat_timeout: Duration,
    grace_period: Duration,
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            actor_factories: HashMap::new(),
            ids: HashMap::new(),
            pulses: HashMap::new(),
            handles: HashMap::new(),
            shutdown: ShutdownTrigger::new(),
            check_interval: Duration::from_secs(1),
            heartbeat_timeout: Duration::from_secs(3),
            grace_period: Duration::from_secs(60),
        }
    }

    pub fn with_timeouts(mut self, check_interval: Duration, heartbeat_timeout: Duration) -> Self {
        self.check_interval = check_interval;
        self.heartbeat_timeout = heartbeat_timeout;
        self
    }

    /// How long to wait for an actor to finish its pass once a stop is requested.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn register_actor(&mut self, actor_type: ActorType, factory: ActorFactory) {
        self.actor_factories.insert(actor_type, factory);
    }

    /// Runs and restarts the registered actors until `stop` resolves, then stops them.
    pub async fn start<F>(&mut self, stop: F)
    where
        F: Future<Output = ()>,
    {
        let mut check_interval = time::interval(self.check_interval);

        let (supervisor_tx, mut supervisor_rx) = mpsc::channel::<ControlMessage>(512);

        let actors: Vec<ActorType> = self.actor_factories.keys().copied().collect();
        actors.into_iter().for_each(|actor| {
            self.spawn_actor(actor, supervisor_tx.clone());
        });

        tokio::pin!(stop);

        loop {
            tokio::select! {
                _ = &mut stop => {
                    info!("Stop requested, waiting for actors to finish their current pass");
                    break;
                }

                Some(msg) = supervisor_rx.recv() => {
                    match msg {
                        ControlMessage::Heartbeat(id) => {
                            if let Some(&actor_type) = self.ids.get(&id) {
                                self.pulses.insert(actor_type, Instant::now());
                            }
                        }
                        ControlMessage::Error(id, error_msg) => {
                            let actor_type = self.ids.get(&id);
                            error!("Actor {:?} reported error: {}", actor_type, error_msg);
                        }
                    }
                }

                _ = check_interval.tick() => {
                    let dead_timeout = Instant::now() - self.heartbeat_timeout;

                    let dead_actors: Vec<ActorType> = self
                        .pulses
                        .iter()
                        .filter(|&(actor_type, &last)| {
                            let finished = self
                                .handles
                                .get(actor_type)
                                .is_none_or(|handle| handle.is_finished());
                            last < dead_timeout || finished
                        })
                        .map(|(&actor_type, _)| actor_type)
                        .collect();

                    dead_actors.into_iter().for_each(|actor_type| {
                        warn!("{:?} is unresponsive! Restarting.", actor_type);
                        if let Some(handle) = self.handles.remove(&actor_type) {
                            handle.abort();
                        }
                        self.spawn_actor(actor_type, supervisor_tx.clone());
                    });
                }
            }
        }

        self.stop_actors().await;
    }

    async fn stop_actors(&mut self) {
        self.shutdown.trigger();

        for (actor_type, mut handle) in self.handles.drain() {
            match time::timeout(self.grace_period, &mut handle).await {
                Ok(_) => info!("{:?} stopped", actor_type),
                Err(_) => {
                    warn!("{:?} did not stop in time, aborting", actor_type);
                    handle.abort();
                }
            }
        }

        self.pulses.clear();
        self.ids.clear();
    }

    fn spawn_actor(&mut self, actor_type: ActorType, tx: mpsc::Sender<ControlMessage>) {
        let Some(factory) = self.actor_factories.get(&actor_type) else {
            return;
        };
        let mut new_actor = factory();
        let id = new_actor.id();
        let shutdown = self.shutdown.subscribe();

        self.ids.retain(|_, existing| *existing != actor_type);
        self.ids.insert(id, actor_type);

        let new_actor_handle = tokio::spawn(async move {
            if let Err(e) = new_actor.run(tx, shutdown).await {
                error!("Actor {:?} crashed: {}", &actor_type, e);
            }
        });
        self.handles.insert(actor_type, new_actor_handle);
        self.pulses.insert(actor_type, Instant::now());
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}
