//! The relay pool: one websocket per relay, reconnect with exponential
//! backoff, centrally stored subscriptions re-registered on every
//! (re)connection, and a capped dedup set over inbound event ids.

use crate::error::{RelayError, RelayResult};
use crate::event::{ClientMessage, RelayEvent, RelayMessage, Subscription};
use crate::geohash;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

#[derive(Debug, Clone)]
pub struct RelayEndpoint {
    pub url: String,
    /// Advertised location scope; scoped publishes must intersect it.
    pub geohash: Option<String>,
}

impl RelayEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            geohash: None,
        }
    }

    pub fn with_geohash(url: impl Into<String>, geohash: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            geohash: Some(geohash.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub relays: Vec<RelayEndpoint>,
    pub max_reconnect_delay: Duration,
    pub dedup_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            relays: Vec::new(),
            max_reconnect_delay: Duration::from_secs(30),
            dedup_capacity: 10_000,
        }
    }
}

/// An event dispatched to the global stream.
#[derive(Debug, Clone)]
pub struct RelayNotification {
    pub relay: String,
    pub sub_id: String,
    pub event: RelayEvent,
}

/// `min(max, 2^retries)` seconds.
pub fn reconnect_delay(retries: u32, max: Duration) -> Duration {
    Duration::from_secs(1u64 << retries.min(31)).min(max)
}

/// Insertion-ordered seen-set over event ids with a hard cap.
#[derive(Debug)]
pub struct EventDedup {
    seen: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl EventDedup {
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Returns true when `id` is fresh; records it, evicting the oldest id
    /// once the cap is reached.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        if self.seen.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(id.to_owned());
        self.order.push_back(id.to_owned());
        true
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

enum PoolCommand {
    Publish {
        event: RelayEvent,
        targets: Option<Vec<String>>,
    },
    Subscribe(Subscription),
    Unsubscribe {
        sub_id: String,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
    SubscribeEvents {
        sender: mpsc::UnboundedSender<RelayNotification>,
    },
    SubscribeStates {
        sender: mpsc::UnboundedSender<(String, RelayState)>,
    },
    RelayConnecting {
        url: String,
    },
    RelayUp {
        url: String,
        sender: mpsc::UnboundedSender<String>,
    },
    RelayDown {
        url: String,
    },
    Inbound {
        url: String,
        text: String,
    },
}

/// Handle to a running relay pool.
pub struct RelayPool {
    commands: mpsc::UnboundedSender<PoolCommand>,
    states: Arc<RwLock<HashMap<String, RelayState>>>,
    shutdown: watch::Sender<bool>,
}

impl RelayPool {
    /// Spawns the pool loop and one connection task per configured relay.
    /// Returns the handle and the global inbound event stream.
    pub fn start(config: RelayConfig) -> (Self, mpsc::UnboundedReceiver<RelayNotification>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let states: Arc<RwLock<HashMap<String, RelayState>>> = Arc::new(RwLock::new(
            config
                .relays
                .iter()
                .map(|endpoint| (endpoint.url.clone(), RelayState::Disconnected))
                .collect(),
        ));

        for endpoint in &config.relays {
            tokio::spawn(relay_task(
                endpoint.url.clone(),
                command_tx.clone(),
                config.max_reconnect_delay,
                shutdown_rx.clone(),
            ));
        }

        let pool_loop = PoolLoop {
            endpoints: config
                .relays
                .iter()
                .map(|endpoint| (endpoint.url.clone(), endpoint.geohash.clone()))
                .collect(),
            senders: HashMap::new(),
            subscriptions: HashMap::new(),
            dedup: EventDedup::new(config.dedup_capacity),
            states: states.clone(),
            notifications: vec![notify_tx],
            state_taps: Vec::new(),
        };
        tokio::spawn(pool_loop.run(command_rx));

        (
            Self {
                commands: command_tx,
                states,
                shutdown: shutdown_tx,
            },
            notify_rx,
        )
    }

    /// Fan-out publish; `targets = None` means every connected relay.
    pub fn publish(&self, event: RelayEvent, targets: Option<Vec<String>>) -> RelayResult<()> {
        self.commands
            .send(PoolCommand::Publish { event, targets })
            .map_err(|_| RelayError::Disposed)
    }

    pub fn subscribe(&self, subscription: Subscription) -> RelayResult<()> {
        self.commands
            .send(PoolCommand::Subscribe(subscription))
            .map_err(|_| RelayError::Disposed)
    }

    pub fn unsubscribe(&self, sub_id: &str) -> RelayResult<()> {
        self.commands
            .send(PoolCommand::Unsubscribe {
                sub_id: sub_id.to_owned(),
            })
            .map_err(|_| RelayError::Disposed)
    }

    /// Per-relay connection states.
    pub fn states(&self) -> HashMap<String, RelayState> {
        self.states.read().clone()
    }

    /// An additional, independent stream of dispatched events. The channel
    /// closes when the pool shuts down.
    pub fn subscribe_events(&self) -> mpsc::UnboundedReceiver<RelayNotification> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let _ = self.commands.send(PoolCommand::SubscribeEvents { sender });
        receiver
    }

    /// A stream of per-relay connection state transitions.
    pub fn subscribe_states(&self) -> mpsc::UnboundedReceiver<(String, RelayState)> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let _ = self.commands.send(PoolCommand::SubscribeStates { sender });
        receiver
    }

    /// Closes every socket and stops the loop. Idempotent.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let (reply, rx) = oneshot::channel();
        if self.commands.send(PoolCommand::Shutdown { reply }).is_ok() {
            let _ = rx.await;
        }
    }
}

struct PoolLoop {
    endpoints: HashMap<String, Option<String>>,
    senders: HashMap<String, mpsc::UnboundedSender<String>>,
    subscriptions: HashMap<String, Subscription>,
    dedup: EventDedup,
    states: Arc<RwLock<HashMap<String, RelayState>>>,
    notifications: Vec<mpsc::UnboundedSender<RelayNotification>>,
    state_taps: Vec<mpsc::UnboundedSender<(String, RelayState)>>,
}

impl PoolLoop {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<PoolCommand>) {
        while let Some(command) = commands.recv().await {
            match command {
                PoolCommand::Publish { event, targets } => self.publish(event, targets),
                PoolCommand::Subscribe(subscription) => {
                    for (url, sender) in &self.senders {
                        if subscription.targets(url) {
                            let _ = sender.send(
                                ClientMessage::Req {
                                    sub_id: subscription.id.clone(),
                                    filter: subscription.filter.clone(),
                                }
                                .to_json(),
                            );
                        }
                    }
                    self.subscriptions
                        .insert(subscription.id.clone(), subscription);
                }
                PoolCommand::Unsubscribe { sub_id } => {
                    if let Some(subscription) = self.subscriptions.remove(&sub_id) {
                        for (url, sender) in &self.senders {
                            if subscription.targets(url) {
                                let _ = sender.send(
                                    ClientMessage::Close {
                                        sub_id: sub_id.clone(),
                                    }
                                    .to_json(),
                                );
                            }
                        }
                    }
                }
                PoolCommand::Shutdown { reply } => {
                    let _ = reply.send(());
                    return;
                }
                PoolCommand::SubscribeEvents { sender } => {
                    self.notifications.push(sender);
                }
                PoolCommand::SubscribeStates { sender } => {
                    self.state_taps.push(sender);
                }
                PoolCommand::RelayConnecting { url } => {
                    self.set_state(&url, RelayState::Connecting);
                }
                PoolCommand::RelayUp { url, sender } => {
                    debug!(%url, "relay connected");
                    self.set_state(&url, RelayState::Connected);
                    // Re-register every subscription that targets this relay.
                    for subscription in self.subscriptions.values() {
                        if subscription.targets(&url) {
                            let _ = sender.send(
                                ClientMessage::Req {
                                    sub_id: subscription.id.clone(),
                                    filter: subscription.filter.clone(),
                                }
                                .to_json(),
                            );
                        }
                    }
                    self.senders.insert(url, sender);
                }
                PoolCommand::RelayDown { url } => {
                    self.senders.remove(&url);
                    self.set_state(&url, RelayState::Disconnected);
                }
                PoolCommand::Inbound { url, text } => self.inbound(&url, &text),
            }
        }
    }

    fn set_state(&mut self, url: &str, state: RelayState) {
        self.states.write().insert(url.to_owned(), state);
        self.state_taps
            .retain(|tap| tap.send((url.to_owned(), state)).is_ok());
    }

    fn publish(&mut self, event: RelayEvent, targets: Option<Vec<String>>) {
        let scopes = event.geohash_scopes();
        for (url, sender) in &self.senders {
            if let Some(targets) = &targets {
                if !targets.contains(url) {
                    continue;
                }
            }
            if let Some(Some(relay_geohash)) = self.endpoints.get(url) {
                if !geohash::scopes_intersect(relay_geohash, &scopes) {
                    continue;
                }
            }
            let _ = sender.send(ClientMessage::Event(event.clone()).to_json());
        }
    }

    fn inbound(&mut self, url: &str, text: &str) {
        let message = match RelayMessage::parse(text) {
            Ok(message) => message,
            Err(error) => {
                debug!(%url, %error, "dropping malformed relay frame");
                return;
            }
        };
        match message {
            RelayMessage::Event { sub_id, event } => {
                if !self.dedup.insert(&event.id) {
                    return;
                }
                if let Err(error) = event.verify() {
                    debug!(%url, %error, "dropping event with bad signature");
                    return;
                }
                let notification = RelayNotification {
                    relay: url.to_owned(),
                    sub_id,
                    event: *event,
                };
                self.notifications
                    .retain(|tap| tap.send(notification.clone()).is_ok());
            }
            RelayMessage::Eose { sub_id } => {
                debug!(%url, %sub_id, "end of stored events");
            }
            RelayMessage::Ok {
                event_id,
                accepted,
                message,
            } => {
                if !accepted {
                    warn!(%url, %event_id, %message, "relay rejected event");
                }
            }
            RelayMessage::Notice { message } => {
                debug!(%url, %message, "relay notice");
            }
        }
    }
}

/// One connection's lifecycle: connect, pump, reconnect with backoff.
async fn relay_task(
    url: String,
    pool: mpsc::UnboundedSender<PoolCommand>,
    max_delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut retries: u32 = 0;
    loop {
        if *shutdown.borrow() {
            return;
        }
        let _ = pool.send(PoolCommand::RelayConnecting { url: url.clone() });

        match connect_async(url.as_str()).await {
            Ok((socket, _response)) => {
                retries = 0;
                let (mut sink, mut stream) = socket.split();
                let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
                let _ = pool.send(PoolCommand::RelayUp {
                    url: url.clone(),
                    sender: out_tx,
                });

                loop {
                    tokio::select! {
                        outgoing = out_rx.recv() => match outgoing {
                            Some(text) => {
                                if sink.send(Message::Text(text)).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        },
                        incoming = stream.next() => match incoming {
                            Some(Ok(Message::Text(text))) => {
                                let _ = pool.send(PoolCommand::Inbound {
                                    url: url.clone(),
                                    text,
                                });
                            }
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Ok(_)) => {}
                            Some(Err(error)) => {
                                debug!(%url, %error, "relay socket error");
                                break;
                            }
                        },
                        _ = shutdown.changed() => {
                            let _ = sink.send(Message::Close(None)).await;
                            let _ = pool.send(PoolCommand::RelayDown { url: url.clone() });
                            return;
                        }
                    }
                }
                let _ = pool.send(PoolCommand::RelayDown { url: url.clone() });
            }
            Err(error) => {
                debug!(%url, %error, "relay connect failed");
                let _ = pool.send(PoolCommand::RelayDown { url: url.clone() });
            }
        }

        let delay = reconnect_delay(retries, max_delay);
        retries = retries.saturating_add(1);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => return,
        }
    }
}
