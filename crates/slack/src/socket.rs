use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use marvin_core::config::KeepaliveConfig;
use serde::Serialize;
use thiserror::Error;
use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use tracing::{debug, info, warn};

use crate::{
    dispatch::Dispatcher,
    gateway::{GatewayError, SlackGateway},
    pipeline::EventPipeline,
    transport::{SocketConnector, SocketFrame, SocketStream, TransportError},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Handshaking,
    Connected,
    Closing,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("rtm handshake failed: {0}")]
    Handshake(#[from] GatewayError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Identity of the currently open connection, kept for status reporting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConnectionSummary {
    pub generation: u64,
    pub team_id: String,
    pub bot_id: String,
    pub bot_name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeepaliveSettings {
    pub pong_timeout: Duration,
    pub connect_timeout: Duration,
}

impl From<&KeepaliveConfig> for KeepaliveSettings {
    fn from(config: &KeepaliveConfig) -> Self {
        Self {
            pong_timeout: Duration::from_secs(config.pong_timeout_secs),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
        }
    }
}

impl Default for KeepaliveSettings {
    fn default() -> Self {
        Self { pong_timeout: Duration::from_secs(30), connect_timeout: Duration::from_secs(10) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReadLoopExit {
    Shutdown,
    PeerClosed,
    PongTimeout,
    Failed(TransportError),
}

struct LiveSocket {
    generation: u64,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<ReadLoopExit>,
}

#[derive(Default)]
struct ConnectionSlot {
    state: ConnectionState,
    live: Option<LiveSocket>,
    connection: Option<ConnectionSummary>,
    next_generation: u64,
}

impl ConnectionSlot {
    /// Clears the slot only when it still holds `generation`; a read loop
    /// must never tear down a socket that replaced it.
    fn release(&mut self, generation: u64) -> bool {
        if self.live.as_ref().map(|live| live.generation) != Some(generation) {
            return false;
        }
        self.live = None;
        self.connection = None;
        self.state = ConnectionState::Disconnected;
        true
    }
}

/// Owns the single RTM socket: handshake, open, read loop, keepalive and
/// teardown. `establish` is the only way a socket gets installed.
pub struct ConnectionManager {
    gateway: Arc<dyn SlackGateway>,
    connector: Arc<dyn SocketConnector>,
    dispatcher: Arc<Dispatcher>,
    keepalive: KeepaliveSettings,
    slot: Arc<Mutex<ConnectionSlot>>,
    establish_guard: tokio::sync::Mutex<()>,
}

impl ConnectionManager {
    pub fn new(
        gateway: Arc<dyn SlackGateway>,
        connector: Arc<dyn SocketConnector>,
        dispatcher: Arc<Dispatcher>,
        keepalive: KeepaliveSettings,
    ) -> Self {
        Self {
            gateway,
            connector,
            dispatcher,
            keepalive,
            slot: Arc::new(Mutex::new(ConnectionSlot::default())),
            establish_guard: tokio::sync::Mutex::new(()),
        }
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.slot).state
    }

    pub fn connection(&self) -> Option<ConnectionSummary> {
        lock(&self.slot).connection.clone()
    }

    pub fn has_live_socket(&self) -> bool {
        lock(&self.slot).live.is_some()
    }

    /// Closes any live socket, performs a fresh handshake and installs the new
    /// socket. Concurrent callers are serialised. Failures leave the manager
    /// disconnected; nothing is retried.
    pub async fn establish(&self) -> Result<ConnectionSummary, ConnectionError> {
        let _guard = self.establish_guard.lock().await;

        self.close_live().await;
        self.set_state(ConnectionState::Handshaking);

        let handshake = match self.gateway.connect().await {
            Ok(handshake) => handshake,
            Err(error) => {
                warn!(
                    event_name = "system.connection.handshake_failed",
                    error = %error,
                    "rtm handshake failed; staying disconnected"
                );
                self.set_state(ConnectionState::Disconnected);
                return Err(error.into());
            }
        };

        let mut stream = match self.open_socket(&handshake.url).await {
            Ok(stream) => stream,
            Err(error) => {
                warn!(
                    event_name = "system.connection.open_failed",
                    error = %error,
                    "failed to open rtm socket; staying disconnected"
                );
                self.set_state(ConnectionState::Disconnected);
                return Err(error.into());
            }
        };

        // Starts the ping/pong cycle; every pong is answered with the next ping.
        if let Err(error) = stream.send_ping().await {
            warn!(
                event_name = "system.connection.initial_ping_failed",
                error = %error,
                "rtm socket rejected initial ping"
            );
            let _ = stream.close().await;
            self.set_state(ConnectionState::Disconnected);
            return Err(error.into());
        }

        let pipeline = Arc::new(EventPipeline::new(
            self.gateway.clone(),
            self.dispatcher.clone(),
            handshake.bot.clone(),
        ));
        let (shutdown, shutdown_rx) = oneshot::channel();

        let summary = {
            let mut slot = lock(&self.slot);
            slot.next_generation += 1;
            let generation = slot.next_generation;
            let summary = ConnectionSummary {
                generation,
                team_id: handshake.team.id.clone(),
                bot_id: handshake.bot.id.clone(),
                bot_name: handshake.bot.name.clone(),
            };

            // Spawned under the slot lock so a loop that exits immediately
            // cannot race ahead of its own registration.
            let task = tokio::spawn(read_loop(
                stream,
                pipeline,
                shutdown_rx,
                self.slot.clone(),
                generation,
                self.keepalive,
            ));
            slot.live = Some(LiveSocket { generation, shutdown, task });
            slot.connection = Some(summary.clone());
            slot.state = ConnectionState::Connected;
            summary
        };

        info!(
            event_name = "system.connection.established",
            generation = summary.generation,
            team_id = %summary.team_id,
            bot_id = %summary.bot_id,
            "rtm connection established"
        );
        Ok(summary)
    }

    /// Entry point for hosts (the admin route): a full `establish` cycle.
    pub async fn trigger_reconnect(&self) -> Result<ConnectionSummary, ConnectionError> {
        info!(event_name = "system.connection.reconnect_requested", "manual reconnect requested");
        self.establish().await
    }

    /// Closes the live socket, if any, and waits for its read loop to finish.
    pub async fn shutdown(&self) {
        let _guard = self.establish_guard.lock().await;
        self.close_live().await;
    }

    /// Bounded so a stalled upgrade cannot hold the establish guard forever.
    async fn open_socket(&self, url: &str) -> Result<Box<dyn SocketStream>, TransportError> {
        let timeout = self.keepalive.connect_timeout;
        match tokio::time::timeout(timeout, self.connector.open(url)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Connect(format!(
                "socket open timed out after {}s",
                timeout.as_secs()
            ))),
        }
    }

    async fn close_live(&self) {
        let live = {
            let mut slot = lock(&self.slot);
            let live = slot.live.take();
            if live.is_some() {
                slot.state = ConnectionState::Closing;
            }
            live
        };

        let Some(live) = live else {
            return;
        };

        let _ = live.shutdown.send(());
        match live.task.await {
            Ok(exit) => debug!(
                event_name = "system.connection.closed",
                generation = live.generation,
                exit = ?exit,
                "previous rtm socket closed"
            ),
            Err(error) => warn!(
                event_name = "system.connection.read_loop_join_failed",
                generation = live.generation,
                error = %error,
                "read loop ended abnormally"
            ),
        }

        let mut slot = lock(&self.slot);
        slot.connection = None;
        slot.state = ConnectionState::Disconnected;
    }

    fn set_state(&self, state: ConnectionState) {
        lock(&self.slot).state = state;
    }
}

fn lock(slot: &Mutex<ConnectionSlot>) -> MutexGuard<'_, ConnectionSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

enum LoopEvent {
    Shutdown,
    PongTimeout,
    Frame(Result<SocketFrame, TransportError>),
}

async fn read_loop(
    mut stream: Box<dyn SocketStream>,
    pipeline: Arc<EventPipeline>,
    mut shutdown: oneshot::Receiver<()>,
    slot: Arc<Mutex<ConnectionSlot>>,
    generation: u64,
    keepalive: KeepaliveSettings,
) -> ReadLoopExit {
    let mut pong_deadline = Instant::now() + keepalive.pong_timeout;

    let exit = loop {
        let event = tokio::select! {
            _ = &mut shutdown => LoopEvent::Shutdown,
            _ = sleep_until(pong_deadline) => LoopEvent::PongTimeout,
            frame = stream.next_frame() => LoopEvent::Frame(frame),
        };

        match event {
            LoopEvent::Shutdown => break ReadLoopExit::Shutdown,
            LoopEvent::PongTimeout => {
                warn!(
                    event_name = "system.connection.pong_timeout",
                    generation,
                    timeout_secs = keepalive.pong_timeout.as_secs(),
                    "no pong received before deadline"
                );
                break ReadLoopExit::PongTimeout;
            }
            LoopEvent::Frame(Ok(SocketFrame::Text(text))) => {
                let pipeline = pipeline.clone();
                tokio::spawn(async move {
                    pipeline.handle_frame(&text).await;
                });
            }
            LoopEvent::Frame(Ok(SocketFrame::Pong)) => {
                pong_deadline = Instant::now() + keepalive.pong_timeout;
                if let Err(error) = stream.send_ping().await {
                    break ReadLoopExit::Failed(error);
                }
            }
            LoopEvent::Frame(Ok(SocketFrame::Closed)) => break ReadLoopExit::PeerClosed,
            LoopEvent::Frame(Err(error)) => break ReadLoopExit::Failed(error),
        }
    };

    if let Err(error) = stream.close().await {
        debug!(
            event_name = "system.connection.close_failed",
            generation,
            error = %error,
            "socket close reported an error"
        );
    }

    if exit != ReadLoopExit::Shutdown && lock(&slot).release(generation) {
        info!(
            event_name = "system.connection.lost",
            generation,
            exit = ?exit,
            "rtm socket closed; waiting for manual reconnect"
        );
    }

    exit
}
