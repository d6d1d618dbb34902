//! In-memory fakes shared by the unit tests of this crate.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    addressing::MessageContext,
    dispatch::Capability,
    events::MessageEvent,
    gateway::{
        BotIdentity, ConnectionHandshake, ConversationInfo, GatewayError, SlackGateway,
        TeamIdentity, UserInfo,
    },
    outbound::{OutgoingMessage, ReplySink},
    transport::{SocketConnector, SocketFrame, SocketStream, TransportError},
};

pub(crate) fn bot_identity() -> BotIdentity {
    BotIdentity { id: "B1".to_owned(), name: "marvin".to_owned() }
}

pub(crate) fn message_event(text: &str) -> MessageEvent {
    MessageEvent {
        user: "U1".to_owned(),
        text: text.to_owned(),
        client_message_id: "x".to_owned(),
        team: "T1".to_owned(),
        channel: "C1".to_owned(),
        event_timestamp: "1".to_owned(),
        timestamp: "1".to_owned(),
    }
}

/// Polls `check` until it holds, failing the test after roughly two seconds.
pub(crate) async fn eventually(check: impl Fn() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition was not reached in time");
}

struct FakeGatewayState {
    handshake_error: Option<GatewayError>,
    handshakes: usize,
    conversation: Result<ConversationInfo, GatewayError>,
    user: Result<UserInfo, GatewayError>,
    lookups: usize,
    post_failures: usize,
    posted: Vec<OutgoingMessage>,
}

pub(crate) struct FakeGateway {
    state: Mutex<FakeGatewayState>,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self {
            state: Mutex::new(FakeGatewayState {
                handshake_error: None,
                handshakes: 0,
                conversation: Ok(ConversationInfo { is_direct_message: false }),
                user: Ok(UserInfo { display_name: "Alice".to_owned() }),
                lookups: 0,
                post_failures: 0,
                posted: Vec::new(),
            }),
        }
    }
}

impl FakeGateway {
    pub(crate) fn with_direct_message(self, is_direct_message: bool) -> Self {
        self.state.lock().expect("state").conversation = Ok(ConversationInfo { is_direct_message });
        self
    }

    pub(crate) fn with_conversation_error(self, error: &str) -> Self {
        self.state.lock().expect("state").conversation =
            Err(GatewayError::Api { method: "conversations.info", error: error.to_owned() });
        self
    }

    pub(crate) fn with_user_error(self, error: &str) -> Self {
        self.state.lock().expect("state").user =
            Err(GatewayError::Api { method: "users.info", error: error.to_owned() });
        self
    }

    pub(crate) fn with_handshake_error(self, error: GatewayError) -> Self {
        self.state.lock().expect("state").handshake_error = Some(error);
        self
    }

    pub(crate) fn fail_posts(self, count: usize) -> Self {
        self.state.lock().expect("state").post_failures = count;
        self
    }

    pub(crate) fn handshake_count(&self) -> usize {
        self.state.lock().expect("state").handshakes
    }

    pub(crate) fn lookup_count(&self) -> usize {
        self.state.lock().expect("state").lookups
    }

    pub(crate) fn posted(&self) -> Vec<OutgoingMessage> {
        self.state.lock().expect("state").posted.clone()
    }
}

#[async_trait]
impl SlackGateway for FakeGateway {
    async fn connect(&self) -> Result<ConnectionHandshake, GatewayError> {
        let mut state = self.state.lock().expect("state");
        state.handshakes += 1;
        if let Some(error) = state.handshake_error.clone() {
            return Err(error);
        }
        Ok(ConnectionHandshake {
            url: format!("wss://fake.invalid/rtm/{}", state.handshakes),
            team: TeamIdentity {
                id: "T1".to_owned(),
                name: "Heart of Gold".to_owned(),
                domain: "hog".to_owned(),
            },
            bot: bot_identity(),
        })
    }

    async fn conversation_info(&self, _channel_id: &str) -> Result<ConversationInfo, GatewayError> {
        let mut state = self.state.lock().expect("state");
        state.lookups += 1;
        state.conversation.clone()
    }

    async fn user_info(&self, _user_id: &str) -> Result<UserInfo, GatewayError> {
        let mut state = self.state.lock().expect("state");
        state.lookups += 1;
        state.user.clone()
    }

    async fn post_message(&self, message: &OutgoingMessage) -> Result<(), GatewayError> {
        let mut state = self.state.lock().expect("state");
        if state.post_failures > 0 {
            state.post_failures -= 1;
            return Err(GatewayError::Http {
                method: "chat.postMessage",
                reason: "connection reset".to_owned(),
            });
        }
        state.posted.push(message.clone());
        Ok(())
    }
}

/// Test double for the greeting skill, which lives in a downstream crate.
pub(crate) struct GreetCapability;

#[async_trait]
impl Capability for GreetCapability {
    fn name(&self) -> &str {
        "greet"
    }

    fn can_handle(&self, _context: &MessageContext) -> bool {
        true
    }

    async fn process(&self, context: &MessageContext, reply: ReplySink) {
        match &context.sender {
            Some(sender) => reply.send(format!("Hi {sender}!")),
            None => reply.send("Hi!"),
        }
    }
}

#[derive(Clone, Default)]
pub(crate) struct RecordingLog {
    checked: Arc<Mutex<Vec<String>>>,
    processed: Arc<Mutex<Vec<String>>>,
}

impl RecordingLog {
    pub(crate) fn checked(&self) -> Vec<String> {
        self.checked.lock().expect("log").clone()
    }

    pub(crate) fn processed(&self) -> Vec<String> {
        self.processed.lock().expect("log").clone()
    }
}

pub(crate) struct RecordingCapability {
    name: String,
    claims: bool,
    replies: Vec<String>,
    log: RecordingLog,
}

impl RecordingCapability {
    pub(crate) fn new(name: &str, claims: bool, log: RecordingLog) -> Self {
        Self { name: name.to_owned(), claims, replies: Vec::new(), log }
    }

    pub(crate) fn replying(mut self, text: &str) -> Self {
        self.replies.push(text.to_owned());
        self
    }
}

#[async_trait]
impl Capability for RecordingCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_handle(&self, _context: &MessageContext) -> bool {
        self.log.checked.lock().expect("log").push(self.name.clone());
        self.claims
    }

    async fn process(&self, _context: &MessageContext, reply: ReplySink) {
        self.log.processed.lock().expect("log").push(self.name.clone());
        for text in &self.replies {
            reply.send(text.clone());
        }
    }
}

#[derive(Default)]
struct SocketLog {
    pings: usize,
    closed: bool,
}

/// Test-side handle to one scripted socket: push inbound frames, inspect
/// pings and closure.
#[derive(Clone)]
pub(crate) struct ScriptedSocketHandle {
    frames: mpsc::UnboundedSender<SocketFrame>,
    log: Arc<Mutex<SocketLog>>,
}

impl ScriptedSocketHandle {
    pub(crate) fn push(&self, frame: SocketFrame) {
        self.frames.send(frame).expect("socket reader is gone");
    }

    pub(crate) fn pings(&self) -> usize {
        self.log.lock().expect("socket log").pings
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.log.lock().expect("socket log").closed
    }
}

struct ScriptedSocket {
    frames: mpsc::UnboundedReceiver<SocketFrame>,
    log: Arc<Mutex<SocketLog>>,
}

#[async_trait]
impl SocketStream for ScriptedSocket {
    async fn next_frame(&mut self) -> Result<SocketFrame, TransportError> {
        Ok(self.frames.recv().await.unwrap_or(SocketFrame::Closed))
    }

    async fn send_ping(&mut self) -> Result<(), TransportError> {
        let mut log = self.log.lock().expect("socket log");
        if log.closed {
            return Err(TransportError::Send("socket closed".to_owned()));
        }
        log.pings += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.log.lock().expect("socket log").closed = true;
        Ok(())
    }
}

#[derive(Default)]
struct ConnectorState {
    sockets: Vec<ScriptedSocketHandle>,
    urls: Vec<String>,
    next_failure: VecDeque<String>,
    stalled_opens: usize,
}

#[derive(Default)]
pub(crate) struct ScriptedConnector {
    state: Mutex<ConnectorState>,
}

impl ScriptedConnector {
    pub(crate) fn fail_next_open(&self, reason: &str) {
        self.state.lock().expect("connector").next_failure.push_back(reason.to_owned());
    }

    /// The next `open` never completes, like a stalled TLS upgrade.
    pub(crate) fn stall_next_open(&self) {
        self.state.lock().expect("connector").stalled_opens += 1;
    }

    fn take_stall(&self) -> bool {
        let mut state = self.state.lock().expect("connector");
        if state.stalled_opens == 0 {
            return false;
        }
        state.stalled_opens -= 1;
        true
    }

    pub(crate) fn opened_urls(&self) -> Vec<String> {
        self.state.lock().expect("connector").urls.clone()
    }

    pub(crate) fn socket(&self, index: usize) -> ScriptedSocketHandle {
        self.state.lock().expect("connector").sockets[index].clone()
    }
}

#[async_trait]
impl SocketConnector for ScriptedConnector {
    async fn open(&self, url: &str) -> Result<Box<dyn SocketStream>, TransportError> {
        if self.take_stall() {
            return std::future::pending().await;
        }

        let mut state = self.state.lock().expect("connector");
        if let Some(reason) = state.next_failure.pop_front() {
            return Err(TransportError::Connect(reason));
        }

        let (frames, receiver) = mpsc::unbounded_channel();
        let log = Arc::new(Mutex::new(SocketLog::default()));
        state.sockets.push(ScriptedSocketHandle { frames, log: log.clone() });
        state.urls.push(url.to_owned());
        Ok(Box::new(ScriptedSocket { frames: receiver, log }))
    }
}
