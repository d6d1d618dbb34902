//! Slack RTM integration - the bot's connection and dispatch engine
//!
//! This crate provides:
//! - **Events** (`events`) - decoding of RTM socket frames into typed events
//! - **Gateway** (`gateway`) - Slack Web API calls (`rtm.connect`, lookups, posting)
//! - **Addressing** (`addressing`) - decides whether a message is meant for the bot
//! - **Dispatch** (`dispatch`) - first-match routing to capability modules
//! - **Outbound** (`outbound`) - reply payloads and the single posting task
//! - **Socket** (`socket`, `transport`) - connection lifecycle, keepalive, reconnect
//!
//! # Architecture
//!
//! ```text
//! rtm.connect → websocket → EventPipeline → AddressingResolver → Dispatcher
//!                                                                   ↓
//!                          chat.postMessage ← outbound poster ← ReplySink
//! ```

pub mod addressing;
pub mod dispatch;
pub mod events;
pub mod gateway;
pub mod outbound;
pub mod pipeline;
pub mod socket;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use addressing::{AddressingResolver, MessageContext, Resolution};
pub use dispatch::{Capability, DispatchOutcome, Dispatcher};
pub use events::{DecodeError, IncomingEvent, MessageEvent, UserTypingEvent};
pub use gateway::{
    BotIdentity, ConnectionHandshake, ConversationInfo, GatewayError, SlackGateway,
    SlackWebClient, TeamIdentity, UserInfo,
};
pub use outbound::{spawn_poster, OutgoingMessage, ReplySink};
pub use socket::{
    ConnectionError, ConnectionManager, ConnectionState, ConnectionSummary, KeepaliveSettings,
};
pub use transport::{
    SocketConnector, SocketFrame, SocketStream, TransportError, TungsteniteConnector,
};
