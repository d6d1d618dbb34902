use std::sync::Arc;

use serde::Serialize;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, warn};

use crate::gateway::SlackGateway;

pub const BOT_ICON_EMOJI: &str = ":robot_face:";

/// `chat.postMessage` body. Field names and fixed values are part of the wire
/// contract with Slack.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    /// Random client-side correlation id; Slack does not echo delivery receipts for it.
    pub id: u32,
    pub channel: String,
    pub text: String,
    pub username: String,
    #[serde(rename = "type")]
    pub message_type: &'static str,
    pub as_user: bool,
    pub icon_emoji: &'static str,
}

impl OutgoingMessage {
    pub fn new(
        channel: impl Into<String>,
        text: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            id: rand::random(),
            channel: channel.into(),
            text: text.into(),
            username: username.into(),
            message_type: "message",
            as_user: false,
            icon_emoji: BOT_ICON_EMOJI,
        }
    }
}

/// Handed to a capability so it can answer in the conversation the message
/// came from. Every `send` posts one message; a sink that is never used
/// posts nothing.
#[derive(Clone, Debug)]
pub struct ReplySink {
    channel: String,
    username: String,
    sender: mpsc::UnboundedSender<OutgoingMessage>,
}

impl ReplySink {
    pub fn new(
        channel: impl Into<String>,
        username: impl Into<String>,
        sender: mpsc::UnboundedSender<OutgoingMessage>,
    ) -> Self {
        Self { channel: channel.into(), username: username.into(), sender }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn send(&self, text: impl Into<String>) {
        let message = OutgoingMessage::new(self.channel.clone(), text, self.username.clone());
        if self.sender.send(message).is_err() {
            warn!(
                event_name = "egress.slack.reply_dropped",
                channel = %self.channel,
                "outbound poster has stopped; reply dropped"
            );
        }
    }
}

/// Spawns the single task that delivers replies. It runs until every sender
/// clone has been dropped.
pub fn spawn_poster(
    gateway: Arc<dyn SlackGateway>,
) -> (mpsc::UnboundedSender<OutgoingMessage>, JoinHandle<()>) {
    let (sender, mut receiver) = mpsc::unbounded_channel::<OutgoingMessage>();

    let handle = tokio::spawn(async move {
        while let Some(message) = receiver.recv().await {
            match gateway.post_message(&message).await {
                Ok(()) => debug!(
                    event_name = "egress.slack.message_posted",
                    channel = %message.channel,
                    message_id = message.id,
                    "reply posted"
                ),
                Err(error) => warn!(
                    event_name = "egress.slack.post_failed",
                    channel = %message.channel,
                    message_id = message.id,
                    error = %error,
                    "failed to post reply; message lost"
                ),
            }
        }
        debug!(event_name = "egress.slack.poster_stopped", "outbound poster stopped");
    });

    (sender, handle)
}
