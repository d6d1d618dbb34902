use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    addressing::{AddressingResolver, Resolution},
    dispatch::{DispatchOutcome, Dispatcher},
    events::{DecodeError, IncomingEvent},
    gateway::{BotIdentity, SlackGateway},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Ready,
    Typing,
    Ignored(DecodeError),
    NotAddressed,
    LookupFailed,
    Dispatched(DispatchOutcome),
}

/// Per-connection frame handling: decode, resolve addressing, dispatch.
/// Holds the bot identity learned from the handshake that opened the socket.
pub struct EventPipeline {
    resolver: AddressingResolver,
    dispatcher: Arc<Dispatcher>,
    bot: BotIdentity,
}

impl EventPipeline {
    pub fn new(
        gateway: Arc<dyn SlackGateway>,
        dispatcher: Arc<Dispatcher>,
        bot: BotIdentity,
    ) -> Self {
        Self { resolver: AddressingResolver::new(gateway), dispatcher, bot }
    }

    pub async fn handle_frame(&self, frame: &str) -> FrameOutcome {
        let correlation_id = Uuid::new_v4();

        let event = match IncomingEvent::decode(frame) {
            Ok(event) => event,
            Err(error) => {
                debug!(
                    event_name = "ingress.slack.frame_ignored",
                    correlation_id = %correlation_id,
                    error = %error,
                    "dropping undecodable frame"
                );
                return FrameOutcome::Ignored(error);
            }
        };

        debug!(
            event_name = "ingress.slack.frame_received",
            correlation_id = %correlation_id,
            event_type = event.event_type(),
            "received slack event"
        );

        let message = match event {
            IncomingEvent::Hello => {
                info!(
                    event_name = "ingress.slack.hello",
                    correlation_id = %correlation_id,
                    bot_id = %self.bot.id,
                    "rtm connection is ready"
                );
                return FrameOutcome::Ready;
            }
            IncomingEvent::UserTyping(_) => return FrameOutcome::Typing,
            IncomingEvent::Message(message) => message,
        };

        let context = match self.resolver.resolve(&message, &self.bot).await {
            Resolution::InScope(context) => context,
            Resolution::NotAddressed => return FrameOutcome::NotAddressed,
            Resolution::LookupFailed(_) => return FrameOutcome::LookupFailed,
        };

        let outcome = self.dispatcher.dispatch(&context, &message.channel, &self.bot.name).await;
        debug!(
            event_name = "ingress.slack.message_dispatched",
            correlation_id = %correlation_id,
            channel = %message.channel,
            outcome = ?outcome,
            "message processing finished"
        );
        FrameOutcome::Dispatched(outcome)
    }
}
