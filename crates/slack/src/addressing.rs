use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    events::MessageEvent,
    gateway::{BotIdentity, GatewayError, SlackGateway},
};

/// The normalized message a capability sees once the bot has decided to answer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageContext {
    pub is_direct_message: bool,
    pub sender: Option<String>,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    InScope(MessageContext),
    NotAddressed,
    LookupFailed(GatewayError),
}

/// Decides whether a message is meant for the bot: any direct message, or a
/// channel message that mentions the bot's id.
pub struct AddressingResolver {
    gateway: Arc<dyn SlackGateway>,
}

impl AddressingResolver {
    pub fn new(gateway: Arc<dyn SlackGateway>) -> Self {
        Self { gateway }
    }

    pub async fn resolve(&self, message: &MessageEvent, bot: &BotIdentity) -> Resolution {
        let (conversation, user) = tokio::join!(
            self.gateway.conversation_info(&message.channel),
            self.gateway.user_info(&message.user),
        );

        let (conversation, user) = match (conversation, user) {
            (Ok(conversation), Ok(user)) => (conversation, user),
            (Err(error), _) | (_, Err(error)) => {
                warn!(
                    event_name = "ingress.slack.lookup_failed",
                    channel = %message.channel,
                    user = %message.user,
                    error = %error,
                    "addressing lookup failed; dropping message"
                );
                return Resolution::LookupFailed(error);
            }
        };

        if !conversation.is_direct_message && !mentions(&message.text, &bot.id) {
            debug!(
                event_name = "ingress.slack.not_addressed",
                channel = %message.channel,
                "message is neither direct nor a mention"
            );
            return Resolution::NotAddressed;
        }

        Resolution::InScope(MessageContext {
            is_direct_message: conversation.is_direct_message,
            sender: Some(user.display_name),
            text: message.text.clone(),
        })
    }
}

/// Plain substring test on `@<bot id>`. Case-sensitive and without word
/// boundaries, so `@B12` also matches a bot whose id is `B1`.
pub fn mentions(text: &str, bot_id: &str) -> bool {
    text.contains(&format!("@{bot_id}"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{mentions, AddressingResolver, MessageContext, Resolution};
    use crate::{
        gateway::GatewayError,
        testing::{bot_identity, message_event, FakeGateway},
    };

    #[tokio::test]
    async fn direct_message_is_in_scope_without_mention() {
        let gateway = Arc::new(FakeGateway::default().with_direct_message(true));
        let resolver = AddressingResolver::new(gateway.clone());

        let resolution = resolver.resolve(&message_event("just chatting"), &bot_identity()).await;

        assert_eq!(
            resolution,
            Resolution::InScope(MessageContext {
                is_direct_message: true,
                sender: Some("Alice".to_owned()),
                text: "just chatting".to_owned(),
            })
        );
    }

    #[tokio::test]
    async fn channel_message_requires_mention_of_bot_id() {
        let gateway = Arc::new(FakeGateway::default());
        let resolver = AddressingResolver::new(gateway);

        let unaddressed = resolver.resolve(&message_event("hello all"), &bot_identity()).await;
        let addressed = resolver.resolve(&message_event("<@B1> hello"), &bot_identity()).await;

        assert_eq!(unaddressed, Resolution::NotAddressed);
        assert!(matches!(
            addressed,
            Resolution::InScope(ref context) if !context.is_direct_message
        ));
    }

    #[tokio::test]
    async fn failed_lookup_drops_the_message() {
        let gateway = Arc::new(FakeGateway::default().with_user_error("user_not_found"));
        let resolver = AddressingResolver::new(gateway.clone());

        let resolution = resolver.resolve(&message_event("@B1 hi"), &bot_identity()).await;

        assert_eq!(
            resolution,
            Resolution::LookupFailed(GatewayError::Api {
                method: "users.info",
                error: "user_not_found".to_owned(),
            })
        );
        assert_eq!(gateway.lookup_count(), 2, "both lookups are issued");
    }

    #[test]
    fn mention_matching_is_a_raw_case_sensitive_substring() {
        assert!(mentions("@B1 hello", "B1"));
        assert!(mentions("hey <@B1>", "B1"));
        assert!(mentions("@B12 is someone else", "B1"));
        assert!(!mentions("@b1 hello", "B1"));
        assert!(!mentions("B1 hello", "B1"));
    }
}
