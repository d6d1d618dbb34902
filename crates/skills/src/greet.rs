use async_trait::async_trait;
use marvin_slack::{Capability, MessageContext, ReplySink};
use tracing::debug;

/// Answers every addressed message with a greeting, by name when the sender
/// is known.
#[derive(Clone, Copy, Debug, Default)]
pub struct Greet;

impl Greet {
    pub fn greeting(context: &MessageContext) -> String {
        match &context.sender {
            Some(sender) => format!("Hi {sender}!"),
            None => "Hi!".to_owned(),
        }
    }
}

#[async_trait]
impl Capability for Greet {
    fn name(&self) -> &str {
        "greet"
    }

    fn can_handle(&self, _context: &MessageContext) -> bool {
        true
    }

    async fn process(&self, context: &MessageContext, reply: ReplySink) {
        debug!(event_name = "skill.greet.reply", channel = reply.channel(), "greeting sender");
        reply.send(Self::greeting(context));
    }
}
