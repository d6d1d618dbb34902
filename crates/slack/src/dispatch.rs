use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::{
    addressing::MessageContext,
    outbound::{OutgoingMessage, ReplySink},
};

/// A pluggable skill. `can_handle` runs for every addressed message against
/// every capability until one claims it, so it must be cheap and pure.
#[async_trait]
pub trait Capability: Send + Sync {
    fn name(&self) -> &str;
    fn can_handle(&self, context: &MessageContext) -> bool;
    async fn process(&self, context: &MessageContext, reply: ReplySink);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled { capability: String },
    Unhandled,
}

/// Ordered, first-match routing of addressed messages to capabilities.
pub struct Dispatcher {
    capabilities: Vec<Arc<dyn Capability>>,
    outbound: mpsc::UnboundedSender<OutgoingMessage>,
}

impl Dispatcher {
    pub fn new(outbound: mpsc::UnboundedSender<OutgoingMessage>) -> Self {
        Self { capabilities: Vec::new(), outbound }
    }

    pub fn register<C>(&mut self, capability: C)
    where
        C: Capability + 'static,
    {
        self.capabilities.push(Arc::new(capability));
    }

    pub fn register_arc(&mut self, capability: Arc<dyn Capability>) {
        self.capabilities.push(capability);
    }

    pub fn capability_count(&self) -> usize {
        self.capabilities.len()
    }

    pub async fn dispatch(
        &self,
        context: &MessageContext,
        channel: &str,
        bot_name: &str,
    ) -> DispatchOutcome {
        let Some(capability) =
            self.capabilities.iter().find(|capability| capability.can_handle(context))
        else {
            debug!(
                event_name = "dispatch.unhandled",
                channel,
                "no capability claimed the message"
            );
            return DispatchOutcome::Unhandled;
        };

        info!(
            event_name = "dispatch.capability_selected",
            capability = capability.name(),
            channel,
            direct_message = context.is_direct_message,
            "dispatching message to capability"
        );

        let reply = ReplySink::new(channel, bot_name, self.outbound.clone());
        capability.process(context, reply).await;

        DispatchOutcome::Handled { capability: capability.name().to_owned() }
    }
}
