//! Capability modules shipped with the bot.
//!
//! Registration order is priority order: the dispatcher hands a message to
//! the first capability that claims it.

pub mod greet;

use std::sync::Arc;

use marvin_slack::{Capability, Dispatcher};

pub use greet::Greet;

pub fn default_capabilities() -> Vec<Arc<dyn Capability>> {
    vec![Arc::new(Greet)]
}

pub fn register_defaults(dispatcher: &mut Dispatcher) {
    for capability in default_capabilities() {
        dispatcher.register_arc(capability);
    }
}
