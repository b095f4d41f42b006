//! Messaging - command routing, text parsing and the event bus

pub mod commands;
pub mod dispatcher;
pub mod events;
pub mod parser;

pub use commands::CommandRouter;
pub use dispatcher::EventDispatcher;
pub use events::{listener, EventBus, EventRegistration, Listener, CORE_OWNER};
pub use parser::MessageParser;
