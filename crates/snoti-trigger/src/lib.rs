//! SNOTI trigger: delivers broker events to handlers.
//!
//! The trigger owns one [`snoti_connection::Connection`] and one
//! [`Dispatcher`]. For every delivered frame the dispatcher runs all
//! registered handlers concurrently, waits for them, and queues exactly one
//! `event_ack`, whatever the handlers returned.
//!
//! # Architecture
//!
//! ```text
//! Connection::read() -> Dispatcher -> handler 1 ┐
//!                                  -> handler 2 ┼-> wait all -> event_ack -> Connection::write()
//!                                  -> handler n ┘
//! ```
//!
//! Delivery is at most once: a handler failure is logged and the message
//! is acknowledged anyway.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod log_handler;
pub mod trigger;

#[cfg(test)]
mod tests;

pub use config::TriggerConfig;
pub use dispatcher::{DispatchReport, Dispatcher};
pub use error::{TriggerError, TriggerResult};
pub use handler::{Handler, HandlerContext, HandlerOutcome, HandlerRegistry, TriggerOutput};
pub use log_handler::LogEventHandler;
pub use trigger::Trigger;
