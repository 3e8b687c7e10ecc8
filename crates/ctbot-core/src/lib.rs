//! Polling and response-classification core for a Telegram bot client.
//!
//! The HTTP/TLS transport lives behind the [`transport::Transport`] port and is
//! implemented in adapter crates. Everything here runs on one driving task.

pub mod bot;
pub mod clock;
pub mod config;
pub mod domain;
pub mod encoder;
pub mod errors;
pub mod logging;
pub mod session;
pub mod transport;
pub mod types;
mod wire;

pub use bot::{Bot, DrainPolicy};
pub use errors::{Error, Result};
pub use session::Session;
pub use types::Outcome;
