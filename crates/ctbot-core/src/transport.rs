use async_trait::async_trait;

use crate::{encoder::RequestHeader, Result};

/// Hexagonal port for the single HTTP connection to the bot API.
///
/// Implementations hold at most one buffered response. The core drives them from
/// one task and never issues a second `post` while a response is outstanding.
#[async_trait]
pub trait Transport: Send {
    fn is_connected(&self) -> bool;

    /// Send one request. `body.len()` equals `header.content_length`.
    async fn post(&mut self, header: &RequestHeader, body: &[u8]) -> Result<()>;

    /// The buffered response, if a complete one has arrived. Does not consume it.
    async fn receive(&mut self) -> Option<Vec<u8>>;

    /// Discard the buffered response.
    fn flush(&mut self);

    /// Drop the connection and any state tied to it.
    async fn disconnect(&mut self);
}
