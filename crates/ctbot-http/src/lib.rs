//! HTTPS transport for the bot API (reqwest).
//!
//! Each `post` performs the whole request and buffers the response body until
//! the core flushes it.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use ctbot_core::{
    config::Config, encoder::RequestHeader, errors::Error, transport::Transport, Result,
};

#[derive(Debug)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: Option<String>,
    connected: bool,
    pending: Option<Vec<u8>>,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Transport(format!("http client build error: {e}")))?;
        Ok(Self {
            http,
            base_url: None,
            connected: false,
            pending: None,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let transport = Self::new(cfg.http_timeout)?;
        Ok(match &cfg.api_base_url {
            Some(url) => transport.with_base_url(url.clone()),
            None => transport,
        })
    }

    /// Send requests to `base_url` (scheme + authority) instead of
    /// `https://<header host>`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    fn url_for(&self, header: &RequestHeader) -> String {
        match &self.base_url {
            Some(base) => format!("{base}{}", header.path()),
            None => format!("https://{}{}", header.host, header.path()),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn post(&mut self, header: &RequestHeader, body: &[u8]) -> Result<()> {
        if body.len() != header.content_length {
            return Err(Error::Transport(format!(
                "content length {} does not match body of {} bytes",
                header.content_length,
                body.len()
            )));
        }

        // Anything still buffered belongs to an abandoned request.
        self.pending = None;

        let resp = self
            .http
            .post(self.url_for(header))
            .header(reqwest::header::CONTENT_TYPE, header.content_type)
            .body(body.to_vec())
            .send()
            .await
            .map_err(|e| {
                self.connected = false;
                Error::Transport(format!("{} request error: {e}", header.command))
            })?;

        // Error statuses still carry an `ok: false` JSON body; let the core read it.
        let status = resp.status();
        let bytes = resp.bytes().await.map_err(|e| {
            self.connected = false;
            Error::Transport(format!("{} response error: {e}", header.command))
        })?;
        if !status.is_success() {
            warn!(command = %header.command, %status, "bot api returned an error status");
        }
        debug!(command = %header.command, %status, len = bytes.len(), "response buffered");

        self.pending = Some(bytes.to_vec());
        self.connected = true;
        Ok(())
    }

    async fn receive(&mut self) -> Option<Vec<u8>> {
        self.pending.clone()
    }

    fn flush(&mut self) {
        self.pending = None;
    }

    async fn disconnect(&mut self) {
        self.pending = None;
        self.connected = false;
    }
}
