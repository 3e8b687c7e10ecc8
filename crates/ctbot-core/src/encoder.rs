use std::fmt;

use serde_json::{Map, Value};

use crate::{config::DEFAULT_API_HOST, errors::Error, Result};

pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Bot API methods this client issues.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    GetUpdates,
    SendMessage,
    AnswerCallbackQuery,
    GetMe,
    EditMessageText,
    DeleteMessage,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::GetUpdates => "getUpdates",
            Command::SendMessage => "sendMessage",
            Command::AnswerCallbackQuery => "answerCallbackQuery",
            Command::GetMe => "getMe",
            Command::EditMessageText => "editMessageText",
            Command::DeleteMessage => "deleteMessage",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flat JSON request parameters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Params(Map<String, Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn string(mut self, key: &str, value: &str) -> Self {
        self.0.insert(key.to_string(), Value::from(value));
        self
    }

    pub fn int(mut self, key: &str, value: i32) -> Self {
        self.0.insert(key.to_string(), Value::from(value));
        self
    }

    pub fn int64(mut self, key: &str, value: i64) -> Self {
        self.0.insert(key.to_string(), Value::from(value));
        self
    }

    pub fn boolean(mut self, key: &str, value: bool) -> Self {
        self.0.insert(key.to_string(), Value::from(value));
        self
    }

    /// Embed a pre-built JSON fragment (keyboards, allow-lists).
    pub fn json(mut self, key: &str, value: Value) -> Self {
        self.0.insert(key.to_string(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Request framing handed to the transport alongside the body.
#[derive(Clone, PartialEq, Eq)]
pub struct RequestHeader {
    pub host: String,
    pub command: Command,
    pub content_length: usize,
    pub content_type: &'static str,
    token: String,
}

impl RequestHeader {
    /// `/bot<token>/<command>`
    pub fn path(&self) -> String {
        format!("/bot{}/{}", self.token, self.command)
    }

    /// Raw HTTP/1.1 request preamble, for socket-level transports.
    pub fn render(&self) -> String {
        format!(
            "POST {} HTTP/1.1\r\nHost: {}\r\nContent-Length: {}\r\nContent-Type: {}\r\n\r\n",
            self.path(),
            self.host,
            self.content_length,
            self.content_type
        )
    }
}

// The token is a credential; keep it out of logs.
impl fmt::Debug for RequestHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHeader")
            .field("host", &self.host)
            .field("command", &self.command)
            .field("content_length", &self.content_length)
            .field("content_type", &self.content_type)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Serializes commands into a header plus JSON body.
#[derive(Clone, Debug)]
pub struct CommandEncoder {
    pub host: String,
    pub max_payload_bytes: usize,
}

impl Default for CommandEncoder {
    fn default() -> Self {
        Self {
            host: DEFAULT_API_HOST.to_string(),
            max_payload_bytes: 64 * 1024,
        }
    }
}

impl CommandEncoder {
    pub fn new(host: impl Into<String>, max_payload_bytes: usize) -> Self {
        Self {
            host: host.into(),
            max_payload_bytes,
        }
    }

    /// Encode `params` as the body of `command`.
    ///
    /// `content_length` is the exact length of the returned body.
    pub fn encode(
        &self,
        token: &str,
        command: Command,
        params: &Params,
    ) -> Result<(RequestHeader, Vec<u8>)> {
        let body = serde_json::to_vec(&params.0)?;
        if body.len() > self.max_payload_bytes {
            return Err(Error::PayloadTooLarge {
                size: body.len(),
                limit: self.max_payload_bytes,
            });
        }

        let header = RequestHeader {
            host: self.host.clone(),
            command,
            content_length: body.len(),
            content_type: CONTENT_TYPE_JSON,
            token: token.to_string(),
        };
        Ok((header, body))
    }
}
