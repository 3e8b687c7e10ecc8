use std::{fmt, time::Duration};

use serde_json::{json, Value};
use tracing::{debug, trace, warn};

use crate::{
    clock::{elapsed_ms, Clock},
    config::Config,
    encoder::{Command, CommandEncoder, Params},
    errors::Error,
    transport::Transport,
    types::{Ack, ContactMessage, LocationMessage, Outcome, TextMessage},
    wire::{Envelope, WireMessage, WireUpdate, WireUser},
    Result,
};

/// Update categories requested by [`Session::poll`].
pub const ALLOWED_UPDATES: [&str; 2] = ["message", "callback_query"];

/// Connection-scoped client state: credential, outstanding-request flag, update
/// cursor and poll timestamp.
///
/// Not synchronized. Drive a session from one task at a time; every operation
/// takes `&mut self`.
pub struct Session {
    token: Option<String>,
    encoder: CommandEncoder,
    outstanding: bool,
    cursor: u32,
    last_poll_ms: Option<u32>,
    poll_min_interval: Duration,
    long_poll_timeout: Duration,
}

impl Session {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let mut session = Self::unauthenticated();
        session.set_token(token)?;
        Ok(session)
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let mut session = Self::new(cfg.telegram_bot_token.clone())?;
        session.encoder = CommandEncoder::new(cfg.api_host.clone(), cfg.max_payload_bytes);
        session.poll_min_interval = cfg.poll_min_interval;
        session.long_poll_timeout = cfg.long_poll_timeout;
        Ok(session)
    }

    /// A session without a credential. Every dispatch fails until
    /// [`Session::set_token`] succeeds.
    pub fn unauthenticated() -> Self {
        Self {
            token: None,
            encoder: CommandEncoder::default(),
            outstanding: false,
            cursor: 0,
            last_poll_ms: None,
            poll_min_interval: Duration::from_millis(3000),
            long_poll_timeout: Duration::ZERO,
        }
    }

    pub fn with_encoder(mut self, encoder: CommandEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_min_interval = interval;
        self
    }

    /// Replace the credential. A blank token clears it and is an error.
    pub fn set_token(&mut self, token: impl Into<String>) -> Result<()> {
        let token = token.into();
        let token = token.trim();
        if token.is_empty() {
            self.token = None;
            return Err(Error::Config("bot token can't be empty".to_string()));
        }
        self.token = Some(token.to_string());
        Ok(())
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// True from a successful dispatch until its response is classified or the
    /// connection drops.
    pub fn is_outstanding(&self) -> bool {
        self.outstanding
    }

    /// Forget the outstanding request, e.g. after tearing down the transport.
    pub fn clear_outstanding(&mut self) {
        self.outstanding = false;
    }

    /// Next update id to request. 0 means "from the oldest pending update".
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    pub fn last_poll_ms(&self) -> Option<u32> {
        self.last_poll_ms
    }

    pub fn poll_min_interval(&self) -> Duration {
        self.poll_min_interval
    }

    /// Dispatch one command, enforcing a single outstanding request.
    ///
    /// Rejected without touching the transport when there is no token, or when a
    /// request is outstanding and the connection is still up. An outstanding
    /// request on a dropped connection is abandoned and the dispatch proceeds.
    pub async fn try_send<T>(
        &mut self,
        transport: &mut T,
        command: Command,
        params: &Params,
    ) -> Result<()>
    where
        T: Transport + ?Sized,
    {
        if self.token.is_none() {
            debug!(%command, "no bot token defined");
            return Err(Error::Config("no bot token defined".to_string()));
        }

        if self.outstanding {
            if transport.is_connected() {
                debug!(%command, "another request is awaiting its response");
                return Err(Error::RequestPending);
            }
            debug!(%command, "connection lost with a request outstanding; dropping it");
            self.outstanding = false;
        }

        let token = self.token.as_deref().unwrap_or_default();
        let (header, body) = self.encoder.encode(token, command, params)?;
        debug!(
            ?header,
            payload = %String::from_utf8_lossy(&body),
            "sending command"
        );

        if let Err(e) = transport.post(&header, &body).await {
            warn!(%command, error = %e, "command not sent");
            return Err(e);
        }

        self.outstanding = true;
        Ok(())
    }

    /// Ask for the next update after the cursor, at most once per poll interval.
    ///
    /// Returns whether a `getUpdates` request went out. A throttled call changes
    /// nothing; otherwise the poll timestamp is recorded whether or not the
    /// dispatch succeeded.
    pub async fn poll<T, C>(&mut self, transport: &mut T, clock: &C) -> bool
    where
        T: Transport + ?Sized,
        C: Clock + ?Sized,
    {
        let now = clock.now_ms();
        if let Some(last) = self.last_poll_ms {
            if u128::from(elapsed_ms(last, now)) < self.poll_min_interval.as_millis() {
                trace!("poll throttled");
                return false;
            }
        }

        let mut params = Params::new()
            .int("limit", 1)
            .json("allowed_updates", json!(ALLOWED_UPDATES))
            .int64("offset", i64::from(self.cursor));
        if !self.long_poll_timeout.is_zero() {
            let secs = i64::try_from(self.long_poll_timeout.as_secs()).unwrap_or(i64::MAX);
            params = params.int64("timeout", secs);
        }

        let sent = match self.try_send(transport, Command::GetUpdates, &params).await {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "getUpdates not dispatched");
                false
            }
        };

        self.last_poll_ms = Some(clock.now_ms());
        sent
    }

    /// Classify the response to a command or poll.
    ///
    /// Returns `NoData` while nothing is buffered; call again until
    /// [`Session::is_outstanding`] turns false.
    pub async fn classify<T>(&mut self, transport: &mut T) -> Outcome
    where
        T: Transport + ?Sized,
    {
        match self.receive_envelope(transport).await {
            Some(envelope) => self.classify_envelope(envelope),
            None => Outcome::NoData,
        }
    }

    /// Classify the response to `getMe`.
    pub async fn classify_identity<T>(&mut self, transport: &mut T) -> Outcome
    where
        T: Transport + ?Sized,
    {
        let Some(envelope) = self.receive_envelope(transport).await else {
            return Outcome::NoData;
        };
        if !envelope.result.is_object() {
            debug!("identity response without a result object");
            return Outcome::NoData;
        }
        match serde_json::from_value::<WireUser>(envelope.result) {
            Ok(user) => Outcome::UserProfile(user.into_profile()),
            Err(e) => {
                warn!(error = %e, "malformed identity response");
                Outcome::NoData
            }
        }
    }

    /// Pull, decode and validate one buffered response.
    async fn receive_envelope<T>(&mut self, transport: &mut T) -> Option<Envelope>
    where
        T: Transport + ?Sized,
    {
        if !transport.is_connected() {
            if self.outstanding {
                debug!("connection lost while awaiting a response");
            }
            self.outstanding = false;
            return None;
        }

        let bytes = transport.receive().await?;
        debug!(len = bytes.len(), "response received");

        // Parsed or not, the response has arrived.
        self.outstanding = false;

        let envelope = match Envelope::decode(&bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "failed to decode response");
                transport.flush();
                return None;
            }
        };
        transport.flush();

        if !envelope.is_ok() {
            debug!(
                error_code = ?envelope.error_code,
                description = ?envelope.description,
                "request rejected by server"
            );
            return None;
        }
        Some(envelope)
    }

    fn classify_envelope(&mut self, envelope: Envelope) -> Outcome {
        let update_id = envelope.update_id().value();

        if update_id == 0 {
            // No update id: either a command echo or an empty poll batch.
            if !envelope.has_result() {
                return Outcome::NoData;
            }
            return Outcome::Ack(ack_from(envelope.result));
        }
        if update_id < 0 {
            debug!(update_id, "negative update id ignored");
            return Outcome::NoData;
        }

        // Advance first: an update we can't classify must not come back.
        self.cursor = update_id as u32 + 1;
        trace!(cursor = self.cursor, "update cursor advanced");

        let Some(first) = first_entry(envelope.result) else {
            return Outcome::NoData;
        };
        let update = match serde_json::from_value::<WireUpdate>(first) {
            Ok(update) => update,
            Err(e) => {
                warn!(update_id, error = %e, "malformed update skipped");
                return Outcome::NoData;
            }
        };

        if let Some(query) = update.callback_query {
            if let Some(id) = query.id.clone().filter(|id| !id.is_empty()) {
                return Outcome::CallbackQuery(query.into_callback_query(id));
            }
        }

        if let Some(message) = update.message {
            if message.message_id.is_some_and(|id| id != 0) {
                return classify_message(update_id, message);
            }
        }

        debug!(update_id, "update carries no message or callback query");
        Outcome::NoData
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("has_token", &self.token.is_some())
            .field("outstanding", &self.outstanding)
            .field("cursor", &self.cursor)
            .field("last_poll_ms", &self.last_poll_ms)
            .finish_non_exhaustive()
    }
}

fn first_entry(result: Value) -> Option<Value> {
    match result {
        Value::Array(items) => items.into_iter().next(),
        _ => None,
    }
}

fn ack_from(result: Value) -> Ack {
    let Value::Object(_) = result else {
        return Ack::default();
    };
    match serde_json::from_value::<WireMessage>(result) {
        Ok(mut message) => Ack {
            message: Some(message.take_meta()),
            text: message.text,
        },
        Err(e) => {
            debug!(error = %e, "acknowledgement without a readable message");
            Ack::default()
        }
    }
}

fn classify_message(update_id: i32, mut message: WireMessage) -> Outcome {
    let meta = message.take_meta();

    if let Some(text) = message.text.filter(|t| !t.is_empty()) {
        return Outcome::Text(TextMessage { meta, text });
    }
    if let Some(location) = message.location {
        return Outcome::Location(LocationMessage {
            meta,
            location: location.into_location(),
        });
    }
    if let Some(contact) = message.contact {
        return Outcome::Contact(ContactMessage {
            meta,
            contact: contact.into_contact(),
        });
    }

    debug!(update_id, "unhandled message type skipped");
    Outcome::NoData
}
