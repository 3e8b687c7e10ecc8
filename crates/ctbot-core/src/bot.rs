use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::{
    clock::{Clock, SystemClock},
    config::Config,
    domain::{ChatId, MessageId},
    encoder::{Command, Params},
    session::Session,
    transport::Transport,
    types::{Outcome, UserProfile},
    Result,
};

/// How long [`Bot::drain`] keeps asking the classifier for a response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrainPolicy {
    /// `None` keeps going until the response arrives or the connection drops.
    pub max_attempts: Option<u32>,
    /// Pause between attempts that found nothing buffered.
    pub backoff: Duration,
}

impl Default for DrainPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(1000),
            backoff: Duration::from_millis(10),
        }
    }
}

impl DrainPolicy {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            max_attempts: cfg.drain_max_attempts,
            backoff: cfg.drain_backoff,
        }
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ResponseShape {
    Message,
    Identity,
}

/// Blocking-style command API over one session and one transport.
///
/// Every call dispatches a single command and drains its response, so at most
/// one request is ever in flight. Failures of any kind come back as `false`,
/// `None` or [`Outcome::NoData`]; the cause is logged.
pub struct Bot<T, C = SystemClock> {
    session: Session,
    transport: T,
    clock: C,
    drain: DrainPolicy,
}

impl<T: Transport> Bot<T, SystemClock> {
    pub fn new(cfg: &Config, transport: T) -> Result<Self> {
        Ok(Self::with_parts(
            Session::from_config(cfg)?,
            transport,
            SystemClock::new(),
            DrainPolicy::from_config(cfg),
        ))
    }
}

impl<T: Transport, C: Clock> Bot<T, C> {
    pub fn with_parts(session: Session, transport: T, clock: C, drain: DrainPolicy) -> Self {
        Self {
            session,
            transport,
            clock,
            drain,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_parts(self) -> (Session, T, C) {
        (self.session, self.transport, self.clock)
    }

    /// Send a text message. Returns the id of the created message.
    pub async fn send_message(
        &mut self,
        chat_id: ChatId,
        text: &str,
        reply_markup: Option<&Value>,
    ) -> Option<MessageId> {
        let params = with_markup(
            Params::new()
                .int64("chat_id", chat_id.0)
                .string("text", text),
            reply_markup,
        );
        match self.execute(Command::SendMessage, &params).await {
            Outcome::Ack(ack) => ack.message_id().filter(|id| id.0 != 0),
            _ => None,
        }
    }

    pub async fn edit_message_text(
        &mut self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        reply_markup: Option<&Value>,
    ) -> bool {
        let params = with_markup(
            Params::new()
                .int64("chat_id", chat_id.0)
                .string("text", text)
                .int("message_id", message_id.0),
            reply_markup,
        );
        self.execute(Command::EditMessageText, &params)
            .await
            .is_ack()
    }

    pub async fn delete_message(&mut self, chat_id: ChatId, message_id: MessageId) -> bool {
        let params = Params::new()
            .int64("chat_id", chat_id.0)
            .int("message_id", message_id.0);
        self.execute(Command::DeleteMessage, &params).await.is_ack()
    }

    /// Close a callback query, optionally showing `text` as a toast or alert.
    pub async fn answer_callback_query(
        &mut self,
        query_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> bool {
        if query_id.is_empty() {
            debug!("answerCallbackQuery without a query id");
            return false;
        }

        let mut params = Params::new().string("callback_query_id", query_id);
        if let Some(text) = text.filter(|t| !t.is_empty()) {
            params = params.string("text", text).boolean("show_alert", show_alert);
        }
        self.execute(Command::AnswerCallbackQuery, &params)
            .await
            .is_ack()
    }

    /// Send `text` and hide the reply keyboard. With `selective`, only for the
    /// users mentioned in or replied to by the message.
    pub async fn remove_reply_keyboard(
        &mut self,
        chat_id: ChatId,
        text: &str,
        selective: bool,
    ) -> bool {
        let markup = json!({ "remove_keyboard": true, "selective": selective });
        self.send_message(chat_id, text, Some(&markup))
            .await
            .is_some()
    }

    /// Fetch the bot's own identity.
    pub async fn get_me(&mut self) -> Option<UserProfile> {
        if let Err(e) = self
            .session
            .try_send(&mut self.transport, Command::GetMe, &Params::new())
            .await
        {
            debug!(error = %e, "getMe not sent");
            return None;
        }
        match self.drain_shape(ResponseShape::Identity).await {
            Outcome::UserProfile(me) => Some(me),
            _ => None,
        }
    }

    /// Whether the token and connection work end to end.
    pub async fn test_connection(&mut self) -> bool {
        self.get_me().await.is_some()
    }

    /// Poll for one update and classify it.
    ///
    /// `NoData` when the poll was throttled, rejected, or found nothing.
    pub async fn get_new_message(&mut self) -> Outcome {
        if !self.session.poll(&mut self.transport, &self.clock).await {
            return Outcome::NoData;
        }
        self.drain().await
    }

    /// Wait one poll interval, then [`Bot::get_new_message`].
    pub async fn get_new_message_blocking(&mut self) -> Outcome {
        sleep(self.session.poll_min_interval()).await;
        self.get_new_message().await
    }

    /// Classify until the outstanding request resolves.
    ///
    /// When the drain policy runs out, the transport is disconnected so a late
    /// response can't be mistaken for the next command's.
    pub async fn drain(&mut self) -> Outcome {
        self.drain_shape(ResponseShape::Message).await
    }

    async fn execute(&mut self, command: Command, params: &Params) -> Outcome {
        if let Err(e) = self
            .session
            .try_send(&mut self.transport, command, params)
            .await
        {
            debug!(%command, error = %e, "command not sent");
            return Outcome::NoData;
        }
        self.drain().await
    }

    async fn drain_shape(&mut self, shape: ResponseShape) -> Outcome {
        let mut outcome = Outcome::NoData;
        let mut attempts = 0u32;

        while self.session.is_outstanding() {
            outcome = match shape {
                ResponseShape::Message => self.session.classify(&mut self.transport).await,
                ResponseShape::Identity => {
                    self.session.classify_identity(&mut self.transport).await
                }
            };
            if !self.session.is_outstanding() {
                break;
            }

            attempts = attempts.saturating_add(1);
            if self.drain.exhausted(attempts) {
                warn!(attempts, "no response received; dropping connection");
                self.transport.disconnect().await;
                self.session.clear_outstanding();
                return Outcome::NoData;
            }
            if !self.drain.backoff.is_zero() {
                sleep(self.drain.backoff).await;
            }
        }

        outcome
    }
}

fn with_markup(params: Params, reply_markup: Option<&Value>) -> Params {
    match reply_markup {
        Some(markup) if !is_empty_markup(markup) => params.json("reply_markup", markup.clone()),
        _ => params,
    }
}

fn is_empty_markup(markup: &Value) -> bool {
    match markup {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::manual::ManualClock, domain::UserId, transport::fake::FakeTransport};

    fn bot(replies: &[Value]) -> Bot<FakeTransport, ManualClock> {
        Bot::with_parts(
            Session::new("T1").unwrap(),
            FakeTransport::replying(replies),
            ManualClock::at(0),
            DrainPolicy {
                max_attempts: Some(5),
                backoff: Duration::ZERO,
            },
        )
    }

    fn sent_message(message_id: i32) -> Value {
        json!({"ok": true, "result": {
            "message_id": message_id,
            "from": {"id": 1, "is_bot": true, "first_name": "Echo"},
            "chat": {"id": 42},
            "date": 1000,
            "text": "hi"
        }})
    }

    #[tokio::test]
    async fn send_message_returns_created_id() {
        let mut b = bot(&[sent_message(3)]);

        let id = b.send_message(ChatId(42), "hi", None).await;

        assert_eq!(id, Some(MessageId(3)));
        assert_eq!(b.transport().last_body(), json!({"chat_id": 42, "text": "hi"}));
        assert!(!b.session().is_outstanding());
    }

    #[tokio::test]
    async fn send_message_embeds_markup() {
        let mut b = bot(&[sent_message(4)]);
        let keyboard = json!({"inline_keyboard": [[{"text": "Yes", "callback_data": "y"}]]});

        assert!(b
            .send_message(ChatId(42), "pick", Some(&keyboard))
            .await
            .is_some());
        assert_eq!(b.transport().last_body()["reply_markup"], keyboard);
    }

    #[tokio::test]
    async fn empty_markup_is_omitted() {
        let mut b = bot(&[sent_message(4)]);
        b.send_message(ChatId(42), "plain", Some(&json!({}))).await;
        assert!(b.transport().last_body().get("reply_markup").is_none());
    }

    #[tokio::test]
    async fn rejected_send_returns_none() {
        let mut b = bot(&[json!({"ok": false, "error_code": 400, "description": "chat not found"})]);
        assert_eq!(b.send_message(ChatId(42), "hi", None).await, None);
    }

    #[tokio::test]
    async fn send_without_token_returns_none() {
        let mut b = Bot::with_parts(
            Session::unauthenticated(),
            FakeTransport::default(),
            ManualClock::at(0),
            DrainPolicy::default(),
        );
        assert_eq!(b.send_message(ChatId(42), "hi", None).await, None);
        assert!(b.transport().posts.is_empty());
    }

    #[tokio::test]
    async fn edit_message_text_sends_ids() {
        let mut b = bot(&[sent_message(7)]);

        assert!(b.edit_message_text(ChatId(42), MessageId(7), "edited", None).await);
        assert_eq!(
            b.transport().last_body(),
            json!({"chat_id": 42, "message_id": 7, "text": "edited"})
        );
    }

    #[tokio::test]
    async fn delete_message_accepts_bare_true() {
        let mut b = bot(&[json!({"ok": true, "result": true})]);

        assert!(b.delete_message(ChatId(-1001234567890), MessageId(7)).await);
        assert_eq!(
            b.transport().last_body(),
            json!({"chat_id": -1001234567890i64, "message_id": 7})
        );
    }

    #[tokio::test]
    async fn answer_callback_query_shapes_payload() {
        let mut b = bot(&[
            json!({"ok": true, "result": true}),
            json!({"ok": true, "result": true}),
        ]);

        assert!(b.answer_callback_query("q1", None, true).await);
        assert_eq!(b.transport().last_body(), json!({"callback_query_id": "q1"}));

        assert!(b.answer_callback_query("q2", Some("done"), true).await);
        assert_eq!(
            b.transport().last_body(),
            json!({"callback_query_id": "q2", "text": "done", "show_alert": true})
        );
    }

    #[tokio::test]
    async fn answer_callback_query_needs_an_id() {
        let mut b = bot(&[]);
        assert!(!b.answer_callback_query("", Some("x"), false).await);
        assert!(b.transport().posts.is_empty());
    }

    #[tokio::test]
    async fn remove_reply_keyboard_sends_markup() {
        let mut b = bot(&[sent_message(8)]);

        assert!(b.remove_reply_keyboard(ChatId(42), "bye", true).await);
        assert_eq!(
            b.transport().last_body()["reply_markup"],
            json!({"remove_keyboard": true, "selective": true})
        );
    }

    #[tokio::test]
    async fn get_me_returns_profile() {
        let mut b = bot(&[json!({"ok": true, "result": {
            "id": 123, "is_bot": true, "first_name": "Echo", "username": "echo_bot"
        }})]);

        let me = b.get_me().await.unwrap();
        assert_eq!(me.id, UserId(123));
        assert_eq!(me.username.as_deref(), Some("echo_bot"));
        assert_eq!(b.transport().posts[0].0.command, Command::GetMe);
        assert_eq!(b.transport().last_body(), json!({}));
    }

    #[tokio::test]
    async fn test_connection_fails_on_rejection() {
        let mut b = bot(&[json!({"ok": false, "error_code": 401, "description": "Unauthorized"})]);
        assert!(!b.test_connection().await);
    }

    #[tokio::test]
    async fn get_new_message_polls_and_classifies() {
        let mut b = bot(&[json!({"ok": true, "result": [{
            "update_id": 7,
            "message": {"message_id": 1, "chat": {"id": 99}, "date": 1000, "text": "hello", "from": {"id": 5}}
        }]})]);

        let out = b.get_new_message().await;

        assert!(matches!(out, Outcome::Text(ref m) if m.text == "hello"));
        assert_eq!(b.session().cursor(), 8);
        assert_eq!(b.transport().last_body()["offset"], json!(0));
    }

    #[tokio::test]
    async fn throttled_poll_is_no_data_without_transport_calls() {
        let mut b = bot(&[json!({"ok": true, "result": []})]);
        assert_eq!(b.get_new_message().await, Outcome::NoData);
        assert_eq!(b.transport().posts.len(), 1);

        assert_eq!(b.get_new_message().await, Outcome::NoData);
        assert_eq!(b.transport().posts.len(), 1);
    }

    #[tokio::test]
    async fn drain_gives_up_and_disconnects() {
        // Post succeeds but nothing is ever buffered.
        let mut b = bot(&[]);

        assert_eq!(b.send_message(ChatId(42), "hi", None).await, None);

        let t = b.transport();
        assert_eq!(t.receives, 5);
        assert_eq!(t.disconnects, 1);
        assert!(!b.session().is_outstanding());
    }

    #[tokio::test]
    async fn next_command_after_lost_connection_proceeds() {
        let mut b = bot(&[]);
        assert_eq!(b.send_message(ChatId(42), "lost", None).await, None);

        b.transport_mut().connected = true;
        b.transport_mut().replies.push_back(sent_message(9).to_string().into_bytes());

        assert_eq!(b.send_message(ChatId(42), "again", None).await, Some(MessageId(9)));
        assert_eq!(b.transport().posts.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn late_reply_is_drained_with_backoff() {
        let mut transport = FakeTransport::replying(&[sent_message(5)]);
        transport.reply_delay = 3;
        let mut b = Bot::with_parts(
            Session::new("T1").unwrap(),
            transport,
            ManualClock::at(0),
            DrainPolicy {
                max_attempts: Some(10),
                backoff: Duration::from_millis(50),
            },
        );
        let start = tokio::time::Instant::now();

        assert_eq!(b.send_message(ChatId(42), "hi", None).await, Some(MessageId(5)));

        assert!(start.elapsed() >= Duration::from_millis(150));
        assert_eq!(b.transport().receives, 4);
        assert_eq!(b.transport().disconnects, 0);
    }

    #[tokio::test]
    async fn unbounded_drain_outlasts_default_budget() {
        let mut transport = FakeTransport::replying(&[sent_message(6)]);
        transport.reply_delay = 2_000;
        let mut b = Bot::with_parts(
            Session::new("T1").unwrap(),
            transport,
            ManualClock::at(0),
            DrainPolicy {
                max_attempts: None,
                backoff: Duration::ZERO,
            },
        );

        assert_eq!(b.send_message(ChatId(42), "hi", None).await, Some(MessageId(6)));

        let (session, transport, _) = b.into_parts();
        assert!(!session.is_outstanding());
        assert_eq!(transport.receives, 2_001);
        assert_eq!(transport.disconnects, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn blocking_poll_waits_one_interval() {
        let mut b = bot(&[json!({"ok": true, "result": [{
            "update_id": 3,
            "message": {"message_id": 1, "chat": {"id": 99}, "text": "late", "from": {"id": 5}}
        }]})]);
        let start = tokio::time::Instant::now();

        let out = b.get_new_message_blocking().await;

        assert!(start.elapsed() >= Duration::from_millis(3000));
        assert!(matches!(out, Outcome::Text(ref m) if m.text == "late"));
        assert_eq!(b.transport().posts.len(), 1);
    }

    #[tokio::test]
    async fn replaced_token_is_used_for_next_command() {
        let mut b = bot(&[sent_message(2)]);
        b.session_mut().set_token("T2").unwrap();

        assert!(b.send_message(ChatId(42), "hi", None).await.is_some());
        assert_eq!(b.transport().posts[0].0.path(), "/botT2/sendMessage");
    }

    #[tokio::test]
    async fn connection_drop_mid_drain_is_no_data() {
        let mut session = Session::new("T1").unwrap();
        let mut transport = FakeTransport::default();
        session
            .try_send(&mut transport, Command::GetMe, &Params::new())
            .await
            .unwrap();
        transport.connected = false;

        let mut b = Bot::with_parts(session, transport, ManualClock::at(0), DrainPolicy::default());

        assert_eq!(b.drain().await, Outcome::NoData);
        assert!(!b.session().is_outstanding());
        assert_eq!(b.transport().receives, 0);
        assert_eq!(b.transport().disconnects, 0);
    }
}
