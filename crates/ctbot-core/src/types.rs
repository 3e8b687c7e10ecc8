use chrono::{DateTime, Utc};

use crate::domain::{ChatId, MessageId, UserId};

/// Result of classifying one response from the bot API.
///
/// `NoData` covers every failure: nothing buffered yet, lost connection,
/// malformed JSON, `ok: false`, an empty update batch, or an update shape this
/// client does not handle.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    NoData,
    Ack(Ack),
    Text(TextMessage),
    Location(LocationMessage),
    Contact(ContactMessage),
    CallbackQuery(CallbackQuery),
    UserProfile(UserProfile),
}

impl Outcome {
    pub fn is_no_data(&self) -> bool {
        matches!(self, Outcome::NoData)
    }

    pub fn is_ack(&self) -> bool {
        matches!(self, Outcome::Ack(_))
    }
}

/// Author of a message or callback query.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Sender {
    pub id: UserId,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Chat (private, group, channel) a message belongs to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Chat {
    pub id: ChatId,
    pub title: Option<String>,
}

/// Fields shared by every message-shaped outcome.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageMeta {
    pub message_id: MessageId,
    pub sender: Sender,
    pub chat: Chat,
    /// Unix timestamp, seconds.
    pub date: i32,
}

impl MessageMeta {
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(i64::from(self.date), 0)
    }
}

/// A command acknowledgement.
///
/// `message` is set when the command echoed the message it created or edited;
/// it is `None` for bare `"result": true` acknowledgements.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Ack {
    pub message: Option<MessageMeta>,
    pub text: Option<String>,
}

impl Ack {
    pub fn message_id(&self) -> Option<MessageId> {
        self.message.as_ref().map(|m| m.message_id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextMessage {
    pub meta: MessageMeta,
    pub text: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LocationMessage {
    pub meta: MessageMeta,
    pub location: Location,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Contact {
    pub user_id: UserId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
    pub vcard: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContactMessage {
    pub meta: MessageMeta,
    pub contact: Contact,
}

/// An inline keyboard button press.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallbackQuery {
    /// Opaque id, needed to answer the query.
    pub id: String,
    pub sender: Sender,
    pub data: Option<String>,
    pub chat_instance: Option<String>,

    // The message the button was attached to.
    pub message_id: MessageId,
    pub message_text: Option<String>,
    pub message_date: i32,
    pub chat: Option<Chat>,
}

/// Identity of the bot itself, as returned by `getMe`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserProfile {
    pub id: UserId,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub is_bot: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sent_at_converts_unix_seconds() {
        let meta = MessageMeta {
            date: 1_000,
            ..MessageMeta::default()
        };
        let ts = meta.sent_at().unwrap();
        assert_eq!(ts.timestamp(), 1_000);
    }

    #[test]
    fn bare_ack_has_no_message_id() {
        assert_eq!(Ack::default().message_id(), None);
    }
}
