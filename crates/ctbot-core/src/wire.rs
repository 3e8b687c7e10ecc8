//! Serde shapes for bot API responses.
//!
//! Every field is optional and numeric ids are read leniently: a value of the
//! wrong type or out of range reads as absent instead of failing the decode.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::{
    domain::{ChatId, MessageId, UserId},
    types::{CallbackQuery, Chat, Contact, Location, MessageMeta, Sender, UserProfile},
};

/// Top-level `{ "ok": ..., "result": ... }` envelope.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Envelope {
    pub ok: Value,
    pub result: Value,
    pub description: Option<String>,
    pub error_code: Option<i64>,
}

impl Envelope {
    /// Decode a response body. Anything but a top-level JSON object is rejected,
    /// including the `[ok, result]` sequence form serde accepts for structs.
    pub fn decode(bytes: &[u8]) -> serde_json::Result<Self> {
        match serde_json::from_slice::<Value>(bytes)? {
            body @ Value::Object(_) => serde_json::from_value(body),
            other => Err(<serde_json::Error as serde::de::Error>::custom(format!(
                "expected a response object, found {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.ok.as_bool().unwrap_or(false)
    }

    /// First entry of a `result` array; `None` for objects and scalars.
    pub fn first_update(&self) -> Option<&Value> {
        self.result.as_array().and_then(|items| items.first())
    }

    /// `result[0].update_id`, keeping track of whether the key was present.
    pub fn update_id(&self) -> UpdateId {
        match self.first_update().and_then(|u| u.get("update_id")) {
            None => UpdateId::Absent,
            Some(v) => UpdateId::Present(as_i32(v).unwrap_or(0)),
        }
    }

    /// Whether `result` carries anything: a non-empty object or array, or a
    /// bare `true` acknowledgement.
    pub fn has_result(&self) -> bool {
        match &self.result {
            Value::Object(map) => !map.is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Bool(b) => *b,
            _ => false,
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum UpdateId {
    Absent,
    Present(i32),
}

impl UpdateId {
    /// Absent and zero are deliberately the same value here: command
    /// acknowledgements and empty poll batches both route through it.
    pub fn value(self) -> i32 {
        match self {
            UpdateId::Absent => 0,
            UpdateId::Present(id) => id,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct WireUpdate {
    pub message: Option<WireMessage>,
    pub callback_query: Option<WireCallbackQuery>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct WireMessage {
    #[serde(deserialize_with = "lenient_i32")]
    pub message_id: Option<i32>,
    pub from: Option<WireUser>,
    pub chat: Option<WireChat>,
    #[serde(deserialize_with = "lenient_i32")]
    pub date: Option<i32>,
    pub text: Option<String>,
    pub location: Option<WireLocation>,
    pub contact: Option<WireContact>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct WireUser {
    #[serde(deserialize_with = "lenient_i32")]
    pub id: Option<i32>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_bot: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct WireChat {
    #[serde(deserialize_with = "lenient_i64")]
    pub id: Option<i64>,
    pub title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct WireLocation {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct WireContact {
    #[serde(deserialize_with = "lenient_i32")]
    pub user_id: Option<i32>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
    pub vcard: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct WireCallbackQuery {
    pub id: Option<String>,
    pub from: Option<WireUser>,
    pub message: Option<WireMessage>,
    pub data: Option<String>,
    pub chat_instance: Option<String>,
}

impl WireUser {
    pub fn into_sender(self) -> Sender {
        Sender {
            id: UserId(self.id.unwrap_or(0)),
            username: self.username,
            first_name: self.first_name,
            last_name: self.last_name,
        }
    }

    pub fn into_profile(self) -> UserProfile {
        UserProfile {
            id: UserId(self.id.unwrap_or(0)),
            username: self.username,
            first_name: self.first_name,
            is_bot: self.is_bot.unwrap_or(false),
        }
    }
}

impl WireChat {
    pub fn into_chat(self) -> Chat {
        Chat {
            id: ChatId(self.id.unwrap_or(0)),
            title: self.title,
        }
    }
}

impl WireMessage {
    /// Split off the header fields, leaving the kind-specific payload behind.
    pub fn take_meta(&mut self) -> MessageMeta {
        MessageMeta {
            message_id: MessageId(self.message_id.unwrap_or(0)),
            sender: self.from.take().unwrap_or_default().into_sender(),
            chat: self.chat.take().unwrap_or_default().into_chat(),
            date: self.date.unwrap_or(0),
        }
    }
}

impl WireLocation {
    pub fn into_location(self) -> Location {
        Location {
            latitude: self.latitude.unwrap_or(0.0),
            longitude: self.longitude.unwrap_or(0.0),
        }
    }
}

impl WireContact {
    pub fn into_contact(self) -> Contact {
        Contact {
            user_id: UserId(self.user_id.unwrap_or(0)),
            first_name: self.first_name,
            last_name: self.last_name,
            phone_number: self.phone_number,
            vcard: self.vcard,
        }
    }
}

impl WireCallbackQuery {
    pub fn into_callback_query(self, id: String) -> CallbackQuery {
        let mut origin = self.message.unwrap_or_default();
        let chat = origin.chat.take().map(WireChat::into_chat);
        CallbackQuery {
            id,
            sender: self.from.unwrap_or_default().into_sender(),
            data: self.data,
            chat_instance: self.chat_instance,
            message_id: MessageId(origin.message_id.unwrap_or(0)),
            message_text: origin.text,
            message_date: origin.date.unwrap_or(0),
            chat,
        }
    }
}

fn as_i32(v: &Value) -> Option<i32> {
    v.as_i64().and_then(|n| i32::try_from(n).ok())
}

fn lenient_i32<'de, D>(d: D) -> std::result::Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.as_ref().and_then(as_i32))
}

fn lenient_i64<'de, D>(d: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.as_ref().and_then(Value::as_i64))
}
