use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Events delivered on the RTM socket that the bot understands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IncomingEvent {
    Hello,
    UserTyping(UserTypingEvent),
    Message(MessageEvent),
}

impl IncomingEvent {
    /// Decodes one text frame. Only the three known `type` values are
    /// accepted; everything else is a [`DecodeError`] for the caller to drop.
    pub fn decode(frame: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(frame)
            .map_err(|error| DecodeError::UnknownOrMalformedEvent(error.to_string()))?;

        let event_type = value.get("type").and_then(Value::as_str).ok_or_else(|| {
            DecodeError::UnknownOrMalformedEvent("missing string field `type`".to_owned())
        })?;

        match event_type {
            "hello" => Ok(Self::Hello),
            "user_typing" => decode_variant(value).map(Self::UserTyping),
            "message" => decode_variant(value).map(Self::Message),
            other => Err(DecodeError::UnrecognizedType { event_type: other.to_owned() }),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Hello => "hello",
            Self::UserTyping(_) => "user_typing",
            Self::Message(_) => "message",
        }
    }
}

fn decode_variant<T>(value: Value) -> Result<T, DecodeError>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_value(value)
        .map_err(|error| DecodeError::UnknownOrMalformedEvent(error.to_string()))
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct UserTypingEvent {
    pub channel: String,
    pub user: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct MessageEvent {
    pub user: String,
    pub text: String,
    #[serde(rename = "client_msg_id")]
    pub client_message_id: String,
    pub team: String,
    pub channel: String,
    #[serde(rename = "event_ts")]
    pub event_timestamp: String,
    #[serde(rename = "ts")]
    pub timestamp: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unrecognized event type `{event_type}`")]
    UnrecognizedType { event_type: String },
    #[error("unknown or malformed event: {0}")]
    UnknownOrMalformedEvent(String),
}
