//! Inbound webhook parsing
//!
//! Normalizes a raw invocation payload (a Telegram update, or the same update
//! wrapped by an HTTP gateway under `body`) into an [`InboundMessage`].

use base64::Engine;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Username used when the sender has none
pub const UNKNOWN_USERNAME: &str = "Unknown";

/// Errors that can occur while parsing an invocation payload
#[derive(Debug, Error)]
pub enum ParseError {
    /// The envelope has no `message` object
    #[error("No message found in body")]
    MissingMessage,
    /// The message lacks a field the relay needs
    #[error("Malformed message: {0}")]
    MalformedMessage(String),
    /// The transport wrapper's `body` could not be decoded
    #[error("Invalid request body: {0}")]
    Body(String),
}

impl ParseError {
    /// Whether this error is a client-side rejection of the webhook data.
    ///
    /// An undecodable transport body is not a rejection: it is handled as a
    /// processing failure.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::MissingMessage | Self::MalformedMessage(_))
    }
}

/// A chat message extracted from a webhook delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Chat the message was posted in
    pub chat_id: i64,
    /// Sender's user ID
    pub user_id: i64,
    /// Sender's username, or [`UNKNOWN_USERNAME`]
    pub username: String,
    /// Message text
    pub text: String,
}

impl InboundMessage {
    /// Agent session identifier: the sender's user ID as a string, so one user
    /// keeps one conversation context across chats.
    #[must_use]
    pub fn session_id(&self) -> String {
        self.user_id.to_string()
    }
}

#[derive(Deserialize)]
struct WireMessage {
    chat: Option<WireChat>,
    from: Option<WireUser>,
    text: Option<String>,
}

#[derive(Deserialize)]
struct WireChat {
    id: Option<i64>,
}

#[derive(Deserialize)]
struct WireUser {
    id: Option<i64>,
    username: Option<String>,
}

/// Parse an invocation payload into an [`InboundMessage`].
///
/// # Errors
///
/// Returns `ParseError::MissingMessage` if the envelope has no message,
/// `ParseError::MalformedMessage` if chat id, user id or text is missing, and
/// `ParseError::Body` if the transport wrapper cannot be decoded.
pub fn parse_event(event: Value) -> Result<InboundMessage, ParseError> {
    let envelope = unwrap_transport(event)?;
    parse_envelope(&envelope)
}

/// Strip the HTTP gateway wrapper, if any.
///
/// A payload with a `body` field is a gateway event: the body is a JSON string
/// (optionally base64 encoded) or an already decoded object. Any other payload
/// is the update itself.
///
/// # Errors
///
/// Returns `ParseError::Body` if the body cannot be decoded or does not
/// decode to a JSON object.
pub fn unwrap_transport(event: Value) -> Result<Value, ParseError> {
    let Value::Object(mut fields) = event else {
        return Ok(event);
    };

    let Some(body) = fields.remove("body") else {
        return Ok(Value::Object(fields));
    };

    match body {
        Value::String(raw) => {
            let base64_encoded = fields
                .get("isBase64Encoded")
                .and_then(Value::as_bool)
                .unwrap_or(false);

            let bytes = if base64_encoded {
                base64::engine::general_purpose::STANDARD
                    .decode(raw.as_bytes())
                    .map_err(|e| ParseError::Body(e.to_string()))?
            } else {
                raw.into_bytes()
            };

            match serde_json::from_slice(&bytes) {
                Ok(object @ Value::Object(_)) => Ok(object),
                Ok(other) => Err(ParseError::Body(format!(
                    "decoded body is {}, expected an object",
                    json_type_name(&other)
                ))),
                Err(e) => Err(ParseError::Body(e.to_string())),
            }
        }
        object @ Value::Object(_) => Ok(object),
        other => Err(ParseError::Body(format!(
            "expected a JSON string or object, got {}",
            json_type_name(&other)
        ))),
    }
}

fn parse_envelope(envelope: &Value) -> Result<InboundMessage, ParseError> {
    let message = match envelope.get("message") {
        Some(Value::Null) | None => return Err(ParseError::MissingMessage),
        Some(message) => message,
    };

    let wire = WireMessage::deserialize(message)
        .map_err(|e| ParseError::MalformedMessage(e.to_string()))?;

    let chat_id = wire
        .chat
        .and_then(|chat| chat.id)
        .ok_or_else(|| ParseError::MalformedMessage("missing chat id".into()))?;
    let from = wire
        .from
        .ok_or_else(|| ParseError::MalformedMessage("missing sender".into()))?;
    let user_id = from
        .id
        .ok_or_else(|| ParseError::MalformedMessage("missing user id".into()))?;
    let text = wire
        .text
        .ok_or_else(|| ParseError::MalformedMessage("missing text".into()))?;

    Ok(InboundMessage {
        chat_id,
        user_id,
        username: from
            .username
            .unwrap_or_else(|| UNKNOWN_USERNAME.to_string()),
        text,
    })
}

const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn update() -> Value {
        json!({
            "update_id": 10,
            "message": {
                "message_id": 1,
                "chat": { "id": 555, "type": "private" },
                "from": { "id": 42, "is_bot": false, "username": "reno_fan" },
                "text": "hello"
            }
        })
    }

    #[test]
    fn test_parse_direct_update() -> Result<(), ParseError> {
        let message = parse_event(update())?;
        assert_eq!(
            message,
            InboundMessage {
                chat_id: 555,
                user_id: 42,
                username: "reno_fan".to_string(),
                text: "hello".to_string(),
            }
        );
        assert_eq!(message.session_id(), "42");
        Ok(())
    }

    #[test]
    fn test_parse_wrapped_string_body() -> Result<(), ParseError> {
        let event = json!({ "body": update().to_string(), "headers": {} });
        assert_eq!(parse_event(event)?.text, "hello");
        Ok(())
    }

    #[test]
    fn test_parse_wrapped_base64_body() -> Result<(), ParseError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(update().to_string());
        let event = json!({ "body": encoded, "isBase64Encoded": true });
        assert_eq!(parse_event(event)?.chat_id, 555);
        Ok(())
    }

    #[test]
    fn test_parse_wrapped_object_body() -> Result<(), ParseError> {
        let event = json!({ "body": update() });
        assert_eq!(parse_event(event)?.user_id, 42);
        Ok(())
    }

    #[test]
    fn test_username_defaults_when_absent() -> Result<(), ParseError> {
        let mut event = update();
        event["message"]["from"] = json!({ "id": 42 });
        assert_eq!(parse_event(event)?.username, UNKNOWN_USERNAME);
        Ok(())
    }

    #[test]
    fn test_missing_message_is_rejection() {
        let err = parse_event(json!({ "update_id": 1, "edited_message": {} }));
        assert!(matches!(err, Err(ParseError::MissingMessage)));

        let err = parse_event(json!({ "body": "{\"update_id\": 1}" }));
        assert!(matches!(err, Err(ParseError::MissingMessage)));
    }

    #[test]
    fn test_missing_user_id_is_rejection() {
        let mut event = update();
        event["message"]["from"] = json!({ "username": "ghost" });
        let err = parse_event(event).err();
        assert!(err.as_ref().is_some_and(ParseError::is_rejection));
        assert!(err.is_some_and(|e| e.to_string().contains("user id")));
    }

    #[test]
    fn test_non_text_message_is_rejection() {
        let mut event = update();
        event["message"]
            .as_object_mut()
            .map(|message| message.remove("text"));
        assert!(matches!(
            parse_event(event),
            Err(ParseError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_undecodable_body_is_not_rejection() {
        let err = parse_event(json!({ "body": "{not json" })).err();
        assert!(matches!(err, Some(ParseError::Body(_))));
        assert!(!err.is_some_and(|e| e.is_rejection()));

        let err = parse_event(json!({ "body": null })).err();
        assert!(matches!(err, Some(ParseError::Body(_))));
    }

    #[test]
    fn test_body_decoding_to_non_object_is_not_rejection() {
        for raw in ["null", "[]", "5", "\"message\""] {
            let err = parse_event(json!({ "body": raw })).err();
            assert!(
                matches!(err, Some(ParseError::Body(_))),
                "body {raw} gave {err:?}"
            );
        }
    }
}
