use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_TICK_MS: u64 = 250;
pub const ECONOMY_TICK_INTERVAL: u64 = 12;
pub const NAME_PREFIX: &str = "Guest";
pub const NAME_SPAN: u32 = 10_000;

pub const REQUEST_STATE: &str = "requestState";
pub const KEY_PRESS: &str = "keyPress";

/// Messages the server writes to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "messageType", rename_all = "camelCase")]
pub enum Outbound {
    Print { content: String },
    ClearChoices,
    Choice { index: usize, label: String },
}

impl Outbound {
    pub fn print(content: impl Into<String>) -> Self {
        Outbound::Print {
            content: content.into(),
        }
    }

    pub fn choice(index: usize, label: impl Into<String>) -> Self {
        Outbound::Choice {
            index,
            label: label.into(),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Wire shape of anything a client sends. Every field is optional so that
/// malformed peers degrade to "no effect" instead of a decode failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawInbound {
    #[serde(rename = "messageType", default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub key: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    RequestState,
    KeyPress { key: String },
}

impl Inbound {
    /// Decodes a text frame. `Ok(None)` means the frame is well-formed JSON
    /// but carries nothing to act on (a key press without a key).
    pub fn decode(text: &str) -> Result<Option<Self>, serde_json::Error> {
        let raw: RawInbound = serde_json::from_str(text)?;
        Ok(Self::from_raw(raw))
    }

    pub fn from_raw(raw: RawInbound) -> Option<Self> {
        if raw.message_type.as_deref() == Some(REQUEST_STATE) {
            return Some(Inbound::RequestState);
        }

        let key = match raw.key? {
            Value::Null => return None,
            Value::String(s) => s,
            other => other.to_string(),
        };
        Some(Inbound::KeyPress { key })
    }

    pub fn encode(&self) -> String {
        let value = match self {
            Inbound::RequestState => serde_json::json!({ "messageType": REQUEST_STATE }),
            Inbound::KeyPress { key } => serde_json::json!({ "messageType": KEY_PRESS, "key": key }),
        };
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_print_wire_shape() {
        let json = Outbound::print("hello\n").encode().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["messageType"], "print");
        assert_eq!(value["content"], "hello\n");
    }

    #[test]
    fn test_outbound_clear_choices_wire_shape() {
        let json = Outbound::ClearChoices.encode().unwrap();
        assert_eq!(json, r#"{"messageType":"clearChoices"}"#);
    }

    #[test]
    fn test_outbound_choice_wire_shape() {
        let json = Outbound::choice(2, "Drop food").encode().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["messageType"], "choice");
        assert_eq!(value["index"], 2);
        assert_eq!(value["label"], "Drop food");
        assert_eq!(Outbound::decode(&json).unwrap(), Outbound::choice(2, "Drop food"));
    }

    #[test]
    fn test_request_state_decoding() {
        let msg = Inbound::decode(r#"{"messageType":"requestState"}"#).unwrap();
        assert_eq!(msg, Some(Inbound::RequestState));
    }

    #[test]
    fn test_request_state_ignores_key() {
        let msg = Inbound::decode(r#"{"messageType":"requestState","key":"1"}"#).unwrap();
        assert_eq!(msg, Some(Inbound::RequestState));
    }

    #[test]
    fn test_numeric_key_is_rendered_as_text() {
        let msg = Inbound::decode(r#"{"messageType":"keyPress","key":3}"#).unwrap();
        assert_eq!(msg, Some(Inbound::KeyPress { key: "3".to_string() }));
    }

    #[test]
    fn test_string_key_passes_through() {
        let msg = Inbound::decode(r#"{"messageType":"keyPress","key":"abc"}"#).unwrap();
        assert_eq!(msg, Some(Inbound::KeyPress { key: "abc".to_string() }));
    }

    #[test]
    fn test_key_without_message_type_still_counts() {
        let msg = Inbound::decode(r#"{"key":"0"}"#).unwrap();
        assert_eq!(msg, Some(Inbound::KeyPress { key: "0".to_string() }));
    }

    #[test]
    fn test_missing_or_null_key_is_dropped() {
        assert_eq!(Inbound::decode(r#"{"messageType":"keyPress"}"#).unwrap(), None);
        assert_eq!(
            Inbound::decode(r#"{"messageType":"keyPress","key":null}"#).unwrap(),
            None
        );
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(Inbound::decode("not json").is_err());
    }

    #[test]
    fn test_inbound_encode_decodes_back() {
        let press = Inbound::KeyPress { key: "7".to_string() };
        assert_eq!(Inbound::decode(&press.encode()).unwrap(), Some(press));
        assert_eq!(
            Inbound::decode(&Inbound::RequestState.encode()).unwrap(),
            Some(Inbound::RequestState)
        );
    }
}
