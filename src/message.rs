//! Wire types for both directions of the bridge.
//!
//! Content -> host frames are plain JSON text ([`InboundFrame`]). Host ->
//! content frames ([`OutboundFrame`]) are JSON embedded in a one-line script
//! that dispatches a DOM event on the content side ([`render_script`]).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Action name of host -> content responses to correlated requests.
pub const RESPONSE_ACTION: &str = "bridgeResponse";

/// Outcome of a handler or a host call: `Ok(data)` or `Err(message)`.
pub type Reply = std::result::Result<Value, String>;

/// Raw content -> host frame, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundFrame {
    pub protocol: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(
        rename = "requestId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub request_id: Option<String>,
    pub timestamp: i64,
    #[serde(rename = "__token", default)]
    pub token: String,
    #[serde(rename = "__nonce", default)]
    pub nonce: String,
}

/// A validated inbound message. The token has already been checked and dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub action: String,
    pub payload: Value,
    pub request_id: Option<String>,
    pub timestamp: i64,
    pub nonce: String,
}

/// Host -> content notification or response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundFrame {
    pub protocol: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    pub timestamp: i64,
}

/// Payload of a [`RESPONSE_ACTION`] frame, in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeResponse {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BridgeResponse {
    pub fn from_reply(request_id: impl Into<String>, reply: Reply) -> Self {
        let request_id = request_id.into();
        match reply {
            Ok(data) => Self {
                request_id,
                success: true,
                data: Some(data),
                error: None,
            },
            Err(error) => Self {
                request_id,
                success: false,
                data: None,
                error: Some(error),
            },
        }
    }

    pub fn into_reply(self) -> Reply {
        if self.success {
            Ok(self.data.unwrap_or(Value::Null))
        } else {
            Err(self
                .error
                .unwrap_or_else(|| "request failed".to_string()))
        }
    }
}

/// Wrap serialized frame JSON in a script that re-dispatches it as a
/// `CustomEvent` on the content side.
///
/// JSON is a valid JS expression except for raw U+2028/U+2029 in strings,
/// which older engines treat as line terminators; those are escaped.
///
/// ```
/// use webview_bridge::message::render_script;
///
/// let js = render_script(r#"{"action":"ping"}"#, "nativeMessage");
/// assert_eq!(
///     js,
///     r#"window.dispatchEvent(new CustomEvent("nativeMessage",{detail:{"action":"ping"}}));"#
/// );
/// ```
pub fn render_script(frame_json: &str, event_name: &str) -> String {
    let body = frame_json
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029");
    // Event names come from config; serialize to get a properly quoted literal.
    let event = serde_json::to_string(event_name).unwrap_or_else(|_| "\"\"".to_string());
    format!("window.dispatchEvent(new CustomEvent({event},{{detail:{body}}}));")
}
