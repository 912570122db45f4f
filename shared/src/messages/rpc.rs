//! Automation client ↔ Gateway calls
//!
//! Every call travels inside an [`RpcEnvelope`] carrying a correlation id.
//! The gateway echoes the id on the reply so concurrent callers can never
//! mistake each other's results.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Correlated request or response frame
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RpcEnvelope<T> {
    pub id: Uuid,
    #[serde(flatten)]
    pub body: T,
}

impl<T> RpcEnvelope<T> {
    pub fn new(body: T) -> Self {
        Self { id: Uuid::new_v4(), body }
    }

    pub fn reply<R>(&self, body: R) -> RpcEnvelope<R> {
        RpcEnvelope { id: self.id, body }
    }
}

/// Remote-callable operations exposed by the gateway
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum RpcCall {
    Ping,
    CreateDocument {
        name: String,
    },
    CreateObject {
        doc: String,
        #[serde(rename = "type")]
        type_id: String,
        name: String,
        #[serde(default)]
        properties: Map<String, Value>,
    },
    EditObject {
        doc: String,
        name: String,
        #[serde(default)]
        properties: Map<String, Value>,
    },
    DeleteObject {
        doc: String,
        name: String,
    },
    ExecuteCode {
        source: String,
    },
    GetObjects {
        doc: String,
    },
    GetObject {
        doc: String,
        name: String,
    },
    ListDocuments,
    GetActiveScreenshot {
        #[serde(default = "default_view")]
        view: String,
    },
    RecomputeDocument {
        doc: String,
    },
}

fn default_view() -> String {
    "Isometric".to_string()
}

impl RpcCall {
    /// Wire name of the method, used in logs and error messages
    pub fn method(&self) -> &'static str {
        match self {
            RpcCall::Ping => "ping",
            RpcCall::CreateDocument { .. } => "create_document",
            RpcCall::CreateObject { .. } => "create_object",
            RpcCall::EditObject { .. } => "edit_object",
            RpcCall::DeleteObject { .. } => "delete_object",
            RpcCall::ExecuteCode { .. } => "execute_code",
            RpcCall::GetObjects { .. } => "get_objects",
            RpcCall::GetObject { .. } => "get_object",
            RpcCall::ListDocuments => "list_documents",
            RpcCall::GetActiveScreenshot { .. } => "get_active_screenshot",
            RpcCall::RecomputeDocument { .. } => "recompute_document",
        }
    }
}

/// Result of a remote call
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RpcReply {
    Pong(bool),
    Outcome(Outcome),
    Objects(Vec<ObjectPayload>),
    Object(Option<ObjectPayload>),
    Documents(Vec<String>),
    /// Base64-encoded PNG, or null when no view is available
    Screenshot(Option<String>),
}

impl RpcReply {
    pub fn failure(error: impl Into<String>) -> Self {
        RpcReply::Outcome(Outcome::failure(error))
    }

    /// True unless the reply is a failed outcome
    pub fn is_success(&self) -> bool {
        !matches!(self, RpcReply::Outcome(outcome) if !outcome.success)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RpcReply::Pong(_) => "pong",
            RpcReply::Outcome(_) => "outcome",
            RpcReply::Objects(_) => "objects",
            RpcReply::Object(_) => "object",
            RpcReply::Documents(_) => "documents",
            RpcReply::Screenshot(_) => "screenshot",
        }
    }
}

/// The `{success, ...|error}` shape returned by mutating calls
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Outcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Outcome {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn document(name: impl Into<String>) -> Self {
        Self {
            success: true,
            document_name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn object(name: impl Into<String>) -> Self {
        Self {
            success: true,
            object_name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Opaque description of one host object
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ObjectPayload {
    pub name: String,
    #[serde(rename = "type")]
    pub type_id: String,
    pub label: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_wire_shape() {
        let call = RpcEnvelope::new(RpcCall::CreateObject {
            doc: "Part".to_string(),
            type_id: "Part::Box".to_string(),
            name: "Foo".to_string(),
            properties: json!({"Length": 10}).as_object().cloned().unwrap(),
        });

        let value = serde_json::to_value(&call).unwrap();
        assert_eq!(value["method"], "create_object");
        assert_eq!(value["params"]["type"], "Part::Box");
        assert_eq!(value["params"]["properties"]["Length"], 10);
        assert!(value["id"].is_string());

        let back: RpcEnvelope<RpcCall> = serde_json::from_value(value).unwrap();
        assert_eq!(back, call);
    }

    #[test]
    fn test_unit_calls_parse_without_params() {
        let call: RpcEnvelope<RpcCall> = serde_json::from_value(json!({
            "id": "6f1c1b5e-8b7e-4c3e-9d51-0c4a3f0f2a11",
            "method": "ping"
        }))
        .unwrap();
        assert_eq!(call.body, RpcCall::Ping);
    }

    #[test]
    fn test_screenshot_view_defaults_to_isometric() {
        let call: RpcCall = serde_json::from_value(json!({
            "method": "get_active_screenshot",
            "params": {}
        }))
        .unwrap();
        assert_eq!(
            call,
            RpcCall::GetActiveScreenshot {
                view: "Isometric".to_string()
            }
        );
    }

    #[test]
    fn test_failed_outcome_omits_empty_fields() {
        let reply = RpcReply::failure("Document 'Nope' not found");
        assert!(!reply.is_success());

        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(
            value,
            json!({"kind": "outcome", "value": {"success": false, "error": "Document 'Nope' not found"}})
        );
    }

    #[test]
    fn test_reply_echoes_request_id() {
        let request = RpcEnvelope::new(RpcCall::ListDocuments);
        let response = request.reply(RpcReply::Documents(vec!["Unnamed".to_string()]));
        assert_eq!(request.id, response.id);
    }
}
