//! Assistance object envelope and parameter types.
//!
//! Field names follow the backend's camelCase wire format.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// WELL-KNOWN PARAMETER KEYS
// ============================================================================

/// Parameter keys with protocol-level meaning.
pub mod keys {
    /// Plain chat text.
    pub const MESSAGE: &str = "message";
    /// UI feature toggle command.
    pub const OPERATION: &str = "operation";
    /// Workflow phase/status progress for an assistance instance.
    pub const STATE_UPDATE: &str = "state_update";
    /// Acknowledgement counterpart of a state update.
    pub const STATE_UPDATE_RESPONSE: &str = "state_update_response";
    /// Group membership announcement.
    pub const RELATED_USERS: &str = "related_users";
    /// Group membership announcement from an earlier protocol revision.
    pub const GROUP: &str = "group";
    /// Solution text shared by a peer.
    pub const PEER_SOLUTION: &str = "peer_solution";
    /// Previously submitted solution echoed back by the backend.
    pub const SOLUTION_RESPONSE: &str = "solution_response";
    /// Notes template pushed by the backend.
    pub const SOLUTION_TEMPLATE: &str = "solution_template";
    /// Notes text sent by the client.
    pub const NOTES: &str = "notes";
    /// Selectable answer options.
    pub const OPTIONS: &str = "options";
}

// ============================================================================
// PARAMETER
// ============================================================================

/// One key/value entry in an assistance object's parameter list.
///
/// Values are schema-free JSON interpreted ad hoc by key. Parameter order
/// is significant: classification picks the last non-`message` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistanceParameter {
    pub key: String,
    pub value: Value,
}

impl AssistanceParameter {
    /// Create a parameter with an arbitrary JSON value.
    pub fn new(key: &str, value: Value) -> Self {
        Self {
            key: key.to_string(),
            value,
        }
    }

    /// Create a parameter holding a plain string value.
    pub fn text(key: &str, value: &str) -> Self {
        Self::new(key, Value::String(value.to_string()))
    }
}

// ============================================================================
// ASSISTANCE OBJECT
// ============================================================================

/// Message envelope exchanged with the assistance backend.
///
/// Every field is optional on the wire; partial objects must flow through
/// the client without panicking.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssistanceObject {
    /// Assistance instance id (a running collaboration/workflow).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub a_id: Option<String>,
    /// Assistance object id within the instance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ao_id: Option<String>,
    /// Globally unique message id, when the backend assigns one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Creation time as sent by the backend: an ISO-ish string or a
    /// `[year, month, day, hour, minute, second, nanos]` array.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
    /// Type key embedded directly by the backend, when known up front.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assistance_type: Option<String>,
    /// Classification derived at ingestion. Never transmitted by the
    /// backend, but kept in snapshots so a restore preserves it.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    /// Ordered parameter list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<AssistanceParameter>>,
}

impl AssistanceObject {
    /// Create an empty envelope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the assistance instance id.
    pub fn with_a_id(mut self, a_id: &str) -> Self {
        self.a_id = Some(a_id.to_string());
        self
    }

    /// Set the assistance object id.
    pub fn with_ao_id(mut self, ao_id: &str) -> Self {
        self.ao_id = Some(ao_id.to_string());
        self
    }

    /// Set the message id.
    pub fn with_message_id(mut self, message_id: &str) -> Self {
        self.message_id = Some(message_id.to_string());
        self
    }

    /// Set the backend timestamp.
    pub fn with_timestamp(mut self, timestamp: Value) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Set the embedded type key.
    pub fn with_assistance_type(mut self, type_key: &str) -> Self {
        self.assistance_type = Some(type_key.to_string());
        self
    }

    /// Set the parameter list.
    pub fn with_parameters(mut self, parameters: Vec<AssistanceParameter>) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// True if any parameter carries the given key.
    pub fn has_key(&self, key: &str) -> bool {
        self.parameters
            .as_deref()
            .map(|params| params.iter().any(|param| param.key == key))
            .unwrap_or(false)
    }

    /// Borrow the value of the first parameter matching `key`.
    pub fn value_opt(&self, key: &str) -> Option<&Value> {
        self.parameters
            .as_deref()?
            .iter()
            .find(|param| param.key == key)
            .map(|param| &param.value)
    }

    /// Value of the first parameter matching `key`, or an empty string
    /// when the key (or the whole parameter list) is absent.
    pub fn value_of(&self, key: &str) -> Value {
        self.value_opt(key)
            .cloned()
            .unwrap_or_else(|| Value::String(String::new()))
    }
}

// ============================================================================
// RESPONSE OBJECT
// ============================================================================

/// Outbound envelope the widget sends back to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistanceResponseObject {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ao_id: Option<String>,
    pub parameters: Vec<AssistanceParameter>,
}

impl AssistanceResponseObject {
    /// Create a response addressed to an assistance object.
    pub fn new(ao_id: Option<&str>, parameters: Vec<AssistanceParameter>) -> Self {
        Self {
            ao_id: ao_id.map(str::to_string),
            parameters,
        }
    }
}
