//! Profile payloads exchanged with the profile manager API.
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the user a profile belongs to. Only `first` is mandatory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserName {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    pub first: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last: Option<String>,
}

impl UserName {
    pub fn first(first: impl Into<String>) -> Self {
        Self {
            prefix: None,
            first: first.into(),
            middle: None,
            last: None,
        }
    }
}

/// Body of the create request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRequest {
    pub name: UserName,
}

impl Default for ProfileRequest {
    /// `{"name":{"first":"Test"}}`
    fn default() -> Self {
        Self {
            name: UserName::first("Test"),
        }
    }
}

impl ProfileRequest {
    pub fn to_value(&self) -> Value {
        // A struct of strings always serializes
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A profile as the server returned it.
///
/// Kept as raw JSON: the server adds fields (`id`, timestamps, empty
/// collections) the client never interprets, and the read step compares the
/// whole document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileResponse(pub Value);

impl ProfileResponse {
    /// The server-assigned identifier as it appears in resource paths. Numeric
    /// ids are accepted too.
    pub fn id(&self) -> Option<String> {
        match self.0.get("id")? {
            Value::String(id) => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }

    pub fn into_inner(self) -> Value {
        self.0
    }
}

impl From<Value> for ProfileResponse {
    fn from(value: Value) -> Self {
        Self(value)
    }
}
