//! Thrown failures and their wire shape

use crate::ProtocolError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Error-shaped failure details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Error class name, e.g. `TypeError`
    pub name: String,
    /// Human-readable message
    pub message: String,
    /// Captured stack or backtrace text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorDetails {
    /// Create error details with the given name
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    /// Attach a stack trace
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

/// A failure raised while performing an operation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Thrown {
    /// An Error-shaped failure
    #[error("{0}")]
    Error(ErrorDetails),

    /// Any other thrown value, carried unchanged
    #[error("uncaught value: {0}")]
    Value(serde_json::Value),
}

/// `{isError, value}` as exchanged by the throw handler
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SerializedThrown {
    is_error: bool,
    value: serde_json::Value,
}

impl Thrown {
    /// Plain `Error` with a message
    pub fn error(message: impl Into<String>) -> Self {
        Self::named("Error", message)
    }

    /// `TypeError` with a message
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::named("TypeError", message)
    }

    /// Error-shaped failure with a custom name
    pub fn named(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error(ErrorDetails::new(name, message))
    }

    /// Throw an arbitrary value
    pub fn value(value: impl Into<serde_json::Value>) -> Self {
        Self::Value(value.into())
    }

    /// Error details, if Error-shaped
    pub fn details(&self) -> Option<&ErrorDetails> {
        match self {
            Self::Error(details) => Some(details),
            Self::Value(_) => None,
        }
    }

    /// Encode into the throw handler's wire representation
    pub fn to_wire(&self) -> serde_json::Value {
        match self {
            Self::Error(details) => json!({
                "isError": true,
                "value": {
                    "message": details.message,
                    "name": details.name,
                    "stack": details.stack,
                },
            }),
            Self::Value(value) => json!({
                "isError": false,
                "value": value,
            }),
        }
    }

    /// Decode the throw handler's wire representation
    pub fn from_wire(wire: serde_json::Value) -> Result<Self, ProtocolError> {
        let serialized: SerializedThrown = serde_json::from_value(wire)
            .map_err(|e| ProtocolError::Serialization(format!("Malformed thrown value: {}", e)))?;

        if serialized.is_error {
            let details = serde_json::from_value(serialized.value)
                .map_err(|e| ProtocolError::Serialization(format!("Malformed error details: {}", e)))?;
            Ok(Self::Error(details))
        } else {
            Ok(Self::Value(serialized.value))
        }
    }
}

impl From<ErrorDetails> for Thrown {
    fn from(details: ErrorDetails) -> Self {
        Self::Error(details)
    }
}
