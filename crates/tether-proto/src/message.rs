//! Protocol messages and wire values

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Top-level message wrapper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Operation requested of the exposing side
    Request(Request),
    /// Reply carrying the outcome of a request
    Response(Response),
}

impl Message {
    /// Create a request message
    pub fn request(req: Request) -> Self {
        Self::Request(req)
    }

    /// Create a response message
    pub fn response(resp: Response) -> Self {
        Self::Response(resp)
    }

    /// Correlation id, if the message carries one
    pub fn request_id(&self) -> Option<Uuid> {
        match self {
            Self::Request(req) => req.id(),
            Self::Response(resp) => Some(resp.id),
        }
    }
}

/// Operation kinds, tagged on the wire by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum Request {
    /// Read the value at `path`
    Get {
        /// Correlation id
        id: Uuid,
        /// Property path from the exposed root
        #[serde(default)]
        path: Vec<String>,
    },

    /// Assign `value` to the last segment of `path`
    Set {
        /// Correlation id
        id: Uuid,
        /// Property path from the exposed root
        #[serde(default)]
        path: Vec<String>,
        /// Encoded value to assign
        value: WireValue,
    },

    /// Invoke the function at `path` with its parent as receiver
    Apply {
        /// Correlation id
        id: Uuid,
        /// Property path from the exposed root
        #[serde(default)]
        path: Vec<String>,
        /// Encoded arguments
        #[serde(rename = "argumentList", default)]
        argument_list: Vec<WireValue>,
    },

    /// Invoke the constructor at `path`
    Construct {
        /// Correlation id
        id: Uuid,
        /// Property path from the exposed root
        #[serde(default)]
        path: Vec<String>,
        /// Encoded arguments
        #[serde(rename = "argumentList", default)]
        argument_list: Vec<WireValue>,
    },

    /// Open a fresh channel onto the same exposed root
    Endpoint {
        /// Correlation id
        id: Uuid,
    },

    /// Tear down the exposing side of the channel
    Release {
        /// Correlation id
        id: Uuid,
        /// Property path of the releasing proxy
        #[serde(default)]
        path: Vec<String>,
    },

    /// Any `type` this protocol does not know about
    #[serde(other)]
    Unknown,
}

impl Request {
    /// Get the correlation id. Unknown requests have none.
    pub fn id(&self) -> Option<Uuid> {
        match self {
            Self::Get { id, .. }
            | Self::Set { id, .. }
            | Self::Apply { id, .. }
            | Self::Construct { id, .. }
            | Self::Endpoint { id }
            | Self::Release { id, .. } => Some(*id),
            Self::Unknown => None,
        }
    }

    /// Wire name of the operation
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Get { .. } => "GET",
            Self::Set { .. } => "SET",
            Self::Apply { .. } => "APPLY",
            Self::Construct { .. } => "CONSTRUCT",
            Self::Endpoint { .. } => "ENDPOINT",
            Self::Release { .. } => "RELEASE",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Path the operation applies to. ENDPOINT addresses the root.
    pub fn path(&self) -> &[String] {
        match self {
            Self::Get { path, .. }
            | Self::Set { path, .. }
            | Self::Apply { path, .. }
            | Self::Construct { path, .. }
            | Self::Release { path, .. } => path,
            Self::Endpoint { .. } | Self::Unknown => &[],
        }
    }

    /// Create a GET request
    pub fn get(path: Vec<String>) -> Self {
        Self::Get { id: Uuid::new_v4(), path }
    }

    /// Create a SET request
    pub fn set(path: Vec<String>, value: WireValue) -> Self {
        Self::Set { id: Uuid::new_v4(), path, value }
    }

    /// Create an APPLY request
    pub fn apply(path: Vec<String>, argument_list: Vec<WireValue>) -> Self {
        Self::Apply { id: Uuid::new_v4(), path, argument_list }
    }

    /// Create a CONSTRUCT request
    pub fn construct(path: Vec<String>, argument_list: Vec<WireValue>) -> Self {
        Self::Construct { id: Uuid::new_v4(), path, argument_list }
    }

    /// Create an ENDPOINT request
    pub fn endpoint() -> Self {
        Self::Endpoint { id: Uuid::new_v4() }
    }

    /// Create a RELEASE request
    pub fn release(path: Vec<String>) -> Self {
        Self::Release { id: Uuid::new_v4(), path }
    }
}

/// Reply to a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Id of the request this answers
    pub id: Uuid,
    /// Encoded result or wrapped failure
    pub value: WireValue,
}

impl Response {
    /// Create a response
    pub fn new(id: Uuid, value: WireValue) -> Self {
        Self { id, value }
    }
}

/// Transport-safe encoding of a value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum WireValue {
    /// Carried by the channel as-is
    Raw {
        /// The transportable value
        value: Raw,
    },
    /// Produced by a named transfer handler, decoded by the same handler
    Handler {
        /// Registered handler name
        name: String,
        /// Handler-specific representation
        value: serde_json::Value,
    },
}

impl WireValue {
    /// Wrap plain data
    pub fn data(value: serde_json::Value) -> Self {
        Self::Raw { value: Raw::Data(value) }
    }

    /// Reference a port moved in the same envelope
    pub fn port(id: Uuid) -> Self {
        Self::Raw { value: Raw::Port(id) }
    }

    /// Wrap handler output
    pub fn handler(name: impl Into<String>, value: serde_json::Value) -> Self {
        Self::Handler { name: name.into(), value }
    }
}

/// Values a channel transports natively
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Raw {
    /// Structured-clone data
    Data(serde_json::Value),
    /// A channel end, resolved against the envelope's transfer list
    Port(Uuid),
}
