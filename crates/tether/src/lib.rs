//! # Tether
//!
//! Transparent remote-object proxies over asynchronous message channels.
//!
//! One side [`expose`]s a local [`Object`] on an [`Endpoint`]; the other side
//! [`wrap`]s its end of the channel into a [`Remote`] proxy. Reading a
//! property, assigning, calling and constructing through the proxy become
//! request messages, and the results (or thrown failures) come back as
//! correlated responses.
//!
//! ```no_run
//! use tether::{expose, wrap, Function, MessageChannel, Record, Value};
//! use std::sync::Arc;
//!
//! # async fn demo() -> tether::Result<()> {
//! let api = Record::new().with(
//!     "greet",
//!     Value::Object(Arc::new(Function::sync("greet", |args| {
//!         let name = args.first().and_then(|a| a.as_data()?.as_str().map(str::to_string));
//!         Ok(Value::from(format!("Hello {}", name.unwrap_or_default())))
//!     }))),
//! );
//!
//! let (server, client) = MessageChannel::new().into_ports();
//! let _exposure = expose(api, server);
//! let remote = wrap(client);
//!
//! let greeting = remote.get("greet").call(vec![Value::from("World")]).await?;
//! assert_eq!(greeting.as_data(), Some(&serde_json::json!("Hello World")));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use tether_proto as proto;

/// Error types for the Tether library
pub mod error;

/// Values that cross the proxy boundary
pub mod value;

/// Local objects reachable through an exposure
pub mod object;

/// The endpoint abstraction messages travel over
pub mod endpoint;

/// In-process message channels with transferable ports
pub mod channel;

/// Endpoint over a pair of async byte streams
pub mod stream;

/// Named transfer handlers
pub mod registry;

/// Conversion between values and wire values
pub mod codec;

/// Request/response correlation
pub mod correlation;

/// Serving a local object on an endpoint
pub mod expose;

/// Proxies to remote objects
pub mod remote;

pub use channel::{MessageChannel, Port};
pub use codec::{Codec, Transfers};
pub use correlation::Correlator;
pub use endpoint::{Endpoint, Envelope, Listener, ListenerId, ListenerSet};
pub use error::ProxyError;
pub use expose::{expose, Exposer, Exposure};
pub use object::{Class, Function, Object, Record};
pub use registry::{ProxyHandler, Registry, ThrowHandler, TransferHandler, PROXY_HANDLER, THROW_HANDLER};
pub use remote::{wrap, Remote, Wrap};
pub use stream::StreamEndpoint;
pub use tether_proto::{ErrorDetails, Thrown};
pub use value::{proxy, transfer, Transfer, Value};

/// Result type alias for Tether operations
pub type Result<T> = std::result::Result<T, ProxyError>;
