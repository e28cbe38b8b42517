//! # Tether Protocol
//!
//! Wire vocabulary for the Tether remote-object protocol: request and
//! response messages, the RAW/HANDLER wire value union, the thrown-failure
//! wire shape, and a length-prefixed frame codec for byte streams.

#![warn(missing_docs)]

/// Protocol messages and wire values
pub mod message;

/// Thrown failures and their wire shape
pub mod thrown;

/// Frame structure and serialization
pub mod frame;

/// Frame codec for async streams
pub mod codec;

/// Error types for protocol operations
pub mod error;

pub use codec::FrameCodec;
pub use error::ProtocolError;
pub use frame::{Frame, FrameFlags};
pub use message::{Message, Raw, Request, Response, WireValue};
pub use thrown::{ErrorDetails, Thrown};
