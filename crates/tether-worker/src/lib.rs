//! # Tether Worker
//!
//! The object a worker process serves to its parent.

#![warn(missing_docs)]

/// Demonstration object graph
pub mod demo;
