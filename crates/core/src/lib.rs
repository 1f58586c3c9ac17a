//! GhostTalk Core Types
//!
//! This crate defines the fundamental data structures used throughout
//! GhostTalk: the on-wire onion packet format, the stored-message model,
//! node records, configuration, and the shared error type.

pub mod config;
mod error;
mod packet;
mod types;

pub use config::NodeConfig;
pub use error::*;
pub use packet::*;
pub use types::*;
