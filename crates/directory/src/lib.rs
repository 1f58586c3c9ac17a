//! GhostTalk Directory
//!
//! Maps Session IDs to their swarm via a consistent hash ring, keeps the
//! node registry with liveness marking, and issues the signed bootstrap
//! set new peers fetch on startup.

mod bootstrap;
mod registry;
mod ring;

pub use bootstrap::{issue_bootstrap_set, verify_bootstrap_set, BOOTSTRAP_VERSION};
pub use registry::Directory;
pub use ring::{HashRing, DEFAULT_VIRTUAL_NODES};
