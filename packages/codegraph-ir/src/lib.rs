//! Code Scalpel's core engine: polyglot parsing, the PDG/call-graph
//! builder, the taint analyzer, and the surgical extract/update engine
//! (spec §1 "The core"), fronted by a single tool dispatcher (component
//! C10) that binds the operation catalog in spec §6 to these components.
//!
//! Transport framing, license/tier validation, persistent configuration
//! files, and cryptographic audit logging are external collaborators
//! (spec §1 "Out of scope"); this crate exposes the hooks they need
//! (`tier_limits`, a `tier` tag on responses, a progress/audit callback)
//! without implementing them.

pub mod config;
pub mod dispatcher;
pub mod features;
pub mod pipeline;
pub mod shared;

pub use shared::models::{CodegraphError, ErrorKind, Language, Result};
