//! Types and helpers with no feature-specific behavior of their own:
//! the data model (§3), error taxonomy (§7), and small traversal utilities
//! that every front end and analysis pass reaches for.

pub mod constants;
#[macro_use]
pub mod macros;
pub mod models;
pub mod utils;
