//! Data model types shared across every component (spec §3).

pub mod error;
pub mod pir;
pub mod span;
pub mod symbol;

pub use error::{CodegraphError, ErrorKind, Result};
pub use pir::{Node, NodeId, NodeKind, Program, SourceUnitId, SymbolId};
pub use span::{Location, Span};
pub use symbol::{ExternalModuleSymbol, Language, Symbol, SymbolKind, Visibility};
