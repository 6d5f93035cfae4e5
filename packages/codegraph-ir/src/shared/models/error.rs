//! Error types for the codegraph-ir crate
//!
//! Unified error handling across all components, with a stable `ErrorKind`
//! that the dispatcher maps directly onto the wire error taxonomy (spec §7)
//! without leaking internal type names into responses.

use thiserror::Error;

/// Error kind categorization. Each variant maps 1:1 onto an external error
/// taxonomy entry via [`ErrorKind::as_str`]; that string, not the `Debug`
/// representation, is what ever reaches a client. The `#[error(...)]`
/// messages double as `ErrorKind`'s own `Display` and give `CodegraphError`
/// a `{kind}` to interpolate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ErrorKind {
    // Input
    #[error("encoding_error")]
    EncodingError,
    #[error("language_ambiguous")]
    LanguageAmbiguous,
    #[error("unsupported_language")]
    UnsupportedLanguage,
    #[error("invalid_argument")]
    InvalidArgument,
    // Parse
    #[error("parse_error")]
    ParseError,
    #[error("partial_parse")]
    PartialParse,
    // Resolution
    #[error("symbol_not_found")]
    SymbolNotFound,
    #[error("ambiguous_target")]
    AmbiguousTarget,
    #[error("unresolved_import")]
    UnresolvedImport,
    #[error("circular_import")]
    CircularImport,
    // Modification
    #[error("invalid_replacement")]
    InvalidReplacement,
    #[error("would_break_file")]
    WouldBreakFile,
    #[error("ambiguous_rename")]
    AmbiguousRename,
    // Safety
    #[error("path_outside_root")]
    PathOutsideRoot,
    #[error("path_not_found")]
    PathNotFound,
    #[error("path_access_denied")]
    PathAccessDenied,
    // Correction
    #[error("correction_needed")]
    CorrectionNeeded,
    // Budget
    #[error("analysis_budget_exhausted")]
    AnalysisBudgetExhausted,
    #[error("cancelled")]
    Cancelled,
    #[error("timeout")]
    Timeout,
    // Internal
    #[error("internal_error")]
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::EncodingError => "encoding_error",
            ErrorKind::LanguageAmbiguous => "language_ambiguous",
            ErrorKind::UnsupportedLanguage => "unsupported_language",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::ParseError => "parse_error",
            ErrorKind::PartialParse => "partial_parse",
            ErrorKind::SymbolNotFound => "symbol_not_found",
            ErrorKind::AmbiguousTarget => "ambiguous_target",
            ErrorKind::UnresolvedImport => "unresolved_import",
            ErrorKind::CircularImport => "circular_import",
            ErrorKind::InvalidReplacement => "invalid_replacement",
            ErrorKind::WouldBreakFile => "would_break_file",
            ErrorKind::AmbiguousRename => "ambiguous_rename",
            ErrorKind::PathOutsideRoot => "path_outside_root",
            ErrorKind::PathNotFound => "path_not_found",
            ErrorKind::PathAccessDenied => "path_access_denied",
            ErrorKind::CorrectionNeeded => "correction_needed",
            ErrorKind::AnalysisBudgetExhausted => "analysis_budget_exhausted",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Internal => "internal_error",
        }
    }

    /// Warnings are kinds that a component may attach as diagnostics without
    /// failing the overall operation (spec §4.4: `circular_import`,
    /// `unresolved_import` are reported as warnings, not hard failures).
    pub fn is_warning_only(&self) -> bool {
        matches!(self, ErrorKind::CircularImport | ErrorKind::UnresolvedImport)
    }
}

/// Unified error type. Carries enough context for both logging and the
/// response envelope's `error` object (spec §6), never a stack trace.
#[derive(Debug, Error)]
#[error("[{kind}] {message}")]
pub struct CodegraphError {
    pub kind: ErrorKind,
    pub message: String,
    pub file_path: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub suggestion: Option<String>,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl CodegraphError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            file_path: None,
            line: None,
            column: None,
            suggestion: None,
            source: None,
        }
    }

    pub fn with_file(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = Some(file_path.into());
        self
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_location(mut self, line: u32, column: u32) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // Convenience constructors, one per external taxonomy entry.
    pub fn encoding_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::EncodingError, message)
    }
    pub fn language_ambiguous(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::LanguageAmbiguous, message)
    }
    pub fn unsupported_language(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedLanguage, message)
    }
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseError, message)
    }
    pub fn symbol_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SymbolNotFound, message)
    }
    pub fn ambiguous_target(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AmbiguousTarget, message)
    }
    pub fn unresolved_import(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnresolvedImport, message)
    }
    pub fn circular_import(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CircularImport, message)
    }
    pub fn invalid_replacement(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidReplacement, message)
    }
    pub fn would_break_file(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::WouldBreakFile, message)
    }
    pub fn path_outside_root(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PathOutsideRoot, message)
    }
    pub fn path_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PathNotFound, message)
    }
    pub fn correction_needed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CorrectionNeeded, message)
    }
    pub fn analysis_budget_exhausted(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AnalysisBudgetExhausted, message)
    }
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "operation cancelled")
    }
    pub fn timeout() -> Self {
        Self::new(ErrorKind::Timeout, "operation timed out")
    }
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CodegraphError>;

impl From<std::io::Error> for CodegraphError {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::PathNotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PathAccessDenied,
            _ => ErrorKind::Internal,
        };
        CodegraphError::new(kind, err.to_string()).with_source(err)
    }
}

impl From<serde_json::Error> for CodegraphError {
    fn from(err: serde_json::Error) -> Self {
        CodegraphError::internal(format!("serialization error: {}", err)).with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CodegraphError::parse_error("unexpected token")
            .with_file("test.py")
            .with_line(42);

        let msg = format!("{}", err);
        assert!(msg.contains("parse_error"));
        assert!(msg.contains("unexpected token"));
        // file/line ride along in the struct for the response envelope
        // (spec §6 `error.file_path`/`error.line`); `Display` itself stays
        // a plain "[kind] message" the way the teacher's own `errors.rs`
        // variants do.
        assert_eq!(err.file_path.as_deref(), Some("test.py"));
        assert_eq!(err.line, Some(42));
    }

    #[test]
    fn test_warning_only_kinds() {
        assert!(ErrorKind::CircularImport.is_warning_only());
        assert!(ErrorKind::UnresolvedImport.is_warning_only());
        assert!(!ErrorKind::ParseError.is_warning_only());
    }
}
