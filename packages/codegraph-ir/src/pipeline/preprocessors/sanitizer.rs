//! Source Sanitizer (spec §4.1, component C1).
//!
//! Deterministic, optional normalization of "dirty" input — merge-conflict
//! markers and template-engine fragments — so a language front end that
//! only understands plain source text has something it can parse. Strict
//! mode never rewrites anything; permissive mode rewrites in place while
//! preserving line count, so span-based diagnostics computed against the
//! sanitized text still make sense against the original line numbers.

use crate::shared::models::Language;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SanitizerMode {
    Strict,
    Permissive,
}

impl Default for SanitizerMode {
    fn default() -> Self {
        SanitizerMode::Strict
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizerPolicy {
    #[serde(default)]
    pub mode: SanitizerMode,
    #[serde(default = "default_true")]
    pub allow_merge_conflicts: bool,
    #[serde(default = "default_true")]
    pub allow_templates: bool,
    #[serde(default = "default_true")]
    pub report_modifications: bool,
    /// Picks the native line-comment syntax for replaced lines. `None`
    /// falls back to `#`, which is wrong for JS/TS/Java but keeps line
    /// count and content otherwise inert; callers that know the target
    /// language up front should set this.
    #[serde(default)]
    pub language: Option<Language>,
}

fn default_true() -> bool {
    true
}

impl Default for SanitizerPolicy {
    fn default() -> Self {
        Self {
            mode: SanitizerMode::default(),
            allow_merge_conflicts: true,
            allow_templates: true,
            report_modifications: true,
            language: None,
        }
    }
}

impl SanitizerPolicy {
    fn comment_prefix(&self) -> &'static str {
        match self.language {
            Some(Language::Python) => "#",
            Some(Language::JavaScript) | Some(Language::TypeScript) | Some(Language::Java) => "//",
            None => "#",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizationChange {
    pub line: u32,
    pub reason: String,
    pub original: String,
    pub replacement: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SanitizationReport {
    pub modified: bool,
    pub changes: Vec<SanitizationChange>,
}

static MERGE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(<{7}|={7}|>{7})").unwrap());
static TEMPLATE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\{%.*%\}|\{#.*#\})\s*$").unwrap());
static TEMPLATE_EXPR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{.*?\}\}").unwrap());

/// `sanitize(sanitize(x, p), p) == sanitize(x, p)` for all inputs and
/// policies (spec §4.1 determinism invariant, testable property 3):
/// every substitution this function makes produces text that no longer
/// matches the pattern that triggered it, so a second pass is a no-op.
pub fn sanitize(text: &str, policy: &SanitizerPolicy) -> (String, SanitizationReport) {
    if policy.mode == SanitizerMode::Strict {
        return (text.to_string(), SanitizationReport::default());
    }

    let comment = policy.comment_prefix();
    let mut out_lines = Vec::new();
    let mut changes = Vec::new();
    let mut modified = false;

    for (idx, line) in text.lines().enumerate() {
        let line_no = (idx + 1) as u32;

        if policy.allow_merge_conflicts && MERGE_MARKER.is_match(line) {
            modified = true;
            let replacement = format!("{} sanitized: merge conflict marker removed", comment);
            if policy.report_modifications {
                changes.push(SanitizationChange {
                    line: line_no,
                    reason: "merge conflict marker".to_string(),
                    original: line.to_string(),
                    replacement: replacement.clone(),
                });
            }
            out_lines.push(replacement);
            continue;
        }

        if policy.allow_templates && TEMPLATE_BLOCK.is_match(line) {
            modified = true;
            let replacement = format!("{} sanitized: template block removed", comment);
            if policy.report_modifications {
                changes.push(SanitizationChange {
                    line: line_no,
                    reason: "template block directive".to_string(),
                    original: line.to_string(),
                    replacement: replacement.clone(),
                });
            }
            out_lines.push(replacement);
            continue;
        }

        if policy.allow_templates && TEMPLATE_EXPR.is_match(line) {
            let neutral = neutral_literal(policy.language);
            let replaced = TEMPLATE_EXPR.replace_all(line, neutral).into_owned();
            modified = true;
            if policy.report_modifications {
                changes.push(SanitizationChange {
                    line: line_no,
                    reason: "template expression substitution".to_string(),
                    original: line.to_string(),
                    replacement: replaced.clone(),
                });
            }
            out_lines.push(replaced);
            continue;
        }

        out_lines.push(line.to_string());
    }

    // `str::lines` drops a trailing newline; put one back if the input had
    // one, so line count (and byte offsets downstream) stay faithful.
    let mut joined = out_lines.join("\n");
    if text.ends_with('\n') {
        joined.push('\n');
    }

    (
        joined,
        SanitizationReport {
            modified,
            changes,
        },
    )
}

fn neutral_literal(language: Option<Language>) -> &'static str {
    match language {
        Some(Language::Python) => "None",
        Some(Language::Java) => "null",
        Some(Language::JavaScript) | Some(Language::TypeScript) | None => "null",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_mode_never_modifies() {
        let text = "def f():\n<<<<<<< HEAD\n    return 1\n=======\n    return 2\n>>>>>>> branch\n";
        let policy = SanitizerPolicy {
            mode: SanitizerMode::Strict,
            ..Default::default()
        };
        let (out, report) = sanitize(text, &policy);
        assert_eq!(out, text);
        assert!(!report.modified);
    }

    #[test]
    fn permissive_mode_removes_merge_markers_preserving_line_count() {
        let text = "def f():\n<<<<<<< HEAD\n    return 1\n=======\n    return 2\n>>>>>>> branch\n";
        let policy = SanitizerPolicy {
            mode: SanitizerMode::Permissive,
            language: Some(Language::Python),
            ..Default::default()
        };
        let (out, report) = sanitize(text, &policy);
        assert!(report.modified);
        assert_eq!(out.lines().count(), text.lines().count());
        assert!(report.changes[0].reason.contains("merge conflict"));
    }

    #[test]
    fn template_expression_is_replaced_inline() {
        let text = "x = {{ user_input }}\n";
        let policy = SanitizerPolicy {
            mode: SanitizerMode::Permissive,
            language: Some(Language::Python),
            ..Default::default()
        };
        let (out, _report) = sanitize(text, &policy);
        assert_eq!(out, "x = None\n");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let text = "<<<<<<< HEAD\nx = {{ a }}\n{% if a %}\n=======\n>>>>>>> b\n";
        let policy = SanitizerPolicy {
            mode: SanitizerMode::Permissive,
            language: Some(Language::Java),
            ..Default::default()
        };
        let (once, _) = sanitize(text, &policy);
        let (twice, _) = sanitize(&once, &policy);
        assert_eq!(once, twice);
    }

    #[test]
    fn encoding_error_is_detected_before_sanitization() {
        let bytes: &[u8] = &[0xFF, 0xFE, 0x00];
        assert!(std::str::from_utf8(bytes).is_err());
    }
}
