//! Taint ruleset model (spec §4.7 "Rules"): per-language sources, sinks,
//! and sanitizers, each a syntactic pattern matched against raw IR span
//! text — "a function call by name/qualified name or attribute access",
//! not a semantic type check. Loaded from YAML (spec SPEC_FULL §12: the
//! reason this module pulls in `serde_yaml`).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::shared::models::symbol::Language;
use crate::shared::models::{CodegraphError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRule {
    pub name: String,
    /// Substring matched against an assignment's RHS span text.
    pub pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkRule {
    pub name: String,
    pub pattern: String,
    pub cwe: String,
    pub severity: Severity,
    pub base_confidence: f32,
    pub remediation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizerRule {
    pub name: String,
    pub pattern: String,
    /// CWE tags this sanitizer neutralizes. Empty means "covers every
    /// sink kind" (spec §4.7: "If a sanitizer is applied and then the
    /// sanitized value flows into a different sink type it does not
    /// sanitize, the finding still fires" — a non-empty `covers` is how
    /// this engine represents "does not sanitize").
    #[serde(default)]
    pub covers: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LanguageRules {
    #[serde(default)]
    pub sources: Vec<SourceRule>,
    #[serde(default)]
    pub sinks: Vec<SinkRule>,
    #[serde(default)]
    pub sanitizers: Vec<SanitizerRule>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ruleset {
    pub version: String,
    pub by_language: HashMap<String, LanguageRules>,
}

impl Ruleset {
    pub fn load_from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text)
            .map_err(|e| CodegraphError::new(
                crate::shared::models::ErrorKind::InvalidArgument,
                format!("ruleset_invalid: {e}"),
            ))
    }

    fn rules_for(&self, language: Language) -> Option<&LanguageRules> {
        self.by_language.get(language.as_str())
    }

    pub fn match_source(&self, language: Language, text: &str) -> Option<&SourceRule> {
        self.rules_for(language)?.sources.iter().find(|r| text.contains(&r.pattern))
    }

    pub fn match_sink(&self, language: Language, text: &str) -> Option<&SinkRule> {
        self.rules_for(language)?.sinks.iter().find(|r| text.contains(&r.pattern))
    }

    pub fn match_sanitizer(&self, language: Language, text: &str) -> Option<&SanitizerRule> {
        self.rules_for(language)?.sanitizers.iter().find(|r| text.contains(&r.pattern))
    }

    /// Built-in ruleset covering the per-CWE sink families spec §4.7
    /// names (SQL execute, shell exec, template render, deserializer,
    /// crypto primitive, redirect, file open) for every supported
    /// language, so the engine has sane defaults with no config file.
    pub fn default_builtin() -> Self {
        let mut by_language = HashMap::new();
        for lang in [Language::Python, Language::JavaScript, Language::TypeScript, Language::Java] {
            by_language.insert(lang.as_str().to_string(), builtin_rules_for(lang));
        }
        Ruleset { version: "builtin-1".to_string(), by_language }
    }
}

fn builtin_rules_for(language: Language) -> LanguageRules {
    let sources = match language {
        Language::Python => vec![
            src("request_args", "request.args"),
            src("request_form", "request.form"),
            src("builtin_input", "input("),
            src("stdin_readline", "readline("),
        ],
        Language::JavaScript | Language::TypeScript => vec![
            src("req_query", "req.query"),
            src("req_body", "req.body"),
            src("req_params", "req.params"),
            src("process_argv", "process.argv"),
        ],
        Language::Java => vec![
            src("http_servlet_param", "getParameter("),
            src("scanner_next", "Scanner("),
        ],
    };

    let sinks = match language {
        Language::Python => vec![
            sink("sql_execute", ".execute(", "CWE-89", Severity::High, "Use a parameterized query instead of string concatenation."),
            sink("shell_exec", "os.system(", "CWE-78", Severity::Critical, "Avoid shell execution with untrusted input; use subprocess with a list of args."),
            sink("shell_exec_subprocess", "subprocess.call(", "CWE-78", Severity::Critical, "Pass arguments as a list, never shell=True with untrusted input."),
            sink("template_render", "render_template_string(", "CWE-79", Severity::High, "Use the template engine's autoescaping and avoid building templates from input."),
            sink("deserialize_pickle", "pickle.loads(", "CWE-502", Severity::Critical, "Avoid unpickling untrusted data; use a safe serialization format."),
            sink("weak_crypto", "hashlib.md5(", "CWE-327", Severity::Medium, "Use a modern KDF/hash such as SHA-256 or argon2 for security-sensitive hashing."),
            sink("open_redirect", "redirect(", "CWE-601", Severity::Medium, "Validate the redirect target against an allowlist of known paths."),
            sink("file_open", "open(", "CWE-22", Severity::Medium, "Validate and canonicalize the path before opening it."),
        ],
        Language::JavaScript | Language::TypeScript => vec![
            sink("sql_execute", ".query(", "CWE-89", Severity::High, "Use parameterized queries / prepared statements."),
            sink("shell_exec", "child_process.exec(", "CWE-78", Severity::Critical, "Use execFile with an argument array instead of a shell string."),
            sink("template_render", "res.render(", "CWE-79", Severity::Medium, "Ensure the templating engine escapes by default."),
            sink("eval_sink", "eval(", "CWE-95", Severity::Critical, "Never eval() untrusted input."),
            sink("open_redirect", "res.redirect(", "CWE-601", Severity::Medium, "Validate the redirect target against an allowlist."),
        ],
        Language::Java => vec![
            sink("sql_execute", "createStatement(", "CWE-89", Severity::High, "Use PreparedStatement with bound parameters."),
            sink("process_exec", "Runtime.getRuntime().exec(", "CWE-78", Severity::Critical, "Avoid shelling out with untrusted input."),
            sink("deserialize_java", "readObject(", "CWE-502", Severity::Critical, "Avoid native Java deserialization of untrusted streams."),
        ],
    };

    let sanitizers = match language {
        Language::Python => vec![
            sanitizer("param_binding", "execute(%s", vec!["CWE-89".to_string()]),
            sanitizer("html_escape", "escape(", vec!["CWE-79".to_string()]),
            sanitizer("allowlist_check", "in ALLOWED_", vec![]),
        ],
        Language::JavaScript | Language::TypeScript => vec![
            sanitizer("html_escape_js", "escapeHtml(", vec!["CWE-79".to_string()]),
            sanitizer("sanitize_call", "sanitize(", vec![]),
        ],
        Language::Java => vec![sanitizer("prepared_statement", "prepareStatement(", vec!["CWE-89".to_string()])],
    };

    LanguageRules { sources, sinks, sanitizers }
}

fn src(name: &str, pattern: &str) -> SourceRule {
    SourceRule { name: name.to_string(), pattern: pattern.to_string() }
}

fn sink(name: &str, pattern: &str, cwe: &str, severity: Severity, remediation: &str) -> SinkRule {
    SinkRule {
        name: name.to_string(),
        pattern: pattern.to_string(),
        cwe: cwe.to_string(),
        severity,
        base_confidence: 1.0,
        remediation: remediation.to_string(),
    }
}

fn sanitizer(name: &str, pattern: &str, covers: Vec<String>) -> SanitizerRule {
    SanitizerRule { name: name.to_string(), pattern: pattern.to_string(), covers }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_python_ruleset_flags_sql_execute() {
        let rules = Ruleset::default_builtin();
        let hit = rules.match_sink(Language::Python, "db.execute(q)");
        assert!(hit.is_some());
        assert_eq!(hit.unwrap().cwe, "CWE-89");
    }

    #[test]
    fn malformed_yaml_is_ruleset_invalid() {
        let err = Ruleset::load_from_yaml("not: [valid yaml").unwrap_err();
        assert!(err.message.contains("ruleset_invalid"));
    }

    #[test]
    fn sanitizer_covers_restricts_which_sinks_it_clears() {
        let rules = Ruleset::default_builtin();
        let san = rules.match_sanitizer(Language::Python, "escape(value)").unwrap();
        assert!(san.covers.contains(&"CWE-79".to_string()));
        assert!(!san.covers.contains(&"CWE-89".to_string()));
    }
}
