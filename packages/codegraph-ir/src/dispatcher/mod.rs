//! Tool Dispatcher (spec §6, component C10): the single surface every
//! operation in the catalog goes through. Binds the operation catalog onto
//! the engine components (C1-C9), resolves tier limits, builds the
//! response envelope, and enforces path safety for anything that touches
//! the filesystem.
//!
//! Transport framing, license/tier *validation*, persistent configuration
//! files, and audit logging are external collaborators (spec §1); this
//! module only exposes the hooks they need: a `tier: &str` argument
//! forwarded verbatim into every response, and [`CancellationToken`] for a
//! caller-owned cooperative cancellation signal.

pub mod analysis_ops;
pub mod edit_ops;
pub mod graph_ops;
pub mod security_ops;
pub mod symbolic;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;
use tracing::info_span;
use walkdir::WalkDir;

use crate::config::ScalpelConfig;
use crate::features::cross_file::{build_project, ImportGraph, SourceUnit};
use crate::features::ir_generation::normalize;
use crate::features::parsing::{detect_language, front_end_for, ParseOptions};
use crate::features::query_engine::{LimitKind, PartialLimits, TierLimits};
use crate::features::type_resolution::SymbolTable;
use crate::pipeline::preprocessors::sanitizer::{sanitize, SanitizationReport, SanitizerPolicy};
use crate::shared::models::pir::{Program, SourceUnitId};
use crate::shared::models::symbol::Language;
use crate::shared::models::{CodegraphError, ErrorKind, Result};

/// Cooperative cancellation signal (spec §5 "Cancellation"): long analyses
/// check this at suspension points (between functions/files in a worklist)
/// and stop early rather than racing a hard kill. Owned by the caller; the
/// dispatcher only reads it.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-request context a caller assembles once and passes into every
/// dispatcher call: which tier's limits to resolve, any partial override
/// of those limits, and a cancellation token for long operations.
#[derive(Clone)]
pub struct RequestContext {
    pub tier: String,
    pub limits: PartialLimits,
    pub cancellation: CancellationToken,
}

impl RequestContext {
    pub fn new(tier: impl Into<String>) -> Self {
        Self { tier: tier.into(), limits: PartialLimits::default(), cancellation: CancellationToken::new() }
    }

    pub fn with_limits(mut self, limits: PartialLimits) -> Self {
        self.limits = limits;
        self
    }
}

/// A ranked correction entry on the wire (spec §7 `correction_needed`:
/// "a ranked list of `{symbol, score, reason}`").
#[derive(Debug, Clone, Serialize)]
pub struct SuggestionPayload {
    pub symbol: String,
    pub score: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<SuggestionPayload>,
}

impl From<&CodegraphError> for ErrorPayload {
    fn from(err: &CodegraphError) -> Self {
        Self {
            kind: err.kind.as_str(),
            message: err.message.clone(),
            file_path: err.file_path.clone(),
            line: err.line,
            column: err.column,
            suggestion: err.suggestion.clone(),
            suggestions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseMetadata {
    pub request_id: String,
    pub tier: String,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncated_by_limit: Option<LimitKind>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Carried forward whenever an operation parsed source text through the
    /// sanitizer, so callers can see the analyzed text differed from what
    /// they submitted (spec §3 "Sanitization report").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sanitization: Option<SanitizationReport>,
}

/// The response envelope every operation returns (spec §6: `{success,
/// data, error, metadata}`), regardless of which operation produced it.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
    pub metadata: ResponseMetadata,
}

/// Hit/miss/eviction counters for every cache this dispatcher owns,
/// keyed by the operation whose output it memoizes.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DispatcherCacheMetrics {
    pub analyze_code: crate::features::cache::CacheMetricsSnapshot,
    pub security_scan: crate::features::cache::CacheMetricsSnapshot,
}

/// Extra facts an operation hands back alongside its payload that belong
/// in `metadata` rather than `data`: which limit (if any) truncated the
/// result, and any non-fatal warnings (e.g. `unresolved_import`).
#[derive(Debug, Clone, Default)]
pub struct OpExtras {
    pub truncated_by_limit: Option<LimitKind>,
    pub warnings: Vec<String>,
    pub sanitization: Option<SanitizationReport>,
}

/// Engine-wide dispatcher state: configuration plus the fingerprinted
/// caches backing repeated calls for the same content (spec §4.9). One
/// instance is expected to live for the process lifetime of whatever
/// transport embeds this crate.
pub struct ToolDispatcher {
    pub config: ScalpelConfig,
    request_counter: AtomicU64,
    /// Caches `analyze_code`'s IR-derived summary (C3 output, spec §3
    /// "Cache entry" / §4.9 "C9 is transverse: it caches outputs of C3,
    /// C5, and C7").
    pub(crate) analyze_cache: crate::features::cache::AnalysisCache<analysis_ops::AnalyzeCodeData>,
    /// Caches `security_scan`'s findings (C7 output), per `(source_unit,
    /// ruleset_version)` as spec §3 "Lifecycle" describes for taint
    /// findings — folded here into the same content+config+tier key every
    /// other cached component uses.
    pub(crate) security_cache: crate::features::cache::AnalysisCache<security_ops::SecurityScanData>,
}

impl ToolDispatcher {
    pub fn new(config: ScalpelConfig) -> Self {
        let capacity = config.cache_capacity;
        Self {
            config,
            request_counter: AtomicU64::new(0),
            analyze_cache: crate::features::cache::AnalysisCache::with_capacity(capacity),
            security_cache: crate::features::cache::AnalysisCache::with_capacity(capacity),
        }
    }

    /// Read-only snapshot of cache hit/miss/eviction counters across every
    /// component-keyed cache this dispatcher owns (SPEC_FULL §11 "Cache
    /// metrics").
    pub fn cache_metrics(&self) -> DispatcherCacheMetrics {
        DispatcherCacheMetrics {
            analyze_code: self.analyze_cache.metrics(),
            security_scan: self.security_cache.metrics(),
        }
    }

    pub fn resolve_limits(&self, ctx: &RequestContext) -> TierLimits {
        self.config.limits_for_tier(&ctx.tier).clamp(&ctx.limits)
    }

    fn next_request_id(&self) -> String {
        let n = self.request_counter.fetch_add(1, Ordering::Relaxed);
        format!("req_{n:08x}")
    }

    /// Wraps `f`'s result into the uniform envelope, opening the one
    /// `tracing` span every log line inside a call is expected to nest
    /// under (SPEC_FULL §10.2).
    pub fn run<T: Serialize>(
        &self,
        operation: &'static str,
        ctx: &RequestContext,
        f: impl FnOnce() -> (Result<T>, OpExtras),
    ) -> ToolResponse {
        let request_id = self.next_request_id();
        let _span = info_span!("tool_call", operation, tier = %ctx.tier, request_id = %request_id).entered();
        let started = Instant::now();

        let (outcome, extras) = f();
        let duration_ms = started.elapsed().as_millis() as u64;
        let metadata = ResponseMetadata {
            request_id,
            tier: ctx.tier.clone(),
            duration_ms,
            truncated_by_limit: extras.truncated_by_limit,
            warnings: extras.warnings,
            sanitization: extras.sanitization,
        };

        match outcome {
            Ok(value) => ToolResponse {
                success: true,
                data: serde_json::to_value(&value).ok(),
                error: None,
                metadata,
            },
            Err(err) => {
                tracing::warn!(kind = err.kind.as_str(), message = %err.message, "tool_call failed");
                ToolResponse {
                    success: false,
                    data: None,
                    error: Some(ErrorPayload::from(&err)),
                    metadata,
                }
            }
        }
    }
}

/// Resolves `path` against `allowed_roots`, rejecting anything that
/// escapes every configured root and declining to follow a symlink unless
/// `follow_symlinks` is set (spec §6 "Path safety"). An empty
/// `allowed_roots` falls back to the process's current directory, so the
/// engine is still safe to call unconfigured.
pub fn validate_path(path: &Path, allowed_roots: &[PathBuf], follow_symlinks: bool) -> Result<PathBuf> {
    if !follow_symlinks {
        if let Ok(meta) = std::fs::symlink_metadata(path) {
            if meta.file_type().is_symlink() {
                return Err(CodegraphError::new(
                    ErrorKind::PathAccessDenied,
                    format!("refusing to follow symlink: {}", path.display()),
                ));
            }
        }
    }

    let resolved = path.canonicalize().map_err(|_| {
        CodegraphError::path_not_found(format!("no such path: {}", path.display()))
    })?;

    let roots: Vec<PathBuf> = if allowed_roots.is_empty() {
        vec![std::env::current_dir()?]
    } else {
        allowed_roots.to_vec()
    };

    let inside = roots.iter().any(|root| {
        root.canonicalize().map(|canon_root| resolved.starts_with(canon_root)).unwrap_or(false)
    });

    if !inside {
        return Err(CodegraphError::path_outside_root(format!(
            "{} is outside every allowed root",
            resolved.display()
        )));
    }

    Ok(resolved)
}

/// Runs sanitize → parse → normalize → resolve for a single piece of
/// source text (spec §2 "Control flow of a typical request" steps 1-4).
/// `accept_partial` mirrors the caller's requested parse strictness; the
/// sanitizer policy's own `mode` field is independent (spec §4.1: strict
/// sanitization and partial-parse tolerance are orthogonal knobs).
pub fn parse_and_resolve(
    text: &str,
    language: Language,
    policy: &SanitizerPolicy,
    accept_partial: bool,
    module_path: &str,
) -> Result<(Program, SymbolTable, SanitizationReport)> {
    let mut policy = policy.clone();
    policy.language = Some(language);
    let (sanitized, report) = sanitize(text, &policy);

    let front_end = front_end_for(language);
    let native = front_end.parse(&sanitized, ParseOptions { accept_partial })?;
    let mut program = normalize(&native, SourceUnitId(0));
    let table = crate::features::type_resolution::resolve(&mut program, module_path, language);

    Ok((program, table, report))
}

/// Derives a project-relative module path from a file's location, the
/// same shape `features::cross_file` expects: path segments joined by `.`
/// with the extension stripped (spec §3 "module path").
pub fn module_path_for(root: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(root).unwrap_or(file);
    let without_ext = relative.with_extension("");
    without_ext
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(".")
}

/// Walks `root`, parses every file whose extension maps to a supported
/// language, and resolves the project (spec §4.4, §4.10 "crawl"). Files
/// that fail to parse even permissively are skipped with a warning rather
/// than aborting the whole crawl — one unparsable file should not block
/// project-wide analysis of the rest (spec §6 "crawl_project").
pub fn load_project(
    root: &Path,
    policy: &SanitizerPolicy,
    max_files: usize,
) -> Result<(Vec<SourceUnit>, ImportGraph, Vec<String>)> {
    let mut warnings = Vec::new();
    let mut candidates = Vec::new();

    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if candidates.len() >= max_files {
            warnings.push(format!("max_files limit ({max_files}) reached; remaining files skipped"));
            break;
        }
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else { continue };
        let Some(language) = Language::from_extension(ext) else { continue };
        let Ok(text) = std::fs::read_to_string(path) else { continue };

        let module_path = module_path_for(root, path);
        candidates.push((path.to_path_buf(), module_path, language, text));
    }

    // Parsing and resolving each file is independent and CPU-bound, so the
    // crawl's bottleneck stage runs across the rayon pool the same way the
    // teacher's per-file IR build does, preserving discovery order on
    // collect.
    let parsed: Vec<std::result::Result<SourceUnit, String>> = candidates
        .par_iter()
        .map(|(path, module_path, language, text)| {
            parse_and_resolve(text, *language, policy, true, module_path)
                .map(|(program, table, _report)| SourceUnit {
                    path: path.clone(),
                    module_path: module_path.clone(),
                    language: *language,
                    program,
                    table,
                })
                .map_err(|err| format!("{}: {}", path.display(), err.message))
        })
        .collect();

    let mut units = Vec::new();
    for result in parsed {
        match result {
            Ok(unit) => units.push(unit),
            Err(message) => warnings.push(message),
        }
    }

    let (units, graph) = build_project(units);
    for diag in &graph.diagnostics {
        warnings.push(diag.message.clone());
    }
    Ok((units, graph, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_path_strips_extension_and_joins_segments() {
        let root = Path::new("/proj");
        let file = Path::new("/proj/pkg/mod.py");
        assert_eq!(module_path_for(root, file), "pkg.mod");
    }

    #[test]
    fn path_outside_every_root_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let allowed = tmp.path().join("allowed");
        std::fs::create_dir_all(&allowed).unwrap();
        let outside = tmp.path().join("outside.py");
        std::fs::write(&outside, "x = 1\n").unwrap();

        let err = validate_path(&outside, &[allowed], false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::PathOutsideRoot);
    }

    #[test]
    fn path_inside_allowed_root_resolves() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("a.py");
        std::fs::write(&file, "x = 1\n").unwrap();

        let resolved = validate_path(&file, &[tmp.path().to_path_buf()], false).unwrap();
        assert!(resolved.ends_with("a.py"));
    }
}
