//! Engine-wide configuration (SPEC_FULL §10.3).
//!
//! `ScalpelConfig` holds everything the core components read at construction
//! time: sanitizer defaults, tier→limits tables, taint ruleset paths, cache
//! capacity, worker pool size, and allowed project roots. Persistent policy
//! files and license-tier *validation* are an external collaborator's job
//! (spec §1); this struct only carries the values those collaborators would
//! otherwise have to thread through by hand.

use crate::features::query_engine::TierLimits;
use crate::pipeline::preprocessors::sanitizer::SanitizerPolicy;
use crate::shared::models::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalpelConfig {
    #[serde(default)]
    pub sanitizer_policy: SanitizerPolicy,
    #[serde(default = "default_tier_limits")]
    pub tier_limits: HashMap<String, TierLimits>,
    #[serde(default)]
    pub taint_ruleset_paths: Vec<PathBuf>,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    #[serde(default)]
    pub allowed_roots: Vec<PathBuf>,
}

fn default_cache_capacity() -> usize {
    4096
}

fn default_worker_threads() -> usize {
    std::cmp::max(1, num_cpus::get().saturating_sub(1))
}

fn default_tier_limits() -> HashMap<String, TierLimits> {
    let mut tiers = HashMap::new();
    tiers.insert("community".to_string(), TierLimits::community());
    tiers.insert("pro".to_string(), TierLimits::pro());
    tiers.insert("enterprise".to_string(), TierLimits::enterprise());
    tiers
}

impl Default for ScalpelConfig {
    fn default() -> Self {
        Self {
            sanitizer_policy: SanitizerPolicy::default(),
            tier_limits: default_tier_limits(),
            taint_ruleset_paths: Vec::new(),
            cache_capacity: default_cache_capacity(),
            worker_threads: default_worker_threads(),
            allowed_roots: Vec::new(),
        }
    }
}

impl ScalpelConfig {
    /// Load from a YAML file, falling back to per-field defaults for
    /// anything the file omits (so the engine runs fine unconfigured).
    pub fn load_from_yaml(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&text).map_err(|e| {
            crate::shared::models::CodegraphError::invalid_argument(format!(
                "invalid config at {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Resolve the limits for a named tier, falling back to community
    /// defaults for an unknown tier rather than failing the request —
    /// tier *validation* belongs to the license-gating collaborator.
    pub fn limits_for_tier(&self, tier: &str) -> TierLimits {
        self.tier_limits
            .get(tier)
            .cloned()
            .unwrap_or_else(TierLimits::community)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_all_three_tiers() {
        let cfg = ScalpelConfig::default();
        assert!(cfg.tier_limits.contains_key("community"));
        assert!(cfg.tier_limits.contains_key("pro"));
        assert!(cfg.tier_limits.contains_key("enterprise"));
    }

    #[test]
    fn unknown_tier_falls_back_to_community() {
        let cfg = ScalpelConfig::default();
        let fallback = cfg.limits_for_tier("nonexistent");
        assert_eq!(fallback, TierLimits::community());
    }
}
