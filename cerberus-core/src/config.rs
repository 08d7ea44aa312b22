//! Configuration for the Cerberus review pipeline
//!
//! A single declarative TOML document holds the reviewer roster, the model
//! pools, optional wave definitions, and the override policy. Loading is
//! strict: an empty roster, duplicate perspectives, or malformed TOML are
//! fatal; there are no silent defaults for structural problems.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::verdict::Severity;
use crate::{Error, Result};

/// Model used when neither the config nor the reviewer names one
pub const BASE_DEFAULT_MODEL: &str = "openrouter/moonshotai/kimi-k2.5";

/// Who may override a reviewer's FAIL verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverridePolicy {
    PrAuthor,
    WriteAccess,
    MaintainersOnly,
}

impl OverridePolicy {
    /// Strictness ranking: a stricter policy wins when several failing
    /// reviewers disagree
    pub fn strictness(&self) -> u8 {
        match self {
            OverridePolicy::PrAuthor => 0,
            OverridePolicy::WriteAccess => 1,
            OverridePolicy::MaintainersOnly => 2,
        }
    }
}

/// Model tier selected by the external complexity router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Flash,
    Standard,
    Pro,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Flash => "flash",
            ModelTier::Standard => "standard",
            ModelTier::Pro => "pro",
        }
    }
}

impl std::str::FromStr for ModelTier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "flash" => Ok(ModelTier::Flash),
            "standard" | "" => Ok(ModelTier::Standard),
            "pro" => Ok(ModelTier::Pro),
            other => Err(Error::Config(format!("unknown model tier '{}'", other))),
        }
    }
}

/// One reviewer in the roster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewerProfile {
    /// Reviewer identity (e.g. `trace`, `guard`)
    pub codename: String,
    /// Analytical lens, unique within a run
    pub perspective: String,
    #[serde(default)]
    pub description: String,
    /// Explicit model id, the literal `"pool"`, or absent (inherit default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_policy: Option<OverridePolicy>,
    /// A FAIL from a critical reviewer is authoritative at the cerberus level
    #[serde(default)]
    pub critical: bool,
}

/// Model pool configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub default: Option<String>,
    pub pool: Vec<String>,
    pub tiers: BTreeMap<String, Vec<String>>,
    pub wave_pools: BTreeMap<String, Vec<String>>,
}

/// Severity at or above which the wave gate blocks escalation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateSeverity {
    Critical,
    Major,
}

impl GateSeverity {
    /// Whether a finding of `severity` blocks the next wave
    pub fn blocks(&self, severity: Severity) -> bool {
        match self {
            GateSeverity::Critical => severity == Severity::Critical,
            GateSeverity::Major => {
                severity == Severity::Critical || severity == Severity::Major
            }
        }
    }
}

/// Wave gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveGate {
    pub severity: GateSeverity,
    /// Block escalation when any reviewer in the wave skipped
    pub block_on_skip: bool,
}

impl Default for WaveGate {
    fn default() -> Self {
        Self {
            severity: GateSeverity::Major,
            block_on_skip: false,
        }
    }
}

/// One wave definition: the reviewers that run in it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WaveDefinition {
    pub reviewers: Vec<String>,
}

/// Multi-wave review configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveConfig {
    /// Wave names in escalation order
    pub order: Vec<String>,
    pub definitions: BTreeMap<String, WaveDefinition>,
    pub gate: WaveGate,
    /// Deepest wave allowed per model tier (absent tier = full depth)
    pub max_for_tier: BTreeMap<String, String>,
}

impl WaveConfig {
    pub fn enabled(&self) -> bool {
        !self.order.is_empty()
    }
}

/// Override command configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverrideConfig {
    pub command: String,
    pub trusted_bot_login: String,
    /// Policy applied when a reviewer does not set its own
    pub default_policy: OverridePolicy,
}

impl Default for OverrideConfig {
    fn default() -> Self {
        Self {
            command: "/cerberus override".to_string(),
            trusted_bot_login: "github-actions[bot]".to_string(),
            default_policy: OverridePolicy::PrAuthor,
        }
    }
}

/// Root configuration document
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub reviewers: Vec<ReviewerProfile>,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub waves: WaveConfig,
    #[serde(default)]
    pub overrides: OverrideConfig,
}

impl Config {
    /// Load and validate a config document from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("unable to read {}: {}", path.display(), e))
        })?;
        Self::load_from_str(&contents)
    }

    /// Load and validate a config document from TOML text
    pub fn load_from_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.reviewers.is_empty() {
            return Err(Error::Config("reviewers: must be non-empty".to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        for reviewer in &self.reviewers {
            if reviewer.codename.trim().is_empty() {
                return Err(Error::Config("reviewer codename must be non-empty".to_string()));
            }
            if reviewer.perspective.trim().is_empty() {
                return Err(Error::Config(format!(
                    "reviewer '{}': perspective must be non-empty",
                    reviewer.codename
                )));
            }
            if !seen.insert(reviewer.perspective.clone()) {
                return Err(Error::Config(format!(
                    "duplicate perspective '{}'",
                    reviewer.perspective
                )));
            }
        }

        for name in &self.waves.order {
            let definition = self.waves.definitions.get(name).ok_or_else(|| {
                Error::Config(format!("wave '{}' listed in order but not defined", name))
            })?;
            for codename in &definition.reviewers {
                if !self.reviewers.iter().any(|r| &r.codename == codename) {
                    return Err(Error::Config(format!(
                        "wave '{}' references unknown reviewer '{}'",
                        name, codename
                    )));
                }
            }
        }

        debug!(reviewers = self.reviewers.len(), "Loaded Cerberus config");
        Ok(())
    }

    /// Find a reviewer by perspective; unknown perspectives are fatal
    pub fn reviewer_for_perspective(&self, perspective: &str) -> Result<&ReviewerProfile> {
        self.reviewers
            .iter()
            .find(|r| r.perspective == perspective)
            .ok_or_else(|| {
                Error::Config(format!("unknown perspective '{}'", perspective))
            })
    }

    /// Find a reviewer by codename
    pub fn reviewer_for_codename(&self, codename: &str) -> Option<&ReviewerProfile> {
        self.reviewers.iter().find(|r| r.codename == codename)
    }

    /// The effective override policy for a perspective
    pub fn override_policy_for(&self, perspective: &str) -> OverridePolicy {
        self.reviewers
            .iter()
            .find(|r| r.perspective == perspective)
            .and_then(|r| r.override_policy)
            .unwrap_or(self.overrides.default_policy)
    }

    /// Resolve the model for a reviewer task
    ///
    /// Resolution order: action-level override → reviewer's explicit model →
    /// pool draw (wave pool → requested tier → standard tier → unscoped
    /// pool) → config default → the built-in default.
    pub fn resolve_model(
        &self,
        reviewer: &ReviewerProfile,
        action_override: Option<&str>,
        tier: Option<ModelTier>,
        wave: Option<&str>,
        selector: &mut dyn PoolSelector,
    ) -> String {
        if let Some(model) = action_override {
            let model = model.trim();
            if !model.is_empty() {
                return model.to_string();
            }
        }

        match reviewer.model.as_deref().map(str::trim) {
            Some("pool") => {
                if let Some(selected) = self.select_pool_model(reviewer, tier, wave, selector) {
                    return selected;
                }
                warn!(
                    reviewer = %reviewer.codename,
                    "Reviewer uses 'pool' but no pool is defined; falling back to default"
                );
            }
            Some(model) if !model.is_empty() => return model.to_string(),
            _ => {}
        }

        self.model
            .default
            .clone()
            .unwrap_or_else(|| BASE_DEFAULT_MODEL.to_string())
    }

    fn select_pool_model(
        &self,
        reviewer: &ReviewerProfile,
        tier: Option<ModelTier>,
        wave: Option<&str>,
        selector: &mut dyn PoolSelector,
    ) -> Option<String> {
        if let Some(wave) = wave {
            if let Some(pool) = self.model.wave_pools.get(wave) {
                if !pool.is_empty() {
                    let selected = selector.choose(pool).to_string();
                    debug!(
                        reviewer = %reviewer.codename,
                        wave,
                        model = %selected,
                        "Selected model from wave pool"
                    );
                    return Some(selected);
                }
            }
        }

        let requested = tier.unwrap_or(ModelTier::Standard);
        let mut candidates: Vec<Option<&str>> = vec![Some(requested.as_str())];
        if requested != ModelTier::Standard {
            candidates.push(Some(ModelTier::Standard.as_str()));
        }
        candidates.push(None);

        for candidate in candidates {
            let pool = match candidate {
                Some(name) => self.model.tiers.get(name).map(Vec::as_slice),
                None => Some(self.model.pool.as_slice()),
            };
            if let Some(pool) = pool {
                if !pool.is_empty() {
                    let selected = selector.choose(pool).to_string();
                    debug!(
                        reviewer = %reviewer.codename,
                        tier = candidate.unwrap_or("unscoped"),
                        model = %selected,
                        "Selected model from pool"
                    );
                    return Some(selected);
                }
            }
        }

        None
    }
}

/// Draws a model from a pool
///
/// Injectable so tests can pin the selection deterministically; the
/// production selector draws uniformly at random.
pub trait PoolSelector {
    fn choose<'a>(&mut self, pool: &'a [String]) -> &'a str;
}

/// Uniform-random pool selector
#[derive(Debug, Default)]
pub struct RandomPoolSelector;

impl PoolSelector for RandomPoolSelector {
    fn choose<'a>(&mut self, pool: &'a [String]) -> &'a str {
        use rand::seq::SliceRandom;
        pool.choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// Selector that always picks a fixed index (for tests and pinned runs)
#[derive(Debug, Clone, Copy)]
pub struct FixedPoolSelector(pub usize);

impl PoolSelector for FixedPoolSelector {
    fn choose<'a>(&mut self, pool: &'a [String]) -> &'a str {
        pool[self.0.min(pool.len().saturating_sub(1))].as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[[reviewers]]
codename = "trace"
perspective = "correctness"
description = "Correctness analyst"
model = "pool"
critical = true

[[reviewers]]
codename = "guard"
perspective = "security"
override_policy = "maintainers_only"

[model]
default = "model-default"
pool = ["pool-a", "pool-b"]

[model.tiers]
flash = ["flash-a"]
standard = ["std-a", "std-b"]

[model.wave_pools]
wave1 = ["wave-a"]

[waves]
order = ["wave1", "wave2"]

[waves.definitions.wave1]
reviewers = ["trace"]

[waves.definitions.wave2]
reviewers = ["guard"]

[waves.gate]
severity = "major"

[waves.max_for_tier]
flash = "wave1"

[overrides]
command = "/cerberus override"
trusted_bot_login = "cerberus-bot"
"#;

    #[test]
    fn test_load_sample_config() {
        let config = Config::load_from_str(SAMPLE).unwrap();
        assert_eq!(config.reviewers.len(), 2);
        assert!(config.reviewers[0].critical);
        assert_eq!(config.model.default.as_deref(), Some("model-default"));
        assert!(config.waves.enabled());
        assert_eq!(config.overrides.trusted_bot_login, "cerberus-bot");
    }

    #[test]
    fn test_empty_roster_is_fatal() {
        let result = Config::load_from_str("reviewers = []\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_duplicate_perspective_is_fatal() {
        let toml = r#"
[[reviewers]]
codename = "a"
perspective = "correctness"

[[reviewers]]
codename = "b"
perspective = "correctness"
"#;
        assert!(Config::load_from_str(toml).is_err());
    }

    #[test]
    fn test_wave_referencing_unknown_reviewer_is_fatal() {
        let toml = r#"
[[reviewers]]
codename = "a"
perspective = "correctness"

[waves]
order = ["wave1"]

[waves.definitions.wave1]
reviewers = ["ghost"]
"#;
        assert!(Config::load_from_str(toml).is_err());
    }

    #[test]
    fn test_unknown_perspective_is_fatal() {
        let config = Config::load_from_str(SAMPLE).unwrap();
        assert!(config.reviewer_for_perspective("nonexistent").is_err());
        assert!(config.reviewer_for_perspective("security").is_ok());
    }

    #[test]
    fn test_override_policy_defaults() {
        let config = Config::load_from_str(SAMPLE).unwrap();
        assert_eq!(
            config.override_policy_for("security"),
            OverridePolicy::MaintainersOnly
        );
        // trace sets none; falls back to the global default.
        assert_eq!(
            config.override_policy_for("correctness"),
            OverridePolicy::PrAuthor
        );
    }

    #[test]
    fn test_resolve_model_action_override_wins() {
        let config = Config::load_from_str(SAMPLE).unwrap();
        let reviewer = config.reviewer_for_perspective("correctness").unwrap();
        let mut selector = FixedPoolSelector(0);
        let model =
            config.resolve_model(reviewer, Some("forced-model"), None, None, &mut selector);
        assert_eq!(model, "forced-model");
    }

    #[test]
    fn test_resolve_model_wave_pool_preferred() {
        let config = Config::load_from_str(SAMPLE).unwrap();
        let reviewer = config.reviewer_for_perspective("correctness").unwrap();
        let mut selector = FixedPoolSelector(0);
        let model = config.resolve_model(
            reviewer,
            None,
            Some(ModelTier::Flash),
            Some("wave1"),
            &mut selector,
        );
        assert_eq!(model, "wave-a");
    }

    #[test]
    fn test_resolve_model_tier_pool() {
        let config = Config::load_from_str(SAMPLE).unwrap();
        let reviewer = config.reviewer_for_perspective("correctness").unwrap();
        let mut selector = FixedPoolSelector(1);
        let model =
            config.resolve_model(reviewer, None, Some(ModelTier::Standard), None, &mut selector);
        assert_eq!(model, "std-b");
    }

    #[test]
    fn test_resolve_model_tier_falls_back_to_standard() {
        let config = Config::load_from_str(SAMPLE).unwrap();
        let reviewer = config.reviewer_for_perspective("correctness").unwrap();
        let mut selector = FixedPoolSelector(0);
        // pro tier has no pool; falls through to standard.
        let model =
            config.resolve_model(reviewer, None, Some(ModelTier::Pro), None, &mut selector);
        assert_eq!(model, "std-a");
    }

    #[test]
    fn test_resolve_model_explicit_model() {
        let config = Config::load_from_str(SAMPLE).unwrap();
        let reviewer = config.reviewer_for_perspective("security").unwrap();
        let mut selector = FixedPoolSelector(0);
        // guard has no model binding; inherits the config default.
        let model = config.resolve_model(reviewer, None, None, None, &mut selector);
        assert_eq!(model, "model-default");
    }

    #[test]
    fn test_resolve_model_pool_without_pools_uses_default() {
        let toml = r#"
[[reviewers]]
codename = "solo"
perspective = "correctness"
model = "pool"
"#;
        let config = Config::load_from_str(toml).unwrap();
        let reviewer = config.reviewer_for_perspective("correctness").unwrap();
        let mut selector = FixedPoolSelector(0);
        let model = config.resolve_model(reviewer, None, None, None, &mut selector);
        assert_eq!(model, BASE_DEFAULT_MODEL);
    }

    #[test]
    fn test_gate_severity_blocks() {
        assert!(GateSeverity::Major.blocks(Severity::Major));
        assert!(GateSeverity::Major.blocks(Severity::Critical));
        assert!(!GateSeverity::Major.blocks(Severity::Minor));
        assert!(GateSeverity::Critical.blocks(Severity::Critical));
        assert!(!GateSeverity::Critical.blocks(Severity::Major));
    }

    #[test]
    fn test_policy_strictness_ordering() {
        assert!(
            OverridePolicy::MaintainersOnly.strictness()
                > OverridePolicy::WriteAccess.strictness()
        );
        assert!(
            OverridePolicy::WriteAccess.strictness() > OverridePolicy::PrAuthor.strictness()
        );
    }
}
