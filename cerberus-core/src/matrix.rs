//! Matrix expansion: turn the roster into the list of reviewer tasks to run
//!
//! Given the config and an optional wave/tier selection, emit one task per
//! reviewer. If a wave is selected, only that wave's reviewers appear, in
//! the order the wave definition lists them. The tier/wave annotations tell
//! downstream runners which model pool to draw from.

use serde::{Deserialize, Serialize};

use crate::config::{Config, ModelTier};
use crate::{Error, Result};

/// One reviewer task produced by matrix expansion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewerTask {
    pub reviewer: String,
    pub perspective: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_tier: Option<ModelTier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_wave: Option<String>,
    #[serde(default)]
    pub critical: bool,
}

/// The expanded matrix, in the shape the CI fan-out consumes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Matrix {
    pub include: Vec<ReviewerTask>,
}

impl Matrix {
    pub fn len(&self) -> usize {
        self.include.len()
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty()
    }

    /// Comma-separated reviewer codenames, in task order
    pub fn names(&self) -> String {
        self.include
            .iter()
            .map(|t| t.reviewer.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Expand the roster into reviewer tasks
pub fn expand(config: &Config, wave: Option<&str>, tier: Option<ModelTier>) -> Result<Matrix> {
    let selected: Vec<&crate::config::ReviewerProfile> = match wave {
        Some(wave_name) => {
            let definition = config.waves.definitions.get(wave_name).ok_or_else(|| {
                Error::Config(format!("unknown wave '{}'", wave_name))
            })?;
            let tasks: Vec<_> = definition
                .reviewers
                .iter()
                .filter_map(|codename| config.reviewer_for_codename(codename))
                .collect();
            if tasks.is_empty() {
                return Err(Error::Config(format!(
                    "wave '{}' produced an empty reviewer matrix",
                    wave_name
                )));
            }
            tasks
        }
        None => config.reviewers.iter().collect(),
    };

    let include = selected
        .into_iter()
        .map(|profile| ReviewerTask {
            reviewer: profile.codename.clone(),
            perspective: profile.perspective.clone(),
            description: profile.description.clone(),
            model_tier: tier,
            model_wave: wave.map(str::to_string),
            critical: profile.critical,
        })
        .collect();

    Ok(Matrix { include })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> Config {
        Config::load_from_str(
            r#"
[[reviewers]]
codename = "trace"
perspective = "correctness"
description = "Correctness analyst"
critical = true

[[reviewers]]
codename = "guard"
perspective = "security"

[[reviewers]]
codename = "sage"
perspective = "architecture"

[waves]
order = ["wave1", "wave2"]

[waves.definitions.wave1]
reviewers = ["guard", "trace"]

[waves.definitions.wave2]
reviewers = ["sage"]
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_expand_full_roster() {
        let config = sample_config();
        let matrix = expand(&config, None, None).unwrap();
        assert_eq!(matrix.len(), 3);
        assert_eq!(matrix.names(), "trace,guard,sage");
        assert!(matrix.include[0].critical);
        assert!(matrix.include[0].model_wave.is_none());
    }

    #[test]
    fn test_expand_wave_restricts_and_orders() {
        let config = sample_config();
        let matrix = expand(&config, Some("wave1"), Some(ModelTier::Flash)).unwrap();
        // Wave definition order, not roster order.
        assert_eq!(matrix.names(), "guard,trace");
        assert_eq!(matrix.include[0].model_wave.as_deref(), Some("wave1"));
        assert_eq!(matrix.include[0].model_tier, Some(ModelTier::Flash));
    }

    #[test]
    fn test_expand_unknown_wave_is_error() {
        let config = sample_config();
        assert!(expand(&config, Some("wave9"), None).is_err());
    }

    #[test]
    fn test_matrix_serializes_to_include_shape() {
        let config = sample_config();
        let matrix = expand(&config, Some("wave2"), None).unwrap();
        let json = serde_json::to_value(&matrix).unwrap();
        assert_eq!(json["include"][0]["reviewer"], "sage");
        assert_eq!(json["include"][0]["perspective"], "architecture");
    }
}
