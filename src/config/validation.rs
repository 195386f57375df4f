//! Config validation: unknown-key detection with Levenshtein suggestions
//! and column-name consistency checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

use super::{PredictionMode, RunConfig};

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

const BOOSTING_KEYS: [&str; 3] = ["max_depth", "learning_rate", "n_estimators"];
const CATBOOST_KEYS: [&str; 4] = ["depth", "learning_rate", "l2_leaf_reg", "iterations"];

/// Returns the complete set of valid dotted key paths for `RunConfig`.
///
/// Must be kept in step with the struct hierarchy in `run_config.rs`.
pub fn known_config_keys() -> HashSet<String> {
    let mut keys: Vec<String> = [
        "run",
        "run.mode",
        "run.depth_column",
        "run.features",
        "lithology",
        "lithology.enabled",
        "lithology.column",
        "lithology.one_hot",
        "columns",
        "columns.axial",
        "columns.anisotropy",
        "columns.transverse",
        "columns.heat_capacity",
        "scaling",
        "scaling.method",
        "split",
        "split.test_fraction",
        "split.seed",
        "model",
        "model.strategy",
        "model.seed",
        "model.decision_tree",
        "model.decision_tree.max_depth",
        "model.decision_tree.min_samples_split",
        "model.decision_tree.min_samples_leaf",
        "model.stacking",
        "model.stacking.folds",
        "export",
        "export.output_dir",
    ]
    .iter()
    .map(|k| (*k).to_string())
    .collect();

    for prefix in [
        "model.gradient_boosting",
        "model.xgboost",
        "model.stacking.gradient_boosting",
        "model.stacking.xgboost",
    ] {
        keys.push(prefix.to_string());
        keys.extend(BOOSTING_KEYS.iter().map(|k| format!("{prefix}.{k}")));
    }
    for prefix in ["model.catboost", "model.stacking.catboost"] {
        keys.push(prefix.to_string());
        keys.extend(CATBOOST_KEYS.iter().map(|k| format!("{prefix}.{k}")));
    }

    keys.into_iter().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
/// Ties resolve to the lexicographically smallest key.
pub fn suggest_correction(unknown: &str, known: &HashSet<String>) -> Option<String> {
    let mut candidates: Vec<&String> = known.iter().collect();
    candidates.sort();
    let mut best: Option<(&str, usize)> = None;
    for k in candidates {
        let dist = levenshtein(unknown, k);
        if dist <= 3 && best.map_or(true, |(_, best_dist)| dist < best_dist) {
            best = Some((k, dist));
        }
    }
    best.map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// This does NOT fail on unknown keys; it only warns.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are handled by serde later
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Column Name Validation
// ============================================================================

/// Check column names for emptiness and collisions.
///
/// Returns (errors, warnings): errors make the run impossible; warnings flag
/// choices that are legal but probably unintended.
pub fn validate_column_names(config: &RunConfig) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let depth = config.run.depth_column.trim();
    if depth.is_empty() {
        errors.push("run.depth_column must not be empty".to_string());
    }

    let targets: Vec<(&str, &str)> = match config.run.mode {
        PredictionMode::Axial => vec![("columns.axial", &config.columns.axial)],
        PredictionMode::Anisotropy => vec![
            ("columns.anisotropy", &config.columns.anisotropy),
            ("columns.axial", &config.columns.axial),
            ("columns.transverse", &config.columns.transverse),
        ],
        PredictionMode::HeatCapacity => vec![("columns.heat_capacity", &config.columns.heat_capacity)],
    };
    for (key, name) in &targets {
        if name.trim().is_empty() {
            errors.push(format!("{key} must not be empty for mode {:?}", config.run.mode));
        } else if name.trim() == depth {
            errors.push(format!("{key} = '{name}' collides with run.depth_column"));
        }
    }

    if config.lithology.enabled {
        let lith = config.lithology.column.trim();
        if lith.is_empty() {
            errors.push("lithology.column must not be empty when lithology.enabled = true".to_string());
        } else if lith == depth {
            errors.push(format!("lithology.column = '{lith}' collides with run.depth_column"));
        }
    }

    for feature in &config.run.features {
        let f = feature.trim();
        if f == depth {
            warnings.push(ValidationWarning {
                field: "run.features".to_string(),
                message: format!("run.features lists the depth column '{f}'; it will be ignored"),
                suggestion: None,
            });
        }
        if targets.iter().any(|(_, t)| t.trim() == f) {
            warnings.push(ValidationWarning {
                field: "run.features".to_string(),
                message: format!("run.features lists target column '{f}'"),
                suggestion: None,
            });
        }
    }

    (errors, warnings)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_identical() {
        assert_eq!(levenshtein("hello", "hello"), 0);
    }

    #[test]
    fn test_levenshtein_one_edit() {
        assert_eq!(levenshtein("strategi", "strategy"), 1);
    }

    #[test]
    fn test_levenshtein_counts_chars_not_bytes() {
        assert_eq!(levenshtein("Код", "Кол"), 1);
    }

    #[test]
    fn test_levenshtein_empty() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let toml: toml::Value = r#"
            [model.catboost]
            depth = 4
        "#
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert!(keys.contains(&"model".to_string()));
        assert!(keys.contains(&"model.catboost".to_string()));
        assert!(keys.contains(&"model.catboost.depth".to_string()));
    }

    #[test]
    fn test_known_keys_cover_nested_boosting() {
        let known = known_config_keys();
        assert!(known.contains("model.stacking.xgboost.n_estimators"));
        assert!(known.contains("model.stacking.catboost.l2_leaf_reg"));
        assert!(!known.contains("model.stacking.xgboost.depth"));
    }

    #[test]
    fn test_unknown_key_suggestion() {
        let warnings = validate_unknown_keys("[split]\ntest_fracton = 0.2\n");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].suggestion.as_deref(), Some("split.test_fraction"));
    }

    #[test]
    fn test_column_collision_is_error() {
        let mut config = RunConfig::default();
        config.columns.axial = "DEPT".to_string();
        let (errors, _) = validate_column_names(&config);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_feature_listing_depth_warns() {
        let mut config = RunConfig::default();
        config.run.features = vec!["DEPT".to_string(), "GR".to_string()];
        let (errors, warnings) = validate_column_names(&config);
        assert!(errors.is_empty());
        assert_eq!(warnings.len(), 1);
    }
}
