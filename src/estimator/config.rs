//! Tree Configuration
//!
//! Hyperparameters of a single oblique tree, their validation, and the JSON
//! persistence trait shared by configurations and fitted models.
use crate::criterion::CriterionKind;
use crate::errors::ObliqueTreeError;
use crate::projection::ProjectionPolicy;
use crate::utils::{validate_float_parameter, validate_min_usize_parameter, validate_positive_float_parameter};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Number of candidate projections drawn at every node.
///
/// Oblique candidates are not tied to single features, so a count larger
/// than the number of features is allowed.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug)]
pub enum MaxFeatures {
    /// One candidate per feature.
    All,
    Sqrt,
    Log2,
    Count(usize),
    /// Fraction of the number of features, in `(0, 1]`.
    Fraction(f64),
}

impl MaxFeatures {
    pub fn validate(&self) -> Result<(), ObliqueTreeError> {
        match self {
            MaxFeatures::Count(k) => validate_min_usize_parameter(*k, 1, "max_features"),
            MaxFeatures::Fraction(f) => {
                if f.is_nan() || *f <= 0.0 || *f > 1.0 {
                    Err(ObliqueTreeError::InvalidParameter(
                        "max_features".to_string(),
                        "fraction within (0, 1]".to_string(),
                        f.to_string(),
                    ))
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }

    /// Number of candidates for data with `n_features` features, at least one.
    pub fn resolve(&self, n_features: usize) -> usize {
        let n = n_features as f64;
        let k = match self {
            MaxFeatures::All => n_features,
            MaxFeatures::Sqrt => n.sqrt().floor() as usize,
            MaxFeatures::Log2 => n.log2().floor() as usize,
            MaxFeatures::Count(k) => *k,
            MaxFeatures::Fraction(f) => (f * n) as usize,
        };
        k.max(1)
    }
}

fn default_criterion() -> CriterionKind {
    CriterionKind::Gini
}
fn default_max_features() -> MaxFeatures {
    MaxFeatures::All
}
fn default_max_depth() -> Option<usize> {
    None
}
fn default_min_samples_split() -> usize {
    2
}
fn default_min_samples_leaf() -> usize {
    1
}
fn default_max_leaf_nodes() -> Option<usize> {
    None
}
fn default_timeout() -> Option<f32> {
    None
}

/// Configuration for an `ObliqueDecisionTree`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Impurity criterion, which also decides classification or regression.
    #[serde(default = "default_criterion")]
    pub criterion: CriterionKind,
    /// Candidate projections per node.
    #[serde(default = "default_max_features")]
    pub max_features: MaxFeatures,
    /// Maximum depth, unlimited when `None`.
    #[serde(default = "default_max_depth")]
    pub max_depth: Option<usize>,
    /// Minimum number of samples a node needs to be split.
    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: usize,
    /// Minimum number of samples in each child of a split.
    #[serde(default = "default_min_samples_leaf")]
    pub min_samples_leaf: usize,
    /// Minimum weighted number of samples in each child of a split.
    #[serde(default)]
    pub min_weight_leaf: f64,
    /// Splits must decrease the weighted impurity by at least this much.
    #[serde(default)]
    pub min_impurity_decrease: f64,
    /// Grow best-first with at most this many leaves.
    #[serde(default = "default_max_leaf_nodes")]
    pub max_leaf_nodes: Option<usize>,
    /// How candidate projections are sampled.
    #[serde(default)]
    pub projection: ProjectionPolicy,
    /// Seed of the splitter random stream.
    #[serde(default)]
    pub seed: u64,
    /// Hard limit for fitting time (seconds).
    #[serde(default = "default_timeout")]
    pub timeout: Option<f32>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        TreeConfig {
            criterion: default_criterion(),
            max_features: default_max_features(),
            max_depth: default_max_depth(),
            min_samples_split: default_min_samples_split(),
            min_samples_leaf: default_min_samples_leaf(),
            min_weight_leaf: 0.0,
            min_impurity_decrease: 0.0,
            max_leaf_nodes: default_max_leaf_nodes(),
            projection: ProjectionPolicy::default(),
            seed: 0,
            timeout: default_timeout(),
        }
    }
}

impl TreeConfig {
    /// Check every parameter that does not depend on the data.
    pub fn validate(&self) -> Result<(), ObliqueTreeError> {
        validate_min_usize_parameter(self.min_samples_split, 2, "min_samples_split")?;
        validate_min_usize_parameter(self.min_samples_leaf, 1, "min_samples_leaf")?;
        validate_positive_float_parameter(self.min_weight_leaf, "min_weight_leaf")?;
        validate_positive_float_parameter(self.min_impurity_decrease, "min_impurity_decrease")?;
        if let Some(d) = self.max_depth {
            validate_min_usize_parameter(d, 1, "max_depth")?;
        }
        if let Some(m) = self.max_leaf_nodes {
            validate_min_usize_parameter(m, 2, "max_leaf_nodes")?;
        }
        if let Some(t) = self.timeout {
            validate_float_parameter(t as f64, 0.0, f64::MAX, "timeout")?;
        }
        self.max_features.validate()?;
        self.projection.validate()
    }
}

/// JSON persistence.
pub trait TreeIO: Serialize + DeserializeOwned + Sized {
    /// Check a value read from outside before handing it out.
    fn validate_loaded(&self) -> Result<(), ObliqueTreeError> {
        Ok(())
    }

    /// Save as a json object to a file.
    ///
    /// * `path` - Path to save to.
    fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ObliqueTreeError> {
        fs::write(path, self.json_dump()?).map_err(|e| ObliqueTreeError::UnableToWrite(e.to_string()))
    }

    /// Dump as a json object.
    fn json_dump(&self) -> Result<String, ObliqueTreeError> {
        serde_json::to_string(self).map_err(|e| ObliqueTreeError::UnableToWrite(e.to_string()))
    }

    /// Load from a json string.
    ///
    /// * `json_str` - String object, which can be serialized to json.
    fn from_json(json_str: &str) -> Result<Self, ObliqueTreeError> {
        let value = serde_json::from_str::<Self>(json_str).map_err(|e| ObliqueTreeError::UnableToRead(e.to_string()))?;
        value.validate_loaded()?;
        Ok(value)
    }

    /// Load from a path to a json object.
    ///
    /// * `path` - Path to load from.
    fn load<P: AsRef<Path>>(path: P) -> Result<Self, ObliqueTreeError> {
        let json_str = fs::read_to_string(path).map_err(|e| ObliqueTreeError::UnableToRead(e.to_string()))?;
        Self::from_json(&json_str)
    }
}

impl TreeIO for TreeConfig {
    fn validate_loaded(&self) -> Result<(), ObliqueTreeError> {
        self.validate()
    }
}

impl TreeIO for crate::tree::Tree {
    fn validate_loaded(&self) -> Result<(), ObliqueTreeError> {
        self.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::PatchConfig;
    use tempfile::tempdir;

    #[test]
    fn test_tree_config_default() {
        let config = TreeConfig::default();
        assert_eq!(config.criterion, CriterionKind::Gini);
        assert_eq!(config.max_features, MaxFeatures::All);
        assert_eq!(config.min_samples_split, 2);
        assert_eq!(
            config.projection,
            ProjectionPolicy::SparseRandom {
                feature_combinations: None
            }
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tree_config_defaults_from_partial_json() {
        let json = r#"{"criterion": "Entropy", "max_depth": 4}"#;
        let config = TreeConfig::from_json(json).unwrap();
        assert_eq!(config.criterion, CriterionKind::Entropy);
        assert_eq!(config.max_depth, Some(4));
        assert_eq!(config.min_samples_leaf, 1);
        assert_eq!(config.timeout, None);
    }

    #[test]
    fn test_tree_io_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("config.json");
        let config = TreeConfig {
            projection: ProjectionPolicy::Patch(PatchConfig::two_dimensional(4, 4, 1, 2, 1, 3)),
            max_features: MaxFeatures::Count(20),
            ..Default::default()
        };
        config.save(&file_path).unwrap();
        let config2 = TreeConfig::load(&file_path).unwrap();
        assert_eq!(config, config2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let bad = [
            TreeConfig {
                min_samples_leaf: 0,
                ..Default::default()
            },
            TreeConfig {
                min_samples_split: 1,
                ..Default::default()
            },
            TreeConfig {
                min_weight_leaf: -1.0,
                ..Default::default()
            },
            TreeConfig {
                min_impurity_decrease: f64::NAN,
                ..Default::default()
            },
            TreeConfig {
                max_depth: Some(0),
                ..Default::default()
            },
            TreeConfig {
                max_leaf_nodes: Some(1),
                ..Default::default()
            },
            TreeConfig {
                max_features: MaxFeatures::Fraction(1.5),
                ..Default::default()
            },
            TreeConfig {
                max_features: MaxFeatures::Count(0),
                ..Default::default()
            },
            TreeConfig {
                projection: ProjectionPolicy::SparseRandom {
                    feature_combinations: Some(0.0),
                },
                ..Default::default()
            },
            TreeConfig {
                projection: ProjectionPolicy::Patch(PatchConfig::two_dimensional(2, 2, 3, 3, 1, 1)),
                ..Default::default()
            },
        ];
        for cfg in bad {
            assert!(
                matches!(cfg.validate(), Err(ObliqueTreeError::InvalidParameter(..))),
                "{:?}",
                cfg
            );
        }
    }

    #[test]
    fn test_max_features_resolve() {
        assert_eq!(MaxFeatures::All.resolve(10), 10);
        assert_eq!(MaxFeatures::Sqrt.resolve(10), 3);
        assert_eq!(MaxFeatures::Log2.resolve(10), 3);
        assert_eq!(MaxFeatures::Log2.resolve(1), 1);
        assert_eq!(MaxFeatures::Count(25).resolve(10), 25);
        assert_eq!(MaxFeatures::Fraction(0.05).resolve(10), 1);
    }
}
