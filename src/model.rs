//! Frozen recovery model artifacts
//!
//! The offline trainer exports a single JSON artifact holding the fitted
//! preprocessor (median imputation, standard scaling, one-hot encoding), the
//! dense network weights and the label normalization constants. Artifacts are
//! loaded once at startup and shared read-only behind an `Arc`.
//!
//! Artifact layout (`recovery_model.json`):
//!
//! ```json
//! {
//!   "feature_names_in": ["sleep_h", "sex", ...],
//!   "numeric": {"columns": [...], "medians": [...], "means": [...], "scales": [...]},
//!   "categorical": {"columns": [...], "categories": [[...], ...]},
//!   "layers": [{"weights": [[...]], "bias": [...]}, ...],
//!   "y_mean": 70.2, "y_std": 11.8, "global_mean": 70.2,
//!   "all_muscles": ["Chest", "Back", ...]
//! }
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{ModelError, Result};

/// File name of the exported artifact
pub const ARTIFACT_FILE: &str = "recovery_model.json";

/// Directory checked before the model root
pub const LATEST_DIR: &str = "latest";

/// A raw feature before preprocessing
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Category(String),
}

impl FeatureValue {
    fn as_number(&self) -> f64 {
        match self {
            FeatureValue::Number(n) => *n,
            FeatureValue::Category(s) => s.trim().parse().unwrap_or(f64::NAN),
        }
    }

    fn as_category(&self) -> String {
        match self {
            FeatureValue::Number(n) => n.to_string(),
            FeatureValue::Category(s) => s.clone(),
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        FeatureValue::Number(value)
    }
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        FeatureValue::Category(value.to_string())
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Number(n) => write!(f, "{}", n),
            FeatureValue::Category(s) => f.write_str(s),
        }
    }
}

/// Fitted imputation and scaling for numeric columns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumericStage {
    pub columns: Vec<String>,
    pub medians: Vec<f64>,
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
}

/// Fitted one-hot vocabulary for categorical columns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoricalStage {
    pub columns: Vec<String>,
    pub categories: Vec<Vec<String>>,
}

/// One fully connected layer, `weights[out][in]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
}

impl DenseLayer {
    fn input_dim(&self) -> usize {
        self.weights.first().map_or(0, Vec::len)
    }

    fn forward(&self, input: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(input).map(|(w, x)| w * x).sum::<f64>() + b)
            .collect()
    }
}

/// Preprocessor, network and normalization constants of the frozen model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifacts {
    /// Input columns in the order the preprocessor was fitted on
    pub feature_names_in: Vec<String>,
    pub numeric: NumericStage,
    pub categorical: CategoricalStage,
    pub layers: Vec<DenseLayer>,
    pub y_mean: f64,
    pub y_std: f64,
    /// Mean training label, the bias of a user with no history
    pub global_mean: f64,
    /// Muscle-group vocabulary, one flag feature per entry
    pub all_muscles: Vec<String>,

    #[serde(skip)]
    fingerprint: String,
    #[serde(skip)]
    source: Option<PathBuf>,
    #[serde(skip)]
    column_index: HashMap<String, usize>,
}

impl ModelArtifacts {
    /// Load `recovery_model.json` from `<dir>/latest/`, else from `<dir>/`
    pub fn load_from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let searched = vec![dir.join(LATEST_DIR).join(ARTIFACT_FILE), dir.join(ARTIFACT_FILE)];

        let path = searched.iter().find(|p| p.is_file()).cloned().ok_or_else(|| {
            ModelError::ArtifactNotFound {
                name: ARTIFACT_FILE.to_string(),
                searched: searched.clone(),
            }
        })?;

        let bytes = fs::read(&path)?;
        let mut artifacts = Self::from_slice(&bytes)?;
        artifacts.source = Some(path.clone());

        info!(
            path = %path.display(),
            fingerprint = %artifacts.fingerprint(),
            features = artifacts.feature_names_in.len(),
            layers = artifacts.layers.len(),
            "Loaded recovery model"
        );
        Ok(artifacts)
    }

    /// Parse and validate an artifact from raw JSON bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let mut artifacts: ModelArtifacts =
            serde_json::from_slice(bytes).map_err(|e| ModelError::InvalidArtifact {
                reason: e.to_string(),
            })?;
        artifacts.fingerprint = format!("{:x}", Sha256::digest(bytes));
        artifacts.validate()?;
        artifacts.column_index = artifacts
            .feature_names_in
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Ok(artifacts)
    }

    fn validate(&self) -> std::result::Result<(), ModelError> {
        let invalid = |reason: String| ModelError::InvalidArtifact { reason };
        let mismatch = |stage: &str, expected: usize, actual: usize| ModelError::DimensionMismatch {
            stage: stage.to_string(),
            expected,
            actual,
        };

        let n = self.numeric.columns.len();
        for (stage, len) in [
            ("numeric medians", self.numeric.medians.len()),
            ("numeric means", self.numeric.means.len()),
            ("numeric scales", self.numeric.scales.len()),
        ] {
            if len != n {
                return Err(mismatch(stage, n, len));
            }
        }
        if self.categorical.categories.len() != self.categorical.columns.len() {
            return Err(mismatch(
                "categorical vocabulary",
                self.categorical.columns.len(),
                self.categorical.categories.len(),
            ));
        }

        for column in self.numeric.columns.iter().chain(&self.categorical.columns) {
            if !self.feature_names_in.contains(column) {
                return Err(invalid(format!("column '{}' is not an input feature", column)));
            }
        }

        if self.layers.is_empty() {
            return Err(invalid("network has no layers".to_string()));
        }
        let mut width = self.encoded_width();
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.weights.len() != layer.bias.len() {
                return Err(mismatch(&format!("layer {} bias", i), layer.weights.len(), layer.bias.len()));
            }
            if let Some(row) = layer.weights.iter().find(|row| row.len() != width) {
                return Err(mismatch(&format!("layer {} input", i), width, row.len()));
            }
            width = layer.weights.len();
        }
        if width != 1 {
            return Err(mismatch("network output", 1, width));
        }
        if self.layers[0].input_dim() != self.encoded_width() {
            return Err(mismatch("network input", self.encoded_width(), self.layers[0].input_dim()));
        }
        Ok(())
    }

    /// Width of the preprocessed vector
    pub fn encoded_width(&self) -> usize {
        self.numeric.columns.len() + self.categorical.categories.iter().map(Vec::len).sum::<usize>()
    }

    /// SHA-256 of the artifact bytes
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// File the artifact was loaded from
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn feature_columns(&self) -> &[String] {
        &self.feature_names_in
    }

    /// Select features in input-column order; absent features become 0
    pub fn feature_row(&self, features: &BTreeMap<String, FeatureValue>) -> Vec<FeatureValue> {
        self.feature_names_in
            .iter()
            .map(|name| {
                features
                    .get(name)
                    .cloned()
                    .unwrap_or(FeatureValue::Number(0.0))
            })
            .collect()
    }

    fn column<'r>(&self, row: &'r [FeatureValue], name: &str) -> Option<&'r FeatureValue> {
        self.column_index.get(name).and_then(|i| row.get(*i))
    }

    /// Impute, scale and one-hot encode a feature row
    pub fn transform(&self, row: &[FeatureValue]) -> Result<Vec<f64>> {
        if row.len() != self.feature_names_in.len() {
            return Err(ModelError::DimensionMismatch {
                stage: "feature row".to_string(),
                expected: self.feature_names_in.len(),
                actual: row.len(),
            }
            .into());
        }

        let mut encoded = Vec::with_capacity(self.encoded_width());

        for (i, name) in self.numeric.columns.iter().enumerate() {
            let mut x = self.column(row, name).map_or(f64::NAN, FeatureValue::as_number);
            if x.is_nan() {
                x = self.numeric.medians[i];
            }
            let scale = if self.numeric.scales[i] == 0.0 {
                1.0
            } else {
                self.numeric.scales[i]
            };
            encoded.push((x - self.numeric.means[i]) / scale);
        }

        for (name, categories) in self.categorical.columns.iter().zip(&self.categorical.categories) {
            let value = self.column(row, name).map(FeatureValue::as_category);
            // Unknown categories encode as all zeros
            encoded.extend(
                categories
                    .iter()
                    .map(|c| if value.as_deref() == Some(c.as_str()) { 1.0 } else { 0.0 }),
            );
        }

        Ok(encoded)
    }

    /// Run the network on a preprocessed vector, returning the normalized score
    pub fn score(&self, encoded: &[f64]) -> Result<f64> {
        if encoded.len() != self.encoded_width() {
            return Err(ModelError::DimensionMismatch {
                stage: "network input".to_string(),
                expected: self.encoded_width(),
                actual: encoded.len(),
            }
            .into());
        }

        let last = self.layers.len() - 1;
        let mut activations = encoded.to_vec();
        for (i, layer) in self.layers.iter().enumerate() {
            activations = layer.forward(&activations);
            if i < last {
                activations.iter_mut().for_each(|a| *a = a.max(0.0));
            }
        }
        debug!(normalized = activations[0], "Network output");
        Ok(activations[0])
    }

    /// Map a normalized score back to the label scale
    pub fn denormalize(&self, normalized: f64) -> f64 {
        normalized * self.y_std + self.y_mean
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    /// Small artifact: two numeric columns, one categorical, a 2-unit hidden layer
    pub(crate) fn sample_artifact_json() -> serde_json::Value {
        json!({
            "feature_names_in": ["sleep_h", "hrv", "sex"],
            "numeric": {
                "columns": ["sleep_h", "hrv"],
                "medians": [7.0, 60.0],
                "means": [7.0, 60.0],
                "scales": [1.0, 10.0]
            },
            "categorical": {
                "columns": ["sex"],
                "categories": [["female", "male"]]
            },
            "layers": [
                {"weights": [[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0]], "bias": [0.0, 0.0]},
                {"weights": [[1.0, 1.0]], "bias": [0.5]}
            ],
            "y_mean": 70.0,
            "y_std": 10.0,
            "global_mean": 68.0,
            "all_muscles": ["Chest", "Back"]
        })
    }

    pub(crate) fn sample_artifacts() -> ModelArtifacts {
        let bytes = serde_json::to_vec(&sample_artifact_json()).unwrap();
        ModelArtifacts::from_slice(&bytes).unwrap()
    }

    fn features(pairs: &[(&str, FeatureValue)]) -> BTreeMap<String, FeatureValue> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_transform_scales_and_encodes() {
        let model = sample_artifacts();
        let row = model.feature_row(&features(&[
            ("sleep_h", 8.0.into()),
            ("hrv", 80.0.into()),
            ("sex", "male".into()),
        ]));
        assert_eq!(model.transform(&row).unwrap(), vec![1.0, 2.0, 0.0, 1.0]);
    }

    #[test]
    fn test_unknown_category_and_nan_impute() {
        let model = sample_artifacts();
        let row = model.feature_row(&features(&[
            ("sleep_h", f64::NAN.into()),
            ("hrv", 60.0.into()),
            ("sex", "other".into()),
        ]));
        assert_eq!(model.transform(&row).unwrap(), vec![0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_missing_features_default_to_zero() {
        let model = sample_artifacts();
        let row = model.feature_row(&BTreeMap::new());
        assert_eq!(row, vec![FeatureValue::Number(0.0); 3]);
        assert_eq!(model.transform(&row).unwrap(), vec![-7.0, -6.0, 0.0, 0.0]);
    }

    #[test]
    fn test_score_applies_relu_between_layers() {
        let model = sample_artifacts();
        // Hidden units (1.0, -6.0) -> ReLU -> (1.0, 0.0) -> 1.5
        assert_eq!(model.score(&[1.0, -6.0, 0.0, 1.0]).unwrap(), 1.5);
        assert_eq!(model.denormalize(1.5), 85.0);
        assert!(model.score(&[1.0]).is_err());
    }

    #[test]
    fn test_rejects_inconsistent_artifact() {
        let mut value = sample_artifact_json();
        value["numeric"]["scales"] = json!([1.0]);
        let bytes = serde_json::to_vec(&value).unwrap();
        assert!(ModelArtifacts::from_slice(&bytes).is_err());

        let mut value = sample_artifact_json();
        value["layers"][1]["weights"] = json!([[1.0, 1.0], [1.0, 1.0]]);
        value["layers"][1]["bias"] = json!([0.0, 0.0]);
        let bytes = serde_json::to_vec(&value).unwrap();
        assert!(ModelArtifacts::from_slice(&bytes).is_err());
    }

    #[test]
    fn test_load_prefers_latest_dir() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(ARTIFACT_FILE),
            serde_json::to_vec(&sample_artifact_json()).unwrap(),
        )
        .unwrap();

        let mut latest = sample_artifact_json();
        latest["global_mean"] = json!(75.0);
        fs::create_dir(dir.path().join(LATEST_DIR)).unwrap();
        fs::write(
            dir.path().join(LATEST_DIR).join(ARTIFACT_FILE),
            serde_json::to_vec(&latest).unwrap(),
        )
        .unwrap();

        let model = ModelArtifacts::load_from_dir(dir.path()).unwrap();
        assert_eq!(model.global_mean, 75.0);
        assert_eq!(model.fingerprint().len(), 64);
        assert!(model.source().unwrap().ends_with("latest/recovery_model.json"));
    }

    #[test]
    fn test_load_missing_artifact() {
        let dir = TempDir::new().unwrap();
        let err = ModelArtifacts::load_from_dir(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            crate::error::LiftError::Model(ModelError::ArtifactNotFound { .. })
        ));
    }
}
