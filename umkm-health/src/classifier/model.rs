//! Pre-trained classifier artifact.
//!
//! The trained estimator is exported to JSON and evaluated here. Three
//! estimator shapes are understood:
//!
//! - `decision_tree`: flat node array, node 0 is the root, `x <= threshold` goes left
//! - `random_forest`: several trees, leaf weights normalized per tree and averaged
//! - `linear`: one coefficient row per class plus intercepts, argmax wins
//!
//! ```json
//! {
//!   "format_version": 1,
//!   "features": ["net_profit_margin", "current_ratio", "debt_to_equity", "roa", "asset_turnover"],
//!   "classes": ["Sehat", "Cukup Sehat", "Rentan"],
//!   "estimator": { "type": "decision_tree", "nodes": [ ... ] }
//! }
//! ```
//!
//! The artifact is read once per process through [`ModelHandle`]. When the
//! local file is missing and a remote URL is configured, it is downloaded and
//! written to the local path first.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::ratios::FEATURE_ORDER;

/// Supported artifact format version.
pub const FORMAT_VERSION: u32 = 1;

/// Errors raised while obtaining or validating the artifact.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model artifact not found at {0}")]
    NotFound(String),

    #[error("failed to read model artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to download model artifact: {0}")]
    Download(String),

    #[error("model artifact is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("model artifact is invalid: {0}")]
    Invalid(String),
}

// ============================================================================
// Artifact Types
// ============================================================================

/// One node of an exported decision tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: Vec<f64>,
    },
}

/// A decision tree as a flat node array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Walk from the root to a leaf and return its class weights.
    fn leaf_for(&self, features: &[f64; 5]) -> &[f64] {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                TreeNode::Leaf { value } => return value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if features[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    fn validate(&self, class_count: usize) -> Result<(), ModelError> {
        if self.nodes.is_empty() {
            return Err(ModelError::Invalid("tree has no nodes".into()));
        }

        for (index, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Leaf { value } => {
                    if value.len() != class_count {
                        return Err(ModelError::Invalid(format!(
                            "leaf {} has {} weights, expected {}",
                            index,
                            value.len(),
                            class_count
                        )));
                    }
                }
                TreeNode::Split {
                    feature,
                    left,
                    right,
                    ..
                } => {
                    if *feature >= FEATURE_ORDER.len() {
                        return Err(ModelError::Invalid(format!(
                            "node {} splits on unknown feature {}",
                            index, feature
                        )));
                    }
                    // Children after parents rules out cycles
                    for child in [*left, *right] {
                        if child <= index || child >= self.nodes.len() {
                            return Err(ModelError::Invalid(format!(
                                "node {} has out-of-order child {}",
                                index, child
                            )));
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

/// Exported estimator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Estimator {
    DecisionTree(DecisionTree),
    RandomForest {
        trees: Vec<DecisionTree>,
    },
    Linear {
        coefficients: Vec<Vec<f64>>,
        intercepts: Vec<f64>,
    },
}

/// A loaded, validated classifier artifact. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub features: Vec<String>,
    pub classes: Vec<String>,
    pub estimator: Estimator,
}

impl ModelArtifact {
    /// Parse and validate an artifact from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ModelError> {
        let artifact: Self = serde_json::from_slice(bytes)?;
        artifact.validate()?;
        Ok(artifact)
    }

    /// Read and validate an artifact from disk.
    pub async fn from_path(path: &Path) -> Result<Self, ModelError> {
        let bytes = tokio::fs::read(path).await?;
        Self::from_slice(&bytes)
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.format_version != FORMAT_VERSION {
            return Err(ModelError::Invalid(format!(
                "unsupported format_version {}",
                self.format_version
            )));
        }

        if self.features != FEATURE_ORDER {
            return Err(ModelError::Invalid(format!(
                "feature order {:?} does not match {:?}",
                self.features, FEATURE_ORDER
            )));
        }

        let class_count = self.classes.len();
        if class_count == 0 {
            return Err(ModelError::Invalid("artifact declares no classes".into()));
        }

        match &self.estimator {
            Estimator::DecisionTree(tree) => tree.validate(class_count),
            Estimator::RandomForest { trees } => {
                if trees.is_empty() {
                    return Err(ModelError::Invalid("forest has no trees".into()));
                }
                trees.iter().try_for_each(|tree| tree.validate(class_count))
            }
            Estimator::Linear {
                coefficients,
                intercepts,
            } => {
                if coefficients.len() != class_count || intercepts.len() != class_count {
                    return Err(ModelError::Invalid(format!(
                        "linear model needs {} coefficient rows and intercepts",
                        class_count
                    )));
                }
                if coefficients.iter().any(|row| row.len() != FEATURE_ORDER.len()) {
                    return Err(ModelError::Invalid(
                        "every coefficient row needs one weight per feature".into(),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Per-class scores for a feature vector.
    pub fn scores(&self, features: &[f64; 5]) -> Vec<f64> {
        match &self.estimator {
            Estimator::DecisionTree(tree) => tree.leaf_for(features).to_vec(),
            Estimator::RandomForest { trees } => {
                let mut totals = vec![0.0; self.classes.len()];
                for tree in trees {
                    let leaf = tree.leaf_for(features);
                    let sum: f64 = leaf.iter().sum();
                    for (total, weight) in totals.iter_mut().zip(leaf) {
                        *total += if sum > 0.0 { weight / sum } else { 0.0 };
                    }
                }
                let n = trees.len() as f64;
                totals.into_iter().map(|t| t / n).collect()
            }
            Estimator::Linear {
                coefficients,
                intercepts,
            } => coefficients
                .iter()
                .zip(intercepts)
                .map(|(row, intercept)| {
                    row.iter().zip(features).map(|(w, x)| w * x).sum::<f64>() + intercept
                })
                .collect(),
        }
    }

    /// Predicted class label. Ties go to the lowest class index.
    pub fn predict(&self, features: &[f64; 5]) -> &str {
        let scores = self.scores(features);
        let mut best = 0;
        for (index, score) in scores.iter().enumerate().skip(1) {
            if *score > scores[best] {
                best = index;
            }
        }
        &self.classes[best]
    }
}

// ============================================================================
// Initialize-once Handle
// ============================================================================

/// Where the artifact comes from.
#[derive(Debug, Clone)]
pub struct ModelSource {
    /// Local file path
    pub path: PathBuf,
    /// Remote URL used when the local file is absent
    pub url: Option<String>,
    /// Download timeout
    pub download_timeout: Duration,
}

impl ModelSource {
    /// Local file only.
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            url: None,
            download_timeout: Duration::from_secs(60),
        }
    }

    /// Local file with a remote fallback.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }
}

/// Process-wide, read-only model handle.
///
/// Concurrent first callers wait on a single load. A failed load leaves the
/// cell empty so the next caller tries again.
pub struct ModelHandle {
    source: ModelSource,
    client: reqwest::Client,
    cell: OnceCell<Arc<ModelArtifact>>,
}

impl ModelHandle {
    pub fn new(source: ModelSource) -> Self {
        let client = crate::http::build_client(
            reqwest::Client::builder().timeout(source.download_timeout),
            "model download",
        );

        Self {
            source,
            client,
            cell: OnceCell::new(),
        }
    }

    /// Wrap an artifact that is already in memory.
    pub fn preloaded(artifact: ModelArtifact) -> Self {
        Self {
            source: ModelSource::local(PathBuf::new()),
            client: reqwest::Client::new(),
            cell: OnceCell::new_with(Some(Arc::new(artifact))),
        }
    }

    pub fn source(&self) -> &ModelSource {
        &self.source
    }

    /// Whether the artifact is already loaded.
    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    /// Get the artifact, loading it on first use.
    pub async fn get(&self) -> Result<Arc<ModelArtifact>, ModelError> {
        self.cell
            .get_or_try_init(|| async { self.load().await.map(Arc::new) })
            .await
            .cloned()
    }

    async fn load(&self) -> Result<ModelArtifact, ModelError> {
        let path = &self.source.path;

        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            match &self.source.url {
                Some(url) => self.download(url, path).await?,
                None => return Err(ModelError::NotFound(path.display().to_string())),
            }
        }

        let artifact = ModelArtifact::from_path(path).await?;
        info!(
            path = %path.display(),
            classes = artifact.classes.len(),
            "Model artifact loaded"
        );
        Ok(artifact)
    }

    async fn download(&self, url: &str, path: &Path) -> Result<(), ModelError> {
        info!(url, path = %path.display(), "Model artifact missing locally, downloading");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ModelError::Download(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            warn!(url, status = status.as_u16(), "Model download rejected");
            return Err(ModelError::Download(format!("HTTP {}", status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ModelError::Download(e.to_string()))?;

        // Validate before touching the filesystem
        ModelArtifact::from_slice(&bytes)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Only a complete artifact ever appears at `path`
        let partial = partial_path(path);
        if let Err(e) = write_then_rename(&partial, path, &bytes).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }

        debug!(bytes = bytes.len(), "Model artifact written");
        Ok(())
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

async fn write_then_rename(partial: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    tokio::fs::write(partial, bytes).await?;
    tokio::fs::rename(partial, path).await
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde_json::json;

    /// A tree that splits on net profit margin, then on debt to equity.
    pub fn tree_artifact_json() -> serde_json::Value {
        json!({
            "format_version": 1,
            "features": ["net_profit_margin", "current_ratio", "debt_to_equity", "roa", "asset_turnover"],
            "classes": ["Sehat", "Cukup Sehat", "Rentan"],
            "estimator": {
                "type": "decision_tree",
                "nodes": [
                    { "feature": 0, "threshold": 0.05, "left": 1, "right": 2 },
                    { "value": [0.0, 1.0, 9.0] },
                    { "feature": 2, "threshold": 1.0, "left": 3, "right": 4 },
                    { "value": [8.0, 2.0, 0.0] },
                    { "value": [1.0, 6.0, 1.0] }
                ]
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::tree_artifact_json;
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn artifact(value: serde_json::Value) -> Result<ModelArtifact, ModelError> {
        ModelArtifact::from_slice(value.to_string().as_bytes())
    }

    #[test]
    fn test_decision_tree_prediction() {
        let model = artifact(tree_artifact_json()).unwrap();
        assert_eq!(model.predict(&[0.30, 1.2, 0.33, 0.15, 0.5]), "Sehat");
        assert_eq!(model.predict(&[0.30, 1.2, 2.0, 0.15, 0.5]), "Cukup Sehat");
        assert_eq!(model.predict(&[0.01, 1.2, 0.33, 0.15, 0.5]), "Rentan");
        // exactly on the threshold goes left
        assert_eq!(model.predict(&[0.05, 1.2, 0.33, 0.15, 0.5]), "Rentan");
    }

    #[test]
    fn test_random_forest_averages_normalized_leaves() {
        let model = artifact(json!({
            "format_version": 1,
            "features": FEATURE_ORDER,
            "classes": ["A", "B"],
            "estimator": {
                "type": "random_forest",
                "trees": [
                    { "nodes": [ { "value": [100.0, 0.0] } ] },
                    { "nodes": [ { "value": [1.0, 3.0] } ] },
                    { "nodes": [ { "value": [0.0, 2.0] } ] }
                ]
            }
        }))
        .unwrap();

        let scores = model.scores(&[0.0; 5]);
        assert!((scores[0] - 1.25 / 3.0).abs() < 1e-9);
        assert!((scores[1] - 1.75 / 3.0).abs() < 1e-9);
        assert_eq!(model.predict(&[0.0; 5]), "B");
    }

    #[test]
    fn test_linear_prediction() {
        let model = artifact(json!({
            "format_version": 1,
            "features": FEATURE_ORDER,
            "classes": ["Sehat", "Rentan"],
            "estimator": {
                "type": "linear",
                "coefficients": [[10.0, 1.0, -1.0, 5.0, 1.0], [-10.0, -1.0, 1.0, -5.0, -1.0]],
                "intercepts": [0.0, 0.0]
            }
        }))
        .unwrap();

        assert_eq!(model.predict(&[0.3, 1.2, 0.3, 0.15, 0.5]), "Sehat");
        assert_eq!(model.predict(&[-0.3, 0.2, 3.0, -0.1, 0.1]), "Rentan");
    }

    #[test]
    fn test_ties_pick_first_class() {
        let model = artifact(json!({
            "format_version": 1,
            "features": FEATURE_ORDER,
            "classes": ["First", "Second"],
            "estimator": { "type": "decision_tree", "nodes": [ { "value": [1.0, 1.0] } ] }
        }))
        .unwrap();
        assert_eq!(model.predict(&[0.0; 5]), "First");
    }

    #[test]
    fn test_rejects_wrong_feature_order() {
        let mut value = tree_artifact_json();
        value["features"] = json!(["current_ratio", "net_profit_margin", "debt_to_equity", "roa", "asset_turnover"]);
        assert!(matches!(artifact(value), Err(ModelError::Invalid(_))));
    }

    #[test]
    fn test_rejects_leaf_width_mismatch() {
        let mut value = tree_artifact_json();
        value["classes"] = json!(["Sehat", "Rentan"]);
        assert!(matches!(artifact(value), Err(ModelError::Invalid(_))));
    }

    #[test]
    fn test_rejects_backward_child() {
        let mut value = tree_artifact_json();
        value["estimator"]["nodes"][2]["left"] = json!(0);
        let err = artifact(value).unwrap_err();
        assert!(err.to_string().contains("out-of-order child"));
    }

    #[test]
    fn test_rejects_unknown_version() {
        let mut value = tree_artifact_json();
        value["format_version"] = json!(7);
        assert!(matches!(artifact(value), Err(ModelError::Invalid(_))));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            ModelArtifact::from_slice(b"\x80\x04joblib"),
            Err(ModelError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_handle_loads_local_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, tree_artifact_json().to_string()).unwrap();

        let handle = ModelHandle::new(ModelSource::local(&path));
        assert!(!handle.is_loaded());

        let first = handle.get().await.unwrap();
        // Removing the file does not matter once loaded
        std::fs::remove_file(&path).unwrap();
        let second = handle.get().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(handle.is_loaded());
    }

    #[tokio::test]
    async fn test_handle_missing_file_without_url() {
        let dir = tempfile::tempdir().unwrap();
        let handle = ModelHandle::new(ModelSource::local(dir.path().join("absent.json")));

        let err = handle.get().await.unwrap_err();
        assert!(matches!(err, ModelError::NotFound(_)));
        assert!(!handle.is_loaded());
    }

    #[tokio::test]
    async fn test_failed_load_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.json");
        let handle = ModelHandle::new(ModelSource::local(&path));

        assert!(handle.get().await.is_err());
        std::fs::write(&path, tree_artifact_json().to_string()).unwrap();
        assert!(handle.get().await.is_ok());
    }

    #[tokio::test]
    async fn test_download_leaves_only_complete_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/model.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tree_artifact_json()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("models").join("model.json");
        // Leftover from an interrupted earlier download
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();
        std::fs::write(partial_path(&target), "{\"version\": 1, \"kind\"").unwrap();

        let handle = ModelHandle::new(
            ModelSource::local(&target).with_url(format!("{}/model.json", server.uri())),
        );
        let loaded = handle.get().await.unwrap();
        assert_eq!(loaded.classes.len(), 3);

        let names: Vec<_> = std::fs::read_dir(target.parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("model.json")]);
        assert!(ModelArtifact::from_slice(&std::fs::read(&target).unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_invalid_download_writes_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("model.json");
        let handle = ModelHandle::new(ModelSource::local(&target).with_url(server.uri()));

        assert!(matches!(handle.get().await, Err(ModelError::Parse(_))));
        assert!(!target.exists());
        assert!(!partial_path(&target).exists());
    }

    #[test]
    fn test_partial_path_is_a_sibling() {
        let partial = partial_path(Path::new("/srv/models/model.json"));
        assert_eq!(partial, PathBuf::from("/srv/models/model.json.part"));
    }

    #[test]
    fn test_preloaded_handle() {
        let model = artifact(tree_artifact_json()).unwrap();
        let handle = ModelHandle::preloaded(model);
        assert!(handle.is_loaded());
        let loaded = tokio_test::block_on(handle.get()).unwrap();
        assert_eq!(loaded.classes.len(), 3);
    }
}
