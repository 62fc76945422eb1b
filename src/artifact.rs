//! Built-in artifact loading
//!
//! Loaders turn a serialized model file into a [`ModelHandle`] and score
//! frames against it, without any user code involved. The registry maps
//! artifact extensions to loaders; what counts as an artifact at all is a
//! wider, fixed set so that unsupported formats are still detected (and
//! reported) rather than silently ignored.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use crate::config::TargetType;
use crate::error::{Result, RunnerError};
use crate::frame::{Column, Frame, PREDICTIONS_COLUMN};
use crate::hooks::{Concurrency, ModelHandle, ScoreContext};

/// Extensions that mark a file as a candidate model artifact.
///
/// Broader than what the default registry can load: a candidate with no
/// registered loader participates in ambiguity detection and produces an
/// unsupported-artifact error instead of being treated as a plain file.
pub const CANDIDATE_EXTENSIONS: &[&str] = &["json", "pkl", "joblib", "pth", "pt", "h5", "onnx"];

/// Whether a file looks like a model artifact by extension
pub fn is_candidate(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            CANDIDATE_EXTENSIONS
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// A built-in model format: deserializes one artifact file and scores frames
pub trait ArtifactLoader: Send + Sync {
    /// Loader name for logs
    fn name(&self) -> &'static str;

    /// Artifact extensions this loader claims
    fn extensions(&self) -> &'static [&'static str];

    /// Deserialize the artifact into a model handle
    fn load(&self, artifact: &Path) -> Result<ModelHandle>;

    /// Score a frame against a handle previously produced by `load`
    fn score(&self, frame: &Frame, model: &ModelHandle, ctx: &ScoreContext) -> Result<Frame>;

    /// Whether `score` tolerates concurrent callers
    fn concurrency(&self) -> Concurrency {
        Concurrency::Reentrant
    }
}

/// Maps artifact extensions to registered loaders
pub struct LoaderRegistry {
    loaders: Vec<Arc<dyn ArtifactLoader>>,
}

impl LoaderRegistry {
    /// Registry with no loaders at all
    pub fn empty() -> Self {
        Self {
            loaders: Vec::new(),
        }
    }

    /// Registry with the built-in loaders
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(CoefficientsLoader));
        registry
    }

    /// Register a loader; later registrations win on extension conflicts
    pub fn register(&mut self, loader: Arc<dyn ArtifactLoader>) {
        debug!(
            loader = loader.name(),
            extensions = ?loader.extensions(),
            "Registering artifact loader"
        );
        self.loaders.push(loader);
    }

    /// Find the loader claiming this artifact's extension
    pub fn loader_for(&self, artifact: &Path) -> Option<Arc<dyn ArtifactLoader>> {
        let ext = artifact.extension().and_then(|ext| ext.to_str())?;
        self.loaders
            .iter()
            .rev()
            .find(|loader| {
                loader
                    .extensions()
                    .iter()
                    .any(|claimed| claimed.eq_ignore_ascii_case(ext))
            })
            .cloned()
    }

    /// All extensions the registered loaders claim
    pub fn supported_extensions(&self) -> Vec<&'static str> {
        let mut extensions: Vec<&'static str> = self
            .loaders
            .iter()
            .flat_map(|loader| loader.extensions().iter().copied())
            .collect();
        extensions.sort_unstable();
        extensions.dedup();
        extensions
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Reference loader for linear models stored as JSON coefficient files.
///
/// Artifact schema: `{"intercept": 0.5, "coefficients": {"feature": 1.0}}`.
/// Regression and anomaly targets get the raw linear combination; binary
/// targets get a sigmoid-squashed positive-class probability.
pub struct CoefficientsLoader;

#[derive(Debug, Deserialize)]
struct CoefficientsModel {
    #[serde(default)]
    intercept: f64,
    coefficients: HashMap<String, f64>,
}

impl CoefficientsModel {
    fn predict_row(&self, frame: &Frame, row: usize) -> Result<f64> {
        let mut total = self.intercept;
        for (feature, weight) in &self.coefficients {
            let column = frame.column(feature).ok_or_else(|| {
                RunnerError::invalid_input(format!("input is missing feature column '{feature}'"))
            })?;
            let values = column.as_floats().ok_or_else(|| {
                RunnerError::invalid_input(format!("feature column '{feature}' is not numeric"))
            })?;
            total += weight * values[row];
        }
        Ok(total)
    }
}

impl ArtifactLoader for CoefficientsLoader {
    fn name(&self) -> &'static str {
        "coefficients"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["json"]
    }

    fn load(&self, artifact: &Path) -> Result<ModelHandle> {
        let raw = std::fs::read_to_string(artifact).map_err(|e| {
            RunnerError::model_load(format!("cannot read {}: {e}", artifact.display()))
        })?;
        let model: CoefficientsModel = serde_json::from_str(&raw).map_err(|e| {
            RunnerError::model_load(format!(
                "{} is not a coefficients artifact: {e}",
                artifact.display()
            ))
        })?;

        info!(
            artifact = %artifact.display(),
            features = model.coefficients.len(),
            "Loaded coefficients model"
        );
        Ok(ModelHandle::new(model))
    }

    fn score(&self, frame: &Frame, model: &ModelHandle, ctx: &ScoreContext) -> Result<Frame> {
        let model = model
            .downcast_ref::<CoefficientsModel>()
            .ok_or_else(|| RunnerError::internal("model handle is not a coefficients model"))?;

        let mut raw = Vec::with_capacity(frame.n_rows());
        for row in 0..frame.n_rows() {
            raw.push(model.predict_row(frame, row)?);
        }

        let values = match ctx.target_type {
            TargetType::Binary => raw.into_iter().map(sigmoid).collect(),
            _ => raw,
        };
        Frame::from_columns(vec![Column::float(PREDICTIONS_COLUMN, values)])
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}
