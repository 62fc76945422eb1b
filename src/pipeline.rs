//! Staged scoring runs
//!
//! The pipeline drives the adapter through the fixed stage order and owns
//! the output contract: read input, transform, score, post-process, then
//! validate the final frame against the target type. Validation happens
//! exactly once, after post-processing; intermediate shapes are normalized
//! (single-column expansion, renames) but never rejected mid-run.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::adapter::PredictorAdapter;
use crate::config::{ClassLabels, TargetType};
use crate::content;
use crate::error::{Result, RunnerError};
use crate::frame::{Column, Frame, PREDICTIONS_COLUMN};
use crate::hooks::{ScoreContext, UnstructuredParams};

/// Probability rows may drift this far from summing to one
pub const PROBABILITY_SUM_TOLERANCE: f64 = 1e-3;

/// Result of a transform run: reshaped features and the optional
/// passed-through target column
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub features: Frame,
    pub target: Option<Column>,
}

/// Drives one adapter through the staged scoring sequence
pub struct Pipeline {
    adapter: Arc<PredictorAdapter>,
    target_type: TargetType,
    class_labels: Option<ClassLabels>,
}

impl Pipeline {
    pub fn new(
        adapter: Arc<PredictorAdapter>,
        target_type: TargetType,
        class_labels: Option<ClassLabels>,
    ) -> Result<Self> {
        if target_type.requires_labels() && class_labels.is_none() {
            return Err(RunnerError::config(
                "Binary target type requires class labels",
            ));
        }
        Ok(Self {
            adapter,
            target_type,
            class_labels,
        })
    }

    pub fn target_type(&self) -> TargetType {
        self.target_type
    }

    /// Full structured run: raw bytes in, validated predictions out
    pub fn predict(&self, raw: &[u8]) -> Result<Frame> {
        match self.target_type {
            TargetType::Regression | TargetType::Binary | TargetType::Anomaly => {}
            other => {
                return Err(RunnerError::invalid_input(format!(
                    "model has target type {other}, structured scoring is not available"
                )))
            }
        }

        let frame = self.adapter.read_input(raw)?;
        debug!(rows = frame.n_rows(), columns = frame.n_columns(), "Input parsed");

        let (frame, _) = self.adapter.transform(frame, None)?;
        let scored = self.adapter.score(frame, &self.score_context())?;
        let scored = self.normalize(scored)?;
        let scored = self.adapter.post_process(scored)?;

        validate_predictions(&scored, self.target_type, self.class_labels.as_ref())?;
        Ok(scored)
    }

    /// Transform-target run: stops after the transform stage
    pub fn transform(&self, raw: &[u8], target_column: Option<&str>) -> Result<TransformOutput> {
        if self.target_type != TargetType::Transform {
            return Err(RunnerError::invalid_input(format!(
                "model has target type {}, transforming is not available",
                self.target_type
            )));
        }

        let mut frame = self.adapter.read_input(raw)?;
        let target = match target_column {
            Some(name) => Some(frame.take_column(name).ok_or_else(|| {
                RunnerError::invalid_input(format!("target column '{name}' not found in input"))
            })?),
            None => None,
        };

        let (features, target) = self.adapter.transform(frame, target)?;
        Ok(TransformOutput { features, target })
    }

    /// Unstructured run: negotiate the payload both ways around the hook
    pub fn predict_unstructured(
        &self,
        raw: &[u8],
        declared_content_type: Option<&str>,
        query: HashMap<String, String>,
    ) -> Result<(Vec<u8>, String)> {
        if self.target_type != TargetType::Unstructured {
            return Err(RunnerError::invalid_input(format!(
                "model has target type {}, unstructured scoring is not available",
                self.target_type
            )));
        }

        let (payload, content_type) = content::resolve_inbound(raw, declared_content_type)?;
        let params = UnstructuredParams {
            mimetype: content_type.mimetype.clone(),
            charset: content_type.charset.clone(),
            query,
        };

        let (response, overrides) = self.adapter.score_unstructured(payload, &params)?;
        content::resolve_outbound(response, &overrides)
    }

    fn score_context(&self) -> ScoreContext {
        ScoreContext {
            target_type: self.target_type,
            class_labels: self.class_labels.clone(),
        }
    }

    /// Bring known scorer shapes into canonical form without rejecting
    /// anything; rejection is validation's job.
    fn normalize(&self, scored: Frame) -> Result<Frame> {
        match self.target_type {
            TargetType::Binary => {
                let labels = match &self.class_labels {
                    Some(labels) => labels,
                    None => return Ok(scored),
                };
                normalize_binary(scored, labels)
            }
            TargetType::Regression | TargetType::Anomaly => Ok(normalize_single(scored)),
            _ => Ok(scored),
        }
    }
}

/// Expand a single positive-class column into the two label columns, and
/// fix the column order when both labels are present
fn normalize_binary(scored: Frame, labels: &ClassLabels) -> Result<Frame> {
    if scored.n_columns() == 1 {
        let column = &scored.columns()[0];
        if let Some(positive) = column.as_floats() {
            let negative: Vec<f64> = positive.iter().map(|p| 1.0 - p).collect();
            return Frame::from_columns(vec![
                Column::float(labels.positive.clone(), positive.to_vec()),
                Column::float(labels.negative.clone(), negative),
            ]);
        }
        return Ok(scored);
    }

    if scored.n_columns() == 2
        && scored.has_column(&labels.positive)
        && scored.has_column(&labels.negative)
        && scored.columns()[0].name != labels.positive
    {
        let mut frame = scored;
        let positive = match frame.take_column(&labels.positive) {
            Some(column) => column,
            None => return Err(RunnerError::internal("positive column vanished")),
        };
        let negative = match frame.take_column(&labels.negative) {
            Some(column) => column,
            None => return Err(RunnerError::internal("negative column vanished")),
        };
        return Frame::from_columns(vec![positive, negative]);
    }

    Ok(scored)
}

/// Rename a lone prediction column to the canonical name
fn normalize_single(scored: Frame) -> Frame {
    if scored.n_columns() == 1 && scored.columns()[0].name != PREDICTIONS_COLUMN {
        let mut column = scored.columns()[0].clone();
        column.name = PREDICTIONS_COLUMN.to_string();
        if let Ok(renamed) = Frame::from_columns(vec![column]) {
            return renamed;
        }
    }
    scored
}

/// Validate a finished prediction frame against the target type.
///
/// Pure check: never mutates, and calling it twice on a valid frame is a
/// no-op both times.
pub fn validate_predictions(
    frame: &Frame,
    target_type: TargetType,
    class_labels: Option<&ClassLabels>,
) -> Result<()> {
    match target_type {
        TargetType::Regression | TargetType::Anomaly => {
            if frame.n_columns() != 1 {
                return Err(RunnerError::output_shape(format!(
                    "expected exactly one {PREDICTIONS_COLUMN} column, found {}",
                    frame.n_columns()
                )));
            }
            let column = &frame.columns()[0];
            if column.name != PREDICTIONS_COLUMN {
                return Err(RunnerError::output_shape(format!(
                    "prediction column is named '{}', expected '{PREDICTIONS_COLUMN}'",
                    column.name
                )));
            }
            if !column.is_numeric() {
                return Err(RunnerError::output_shape(
                    "prediction column is not numeric",
                ));
            }
            Ok(())
        }
        TargetType::Binary => {
            let labels = class_labels.ok_or_else(|| {
                RunnerError::config("Binary target type requires class labels")
            })?;
            if frame.n_columns() != 2 {
                return Err(RunnerError::output_shape(format!(
                    "expected the two class columns '{}' and '{}', found {} columns",
                    labels.positive,
                    labels.negative,
                    frame.n_columns()
                )));
            }
            let positive = label_column(frame, &labels.positive)?;
            let negative = label_column(frame, &labels.negative)?;

            for (row, (p, n)) in positive.iter().zip(negative.iter()).enumerate() {
                let sum = p + n;
                if !((sum - 1.0).abs() <= PROBABILITY_SUM_TOLERANCE) {
                    return Err(RunnerError::output_shape(format!(
                        "row {row} probabilities sum to {sum}, expected 1.0"
                    )));
                }
            }
            Ok(())
        }
        TargetType::Transform | TargetType::Unstructured => Ok(()),
    }
}

fn label_column<'a>(frame: &'a Frame, label: &str) -> Result<&'a [f64]> {
    let column = frame
        .column(label)
        .ok_or_else(|| RunnerError::output_shape(format!("missing class column '{label}'")))?;
    column
        .as_floats()
        .ok_or_else(|| RunnerError::output_shape(format!("class column '{label}' is not numeric")))
}
