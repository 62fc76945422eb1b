//! One-shot batch scoring
//!
//! Resolves and loads the model exactly once, runs the pipeline over a
//! fully buffered input file and writes a fully buffered output. File
//! output lands atomically through a sibling temporary file, so an
//! aborted run never leaves a truncated result behind.

use crate::adapter::PredictorAdapter;
use crate::artifact::LoaderRegistry;
use crate::config::{Config, TargetType};
use crate::error::{Result, RunnerError};
use crate::hooks::HookRuntime;
use crate::pipeline::Pipeline;
use crate::resolver;
use crate::utils::{ensure_directory, format_duration};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// A single batch scoring run
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub input: PathBuf,
    /// Destination file; stdout when absent
    pub output: Option<PathBuf>,
    /// Declared content type for unstructured inputs, header-style
    pub content_type: Option<String>,
    /// Column split out of the frame as the target series on transform targets
    pub target_column: Option<String>,
}

/// Score one input file end to end
pub fn run(
    config: &Config,
    job: &BatchJob,
    registry: LoaderRegistry,
    runtime: Option<Arc<dyn HookRuntime>>,
) -> Result<()> {
    let started = Instant::now();
    let target_type = config.model.target_type;
    let class_labels = config.class_labels()?;

    let resolution = resolver::resolve(
        &config.model.code_dir,
        &registry,
        runtime.as_ref(),
        target_type,
    )?;
    let adapter = PredictorAdapter::load(resolution, runtime)?;
    let pipeline = Pipeline::new(Arc::new(adapter), target_type, class_labels)?;

    let raw = std::fs::read(&job.input).map_err(|e| {
        RunnerError::invalid_input(format!(
            "cannot read input file {}: {e}",
            job.input.display()
        ))
    })?;
    info!(
        input = %job.input.display(),
        bytes = raw.len(),
        target_type = %target_type,
        "Scoring batch input"
    );

    let rendered = match target_type {
        TargetType::Transform => {
            let output = pipeline.transform(&raw, job.target_column.as_deref())?;
            output.features.to_csv()?
        }
        TargetType::Unstructured => {
            let declared = job
                .content_type
                .as_deref()
                .unwrap_or(config.batch.default_content_type.as_str());
            let (payload, _content_type) =
                pipeline.predict_unstructured(&raw, Some(declared), HashMap::new())?;
            payload
        }
        TargetType::Regression | TargetType::Binary | TargetType::Anomaly => {
            pipeline.predict(&raw)?.to_csv()?
        }
    };

    match &job.output {
        Some(path) => write_atomic(path, &rendered)?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(&rendered)
                .and_then(|_| stdout.flush())
                .map_err(|e| RunnerError::internal(format!("cannot write to stdout: {e}")))?;
        }
    }

    info!(elapsed = %format_duration(started.elapsed()), "Batch run complete");
    Ok(())
}

/// Write through a temporary file in the destination directory so the
/// final path only ever holds a complete result
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    ensure_directory(directory)?;

    let mut file = tempfile::NamedTempFile::new_in(directory).map_err(|e| {
        RunnerError::internal(format!(
            "cannot create temporary file in {}: {e}",
            directory.display()
        ))
    })?;
    file.write_all(contents)
        .map_err(|e| RunnerError::internal(format!("cannot write output: {e}")))?;
    file.persist(path)
        .map_err(|e| RunnerError::internal(format!("cannot move output into place: {e}")))?;

    info!(output = %path.display(), bytes = contents.len(), "Wrote batch output");
    Ok(())
}
