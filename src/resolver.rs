//! Startup resolution of a code directory
//!
//! Pure inspection, run once before anything loads: enumerate the files in
//! the package, find the single artifact candidate, ask the hook runtime
//! what the package overrides, and fix the load/score binding the adapter
//! will use for the life of the process. Nothing here touches the artifact
//! contents.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::artifact::{is_candidate, ArtifactLoader, LoaderRegistry};
use crate::config::TargetType;
use crate::error::{Result, RunnerError};
use crate::hooks::{Hook, HookRuntime, HookSet};

/// A package directory after inspection
#[derive(Debug, Clone)]
pub struct CodeDir {
    path: PathBuf,
    files: Vec<String>,
}

impl CodeDir {
    /// List the directory's top-level files, hidden files excluded
    pub fn inspect(path: &Path) -> Result<Self> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            files.push(name);
        }
        files.sort_unstable();

        debug!(path = %path.display(), files = files.len(), "Inspected code directory");
        Ok(Self {
            path: path.to_path_buf(),
            files,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    /// File names that look like model artifacts
    pub fn artifact_candidates(&self) -> Vec<&str> {
        self.files
            .iter()
            .map(String::as_str)
            .filter(|name| is_candidate(Path::new(name)))
            .collect()
    }
}

/// A recognized artifact paired with the loader that claims it
#[derive(Clone)]
pub struct BuiltinBinding {
    pub loader: Arc<dyn ArtifactLoader>,
    pub artifact: PathBuf,
}

impl std::fmt::Debug for BuiltinBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinBinding")
            .field("loader", &self.loader.name())
            .field("artifact", &self.artifact)
            .finish()
    }
}

/// How the model handle comes into existence
#[derive(Debug, Clone)]
pub enum LoadPlan {
    /// The package's load hook produces the handle
    Hook,
    /// A built-in loader deserializes the detected artifact
    BuiltIn(BuiltinBinding),
    /// Nothing loads; score hooks manage their own state and receive an
    /// absent handle
    Unloaded,
}

/// The fixed binding a code directory resolves to
#[derive(Debug, Clone)]
pub struct Resolution {
    pub code_dir: CodeDir,
    pub hooks: HookSet,
    pub load: LoadPlan,
}

impl Resolution {
    /// The built-in binding, when one was selected
    pub fn builtin(&self) -> Option<&BuiltinBinding> {
        match &self.load {
            LoadPlan::BuiltIn(binding) => Some(binding),
            _ => None,
        }
    }
}

/// Resolve a code directory into a fixed load/score binding.
///
/// Fails fast, before any model bytes are read, when the directory cannot
/// support the declared target type: ambiguous or missing artifacts,
/// unrecognized formats nothing compensates for, or hook combinations that
/// leave no way to score.
pub fn resolve(
    code_dir: &Path,
    registry: &LoaderRegistry,
    runtime: Option<&Arc<dyn HookRuntime>>,
    target_type: TargetType,
) -> Result<Resolution> {
    let code_dir = CodeDir::inspect(code_dir)?;

    let hooks = match runtime {
        Some(runtime) => runtime.discover(code_dir.path())?,
        None => HookSet::empty(),
    };

    let candidates = code_dir.artifact_candidates();
    if candidates.len() > 1 {
        return Err(RunnerError::ArtifactAmbiguous {
            candidates: candidates.iter().map(|c| c.to_string()).collect(),
        });
    }
    let artifact = candidates.first().map(|name| code_dir.path().join(name));

    let load = resolve_load_plan(&code_dir, artifact, &hooks, registry)?;
    check_scorable(target_type, &hooks, &load)?;

    info!(
        code_dir = %code_dir.path().display(),
        target_type = %target_type,
        hooks = %hooks,
        load_plan = load_plan_name(&load),
        "Resolved code directory"
    );

    Ok(Resolution {
        code_dir,
        hooks,
        load,
    })
}

fn resolve_load_plan(
    code_dir: &CodeDir,
    artifact: Option<PathBuf>,
    hooks: &HookSet,
    registry: &LoaderRegistry,
) -> Result<LoadPlan> {
    // A load hook always overrides built-in loading.
    if hooks.contains(Hook::Load) {
        return Ok(LoadPlan::Hook);
    }

    let artifact = match artifact {
        Some(artifact) => artifact,
        None => {
            return Err(RunnerError::ArtifactMissing {
                code_dir: code_dir.path().display().to_string(),
            })
        }
    };

    match registry.loader_for(&artifact) {
        Some(loader) => Ok(LoadPlan::BuiltIn(BuiltinBinding { loader, artifact })),
        None => {
            // Scoring hooks may compensate for a format nothing can load;
            // they then run against an absent handle.
            if hooks.contains(Hook::Score) || hooks.contains(Hook::ScoreUnstructured) {
                Ok(LoadPlan::Unloaded)
            } else {
                Err(RunnerError::UnsupportedArtifact {
                    artifact: artifact.display().to_string(),
                })
            }
        }
    }
}

fn check_scorable(target_type: TargetType, hooks: &HookSet, load: &LoadPlan) -> Result<()> {
    match target_type {
        TargetType::Unstructured => {
            if !hooks.contains(Hook::ScoreUnstructured) {
                return Err(RunnerError::config(
                    "Unstructured target type requires a score_unstructured hook",
                ));
            }
        }
        TargetType::Transform => {
            if !hooks.contains(Hook::Transform) {
                return Err(RunnerError::config(
                    "Transform target type requires a transform hook",
                ));
            }
        }
        TargetType::Regression | TargetType::Binary | TargetType::Anomaly => {
            let builtin_scorable = matches!(load, LoadPlan::BuiltIn(_));
            if !hooks.contains(Hook::Score) && !builtin_scorable {
                return Err(RunnerError::config(
                    "No way to score: provide a score hook or a supported artifact",
                ));
            }
        }
    }
    Ok(())
}

fn load_plan_name(load: &LoadPlan) -> &'static str {
    match load {
        LoadPlan::Hook => "hook",
        LoadPlan::BuiltIn(_) => "built-in",
        LoadPlan::Unloaded => "unloaded",
    }
}
