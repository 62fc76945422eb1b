//! Extension-point boundary for user-supplied model code
//!
//! A packaged model may ship custom code next to (or instead of) its
//! artifact. That code is reached through a [`HookRuntime`]: an embedder
//! registers one runtime, the runtime reports which hooks the package
//! provides, and the adapter invokes exactly those. Hooks it does not
//! report are never called.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::config::{ClassLabels, TargetType};
use crate::content::{OutboundOverride, Payload};
use crate::error::{Result, RunnerError};
use crate::frame::{Column, Frame};

/// The pipeline stages a package can override
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    Init,
    Load,
    ReadInputData,
    Transform,
    Score,
    PostProcess,
    ScoreUnstructured,
}

impl Hook {
    pub const ALL: [Hook; 7] = [
        Hook::Init,
        Hook::Load,
        Hook::ReadInputData,
        Hook::Transform,
        Hook::Score,
        Hook::PostProcess,
        Hook::ScoreUnstructured,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Hook::Init => "init",
            Hook::Load => "load",
            Hook::ReadInputData => "read_input_data",
            Hook::Transform => "transform",
            Hook::Score => "score",
            Hook::PostProcess => "post_process",
            Hook::ScoreUnstructured => "score_unstructured",
        }
    }

    fn bit(&self) -> u8 {
        match self {
            Hook::Init => 1 << 0,
            Hook::Load => 1 << 1,
            Hook::ReadInputData => 1 << 2,
            Hook::Transform => 1 << 3,
            Hook::Score => 1 << 4,
            Hook::PostProcess => 1 << 5,
            Hook::ScoreUnstructured => 1 << 6,
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The set of hooks a package provides
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HookSet {
    bits: u8,
}

impl HookSet {
    pub const fn empty() -> Self {
        Self { bits: 0 }
    }

    /// Builder-style insertion
    pub fn with(mut self, hook: Hook) -> Self {
        self.insert(hook);
        self
    }

    pub fn insert(&mut self, hook: Hook) {
        self.bits |= hook.bit();
    }

    pub fn contains(&self, hook: Hook) -> bool {
        self.bits & hook.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Hook> + '_ {
        Hook::ALL.into_iter().filter(|hook| self.contains(*hook))
    }
}

impl FromIterator<Hook> for HookSet {
    fn from_iter<I: IntoIterator<Item = Hook>>(iter: I) -> Self {
        let mut set = Self::empty();
        for hook in iter {
            set.insert(hook);
        }
        set
    }
}

impl fmt::Display for HookSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = self.iter().map(|hook| hook.name()).collect();
        f.write_str(&names.join(", "))
    }
}

/// Opaque handle to a loaded model.
///
/// The core never inspects what is inside; built-in loaders and hook
/// runtimes downcast back to their own types at scoring time.
pub struct ModelHandle(Box<dyn Any + Send + Sync>);

impl ModelHandle {
    pub fn new<T: Any + Send + Sync>(model: T) -> Self {
        Self(Box::new(model))
    }

    /// Placeholder handle for packages where nothing loads a model and a
    /// score hook manages its own state
    pub fn absent() -> Self {
        Self::new(())
    }

    pub fn is_absent(&self) -> bool {
        self.is::<()>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_absent() {
            f.write_str("ModelHandle(absent)")
        } else {
            f.write_str("ModelHandle(..)")
        }
    }
}

/// Whether adapter calls may run concurrently
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    /// Safe to call from multiple threads at once
    Reentrant,
    /// Calls must be serialized
    Exclusive,
}

/// Everything a structured scorer may need besides the frame
#[derive(Debug, Clone)]
pub struct ScoreContext {
    pub target_type: TargetType,
    pub class_labels: Option<ClassLabels>,
}

/// Parameters forwarded to an unstructured scorer
#[derive(Debug, Clone, Default)]
pub struct UnstructuredParams {
    /// Resolved inbound mimetype
    pub mimetype: String,
    /// Resolved inbound charset (recorded even for binary payloads)
    pub charset: String,
    /// Caller query parameters, forwarded verbatim
    pub query: HashMap<String, String>,
}

/// Bridge to user-supplied package code.
///
/// `discover` is the contract: every other method has a default body that
/// fails, and is only invoked when `discover` reported the matching hook.
/// Runtimes therefore override exactly the hooks their package provides.
pub trait HookRuntime: Send + Sync {
    /// Runtime name for logs
    fn name(&self) -> &'static str {
        "custom"
    }

    /// Report which hooks the package at `code_dir` provides
    fn discover(&self, code_dir: &Path) -> Result<HookSet>;

    /// Whether hook invocations tolerate concurrent callers.
    ///
    /// Exclusive unless overridden: most runtimes bridge an embedded
    /// interpreter that cannot take concurrent calls.
    fn concurrency(&self) -> Concurrency {
        Concurrency::Exclusive
    }

    /// One-time setup before the model loads
    fn init(&self, _code_dir: &Path) -> Result<()> {
        Err(unprovided(Hook::Init))
    }

    /// Produce the model handle, replacing built-in artifact loading
    fn load(&self, _code_dir: &Path) -> Result<ModelHandle> {
        Err(unprovided(Hook::Load))
    }

    /// Parse raw request bytes into a frame, replacing the delimited-text default
    fn read_input_data(&self, _raw: &[u8]) -> Result<Frame> {
        Err(unprovided(Hook::ReadInputData))
    }

    /// Reshape features (and optionally a target column) before scoring
    fn transform(
        &self,
        _frame: Frame,
        _model: &ModelHandle,
        _target: Option<Column>,
    ) -> Result<(Frame, Option<Column>)> {
        Err(unprovided(Hook::Transform))
    }

    /// Produce predictions for a structured target
    fn score(&self, _frame: Frame, _model: &ModelHandle, _ctx: &ScoreContext) -> Result<Frame> {
        Err(unprovided(Hook::Score))
    }

    /// Adjust predictions after scoring
    fn post_process(&self, _predictions: Frame, _model: &ModelHandle) -> Result<Frame> {
        Err(unprovided(Hook::PostProcess))
    }

    /// Produce a free-form response for an unstructured target
    fn score_unstructured(
        &self,
        _model: &ModelHandle,
        _payload: Payload,
        _params: &UnstructuredParams,
    ) -> Result<(Payload, OutboundOverride)> {
        Err(unprovided(Hook::ScoreUnstructured))
    }
}

fn unprovided(hook: Hook) -> RunnerError {
    RunnerError::hook(hook.name(), "hook not provided by this runtime")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_set_operations() {
        let mut set = HookSet::empty();
        assert!(set.is_empty());
        assert!(!set.contains(Hook::Score));

        set.insert(Hook::Score);
        set.insert(Hook::Load);
        assert!(set.contains(Hook::Score));
        assert!(set.contains(Hook::Load));
        assert!(!set.contains(Hook::Transform));

        let collected: Vec<Hook> = set.iter().collect();
        assert_eq!(collected, vec![Hook::Load, Hook::Score]);
    }

    #[test]
    fn test_hook_set_display() {
        assert_eq!(HookSet::empty().to_string(), "none");

        let set = HookSet::empty().with(Hook::Load).with(Hook::PostProcess);
        assert_eq!(set.to_string(), "load, post_process");
    }

    #[test]
    fn test_hook_set_from_iterator() {
        let set: HookSet = [Hook::Init, Hook::Score].into_iter().collect();
        assert!(set.contains(Hook::Init));
        assert!(set.contains(Hook::Score));
        assert!(!set.contains(Hook::Load));
    }

    #[test]
    fn test_model_handle_downcasting() {
        struct Weights {
            scale: f64,
        }

        let handle = ModelHandle::new(Weights { scale: 2.0 });
        assert!(!handle.is_absent());
        assert_eq!(handle.downcast_ref::<Weights>().unwrap().scale, 2.0);
        assert!(handle.downcast_ref::<String>().is_none());

        let absent = ModelHandle::absent();
        assert!(absent.is_absent());
    }

    #[test]
    fn test_default_hook_bodies_name_their_stage() {
        struct Bare;
        impl HookRuntime for Bare {
            fn discover(&self, _code_dir: &Path) -> Result<HookSet> {
                Ok(HookSet::empty())
            }
        }

        let runtime = Bare;
        let err = runtime.load(Path::new(".")).unwrap_err();
        assert_eq!(err.stage(), Some("load"));

        let err = runtime
            .score(
                Frame::new(),
                &ModelHandle::absent(),
                &ScoreContext {
                    target_type: TargetType::Regression,
                    class_labels: None,
                },
            )
            .unwrap_err();
        assert_eq!(err.stage(), Some("score"));
    }
}
