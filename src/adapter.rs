//! The bound predictor
//!
//! A [`PredictorAdapter`] is built once at startup from a [`Resolution`]:
//! it runs `init`, produces the model handle (hook or built-in loader), and
//! from then on exposes the uniform stage surface the pipeline drives.
//! Hook failures are wrapped with their stage name; the handle itself is
//! never inspected by the core.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::info;

use crate::content::{OutboundOverride, Payload};
use crate::error::{Result, RunnerError};
use crate::frame::{Column, Frame};
use crate::hooks::{
    Concurrency, Hook, HookRuntime, HookSet, ModelHandle, ScoreContext, UnstructuredParams,
};
use crate::resolver::{BuiltinBinding, LoadPlan, Resolution};

/// A loaded model behind the uniform stage surface
pub struct PredictorAdapter {
    hooks: HookSet,
    runtime: Option<Arc<dyn HookRuntime>>,
    builtin: Option<BuiltinBinding>,
    model: ModelHandle,
    // Present when any bound implementation refuses concurrent callers
    guard: Option<Mutex<()>>,
}

impl std::fmt::Debug for PredictorAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictorAdapter")
            .field("hooks", &self.hooks)
            .field("builtin", &self.builtin)
            .field("serialized", &self.guard.is_some())
            .finish_non_exhaustive()
    }
}

impl PredictorAdapter {
    /// Run `init` and produce the model handle per the resolved plan.
    ///
    /// Any failure here is fatal to the process instance; callers decide
    /// whether that means exiting (batch) or parking in a failed state
    /// (server).
    pub fn load(resolution: Resolution, runtime: Option<Arc<dyn HookRuntime>>) -> Result<Self> {
        let Resolution {
            code_dir,
            hooks,
            load,
        } = resolution;

        if !hooks.is_empty() && runtime.is_none() {
            return Err(RunnerError::internal(
                "hooks were resolved but no runtime was supplied",
            ));
        }

        let started = Instant::now();

        if hooks.contains(Hook::Init) {
            let runtime = required(&runtime)?;
            wrap_hook(Hook::Init, runtime.init(code_dir.path()))?;
        }

        let (model, builtin) = match load {
            LoadPlan::Hook => {
                let runtime = required(&runtime)?;
                let handle = wrap_hook(Hook::Load, runtime.load(code_dir.path()))?;
                (handle, None)
            }
            LoadPlan::BuiltIn(binding) => {
                let handle = binding.loader.load(&binding.artifact)?;
                (handle, Some(binding))
            }
            LoadPlan::Unloaded => (ModelHandle::absent(), None),
        };

        if hooks.contains(Hook::Load) && model.is_absent() {
            return Err(RunnerError::model_load("load hook returned no model"));
        }

        let mut concurrency = Concurrency::Reentrant;
        if let Some(runtime) = &runtime {
            if !hooks.is_empty() && runtime.concurrency() == Concurrency::Exclusive {
                concurrency = Concurrency::Exclusive;
            }
        }
        if let Some(binding) = &builtin {
            if binding.loader.concurrency() == Concurrency::Exclusive {
                concurrency = Concurrency::Exclusive;
            }
        }

        info!(
            hooks = %hooks,
            concurrency = ?concurrency,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Model ready"
        );

        Ok(Self {
            hooks,
            runtime,
            builtin,
            model,
            guard: match concurrency {
                Concurrency::Exclusive => Some(Mutex::new(())),
                Concurrency::Reentrant => None,
            },
        })
    }

    pub fn hooks(&self) -> HookSet {
        self.hooks
    }

    pub fn has_hook(&self, hook: Hook) -> bool {
        self.hooks.contains(hook)
    }

    pub fn concurrency(&self) -> Concurrency {
        if self.guard.is_some() {
            Concurrency::Exclusive
        } else {
            Concurrency::Reentrant
        }
    }

    /// Parse raw bytes into a non-empty frame, via hook or the
    /// delimited-text default
    pub fn read_input(&self, raw: &[u8]) -> Result<Frame> {
        let frame = if self.hooks.contains(Hook::ReadInputData) {
            let runtime = required(&self.runtime)?;
            self.serialized(|| wrap_hook(Hook::ReadInputData, runtime.read_input_data(raw)))?
        } else {
            // The default parser never enters the runtime, no guard needed.
            Frame::from_csv(raw)?
        };

        if frame.is_empty() {
            if self.hooks.contains(Hook::ReadInputData) {
                return Err(RunnerError::hook(
                    Hook::ReadInputData.name(),
                    "returned an empty frame",
                ));
            }
            return Err(RunnerError::invalid_input("input contains no rows"));
        }
        Ok(frame)
    }

    /// Reshape features before scoring; identity when the package has no
    /// transform hook
    pub fn transform(
        &self,
        frame: Frame,
        target: Option<Column>,
    ) -> Result<(Frame, Option<Column>)> {
        if !self.hooks.contains(Hook::Transform) {
            return Ok((frame, target));
        }
        let runtime = required(&self.runtime)?;
        self.serialized(|| {
            wrap_hook(Hook::Transform, runtime.transform(frame, &self.model, target))
        })
    }

    /// Score a structured frame via hook or the bound built-in loader
    pub fn score(&self, frame: Frame, ctx: &ScoreContext) -> Result<Frame> {
        self.serialized(|| {
            if self.hooks.contains(Hook::Score) {
                let runtime = required(&self.runtime)?;
                return wrap_hook(Hook::Score, runtime.score(frame, &self.model, ctx));
            }
            match &self.builtin {
                Some(binding) => binding.loader.score(&frame, &self.model, ctx),
                None => Err(RunnerError::internal("no scoring path is bound")),
            }
        })
    }

    /// Adjust predictions after scoring; identity without the hook
    pub fn post_process(&self, predictions: Frame) -> Result<Frame> {
        if !self.hooks.contains(Hook::PostProcess) {
            return Ok(predictions);
        }
        let runtime = required(&self.runtime)?;
        self.serialized(|| {
            wrap_hook(
                Hook::PostProcess,
                runtime.post_process(predictions, &self.model),
            )
        })
    }

    /// Produce a free-form response for an unstructured target
    pub fn score_unstructured(
        &self,
        payload: Payload,
        params: &UnstructuredParams,
    ) -> Result<(Payload, OutboundOverride)> {
        let runtime = required(&self.runtime)?;
        self.serialized(|| {
            wrap_hook(
                Hook::ScoreUnstructured,
                runtime.score_unstructured(&self.model, payload, params),
            )
        })
    }

    fn serialized<T>(&self, call: impl FnOnce() -> Result<T>) -> Result<T> {
        match &self.guard {
            Some(guard) => {
                let _held = guard.lock();
                call()
            }
            None => call(),
        }
    }
}

fn required(runtime: &Option<Arc<dyn HookRuntime>>) -> Result<&Arc<dyn HookRuntime>> {
    runtime
        .as_ref()
        .ok_or_else(|| RunnerError::internal("hook invoked without a runtime"))
}

fn wrap_hook<T>(hook: Hook, result: Result<T>) -> Result<T> {
    result.map_err(|e| match e {
        hook_error @ RunnerError::Hook { .. } => hook_error,
        other => RunnerError::hook(hook.name(), other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::LoaderRegistry;
    use crate::config::TargetType;
    use crate::frame::PREDICTIONS_COLUMN;
    use crate::resolver::resolve;
    use std::path::Path;

    fn coefficients_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("model.json"),
            r#"{"intercept": 0.0, "coefficients": {"x": 1.0}}"#,
        )
        .unwrap();
        dir
    }

    fn regression_ctx() -> ScoreContext {
        ScoreContext {
            target_type: TargetType::Regression,
            class_labels: None,
        }
    }

    fn load_adapter(
        dir: &Path,
        runtime: Option<Arc<dyn HookRuntime>>,
        target_type: TargetType,
    ) -> Result<PredictorAdapter> {
        let resolution = resolve(
            dir,
            &LoaderRegistry::with_defaults(),
            runtime.as_ref(),
            target_type,
        )?;
        PredictorAdapter::load(resolution, runtime)
    }

    #[test]
    fn test_builtin_path_end_to_end() {
        let dir = coefficients_dir();
        let adapter = load_adapter(dir.path(), None, TargetType::Regression).unwrap();

        let frame = adapter.read_input(b"x\n1.0\n2.0\n").unwrap();
        let scored = adapter.score(frame, &regression_ctx()).unwrap();
        let values = scored.column(PREDICTIONS_COLUMN).unwrap().as_floats().unwrap();
        assert_eq!(values, &[1.0, 2.0]);
    }

    #[test]
    fn test_empty_default_input_is_invalid() {
        let dir = coefficients_dir();
        let adapter = load_adapter(dir.path(), None, TargetType::Regression).unwrap();

        let err = adapter.read_input(b"").unwrap_err();
        assert!(matches!(err, RunnerError::InvalidInput { .. }));
    }

    struct ScoreHookRuntime;

    impl HookRuntime for ScoreHookRuntime {
        fn discover(&self, _code_dir: &Path) -> Result<HookSet> {
            Ok(HookSet::empty().with(Hook::Score))
        }

        fn score(&self, frame: Frame, _model: &ModelHandle, _ctx: &ScoreContext) -> Result<Frame> {
            let rows = frame.n_rows();
            Frame::from_columns(vec![Column::float(PREDICTIONS_COLUMN, vec![42.0; rows])])
        }
    }

    #[test]
    fn test_score_hook_overrides_builtin_scoring() {
        let dir = coefficients_dir();
        let runtime: Arc<dyn HookRuntime> = Arc::new(ScoreHookRuntime);
        let adapter = load_adapter(dir.path(), Some(runtime), TargetType::Regression).unwrap();

        let frame = adapter.read_input(b"x\n7.0\n").unwrap();
        let scored = adapter.score(frame, &regression_ctx()).unwrap();
        let values = scored.column(PREDICTIONS_COLUMN).unwrap().as_floats().unwrap();
        assert_eq!(values, &[42.0]);
    }

    struct EmptyReaderRuntime;

    impl HookRuntime for EmptyReaderRuntime {
        fn discover(&self, _code_dir: &Path) -> Result<HookSet> {
            Ok(HookSet::empty()
                .with(Hook::ReadInputData)
                .with(Hook::Score))
        }

        fn read_input_data(&self, _raw: &[u8]) -> Result<Frame> {
            Ok(Frame::new())
        }
    }

    #[test]
    fn test_empty_hook_frame_is_hook_error() {
        let dir = coefficients_dir();
        let runtime: Arc<dyn HookRuntime> = Arc::new(EmptyReaderRuntime);
        let adapter = load_adapter(dir.path(), Some(runtime), TargetType::Regression).unwrap();

        let err = adapter.read_input(b"x\n1.0\n").unwrap_err();
        assert_eq!(err.stage(), Some("read_input_data"));
    }

    struct AbsentLoadRuntime;

    impl HookRuntime for AbsentLoadRuntime {
        fn discover(&self, _code_dir: &Path) -> Result<HookSet> {
            Ok(HookSet::empty().with(Hook::Load).with(Hook::Score))
        }

        fn load(&self, _code_dir: &Path) -> Result<ModelHandle> {
            Ok(ModelHandle::absent())
        }
    }

    #[test]
    fn test_load_hook_must_produce_a_model() {
        let dir = coefficients_dir();
        let runtime: Arc<dyn HookRuntime> = Arc::new(AbsentLoadRuntime);
        let err = load_adapter(dir.path(), Some(runtime), TargetType::Regression).unwrap_err();
        assert!(matches!(err, RunnerError::ModelLoad { .. }));
    }

    struct RecordingRuntime {
        calls: Mutex<Vec<&'static str>>,
    }

    impl HookRuntime for RecordingRuntime {
        fn discover(&self, _code_dir: &Path) -> Result<HookSet> {
            Ok(HookSet::empty()
                .with(Hook::Init)
                .with(Hook::Load)
                .with(Hook::Score))
        }

        fn concurrency(&self) -> Concurrency {
            Concurrency::Exclusive
        }

        fn init(&self, _code_dir: &Path) -> Result<()> {
            self.calls.lock().push("init");
            Ok(())
        }

        fn load(&self, _code_dir: &Path) -> Result<ModelHandle> {
            self.calls.lock().push("load");
            Ok(ModelHandle::new(7u32))
        }
    }

    #[test]
    fn test_init_runs_before_load_and_exclusivity_sticks() {
        let dir = coefficients_dir();
        let runtime = Arc::new(RecordingRuntime {
            calls: Mutex::new(Vec::new()),
        });
        let as_dyn: Arc<dyn HookRuntime> = runtime.clone();
        let adapter = load_adapter(dir.path(), Some(as_dyn), TargetType::Regression).unwrap();

        assert_eq!(*runtime.calls.lock(), vec!["init", "load"]);
        assert_eq!(adapter.concurrency(), Concurrency::Exclusive);
    }

    #[derive(Default)]
    struct SlowExclusiveRuntime {
        busy: std::sync::atomic::AtomicBool,
        overlapped: std::sync::atomic::AtomicBool,
    }

    impl SlowExclusiveRuntime {
        fn enter(&self) {
            use std::sync::atomic::Ordering;
            if self.busy.swap(true, Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            std::thread::sleep(std::time::Duration::from_millis(25));
            self.busy.store(false, Ordering::SeqCst);
        }
    }

    impl HookRuntime for SlowExclusiveRuntime {
        fn discover(&self, _code_dir: &Path) -> Result<HookSet> {
            Ok(HookSet::empty()
                .with(Hook::ReadInputData)
                .with(Hook::Score))
        }

        fn concurrency(&self) -> Concurrency {
            Concurrency::Exclusive
        }

        fn read_input_data(&self, _raw: &[u8]) -> Result<Frame> {
            self.enter();
            Frame::from_columns(vec![Column::float("x", vec![1.0])])
        }

        fn score(&self, frame: Frame, _model: &ModelHandle, _ctx: &ScoreContext) -> Result<Frame> {
            self.enter();
            let rows = frame.n_rows();
            Frame::from_columns(vec![Column::float(PREDICTIONS_COLUMN, vec![0.0; rows])])
        }
    }

    #[test]
    fn test_exclusive_runtime_serializes_every_hook_stage() {
        use std::sync::atomic::Ordering;

        let dir = coefficients_dir();
        let runtime = Arc::new(SlowExclusiveRuntime::default());
        let as_dyn: Arc<dyn HookRuntime> = runtime.clone();
        let adapter =
            Arc::new(load_adapter(dir.path(), Some(as_dyn), TargetType::Regression).unwrap());

        let scorer = Arc::clone(&adapter);
        let scoring = std::thread::spawn(move || {
            let frame = Frame::from_columns(vec![Column::float("x", vec![1.0])]).unwrap();
            scorer.score(frame, &regression_ctx()).unwrap();
        });
        adapter.read_input(b"x\n1.0\n").unwrap();
        scoring.join().unwrap();

        assert!(
            !runtime.overlapped.load(Ordering::SeqCst),
            "hook stages ran concurrently on an exclusive runtime"
        );
    }

    struct FailingScoreRuntime;

    impl HookRuntime for FailingScoreRuntime {
        fn discover(&self, _code_dir: &Path) -> Result<HookSet> {
            Ok(HookSet::empty().with(Hook::Score))
        }

        fn score(&self, _frame: Frame, _model: &ModelHandle, _ctx: &ScoreContext) -> Result<Frame> {
            Err(RunnerError::invalid_input("cannot handle these features"))
        }
    }

    #[test]
    fn test_hook_failures_are_wrapped_with_stage() {
        let dir = coefficients_dir();
        let runtime: Arc<dyn HookRuntime> = Arc::new(FailingScoreRuntime);
        let adapter = load_adapter(dir.path(), Some(runtime), TargetType::Regression).unwrap();

        let frame = adapter.read_input(b"x\n1.0\n").unwrap();
        let err = adapter.score(frame, &regression_ctx()).unwrap_err();
        assert_eq!(err.stage(), Some("score"));
        assert!(err.to_string().contains("cannot handle these features"));
    }
}
