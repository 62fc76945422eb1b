//! # Plinth
//!
//! A model packaging and prediction serving runtime. A user code directory
//! is resolved into a fixed load/score plan, brought up once as a predictor
//! adapter, and driven through a staged scoring pipeline by either the HTTP
//! prediction server or the one-shot batch runner.
//!
//! ## Features
//!
//! - Artifact discovery with pluggable format loaders
//! - User hook packages (load, transform, score, post-process, unstructured)
//! - Structured and unstructured scoring with content negotiation
//! - Prediction server with an honest load lifecycle (loading/ready/failed)
//! - Batch scoring with atomic output files

pub mod adapter;
pub mod artifact;
pub mod batch;
pub mod config;
pub mod content;
pub mod error;
pub mod frame;
pub mod hooks;
pub mod pipeline;
pub mod resolver;
pub mod server;
pub mod stats;
pub mod utils;

pub use adapter::PredictorAdapter;
pub use artifact::{ArtifactLoader, LoaderRegistry};
pub use config::{ClassLabels, Config, TargetType};
pub use error::{Result, RunnerError};
pub use frame::{Column, Frame};
pub use hooks::{Concurrency, Hook, HookRuntime, HookSet, ModelHandle};
pub use pipeline::Pipeline;
pub use resolver::{resolve, Resolution};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
