//! HTTP prediction server
//!
//! Hosts a scoring pipeline behind a REST surface. The listener binds and
//! accepts connections immediately; the model itself is brought up by a
//! background task, and every route reports the load phase honestly until
//! it settles in Ready or Failed.

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod types;

use crate::adapter::PredictorAdapter;
use crate::artifact::LoaderRegistry;
use crate::config::{ClassLabels, Config, TargetType};
use crate::error::Result;
use crate::hooks::HookRuntime;
use crate::pipeline::Pipeline;
use crate::resolver::{self, Resolution};
use crate::stats::StatsCollector;
use actix_cors::Cors;
use actix_web::middleware::{Condition, NormalizePath};
use actix_web::{web, App, HttpServer};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{error, info};

/// Load lifecycle of the hosted model
#[derive(Clone)]
pub enum Phase {
    /// Background load still running
    Loading,
    /// Load finished; the shared pipeline serves requests
    Ready(Arc<Pipeline>),
    /// Load failed with this message; the server stays up to report it
    Failed(String),
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Loading => "loading",
            Phase::Ready(_) => "ready",
            Phase::Failed(_) => "failed",
        }
    }
}

/// Scoring service shared across handlers: the phase cell plus
/// request accounting
pub struct ServiceState {
    target_type: TargetType,
    phase: RwLock<Phase>,
    pub stats: StatsCollector,
}

impl ServiceState {
    pub fn new(target_type: TargetType) -> Self {
        Self {
            target_type,
            phase: RwLock::new(Phase::Loading),
            stats: StatsCollector::new(),
        }
    }

    pub fn target_type(&self) -> TargetType {
        self.target_type
    }

    /// Snapshot of the current phase; Ready hands out a clone of the
    /// shared pipeline so the lock is never held across a request
    pub fn phase(&self) -> Phase {
        self.phase.read().clone()
    }

    pub fn mark_ready(&self, pipeline: Pipeline) {
        *self.phase.write() = Phase::Ready(Arc::new(pipeline));
    }

    pub fn mark_failed<S: Into<String>>(&self, message: S) {
        *self.phase.write() = Phase::Failed(message.into());
    }
}

/// Server state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ServiceState>,
    pub config: Config,
}

/// Start the prediction server
///
/// Resolution runs up front so a broken code directory fails the process
/// before the listener binds. The adapter load itself is spawned in the
/// background; liveness precedes readiness.
pub async fn start_server(
    config: Config,
    registry: LoaderRegistry,
    runtime: Option<Arc<dyn HookRuntime>>,
) -> Result<()> {
    let bind_address = config.server_address();
    let target_type = config.model.target_type;
    let class_labels = config.class_labels()?;

    let resolution = resolver::resolve(
        &config.model.code_dir,
        &registry,
        runtime.as_ref(),
        target_type,
    )?;

    let service = Arc::new(ServiceState::new(target_type));
    spawn_model_load(
        Arc::clone(&service),
        resolution,
        runtime,
        class_labels,
    );

    info!("Starting prediction server on {}", bind_address);

    let app_state = AppState {
        service,
        config: config.clone(),
    };
    let url_prefix = config.url_prefix();
    let enable_cors = config.server.enable_cors;
    let log_requests = config.logging.log_requests;

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        let app = App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(Condition::new(enable_cors, cors))
            .wrap(Condition::new(log_requests, middleware::RequestLogging))
            .wrap(NormalizePath::trim());

        if url_prefix.is_empty() {
            app.configure(routes::configure_routes)
        } else {
            app.service(web::scope(&url_prefix).configure(routes::configure_routes))
                .default_service(web::route().to(handlers::not_found))
        }
    })
    .bind(&bind_address)?
    .run()
    .await?;

    Ok(())
}

/// Run the adapter load off the event loop and settle the phase cell
fn spawn_model_load(
    service: Arc<ServiceState>,
    resolution: Resolution,
    runtime: Option<Arc<dyn HookRuntime>>,
    class_labels: Option<ClassLabels>,
) {
    tokio::spawn(async move {
        let target_type = service.target_type();
        let outcome = tokio::task::spawn_blocking(move || {
            let adapter = PredictorAdapter::load(resolution, runtime)?;
            Pipeline::new(Arc::new(adapter), target_type, class_labels)
        })
        .await;

        match outcome {
            Ok(Ok(pipeline)) => {
                service.mark_ready(pipeline);
                info!("Model load finished, server is ready");
            }
            Ok(Err(e)) => {
                error!("Model load failed: {}", e);
                service.mark_failed(e.to_string());
            }
            Err(e) => {
                error!("Model load task aborted: {}", e);
                service.mark_failed(format!("model load task aborted: {e}"));
            }
        }
    });
}
