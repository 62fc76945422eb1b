//! HTTP request handlers for the prediction routes
//!
//! Every handler answers from a phase snapshot so a request never holds
//! the phase lock while scoring. Scoring itself runs on the blocking pool
//! since hooks and artifact scorers are synchronous. Each scoring request
//! gets a correlation id that appears in logs and error bodies.

use super::types::*;
use super::{AppState, Phase};
use crate::config::TargetType;
use crate::error::{Result, RunnerError};
use crate::frame::{Column, Frame};
use crate::stats::{memory_info, PREDICT_TIMER};
use crate::utils::generate_request_id;
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse, ResponseError, Result as ActixResult};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{error, info, warn};

/// Handler for `GET /` and its `/ping` alias
pub async fn index(data: web::Data<AppState>) -> ActixResult<HttpResponse> {
    let response = ServerInfoResponse {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        target_type: data.service.target_type().as_str().to_string(),
        state: data.service.phase().as_str().to_string(),
        timestamp: chrono::Utc::now().timestamp(),
    };
    Ok(HttpResponse::Ok().json(response))
}

/// Handler for `GET /health`
///
/// Loading stays 200 with a pending flag so a supervisor keeps polling;
/// a failed load reports the dedicated load-failure status so it stops.
pub async fn health_check(data: web::Data<AppState>) -> ActixResult<HttpResponse> {
    match data.service.phase() {
        Phase::Ready(_) => Ok(HttpResponse::Ok().json(HealthResponse::ok())),
        Phase::Loading => Ok(HttpResponse::Ok().json(HealthResponse::loading())),
        Phase::Failed(message) => {
            let e = RunnerError::model_load(message);
            Ok(HttpResponse::build(e.status_code()).json(e.to_error_response()))
        }
    }
}

/// Handler for `POST /predict`
pub async fn predict(data: web::Data<AppState>, body: web::Bytes) -> ActixResult<HttpResponse> {
    let request_id = generate_request_id();

    let pipeline = match data.service.phase() {
        Phase::Ready(pipeline) => pipeline,
        Phase::Loading => {
            warn!(request_id = %request_id, "Prediction requested while model is loading");
            return Ok(loading_response(&request_id));
        }
        Phase::Failed(message) => {
            warn!(request_id = %request_id, "Prediction requested after a failed load");
            return Ok(failed_response(message, &request_id));
        }
    };

    if let Some(advice) = misdirected_predict(data.service.target_type()) {
        warn!(request_id = %request_id, "Prediction request rejected: {}", advice);
        return Ok(scoring_error(&RunnerError::invalid_input(advice), &request_id));
    }

    info!(request_id = %request_id, bytes = body.len(), "Processing prediction request");

    let started = Instant::now();
    let outcome = web::block(move || pipeline.predict(&body)).await;
    data.service
        .stats
        .record_duration(PREDICT_TIMER, started.elapsed());

    match flatten(outcome) {
        Ok(predictions) => {
            info!(
                request_id = %request_id,
                rows = predictions.n_rows(),
                "Prediction completed"
            );
            Ok(HttpResponse::Ok().json(PredictionsResponse {
                predictions: predictions.to_rows_json(),
            }))
        }
        Err(e) => {
            error!(request_id = %request_id, "Prediction failed: {}", e);
            Ok(scoring_error(&e, &request_id))
        }
    }
}

/// Handler for `POST /predictUnstructured`
pub async fn predict_unstructured(
    data: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
    query: web::Query<HashMap<String, String>>,
) -> ActixResult<HttpResponse> {
    let request_id = generate_request_id();

    let pipeline = match data.service.phase() {
        Phase::Ready(pipeline) => pipeline,
        Phase::Loading => {
            warn!(request_id = %request_id, "Prediction requested while model is loading");
            return Ok(loading_response(&request_id));
        }
        Phase::Failed(message) => {
            warn!(request_id = %request_id, "Prediction requested after a failed load");
            return Ok(failed_response(message, &request_id));
        }
    };

    let declared = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);
    let params = query.into_inner();

    info!(
        request_id = %request_id,
        bytes = body.len(),
        "Processing unstructured prediction request"
    );

    let started = Instant::now();
    let outcome =
        web::block(move || pipeline.predict_unstructured(&body, declared.as_deref(), params)).await;
    data.service
        .stats
        .record_duration(PREDICT_TIMER, started.elapsed());

    match flatten(outcome) {
        Ok((payload, content_type)) => Ok(HttpResponse::Ok()
            .content_type(content_type)
            .body(payload)),
        Err(e) => {
            error!(request_id = %request_id, "Unstructured prediction failed: {}", e);
            Ok(scoring_error(&e, &request_id))
        }
    }
}

/// Optional query parameters for `POST /transform`
#[derive(Debug, Deserialize)]
pub struct TransformQuery {
    /// Column to split out of the frame and pass as the target series
    pub target: Option<String>,
}

/// Handler for `POST /transform`
pub async fn transform(
    data: web::Data<AppState>,
    body: web::Bytes,
    query: web::Query<TransformQuery>,
) -> ActixResult<HttpResponse> {
    let request_id = generate_request_id();

    let pipeline = match data.service.phase() {
        Phase::Ready(pipeline) => pipeline,
        Phase::Loading => {
            warn!(request_id = %request_id, "Transform requested while model is loading");
            return Ok(loading_response(&request_id));
        }
        Phase::Failed(message) => {
            warn!(request_id = %request_id, "Transform requested after a failed load");
            return Ok(failed_response(message, &request_id));
        }
    };

    let target = query.into_inner().target;
    info!(request_id = %request_id, bytes = body.len(), "Processing transform request");

    let started = Instant::now();
    let outcome = web::block(move || {
        let output = pipeline.transform(&body, target.as_deref())?;
        let features = frame_csv(&output.features)?;
        let target = output.target.map(column_csv).transpose()?;
        Ok::<_, RunnerError>((features, target))
    })
    .await;
    data.service
        .stats
        .record_duration(PREDICT_TIMER, started.elapsed());

    match flatten(outcome) {
        Ok((features, target)) => Ok(HttpResponse::Ok().json(TransformResponse {
            out_format: "csv".to_string(),
            features,
            target,
        })),
        Err(e) => {
            error!(request_id = %request_id, "Transform failed: {}", e);
            Ok(scoring_error(&e, &request_id))
        }
    }
}

/// Handler for `GET /stats`: memory and timing readings, any phase
pub async fn stats(data: web::Data<AppState>) -> ActixResult<HttpResponse> {
    match memory_info() {
        Ok(info) => Ok(HttpResponse::Ok().json(StatsResponse {
            mem_info: info.into(),
            time_info: data.service.stats.time_info(),
            uptime_seconds: data.service.stats.uptime_seconds(),
        })),
        Err(e) => {
            error!("Failed to read memory info: {}", e);
            Ok(HttpResponse::build(e.status_code()).json(e.to_error_response()))
        }
    }
}

/// Default 404 handler
pub async fn not_found() -> ActixResult<HttpResponse> {
    Ok(HttpResponse::NotFound().json(json!({
        "error": {
            "message": "The requested endpoint was not found",
            "error_type": "not_found_error",
            "code": "NOT_FOUND"
        }
    })))
}

fn scoring_error(error: &RunnerError, request_id: &str) -> HttpResponse {
    HttpResponse::build(error.status_code()).json(ScoringErrorResponse {
        body: error.to_error_response(),
        request_id: request_id.to_string(),
    })
}

fn loading_response(request_id: &str) -> HttpResponse {
    HttpResponse::ServiceUnavailable().json(json!({
        "error": {
            "message": "Model is still loading, retry shortly",
            "error_type": "not_ready_error",
            "code": "NOT_READY"
        },
        "request_id": request_id
    }))
}

fn failed_response(message: String, request_id: &str) -> HttpResponse {
    scoring_error(&RunnerError::model_load(message), request_id)
}

/// Scoring routes only fit some target types; name the right door
fn misdirected_predict(target_type: TargetType) -> Option<String> {
    match target_type {
        TargetType::Transform => Some(
            "this model hosts a transform target, use the transform route instead".to_string(),
        ),
        TargetType::Unstructured => Some(
            "this model hosts an unstructured target, use the predictUnstructured route instead"
                .to_string(),
        ),
        _ => None,
    }
}

fn flatten<T>(
    outcome: std::result::Result<Result<T>, actix_web::error::BlockingError>,
) -> Result<T> {
    match outcome {
        Ok(inner) => inner,
        Err(_) => Err(RunnerError::internal("scoring task was cancelled")),
    }
}

fn frame_csv(frame: &Frame) -> Result<String> {
    let bytes = frame.to_csv()?;
    String::from_utf8(bytes)
        .map_err(|e| RunnerError::internal(format!("rendered frame is not valid utf-8: {e}")))
}

fn column_csv(column: Column) -> Result<String> {
    let frame = Frame::from_columns(vec![column])?;
    frame_csv(&frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn test_misdirected_predict_names_the_other_route() {
        let advice = misdirected_predict(TargetType::Transform).unwrap();
        assert!(advice.contains("transform"));

        let advice = misdirected_predict(TargetType::Unstructured).unwrap();
        assert!(advice.contains("predictUnstructured"));

        assert!(misdirected_predict(TargetType::Regression).is_none());
        assert!(misdirected_predict(TargetType::Binary).is_none());
    }

    #[test]
    fn test_loading_response_is_503() {
        let response = loading_response("req_1");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_failed_response_uses_load_failure_status() {
        let response = failed_response("artifact went missing".to_string(), "req_2");
        assert_eq!(response.status().as_u16(), 513);
    }

    #[test]
    fn test_flatten_maps_cancelled_block_to_internal() {
        let cancelled: std::result::Result<Result<()>, actix_web::error::BlockingError> =
            Err(actix_web::error::BlockingError);
        let err = flatten(cancelled).unwrap_err();
        assert!(matches!(err, RunnerError::Internal { .. }));
    }

    #[test]
    fn test_column_csv_renders_header_and_rows() {
        let rendered = column_csv(Column::float("y", vec![1.5, 2.5])).unwrap();
        assert_eq!(rendered, "y\n1.5\n2.5\n");
    }
}
