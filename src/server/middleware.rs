//! Request logging middleware
//!
//! Emits one log line per request with method, path, outcome and timing.
//! Client errors stay at info since rejected payloads are routine for a
//! scoring service; only server-side failures warn.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures_util::future::LocalBoxFuture;
use std::{
    future::{ready, Ready},
    rc::Rc,
    time::Instant,
};
use tracing::{info, warn};

/// Request logging middleware
pub struct RequestLogging;

impl<S, B> Transform<S, ServiceRequest> for RequestLogging
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RequestLoggingMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestLoggingMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct RequestLoggingMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for RequestLoggingMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let started = Instant::now();

        let method = req.method().to_string();
        let path = req.path().to_string();
        let remote_addr = req
            .connection_info()
            .peer_addr()
            .unwrap_or("unknown")
            .to_string();

        Box::pin(async move {
            let response = service.call(req).await;
            let duration_ms = started.elapsed().as_millis();

            match &response {
                Ok(service_response) => {
                    let status = service_response.status();
                    if status.is_server_error() {
                        warn!(
                            method = %method,
                            path = %path,
                            status = %status,
                            duration_ms = %duration_ms,
                            remote_addr = %remote_addr,
                            "Request failed"
                        );
                    } else {
                        info!(
                            method = %method,
                            path = %path,
                            status = %status,
                            duration_ms = %duration_ms,
                            remote_addr = %remote_addr,
                            "Request completed"
                        );
                    }
                }
                Err(error) => {
                    warn!(
                        method = %method,
                        path = %path,
                        duration_ms = %duration_ms,
                        remote_addr = %remote_addr,
                        error = %error,
                        "Request errored"
                    );
                }
            }

            response
        })
    }
}
