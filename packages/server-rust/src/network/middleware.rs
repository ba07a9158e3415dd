//! HTTP middleware stack for the RPC listener.
//!
//! Layers are listed outermost first: the first layer sees the request
//! first and the response last.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::HeaderName;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::config::HttpConfig;
use super::handlers::error::error_body;
use super::shutdown::ShutdownController;
use netplane_core::ErrorKind;

/// The composed layer type produced by [`build_http_layers`].
type HttpLayers = tower::layer::util::Stack<
    PropagateRequestIdLayer,
    tower::layer::util::Stack<
        TimeoutLayer,
        tower::layer::util::Stack<
            RequestBodyLimitLayer,
            tower::layer::util::Stack<
                CompressionLayer,
                tower::layer::util::Stack<
                    TraceLayer<
                        tower_http::classify::SharedClassifier<
                            tower_http::classify::ServerErrorsAsFailures,
                        >,
                    >,
                    tower::layer::util::Stack<
                        SetRequestIdLayer<MakeRequestUuid>,
                        tower::layer::util::Identity,
                    >,
                >,
            >,
        >,
    >,
>;

/// Builds the transport-level middleware stack.
///
/// Order (outermost to innermost): request id, tracing, gzip compression,
/// body size limit, request timeout, request id propagation.
#[must_use]
pub fn build_http_layers(config: &HttpConfig) -> HttpLayers {
    let x_request_id = HeaderName::from_static("x-request-id");

    ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .layer(PropagateRequestIdLayer::new(x_request_id))
        .into_inner()
}

/// Counts API requests as in flight and rejects new ones while draining.
///
/// Health routes are mounted outside this middleware so health checks keep
/// answering during shutdown.
pub async fn track_in_flight(
    State(shutdown): State<Arc<ShutdownController>>,
    request: Request,
    next: Next,
) -> Response {
    if shutdown.is_draining() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            error_body(ErrorKind::Unavailable, "server is shutting down"),
        )
            .into_response();
    }
    let _guard = shutdown.in_flight_guard();
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    use super::*;

    fn tracked(shutdown: &Arc<ShutdownController>) -> Router {
        Router::new()
            .route("/work", get(|| async { "done" }))
            .layer(axum::middleware::from_fn_with_state(
                Arc::clone(shutdown),
                track_in_flight,
            ))
    }

    #[test]
    fn layers_build_with_custom_limits() {
        let config = HttpConfig {
            request_timeout: Duration::from_secs(5),
            max_body_bytes: 64,
            ..HttpConfig::default()
        };
        let _layers = build_http_layers(&config);
    }

    #[tokio::test]
    async fn request_ids_are_set_and_propagated() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(build_http_layers(&HttpConfig::default()));

        let response = app
            .oneshot(http::Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn requests_pass_while_serving() {
        let shutdown = Arc::new(ShutdownController::new());
        shutdown.set_ready();

        let response = tracked(&shutdown)
            .oneshot(http::Request::builder().uri("/work").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(shutdown.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn draining_rejects_new_requests() {
        let shutdown = Arc::new(ShutdownController::new());
        shutdown.trigger_shutdown();

        let response = tracked(&shutdown)
            .oneshot(http::Request::builder().uri("/work").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
