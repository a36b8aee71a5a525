// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, MatchedPath},
    http::{header, HeaderValue, Request},
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::info_span;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    models::{DepositForm, DepositResponse, RevealResponse},
    state::AppState,
};

pub mod health;
pub mod secrets;

/// Room for form encoding overhead on top of the plaintext limit.
const FORM_OVERHEAD_BYTES: usize = 4 * 1024;

pub fn router(state: AppState) -> Router {
    // Percent-encoding can triple the size of the plaintext on the wire.
    let body_limit = state
        .secrets
        .settings()
        .max_secret_bytes
        .saturating_mul(3)
        .saturating_add(FORM_OVERHEAD_BYTES);

    let routes = Router::new()
        .route("/", post(secrets::deposit_secret))
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/{token}/{key}", get(secrets::reveal_secret))
        .with_state(state);

    // Spans carry the route template only; the raw path holds the key.
    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
        let route = request
            .extensions()
            .get::<MatchedPath>()
            .map(MatchedPath::as_str)
            .unwrap_or("<unmatched>");
        let request_id = request
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-");
        info_span!(
            "http_request",
            method = %request.method(),
            route = %route,
            request_id = %request_id,
        )
    });

    Router::new()
        .merge(routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(trace)
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(SetResponseHeaderLayer::overriding(
                    header::CACHE_CONTROL,
                    HeaderValue::from_static("no-store"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::REFERRER_POLICY,
                    HeaderValue::from_static("no-referrer"),
                )),
        )
}

#[derive(OpenApi)]
#[openapi(
    paths(
        secrets::deposit_secret,
        secrets::reveal_secret,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            DepositForm,
            DepositResponse,
            RevealResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Secrets", description = "One-time secret deposit and reveal"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;
