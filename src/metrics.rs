//! Prometheus metrics for the startpage backend.
//!
//! All metric types use atomics internally (no locks on the hot path).
//! The `Metrics` struct is `Clone`-cheap (Arc-based registry + Arc-based collectors).

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use prometheus::{
    Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    Opts, Registry, TextEncoder, TEXT_FORMAT,
};
use std::sync::Arc;
use std::time::Instant;

use crate::api::handlers::AppState;

/// All Prometheus metrics for the startpage backend.
#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // -- Process & Build --
    pub process_start_time_seconds: Gauge,
    pub build_info: GaugeVec,

    // -- HTTP Requests --
    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,

    // -- Auth --
    pub auth_attempts_total: IntCounterVec,
    pub sessions_active: IntGauge,

    // -- Icon catalog --
    pub icon_index_cache_hits_total: IntCounter,
    pub icon_index_cache_misses_total: IntCounter,
    pub icon_index_entries: IntGauge,

    // -- Upstream fetches --
    pub upstream_requests_total: IntCounterVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        // -- Process & Build --
        let process_start_time_seconds =
            Gauge::new("process_start_time_seconds", "Start time of the process").unwrap();
        registry
            .register(Box::new(process_start_time_seconds.clone()))
            .unwrap();

        let build_info = GaugeVec::new(
            Opts::new("kiss_startpage_build_info", "Build information"),
            &["version"],
        )
        .unwrap();
        registry.register(Box::new(build_info.clone())).unwrap();

        // Register standard process metrics (RSS, CPU, open FDs on Linux)
        #[cfg(target_os = "linux")]
        {
            let pc = prometheus::process_collector::ProcessCollector::for_self();
            let _ = registry.register(Box::new(pc));
        }

        // -- HTTP Requests --
        let http_requests_total = IntCounterVec::new(
            Opts::new(
                "kiss_startpage_http_requests_total",
                "Total HTTP requests by method, status, and route",
            ),
            &["method", "status", "route"],
        )
        .unwrap();
        registry
            .register(Box::new(http_requests_total.clone()))
            .unwrap();

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "kiss_startpage_http_request_duration_seconds",
                "HTTP request duration in seconds",
            ),
            &["method", "route"],
        )
        .unwrap();
        registry
            .register(Box::new(http_request_duration_seconds.clone()))
            .unwrap();

        // -- Auth --
        let auth_attempts_total = IntCounterVec::new(
            Opts::new(
                "kiss_startpage_auth_attempts_total",
                "Login and bootstrap attempts by result",
            ),
            &["kind", "result"],
        )
        .unwrap();
        registry
            .register(Box::new(auth_attempts_total.clone()))
            .unwrap();

        let sessions_active = IntGauge::new(
            "kiss_startpage_sessions_active",
            "Sessions in the table (updated on scrape)",
        )
        .unwrap();
        registry.register(Box::new(sessions_active.clone())).unwrap();

        // -- Icon catalog --
        let icon_index_cache_hits_total = IntCounter::new(
            "kiss_startpage_icon_index_cache_hits_total",
            "Icon index lookups served from the cached snapshot",
        )
        .unwrap();
        registry
            .register(Box::new(icon_index_cache_hits_total.clone()))
            .unwrap();

        let icon_index_cache_misses_total = IntCounter::new(
            "kiss_startpage_icon_index_cache_misses_total",
            "Icon index lookups that triggered a refresh",
        )
        .unwrap();
        registry
            .register(Box::new(icon_index_cache_misses_total.clone()))
            .unwrap();

        let icon_index_entries = IntGauge::new(
            "kiss_startpage_icon_index_entries",
            "Entries in the current icon index snapshot",
        )
        .unwrap();
        registry
            .register(Box::new(icon_index_entries.clone()))
            .unwrap();

        // -- Upstream fetches --
        let upstream_requests_total = IntCounterVec::new(
            Opts::new(
                "kiss_startpage_upstream_requests_total",
                "Icon downloads by source and outcome",
            ),
            &["source", "outcome"],
        )
        .unwrap();
        registry
            .register(Box::new(upstream_requests_total.clone()))
            .unwrap();

        Metrics {
            registry,
            process_start_time_seconds,
            build_info,
            http_requests_total,
            http_request_duration_seconds,
            auth_attempts_total,
            sessions_active,
            icon_index_cache_hits_total,
            icon_index_cache_misses_total,
            icon_index_entries,
            upstream_requests_total,
        }
    }
}

/// Map a request path to a bounded route label.
pub fn classify_route(path: &str) -> &'static str {
    match path {
        "/health" => "health",
        "/metrics" => "metrics",
        "/api/version" => "version",
        "/api/config" => "config",
        "/api/auth/status" => "auth_status",
        "/api/auth/bootstrap" => "bootstrap",
        "/api/login" => "login",
        "/api/logout" => "logout",
        "/api/auth/change-username" => "change_username",
        "/api/auth/change-password" => "change_password",
        "/api/icons/search" => "icon_search",
        "/api/icons/import-selfhst" => "import_selfhst",
        "/api/icons/import-iconify" => "import_iconify",
        p if p.starts_with("/icons/") => "private_icon",
        p if p.starts_with("/api/") => "api_unknown",
        _ => "static",
    }
}

/// Axum middleware that records HTTP request metrics.
pub async fn http_metrics_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let metrics = match &state.metrics {
        Some(m) => m,
        None => return next.run(request).await,
    };

    let method = request.method().to_string();
    let route = classify_route(request.uri().path());

    let start = Instant::now();
    let response = next.run(request).await;
    let duration = start.elapsed().as_secs_f64();

    let status = response.status().as_u16().to_string();
    metrics
        .http_requests_total
        .with_label_values(&[&method, &status, route])
        .inc();
    metrics
        .http_request_duration_seconds
        .with_label_values(&[&method, route])
        .observe(duration);

    response
}

/// Handler for GET /metrics: returns Prometheus text format.
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let metrics = match &state.metrics {
        Some(m) => m,
        None => {
            return (StatusCode::NOT_FOUND, "Metrics not enabled").into_response();
        }
    };

    metrics.sessions_active.set(state.sessions.len() as i64);

    let encoder = TextEncoder::new();
    let metric_families = metrics.registry.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response();
    }

    (StatusCode::OK, [("content-type", TEXT_FORMAT)], buffer).into_response()
}
