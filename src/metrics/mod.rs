use anyhow::Result;
use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec,
    Opts, Registry, TextEncoder,
};
use tokio::task::JoinHandle;
use tracing::info;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref POLICY_EVALUATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "policy_evaluations_total",
            "Total number of policy evaluation passes, by policy kind"
        ),
        &["kind"],
    ).unwrap();

    pub static ref POLICY_COMPLIANCE_STATE: IntGaugeVec = IntGaugeVec::new(
        Opts::new(
            "policy_compliance_state",
            "Compliance state of a policy: 0=NonCompliant, 1=Compliant, 2=Undetermined"
        ),
        &["kind", "namespace", "name"],
    ).unwrap();

    pub static ref POLICY_EVALUATION_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "policy_evaluation_duration_seconds",
            "Time spent evaluating a single policy"
        ).buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]),
        &["kind"],
    ).unwrap();

    pub static ref POLICY_DISCOVERY_REFRESH_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "policy_discovery_refresh_total",
            "Discovery snapshot refresh outcomes"
        ),
        &["result"],
    ).unwrap();

    pub static ref POLICY_SCHEDULER_PASS_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "policy_scheduler_pass_duration_seconds",
            "Time spent on one full scheduler pass across all policies of a kind"
        ).buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0])
    ).unwrap();

    pub static ref POLICY_EVENTS_EMITTED_TOTAL: IntCounter = IntCounter::new(
        "policy_events_emitted_total",
        "Total number of Kubernetes Events emitted on policy owners"
    ).unwrap();
}

/// Compliance state encoded for the `policy_compliance_state` gauge.
pub fn compliance_state_value(compliant: bool, undetermined: bool) -> i64 {
    if undetermined {
        2
    } else if compliant {
        1
    } else {
        0
    }
}

pub fn register_metrics() {
    REGISTRY
        .register(Box::new(POLICY_EVALUATIONS_TOTAL.clone()))
        .ok();
    REGISTRY
        .register(Box::new(POLICY_COMPLIANCE_STATE.clone()))
        .ok();
    REGISTRY
        .register(Box::new(POLICY_EVALUATION_DURATION.clone()))
        .ok();
    REGISTRY
        .register(Box::new(POLICY_DISCOVERY_REFRESH_TOTAL.clone()))
        .ok();
    REGISTRY
        .register(Box::new(POLICY_SCHEDULER_PASS_DURATION.clone()))
        .ok();
    REGISTRY
        .register(Box::new(POLICY_EVENTS_EMITTED_TOTAL.clone()))
        .ok();

    info!("Metrics registered");
}

pub async fn start_metrics_server() -> Result<JoinHandle<()>> {
    register_metrics();

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_check));

    let addr = "0.0.0.0:9090";
    info!("Starting metrics server on {}", addr);

    let handle = tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .expect("Failed to bind metrics server");

        axum::serve(listener, app)
            .await
            .expect("Metrics server failed");
    });

    Ok(handle)
}

async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4",
        )],
        buffer,
    )
        .into_response()
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
