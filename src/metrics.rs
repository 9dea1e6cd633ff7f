//! Prometheus metrics. Follows the teacher's `LazyLock<Registry>`
//! pattern from `src/commands/watch.rs`; metric names are transliterated
//! from `original_source/src/utils/metrics.py`'s `HarvestMetrics` and
//! `SystemMetrics`.

use std::sync::LazyLock;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};

static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static DISCOVERED_SERVICES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let c = IntCounterVec::new(
        Opts::new(
            "api_harvester_discovered_services_total",
            "Total number of services discovered",
        ),
        &["namespace"],
    )
    .expect("metric definition is valid");
    REGISTRY.register(Box::new(c.clone())).expect("metric not yet registered");
    c
});

static HARVESTED_SPECS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let c = IntCounterVec::new(
        Opts::new(
            "api_harvester_harvested_specs_total",
            "Total number of API specs harvested",
        ),
        &["service", "namespace", "status"],
    )
    .expect("metric definition is valid");
    REGISTRY.register(Box::new(c.clone())).expect("metric not yet registered");
    c
});

static HARVEST_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    let h = HistogramVec::new(
        HistogramOpts::new(
            "api_harvester_harvest_duration_seconds",
            "Time spent harvesting API specs",
        ),
        &["operation"],
    )
    .expect("metric definition is valid");
    REGISTRY.register(Box::new(h.clone())).expect("metric not yet registered");
    h
});

static HARVEST_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let c = IntCounterVec::new(
        Opts::new("api_harvester_errors_total", "Total number of harvest errors"),
        &["error_type", "service"],
    )
    .expect("metric definition is valid");
    REGISTRY.register(Box::new(c.clone())).expect("metric not yet registered");
    c
});

static CONSISTENCY_ISSUES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let c = IntCounterVec::new(
        Opts::new(
            "api_harvester_consistency_issues_total",
            "Total number of consistency issues found",
        ),
        &["severity", "category"],
    )
    .expect("metric definition is valid");
    REGISTRY.register(Box::new(c.clone())).expect("metric not yet registered");
    c
});

static FIELDS_ANALYZED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let c = IntCounterVec::new(
        Opts::new(
            "api_harvester_fields_analyzed_total",
            "Total number of fields analyzed",
        ),
        &["service", "namespace"],
    )
    .expect("metric definition is valid");
    REGISTRY.register(Box::new(c.clone())).expect("metric not yet registered");
    c
});

static COMPLIANCE_SCORE: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    let g = IntGaugeVec::new(
        Opts::new("api_harvester_compliance_score", "Per-service compliance score (0-100)"),
        &["service", "namespace"],
    )
    .expect("metric definition is valid");
    REGISTRY.register(Box::new(g.clone())).expect("metric not yet registered");
    g
});

static ACTIVE_SERVICES: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    let g = IntGaugeVec::new(
        Opts::new("api_harvester_active_services", "Number of currently active services"),
        &["namespace"],
    )
    .expect("metric definition is valid");
    REGISTRY.register(Box::new(g.clone())).expect("metric not yet registered");
    g
});

static LAST_HARVEST_TIMESTAMP: LazyLock<IntGauge> = LazyLock::new(|| {
    let g = IntGauge::new(
        "api_harvester_last_harvest_timestamp",
        "Unix timestamp of the last completed cycle",
    )
    .expect("metric definition is valid");
    REGISTRY.register(Box::new(g.clone())).expect("metric not yet registered");
    g
});

static HARVEST_SUCCESS_RATE: LazyLock<IntGauge> = LazyLock::new(|| {
    let g = IntGauge::new(
        "api_harvester_harvest_success_rate",
        "Success rate of API spec harvesting, as a percentage",
    )
    .expect("metric definition is valid");
    REGISTRY.register(Box::new(g.clone())).expect("metric not yet registered");
    g
});

static HTTP_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let c = IntCounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests"),
        &["method", "endpoint", "status_code"],
    )
    .expect("metric definition is valid");
    REGISTRY.register(Box::new(c.clone())).expect("metric not yet registered");
    c
});

static HTTP_REQUEST_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    let h = HistogramVec::new(
        HistogramOpts::new("http_request_duration_seconds", "HTTP request duration"),
        &["method", "endpoint"],
    )
    .expect("metric definition is valid");
    REGISTRY.register(Box::new(h.clone())).expect("metric not yet registered");
    h
});

static HEALTH_CHECK_STATUS: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    let g = IntGaugeVec::new(
        Opts::new("health_check_status", "Health check status (1=healthy, 0=unhealthy)"),
        &["check_type"],
    )
    .expect("metric definition is valid");
    REGISTRY.register(Box::new(g.clone())).expect("metric not yet registered");
    g
});

/// Forces every metric to register, so `/metrics` is non-empty even
/// before the first cycle runs.
pub fn init() {
    LazyLock::force(&DISCOVERED_SERVICES);
    LazyLock::force(&HARVESTED_SPECS);
    LazyLock::force(&HARVEST_DURATION);
    LazyLock::force(&HARVEST_ERRORS);
    LazyLock::force(&CONSISTENCY_ISSUES);
    LazyLock::force(&FIELDS_ANALYZED);
    LazyLock::force(&COMPLIANCE_SCORE);
    LazyLock::force(&ACTIVE_SERVICES);
    LazyLock::force(&LAST_HARVEST_TIMESTAMP);
    LazyLock::force(&HARVEST_SUCCESS_RATE);
    LazyLock::force(&HTTP_REQUESTS);
    LazyLock::force(&HTTP_REQUEST_DURATION);
    LazyLock::force(&HEALTH_CHECK_STATUS);
}

pub fn record_discovery(namespace: &str, count: usize) {
    DISCOVERED_SERVICES.with_label_values(&[namespace]).inc_by(count as u64);
    ACTIVE_SERVICES.with_label_values(&[namespace]).set(count as i64);
}

pub fn record_harvest(service: &str, namespace: &str, status: &str, duration_secs: f64) {
    HARVESTED_SPECS.with_label_values(&[service, namespace, status]).inc();
    HARVEST_DURATION.with_label_values(&["harvest"]).observe(duration_secs);
}

pub fn record_harvest_error(error_type: &str, service: &str) {
    HARVEST_ERRORS.with_label_values(&[error_type, service]).inc();
}

pub fn record_analysis(service: &str, namespace: &str, score: f64, findings_by_severity: &[(&str, u32)], fields_count: u32) {
    COMPLIANCE_SCORE.with_label_values(&[service, namespace]).set(score as i64);
    FIELDS_ANALYZED.with_label_values(&[service, namespace]).inc_by(fields_count as u64);
    for (severity, count) in findings_by_severity {
        CONSISTENCY_ISSUES
            .with_label_values(&[severity, "compliance"])
            .inc_by(*count as u64);
    }
}

pub fn record_cycle_complete(success_rate_percent: f64) {
    LAST_HARVEST_TIMESTAMP.set(chrono::Utc::now().timestamp());
    HARVEST_SUCCESS_RATE.set(success_rate_percent as i64);
}

pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration_secs: f64) {
    HTTP_REQUESTS
        .with_label_values(&[method, endpoint, &status_code.to_string()])
        .inc();
    HTTP_REQUEST_DURATION
        .with_label_values(&[method, endpoint])
        .observe(duration_secs);
}

pub fn update_health_status(check_type: &str, is_healthy: bool) {
    HEALTH_CHECK_STATUS
        .with_label_values(&[check_type])
        .set(if is_healthy { 1 } else { 0 });
}

/// Renders the current registry in Prometheus text exposition format.
pub fn gather() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}
