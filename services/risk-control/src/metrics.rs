use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

lazy_static! {
    // Evaluator
    pub static ref RISK_CHECKS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("risk_checks_total", "Risk checks by outcome"),
        &["outcome"]
    ).expect("metric can be created");

    pub static ref AUTO_RELEASES_TOTAL: IntCounter = IntCounter::new(
        "risk_auto_releases_total",
        "Restrictions lifted lazily after their timer elapsed"
    ).expect("metric can be created");

    // State transitions outside the evaluator
    pub static ref TRANSITIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("risk_transitions_total", "Risk state transitions by kind"),
        &["kind"]
    ).expect("metric can be created");

    // Scheduled sweeps
    pub static ref SWEEP_RESULTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("risk_sweep_results_total", "Per-user sweep results"),
        &["scanner", "result"]
    ).expect("metric can be created");

    // Payment gateway
    pub static ref PAYMENT_AUTHORIZATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("payment_authorizations_total", "Payment authorization attempts by result"),
        &["result"]
    ).expect("metric can be created");

    // Store
    pub static ref STORE_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("risk_store_errors_total", "Failed risk control store calls"),
        &["operation"]
    ).expect("metric can be created");
}

/// Register all metrics with the given registry
pub fn register_metrics(registry: &Registry) -> Result<(), prometheus::Error> {
    registry.register(Box::new(RISK_CHECKS_TOTAL.clone()))?;
    registry.register(Box::new(AUTO_RELEASES_TOTAL.clone()))?;
    registry.register(Box::new(TRANSITIONS_TOTAL.clone()))?;
    registry.register(Box::new(SWEEP_RESULTS_TOTAL.clone()))?;
    registry.register(Box::new(PAYMENT_AUTHORIZATIONS_TOTAL.clone()))?;
    registry.register(Box::new(STORE_ERRORS_TOTAL.clone()))?;
    Ok(())
}

/// Render the default registry in Prometheus text format
pub fn render() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
