use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub order_transitions_total: IntCounterVec,
    pub payment_callbacks_total: IntCounterVec,
    pub notifications_total: IntCounterVec,
    pub notifications_in_queue: IntGauge,
    pub gateway_latency_seconds: HistogramVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let order_transitions_total = IntCounterVec::new(
            Opts::new(
                "order_transitions_total",
                "Applied order lifecycle transitions by target status",
            ),
            &["status"],
        )
        .expect("valid order_transitions_total metric");

        let payment_callbacks_total = IntCounterVec::new(
            Opts::new("payment_callbacks_total", "Payment callbacks by outcome"),
            &["outcome"],
        )
        .expect("valid payment_callbacks_total metric");

        let notifications_total = IntCounterVec::new(
            Opts::new("notifications_total", "Outbound SMS attempts by outcome"),
            &["outcome"],
        )
        .expect("valid notifications_total metric");

        let notifications_in_queue = IntGauge::new(
            "notifications_in_queue",
            "Current number of notifications waiting for dispatch",
        )
        .expect("valid notifications_in_queue metric");

        let gateway_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "gateway_latency_seconds",
                "Latency of outbound provider calls in seconds",
            ),
            &["gateway", "outcome"],
        )
        .expect("valid gateway_latency_seconds metric");

        registry
            .register(Box::new(order_transitions_total.clone()))
            .expect("register order_transitions_total");
        registry
            .register(Box::new(payment_callbacks_total.clone()))
            .expect("register payment_callbacks_total");
        registry
            .register(Box::new(notifications_total.clone()))
            .expect("register notifications_total");
        registry
            .register(Box::new(notifications_in_queue.clone()))
            .expect("register notifications_in_queue");
        registry
            .register(Box::new(gateway_latency_seconds.clone()))
            .expect("register gateway_latency_seconds");

        Self {
            registry,
            order_transitions_total,
            payment_callbacks_total,
            notifications_total,
            notifications_in_queue,
            gateway_latency_seconds,
        }
    }

    pub fn observe_gateway(&self, gateway: &str, success: bool, seconds: f64) {
        let outcome = if success { "success" } else { "error" };
        self.gateway_latency_seconds
            .with_label_values(&[gateway, outcome])
            .observe(seconds);
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
