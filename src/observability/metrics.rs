use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub assignments_total: IntCounterVec,
    pub status_transitions_total: IntCounterVec,
    pub operation_latency_seconds: HistogramVec,
    pub courier_workload: IntGaugeVec,
    pub orders_awaiting_courier: IntGauge,
    pub transaction_conflicts_total: IntCounterVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let assignments_total = IntCounterVec::new(
            Opts::new("assignments_total", "Courier assignments by outcome"),
            &["outcome"],
        )
        .expect("valid assignments_total metric");

        let status_transitions_total = IntCounterVec::new(
            Opts::new(
                "status_transitions_total",
                "Committed order status transitions by target status",
            ),
            &["status"],
        )
        .expect("valid status_transitions_total metric");

        let operation_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "operation_latency_seconds",
                "Latency of dispatch operations in seconds",
            ),
            &["operation"],
        )
        .expect("valid operation_latency_seconds metric");

        let courier_workload = IntGaugeVec::new(
            Opts::new("courier_workload", "Active orders held by each courier"),
            &["courier_id"],
        )
        .expect("valid courier_workload metric");

        let orders_awaiting_courier = IntGauge::new(
            "orders_awaiting_courier",
            "Orders still waiting in CREATED status",
        )
        .expect("valid orders_awaiting_courier metric");

        let transaction_conflicts_total = IntCounterVec::new(
            Opts::new(
                "transaction_conflicts_total",
                "Optimistic commit conflicts by operation",
            ),
            &["operation"],
        )
        .expect("valid transaction_conflicts_total metric");

        registry
            .register(Box::new(assignments_total.clone()))
            .expect("register assignments_total");
        registry
            .register(Box::new(status_transitions_total.clone()))
            .expect("register status_transitions_total");
        registry
            .register(Box::new(operation_latency_seconds.clone()))
            .expect("register operation_latency_seconds");
        registry
            .register(Box::new(courier_workload.clone()))
            .expect("register courier_workload");
        registry
            .register(Box::new(orders_awaiting_courier.clone()))
            .expect("register orders_awaiting_courier");
        registry
            .register(Box::new(transaction_conflicts_total.clone()))
            .expect("register transaction_conflicts_total");

        Self {
            registry,
            assignments_total,
            status_transitions_total,
            operation_latency_seconds,
            courier_workload,
            orders_awaiting_courier,
            transaction_conflicts_total,
        }
    }

    pub fn record_workload(&self, courier_id: &str, workload: u32) {
        self.courier_workload
            .with_label_values(&[courier_id])
            .set(i64::from(workload));
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
