pub mod assignment;
pub mod couriers;
pub mod lifecycle;
pub mod orders;
pub mod pricing;
pub mod retry;
pub mod selection;

use std::time::Instant;

use crate::models::courier::CourierStatus;
use crate::state::AppState;

fn record_workloads(state: &AppState, couriers: &[CourierStatus]) {
    for status in couriers {
        state
            .metrics
            .record_workload(&status.courier_id.to_string(), status.current_orders_count);
    }
}

fn observe_latency(state: &AppState, operation: &str, start: Instant) {
    state
        .metrics
        .operation_latency_seconds
        .with_label_values(&[operation])
        .observe(start.elapsed().as_secs_f64());
}
