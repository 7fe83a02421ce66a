use rust_decimal::Decimal;
use tokio::sync::broadcast;
use tracing::debug;

use crate::config::{Config, DispatchPolicy};
use crate::engine::pricing::PricingBook;
use crate::models::event::OrderEvent;
use crate::notifications::NotificationInbox;
use crate::observability::metrics::Metrics;
use crate::store::Store;

pub struct AppState {
    pub store: Store,
    pub pricing: PricingBook,
    pub notifications: NotificationInbox,
    pub events_tx: broadcast::Sender<OrderEvent>,
    pub metrics: Metrics,
    pub policy: DispatchPolicy,
}

impl AppState {
    /// Builds the shared state plus a first event subscription, taken before
    /// anything can be published.
    pub fn new(
        policy: DispatchPolicy,
        base_fee: Decimal,
        per_km_rate: Decimal,
        event_buffer_size: usize,
    ) -> (Self, broadcast::Receiver<OrderEvent>) {
        let (events_tx, events_rx) = broadcast::channel(event_buffer_size);

        (
            Self {
                store: Store::new(),
                pricing: PricingBook::new(base_fee, per_km_rate),
                notifications: NotificationInbox::new(),
                events_tx,
                metrics: Metrics::new(),
                policy,
            },
            events_rx,
        )
    }

    pub fn from_config(config: &Config) -> (Self, broadcast::Receiver<OrderEvent>) {
        Self::new(
            config.dispatch,
            config.default_base_fee,
            config.default_per_km_rate,
            config.event_buffer_size,
        )
    }

    pub fn publish(&self, event: OrderEvent) {
        if self.events_tx.send(event).is_err() {
            debug!("order event dropped: no subscribers");
        }
    }
}
