use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::{Order, OrderStatus};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderEventKind {
    Created,
    Assigned,
    Reassigned,
    StatusChanged,
}

/// Broadcast after every committed order change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEvent {
    pub id: Uuid,
    pub kind: OrderEventKind,
    pub order_id: Uuid,
    pub old_status: Option<OrderStatus>,
    pub new_status: OrderStatus,
    pub customer_id: Uuid,
    pub courier_id: Option<Uuid>,
    pub previous_courier_id: Option<Uuid>,
    pub occurred_at: DateTime<Utc>,
}

impl OrderEvent {
    pub fn new(kind: OrderEventKind, old_status: Option<OrderStatus>, order: &Order) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            order_id: order.id,
            old_status,
            new_status: order.status,
            customer_id: order.customer_id,
            courier_id: order.assigned_courier,
            previous_courier_id: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_previous_courier(mut self, previous: Option<Uuid>) -> Self {
        self.previous_courier_id = previous;
        self
    }
}
