use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Created,
    Assigned,
    PickedUp,
    InTransit,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Created,
        OrderStatus::Assigned,
        OrderStatus::PickedUp,
        OrderStatus::InTransit,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    /// No transition leaves a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Statuses that count towards a courier's workload.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Assigned | Self::PickedUp | Self::InTransit)
    }

    pub fn progress_percent(self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Assigned => 25,
            Self::PickedUp => 50,
            Self::InTransit => 75,
            Self::Delivered => 100,
            Self::Cancelled => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Assigned => "ASSIGNED",
            Self::PickedUp => "PICKED_UP",
            Self::InTransit => "IN_TRANSIT",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| AppError::Validation(format!("unknown order status: {s}")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub assigned_courier: Option<Uuid>,
    pub pickup_address: String,
    pub delivery_address: String,
    pub distance_km: Decimal,
    pub price: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub in_transit_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    /// Store version this copy was read at.
    pub version: u64,
}

impl Order {
    pub fn timestamp_for(&self, status: OrderStatus) -> Option<DateTime<Utc>> {
        match status {
            OrderStatus::Created => Some(self.created_at),
            OrderStatus::Assigned => self.assigned_at,
            OrderStatus::PickedUp => self.picked_up_at,
            OrderStatus::InTransit => self.in_transit_at,
            OrderStatus::Delivered => self.delivered_at,
            OrderStatus::Cancelled => None,
        }
    }

    pub fn latest_timestamp(&self) -> DateTime<Utc> {
        [
            self.assigned_at,
            self.picked_up_at,
            self.in_transit_at,
            self.delivered_at,
        ]
        .into_iter()
        .flatten()
        .fold(self.created_at, DateTime::max)
    }

    /// Wall-clock time, clamped so the order's timestamps never run backwards.
    pub fn next_timestamp(&self) -> DateTime<Utc> {
        Utc::now().max(self.latest_timestamp())
    }

    /// Moves the order to `status` and stamps the matching timestamp field.
    pub fn stamp(&mut self, status: OrderStatus, at: DateTime<Utc>) {
        self.status = status;
        match status {
            OrderStatus::Assigned => self.assigned_at = Some(at),
            OrderStatus::PickedUp => self.picked_up_at = Some(at),
            OrderStatus::InTransit => self.in_transit_at = Some(at),
            OrderStatus::Delivered => self.delivered_at = Some(at),
            OrderStatus::Created | OrderStatus::Cancelled => {}
        }
    }

    pub fn is_assigned_to(&self, courier_id: Uuid) -> bool {
        self.assigned_courier == Some(courier_id)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::{Order, OrderStatus};
    use crate::error::AppError;

    fn order() -> Order {
        Order {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            assigned_courier: None,
            pickup_address: "1 Harbour St".to_string(),
            delivery_address: "9 Mill Lane".to_string(),
            distance_km: Decimal::new(50, 1),
            price: Decimal::new(15000, 2),
            status: OrderStatus::Created,
            created_at: Utc::now(),
            assigned_at: None,
            picked_up_at: None,
            in_transit_at: None,
            delivered_at: None,
            version: 0,
        }
    }

    #[test]
    fn status_round_trips_through_its_wire_name() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!(matches!(
            "SHIPPED".parse::<OrderStatus>(),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn next_timestamp_never_precedes_existing_ones() {
        let mut order = order();
        let future = Utc::now() + Duration::minutes(5);
        order.assigned_at = Some(future);

        assert!(order.next_timestamp() >= future);
    }

    #[test]
    fn cancelling_stamps_nothing() {
        let mut order = order();
        let at = Utc::now();
        order.stamp(OrderStatus::Cancelled, at);

        assert_eq!(order.status, OrderStatus::Cancelled);
        assert!(order.assigned_at.is_none());
        assert!(order.delivered_at.is_none());
    }
}
