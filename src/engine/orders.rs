use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::assignment::auto_assign;
use crate::error::AppError;
use crate::models::courier::{Actor, Role};
use crate::models::event::{OrderEvent, OrderEventKind};
use crate::models::order::{Order, OrderStatus};
use crate::state::AppState;

/// Minutes allowed per kilometre when estimating delivery.
const MINUTES_PER_KM: f64 = 5.0;
const BASE_DELIVERY_MINUTES: f64 = 10.0;

/// Largest distance a stored order may carry: ten digits, two of them decimals.
const MAX_DISTANCE_KM: Decimal = Decimal::from_parts(1_410_065_407, 2, 0, false, 2);
const DISTANCE_DECIMAL_PLACES: u32 = 2;

pub struct NewOrder {
    pub pickup_address: String,
    pub delivery_address: String,
    pub distance_km: Decimal,
}

/// Places an order at the active price and immediately tries to assign it.
pub async fn create_order(
    state: &AppState,
    customer: &Actor,
    request: NewOrder,
) -> Result<Order, AppError> {
    if customer.role != Role::Customer {
        return Err(AppError::Forbidden(format!(
            "user {} is not a customer and cannot place orders",
            customer.id
        )));
    }

    let (pickup_address, delivery_address) =
        validate_addresses(&request.pickup_address, &request.delivery_address)?;
    validate_distance(request.distance_km)?;

    // Price is frozen here; later pricing changes never touch this order.
    let config = state.pricing.active()?;
    let price = config.price_for(request.distance_km)?;

    let order = Order {
        id: Uuid::new_v4(),
        customer_id: customer.id,
        assigned_courier: None,
        pickup_address,
        delivery_address,
        distance_km: request.distance_km,
        price,
        status: OrderStatus::Created,
        created_at: Utc::now(),
        assigned_at: None,
        picked_up_at: None,
        in_transit_at: None,
        delivered_at: None,
        version: 0,
    };
    let order_id = order.id;

    let mut tx = state.store.begin();
    tx.put_order(order);
    let created = state.store.commit(tx)?.order(order_id)?;
    state.metrics.orders_awaiting_courier.inc();

    info!(
        order_id = %created.id,
        customer_id = %created.customer_id,
        price = %created.price,
        pricing_config_id = %config.id,
        "order created"
    );
    state.publish(OrderEvent::new(OrderEventKind::Created, None, &created));

    // The order exists from here on, so assignment trouble never fails creation.
    match auto_assign(state, order_id).await {
        Ok(order) => Ok(order),
        Err(err) => {
            warn!(
                order_id = %order_id,
                error = %err,
                "auto-assignment failed; order left waiting for a courier"
            );
            state.store.order(order_id)
        }
    }
}

fn validate_distance(distance_km: Decimal) -> Result<(), AppError> {
    if distance_km <= Decimal::ZERO {
        return Err(AppError::Validation(
            "distance must be greater than 0".to_string(),
        ));
    }
    if distance_km > MAX_DISTANCE_KM {
        return Err(AppError::Validation(format!(
            "distance cannot exceed {MAX_DISTANCE_KM} km"
        )));
    }
    if distance_km.normalize().scale() > DISTANCE_DECIMAL_PLACES {
        return Err(AppError::Validation(format!(
            "distance allows at most {DISTANCE_DECIMAL_PLACES} decimal places"
        )));
    }
    Ok(())
}

fn validate_addresses(pickup: &str, delivery: &str) -> Result<(String, String), AppError> {
    let pickup = pickup.trim();
    let delivery = delivery.trim();

    if pickup.is_empty() {
        return Err(AppError::Validation("pickup address is required".to_string()));
    }
    if delivery.is_empty() {
        return Err(AppError::Validation(
            "delivery address is required".to_string(),
        ));
    }
    if pickup.to_lowercase() == delivery.to_lowercase() {
        return Err(AppError::Validation(
            "pickup and delivery addresses cannot be the same".to_string(),
        ));
    }

    Ok((pickup.to_string(), delivery.to_string()))
}

/// Orders nobody has taken yet, oldest first.
pub fn available_orders(state: &AppState, actor: &Actor) -> Result<Vec<Order>, AppError> {
    if actor.role != Role::Courier {
        return Err(AppError::Forbidden(
            "only couriers can view available orders".to_string(),
        ));
    }

    let mut orders: Vec<Order> = state
        .store
        .orders()
        .into_iter()
        .filter(|order| order.status == OrderStatus::Created)
        .collect();
    orders.sort_by_key(|order| order.created_at);
    Ok(orders)
}

/// Orders visible to `actor`, newest first.
pub fn orders_for(state: &AppState, actor: &Actor) -> Vec<Order> {
    let mut orders: Vec<Order> = state
        .store
        .orders()
        .into_iter()
        .filter(|order| match actor.role {
            Role::Admin => true,
            Role::Customer => order.customer_id == actor.id,
            Role::Courier => order.is_assigned_to(actor.id) || order.status == OrderStatus::Created,
        })
        .collect();
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    orders
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackingStep {
    pub status: OrderStatus,
    pub label: &'static str,
    pub completed: bool,
    pub timestamp: Option<DateTime<Utc>>,
    pub progress: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackingInfo {
    pub order: Order,
    pub progress_percent: u8,
    pub steps: Vec<TrackingStep>,
    pub estimated_delivery: Option<DateTime<Utc>>,
}

pub fn tracking_info(
    state: &AppState,
    order_id: Uuid,
    actor: &Actor,
) -> Result<TrackingInfo, AppError> {
    let order = state.store.order(order_id)?;

    match actor.role {
        Role::Customer if order.customer_id != actor.id => {
            return Err(AppError::Forbidden(
                "you can only track your own orders".to_string(),
            ));
        }
        Role::Courier if !order.is_assigned_to(actor.id) => {
            return Err(AppError::Forbidden(
                "you can only track orders assigned to you".to_string(),
            ));
        }
        _ => {}
    }

    Ok(build_tracking(order))
}

fn build_tracking(order: Order) -> TrackingInfo {
    const STEPS: [(OrderStatus, &'static str); 5] = [
        (OrderStatus::Created, "Order Created"),
        (OrderStatus::Assigned, "Courier Assigned"),
        (OrderStatus::PickedUp, "Order Picked Up"),
        (OrderStatus::InTransit, "In Transit"),
        (OrderStatus::Delivered, "Delivered"),
    ];

    let steps = STEPS
        .iter()
        .map(|(status, label)| {
            let timestamp = order.timestamp_for(*status);
            TrackingStep {
                status: *status,
                label: *label,
                completed: timestamp.is_some(),
                timestamp,
                progress: status.progress_percent(),
            }
        })
        .collect();

    let estimated_delivery = match (order.status.is_active(), order.assigned_at) {
        (true, Some(assigned_at)) => {
            let km = order.distance_km.to_f64().unwrap_or_default();
            let minutes = km * MINUTES_PER_KM + BASE_DELIVERY_MINUTES;
            assigned_at.checked_add_signed(Duration::seconds((minutes * 60.0).round() as i64))
        }
        _ => None,
    };

    TrackingInfo {
        progress_percent: order.status.progress_percent(),
        steps,
        estimated_delivery,
        order,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::{build_tracking, validate_addresses, validate_distance, MAX_DISTANCE_KM};
    use crate::error::AppError;
    use crate::models::order::{Order, OrderStatus};

    #[test]
    fn distance_must_fit_ten_digits_with_two_decimals() {
        assert!(validate_distance(Decimal::new(525, 2)).is_ok());
        assert!(validate_distance(Decimal::new(5000, 3)).is_ok());
        assert!(validate_distance(MAX_DISTANCE_KM).is_ok());

        for rejected in [
            Decimal::ZERO,
            Decimal::new(-1, 0),
            MAX_DISTANCE_KM + Decimal::new(1, 2),
            Decimal::MAX,
            Decimal::new(1234, 3),
        ] {
            assert!(
                matches!(validate_distance(rejected), Err(AppError::Validation(_))),
                "{rejected} km was accepted"
            );
        }
    }

    #[test]
    fn addresses_are_trimmed_and_compared_case_insensitively() {
        let (pickup, delivery) = validate_addresses("  12 Dock Rd ", "4 Hill St").unwrap();
        assert_eq!(pickup, "12 Dock Rd");
        assert_eq!(delivery, "4 Hill St");

        assert!(matches!(
            validate_addresses("12 Dock Rd", " 12 DOCK RD "),
            Err(AppError::Validation(_))
        ));
        assert!(validate_addresses("   ", "4 Hill St").is_err());
    }

    #[test]
    fn tracking_estimates_delivery_from_assignment_time() {
        let assigned_at = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            assigned_courier: Some(Uuid::new_v4()),
            pickup_address: "A".to_string(),
            delivery_address: "B".to_string(),
            distance_km: Decimal::new(40, 1),
            price: Decimal::new(13000, 2),
            status: OrderStatus::PickedUp,
            created_at: assigned_at,
            assigned_at: Some(assigned_at),
            picked_up_at: Some(assigned_at),
            in_transit_at: None,
            delivered_at: None,
            version: 3,
        };

        let tracking = build_tracking(order);

        assert_eq!(tracking.progress_percent, 50);
        // 4 km * 5 min + 10 min
        assert_eq!(
            tracking.estimated_delivery,
            Some(assigned_at + Duration::minutes(30))
        );
        let completed: Vec<bool> = tracking.steps.iter().map(|step| step.completed).collect();
        assert_eq!(completed, vec![true, true, true, false, false]);
    }
}
