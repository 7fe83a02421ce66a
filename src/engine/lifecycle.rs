use std::time::Instant;

use tracing::info;
use uuid::Uuid;

use crate::engine::retry::with_retry;
use crate::engine::{observe_latency, record_workloads};
use crate::error::AppError;
use crate::models::courier::{Actor, Role};
use crate::models::event::{OrderEvent, OrderEventKind};
use crate::models::order::{Order, OrderStatus};
use crate::state::AppState;

/// Statuses reachable in one step from `from`.
pub fn allowed_transitions(from: OrderStatus) -> &'static [OrderStatus] {
    match from {
        OrderStatus::Created => &[OrderStatus::Assigned, OrderStatus::Cancelled],
        OrderStatus::Assigned => &[OrderStatus::PickedUp, OrderStatus::Cancelled],
        OrderStatus::PickedUp => &[OrderStatus::InTransit, OrderStatus::Cancelled],
        OrderStatus::InTransit => &[OrderStatus::Delivered, OrderStatus::Cancelled],
        OrderStatus::Delivered | OrderStatus::Cancelled => &[],
    }
}

pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    allowed_transitions(from).contains(&to)
}

/// Admins may move any order; the assigned courier may move their own; a
/// customer may only cancel their own.
pub fn authorize_transition(
    order: &Order,
    requested: OrderStatus,
    actor: &Actor,
) -> Result<(), AppError> {
    let allowed = match actor.role {
        Role::Admin => true,
        Role::Courier => order.is_assigned_to(actor.id),
        Role::Customer => order.customer_id == actor.id && requested == OrderStatus::Cancelled,
    };

    if allowed {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "user {} may not move order {} to {}",
            actor.id, order.id, requested
        )))
    }
}

pub async fn apply_status_transition(
    state: &AppState,
    order_id: Uuid,
    requested: OrderStatus,
    actor: &Actor,
) -> Result<Order, AppError> {
    let start = Instant::now();
    let outcome = with_retry(state, "status_transition", || {
        transition_once(state, order_id, requested, actor)
    })
    .await;
    observe_latency(state, "status_transition", start);

    let (order, old_status) = outcome?;

    state
        .metrics
        .status_transitions_total
        .with_label_values(&[requested.as_str()])
        .inc();
    if old_status == OrderStatus::Created {
        state.metrics.orders_awaiting_courier.dec();
    }

    info!(
        order_id = %order.id,
        from = %old_status,
        to = %order.status,
        actor_id = %actor.id,
        "order status changed"
    );

    state.publish(OrderEvent::new(
        OrderEventKind::StatusChanged,
        Some(old_status),
        &order,
    ));

    Ok(order)
}

fn transition_once(
    state: &AppState,
    order_id: Uuid,
    requested: OrderStatus,
    actor: &Actor,
) -> Result<(Order, OrderStatus), AppError> {
    let mut order = state.store.order(order_id)?;
    authorize_transition(&order, requested, actor)?;

    let old_status = order.status;
    if !can_transition(old_status, requested) {
        return Err(AppError::InvalidTransition {
            from: old_status,
            to: requested,
        });
    }

    if requested == OrderStatus::Assigned && order.assigned_courier.is_none() {
        return Err(AppError::InvalidOperation(format!(
            "order {order_id} has no courier; assign one before marking it ASSIGNED"
        )));
    }

    let mut tx = state.store.begin();

    let now = order.next_timestamp();
    order.stamp(requested, now);

    if requested.is_terminal() {
        if let Some(courier_id) = order.assigned_courier {
            let mut status = state.store.courier_status_or_default(courier_id);
            status.release_order();
            tx.put_courier(status);
        }
    }

    tx.put_order(order);
    let committed = state.store.commit(tx)?;
    record_workloads(state, &committed.couriers);

    Ok((committed.order(order_id)?, old_status))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::{allowed_transitions, authorize_transition, can_transition};
    use crate::error::AppError;
    use crate::models::courier::{Actor, Role};
    use crate::models::order::{Order, OrderStatus};

    #[test]
    fn happy_path_is_a_single_chain() {
        let chain = [
            OrderStatus::Created,
            OrderStatus::Assigned,
            OrderStatus::PickedUp,
            OrderStatus::InTransit,
            OrderStatus::Delivered,
        ];

        for pair in chain.windows(2) {
            assert!(can_transition(pair[0], pair[1]));
        }
        assert!(!can_transition(OrderStatus::Assigned, OrderStatus::Delivered));
        assert!(!can_transition(OrderStatus::Created, OrderStatus::Delivered));
    }

    #[test]
    fn transition_table_is_exactly_forward_or_cancel() {
        use crate::models::order::OrderStatus::*;

        let allowed = [
            (Created, Assigned),
            (Created, Cancelled),
            (Assigned, PickedUp),
            (Assigned, Cancelled),
            (PickedUp, InTransit),
            (PickedUp, Cancelled),
            (InTransit, Delivered),
            (InTransit, Cancelled),
        ];

        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                assert_eq!(
                    can_transition(from, to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }

        assert!(!can_transition(PickedUp, Assigned));
        assert!(!can_transition(InTransit, PickedUp));
        assert!(!can_transition(InTransit, Assigned));
    }

    #[test]
    fn terminal_states_allow_nothing_and_nothing_loops() {
        for status in OrderStatus::ALL {
            assert!(!can_transition(status, status));
            assert_eq!(allowed_transitions(status).is_empty(), status.is_terminal());
        }
    }

    #[test]
    fn every_live_state_can_be_cancelled() {
        for status in OrderStatus::ALL.into_iter().filter(|s| !s.is_terminal()) {
            assert!(can_transition(status, OrderStatus::Cancelled));
        }
    }

    fn order(customer_id: Uuid, courier: Option<Uuid>) -> Order {
        Order {
            id: Uuid::new_v4(),
            customer_id,
            assigned_courier: courier,
            pickup_address: "Depot".to_string(),
            delivery_address: "Quay".to_string(),
            distance_km: Decimal::ONE,
            price: Decimal::new(7000, 2),
            status: OrderStatus::Assigned,
            created_at: Utc::now(),
            assigned_at: Some(Utc::now()),
            picked_up_at: None,
            in_transit_at: None,
            delivered_at: None,
            version: 1,
        }
    }

    #[test]
    fn only_the_assigned_courier_moves_an_order() {
        let courier = Actor {
            id: Uuid::new_v4(),
            role: Role::Courier,
        };
        let stranger = Actor {
            id: Uuid::new_v4(),
            role: Role::Courier,
        };
        let order = order(Uuid::new_v4(), Some(courier.id));

        assert!(authorize_transition(&order, OrderStatus::PickedUp, &courier).is_ok());
        assert!(matches!(
            authorize_transition(&order, OrderStatus::PickedUp, &stranger),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn customers_may_only_cancel_their_own_orders() {
        let owner = Actor {
            id: Uuid::new_v4(),
            role: Role::Customer,
        };
        let other = Actor {
            id: Uuid::new_v4(),
            role: Role::Customer,
        };
        let order = order(owner.id, Some(Uuid::new_v4()));

        assert!(authorize_transition(&order, OrderStatus::Cancelled, &owner).is_ok());
        assert!(authorize_transition(&order, OrderStatus::PickedUp, &owner).is_err());
        assert!(authorize_transition(&order, OrderStatus::Cancelled, &other).is_err());
    }
}
