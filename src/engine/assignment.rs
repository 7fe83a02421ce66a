use std::collections::HashMap;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::retry::with_retry;
use crate::engine::selection::{eligible_candidates, is_eligible, pick_least_loaded};
use crate::engine::{observe_latency, record_workloads};
use crate::error::AppError;
use crate::models::courier::{Actor, CourierStatus, Role};
use crate::models::event::{OrderEvent, OrderEventKind};
use crate::models::order::{Order, OrderStatus};
use crate::state::AppState;

/// What a committed assignment changed.
struct Assigned {
    order: Order,
    old_status: OrderStatus,
    previous_courier: Option<Uuid>,
}

/// Gives a freshly created order to the least-loaded available courier.
///
/// Finding nobody is a normal outcome: the order is returned still CREATED.
pub async fn auto_assign(state: &AppState, order_id: Uuid) -> Result<Order, AppError> {
    let start = Instant::now();
    let outcome = with_retry(state, "auto_assign", || auto_assign_once(state, order_id)).await;
    observe_latency(state, "auto_assign", start);

    match outcome {
        Ok(Some(assigned)) => Ok(finish(state, assigned)),
        Ok(None) => {
            state
                .metrics
                .assignments_total
                .with_label_values(&["unassigned"])
                .inc();
            warn!(order_id = %order_id, "no eligible couriers; order left unassigned");
            state.store.order(order_id)
        }
        Err(err) => Err(rejected(state, err)),
    }
}

fn auto_assign_once(state: &AppState, order_id: Uuid) -> Result<Option<Assigned>, AppError> {
    let order = state.store.order(order_id)?;
    if order.status != OrderStatus::Created {
        return Err(AppError::InvalidOperation(format!(
            "order {order_id} is {} and cannot be auto-assigned",
            order.status
        )));
    }

    let Some(winner) = pick_least_loaded(eligible_candidates(&state.store), state.policy.tie_break)
    else {
        return Ok(None);
    };

    commit_assignment(state, order, winner.status).map(Some)
}

/// Admin assignment of an order that has not been picked up yet.
pub async fn manual_assign(
    state: &AppState,
    order_id: Uuid,
    courier_id: Uuid,
    actor: &Actor,
) -> Result<Order, AppError> {
    require_admin(actor, "assign couriers")?;

    let start = Instant::now();
    let outcome = with_retry(state, "manual_assign", || {
        let order = state.store.order(order_id)?;
        if !matches!(order.status, OrderStatus::Created | OrderStatus::Assigned) {
            return Err(AppError::InvalidOperation(format!(
                "can only assign couriers to CREATED or ASSIGNED orders, order {order_id} is {}",
                order.status
            )));
        }

        let status = eligible_status(state, courier_id)?;
        if order.is_assigned_to(courier_id) {
            return Err(AppError::AlreadyAssigned(courier_id));
        }

        commit_assignment(state, order, status)
    })
    .await;
    observe_latency(state, "manual_assign", start);

    outcome
        .map(|assigned| finish(state, assigned))
        .map_err(|err| rejected(state, err))
}

/// A courier claiming an order nobody has been given yet.
pub async fn accept_order(
    state: &AppState,
    order_id: Uuid,
    courier: &Actor,
) -> Result<Order, AppError> {
    if courier.role != Role::Courier {
        return Err(AppError::Forbidden(format!(
            "user {} is not a courier and cannot accept orders",
            courier.id
        )));
    }

    let start = Instant::now();
    let outcome = with_retry(state, "accept_order", || {
        let order = state.store.order(order_id)?;
        if order.status != OrderStatus::Created {
            return Err(AppError::InvalidOperation(format!(
                "order {order_id} is {} and not available for acceptance",
                order.status
            )));
        }

        let status = eligible_status(state, courier.id)?;
        commit_assignment(state, order, status)
    })
    .await;
    observe_latency(state, "accept_order", start);

    outcome
        .map(|assigned| finish(state, assigned))
        .map_err(|err| rejected(state, err))
}

/// Admin transfer of an in-progress order. A picked-up order goes back to
/// ASSIGNED so the new courier collects it again.
pub async fn reassign(
    state: &AppState,
    order_id: Uuid,
    new_courier_id: Uuid,
    actor: &Actor,
) -> Result<Order, AppError> {
    require_admin(actor, "reassign orders")?;

    let start = Instant::now();
    let outcome = with_retry(state, "reassign", || {
        let mut order = state.store.order(order_id)?;
        let current = match (order.status, order.assigned_courier) {
            (OrderStatus::Assigned | OrderStatus::PickedUp, Some(current)) => current,
            (OrderStatus::Assigned | OrderStatus::PickedUp, None) => {
                return Err(AppError::InvalidOperation(format!(
                    "order {order_id} is not assigned to any courier"
                )));
            }
            (status, _) => {
                return Err(AppError::InvalidOperation(format!(
                    "can only reassign ASSIGNED or PICKED_UP orders, order {order_id} is {status}"
                )));
            }
        };

        if current == new_courier_id {
            return Err(AppError::AlreadyAssigned(new_courier_id));
        }

        let status = eligible_status(state, new_courier_id)?;
        order.picked_up_at = None;
        commit_assignment(state, order, status)
    })
    .await;
    observe_latency(state, "reassign", start);

    outcome
        .map(|assigned| finish(state, assigned))
        .map_err(|err| rejected(state, err))
}

/// Stages the order, the new courier's increment and the previous courier's
/// decrement (if any) and commits them together.
fn commit_assignment(
    state: &AppState,
    mut order: Order,
    mut courier: CourierStatus,
) -> Result<Assigned, AppError> {
    let order_id = order.id;
    let old_status = order.status;
    let previous_courier = order
        .assigned_courier
        .filter(|previous| *previous != courier.courier_id);

    let mut tx = state.store.begin();

    if let Some(previous) = previous_courier {
        let mut released = state.store.courier_status_or_default(previous);
        released.release_order();
        tx.put_courier(released);
    }

    let now = order.next_timestamp();
    order.assigned_courier = Some(courier.courier_id);
    order.stamp(OrderStatus::Assigned, now);
    courier.take_order();

    tx.put_courier(courier);
    tx.put_order(order);

    let committed = state.store.commit(tx)?;
    record_workloads(state, &committed.couriers);

    Ok(Assigned {
        order: committed.order(order_id)?,
        old_status,
        previous_courier,
    })
}

fn finish(state: &AppState, assigned: Assigned) -> Order {
    let Assigned {
        order,
        old_status,
        previous_courier,
    } = assigned;

    let (kind, outcome) = match previous_courier {
        Some(_) => (OrderEventKind::Reassigned, "reassigned"),
        None => (OrderEventKind::Assigned, "assigned"),
    };

    state
        .metrics
        .assignments_total
        .with_label_values(&[outcome])
        .inc();
    if old_status == OrderStatus::Created {
        state.metrics.orders_awaiting_courier.dec();
    }

    info!(
        order_id = %order.id,
        courier_id = ?order.assigned_courier,
        previous_courier_id = ?previous_courier,
        from = %old_status,
        "order {outcome}"
    );

    state.publish(
        OrderEvent::new(kind, Some(old_status), &order).with_previous_courier(previous_courier),
    );

    order
}

fn rejected(state: &AppState, err: AppError) -> AppError {
    let outcome = match err {
        AppError::Contention { .. } | AppError::Internal(_) => "error",
        _ => "rejected",
    };
    state
        .metrics
        .assignments_total
        .with_label_values(&[outcome])
        .inc();
    err
}

fn require_admin(actor: &Actor, what: &str) -> Result<(), AppError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "only admins may {what}, user {} is {:?}",
            actor.id, actor.role
        )))
    }
}

/// Looks up the courier and their status row (a default one if it does not
/// exist yet) and checks they can take an order.
fn eligible_status(state: &AppState, courier_id: Uuid) -> Result<CourierStatus, AppError> {
    let courier = state.store.user(courier_id)?;
    let status = state.store.courier_status_or_default(courier_id);

    if is_eligible(&courier, &status) {
        Ok(status)
    } else {
        Err(AppError::CourierUnavailable(courier_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkloadDrift {
    pub courier_id: Uuid,
    pub recorded: u32,
    pub actual: u32,
}

/// Recounts every courier's active orders and reports counters that disagree.
pub fn audit_workloads(state: &AppState) -> Vec<WorkloadDrift> {
    let snapshot = state.store.snapshot();

    let mut actual: HashMap<Uuid, u32> = HashMap::new();
    for order in snapshot.orders.iter().filter(|order| order.status.is_active()) {
        if let Some(courier_id) = order.assigned_courier {
            *actual.entry(courier_id).or_default() += 1;
        }
    }

    let mut recorded: HashMap<Uuid, u32> = snapshot
        .couriers
        .iter()
        .map(|status| (status.courier_id, status.current_orders_count))
        .collect();
    for courier_id in actual.keys() {
        recorded.entry(*courier_id).or_default();
    }

    let mut drift: Vec<WorkloadDrift> = recorded
        .into_iter()
        .filter_map(|(courier_id, recorded)| {
            let actual = actual.get(&courier_id).copied().unwrap_or(0);
            (recorded != actual).then_some(WorkloadDrift {
                courier_id,
                recorded,
                actual,
            })
        })
        .collect();
    drift.sort_by_key(|entry| entry.courier_id);

    for entry in &drift {
        warn!(
            courier_id = %entry.courier_id,
            recorded = entry.recorded,
            actual = entry.actual,
            "courier workload counter drifted"
        );
    }

    drift
}
