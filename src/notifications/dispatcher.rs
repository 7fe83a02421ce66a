use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::courier::Role;
use crate::models::event::{OrderEvent, OrderEventKind};
use crate::models::order::{Order, OrderStatus};
use crate::state::AppState;

/// Turns order events into inbox entries until the event channel closes.
pub async fn run_notification_dispatcher(
    state: Arc<AppState>,
    events_rx: broadcast::Receiver<OrderEvent>,
) {
    info!("notification dispatcher started");

    let mut events = BroadcastStream::new(events_rx);
    while let Some(next) = events.next().await {
        match next {
            Ok(event) => deliver(&state, &event),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(skipped, "notification dispatcher lagged; events dropped");
            }
        }
    }

    warn!("notification dispatcher stopped: event channel closed");
}

pub fn deliver(state: &AppState, event: &OrderEvent) {
    let order = match state.store.order(event.order_id) {
        Ok(order) => order,
        Err(err) => {
            error!(order_id = %event.order_id, error = %err, "cannot notify about unknown order");
            return;
        }
    };

    match event.kind {
        OrderEventKind::Created => created(state, &order),
        OrderEventKind::Assigned | OrderEventKind::Reassigned => assigned(state, event, &order),
        OrderEventKind::StatusChanged => status_changed(state, event, &order),
    }

    debug!(order_id = %order.id, kind = ?event.kind, "notifications delivered");
}

fn created(state: &AppState, order: &Order) {
    state.notifications.push(
        order.customer_id,
        format!("Order #{} Created Successfully", order.id),
        format!(
            "Your order from {} to {} has been created. We'll notify you when a courier is assigned.",
            order.pickup_address, order.delivery_address
        ),
        Some(order.id),
    );

    notify_admins(
        state,
        format!("New Order #{} Created", order.id),
        format!(
            "A new order has been created from {} to {}. Distance: {}km, Price: ${}",
            order.pickup_address, order.delivery_address, order.distance_km, order.price
        ),
        order.id,
    );
}

fn assigned(state: &AppState, event: &OrderEvent, order: &Order) {
    let Some(courier_id) = event.courier_id else {
        warn!(order_id = %order.id, "assignment event without a courier");
        return;
    };

    state.notifications.push(
        courier_id,
        format!("New Order Assignment #{}", order.id),
        format!(
            "You have been assigned to deliver order #{} from {} to {}. Distance: {}km, Price: ${}",
            order.id, order.pickup_address, order.delivery_address, order.distance_km, order.price
        ),
        Some(order.id),
    );

    state.notifications.push(
        order.customer_id,
        format!("Courier Assigned to Order #{}", order.id),
        format!(
            "A courier has been assigned to your order #{}. Pickup from {} will begin soon.",
            order.id, order.pickup_address
        ),
        Some(order.id),
    );

    if let Some(previous) = event.previous_courier_id {
        state.notifications.push(
            previous,
            format!("Order #{} Reassigned", order.id),
            format!(
                "Order #{} has been reassigned to another courier.",
                order.id
            ),
            Some(order.id),
        );
    }

    let courier_name = state
        .store
        .user(courier_id)
        .map(|courier| courier.username)
        .unwrap_or_else(|_| courier_id.to_string());
    notify_admins(
        state,
        format!("Order #{} Assigned", order.id),
        format!(
            "Order #{} has been assigned to courier {courier_name}",
            order.id
        ),
        order.id,
    );
}

fn status_changed(state: &AppState, event: &OrderEvent, order: &Order) {
    state.notifications.push(
        order.customer_id,
        format!("Order #{} Status Update", order.id),
        status_message(order, event.new_status),
        Some(order.id),
    );

    let Some(courier_id) = event.courier_id else {
        return;
    };

    match event.new_status {
        OrderStatus::Delivered => state.notifications.push(
            courier_id,
            format!("Order #{} Completed", order.id),
            format!(
                "You have successfully completed the delivery of order #{}. Great job!",
                order.id
            ),
            Some(order.id),
        ),
        OrderStatus::Cancelled => state.notifications.push(
            courier_id,
            format!("Order #{} Cancelled", order.id),
            format!(
                "Order #{} that was assigned to you has been cancelled.",
                order.id
            ),
            Some(order.id),
        ),
        _ => {}
    }
}

fn status_message(order: &Order, status: OrderStatus) -> String {
    match status {
        OrderStatus::Created => format!(
            "Your order #{} has been created and is waiting for courier assignment.",
            order.id
        ),
        OrderStatus::Assigned => format!(
            "A courier has been assigned to your order #{}. Pickup from {} will begin soon.",
            order.id, order.pickup_address
        ),
        OrderStatus::PickedUp => format!(
            "Your order #{} has been picked up from {} and is on the way to {}.",
            order.id, order.pickup_address, order.delivery_address
        ),
        OrderStatus::InTransit => format!(
            "Your order #{} is in transit to {}. Estimated delivery soon!",
            order.id, order.delivery_address
        ),
        OrderStatus::Delivered => format!(
            "Your order #{} has been successfully delivered to {}. Thank you!",
            order.id, order.delivery_address
        ),
        OrderStatus::Cancelled => format!(
            "Your order #{} has been cancelled. If you have any questions, please contact support.",
            order.id
        ),
    }
}

fn notify_admins(state: &AppState, title: String, message: String, order_id: Uuid) {
    for admin in state
        .store
        .users()
        .into_iter()
        .filter(|user| user.role == Role::Admin)
    {
        state
            .notifications
            .push(admin.id, title.clone(), message.clone(), Some(order_id));
    }
}
