use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::engine::retry::with_retry;
use crate::engine::selection::{eligible_candidates, rank, Candidate};
use crate::error::AppError;
use crate::models::courier::{Actor, CourierStatus, Role, User};
use crate::models::order::{Order, OrderStatus};
use crate::state::AppState;

pub fn register_user(state: &AppState, username: &str, role: Role) -> Result<User, AppError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(AppError::Validation("username cannot be empty".to_string()));
    }

    let user = state.store.insert_user(username.to_string(), role);
    info!(user_id = %user.id, role = ?user.role, "user registered");
    Ok(user)
}

pub struct AvailabilityUpdate {
    pub is_available: Option<bool>,
    pub location_description: Option<String>,
}

/// A courier going on or off shift, or reporting where they are.
pub async fn update_availability(
    state: &AppState,
    courier: &Actor,
    update: AvailabilityUpdate,
) -> Result<CourierStatus, AppError> {
    if courier.role != Role::Courier {
        return Err(AppError::Forbidden(
            "only couriers can update availability".to_string(),
        ));
    }

    let status = with_retry(state, "update_availability", || {
        let mut status = state.store.courier_status_or_default(courier.id);
        if let Some(is_available) = update.is_available {
            status.is_available = is_available;
        }
        if let Some(location) = &update.location_description {
            status.location_description = location.trim().to_string();
        }
        status.last_activity = Utc::now();

        let mut tx = state.store.begin();
        tx.put_courier(status);
        let committed = state.store.commit(tx)?;
        committed
            .couriers
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Internal("courier status missing from commit".to_string()))
    })
    .await?;

    info!(
        courier_id = %courier.id,
        is_available = status.is_available,
        "courier availability updated"
    );
    Ok(status)
}

#[derive(Debug, Clone, Serialize)]
pub struct CourierProfile {
    pub courier: User,
    pub status: CourierStatus,
    pub delivered_orders: usize,
    pub active_orders: Vec<Order>,
}

pub fn courier_profile(state: &AppState, courier: &Actor) -> Result<CourierProfile, AppError> {
    if courier.role != Role::Courier {
        return Err(AppError::Forbidden(
            "only couriers have a courier profile".to_string(),
        ));
    }

    let user = state.store.user(courier.id)?;
    let (delivered, active): (Vec<Order>, Vec<Order>) = state
        .store
        .orders()
        .into_iter()
        .filter(|order| order.is_assigned_to(courier.id))
        .filter(|order| order.status == OrderStatus::Delivered || order.status.is_active())
        .partition(|order| order.status == OrderStatus::Delivered);

    Ok(CourierProfile {
        courier: user,
        status: state.store.courier_status_or_default(courier.id),
        delivered_orders: delivered.len(),
        active_orders: active,
    })
}

/// Couriers who can take work, in the order auto-assignment would pick them.
pub fn available_couriers(state: &AppState, actor: &Actor) -> Result<Vec<Candidate>, AppError> {
    if !actor.is_admin() {
        return Err(AppError::Forbidden(
            "only admins can list available couriers".to_string(),
        ));
    }

    let mut candidates = eligible_candidates(&state.store);
    rank(&mut candidates, state.policy.tie_break);
    Ok(candidates)
}

pub fn courier(state: &AppState, courier_id: Uuid) -> Result<(User, CourierStatus), AppError> {
    let user = state.store.user(courier_id)?;
    if user.role != Role::Courier {
        return Err(AppError::NotFound(format!("courier {courier_id} not found")));
    }
    let status = state.store.courier_status_or_default(courier_id);
    Ok((user, status))
}
