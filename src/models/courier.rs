use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    Courier,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    /// Monotonic registration number, used by the registration-order tie-break.
    pub registered_seq: u64,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn actor(&self) -> Actor {
        Actor {
            id: self.id,
            role: self.role,
        }
    }
}

/// The authenticated caller of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourierStatus {
    pub courier_id: Uuid,
    pub is_available: bool,
    pub current_orders_count: u32,
    pub last_activity: DateTime<Utc>,
    pub location_description: String,
    /// Store version this copy was read at; 0 means not yet persisted.
    pub version: u64,
}

impl CourierStatus {
    pub fn new(courier_id: Uuid) -> Self {
        Self {
            courier_id,
            is_available: true,
            current_orders_count: 0,
            last_activity: Utc::now(),
            location_description: String::new(),
            version: 0,
        }
    }

    pub fn take_order(&mut self) {
        self.current_orders_count = self.current_orders_count.saturating_add(1);
        self.last_activity = Utc::now();
    }

    pub fn release_order(&mut self) {
        self.current_orders_count = self.current_orders_count.saturating_sub(1);
        self.last_activity = Utc::now();
    }
}
