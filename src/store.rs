use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::courier::{CourierStatus, Role, User};
use crate::models::order::Order;

/// Record store shared by every operation.
///
/// Reads are lock-free clones out of the maps. Writes go through a
/// [`Transaction`]: each staged record carries the version it was read at and
/// [`Store::commit`] applies all of them or none, rejecting the whole batch
/// with [`AppError::Conflict`] if any record moved in between.
pub struct Store {
    users: DashMap<Uuid, User>,
    orders: DashMap<Uuid, Order>,
    couriers: DashMap<Uuid, CourierStatus>,
    commit_lock: Mutex<()>,
    next_seq: AtomicU64,
}

/// Point-in-time copy of every record, taken under the commit lock.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub users: Vec<User>,
    pub orders: Vec<Order>,
    pub couriers: Vec<CourierStatus>,
}

#[derive(Debug, Default)]
pub struct Transaction {
    orders: Vec<Order>,
    couriers: Vec<CourierStatus>,
}

/// Records as written, carrying their new versions.
#[derive(Debug)]
pub struct Committed {
    pub orders: Vec<Order>,
    pub couriers: Vec<CourierStatus>,
}

impl Committed {
    pub fn order(&self, id: Uuid) -> Result<Order, AppError> {
        self.orders
            .iter()
            .find(|order| order.id == id)
            .cloned()
            .ok_or_else(|| AppError::Internal(format!("order {id} missing from commit")))
    }
}

impl Transaction {
    pub fn put_order(&mut self, order: Order) {
        self.orders.retain(|staged| staged.id != order.id);
        self.orders.push(order);
    }

    pub fn put_courier(&mut self, status: CourierStatus) {
        self.couriers
            .retain(|staged| staged.courier_id != status.courier_id);
        self.couriers.push(status);
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            orders: DashMap::new(),
            couriers: DashMap::new(),
            commit_lock: Mutex::new(()),
            next_seq: AtomicU64::new(1),
        }
    }

    pub fn insert_user(&self, username: String, role: Role) -> User {
        let user = User {
            id: Uuid::new_v4(),
            username,
            role,
            registered_seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            created_at: Utc::now(),
        };
        self.users.insert(user.id, user.clone());
        user
    }

    pub fn user(&self, id: Uuid) -> Result<User, AppError> {
        self.users
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))
    }

    pub fn users(&self) -> Vec<User> {
        self.users.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn order(&self, id: Uuid) -> Result<Order, AppError> {
        self.orders
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))
    }

    pub fn orders(&self) -> Vec<Order> {
        self.orders.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn courier_status(&self, courier_id: Uuid) -> Option<CourierStatus> {
        self.couriers
            .get(&courier_id)
            .map(|entry| entry.value().clone())
    }

    /// The stored status, or an unsaved default one (available, no workload).
    pub fn courier_status_or_default(&self, courier_id: Uuid) -> CourierStatus {
        self.courier_status(courier_id)
            .unwrap_or_else(|| CourierStatus::new(courier_id))
    }

    pub fn begin(&self) -> Transaction {
        Transaction::default()
    }

    pub fn commit(&self, tx: Transaction) -> Result<Committed, AppError> {
        let _guard = self.commit_lock.lock();

        for order in &tx.orders {
            let current = self.orders.get(&order.id).map(|entry| entry.version).unwrap_or(0);
            if current != order.version {
                return Err(AppError::Conflict(format!(
                    "order {} changed (read v{}, now v{})",
                    order.id, order.version, current
                )));
            }
        }

        for status in &tx.couriers {
            let current = self
                .couriers
                .get(&status.courier_id)
                .map(|entry| entry.version)
                .unwrap_or(0);
            if current != status.version {
                return Err(AppError::Conflict(format!(
                    "courier status {} changed (read v{}, now v{})",
                    status.courier_id, status.version, current
                )));
            }
        }

        let orders = tx
            .orders
            .into_iter()
            .map(|mut order| {
                order.version += 1;
                self.orders.insert(order.id, order.clone());
                order
            })
            .collect();

        let couriers = tx
            .couriers
            .into_iter()
            .map(|mut status| {
                status.version += 1;
                self.couriers.insert(status.courier_id, status.clone());
                status
            })
            .collect();

        Ok(Committed { orders, couriers })
    }

    pub fn snapshot(&self) -> Snapshot {
        let _guard = self.commit_lock.lock();
        Snapshot {
            users: self.users(),
            orders: self.orders(),
            couriers: self
                .couriers
                .iter()
                .map(|entry| entry.value().clone())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::Store;
    use crate::error::AppError;
    use crate::models::courier::{CourierStatus, Role};
    use crate::models::order::{Order, OrderStatus};

    fn new_order(customer_id: Uuid) -> Order {
        Order {
            id: Uuid::new_v4(),
            customer_id,
            assigned_courier: None,
            pickup_address: "Depot".to_string(),
            delivery_address: "Square".to_string(),
            distance_km: Decimal::ONE,
            price: Decimal::new(7000, 2),
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
    fn commit_bumps_versions() {
        let store = Store::new();
        let order = new_order(Uuid::new_v4());

        let mut tx = store.begin();
        tx.put_order(order.clone());
        let committed = store.commit(tx).unwrap();

        assert_eq!(committed.order(order.id).unwrap().version, 1);
        assert_eq!(store.order(order.id).unwrap().version, 1);
    }

    #[test]
    fn stale_read_rejects_the_whole_transaction() {
        let store = Store::new();
        let courier = store.insert_user("rider".to_string(), Role::Courier);
        let order = new_order(Uuid::new_v4());

        let mut tx = store.begin();
        tx.put_order(order.clone());
        tx.put_courier(CourierStatus::new(courier.id));
        store.commit(tx).unwrap();

        let stale_order = store.order(order.id).unwrap();
        let stale_status = store.courier_status(courier.id).unwrap();

        let mut concurrent = stale_status.clone();
        concurrent.take_order();
        let mut tx = store.begin();
        tx.put_courier(concurrent);
        store.commit(tx).unwrap();

        let mut moved = stale_order.clone();
        moved.status = OrderStatus::Assigned;
        let mut late = stale_status;
        late.take_order();
        let mut tx = store.begin();
        tx.put_order(moved);
        tx.put_courier(late);

        let err = store.commit(tx).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store.order(order.id).unwrap().status, OrderStatus::Created);
        assert_eq!(
            store.courier_status(courier.id).unwrap().current_orders_count,
            1
        );
    }

    #[test]
    fn inserting_an_existing_record_conflicts() {
        let store = Store::new();
        let courier_id = Uuid::new_v4();

        let mut tx = store.begin();
        tx.put_courier(CourierStatus::new(courier_id));
        store.commit(tx).unwrap();

        let mut tx = store.begin();
        tx.put_courier(CourierStatus::new(courier_id));
        assert!(store.commit(tx).unwrap_err().is_retryable());
    }

    #[test]
    fn registration_sequence_is_monotonic() {
        let store = Store::new();
        let first = store.insert_user("a".to_string(), Role::Courier);
        let second = store.insert_user("b".to_string(), Role::Courier);

        assert!(first.registered_seq < second.registered_seq);
    }
}
