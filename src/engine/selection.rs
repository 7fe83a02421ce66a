use std::cmp::Ordering;

use serde::Serialize;

use crate::models::courier::{CourierStatus, Role, User};
use crate::store::Store;

/// How couriers sharing the minimum workload are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TieBreak {
    /// Earliest registered courier first.
    RegistrationOrder,
    /// Smallest courier id first.
    LowestId,
}

impl std::str::FromStr for TieBreak {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registration" => Ok(Self::RegistrationOrder),
            "lowest_id" => Ok(Self::LowestId),
            other => Err(format!(
                "unknown tie-break: {other}, expected registration/lowest_id"
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub courier: User,
    pub status: CourierStatus,
}

pub fn is_eligible(courier: &User, status: &CourierStatus) -> bool {
    courier.role == Role::Courier && status.is_available
}

/// Every courier that could take an order right now.
///
/// Couriers without a status row count as available with no workload, so a
/// courier is eligible from registration onward. Restricting this to stored
/// status rows would leave new couriers out until they first report
/// availability.
pub fn eligible_candidates(store: &Store) -> Vec<Candidate> {
    store
        .users()
        .into_iter()
        .filter(|user| user.role == Role::Courier)
        .filter_map(|courier| {
            let status = store.courier_status_or_default(courier.id);
            if is_eligible(&courier, &status) {
                Some(Candidate { courier, status })
            } else {
                None
            }
        })
        .collect()
}

pub fn compare(a: &Candidate, b: &Candidate, tie_break: TieBreak) -> Ordering {
    a.status
        .current_orders_count
        .cmp(&b.status.current_orders_count)
        .then_with(|| match tie_break {
            TieBreak::RegistrationOrder => a.courier.registered_seq.cmp(&b.courier.registered_seq),
            TieBreak::LowestId => a.courier.id.cmp(&b.courier.id),
        })
}

pub fn rank(candidates: &mut [Candidate], tie_break: TieBreak) {
    candidates.sort_by(|a, b| compare(a, b, tie_break));
}

pub fn pick_least_loaded(candidates: Vec<Candidate>, tie_break: TieBreak) -> Option<Candidate> {
    candidates
        .into_iter()
        .min_by(|a, b| compare(a, b, tie_break))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{is_eligible, pick_least_loaded, Candidate, TieBreak};
    use crate::models::courier::{CourierStatus, Role, User};

    fn candidate(seq: u64, id_seed: u128, workload: u32, available: bool) -> Candidate {
        let id = Uuid::from_u128(id_seed);
        let mut status = CourierStatus::new(id);
        status.current_orders_count = workload;
        status.is_available = available;

        Candidate {
            courier: User {
                id,
                username: format!("courier-{seq}"),
                role: Role::Courier,
                registered_seq: seq,
                created_at: Utc::now(),
            },
            status,
        }
    }

    #[test]
    fn least_loaded_courier_wins() {
        let candidates = vec![
            candidate(1, 10, 3, true),
            candidate(2, 20, 1, true),
            candidate(3, 30, 1, true),
            candidate(4, 40, 5, true),
        ];

        let picked = pick_least_loaded(candidates, TieBreak::RegistrationOrder).unwrap();
        assert_eq!(picked.status.current_orders_count, 1);
    }

    #[test]
    fn registration_order_breaks_ties() {
        let candidates = vec![candidate(7, 1, 2, true), candidate(3, 2, 2, true)];

        let picked = pick_least_loaded(candidates, TieBreak::RegistrationOrder).unwrap();
        assert_eq!(picked.courier.registered_seq, 3);
    }

    #[test]
    fn lowest_id_breaks_ties() {
        let candidates = vec![candidate(1, 99, 0, true), candidate(2, 5, 0, true)];

        let picked = pick_least_loaded(candidates, TieBreak::LowestId).unwrap();
        assert_eq!(picked.courier.id, Uuid::from_u128(5));
    }

    #[test]
    fn unavailable_or_non_courier_users_are_not_eligible() {
        let offline = candidate(1, 1, 0, false);
        assert!(!is_eligible(&offline.courier, &offline.status));

        let mut admin = candidate(2, 2, 0, true);
        admin.courier.role = Role::Admin;
        assert!(!is_eligible(&admin.courier, &admin.status));
    }

    #[test]
    fn no_candidates_picks_nothing() {
        assert!(pick_least_loaded(Vec::new(), TieBreak::LowestId).is_none());
    }
}
