//! Read models for admins. Everything here works on one store snapshot, so a
//! single report never mixes records from before and after a commit.

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::courier::Role;
use crate::models::order::{Order, OrderStatus};
use crate::state::AppState;
use crate::store::Snapshot;

#[derive(Debug, Clone, Serialize)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub delivered_orders: usize,
    pub revenue: Decimal,
    pub avg_distance_km: Decimal,
    pub avg_price: Decimal,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OrderCounts {
    pub total: usize,
    pub created: usize,
    pub assigned: usize,
    pub picked_up: usize,
    pub in_transit: usize,
    pub delivered: usize,
    pub cancelled: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub orders: OrderCounts,
    pub revenue_total: Decimal,
    pub revenue_last_7_days: Decimal,
    pub revenue_last_30_days: Decimal,
    pub customers: usize,
    pub couriers: usize,
    pub admins: usize,
    pub available_couriers: usize,
    pub avg_delivery_minutes: Option<f64>,
    /// Share of couriers currently carrying at least one order.
    pub courier_utilization_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourierPerformance {
    pub courier_id: Uuid,
    pub username: String,
    pub delivered_orders: usize,
    pub revenue: Decimal,
    pub avg_distance_km: Decimal,
    pub avg_delivery_minutes: Option<f64>,
    pub is_available: bool,
    pub current_orders_count: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchStatistics {
    pub total_couriers: usize,
    pub available_couriers: usize,
    pub busy_couriers: usize,
    pub avg_workload: f64,
    pub awaiting_assignment: usize,
    pub in_progress: usize,
    pub delivered: usize,
    pub cancelled: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Revenue,
    Performance,
    Summary,
}

impl std::str::FromStr for ReportKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "revenue" => Ok(Self::Revenue),
            "performance" => Ok(Self::Performance),
            "summary" => Ok(Self::Summary),
            other => Err(AppError::Validation(format!(
                "unknown report type: {other}, expected revenue/performance/summary"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "report_type", rename_all = "snake_case")]
pub enum Report {
    Revenue {
        start: NaiveDate,
        end: NaiveDate,
        total_revenue: Decimal,
        daily: Vec<DailyStats>,
    },
    Performance {
        start: NaiveDate,
        end: NaiveDate,
        couriers: Vec<CourierPerformance>,
    },
    Summary {
        start: NaiveDate,
        end: NaiveDate,
        orders: OrderCounts,
        total_revenue: Decimal,
        avg_delivery_minutes: Option<f64>,
    },
}

/// Revenue from orders delivered between `start` and `end`, both inclusive.
pub fn total_revenue(state: &AppState, start: NaiveDate, end: NaiveDate) -> Decimal {
    revenue_between(&state.store.snapshot(), start, end)
}

pub fn daily_stats(state: &AppState, date: NaiveDate) -> DailyStats {
    stats_for(&state.store.snapshot(), date)
}

/// One [`DailyStats`] per day from `today - days` through `today`.
pub fn revenue_trends(state: &AppState, today: NaiveDate, days: u32) -> Vec<DailyStats> {
    let snapshot = state.store.snapshot();
    (0..=i64::from(days))
        .rev()
        .map(|back| stats_for(&snapshot, today - Duration::days(back)))
        .collect()
}

pub fn dashboard(state: &AppState, today: NaiveDate) -> Dashboard {
    let snapshot = state.store.snapshot();
    let delivered: Vec<&Order> = delivered_orders(&snapshot).collect();
    let couriers: Vec<_> = snapshot
        .users
        .iter()
        .filter(|user| user.role == Role::Courier)
        .map(|courier| courier_status(&snapshot, courier.id))
        .collect();

    let busy = couriers
        .iter()
        .filter(|(_, workload)| *workload > 0)
        .count();

    Dashboard {
        orders: count_orders(snapshot.orders.iter()),
        revenue_total: delivered.iter().map(|order| order.price).sum(),
        revenue_last_7_days: revenue_between(&snapshot, today - Duration::days(7), today),
        revenue_last_30_days: revenue_between(&snapshot, today - Duration::days(30), today),
        customers: count_role(&snapshot, Role::Customer),
        couriers: couriers.len(),
        admins: count_role(&snapshot, Role::Admin),
        available_couriers: couriers.iter().filter(|(available, _)| *available).count(),
        avg_delivery_minutes: avg_delivery_minutes(delivered.iter().copied()),
        courier_utilization_percent: percent(busy, couriers.len()),
    }
}

pub fn courier_performance(state: &AppState) -> Vec<CourierPerformance> {
    performance(&state.store.snapshot(), |_| true)
}

pub fn dispatch_statistics(state: &AppState) -> DispatchStatistics {
    let snapshot = state.store.snapshot();
    let statuses: Vec<(bool, u32)> = snapshot
        .users
        .iter()
        .filter(|user| user.role == Role::Courier)
        .map(|courier| courier_status(&snapshot, courier.id))
        .collect();

    let total_workload: u64 = statuses.iter().map(|(_, workload)| u64::from(*workload)).sum();
    let avg_workload = if statuses.is_empty() {
        0.0
    } else {
        round_2(total_workload as f64 / statuses.len() as f64)
    };
    let counts = count_orders(snapshot.orders.iter());

    DispatchStatistics {
        total_couriers: statuses.len(),
        available_couriers: statuses.iter().filter(|(available, _)| *available).count(),
        busy_couriers: statuses.iter().filter(|(_, workload)| *workload > 0).count(),
        avg_workload,
        awaiting_assignment: counts.created,
        in_progress: counts.assigned + counts.picked_up + counts.in_transit,
        delivered: counts.delivered,
        cancelled: counts.cancelled,
    }
}

pub fn generate_report(
    state: &AppState,
    kind: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Report, AppError> {
    let kind: ReportKind = kind.parse()?;
    if start > end {
        return Err(AppError::Validation(format!(
            "report start {start} is after end {end}"
        )));
    }

    let snapshot = state.store.snapshot();
    let report = match kind {
        ReportKind::Revenue => Report::Revenue {
            start,
            end,
            total_revenue: revenue_between(&snapshot, start, end),
            daily: start
                .iter_days()
                .take_while(|day| *day <= end)
                .map(|day| stats_for(&snapshot, day))
                .collect(),
        },
        ReportKind::Performance => Report::Performance {
            start,
            end,
            couriers: performance(&snapshot, |order| delivered_within(order, start, end)),
        },
        ReportKind::Summary => {
            let created_in_range = snapshot.orders.iter().filter(|order| {
                let day = order.created_at.date_naive();
                day >= start && day <= end
            });
            Report::Summary {
                start,
                end,
                orders: count_orders(created_in_range),
                total_revenue: revenue_between(&snapshot, start, end),
                avg_delivery_minutes: avg_delivery_minutes(
                    delivered_orders(&snapshot).filter(|order| delivered_within(order, start, end)),
                ),
            }
        }
    };

    Ok(report)
}

fn delivered_orders(snapshot: &Snapshot) -> impl Iterator<Item = &Order> {
    snapshot
        .orders
        .iter()
        .filter(|order| order.status == OrderStatus::Delivered)
}

fn delivered_within(order: &Order, start: NaiveDate, end: NaiveDate) -> bool {
    order
        .delivered_at
        .map(|at| at.date_naive())
        .is_some_and(|day| day >= start && day <= end)
}

fn revenue_between(snapshot: &Snapshot, start: NaiveDate, end: NaiveDate) -> Decimal {
    delivered_orders(snapshot)
        .filter(|order| delivered_within(order, start, end))
        .map(|order| order.price)
        .sum()
}

fn stats_for(snapshot: &Snapshot, date: NaiveDate) -> DailyStats {
    let delivered: Vec<&Order> = delivered_orders(snapshot)
        .filter(|order| delivered_within(order, date, date))
        .collect();
    let revenue: Decimal = delivered.iter().map(|order| order.price).sum();
    let distance: Decimal = delivered.iter().map(|order| order.distance_km).sum();

    DailyStats {
        date,
        delivered_orders: delivered.len(),
        revenue,
        avg_distance_km: average(distance, delivered.len()),
        avg_price: average(revenue, delivered.len()),
    }
}

fn performance(
    snapshot: &Snapshot,
    include: impl Fn(&Order) -> bool,
) -> Vec<CourierPerformance> {
    let mut rows: Vec<CourierPerformance> = snapshot
        .users
        .iter()
        .filter(|user| user.role == Role::Courier)
        .map(|courier| {
            let delivered: Vec<&Order> = delivered_orders(snapshot)
                .filter(|order| order.is_assigned_to(courier.id))
                .filter(|order| include(order))
                .collect();
            let revenue: Decimal = delivered.iter().map(|order| order.price).sum();
            let distance: Decimal = delivered.iter().map(|order| order.distance_km).sum();
            let (is_available, current_orders_count) = courier_status(snapshot, courier.id);

            CourierPerformance {
                courier_id: courier.id,
                username: courier.username.clone(),
                delivered_orders: delivered.len(),
                revenue,
                avg_distance_km: average(distance, delivered.len()),
                avg_delivery_minutes: avg_delivery_minutes(delivered.iter().copied()),
                is_available,
                current_orders_count,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.delivered_orders
            .cmp(&a.delivered_orders)
            .then_with(|| a.username.cmp(&b.username))
    });
    rows
}

/// Couriers without a status row are available with no workload.
fn courier_status(snapshot: &Snapshot, courier_id: Uuid) -> (bool, u32) {
    snapshot
        .couriers
        .iter()
        .find(|status| status.courier_id == courier_id)
        .map(|status| (status.is_available, status.current_orders_count))
        .unwrap_or((true, 0))
}

fn count_orders<'a>(orders: impl Iterator<Item = &'a Order>) -> OrderCounts {
    let mut counts = OrderCounts::default();
    for order in orders {
        counts.total += 1;
        match order.status {
            OrderStatus::Created => counts.created += 1,
            OrderStatus::Assigned => counts.assigned += 1,
            OrderStatus::PickedUp => counts.picked_up += 1,
            OrderStatus::InTransit => counts.in_transit += 1,
            OrderStatus::Delivered => counts.delivered += 1,
            OrderStatus::Cancelled => counts.cancelled += 1,
        }
    }
    counts
}

fn count_role(snapshot: &Snapshot, role: Role) -> usize {
    snapshot.users.iter().filter(|user| user.role == role).count()
}

fn avg_delivery_minutes<'a>(orders: impl Iterator<Item = &'a Order>) -> Option<f64> {
    let minutes: Vec<f64> = orders
        .filter_map(|order| {
            order
                .delivered_at
                .map(|at| (at - order.created_at).num_seconds() as f64 / 60.0)
        })
        .collect();

    if minutes.is_empty() {
        return None;
    }
    Some(round_1(minutes.iter().sum::<f64>() / minutes.len() as f64))
}

fn average(total: Decimal, count: usize) -> Decimal {
    if count == 0 {
        return Decimal::ZERO;
    }
    (total / Decimal::from(count)).round_dp(2)
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round_1(part as f64 * 100.0 / whole as f64)
}

fn round_1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round_2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
