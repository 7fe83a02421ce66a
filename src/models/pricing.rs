use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    pub id: Uuid,
    pub base_fee: Decimal,
    pub per_km_rate: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    /// `None` for the bootstrap config loaded from the environment.
    pub created_by: Option<Uuid>,
}

impl PricingConfig {
    pub fn price_for(&self, distance_km: Decimal) -> Result<Decimal, AppError> {
        quote(self.base_fee, self.per_km_rate, distance_km)
    }
}

/// `base_fee + distance × per_km_rate`, rounded half-up to cents.
pub fn quote(
    base_fee: Decimal,
    per_km_rate: Decimal,
    distance_km: Decimal,
) -> Result<Decimal, AppError> {
    distance_km
        .checked_mul(per_km_rate)
        .and_then(|distance_part| distance_part.checked_add(base_fee))
        .map(|price| price.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
        .ok_or_else(|| {
            AppError::Validation(format!("price for {distance_km} km is out of range"))
        })
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::quote;
    use crate::error::AppError;

    #[test]
    fn five_km_at_default_rates_costs_150() {
        let price =
            quote(Decimal::new(5000, 2), Decimal::new(2000, 2), Decimal::new(50, 1)).unwrap();
        assert_eq!(price, Decimal::new(15000, 2));
    }

    #[test]
    fn half_cent_rounds_up() {
        // 10.00 + 0.125 * 1.00 = 10.125
        let price =
            quote(Decimal::new(1000, 2), Decimal::new(100, 2), Decimal::new(125, 3)).unwrap();
        assert_eq!(price, Decimal::new(1013, 2));
    }

    #[test]
    fn overflowing_price_is_a_validation_error() {
        let result = quote(Decimal::new(5000, 2), Decimal::new(2000, 2), Decimal::MAX);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
