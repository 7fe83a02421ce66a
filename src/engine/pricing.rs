use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::courier::Actor;
use crate::models::pricing::{quote, PricingConfig};

const MIN_AMOUNT: Decimal = Decimal::from_parts(1, 0, 0, false, 2);
const MAX_BASE_FEE: Decimal = Decimal::from_parts(100_000, 0, 0, false, 2);
const MAX_PER_KM_RATE: Decimal = Decimal::from_parts(10_000, 0, 0, false, 2);

const LOW_BASE_FEE: Decimal = Decimal::from_parts(1_000, 0, 0, false, 2);
const HIGH_BASE_FEE: Decimal = Decimal::from_parts(20_000, 0, 0, false, 2);
const LOW_PER_KM_RATE: Decimal = Decimal::from_parts(500, 0, 0, false, 2);
const HIGH_PER_KM_RATE: Decimal = Decimal::from_parts(5_000, 0, 0, false, 2);

/// Distances (km) used to preview a pricing change.
const SAMPLE_DISTANCES: [i64; 4] = [1, 5, 10, 25];

/// Every pricing config ever created; exactly one is active.
pub struct PricingBook {
    configs: RwLock<Vec<PricingConfig>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PriceImpact {
    pub distance_km: Decimal,
    pub old_price: Decimal,
    pub new_price: Decimal,
    pub change_amount: Decimal,
    pub change_percent: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangeValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub sample_impacts: Vec<PriceImpact>,
}

impl PricingBook {
    pub fn new(base_fee: Decimal, per_km_rate: Decimal) -> Self {
        let bootstrap = PricingConfig {
            id: Uuid::new_v4(),
            base_fee,
            per_km_rate,
            is_active: true,
            created_at: Utc::now(),
            created_by: None,
        };

        Self {
            configs: RwLock::new(vec![bootstrap]),
        }
    }

    pub fn active(&self) -> Result<PricingConfig, AppError> {
        self.configs
            .read()
            .iter()
            .find(|config| config.is_active)
            .cloned()
            .ok_or_else(|| AppError::Validation("no active pricing configuration found".to_string()))
    }

    /// Price for `distance_km` under `config`, or under the active config.
    pub fn calculate_price(
        &self,
        distance_km: Decimal,
        config: Option<&PricingConfig>,
    ) -> Result<Decimal, AppError> {
        match config {
            Some(config) => config.price_for(distance_km),
            None => self.active()?.price_for(distance_km),
        }
    }

    /// Replaces the active config with a new one.
    pub fn update(
        &self,
        base_fee: Decimal,
        per_km_rate: Decimal,
        actor: &Actor,
    ) -> Result<PricingConfig, AppError> {
        require_admin(actor)?;

        let errors = bound_errors(base_fee, per_km_rate);
        if !errors.is_empty() {
            return Err(AppError::Validation(errors.join("; ")));
        }

        let config = PricingConfig {
            id: Uuid::new_v4(),
            base_fee,
            per_km_rate,
            is_active: true,
            created_at: Utc::now(),
            created_by: Some(actor.id),
        };

        let mut configs = self.configs.write();
        let previous = configs.iter().find(|config| config.is_active).cloned();
        for existing in configs.iter_mut() {
            existing.is_active = false;
        }
        configs.push(config.clone());
        drop(configs);

        audit_change(actor, "PRICING_UPDATE", previous.as_ref(), &config);
        Ok(config)
    }

    /// Makes a historical config the active one again.
    pub fn activate(&self, config_id: Uuid, actor: &Actor) -> Result<PricingConfig, AppError> {
        require_admin(actor)?;

        let mut configs = self.configs.write();
        if !configs.iter().any(|config| config.id == config_id) {
            return Err(AppError::NotFound(format!(
                "pricing config {config_id} not found"
            )));
        }

        let previous = configs.iter().find(|config| config.is_active).cloned();
        for config in configs.iter_mut() {
            config.is_active = config.id == config_id;
        }
        let activated = configs
            .iter()
            .find(|config| config.id == config_id)
            .cloned()
            .ok_or_else(|| AppError::Internal(format!("pricing config {config_id} vanished")))?;
        drop(configs);

        audit_change(actor, "PRICING_ACTIVATE", previous.as_ref(), &activated);
        Ok(activated)
    }

    /// Newest first.
    pub fn history(&self, limit: usize) -> Vec<PricingConfig> {
        self.configs
            .read()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn validate_change(&self, base_fee: Decimal, per_km_rate: Decimal) -> ChangeValidation {
        let errors = bound_errors(base_fee, per_km_rate);
        let mut warnings = Vec::new();

        if base_fee >= MIN_AMOUNT && base_fee < LOW_BASE_FEE {
            warnings.push("base fee is very low, consider minimum viable pricing".to_string());
        }
        if base_fee <= MAX_BASE_FEE && base_fee > HIGH_BASE_FEE {
            warnings.push("base fee is very high, may deter customers".to_string());
        }
        if per_km_rate >= MIN_AMOUNT && per_km_rate < LOW_PER_KM_RATE {
            warnings.push("per-kilometer rate is very low, may not cover costs".to_string());
        }
        if per_km_rate <= MAX_PER_KM_RATE && per_km_rate > HIGH_PER_KM_RATE {
            warnings.push("per-kilometer rate is very high, may deter customers".to_string());
        }

        let sample_impacts = match self.active() {
            Ok(current) => SAMPLE_DISTANCES
                .iter()
                .filter_map(|km| {
                    let distance_km = Decimal::from(*km);
                    let old_price = current.price_for(distance_km).ok()?;
                    let new_price = quote(base_fee, per_km_rate, distance_km).ok()?;
                    let change_amount = new_price - old_price;
                    let change_percent = if old_price.is_zero() {
                        Decimal::ZERO
                    } else {
                        (change_amount / old_price * Decimal::ONE_HUNDRED).round_dp(2)
                    };

                    Some(PriceImpact {
                        distance_km,
                        old_price,
                        new_price,
                        change_amount,
                        change_percent,
                    })
                })
                .collect(),
            Err(_) => Vec::new(),
        };

        ChangeValidation {
            is_valid: errors.is_empty(),
            errors,
            warnings,
            sample_impacts,
        }
    }
}

fn bound_errors(base_fee: Decimal, per_km_rate: Decimal) -> Vec<String> {
    let mut errors = Vec::new();
    if base_fee < MIN_AMOUNT {
        errors.push("base fee must be at least 0.01".to_string());
    }
    if base_fee > MAX_BASE_FEE {
        errors.push("base fee cannot exceed 1000.00".to_string());
    }
    if per_km_rate < MIN_AMOUNT {
        errors.push("per-kilometer rate must be at least 0.01".to_string());
    }
    if per_km_rate > MAX_PER_KM_RATE {
        errors.push("per-kilometer rate cannot exceed 100.00".to_string());
    }
    errors
}

fn require_admin(actor: &Actor) -> Result<(), AppError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "only admin users can change pricing configuration".to_string(),
        ))
    }
}

fn audit_change(
    actor: &Actor,
    change_type: &str,
    previous: Option<&PricingConfig>,
    current: &PricingConfig,
) {
    let change = json!({
        "admin_user_id": actor.id,
        "change_type": change_type,
        "old_config": previous.map(|config| json!({
            "base_fee": config.base_fee,
            "per_km_rate": config.per_km_rate,
        })),
        "new_config": {
            "base_fee": current.base_fee,
            "per_km_rate": current.per_km_rate,
        },
    });

    info!(target: "courier_dispatch::pricing", change = %change, "pricing configuration changed");
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::PricingBook;
    use crate::error::AppError;
    use crate::models::courier::{Actor, Role};

    fn admin() -> Actor {
        Actor {
            id: Uuid::new_v4(),
            role: Role::Admin,
        }
    }

    fn book() -> PricingBook {
        PricingBook::new(Decimal::new(5000, 2), Decimal::new(2000, 2))
    }

    #[test]
    fn update_keeps_exactly_one_active_config() {
        let book = book();
        let updated = book
            .update(Decimal::new(6000, 2), Decimal::new(2500, 2), &admin())
            .unwrap();

        let history = book.history(10);
        assert_eq!(history.len(), 2);
        assert_eq!(history.iter().filter(|config| config.is_active).count(), 1);
        assert_eq!(book.active().unwrap().id, updated.id);
    }

    #[test]
    fn update_rejects_out_of_range_values() {
        let book = book();
        let err = book
            .update(Decimal::ZERO, Decimal::new(10_001, 2), &admin())
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(book.history(10).len(), 1);
    }

    #[test]
    fn only_admins_change_pricing() {
        let courier = Actor {
            id: Uuid::new_v4(),
            role: Role::Courier,
        };
        let err = book()
            .update(Decimal::new(6000, 2), Decimal::new(2500, 2), &courier)
            .unwrap_err();

        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn activate_restores_an_older_config() {
        let book = book();
        let original = book.active().unwrap();
        book.update(Decimal::new(6000, 2), Decimal::new(2500, 2), &admin())
            .unwrap();

        book.activate(original.id, &admin()).unwrap();

        assert_eq!(book.active().unwrap().id, original.id);
        assert!(matches!(
            book.activate(Uuid::new_v4(), &admin()),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn validation_reports_warnings_and_sample_impacts() {
        let report = book().validate_change(Decimal::new(500, 2), Decimal::new(6000, 2));

        assert!(report.is_valid);
        assert_eq!(report.warnings.len(), 2);
        assert_eq!(report.sample_impacts.len(), 4);

        // 5 km: 50 + 100 = 150 before, 5 + 300 = 305 after
        let five_km = &report.sample_impacts[1];
        assert_eq!(five_km.old_price, Decimal::new(15000, 2));
        assert_eq!(five_km.new_price, Decimal::new(30500, 2));
        assert_eq!(five_km.change_amount, Decimal::new(15500, 2));
    }

    #[test]
    fn validation_flags_invalid_values() {
        let report = book().validate_change(Decimal::new(200_000, 2), Decimal::ZERO);

        assert!(!report.is_valid);
        assert_eq!(report.errors.len(), 2);
    }
}
