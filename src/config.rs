use std::env;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::engine::selection::TieBreak;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}, expected compact/json")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub event_buffer_size: usize,
    pub default_base_fee: Decimal,
    pub default_per_km_rate: Decimal,
    pub dispatch: DispatchPolicy,
}

/// Knobs the assignment engine reads on every operation.
#[derive(Debug, Clone, Copy)]
pub struct DispatchPolicy {
    pub tie_break: TieBreak,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            tie_break: TieBreak::RegistrationOrder,
            max_attempts: 3,
            retry_backoff: Duration::from_millis(10),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let max_attempts: u32 =
            non_zero("TX_MAX_ATTEMPTS", parse_or_default("TX_MAX_ATTEMPTS", 3)?)?;
        let event_buffer_size: usize = non_zero(
            "EVENT_BUFFER_SIZE",
            parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
        )?;

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format: parse_or_default("LOG_FORMAT", LogFormat::Compact)?,
            event_buffer_size,
            default_base_fee: parse_or_default("DEFAULT_BASE_FEE", Decimal::new(5000, 2))?,
            default_per_km_rate: parse_or_default("DEFAULT_PER_KM_RATE", Decimal::new(2000, 2))?,
            dispatch: DispatchPolicy {
                tie_break: parse_or_default("ASSIGNMENT_TIE_BREAK", TieBreak::RegistrationOrder)?,
                max_attempts,
                retry_backoff: Duration::from_millis(parse_or_default("TX_RETRY_BACKOFF_MS", 10)?),
            },
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

/// Broadcast channels and retry loops both need at least one slot.
fn non_zero<T>(key: &str, value: T) -> Result<T, AppError>
where
    T: Default + PartialEq,
{
    if value == T::default() {
        return Err(AppError::Internal(format!("invalid {key}: must be >= 1")));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::{non_zero, LogFormat};
    use crate::error::AppError;

    #[test]
    fn zero_sizes_are_rejected() {
        assert!(matches!(
            non_zero("EVENT_BUFFER_SIZE", 0usize),
            Err(AppError::Internal(_))
        ));
        assert!(matches!(
            non_zero("TX_MAX_ATTEMPTS", 0u32),
            Err(AppError::Internal(_))
        ));
        assert_eq!(non_zero("EVENT_BUFFER_SIZE", 1024usize).unwrap(), 1024);
    }

    #[test]
    fn log_format_parses_known_names_only() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("pretty".parse::<LogFormat>().is_err());
    }
}
