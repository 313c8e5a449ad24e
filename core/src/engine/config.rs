//! Engine configuration

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("ticks_per_day must be positive")]
    ZeroDay,

    #[error(
        "window offsets must satisfy open <= close <= batch < ticks_per_day \
         (open {open}, close {close}, batch {batch}, ticks_per_day {ticks_per_day})"
    )]
    BadWindows {
        open: usize,
        close: usize,
        batch: usize,
        ticks_per_day: usize,
    },

    #[error("timeout_ticks must be positive")]
    ZeroTimeout,

    #[error("min_settlement_amount must be non-negative, got {0}")]
    NegativeThreshold(i64),
}

/// Tunable parameters of the settlement engine
///
/// All money values are i64 (cents).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Ticks in one business day
    pub ticks_per_day: usize,

    /// Tick-within-day at which trading opens (inclusive)
    pub trading_open_tick: usize,

    /// Tick-within-day at which trading closes (exclusive)
    pub trading_close_tick: usize,

    /// Tick-within-day at which the end-of-day batch window opens
    pub batch_start_tick: usize,

    /// Instructions older than this many ticks are cancelled
    pub timeout_ticks: usize,

    /// Partial settlement splits only when the settleable amount strictly
    /// exceeds this threshold (cents)
    pub min_settlement_amount: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ticks_per_day: 100,
            trading_open_tick: 0,
            trading_close_tick: 80,
            batch_start_tick: 90,
            timeout_ticks: 250,
            min_settlement_amount: 100_00,
        }
    }
}

impl EngineConfig {
    /// Validate parameter ranges and window ordering
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ticks_per_day == 0 {
            return Err(ConfigError::ZeroDay);
        }
        if !(self.trading_open_tick <= self.trading_close_tick
            && self.trading_close_tick <= self.batch_start_tick
            && self.batch_start_tick < self.ticks_per_day)
        {
            return Err(ConfigError::BadWindows {
                open: self.trading_open_tick,
                close: self.trading_close_tick,
                batch: self.batch_start_tick,
                ticks_per_day: self.ticks_per_day,
            });
        }
        if self.timeout_ticks == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.min_settlement_amount < 0 {
            return Err(ConfigError::NegativeThreshold(self.min_settlement_amount));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_window_ordering_rejected() {
        let config = EngineConfig {
            trading_close_tick: 95,
            batch_start_tick: 90,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BadWindows { .. })
        ));
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let config = EngineConfig {
            min_settlement_amount: -1,
            ..EngineConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NegativeThreshold(-1)));
    }
}
