//! Coach energy: a linear-refill wallet per user.

use chrono::{DateTime, Duration, Utc};

use crate::config::CoachConfig;
use crate::types::{EnergyStatus, EnergyWallet, Id};

/// New wallets start full
pub fn full_wallet(user_id: Id, config: &CoachConfig, now: DateTime<Utc>) -> EnergyWallet {
    EnergyWallet {
        user_id,
        current_energy: config.energy_max,
        updated_at: now,
    }
}

fn recovery_seconds(config: &CoachConfig) -> f64 {
    config.recovery_minutes * 60.0
}

/// Stored energy plus what refilled since `updated_at`, clamped to `[0, max]`
pub fn refilled(wallet: &EnergyWallet, config: &CoachConfig, now: DateTime<Utc>) -> f64 {
    let elapsed = (now - wallet.updated_at).num_milliseconds().max(0) as f64 / 1000.0;
    let gained = if recovery_seconds(config) > 0.0 {
        elapsed * config.energy_max / recovery_seconds(config)
    } else {
        f64::INFINITY
    };
    (wallet.current_energy + gained).clamp(0.0, config.energy_max)
}

/// Seconds until `current` reaches one message cost
pub fn seconds_until_next_message(current: f64, config: &CoachConfig) -> u64 {
    let missing = config.message_cost - current;
    if missing <= 0.0 || config.energy_max <= 0.0 {
        return 0;
    }
    (missing * recovery_seconds(config) / config.energy_max).ceil() as u64
}

pub fn status(current: f64, config: &CoachConfig, now: DateTime<Utc>) -> EnergyStatus {
    let wait = seconds_until_next_message(current, config);
    EnergyStatus {
        current,
        max: config.energy_max,
        seconds_until_next_message: wait,
        next_message_available_at: now + Duration::seconds(wait as i64),
    }
}

/// Status for users who are never charged
pub fn unlimited(config: &CoachConfig, now: DateTime<Utc>) -> EnergyStatus {
    status(config.energy_max, config, now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_wallet_waits_for_one_message() {
        let config = CoachConfig::default();
        assert_eq!(seconds_until_next_message(0.0, &config), 900);
        assert_eq!(seconds_until_next_message(25.0, &config), 0);
        assert_eq!(seconds_until_next_message(24.0, &config), 36);
    }

    #[test]
    fn test_refill_is_linear_and_clamped() {
        let config = CoachConfig::default();
        let now = Utc::now();
        let wallet = EnergyWallet {
            user_id: 1,
            current_energy: 0.0,
            updated_at: now - Duration::minutes(15),
        };
        assert!((refilled(&wallet, &config, now) - 25.0).abs() < 1e-6);
        let old = EnergyWallet {
            updated_at: now - Duration::days(1),
            ..wallet
        };
        assert_eq!(refilled(&old, &config, now), config.energy_max);
    }
}
