use std::env;
use std::str::FromStr;

use chrono::Duration;

/// Timing and retry knobs of the reconciliation engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Age after which a pending deposit is auto-resolved.
    pub deposit_timeout: Duration,
    /// Time an agent has to act on an assigned withdrawal.
    pub withdrawal_timeout: Duration,
    /// Deadline extension when no agent can take a stale withdrawal, or when
    /// resolving an expired item failed.
    pub reassign_retry: Duration,
    /// A running saga whose cursor has not moved for this long is taken as crashed.
    pub saga_stale_after: Duration,
    pub watchdog_tick: std::time::Duration,
    /// Items handled per kind and tick; the rest wait for the next tick.
    pub watchdog_batch_size: u64,
    /// Agents at or above this many penalties are not assigned new work.
    pub max_agent_penalties: i32,
    pub cas_max_attempts: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            deposit_timeout: Duration::seconds(180),
            withdrawal_timeout: Duration::seconds(120),
            reassign_retry: Duration::seconds(30),
            saga_stale_after: Duration::seconds(300),
            watchdog_tick: std::time::Duration::from_millis(1000),
            watchdog_batch_size: 100,
            max_agent_penalties: 3,
            cas_max_attempts: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres URL, or `memory` for a process-local store.
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub telegram_bot_token: Option<String>,
    /// Receipt upload endpoint; receipts stay in process memory when unset.
    pub storage_upload_url: Option<String>,
    pub storage_public_url: Option<String>,
    pub storage_api_key: Option<String>,
    pub engine: EngineSettings,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenv::dotenv().ok();

        let database_url = env::var("DATABASE_URL")?;

        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let server_port = parse_or("SERVER_PORT", 8080u16)?;

        let telegram_bot_token = env::var("TELEGRAM_BOT_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());

        let storage_upload_url = env
            ::var("STORAGE_UPLOAD_URL")
            .ok()
            .filter(|u| !u.trim().is_empty());
        let storage_public_url = env
            ::var("STORAGE_PUBLIC_URL")
            .ok()
            .or_else(|| storage_upload_url.clone());
        let storage_api_key = env::var("STORAGE_API_KEY").ok();

        let defaults = EngineSettings::default();
        let engine = EngineSettings {
            deposit_timeout: Duration::seconds(
                parse_or("DEPOSIT_TIMEOUT_SECS", defaults.deposit_timeout.num_seconds())?
            ),
            withdrawal_timeout: Duration::seconds(
                parse_or("WITHDRAWAL_TIMEOUT_SECS", defaults.withdrawal_timeout.num_seconds())?
            ),
            reassign_retry: Duration::seconds(
                parse_or("REASSIGN_RETRY_SECS", defaults.reassign_retry.num_seconds())?
            ),
            saga_stale_after: Duration::seconds(
                parse_or("SAGA_STALE_SECS", defaults.saga_stale_after.num_seconds())?
            ),
            watchdog_tick: std::time::Duration::from_millis(
                parse_or("WATCHDOG_TICK_MS", defaults.watchdog_tick.as_millis() as u64)?
            ),
            watchdog_batch_size: parse_or("WATCHDOG_BATCH_SIZE", defaults.watchdog_batch_size)?,
            max_agent_penalties: parse_or("MAX_AGENT_PENALTIES", defaults.max_agent_penalties)?,
            cas_max_attempts: parse_or("CAS_MAX_ATTEMPTS", defaults.cas_max_attempts)?,
        };

        if engine.cas_max_attempts == 0 {
            return Err("CAS_MAX_ATTEMPTS must be at least 1".into());
        }

        if engine.watchdog_tick.is_zero() {
            return Err("WATCHDOG_TICK_MS must be positive".into());
        }

        if engine.watchdog_batch_size == 0 {
            return Err("WATCHDOG_BATCH_SIZE must be at least 1".into());
        }

        Ok(Config {
            database_url,
            server_host,
            server_port,
            telegram_bot_token,
            storage_upload_url,
            storage_public_url,
            storage_api_key,
            engine,
        })
    }

    /// Whether the process-local store was requested instead of Postgres.
    pub fn uses_memory_store(&self) -> bool {
        self.database_url.eq_ignore_ascii_case("memory")
    }
}

fn parse_or<T>(key: &str, default: T) -> Result<T, Box<dyn std::error::Error>>
    where T: FromStr, <T as FromStr>::Err: std::fmt::Display
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|e| format!("{} is invalid: {}", key, e).into()),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_deadlines() {
        let settings = EngineSettings::default();
        assert_eq!(settings.deposit_timeout.num_seconds(), 180);
        assert_eq!(settings.withdrawal_timeout.num_seconds(), 120);
        assert_eq!(settings.watchdog_tick.as_millis(), 1000);
        assert_eq!(settings.saga_stale_after.num_seconds(), 300);
        assert_eq!(settings.watchdog_batch_size, 100);
    }

    #[test]
    fn test_parse_or_falls_back_when_unset() {
        let value: u32 = parse_or("AGENT_LEDGER_TEST_UNSET_KEY", 7).unwrap();
        assert_eq!(value, 7);
    }
}
