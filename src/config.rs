use log::warn;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://factor_platform.db?mode=rwc";
pub const MAX_DEQUEUE_BATCH: u64 = 50;

/// Runtime settings, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub workers: usize,
    pub dequeue_batch: u64,
    pub poll_interval: Duration,
    pub callback_timeout: Duration,
    pub panel_dir: PathBuf,
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            workers: 2,
            dequeue_batch: 8,
            poll_interval: Duration::from_millis(1000),
            callback_timeout: Duration::from_secs(3),
            panel_dir: PathBuf::from("panels"),
            log_dir: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup; unset or blank keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let d = Self::default();

        Self {
            database_url: get("DATABASE_URL").unwrap_or(d.database_url),
            workers: parse_or("FACTORQ_WORKERS", get("FACTORQ_WORKERS"), d.workers).max(1),
            dequeue_batch: parse_or(
                "FACTORQ_DEQUEUE_BATCH",
                get("FACTORQ_DEQUEUE_BATCH"),
                d.dequeue_batch,
            )
            .clamp(1, MAX_DEQUEUE_BATCH),
            poll_interval: Duration::from_millis(parse_or(
                "FACTORQ_POLL_INTERVAL_MS",
                get("FACTORQ_POLL_INTERVAL_MS"),
                d.poll_interval.as_millis() as u64,
            )),
            callback_timeout: Duration::from_secs(parse_or(
                "FACTORQ_CALLBACK_TIMEOUT_SECS",
                get("FACTORQ_CALLBACK_TIMEOUT_SECS"),
                d.callback_timeout.as_secs(),
            )),
            panel_dir: get("FACTORQ_PANEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.panel_dir),
            log_dir: get("FACTORQ_LOG_DIR").map(PathBuf::from),
        }
    }
}

fn parse_or<T: FromStr + Copy>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        None => default,
        Some(v) => v.parse().unwrap_or_else(|_| {
            warn!("⚠ {}={} is not a valid number, using default", key, v);
            default
        }),
    }
}
