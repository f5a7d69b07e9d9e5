//! Runtime configuration from environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `RESQ_PORT` | `3030` |
//! | `RESQ_DATABASE_URL` | `sqlite:resq-relay.db?mode=rwc` |
//! | `RESQ_API_BASE_URL` | `http://localhost:5000/api` |
//! | `RESQ_REQUEST_TIMEOUT_SECS` | `10` |
//! | `RESQ_PROBE_INTERVAL_SECS` | `5` |
//! | `RESQ_RECONCILE_INTERVAL_SECS` | `60` (`0` disables periodic passes) |
//! | `RESQ_LOCATION_FILE` | unset |
//! | `RESQ_FIXED_LAT` / `RESQ_FIXED_LNG` | unset |
//!
//! Unparseable numeric values fall back to their defaults.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::location::DeviceLocation;
use crate::model::Coordinates;
use crate::submitter::DEFAULT_API_BASE;

/// Default port for the local relay API.
const DEFAULT_PORT: u16 = 3030;

/// Default database path.
const DEFAULT_DB_PATH: &str = "sqlite:resq-relay.db?mode=rwc";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_PROBE_INTERVAL_SECS: u64 = 5;
const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub port: u16,
    pub database_url: String,
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub probe_interval: Duration,
    /// `None` disables periodic reconciliation.
    pub reconcile_interval: Option<Duration>,
    pub location: DeviceLocation,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: DEFAULT_DB_PATH.to_string(),
            api_base_url: DEFAULT_API_BASE.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            probe_interval: Duration::from_secs(DEFAULT_PROBE_INTERVAL_SECS),
            reconcile_interval: Some(Duration::from_secs(DEFAULT_RECONCILE_INTERVAL_SECS)),
            location: DeviceLocation::Unavailable,
        }
    }
}

impl RelayConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        let port = lookup("RESQ_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port);

        let database_url = lookup("RESQ_DATABASE_URL").unwrap_or(defaults.database_url);
        let api_base_url = lookup("RESQ_API_BASE_URL").unwrap_or(defaults.api_base_url);

        let request_timeout = parsed("RESQ_REQUEST_TIMEOUT_SECS")
            .filter(|&s| s > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);
        let probe_interval = parsed("RESQ_PROBE_INTERVAL_SECS")
            .filter(|&s| s > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.probe_interval);
        let reconcile_interval = match parsed("RESQ_RECONCILE_INTERVAL_SECS") {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.reconcile_interval,
        };

        Self {
            port,
            database_url,
            api_base_url,
            request_timeout,
            probe_interval,
            reconcile_interval,
            location: location_from(&lookup),
        }
    }
}

/// A location file takes precedence over fixed coordinates.
fn location_from(lookup: &impl Fn(&str) -> Option<String>) -> DeviceLocation {
    if let Some(path) = lookup("RESQ_LOCATION_FILE").filter(|p| !p.trim().is_empty()) {
        return DeviceLocation::File(PathBuf::from(path));
    }

    let coordinate = |key: &str| lookup(key).and_then(|v| f64::from_str(v.trim()).ok());
    match (coordinate("RESQ_FIXED_LAT"), coordinate("RESQ_FIXED_LNG")) {
        (Some(latitude), Some(longitude)) => DeviceLocation::Fixed(Coordinates { latitude, longitude }),
        _ => DeviceLocation::Unavailable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> RelayConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RelayConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]);

        assert_eq!(config.port, 3030);
        assert_eq!(config.api_base_url, "http://localhost:5000/api");
        assert_eq!(config.reconcile_interval, Some(Duration::from_secs(60)));
        assert!(matches!(config.location, DeviceLocation::Unavailable));
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("RESQ_PORT", "8080"),
            ("RESQ_API_BASE_URL", "https://dispatch.example/api"),
            ("RESQ_RECONCILE_INTERVAL_SECS", "0"),
            ("RESQ_PROBE_INTERVAL_SECS", "15"),
            ("RESQ_FIXED_LAT", "28.6139"),
            ("RESQ_FIXED_LNG", "77.209"),
        ]);

        assert_eq!(config.port, 8080);
        assert_eq!(config.api_base_url, "https://dispatch.example/api");
        assert_eq!(config.reconcile_interval, None);
        assert_eq!(config.probe_interval, Duration::from_secs(15));
        assert!(matches!(
            config.location,
            DeviceLocation::Fixed(Coordinates { latitude, longitude }) if latitude == 28.6139 && longitude == 77.209
        ));
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let config = config(&[("RESQ_PORT", "not-a-port"), ("RESQ_REQUEST_TIMEOUT_SECS", "0")]);

        assert_eq!(config.port, 3030);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_location_file_wins() {
        let config = config(&[
            ("RESQ_LOCATION_FILE", "/run/gnss/fix.json"),
            ("RESQ_FIXED_LAT", "1"),
            ("RESQ_FIXED_LNG", "2"),
        ]);

        assert!(matches!(config.location, DeviceLocation::File(ref p) if p == &PathBuf::from("/run/gnss/fix.json")));
    }
}
