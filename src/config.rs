//! Application configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::FixedOffset;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_with::serde_as;
use tracing::warn;

use crate::errors::MonitorError;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub polling: PollingConfig,
    pub simulation: SimulationConfig,
    pub session: SessionConfig,
    pub dashboard: DashboardConfig,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    /// Base URL of the telemetry backend, e.g. `https://fleet.example.com`
    pub base_url: String,
    /// Opaque token sent as the `key` query parameter of the vessel list
    pub api_key: String,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub request_timeout: Duration,
}

/// What a manual refresh does besides toggling the refreshing flag
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RefreshMode {
    /// Only bump the last-update timestamp
    #[default]
    Cosmetic,
    /// Re-fetch the vessel list before clearing the flag
    Refetch,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct PollingConfig {
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub vessel_interval: Duration,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub jitter_interval: Duration,
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub refresh_delay: Duration,
    pub refresh_mode: RefreshMode,
    pub recent_activity_limit: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SimulationConfig {
    pub enabled: bool,
    pub speed_delta: f64,
    pub rpm_delta: f64,
    pub fuel_delta: f64,
}

/// A dashboard account; the password is stored as a bcrypt hash
#[derive(Debug, Deserialize, Clone)]
pub struct UserCredential {
    pub username: String,
    pub password_hash: String,
    pub role: Option<String>,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub inactivity_timeout: Duration,
    #[serde(default)]
    pub users: Vec<UserCredential>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    /// Offset from UTC of the calendar day used for hourly charts
    pub utc_offset_minutes: i32,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("backend.request_timeout", 10)?
            .set_default("polling.vessel_interval", 5)?
            .set_default("polling.jitter_interval", 5)?
            .set_default("polling.refresh_delay", 1000)?
            .set_default("polling.refresh_mode", "cosmetic")?
            .set_default("polling.recent_activity_limit", 2000)?
            .set_default("simulation.enabled", true)?
            .set_default("simulation.speed_delta", 2.0)?
            .set_default("simulation.rpm_delta", 50.0)?
            .set_default("simulation.fuel_delta", 5.0)?
            .set_default("session.inactivity_timeout", 1800)?
            .set_default("dashboard.utc_offset_minutes", 0)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(
                Environment::with_prefix("VESSELMON")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate every section
    pub fn validate(&self) -> Result<(), MonitorError> {
        self.backend.validate()?;
        self.polling.validate()?;
        self.simulation.validate()?;
        self.session.validate()?;
        self.dashboard.validate()?;
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> MonitorError {
    MonitorError::ConfigurationError {
        message: message.into(),
    }
}

impl BackendConfig {
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.base_url.trim().is_empty() {
            return Err(invalid("Backend base URL cannot be empty"));
        }
        reqwest::Url::parse(&self.base_url)
            .map_err(|e| invalid(format!("Backend base URL is invalid: {}", e)))?;
        if self.request_timeout.is_zero() {
            return Err(invalid("Request timeout must be greater than zero"));
        }
        Ok(())
    }
}

impl PollingConfig {
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.vessel_interval.is_zero() {
            return Err(invalid("Vessel poll interval must be greater than zero"));
        }
        if self.jitter_interval.is_zero() {
            return Err(invalid("Jitter interval must be greater than zero"));
        }
        if self.recent_activity_limit == 0 {
            return Err(invalid("Recent activity limit must be greater than zero"));
        }
        Ok(())
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            vessel_interval: Duration::from_secs(5),
            jitter_interval: Duration::from_secs(5),
            refresh_delay: Duration::from_millis(1000),
            refresh_mode: RefreshMode::Cosmetic,
            recent_activity_limit: 2000,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), MonitorError> {
        for (name, delta) in [
            ("speed_delta", self.speed_delta),
            ("rpm_delta", self.rpm_delta),
            ("fuel_delta", self.fuel_delta),
        ] {
            if !delta.is_finite() || delta < 0.0 {
                return Err(invalid(format!(
                    "Simulation {} must be a non-negative number",
                    name
                )));
            }
        }
        Ok(())
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            speed_delta: 2.0,
            rpm_delta: 50.0,
            fuel_delta: 5.0,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.inactivity_timeout.is_zero() {
            return Err(invalid("Inactivity timeout must be greater than zero"));
        }
        if let Some(path) = &self.path {
            if path.as_os_str().is_empty() {
                return Err(invalid("Session path cannot be empty"));
            }
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                self.ensure_directory_exists(parent)?;
            }
        }
        Ok(())
    }

    fn ensure_directory_exists(&self, dir: &Path) -> Result<(), MonitorError> {
        if !dir.exists() {
            warn!("Session directory does not exist, attempting to create it");
            std::fs::create_dir_all(dir)
                .map_err(|e| invalid(format!("Could not create session directory: {}", e)))?;
        }
        Ok(())
    }
}

impl DashboardConfig {
    pub fn validate(&self) -> Result<(), MonitorError> {
        self.utc_offset().map(|_| ())
    }

    pub fn utc_offset(&self) -> Result<FixedOffset, MonitorError> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            invalid(format!(
                "UTC offset of {} minutes is out of range",
                self.utc_offset_minutes
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_load_config() {
        env::set_var("VESSELMON__BACKEND__BASE_URL", "http://localhost:8080");
        env::set_var("VESSELMON__BACKEND__API_KEY", "abc123");
        env::set_var("VESSELMON__POLLING__VESSEL_INTERVAL", "7");
        env::set_var("VESSELMON__POLLING__REFRESH_MODE", "refetch");

        let config = AppConfig::load().unwrap();
        assert_eq!(config.backend.base_url, "http://localhost:8080");
        assert_eq!(config.backend.api_key, "abc123");
        assert_eq!(config.backend.request_timeout, Duration::from_secs(10));
        assert_eq!(config.polling.vessel_interval, Duration::from_secs(7));
        assert_eq!(config.polling.jitter_interval, Duration::from_secs(5));
        assert_eq!(config.polling.refresh_delay, Duration::from_millis(1000));
        assert_eq!(config.polling.refresh_mode, RefreshMode::Refetch);
        assert_eq!(config.polling.recent_activity_limit, 2000);
        assert!(config.simulation.enabled);
        assert_eq!(config.simulation.rpm_delta, 50.0);
        assert_eq!(config.session.inactivity_timeout, Duration::from_secs(1800));
        assert!(config.session.users.is_empty());
        assert_eq!(config.dashboard.utc_offset_minutes, 0);
    }

    fn backend(base_url: &str) -> BackendConfig {
        BackendConfig {
            base_url: base_url.to_string(),
            api_key: "key".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_backend_config_validate() {
        assert!(backend("https://fleet.example.com").validate().is_ok());
        assert!(backend("").validate().is_err());
        assert!(backend("not a url").validate().is_err());
    }

    #[test]
    fn test_polling_config_validate_zero_interval() {
        let config = PollingConfig {
            vessel_interval: Duration::ZERO,
            ..PollingConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(PollingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_simulation_config_validate() {
        let config = SimulationConfig {
            rpm_delta: -1.0,
            ..SimulationConfig::default()
        };
        assert!(config.validate().is_err());

        let config = SimulationConfig {
            fuel_delta: f64::NAN,
            ..SimulationConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_session_config_creates_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("session.json");
        let config = SessionConfig {
            path: Some(path.clone()),
            inactivity_timeout: Duration::from_secs(60),
            users: Vec::new(),
        };

        assert!(config.validate().is_ok());
        assert!(path.parent().unwrap().exists());
    }

    #[test]
    fn test_dashboard_offset() {
        let config = DashboardConfig {
            utc_offset_minutes: 420,
        };
        assert_eq!(config.utc_offset().unwrap().local_minus_utc(), 420 * 60);

        let config = DashboardConfig {
            utc_offset_minutes: 24 * 60,
        };
        assert!(config.validate().is_err());
    }
}
