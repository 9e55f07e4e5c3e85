use crate::errors::{Error, Result};
use chrono::FixedOffset;
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "DASHBOARD_";

#[derive(Debug, Parser)]
#[command(name = "dashboard", about = "Mirrors oneM2M sensor and actuator state")]
pub struct Cli {
    /// Path to the TOML settings file
    #[arg(short, long, env = "DASHBOARD_CONFIG", default_value = "dashboard.toml")]
    pub config: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app_name: String,
    pub app_ip: String,
    pub app_port: u16,
    pub bind_addr: String,
    pub cse_url: String,
    pub cse_id: String,
    pub cse_name: String,
    pub admin_originator: String,
    pub release_version: String,
    pub grace_secs: u64,
    pub request_timeout_ms: u64,
    pub history_capacity: usize,
    pub display_utc_offset_hours: i32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "Dashboard".into(),
            app_ip: "127.0.0.1".into(),
            app_port: 8050,
            bind_addr: "0.0.0.0:8050".into(),
            cse_url: "http://127.0.0.1:8080".into(),
            cse_id: "id-in".into(),
            cse_name: "cse-in".into(),
            admin_originator: "CAdmin".into(),
            release_version: "3".into(),
            grace_secs: 5,
            request_timeout_ms: 5000,
            history_capacity: 50,
            display_utc_offset_hours: -4,
        }
    }
}

impl Settings {
    /// Reads `path` (defaults when it does not exist), then applies
    /// `DASHBOARD_*` environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut settings = match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_toml(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => return Err(Error::Io(e)),
        };
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(v) = var("APP_NAME") {
            self.app_name = v;
        }
        if let Some(v) = var("APP_IP") {
            self.app_ip = v;
        }
        if let Some(v) = var("APP_PORT") {
            self.app_port = parse_var("APP_PORT", &v)?;
        }
        if let Some(v) = var("BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Some(v) = var("CSE_URL") {
            self.cse_url = v;
        }
        if let Some(v) = var("CSE_ID") {
            self.cse_id = v;
        }
        if let Some(v) = var("CSE_NAME") {
            self.cse_name = v;
        }
        if let Some(v) = var("ADMIN_ORIGINATOR") {
            self.admin_originator = v;
        }
        if let Some(v) = var("RELEASE_VERSION") {
            self.release_version = v;
        }
        if let Some(v) = var("GRACE_SECS") {
            self.grace_secs = parse_var("GRACE_SECS", &v)?;
        }
        if let Some(v) = var("REQUEST_TIMEOUT_MS") {
            self.request_timeout_ms = parse_var("REQUEST_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = var("HISTORY_CAPACITY") {
            self.history_capacity = parse_var("HISTORY_CAPACITY", &v)?;
        }
        if let Some(v) = var("DISPLAY_UTC_OFFSET_HOURS") {
            self.display_utc_offset_hours = parse_var("DISPLAY_UTC_OFFSET_HOURS", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.app_name.is_empty() {
            return Err(Error::Config("app_name cannot be empty".into()));
        }
        if self.history_capacity == 0 {
            return Err(Error::Config("history_capacity must be positive".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::Config("request_timeout_ms must be positive".into()));
        }
        self.display_offset()?;
        Ok(())
    }

    /// AE-ID the dashboard presents to the broker.
    pub fn originator(&self) -> String {
        format!("C{}", self.app_name)
    }

    /// Notification target advertised in the AE's `poa`.
    pub fn point_of_access(&self) -> String {
        format!("http://{}:{}", self.app_ip, self.app_port)
    }

    /// Address of a resource directly under the CSE base.
    pub fn cse_child(&self, name: &str) -> String {
        format!("{}/{}", self.cse_name, name)
    }

    pub fn acp_name(&self) -> String {
        format!("{}ACP", self.app_name)
    }

    pub fn subscription_name(&self) -> String {
        format!("{}Sub", self.app_name)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn display_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.display_utc_offset_hours * 3600).ok_or_else(|| {
            Error::Config(format!(
                "display_utc_offset_hours {} out of range",
                self.display_utc_offset_hours
            ))
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("{}{} has invalid value {:?}", ENV_PREFIX, name, raw)))
}
