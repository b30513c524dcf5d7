use std::net::SocketAddr;
use std::str::FromStr;

use carevault_core::ResourceType;
use carevault_db_memory::StorageConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub audit: AuditSettings,
    #[serde(default)]
    pub resources: ResourceSettings,
    #[serde(default)]
    pub paging: PagingSettings,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        if self.paging.default_count == 0 {
            return Err("paging.default_count must be > 0".into());
        }
        if self.paging.max_count == 0 {
            return Err("paging.max_count must be > 0".into());
        }
        if self.paging.default_count > self.paging.max_count {
            return Err("paging.default_count must be <= paging.max_count".into());
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        if self.audit.channel_capacity == 0 {
            return Err("audit.channel_capacity must be > 0".into());
        }
        self.resources.client_assigned_types()?;
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// How audit events reach the audit store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditMode {
    /// Await every append before the operation returns.
    #[default]
    Inline,
    /// Queue events for a background writer task.
    Background,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditSettings {
    #[serde(default)]
    pub mode: AuditMode,
    /// Queue capacity for `background` mode.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}
fn default_channel_capacity() -> usize {
    carevault_core::audit::DEFAULT_AUDIT_QUEUE
}
impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            mode: AuditMode::default(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceSettings {
    /// Resource types whose ids are chosen by the client.
    #[serde(default)]
    pub client_assigned_id_types: Vec<String>,
    /// Extra attempts for updates sent without `If-Match`.
    #[serde(default = "default_max_update_retries")]
    pub max_update_retries: u32,
}
fn default_max_update_retries() -> u32 {
    3
}
impl Default for ResourceSettings {
    fn default() -> Self {
        Self {
            client_assigned_id_types: Vec::new(),
            max_update_retries: default_max_update_retries(),
        }
    }
}

impl ResourceSettings {
    pub fn client_assigned_types(&self) -> Result<Vec<ResourceType>, String> {
        self.client_assigned_id_types
            .iter()
            .map(|t| {
                ResourceType::from_str(t)
                    .map_err(|_| format!("resources.client_assigned_id_types: unknown type '{t}'"))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PagingSettings {
    #[serde(default = "default_page_count")]
    pub default_count: u32,
    #[serde(default = "default_max_count")]
    pub max_count: u32,
}
fn default_page_count() -> u32 {
    carevault_core::paging::DEFAULT_PAGE_COUNT
}
fn default_max_count() -> u32 {
    100
}
impl Default for PagingSettings {
    fn default() -> Self {
        Self {
            default_count: default_page_count(),
            max_count: default_max_count(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub const DEFAULT_CONFIG_PATH: &str = "carevault.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., CAREVAULT__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("CAREVAULT")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.audit.mode, AuditMode::Inline);
        assert_eq!(cfg.paging.default_count, 20);
        assert_eq!(cfg.resources.max_update_retries, 3);
    }

    #[test]
    fn test_validation_errors() {
        let mut cfg = AppConfig::default();
        cfg.logging.level = "loud".into();
        assert!(cfg.validate().unwrap_err().contains("logging.level"));

        let mut cfg = AppConfig::default();
        cfg.audit.channel_capacity = 0;
        assert!(cfg.validate().unwrap_err().contains("channel_capacity"));

        let mut cfg = AppConfig::default();
        cfg.resources.client_assigned_id_types = vec!["Practitioner".into(), "Spaceship".into()];
        assert!(cfg.validate().unwrap_err().contains("Spaceship"));
    }
}
