use kiln::KilnConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Host address
    pub host: String,

    /// Port number of the public API
    pub port: u16,

    /// Host address of the internal callback listener
    pub internal_host: String,

    /// Port number of the internal callback listener
    pub internal_port: u16,

    /// CORS configuration
    pub cors: CorsConfig,

    /// Log level
    pub log_level: String,

    /// Enable Swagger UI
    pub enable_swagger: bool,

    /// Broker configuration
    pub kiln: KilnConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            internal_host: "127.0.0.1".to_string(),
            internal_port: 3001,
            cors: CorsConfig::default(),
            log_level: "info".to_string(),
            enable_swagger: true,
            kiln: KilnConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Convert to SocketAddr
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        parse_addr(&self.host, self.port)
    }

    /// Address of the internal listener
    pub fn internal_socket_addr(&self) -> anyhow::Result<SocketAddr> {
        parse_addr(&self.internal_host, self.internal_port)
    }

    /// Load from configuration file
    pub fn load_from_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;
        config.kiln.validate()?;

        Ok(config)
    }
}

fn parse_addr(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let addr = format!("{}:{}", host, port);
    addr.parse()
        .map_err(|e| anyhow::anyhow!("Invalid address {}: {}", addr, e))
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins
    pub allowed_origins: Vec<String>,

    /// Allow any origin
    pub allow_any_origin: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![],
            allow_any_origin: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addresses() {
        let config = ApiConfig::default();
        assert_eq!(config.socket_addr().unwrap().port(), 3000);
        assert_eq!(config.internal_socket_addr().unwrap().port(), 3001);

        let bad = ApiConfig {
            host: "not a host".to_string(),
            ..Default::default()
        };
        assert!(bad.socket_addr().is_err());
    }

    #[test]
    fn test_nested_kiln_section() {
        let config: ApiConfig = serde_json::from_str(
            r#"{"port": 8080, "kiln": {"inference": {"min_survival_secs": 200}}}"#,
        )
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.kiln.inference.min_survival_secs, 200);
        assert_eq!(config.internal_port, 3001);
    }
}
