//! SMTP server configuration.
//!
//! The configuration is a TOML file with a single `[server]` table:
//!
//! ```toml
//! [server]
//! host = "smtp.example.com"
//! port = 465
//! security = "SSL/TLS"
//! username = "someone"
//! ratelimit = 60
//! ```
//!
//! `security` is one of `"SSL/TLS"`, `"STARTTLS"`, `"PLAIN"`, `"XOAUTH"`, or
//! `"Never"`. A username is required for every mode except `Never`.
//! `ratelimit` is the maximum number of messages per 60-second window
//! (0 or absent = unlimited).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MergeError, Result};

/// Transport/authentication strategy for the SMTP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityMode {
    /// TLS-wrapped connection directly on the configured port.
    #[serde(rename = "SSL/TLS")]
    SslTls,
    /// Plaintext connection upgraded via STARTTLS.
    #[serde(rename = "STARTTLS")]
    StartTls,
    /// Plaintext connection with password authentication.
    #[serde(rename = "PLAIN")]
    Plain,
    /// Plaintext connection with OAuth2 bearer-token authentication.
    #[serde(rename = "XOAUTH")]
    Xoauth,
    /// Plaintext connection, no authentication.
    Never,
}

impl SecurityMode {
    /// Whether this mode authenticates (and therefore needs a username
    /// and a secret).
    pub fn requires_auth(self) -> bool {
        !matches!(self, Self::Never)
    }
}

impl std::fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::SslTls => "SSL/TLS",
            Self::StartTls => "STARTTLS",
            Self::Plain => "PLAIN",
            Self::Xoauth => "XOAUTH",
            Self::Never => "Never",
        };
        f.write_str(name)
    }
}

/// Validated SMTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server hostname.
    pub host: String,
    /// Server port (1-65535).
    pub port: u16,
    /// Connection security mode.
    pub security: SecurityMode,
    /// Login username. Required unless `security = "Never"`.
    #[serde(default)]
    pub username: Option<String>,
    /// Maximum messages per 60-second window. 0 = unlimited.
    #[serde(default)]
    pub ratelimit: u32,
}

/// Wrapper matching the `[server]` table in the TOML file.
#[derive(Debug, Serialize, Deserialize)]
struct ConfigFile {
    server: ServerConfig,
}

/// Load and validate the server configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServerConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| MergeError::io(path, e))?;

    let parsed: ConfigFile = toml::from_str(&contents).map_err(|e| MergeError::Config {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let config = parsed.server;
    validate(&config, path)?;
    Ok(config)
}

fn validate(config: &ServerConfig, path: &Path) -> Result<()> {
    if config.port == 0 {
        return Err(MergeError::Config {
            path: path.to_path_buf(),
            reason: "port must be between 1 and 65535".to_string(),
        });
    }

    if config.security.requires_auth() && config.username.is_none() {
        return Err(MergeError::Config {
            path: path.to_path_buf(),
            reason: format!(
                "username is required for security type '{}'",
                config.security
            ),
        });
    }

    Ok(())
}
