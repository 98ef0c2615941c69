//! Manages application configuration loaded from environment variables.
//!
//! This module defines the `Config` struct which holds all runtime settings
//! and provides the `from_env` function to populate this struct. It supports
//! loading variables from a `.env` file via the `dotenv` crate and provides
//! default values for optional settings, following the loading style of the
//! original MailLaser `Config::from_env` (dotenv, `anyhow::Context`, and a
//! log line per resolved field).

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::env;

/// `/etc/services` gives `smtp` → 25 and `http` → 80 on every POSIX system;
/// there is no portable Rust equivalent of `getservbyname`, so these are
/// hard-coded as the fallback when the env var is unset (spec.md §6).
const DEFAULT_SMTP_PORT: &str = "25";
const DEFAULT_HTTP_PORT: &str = "80";

/// Holds the application's runtime configuration settings.
///
/// These settings are typically loaded from environment variables via `from_env`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// The address both servers bind to. (Optional: `MAILMOCK_LISTEN_ADDR`, Default: "" — all interfaces)
    pub listen_addr: String,

    /// The SMTP server's port. (Optional: `MAILMOCK_SMTP_PORT`, Default: the `smtp` service, 25)
    pub smtp_port: u16,

    /// The HTTP query API's port. (Optional: `MAILMOCK_HTTP_PORT`, Default: the `http` service, 80)
    pub http_port: u16,

    /// The hostname substituted into the `<domain>` placeholder of greeting
    /// and closing banners. Resolved once at startup; falls back to
    /// `"localhost"` if the OS hostname is unavailable or not valid UTF-8.
    pub hostname: String,
}

impl Config {
    /// Loads configuration settings from environment variables.
    ///
    /// Reads the `MAILMOCK_*` variables. Supports loading from a `.env` file
    /// if present. Provides default values for bind address and ports if not
    /// specified. Logs the configuration values being used.
    ///
    /// # Errors
    ///
    /// Returns an `Err` if `MAILMOCK_SMTP_PORT` or `MAILMOCK_HTTP_PORT` are
    /// set but cannot be parsed as `u16`.
    pub fn from_env() -> Result<Self> {
        // Attempt to load variables from a .env file, if it exists. Ignore errors.
        let _ = dotenv::dotenv();

        let listen_addr = env::var("MAILMOCK_LISTEN_ADDR").unwrap_or_default();
        log::info!("Config: Using listen_addr: {:?} (empty = all interfaces)", listen_addr);

        let smtp_port_str =
            env::var("MAILMOCK_SMTP_PORT").unwrap_or_else(|_| DEFAULT_SMTP_PORT.to_string());
        let smtp_port = smtp_port_str.parse::<u16>().map_err(|e| {
            log::error!("MAILMOCK_SMTP_PORT ('{smtp_port_str}') must be a valid u16: {e}");
            anyhow!(e).context(format!(
                "MAILMOCK_SMTP_PORT ('{smtp_port_str}') must be a valid u16 port number"
            ))
        })?;
        log::info!("Config: Using smtp_port: {smtp_port}");

        let http_port_str =
            env::var("MAILMOCK_HTTP_PORT").unwrap_or_else(|_| DEFAULT_HTTP_PORT.to_string());
        let http_port = http_port_str.parse::<u16>().map_err(|e| {
            log::error!("MAILMOCK_HTTP_PORT ('{http_port_str}') must be a valid u16: {e}");
            anyhow!(e).context(format!(
                "MAILMOCK_HTTP_PORT ('{http_port_str}') must be a valid u16 port number"
            ))
        })?;
        log::info!("Config: Using http_port: {http_port}");

        let hostname = gethostname::gethostname()
            .into_string()
            .unwrap_or_else(|_| "localhost".to_string());
        log::info!("Config: Using hostname: {hostname}");

        Ok(Config {
            listen_addr,
            smtp_port,
            http_port,
            hostname,
        })
    }

    /// The host to actually bind listeners to: `listen_addr` is stored
    /// exactly as the spec's env var describes it (empty = all interfaces),
    /// but an empty string is not a resolvable `ToSocketAddrs` host, so
    /// binding code should go through this instead of the raw field.
    pub fn bind_host(&self) -> &str {
        if self.listen_addr.is_empty() {
            "0.0.0.0"
        } else {
            &self.listen_addr
        }
    }
}
