use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::warn;

const DEV_SECRET: &str = "dev-secret-change-me";

/// Process configuration, read from `MURMUR_*` environment variables
/// (after `.env`, if present, has been loaded).
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub production: bool,
    /// SPA origin allowed to make credentialed requests. `None` = permissive CORS without credentials.
    pub cors_origin: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host = get("MURMUR_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = match get("MURMUR_PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("MURMUR_PORT is not a valid port: {}", raw))?,
            None => 5001,
        };
        let db_path = PathBuf::from(get("MURMUR_DB_PATH").unwrap_or_else(|| "murmur.db".into()));

        let production = match get("MURMUR_ENV").as_deref() {
            None | Some("development") => false,
            Some("production") => true,
            Some(other) => anyhow::bail!("MURMUR_ENV must be 'development' or 'production', got '{}'", other),
        };

        let jwt_secret = match get("MURMUR_JWT_SECRET") {
            Some(secret) if !secret.is_empty() => secret,
            _ if production => anyhow::bail!("MURMUR_JWT_SECRET must be set in production"),
            _ => {
                warn!("MURMUR_JWT_SECRET not set, using the development secret");
                DEV_SECRET.into()
            }
        };

        let cors_origin = get("MURMUR_CORS_ORIGIN").filter(|o| !o.trim().is_empty());

        Ok(Self {
            host,
            port,
            db_path,
            jwt_secret,
            production,
            cors_origin,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }
}
