use std::{fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use tracing::info;

// ============================================================================
// Runtime Configuration - loaded once from the environment
// ============================================================================

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub database_url: String,
    pub database_max_connections: u32,
    pub upload_dir: PathBuf,
    pub public_base_url: String,
    pub frontend_url: String,
    pub gateway: GatewayConfig,
    pub sessions: SessionConfig,
    /// First admin account, created at startup while no admin exists.
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

#[derive(Clone)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub secret_key: String,
    pub public_key: Option<String>,
    /// Webhooks are rejected outright while this is unset.
    pub webhook_secret: Option<String>,
    pub webhook_tolerance: Duration,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub ttl: chrono::Duration,
    pub remember_me_ttl: chrono::Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let session_hours: i64 = try_load(&lookup, "SESSION_TTL_HOURS", "24")?;
        let remember_days: i64 = try_load(&lookup, "REMEMBER_ME_TTL_DAYS", "30")?;
        let tolerance_secs: u64 = try_load(&lookup, "WEBHOOK_TOLERANCE_SECS", "300")?;

        let bootstrap_admin = match (optional(&lookup, "ADMIN_EMAIL"), optional(&lookup, "ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(BootstrapAdmin { email, password }),
            (None, None) => None,
            _ => bail!("ADMIN_EMAIL and ADMIN_PASSWORD must be set together"),
        };

        Ok(Self {
            bind_addr: try_load(&lookup, "BIND_ADDR", "0.0.0.0:4000")?,
            database_url: required(&lookup, "DATABASE_URL")?,
            database_max_connections: try_load(&lookup, "DATABASE_MAX_CONNECTIONS", "10")?,
            upload_dir: PathBuf::from(try_load::<String, _>(&lookup, "UPLOAD_DIR", "uploads")?),
            public_base_url: trim_slash(try_load(&lookup, "PUBLIC_BASE_URL", "http://localhost:4000")?),
            frontend_url: trim_slash(try_load(&lookup, "FRONTEND_URL", "http://localhost:3000")?),
            gateway: GatewayConfig {
                base_url: trim_slash(try_load(
                    &lookup,
                    "PAYMONGO_BASE_URL",
                    "https://api.paymongo.com/v1",
                )?),
                secret_key: required(&lookup, "PAYMONGO_SECRET_KEY")?,
                public_key: optional(&lookup, "PAYMONGO_PUBLIC_KEY"),
                webhook_secret: optional(&lookup, "PAYMONGO_WEBHOOK_SECRET"),
                webhook_tolerance: Duration::from_secs(tolerance_secs),
            },
            sessions: SessionConfig {
                ttl: chrono::Duration::hours(session_hours),
                remember_me_ttl: chrono::Duration::days(remember_days),
            },
            bootstrap_admin,
        })
    }
}

fn try_load<T, F>(lookup: &F, key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.parse()
        .map_err(|e| anyhow!("Invalid {key} value {raw:?}: {e}"))
}

fn required<F>(lookup: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, key).with_context(|| format!("Environment variable {key} is required"))
}

fn optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|v| !v.trim().is_empty())
}

fn trim_slash(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
