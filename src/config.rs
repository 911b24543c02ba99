use anyhow::Context;
use serde::Deserialize;

const DEFAULT_TTL_MINUTES: i64 = 60 * 24;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt: JwtConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source; `from_env` passes the
    /// process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = get("DATABASE_URL")
            .or_else(|| get("DB_URL"))
            .context("DATABASE_URL is not set")?;

        let secret = get("JWT_SECRET").context("JWT_SECRET is not set")?;
        anyhow::ensure!(!secret.is_empty(), "JWT_SECRET must not be empty");

        let ttl_minutes = get("JWT_TTL_MINUTES")
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_TTL_MINUTES);
        anyhow::ensure!(
            ttl_minutes.checked_mul(60).is_some(),
            "JWT_TTL_MINUTES is too large"
        );

        let port = get("APP_PORT")
            .or_else(|| get("PORT"))
            .unwrap_or_else(|| "8080".into())
            .parse::<u16>()
            .context("APP_PORT must be a port number")?;

        Ok(Self {
            database_url,
            host: get("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            jwt: JwtConfig {
                secret,
                ttl_minutes,
            },
        })
    }
}
