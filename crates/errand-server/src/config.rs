//! Server configuration loaded from environment variables.
//!
//! Required: `ERRAND_TOKEN_SECRET` (at least 32 characters, not a
//! placeholder). Optional: `ERRAND_DB_PATH`, `ERRAND_HOST`, `ERRAND_PORT`,
//! `ERRAND_TOKEN_TTL_DAYS`, `ERRAND_BASE_PRICE`, `ERRAND_DELIVERY_CHARGE`,
//! `ERRAND_SERVICE_RATE`, and the bootstrap admin pair
//! `ERRAND_ADMIN_USERNAME` / `ERRAND_ADMIN_PASSWORD`.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use rust_decimal::Decimal;
use thiserror::Error;

use errand_types::pricing::{Pricing, PricingError};

const MIN_SECRET_LENGTH: usize = 32;

/// Fragments that mark a secret copied from an example file.
const PLACEHOLDER_PATTERNS: &[&str] = &["changeme", "change-me", "placeholder", "your-", "secret-here"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(&'static str, String),

    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(&'static str, String),
}

pub struct AdminBootstrap {
    pub username: String,
    pub password: String,
}

pub struct ServerConfig {
    pub token_secret: String,
    pub db_path: PathBuf,
    pub host: IpAddr,
    pub port: u16,
    pub token_ttl_days: i64,
    pub pricing: Pricing,
    pub admin: Option<AdminBootstrap>,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("token_secret", &"<redacted>")
            .field("db_path", &self.db_path)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("token_ttl_days", &self.token_ttl_days)
            .field("pricing", &self.pricing)
            .field("admin", &self.admin.as_ref().map(|a| &a.username))
            .finish()
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let token_secret = get("ERRAND_TOKEN_SECRET").ok_or(ConfigError::MissingEnvVar("ERRAND_TOKEN_SECRET"))?;
        validate_secret(&token_secret, "ERRAND_TOKEN_SECRET")?;

        let db_path = PathBuf::from(get("ERRAND_DB_PATH").unwrap_or_else(|| "errand.db".into()));
        let host = parse_or("ERRAND_HOST", get("ERRAND_HOST"), IpAddr::from([0, 0, 0, 0]))?;
        let port = parse_or("ERRAND_PORT", get("ERRAND_PORT"), 3000u16)?;
        let token_ttl_days = parse_or("ERRAND_TOKEN_TTL_DAYS", get("ERRAND_TOKEN_TTL_DAYS"), 30i64)?;
        if token_ttl_days <= 0 {
            return Err(ConfigError::InvalidEnvVar(
                "ERRAND_TOKEN_TTL_DAYS",
                "must be positive".into(),
            ));
        }

        let defaults = Pricing::default();
        let base_price = parse_or("ERRAND_BASE_PRICE", get("ERRAND_BASE_PRICE"), defaults.base_price())?;
        let delivery_charge = parse_or(
            "ERRAND_DELIVERY_CHARGE",
            get("ERRAND_DELIVERY_CHARGE"),
            defaults.delivery_charge(),
        )?;
        let service_rate: Decimal =
            parse_or("ERRAND_SERVICE_RATE", get("ERRAND_SERVICE_RATE"), defaults.service_rate())?;
        let pricing = Pricing::new(base_price, delivery_charge, service_rate).map_err(|e| {
            let key = match &e {
                PricingError::InvalidRate => "ERRAND_SERVICE_RATE",
                PricingError::Negative(field)
                | PricingError::TooPrecise(field)
                | PricingError::TooLarge(field)
                    if *field == "delivery charge" =>
                {
                    "ERRAND_DELIVERY_CHARGE"
                }
                _ => "ERRAND_BASE_PRICE",
            };
            ConfigError::InvalidEnvVar(key, e.to_string())
        })?;

        let admin = match (get("ERRAND_ADMIN_USERNAME"), get("ERRAND_ADMIN_PASSWORD")) {
            (Some(username), Some(password)) => Some(AdminBootstrap { username, password }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::MissingEnvVar("ERRAND_ADMIN_PASSWORD")),
            (None, Some(_)) => return Err(ConfigError::MissingEnvVar("ERRAND_ADMIN_USERNAME")),
        };

        Ok(Self {
            token_secret,
            db_path,
            host,
            port,
            token_ttl_days,
            pricing,
            admin,
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match raw {
        Some(raw) => raw
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key, e.to_string())),
        None => Ok(default),
    }
}

fn validate_secret(secret: &str, key: &'static str) -> Result<(), ConfigError> {
    if secret.chars().count() < MIN_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            key,
            format!("must be at least {MIN_SECRET_LENGTH} characters"),
        ));
    }
    let lower = secret.to_lowercase();
    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(ConfigError::InsecureSecret(
            key,
            format!("appears to be a placeholder (contains '{pattern}')"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const GOOD_SECRET: &str = "q8Zr4mTn2VxL9pWc7KbY3hJd6FsA1gEu";

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ServerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[("ERRAND_TOKEN_SECRET", GOOD_SECRET)]).unwrap();
        assert_eq!(cfg.db_path, PathBuf::from("errand.db"));
        assert_eq!(cfg.socket_addr().to_string(), "0.0.0.0:3000");
        assert_eq!(cfg.token_ttl_days, 30);
        assert_eq!(cfg.pricing, Pricing::default());
        assert!(cfg.admin.is_none());
    }

    #[test]
    fn test_missing_secret() {
        let err = config(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar("ERRAND_TOKEN_SECRET")));
    }

    #[test]
    fn test_weak_secrets_rejected() {
        let err = config(&[("ERRAND_TOKEN_SECRET", "short")]).unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));

        let err = config(&[("ERRAND_TOKEN_SECRET", "changeme-changeme-changeme-changeme")]).unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_pricing_overrides() {
        let cfg = config(&[
            ("ERRAND_TOKEN_SECRET", GOOD_SECRET),
            ("ERRAND_BASE_PRICE", "120.00"),
            ("ERRAND_SERVICE_RATE", "0.10"),
        ])
        .unwrap();
        assert_eq!(cfg.pricing.base_price(), Decimal::new(12_000, 2));
        assert_eq!(cfg.pricing.service_rate(), Decimal::new(10, 2));

        let err = config(&[("ERRAND_TOKEN_SECRET", GOOD_SECRET), ("ERRAND_PORT", "http")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar("ERRAND_PORT", _)));

        let err = config(&[("ERRAND_TOKEN_SECRET", GOOD_SECRET), ("ERRAND_SERVICE_RATE", "1.5")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar("ERRAND_SERVICE_RATE", _)));
    }

    #[test]
    fn test_admin_requires_both_values() {
        let err = config(&[("ERRAND_TOKEN_SECRET", GOOD_SECRET), ("ERRAND_ADMIN_USERNAME", "root")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar("ERRAND_ADMIN_PASSWORD")));

        let cfg = config(&[
            ("ERRAND_TOKEN_SECRET", GOOD_SECRET),
            ("ERRAND_ADMIN_USERNAME", "root"),
            ("ERRAND_ADMIN_PASSWORD", "hunter22"),
        ])
        .unwrap();
        assert_eq!(cfg.admin.unwrap().username, "root");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let cfg = config(&[("ERRAND_TOKEN_SECRET", GOOD_SECRET)]).unwrap();
        assert!(!format!("{cfg:?}").contains(GOOD_SECRET));
    }
}
