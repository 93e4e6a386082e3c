use std::{env, fmt::Display, net::SocketAddr, str::FromStr};

use chrono::Duration;
use tracing::{info, warn};

use crate::errors::{Error, Result};

const DEFAULT_POOL_MIN: usize = 1;
const DEFAULT_POOL_MAX: usize = 100;
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";
// Matches the 31 day lifetime browsers usually see for "permanent" sessions.
const DEFAULT_SESSION_TTL_HOURS: i64 = 744;

/// Where the guest book lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseUrl {
    /// `file:<path>`
    Local(String),
    /// `libsql://`, `https://` or `http://` servers.
    Remote { url: String, auth_token: String },
}

impl DatabaseUrl {
    pub fn parse(raw: &str, auth_token: Option<String>) -> Result<Self> {
        let raw = raw.trim();
        if let Some(path) = raw.strip_prefix("file:") {
            if path.is_empty() {
                return Err(invalid("DATABASE_URL", "file: URL has no path"));
            }
            return Ok(DatabaseUrl::Local(path.to_string()));
        }
        let remote = ["libsql://", "https://", "http://"]
            .iter()
            .any(|scheme| raw.starts_with(scheme) && raw.len() > scheme.len());
        if remote {
            return Ok(DatabaseUrl::Remote {
                url: raw.to_string(),
                auth_token: auth_token.unwrap_or_default(),
            });
        }
        Err(invalid(
            "DATABASE_URL",
            "expected file:<path>, libsql://, https:// or http://",
        ))
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// OpenID issuer; discovery is fetched from
    /// `<issuer>/.well-known/openid-configuration`.
    pub issuer_url: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: DatabaseUrl,
    pub pool_min: usize,
    pub pool_max: usize,
    pub create_schema: bool,
    pub session_secret: String,
    pub session_ttl: Duration,
    pub bind_addr: SocketAddr,
    pub public_url: String,
    pub auth: Option<AuthConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let raw_url = var("DATABASE_URL").ok_or(Error::MissingEnv("DATABASE_URL"))?;
        let database_url = DatabaseUrl::parse(&raw_url, var("DATABASE_AUTH_TOKEN"))?;

        let pool_min = parse_or("DATABASE_POOL_MIN", var("DATABASE_POOL_MIN"), DEFAULT_POOL_MIN)?;
        let pool_max = parse_or("DATABASE_POOL_MAX", var("DATABASE_POOL_MAX"), DEFAULT_POOL_MAX)?;
        if pool_max == 0 {
            return Err(invalid("DATABASE_POOL_MAX", "must be at least 1"));
        }
        if pool_min > pool_max {
            return Err(invalid(
                "DATABASE_POOL_MIN",
                format!("{pool_min} is larger than DATABASE_POOL_MAX ({pool_max})"),
            ));
        }
        let create_schema =
            parse_or("DATABASE_CREATE_SCHEMA", var("DATABASE_CREATE_SCHEMA"), false)?;

        let session_secret = var("SESSION_SECRET")
            .or_else(|| var("FLASK_SECRET"))
            .ok_or(Error::MissingEnv("SESSION_SECRET"))?;
        let session_ttl_hours = parse_or(
            "SESSION_TTL_HOURS",
            var("SESSION_TTL_HOURS"),
            DEFAULT_SESSION_TTL_HOURS,
        )?;
        let session_ttl = Duration::try_hours(session_ttl_hours)
            .filter(|ttl| *ttl > Duration::zero())
            .ok_or_else(|| invalid("SESSION_TTL_HOURS", "must be a positive number of hours"))?;

        let bind_addr: SocketAddr = parse_or(
            "BIND_ADDR",
            var("BIND_ADDR"),
            DEFAULT_BIND_ADDR.parse().map_err(|e| invalid("BIND_ADDR", e))?,
        )?;
        let public_url = var("PUBLIC_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("http://localhost:{}", bind_addr.port()));

        let auth = match (
            var("AUTH0_DOMAIN"),
            var("AUTH0_CLIENT_ID"),
            var("AUTH0_CLIENT_SECRET"),
        ) {
            (Some(domain), Some(client_id), Some(client_secret)) => Some(AuthConfig {
                issuer_url: issuer_url(&domain, var("AUTH0_ISSUER_URL")),
                client_id,
                client_secret,
            }),
            _ => {
                warn!("AUTH0_DOMAIN, AUTH0_CLIENT_ID or AUTH0_CLIENT_SECRET not set, login disabled");
                None
            }
        };

        Ok(Self {
            database_url,
            pool_min,
            pool_max,
            create_schema,
            session_secret,
            session_ttl,
            bind_addr,
            public_url,
            auth,
        })
    }
}

/// Auth0 issuers are the tenant domain with a trailing slash.
fn issuer_url(domain: &str, explicit: Option<String>) -> String {
    let issuer = explicit.unwrap_or_else(|| {
        let domain = domain.trim().trim_end_matches('/');
        if domain.starts_with("https://") || domain.starts_with("http://") {
            domain.to_string()
        } else {
            format!("https://{domain}")
        }
    });
    format!("{}/", issuer.trim().trim_end_matches('/'))
}

fn parse_or<T: FromStr>(key: &'static str, value: Option<String>, default: T) -> Result<T>
where
    T::Err: Display,
{
    match value {
        Some(raw) => raw.trim().parse().map_err(|e| invalid(key, e)),
        None => {
            info!("{key} not set, using default");
            Ok(default)
        }
    }
}

fn invalid(key: &'static str, reason: impl Display) -> Error {
    Error::InvalidConfig {
        key,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    const MINIMAL: &[(&str, &str)] = &[
        ("DATABASE_URL", "file:guests.db"),
        ("SESSION_SECRET", "s3cret"),
    ];

    #[test]
    fn minimal_environment_uses_defaults() {
        let config = load(MINIMAL).unwrap();
        assert_eq!(config.database_url, DatabaseUrl::Local("guests.db".into()));
        assert_eq!(config.pool_min, 1);
        assert_eq!(config.pool_max, 100);
        assert!(!config.create_schema);
        assert_eq!(config.bind_addr.port(), 3001);
        assert_eq!(config.public_url, "http://localhost:3001");
        assert!(config.auth.is_none());
        assert_eq!(config.session_ttl, Duration::days(31));
    }

    #[test]
    fn missing_database_url_is_fatal() {
        let err = load(&[("SESSION_SECRET", "s3cret")]).unwrap_err();
        assert!(matches!(err, Error::MissingEnv("DATABASE_URL")));

        let err = load(&[("DATABASE_URL", "  "), ("SESSION_SECRET", "s3cret")]).unwrap_err();
        assert!(matches!(err, Error::MissingEnv("DATABASE_URL")));
    }

    #[test]
    fn malformed_database_url_is_fatal() {
        for url in ["postgres://localhost/db", "guests.db", "file:", "libsql://"] {
            let err = load(&[("DATABASE_URL", url), ("SESSION_SECRET", "x")]).unwrap_err();
            assert!(
                matches!(err, Error::InvalidConfig { key: "DATABASE_URL", .. }),
                "{url} should be rejected"
            );
        }
    }

    #[test]
    fn remote_url_carries_auth_token() {
        let config = load(&[
            ("DATABASE_URL", "libsql://guests.turso.io"),
            ("DATABASE_AUTH_TOKEN", "tok"),
            ("SESSION_SECRET", "x"),
        ])
        .unwrap();
        assert_eq!(
            config.database_url,
            DatabaseUrl::Remote {
                url: "libsql://guests.turso.io".into(),
                auth_token: "tok".into()
            }
        );
    }

    #[test]
    fn session_secret_is_required_and_accepts_legacy_alias() {
        let err = load(&[("DATABASE_URL", "file:g.db")]).unwrap_err();
        assert!(matches!(err, Error::MissingEnv("SESSION_SECRET")));

        let config = load(&[("DATABASE_URL", "file:g.db"), ("FLASK_SECRET", "legacy")]).unwrap();
        assert_eq!(config.session_secret, "legacy");
    }

    #[test]
    fn pool_bounds_are_validated() {
        let mut pairs = MINIMAL.to_vec();
        pairs.push(("DATABASE_POOL_MIN", "5"));
        pairs.push(("DATABASE_POOL_MAX", "2"));
        assert!(matches!(
            load(&pairs).unwrap_err(),
            Error::InvalidConfig { key: "DATABASE_POOL_MIN", .. }
        ));

        let mut pairs = MINIMAL.to_vec();
        pairs.push(("DATABASE_POOL_MIN", "0"));
        pairs.push(("DATABASE_POOL_MAX", "0"));
        assert!(matches!(
            load(&pairs).unwrap_err(),
            Error::InvalidConfig { key: "DATABASE_POOL_MAX", .. }
        ));

        let mut pairs = MINIMAL.to_vec();
        pairs.push(("DATABASE_POOL_MAX", "many"));
        assert!(matches!(
            load(&pairs).unwrap_err(),
            Error::InvalidConfig { key: "DATABASE_POOL_MAX", .. }
        ));
    }

    #[test]
    fn auth_requires_all_three_values() {
        let mut pairs = MINIMAL.to_vec();
        pairs.push(("AUTH0_DOMAIN", "tenant.auth0.com"));
        pairs.push(("AUTH0_CLIENT_ID", "abc"));
        assert!(load(&pairs).unwrap().auth.is_none());

        pairs.push(("AUTH0_CLIENT_SECRET", "shh"));
        pairs.push(("PUBLIC_URL", "https://guests.example.com/"));
        let config = load(&pairs).unwrap();
        let auth = config.auth.unwrap();
        assert_eq!(auth.issuer_url, "https://tenant.auth0.com/");
        assert_eq!(config.public_url, "https://guests.example.com");
    }

    #[test]
    fn issuer_can_be_overridden() {
        let mut pairs = MINIMAL.to_vec();
        pairs.push(("AUTH0_DOMAIN", "tenant.auth0.com"));
        pairs.push(("AUTH0_CLIENT_ID", "abc"));
        pairs.push(("AUTH0_CLIENT_SECRET", "shh"));
        pairs.push(("AUTH0_ISSUER_URL", "http://127.0.0.1:9000"));
        let auth = load(&pairs).unwrap().auth.unwrap();
        assert_eq!(auth.issuer_url, "http://127.0.0.1:9000/");
    }
}
