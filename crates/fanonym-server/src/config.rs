use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

const MIN_SECRET_LEN: usize = 16;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = get("FANONYM_JWT_SECRET").unwrap_or_default();
        if jwt_secret.len() < MIN_SECRET_LEN || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!(
                "FANONYM_JWT_SECRET is unset, too short or still a placeholder. \
                 It must match the secret of the identity provider that issues tokens."
            );
        }

        let host = get("FANONYM_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = match get("FANONYM_PORT") {
            Some(port) => port
                .parse()
                .with_context(|| format!("FANONYM_PORT '{}' is not a port number", port))?,
            None => 3000,
        };
        let db_path = get("FANONYM_DB_PATH")
            .unwrap_or_else(|| "fanonym.db".into())
            .into();

        Ok(Self {
            host,
            port,
            db_path,
            jwt_secret,
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}
