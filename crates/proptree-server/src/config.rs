use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

pub const DSN_ENV: &str = "PROPTREE_DSN";
pub const PORT_ENV: &str = "PROPTREE_PORT";
pub const BIND_HOST_ENV: &str = "PROPTREE_BIND_HOST";
pub const SHARED_SECRET_ENV: &str = "PROPTREE_SHARED_SECRET";
pub const TOKEN_TTL_ENV: &str = "PROPTREE_TOKEN_TTL_SECS";

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Store location, e.g. `sqlite:/var/lib/proptree/records.db` or `memory`.
    pub dsn: String,
    /// Secret used to verify bearer tokens. Never logged.
    pub shared_secret: String,
    pub token_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 9418)),
            dsn: "sqlite:proptree.db?mode=rwc".into(),
            shared_secret: String::new(),
            token_ttl_secs: 3600,
        }
    }
}

impl ServerConfig {
    /// Load from `PROPTREE_*` environment variables, falling back to defaults.
    pub fn from_env() -> ServerResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key/value source shaped like the environment.
    pub fn from_lookup<F>(lookup: F) -> ServerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dsn) = lookup(DSN_ENV) {
            config.dsn = dsn;
        }
        if let Some(host) = lookup(BIND_HOST_ENV) {
            let ip: IpAddr = host
                .trim()
                .parse()
                .map_err(|e| ServerError::Config(format!("{BIND_HOST_ENV}={host}: {e}")))?;
            config.bind_addr.set_ip(ip);
        }
        if let Some(port) = lookup(PORT_ENV) {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|e| ServerError::Config(format!("{PORT_ENV}={port}: {e}")))?;
            config.bind_addr.set_port(port);
        }
        if let Some(secret) = lookup(SHARED_SECRET_ENV) {
            config.shared_secret = secret;
        }
        if let Some(ttl) = lookup(TOKEN_TTL_ENV) {
            config.token_ttl_secs = ttl
                .trim()
                .parse()
                .map_err(|e| ServerError::Config(format!("{TOKEN_TTL_ENV}={ttl}: {e}")))?;
        }

        Ok(config)
    }

    /// Load from a TOML file. Missing keys take their defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))
    }

    /// Reject configurations the server cannot start with.
    pub fn validate(&self) -> ServerResult<()> {
        if self.shared_secret.trim().is_empty() {
            return Err(ServerError::Config(format!(
                "shared secret is empty; set {SHARED_SECRET_ENV}"
            )));
        }
        if self.dsn.trim().is_empty() {
            return Err(ServerError::Config(format!("dsn is empty; set {DSN_ENV}")));
        }
        if self.token_ttl_secs == 0 {
            return Err(ServerError::Config("token_ttl_secs must be positive".into()));
        }
        Ok(())
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("dsn", &self.dsn)
            .field("shared_secret", &"******")
            .field("token_ttl_secs", &self.token_ttl_secs)
            .finish()
    }
}
