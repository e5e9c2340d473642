//! Server configuration.
//!
//! Read from the environment with sensible defaults; command-line plumbing
//! stays out of the core.

use std::net::SocketAddr;
use std::path::PathBuf;

/// Runtime configuration for one server instance.
#[derive(Debug, Clone)]
pub struct Config {
    /// On-disk store root.
    pub data_dir: PathBuf,
    /// HTTP admin surface bind address.
    pub http_addr: SocketAddr,
    /// Binary TCP protocol bind address.
    pub tcp_addr: SocketAddr,
    /// Federated issuer JWKS endpoint polled by the key refresher.
    pub issuer_certs_url: String,
    /// Expected `iss` claim, when issuer validation is wanted.
    pub issuer: Option<String>,
    /// Expected `aud` claim, when audience validation is wanted.
    pub audience: Option<String>,
    /// Identity string hashed into every header this instance commits.
    pub server_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/tmp/Beehive"),
            http_addr: "127.0.0.1:8080".parse().expect("default http addr"),
            tcp_addr: "127.0.0.1:9999".parse().expect("default tcp addr"),
            issuer_certs_url: "https://www.googleapis.com/oauth2/v3/certs".to_string(),
            issuer: None,
            audience: None,
            server_name: "beehive".to_string(),
        }
    }
}

impl Config {
    /// Build a configuration from `BEEHIVE_*` environment variables,
    /// falling back to the defaults above.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            data_dir: std::env::var("BEEHIVE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            http_addr: std::env::var("BEEHIVE_HTTP_ADDR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.http_addr),
            tcp_addr: std::env::var("BEEHIVE_TCP_ADDR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.tcp_addr),
            issuer_certs_url: std::env::var("BEEHIVE_ISSUER_CERTS")
                .unwrap_or(defaults.issuer_certs_url),
            issuer: std::env::var("BEEHIVE_ISSUER").ok(),
            audience: std::env::var("BEEHIVE_AUDIENCE").ok(),
            server_name: std::env::var("BEEHIVE_SERVER_NAME").unwrap_or(defaults.server_name),
        }
    }
}
