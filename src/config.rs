//! Client-side configuration.
//!
//! Loading this from environment, CLI flags, or a config file is an external
//! collaborator's job — this crate only defines the shape.

use serde::Deserialize;

/// Default TCP port the device server listens on.
pub const DEFAULT_PORT: u16 = 5959;

/// Default IP the device server is reachable at.
pub const DEFAULT_IP: &str = "127.0.0.1";

/// Default number of blocks the [`crate::cache::Cache`] can hold.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub ip: String,
    pub port: u16,
    pub cache_capacity: usize,
    /// When true, every BLOCK_XFER payload is AES-128-CBC encrypted.
    pub encrypted: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ip: DEFAULT_IP.to_string(),
            port: DEFAULT_PORT,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            encrypted: false,
        }
    }
}
