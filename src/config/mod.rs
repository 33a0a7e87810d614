//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files and
//! carry the documented defaults, so `ServerConfig::default()` is a working
//! configuration.

pub mod loader;

use serde::{Deserialize, Serialize};

pub use loader::{load_client_config, load_server_config, ConfigError, ValidationError};

/// Server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Read buffer capacity per connection, in bytes.
    pub buffer_capacity: usize,

    /// Worker pool settings for accepted connections.
    pub pool: PoolConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            buffer_capacity: 4096,
            pool: PoolConfig::default(),
        }
    }
}

/// Worker pool configuration.
///
/// One worker drives one accepted connection per accept listener. Pool growth
/// is driven strictly by concurrent demand; there is no work queue. When the
/// bound is reached, `overflow` decides what happens to the next unit.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum concurrent workers. `None` means unbounded.
    pub max_workers: Option<usize>,

    /// What to do with a unit of work when all workers are busy.
    pub overflow: OverflowPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: None,
            overflow: OverflowPolicy::Wait,
        }
    }
}

/// Backpressure policy for a saturated worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Hold the submitting task (the accept loop) until a slot frees up.
    Wait,
    /// Refuse the unit immediately; the connection it carried is dropped.
    Reject,
}

/// Client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Remote address to connect to (e.g., "127.0.0.1:8080").
    pub remote_address: String,

    /// Read buffer capacity, in bytes.
    pub buffer_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            remote_address: "127.0.0.1:8080".to_string(),
            buffer_capacity: 4096,
        }
    }
}
