//! Event-driven TCP connection handling.
//!
//! A server accepts inbound connections and a client opens outbound ones;
//! both expose the same per-connection listener protocol (connect / message /
//! close / error) on top of a non-blocking, readiness-driven read loop with
//! explicit flow control (suspend / resume).
//!
//! # Data Flow
//! ```text
//! Inbound:
//!     Server::start (accept loop)
//!         → one worker per (connection × accept listener), via WorkerPool
//!         → AcceptListener::on_incoming_client (register listeners here)
//!         → Connection::run (readiness loop)
//!         → ConnectionListener::on_message / on_close / on_error
//!
//! Outbound:
//!     Client::connect (blocks for the connection's lifetime)
//!         → ConnectionListener::on_connect
//!         → Connection::run on the calling task
//!         → ConnectionListener::on_message / on_close / on_error
//! ```
//!
//! Listener callbacks fire synchronously from the task driving the
//! connection, in registration order. A failing callback terminates the
//! connection: every listener is told via `on_error`, then the socket is
//! closed.

// Core subsystems
pub mod config;
pub mod error;
pub mod events;
pub mod net;
pub mod pool;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::{ClientConfig, OverflowPolicy, PoolConfig, ServerConfig};
pub use error::{CallbackError, Error, Result};
pub use events::{AcceptListener, ConnectionListener};
pub use net::client::Client;
pub use net::connection::{Connection, ConnectionId};
pub use net::server::Server;
pub use pool::WorkerPool;
