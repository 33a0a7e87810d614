//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound TCP connection
//!     → server.rs (accept loop, per-listener fan-out)
//!     → connection.rs (readiness loop, listener dispatch)
//!
//! Outbound TCP connection
//!     → client.rs (connect sequencer)
//!     → connection.rs (readiness loop on the calling task)
//! ```

pub mod client;
pub mod connection;
pub mod server;
