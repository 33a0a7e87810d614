//! Error taxonomy for connection handling.
//!
//! Three failure classes cross the public API:
//! - [`Error::Io`]: a transport failure (bind, connect, read, write).
//! - [`Error::Listener`]: a registered callback failed; distinguishes "my
//!   own listener misbehaved" from a transport problem. Always results in
//!   connection closure.
//! - [`Error::InvalidState`]: an operation was called at the wrong point in
//!   a lifecycle (`start` twice, accessors before `connect`, ...). Fatal to
//!   the call, never to the process.

use thiserror::Error;

/// Boxed error returned by listener callbacks.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced by servers, clients and connections.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport failure on the underlying socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A listener callback failed during dispatch.
    #[error("listener failed in {stage}: {source}")]
    Listener {
        /// Which callback failed (`on_connect`, `on_message`, ...).
        stage: &'static str,
        #[source]
        source: CallbackError,
    },

    /// An operation was invoked in the wrong lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}

impl Error {
    pub(crate) fn listener(stage: &'static str, source: CallbackError) -> Self {
        Error::Listener { stage, source }
    }

    /// True if this error came out of a listener callback rather than the
    /// transport.
    pub fn is_listener_failure(&self) -> bool {
        matches!(self, Error::Listener { .. })
    }
}

/// Result type for connection-handling operations.
pub type Result<T> = std::result::Result<T, Error>;
