//! Listener protocol.
//!
//! Consumers observe a connection by registering listeners. Callbacks are
//! synchronous and run on the task driving the connection, in registration
//! order; a returned error terminates the connection after every listener has
//! been told via `on_error`.

use std::sync::Arc;

use crate::error::{CallbackError, Error};
use crate::net::connection::Connection;

/// Per-connection event listener.
///
/// `on_connect` only ever fires for outbound connections opened through
/// [`Client`](crate::Client); the default implementation is a no-op, so
/// server-side listeners simply leave it alone.
///
/// The `message` slice passed to `on_message` is a view into the connection's
/// reusable read buffer and is only valid for the duration of the call;
/// copy out anything that needs to be retained.
pub trait ConnectionListener: Send {
    /// The outbound connection has been established. Fired once, before the
    /// first possible `on_message`.
    fn on_connect(&mut self) -> std::result::Result<(), CallbackError> {
        Ok(())
    }

    /// A chunk of bytes arrived.
    fn on_message(&mut self, message: &[u8]) -> std::result::Result<(), CallbackError>;

    /// The peer closed the stream. Delivered at most once, and never after
    /// `on_error`.
    fn on_close(&mut self) -> std::result::Result<(), CallbackError>;

    /// The connection failed. Delivered at most once; the socket is closed
    /// right after the full `on_error` pass.
    fn on_error(&mut self, cause: &Error) -> std::result::Result<(), CallbackError>;
}

/// Server-side notification for newly accepted connections.
///
/// One accept listener is invoked once per accepted socket, before any read
/// event can fire. Register [`ConnectionListener`]s on the handle inside
/// this callback so no event is missed.
pub trait AcceptListener: Send + Sync {
    fn on_incoming_client(
        &self,
        connection: &Arc<Connection>,
    ) -> std::result::Result<(), CallbackError>;
}
