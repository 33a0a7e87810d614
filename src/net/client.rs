//! Connect sequencer.
//!
//! # Responsibilities
//! - Open one outbound connection and drive it on the calling task
//! - Replay listeners registered before `connect` onto the live handle
//! - Fire `on_connect` before the first possible `on_message`
//! - Delegate per-connection operations to the live handle afterwards

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::net::TcpStream;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::events::ConnectionListener;
use crate::net::connection::Connection;

/// Connection lifecycle state of a [`Client`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientState {
    Unconnected,
    Connecting,
    Connected,
    Closed,
}

/// An event-driven TCP client.
///
/// `connect()` blocks (awaits) until the connection has been completely
/// handled, so register listeners before calling it. Operations like
/// [`Client::send`] are meant to be called from within listener callbacks or
/// from other tasks holding the client while `connect` runs.
pub struct Client {
    config: ClientConfig,
    state: Mutex<ClientState>,
    /// Listeners registered before the connection exists.
    pending: Mutex<Vec<Box<dyn ConnectionListener>>>,
    connection: Mutex<Option<Arc<Connection>>>,
}

impl Client {
    /// Create a new client prepared to connect to the configured address.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            state: Mutex::new(ClientState::Unconnected),
            pending: Mutex::new(Vec::new()),
            connection: Mutex::new(None),
        }
    }

    /// Register a listener.
    ///
    /// Before `connect` the listener is queued and replayed onto the handle
    /// in registration order; afterwards it is forwarded to the live handle
    /// directly.
    pub fn add_listener(&self, listener: Box<dyn ConnectionListener>) -> &Self {
        // Lock order: pending before the connection slot. `connect` holds
        // both while moving queued listeners onto the handle, so checking the
        // slot under the pending lock cannot race that hand-over.
        let mut pending = self.pending.lock().expect("pending listener lock poisoned");
        let connection = self
            .connection
            .lock()
            .expect("connection slot lock poisoned")
            .clone();
        match connection {
            Some(connection) => {
                drop(pending);
                connection.add_listener(listener);
            }
            None => pending.push(listener),
        }
        self
    }

    /// Connect and handle the connection until it ends.
    ///
    /// Valid only once: a second call fails with an invalid-state error.
    /// Fires `on_connect` to all listeners in order before the read loop
    /// starts; a failing connect listener aborts the whole attempt. Failures
    /// inside the read loop are delivered to listeners via `on_error` and are
    /// not returned here; the method returns `Ok` once the connection has
    /// run its course.
    pub async fn connect(&self) -> Result<()> {
        {
            let mut state = self.state.lock().expect("state lock poisoned");
            if *state != ClientState::Unconnected {
                return Err(Error::InvalidState("client already in use"));
            }
            *state = ClientState::Connecting;
        }

        tracing::debug!(remote = %self.config.remote_address, "connecting");

        let stream = match TcpStream::connect(&self.config.remote_address).await {
            Ok(stream) => stream,
            Err(e) => {
                // The connection never existed; allow another attempt.
                self.set_state(ClientState::Unconnected);
                return Err(Error::Io(e));
            }
        };

        let connection = match stream
            .into_std()
            .map_err(Error::Io)
            .and_then(|socket| Connection::new(socket, self.config.buffer_capacity))
        {
            Ok(connection) => connection,
            Err(e) => {
                self.set_state(ClientState::Unconnected);
                return Err(e);
            }
        };

        {
            // Replay queued listeners and publish the handle in one step so a
            // concurrent `add_listener` lands either in the queue or on the
            // handle, never in between.
            let mut pending = self.pending.lock().expect("pending listener lock poisoned");
            let mut slot = self.connection.lock().expect("connection slot lock poisoned");
            for listener in pending.drain(..) {
                connection.add_listener(listener);
            }
            *slot = Some(Arc::clone(&connection));
        }
        self.set_state(ClientState::Connected);

        tracing::info!(
            connection_id = %connection.id(),
            peer = %connection.peer_addr(),
            "client connected"
        );

        if let Err(e) = connection.dispatch_connect() {
            // Abort before the read loop starts.
            if let Err(close_err) = connection.close() {
                tracing::warn!(
                    connection_id = %connection.id(),
                    error = %close_err,
                    "close after failed connect dispatch failed"
                );
            }
            self.set_state(ClientState::Closed);
            return Err(e);
        }

        if let Err(cause) = connection.run().await {
            tracing::error!(
                connection_id = %connection.id(),
                error = %cause,
                "connection failed"
            );
            if let Err(e) = connection.fail(&cause) {
                tracing::error!(
                    connection_id = %connection.id(),
                    error = %e,
                    "error during on_error dispatch"
                );
            }
        }

        self.set_state(ClientState::Closed);
        tracing::debug!(connection_id = %connection.id(), "client finished");
        Ok(())
    }

    /// Write as many bytes as the socket accepts without blocking.
    pub fn send(&self, bytes: &[u8]) -> Result<usize> {
        self.with_connection(|connection| connection.send(bytes))
    }

    /// Close the connection.
    pub fn close(&self) -> Result<()> {
        self.with_connection(|connection| connection.close())
    }

    /// Stop delivering `on_message` until [`Client::resume_messages`].
    pub fn suspend_messages(&self) -> Result<()> {
        self.with_connection(|connection| {
            connection.suspend_messages();
            Ok(())
        })
    }

    /// Resume message delivery.
    pub fn resume_messages(&self) -> Result<()> {
        self.with_connection(|connection| {
            connection.resume_messages();
            Ok(())
        })
    }

    /// The remote peer's address.
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.with_connection(|connection| Ok(connection.peer_addr()))
    }

    /// Whether the connection is open.
    pub fn is_open(&self) -> Result<bool> {
        self.with_connection(|connection| Ok(connection.is_open()))
    }

    /// Read buffer capacity, in bytes.
    pub fn buffer_capacity(&self) -> usize {
        self.config.buffer_capacity
    }

    fn with_connection<T>(&self, op: impl FnOnce(&Arc<Connection>) -> Result<T>) -> Result<T> {
        // Clone the handle out so the slot lock is not held during the
        // operation; listener callbacks call back in through here while the
        // dispatch loop runs.
        let connection = self
            .connection
            .lock()
            .expect("connection slot lock poisoned")
            .clone();
        match connection {
            Some(connection) => op(&connection),
            None => Err(Error::InvalidState("client not connected yet")),
        }
    }

    fn set_state(&self, next: ClientState) {
        *self.state.lock().expect("state lock poisoned") = next;
    }
}
