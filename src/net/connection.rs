//! Connection handle and readiness loop.
//!
//! # Responsibilities
//! - Own one accepted or connected socket and its ordered listener set
//! - Drive the readiness loop: translate readability into listener callbacks
//! - Enforce suspend/resume flow control
//! - Escalate listener failures into the one-shot error-then-close path
//!
//! One task drives one connection; callbacks fire synchronously from that
//! task in registration order, so notifications to a single connection's
//! listeners never interleave.

use std::io;
use std::net::{Shutdown as SocketShutdown, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::BytesMut;
use tokio::io::Interest;
use tokio::net::TcpStream;
use tokio::sync::Notify;

use crate::error::{Error, Result};
use crate::events::ConnectionListener;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

enum ReadEvent {
    /// The peer closed its half of the stream.
    Eof,
    /// Either a message was dispatched or the wakeup was spurious.
    Continue,
}

/// One live connection: the socket, its listeners and its flow-control state.
///
/// Handles are shared (`Arc`) between the task driving the readiness loop and
/// the listener callbacks that send, suspend or close from within their own
/// notifications. Listener registration must happen before the loop consumes
/// events: inside `on_incoming_client` on the server side, before `connect`
/// on the client side.
pub struct Connection {
    id: ConnectionId,
    stream: TcpStream,
    /// Duplicate descriptor used for half-duplex shutdown through `&self`.
    ctl: std::net::TcpStream,
    peer: SocketAddr,
    listeners: Mutex<Vec<Box<dyn ConnectionListener>>>,
    buffer_capacity: usize,
    suspended: AtomicBool,
    resume: Notify,
    open: AtomicBool,
}

impl Connection {
    /// Wrap a connected socket. The socket is switched to non-blocking mode
    /// and owned exclusively by the new handle.
    pub(crate) fn new(stream: std::net::TcpStream, buffer_capacity: usize) -> Result<Arc<Self>> {
        stream.set_nonblocking(true).map_err(Error::Io)?;
        let peer = stream.peer_addr().map_err(Error::Io)?;
        let ctl = stream.try_clone().map_err(Error::Io)?;
        let stream = TcpStream::from_std(stream).map_err(Error::Io)?;

        Ok(Arc::new(Self {
            id: ConnectionId::new(),
            stream,
            ctl,
            peer,
            listeners: Mutex::new(Vec::new()),
            buffer_capacity,
            suspended: AtomicBool::new(false),
            resume: Notify::new(),
            open: AtomicBool::new(true),
        }))
    }

    /// This connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The remote peer's address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Read buffer capacity, in bytes.
    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }

    /// Whether the connection is still open.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Register a listener. Insertion order is notification order; duplicates
    /// are not filtered.
    ///
    /// Register inside the accept/connect callback; listeners added after
    /// the readiness loop has started dispatching may miss events.
    pub fn add_listener(&self, listener: Box<dyn ConnectionListener>) -> &Self {
        self.lock_listeners().push(listener);
        self
    }

    /// Write as many bytes as the socket accepts without blocking.
    ///
    /// Returns how many bytes were written, possibly zero when the socket is
    /// not currently writable. Fails if the connection is closed.
    pub fn send(&self, bytes: &[u8]) -> Result<usize> {
        if !self.is_open() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection is closed",
            )));
        }

        match self.stream.try_write(bytes) {
            Ok(written) => {
                tracing::trace!(connection_id = %self.id, bytes = written, "sent");
                Ok(written)
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Stop delivering `on_message` until [`Connection::resume_messages`].
    ///
    /// Useful when downstream buffers are full. Only future dispatch is
    /// suppressed; a notification already issued cannot be recalled.
    pub fn suspend_messages(&self) {
        self.suspended.store(true, Ordering::SeqCst);
        tracing::trace!(connection_id = %self.id, "message delivery suspended");
    }

    /// Resume message delivery.
    ///
    /// Wakes the readiness loop, which immediately performs one opportunistic
    /// read so bytes already buffered by the OS are not left stranded until
    /// the next readiness event.
    pub fn resume_messages(&self) {
        if self.suspended.swap(false, Ordering::SeqCst) {
            tracing::trace!(connection_id = %self.id, "message delivery resumed");
            self.resume.notify_one();
        }
    }

    /// Close the connection. Idempotent.
    ///
    /// Shuts down the write half, then the read half; a half that is already
    /// down is not an error. The running readiness loop observes the closed
    /// read half as EOF and delivers the terminal `on_close`. Descriptor
    /// teardown completes when the handle is dropped.
    pub fn close(&self) -> Result<()> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        tracing::debug!(connection_id = %self.id, peer = %self.peer, "closing connection");
        // Unpark a suspended loop so it can observe EOF.
        self.resume.notify_one();

        self.half_close(SocketShutdown::Write)?;
        self.half_close(SocketShutdown::Read)?;
        Ok(())
    }

    fn half_close(&self, how: SocketShutdown) -> Result<()> {
        match self.ctl.shutdown(how) {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(Error::Io(e)),
            Ok(()) => Ok(()),
        }
    }

    /// Drive the readiness loop until EOF or an escaping error.
    ///
    /// Blocks on readiness only; a read-ready socket gets exactly one
    /// non-blocking read attempt per wakeup. There is no timeout.
    pub(crate) async fn run(&self) -> Result<()> {
        let mut buffer = BytesMut::with_capacity(self.buffer_capacity);
        buffer.resize(self.buffer_capacity, 0);

        tracing::debug!(
            connection_id = %self.id,
            peer = %self.peer,
            capacity = self.buffer_capacity,
            "watching connection"
        );

        loop {
            let ready = self
                .stream
                .ready(Interest::READABLE)
                .await
                .map_err(Error::Io)?;
            tracing::trace!(connection_id = %self.id, ?ready, "readiness event");

            if self.suspended.load(Ordering::SeqCst) {
                // Park instead of spinning on a still-readable socket. After
                // resume the loop owes the backlog one immediate read, which
                // happens right below without waiting for fresh readiness.
                self.wait_while_suspended().await;
            }

            match self.read_once(&mut buffer)? {
                ReadEvent::Eof => {
                    tracing::debug!(connection_id = %self.id, "peer closed the stream");
                    let result = self.dispatch_close();
                    if let Err(e) = self.close() {
                        tracing::warn!(
                            connection_id = %self.id,
                            error = %e,
                            "close after EOF failed"
                        );
                    }
                    return result;
                }
                ReadEvent::Continue => {}
            }
        }
    }

    async fn wait_while_suspended(&self) {
        while self.suspended.load(Ordering::SeqCst) && self.is_open() {
            self.resume.notified().await;
        }
    }

    /// One non-blocking read attempt. A zero-byte result is EOF; `WouldBlock`
    /// is a spurious wakeup.
    fn read_once(&self, buffer: &mut BytesMut) -> Result<ReadEvent> {
        match self.stream.try_read(&mut buffer[..]) {
            Ok(0) => Ok(ReadEvent::Eof),
            Ok(read) => {
                tracing::trace!(connection_id = %self.id, bytes = read, "read message");
                self.dispatch_message(&buffer[..read])?;
                Ok(ReadEvent::Continue)
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(ReadEvent::Continue),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn dispatch_message(&self, message: &[u8]) -> Result<()> {
        let mut listeners = self.lock_listeners();
        for listener in listeners.iter_mut() {
            listener
                .on_message(message)
                .map_err(|e| Error::listener("on_message", e))?;
        }
        Ok(())
    }

    fn dispatch_close(&self) -> Result<()> {
        let mut listeners = self.lock_listeners();
        for listener in listeners.iter_mut() {
            listener
                .on_close()
                .map_err(|e| Error::listener("on_close", e))?;
        }
        Ok(())
    }

    pub(crate) fn dispatch_connect(&self) -> Result<()> {
        let mut listeners = self.lock_listeners();
        for listener in listeners.iter_mut() {
            listener
                .on_connect()
                .map_err(|e| Error::listener("on_connect", e))?;
        }
        Ok(())
    }

    /// Fatal-error path: tell every listener, then close.
    ///
    /// The `on_error` pass always completes, even when individual callbacks
    /// fail; the first such failure is reported after the pass. A failure to
    /// close at this point is logged, not escalated, since the connection is
    /// already unwinding.
    pub(crate) fn fail(&self, cause: &Error) -> Result<()> {
        tracing::error!(connection_id = %self.id, error = %cause, "connection failed");

        let mut first_failure = None;
        {
            let mut listeners = self.lock_listeners();
            for listener in listeners.iter_mut() {
                if let Err(e) = listener.on_error(cause) {
                    tracing::warn!(
                        connection_id = %self.id,
                        error = %e,
                        "listener failed in on_error"
                    );
                    if first_failure.is_none() {
                        first_failure = Some(e);
                    }
                }
            }
        }

        if let Err(e) = self.close() {
            tracing::error!(
                connection_id = %self.id,
                error = %e,
                "failed to close connection after error"
            );
        }

        match first_failure {
            Some(source) => Err(Error::listener("on_error", source)),
            None => Ok(()),
        }
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Vec<Box<dyn ConnectionListener>>> {
        self.listeners.lock().expect("listener set lock poisoned")
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("open", &self.is_open())
            .field("suspended", &self.suspended.load(Ordering::SeqCst))
            .finish()
    }
}
