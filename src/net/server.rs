//! Accept loop.
//!
//! # Responsibilities
//! - Bind the configured address and accept connections indefinitely
//! - Fan each accepted socket out to one worker per accept listener
//! - Treat the stop signal as graceful termination, every other accept
//!   failure as fatal to the server
//! - Own the worker pool lifecycle when no pool was supplied
//!
//! Registering more than one accept listener wraps the *same* accepted
//! socket in separate independent [`Connection`] handles (duplicated
//! descriptors), each with its own worker and readiness loop. The handles
//! compete for the same underlying bytes; this is preserved observed
//! behavior, not multicast.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::events::AcceptListener;
use crate::lifecycle::Shutdown;
use crate::net::connection::Connection;
use crate::pool::WorkerPool;

/// An event-driven TCP server.
///
/// `start()` blocks until the server is shut down by [`Server::stop`];
/// accept listeners should be registered before.
pub struct Server {
    config: ServerConfig,
    accept_listeners: Mutex<Vec<Arc<dyn AcceptListener>>>,
    /// Caller-supplied pool; the server creates and owns one if absent.
    supplied_pool: Option<Arc<WorkerPool>>,
    started: AtomicBool,
    shutdown: Shutdown,
    bound: OnceLock<SocketAddr>,
}

impl Server {
    /// Create a new server. Nothing is bound until [`Server::start`].
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            accept_listeners: Mutex::new(Vec::new()),
            supplied_pool: None,
            started: AtomicBool::new(false),
            shutdown: Shutdown::new(),
            bound: OnceLock::new(),
        }
    }

    /// Use a caller-supplied worker pool instead of an owned one.
    ///
    /// A supplied pool is left running when the server exits.
    pub fn with_pool(mut self, pool: Arc<WorkerPool>) -> Self {
        self.supplied_pool = Some(pool);
        self
    }

    /// Register an accept listener. One worker per accepted connection is
    /// spawned for each registered listener.
    ///
    /// Register before [`Server::start`].
    pub fn add_listener(&self, listener: Arc<dyn AcceptListener>) -> &Self {
        self.accept_listeners
            .lock()
            .expect("accept listener lock poisoned")
            .push(listener);
        self
    }

    /// The bound address, once the server is listening.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.bound
            .get()
            .copied()
            .ok_or(Error::InvalidState("server not bound yet"))
    }

    /// Bind and accept connections until [`Server::stop`].
    ///
    /// One-shot: a second call fails with an invalid-state error. Accept
    /// failures other than the stop signal propagate out of this method;
    /// per-connection failures never do.
    pub async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::InvalidState("server already started"));
        }

        let accept_listeners: Vec<Arc<dyn AcceptListener>> = self
            .accept_listeners
            .lock()
            .expect("accept listener lock poisoned")
            .clone();
        if accept_listeners.is_empty() {
            tracing::warn!("no accept listeners registered to handle incoming connections");
        }

        let (pool, owned_pool) = match &self.supplied_pool {
            Some(pool) => {
                tracing::debug!("using supplied worker pool");
                (Arc::clone(pool), false)
            }
            None => {
                tracing::debug!(
                    max_workers = ?self.config.pool.max_workers,
                    overflow = ?self.config.pool.overflow,
                    "created new worker pool"
                );
                (Arc::new(WorkerPool::new(&self.config.pool)), true)
            }
        };

        let addr: SocketAddr = self.config.bind_address.parse().map_err(|e| {
            Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;
        let listener = TcpListener::bind(addr).await.map_err(Error::Io)?;
        let local_addr = listener.local_addr().map_err(Error::Io)?;
        let _ = self.bound.set(local_addr);

        tracing::info!(address = %local_addr, "server listening");

        let mut stop_signal = self.shutdown.subscribe();
        let result = loop {
            tokio::select! {
                _ = stop_signal.changed() => {
                    tracing::debug!("accept loop received stop signal");
                    break Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!(peer = %peer, "accepted new connection");
                        self.fan_out(stream, peer, &accept_listeners, &pool).await;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                        break Err(Error::Io(e));
                    }
                },
            }
        };

        drop(listener);

        if owned_pool {
            tracing::debug!("draining owned worker pool");
            pool.drain().await;
        }

        tracing::info!("server shut down");
        result
    }

    /// Stop a server previously started with [`Server::start`].
    ///
    /// The unblocked accept loop treats this as graceful termination.
    /// In-flight connection workers are not interrupted.
    pub fn stop(&self) -> Result<()> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(Error::InvalidState("server not running"));
        }
        tracing::debug!("stopping server");
        self.shutdown.trigger();
        Ok(())
    }

    /// Wrap one accepted socket in a fresh handle per accept listener and
    /// hand each to the pool. Failures here stay contained to the affected
    /// connection.
    async fn fan_out(
        &self,
        stream: tokio::net::TcpStream,
        peer: SocketAddr,
        accept_listeners: &[Arc<dyn AcceptListener>],
        pool: &WorkerPool,
    ) {
        let std_stream = match stream.into_std() {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(peer = %peer, error = %e, "could not detach accepted socket");
                return;
            }
        };

        for accept_listener in accept_listeners {
            let socket = match std_stream.try_clone() {
                Ok(socket) => socket,
                Err(e) => {
                    tracing::error!(peer = %peer, error = %e, "could not duplicate socket");
                    continue;
                }
            };
            let connection = match Connection::new(socket, self.config.buffer_capacity) {
                Ok(connection) => connection,
                Err(e) => {
                    tracing::error!(peer = %peer, error = %e, "could not wrap accepted socket");
                    continue;
                }
            };

            let accept_listener = Arc::clone(accept_listener);
            if let Err(e) = pool.submit(drive(connection, accept_listener)).await {
                tracing::warn!(peer = %peer, error = %e, "dropping accepted connection");
            }
        }
    }
}

/// One worker's unit of work: registration, readiness loop, error path.
async fn drive(connection: Arc<Connection>, accept_listener: Arc<dyn AcceptListener>) {
    // The listener registers on events here, before any read can fire.
    let outcome = match accept_listener.on_incoming_client(&connection) {
        Err(e) => Err(Error::listener("on_incoming_client", e)),
        Ok(()) => connection.run().await,
    };

    if let Err(cause) = outcome {
        if let Err(e) = connection.fail(&cause) {
            tracing::error!(
                connection_id = %connection.id(),
                error = %e,
                "error during on_error dispatch"
            );
        }
    }
}
