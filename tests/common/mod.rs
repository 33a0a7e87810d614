//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use event_net::{AcceptListener, CallbackError, Connection, ConnectionListener, Error, Server};

/// Everything a listener can observe, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connect,
    Message(Vec<u8>),
    Close,
    Error(String),
}

pub type EventLog = Arc<Mutex<Vec<Event>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn snapshot(log: &EventLog) -> Vec<Event> {
    log.lock().unwrap().clone()
}

pub fn messages(log: &EventLog) -> Vec<Vec<u8>> {
    snapshot(log)
        .into_iter()
        .filter_map(|event| match event {
            Event::Message(bytes) => Some(bytes),
            _ => None,
        })
        .collect()
}

pub fn concat_messages(log: &EventLog) -> Vec<u8> {
    messages(log).concat()
}

pub fn count_closes(log: &EventLog) -> usize {
    snapshot(log)
        .iter()
        .filter(|event| matches!(event, Event::Close))
        .count()
}

pub fn count_errors(log: &EventLog) -> usize {
    snapshot(log)
        .iter()
        .filter(|event| matches!(event, Event::Error(_)))
        .count()
}

/// Listener that records every notification it receives.
pub struct Recording {
    log: EventLog,
}

impl Recording {
    pub fn new(log: &EventLog) -> Box<Self> {
        Box::new(Self {
            log: Arc::clone(log),
        })
    }
}

impl ConnectionListener for Recording {
    fn on_connect(&mut self) -> Result<(), CallbackError> {
        self.log.lock().unwrap().push(Event::Connect);
        Ok(())
    }
    fn on_message(&mut self, message: &[u8]) -> Result<(), CallbackError> {
        self.log.lock().unwrap().push(Event::Message(message.to_vec()));
        Ok(())
    }
    fn on_close(&mut self) -> Result<(), CallbackError> {
        self.log.lock().unwrap().push(Event::Close);
        Ok(())
    }
    fn on_error(&mut self, cause: &Error) -> Result<(), CallbackError> {
        self.log.lock().unwrap().push(Event::Error(cause.to_string()));
        Ok(())
    }
}

/// Listener that records, then refuses every message.
pub struct FailingOnMessage {
    log: EventLog,
}

impl FailingOnMessage {
    pub fn new(log: &EventLog) -> Box<Self> {
        Box::new(Self {
            log: Arc::clone(log),
        })
    }
}

impl ConnectionListener for FailingOnMessage {
    fn on_message(&mut self, message: &[u8]) -> Result<(), CallbackError> {
        self.log.lock().unwrap().push(Event::Message(message.to_vec()));
        Err("listener refused the message".into())
    }
    fn on_close(&mut self) -> Result<(), CallbackError> {
        self.log.lock().unwrap().push(Event::Close);
        Ok(())
    }
    fn on_error(&mut self, cause: &Error) -> Result<(), CallbackError> {
        self.log.lock().unwrap().push(Event::Error(cause.to_string()));
        Ok(())
    }
}

/// Accept listener built from a closure, for registering per-connection
/// listeners inline in tests.
pub struct OnAccept<F>(pub F);

impl<F> AcceptListener for OnAccept<F>
where
    F: Fn(&Arc<Connection>) -> Result<(), CallbackError> + Send + Sync,
{
    fn on_incoming_client(&self, connection: &Arc<Connection>) -> Result<(), CallbackError> {
        (self.0)(connection)
    }
}

/// Spawn `server.start()` and wait until the server is bound.
pub async fn start_server(
    server: Arc<Server>,
) -> (SocketAddr, tokio::task::JoinHandle<event_net::Result<()>>) {
    let task = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.start().await }
    });

    for _ in 0..200 {
        if let Ok(addr) = server.local_addr() {
            return (addr, task);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("server never bound");
}

/// Poll until `predicate` holds, panicking after ~2 seconds.
pub async fn wait_until(what: &str, mut predicate: impl FnMut() -> bool) {
    for _ in 0..200 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
