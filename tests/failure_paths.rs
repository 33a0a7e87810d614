//! Error escalation and lifecycle misuse.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::AsyncReadExt;

use event_net::{
    CallbackError, Client, ClientConfig, Connection, Error, Server, ServerConfig,
};

use common::{Event, FailingOnMessage, OnAccept, Recording};

#[tokio::test]
async fn failing_message_listener_closes_the_connection() {
    let failing_log = common::event_log();
    let quiet_log = common::event_log();
    let slot: Arc<Mutex<Option<Arc<Connection>>>> = Arc::new(Mutex::new(None));

    let server = Arc::new(Server::new(ServerConfig {
        bind_address: "127.0.0.1:0".to_string(),
        ..ServerConfig::default()
    }));
    {
        let failing_log = Arc::clone(&failing_log);
        let quiet_log = Arc::clone(&quiet_log);
        let slot = Arc::clone(&slot);
        server.add_listener(Arc::new(OnAccept(move |connection: &Arc<Connection>| {
            *slot.lock().unwrap() = Some(Arc::clone(connection));
            connection.add_listener(FailingOnMessage::new(&failing_log));
            connection.add_listener(Recording::new(&quiet_log));
            Ok(())
        })));
    }
    let (addr, server_task) = common::start_server(Arc::clone(&server)).await;

    let mut peer = tokio::net::TcpStream::connect(addr).await.unwrap();
    tokio::io::AsyncWriteExt::write_all(&mut peer, b"boom")
        .await
        .unwrap();

    common::wait_until("error delivered to every listener", || {
        common::count_errors(&failing_log) == 1 && common::count_errors(&quiet_log) == 1
    })
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The failing listener saw its message, then the error.
    let failing_events = common::snapshot(&failing_log);
    assert_eq!(failing_events.len(), 2);
    assert_eq!(failing_events[0], Event::Message(b"boom".to_vec()));
    assert!(matches!(&failing_events[1], Event::Error(text) if text.contains("on_message")));

    // Dispatch for the event stopped at the failing listener, so the second
    // listener never saw the message, only the error. No close either: the
    // error is the terminal notification.
    let quiet_events = common::snapshot(&quiet_log);
    assert_eq!(quiet_events.len(), 1);
    assert!(matches!(&quiet_events[0], Event::Error(_)));

    let connection = slot.lock().unwrap().clone().unwrap();
    assert!(!connection.is_open());

    // The peer observes the closed socket as EOF.
    let mut sink = Vec::new();
    peer.read_to_end(&mut sink).await.unwrap();
    assert!(sink.is_empty());

    server.stop().unwrap();
    server_task.await.unwrap().unwrap();
}

struct FailingOnConnect;

impl event_net::ConnectionListener for FailingOnConnect {
    fn on_connect(&mut self) -> Result<(), CallbackError> {
        Err("connect refused by listener".into())
    }
    fn on_message(&mut self, _message: &[u8]) -> Result<(), CallbackError> {
        Ok(())
    }
    fn on_close(&mut self) -> Result<(), CallbackError> {
        Ok(())
    }
    fn on_error(&mut self, _cause: &Error) -> Result<(), CallbackError> {
        Ok(())
    }
}

#[tokio::test]
async fn failing_connect_listener_aborts_before_the_read_loop() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _socket = listener.accept().await;
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let log = common::event_log();
    let client = Client::new(ClientConfig {
        remote_address: addr.to_string(),
        ..ClientConfig::default()
    });
    client.add_listener(Recording::new(&log));
    client.add_listener(Box::new(FailingOnConnect));

    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, Error::Listener { .. }));
    assert!(err.to_string().contains("on_connect"));

    // Listeners before the failing one saw the connect; nothing else fired.
    assert_eq!(common::snapshot(&log), vec![Event::Connect]);
    assert_eq!(client.is_open().unwrap(), false);
}

#[tokio::test]
async fn start_is_one_shot_and_stop_is_graceful() {
    let server = Arc::new(Server::new(ServerConfig {
        bind_address: "127.0.0.1:0".to_string(),
        ..ServerConfig::default()
    }));
    server.add_listener(Arc::new(OnAccept(|_connection: &Arc<Connection>| Ok(()))));
    let (_addr, server_task) = common::start_server(Arc::clone(&server)).await;

    let err = server.start().await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));

    server.stop().unwrap();
    // Shutdown is treated as success, not an accept failure.
    server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn connect_is_one_shot() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        // Accept and hang up immediately.
        let _ = listener.accept().await;
    });

    let log = common::event_log();
    let client = Client::new(ClientConfig {
        remote_address: addr.to_string(),
        ..ClientConfig::default()
    });
    client.add_listener(Recording::new(&log));

    client.connect().await.unwrap();
    assert_eq!(common::count_closes(&log), 1);

    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}
