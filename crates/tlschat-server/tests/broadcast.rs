//! End-to-end chat over real TLS connections.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_rustls::rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio_rustls::{TlsAcceptor, TlsConnector};

use tlschat_client::{ChatClient, ClientOptions};
use tlschat_core::{client_connector, server_acceptor};
use tlschat_protocol::{Message, Text};
use tlschat_server::{ChatServer, ServerError};

const WAIT: Duration = Duration::from_secs(5);

fn tls_pair() -> (TlsAcceptor, TlsConnector) {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert = certified.cert.der().clone();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
        certified.key_pair.serialize_der(),
    ));
    (
        server_acceptor(vec![cert.clone()], key).unwrap(),
        client_connector(vec![cert]).unwrap(),
    )
}

async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("channel closed")
}

async fn wait_for_peers(server: &ChatServer, count: usize) {
    tokio::time::timeout(WAIT, async {
        while server.peer_count().await != count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("peer count never reached");
}

struct TestClient {
    client: ChatClient,
    texts: mpsc::UnboundedReceiver<Text>,
}

impl TestClient {
    async fn connect(name: &str, addr: SocketAddr, connector: TlsConnector) -> Self {
        let client = ChatClient::new(ClientOptions::new(name).with_server_name("localhost"));
        let (tx, texts) = mpsc::unbounded_channel();
        client.on_text(move |text| {
            let _ = tx.send(text);
        });
        client.start(&addr.to_string(), connector).await.unwrap();
        Self { client, texts }
    }
}

struct TestServer {
    server: ChatServer,
    addr: SocketAddr,
    connections: mpsc::UnboundedReceiver<SocketAddr>,
    messages: mpsc::UnboundedReceiver<Message>,
    errors: mpsc::UnboundedReceiver<ServerError>,
}

impl TestServer {
    async fn start(acceptor: TlsAcceptor) -> Self {
        let server = ChatServer::new();
        let (conn_tx, connections) = mpsc::unbounded_channel();
        let (msg_tx, messages) = mpsc::unbounded_channel();
        let (err_tx, errors) = mpsc::unbounded_channel();
        server.on_new_connection(move |addr| {
            let _ = conn_tx.send(addr);
        });
        server.on_message(move |message| {
            let _ = msg_tx.send(message);
        });
        server.on_error(move |err| {
            let _ = err_tx.send(err);
        });

        let addr = server.start("127.0.0.1:0", acceptor).await.unwrap();
        Self {
            server,
            addr,
            connections,
            messages,
            errors,
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn text_is_broadcast_to_every_client_including_sender() {
    let (acceptor, connector) = tls_pair();
    let mut server = TestServer::start(acceptor).await;

    let mut alice = TestClient::connect("alice", server.addr, connector.clone()).await;
    let alice_addr = alice.client.local_addr().await.unwrap();
    assert_eq!(recv(&mut server.connections).await, alice_addr);

    let mut bob = TestClient::connect("bob", server.addr, connector).await;
    let bob_addr = bob.client.local_addr().await.unwrap();
    assert_eq!(recv(&mut server.connections).await, bob_addr);

    wait_for_peers(&server.server, 2).await;

    alice.client.text("hi").await.unwrap();

    let seen = recv(&mut server.messages).await;
    let seen_text = seen.as_text().expect("server saw a text").clone();
    assert_eq!(seen_text.name, "alice");
    assert_eq!(seen_text.text, "hi");

    assert_eq!(recv(&mut alice.texts).await, seen_text);
    assert_eq!(recv(&mut bob.texts).await, seen_text);

    server.server.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_text_from_every_client_is_delivered() {
    let (acceptor, connector) = tls_pair();
    let mut server = TestServer::start(acceptor).await;

    let mut clients = Vec::new();
    for name in ["ann", "ben", "cat"] {
        clients.push(TestClient::connect(name, server.addr, connector.clone()).await);
    }
    wait_for_peers(&server.server, clients.len()).await;

    for client in &clients {
        for i in 0..5 {
            client.client.text(format!("ms {}", i)).await.unwrap();
        }
    }

    let expected: HashSet<(String, String)> = ["ann", "ben", "cat"]
        .iter()
        .flat_map(|name| (0..5).map(move |i| (name.to_string(), format!("ms {}", i))))
        .collect();

    for client in &mut clients {
        let mut received = HashSet::new();
        while received.len() < expected.len() {
            let text = recv(&mut client.texts).await;
            received.insert((text.name, text.text));
        }
        assert_eq!(received, expected);
    }

    let mut observed = 0;
    while observed < expected.len() {
        recv(&mut server.messages).await;
        observed += 1;
    }
    assert!(server.errors.try_recv().is_err());

    server.server.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stopped_client_is_dropped_from_registry() {
    let (acceptor, connector) = tls_pair();
    let mut server = TestServer::start(acceptor).await;

    let mut stayer = TestClient::connect("stayer", server.addr, connector.clone()).await;
    let leaver = TestClient::connect("leaver", server.addr, connector).await;
    wait_for_peers(&server.server, 2).await;

    leaver.client.stop().await.unwrap();
    assert!(!leaver.client.is_running());

    // The stopped client's reader exits on the next frame and closes the stream.
    stayer.client.text("still here").await.unwrap();
    let text = recv(&mut stayer.texts).await;
    assert_eq!(text.text, "still here");
    assert!(matches!(
        recv(&mut server.messages).await,
        Message::Text(ref t) if t.name == "stayer"
    ));

    wait_for_peers(&server.server, 1).await;

    stayer.client.text("alone").await.unwrap();
    assert_eq!(recv(&mut stayer.texts).await.text, "alone");

    server.server.stop().await.unwrap();
}
