//! TLS chat client engine.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::io::{AsyncWrite, ReadHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tracing::{debug, info, warn};

use tlschat_core::Observer;
use tlschat_protocol::{Incoming, Message, MessageReader, MessageWriter, Text};

use crate::error::{ClientError, ClientResult};

type ServerStream = TlsStream<TcpStream>;

/// Write side of the live connection.
type SessionWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// Identity settings for a [`ChatClient`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientOptions {
    /// Display name stamped on every outgoing text.
    pub name: String,
    /// Name checked against the server certificate. Defaults to the host
    /// part of the dialed address.
    pub server_name: Option<String>,
}

impl ClientOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            server_name: None,
        }
    }

    /// Builder: set TLS server name override.
    pub fn with_server_name(mut self, server_name: impl Into<String>) -> Self {
        self.server_name = Some(server_name.into());
        self
    }
}

struct Session {
    /// Distinguishes this connection's reader loop from earlier ones.
    generation: u64,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    writer: MessageWriter<SessionWriter>,
}

#[derive(Default)]
struct Observers {
    start: Observer<SocketAddr>,
    stop: Observer<()>,
    text: Observer<Text>,
    error: Observer<ClientError>,
}

struct Inner {
    options: ClientOptions,
    running: AtomicBool,
    generation: AtomicU64,
    session: Mutex<Option<Session>>,
    observers: Observers,
}

/// Chat client holding at most one server connection.
///
/// Cloning yields another handle to the same client.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<Inner>,
}

impl ChatClient {
    /// Creates an idle client.
    pub fn new(options: ClientOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                options,
                running: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                session: Mutex::new(None),
                observers: Observers::default(),
            }),
        }
    }

    /// Display name used for outgoing texts.
    pub fn name(&self) -> &str {
        &self.inner.options.name
    }

    /// Dials `address` (`host:port`) and starts reading broadcasts.
    ///
    /// Returns the server's address.
    pub async fn start(&self, address: &str, connector: TlsConnector) -> ClientResult<SocketAddr> {
        let mut session = self.inner.session.lock().await;
        if self.inner.is_running() {
            return Err(ClientError::AlreadyRunning);
        }

        let server_name = resolve_server_name(address, self.inner.options.server_name.as_deref())?;
        let tcp = TcpStream::connect(address).await.map_err(|e| {
            ClientError::Connection(format!("failed to connect to {}: {}", address, e))
        })?;
        let local_addr = tcp.local_addr()?;
        let peer_addr = tcp.peer_addr()?;

        let stream = connector.connect(server_name, tcp).await.map_err(|e| {
            ClientError::Connection(format!("TLS handshake with {} failed: {}", address, e))
        })?;
        let (read_half, write_half) = tokio::io::split(stream);

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *session = Some(Session {
            generation,
            local_addr,
            peer_addr,
            writer: MessageWriter::new(Box::new(write_half)),
        });
        self.inner.running.store(true, Ordering::SeqCst);

        info!(server = %peer_addr, local = %local_addr, "Connected");
        self.inner.observers.start.emit(peer_addr);

        tokio::spawn(read_loop(
            self.inner.clone(),
            MessageReader::new(read_half),
            generation,
        ));

        Ok(peer_addr)
    }

    /// Marks the client idle.
    ///
    /// The connection is not closed here; the reader loop releases it once
    /// its pending read returns.
    pub async fn stop(&self) -> ClientResult<()> {
        let mut session = self.inner.session.lock().await;
        if !self.inner.is_running() {
            return Err(ClientError::NotRunning);
        }

        self.inner.running.store(false, Ordering::SeqCst);
        if let Some(old) = session.take() {
            info!(server = %old.peer_addr, "Client stopped");
        }
        self.inner.observers.stop.emit(());
        Ok(())
    }

    /// Sends a text stamped with this client's name and the current time.
    ///
    /// Only the idle state is reported here; write failures go to the error
    /// observer.
    pub async fn text(&self, body: impl Into<String>) -> ClientResult<()> {
        let mut session = self.inner.session.lock().await;
        let Some(session) = session.as_mut().filter(|_| self.inner.is_running()) else {
            return Err(ClientError::NotRunning);
        };

        let message = Message::from(Text::new(self.name(), body));
        if let Err(e) = session.writer.send(&message).await {
            warn!(error = %e, "Failed to send text");
            self.inner.report(ClientError::Protocol(e));
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    /// Local address of the current connection.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.inner
            .session
            .lock()
            .await
            .as_ref()
            .map(|session| session.local_addr)
    }

    /// Called with the server address once connected.
    pub fn on_start<F>(&self, callback: F)
    where
        F: Fn(SocketAddr) + Send + Sync + 'static,
    {
        self.inner.observers.start.register(callback);
    }

    pub fn on_stop<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.observers.stop.register(move |()| callback());
    }

    /// Called with every text received from the server.
    pub fn on_text<F>(&self, callback: F)
    where
        F: Fn(Text) + Send + Sync + 'static,
    {
        self.inner.observers.text.register(callback);
    }

    /// Called with every asynchronous failure (read, write, decode).
    pub fn on_error<F>(&self, callback: F)
    where
        F: Fn(ClientError) + Send + Sync + 'static,
    {
        self.inner.observers.error.register(callback);
    }
}

impl Inner {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Whether the reader loop of `generation` should keep going.
    fn is_current(&self, generation: u64) -> bool {
        self.is_running() && self.generation.load(Ordering::SeqCst) == generation
    }

    fn report(&self, error: ClientError) {
        self.observers.error.emit(error);
    }

    fn dispatch(&self, message: Message) {
        match message {
            Message::Text(text) => {
                debug!(from = %text.name, "Received text");
                self.observers.text.emit(text);
            }
            other => {
                let message_type = other.message_type();
                warn!(%message_type, "Unexpected message type");
                self.report(ClientError::UnexpectedMessage(message_type));
            }
        }
    }

    /// Marks the client idle if `generation` is still the live connection.
    async fn end_session(&self, generation: u64) {
        let mut session = self.session.lock().await;
        if session.as_ref().is_some_and(|s| s.generation == generation) {
            session.take();
            self.running.store(false, Ordering::SeqCst);
            info!("Connection lost, client idle");
        }
    }
}

async fn read_loop(
    inner: Arc<Inner>,
    mut reader: MessageReader<ReadHalf<ServerStream>>,
    generation: u64,
) {
    while inner.is_current(generation) {
        match reader.recv().await {
            Ok(Incoming::Message(message)) => inner.dispatch(message),
            Ok(Incoming::Malformed(e)) => {
                warn!(error = %e, "Dropping undecodable frame");
                inner.report(ClientError::Protocol(e));
            }
            Err(e) => {
                debug!(error = %e, "Read loop ended");
                inner.report(ClientError::Protocol(e));
                inner.end_session(generation).await;
                return;
            }
        }
    }
    debug!(generation, "Read loop stopped");
}

/// Picks the name verified against the server certificate.
fn resolve_server_name(
    address: &str,
    override_name: Option<&str>,
) -> ClientResult<ServerName<'static>> {
    if let Some(name) = override_name {
        return ServerName::try_from(name.to_string())
            .map_err(|e| ClientError::InvalidAddress(format!("{}: {}", name, e)));
    }

    if let Ok(addr) = address.parse::<SocketAddr>() {
        return Ok(ServerName::IpAddress(addr.ip().into()));
    }

    let host = address
        .rsplit_once(':')
        .map(|(host, _port)| host)
        .filter(|host| !host.is_empty())
        .ok_or_else(|| ClientError::InvalidAddress(format!("{}: expected host:port", address)))?;

    ServerName::try_from(host.to_string())
        .map_err(|e| ClientError::InvalidAddress(format!("{}: {}", address, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;

    use tlschat_core::{client_connector, server_acceptor};
    use tlschat_protocol::{ErrorClass, ProtocolError};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio_rustls::TlsAcceptor;
    use tokio_rustls::rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};

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

    /// Accepts one TLS connection and hands its stream to the test.
    async fn one_shot_server(
        acceptor: TlsAcceptor,
    ) -> (
        SocketAddr,
        tokio::task::JoinHandle<tokio_rustls::server::TlsStream<TcpStream>>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            acceptor.accept(tcp).await.unwrap()
        });
        (addr, handle)
    }

    async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
        tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("channel closed")
    }

    /// Writer whose every write fails, standing in for a reset connection.
    struct BrokenPipe;

    impl AsyncWrite for BrokenPipe {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    /// Puts `client` in the running state with `writer` as its connection.
    async fn install_session(client: &ChatClient, writer: SessionWriter) {
        let addr = SocketAddr::from(([127, 0, 0, 1], 4001));
        *client.inner.session.lock().await = Some(Session {
            generation: 1,
            local_addr: addr,
            peer_addr: addr,
            writer: MessageWriter::new(writer),
        });
        client.inner.generation.store(1, Ordering::SeqCst);
        client.inner.running.store(true, Ordering::SeqCst);
    }

    #[test]
    fn server_name_from_ip_address() {
        let name = resolve_server_name("127.0.0.1:443", None).unwrap();
        assert!(matches!(name, ServerName::IpAddress(_)));

        let name = resolve_server_name("[::1]:443", None).unwrap();
        assert!(matches!(name, ServerName::IpAddress(_)));
    }

    #[test]
    fn server_name_from_hostname() {
        let name = resolve_server_name("chat.example.com:443", None).unwrap();
        assert_eq!(name.to_str(), "chat.example.com");
    }

    #[test]
    fn server_name_override_wins() {
        let name = resolve_server_name("127.0.0.1:443", Some("localhost")).unwrap();
        assert_eq!(name.to_str(), "localhost");
    }

    #[test]
    fn server_name_requires_port() {
        assert!(matches!(
            resolve_server_name("localhost", None),
            Err(ClientError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn lifecycle_guards_when_idle() {
        let client = ChatClient::new(ClientOptions::new("alice"));
        assert!(matches!(client.stop().await, Err(ClientError::NotRunning)));
        let err = client.text("hello").await.unwrap_err();
        assert!(matches!(err, ClientError::NotRunning));
        assert_eq!(err.class(), ErrorClass::Lifecycle);
    }

    #[tokio::test]
    async fn write_failure_is_reported_not_returned() {
        let client = ChatClient::new(ClientOptions::new("carol"));
        let (err_tx, mut errors) = mpsc::unbounded_channel();
        client.on_error(move |err| {
            let _ = err_tx.send(err);
        });
        install_session(&client, Box::new(BrokenPipe)).await;

        client.text("lost").await.unwrap();

        let err = recv(&mut errors).await;
        assert!(matches!(err, ClientError::Protocol(ProtocolError::Io(_))));
        assert_eq!(err.class(), ErrorClass::Transport);
        assert!(client.is_running());
    }

    #[tokio::test]
    async fn dial_failure_keeps_client_idle() {
        let (_, connector) = tls_pair();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ChatClient::new(ClientOptions::new("alice").with_server_name("localhost"));
        let result = client.start(&addr.to_string(), connector).await;
        assert!(matches!(result, Err(ClientError::Connection(_))));
        assert!(!client.is_running());
    }

    #[tokio::test]
    async fn sends_and_receives_texts() {
        let (acceptor, connector) = tls_pair();
        let (addr, accepted) = one_shot_server(acceptor).await;

        let client = ChatClient::new(ClientOptions::new("alice").with_server_name("localhost"));
        let (start_tx, mut started) = mpsc::unbounded_channel();
        let (text_tx, mut texts) = mpsc::unbounded_channel();
        client.on_start(move |peer| {
            let _ = start_tx.send(peer);
        });
        client.on_text(move |text| {
            let _ = text_tx.send(text);
        });

        let peer = client.start(&addr.to_string(), connector.clone()).await.unwrap();
        assert_eq!(peer, addr);
        assert_eq!(recv(&mut started).await, addr);
        assert!(matches!(
            client.start(&addr.to_string(), connector).await,
            Err(ClientError::AlreadyRunning)
        ));

        let stream = accepted.await.unwrap();
        let (read_half, write_half) = tokio::io::split(stream);
        let mut server_reader = MessageReader::new(read_half);
        let mut server_writer = MessageWriter::new(write_half);

        client.text("hi").await.unwrap();
        let sent = match server_reader.recv().await.unwrap() {
            Incoming::Message(message) => message,
            Incoming::Malformed(err) => panic!("unexpected decode error: {err}"),
        };
        let sent_text = sent.as_text().unwrap();
        assert_eq!(sent_text.name, "alice");
        assert_eq!(sent_text.text, "hi");

        server_writer.send(&sent).await.unwrap();
        assert_eq!(&recv(&mut texts).await, sent_text);

        client.stop().await.unwrap();
        assert!(matches!(client.text("late").await, Err(ClientError::NotRunning)));
    }

    #[tokio::test]
    async fn server_close_marks_client_idle() {
        let (acceptor, connector) = tls_pair();
        let (addr, accepted) = one_shot_server(acceptor).await;

        let client = ChatClient::new(ClientOptions::new("bob").with_server_name("localhost"));
        let (err_tx, mut errors) = mpsc::unbounded_channel();
        client.on_error(move |err| {
            let _ = err_tx.send(err);
        });
        client.start(&addr.to_string(), connector).await.unwrap();

        let mut stream = accepted.await.unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut stream, b"junk\x04").await.unwrap();
        assert!(matches!(
            recv(&mut errors).await,
            ClientError::Protocol(ProtocolError::MalformedEnvelope(_))
        ));
        assert!(client.is_running());

        tokio::io::AsyncWriteExt::shutdown(&mut stream).await.unwrap();
        drop(stream);

        let err = recv(&mut errors).await;
        assert_eq!(err.class(), ErrorClass::Transport);
        tokio::time::timeout(WAIT, async {
            while client.is_running() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }
}
