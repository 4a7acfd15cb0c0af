//! TLS chat server engine.
//!
//! [`ChatServer`] owns the accept loop, one reader task per connection and
//! the [`PeerRegistry`] used for broadcast. Asynchronous failures never
//! reach the caller of `start`/`stop`; they go to the error observer.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncWrite, ReadHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, watch};
use tokio_rustls::TlsAcceptor;
use tokio_rustls::server::TlsStream;
use tracing::{debug, info, warn};

use tlschat_core::Observer;
use tlschat_protocol::{Incoming, Message, MessageReader};

use crate::error::{ServerError, ServerResult};
use crate::registry::PeerRegistry;

type PeerStream = TlsStream<TcpStream>;

/// Write side of a registered peer.
type PeerWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// A running listener: where it is bound and how to stop its accept loop.
struct Session {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
}

#[derive(Default)]
struct Observers {
    start: Observer<()>,
    stop: Observer<()>,
    new_connection: Observer<SocketAddr>,
    message: Observer<Message>,
    error: Observer<ServerError>,
}

struct Inner {
    /// Mirrors `session.is_some()`; polled by reader loops between frames.
    running: AtomicBool,
    session: Mutex<Option<Session>>,
    registry: PeerRegistry<PeerWriter>,
    observers: Observers,
}

/// Broadcast chat server.
///
/// Cloning yields another handle to the same server.
#[derive(Clone)]
pub struct ChatServer {
    inner: Arc<Inner>,
}

impl Default for ChatServer {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatServer {
    /// Creates an idle server.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                running: AtomicBool::new(false),
                session: Mutex::new(None),
                registry: PeerRegistry::new(),
                observers: Observers::default(),
            }),
        }
    }

    /// Binds `address` and starts accepting TLS connections.
    ///
    /// Returns the bound address, which differs from `address` when port 0
    /// was requested.
    pub async fn start(&self, address: &str, acceptor: TlsAcceptor) -> ServerResult<SocketAddr> {
        let mut session = self.inner.session.lock().await;
        if session.is_some() {
            return Err(ServerError::AlreadyRunning);
        }

        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| ServerError::Bind {
                address: address.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        *session = Some(Session {
            local_addr,
            shutdown,
        });
        self.inner.running.store(true, Ordering::SeqCst);

        info!(address = %local_addr, "Chat server listening");
        self.inner.observers.start.emit(());

        tokio::spawn(accept_loop(
            self.inner.clone(),
            listener,
            acceptor,
            shutdown_rx,
        ));

        Ok(local_addr)
    }

    /// Stops accepting connections.
    ///
    /// The listener is released right away. Established connections are left
    /// open; their reader loops exit after their next frame.
    pub async fn stop(&self) -> ServerResult<()> {
        let mut session = self.inner.session.lock().await;
        let Some(current) = session.take() else {
            return Err(ServerError::NotRunning);
        };

        self.inner.running.store(false, Ordering::SeqCst);
        let _ = current.shutdown.send(true);

        info!(address = %current.local_addr, "Chat server stopped");
        self.inner.observers.stop.emit(());
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Address the listener is bound to, while running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.inner
            .session
            .lock()
            .await
            .as_ref()
            .map(|session| session.local_addr)
    }

    /// Number of registered peers.
    pub async fn peer_count(&self) -> usize {
        self.inner.registry.len().await
    }

    pub fn on_start<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.observers.start.register(move |()| callback());
    }

    pub fn on_stop<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.observers.stop.register(move |()| callback());
    }

    /// Called with the remote address of every accepted connection.
    pub fn on_new_connection<F>(&self, callback: F)
    where
        F: Fn(SocketAddr) + Send + Sync + 'static,
    {
        self.inner.observers.new_connection.register(callback);
    }

    /// Called with every message decoded from any peer.
    pub fn on_message<F>(&self, callback: F)
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        self.inner.observers.message.register(callback);
    }

    /// Called with every asynchronous failure (accept, handshake, read,
    /// write, decode).
    pub fn on_error<F>(&self, callback: F)
    where
        F: Fn(ServerError) + Send + Sync + 'static,
    {
        self.inner.observers.error.register(callback);
    }
}

impl Inner {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn report(&self, error: ServerError) {
        self.observers.error.emit(error);
    }

    /// Reports the message, then rebroadcasts texts to every peer.
    async fn dispatch(&self, peer: SocketAddr, message: Message) {
        self.observers.message.emit(message.clone());

        match message {
            Message::Text(ref text) => {
                debug!(%peer, name = %text.name, "Broadcasting text");
                self.broadcast(&message).await;
            }
            other => {
                let message_type = other.message_type();
                warn!(%peer, %message_type, "Unexpected message type");
                self.report(ServerError::UnexpectedMessage { peer, message_type });
            }
        }
    }

    async fn broadcast(&self, message: &Message) {
        let report = match self.registry.broadcast(message).await {
            Ok(report) => report,
            Err(source) => {
                warn!(error = %source, "Failed to encode broadcast");
                self.report(ServerError::Encoding(source));
                return;
            }
        };

        for failure in report.failures {
            warn!(peer = %failure.addr, error = %failure.error, "Broadcast write failed");
            self.report(ServerError::Write {
                peer: failure.addr,
                source: failure.error,
            });
        }
    }
}

async fn accept_loop(
    inner: Arc<Inner>,
    listener: TcpListener,
    acceptor: TlsAcceptor,
    mut shutdown: watch::Receiver<bool>,
) {
    while inner.is_running() {
        let accepted = tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                debug!(%peer, "Accepted connection");
                inner.observers.new_connection.emit(peer);
                tokio::spawn(serve_connection(
                    inner.clone(),
                    acceptor.clone(),
                    stream,
                    peer,
                ));
            }
            Err(e) => {
                warn!(error = %e, "Failed to accept connection");
                inner.report(ServerError::Accept(e));
            }
        }
    }

    debug!("Accept loop stopped");
}

async fn serve_connection(
    inner: Arc<Inner>,
    acceptor: TlsAcceptor,
    stream: TcpStream,
    peer: SocketAddr,
) {
    let stream = match acceptor.accept(stream).await {
        Ok(stream) => stream,
        Err(source) => {
            warn!(%peer, error = %source, "TLS handshake failed");
            inner.report(ServerError::Handshake { peer, source });
            return;
        }
    };

    let (read_half, write_half) = tokio::io::split(stream);
    let id = inner.registry.add(peer, Box::new(write_half)).await;
    info!(%peer, %id, "Peer connected");

    read_loop(&inner, MessageReader::new(read_half), peer).await;

    inner.registry.remove(id).await;
    info!(%peer, %id, "Peer disconnected");
}

async fn read_loop(
    inner: &Inner,
    mut reader: MessageReader<ReadHalf<PeerStream>>,
    peer: SocketAddr,
) {
    while inner.is_running() {
        match reader.recv().await {
            Ok(Incoming::Message(message)) => inner.dispatch(peer, message).await,
            Ok(Incoming::Malformed(source)) => {
                warn!(%peer, error = %source, "Dropping undecodable frame");
                inner.report(ServerError::Protocol { peer, source });
            }
            Err(source) => {
                debug!(%peer, error = %source, "Read loop ended");
                inner.report(ServerError::Read { peer, source });
                return;
            }
        }
    }
}
