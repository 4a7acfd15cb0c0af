//! Chat server: peer registry, broadcast engine.
//!
//! The server accepts TLS connections, reads framed messages from each of
//! them and rebroadcasts every text to all connected peers, the sender
//! included.
//!
//! # Example
//!
//! ```rust,no_run
//! use tlschat_server::{ChatServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let server = ChatServer::new();
//!     server.on_message(|message| println!("{message}"));
//!     server.start(&config.bind_address, config.acceptor()?).await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.stop().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod registry;
mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use registry::{BroadcastReport, PeerFailure, PeerId, PeerRegistry};
pub use server::ChatServer;
