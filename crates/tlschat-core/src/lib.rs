//! Shared runtime pieces: tracing, observers, TLS material

pub mod observer;
pub mod tls;
pub mod tracing;

pub use observer::Observer;
pub use tls::{
    TlsError, acceptor_from_pem_files, client_connector, connector_from_pem_file, load_certs,
    load_private_key, server_acceptor,
};
pub use tracing::{
    LogDestination, TracingConfig, TracingError, TracingOutputFormat, init_tracing,
};
