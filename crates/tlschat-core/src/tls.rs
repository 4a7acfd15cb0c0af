//! TLS material loading.
//!
//! The chat engines only ever see a [`TlsAcceptor`] or a [`TlsConnector`];
//! this module turns PEM files (or in-memory DER values) into those objects.
//! The `ring` provider is selected explicitly so the process-wide default
//! provider never needs to be installed.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::{self, ClientConfig, RootCertStore, ServerConfig};
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::debug;

/// Errors raised while preparing TLS material.
#[derive(Debug, Error)]
pub enum TlsError {
    /// Reading a PEM file failed.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file contained no certificate.
    #[error("no certificate found in {path}")]
    NoCertificates { path: PathBuf },

    /// The file contained no private key.
    #[error("no private key found in {path}")]
    NoPrivateKey { path: PathBuf },

    /// rustls rejected the configuration.
    #[error("invalid TLS configuration: {0}")]
    Config(#[from] rustls::Error),
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        })
}

/// Loads every certificate from a PEM file.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificates {
            path: path.to_path_buf(),
        });
    }

    debug!(path = %path.display(), count = certs.len(), "Loaded certificates");
    Ok(certs)
}

/// Loads the first private key (PKCS#1, PKCS#8 or SEC1) from a PEM file.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey {
            path: path.to_path_buf(),
        })
}

/// Builds a server-side acceptor presenting `certs` with `key`.
pub fn server_acceptor(
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<TlsAcceptor, TlsError> {
    let config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Builds a client-side connector trusting exactly `roots`.
pub fn client_connector(roots: Vec<CertificateDer<'static>>) -> Result<TlsConnector, TlsError> {
    let mut store = RootCertStore::empty();
    for root in roots {
        store.add(root)?;
    }

    let config = ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()?
        .with_root_certificates(store)
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

/// Reads a certificate chain and key from PEM files and builds an acceptor.
pub fn acceptor_from_pem_files(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, TlsError> {
    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;
    server_acceptor(certs, key)
}

/// Reads trust roots from a PEM file and builds a connector.
pub fn connector_from_pem_file(ca_path: &Path) -> Result<TlsConnector, TlsError> {
    client_connector(load_certs(ca_path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn self_signed() -> rcgen::CertifiedKey {
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap()
    }

    #[test]
    fn loads_pem_files_into_acceptor_and_connector() {
        let dir = tempdir().unwrap();
        let cert_path = dir.path().join("cert.crt");
        let key_path = dir.path().join("cert.key");

        let certified = self_signed();
        std::fs::write(&cert_path, certified.cert.pem()).unwrap();
        std::fs::write(&key_path, certified.key_pair.serialize_pem()).unwrap();

        let certs = load_certs(&cert_path).unwrap();
        assert_eq!(certs.len(), 1);
        assert_eq!(&certs[0], certified.cert.der());

        assert!(acceptor_from_pem_files(&cert_path, &key_path).is_ok());
        assert!(connector_from_pem_file(&cert_path).is_ok());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_certs(Path::new("/nonexistent/ca.crt")).unwrap_err();
        assert!(matches!(err, TlsError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/ca.crt"));
    }

    #[test]
    fn file_without_certificates_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.pem");
        std::fs::write(&path, "not a pem file\n").unwrap();

        assert!(matches!(
            load_certs(&path),
            Err(TlsError::NoCertificates { .. })
        ));
        assert!(matches!(
            load_private_key(&path),
            Err(TlsError::NoPrivateKey { .. })
        ));
    }
}
