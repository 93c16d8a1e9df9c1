//! TLS acceptor construction.
//!
//! Certificate material is `cert.pem` + `key.pem` adjacent to the config
//! file; when either is missing, an ephemeral self-signed localhost
//! certificate is generated instead. Server-only: client certificates are
//! neither requested nor verified. rustls speaks TLS 1.2 and 1.3 only.

use rustls::ServerConfig;
use rustls_pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio_rustls::TlsAcceptor;
use tracing::info;

/// TLS setup problems. Fatal at startup (exit code 3). Per-connection
/// handshake failures are handled in the supervisor, not here.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificates found in {0}")]
    NoCerts(PathBuf),

    #[error("no private key found in {0}")]
    NoKey(PathBuf),

    #[error("self-signed certificate generation failed: {0}")]
    SelfSigned(#[from] rcgen::Error),

    #[error(transparent)]
    Rustls(#[from] rustls::Error),
}

/// Build the acceptor from PEM files in `dir`, falling back to a
/// self-signed localhost certificate when the pair is absent.
pub fn build_acceptor(dir: &Path) -> Result<TlsAcceptor, TlsError> {
    let cert_path = dir.join("cert.pem");
    let key_path = dir.join("key.pem");

    let (certs, key) = if cert_path.is_file() && key_path.is_file() {
        info!(cert = %cert_path.display(), "Loading TLS certificate");
        load_pem_pair(&cert_path, &key_path)?
    } else {
        info!("cert.pem/key.pem not found — generating self-signed certificate for localhost");
        self_signed()?
    };

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

type CertPair = (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>);

fn load_pem_pair(cert_path: &Path, key_path: &Path) -> Result<CertPair, TlsError> {
    let open = |path: &Path| {
        File::open(path).map_err(|source| TlsError::Io { path: path.to_path_buf(), source })
    };

    let mut reader = BufReader::new(open(cert_path)?);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Io { path: cert_path.to_path_buf(), source })?;
    if certs.is_empty() {
        return Err(TlsError::NoCerts(cert_path.to_path_buf()));
    }

    let mut reader = BufReader::new(open(key_path)?);
    let key = rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsError::Io { path: key_path.to_path_buf(), source })?
        .ok_or_else(|| TlsError::NoKey(key_path.to_path_buf()))?;

    Ok((certs, key))
}

fn self_signed() -> Result<CertPair, TlsError> {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])?;
    let cert = certified.cert.der().clone();
    let key = PrivateKeyDer::from(PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der()));
    Ok((vec![cert], key))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_signed_fallback_builds_acceptor() {
        let dir = tempfile::tempdir().expect("tempdir");
        build_acceptor(dir.path()).expect("self-signed acceptor");
    }

    #[test]
    fn test_loads_pem_pair_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
            .expect("generate");
        std::fs::write(dir.path().join("cert.pem"), certified.cert.pem()).expect("cert");
        std::fs::write(dir.path().join("key.pem"), certified.key_pair.serialize_pem())
            .expect("key");
        build_acceptor(dir.path()).expect("acceptor from pem pair");
    }

    #[test]
    fn test_garbage_cert_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("cert.pem"), "not a certificate").expect("cert");
        std::fs::write(dir.path().join("key.pem"), "not a key").expect("key");
        match build_acceptor(dir.path()) {
            Err(TlsError::NoCerts(_)) | Err(TlsError::Io { .. }) => {}
            other => panic!("expected cert rejection, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_missing_key_falls_back_to_self_signed() {
        // Only cert.pem present: the pair is incomplete, so the fallback
        // path must be taken rather than erroring.
        let dir = tempfile::tempdir().expect("tempdir");
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
            .expect("generate");
        std::fs::write(dir.path().join("cert.pem"), certified.cert.pem()).expect("cert");
        build_acceptor(dir.path()).expect("fallback acceptor");
    }
}
