//! Test harness: a real server on an ephemeral port over a temp corpus.
//!
//! Each `TestServer` owns its temp dir and runs the full supervisor stack
//! in-process; clients talk to it over real sockets.

use linesearch_core::{build_index, resolve_algorithm, IndexKind};
use linesearch_server::conn::ConnContext;
use linesearch_server::dispatch::{Dispatcher, Strategy};
use linesearch_server::qlog::QueryLog;
use linesearch_server::supervisor::Server;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;

pub struct TestServer {
    pub addr: SocketAddr,
    pub corpus_path: PathBuf,
    _dir: tempfile::TempDir,
}

impl TestServer {
    /// Preloaded mode with the given index variant.
    pub async fn preloaded(corpus: &[u8], kind: IndexKind) -> TestServer {
        let (dir, corpus_path) = write_corpus(corpus);
        let index = build_index(kind, &corpus_path).expect("index build");
        Self::start(dir, corpus_path, Strategy::Preloaded { index }, None).await
    }

    /// Reread mode with a named registry algorithm.
    pub async fn reread(corpus: &[u8], algorithm: &str) -> TestServer {
        let (dir, corpus_path) = write_corpus(corpus);
        let algo = resolve_algorithm(algorithm).expect("algorithm in registry");
        let strategy = Strategy::Reread { scan: algo.scan, path: corpus_path.clone() };
        Self::start(dir, corpus_path, strategy, None).await
    }

    /// Preloaded hash index behind a TLS acceptor built from PEM files
    /// written into the server's own directory.
    pub async fn preloaded_tls(corpus: &[u8]) -> TestServer {
        let (dir, corpus_path) = write_corpus(corpus);
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
            .expect("generate certificate");
        std::fs::write(dir.path().join("cert.pem"), certified.cert.pem()).expect("cert.pem");
        std::fs::write(dir.path().join("key.pem"), certified.key_pair.serialize_pem())
            .expect("key.pem");
        let acceptor =
            linesearch_server::tls::build_acceptor(dir.path()).expect("tls acceptor");
        let index = build_index(IndexKind::Hash, &corpus_path).expect("index build");
        Self::start(dir, corpus_path, Strategy::Preloaded { index }, Some(acceptor)).await
    }

    async fn start(
        dir: tempfile::TempDir,
        corpus_path: PathBuf,
        strategy: Strategy,
        tls: Option<TlsAcceptor>,
    ) -> TestServer {
        let (qlog, _task) = QueryLog::open(&dir.path().join("query.log")).expect("query log");
        let mode = strategy.mode();
        let ctx = Arc::new(ConnContext {
            dispatcher: Dispatcher::new(strategy),
            qlog,
            mode,
            algorithm: "test",
        });
        let server = Server::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0))
            .expect("bind ephemeral port");
        let addr = server.local_addr().expect("local addr");
        tokio::spawn(server.run(ctx, tls));
        TestServer { addr, corpus_path, _dir: dir }
    }

    /// Send raw bytes, half-close, and read the full response until the
    /// server closes. An empty vec means the server closed silently. A
    /// server that drops the socket without reading everything can surface
    /// as a reset rather than a clean EOF; both count as "no response".
    pub async fn query(&self, raw: &[u8]) -> Vec<u8> {
        let mut stream = TcpStream::connect(self.addr).await.expect("connect");
        stream.write_all(raw).await.expect("send query");
        stream.shutdown().await.ok();
        let mut response = Vec::new();
        let _ = stream.read_to_end(&mut response).await;
        response
    }
}

fn write_corpus(corpus: &[u8]) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("corpus.txt");
    std::fs::write(&path, corpus).expect("write corpus");
    (dir, path)
}

// ---------------------------------------------------------------------------
// TLS client pieces (tests only — trusts any server certificate)
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AcceptAnyCert(rustls::crypto::CryptoProvider);

impl AcceptAnyCert {
    pub fn client_config() -> rustls::ClientConfig {
        let provider = rustls::crypto::aws_lc_rs::default_provider();
        rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert(provider)))
            .with_no_client_auth()
    }
}

impl rustls::client::danger::ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls_pki_types::CertificateDer<'_>,
        _intermediates: &[rustls_pki_types::CertificateDer<'_>],
        _server_name: &rustls_pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls_pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls_pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls_pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
