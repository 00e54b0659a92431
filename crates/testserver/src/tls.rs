//! TLS support using rustls
//!
//! Certificates and keys come from PEM files or memory. The bundled fixture
//! certificate covers `localhost` and `127.0.0.1`.

use std::path::PathBuf;
#[cfg(feature = "tls")]
use {
    rustls::pki_types::{CertificateDer, PrivateKeyDer},
    std::io::{self, BufRead, BufReader},
    std::sync::Arc,
    testserver_core::{Error, Result},
};

const FIXTURE_CERT: &[u8] = include_bytes!("../fixtures/cert.pem");
const FIXTURE_KEY: &[u8] = include_bytes!("../fixtures/key.pem");

#[derive(Clone, Debug)]
enum PemSource {
    File(PathBuf),
    Memory(Vec<u8>),
}

/// TLS configuration
#[derive(Clone, Debug)]
pub struct TlsConfig {
    cert: PemSource,
    key: PemSource,
    /// ALPN protocols (default: ["http/1.1"])
    pub alpn_protocols: Vec<Vec<u8>>,
}

impl TlsConfig {
    /// Certificate chain and private key from PEM files
    pub fn from_files(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self::with_sources(PemSource::File(cert_path.into()), PemSource::File(key_path.into()))
    }

    /// Certificate chain and private key as PEM text
    pub fn from_pem(cert: impl Into<Vec<u8>>, key: impl Into<Vec<u8>>) -> Self {
        Self::with_sources(PemSource::Memory(cert.into()), PemSource::Memory(key.into()))
    }

    /// Self-signed certificate for `localhost` and `127.0.0.1`
    pub fn fixture() -> Self {
        Self::from_pem(FIXTURE_CERT, FIXTURE_KEY)
    }

    fn with_sources(cert: PemSource, key: PemSource) -> Self {
        Self {
            cert,
            key,
            alpn_protocols: vec![b"http/1.1".to_vec()],
        }
    }

    /// Build rustls ServerConfig
    #[cfg(feature = "tls")]
    pub fn build_server_config(&self) -> Result<Arc<rustls::ServerConfig>> {
        let certs = load_certs(open(&self.cert)?)?;
        let key = load_private_key(open(&self.key)?)?;

        // Pin the ring provider so the process-wide default never matters
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut config = rustls::ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::Tls(e.to_string()))?
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| Error::Tls(e.to_string()))?;
        config.alpn_protocols = self.alpn_protocols.clone();

        Ok(Arc::new(config))
    }

    #[cfg(feature = "tls")]
    pub fn build_acceptor(&self) -> Result<tokio_rustls::TlsAcceptor> {
        Ok(tokio_rustls::TlsAcceptor::from(self.build_server_config()?))
    }
}

#[cfg(feature = "tls")]
fn open(source: &PemSource) -> Result<Box<dyn BufRead>> {
    match source {
        PemSource::File(path) => {
            let file = std::fs::File::open(path)
                .map_err(|e| Error::Tls(format!("Failed to open {}: {}", path.display(), e)))?;
            Ok(Box::new(BufReader::new(file)))
        }
        PemSource::Memory(pem) => Ok(Box::new(io::Cursor::new(pem.clone()))),
    }
}

/// Load certificates from PEM
#[cfg(feature = "tls")]
pub fn load_certs(mut reader: impl BufRead) -> Result<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Tls(format!("Failed to parse certs: {}", e)))?;

    if certs.is_empty() {
        return Err(Error::Tls("No certificates found".to_string()));
    }

    Ok(certs)
}

/// Load the first private key (PKCS#1, PKCS#8 or SEC1) from PEM
#[cfg(feature = "tls")]
pub fn load_private_key(mut reader: impl BufRead) -> Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| Error::Tls(format!("Failed to parse key: {}", e)))?
        .ok_or_else(|| Error::Tls("No private key found".to_string()))
}

/// Alerts a browser sends when it refuses the fixture certificate, plus
/// handshakes cut short by the peer
#[cfg(feature = "tls")]
pub(crate) fn is_benign_tls_error(err: &io::Error) -> bool {
    use rustls::AlertDescription::{BadCertificate, CertificateUnknown, UnknownCA};

    if matches!(
        err.kind(),
        io::ErrorKind::UnexpectedEof | io::ErrorKind::ConnectionReset
    ) {
        return true;
    }
    match err.get_ref().and_then(|inner| inner.downcast_ref::<rustls::Error>()) {
        Some(rustls::Error::AlertReceived(alert)) => {
            matches!(alert, CertificateUnknown | UnknownCA | BadCertificate)
        }
        _ => false,
    }
}

#[cfg(all(test, feature = "tls"))]
mod tests {
    use super::*;
    use rustls::AlertDescription;

    #[test]
    fn test_fixture_builds() {
        let config = TlsConfig::fixture().build_server_config().unwrap();
        assert_eq!(config.alpn_protocols, vec![b"http/1.1".to_vec()]);
    }

    #[test]
    fn test_fixture_files() {
        let dir = env!("CARGO_MANIFEST_DIR");
        let config = TlsConfig::from_files(
            format!("{}/fixtures/cert.pem", dir),
            format!("{}/fixtures/key.pem", dir),
        );
        assert!(config.build_acceptor().is_ok());
    }

    #[test]
    fn test_missing_material() {
        let err = TlsConfig::from_pem(FIXTURE_CERT, "").build_server_config().unwrap_err();
        assert_eq!(err.to_string(), "TLS error: No private key found");

        let err = TlsConfig::from_pem("", FIXTURE_KEY).build_server_config().unwrap_err();
        assert_eq!(err.to_string(), "TLS error: No certificates found");

        let err = TlsConfig::from_files("/nonexistent/cert.pem", "/nonexistent/key.pem")
            .build_server_config()
            .unwrap_err();
        assert!(err.to_string().contains("Failed to open"));
    }

    #[test]
    fn test_benign_alerts() {
        let alert = |desc| io::Error::new(io::ErrorKind::InvalidData, rustls::Error::AlertReceived(desc));

        assert!(is_benign_tls_error(&alert(AlertDescription::CertificateUnknown)));
        assert!(is_benign_tls_error(&alert(AlertDescription::UnknownCA)));
        assert!(is_benign_tls_error(&alert(AlertDescription::BadCertificate)));
        assert!(!is_benign_tls_error(&alert(AlertDescription::HandshakeFailure)));
        assert!(!is_benign_tls_error(&io::Error::new(io::ErrorKind::Other, "boom")));
    }
}
