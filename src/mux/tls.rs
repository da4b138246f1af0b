use log::info;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::pki_types::pem::{self, PemObject};
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

use crate::mux::error::TlsError;

fn pem_error(path: &Path, source: pem::Error) -> TlsError {
    TlsError::Pem {
        path: path.display().to_string(),
        source,
    }
}

/// Server side TLS for station connections from a PEM certificate chain
/// and private key.
pub fn load_acceptor(cert_file: &Path, private_key_file: &Path) -> Result<TlsAcceptor, TlsError> {
    let certs = CertificateDer::pem_file_iter(cert_file)
        .map_err(|e| pem_error(cert_file, e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| pem_error(cert_file, e))?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(cert_file.display().to_string()));
    }
    let key = PrivateKeyDer::from_pem_file(private_key_file)
        .map_err(|e| pem_error(private_key_file, e))?;

    let config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    info!(
        "Loaded station TLS certificate from {}",
        cert_file.display()
    );
    Ok(TlsAcceptor::from(Arc::new(config)))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::PathBuf;

    /// Self-signed certificate for `localhost` written as PEM files.
    pub struct TestCert {
        pub dir: tempfile::TempDir,
        pub cert_file: PathBuf,
        pub key_file: PathBuf,
        pub cert_der: Vec<u8>,
    }

    pub fn self_signed() -> TestCert {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let cert_file = dir.path().join("cert.pem");
        let key_file = dir.path().join("key.pem");
        std::fs::write(&cert_file, cert.pem()).unwrap();
        std::fs::write(&key_file, key_pair.serialize_pem()).unwrap();
        TestCert {
            dir,
            cert_file,
            key_file,
            cert_der: cert.der().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::self_signed;
    use super::*;

    #[test]
    fn loads_pem_pair() {
        let cert = self_signed();
        assert!(load_acceptor(&cert.cert_file, &cert.key_file).is_ok());
    }

    #[test]
    fn missing_or_empty_files_are_errors() {
        let cert = self_signed();
        let missing = cert.dir.path().join("absent.pem");
        assert!(matches!(
            load_acceptor(&missing, &cert.key_file),
            Err(TlsError::Pem { .. })
        ));

        let empty = cert.dir.path().join("empty.pem");
        std::fs::write(&empty, "").unwrap();
        assert!(matches!(
            load_acceptor(&empty, &cert.key_file),
            Err(TlsError::NoCertificates(_))
        ));
        assert!(matches!(
            load_acceptor(&cert.cert_file, &empty),
            Err(TlsError::Pem { .. })
        ));
    }
}
