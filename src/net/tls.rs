//! TLS material loading for the listener and for agent connections.

use std::fs;
use std::io::BufReader;
use std::path::Path;

use axum_server::tls_rustls::RustlsConfig;

/// Pin the process-wide rustls crypto provider.
///
/// Several dependencies enable different rustls backends; without an
/// explicit default, server config construction cannot pick one.
pub fn install_crypto_provider() {
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        tracing::debug!("rustls crypto provider already installed");
    }
}

/// Load listener TLS configuration from certificate and key files.
pub async fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, std::io::Error> {
    if !cert_path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Certificate file not found: {:?}", cert_path),
        ));
    }
    if !key_path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Private key file not found: {:?}", key_path),
        ));
    }

    RustlsConfig::from_pem_file(cert_path, key_path).await
}

/// Read every certificate in a PEM bundle.
///
/// An unreadable file, a malformed entry, or a bundle with no
/// certificates at all is an error.
pub fn load_ca_bundle(path: &Path) -> Result<Vec<reqwest::Certificate>, std::io::Error> {
    let pem = fs::read(path)?;
    let mut reader = BufReader::new(pem.as_slice());

    let mut certs = Vec::new();
    for der in rustls_pemfile::certs(&mut reader) {
        let der = der?;
        let cert = reqwest::Certificate::from_der(der.as_ref())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        certs.push(cert);
    }

    if certs.is_empty() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("no certificates found in {:?}", path),
        ));
    }
    Ok(certs)
}

/// Read a client identity from separate PEM certificate and key files.
pub fn load_identity(cert_path: &Path, key_path: &Path) -> Result<reqwest::Identity, std::io::Error> {
    let mut pem = fs::read(cert_path)?;
    pem.push(b'\n');
    pem.extend(fs::read(key_path)?);
    reqwest::Identity::from_pem(&pem).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}
