//! TLS material loading for the HTTPS frontend.
//!
//! The server presents the certificate and private key found in its home
//! folder; both are PEM files and both are mandatory.

use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use rustls::ServerConfig;

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("TLS certificate not found: {0}")]
    CertNotFound(PathBuf),

    #[error("TLS private key not found: {0}")]
    KeyNotFound(PathBuf),

    #[error("no private key found in: {0}")]
    NoPrivateKey(PathBuf),

    #[error("invalid TLS material: {0}")]
    BadMaterial(String),

    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
}

/// Load the PEM certificate chain and private key into a rustls server
/// configuration usable by the HTTPS listener.
pub async fn load_server_config(
    cert_path: &Path,
    key_path: &Path,
) -> Result<RustlsConfig, TlsError> {
    if !cert_path.exists() {
        return Err(TlsError::CertNotFound(cert_path.to_path_buf()));
    }
    if !key_path.exists() {
        return Err(TlsError::KeyNotFound(key_path.to_path_buf()));
    }

    // Ensure a crypto provider is installed (ring via feature flag).
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cert_pem = tokio::fs::read(cert_path).await?;
    let key_pem = tokio::fs::read(key_path).await?;

    let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(cert_pem.as_slice()))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(TlsError::BadMaterial(format!(
            "no certificates in {}",
            cert_path.display()
        )));
    }

    let key = rustls_pemfile::private_key(&mut BufReader::new(key_pem.as_slice()))?
        .ok_or_else(|| TlsError::NoPrivateKey(key_path.to_path_buf()))?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| TlsError::BadMaterial(e.to_string()))?;

    Ok(RustlsConfig::from_config(Arc::new(config)))
}
