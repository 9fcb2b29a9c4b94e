//! Loading of the PEM material behind mutual TLS between managers and workers.

use crate::config::TlsConfig;

use rustls_pemfile::Item;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tokio::fs;
use tonic::transport::{Certificate, ClientTlsConfig, Identity, ServerTlsConfig};

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("CA certificate path not configured")]
    MissingCaCert,
    #[error("node certificate path not configured")]
    MissingCert,
    #[error("private key path not configured")]
    MissingKey,
    #[error("{0} does not exist")]
    NotFound(PathBuf),
    #[error("{0} holds no PEM certificate")]
    NoCertificates(PathBuf),
    #[error("{0} holds no PEM private key")]
    NoPrivateKey(PathBuf),
    #[error("failed to read TLS material: {0}")]
    Io(#[from] std::io::Error),
}

/// A node's certificate and key plus the CA its peers must chain to.
#[derive(Clone)]
pub struct TlsIdentity {
    identity: Identity,
    ca_cert: Certificate,
    domain_name: String,
}

impl TlsIdentity {
    /// `None` when TLS is switched off.
    pub async fn from_config(config: &TlsConfig) -> Result<Option<Self>, TlsError> {
        if !config.enabled {
            return Ok(None);
        }
        Self::load(config).await.map(Some)
    }

    /// Read and sanity check every file named by `config`.
    ///
    /// A file that exists but carries no PEM block of the expected kind is rejected here, rather
    /// than at the first handshake.
    pub async fn load(config: &TlsConfig) -> Result<Self, TlsError> {
        let ca_cert_path = config.ca_cert_path.as_ref().ok_or(TlsError::MissingCaCert)?;
        let cert_path = config.cert_path.as_ref().ok_or(TlsError::MissingCert)?;
        let key_path = config.key_path.as_ref().ok_or(TlsError::MissingKey)?;

        let ca_pem = read_pem(ca_cert_path).await?;
        let cert_pem = read_pem(cert_path).await?;
        let key_pem = read_pem(key_path).await?;

        ensure_certificates(ca_cert_path, &ca_pem)?;
        ensure_certificates(cert_path, &cert_pem)?;
        ensure_private_key(key_path, &key_pem)?;

        Ok(Self {
            identity: Identity::from_pem(cert_pem, key_pem),
            ca_cert: Certificate::from_pem(ca_pem),
            domain_name: config.domain_name.clone(),
        })
    }

    /// Present our certificate and require one from every client.
    pub fn server_tls_config(&self) -> ServerTlsConfig {
        ServerTlsConfig::new()
            .identity(self.identity.clone())
            .client_ca_root(self.ca_cert.clone())
    }

    pub fn client_tls_config(&self) -> ClientTlsConfig {
        // peers are dialed by address, so the server name is the shared cluster name
        ClientTlsConfig::new()
            .domain_name(self.domain_name.clone())
            .ca_certificate(self.ca_cert.clone())
            .identity(self.identity.clone())
    }
}

async fn read_pem(path: &Path) -> Result<Vec<u8>, TlsError> {
    if !path.exists() {
        return Err(TlsError::NotFound(path.to_path_buf()));
    }
    Ok(fs::read(path).await?)
}

fn ensure_certificates(path: &Path, pem: &[u8]) -> Result<(), TlsError> {
    let certs = rustls_pemfile::certs(&mut Cursor::new(pem))?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.to_path_buf()));
    }
    Ok(())
}

fn ensure_private_key(path: &Path, pem: &[u8]) -> Result<(), TlsError> {
    let items = rustls_pemfile::read_all(&mut Cursor::new(pem))?;
    let has_key = items
        .iter()
        .any(|item| matches!(item, Item::RSAKey(_) | Item::PKCS8Key(_) | Item::ECKey(_)));
    if !has_key {
        return Err(TlsError::NoPrivateKey(path.to_path_buf()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn enabled(ca: &Path, cert: &Path, key: &Path) -> TlsConfig {
        TlsConfig {
            enabled: true,
            ca_cert_path: Some(ca.to_path_buf()),
            cert_path: Some(cert.to_path_buf()),
            key_path: Some(key.to_path_buf()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn disabled_tls_loads_nothing() {
        let identity = TlsIdentity::from_config(&TlsConfig::default()).await.unwrap();
        assert!(identity.is_none());
    }

    #[tokio::test]
    async fn missing_paths_are_reported_in_order() {
        let config = TlsConfig {
            enabled: true,
            ..Default::default()
        };
        let result = TlsIdentity::from_config(&config).await;
        assert!(matches!(result, Err(TlsError::MissingCaCert)));

        let config = TlsConfig {
            enabled: true,
            ca_cert_path: Some(PathBuf::from("/ca.pem")),
            ..Default::default()
        };
        let result = TlsIdentity::load(&config).await;
        assert!(matches!(result, Err(TlsError::MissingCert)));
    }

    #[tokio::test]
    async fn nonexistent_files_are_rejected() {
        let config = enabled(
            Path::new("/nonexistent/ca.pem"),
            Path::new("/nonexistent/node.pem"),
            Path::new("/nonexistent/node.key"),
        );
        let result = TlsIdentity::load(&config).await;
        assert!(matches!(result, Err(TlsError::NotFound(path)) if path.ends_with("ca.pem")));
    }

    #[tokio::test]
    async fn files_without_pem_blocks_are_rejected() {
        let mut garbage = tempfile::NamedTempFile::new().unwrap();
        writeln!(garbage, "this is not a certificate").unwrap();
        let config = enabled(garbage.path(), garbage.path(), garbage.path());

        let result = TlsIdentity::load(&config).await;
        assert!(matches!(result, Err(TlsError::NoCertificates(_))));
    }

    #[test]
    fn every_private_key_encoding_is_accepted() {
        let path = Path::new("node.key");
        for label in ["RSA PRIVATE KEY", "PRIVATE KEY", "EC PRIVATE KEY"] {
            let pem = format!("-----BEGIN {0}-----\nMHcCAQEEIA==\n-----END {0}-----\n", label);
            assert!(
                ensure_private_key(path, pem.as_bytes()).is_ok(),
                "{} was refused",
                label
            );
        }

        let cert_only = "-----BEGIN CERTIFICATE-----\nMHcCAQEEIA==\n-----END CERTIFICATE-----\n";
        let result = ensure_private_key(path, cert_only.as_bytes());
        assert!(matches!(result, Err(TlsError::NoPrivateKey(_))));
    }
}
