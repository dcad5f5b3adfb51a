//! TLS client setup for the `https` upstream
//!
//! Certificates are verified against the platform roots plus an optional
//! PEM bundle. Verification can only be disabled explicitly through
//! `tls.skip_verify`.

use crate::config::TlsConfig;
use anyhow::{Context, Result};
use std::io::BufReader;
use std::sync::Arc;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_rustls::TlsConnector;
use tracing::warn;

/// Builds the rustls connector and server name for a proxy
#[derive(Clone)]
pub struct TlsConnectorBuilder {
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

impl std::fmt::Debug for TlsConnectorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConnectorBuilder")
            .field("server_name", &self.server_name)
            .finish()
    }
}

impl TlsConnectorBuilder {
    /// Create a TLS client for `proxy_host` with the given trust policy
    pub fn new(config: &TlsConfig, proxy_host: &str) -> Result<Self> {
        let tls_config = if config.skip_verify {
            warn!(
                "TLS certificate verification disabled for upstream proxy {}",
                proxy_host
            );
            ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerifier))
                .with_no_client_auth()
        } else {
            ClientConfig::builder()
                .with_root_certificates(load_root_store(config)?)
                .with_no_client_auth()
        };

        let hostname = config.hostname.as_deref().unwrap_or(proxy_host);
        let hostname = hostname.trim_start_matches('[').trim_end_matches(']');
        let server_name = ServerName::try_from(hostname.to_string())
            .with_context(|| format!("Invalid TLS server name: {}", hostname))?;

        Ok(TlsConnectorBuilder {
            connector: TlsConnector::from(Arc::new(tls_config)),
            server_name,
        })
    }

    /// The connector to run handshakes with
    pub fn connector(&self) -> &TlsConnector {
        &self.connector
    }

    /// Name sent in SNI and checked against the certificate
    pub fn server_name(&self) -> ServerName<'static> {
        self.server_name.clone()
    }
}

fn load_root_store(config: &TlsConfig) -> Result<RootCertStore> {
    let mut root_store = RootCertStore::empty();

    // Add system root certificates
    let native_certs = rustls_native_certs::load_native_certs();
    for cert in native_certs.certs {
        root_store.add(cert).ok();
    }

    // Add custom trusted root if specified
    if let Some(ref root_path) = config.trusted_root {
        let file = std::fs::File::open(root_path)
            .with_context(|| format!("Failed to open certificate file: {}", root_path))?;
        let mut reader = BufReader::new(file);
        let certs = rustls_pemfile::certs(&mut reader)
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to parse certificates from: {}", root_path))?;
        for cert in certs {
            root_store
                .add(cert)
                .with_context(|| "Failed to add certificate to store")?;
        }
    }

    Ok(root_store)
}

/// Certificate verifier that accepts all certificates
#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, tokio_rustls::rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}
