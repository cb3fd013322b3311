//! TLS client configuration for the upstream connection.

use std::sync::Arc;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{
    ClientConfig, DigitallySignedStruct, Error as TlsError, RootCertStore, SignatureScheme,
};
use tracing::{debug, warn};

use crate::config::IrcConfig;
use crate::error::AdapterError;

/// Accepts any server certificate but still checks handshake signatures,
/// for networks running self-signed certificates.
#[derive(Debug)]
struct AcceptAnyCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

fn tls_error(e: impl std::fmt::Display) -> AdapterError {
    AdapterError::Tls(e.to_string())
}

fn root_store(irc: &IrcConfig) -> Result<RootCertStore, AdapterError> {
    let mut roots = RootCertStore::empty();

    // Extra CA first so a broken path is reported even on hosts with roots.
    if let Some(path) = &irc.ca_file {
        let pem = std::fs::read(path)
            .map_err(|e| tls_error(format!("reading {}: {e}", path.display())))?;
        for cert in rustls_pemfile::certs(&mut pem.as_slice()) {
            let cert = cert.map_err(|e| tls_error(format!("parsing {}: {e}", path.display())))?;
            roots.add(cert).map_err(tls_error)?;
        }
    }

    let native = rustls_native_certs::load_native_certs();
    for e in &native.errors {
        warn!(error = %e, "Failed to load some platform certificates");
    }
    let (added, ignored) = roots.add_parsable_certificates(native.certs);
    debug!(added, ignored, "Loaded platform root certificates");

    if roots.is_empty() {
        return Err(tls_error("no trusted root certificates available"));
    }
    Ok(roots)
}

/// Client config for `irc`, honouring `ca_file` and `accept_invalid_certs`.
pub fn client_config(irc: &IrcConfig) -> Result<Arc<ClientConfig>, AdapterError> {
    let provider = Arc::new(tokio_rustls::rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(tls_error)?;

    let config = if irc.accept_invalid_certs {
        warn!(server = %irc.server, "Certificate verification disabled for upstream connection");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert(provider)))
            .with_no_client_auth()
    } else {
        builder
            .with_root_certificates(root_store(irc)?)
            .with_no_client_auth()
    };
    Ok(Arc::new(config))
}

pub fn server_name(host: &str) -> Result<ServerName<'static>, AdapterError> {
    ServerName::try_from(host.to_string()).map_err(tls_error)
}
