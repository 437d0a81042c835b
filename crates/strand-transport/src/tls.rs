// TLS client configuration for QUIC connections.
//
// The certificate policy is always chosen by the caller; nothing here falls
// back to an insecure verifier on its own.
use anyhow::{Context, Result};
use quinn::ClientConfig as QuinnClientConfig;
use quinn::ServerConfig as QuinnServerConfig;
use quinn::crypto::rustls::{QuicClientConfig, QuicServerConfig};
use rustls::RootCertStore;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use std::fmt;
use std::sync::Arc;

use crate::ConnectError;

/// HTTP/3 ALPN token, the default protocol for strand clients and loopback servers.
pub const DEFAULT_ALPN: &[u8] = b"h3";

/// Certificate verification policy for a connection.
///
/// ```
/// use strand_transport::SecurityPolicy;
///
/// let policy = SecurityPolicy::AcceptAnyCertificate;
/// assert!(!policy.verifies_peer());
/// ```
#[derive(Clone)]
pub enum SecurityPolicy {
    /// Verify the server chain against the given roots.
    Verify(Arc<RootCertStore>),
    /// Accept any certificate. Only meant for lab setups with self-signed certs.
    AcceptAnyCertificate,
}

impl SecurityPolicy {
    pub fn verify_with(
        certs: impl IntoIterator<Item = CertificateDer<'static>>,
    ) -> Result<Self, rustls::Error> {
        let mut roots = RootCertStore::empty();
        for cert in certs {
            roots.add(cert)?;
        }
        Ok(Self::Verify(Arc::new(roots)))
    }

    pub fn verifies_peer(&self) -> bool {
        matches!(self, Self::Verify(_))
    }
}

impl fmt::Debug for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Verify(roots) => f
                .debug_struct("Verify")
                .field("roots", &roots.len())
                .finish(),
            Self::AcceptAnyCertificate => f.write_str("AcceptAnyCertificate"),
        }
    }
}

/// Build a quinn client config for the given policy and ALPN list.
///
/// Exactly `alpn` is advertised; an empty list advertises no protocol, which
/// only succeeds against servers that do not require one.
pub fn client_config(
    policy: &SecurityPolicy,
    alpn: &[Vec<u8>],
) -> Result<QuinnClientConfig, ConnectError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = rustls::ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(|err| ConnectError::Tls(err.to_string()))?;
    let mut crypto = match policy {
        SecurityPolicy::Verify(roots) => builder
            .with_root_certificates(Arc::clone(roots))
            .with_no_client_auth(),
        SecurityPolicy::AcceptAnyCertificate => {
            tracing::warn!("certificate verification disabled for this connection");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyVerifier))
                .with_no_client_auth()
        }
    };
    crypto.alpn_protocols = alpn.to_vec();
    let quic = QuicClientConfig::try_from(crypto).map_err(|err| ConnectError::Tls(err.to_string()))?;
    Ok(QuinnClientConfig::new(Arc::new(quic)))
}

/// Build a quinn server config offering `alpn`, for loopback origins.
pub fn server_config(
    cert_chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    alpn: &[Vec<u8>],
) -> Result<QuinnServerConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut crypto = rustls::ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13])
        .context("select tls versions")?
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)
        .context("load server certificate")?;
    crypto.alpn_protocols = alpn.to_vec();
    let quic = QuicServerConfig::try_from(crypto).context("build quic server crypto")?;
    Ok(QuinnServerConfig::with_crypto(Arc::new(quic)))
}

// Verifier that accepts every certificate and signature.
#[derive(Debug)]
struct AcceptAnyVerifier;

impl ServerCertVerifier for AcceptAnyVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ED25519,
        ]
    }
}
