//! Byte transport to the broker.

use crate::{CertificateVerification, ConnectionError, ConnectionResult, Settings};
use async_trait::async_trait;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::warn;

/// Opens and secures byte streams to the broker.
///
/// The two steps are separate so the client can report which one failed.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Plain stream returned by [`Transport::dial`].
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;
    /// Encrypted stream returned by [`Transport::secure`].
    type Secured: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Open a stream to `addr` (`host:port`).
    async fn dial(&self, addr: &str) -> ConnectionResult<Self::Stream>;

    /// Run the encryption handshake over a dialed stream.
    async fn secure(&self, server_name: &str, stream: Self::Stream)
        -> ConnectionResult<Self::Secured>;
}

/// TCP + TLS transport backed by rustls.
#[derive(Clone)]
pub struct TlsTransport {
    connector: TlsConnector,
    verification: CertificateVerification,
}

impl TlsTransport {
    /// Build a transport with the given certificate policy.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Tls`] if the TLS configuration cannot be built.
    pub fn new(verification: CertificateVerification) -> ConnectionResult<Self> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let builder = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| ConnectionError::Tls(format!("protocol versions: {e}")))?;

        let config = match verification {
            CertificateVerification::Enabled => {
                let roots = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
                builder.with_root_certificates(roots).with_no_client_auth()
            }
            CertificateVerification::InsecureSkipVerify => builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
                .with_no_client_auth(),
        };

        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
            verification,
        })
    }

    /// Transport matching the certificate policy in `settings`.
    pub fn from_settings(settings: &Settings) -> ConnectionResult<Self> {
        Self::new(settings.certificate_verification())
    }
}

#[async_trait]
impl Transport for TlsTransport {
    type Stream = TcpStream;
    type Secured = TlsStream<TcpStream>;

    async fn dial(&self, addr: &str) -> ConnectionResult<TcpStream> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ConnectionError::Dial {
                addr: addr.to_string(),
                source,
            })?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    async fn secure(
        &self,
        server_name: &str,
        stream: TcpStream,
    ) -> ConnectionResult<TlsStream<TcpStream>> {
        let name = ServerName::try_from(server_name.to_string())
            .map_err(|_| ConnectionError::InvalidServerName(server_name.to_string()))?;

        if self.verification == CertificateVerification::InsecureSkipVerify {
            warn!(
                server_name = %server_name,
                "TLS certificate verification is disabled for this broker"
            );
        }

        self.connector
            .connect(name, stream)
            .await
            .map_err(|e| ConnectionError::Tls(e.to_string()))
    }
}

/// Verifier that accepts any server certificate but still checks handshake
/// signatures, so the session keys are bound to the presented certificate.
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
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
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
