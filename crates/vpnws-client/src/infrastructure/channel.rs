//! The secure channel to the remote tunnel endpoint.
//!
//! A [`SecureChannel`] is a WebSocket connection, usually over TLS, that
//! carries one Ethernet frame per binary message.  Opening performs the full
//! stack in order: client certificate load and evaluation, rustls client
//! configuration (with the certificate presented for client auth), TCP dial,
//! TLS handshake, WebSocket upgrade with `Origin` and `Authorization: Basic`
//! headers.
//!
//! After the handshake the stream is split; the read half and write half
//! live behind separate locks so the two pump directions never contend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION, ORIGIN};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{
    connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use vpnws_core::{EndpointError, FrameIo, TunnelEndpoint};

use crate::domain::config::ChannelConfig;
use crate::infrastructure::certificate::{
    CertificateBundle, CertificateError, CertificateStore, VerificationOutcome,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Failures opening or closing the channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The remote endpoint requires a client certificate; refusing to dial
    /// without one beats a guaranteed rejection after the handshake.
    #[error("no client certificate bundle configured")]
    MissingCertificate,

    #[error(transparent)]
    Certificate(#[from] CertificateError),

    /// The client certificate is outside its validity window.  Distinct
    /// from other verification failures so operators can tell a renewal
    /// problem from a broken bundle.
    #[error("client certificate has expired or is not yet valid")]
    CertificateExpired,

    #[error("client certificate is invalid: {0}")]
    CertificateInvalid(String),

    #[error("invalid endpoint URL '{url}': {reason}")]
    BadUrl { url: String, reason: String },

    #[error("invalid handshake header value: {0}")]
    Header(String),

    #[error("TLS configuration failed: {0}")]
    Tls(String),

    #[error("WebSocket handshake failed: {0}")]
    Handshake(String),
}

/// A WebSocket frame channel with the tunnel endpoint lifecycle.
pub struct SecureChannel {
    url: String,
    closed: AtomicBool,
    reader: Mutex<Option<SplitStream<WsStream>>>,
    writer: Mutex<Option<SplitSink<WsStream, Message>>>,
}

impl SecureChannel {
    /// Dials the configured endpoint and performs the full handshake.
    ///
    /// Certificate policy: decoding failures are always fatal; an
    /// [`VerificationOutcome::Expired`] or [`VerificationOutcome::OtherInvalid`]
    /// outcome is fatal unless `skip_verify_client` is set;
    /// [`VerificationOutcome::UnknownAuthority`] is always tolerated.
    ///
    /// # Errors
    ///
    /// See [`ChannelError`]; every variant except the certificate ones maps
    /// to a dial or handshake failure.
    pub async fn open(config: &ChannelConfig) -> Result<Self, ChannelError> {
        ensure_crypto_provider();

        if config.pkcs12_path.is_empty() {
            return Err(ChannelError::MissingCertificate);
        }
        let (bundle, outcome) =
            CertificateStore::load(&config.pkcs12_path, &config.pkcs12_password)?;
        match outcome {
            VerificationOutcome::Valid => {
                debug!("client certificate chain verified against the local pool")
            }
            VerificationOutcome::UnknownAuthority => {
                warn!("client certificate authority is not in the local pool; proceeding")
            }
            VerificationOutcome::Expired => {
                if config.skip_verify_client {
                    warn!("client certificate is expired; proceeding (--skip-verify-client)");
                } else {
                    return Err(ChannelError::CertificateExpired);
                }
            }
            VerificationOutcome::OtherInvalid(reason) => {
                if config.skip_verify_client {
                    warn!("client certificate is invalid ({reason}); proceeding (--skip-verify-client)");
                } else {
                    return Err(ChannelError::CertificateInvalid(reason));
                }
            }
        }

        let tls = build_tls_config(bundle, config.skip_verify_server)?;

        let mut request =
            config
                .url
                .as_str()
                .into_client_request()
                .map_err(|e| ChannelError::BadUrl {
                    url: config.url.clone(),
                    reason: e.to_string(),
                })?;
        let headers = request.headers_mut();
        headers.insert(
            ORIGIN,
            HeaderValue::from_str(&config.origin).map_err(|e| ChannelError::Header(e.to_string()))?,
        );
        let credentials = base64_encode(format!("{}:{}", config.username, config.password).as_bytes());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {credentials}"))
                .map_err(|e| ChannelError::Header(e.to_string()))?,
        );

        let (stream, response) = connect_async_tls_with_config(
            request,
            None,
            false,
            Some(Connector::Rustls(Arc::new(tls))),
        )
        .await
        .map_err(|e| ChannelError::Handshake(e.to_string()))?;

        debug!(status = %response.status(), "websocket upgrade accepted");
        info!("secure channel open to {}", config.url);
        Ok(Self::from_stream(config.url.clone(), stream))
    }

    /// Wraps an already-established WebSocket stream.
    fn from_stream(url: String, stream: WsStream) -> Self {
        let (sink, source) = stream.split();
        Self {
            url,
            closed: AtomicBool::new(false),
            reader: Mutex::new(Some(source)),
            writer: Mutex::new(Some(sink)),
        }
    }
}

#[async_trait]
impl FrameIo for SecureChannel {
    async fn read_frame(&self, max_len: usize) -> Result<Vec<u8>, EndpointError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EndpointError::NotOpen);
        }
        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or(EndpointError::NotOpen)?;
        loop {
            match reader.next().await {
                // Oversized remote frames are capped at `max_len`, the same
                // contract the interface side applies to oversized frames.
                Some(Ok(Message::Binary(mut frame))) => {
                    frame.truncate(max_len);
                    return Ok(frame);
                }
                // Some servers send frames as text; the payload is the frame
                Some(Ok(Message::Text(text))) => {
                    let mut frame = text.into_bytes();
                    frame.truncate(max_len);
                    return Ok(frame);
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Ok(Message::Close(_))) | None => return Err(EndpointError::Closed),
                Some(Err(e)) => return Err(EndpointError::Io(e.to_string())),
            }
        }
    }

    async fn write_frame(&self, frame: Vec<u8>) -> Result<(), EndpointError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EndpointError::NotOpen);
        }
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(EndpointError::NotOpen)?;
        writer
            .send(Message::Binary(frame))
            .await
            .map_err(|e| EndpointError::Io(e.to_string()))
    }
}

#[async_trait]
impl TunnelEndpoint for SecureChannel {
    fn endpoint_name(&self) -> String {
        self.url.clone()
    }

    /// Sends a close frame and discards both stream halves.
    ///
    /// Idempotent.  `try_lock` is used for both halves: a half held by an
    /// abandoned, still-blocked operation stays with that task and is
    /// discarded when the task eventually finishes.
    async fn close(&self) -> Result<(), EndpointError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Ok(mut guard) = self.reader.try_lock() {
            guard.take();
        }
        match self.writer.try_lock() {
            Ok(mut guard) => match guard.take() {
                Some(mut sink) => sink
                    .close()
                    .await
                    .map_err(|e| EndpointError::Io(e.to_string())),
                None => Ok(()),
            },
            Err(_) => Ok(()),
        }
    }
}

// ── TLS client configuration ──────────────────────────────────────────────────

/// Server certificate verifier that accepts anything.
///
/// Used only when the operator passes `--skip-verify-server`, for endpoints
/// fronted by self-signed or otherwise unverifiable TLS.
#[derive(Debug)]
struct InsecureServerCertVerifier;

impl rustls::client::danger::ServerCertVerifier for InsecureServerCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

fn build_tls_config(
    bundle: CertificateBundle,
    skip_verify_server: bool,
) -> Result<rustls::ClientConfig, ChannelError> {
    let builder = if skip_verify_server {
        rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(InsecureServerCertVerifier))
    } else {
        let roots =
            rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        rustls::ClientConfig::builder().with_root_certificates(roots)
    };
    builder
        .with_client_auth_cert(bundle.chain, bundle.key)
        .map_err(|e| ChannelError::Tls(e.to_string()))
}

static INIT_CRYPTO: Once = Once::new();

/// Installs the ring provider as the process default, once.
///
/// `ClientConfig::builder()` panics when more than one provider is compiled
/// in and none has been installed.
fn ensure_crypto_provider() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

// ── Base64 (for the Basic-Auth header) ────────────────────────────────────────

/// Encodes bytes as RFC 4648 base64 with padding.
///
/// Only the `Authorization: Basic` header needs this; a ten-line local
/// encoder beats a dependency.
pub fn base64_encode(data: &[u8]) -> String {
    const ALPHABET: &[u8; 64] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = String::with_capacity(data.len().div_ceil(3) * 4);
    for chunk in data.chunks(3) {
        let n = (u32::from(chunk[0]) << 16)
            | (u32::from(*chunk.get(1).unwrap_or(&0)) << 8)
            | u32::from(*chunk.get(2).unwrap_or(&0));
        out.push(ALPHABET[(n >> 18 & 63) as usize] as char);
        out.push(ALPHABET[(n >> 12 & 63) as usize] as char);
        out.push(if chunk.len() > 1 {
            ALPHABET[(n >> 6 & 63) as usize] as char
        } else {
            '='
        });
        out.push(if chunk.len() > 2 {
            ALPHABET[(n & 63) as usize] as char
        } else {
            '='
        });
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
