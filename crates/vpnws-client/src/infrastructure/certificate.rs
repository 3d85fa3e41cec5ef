//! Client certificate loading and trust evaluation.
//!
//! The remote endpoint authenticates clients with a TLS client certificate
//! carried in a PKCS#12 bundle.  Loading and verification are deliberately
//! separate concerns: a bundle that cannot be decoded is always fatal, while
//! a bundle that decodes but fails trust evaluation still yields usable key
//! material plus a [`VerificationOutcome`] describing what is wrong with it.
//! The channel decides what to do with that outcome.
//!
//! Deployments routinely run with certificates issued by a private authority
//! that is not in the local trust pool, so [`VerificationOutcome::UnknownAuthority`]
//! is informational rather than an error.

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use thiserror::Error;
use x509_parser::prelude::{FromDer, X509Certificate};

/// Key material decoded from a PKCS#12 bundle.
///
/// Owned exclusively by the channel that loads it; a fresh bundle is decoded
/// for every open, never reused across sessions.
pub struct CertificateBundle {
    /// Certificate chain, leaf first.
    pub chain: Vec<CertificateDer<'static>>,
    /// Private key matching the leaf.
    pub key: PrivateKeyDer<'static>,
}

/// Result of evaluating the decoded chain against the local trust pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// The chain terminates at a trust anchor in the local pool.
    Valid,
    /// The chain is internally consistent but its root is not in the local
    /// pool.  Tolerated: private authorities are the common case here.
    UnknownAuthority,
    /// The leaf is outside its validity window (expired or not yet valid).
    Expired,
    /// The chain is broken: unparseable, empty, or a signature in it does
    /// not verify.
    OtherInvalid(String),
}

/// Failures that prevent key material from being produced at all.
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("failed to read PKCS#12 bundle at '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    /// Corrupt bundle or wrong bundle password.
    #[error("failed to decode PKCS#12 bundle: {0}")]
    Decode(String),

    #[error("PKCS#12 bundle contains no private key entry")]
    NoKey,

    #[error("unsupported private key encoding: {0}")]
    Key(String),
}

/// Loads and evaluates client certificate bundles.
pub struct CertificateStore;

impl CertificateStore {
    /// Reads a PKCS#12 bundle and evaluates its certificate chain.
    ///
    /// Always returns the bundle when decoding succeeds, together with the
    /// verification outcome — an expired or untrusted certificate is still
    /// presentable key material, and the caller chooses whether to use it.
    ///
    /// # Errors
    ///
    /// Only decode-level failures: unreadable file, corrupt bundle, wrong
    /// password, missing key entry, or a key encoding rustls cannot take.
    pub fn load(
        path: &str,
        password: &str,
    ) -> Result<(CertificateBundle, VerificationOutcome), CertificateError> {
        let bytes = std::fs::read(path).map_err(|source| CertificateError::Read {
            path: path.to_string(),
            source,
        })?;

        let store = p12_keystore::KeyStore::from_pkcs12(&bytes, password)
            .map_err(|e| CertificateError::Decode(e.to_string()))?;

        let (key_der, chain_der) = store
            .entries()
            .find_map(|(_, entry)| match entry {
                p12_keystore::KeyStoreEntry::PrivateKeyChain(chain) => Some((
                    chain.key().to_vec(),
                    chain
                        .chain()
                        .iter()
                        .map(|cert| cert.as_der().to_vec())
                        .collect::<Vec<_>>(),
                )),
                _ => None,
            })
            .ok_or(CertificateError::NoKey)?;

        let outcome = classify_chain(&chain_der);

        let key = PrivateKeyDer::try_from(key_der)
            .map_err(|e| CertificateError::Key(e.to_string()))?;
        let chain = chain_der.into_iter().map(CertificateDer::from).collect();

        Ok((CertificateBundle { chain, key }, outcome))
    }
}

/// Evaluates a DER certificate chain (leaf first).
///
/// Expiry of the leaf wins over every other finding so the caller can
/// surface it distinctly.  Signature problems anywhere in the chain are
/// [`VerificationOutcome::OtherInvalid`]; a consistent chain is `Valid` when
/// its top issuer is a known trust anchor and `UnknownAuthority` otherwise.
pub fn classify_chain(chain_der: &[Vec<u8>]) -> VerificationOutcome {
    let mut certs = Vec::with_capacity(chain_der.len());
    for der in chain_der {
        match X509Certificate::from_der(der) {
            Ok((_, cert)) => certs.push(cert),
            Err(e) => {
                return VerificationOutcome::OtherInvalid(format!(
                    "unparseable certificate in chain: {e}"
                ))
            }
        }
    }

    let Some(leaf) = certs.first() else {
        return VerificationOutcome::OtherInvalid("empty certificate chain".to_string());
    };
    if !leaf.validity().is_valid() {
        return VerificationOutcome::Expired;
    }

    // Each certificate must be signed by the next one up.
    for pair in certs.windows(2) {
        if let Err(e) = pair[0].verify_signature(Some(pair[1].public_key())) {
            return VerificationOutcome::OtherInvalid(format!(
                "chain signature verification failed: {e}"
            ));
        }
    }

    let Some(top) = certs.last() else {
        return VerificationOutcome::OtherInvalid("empty certificate chain".to_string());
    };
    if top.subject().as_raw() == top.issuer().as_raw() {
        if let Err(e) = top.verify_signature(None) {
            return VerificationOutcome::OtherInvalid(format!(
                "self-signature verification failed: {e}"
            ));
        }
    }

    if issued_by_known_root(top) {
        VerificationOutcome::Valid
    } else {
        VerificationOutcome::UnknownAuthority
    }
}

/// Whether the chain top's issuer matches a trust anchor subject.
fn issued_by_known_root(top: &X509Certificate<'_>) -> bool {
    let issuer = der_value(top.issuer().as_raw());
    webpki_roots::TLS_SERVER_ROOTS
        .iter()
        .any(|anchor| anchor.subject.as_ref() == issuer)
}

/// Strips the outer tag and length octets from a DER element.
///
/// Trust anchor subjects are stored as content octets without the header;
/// `x509-parser` hands out the full element.
fn der_value(raw: &[u8]) -> &[u8] {
    match raw {
        [_, len, rest @ ..] if *len < 0x80 => rest,
        [_, 0x81, _, rest @ ..] => rest,
        [_, 0x82, _, _, rest @ ..] => rest,
        _ => raw,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a self-signed certificate valid between the given years.
    fn self_signed_der(from_year: i32, to_year: i32) -> Vec<u8> {
        let mut params = rcgen::CertificateParams::new(vec!["vpnws.test".to_string()])
            .expect("certificate params");
        params.not_before = rcgen::date_time_ymd(from_year, 1, 1);
        params.not_after = rcgen::date_time_ymd(to_year, 1, 1);
        let key = rcgen::KeyPair::generate().expect("key pair");
        let cert = params.self_signed(&key).expect("self-signed certificate");
        cert.der().to_vec()
    }

    #[test]
    fn test_valid_self_signed_chain_is_unknown_authority_not_an_error() {
        // Arrange: a private, in-window certificate
        let der = self_signed_der(2020, 2120);

        // Act
        let outcome = classify_chain(&[der]);

        // Assert: not in the public pool, but tolerated
        assert_eq!(outcome, VerificationOutcome::UnknownAuthority);
    }

    #[test]
    fn test_expired_certificate_is_reported_distinctly() {
        let der = self_signed_der(2000, 2001);
        assert_eq!(classify_chain(&[der]), VerificationOutcome::Expired);
    }

    #[test]
    fn test_not_yet_valid_certificate_counts_as_expired() {
        let der = self_signed_der(2100, 2120);
        assert_eq!(classify_chain(&[der]), VerificationOutcome::Expired);
    }

    #[test]
    fn test_garbage_chain_is_other_invalid() {
        let outcome = classify_chain(&[vec![0xDE, 0xAD, 0xBE, 0xEF]]);
        assert!(matches!(outcome, VerificationOutcome::OtherInvalid(_)));
    }

    #[test]
    fn test_empty_chain_is_other_invalid() {
        let outcome = classify_chain(&[]);
        assert!(matches!(outcome, VerificationOutcome::OtherInvalid(_)));
    }

    #[test]
    fn test_load_missing_file_is_a_read_error() {
        // Arrange / Act
        let result = CertificateStore::load("/nonexistent/bundle.p12", "secret");

        // Assert: fatal, and distinct from any verification outcome
        assert!(matches!(result, Err(CertificateError::Read { .. })));
    }

    #[test]
    fn test_load_corrupt_bundle_is_a_decode_error() {
        // Arrange: a file that is not PKCS#12
        let path = std::env::temp_dir().join(format!(
            "vpnws-corrupt-bundle-{}.p12",
            std::process::id()
        ));
        std::fs::write(&path, b"this is not a keystore").expect("write temp file");

        // Act
        let result = CertificateStore::load(path.to_str().expect("utf-8 path"), "secret");
        let _ = std::fs::remove_file(&path);

        // Assert
        assert!(matches!(result, Err(CertificateError::Decode(_))));
    }

    #[test]
    fn test_der_value_strips_short_form_header() {
        // SEQUENCE, length 3, content [1, 2, 3]
        let raw = [0x30, 0x03, 1, 2, 3];
        assert_eq!(der_value(&raw), &[1, 2, 3]);
    }

    #[test]
    fn test_der_value_strips_long_form_headers() {
        let mut raw = vec![0x30, 0x81, 0x80];
        raw.extend(std::iter::repeat(7u8).take(0x80));
        assert_eq!(der_value(&raw).len(), 0x80);
        assert!(der_value(&raw).iter().all(|&b| b == 7));
    }
}
