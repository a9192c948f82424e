//! TLS context construction for the HTTP client.
//!
//! Native root certificates are cached after the first load; OS certificate
//! store lookups can be slow on some platforms.

use crate::config::{CaSource, TlsTrust};
use crate::error::HttpError;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::{DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use std::sync::{Arc, OnceLock};

/// Cached native root certificates (empty when none were found).
static NATIVE_ROOTS_CACHE: OnceLock<Vec<CertificateDer<'static>>> = OnceLock::new();

/// Counter for test verification that the loader only runs once.
#[cfg(test)]
static LOAD_COUNT: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

fn load_native_certs_inner() -> Vec<CertificateDer<'static>> {
    #[cfg(test)]
    LOAD_COUNT.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

    let result = rustls_native_certs::load_native_certs();
    for err in &result.errors {
        tracing::warn!(error = %err, "error loading native root certificate");
    }

    if result.certs.is_empty() {
        tracing::warn!("no native root CA certificates found");
    } else {
        tracing::debug!(count = result.certs.len(), "loaded native root certificates");
    }

    result.certs
}

/// Cached native root certificates, loaded on first call.
pub fn native_root_certs() -> &'static [CertificateDer<'static>] {
    NATIVE_ROOTS_CACHE
        .get_or_init(load_native_certs_inner)
        .as_slice()
}

/// The process-wide default crypto provider if one is installed, otherwise
/// a fresh aws-lc-rs provider (not installed globally).
pub fn get_crypto_provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

/// Build the rustls `ClientConfig` for a trust strategy.
///
/// # Errors
///
/// Returns `HttpError::Config` when CA material cannot be read or parsed, or
/// yields no certificates, and when the native store is empty.
pub fn client_config(trust: &TlsTrust) -> Result<rustls::ClientConfig, HttpError> {
    let provider = get_crypto_provider();
    let builder = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| HttpError::Tls(Box::new(e)))?;

    let config = match trust {
        TlsTrust::WebPki => {
            let roots = RootCertStore {
                roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
            };
            builder.with_root_certificates(roots).with_no_client_auth()
        }
        TlsTrust::Native => builder
            .with_root_certificates(native_root_store()?)
            .with_no_client_auth(),
        TlsTrust::Custom(sources) => builder
            .with_root_certificates(custom_root_store(sources)?)
            .with_no_client_auth(),
        TlsTrust::Insecure => {
            tracing::warn!(
                "TLS certificate verification disabled; the server identity is not checked"
            );
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerification::new(&provider)))
                .with_no_client_auth()
        }
    };

    Ok(config)
}

fn native_root_store() -> Result<RootCertStore, HttpError> {
    let certs = native_root_certs();
    if certs.is_empty() {
        return Err(HttpError::Config(
            "no native root CA certificates found in OS certificate store".to_owned(),
        ));
    }

    let mut store = RootCertStore::empty();
    let (added, ignored) = store.add_parsable_certificates(certs.iter().cloned());
    if ignored > 0 {
        tracing::warn!(added, ignored, "some native root certificates could not be parsed");
    }
    if added == 0 {
        return Err(HttpError::Config(format!(
            "no valid native root CA certificates parsed (found {}, all failed to parse)",
            certs.len()
        )));
    }
    Ok(store)
}

fn custom_root_store(sources: &[CaSource]) -> Result<RootCertStore, HttpError> {
    let mut store = RootCertStore::empty();
    for source in sources {
        let certs = read_ca_source(source)?;
        if certs.is_empty() {
            return Err(HttpError::Config(format!(
                "CA source {source:?} contains no certificates"
            )));
        }
        for cert in certs {
            store
                .add(cert)
                .map_err(|e| HttpError::Config(format!("invalid CA certificate: {e}")))?;
        }
    }
    if store.is_empty() {
        return Err(HttpError::Config(
            "no trusted CA certificates were supplied".to_owned(),
        ));
    }
    Ok(store)
}

fn read_ca_source(source: &CaSource) -> Result<Vec<CertificateDer<'static>>, HttpError> {
    match source {
        CaSource::File(path) => CertificateDer::pem_file_iter(path)
            .map_err(|e| {
                HttpError::Config(format!("cannot read CA file {}: {e}", path.display()))
            })?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                HttpError::Config(format!("malformed CA file {}: {e}", path.display()))
            }),
        CaSource::Pem(bytes) => CertificateDer::pem_slice_iter(bytes)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| HttpError::Config(format!("malformed CA certificate bytes: {e}"))),
    }
}

/// Certificate verifier that accepts any server certificate.
///
/// Handshake signatures are still checked with the provider's algorithms so
/// the session keys are bound to the presented certificate.
#[derive(Debug)]
struct NoVerification {
    algorithms: rustls::crypto::WebPkiSupportedAlgorithms,
}

impl NoVerification {
    fn new(provider: &CryptoProvider) -> Self {
        Self {
            algorithms: provider.signature_verification_algorithms,
        }
    }
}

impl ServerCertVerifier for NoVerification {
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
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}
