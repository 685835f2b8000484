use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::crypto::WebPkiSupportedAlgorithms;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls::{DigitallySignedStruct, DistinguishedName, SignatureScheme};
use sha2::{Digest, Sha256};
use tokio_rustls::TlsAcceptor;

use crate::config::Config;
use crate::error::{Error, Result};

/// Pick the certificate for the requested SNI name; unknown and absent
/// names fall back to the first configured host's certificate.
struct HostCertResolver {
    by_name: HashMap<String, Arc<CertifiedKey>>,
    fallback: Arc<CertifiedKey>,
}

impl fmt::Debug for HostCertResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostCertResolver")
            .field("hosts", &self.by_name.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ResolvesServerCert for HostCertResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        client_hello
            .server_name()
            .and_then(|name| self.by_name.get(name))
            .cloned()
            .or_else(|| Some(self.fallback.clone()))
    }
}

/// Request a client certificate without requiring one, and accept
/// whatever is presented. Authorization decides later based on the
/// certificate's fingerprint.
struct AcceptAnyClientCert {
    algorithms: WebPkiSupportedAlgorithms,
}

impl fmt::Debug for AcceptAnyClientCert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcceptAnyClientCert").finish()
    }
}

impl ClientCertVerifier for AcceptAnyClientCert {
    fn offer_client_auth(&self) -> bool {
        true
    }

    fn client_auth_mandatory(&self) -> bool {
        false
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> std::result::Result<ClientCertVerified, rustls::Error> {
        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(File::open(path)?);
    rustls_pemfile::certs(&mut reader)
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let mut reader = BufReader::new(File::open(path)?);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?
        .ok_or_else(|| Error::Config(format!("no private key in {}", path.display())))
}

fn certified_key(cert_file: &Path, key_file: &Path) -> Result<Arc<CertifiedKey>> {
    let certs = load_certs(cert_file)?;
    let key = load_key(key_file)?;
    let key = rustls::crypto::ring::sign::any_supported_type(&key)
        .map_err(|e| Error::Config(format!("unusable key {}: {e}", key_file.display())))?;
    Ok(Arc::new(CertifiedKey::new(certs, key)))
}

/// Build the TLS acceptor for the configured hosts.
pub fn acceptor(config: &Config) -> Result<TlsAcceptor> {
    let mut by_name = HashMap::new();
    let mut fallback = None;
    for host in &config.hosts {
        let key = certified_key(&host.cert_file, &host.key_file)?;
        if fallback.is_none() {
            fallback = Some(key.clone());
        }
        by_name.insert(host.name.clone(), key);
    }
    let fallback = fallback.ok_or_else(|| Error::Config("no hosts configured".to_string()))?;

    let verifier = Arc::new(AcceptAnyClientCert {
        algorithms: rustls::crypto::ring::default_provider().signature_verification_algorithms,
    });
    let mut server_config = rustls::ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_cert_resolver(Arc::new(HostCertResolver { by_name, fallback }));
    server_config.alpn_protocols = Vec::new();
    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

/// SHA-256 fingerprint of the client certificate, lowercase hex.
pub fn peer_fingerprint<S>(stream: &tokio_rustls::server::TlsStream<S>) -> Option<String> {
    let (_, connection) = stream.get_ref();
    let cert = connection.peer_certificates()?.first()?;
    let digest = Sha256::digest(cert.as_ref());
    Some(
        digest
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<String>(),
    )
}
