//! TLS material: loading the configured CA, and synthesizing per-host MITM leaf certificates.
//!
//! Grounded in `rask::connection`'s `rustls::ServerConfig`/`ServerConnection` usage for the wrap
//! shape; certificate *issuance* has no counterpart anywhere in the retrieved corpus, so `rcgen`
//! is adopted as a deliberate, noted dependency (see `DESIGN.md`) — it is the standard crate for
//! this in the Rust ecosystem.

use std::collections::HashMap;
use std::io::BufReader;
use std::sync::Arc;

use rcgen::{Certificate, CertificateParams, DistinguishedName, DnType, KeyPair, SanType};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;

use crate::config::CaMaterial;
use crate::error::ProxyError;

/// A parsed CA certificate and key, used to sign freshly-synthesized leaf certificates.
pub struct CertificateAuthority {
    cert_der: CertificateDer<'static>,
    key_pair: KeyPair,
    issuer: Certificate,
}

impl std::fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateAuthority").finish_non_exhaustive()
    }
}

impl CertificateAuthority {
    /// Loads CA certificate and key material from the PEM files named in `material`.
    pub fn load(material: &CaMaterial) -> Result<Self, ProxyError> {
        let cert_pem = std::fs::read(&material.cert_path)
            .map_err(|e| ProxyError::InvalidArgument(format!("reading CA cert: {e}")))?;
        let key_pem = std::fs::read(&material.key_path)
            .map_err(|e| ProxyError::InvalidArgument(format!("reading CA key: {e}")))?;

        let mut cert_reader = BufReader::new(cert_pem.as_slice());
        let cert_der = rustls_pemfile::certs(&mut cert_reader)
            .next()
            .ok_or_else(|| ProxyError::Tls("CA certificate file contained no certificate".into()))?
            .map_err(|e| ProxyError::Tls(format!("parsing CA certificate: {e}")))?;

        let key_pair = KeyPair::from_pem(
            std::str::from_utf8(&key_pem)
                .map_err(|e| ProxyError::Tls(format!("CA key is not valid PEM text: {e}")))?,
        )
        .map_err(|e| ProxyError::Tls(format!("parsing CA key: {e}")))?;

        let params = CertificateParams::from_ca_cert_der(&cert_der)
            .map_err(|e| ProxyError::Tls(format!("CA certificate is not a valid CA: {e}")))?;
        let issuer = params
            .self_signed(&key_pair)
            .map_err(|e| ProxyError::Tls(format!("re-deriving CA signer: {e}")))?;

        Ok(CertificateAuthority {
            cert_der,
            key_pair,
            issuer,
        })
    }

    /// Synthesizes a leaf certificate for `host` (used as both CN and SAN/SNI name), signed by
    /// this CA, and wraps it in a `rustls::ServerConfig` ready to terminate a client TLS
    /// connection (§4.G step 2).
    pub fn issue_leaf(&self, host: &str) -> Result<Arc<ServerConfig>, ProxyError> {
        let mut params = CertificateParams::new(vec![host.to_string()])
            .map_err(|e| ProxyError::Tls(format!("building leaf cert params: {e}")))?;
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, host);
        params.distinguished_name = dn;
        params.subject_alt_names = vec![SanType::DnsName(
            host.to_string()
                .try_into()
                .map_err(|_| ProxyError::Tls(format!("invalid SNI host for SAN: {host}")))?,
        )];

        let leaf_key = KeyPair::generate().map_err(|e| ProxyError::Tls(format!("{e}")))?;
        let leaf = params
            .signed_by(&leaf_key, &self.issuer, &self.key_pair)
            .map_err(|e| ProxyError::Tls(format!("signing leaf cert for {host}: {e}")))?;

        let cert_chain = vec![leaf.der().clone(), self.cert_der.clone()];
        let private_key = PrivateKeyDer::Pkcs8(leaf_key.serialize_der().into());

        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(cert_chain, private_key)
            .map_err(|e| ProxyError::Tls(format!("building leaf ServerConfig for {host}: {e}")))?;

        Ok(Arc::new(config))
    }
}

/// Per-process host→leaf-certificate cache (`§9`: "avoid global mutable singletons — make it an
/// explicit field on the executor"). Regeneration on miss is idempotent, so concurrent misses for
/// the same host racing harmlessly is acceptable (`§5`).
#[derive(Default)]
pub struct CertificateCache {
    by_host: HashMap<String, Arc<ServerConfig>>,
}

impl std::fmt::Debug for CertificateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateCache").field("cached_hosts", &self.by_host.len()).finish()
    }
}

impl CertificateCache {
    /// An empty cache.
    pub fn new() -> Self {
        CertificateCache {
            by_host: HashMap::new(),
        }
    }

    /// Returns the cached leaf config for `host`, synthesizing and caching one via `ca` on miss.
    pub fn get_or_issue(
        &mut self,
        ca: &CertificateAuthority,
        host: &str,
    ) -> Result<Arc<ServerConfig>, ProxyError> {
        if let Some(config) = self.by_host.get(host) {
            return Ok(config.clone());
        }
        let config = ca.issue_leaf(host)?;
        self.by_host.insert(host.to_string(), config.clone());
        Ok(config)
    }

    /// Number of hosts currently cached.
    pub fn len(&self) -> usize {
        self.by_host.len()
    }

    /// Whether no host has been cached yet.
    pub fn is_empty(&self) -> bool {
        self.by_host.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_starts_empty() {
        let cache = CertificateCache::new();
        assert!(cache.is_empty());
        assert_eq!(cache.len(), 0);
    }
}
