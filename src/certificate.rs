use std::time::SystemTime;

use dtls::crypto::CryptoPrivateKey;
use rcgen::{CertificateParams, KeyPair};
use sha2::{Digest, Sha256};

use crate::dtls_transport::dtls_fingerprint::DtlsFingerprint;
use crate::error::{Error, Result};
use crate::math_rand_alpha;

/// A self-signed X.509 identity used to authenticate the DTLS
/// handshake. One is generated on demand when the application does not
/// supply its own through the Configuration.
pub struct Certificate {
    pub(crate) dtls_certificate: dtls::crypto::Certificate,
    pub(crate) expires: SystemTime,
    pem: String,
}

/// Two certificates are the same identity iff their DER encodings are.
impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.dtls_certificate.certificate == other.dtls_certificate.certificate
    }
}

impl Certificate {
    /// Builds a certificate from explicit parameters. The signature
    /// algorithm is carried by the key pair; Ed25519, ECDSA-P256 and
    /// RSA keys are accepted, anything else is refused rather than
    /// handed to the DTLS stack blind.
    pub fn from_params(params: CertificateParams, key_pair: KeyPair) -> Result<Self> {
        if !(key_pair.is_compatible(&rcgen::PKCS_ED25519)
            || key_pair.is_compatible(&rcgen::PKCS_ECDSA_P256_SHA256)
            || key_pair.is_compatible(&rcgen::PKCS_RSA_SHA256))
        {
            return Err(Error::ErrPrivateKeyType);
        }

        let expires = params.not_after.into();
        let x509 = params.self_signed(&key_pair)?;
        let pem = x509.pem();
        let der = x509.der().to_vec();

        let private_key = CryptoPrivateKey::from_key_pair(&key_pair)?;

        Ok(Certificate {
            dtls_certificate: dtls::crypto::Certificate {
                certificate: vec![der.into()],
                private_key,
            },
            expires,
            pem,
        })
    }

    /// Creates a fresh self-signed certificate for the given key pair
    /// with a random subject.
    pub fn from_key_pair(key_pair: KeyPair) -> Result<Self> {
        let params = CertificateParams::new(vec![math_rand_alpha(16)])?;
        Certificate::from_params(params, key_pair)
    }

    /// Rebuilds a certificate from PEM blocks previously produced by
    /// [`Certificate::pem`] together with its private key.
    pub fn from_pem(pem_str: &str, key_pair: KeyPair) -> Result<Self> {
        let params = CertificateParams::from_ca_cert_pem(pem_str)?;
        Certificate::from_params(params, key_pair)
    }

    /// The instant after which this certificate is no longer valid.
    pub fn expires(&self) -> SystemTime {
        self.expires
    }

    /// SHA-256 digests of the certificate chain, formatted the way SDP
    /// `a=fingerprint` lines carry them (lowercase colon-hex).
    pub fn get_fingerprints(&self) -> Vec<DtlsFingerprint> {
        self.dtls_certificate
            .certificate
            .iter()
            .map(|c| {
                let mut h = Sha256::new();
                h.update(c.as_ref());
                let digest: Vec<String> =
                    h.finalize().iter().map(|b| format!("{b:02x}")).collect();

                DtlsFingerprint {
                    algorithm: "sha-256".to_owned(),
                    value: digest.join(":"),
                }
            })
            .collect()
    }

    /// The X.509 certificate as a PEM block.
    pub fn pem(&self) -> &str {
        &self.pem
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_generate_certificate_ecdsa() -> Result<()> {
        let kp = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256)?;
        let cert = Certificate::from_key_pair(kp)?;

        assert!(cert.pem().contains("CERTIFICATE"));
        assert_eq!(cert.dtls_certificate.certificate.len(), 1);

        Ok(())
    }

    #[test]
    fn test_certificate_fingerprint_format() -> Result<()> {
        let kp = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256)?;
        let cert = Certificate::from_key_pair(kp)?;

        let fps = cert.get_fingerprints();
        assert_eq!(fps.len(), 1);
        assert_eq!(fps[0].algorithm, "sha-256");
        // 32 bytes, colon separated: 64 hex chars + 31 colons.
        assert_eq!(fps[0].value.len(), 95);
        assert!(fps[0]
            .value
            .chars()
            .all(|c| c == ':' || c.is_ascii_hexdigit()));
        assert_eq!(fps[0].value, fps[0].value.to_lowercase());

        Ok(())
    }

    #[test]
    fn test_certificate_equality() -> Result<()> {
        let cert1 = Certificate::from_key_pair(KeyPair::generate_for(
            &rcgen::PKCS_ECDSA_P256_SHA256,
        )?)?;
        let cert2 = Certificate::from_key_pair(KeyPair::generate_for(
            &rcgen::PKCS_ECDSA_P256_SHA256,
        )?)?;

        assert!(cert1 == cert1);
        assert!(cert1 != cert2);

        Ok(())
    }

    #[test]
    fn test_certificate_expires_in_future() -> Result<()> {
        let kp = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256)?;
        let cert = Certificate::from_key_pair(kp)?;

        assert!(cert.expires().duration_since(SystemTime::now()).is_ok());

        Ok(())
    }
}
