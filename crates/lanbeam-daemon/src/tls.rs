//! On-demand TLS material for the HTTPS listener.

use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, KeyPair,
    KeyUsagePurpose,
};
use time::{Duration, OffsetDateTime};

use lanbeam_core::{Error, Result};

/// Common name peers see on our self-signed certificate.
pub const CERT_COMMON_NAME: &str = "localsend-localCert";

/// PEM-encoded certificate and private key.
pub struct TlsMaterial {
    pub cert_pem: String,
    pub key_pem: String,
}

/// Generate a self-signed ECDSA P-256 certificate valid for one year,
/// usable only for server authentication. Peers do not validate it; the
/// protocol's TLS is opportunistic.
pub fn generate_self_signed() -> Result<TlsMaterial> {
    let key = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256)
        .map_err(|e| Error::Internal(format!("key generation failed: {e}")))?;

    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, CERT_COMMON_NAME);
    dn.push(DnType::OrganizationName, CERT_COMMON_NAME);
    params.distinguished_name = dn;
    params.not_before = OffsetDateTime::now_utc();
    params.not_after = params.not_before + Duration::days(365);
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

    let cert = params
        .self_signed(&key)
        .map_err(|e| Error::Internal(format!("certificate generation failed: {e}")))?;

    Ok(TlsMaterial {
        cert_pem: cert.pem(),
        key_pem: key.serialize_pem(),
    })
}
