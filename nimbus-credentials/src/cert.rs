use std::fs;
use std::path::{Path, PathBuf};

use nimbus_common::{Error, ErrorKind, Result};
use rcgen::{Certificate, CertificateParams, DistinguishedName};
use time::{Duration, OffsetDateTime};

/// Validity window for a freshly minted management certificate.
const VALIDITY_DAYS: i64 = 365;

/// A self-signed management certificate, held as PEM (private key + cert)
/// plus the DER-encoded certificate the provider's management API expects.
pub struct ManagementCertificate {
    pub pem: String,
    pub der: Vec<u8>,
}

impl ManagementCertificate {
    /// Generates a fresh self-signed certificate for the given subject
    /// (typically `user-<id>-<subscription>`), valid for
    /// [`VALIDITY_DAYS`] from the moment of generation.
    ///
    /// Signed with `rcgen`'s default key type (ECDSA P-256): `rcgen` has
    /// no from-scratch RSA keygen, only RSA signing with a caller-supplied
    /// key, so the management API's historical RSA-2048 requirement isn't
    /// met here. See `DESIGN.md`'s Open Questions.
    pub fn generate(subject: &str) -> Result<Self> {
        let mut params = CertificateParams::new(vec![subject.to_string()]);
        params.distinguished_name = DistinguishedName::new();
        let now = OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + Duration::days(VALIDITY_DAYS);

        let certificate = Certificate::from_params(params).map_err(|error| {
            Error::custom(
                ErrorKind::Internal,
                format!("failed to create management certificate: {error}"),
            )
        })?;

        let cert_pem = certificate.serialize_pem().map_err(|error| {
            Error::custom(
                ErrorKind::Internal,
                format!("failed to serialize certificate: {error}"),
            )
        })?;
        let key_pem = certificate.serialize_private_key_pem();
        let der = certificate.serialize_der().map_err(|error| {
            Error::custom(
                ErrorKind::Internal,
                format!("failed to serialize certificate to DER: {error}"),
            )
        })?;

        Ok(Self {
            pem: format!("{key_pem}{cert_pem}"),
            der,
        })
    }
}

/// File-pair paths for one (user, subscription)'s management certificate.
pub struct CertificatePaths {
    pub pem_path: PathBuf,
    pub der_path: PathBuf,
}

impl CertificatePaths {
    pub fn new(certificates_dir: &Path, user_id: i64, subscription_id: &str) -> Self {
        let base = certificates_dir.join(format!("{user_id}-{subscription_id}"));
        Self {
            pem_path: base.with_extension("pem"),
            der_path: base.with_extension("cer"),
        }
    }

    /// Writes the certificate pair to disk unless both files already exist,
    /// mirroring the "avoid duplicate pem generation" registration check.
    pub fn materialize(&self, subject: &str) -> Result<()> {
        if self.pem_path.exists() && self.der_path.exists() {
            return Ok(());
        }

        if let Some(parent) = self.pem_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::custom(ErrorKind::Internal, format!("failed to create certificates dir: {e}"))
            })?;
        }

        let certificate = ManagementCertificate::generate(subject)?;
        fs::write(&self.pem_path, &certificate.pem).map_err(Error::from)?;
        fs::write(&self.der_path, &certificate.der).map_err(Error::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn materialize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let paths = CertificatePaths::new(dir.path(), 1, "sub-1");
        paths.materialize("user-1-sub-1").unwrap();

        let first_pem = fs::read(&paths.pem_path).unwrap();
        paths.materialize("user-1-sub-1").unwrap();
        let second_pem = fs::read(&paths.pem_path).unwrap();

        assert_eq!(first_pem, second_pem, "second call must not regenerate the pair");
    }

    #[test]
    fn generated_pem_round_trips_through_rustls_pemfile() {
        let certificate = ManagementCertificate::generate("user-2-sub-2").unwrap();
        let mut reader = std::io::BufReader::new(certificate.pem.as_bytes());
        let items = rustls_pemfile::read_all(&mut reader).unwrap();
        assert!(items.len() >= 2, "expected a private key and a certificate");
    }
}
