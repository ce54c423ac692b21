use crate::events::CertificateResource;
use chrono::{DateTime, Utc};
use rustls_pemfile::Item;
use std::io::Cursor;
use thiserror::Error;
use x509_parser::prelude::{FromDer, X509Certificate};

/// Key under which a TLS certificate resource stores its PEM chain
pub const TLS_CERT_KEY: &str = "tls.crt";

#[derive(Debug, Error)]
pub enum CertError {
    #[error("certificate resource does not contain {0}")]
    MissingData(&'static str),
    #[error("failed to decode PEM block: {0}")]
    Decode(String),
    #[error("failed to parse certificate: {0}")]
    CertParse(String),
}

impl CertError {
    /// Short label used for metrics
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MissingData(_) => "missing_data",
            Self::Decode(_) => "decode",
            Self::CertParse(_) => "parse",
        }
    }
}

/// Extract the `NotAfter` of the first PEM certificate in `pem`
///
/// # Errors
///
/// Returns [`CertError::Decode`] when no PEM block can be read and
/// [`CertError::CertParse`] when the block is not a valid X.509 certificate.
pub fn parse_expiry(pem: &[u8]) -> Result<DateTime<Utc>, CertError> {
    let mut reader = Cursor::new(pem);
    let item = rustls_pemfile::read_one(&mut reader)
        .map_err(|e| CertError::Decode(e.to_string()))?
        .ok_or_else(|| CertError::Decode("no PEM data found".to_string()))?;

    let Item::X509Certificate(der) = item else {
        return Err(CertError::CertParse(
            "PEM block is not a certificate".to_string(),
        ));
    };

    let (_, cert) =
        X509Certificate::from_der(der.as_ref()).map_err(|e| CertError::CertParse(e.to_string()))?;

    let raw = cert.validity().not_after.to_datetime();
    DateTime::<Utc>::from_timestamp(raw.unix_timestamp(), raw.nanosecond())
        .ok_or_else(|| CertError::CertParse("invalid certificate expiry timestamp".to_string()))
}

/// Read the certificate out of a TLS resource and return its expiry
///
/// # Errors
///
/// Returns [`CertError::MissingData`] if the resource has no `tls.crt`, or any
/// error from [`parse_expiry`].
pub fn resource_expiry(resource: &CertificateResource) -> Result<DateTime<Utc>, CertError> {
    let pem = resource
        .data
        .get(TLS_CERT_KEY)
        .ok_or(CertError::MissingData(TLS_CERT_KEY))?;

    parse_expiry(pem.as_bytes())
}
