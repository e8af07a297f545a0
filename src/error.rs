//! Error types for the download center.

use thiserror::Error;

/// Errors that can occur while setting up a [`DownloadCenter`](crate::DownloadCenter).
///
/// Failures of individual downloads never surface as this type; they are
/// reported as [`FetchError`] strings inside the batch's result map.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or unreadable configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The custom CA bundle could not be read or parsed.
    #[error("Invalid CA bundle {path}: {reason}")]
    Certificate {
        /// Path of the bundle that was rejected.
        path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// I/O error during setup.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client construction error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A specialized `Result` type for download center operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Terminal failure of a single fetch.
///
/// The `Display` text is what callers see in
/// [`DownloadResult::Error`](crate::DownloadResult::Error), so every message
/// keeps a stable diagnostic token callers can match on.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Scheme other than http or https.
    #[error("Protocol not supported: {0}")]
    ProtocolUnsupported(String),

    /// The server certificate chain did not validate.
    #[error("CERTIFICATE_VERIFY_FAILED: {0}")]
    TlsValidationFailed(String),

    /// Connection could not be established or broke mid-transfer.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Redirect chain exceeded the configured hop limit.
    #[error("Too many redirects (limit {0})")]
    TooManyRedirects(usize),

    /// The server answered with a non-success status.
    #[error("HTTP error {status}: {reason}")]
    Http {
        /// Numeric status code.
        status: u16,
        /// Short human-readable phrase.
        reason: String,
    },

    /// Downloaded bytes did not match the expected digest.
    #[error("Corrupted download: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Digest the caller asked for.
        expected: String,
        /// Digest of what was received.
        actual: String,
    },

    /// Local I/O error while writing the destination.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Builds an [`FetchError::Http`] from a status code.
    #[must_use]
    pub fn from_status(status: reqwest::StatusCode) -> Self {
        let reason = if status == reqwest::StatusCode::NOT_FOUND {
            "File not found"
        } else {
            status.canonical_reason().unwrap_or("Unknown error")
        };
        Self::Http {
            status: status.as_u16(),
            reason: reason.to_string(),
        }
    }

    /// Classifies a transport error from the HTTP client.
    ///
    /// Certificate problems are reported as [`FetchError::TlsValidationFailed`],
    /// everything else as [`FetchError::ConnectionFailed`].
    #[must_use]
    pub fn from_transport(err: &reqwest::Error) -> Self {
        let detail = error_chain(err);
        if is_certificate_failure(err) {
            Self::TlsValidationFailed(detail)
        } else {
            Self::ConnectionFailed(detail)
        }
    }
}

/// Joins an error and all of its sources into one line.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        if !parts.contains(&text) {
            parts.push(text);
        }
        source = inner.source();
    }
    parts.join(": ")
}

/// Looks for a rejected server certificate among the causes of `err`.
///
/// The outer error is skipped: its text embeds the request URL.
fn is_certificate_failure(err: &reqwest::Error) -> bool {
    let err: &(dyn std::error::Error + 'static) = err;
    let mut texts = Vec::new();
    for inner in std::iter::successors(err.source(), |e| e.source()) {
        if let Some(tls) = as_rustls_error(inner) {
            return matches!(
                tls,
                rustls::Error::InvalidCertificate(_) | rustls::Error::NoCertificatesPresented
            );
        }
        texts.push(inner.to_string());
    }
    texts.iter().any(|text| mentions_certificate(text))
}

/// rustls errors reach us either directly or wrapped in an `io::Error`.
fn as_rustls_error<'a>(err: &'a (dyn std::error::Error + 'static)) -> Option<&'a rustls::Error> {
    err.downcast_ref::<rustls::Error>().or_else(|| {
        err.downcast_ref::<std::io::Error>()?
            .get_ref()?
            .downcast_ref::<rustls::Error>()
    })
}

fn mentions_certificate(detail: &str) -> bool {
    let lower = detail.to_ascii_lowercase();
    ["certificate", "unknownissuer", "notvalidforname", "self signed"]
        .iter()
        .any(|marker| lower.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn not_found_has_stable_phrase() {
        let msg = FetchError::from_status(StatusCode::NOT_FOUND).to_string();
        assert!(msg.contains("404"), "{msg}");
        assert!(msg.contains("File not found"), "{msg}");
    }

    #[test]
    fn other_statuses_use_canonical_reason() {
        let msg = FetchError::from_status(StatusCode::INTERNAL_SERVER_ERROR).to_string();
        assert_eq!(msg, "HTTP error 500: Internal Server Error");
    }

    #[test]
    fn certificate_markers_are_detected() {
        assert!(mentions_certificate("invalid peer certificate: UnknownIssuer"));
        assert!(mentions_certificate("self signed certificate in chain"));
        assert!(!mentions_certificate("tcp connect error: Connection refused"));
    }

    #[test]
    fn rustls_error_is_found_inside_io_error() {
        let wrapped = std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            rustls::Error::InvalidCertificate(rustls::CertificateError::UnknownIssuer),
        );
        let tls = as_rustls_error(&wrapped).unwrap();
        assert!(matches!(tls, rustls::Error::InvalidCertificate(_)));

        let plain = std::io::Error::other("connection reset");
        assert!(as_rustls_error(&plain).is_none());
    }

    #[test]
    fn tls_failure_message_carries_marker() {
        let msg = FetchError::TlsValidationFailed("UnknownIssuer".into()).to_string();
        assert!(msg.starts_with("CERTIFICATE_VERIFY_FAILED"));
    }

    #[test]
    fn error_chain_skips_duplicate_sources() {
        #[derive(Debug)]
        struct Outer(std::io::Error);
        impl std::fmt::Display for Outer {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "outer")
            }
        }
        impl std::error::Error for Outer {
            fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
                Some(&self.0)
            }
        }

        let err = Outer(std::io::Error::other("refused"));
        assert_eq!(error_chain(&err), "outer: refused");
    }

    #[test]
    fn mismatch_mentions_corruption() {
        let msg = FetchError::ChecksumMismatch {
            expected: "aaaa".into(),
            actual: "bbbb".into(),
        }
        .to_string();
        assert!(msg.contains("Corrupted download"));
    }
}
