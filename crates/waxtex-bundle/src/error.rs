//! Error types for bundle acquisition.

use thiserror::Error;

/// Errors raised while downloading or extracting a support-data bundle.
#[derive(Debug, Error)]
pub enum BundleError {
    /// The bundle URL could not be parsed.
    #[error("invalid bundle url '{url}'")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// The HTTP request itself failed (connect, TLS, body transfer).
    #[error("bundle download failed")]
    Request {
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("bundle download failed: http status {status}")]
    HttpStatus { status: u16 },

    /// A filesystem operation failed.
    #[error("bundle i/o error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The archive was malformed or an entry could not be decoded.
    #[error("bundle archive error: {context}")]
    Archive {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Extraction finished but the bundle looks truncated.
    #[error("bundle looks incomplete: extracted {extracted} files, expected at least {minimum}")]
    Incomplete { extracted: usize, minimum: usize },

    /// The operation was cancelled before it completed.
    #[error("bundle download cancelled")]
    Cancelled,
}

impl BundleError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn archive(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Archive {
            context: context.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incomplete_display_names_both_counts() {
        let err = BundleError::Incomplete {
            extracted: 3,
            minimum: 100,
        };
        let text = err.to_string();

        assert!(text.contains('3'));
        assert!(text.contains("100"));
    }

    #[test]
    fn test_io_error_chains_its_source() {
        use std::error::Error as _;

        let err = BundleError::io(
            "creating bundle dir",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );

        assert!(err.to_string().contains("creating bundle dir"));
        assert!(err.source().is_some());
    }
}
