//! Error types for RenderGrid

use thiserror::Error;

/// Result type alias using RenderGrid Error
pub type Result<T> = std::result::Result<T, Error>;

/// RenderGrid error types
///
/// Errors carry string payloads so that a single outcome can be handed to
/// every waiter of a shared upload or render job.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Resource error: {0}")]
    Resource(String),

    #[error("Upload failed for {url} ({hash}): {reason}")]
    Upload {
        url: String,
        hash: String,
        reason: String,
    },

    #[error("DOM resolution failed: {0}")]
    DomResolution(String),

    #[error("Invalid render request: {0}")]
    RenderRequest(String),

    #[error("Render failed: {0}")]
    Render(String),

    #[error("Render status failed for {render_id}: {reason}")]
    RenderStatus { render_id: String, reason: String },

    #[error("Comparison failed: {0}")]
    Comparison(String),

    #[error("Invalid accessibility:\n{0}")]
    InvalidAccessibility(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Test {test_name} aborted: {source}")]
    Fatal {
        test_name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error invalidates the whole run rather than one browser.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Render(_)
                | Error::RenderStatus { .. }
                | Error::InvalidAccessibility(_)
                | Error::Fatal { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::Render("backend down".into()).is_fatal());
        assert!(Error::RenderStatus {
            render_id: "r1".into(),
            reason: "timeout".into()
        }
        .is_fatal());
        assert!(!Error::DomResolution("bad cdt".into()).is_fatal());
        assert!(!Error::Upload {
            url: "https://a/b.png".into(),
            hash: "abc".into(),
            reason: "503".into()
        }
        .is_fatal());
    }

    #[test]
    fn test_fatal_wrapper_message() {
        let err = Error::Fatal {
            test_name: "checkout".into(),
            source: Box::new(Error::Render("bad gateway".into())),
        };
        assert_eq!(
            err.to_string(),
            "Test checkout aborted: Render failed: bad gateway"
        );
    }
}
