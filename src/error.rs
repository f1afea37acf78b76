//! Error taxonomy for the WiFi-Connect client.
//!
//! External-call failures are caught at their call sites and mapped into one
//! of these variants; none escalate to a global handler. Campaign fetch
//! failures never surface here at all, they are logged and swallowed by the
//! interceptor.

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Login failed or was cancelled; any prior session stays untouched.
    #[error("authorization failed: {0}")]
    Authorization(String),

    /// The identity token could not be decoded into claims.
    #[error("malformed identity token: {0}")]
    MalformedToken(String),

    /// The user denied the system permission to change WiFi configurations.
    /// Recoverable: the user may grant the permission in system settings and
    /// retry.
    #[error("permission to change WiFi configurations was rejected by the user")]
    PermissionRejected,

    /// A session-scoped service was requested before any session existed.
    /// This is a sequencing bug in the caller, not a runtime condition.
    #[error("service requested before a session was initialized")]
    ServiceNotInitialized,

    /// Connect/disconnect was attempted while the legal-terms gate is not
    /// satisfied (acceptance unknown or rejected).
    #[error("legal terms have not been accepted")]
    LegalTermsNotAccepted,

    /// Any other failure of an external service call.
    #[error("{operation} failed{}: {detail}", fmt_status(.status))]
    ExternalService {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },
}

impl Error {
    /// Wrap a transport-level `reqwest` failure.
    pub fn transport(operation: &'static str, err: reqwest::Error) -> Self {
        Error::ExternalService {
            operation,
            status: err.status().map(|s| s.as_u16()),
            detail: err.to_string(),
        }
    }

    /// Wrap a non-success HTTP response.
    pub fn service(operation: &'static str, status: u16, detail: impl Into<String>) -> Self {
        Error::ExternalService {
            operation,
            status: Some(status),
            detail: detail.into(),
        }
    }
}

fn fmt_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" with status {code}"),
        None => String::new(),
    }
}
