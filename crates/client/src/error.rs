use thiserror::Error;

/// Unified error for every tracker interaction.
///
/// Callers branch on [`status_code`](MantisError::status_code) the same way
/// the tracker's other clients do: `None` means the request never left the
/// process, `Some(0)` means no response arrived, and `Some(n)` carries the
/// HTTP status the tracker answered with.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum MantisError {
    /// The tracker answered with a non-2xx status.
    #[error("tracker returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    /// The request went out but no response came back.
    #[error("no response from tracker: {message}")]
    Transport { message: String },
    /// The request was rejected locally before any network traffic.
    #[error("invalid request: {message}")]
    Validation { message: String },
    /// The SOAP endpoint reported a fault inside a 2xx envelope.
    #[error("search fault: {fault}")]
    Fault { fault: String },
}

impl MantisError {
    pub fn validation(message: impl Into<String>) -> Self {
        MantisError::Validation {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        MantisError::Transport {
            message: message.into(),
        }
    }

    pub fn fault(fault: impl Into<String>) -> Self {
        MantisError::Fault {
            fault: fault.into(),
        }
    }

    /// Status code in the shape callers inspect: `Some(status)` for an API
    /// error, `Some(0)` when no response arrived, `None` for errors raised
    /// before the request left the process (and for SOAP faults, which
    /// arrive inside a 2xx envelope).
    pub fn status_code(&self) -> Option<u16> {
        match self {
            MantisError::Api { status, .. } => Some(*status),
            MantisError::Transport { .. } => Some(0),
            MantisError::Validation { .. } | MantisError::Fault { .. } => None,
        }
    }

    /// Raw response body, present only for API errors.
    pub fn body(&self) -> Option<&str> {
        match self {
            MantisError::Api { body, .. } => Some(body),
            _ => None,
        }
    }

    /// True when the tracker answered 404 for the addressed resource.
    pub fn is_not_found(&self) -> bool {
        matches!(self, MantisError::Api { status: 404, .. })
    }
}

pub type Result<T> = std::result::Result<T, MantisError>;
