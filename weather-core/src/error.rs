//! Success-or-failure algebra shared by every layer of the crate.
//!
//! [`Error`] is a closed taxonomy: each variant carries a stable string code
//! (see [`Error::code`]) that calling agents rely on, so the codes must never be
//! renamed. Messages are fixed, human-readable text and never embed transport
//! error output or provider response bodies.

use serde::Serialize;

/// Result type used by the validation, forecast and tool layers.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Caller input was rejected before any network call.
    #[error("{message}")]
    InvalidParams { message: String },

    /// The provider rejected the request or returned something unusable.
    #[error("{message}")]
    Upstream {
        message: String,
        status_code: Option<u16>,
        retry_after_seconds: Option<u32>,
    },

    /// The total request budget elapsed before a usable response arrived.
    #[error("{message}")]
    Timeout { message: String },

    /// Anything not otherwise classified.
    #[error("{message}")]
    Unexpected { message: String },
}

/// Backoff hints attached to upstream failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u32>,
}

impl Error {
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    /// Upstream failure without status or backoff hints.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
            status_code: None,
            retry_after_seconds: None,
        }
    }

    pub fn upstream_status(
        message: impl Into<String>,
        status_code: u16,
        retry_after_seconds: Option<u32>,
    ) -> Self {
        Self::Upstream {
            message: message.into(),
            status_code: Some(status_code),
            retry_after_seconds,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected {
            message: message.into(),
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidParams { .. } => "invalid_params",
            Error::Upstream { .. } => "upstream_error",
            Error::Timeout { .. } => "timeout",
            Error::Unexpected { .. } => "unexpected",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Error::InvalidParams { message }
            | Error::Upstream { message, .. }
            | Error::Timeout { message }
            | Error::Unexpected { message } => message,
        }
    }

    /// Status and backoff hints; present only for [`Error::Upstream`].
    pub fn details(&self) -> Option<UpstreamDetails> {
        match self {
            Error::Upstream {
                status_code,
                retry_after_seconds,
                ..
            } => Some(UpstreamDetails {
                status_code: *status_code,
                retry_after_seconds: *retry_after_seconds,
            }),
            Error::InvalidParams { .. } | Error::Timeout { .. } | Error::Unexpected { .. } => None,
        }
    }
}

/// Branch-free inspection of a [`Result`].
pub trait ResultExt<T> {
    fn is_success(&self) -> bool;

    /// Reduce to a single value: `on_ok` for success, `on_fail` for failure.
    fn fold<R>(self, on_ok: impl FnOnce(T) -> R, on_fail: impl FnOnce(Error) -> R) -> R;
}

impl<T> ResultExt<T> for Result<T> {
    fn is_success(&self) -> bool {
        self.is_ok()
    }

    fn fold<R>(self, on_ok: impl FnOnce(T) -> R, on_fail: impl FnOnce(Error) -> R) -> R {
        match self {
            Ok(value) => on_ok(value),
            Err(error) => on_fail(error),
        }
    }
}
