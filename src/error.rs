use thiserror::Error;

/// Convenience alias used by every fallible operation in the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Something went wrong below the HTTP layer.
///
/// HTTP error statuses (4xx/5xx) are *not* errors: they come back as a
/// regular [`Response`](crate::Response). Only the transport itself failing
/// (connect, TLS, timeout, aborted transfer, local I/O while streaming)
/// produces one of these.
///
/// The carried `code` is the transport's own small-integer error code, see
/// [`transport::code`](crate::transport::code) for the well-known values.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("transport error {code}: {message}")]
    Transport { code: i32, message: String },

    #[error("multi interface error {code}: {message}")]
    Multi { code: i32, message: String },
}

impl Error {
    pub fn transport(code: i32, message: impl Into<String>) -> Self {
        Self::Transport {
            code,
            message: message.into(),
        }
    }

    pub fn multi(code: i32, message: impl Into<String>) -> Self {
        Self::Multi {
            code,
            message: message.into(),
        }
    }

    /// The transport error code carried by either variant.
    pub fn code(&self) -> i32 {
        match self {
            Self::Transport { code, .. } | Self::Multi { code, .. } => *code,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Transport { message, .. } | Self::Multi { message, .. } => message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_and_message_are_shared_across_variants() {
        let err = Error::transport(28, "timed out");
        assert_eq!(err.code(), 28);
        assert_eq!(err.message(), "timed out");

        let err = Error::multi(3, "bad multi handle");
        assert_eq!(err.code(), 3);
        assert_eq!(err.message(), "bad multi handle");
    }

    #[test]
    fn display_includes_the_code() {
        let err = Error::transport(7, "connection refused");
        assert_eq!(err.to_string(), "transport error 7: connection refused");
    }
}
