//! Error types for pgpd.

use thiserror::Error;

/// Result type for pgpd operations.
pub type Result<T> = core::result::Result<T, Error>;

/// PostgreSQL error/notice field types.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorFields {
    /// Severity: ERROR, FATAL, PANIC, WARNING, NOTICE, DEBUG, INFO, LOG
    pub severity: Option<String>,
    /// Non-localized severity (same as severity but never translated)
    pub severity_non_localized: Option<String>,
    /// SQLSTATE error code (5 characters)
    pub code: Option<String>,
    /// Primary error message
    pub message: Option<String>,
    /// Detailed error explanation
    pub detail: Option<String>,
    /// Suggestion for fixing the error
    pub hint: Option<String>,
    /// Cursor position in query string (1-based)
    pub position: Option<u32>,
    /// Position in internal query
    pub internal_position: Option<u32>,
    /// Failed internal command text
    pub internal_query: Option<String>,
    /// Context/stack trace
    pub where_: Option<String>,
    /// Schema name
    pub schema: Option<String>,
    /// Table name
    pub table: Option<String>,
    /// Column name
    pub column: Option<String>,
    /// Data type name
    pub data_type: Option<String>,
    /// Constraint name
    pub constraint: Option<String>,
    /// Source file name
    pub file: Option<String>,
    /// Source line number
    pub line: Option<u32>,
    /// Source routine name
    pub routine: Option<String>,
}

impl ErrorFields {
    /// Severity, preferring the never-translated field.
    pub fn severity(&self) -> Option<&str> {
        self.severity_non_localized
            .as_deref()
            .or(self.severity.as_deref())
    }

    /// Returns true for `FATAL` and `PANIC`: the server is closing the session.
    pub fn is_fatal(&self) -> bool {
        matches!(self.severity(), Some("FATAL") | Some("PANIC"))
    }
}

impl std::fmt::Display for ErrorFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(severity) = &self.severity {
            write!(f, "{}: ", severity)?;
        }
        if let Some(message) = &self.message {
            write!(f, "{}", message)?;
        }
        if let Some(code) = &self.code {
            write!(f, " (SQLSTATE {})", code)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, "\nDETAIL: {}", detail)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\nHINT: {}", hint)?;
        }
        Ok(())
    }
}

/// Error type for pgpd.
#[derive(Debug, Error)]
pub enum Error {
    /// Server error response for a single request.
    ///
    /// The connection has already been drained back to the ready state.
    #[error("PostgreSQL error: {0}")]
    Server(ErrorFields),

    /// The connection cannot continue; opening it again may succeed.
    ///
    /// Wraps either a `FATAL`/`PANIC` server error or a rejected TLS request.
    /// This is the only kind retried by `Client::open`.
    #[error("Fatal connection error: {0}")]
    FatalConnection(Box<Error>),

    /// Protocol violation on the read side (unexpected or malformed message).
    ///
    /// The connection is broken.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A message that is illegal in the current protocol state was not sent.
    ///
    /// Nothing reached the server; the connection stays usable.
    #[error("Invalid protocol state: {0}")]
    InvalidState(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// TLS error
    #[cfg(feature = "tokio-tls")]
    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    /// Connection is broken and cannot be reused
    #[error("Connection is broken")]
    ConnectionBroken,

    /// Invalid usage (bad options, malformed connection string, ...)
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),

    /// Unsupported feature
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl Error {
    /// Returns true if `Client::open` should start over with a fresh transport.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::FatalConnection(_))
    }

    /// Returns true if the error indicates the connection is broken and cannot be reused.
    pub fn is_connection_broken(&self) -> bool {
        match self {
            Error::Io(_)
            | Error::ConnectionBroken
            | Error::FatalConnection(_)
            | Error::Protocol(_) => true,
            Error::Server(fields) => fields.is_fatal(),
            _ => false,
        }
    }

    /// Get the SQLSTATE code if this is a server error.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Server(fields) => fields.code.as_deref(),
            Error::FatalConnection(inner) => inner.sqlstate(),
            _ => None,
        }
    }
}

impl<Src: std::fmt::Debug, Dst: std::fmt::Debug + ?Sized>
    From<zerocopy::error::CastError<Src, Dst>> for Error
{
    fn from(err: zerocopy::error::CastError<Src, Dst>) -> Self {
        Error::Protocol(format!("zerocopy cast error: {err:?}"))
    }
}

impl From<core::convert::Infallible> for Error {
    fn from(err: core::convert::Infallible) -> Self {
        match err {}
    }
}
