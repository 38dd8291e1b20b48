//! Error types for eventlink
//!
//! Provides structured error handling with:
//! - Numeric error codes for machine parsing
//! - The transport failure taxonomy consumed by the error classifier
//! - User-friendly messages with suggestions
//! - Exit codes for CLI

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for eventlink operations
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric error codes for machine parsing and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Configuration errors (1xx)
    ConfigNotFound = 100,
    ConfigParseError = 101,
    ConfigValidation = 102,

    // IO errors (2xx)
    IoRead = 200,
    IoWrite = 201,
    IoPermission = 202,
    IoNotFound = 203,

    // Connection errors (3xx)
    ConnectionFailed = 300,
    ConnectionTimeout = 301,
    InvalidUri = 302,
    ConnectionLost = 303,
    InvalidState = 304,
    StaleConnection = 305,
    TransportError = 306,

    // Exchange errors (4xx)
    SendTimeout = 400,
    ReceiveTimeout = 401,
    RegexMatchTimeout = 402,

    // Internal errors (9xx)
    Shutdown = 900,
    InternalError = 901,
}

impl ErrorCode {
    /// Get the string code (e.g., "E100")
    pub fn as_str(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get the exit code for CLI (maps to 1-125 range)
    pub fn exit_code(&self) -> i32 {
        match *self as u16 {
            100..=199 => 10, // Config errors
            200..=299 => 20, // IO errors
            300..=399 => 30, // Connection errors
            400..=499 => 40, // Exchange errors
            900..=999 => 90, // Internal errors
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transport-level error codes reported by the underlying socket library
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorCode {
    /// Operating system level socket failure
    Io,
    /// WebSocket protocol violation
    Protocol,
    /// Message or frame exceeded the configured limits
    Capacity,
    /// TLS negotiation or certificate failure
    Tls,
    /// HTTP upgrade was rejected by the server
    Http,
    /// Inbound text was not valid UTF-8
    Utf8,
    /// Send queue is full
    SendQueueFull,
    /// Anything the transport could not classify
    Other,
}

impl fmt::Display for TransportErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportErrorCode::Io => "io",
            TransportErrorCode::Protocol => "protocol",
            TransportErrorCode::Capacity => "capacity",
            TransportErrorCode::Tls => "tls",
            TransportErrorCode::Http => "http",
            TransportErrorCode::Utf8 => "utf8",
            TransportErrorCode::SendQueueFull => "send-queue-full",
            TransportErrorCode::Other => "other",
        };
        f.write_str(name)
    }
}

/// Main error type for eventlink
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Configuration parse error
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<toml::de::Error>,
    },

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    /// Generic configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    // ─────────────────────────────────────────────────────────────
    // IO Errors
    // ─────────────────────────────────────────────────────────────

    /// File write error
    #[error("Failed to write file: {path}")]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    // ─────────────────────────────────────────────────────────────
    // Connection Errors
    // ─────────────────────────────────────────────────────────────

    /// The handshake with the remote endpoint failed
    #[error("Failed to connect to {uri}: {message}")]
    ConnectFailed { uri: String, message: String },

    /// The handshake did not complete within the connect timeout
    #[error("Connection to {uri} timed out after {timeout_ms}ms")]
    ConnectTimeout { uri: String, timeout_ms: u64 },

    /// The target URI could not be parsed
    #[error("Invalid URI '{uri}': {message}")]
    InvalidUri { uri: String, message: String },

    /// The peer dropped the connection without a closing handshake
    #[error("Connection closed prematurely: {message}")]
    PeerClosedPrematurely { message: String },

    /// An operation was attempted in a state that does not permit it
    #[error("Transport is in an invalid state: {message}")]
    InvalidState { message: String },

    /// The transport reported success but the connection is no longer open
    #[error("Transport reported success but the connection is {state}")]
    StaleConnection { state: String },

    /// Any other failure reported by the transport
    #[error("Transport error ({code}): {message}")]
    Transport {
        code: TransportErrorCode,
        message: String,
    },

    // ─────────────────────────────────────────────────────────────
    // Exchange Errors
    // ─────────────────────────────────────────────────────────────

    /// Sending a command did not complete in time
    #[error("Send timed out after {timeout_ms}ms")]
    SendTimeout { timeout_ms: u64 },

    /// No complete message arrived in time
    #[error("Receive timed out after {timeout_ms}ms")]
    ReceiveTimeout { timeout_ms: u64 },

    /// No inbound message matched the expected pattern before the deadline
    #[error("No response matched /{pattern}/ within {timeout_ms}ms")]
    RegexMatchTimeout {
        pattern: String,
        received: String,
        timeout_ms: u64,
    },

    // ─────────────────────────────────────────────────────────────
    // Internal Errors
    // ─────────────────────────────────────────────────────────────

    /// The operation was cancelled because the client is shutting down
    #[error("Client is shutting down")]
    Shutdown,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    // ─────────────────────────────────────────────────────────────
    // Error Classification
    // ─────────────────────────────────────────────────────────────

    /// Get the numeric error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Error::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Error::ConfigValidation { .. } => ErrorCode::ConfigValidation,
            Error::Config(_) => ErrorCode::ConfigValidation,

            Error::IoWrite { .. } => ErrorCode::IoWrite,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorCode::IoNotFound,
                std::io::ErrorKind::PermissionDenied => ErrorCode::IoPermission,
                _ => ErrorCode::IoRead,
            },
            Error::Toml(_) => ErrorCode::ConfigParseError,

            Error::ConnectFailed { .. } => ErrorCode::ConnectionFailed,
            Error::ConnectTimeout { .. } => ErrorCode::ConnectionTimeout,
            Error::InvalidUri { .. } => ErrorCode::InvalidUri,
            Error::PeerClosedPrematurely { .. } => ErrorCode::ConnectionLost,
            Error::InvalidState { .. } => ErrorCode::InvalidState,
            Error::StaleConnection { .. } => ErrorCode::StaleConnection,
            Error::Transport { .. } => ErrorCode::TransportError,

            Error::SendTimeout { .. } => ErrorCode::SendTimeout,
            Error::ReceiveTimeout { .. } => ErrorCode::ReceiveTimeout,
            Error::RegexMatchTimeout { .. } => ErrorCode::RegexMatchTimeout,

            Error::Shutdown => ErrorCode::Shutdown,
            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Check if the error is retryable by reconnecting
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ConnectFailed { .. }
                | Error::ConnectTimeout { .. }
                | Error::PeerClosedPrematurely { .. }
                | Error::InvalidState { .. }
                | Error::StaleConnection { .. }
                | Error::Transport { .. }
                | Error::SendTimeout { .. }
                | Error::ReceiveTimeout { .. }
                | Error::Io(_)
        )
    }

    /// Check if the error is a timeout of a single operation
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::ConnectTimeout { .. }
                | Error::SendTimeout { .. }
                | Error::ReceiveTimeout { .. }
                | Error::RegexMatchTimeout { .. }
        )
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    // ─────────────────────────────────────────────────────────────
    // User-Friendly Messages
    // ─────────────────────────────────────────────────────────────

    /// Get a user-friendly suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::ConfigNotFound { .. } => Some(
                "Run 'eventlink config init' to create a default configuration file.",
            ),
            Error::ConfigParse { .. } => Some(
                "Check your configuration file syntax. Run 'eventlink config validate' to see details.",
            ),
            Error::ConfigValidation { .. } => Some(
                "Review the configuration file and fix the invalid values.",
            ),
            Error::ConnectFailed { .. } => Some(
                "Check your network connection and verify the service URI is correct.",
            ),
            Error::ConnectTimeout { .. } => Some(
                "The service may be down or unreachable. Check your firewall settings.",
            ),
            Error::InvalidUri { .. } => Some(
                "The URI must look like ws://host:port/path or wss://host/path.",
            ),
            Error::PeerClosedPrematurely { .. } => Some(
                "The connection was interrupted. Enable auto_reconnect to recover automatically.",
            ),
            Error::RegexMatchTimeout { .. } => Some(
                "The service did not answer as expected. Retry the command or raise --timeout-ms.",
            ),
            _ => None,
        }
    }

    /// Format the error for terminal display with colors
    pub fn format_for_terminal(&self) -> String {
        let code = self.code();
        let suggestion = self.suggestion();

        let mut output = format!("\x1b[31mError [{}]\x1b[0m: {}\n", code.as_str(), self);

        if let Some(hint) = suggestion {
            output.push_str(&format!("\n\x1b[33mHint\x1b[0m: {}\n", hint));
        }

        output
    }

    /// Format the error for logging (no colors)
    pub fn format_for_log(&self) -> String {
        let code = self.code();
        format!("[{}] {}", code.as_str(), self)
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Constructors (for ergonomic error creation)
// ─────────────────────────────────────────────────────────────────

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Error::ConfigNotFound { path: path.into() }
    }

    /// Create a config validation error with field name
    pub fn config_field_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a connect failed error
    pub fn connect_failed(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConnectFailed {
            uri: uri.into(),
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(code: TransportErrorCode, message: impl Into<String>) -> Self {
        Error::Transport {
            code,
            message: message.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
