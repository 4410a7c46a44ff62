use std::io;
use thiserror::Error;

/// Coarse classification of a [`NetError`].
///
/// Callers that only need to decide between "fix the call", "retry later"
/// and "give up" can match on this instead of the individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A value passed by the caller was rejected.
    ArgumentInvalid,
    /// The object was not in a state that allows the operation.
    StateInvalid,
    /// A configured limit or buffer was exhausted.
    ResourceExhausted,
    /// Transport level failure: DNS, TCP, timeouts.
    NetworkFailure,
    /// The peer violated HTTP framing or sent an unusable response.
    ProtocolFailure,
    /// TLS, certificate or authentication failure.
    SecurityFailure,
    /// A looked up item does not exist.
    NotFound,
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum NetError {
    // Argument Errors
    #[error("Invalid argument")]
    InvalidArgument,
    #[error("Invalid URL")]
    InvalidUrl,
    #[error("Disallowed URL scheme")]
    DisallowedUrlScheme,
    #[error("Invalid header")]
    InvalidHeader,
    #[error("Invalid content")]
    InvalidContent,
    #[error("Invalid proxy address")]
    InvalidProxy,
    #[error("Invalid host address")]
    InvalidAddress,
    #[error("Field already exists")]
    AlreadyExists,

    // State Errors
    #[error("Invalid state")]
    InvalidState,
    #[error("Invalid operation")]
    InvalidOperation,
    #[error("Session is no longer valid")]
    InvalidSession,
    #[error("Transaction is no longer valid")]
    InvalidTransaction,
    #[error("Operation canceled")]
    OperationCanceled,
    #[error("Body is empty")]
    EmptyBody,

    // Resource Errors
    #[error("Maximum exceeded")]
    MaxExceeded,
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Not found")]
    NotFound,

    // Connection Errors
    #[error("Connection closed (TCP FIN)")]
    ConnectionClosed,
    #[error("Connection reset (TCP RST)")]
    ConnectionReset,
    #[error("Connection refused")]
    ConnectionRefused,
    #[error("Connection aborted")]
    ConnectionAborted,
    #[error("Connection failed")]
    ConnectionFailed,
    #[error("Connection to {host}:{port} failed: {reason}")]
    ConnectionFailedTo {
        host: String,
        port: u16,
        reason: String,
    },
    #[error("Name not resolved")]
    NameNotResolved,
    #[error("Failed to resolve {domain}: {reason}")]
    NameNotResolvedFor { domain: String, reason: String },
    #[error("Internet disconnected")]
    InternetDisconnected,
    #[error("Address unreachable")]
    AddressUnreachable,
    #[error("Tunnel connection failed")]
    TunnelConnectionFailed,
    #[error("Proxy connection failed")]
    ProxyConnectionFailed,
    #[error("Timed out")]
    TimedOut,

    // Security Errors
    #[error("SSL protocol error")]
    SslProtocolError,
    #[error("Server certificate is not trusted")]
    ServerCertUntrusted,
    #[error("Invalid auth credentials")]
    InvalidAuthCredentials,
    #[error("Unsupported auth scheme")]
    UnsupportedAuthScheme,

    // HTTP Errors
    #[error("Too many redirects")]
    TooManyRedirects,
    #[error("Invalid response")]
    InvalidResponse,
    #[error("Empty response")]
    EmptyResponse,
    #[error("Response headers too big")]
    ResponseHeadersTooBig,
    #[error("Invalid chunked encoding")]
    InvalidChunkedEncoding,
    #[error("Incomplete chunked encoding")]
    IncompleteChunkedEncoding,
    #[error("Content length mismatch")]
    ContentLengthMismatch,
    #[error("Content decoding failed")]
    ContentDecodingFailed,

    #[error("System error")]
    System,
    #[error("Unknown error: {0}")]
    Unknown(i32),
}

impl NetError {
    /// Create a connection error with host context.
    pub fn connection_failed_to(host: &str, port: u16, source: io::Error) -> Self {
        NetError::ConnectionFailedTo {
            host: host.to_string(),
            port,
            reason: source.to_string(),
        }
    }

    /// Create a DNS error with domain context.
    pub fn dns_failed(domain: &str, source: io::Error) -> Self {
        NetError::NameNotResolvedFor {
            domain: domain.to_string(),
            reason: source.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            NetError::InvalidArgument
            | NetError::InvalidUrl
            | NetError::DisallowedUrlScheme
            | NetError::InvalidHeader
            | NetError::InvalidContent
            | NetError::InvalidProxy
            | NetError::InvalidAddress
            | NetError::AlreadyExists => ErrorKind::ArgumentInvalid,

            NetError::InvalidState
            | NetError::InvalidOperation
            | NetError::InvalidSession
            | NetError::InvalidTransaction
            | NetError::OperationCanceled
            | NetError::EmptyBody => ErrorKind::StateInvalid,

            NetError::MaxExceeded | NetError::OutOfMemory => ErrorKind::ResourceExhausted,

            NetError::NotFound => ErrorKind::NotFound,

            NetError::ConnectionClosed
            | NetError::ConnectionReset
            | NetError::ConnectionRefused
            | NetError::ConnectionAborted
            | NetError::ConnectionFailed
            | NetError::ConnectionFailedTo { .. }
            | NetError::NameNotResolved
            | NetError::NameNotResolvedFor { .. }
            | NetError::InternetDisconnected
            | NetError::AddressUnreachable
            | NetError::TunnelConnectionFailed
            | NetError::ProxyConnectionFailed
            | NetError::TimedOut
            | NetError::System
            | NetError::Unknown(_) => ErrorKind::NetworkFailure,

            NetError::SslProtocolError
            | NetError::ServerCertUntrusted
            | NetError::InvalidAuthCredentials
            | NetError::UnsupportedAuthScheme => ErrorKind::SecurityFailure,

            NetError::TooManyRedirects
            | NetError::InvalidResponse
            | NetError::EmptyResponse
            | NetError::ResponseHeadersTooBig
            | NetError::InvalidChunkedEncoding
            | NetError::IncompleteChunkedEncoding
            | NetError::ContentLengthMismatch
            | NetError::ContentDecodingFailed => ErrorKind::ProtocolFailure,
        }
    }

    pub fn as_i32(&self) -> i32 {
        match self {
            NetError::OperationCanceled => -3,
            NetError::InvalidArgument => -4,
            NetError::NotFound => -6,
            NetError::TimedOut => -7,
            NetError::OutOfMemory => -15,

            NetError::ConnectionClosed => -100,
            NetError::ConnectionReset => -101,
            NetError::ConnectionRefused => -102,
            NetError::ConnectionAborted => -103,
            NetError::ConnectionFailed | NetError::ConnectionFailedTo { .. } => -104,
            NetError::NameNotResolved | NetError::NameNotResolvedFor { .. } => -105,
            NetError::InternetDisconnected => -106,
            NetError::SslProtocolError => -107,
            NetError::InvalidAddress => -108,
            NetError::AddressUnreachable => -109,
            NetError::TunnelConnectionFailed => -111,
            NetError::ProxyConnectionFailed => -130,

            NetError::ServerCertUntrusted => -202,

            NetError::InvalidUrl => -300,
            NetError::DisallowedUrlScheme => -301,
            NetError::TooManyRedirects => -310,
            NetError::InvalidResponse => -320,
            NetError::InvalidChunkedEncoding => -321,
            NetError::EmptyResponse => -324,
            NetError::ResponseHeadersTooBig => -325,
            NetError::ContentDecodingFailed => -330,
            NetError::InvalidAuthCredentials => -338,
            NetError::UnsupportedAuthScheme => -339,
            NetError::ContentLengthMismatch => -354,
            NetError::IncompleteChunkedEncoding => -355,

            // Custom codes, outside the ranges used by net_error_list.h
            NetError::InvalidState => -10001,
            NetError::InvalidOperation => -10002,
            NetError::InvalidSession => -10003,
            NetError::InvalidTransaction => -10004,
            NetError::AlreadyExists => -10005,
            NetError::EmptyBody => -10006,
            NetError::InvalidHeader => -10007,
            NetError::InvalidContent => -10008,
            NetError::MaxExceeded => -10009,
            NetError::InvalidProxy => -10010,
            NetError::System => -10011,

            NetError::Unknown(code) => *code,
        }
    }
}

impl From<i32> for NetError {
    fn from(code: i32) -> Self {
        match code {
            -3 => NetError::OperationCanceled,
            -4 => NetError::InvalidArgument,
            -6 => NetError::NotFound,
            -7 => NetError::TimedOut,
            -15 => NetError::OutOfMemory,
            -100 => NetError::ConnectionClosed,
            -101 => NetError::ConnectionReset,
            -102 => NetError::ConnectionRefused,
            -103 => NetError::ConnectionAborted,
            -104 => NetError::ConnectionFailed,
            -105 => NetError::NameNotResolved,
            -106 => NetError::InternetDisconnected,
            -107 => NetError::SslProtocolError,
            -108 => NetError::InvalidAddress,
            -109 => NetError::AddressUnreachable,
            -111 => NetError::TunnelConnectionFailed,
            -130 => NetError::ProxyConnectionFailed,
            -202 => NetError::ServerCertUntrusted,
            -300 => NetError::InvalidUrl,
            -301 => NetError::DisallowedUrlScheme,
            -310 => NetError::TooManyRedirects,
            -320 => NetError::InvalidResponse,
            -321 => NetError::InvalidChunkedEncoding,
            -324 => NetError::EmptyResponse,
            -325 => NetError::ResponseHeadersTooBig,
            -330 => NetError::ContentDecodingFailed,
            -338 => NetError::InvalidAuthCredentials,
            -339 => NetError::UnsupportedAuthScheme,
            -354 => NetError::ContentLengthMismatch,
            -355 => NetError::IncompleteChunkedEncoding,
            -10001 => NetError::InvalidState,
            -10002 => NetError::InvalidOperation,
            -10003 => NetError::InvalidSession,
            -10004 => NetError::InvalidTransaction,
            -10005 => NetError::AlreadyExists,
            -10006 => NetError::EmptyBody,
            -10007 => NetError::InvalidHeader,
            -10008 => NetError::InvalidContent,
            -10009 => NetError::MaxExceeded,
            -10010 => NetError::InvalidProxy,
            -10011 => NetError::System,
            _ => NetError::Unknown(code),
        }
    }
}

impl From<io::Error> for NetError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut => NetError::TimedOut,
            io::ErrorKind::ConnectionReset => NetError::ConnectionReset,
            io::ErrorKind::ConnectionRefused => NetError::ConnectionRefused,
            io::ErrorKind::ConnectionAborted => NetError::ConnectionAborted,
            io::ErrorKind::UnexpectedEof | io::ErrorKind::BrokenPipe => NetError::ConnectionClosed,
            io::ErrorKind::OutOfMemory => NetError::OutOfMemory,
            io::ErrorKind::NotFound => NetError::NotFound,
            io::ErrorKind::InvalidInput => NetError::InvalidArgument,
            _ => NetError::ConnectionFailed,
        }
    }
}
