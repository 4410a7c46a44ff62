//! Context helpers for I/O results.
//!
//! Network failures keep the peer they happened on; local file failures
//! coming from an entity are folded into the entity error contract.

use crate::base::neterror::NetError;
use std::io;

pub trait IoResultExt<T> {
    /// Tags a failed connect with the peer.
    ///
    /// ```ignore
    /// let tcp = TcpStream::connect(addr).await.connection_context("example.com", 443)?;
    /// // "Connection to example.com:443 failed: refused"
    /// ```
    fn connection_context(self, host: &str, port: u16) -> Result<T, NetError>;

    /// Tags a failed lookup with the name being resolved.
    fn dns_context(self, domain: &str) -> Result<T, NetError>;

    /// Maps a failure while opening a file for an entity. Missing or
    /// unreadable paths are the caller's mistake.
    fn file_context(self) -> Result<T, NetError>;

    /// Maps a failure while pulling entity data: memory pressure stays
    /// `OutOfMemory`, everything else is `System`.
    fn entity_read_context(self) -> Result<T, NetError>;
}

impl<T> IoResultExt<T> for Result<T, io::Error> {
    fn connection_context(self, host: &str, port: u16) -> Result<T, NetError> {
        self.map_err(|e| NetError::connection_failed_to(host, port, e))
    }

    fn dns_context(self, domain: &str) -> Result<T, NetError> {
        self.map_err(|e| NetError::dns_failed(domain, e))
    }

    fn file_context(self) -> Result<T, NetError> {
        self.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied | io::ErrorKind::InvalidInput => {
                NetError::InvalidArgument
            }
            io::ErrorKind::OutOfMemory => NetError::OutOfMemory,
            _ => NetError::System,
        })
    }

    fn entity_read_context(self) -> Result<T, NetError> {
        self.map_err(|e| match e.kind() {
            io::ErrorKind::OutOfMemory => NetError::OutOfMemory,
            _ => NetError::System,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    fn failed(kind: ErrorKind, msg: &str) -> Result<(), io::Error> {
        Err(Error::new(kind, msg))
    }

    #[test]
    fn test_connection_context() {
        let err = failed(ErrorKind::ConnectionRefused, "refused")
            .connection_context("example.com", 443)
            .unwrap_err();
        assert_eq!(
            err,
            NetError::ConnectionFailedTo {
                host: "example.com".into(),
                port: 443,
                reason: "refused".into(),
            }
        );
        assert_eq!(err.to_string(), "Connection to example.com:443 failed: refused");
    }

    #[test]
    fn test_dns_context() {
        match failed(ErrorKind::NotFound, "no such host").dns_context("unknown.test") {
            Err(NetError::NameNotResolvedFor { domain, reason }) => {
                assert_eq!(domain, "unknown.test");
                assert_eq!(reason, "no such host");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_file_context() {
        assert_eq!(
            failed(ErrorKind::NotFound, "gone").file_context(),
            Err(NetError::InvalidArgument)
        );
        assert_eq!(
            failed(ErrorKind::PermissionDenied, "denied").file_context(),
            Err(NetError::InvalidArgument)
        );
        assert_eq!(failed(ErrorKind::Other, "disk").file_context(), Err(NetError::System));
    }

    #[test]
    fn test_entity_read_context() {
        assert_eq!(
            failed(ErrorKind::OutOfMemory, "oom").entity_read_context(),
            Err(NetError::OutOfMemory)
        );
        assert_eq!(
            failed(ErrorKind::UnexpectedEof, "short").entity_read_context(),
            Err(NetError::System)
        );
    }
}
