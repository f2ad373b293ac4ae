//! Error types for formdrop.
//!
//! This module defines all error types used throughout the formdrop crate,
//! covering the HTTP front end, the ingest channel, record decoding and the
//! JSON store.

use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for formdrop operations.
#[derive(Error, Debug)]
pub enum Error {
    // === HTTP Errors ===
    /// A requested static resource does not exist or cannot be read.
    #[error("resource not found: {path}")]
    NotFound {
        /// The request path that was looked up.
        path: String,
    },

    /// Failed to bind the HTTP listener.
    #[error("failed to bind HTTP listener on {addr}: {source}")]
    HttpBind {
        /// Address the listener tried to bind.
        addr: SocketAddr,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Record Errors ===
    /// A submitted form body could not be decoded into a record.
    #[error("malformed record: {reason}")]
    MalformedRecord {
        /// Why the body was rejected.
        reason: String,
    },

    // === Storage Errors ===
    /// The store file could not be opened for writing or the write failed.
    #[error("failed to write store at {path}: {source}")]
    StorageIo {
        /// Path to the store file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Channel Errors ===
    /// Sending a datagram into the ingest channel failed.
    #[error("failed to send datagram to {target}: {source}")]
    ChannelSend {
        /// Address the datagram was sent to.
        target: SocketAddr,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to bind the ingest receiver socket.
    #[error("failed to bind ingest socket on {addr}: {source}")]
    ChannelBind {
        /// Address the socket tried to bind.
        addr: SocketAddr,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// File system or socket operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for formdrop operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a not-found error for a request path.
    #[must_use]
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create a malformed record error.
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            reason: reason.into(),
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error means a static resource was not found.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error is a record decoding failure.
    #[must_use]
    pub fn is_malformed_record(&self) -> bool {
        matches!(self, Self::MalformedRecord { .. })
    }

    /// Check if this error is a store write failure.
    #[must_use]
    pub fn is_storage_io(&self) -> bool {
        matches!(self, Self::StorageIo { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::not_found("/missing.css");
        assert_eq!(err.to_string(), "resource not found: /missing.css");

        let err = Error::malformed("segment 'abc' has no '='");
        assert_eq!(err.to_string(), "malformed record: segment 'abc' has no '='");
    }

    #[test]
    fn test_error_predicates() {
        assert!(Error::not_found("/x").is_not_found());
        assert!(!Error::internal("x").is_not_found());

        assert!(Error::malformed("bad").is_malformed_record());
        assert!(!Error::not_found("/x").is_malformed_record());

        let err = Error::StorageIo {
            path: PathBuf::from("/tmp/data.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.is_storage_io());
        assert!(!Error::malformed("bad").is_storage_io());
    }

    #[test]
    fn test_internal_error() {
        let err = Error::internal("something went wrong");
        assert_eq!(err.to_string(), "internal error: something went wrong");
    }

    #[test]
    fn test_storage_io_error_display() {
        let err = Error::StorageIo {
            path: PathBuf::from("/readonly/data.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/readonly/data.json"));
        assert!(msg.contains("access denied"));
    }

    #[test]
    fn test_channel_send_error_display() {
        let err = Error::ChannelSend {
            target: "127.0.0.1:5000".parse().unwrap(),
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        };
        let msg = err.to_string();
        assert!(msg.contains("127.0.0.1:5000"));
        assert!(msg.contains("refused"));
    }

    #[test]
    fn test_channel_bind_error_display() {
        let err = Error::ChannelBind {
            addr: "127.0.0.1:5000".parse().unwrap(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.to_string().contains("ingest socket"));
    }

    #[test]
    fn test_http_bind_error_display() {
        let err = Error::HttpBind {
            addr: "0.0.0.0:3000".parse().unwrap(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.to_string().contains("0.0.0.0:3000"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
        }
    }

    #[test]
    fn test_config_validation_error_display() {
        let err = Error::ConfigValidation {
            message: "port must not be 0".to_string(),
        };
        assert!(err.to_string().contains("port must not be 0"));
    }

    #[test]
    fn test_directory_create_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = Error::DirectoryCreate {
            path: PathBuf::from("/root/forbidden"),
            source: io_err,
        };
        assert!(err.to_string().contains("/root/forbidden"));
    }
}
