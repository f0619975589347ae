// Path: crates/osd-types/src/error/mod.rs
//! Core error types for the OSD target.

use thiserror::Error;

/// A trait for assigning a stable, machine-readable string code to an error.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// Lets the store decide whether a failed read snapshot deserves one retry.
pub trait RetryHint {
    fn is_retryable(&self) -> bool;
}

/// Represents errors that can occur within the durable storage layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// A generic error originating from the underlying key-value store backend (e.g., redb).
    #[error("backend error: {0}")]
    Backend(String),
    /// An error occurred while serializing data for storage.
    #[error("encode error: {0}")]
    Encode(String),
    /// An error occurred while deserializing data from storage.
    #[error("decode error: {0}")]
    Decode(String),
    /// The requested key or item was not found in the store.
    #[error("not found")]
    NotFound,
    /// The schema seen by the transaction was missing or stale. The caller
    /// may re-create it and retry the operation once.
    #[error("retryable: {0}")]
    Retryable(String),
}

impl ErrorCode for StorageError {
    fn code(&self) -> &'static str {
        match self {
            Self::Backend(_) => "STORAGE_BACKEND_ERROR",
            Self::Encode(_) => "STORAGE_ENCODE_ERROR",
            Self::Decode(_) => "STORAGE_DECODE_ERROR",
            Self::NotFound => "STORAGE_NOT_FOUND",
            Self::Retryable(_) => "STORAGE_RETRYABLE",
        }
    }
}

impl RetryHint for StorageError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}

/// Errors raised while executing an object command.
#[derive(Debug, Error)]
pub enum OsdError {
    /// A CDB field was malformed or named an object of the wrong kind.
    #[error("Invalid field in CDB: {0}")]
    InvalidArgument(String),
    /// A data-out parameter list was malformed.
    #[error("Invalid field in parameter list: {0}")]
    InvalidParameterList(String),
    /// A parameter list length disagreed with the data supplied.
    #[error("Parameter list length error: {0}")]
    ParameterListLength(String),
    /// The addressed object, page or attribute does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
    /// A partition or collection still holds objects.
    #[error("Object {pid:#x}/{oid:#x} is not empty")]
    NotEmpty {
        /// Partition of the non-empty container.
        pid: u64,
        /// Object id of the non-empty container (0 for a partition).
        oid: u64,
    },
    /// The destination buffer cannot hold even a record header.
    #[error("Destination buffer overflow")]
    Overflow,
    /// A buffer could not be allocated at the requested size.
    #[error("Out of memory: {0}")]
    OutOfMemory(String),
    /// Object data file failure.
    #[error("I/O error: {0}")]
    Io(String),
    /// The service action is defined by the protocol but not implemented.
    #[error("Unimplemented service action: {0}")]
    Unimplemented(&'static str),
    /// An error from the attribute store or catalog.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl OsdError {
    /// Collapses `StorageError::NotFound` into the engine-level `NotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::Storage(StorageError::NotFound)
        )
    }
}

impl RetryHint for OsdError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_retryable())
    }
}

impl From<std::io::Error> for OsdError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl ErrorCode for OsdError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "OSD_INVALID_ARGUMENT",
            Self::InvalidParameterList(_) => "OSD_INVALID_PARAMETER_LIST",
            Self::ParameterListLength(_) => "OSD_PARAMETER_LIST_LENGTH",
            Self::NotFound(_) => "OSD_NOT_FOUND",
            Self::NotEmpty { .. } => "OSD_NOT_EMPTY",
            Self::Overflow => "OSD_OVERFLOW",
            Self::OutOfMemory(_) => "OSD_OUT_OF_MEMORY",
            Self::Io(_) => "OSD_IO_ERROR",
            Self::Unimplemented(_) => "OSD_UNIMPLEMENTED",
            Self::Storage(e) => e.code(),
        }
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ErrorCode for ConfigError {
    fn code(&self) -> &'static str {
        match self {
            Self::Read(_) => "CONFIG_READ_FAILED",
            Self::Parse(_) => "CONFIG_PARSE_FAILED",
            Self::Invalid(_) => "CONFIG_INVALID",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_codes_pass_through() {
        let e = OsdError::from(StorageError::Backend("disk".into()));
        assert_eq!(e.code(), "STORAGE_BACKEND_ERROR");
        assert!(OsdError::from(StorageError::NotFound).is_not_found());
        assert!(!OsdError::Overflow.is_not_found());
        assert!(OsdError::from(StorageError::Retryable("schema".into())).is_retryable());
        assert!(!OsdError::NotFound("attr".into()).is_retryable());
    }
}
