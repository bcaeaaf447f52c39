//! Storage error types.

use shared_types::Hash;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("persistence I/O error: {detail}")]
    Io { detail: String },

    /// A second consecutive I/O failure after the fsync retry. Block
    /// application must halt on the last good snapshot.
    #[error("persistence failed after retry: {detail}")]
    Fatal { detail: String },

    #[error("index corruption: {detail}")]
    IndexCorruption { detail: String },

    #[error("block not found")]
    BlockNotFound { hash: Hash },

    #[error("height {height} not on the best chain")]
    HeightNotFound { height: u64 },

    #[error("block already stored")]
    BlockExists { hash: Hash },

    #[error("reorg beyond window: depth {depth}, window {window}")]
    ReorgBeyondWindow { depth: u64, window: u64 },

    #[error("insufficient disk space: {available} bytes available")]
    DiskFull { available: u64 },

    #[error("codec failure: {detail}")]
    Codec { detail: String },
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io {
            detail: err.to_string(),
        }
    }
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Codec {
            detail: err.to_string(),
        }
    }
}
