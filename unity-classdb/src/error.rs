//! Error types for class database parsing

use std::io;

use thiserror::Error;

/// Result type for class database operations
pub type Result<T> = std::result::Result<T, Error>;

/// Class database error types
#[derive(Error, Debug)]
pub enum Error {
    /// The file does not start with the "cldb" magic
    #[error("invalid class database magic: {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unknown file format version
    #[error("unsupported class database version: {0}")]
    UnsupportedFileVersion(u8),

    /// Unknown payload compression type
    #[error("unsupported class database compression: {0:#04x}")]
    UnsupportedCompression(u8),

    /// Short read, bad count field or a string missing its terminator
    #[error("malformed class database: {0}")]
    MalformedInput(String),

    /// The string table cannot take another entry
    #[error("string table exhausted the u16 index space")]
    StringTableFull,

    /// Codec failure from the compression adapters
    #[error("codec failure: {0}")]
    Codec(#[from] unityfs::Error),

    /// Underlying stream failure
    #[error("IO error: {0}")]
    Io(io::Error),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof => Self::MalformedInput("unexpected end of stream".into()),
            _ => Self::Io(e),
        }
    }
}
