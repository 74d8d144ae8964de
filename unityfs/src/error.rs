//! Error types for bundle parsing and rewriting

use std::io;

use thiserror::Error;

/// Result type for bundle operations
pub type Result<T> = std::result::Result<T, Error>;

/// Bundle error types
#[derive(Error, Debug)]
pub enum Error {
    /// Signature other than "UnityFS"
    #[error("unsupported bundle signature: {0:?}")]
    UnsupportedSignature(String),

    /// Bundle format version outside the supported 6..=8 range
    #[error("unsupported bundle version: {0}")]
    UnsupportedVersion(u32),

    /// Unknown compression type, or a block whose compression contradicts
    /// the bundle's classification
    #[error("unsupported compression type: {0:#04x}")]
    UnsupportedCompression(u8),

    /// Short read, bad length prefix, inconsistent sizes, or a string
    /// missing its terminator
    #[error("malformed bundle: {0}")]
    MalformedInput(String),

    /// The LZ4/LZMA codec rejected the input or produced fewer bytes than
    /// declared
    #[error("codec failure: {0}")]
    Codec(String),

    /// `write` or `pack` called while the data region is still compressed
    #[error("bundle data must be decompressed before rewriting")]
    MustDecompressFirst,

    /// The data region does not fit the single block emitted by `pack`
    #[error("data region too large for a single block: {0} bytes")]
    DataTooLarge(u64),

    /// Data access after `close`
    #[error("bundle stream is closed")]
    ClosedStream,

    /// The bundle carries an encryption flag
    #[error("encrypted bundles are not supported")]
    Encrypted,

    /// Underlying stream failure
    #[error("IO error: {0}")]
    Io(io::Error),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        // A read crossing end-of-stream is a format error, not an IO fault.
        match e.kind() {
            io::ErrorKind::UnexpectedEof => Self::MalformedInput("unexpected end of stream".into()),
            _ => Self::Io(e),
        }
    }
}

// Needed for the `Read`/`Seek` impls on the random-access streams.
impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Io(inner) => inner,
            other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_read_maps_to_malformed_input() {
        let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "failed to fill whole buffer");
        assert!(matches!(Error::from(eof), Error::MalformedInput(_)));

        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        assert!(matches!(Error::from(denied), Error::Io(_)));
    }
}
