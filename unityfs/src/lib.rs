//! UnityFS AssetBundle container library
//!
//! UnityFS is Unity's bundle container format: a versioned header followed by
//! a block/directory listing and a data region made of independently
//! compressed blocks. This crate parses and byte-accurately rewrites the
//! container, exposes the decompressed data region as a seekable stream even
//! when the storage is LZ4 blocks, and provides splice/repack pipelines over
//! the embedded file directory.
//!
//! ## Reading
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! let file = BufReader::new(File::open("assets.bundle")?);
//! let bundle = unityfs::Bundle::read(file)?;
//! for i in 0..bundle.file_count() {
//!     println!("{:?} {:?}", bundle.file_name(i), bundle.file_range(i));
//! }
//! # Ok::<(), unityfs::Error>(())
//! ```

pub mod bundle;
pub mod compression;
pub mod error;
pub mod header;
pub mod info;
pub mod ioutils;
mod pack;
pub mod segment;
pub mod stream;
mod write;

pub use bundle::{Bundle, DataReader};
pub use compression::Lz4Level;
pub use error::{Error, Result};
pub use header::{BundleHeader, FsHeader};
pub use info::{
    BlockAndDirInfo, BlockInfo, BytesReplacer, DirectoryInfo, Hash128, Replacer, ReplacerContent,
};
pub use pack::ProgressFn;
pub use segment::SegmentStream;
pub use stream::BlockStream;

/// Expected bundle signature.
pub const UNITY_FS_SIGNATURE: &str = "UnityFS";

/// Low six bits of the header (or per-block) flags select the compression.
pub const COMPRESSION_MASK: u32 = 0x3F;
/// The listing carries directory entries after the block table.
pub const HAS_DIRECTORY_INFO: u32 = 0x40;
/// The block/directory listing is stored at the end of the file.
pub const BLOCK_AND_DIR_AT_END: u32 = 0x80;
/// The data region is 16-byte aligned after the listing.
///
/// Engines that predate this flag use the same bit to mark encryption; see
/// [`BundleHeader::uses_new_archive_flags`].
pub const BLOCK_INFO_PADDING_AT_START: u32 = 0x200;

/// Encryption marker on engines before 2020.3.34 / 2021.3.2 / 2022.1.1.
pub const ENCRYPTION_OLD: u32 = 0x200;
/// Encryption marker on engines from 2020.3.34 / 2021.3.2 / 2022.1.1 on.
pub const ENCRYPTION_NEW: u32 = 0x1400;

/// Compression applied to the listing or to a single data block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionType {
    /// Stored without compression.
    None = 0,
    /// LZMA stream (properties header + 8-byte size + stream).
    Lzma = 1,
    /// Raw LZ4 block.
    Lz4 = 2,
    /// Raw LZ4 block, high-compression encoder.
    Lz4Hc = 3,
}

impl CompressionType {
    /// Extract the compression type from a flags field.
    ///
    /// Only the low six bits are examined.
    pub fn from_flags(flags: u32) -> Result<Self> {
        match flags & COMPRESSION_MASK {
            0 => Ok(Self::None),
            1 => Ok(Self::Lzma),
            2 => Ok(Self::Lz4),
            3 => Ok(Self::Lz4Hc),
            other => Err(Error::UnsupportedCompression(other as u8)),
        }
    }

    /// The raw flag value.
    pub fn as_flag(self) -> u32 {
        self as u32
    }

    /// `true` for either LZ4 variant.
    pub fn is_lz4(self) -> bool {
        matches!(self, Self::Lz4 | Self::Lz4Hc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_type_from_flags() {
        assert_eq!(CompressionType::from_flags(0x40).unwrap(), CompressionType::None);
        assert_eq!(CompressionType::from_flags(0x41).unwrap(), CompressionType::Lzma);
        assert_eq!(CompressionType::from_flags(0xC2).unwrap(), CompressionType::Lz4);
        assert_eq!(CompressionType::from_flags(0x43).unwrap(), CompressionType::Lz4Hc);

        let err = CompressionType::from_flags(0x44).unwrap_err();
        assert!(matches!(err, Error::UnsupportedCompression(4)), "actual: {err:?}");
    }
}
