//! Block and directory listing
//!
//! The listing is the serialized description of the data region: a 16-byte
//! hash, the compression blocks the region is cut into, and the directory of
//! embedded files addressed by offsets into the decompressed region. It is
//! itself compressible independently of the data.

use std::fmt;
use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::ioutils::{ReadExt, WriteExt};
use crate::{CompressionType, Result};

/// Pre-allocation guard for count fields read from untrusted input.
const MAX_PREALLOC_ENTRIES: u32 = 0x10000;

/// Opaque 16-byte bundle hash, carried through rewrites but never verified.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct Hash128(pub [u8; 16]);

impl fmt::Debug for Hash128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash128({})", hex::encode(self.0))
    }
}

/// One compression block of the data region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Size of the block once decompressed.
    pub decompressed_size: u32,
    /// Stored size of the block.
    pub compressed_size: u32,
    /// Low six bits carry the block's compression type.
    pub flags: u16,
}

impl BlockInfo {
    /// Compression applied to this block.
    pub fn compression_type(&self) -> Result<CompressionType> {
        CompressionType::from_flags(self.flags as u32)
    }
}

/// Content substitution attached to a directory entry, applied on the next
/// rewrite.
pub enum Replacer {
    /// Drop the entry entirely.
    Remove,
    /// Replace the entry's bytes with caller-supplied content.
    AddOrModify(Box<dyn ReplacerContent>),
}

impl fmt::Debug for Replacer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remove => f.write_str("Remove"),
            Self::AddOrModify(content) => {
                f.debug_tuple("AddOrModify").field(&content.size()).finish()
            }
        }
    }
}

/// Byte source backing a [`Replacer::AddOrModify`] edit.
///
/// `size` must agree with the number of bytes `write_to` produces; the
/// rewriter sizes its block layout from it before streaming.
pub trait ReplacerContent {
    /// Number of bytes the replacement will occupy.
    fn size(&self) -> u64;

    /// Stream the replacement bytes, returning how many were written.
    fn write_to(&self, writer: &mut dyn Write) -> io::Result<u64>;
}

/// In-memory [`ReplacerContent`].
#[derive(Debug, Clone)]
pub struct BytesReplacer(pub Vec<u8>);

impl ReplacerContent for BytesReplacer {
    fn size(&self) -> u64 {
        self.0.len() as u64
    }

    fn write_to(&self, writer: &mut dyn Write) -> io::Result<u64> {
        writer.write_all(&self.0)?;
        Ok(self.0.len() as u64)
    }
}

/// One embedded file of the bundle.
#[derive(Debug, Default)]
pub struct DirectoryInfo {
    /// Offset into the logical decompressed data region.
    pub offset: i64,
    /// Length of the file within the region.
    pub decompressed_size: i64,
    /// Entry flags; bit 2 marks a serialized assets file.
    pub flags: u32,
    /// Entry name, unique within the bundle.
    pub name: String,
    /// Pending edit, consulted only by the rewriter.
    pub replacer: Option<Replacer>,
}

impl DirectoryInfo {
    /// Copy the serialized fields, leaving any pending edit behind.
    pub fn clone_meta(&self) -> Self {
        Self {
            offset: self.offset,
            decompressed_size: self.decompressed_size,
            flags: self.flags,
            name: self.name.clone(),
            replacer: None,
        }
    }

    /// `true` when a [`Replacer::Remove`] edit is attached.
    pub fn is_removed(&self) -> bool {
        matches!(self.replacer, Some(Replacer::Remove))
    }
}

/// The deserialized listing: hash, blocks and directory.
#[derive(Debug, Default)]
pub struct BlockAndDirInfo {
    /// Opaque bundle hash.
    pub hash: Hash128,
    /// Compression blocks in concatenation order.
    pub block_infos: Vec<BlockInfo>,
    /// Embedded file directory.
    pub directory_infos: Vec<DirectoryInfo>,
}

impl BlockAndDirInfo {
    /// Parse a listing from its (already decompressed) serialized form.
    pub fn parse<R: Read>(reader: &mut R) -> Result<Self> {
        let mut hash = [0u8; 16];
        reader.read_exact(&mut hash)?;

        let block_count = reader.read_u32::<BigEndian>()?;
        let mut block_infos =
            Vec::with_capacity(block_count.min(MAX_PREALLOC_ENTRIES) as usize);
        for _ in 0..block_count {
            block_infos.push(BlockInfo {
                decompressed_size: reader.read_u32::<BigEndian>()?,
                compressed_size: reader.read_u32::<BigEndian>()?,
                flags: reader.read_u16::<BigEndian>()?,
            });
        }

        let directory_count = reader.read_u32::<BigEndian>()?;
        let mut directory_infos =
            Vec::with_capacity(directory_count.min(MAX_PREALLOC_ENTRIES) as usize);
        for _ in 0..directory_count {
            directory_infos.push(DirectoryInfo {
                offset: reader.read_i64::<BigEndian>()?,
                decompressed_size: reader.read_i64::<BigEndian>()?,
                flags: reader.read_u32::<BigEndian>()?,
                name: reader.read_cstring()?,
                replacer: None,
            });
        }

        Ok(Self {
            hash: Hash128(hash),
            block_infos,
            directory_infos,
        })
    }

    /// Serialize the listing. Pending replacers are not part of the format
    /// and are ignored.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.hash.0)?;

        writer.write_u32::<BigEndian>(self.block_infos.len() as u32)?;
        for block in &self.block_infos {
            writer.write_u32::<BigEndian>(block.decompressed_size)?;
            writer.write_u32::<BigEndian>(block.compressed_size)?;
            writer.write_u16::<BigEndian>(block.flags)?;
        }

        writer.write_u32::<BigEndian>(self.directory_infos.len() as u32)?;
        for dir in &self.directory_infos {
            writer.write_i64::<BigEndian>(dir.offset)?;
            writer.write_i64::<BigEndian>(dir.decompressed_size)?;
            writer.write_u32::<BigEndian>(dir.flags)?;
            writer.write_cstring(&dir.name)?;
        }

        Ok(())
    }

    /// Serialized size of the listing in bytes.
    pub fn serialized_size(&self) -> u64 {
        let dirs: u64 = self
            .directory_infos
            .iter()
            .map(|d| 8 + 8 + 4 + d.name.len() as u64 + 1)
            .sum();
        16 + 4 + self.block_infos.len() as u64 * 10 + 4 + dirs
    }

    /// Total decompressed size of the data region.
    pub fn total_block_decompressed_size(&self) -> u64 {
        self.block_infos
            .iter()
            .map(|b| b.decompressed_size as u64)
            .sum()
    }

    /// Classify the data region by the first block that declares a
    /// compression type; `None`-only bundles classify as uncompressed.
    pub fn data_compression_type(&self) -> Result<CompressionType> {
        for block in &self.block_infos {
            let block_type = block.compression_type()?;
            if block_type != CompressionType::None {
                return Ok(block_type);
            }
        }
        Ok(CompressionType::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn listing() -> BlockAndDirInfo {
        BlockAndDirInfo {
            hash: Hash128([7; 16]),
            block_infos: vec![
                BlockInfo {
                    decompressed_size: 64,
                    compressed_size: 32,
                    flags: 2,
                },
                BlockInfo {
                    decompressed_size: 16,
                    compressed_size: 16,
                    flags: 0,
                },
            ],
            directory_infos: vec![
                DirectoryInfo {
                    offset: 0,
                    decompressed_size: 48,
                    flags: 4,
                    name: "CAB-0123".to_string(),
                    replacer: None,
                },
                DirectoryInfo {
                    offset: 48,
                    decompressed_size: 32,
                    flags: 0,
                    name: "CAB-0123.resS".to_string(),
                    replacer: None,
                },
            ],
        }
    }

    #[test]
    fn roundtrip_and_size() {
        let info = listing();
        let mut buf = Vec::new();
        info.write(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, info.serialized_size());

        let parsed = BlockAndDirInfo::parse(&mut Cursor::new(buf)).unwrap();
        assert_eq!(parsed.hash, info.hash);
        assert_eq!(parsed.block_infos, info.block_infos);
        assert_eq!(parsed.directory_infos.len(), 2);
        assert_eq!(parsed.directory_infos[1].name, "CAB-0123.resS");
        assert_eq!(parsed.directory_infos[1].offset, 48);
    }

    #[test]
    fn truncated_listing_is_malformed() {
        let mut buf = Vec::new();
        listing().write(&mut buf).unwrap();
        buf.truncate(buf.len() - 4);
        let err = BlockAndDirInfo::parse(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, crate::Error::MalformedInput(_)), "actual: {err:?}");
    }

    #[test]
    fn data_classification_takes_first_typed_block() {
        let mut info = listing();
        assert_eq!(info.data_compression_type().unwrap(), CompressionType::Lz4);

        info.block_infos[0].flags = 0;
        assert_eq!(info.data_compression_type().unwrap(), CompressionType::None);

        info.block_infos[1].flags = 1;
        assert_eq!(info.data_compression_type().unwrap(), CompressionType::Lzma);
    }

    #[test]
    fn total_decompressed_size() {
        assert_eq!(listing().total_block_decompressed_size(), 80);
    }
}
