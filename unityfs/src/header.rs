//! Bundle header parsing and emission
//!
//! The header is the NUL-terminated signature, a format version, two engine
//! version strings, and the fixed-size FS header (total size, listing sizes,
//! flags). Format version 7 introduced 16-byte alignment between the header
//! and whatever follows it.

use std::io::{Read, Seek, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use tracing::debug;

use crate::ioutils::{align16_read, align16_write, ReadExt, WriteExt};
use crate::{
    CompressionType, Error, Result, BLOCK_AND_DIR_AT_END, BLOCK_INFO_PADDING_AT_START,
    ENCRYPTION_NEW, ENCRYPTION_OLD, UNITY_FS_SIGNATURE,
};

/// Fixed-size tail of the bundle header.
///
/// `compressed_size`/`decompressed_size` describe the block-and-directory
/// listing, not the data region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsHeader {
    /// Size of the whole bundle file in bytes.
    pub total_file_size: i64,
    /// Stored size of the listing.
    pub compressed_size: u32,
    /// Size of the listing once decompressed.
    pub decompressed_size: u32,
    /// Flag bits; see the crate-level constants.
    pub flags: u32,
}

/// Versioned bundle header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleHeader {
    /// Container signature, always "UnityFS" here.
    pub signature: String,
    /// Bundle format version; 6 through 8 are supported.
    pub version: u32,
    /// Minimum player generation, e.g. "5.x.x".
    pub generation_version: String,
    /// Engine version the bundle was built with, e.g. "2021.3.4f1".
    pub engine_version: String,
    /// Fixed-size header tail.
    pub fs_header: FsHeader,
}

impl BundleHeader {
    /// Parse a header from the current stream position.
    pub fn parse<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let signature = reader.read_cstring()?;
        if signature != UNITY_FS_SIGNATURE {
            return Err(Error::UnsupportedSignature(signature));
        }

        let version = reader.read_u32::<BigEndian>()?;
        if !(6..=8).contains(&version) {
            return Err(Error::UnsupportedVersion(version));
        }

        let generation_version = reader.read_cstring()?;
        let engine_version = reader.read_cstring()?;

        let fs_header = FsHeader {
            total_file_size: reader.read_i64::<BigEndian>()?,
            compressed_size: reader.read_u32::<BigEndian>()?,
            decompressed_size: reader.read_u32::<BigEndian>()?,
            flags: reader.read_u32::<BigEndian>()?,
        };

        if version >= 7 {
            align16_read(reader)?;
        }

        debug!(
            "parsed bundle header: version {version}, engine {engine_version}, flags {:#x}",
            fs_header.flags
        );

        Ok(Self {
            signature,
            version,
            generation_version,
            engine_version,
            fs_header,
        })
    }

    /// Emit the header at the current stream position, including the
    /// version 7 alignment padding.
    pub fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        writer.write_cstring(&self.signature)?;
        writer.write_u32::<BigEndian>(self.version)?;
        writer.write_cstring(&self.generation_version)?;
        writer.write_cstring(&self.engine_version)?;
        writer.write_i64::<BigEndian>(self.fs_header.total_file_size)?;
        writer.write_u32::<BigEndian>(self.fs_header.compressed_size)?;
        writer.write_u32::<BigEndian>(self.fs_header.decompressed_size)?;
        writer.write_u32::<BigEndian>(self.fs_header.flags)?;
        if self.version >= 7 {
            align16_write(writer)?;
        }
        Ok(())
    }

    /// Byte-exact size of the serialized header, alignment included.
    ///
    /// Assumes the header sits at the start of the file, which is the only
    /// placement the format defines.
    pub fn header_size(&self) -> u64 {
        let size = self.signature.len() as u64 + 1
            + 4
            + self.generation_version.len() as u64 + 1
            + self.engine_version.len() as u64 + 1
            + 8 + 4 + 4 + 4;
        if self.version >= 7 {
            size.next_multiple_of(16)
        } else {
            size
        }
    }

    /// File offset where the block-and-directory listing is stored.
    pub fn bundle_info_offset(&self) -> u64 {
        if self.fs_header.flags & BLOCK_AND_DIR_AT_END != 0 {
            (self.fs_header.total_file_size as u64)
                .saturating_sub(self.fs_header.compressed_size as u64)
        } else {
            self.header_size()
        }
    }

    /// File offset where the data region begins.
    pub fn file_data_offset(&self) -> u64 {
        let mut offset = self.header_size();
        if self.fs_header.flags & BLOCK_AND_DIR_AT_END == 0 {
            offset += self.fs_header.compressed_size as u64;
        }
        if self.fs_header.flags & BLOCK_INFO_PADDING_AT_START != 0 {
            offset = offset.next_multiple_of(16);
        }
        offset
    }

    /// Compression applied to the listing.
    pub fn compression_type(&self) -> Result<CompressionType> {
        CompressionType::from_flags(self.fs_header.flags)
    }

    /// `true` if the engine that built this bundle uses the post-2020.3.34
    /// archive flag layout, where the encryption marker moved off bit 0x200.
    pub fn uses_new_archive_flags(&self) -> bool {
        parse_engine_version(&self.engine_version)
            .map(uses_new_archive_flags)
            .unwrap_or(false)
    }

    /// Reject bundles carrying the encryption flag for their flag layout.
    ///
    /// On old layouts bit 0x200 marks encryption, so that bit never reaches
    /// the padding interpretation there.
    pub fn check_not_encrypted(&self) -> Result<()> {
        let mask = if self.uses_new_archive_flags() {
            ENCRYPTION_NEW
        } else {
            ENCRYPTION_OLD
        };
        if self.fs_header.flags & mask != 0 {
            return Err(Error::Encrypted);
        }
        Ok(())
    }
}

/// Pull the leading `(major, minor, patch)` triple out of an engine version
/// string such as "2021.3.4f1".
fn parse_engine_version(value: &str) -> Option<(u32, u32, u32)> {
    let mut parts = value
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<u32>().ok());
    Some((parts.next()?, parts.next()?, parts.next()?))
}

fn uses_new_archive_flags(version: (u32, u32, u32)) -> bool {
    match version {
        (major, ..) if major < 2020 => false,
        (2020, minor, patch) => (minor, patch) >= (3, 34),
        (2021, minor, patch) => (minor, patch) >= (3, 2),
        (2022, minor, patch) => (minor, patch) >= (1, 1),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn header(version: u32, flags: u32) -> BundleHeader {
        BundleHeader {
            signature: UNITY_FS_SIGNATURE.to_string(),
            version,
            generation_version: "5.x.x".to_string(),
            engine_version: "2021.3.4f1".to_string(),
            fs_header: FsHeader {
                total_file_size: 4096,
                compressed_size: 100,
                decompressed_size: 160,
                flags,
            },
        }
    }

    #[test]
    fn roundtrip_matches_header_size() {
        for version in [6, 7, 8] {
            let header = header(version, 0x43);
            let mut buf = Cursor::new(Vec::new());
            header.write(&mut buf).unwrap();
            assert_eq!(buf.get_ref().len() as u64, header.header_size());

            buf.set_position(0);
            assert_eq!(BundleHeader::parse(&mut buf).unwrap(), header);
        }
    }

    #[test]
    fn rejects_bad_signature_and_version() {
        let mut buf = Cursor::new(Vec::new());
        header(7, 0x43).write(&mut buf).unwrap();
        let mut bytes = buf.into_inner();
        bytes[5] = b'G';
        let err = BundleHeader::parse(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedSignature(_)), "actual: {err:?}");

        let mut buf = Cursor::new(Vec::new());
        let mut old = header(7, 0x43);
        old.version = 5;
        old.write(&mut buf).unwrap();
        buf.set_position(0);
        let err = BundleHeader::parse(&mut buf).unwrap_err();
        assert!(matches!(err, Error::UnsupportedVersion(5)), "actual: {err:?}");
    }

    #[test]
    fn derived_offsets() {
        let head = header(7, 0x43);
        assert_eq!(head.bundle_info_offset(), head.header_size());
        assert_eq!(head.file_data_offset(), head.header_size() + 100);

        let at_end = header(7, 0x43 | BLOCK_AND_DIR_AT_END);
        assert_eq!(at_end.bundle_info_offset(), 4096 - 100);
        assert_eq!(at_end.file_data_offset(), at_end.header_size());

        let padded = header(7, 0x43 | BLOCK_INFO_PADDING_AT_START);
        assert_eq!(padded.file_data_offset() % 16, 0);
    }

    #[test]
    fn encryption_flag_depends_on_engine_generation() {
        // 2021.3.4 uses the new layout: 0x200 is padding, 0x1400 encryption.
        let padded = header(7, 0x43 | BLOCK_INFO_PADDING_AT_START);
        assert!(padded.check_not_encrypted().is_ok());
        let encrypted = header(7, 0x43 | ENCRYPTION_NEW);
        assert!(matches!(encrypted.check_not_encrypted(), Err(Error::Encrypted)));

        // 2019-era engines treat 0x200 itself as the encryption marker.
        let mut legacy = header(6, 0x43 | 0x200);
        legacy.engine_version = "2019.4.31f1".to_string();
        assert!(matches!(legacy.check_not_encrypted(), Err(Error::Encrypted)));
    }

    #[test]
    fn engine_version_parsing() {
        assert_eq!(parse_engine_version("2021.3.4f1"), Some((2021, 3, 4)));
        assert_eq!(parse_engine_version("5.6.7p3"), Some((5, 6, 7)));
        assert_eq!(parse_engine_version("garbage"), None);
        assert!(uses_new_archive_flags((2020, 3, 34)));
        assert!(!uses_new_archive_flags((2020, 3, 33)));
        assert!(uses_new_archive_flags((2023, 1, 0)));
    }
}
