//! Class database header

use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::{Error, Result, CLASS_DB_MAGIC};

/// Current (and only) supported file format version.
pub const FILE_VERSION: u8 = 1;

/// Compression applied to the class database payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClassDatabaseCompressionType {
    /// Payload stored as-is.
    #[default]
    Uncompressed = 0,
    /// Raw LZ4 block.
    Lz4 = 1,
    /// LZMA stream in the bundle framing.
    Lzma = 2,
}

impl ClassDatabaseCompressionType {
    /// Parse the stored compression byte.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Uncompressed),
            1 => Ok(Self::Lz4),
            2 => Ok(Self::Lzma),
            other => Err(Error::UnsupportedCompression(other)),
        }
    }
}

/// Fixed-layout header preceding the (possibly compressed) payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassDatabaseHeader {
    /// File format version.
    pub file_version: u8,
    /// Payload compression.
    pub compression_type: ClassDatabaseCompressionType,
    /// Stored payload size in bytes.
    pub compressed_size: u32,
    /// Payload size once decompressed.
    pub decompressed_size: u32,
}

impl ClassDatabaseHeader {
    /// Parse a header from the current stream position.
    pub fn parse<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != CLASS_DB_MAGIC {
            return Err(Error::InvalidMagic(magic));
        }

        let file_version = reader.read_u8()?;
        if file_version != FILE_VERSION {
            return Err(Error::UnsupportedFileVersion(file_version));
        }

        Ok(Self {
            file_version,
            compression_type: ClassDatabaseCompressionType::from_u8(reader.read_u8()?)?,
            compressed_size: reader.read_u32::<BigEndian>()?,
            decompressed_size: reader.read_u32::<BigEndian>()?,
        })
    }

    /// Emit the header.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&CLASS_DB_MAGIC)?;
        writer.write_u8(self.file_version)?;
        writer.write_u8(self.compression_type as u8)?;
        writer.write_u32::<BigEndian>(self.compressed_size)?;
        writer.write_u32::<BigEndian>(self.decompressed_size)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn roundtrip() {
        let header = ClassDatabaseHeader {
            file_version: FILE_VERSION,
            compression_type: ClassDatabaseCompressionType::Lz4,
            compressed_size: 123,
            decompressed_size: 456,
        };
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        assert_eq!(
            ClassDatabaseHeader::parse(&mut Cursor::new(buf)).unwrap(),
            header
        );
    }

    #[test]
    fn rejects_foreign_files() {
        let err = ClassDatabaseHeader::parse(&mut Cursor::new(b"UnityFS\0".to_vec())).unwrap_err();
        assert!(matches!(err, Error::InvalidMagic(_)), "actual: {err:?}");

        let mut bad_version = Vec::new();
        bad_version.extend_from_slice(&CLASS_DB_MAGIC);
        bad_version.extend_from_slice(&[9, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        let err = ClassDatabaseHeader::parse(&mut Cursor::new(bad_version)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFileVersion(9)), "actual: {err:?}");
    }

    #[test]
    fn rejects_unknown_compression() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&CLASS_DB_MAGIC);
        bytes.extend_from_slice(&[FILE_VERSION, 7, 0, 0, 0, 0, 0, 0, 0, 0]);
        let err = ClassDatabaseHeader::parse(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedCompression(7)), "actual: {err:?}");
    }
}
