//! Class database file framing

use std::io::{Cursor, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use tracing::debug;

use unityfs::compression::{
    lz4_compress_block, lz4_decompress_block, lzma_compress_bytes, lzma_decompress_bytes, Lz4Level,
};
use unityfs::ioutils::ReadExt;

use crate::header::{ClassDatabaseCompressionType, ClassDatabaseHeader, FILE_VERSION};
use crate::types::{ClassDatabaseStringTable, ClassDatabaseType};
use crate::{Result, LEGACY_SCRIPT_CLASS_ID};

/// Pre-allocation guard for count fields read from untrusted input.
const MAX_PREALLOC_ENTRIES: u32 = 0x10000;

/// A parsed class database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassDatabaseFile {
    /// Header of the file this was read from, or of the last write.
    pub header: ClassDatabaseHeader,
    /// Known asset classes.
    pub classes: Vec<ClassDatabaseType>,
    /// Strings the classes index into.
    pub string_table: ClassDatabaseStringTable,
    /// String-table indices treated as well-known strings.
    pub common_string_indices: Vec<u16>,
}

impl ClassDatabaseFile {
    /// Parse a class database from `reader`.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let header = ClassDatabaseHeader::parse(reader)?;
        let stored = reader.read_bytes(header.compressed_size as usize)?;

        let payload = match header.compression_type {
            ClassDatabaseCompressionType::Uncompressed => stored,
            ClassDatabaseCompressionType::Lz4 => {
                lz4_decompress_block(&stored, header.decompressed_size as usize)?
            }
            ClassDatabaseCompressionType::Lzma => {
                lzma_decompress_bytes(&stored, header.decompressed_size as usize)?
            }
        };

        let mut payload = Cursor::new(payload);
        let class_count = payload.read_u32::<BigEndian>()?;
        let mut classes = Vec::with_capacity(class_count.min(MAX_PREALLOC_ENTRIES) as usize);
        for _ in 0..class_count {
            classes.push(ClassDatabaseType::parse(&mut payload)?);
        }

        let string_table = ClassDatabaseStringTable::parse(&mut payload)?;

        let common_count = payload.read_u32::<BigEndian>()?;
        let mut common_string_indices =
            Vec::with_capacity(common_count.min(MAX_PREALLOC_ENTRIES) as usize);
        for _ in 0..common_count {
            common_string_indices.push(payload.read_u16::<BigEndian>()?);
        }

        debug!(
            "parsed class database: {} classes, {} strings",
            classes.len(),
            string_table.len()
        );

        Ok(Self {
            header,
            classes,
            string_table,
            common_string_indices,
        })
    }

    /// Serialize the database to `writer`, compressing the payload with
    /// `compression_type`. The stored header reflects the written sizes.
    pub fn write<W: Write>(
        &mut self,
        writer: &mut W,
        compression_type: ClassDatabaseCompressionType,
    ) -> Result<()> {
        let mut payload = Vec::new();
        payload.write_u32::<BigEndian>(self.classes.len() as u32)?;
        for class in &self.classes {
            class.write(&mut payload)?;
        }
        self.string_table.write(&mut payload)?;
        payload.write_u32::<BigEndian>(self.common_string_indices.len() as u32)?;
        for &index in &self.common_string_indices {
            payload.write_u16::<BigEndian>(index)?;
        }

        let stored = match compression_type {
            ClassDatabaseCompressionType::Uncompressed => payload.clone(),
            ClassDatabaseCompressionType::Lz4 => lz4_compress_block(&payload, Lz4Level::Hc)?,
            ClassDatabaseCompressionType::Lzma => lzma_compress_bytes(&payload)?,
        };

        self.header = ClassDatabaseHeader {
            file_version: FILE_VERSION,
            compression_type,
            compressed_size: stored.len() as u32,
            decompressed_size: payload.len() as u32,
        };
        self.header.write(writer)?;
        writer.write_all(&stored)?;
        Ok(())
    }

    /// Find a class by id; negative ids are looked up as the pre-5.5
    /// script class id `0x72`.
    pub fn find_asset_class_by_id(&self, class_id: i32) -> Option<&ClassDatabaseType> {
        let class_id = if class_id < 0 {
            LEGACY_SCRIPT_CLASS_ID
        } else {
            class_id
        };
        self.classes.iter().find(|c| c.class_id == class_id)
    }

    /// Find a class by its name in the string table.
    pub fn find_asset_class_by_name(&self, name: &str) -> Option<&ClassDatabaseType> {
        self.classes
            .iter()
            .find(|c| self.string_table.get(c.name) == Some(name))
    }

    /// Look up a string-table entry.
    pub fn get_string(&self, index: u16) -> Option<&str> {
        self.string_table.get(index)
    }
}
