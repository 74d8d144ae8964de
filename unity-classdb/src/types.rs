//! Class descriptions and the interned string table

use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use unityfs::ioutils::{ReadExt, WriteExt};

use crate::{Error, Result};

/// Pre-allocation guard for count fields read from untrusted input.
const MAX_PREALLOC_ENTRIES: u32 = 0x10000;

/// One field of a class's type tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassDatabaseTypeField {
    /// String-table index of the field's type name.
    pub type_name: u16,
    /// String-table index of the field's own name.
    pub field_name: u16,
    /// Nesting depth within the type tree.
    pub depth: u8,
    /// `true` for array fields.
    pub is_array: bool,
    /// Serialized size in bytes, -1 when variable.
    pub byte_size: i32,
    /// Type tree version the field first appeared in.
    pub version: u16,
    /// Metadata flags (alignment etc.), carried opaquely.
    pub flags: u32,
}

impl ClassDatabaseTypeField {
    pub(crate) fn parse<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(Self {
            type_name: reader.read_u16::<BigEndian>()?,
            field_name: reader.read_u16::<BigEndian>()?,
            depth: reader.read_u8()?,
            is_array: reader.read_u8()? != 0,
            byte_size: reader.read_i32::<BigEndian>()?,
            version: reader.read_u16::<BigEndian>()?,
            flags: reader.read_u32::<BigEndian>()?,
        })
    }

    pub(crate) fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u16::<BigEndian>(self.type_name)?;
        writer.write_u16::<BigEndian>(self.field_name)?;
        writer.write_u8(self.depth)?;
        writer.write_u8(self.is_array as u8)?;
        writer.write_i32::<BigEndian>(self.byte_size)?;
        writer.write_u16::<BigEndian>(self.version)?;
        writer.write_u32::<BigEndian>(self.flags)?;
        Ok(())
    }
}

/// One asset class description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassDatabaseType {
    /// Unity class id.
    pub class_id: i32,
    /// String-table index of the class name.
    pub name: u16,
    /// Type tree fields, pre-order.
    pub fields: Vec<ClassDatabaseTypeField>,
}

impl ClassDatabaseType {
    pub(crate) fn parse<R: Read>(reader: &mut R) -> Result<Self> {
        let class_id = reader.read_i32::<BigEndian>()?;
        let name = reader.read_u16::<BigEndian>()?;
        let field_count = reader.read_u32::<BigEndian>()?;
        let mut fields = Vec::with_capacity(field_count.min(MAX_PREALLOC_ENTRIES) as usize);
        for _ in 0..field_count {
            fields.push(ClassDatabaseTypeField::parse(reader)?);
        }
        Ok(Self {
            class_id,
            name,
            fields,
        })
    }

    pub(crate) fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_i32::<BigEndian>(self.class_id)?;
        writer.write_u16::<BigEndian>(self.name)?;
        writer.write_u32::<BigEndian>(self.fields.len() as u32)?;
        for field in &self.fields {
            field.write(writer)?;
        }
        Ok(())
    }
}

/// Interned strings addressed by `u16` handles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassDatabaseStringTable {
    strings: Vec<String>,
}

impl ClassDatabaseStringTable {
    /// Look up a string by its handle.
    pub fn get(&self, index: u16) -> Option<&str> {
        self.strings.get(index as usize).map(String::as_str)
    }

    /// Intern a string, returning its handle. Re-interning an existing
    /// string returns the existing handle.
    pub fn intern(&mut self, value: &str) -> Result<u16> {
        if let Some(index) = self.strings.iter().position(|s| s == value) {
            return Ok(index as u16);
        }
        if self.strings.len() > u16::MAX as usize {
            return Err(Error::StringTableFull);
        }
        self.strings.push(value.to_string());
        Ok((self.strings.len() - 1) as u16)
    }

    /// Number of interned strings.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// `true` when no strings are interned.
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub(crate) fn parse<R: Read>(reader: &mut R) -> Result<Self> {
        let count = reader.read_u32::<BigEndian>()?;
        let mut strings = Vec::with_capacity(count.min(MAX_PREALLOC_ENTRIES) as usize);
        for _ in 0..count {
            strings.push(reader.read_cstring()?);
        }
        Ok(Self { strings })
    }

    pub(crate) fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<BigEndian>(self.strings.len() as u32)?;
        for s in &self.strings {
            writer.write_cstring(s)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn string_table_interning() {
        let mut table = ClassDatabaseStringTable::default();
        let a = table.intern("GameObject").unwrap();
        let b = table.intern("m_Name").unwrap();
        assert_ne!(a, b);
        assert_eq!(table.intern("GameObject").unwrap(), a);
        assert_eq!(table.get(a), Some("GameObject"));
        assert_eq!(table.get(42), None);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn type_roundtrip() {
        let class = ClassDatabaseType {
            class_id: 1,
            name: 0,
            fields: vec![
                ClassDatabaseTypeField {
                    type_name: 1,
                    field_name: 2,
                    depth: 0,
                    is_array: false,
                    byte_size: -1,
                    version: 1,
                    flags: 0,
                },
                ClassDatabaseTypeField {
                    type_name: 3,
                    field_name: 4,
                    depth: 1,
                    is_array: true,
                    byte_size: 4,
                    version: 1,
                    flags: 0x4000,
                },
            ],
        };
        let mut buf = Vec::new();
        class.write(&mut buf).unwrap();
        assert_eq!(
            ClassDatabaseType::parse(&mut Cursor::new(buf)).unwrap(),
            class
        );
    }

    #[test]
    fn string_table_roundtrip() {
        let mut table = ClassDatabaseStringTable::default();
        table.intern("A").unwrap();
        table.intern("B").unwrap();
        let mut buf = Vec::new();
        table.write(&mut buf).unwrap();
        assert_eq!(
            ClassDatabaseStringTable::parse(&mut Cursor::new(buf)).unwrap(),
            table
        );
    }
}
