//! Serialization round-trips across every payload compression

use std::io::Cursor;

use unity_classdb::{
    ClassDatabaseCompressionType, ClassDatabaseFile, ClassDatabaseStringTable, ClassDatabaseType,
    ClassDatabaseTypeField,
};

fn database() -> ClassDatabaseFile {
    let mut string_table = ClassDatabaseStringTable::default();
    let name_a = string_table.intern("A").unwrap();
    let name_b = string_table.intern("B").unwrap();
    let field_name = string_table.intern("m_Data").unwrap();

    ClassDatabaseFile {
        classes: vec![
            ClassDatabaseType {
                class_id: 1,
                name: name_a,
                fields: vec![ClassDatabaseTypeField {
                    type_name: name_b,
                    field_name,
                    depth: 1,
                    is_array: false,
                    byte_size: 8,
                    version: 1,
                    flags: 0,
                }],
            },
            ClassDatabaseType {
                class_id: 0x72,
                name: name_b,
                fields: Vec::new(),
            },
        ],
        string_table,
        common_string_indices: vec![0],
        ..Default::default()
    }
}

#[test]
fn roundtrip_every_compression_type() {
    for compression in [
        ClassDatabaseCompressionType::Uncompressed,
        ClassDatabaseCompressionType::Lz4,
        ClassDatabaseCompressionType::Lzma,
    ] {
        let mut original = database();
        let mut buf = Vec::new();
        original.write(&mut buf, compression).unwrap();

        let parsed = ClassDatabaseFile::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(parsed.header.compression_type, compression);
        assert_eq!(parsed.classes, original.classes);
        assert_eq!(parsed.string_table, original.string_table);
        assert_eq!(
            parsed.common_string_indices,
            original.common_string_indices
        );
    }
}

#[test]
fn header_sizes_match_payload() {
    let mut original = database();
    let mut buf = Vec::new();
    original
        .write(&mut buf, ClassDatabaseCompressionType::Uncompressed)
        .unwrap();

    // Uncompressed payloads store identical size fields.
    assert_eq!(
        original.header.compressed_size,
        original.header.decompressed_size
    );
    assert_eq!(
        buf.len(),
        14 + original.header.compressed_size as usize
    );
}

#[test]
fn truncated_payload_is_rejected() {
    let mut original = database();
    let mut buf = Vec::new();
    original
        .write(&mut buf, ClassDatabaseCompressionType::Lz4)
        .unwrap();
    buf.truncate(buf.len() - 3);

    assert!(ClassDatabaseFile::read(&mut Cursor::new(buf)).is_err());
}
