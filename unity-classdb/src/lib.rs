//! Unity class database container
//!
//! The class database is a compact, compressible catalogue of asset type
//! descriptions: a list of classes, an interned string table the classes
//! index into with `u16` handles, and the subset of indices treated as
//! well-known strings. Asset parsers consult it to interpret type metadata
//! pulled out of bundles.

pub mod error;
pub mod file;
pub mod header;
pub mod types;

pub use error::{Error, Result};
pub use file::ClassDatabaseFile;
pub use header::{ClassDatabaseCompressionType, ClassDatabaseHeader};
pub use types::{ClassDatabaseStringTable, ClassDatabaseType, ClassDatabaseTypeField};

/// File magic of a class database.
pub const CLASS_DB_MAGIC: [u8; 4] = *b"cldb";

/// Class id negative values are rewritten to before lookup; Unity versions
/// before 5.5 stored script types with negative ids.
pub const LEGACY_SCRIPT_CLASS_ID: i32 = 0x72;
