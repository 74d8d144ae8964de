//! Byte-level reader/writer primitives shared by the container formats
//!
//! All multi-byte fields in a bundle are big-endian; `byteorder` supplies the
//! integer accessors and this module adds the string, padding and bounded-copy
//! helpers the formats need on top.

use std::io::{self, Read, Seek, SeekFrom, Write};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Extra read operations on top of [`byteorder::ReadBytesExt`].
pub trait ReadExt: Read {
    /// Read a NUL-terminated UTF-8 string, consuming the terminator.
    fn read_cstring(&mut self) -> io::Result<String> {
        let mut bytes = Vec::new();
        let mut b = [0u8; 1];
        loop {
            self.read_exact(&mut b)?;
            if b[0] == 0 {
                break;
            }
            bytes.push(b[0]);
        }
        String::from_utf8(bytes)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "string is not valid UTF-8"))
    }

    /// Read exactly `n` bytes into a fresh buffer.
    fn read_bytes(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }
}

impl<R: Read + ?Sized> ReadExt for R {}

/// Extra write operations for the container formats.
pub trait WriteExt: Write {
    /// Write a string followed by its NUL terminator.
    fn write_cstring(&mut self, s: &str) -> io::Result<()> {
        self.write_all(s.as_bytes())?;
        self.write_all(&[0u8])
    }
}

impl<W: Write + ?Sized> WriteExt for W {}

/// Skip forward so the stream position is a multiple of 16.
///
/// Returns the new position.
pub fn align16_read<R: Read + Seek>(reader: &mut R) -> io::Result<u64> {
    let pos = reader.stream_position()?;
    let aligned = pos.next_multiple_of(16);
    if aligned != pos {
        reader.seek(SeekFrom::Start(aligned))?;
    }
    Ok(aligned)
}

/// Zero-pad so the stream position is a multiple of 16.
///
/// Returns the new position.
pub fn align16_write<W: Write + Seek>(writer: &mut W) -> io::Result<u64> {
    let pos = writer.stream_position()?;
    let aligned = pos.next_multiple_of(16);
    if aligned != pos {
        let padding = [0u8; 16];
        writer.write_all(&padding[..(aligned - pos) as usize])?;
    }
    Ok(aligned)
}

/// Copy exactly `n` bytes from `reader` to `writer` through a bounded buffer.
///
/// Fails with `UnexpectedEof` if the reader runs out early.
pub fn copy_exact<R: Read + ?Sized, W: Write + ?Sized>(
    reader: &mut R,
    writer: &mut W,
    mut n: u64,
) -> io::Result<()> {
    let mut buf = vec![0u8; COPY_BUFFER_SIZE.min(n.try_into().unwrap_or(COPY_BUFFER_SIZE))];
    while n > 0 {
        let take = (n as usize).min(buf.len());
        reader.read_exact(&mut buf[..take])?;
        writer.write_all(&buf[..take])?;
        n -= take as u64;
    }
    Ok(())
}
