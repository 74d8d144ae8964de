//! LZ4 and LZMA codec adapters
//!
//! The container stores LZ4 data as raw blocks and LZMA data in the
//! lzma-alone framing Unity uses: a 5-byte properties header, an 8-byte
//! little-endian uncompressed size, then the stream. `liblzma` streams with
//! an unknown-size marker, so the compressor patches the real size in after
//! encoding; the decompressor ignores the stored field and trusts the size
//! the listing declares instead.

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use tracing::trace;
use xz2::stream::{LzmaOptions, MatchFinder, Mode, Stream};

use crate::{Error, Result};

/// Length of the lzma-alone header: 5 properties bytes + 8 size bytes.
const LZMA_HEADER_LEN: u64 = 13;

/// Encoder effort for [`lz4_compress_block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lz4Level {
    /// Fast encoder, default acceleration.
    Fast,
    /// High-compression encoder, the level bundles are packed with.
    Hc,
    /// High-compression encoder at its maximum level.
    HcMax,
}

/// Decompress one raw LZ4 block into a fresh buffer of `expected_size` bytes.
pub fn lz4_decompress_block(input: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    let size = i32::try_from(expected_size)
        .map_err(|_| Error::Codec(format!("LZ4 block too large: {expected_size} bytes")))?;
    let out = lz4::block::decompress(input, Some(size))
        .map_err(|e| Error::Codec(format!("LZ4 decompress failed: {e}")))?;
    if out.len() != expected_size {
        return Err(Error::Codec(format!(
            "LZ4 block decoded to {} bytes, expected {expected_size}",
            out.len()
        )));
    }
    Ok(out)
}

/// Compress a buffer into one raw LZ4 block.
pub fn lz4_compress_block(input: &[u8], level: Lz4Level) -> Result<Vec<u8>> {
    let mode = match level {
        Lz4Level::Fast => lz4::block::CompressionMode::DEFAULT,
        Lz4Level::Hc => lz4::block::CompressionMode::HIGHCOMPRESSION(9),
        Lz4Level::HcMax => lz4::block::CompressionMode::HIGHCOMPRESSION(12),
    };
    lz4::block::compress(input, Some(mode), false)
        .map_err(|e| Error::Codec(format!("LZ4 compress failed: {e}")))
}

/// LZMA1 encoder options matching the settings Unity bundles are written
/// with (8 MiB dictionary, lc=3, lp=0, pb=2).
fn lzma_options() -> Result<LzmaOptions> {
    let mut options = LzmaOptions::new_preset(6)
        .map_err(|e| Error::Codec(format!("LZMA encoder options: {e}")))?;
    options
        .dict_size(0x0080_0000)
        .literal_context_bits(3)
        .literal_position_bits(0)
        .position_bits(2)
        .mode(Mode::Normal)
        .match_finder(MatchFinder::BinaryTree4)
        .nice_len(123);
    Ok(options)
}

/// Compress `input` to the bundle's LZMA framing and write it to `output`.
///
/// The output position must be seekable: the 8-byte size field is patched
/// once the real input length is known. Returns the number of compressed
/// bytes emitted, header included.
pub fn lzma_compress_stream<R: Read, W: Write + Seek>(
    input: &mut R,
    output: &mut W,
) -> Result<u64> {
    let start = output.stream_position()?;

    let stream = Stream::new_lzma_encoder(&lzma_options()?)
        .map_err(|e| Error::Codec(format!("LZMA encoder: {e}")))?;
    let mut encoder = xz2::write::XzEncoder::new_stream(&mut *output, stream);
    let uncompressed = io::copy(input, &mut encoder)?;
    encoder
        .finish()
        .map_err(|e| Error::Codec(format!("LZMA encoder: {e}")))?;

    let end = output.stream_position()?;
    if end - start < LZMA_HEADER_LEN {
        return Err(Error::Codec("LZMA encoder produced no header".into()));
    }

    // The encoder streamed with an unknown-size marker; patch the real size.
    output.seek(SeekFrom::Start(start + 5))?;
    output.write_all(&uncompressed.to_le_bytes())?;
    output.seek(SeekFrom::Start(end))?;

    trace!("LZMA: {uncompressed} bytes -> {} bytes", end - start);
    Ok(end - start)
}

/// Decompress a bundle LZMA stream.
///
/// `input` must be positioned at the properties header. Decodes until
/// `decompressed_size` bytes have been produced, consuming at most
/// `compressed_size` input bytes when given (header included).
pub fn lzma_decompress_stream<R: Read, W: Write + ?Sized>(
    input: &mut R,
    output: &mut W,
    decompressed_size: u64,
    compressed_size: Option<u64>,
) -> Result<()> {
    let mut props = [0u8; 5];
    input.read_exact(&mut props)?;
    // The stored size field is not trusted; the listing's size wins.
    let mut stored = [0u8; 8];
    input.read_exact(&mut stored)?;

    let mut header = Vec::with_capacity(LZMA_HEADER_LEN as usize);
    header.extend_from_slice(&props);
    header.extend_from_slice(&decompressed_size.to_le_bytes());

    let body_limit = compressed_size
        .map(|c| c.saturating_sub(LZMA_HEADER_LEN))
        .unwrap_or(u64::MAX);
    let reader = Cursor::new(header).chain(input.by_ref().take(body_limit));

    let stream = Stream::new_lzma_decoder(u64::MAX)
        .map_err(|e| Error::Codec(format!("LZMA decoder: {e}")))?;
    let mut decoder = xz2::read::XzDecoder::new_stream(reader, stream);

    let produced = io::copy(&mut decoder, output)?;
    if produced != decompressed_size {
        return Err(Error::Codec(format!(
            "LZMA stream decoded to {produced} bytes, expected {decompressed_size}"
        )));
    }
    Ok(())
}

/// In-memory convenience over [`lzma_compress_stream`].
pub fn lzma_compress_bytes(input: &[u8]) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    lzma_compress_stream(&mut Cursor::new(input), &mut out)?;
    Ok(out.into_inner())
}

/// In-memory convenience over [`lzma_decompress_stream`].
pub fn lzma_decompress_bytes(input: &[u8], decompressed_size: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(decompressed_size);
    lzma_decompress_stream(
        &mut Cursor::new(input),
        &mut out,
        decompressed_size as u64,
        Some(input.len() as u64),
    )?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        // Compressible but not trivial.
        (0u32..2000).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn lz4_block_roundtrip() {
        let data = sample();
        for level in [Lz4Level::Fast, Lz4Level::Hc, Lz4Level::HcMax] {
            let packed = lz4_compress_block(&data, level).unwrap();
            let unpacked = lz4_decompress_block(&packed, data.len()).unwrap();
            assert_eq!(unpacked, data);
        }
    }

    #[test]
    fn lz4_wrong_expected_size_is_rejected() {
        let packed = lz4_compress_block(b"hello hello hello", Lz4Level::Fast).unwrap();
        assert!(lz4_decompress_block(&packed, 4).is_err());
    }

    #[test]
    fn lzma_roundtrip_carries_real_size() {
        let data = sample();
        let packed = lzma_compress_bytes(&data).unwrap();

        // 5 props bytes, then the patched little-endian uncompressed size.
        assert_eq!(
            u64::from_le_bytes(packed[5..13].try_into().unwrap()),
            data.len() as u64
        );

        let unpacked = lzma_decompress_bytes(&packed, data.len()).unwrap();
        assert_eq!(unpacked, data);
    }

    #[test]
    fn lzma_short_stream_is_rejected() {
        let payload = b"some bytes worth packing";
        let packed = lzma_compress_bytes(payload).unwrap();
        // Declaring more bytes than the stream holds must not succeed.
        assert!(lzma_decompress_bytes(&packed, payload.len() + 64).is_err());
    }
}
