//! Full decompression and repacking pipelines
//!
//! `unpack` streams every block out decompressed, producing a bundle whose
//! data region needs no decoding. `pack` is the inverse direction: one data
//! block, stored raw or LZMA-compressed, with the listing always LZ4HC so
//! that every later open only pays the cheap decoder.

use std::io::{Read, Seek, SeekFrom, Write};

use tracing::debug;

use crate::bundle::{Bundle, DataReader};
use crate::compression::{
    lz4_compress_block, lzma_compress_stream, lzma_decompress_stream, Lz4Level,
};
use crate::info::{BlockAndDirInfo, BlockInfo, DirectoryInfo};
use crate::ioutils::{align16_write, copy_exact};
use crate::{
    CompressionType, Error, Result, BLOCK_AND_DIR_AT_END, BLOCK_INFO_PADDING_AT_START,
    COMPRESSION_MASK, HAS_DIRECTORY_INFO,
};

/// Advisory progress notification for [`Bundle::pack`]: `(blocks_done,
/// blocks_total)`. Reporting only; returning never aborts the operation.
pub type ProgressFn<'a> = &'a mut dyn FnMut(u64, u64);

impl<R: Read + Seek> Bundle<R> {
    /// Write a fully decompressed copy of the bundle to `out`.
    ///
    /// Every block keeps its decompressed size but loses its compression
    /// bits; the directory is carried over unchanged. Works on any
    /// supported bundle, compressed or not.
    pub fn unpack<W: Write + Seek>(&mut self, out: &mut W) -> Result<()> {
        self.check_open()?;
        let data_is_compressed = self.data_is_compressed();
        let (header, info, data) = self.parts_mut();

        let mut new_header = header.clone();
        new_header.fs_header.flags &=
            HAS_DIRECTORY_INFO | BLOCK_INFO_PADDING_AT_START;

        let new_info = BlockAndDirInfo {
            hash: info.hash,
            block_infos: info
                .block_infos
                .iter()
                .map(|b| BlockInfo {
                    decompressed_size: b.decompressed_size,
                    compressed_size: b.decompressed_size,
                    flags: b.flags & !(COMPRESSION_MASK as u16),
                })
                .collect(),
            directory_infos: info
                .directory_infos
                .iter()
                .map(DirectoryInfo::clone_meta)
                .collect(),
        };

        let mut listing = Vec::new();
        new_info.write(&mut listing)?;
        new_header.fs_header.compressed_size = listing.len() as u32;
        new_header.fs_header.decompressed_size = listing.len() as u32;
        new_header.fs_header.total_file_size = (new_header.file_data_offset()
            + new_info.total_block_decompressed_size())
            as i64;

        new_header.write(out)?;
        out.write_all(&listing)?;
        if new_header.fs_header.flags & BLOCK_INFO_PADDING_AT_START != 0 {
            align16_write(out)?;
        }

        if data_is_compressed {
            // LZMA region: the reader exposes the stored bytes, blocks are
            // laid out back to back. LZ4 block types cannot appear here;
            // those bundles were installed behind a decoding reader.
            data.seek(SeekFrom::Start(0))?;
            for block in &info.block_infos {
                match block.compression_type()? {
                    CompressionType::None => {
                        copy_exact(data, out, block.compressed_size as u64)?;
                    }
                    CompressionType::Lzma => {
                        lzma_decompress_stream(
                            data,
                            out,
                            block.decompressed_size as u64,
                            Some(block.compressed_size as u64),
                        )?;
                    }
                    CompressionType::Lz4 | CompressionType::Lz4Hc => {
                        return Err(Error::UnsupportedCompression(block.flags as u8 & 0x3F));
                    }
                }
            }
        } else {
            // Already-decoded region: the reader is the logical stream.
            data.seek(SeekFrom::Start(0))?;
            copy_exact(data, out, new_info.total_block_decompressed_size())?;
        }

        debug!(
            "unpacked bundle: {} bytes total",
            new_header.fs_header.total_file_size
        );
        Ok(())
    }

    /// Write a repacked copy of the bundle to `out`.
    ///
    /// The data region becomes a single block, stored raw
    /// (`CompressionType::None`) or LZMA-compressed; other types are
    /// rejected. The listing is always LZ4HC-compressed. With
    /// `block_dir_at_end` the data precedes the listing in the file;
    /// otherwise the data is staged through a delete-on-close temp file so
    /// the listing can be sized first.
    ///
    /// `progress` is advisory and invoked once per completed block.
    pub fn pack<W: Write + Seek>(
        &mut self,
        out: &mut W,
        compression: CompressionType,
        block_dir_at_end: bool,
        mut progress: Option<ProgressFn<'_>>,
    ) -> Result<()> {
        self.check_open()?;
        if self.data_is_compressed() {
            return Err(Error::MustDecompressFirst);
        }
        if compression.is_lz4() {
            return Err(Error::UnsupportedCompression(compression.as_flag() as u8));
        }

        let (header, info, data) = self.parts_mut();

        let total_data = info.total_block_decompressed_size();
        if total_data > u32::MAX as u64 {
            return Err(Error::DataTooLarge(total_data));
        }

        let mut new_header = header.clone();
        new_header.fs_header.flags = CompressionType::Lz4Hc.as_flag()
            | HAS_DIRECTORY_INFO
            | if block_dir_at_end { BLOCK_AND_DIR_AT_END } else { 0 };

        let directory_infos: Vec<DirectoryInfo> = info
            .directory_infos
            .iter()
            .map(DirectoryInfo::clone_meta)
            .collect();

        data.seek(SeekFrom::Start(0))?;

        if block_dir_at_end {
            // Data directly after the header, listing appended; the header
            // is fixed up once both sizes are known.
            let header_pos = out.stream_position()?;
            new_header.write(out)?;

            let block = write_data_block(data, out, total_data, compression)?;
            if let Some(progress) = progress.as_mut() {
                progress(1, 1);
            }

            let listing = compress_listing(info, block, directory_infos)?;
            out.write_all(&listing.stored)?;

            let end_pos = out.stream_position()?;
            new_header.fs_header.total_file_size = end_pos as i64;
            new_header.fs_header.compressed_size = listing.stored.len() as u32;
            new_header.fs_header.decompressed_size = listing.plain_len;
            out.seek(SeekFrom::Start(header_pos))?;
            new_header.write(out)?;
            out.seek(SeekFrom::Start(end_pos))?;
        } else {
            // Listing precedes the data, so the data block is staged in a
            // temp file to learn its compressed size first.
            let mut staged = tempfile::tempfile()?;
            let block = write_data_block(data, &mut staged, total_data, compression)?;
            if let Some(progress) = progress.as_mut() {
                progress(1, 1);
            }
            let staged_len = staged.stream_position()?;

            let listing = compress_listing(info, block, directory_infos)?;
            new_header.fs_header.compressed_size = listing.stored.len() as u32;
            new_header.fs_header.decompressed_size = listing.plain_len;
            new_header.fs_header.total_file_size =
                (new_header.header_size() + listing.stored.len() as u64 + staged_len) as i64;

            new_header.write(out)?;
            out.write_all(&listing.stored)?;
            staged.seek(SeekFrom::Start(0))?;
            copy_exact(&mut staged, out, staged_len)?;
        }

        debug!("packed bundle: {compression:?} data, listing at end: {block_dir_at_end}");
        Ok(())
    }
}

struct PackedListing {
    stored: Vec<u8>,
    plain_len: u32,
}

fn compress_listing(
    info: &BlockAndDirInfo,
    block: BlockInfo,
    directory_infos: Vec<DirectoryInfo>,
) -> Result<PackedListing> {
    let new_info = BlockAndDirInfo {
        hash: info.hash,
        block_infos: vec![block],
        directory_infos,
    };
    let mut plain = Vec::new();
    new_info.write(&mut plain)?;
    let stored = lz4_compress_block(&plain, Lz4Level::Hc)?;
    Ok(PackedListing {
        stored,
        plain_len: plain.len() as u32,
    })
}

/// Emit the single data block and return its descriptor.
fn write_data_block<R: Read + Seek, W: Write + Seek>(
    data: &mut DataReader<R>,
    out: &mut W,
    total_data: u64,
    compression: CompressionType,
) -> Result<BlockInfo> {
    match compression {
        CompressionType::None => {
            copy_exact(data, out, total_data)?;
            Ok(BlockInfo {
                decompressed_size: total_data as u32,
                compressed_size: total_data as u32,
                flags: 0x00,
            })
        }
        CompressionType::Lzma => {
            let mut bounded = data.by_ref().take(total_data);
            let compressed = lzma_compress_stream(&mut bounded, out)?;
            if compressed > u32::MAX as u64 {
                return Err(Error::DataTooLarge(compressed));
            }
            Ok(BlockInfo {
                decompressed_size: total_data as u32,
                compressed_size: compressed as u32,
                flags: 0x41,
            })
        }
        CompressionType::Lz4 | CompressionType::Lz4Hc => {
            Err(Error::UnsupportedCompression(compression.as_flag() as u8))
        }
    }
}
