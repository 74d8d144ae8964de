//! Random-access stream over a list of compressed blocks
//!
//! LZ4 bundles keep their data region as independently compressed blocks, so
//! a seekable view only needs the block containing the current position to be
//! decoded. [`BlockStream`] keeps prefix sums of the block sizes, decodes
//! blocks on demand and holds the most recently decoded ones in a small LRU
//! cache. Seeking never decodes; decoding the same block twice yields
//! identical bytes.

use std::io::{self, Read, Seek, SeekFrom};
use std::num::NonZeroUsize;

use lru::LruCache;
use tracing::trace;

use crate::compression::lz4_decompress_block;
use crate::info::BlockInfo;
use crate::ioutils::ReadExt;
use crate::{CompressionType, Error, Result};

/// Decoded blocks kept hot; two is the minimum for boundary-straddling
/// reads, four covers the common scan-plus-lookup access pattern.
const BLOCK_CACHE_SLOTS: usize = 4;

/// Seekable decompressed view over a block list.
#[derive(Debug)]
pub struct BlockStream<R: Read + Seek> {
    parent: R,
    /// Offset of the first block within the parent stream.
    data_offset: u64,
    blocks: Vec<BlockInfo>,
    /// Stored offset of each block relative to `data_offset`.
    compressed_starts: Vec<u64>,
    /// Logical offset of each block, with the total appended as a sentinel.
    decompressed_bounds: Vec<u64>,
    cache: LruCache<usize, Vec<u8>>,
    pos: u64,
}

impl<R: Read + Seek> BlockStream<R> {
    /// Build a stream over `blocks`, stored consecutively from
    /// `data_offset` in `parent`.
    pub fn new(parent: R, data_offset: u64, blocks: &[BlockInfo]) -> Self {
        let mut compressed_starts = Vec::with_capacity(blocks.len());
        let mut decompressed_bounds = Vec::with_capacity(blocks.len() + 1);
        let mut compressed = 0u64;
        let mut decompressed = 0u64;
        for block in blocks {
            compressed_starts.push(compressed);
            decompressed_bounds.push(decompressed);
            compressed += block.compressed_size as u64;
            decompressed += block.decompressed_size as u64;
        }
        decompressed_bounds.push(decompressed);

        let slots = NonZeroUsize::new(BLOCK_CACHE_SLOTS).unwrap_or(NonZeroUsize::MIN);
        Self {
            parent,
            data_offset,
            blocks: blocks.to_vec(),
            compressed_starts,
            decompressed_bounds,
            cache: LruCache::new(slots),
            pos: 0,
        }
    }

    /// Total decompressed size of the data region.
    pub fn len(&self) -> u64 {
        *self.decompressed_bounds.last().unwrap_or(&0)
    }

    /// `true` if the region holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release the parent stream.
    pub fn into_inner(self) -> R {
        self.parent
    }

    /// Index of the block containing logical offset `pos`.
    fn block_index(&self, pos: u64) -> usize {
        // First bound greater than pos, minus one; zero-sized blocks are
        // skipped over by the strict comparison.
        self.decompressed_bounds.partition_point(|&start| start <= pos) - 1
    }

    /// Decode block `index` into the cache if it is not already there.
    fn ensure_decoded(&mut self, index: usize) -> Result<()> {
        if self.cache.contains(&index) {
            return Ok(());
        }

        let block = self.blocks[index];
        let block_type = block.compression_type()?;
        trace!("decoding block {index} ({block_type:?})");

        self.parent.seek(SeekFrom::Start(
            self.data_offset + self.compressed_starts[index],
        ))?;
        let stored = self.parent.read_bytes(block.compressed_size as usize)?;

        let decoded = match block_type {
            CompressionType::None => {
                if block.compressed_size != block.decompressed_size {
                    return Err(Error::MalformedInput(format!(
                        "stored block {index} declares {} compressed but {} decompressed bytes",
                        block.compressed_size, block.decompressed_size
                    )));
                }
                stored
            }
            CompressionType::Lz4 | CompressionType::Lz4Hc => {
                lz4_decompress_block(&stored, block.decompressed_size as usize)?
            }
            // A non-LZ4 block inside an LZ4-classified bundle.
            CompressionType::Lzma => {
                return Err(Error::UnsupportedCompression(block.flags as u8 & 0x3F))
            }
        };

        self.cache.put(index, decoded);
        Ok(())
    }
}

impl<R: Read + Seek> Read for BlockStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let total = self.len();
        let mut written = 0;

        while written < buf.len() && self.pos < total {
            let index = self.block_index(self.pos);
            self.ensure_decoded(index)?;

            let block_start = self.decompressed_bounds[index];
            let offset = (self.pos - block_start) as usize;
            let Some(decoded) = self.cache.get(&index) else {
                break;
            };

            let available = decoded.len() - offset;
            let take = available.min(buf.len() - written);
            buf[written..written + take].copy_from_slice(&decoded[offset..offset + take]);
            written += take;
            self.pos += take as u64;
        }

        Ok(written)
    }
}

impl<R: Read + Seek> Seek for BlockStream<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(offset) => self.len().checked_add_signed(offset),
            SeekFrom::Current(offset) => self.pos.checked_add_signed(offset),
        };

        match target {
            Some(target) => {
                self.pos = target;
                Ok(target)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of data region",
            )),
        }
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.pos)
    }
}
