//! Two-pass uncompressed rewrite of a bundle
//!
//! `write` re-emits the bundle with every pending replacer applied and all
//! offsets, block sizes and header fields recomputed. The listing is written
//! once with placeholders, the payload is streamed (so replaced files are
//! never buffered whole), then the listing and header are fixed up in place.

use std::io::{Seek, SeekFrom, Write};

use tracing::debug;

use crate::bundle::Bundle;
use crate::info::{BlockAndDirInfo, BlockInfo, DirectoryInfo, Replacer};
use crate::ioutils::{align16_write, copy_exact};
use crate::{
    Error, Result, BLOCK_AND_DIR_AT_END, BLOCK_INFO_PADDING_AT_START, COMPRESSION_MASK,
};

/// Flag carried by the freshly laid out storage blocks.
const BLOCK_FLAG_STREAMED: u16 = 0x40;

/// Hard cap on a single block's size fields.
const BLOCK_SIZE_LIMIT: u64 = u32::MAX as u64;

impl<R: std::io::Read + Seek> Bundle<R> {
    /// Rewrite the bundle to `out` as an uncompressed UnityFS file,
    /// applying pending [`Replacer`] edits.
    ///
    /// The output starts at `out`'s current position zero; on error the
    /// output stream is left in an undefined state and must be discarded.
    ///
    /// Fails with [`Error::MustDecompressFirst`] while the data region is
    /// still LZMA-compressed.
    pub fn write<W: Write + Seek>(&mut self, out: &mut W) -> Result<()> {
        self.check_open()?;
        if self.data_is_compressed() {
            return Err(Error::MustDecompressFirst);
        }

        let (header, info, data) = self.parts_mut();

        // Block layout is sized up front from the surviving entries so the
        // listing can be reserved before the payload is streamed.
        let total_data: u64 = info
            .directory_infos
            .iter()
            .filter(|d| !d.is_removed())
            .map(|d| match &d.replacer {
                Some(Replacer::AddOrModify(content)) => content.size(),
                _ => d.decompressed_size as u64,
            })
            .sum();
        let block_count = block_count_for(total_data);

        let mut new_header = header.clone();
        new_header.fs_header.flags &= !(COMPRESSION_MASK | BLOCK_AND_DIR_AT_END);
        new_header.write(out)?;

        let mut new_info = BlockAndDirInfo {
            hash: info.hash,
            block_infos: vec![
                BlockInfo {
                    decompressed_size: 0,
                    compressed_size: 0,
                    flags: BLOCK_FLAG_STREAMED,
                };
                block_count as usize
            ],
            directory_infos: info
                .directory_infos
                .iter()
                .filter(|d| !d.is_removed())
                .map(DirectoryInfo::clone_meta)
                .collect(),
        };

        // Placeholder listing; all fields are fixed-width except the names,
        // which do not change, so the fix-up rewrite lands on the same span.
        let listing_pos = out.stream_position()?;
        new_info.write(out)?;

        if new_header.fs_header.flags & BLOCK_INFO_PADDING_AT_START != 0 {
            align16_write(out)?;
        }
        let asset_data_pos = out.stream_position()?;

        // Stream the payload, recording each entry's final placement.
        let survivors = info.directory_infos.iter().filter(|d| !d.is_removed());
        for (source, target) in survivors.zip(new_info.directory_infos.iter_mut()) {
            let start = out.stream_position()?;
            match &source.replacer {
                Some(Replacer::AddOrModify(content)) => {
                    content.write_to(out)?;
                }
                _ => {
                    data.seek(SeekFrom::Start(source.offset as u64))?;
                    copy_exact(data, out, source.decompressed_size as u64)?;
                }
            }
            let end = out.stream_position()?;
            target.offset = (start - asset_data_pos) as i64;
            target.decompressed_size = (end - start) as i64;
        }

        let end_pos = out.stream_position()?;
        let asset_size = end_pos - asset_data_pos;
        debug!(
            "rewrote bundle payload: {} entries, {asset_size} bytes",
            new_info.directory_infos.len()
        );

        distribute_blocks(&mut new_info.block_infos, asset_size);

        out.seek(SeekFrom::Start(listing_pos))?;
        new_info.write(out)?;

        let listing_size = (asset_data_pos - listing_pos) as u32;
        new_header.fs_header.total_file_size = end_pos as i64;
        new_header.fs_header.compressed_size = listing_size;
        new_header.fs_header.decompressed_size = listing_size;
        out.seek(SeekFrom::Start(0))?;
        new_header.write(out)?;
        out.seek(SeekFrom::Start(end_pos))?;

        Ok(())
    }
}

/// Number of storage blocks a payload of `total` bytes needs.
fn block_count_for(total: u64) -> u64 {
    total.div_ceil(BLOCK_SIZE_LIMIT).max(1)
}

/// Greedy block split; trailing zero-sized blocks are tolerated.
fn distribute_blocks(blocks: &mut [BlockInfo], mut remaining: u64) {
    for block in blocks {
        let take = remaining.min(BLOCK_SIZE_LIMIT) as u32;
        block.decompressed_size = take;
        block.compressed_size = take;
        remaining -= take as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks(count: u64) -> Vec<BlockInfo> {
        vec![
            BlockInfo {
                decompressed_size: 0,
                compressed_size: 0,
                flags: BLOCK_FLAG_STREAMED,
            };
            count as usize
        ]
    }

    #[test]
    fn block_layout_at_the_u32_boundary() {
        // Exactly one full block.
        assert_eq!(block_count_for(u32::MAX as u64), 1);
        let mut exact = blocks(1);
        distribute_blocks(&mut exact, u32::MAX as u64);
        assert_eq!(exact[0].decompressed_size, u32::MAX);
        assert_eq!(exact[0].compressed_size, u32::MAX);

        // One extra byte spills into a second block of size 1.
        let total = u32::MAX as u64 + 1;
        assert_eq!(block_count_for(total), 2);
        let mut spilled = blocks(2);
        distribute_blocks(&mut spilled, total);
        assert_eq!(spilled[0].decompressed_size, u32::MAX);
        assert_eq!(spilled[1].decompressed_size, 1);
    }

    #[test]
    fn empty_payload_keeps_one_zero_block() {
        assert_eq!(block_count_for(0), 1);
        let mut layout = blocks(1);
        distribute_blocks(&mut layout, 0);
        assert_eq!(layout[0].decompressed_size, 0);
        assert_eq!(layout[0].flags, BLOCK_FLAG_STREAMED);
    }
}
