//! Bundle reading and the data-region access strategies
//!
//! [`Bundle::read`] parses the header and listing, classifies the data
//! region's compression and installs the matching reader: a plain window for
//! stored data, the same window (left compressed) for LZMA, or a
//! random-access block stream for LZ4. The heavyweight pipelines live in
//! sibling modules: rewriting in `write`, repacking in `pack`.

use std::io::{self, Cursor, Read, Seek, SeekFrom};

use tracing::debug;

use crate::compression::{lz4_decompress_block, lzma_decompress_bytes};
use crate::header::BundleHeader;
use crate::info::{BlockAndDirInfo, BlockInfo, DirectoryInfo, Replacer};
use crate::ioutils::ReadExt;
use crate::segment::SegmentStream;
use crate::stream::BlockStream;
use crate::{CompressionType, Error, Result};

/// The installed view over the data region.
#[derive(Debug)]
pub enum DataReader<R: Read + Seek> {
    /// Byte window over the stored data region.
    Segment(SegmentStream<R>),
    /// Random-access decoder over LZ4 blocks.
    Blocks(BlockStream<R>),
    /// The bundle has been closed; all access fails.
    Closed,
}

impl<R: Read + Seek> Read for DataReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Segment(segment) => segment.read(buf),
            Self::Blocks(blocks) => blocks.read(buf),
            Self::Closed => Err(io::Error::other("bundle stream is closed")),
        }
    }
}

impl<R: Read + Seek> Seek for DataReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Self::Segment(segment) => segment.seek(pos),
            Self::Blocks(blocks) => blocks.seek(pos),
            Self::Closed => Err(io::Error::other("bundle stream is closed")),
        }
    }
}

/// A parsed UnityFS bundle over a seekable stream.
///
/// The bundle owns the input stream for its lifetime; it is handed to the
/// data reader during [`Bundle::read`] and dropped by [`Bundle::close`].
/// A single instance is not meant for concurrent use: the data reader and
/// the block cache are mutable seek-state holders.
#[derive(Debug)]
pub struct Bundle<R: Read + Seek> {
    header: BundleHeader,
    info: BlockAndDirInfo,
    data: DataReader<R>,
    data_is_compressed: bool,
}

impl<R: Read + Seek> Bundle<R> {
    /// Parse the header and listing from `reader` and install the data
    /// reader. The data region itself is not decompressed up front; LZMA
    /// regions stay compressed until [`Bundle::unpack`].
    pub fn read(mut reader: R) -> Result<Self> {
        let header = BundleHeader::parse(&mut reader)?;
        header.check_not_encrypted()?;

        reader.seek(SeekFrom::Start(header.bundle_info_offset()))?;
        let compressed_size = header.fs_header.compressed_size as usize;
        let decompressed_size = header.fs_header.decompressed_size as usize;

        let info = match header.compression_type()? {
            CompressionType::None => BlockAndDirInfo::parse(&mut reader)?,
            CompressionType::Lz4 | CompressionType::Lz4Hc => {
                let stored = reader.read_bytes(compressed_size)?;
                let listing = lz4_decompress_block(&stored, decompressed_size)?;
                BlockAndDirInfo::parse(&mut Cursor::new(listing))?
            }
            CompressionType::Lzma => {
                let stored = reader.read_bytes(compressed_size)?;
                let listing = lzma_decompress_bytes(&stored, decompressed_size)?;
                BlockAndDirInfo::parse(&mut Cursor::new(listing))?
            }
        };

        let data_type = info.data_compression_type()?;
        let data_offset = header.file_data_offset();
        debug!(
            "parsed bundle listing: {} blocks, {} files, data compression {data_type:?}",
            info.block_infos.len(),
            info.directory_infos.len()
        );

        let (data, data_is_compressed) = match data_type {
            CompressionType::None | CompressionType::Lzma => {
                let file_len = reader.seek(SeekFrom::End(0))?;
                let segment =
                    SegmentStream::new(reader, data_offset, file_len.saturating_sub(data_offset));
                (
                    DataReader::Segment(segment),
                    data_type == CompressionType::Lzma,
                )
            }
            CompressionType::Lz4 | CompressionType::Lz4Hc => (
                DataReader::Blocks(BlockStream::new(reader, data_offset, &info.block_infos)),
                false,
            ),
        };

        Ok(Self {
            header,
            info,
            data,
            data_is_compressed,
        })
    }

    /// The parsed bundle header.
    pub fn header(&self) -> &BundleHeader {
        &self.header
    }

    /// The compression blocks of the data region.
    pub fn block_infos(&self) -> &[BlockInfo] {
        &self.info.block_infos
    }

    /// The embedded file directory.
    pub fn directory_infos(&self) -> &[DirectoryInfo] {
        &self.info.directory_infos
    }

    /// Number of embedded files.
    pub fn file_count(&self) -> usize {
        self.info.directory_infos.len()
    }

    /// Name of entry `index`, or `None` when out of range.
    pub fn file_name(&self, index: usize) -> Option<&str> {
        self.info
            .directory_infos
            .get(index)
            .map(|d| d.name.as_str())
    }

    /// `(offset, length)` of entry `index` within the logical decompressed
    /// data region, or `None` when out of range.
    pub fn file_range(&self, index: usize) -> Option<(u64, u64)> {
        self.info
            .directory_infos
            .get(index)
            .map(|d| (d.offset as u64, d.decompressed_size as u64))
    }

    /// Directory index of the entry named `name`.
    pub fn file_index(&self, name: &str) -> Option<usize> {
        self.info.directory_infos.iter().position(|d| d.name == name)
    }

    /// `true` while the data reader exposes compressed bytes (LZMA bundles
    /// before [`Bundle::unpack`]).
    pub fn data_is_compressed(&self) -> bool {
        self.data_is_compressed
    }

    /// The installed data reader.
    pub fn data_reader(&mut self) -> &mut DataReader<R> {
        &mut self.data
    }

    /// Read entry `index`'s bytes through the data reader.
    ///
    /// Returns `None` for an out-of-range index. Fails with
    /// [`Error::MustDecompressFirst`] while the region is compressed and
    /// [`Error::ClosedStream`] after [`Bundle::close`].
    pub fn read_file(&mut self, index: usize) -> Result<Option<Vec<u8>>> {
        self.check_open()?;
        if self.data_is_compressed {
            return Err(Error::MustDecompressFirst);
        }
        let Some((offset, length)) = self.file_range(index) else {
            return Ok(None);
        };

        self.data.seek(SeekFrom::Start(offset))?;
        let bytes = self.data.read_bytes(length as usize)?;
        Ok(Some(bytes))
    }

    /// Attach an edit to entry `index`, replacing any previous one.
    ///
    /// Returns the previous edit; `None` result when the index is out of
    /// range is indistinguishable from "no previous edit" on purpose: both
    /// are no-ops to the rewriter.
    pub fn set_replacer(&mut self, index: usize, replacer: Replacer) -> Option<Replacer> {
        let entry = self.info.directory_infos.get_mut(index)?;
        entry.replacer.replace(replacer)
    }

    /// Release the input stream. Every later data access fails with
    /// [`Error::ClosedStream`].
    pub fn close(&mut self) {
        self.data = DataReader::Closed;
    }

    pub(crate) fn check_open(&self) -> Result<()> {
        if matches!(self.data, DataReader::Closed) {
            return Err(Error::ClosedStream);
        }
        Ok(())
    }

    pub(crate) fn parts_mut(&mut self) -> (&BundleHeader, &BlockAndDirInfo, &mut DataReader<R>) {
        (&self.header, &self.info, &mut self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::Hash128;
    use crate::ioutils::WriteExt;
    use byteorder::{BigEndian, WriteBytesExt};

    /// Minimal version 7 bundle: one stored block, one entry, listing at
    /// the head, uncompressed.
    pub(crate) fn build_plain_bundle(payload: &[u8], name: &str) -> Vec<u8> {
        let info = BlockAndDirInfo {
            hash: Hash128::default(),
            block_infos: vec![BlockInfo {
                decompressed_size: payload.len() as u32,
                compressed_size: payload.len() as u32,
                flags: 0,
            }],
            directory_infos: vec![DirectoryInfo {
                offset: 0,
                decompressed_size: payload.len() as i64,
                flags: 4,
                name: name.to_string(),
                replacer: None,
            }],
        };
        let mut listing = Vec::new();
        info.write(&mut listing).unwrap();

        let mut out = Vec::new();
        out.write_cstring("UnityFS").unwrap();
        out.write_u32::<BigEndian>(7).unwrap();
        out.write_cstring("5.x.x").unwrap();
        out.write_cstring("2021.3.4f1").unwrap();

        let header_size = (out.len() + 8 + 4 + 4 + 4).next_multiple_of(16);
        let total = header_size + listing.len() + payload.len();
        out.write_i64::<BigEndian>(total as i64).unwrap();
        out.write_u32::<BigEndian>(listing.len() as u32).unwrap();
        out.write_u32::<BigEndian>(listing.len() as u32).unwrap();
        out.write_u32::<BigEndian>(crate::HAS_DIRECTORY_INFO).unwrap();
        out.resize(header_size, 0);

        out.extend_from_slice(&listing);
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn reads_minimal_bundle() {
        let payload: Vec<u8> = (0..16).collect();
        let bytes = build_plain_bundle(&payload, "payload");
        let mut bundle = Bundle::read(Cursor::new(bytes)).unwrap();

        assert_eq!(bundle.file_count(), 1);
        assert_eq!(bundle.file_name(0), Some("payload"));
        assert_eq!(bundle.file_name(1), None);
        assert_eq!(bundle.file_range(0), Some((0, 16)));
        assert_eq!(bundle.file_index("payload"), Some(0));
        assert_eq!(bundle.file_index("other"), None);
        assert!(!bundle.data_is_compressed());

        assert_eq!(bundle.read_file(0).unwrap().unwrap(), payload);
        assert_eq!(bundle.read_file(3).unwrap(), None);
    }

    #[test]
    fn close_poisons_data_access() {
        let bytes = build_plain_bundle(&[1, 2, 3, 4], "f");
        let mut bundle = Bundle::read(Cursor::new(bytes)).unwrap();
        bundle.close();

        let err = bundle.read_file(0).unwrap_err();
        assert!(matches!(err, Error::ClosedStream), "actual: {err:?}");
    }

    #[test]
    fn rejects_truncated_listing() {
        let mut bytes = build_plain_bundle(&[0; 16], "payload");
        bytes.truncate(bytes.len() - 40);
        let err = Bundle::read(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, Error::MalformedInput(_)), "actual: {err:?}");
    }
}
