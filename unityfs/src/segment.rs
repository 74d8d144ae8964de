//! Windowed sub-stream over a seekable parent
//!
//! A [`SegmentStream`] exposes `[start, start + length)` of its parent as an
//! independently positioned `Read + Seek`. The bundle reader installs one
//! over the data region when the blocks need no random-access decoding.

use std::io::{self, Read, Seek, SeekFrom};

/// A bounded window into a parent stream.
///
/// The segment owns the parent for its lifetime; every read seeks the parent
/// to the translated position first, so the parent's own cursor state does
/// not leak into the window.
#[derive(Debug)]
pub struct SegmentStream<R> {
    parent: R,
    start: u64,
    length: u64,
    pos: u64,
}

impl<R: Read + Seek> SegmentStream<R> {
    /// Create a window over `[start, start + length)` of `parent`.
    pub fn new(parent: R, start: u64, length: u64) -> Self {
        Self {
            parent,
            start,
            length,
            pos: 0,
        }
    }

    /// Length of the window in bytes.
    pub fn len(&self) -> u64 {
        self.length
    }

    /// `true` if the window is zero-sized.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Release the parent stream.
    pub fn into_inner(self) -> R {
        self.parent
    }
}

impl<R: Read + Seek> Read for SegmentStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.length.saturating_sub(self.pos);
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }

        let take = (buf.len() as u64).min(remaining) as usize;
        self.parent.seek(SeekFrom::Start(self.start + self.pos))?;
        let read = self.parent.read(&mut buf[..take])?;
        self.pos += read as u64;
        Ok(read)
    }
}

impl<R: Read + Seek> Seek for SegmentStream<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(offset) => self.length.checked_add_signed(offset),
            SeekFrom::Current(offset) => self.pos.checked_add_signed(offset),
        };

        // Seeking past the end is allowed (reads there return 0), seeking
        // before the start is not.
        match target {
            Some(target) => {
                self.pos = target;
                Ok(target)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of segment",
            )),
        }
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.pos)
    }
}
