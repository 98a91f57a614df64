//! Errors surfaced while parsing a DOL header or loading its segments.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DolError {
    /// The input is shorter than the fixed 0x100-byte header.
    HeaderTruncated { len: usize },
    /// A segment's `(offset, size)` runs past the end of the file.
    SegmentOutOfRange {
        segment: usize,
        offset: u32,
        size: u32,
        file_len: usize,
    },
}

impl fmt::Display for DolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HeaderTruncated { len } => {
                write!(f, "DOL header truncated: file is {len} bytes, need 0x100")
            }
            Self::SegmentOutOfRange {
                segment,
                offset,
                size,
                file_len,
            } => write!(
                f,
                "segment {segment}: range {offset:#X}..{:#X} exceeds file length {file_len:#X}",
                offset + size
            ),
        }
    }
}

impl std::error::Error for DolError {}
