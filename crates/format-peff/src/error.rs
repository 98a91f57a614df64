//! Errors surfaced while parsing a PEF container.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeffError {
    /// The input is shorter than the fixed 40-byte container header.
    HeaderTruncated { len: usize },
    /// `tag1`/`tag2` didn't read `"Joy!"`/`"peff"`.
    BadMagic,
    /// A section header's `(container_offset, raw_size)` runs past the end
    /// of the file.
    SectionOutOfRange {
        section: usize,
        offset: u32,
        size: u32,
        file_len: usize,
    },
    /// Loader-section symbol and export-hash parsing: the public PEF
    /// documentation describes this table's layout, but no retrieved
    /// reference implementation exercises it byte-for-byte, so it is left
    /// unimplemented rather than guessed at.
    Unimplemented { what: &'static str },
}

impl fmt::Display for PeffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HeaderTruncated { len } => {
                write!(f, "PEF header truncated: file is {len} bytes, need 40")
            }
            Self::BadMagic => write!(f, "PEF magic mismatch (expected \"Joy!\"/\"peff\")"),
            Self::SectionOutOfRange {
                section,
                offset,
                size,
                file_len,
            } => write!(
                f,
                "section {section}: range {offset:#X}..{:#X} exceeds file length {file_len:#X}",
                offset + size
            ),
            Self::Unimplemented { what } => write!(f, "PEF {what} parsing is not implemented"),
        }
    }
}

impl std::error::Error for PeffError {}
