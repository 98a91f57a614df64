//! Errors surfaced while parsing a REL header, its section table, its
//! import table, or a single relocation stream.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelError {
    /// The input is shorter than the header size for its own `format_version`.
    HeaderTruncated { len: usize, needed: usize },
    /// A section header's `(offset, size)` runs past the end of the file.
    SectionOutOfRange {
        section: usize,
        offset: u32,
        size: u32,
        file_len: usize,
    },
    /// Two import entries named the same source module.
    DuplicateImportModule { module_id: u32 },
    /// A relocation record's type byte matches none of the known kinds.
    UnknownRelocationType { value: u8 },
    /// The byte stream ran out before a `STOP` record was read.
    UnterminatedRelocationStream { offset: usize },
}

impl fmt::Display for RelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HeaderTruncated { len, needed } => {
                write!(f, "REL header truncated: file is {len} bytes, need {needed}")
            }
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
            Self::DuplicateImportModule { module_id } => {
                write!(f, "multiple import entries for module {module_id:#010X}")
            }
            Self::UnknownRelocationType { value } => {
                write!(f, "unknown relocation type {value:#04X}")
            }
            Self::UnterminatedRelocationStream { offset } => {
                write!(f, "relocation stream at {offset:#X} ran out of bytes before STOP")
            }
        }
    }
}

impl std::error::Error for RelError {}
