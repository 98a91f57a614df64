//! Error types for the PPC assembler, disassembler, and interpreter.
//!
//! No crate in this workspace reaches for `thiserror`; errors here follow
//! the house style (see `format-adf::AdfError` in the wider corpus): a
//! plain enum, a hand-written `Display`, and a blanket `Error` impl.

use std::fmt;

/// What kind of access faulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
    Execute,
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Execute => write!(f, "execute"),
        }
    }
}

/// Errors produced by the memory subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryFault {
    pub address: u32,
    pub size: u8,
    pub kind: AccessKind,
}

impl fmt::Display for MemoryFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} fault: {}-byte access at {:#010X} is out of range",
            self.kind, self.size, self.address
        )
    }
}

impl std::error::Error for MemoryFault {}

/// Errors produced while encoding a bit field or an assembler argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeRange {
    pub field: &'static str,
    pub value: i64,
    pub min: i64,
    pub max: i64,
}

impl fmt::Display for EncodeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "value {} out of range for field `{}` (expected {}..={})",
            self.value, self.field, self.min, self.max
        )
    }
}

impl std::error::Error for EncodeRange {}

/// Errors surfaced by the interpreter's fetch/decode/execute loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// The dispatcher found no executor for this (valid) opcode.
    Unimplemented {
        pc: u32,
        word: u32,
        mnemonic_text: String,
    },
    /// The opcode field selects a reserved primary/subopcode slot.
    Invalid { pc: u32, word: u32 },
    /// Out-of-range or misaligned memory access.
    Memory(MemoryFault),
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unimplemented {
                pc,
                word,
                mnemonic_text,
            } => write!(
                f,
                "unimplemented opcode at {pc:#010X}: {word:#010X} ({mnemonic_text})"
            ),
            Self::Invalid { pc, word } => {
                write!(f, "invalid opcode at {pc:#010X}: {word:#010X}")
            }
            Self::Memory(fault) => write!(f, "{fault}"),
        }
    }
}

impl std::error::Error for ExecError {}

impl From<MemoryFault> for ExecError {
    fn from(fault: MemoryFault) -> Self {
        Self::Memory(fault)
    }
}

/// Errors surfaced by the two-pass assembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsmError {
    /// The source parser could not tokenise a line.
    Parse { line: usize, reason: String },
    /// An encoder argument is outside the field's representable range.
    EncodeRange(EncodeRange),
    /// A branch displacement exceeds the field width for the instruction.
    BranchOutOfRange {
        site: usize,
        target: i64,
        max_distance: i64,
    },
    /// A `BRANCH_TARGET` argument referenced a label that was never defined.
    UnknownLabel { name: String },
    /// The same label was declared twice.
    DuplicateLabel {
        name: String,
        first_line: usize,
        second_line: usize,
    },
    /// An `.include` directive recursed through itself.
    IncludeCycle { name: String },
    /// The named include could not be resolved by the caller's resolver.
    IncludeNotFound { name: String, reason: String },
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse { line, reason } => write!(f, "line {line}: {reason}"),
            Self::EncodeRange(e) => write!(f, "{e}"),
            Self::BranchOutOfRange {
                site,
                target,
                max_distance,
            } => write!(
                f,
                "branch at offset {site:#X} to {target:#X} exceeds max displacement {max_distance:#X}"
            ),
            Self::UnknownLabel { name } => write!(f, "undefined label `{name}`"),
            Self::DuplicateLabel {
                name,
                first_line,
                second_line,
            } => write!(
                f,
                "label `{name}` redefined on line {second_line} (first defined on line {first_line})"
            ),
            Self::IncludeCycle { name } => write!(f, "`.include` cycle through `{name}`"),
            Self::IncludeNotFound { name, reason } => {
                write!(f, "cannot resolve include `{name}`: {reason}")
            }
        }
    }
}

impl std::error::Error for AsmError {}

impl From<EncodeRange> for AsmError {
    fn from(e: EncodeRange) -> Self {
        Self::EncodeRange(e)
    }
}
