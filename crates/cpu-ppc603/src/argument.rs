//! The assembler's argument sum type, shared with the disassembler for
//! rendering and with the assembler for parsing/encoding.

#[derive(Debug, Clone, PartialEq)]
pub enum BranchTarget {
    /// An already-resolved numeric value (absolute address or delta).
    Value(i64),
    /// An unresolved label, filled in during the assembler's second pass.
    Label(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    IntReg(u8),
    FloatReg(u8),
    Spr(u16),
    Tbr(u16),
    CondField(u8),
    CondBit(u8),
    Immediate(i64),
    ImmMemRef { base: u8, disp: i32, updates: bool },
    RegMemRef { base: u8, index: u8, updates: bool },
    Absolute(u32),
    BranchTarget(BranchTarget),
    Raw(String),
}

impl Argument {
    pub fn as_int_reg(&self) -> Option<u8> {
        match self {
            Argument::IntReg(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float_reg(&self) -> Option<u8> {
        match self {
            Argument::FloatReg(n) => Some(*n),
            _ => None,
        }
    }

    /// `IMMEDIATE` and `ABSOLUTE_ADDRESS` both satisfy a `BRANCH_TARGET`
    /// argument position, since the parser cannot always tell them apart
    /// from bare text.
    pub fn as_immediate(&self) -> Option<i64> {
        match self {
            Argument::Immediate(v) => Some(*v),
            Argument::Absolute(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_branch_target(&self) -> Option<BranchTarget> {
        match self {
            Argument::BranchTarget(t) => Some(t.clone()),
            Argument::Immediate(v) => Some(BranchTarget::Value(*v)),
            Argument::Absolute(v) => Some(BranchTarget::Value(*v as i64)),
            _ => None,
        }
    }

    pub fn as_cond_field(&self) -> Option<u8> {
        match self {
            Argument::CondField(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_cond_bit(&self) -> Option<u8> {
        match self {
            Argument::CondBit(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_spr(&self) -> Option<u16> {
        match self {
            Argument::Spr(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_tbr(&self) -> Option<u16> {
        match self {
            Argument::Tbr(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_imm_mem_ref(&self) -> Option<(u8, i32, bool)> {
        match self {
            Argument::ImmMemRef {
                base,
                disp,
                updates,
            } => Some((*base, *disp, *updates)),
            _ => None,
        }
    }

    pub fn as_reg_mem_ref(&self) -> Option<(u8, u8, bool)> {
        match self {
            Argument::RegMemRef {
                base,
                index,
                updates,
            } => Some((*base, *index, *updates)),
            _ => None,
        }
    }
}
