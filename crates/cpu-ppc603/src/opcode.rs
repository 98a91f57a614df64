//! Opcode identification: a single tag enum plus the decode table that maps
//! a raw instruction word onto it.
//!
//! Two nested levels of dispatch cover the whole 603/750 user-mode
//! encoding: the 6-bit primary opcode (bits [31:26]) selects either a leaf
//! instruction directly (D-form integer ops, branches, loads/stores) or one
//! of the four multi-table primaries (0x13, 0x1F, 0x3B, 0x3F), which
//! re-dispatch on a 10-bit extended subopcode.

/// Instruction-form shape, used by both the disassembler and the assembler
/// to know which fields to read/write without repeating per-opcode
/// boilerplate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Form {
    /// `op rD, rA, IMM` (addi, addic, cmpi, ...).
    D,
    /// `op rD, IMM(rA)` memory reference.
    DMem,
    /// `op rD, rA, rB` (X-form ALU/compare/load-store-indexed).
    X,
    /// `op rA, rS, IMM` (andi., ori, ...).
    DLogical,
    /// `op rD, rA` unary (neg, extsb, cntlzw, ...).
    XUnary,
    /// `op rD, rA, SH, MB, ME` (rlwinm family).
    MForm,
    /// `op rD, rA, rB, MB, ME` (rlwnm).
    MFormReg,
    /// Branch, I-form (`b`, `bl`, `ba`, `bla`).
    IForm,
    /// Conditional branch, B-form (`bc`).
    BForm,
    /// `bclr`/`bcctr`, XL-form with BO/BI only.
    XlBranch,
    /// CR logical ops (crand, cror, ...): three 5-bit CR-bit fields.
    XlCr,
    /// `mcrf`: two 3-bit CR-field numbers.
    XlMcrf,
    /// `mfspr`/`mtspr`.
    Spr,
    /// `mftb`.
    Tbr,
    /// No operands (sc, sync, isync, eieio, tlbsync, rfi).
    NoArgs,
    /// Single register operand (mtcrf's mask + rS, mfcr's rD, mtmsr, mfmsr).
    Misc,
    /// `lmw`/`stmw`: `rD, IMM(rA)`.
    DMemMulti,
    /// Cache-hint ops that take `rA, rB` only (dcbf, dcbst, icbi, dcbz, ...).
    XCache,
    /// `tw`/`twi`: TO field plus two operands.
    Trap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    // Integer arithmetic
    Add,
    Addc,
    Adde,
    Addze,
    Addme,
    Subf,
    Subfc,
    Subfe,
    Subfze,
    Subfme,
    Subfic,
    Addi,
    Addis,
    Addic,
    AddicRec,
    Neg,
    Mulli,
    Mullw,
    Mulhw,
    Mulhwu,
    Divw,
    Divwu,

    // Logical / compare / rotate / shift
    And,
    Andc,
    Andi,
    Andis,
    Or,
    Orc,
    Ori,
    Oris,
    Xor,
    Xori,
    Xoris,
    Nand,
    Nor,
    Eqv,
    Cntlzw,
    Extsb,
    Extsh,
    Rlwimi,
    Rlwinm,
    Rlwnm,
    Slw,
    Srw,
    Sraw,
    Srawi,
    Cmp,
    Cmpl,
    Cmpi,
    Cmpli,
    Tw,
    Twi,

    // CR logical
    Mcrf,
    Crand,
    Cror,
    Crxor,
    Crnand,
    Crnor,
    Crandc,
    Crorc,
    Creqv,

    // Branches
    B,
    Bc,
    Bclr,
    Bcctr,

    // Memory
    Lbz,
    Lbzu,
    Lbzx,
    Lbzux,
    Lhz,
    Lhzu,
    Lhzx,
    Lhzux,
    Lha,
    Lhau,
    Lhax,
    Lhaux,
    Lwz,
    Lwzu,
    Lwzx,
    Lwzux,
    Stb,
    Stbu,
    Stbx,
    Stbux,
    Sth,
    Sthu,
    Sthx,
    Sthux,
    Stw,
    Stwu,
    Stwx,
    Stwux,
    Lmw,
    Stmw,

    // System / cache / sync
    Sc,
    Mfspr,
    Mtspr,
    Mftb,
    Mfcr,
    Mtcrf,
    Mfmsr,
    Mtmsr,
    Mfsr,
    Mtsr,
    Mfsrin,
    Mtsrin,
    Rfi,
    Sync,
    Isync,
    Eieio,
    Dcbst,
    Dcbf,
    Dcbt,
    Dcbtst,
    Icbi,
    Dcbi,
    Dcba,
    Dcbz,
    Tlbia,
    Tlbie,
    Tlbsync,
    Lwarx,
    Stwcx,
    Eciwx,
    Ecowx,
    Mcrxr,
    Lswi,
    Lswx,
    Stswi,
    Stswx,
    Lwbrx,
    Stwbrx,
    Lhbrx,
    Sthbrx,

    // Floating point (decoded and disassembled; unimplemented in the
    // interpreter, matching the required-semantics list in the component
    // design).
    Lfs,
    Lfsu,
    Lfsx,
    Lfsux,
    Lfd,
    Lfdu,
    Lfdx,
    Lfdux,
    Stfs,
    Stfsu,
    Stfsx,
    Stfsux,
    Stfd,
    Stfdu,
    Stfdx,
    Stfdux,
    Stfiwx,
    Fadd,
    Fsub,
    Fmul,
    Fdiv,
    Fabs,
    Fneg,
    Fmr,
    Fcmpo,
    Fcmpu,
    Fctiw,
    Fctiwz,
    Frsp,
    Mffs,
    Mtfsf,
    Mtfsb0,
    Mtfsb1,
    Mtfsfi,
    Mcrfs,

    /// Reserved primary/subopcode slot.
    Invalid,
}

impl Op {
    /// Base mnemonic text, before the `.`/`o` suffixes the assembler and
    /// disassembler attach depending on `rec`/`oe`.
    pub fn mnemonic(self) -> &'static str {
        use Op::*;
        match self {
            Add => "add",
            Addc => "addc",
            Adde => "adde",
            Addze => "addze",
            Addme => "addme",
            Subf => "subf",
            Subfc => "subfc",
            Subfe => "subfe",
            Subfze => "subfze",
            Subfme => "subfme",
            Subfic => "subfic",
            Addi => "addi",
            Addis => "addis",
            Addic => "addic",
            AddicRec => "addic.",
            Neg => "neg",
            Mulli => "mulli",
            Mullw => "mullw",
            Mulhw => "mulhw",
            Mulhwu => "mulhwu",
            Divw => "divw",
            Divwu => "divwu",
            And => "and",
            Andc => "andc",
            Andi => "andi.",
            Andis => "andis.",
            Or => "or",
            Orc => "orc",
            Ori => "ori",
            Oris => "oris",
            Xor => "xor",
            Xori => "xori",
            Xoris => "xoris",
            Nand => "nand",
            Nor => "nor",
            Eqv => "eqv",
            Cntlzw => "cntlzw",
            Extsb => "extsb",
            Extsh => "extsh",
            Rlwimi => "rlwimi",
            Rlwinm => "rlwinm",
            Rlwnm => "rlwnm",
            Slw => "slw",
            Srw => "srw",
            Sraw => "sraw",
            Srawi => "srawi",
            Cmp => "cmp",
            Cmpl => "cmpl",
            Cmpi => "cmpi",
            Cmpli => "cmpli",
            Tw => "tw",
            Twi => "twi",
            Mcrf => "mcrf",
            Crand => "crand",
            Cror => "cror",
            Crxor => "crxor",
            Crnand => "crnand",
            Crnor => "crnor",
            Crandc => "crandc",
            Crorc => "crorc",
            Creqv => "creqv",
            B => "b",
            Bc => "bc",
            Bclr => "bclr",
            Bcctr => "bcctr",
            Lbz => "lbz",
            Lbzu => "lbzu",
            Lbzx => "lbzx",
            Lbzux => "lbzux",
            Lhz => "lhz",
            Lhzu => "lhzu",
            Lhzx => "lhzx",
            Lhzux => "lhzux",
            Lha => "lha",
            Lhau => "lhau",
            Lhax => "lhax",
            Lhaux => "lhaux",
            Lwz => "lwz",
            Lwzu => "lwzu",
            Lwzx => "lwzx",
            Lwzux => "lwzux",
            Stb => "stb",
            Stbu => "stbu",
            Stbx => "stbx",
            Stbux => "stbux",
            Sth => "sth",
            Sthu => "sthu",
            Sthx => "sthx",
            Sthux => "sthux",
            Stw => "stw",
            Stwu => "stwu",
            Stwx => "stwx",
            Stwux => "stwux",
            Lmw => "lmw",
            Stmw => "stmw",
            Sc => "sc",
            Mfspr => "mfspr",
            Mtspr => "mtspr",
            Mftb => "mftb",
            Mfcr => "mfcr",
            Mtcrf => "mtcrf",
            Mfmsr => "mfmsr",
            Mtmsr => "mtmsr",
            Mfsr => "mfsr",
            Mtsr => "mtsr",
            Mfsrin => "mfsrin",
            Mtsrin => "mtsrin",
            Rfi => "rfi",
            Sync => "sync",
            Isync => "isync",
            Eieio => "eieio",
            Dcbst => "dcbst",
            Dcbf => "dcbf",
            Dcbt => "dcbt",
            Dcbtst => "dcbtst",
            Icbi => "icbi",
            Dcbi => "dcbi",
            Dcba => "dcba",
            Dcbz => "dcbz",
            Tlbia => "tlbia",
            Tlbie => "tlbie",
            Tlbsync => "tlbsync",
            Lwarx => "lwarx",
            Stwcx => "stwcx.",
            Eciwx => "eciwx",
            Ecowx => "ecowx",
            Mcrxr => "mcrxr",
            Lswi => "lswi",
            Lswx => "lswx",
            Stswi => "stswi",
            Stswx => "stswx",
            Lwbrx => "lwbrx",
            Stwbrx => "stwbrx",
            Lhbrx => "lhbrx",
            Sthbrx => "sthbrx",
            Lfs => "lfs",
            Lfsu => "lfsu",
            Lfsx => "lfsx",
            Lfsux => "lfsux",
            Lfd => "lfd",
            Lfdu => "lfdu",
            Lfdx => "lfdx",
            Lfdux => "lfdux",
            Stfs => "stfs",
            Stfsu => "stfsu",
            Stfsx => "stfsx",
            Stfsux => "stfsux",
            Stfd => "stfd",
            Stfdu => "stfdu",
            Stfdx => "stfdx",
            Stfdux => "stfdux",
            Stfiwx => "stfiwx",
            Fadd => "fadd",
            Fsub => "fsub",
            Fmul => "fmul",
            Fdiv => "fdiv",
            Fabs => "fabs",
            Fneg => "fneg",
            Fmr => "fmr",
            Fcmpo => "fcmpo",
            Fcmpu => "fcmpu",
            Fctiw => "fctiw",
            Fctiwz => "fctiwz",
            Frsp => "frsp",
            Mffs => "mffs",
            Mtfsf => "mtfsf",
            Mtfsb0 => "mtfsb0",
            Mtfsb1 => "mtfsb1",
            Mtfsfi => "mtfsfi",
            Mcrfs => "mcrfs",
            Invalid => ".invalid",
        }
    }

    pub fn form(self) -> Form {
        use Form::*;
        use Op::*;
        match self {
            Add | Addc | Adde | Subf | Subfc | Subfe | Mullw | Mulhw | Mulhwu | Divw | Divwu
            | And | Andc | Or | Orc | Xor | Nand | Nor | Eqv | Slw | Srw | Sraw | Lwzx | Lwzux
            | Lbzx | Lbzux | Lhzx | Lhzux | Lhax | Lhaux | Stwx | Stwux | Stbx | Stbux | Sthx
            | Sthux | Lwarx | Eciwx | Ecowx | Lswx | Stswx | Lwbrx | Stwbrx | Lhbrx | Sthbrx => X,
            Addze | Addme | Subfze | Subfme | Neg | Cntlzw | Extsb | Extsh | Srawi => XUnary,
            Subfic | Addi | Addis | Addic | AddicRec | Mulli | Cmpi | Cmpli => D,
            Andi | Andis | Ori | Oris | Xori | Xoris => DLogical,
            Rlwimi | Rlwinm => MForm,
            Rlwnm => MFormReg,
            Cmp | Cmpl => X,
            Tw => Trap,
            Twi => Trap,
            Mcrf => XlMcrf,
            Crand | Cror | Crxor | Crnand | Crnor | Crandc | Crorc | Creqv => XlCr,
            B => IForm,
            Bc => BForm,
            Bclr | Bcctr => XlBranch,
            Lbz | Lbzu | Lhz | Lhzu | Lha | Lhau | Lwz | Lwzu | Stb | Stbu | Sth | Sthu | Stw
            | Stwu | Lfs | Lfsu | Lfd | Lfdu | Stfs | Stfsu | Stfd | Stfdu => DMem,
            Lmw | Stmw => DMemMulti,
            Sc | Sync | Isync | Eieio | Tlbsync | Rfi => NoArgs,
            Mfspr | Mtspr => Spr,
            Mftb => Tbr,
            Mfcr | Mtcrf | Mfmsr | Mtmsr | Mffs | Mtfsf | Mtfsb0 | Mtfsb1 | Mtfsfi | Mcrfs => Misc,
            Mfsr | Mtsr | Mfsrin | Mtsrin => Misc,
            Dcbst | Dcbf | Dcbt | Dcbtst | Icbi | Dcbi | Dcba | Dcbz | Tlbia | Tlbie | Mcrxr
            | Stwcx => XCache,
            Lswi | Stswi => DMemMulti,
            Lfsx | Lfsux | Lfdx | Lfdux | Stfsx | Stfsux | Stfdx | Stfdux | Stfiwx => X,
            Fadd | Fsub | Fmul | Fdiv => X,
            Fabs | Fneg | Fmr | Fctiw | Fctiwz | Frsp => XUnary,
            Fcmpo | Fcmpu => X,
            Invalid => NoArgs,
        }
    }
}

/// Decode a 32-bit big-endian instruction word into its opcode tag.
pub fn decode(word: u32) -> Op {
    let op = crate::bitfield::get_op(word);
    match op {
        3 => Op::Twi,
        7 => Op::Mulli,
        8 => Op::Subfic,
        10 => Op::Cmpli,
        11 => Op::Cmpi,
        12 => Op::Addic,
        13 => Op::AddicRec,
        14 => Op::Addi,
        15 => Op::Addis,
        16 => Op::Bc,
        17 => Op::Sc,
        18 => Op::B,
        19 => decode_19(word),
        20 => Op::Rlwimi,
        21 => Op::Rlwinm,
        23 => Op::Rlwnm,
        24 => Op::Ori,
        25 => Op::Oris,
        26 => Op::Xori,
        27 => Op::Xoris,
        28 => Op::Andi,
        29 => Op::Andis,
        31 => decode_31(word),
        32 => Op::Lwz,
        33 => Op::Lwzu,
        34 => Op::Lbz,
        35 => Op::Lbzu,
        36 => Op::Stw,
        37 => Op::Stwu,
        38 => Op::Stb,
        39 => Op::Stbu,
        40 => Op::Lhz,
        41 => Op::Lhzu,
        42 => Op::Lha,
        43 => Op::Lhau,
        44 => Op::Sth,
        45 => Op::Sthu,
        46 => Op::Lmw,
        47 => Op::Stmw,
        48 => Op::Lfs,
        49 => Op::Lfsu,
        50 => Op::Lfd,
        51 => Op::Lfdu,
        52 => Op::Stfs,
        53 => Op::Stfsu,
        54 => Op::Stfd,
        55 => Op::Stfdu,
        59 => decode_59(word),
        63 => decode_63(word),
        _ => Op::Invalid,
    }
}

fn decode_19(word: u32) -> Op {
    match crate::bitfield::get_subopcode(word) {
        0 => Op::Mcrf,
        16 => Op::Bclr,
        33 => Op::Crnor,
        50 => Op::Rfi,
        129 => Op::Crandc,
        150 => Op::Isync,
        193 => Op::Crxor,
        225 => Op::Crnand,
        257 => Op::Crand,
        289 => Op::Creqv,
        417 => Op::Crorc,
        449 => Op::Cror,
        528 => Op::Bcctr,
        _ => Op::Invalid,
    }
}

fn decode_31(word: u32) -> Op {
    match crate::bitfield::get_subopcode(word) {
        0 => Op::Cmp,
        4 => Op::Tw,
        8 => Op::Subfc,
        10 => Op::Addc,
        11 => Op::Mulhwu,
        19 => Op::Mfcr,
        20 => Op::Lwarx,
        23 => Op::Lwzx,
        24 => Op::Slw,
        26 => Op::Cntlzw,
        28 => Op::And,
        32 => Op::Cmpl,
        40 => Op::Subf,
        54 => Op::Dcbst,
        55 => Op::Lwzux,
        60 => Op::Andc,
        75 => Op::Mulhw,
        83 => Op::Mfmsr,
        86 => Op::Dcbf,
        87 => Op::Lbzx,
        104 => Op::Neg,
        119 => Op::Lbzux,
        124 => Op::Nor,
        136 => Op::Subfe,
        138 => Op::Adde,
        144 => Op::Mtcrf,
        146 => Op::Mtmsr,
        150 => Op::Stwcx,
        151 => Op::Stwx,
        183 => Op::Stwux,
        200 => Op::Subfze,
        202 => Op::Addze,
        210 => Op::Mtsr,
        215 => Op::Stbx,
        232 => Op::Subfme,
        234 => Op::Addme,
        235 => Op::Mullw,
        242 => Op::Mtsrin,
        246 => Op::Dcbtst,
        247 => Op::Stbux,
        266 => Op::Add,
        278 => Op::Dcbt,
        279 => Op::Lhzx,
        284 => Op::Eqv,
        306 => Op::Tlbie,
        310 => Op::Eciwx,
        311 => Op::Lhzux,
        316 => Op::Xor,
        339 => Op::Mfspr,
        343 => Op::Lhax,
        370 => Op::Tlbia,
        371 => Op::Mftb,
        375 => Op::Lhaux,
        407 => Op::Sthx,
        412 => Op::Orc,
        438 => Op::Ecowx,
        439 => Op::Sthux,
        444 => Op::Or,
        459 => Op::Divwu,
        467 => Op::Mtspr,
        470 => Op::Dcbi,
        476 => Op::Nand,
        491 => Op::Divw,
        512 => Op::Mcrxr,
        533 => Op::Lswx,
        534 => Op::Lwbrx,
        535 => Op::Lfsx,
        536 => Op::Srw,
        566 => Op::Tlbsync,
        567 => Op::Lfsux,
        595 => Op::Mfsr,
        597 => Op::Lswi,
        598 => Op::Sync,
        599 => Op::Lfdx,
        631 => Op::Lfdux,
        659 => Op::Mfsrin,
        661 => Op::Stswx,
        662 => Op::Stwbrx,
        663 => Op::Stfsx,
        695 => Op::Stfsux,
        725 => Op::Stswi,
        727 => Op::Stfdx,
        758 => Op::Dcba,
        759 => Op::Stfdux,
        790 => Op::Lhbrx,
        792 => Op::Sraw,
        824 => Op::Srawi,
        854 => Op::Eieio,
        918 => Op::Sthbrx,
        922 => Op::Extsh,
        954 => Op::Extsb,
        982 => Op::Icbi,
        983 => Op::Stfiwx,
        1014 => Op::Dcbz,
        _ => Op::Invalid,
    }
}

fn decode_59(word: u32) -> Op {
    match crate::bitfield::get_short_subopcode(word) {
        21 => Op::Fadd,
        20 => Op::Fsub,
        25 => Op::Fmul,
        18 => Op::Fdiv,
        _ => Op::Invalid,
    }
}

fn decode_63(word: u32) -> Op {
    let short = crate::bitfield::get_short_subopcode(word);
    match short {
        21 => return Op::Fadd,
        20 => return Op::Fsub,
        25 => return Op::Fmul,
        18 => return Op::Fdiv,
        _ => {}
    }
    match crate::bitfield::get_subopcode(word) {
        0 => Op::Fcmpu,
        32 => Op::Fcmpo,
        12 => Op::Frsp,
        14 => Op::Fctiw,
        15 => Op::Fctiwz,
        40 => Op::Fneg,
        72 => Op::Fmr,
        136 => Op::Fabs,
        583 => Op::Mffs,
        38 => Op::Mtfsb1,
        70 => Op::Mtfsb0,
        134 => Op::Mtfsfi,
        711 => Op::Mtfsf,
        64 => Op::Mcrfs,
        _ => Op::Invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_li_as_addi() {
        // li r3, 0x2A == addi r3, 0, 0x2A
        let word = 0x3860002Au32;
        assert_eq!(decode(word), Op::Addi);
    }

    #[test]
    fn decodes_blr_as_bclr() {
        let word = 0x4E800020u32;
        assert_eq!(decode(word), Op::Bclr);
    }

    #[test]
    fn decodes_or_family() {
        // or r3, r4, r4 (mr)
        let word = (31u32 << 26) | (4 << 21) | (3 << 16) | (4 << 11) | (444 << 1);
        assert_eq!(decode(word), Op::Or);
    }

    #[test]
    fn unknown_primary_is_invalid() {
        let word = 1u32 << 26;
        assert_eq!(decode(word), Op::Invalid);
    }
}
