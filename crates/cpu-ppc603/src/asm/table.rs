//! Mnemonic → encoding. One function per instruction family rather than one
//! per mnemonic; synthetic mnemonics are rewritten into a canonical
//! `Argument` list and handed to the same family encoder the canonical
//! mnemonic would use, so there is exactly one encoder per wire form.

use crate::argument::{Argument, BranchTarget};
use crate::bitfield::*;
use crate::error::{AsmError, EncodeRange};
use crate::spr;
use std::collections::HashMap;

pub struct EncodeContext<'a> {
    pub line: usize,
    pub item_offset: usize,
    pub start_address: u32,
    pub label_offsets: &'a HashMap<String, usize>,
}

fn parse_err(line: usize, reason: impl Into<String>) -> AsmError {
    AsmError::Parse {
        line,
        reason: reason.into(),
    }
}

fn gpr(args: &[Argument], idx: usize, line: usize) -> Result<u8, AsmError> {
    args.get(idx)
        .and_then(Argument::as_int_reg)
        .ok_or_else(|| parse_err(line, format!("expected a GPR in argument position {idx}")))
}

fn fpreg(args: &[Argument], idx: usize, line: usize) -> Result<u8, AsmError> {
    args.get(idx)
        .and_then(Argument::as_float_reg)
        .ok_or_else(|| parse_err(line, format!("expected an FPR in argument position {idx}")))
}

fn imm(args: &[Argument], idx: usize, line: usize) -> Result<i64, AsmError> {
    args.get(idx)
        .and_then(Argument::as_immediate)
        .ok_or_else(|| parse_err(line, format!("expected an immediate in argument position {idx}")))
}

fn cond_field(args: &[Argument], idx: usize, line: usize) -> Result<u8, AsmError> {
    args.get(idx)
        .and_then(Argument::as_cond_field)
        .ok_or_else(|| parse_err(line, format!("expected a CR field in argument position {idx}")))
}

fn cond_bit(args: &[Argument], idx: usize, line: usize) -> Result<u8, AsmError> {
    args.get(idx)
        .and_then(Argument::as_cond_bit)
        .ok_or_else(|| parse_err(line, format!("expected a CR bit in argument position {idx}")))
}

fn mem_ref_imm(args: &[Argument], idx: usize, line: usize) -> Result<(u8, i32), AsmError> {
    args.get(idx)
        .and_then(Argument::as_imm_mem_ref)
        .map(|(base, disp, _)| (base, disp))
        .ok_or_else(|| parse_err(line, format!("expected `[rA +/- disp]` in argument position {idx}")))
}

fn mem_ref_indexed(args: &[Argument], idx: usize, line: usize) -> Result<(u8, u8), AsmError> {
    args.get(idx)
        .and_then(Argument::as_reg_mem_ref)
        .map(|(base, index, _)| (base, index))
        .ok_or_else(|| parse_err(line, format!("expected `[(rA) + rB]` in argument position {idx}")))
}

fn check_arity(args: &[Argument], expected: usize, line: usize, mnemonic: &str) -> Result<(), AsmError> {
    if args.len() != expected {
        return Err(parse_err(
            line,
            format!("`{mnemonic}` expects {expected} argument(s), got {}", args.len()),
        ));
    }
    Ok(())
}

fn range_err(err: EncodeRange) -> AsmError {
    AsmError::EncodeRange(err)
}

// --- D-form / X-form integer ALU ---

pub fn encode_d(primary: u32, rd: u8, ra: u8, value: i32) -> Result<u32, AsmError> {
    Ok(encode_op(primary).map_err(range_err)?
        | encode_reg1(rd).map_err(range_err)?
        | encode_reg2(ra).map_err(range_err)?
        | encode_imm_ext(value).map_err(range_err)?)
}

pub fn encode_d_unsigned(primary: u32, rd: u8, ra: u8, value: u16) -> Result<u32, AsmError> {
    Ok(encode_op(primary).map_err(range_err)?
        | encode_reg1(rd).map_err(range_err)?
        | encode_reg2(ra).map_err(range_err)?
        | encode_imm(value))
}

pub fn encode_x(
    primary: u32,
    subopcode: u32,
    rd: u8,
    ra: u8,
    rb: u8,
    oe: bool,
    rec: bool,
) -> Result<u32, AsmError> {
    Ok(encode_op(primary).map_err(range_err)?
        | encode_reg1(rd).map_err(range_err)?
        | encode_reg2(ra).map_err(range_err)?
        | encode_reg3(rb).map_err(range_err)?
        | encode_subopcode(subopcode).map_err(range_err)?
        | encode_o(oe)
        | encode_rec(rec))
}

pub fn encode_x_unary(primary: u32, subopcode: u32, rd: u8, ra: u8, oe: bool, rec: bool) -> Result<u32, AsmError> {
    encode_x(primary, subopcode, rd, ra, 0, oe, rec)
}

pub fn encode_m_form(rd: u8, ra: u8, sh: u8, mb: u8, me: u8, primary: u32, rec: bool) -> Result<u32, AsmError> {
    Ok(encode_op(primary).map_err(range_err)?
        | encode_reg1(rd).map_err(range_err)?
        | encode_reg2(ra).map_err(range_err)?
        | encode_reg3(sh).map_err(range_err)?
        | encode_reg4(mb).map_err(range_err)?
        | encode_reg5(me).map_err(range_err)?
        | encode_rec(rec))
}

// --- Memory references ---

pub fn encode_mem_d(primary: u32, rd: u8, base: u8, disp: i32) -> Result<u32, AsmError> {
    encode_d(primary, rd, base, disp)
}

pub fn encode_mem_x(primary: u32, subopcode: u32, rd: u8, base: u8, index: u8) -> Result<u32, AsmError> {
    encode_x(primary, subopcode, rd, base, index, false, false)
}

// --- Branches ---

pub fn resolve_branch_value(target: &Argument, ctx: &EncodeContext, line: usize) -> Result<i64, AsmError> {
    match target.as_branch_target() {
        Some(BranchTarget::Label(name)) => {
            let offset = ctx
                .label_offsets
                .get(&name)
                .copied()
                .ok_or_else(|| AsmError::UnknownLabel { name: name.clone() })?;
            Ok(offset as i64 - ctx.item_offset as i64)
        }
        Some(BranchTarget::Value(v)) => Ok(v - (ctx.start_address as i64 + ctx.item_offset as i64)),
        None => Err(parse_err(line, "expected a branch target")),
    }
}

pub fn encode_b(delta: i64, link: bool, abs: bool, line: usize) -> Result<u32, AsmError> {
    if !(-0x0200_0000..=0x01FF_FFFC).contains(&delta) || delta & 0x3 != 0 {
        return Err(AsmError::BranchOutOfRange {
            site: line,
            target: delta,
            max_distance: 0x01FF_FFFC,
        });
    }
    Ok(encode_op(18).map_err(range_err)? | encode_b_target(delta as i32).map_err(range_err)? | encode_b_abs(abs) | encode_b_link(link))
}

pub fn encode_bc(bo: u8, bi: u8, delta: i64, link: bool, abs: bool, line: usize) -> Result<u32, AsmError> {
    if !(-0x8000..=0x7FFC).contains(&delta) || delta & 0x3 != 0 {
        return Err(AsmError::BranchOutOfRange {
            site: line,
            target: delta,
            max_distance: 0x7FFC,
        });
    }
    Ok(encode_op(16).map_err(range_err)?
        | encode_bo(bo).map_err(range_err)?
        | encode_bi(bi).map_err(range_err)?
        | encode_imm_ext(delta as i32).map_err(range_err)?
        | encode_b_abs(abs)
        | encode_b_link(link))
}

pub fn encode_bclr(bo: u8, bi: u8, link: bool) -> Result<u32, AsmError> {
    Ok(encode_op(19).map_err(range_err)?
        | encode_bo(bo).map_err(range_err)?
        | encode_bi(bi).map_err(range_err)?
        | encode_subopcode(16).map_err(range_err)?
        | encode_b_link(link))
}

pub fn encode_bcctr(bo: u8, bi: u8, link: bool) -> Result<u32, AsmError> {
    Ok(encode_op(19).map_err(range_err)?
        | encode_bo(bo).map_err(range_err)?
        | encode_bi(bi).map_err(range_err)?
        | encode_subopcode(528).map_err(range_err)?
        | encode_b_link(link))
}

/// Canonical conditional-branch name → (BO, BI low 2 bits). Mirrors the
/// disassembler's folding table in reverse.
pub const CANONICAL_CONDITIONS: &[(&str, u8, u8)] = &[
    ("ge", 0x04, 0),
    ("le", 0x04, 1),
    ("ne", 0x04, 2),
    ("ns", 0x04, 3),
    ("lt", 0x0C, 0),
    ("gt", 0x0C, 1),
    ("eq", 0x0C, 2),
    ("so", 0x0C, 3),
];

pub fn spr_number(name: &str) -> Option<u16> {
    spr::spr_for_name(name)
}

pub fn tbr_number(name: &str) -> Option<u16> {
    spr::tbr_for_name(name)
}

const OE_CAPABLE: &[&str] = &[
    "add", "addc", "adde", "addze", "addme", "subf", "subfc", "subfe", "subfze", "subfme", "neg",
    "mullw", "divw", "divwu",
];

fn strip_rec(mnemonic: &str) -> (&str, bool) {
    match mnemonic.strip_suffix('.') {
        Some(s) => (s, true),
        None => (mnemonic, false),
    }
}

fn strip_oe<'a>(mnemonic: &'a str) -> (&'a str, bool) {
    if let Some(s) = mnemonic.strip_suffix('o') {
        if OE_CAPABLE.contains(&s) {
            return (s, true);
        }
    }
    (mnemonic, false)
}

/// Encodes synthetic rlwinm-family mnemonics and `sub`/`subo` by rewriting
/// into the canonical instruction's argument list, then falls through to
/// the same path the canonical mnemonic would take.
fn rewrite_synthetic(mnemonic: &str, args: &[Argument], line: usize) -> Result<Option<(String, Vec<Argument>)>, AsmError> {
    let rewrite_rlw = |ra: Argument, rs: Argument, sh: i64, mb: i64, me: i64| {
        vec![ra, rs, Argument::Immediate(sh), Argument::Immediate(mb), Argument::Immediate(me)]
    };

    match mnemonic {
        "nop" => {
            check_arity(args, 0, line, mnemonic)?;
            Ok(Some((
                "ori".to_string(),
                vec![Argument::IntReg(0), Argument::IntReg(0), Argument::Immediate(0)],
            )))
        }
        "mr" | "mr." => {
            check_arity(args, 2, line, mnemonic)?;
            let ra = args[0].clone();
            let rs = args[1].clone();
            let name = if mnemonic.ends_with('.') { "or." } else { "or" };
            Ok(Some((name.to_string(), vec![ra, rs.clone(), rs])))
        }
        "li" => {
            check_arity(args, 2, line, mnemonic)?;
            Ok(Some(("addi".to_string(), vec![args[0].clone(), Argument::IntReg(0), args[1].clone()])))
        }
        "lis" => {
            check_arity(args, 2, line, mnemonic)?;
            Ok(Some(("addis".to_string(), vec![args[0].clone(), Argument::IntReg(0), args[1].clone()])))
        }
        "sub" | "subo" | "sub." | "subo." => {
            check_arity(args, 3, line, mnemonic)?;
            let rd = args[0].clone();
            let ra = args[1].clone();
            let rb = args[2].clone();
            let name = mnemonic.replacen("sub", "subf", 1);
            Ok(Some((name, vec![rd, rb, ra])))
        }
        "slwi" => {
            check_arity(args, 3, line, mnemonic)?;
            let sh = imm(args, 2, line)?;
            Ok(Some(("rlwinm".to_string(), rewrite_rlw(args[0].clone(), args[1].clone(), sh, 0, 31 - sh))))
        }
        "srwi" => {
            check_arity(args, 3, line, mnemonic)?;
            let sh = imm(args, 2, line)?;
            Ok(Some(("rlwinm".to_string(), rewrite_rlw(args[0].clone(), args[1].clone(), 32 - sh, sh, 31))))
        }
        "rotlwi" => {
            check_arity(args, 3, line, mnemonic)?;
            let sh = imm(args, 2, line)?;
            Ok(Some(("rlwinm".to_string(), rewrite_rlw(args[0].clone(), args[1].clone(), sh, 0, 31))))
        }
        "rotrwi" => {
            check_arity(args, 3, line, mnemonic)?;
            let sh = imm(args, 2, line)?;
            Ok(Some(("rlwinm".to_string(), rewrite_rlw(args[0].clone(), args[1].clone(), 32 - sh, 0, 31))))
        }
        "rotlw" => {
            check_arity(args, 3, line, mnemonic)?;
            let ra = args[0].clone();
            let rs = args[1].clone();
            let rb = args[2].clone();
            Ok(Some(("rlwnm".to_string(), vec![ra, rs, rb, Argument::Immediate(0), Argument::Immediate(31)])))
        }
        "extlwi" => {
            check_arity(args, 4, line, mnemonic)?;
            let n = imm(args, 2, line)?;
            let b = imm(args, 3, line)?;
            Ok(Some(("rlwinm".to_string(), rewrite_rlw(args[0].clone(), args[1].clone(), b, 0, n - 1))))
        }
        "extrwi" => {
            check_arity(args, 4, line, mnemonic)?;
            let n = imm(args, 2, line)?;
            let b = imm(args, 3, line)?;
            Ok(Some(("rlwinm".to_string(), rewrite_rlw(args[0].clone(), args[1].clone(), b + n, 32 - n, 31))))
        }
        "inslwi" => {
            check_arity(args, 4, line, mnemonic)?;
            let n = imm(args, 2, line)?;
            let b = imm(args, 3, line)?;
            Ok(Some(("rlwimi".to_string(), rewrite_rlw(args[0].clone(), args[1].clone(), 32 - b, b, b + n - 1))))
        }
        "insrwi" => {
            check_arity(args, 4, line, mnemonic)?;
            let n = imm(args, 2, line)?;
            let b = imm(args, 3, line)?;
            Ok(Some((
                "rlwimi".to_string(),
                rewrite_rlw(args[0].clone(), args[1].clone(), 32 - (b + n), b, b + n - 1),
            )))
        }
        "clrlwi" => {
            check_arity(args, 3, line, mnemonic)?;
            let n = imm(args, 2, line)?;
            Ok(Some(("rlwinm".to_string(), rewrite_rlw(args[0].clone(), args[1].clone(), 0, n, 31))))
        }
        "clrrwi" => {
            check_arity(args, 3, line, mnemonic)?;
            let n = imm(args, 2, line)?;
            Ok(Some(("rlwinm".to_string(), rewrite_rlw(args[0].clone(), args[1].clone(), 0, 0, 31 - n))))
        }
        "clrlslwi" => {
            check_arity(args, 4, line, mnemonic)?;
            let b = imm(args, 2, line)?;
            let n = imm(args, 3, line)?;
            Ok(Some((
                "rlwinm".to_string(),
                rewrite_rlw(args[0].clone(), args[1].clone(), n, b - n, 31 - n),
            )))
        }
        _ => {
            // `mfXXX`/`mtXXX` register-name shorthand (mflr, mtctr, mfxer,
            // mftbu, mfibat0u, mfsprgN, ...): strip the mf/mt prefix, look
            // the suffix up as an SPR (or TBR, for mftb/mftbu), and
            // rewrite onto the canonical `mfspr`/`mtspr`/`mftb` form.
            if let Some(suffix) = mnemonic.strip_prefix("mf") {
                if args.len() == 1 && (suffix == "tb" || suffix == "tbu") {
                    return Ok(Some((
                        "mftb".to_string(),
                        vec![args[0].clone(), Argument::BranchTarget(BranchTarget::Label(mnemonic.to_string()))],
                    )));
                }
                if args.len() == 1 && spr::spr_for_name(suffix).is_some() {
                    return Ok(Some((
                        "mfspr".to_string(),
                        vec![args[0].clone(), Argument::BranchTarget(BranchTarget::Label(suffix.to_string()))],
                    )));
                }
            } else if let Some(suffix) = mnemonic.strip_prefix("mt") {
                if args.len() == 1 && spr::spr_for_name(suffix).is_some() {
                    return Ok(Some((
                        "mtspr".to_string(),
                        vec![Argument::BranchTarget(BranchTarget::Label(suffix.to_string())), args[0].clone()],
                    )));
                }
            }
            Ok(None)
        }
    }
}

fn parse_branch_condition(mnemonic: &str) -> Option<(u8, u8, &'static str, bool, bool)> {
    // returns (bo, bi, kind: "bc"|"bclr"|"bcctr", link, abs)
    let (base, abs) = mnemonic.strip_suffix('a').map(|s| (s, true)).unwrap_or((mnemonic, false));
    let (base, link) = base.strip_suffix('l').map(|s| (s, true)).unwrap_or((base, false));
    let rest = base.strip_prefix('b')?;

    let (bo, bi, kind_rest) = if let Some(tail) = rest.strip_prefix("dnz") {
        (0x10, 0, tail)
    } else if let Some(tail) = rest.strip_prefix("dz") {
        (0x12, 3, tail)
    } else {
        let mut found = None;
        for &(name, bo, bi) in CANONICAL_CONDITIONS {
            if let Some(tail) = rest.strip_prefix(name) {
                found = Some((bo, bi, tail));
                break;
            }
        }
        found?
    };
    let kind = match kind_rest {
        "" => "bc",
        "lr" => "bclr",
        "ctr" => "bcctr",
        _ => return None,
    };
    Some((bo, bi, kind, link, abs))
}

/// Encodes one assembly-language instruction line into a big-endian word.
pub fn encode_instruction(mnemonic: &str, args: &[Argument], ctx: &EncodeContext) -> Result<u32, AsmError> {
    if let Some((new_mnemonic, new_args)) = rewrite_synthetic(mnemonic, args, ctx.line)? {
        return encode_instruction(&new_mnemonic, &new_args, ctx);
    }

    // Unconditional branch family.
    if matches!(mnemonic, "b" | "bl" | "ba" | "bla") {
        check_arity(args, 1, ctx.line, mnemonic)?;
        let link = mnemonic.contains('l') && mnemonic != "ba";
        let abs = mnemonic.ends_with('a');
        let delta = resolve_branch_value(&args[0], ctx, ctx.line)?;
        return encode_b(delta, link, abs, ctx.line);
    }

    // Canonical and generic conditional branches.
    if let Some((bo, bi, kind, link, abs)) = parse_branch_condition(mnemonic) {
        return match kind {
            "bc" => {
                check_arity(args, 1, ctx.line, mnemonic)?;
                let delta = resolve_branch_value(&args[0], ctx, ctx.line)?;
                encode_bc(bo, bi, delta, link, abs, ctx.line)
            }
            "bclr" => {
                check_arity(args, 0, ctx.line, mnemonic)?;
                encode_bclr(bo, bi, link)
            }
            "bcctr" => {
                check_arity(args, 0, ctx.line, mnemonic)?;
                encode_bcctr(bo, bi, link)
            }
            _ => unreachable!(),
        };
    }
    if matches!(mnemonic, "bc" | "bcl" | "bca" | "bcla") {
        check_arity(args, 3, ctx.line, mnemonic)?;
        let bo = imm(args, 0, ctx.line)? as u8;
        let bi = imm(args, 1, ctx.line)? as u8;
        let link = matches!(mnemonic, "bcl" | "bcla");
        let abs = matches!(mnemonic, "bca" | "bcla");
        let delta = resolve_branch_value(&args[2], ctx, ctx.line)?;
        return encode_bc(bo, bi, delta, link, abs, ctx.line);
    }
    if matches!(mnemonic, "bclr" | "bclrl") {
        check_arity(args, 2, ctx.line, mnemonic)?;
        let bo = imm(args, 0, ctx.line)? as u8;
        let bi = imm(args, 1, ctx.line)? as u8;
        return encode_bclr(bo, bi, mnemonic.ends_with('l'));
    }
    if matches!(mnemonic, "bcctr" | "bcctrl") {
        check_arity(args, 2, ctx.line, mnemonic)?;
        let bo = imm(args, 0, ctx.line)? as u8;
        let bi = imm(args, 1, ctx.line)? as u8;
        return encode_bcctr(bo, bi, mnemonic.ends_with('l'));
    }

    let (after_rec, rec) = strip_rec(mnemonic);
    let (base, oe) = strip_oe(after_rec);

    macro_rules! alu3 {
        ($name:expr, $sub:expr) => {
            if base == $name {
                check_arity(args, 3, ctx.line, mnemonic)?;
                let rd = gpr(args, 0, ctx.line)?;
                let ra = gpr(args, 1, ctx.line)?;
                let rb = gpr(args, 2, ctx.line)?;
                return encode_x(31, $sub, rd, ra, rb, oe, rec);
            }
        };
    }
    macro_rules! alu2 {
        ($name:expr, $sub:expr) => {
            if base == $name {
                check_arity(args, 2, ctx.line, mnemonic)?;
                let rd = gpr(args, 0, ctx.line)?;
                let ra = gpr(args, 1, ctx.line)?;
                return encode_x_unary(31, $sub, rd, ra, oe, rec);
            }
        };
    }
    macro_rules! logical3 {
        ($name:expr, $sub:expr) => {
            if base == $name {
                check_arity(args, 3, ctx.line, mnemonic)?;
                let ra = gpr(args, 0, ctx.line)?;
                let rs = gpr(args, 1, ctx.line)?;
                let rb = gpr(args, 2, ctx.line)?;
                return encode_x(31, $sub, rs, ra, rb, false, rec);
            }
        };
    }
    macro_rules! logical_unary {
        ($name:expr, $sub:expr) => {
            if base == $name {
                check_arity(args, 2, ctx.line, mnemonic)?;
                let ra = gpr(args, 0, ctx.line)?;
                let rs = gpr(args, 1, ctx.line)?;
                return encode_x_unary(31, $sub, rs, ra, false, rec);
            }
        };
    }

    alu3!("add", 266);
    alu3!("addc", 10);
    alu3!("adde", 138);
    alu3!("subf", 40);
    alu3!("subfc", 8);
    alu3!("subfe", 136);
    alu3!("mullw", 235);
    alu3!("divw", 491);
    alu3!("divwu", 459);
    alu2!("addze", 202);
    alu2!("addme", 234);
    alu2!("subfze", 200);
    alu2!("subfme", 232);
    alu2!("neg", 104);
    logical3!("and", 28);
    logical3!("andc", 60);
    logical3!("or", 444);
    logical3!("orc", 412);
    logical3!("xor", 316);
    logical3!("nand", 476);
    logical3!("nor", 124);
    logical3!("eqv", 284);
    logical_unary!("cntlzw", 26);
    logical_unary!("extsb", 954);
    logical_unary!("extsh", 922);

    if base == "slw" || base == "srw" || base == "sraw" {
        check_arity(args, 3, ctx.line, mnemonic)?;
        let sub = match base {
            "slw" => 24,
            "srw" => 536,
            _ => 792,
        };
        let rd = gpr(args, 0, ctx.line)?;
        let ra = gpr(args, 1, ctx.line)?;
        let rb = gpr(args, 2, ctx.line)?;
        return encode_x(31, sub, rd, ra, rb, false, rec);
    }
    if base == "srawi" {
        check_arity(args, 3, ctx.line, mnemonic)?;
        let rd = gpr(args, 0, ctx.line)?;
        let ra = gpr(args, 1, ctx.line)?;
        let sh = imm(args, 2, ctx.line)? as u8;
        return encode_x(31, 824, rd, ra, sh, false, rec);
    }

    if base == "addi" {
        check_arity(args, 3, ctx.line, mnemonic)?;
        return encode_d(14, gpr(args, 0, ctx.line)?, gpr(args, 1, ctx.line)?, imm(args, 2, ctx.line)? as i32);
    }
    if base == "addis" {
        check_arity(args, 3, ctx.line, mnemonic)?;
        return encode_d(15, gpr(args, 0, ctx.line)?, gpr(args, 1, ctx.line)?, imm(args, 2, ctx.line)? as i32);
    }
    if base == "addic" {
        check_arity(args, 3, ctx.line, mnemonic)?;
        let primary = if rec { 13 } else { 12 };
        return encode_d(primary, gpr(args, 0, ctx.line)?, gpr(args, 1, ctx.line)?, imm(args, 2, ctx.line)? as i32);
    }
    if base == "subfic" {
        check_arity(args, 3, ctx.line, mnemonic)?;
        return encode_d(8, gpr(args, 0, ctx.line)?, gpr(args, 1, ctx.line)?, imm(args, 2, ctx.line)? as i32);
    }
    if base == "mulli" {
        check_arity(args, 3, ctx.line, mnemonic)?;
        return encode_d(7, gpr(args, 0, ctx.line)?, gpr(args, 1, ctx.line)?, imm(args, 2, ctx.line)? as i32);
    }

    if matches!(base, "andi" | "andis" | "ori" | "oris" | "xori" | "xoris") {
        check_arity(args, 3, ctx.line, mnemonic)?;
        let ra = gpr(args, 0, ctx.line)?;
        let rs = gpr(args, 1, ctx.line)?;
        let value = imm(args, 2, ctx.line)? as u16;
        let primary = match base {
            "andi" => 28,
            "andis" => 29,
            "ori" => 24,
            "oris" => 25,
            "xori" => 26,
            _ => 27,
        };
        return encode_d_unsigned(primary, rs, ra, value);
    }

    if matches!(base, "rlwimi" | "rlwinm") {
        check_arity(args, 5, ctx.line, mnemonic)?;
        let ra = gpr(args, 0, ctx.line)?;
        let rs = gpr(args, 1, ctx.line)?;
        let sh = imm(args, 2, ctx.line)? as u8;
        let mb = imm(args, 3, ctx.line)? as u8;
        let me = imm(args, 4, ctx.line)? as u8;
        let primary = if base == "rlwimi" { 20 } else { 21 };
        return encode_m_form(rs, ra, sh, mb, me, primary, rec);
    }
    if base == "rlwnm" {
        check_arity(args, 5, ctx.line, mnemonic)?;
        let ra = gpr(args, 0, ctx.line)?;
        let rs = gpr(args, 1, ctx.line)?;
        let rb = gpr(args, 2, ctx.line)?;
        let mb = imm(args, 3, ctx.line)? as u8;
        let me = imm(args, 4, ctx.line)? as u8;
        return Ok(encode_op(23).map_err(range_err)?
            | encode_reg1(rs).map_err(range_err)?
            | encode_reg2(ra).map_err(range_err)?
            | encode_reg3(rb).map_err(range_err)?
            | encode_reg4(mb).map_err(range_err)?
            | encode_reg5(me).map_err(range_err)?
            | encode_rec(rec));
    }

    if matches!(base, "cmp" | "cmpl" | "cmpw" | "cmplw" | "cmpwi" | "cmplwi" | "cmpi" | "cmpli") {
        return encode_compare(base, args, ctx.line);
    }

    if matches!(base, "tw") {
        check_arity(args, 3, ctx.line, mnemonic)?;
        let to = imm(args, 0, ctx.line)? as u8;
        let ra = gpr(args, 1, ctx.line)?;
        let rb = gpr(args, 2, ctx.line)?;
        return encode_x(31, 4, to, ra, rb, false, false);
    }
    if matches!(base, "twi") {
        check_arity(args, 3, ctx.line, mnemonic)?;
        let to = imm(args, 0, ctx.line)? as u8;
        let ra = gpr(args, 1, ctx.line)?;
        let value = imm(args, 2, ctx.line)? as i32;
        return encode_d(3, to, ra, value);
    }

    if matches!(base, "mcrf") {
        check_arity(args, 2, ctx.line, mnemonic)?;
        let bf = cond_field(args, 0, ctx.line)?;
        let bfa = cond_field(args, 1, ctx.line)?;
        return Ok(encode_op(19).map_err(range_err)?
            | encode_reg1(bf << 2).map_err(range_err)?
            | encode_reg2(bfa << 2).map_err(range_err)?
            | encode_subopcode(0).map_err(range_err)?);
    }
    if let Some(sub) = match base {
        "crand" => Some(257),
        "cror" => Some(449),
        "crxor" => Some(193),
        "crnand" => Some(225),
        "crnor" => Some(33),
        "crandc" => Some(129),
        "crorc" => Some(417),
        "creqv" => Some(289),
        _ => None,
    } {
        check_arity(args, 3, ctx.line, mnemonic)?;
        let bt = cond_bit(args, 0, ctx.line)?;
        let ba = cond_bit(args, 1, ctx.line)?;
        let bb = cond_bit(args, 2, ctx.line)?;
        return encode_x(19, sub, bt, ba, bb, false, false);
    }

    if matches!(base, "lwz" | "lbz" | "lha" | "lhz" | "stb" | "sth" | "stw" | "lwzu" | "lbzu" | "lhau" | "lhzu" | "stbu" | "sthu" | "stwu" | "lfs" | "lfsu" | "lfd" | "lfdu" | "stfs" | "stfsu" | "stfd" | "stfdu") {
        check_arity(args, 2, ctx.line, mnemonic)?;
        let is_float = matches!(base, "lfs" | "lfsu" | "lfd" | "lfdu" | "stfs" | "stfsu" | "stfd" | "stfdu");
        let rd = if is_float { fpreg(args, 0, ctx.line)? } else { gpr(args, 0, ctx.line)? };
        let (base_reg, disp) = mem_ref_imm(args, 1, ctx.line)?;
        let primary = match base {
            "lwz" => 32,
            "lwzu" => 33,
            "lbz" => 34,
            "lbzu" => 35,
            "stw" => 36,
            "stwu" => 37,
            "stb" => 38,
            "stbu" => 39,
            "lhz" => 40,
            "lhzu" => 41,
            "lha" => 42,
            "lhau" => 43,
            "sth" => 44,
            "sthu" => 45,
            "lfs" => 48,
            "lfsu" => 49,
            "lfd" => 50,
            "lfdu" => 51,
            "stfs" => 52,
            "stfsu" => 53,
            "stfd" => 54,
            "stfdu" => 55,
            _ => unreachable!(),
        };
        return encode_mem_d(primary, rd, base_reg, disp);
    }

    if let Some(sub) = indexed_mem_subopcode(base) {
        check_arity(args, 2, ctx.line, mnemonic)?;
        let is_float = matches!(base, "lfsx" | "lfsux" | "lfdx" | "lfdux" | "stfsx" | "stfsux" | "stfdx" | "stfdux" | "stfiwx");
        let rd = if is_float { fpreg(args, 0, ctx.line)? } else { gpr(args, 0, ctx.line)? };
        let (base_reg, index) = mem_ref_indexed(args, 1, ctx.line)?;
        return encode_mem_x(31, sub, rd, base_reg, index);
    }

    if matches!(base, "lmw" | "stmw") {
        check_arity(args, 2, ctx.line, mnemonic)?;
        let rd = gpr(args, 0, ctx.line)?;
        let (base_reg, disp) = mem_ref_imm(args, 1, ctx.line)?;
        let primary = if base == "lmw" { 46 } else { 47 };
        return encode_mem_d(primary, rd, base_reg, disp);
    }
    if matches!(base, "lswi" | "stswi") {
        check_arity(args, 3, ctx.line, mnemonic)?;
        let rd = gpr(args, 0, ctx.line)?;
        let ra = gpr(args, 1, ctx.line)?;
        let nb = imm(args, 2, ctx.line)? as u8;
        let sub = if base == "lswi" { 597 } else { 725 };
        return encode_x(31, sub, rd, ra, nb, false, false);
    }

    if base == "mfspr" || base == "mtspr" {
        check_arity(args, 2, ctx.line, mnemonic)?;
        let (reg_idx, spr_idx) = if base == "mfspr" { (0, 1) } else { (1, 0) };
        let reg = gpr(args, reg_idx, ctx.line)?;
        let spr_num = resolve_spr(&args[spr_idx], ctx.line)?;
        let sub = if base == "mfspr" { 339 } else { 467 };
        return Ok(encode_op(31).map_err(range_err)?
            | encode_reg1(reg).map_err(range_err)?
            | encode_spr(spr_num).map_err(range_err)?
            | encode_subopcode(sub).map_err(range_err)?);
    }
    if base == "mftb" {
        check_arity(args, 2, ctx.line, mnemonic)?;
        let reg = gpr(args, 0, ctx.line)?;
        let tbr_val = resolve_tbr(&args[1], ctx.line)?;
        return Ok(encode_op(31).map_err(range_err)?
            | encode_reg1(reg).map_err(range_err)?
            | encode_spr(tbr_val).map_err(range_err)?
            | encode_subopcode(371).map_err(range_err)?);
    }

    if matches!(
        base,
        "sync" | "isync" | "eieio" | "tlbsync" | "sc" | "rfi"
    ) {
        check_arity(args, 0, ctx.line, mnemonic)?;
        let (primary, sub): (u32, u32) = match base {
            "sync" => (31, 598),
            "isync" => (19, 150),
            "eieio" => (31, 854),
            "tlbsync" => (31, 566),
            "sc" => return Ok(encode_op(17).map_err(range_err)? | 2),
            "rfi" => (19, 50),
            _ => unreachable!(),
        };
        return Ok(encode_op(primary).map_err(range_err)? | encode_subopcode(sub).map_err(range_err)?);
    }

    if let Some(sub) = match base {
        "dcbst" => Some(54),
        "dcbf" => Some(86),
        "dcbt" => Some(278),
        "dcbtst" => Some(246),
        "icbi" => Some(982),
        "dcbi" => Some(470),
        "dcba" => Some(758),
        "dcbz" => Some(1014),
        "tlbie" => Some(306),
        _ => None,
    } {
        check_arity(args, 1, ctx.line, mnemonic)?;
        let (ra, rb) = mem_ref_indexed(args, 0, ctx.line)?;
        return encode_x(31, sub, 0, ra, rb, false, false);
    }
    if base == "tlbia" {
        check_arity(args, 0, ctx.line, mnemonic)?;
        return encode_x(31, 370, 0, 0, 0, false, false);
    }
    if base == "mcrxr" {
        check_arity(args, 1, ctx.line, mnemonic)?;
        let bf = cond_field(args, 0, ctx.line)?;
        return encode_x(31, 512, bf << 2, 0, 0, false, false);
    }
    if base == "stwcx" && rec {
        check_arity(args, 2, ctx.line, mnemonic)?;
        let rs = gpr(args, 0, ctx.line)?;
        let (ra, rb) = mem_ref_indexed(args, 1, ctx.line)?;
        return encode_x(31, 150, rs, ra, rb, false, true);
    }
    if matches!(base, "mfmsr" | "mtmsr") {
        check_arity(args, 1, ctx.line, mnemonic)?;
        let reg = gpr(args, 0, ctx.line)?;
        let sub = if base == "mfmsr" { 83 } else { 146 };
        return encode_x_unary(31, sub, reg, 0, false, false);
    }
    if matches!(base, "mfsr" | "mtsr") {
        check_arity(args, 2, ctx.line, mnemonic)?;
        let (reg_idx, sr_idx) = if base == "mfsr" { (0, 1) } else { (1, 0) };
        let reg = gpr(args, reg_idx, ctx.line)?;
        let sr = imm(args, sr_idx, ctx.line)? as u8;
        let sub = if base == "mfsr" { 595 } else { 210 };
        return encode_x(31, sub, reg, sr, 0, false, false);
    }
    if matches!(base, "mfsrin" | "mtsrin") {
        check_arity(args, 2, ctx.line, mnemonic)?;
        let reg = gpr(args, 0, ctx.line)?;
        let rb = gpr(args, 1, ctx.line)?;
        let sub = if base == "mfsrin" { 659 } else { 242 };
        return encode_x(31, sub, reg, 0, rb, false, false);
    }
    if base == "mfcr" {
        check_arity(args, 1, ctx.line, mnemonic)?;
        let rd = gpr(args, 0, ctx.line)?;
        return encode_x_unary(31, 19, rd, 0, false, false);
    }
    if base == "mtcrf" {
        check_arity(args, 2, ctx.line, mnemonic)?;
        let crm = imm(args, 0, ctx.line)? as u32;
        let rs = gpr(args, 1, ctx.line)?;
        return Ok(encode_op(31).map_err(range_err)?
            | encode_reg1(rs).map_err(range_err)?
            | ((crm & 0xFF) << 12)
            | encode_subopcode(144).map_err(range_err)?);
    }

    Err(parse_err(ctx.line, format!("unrecognised mnemonic `{mnemonic}`")))
}

fn indexed_mem_subopcode(base: &str) -> Option<u32> {
    Some(match base {
        "lwzx" => 23,
        "lwzux" => 55,
        "lbzx" => 87,
        "lbzux" => 119,
        "lhzx" => 279,
        "lhzux" => 311,
        "lhax" => 343,
        "lhaux" => 375,
        "stwx" => 151,
        "stwux" => 183,
        "stbx" => 215,
        "stbux" => 247,
        "sthx" => 407,
        "sthux" => 439,
        "lfsx" => 535,
        "lfsux" => 567,
        "lfdx" => 599,
        "lfdux" => 631,
        "stfsx" => 663,
        "stfsux" => 695,
        "stfdx" => 727,
        "stfdux" => 759,
        "stfiwx" => 983,
        "lwarx" => 20,
        _ => return None,
    })
}

fn resolve_spr(arg: &Argument, line: usize) -> Result<u16, AsmError> {
    if let Some(n) = arg.as_spr() {
        return Ok(n);
    }
    if let Argument::BranchTarget(BranchTarget::Label(name)) = arg {
        if let Some(n) = spr_number(name) {
            return Ok(n);
        }
    }
    Err(parse_err(line, "expected a special-purpose register name or number"))
}

fn resolve_tbr(arg: &Argument, line: usize) -> Result<u16, AsmError> {
    if let Some(n) = arg.as_tbr() {
        return Ok(n);
    }
    if let Argument::BranchTarget(BranchTarget::Label(name)) = arg {
        if let Some(n) = tbr_number(name) {
            return Ok(n);
        }
    }
    Err(parse_err(line, "expected `tbl` or `tbu`"))
}

fn encode_compare(base: &str, args: &[Argument], line: usize) -> Result<u32, AsmError> {
    let (bf, rest) = if args.len() == 3 || args.len() == 2 {
        if let Some(field) = args[0].as_cond_field() {
            (field, &args[1..])
        } else {
            (0, args)
        }
    } else {
        (0, args)
    };
    let is_long_imm = matches!(base, "cmpi" | "cmpli" | "cmpwi" | "cmplwi");
    let is_unsigned = matches!(base, "cmpl" | "cmplw" | "cmpli" | "cmplwi");
    if is_long_imm {
        check_arity(rest, 2, line, base)?;
        let ra = gpr(rest, 0, line)?;
        let value = imm(rest, 1, line)?;
        let primary = if is_unsigned { 10 } else { 11 };
        return encode_d(primary, bf << 2, ra, value as i32);
    }
    check_arity(rest, 2, line, base)?;
    let ra = gpr(rest, 0, line)?;
    let rb = gpr(rest, 1, line)?;
    let sub = if is_unsigned { 32 } else { 0 };
    encode_x(31, sub, bf << 2, ra, rb, false, false)
}
