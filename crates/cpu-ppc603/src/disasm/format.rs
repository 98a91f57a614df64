//! Per-opcode text formatting: turns `(Op, word, address)` into one output
//! line, folding conditional branches and the handful of synthetic
//! mnemonics (`nop`, `mr`, `li`, `lis`) the way the assembler's encoder
//! table expects to see them again on a round trip.

use crate::bitfield::*;
use crate::opcode::{Form, Op};
use crate::spr;

const MNEMONIC_COLUMN: usize = 10;

fn pad_mnemonic(mnemonic: &str) -> String {
    if mnemonic.len() >= MNEMONIC_COLUMN {
        format!("{mnemonic} ")
    } else {
        format!("{mnemonic:<MNEMONIC_COLUMN$}")
    }
}

fn gpr(n: u8) -> String {
    format!("r{n}")
}

fn fpr(n: u8) -> String {
    format!("f{n}")
}

fn crf(n: u8) -> String {
    format!("cr{n}")
}

fn crb(n: u8) -> String {
    format!("crb{n}")
}

fn signed_hex(value: i32) -> String {
    if value < 0 {
        format!("-0x{:X}", -(value as i64))
    } else {
        format!("0x{value:X}")
    }
}

fn mem_ref(base: u8, disp: i32) -> String {
    if disp == 0 {
        format!("[{}]", gpr(base))
    } else if disp > 0 {
        format!("[{} + 0x{:X}]", gpr(base), disp)
    } else {
        format!("[{} - 0x{:X}]", gpr(base), -(disp as i64))
    }
}

fn mem_ref_indexed(base: u8, index: u8, updates: bool) -> String {
    if updates {
        format!("[({}) + {}]", gpr(base), gpr(index))
    } else {
        format!("[{} + {}]", gpr(base), gpr(index))
    }
}

fn import_comment(base: u8, disp: i32, import_names: &[String]) -> String {
    if base != 2 {
        return String::new();
    }
    let n = (disp as i64 + 0x8000) / 4;
    if n < 0 {
        return String::new();
    }
    match import_names.get(n as usize) {
        Some(name) => format!(" /* import {n} => {name} */"),
        None => String::new(),
    }
}

/// Canonical branch mnemonic folded from BO/BI, per the classic simplified
/// conditional-branch table. Returns `None` when BO/BI don't match any
/// canonical form (falls back to the generic `bc`/`bclr`/`bcctr`).
fn canonical_branch_suffix(bo: u8, bi: u8) -> Option<&'static str> {
    let bi_low2 = bi & 0x3;
    match (bo, bi_low2) {
        (0x04, 0) => Some("ge"),
        (0x04, 1) => Some("le"),
        (0x04, 2) => Some("ne"),
        (0x04, 3) => Some("ns"),
        (0x0C, 0) => Some("lt"),
        (0x0C, 1) => Some("gt"),
        (0x0C, 2) => Some("eq"),
        (0x0C, 3) => Some("so"),
        _ => match bo {
            0x10 => Some("dnz"),
            0x14 => Some(""),
            _ => {
                if bo == 0x12 && bi_low2 == 3 {
                    Some("dz")
                } else {
                    None
                }
            }
        },
    }
}

fn branch_mnemonic(base: &str, bo: u8, bi: u8, link: bool, abs: bool) -> (String, bool) {
    match canonical_branch_suffix(bo, bi) {
        Some(suffix) => {
            let mut text = format!("b{suffix}");
            if base == "bclr" {
                text.push_str("lr");
            } else if base == "bcctr" {
                text.push_str("ctr");
            }
            if link {
                text.push('l');
            }
            if abs {
                text.push('a');
            }
            (text, true)
        }
        None => {
            let mut text = base.to_string();
            if link {
                text.push('l');
            }
            if abs {
                text.push('a');
            }
            (text, false)
        }
    }
}

/// Computes the absolute branch target for a `b`/`bc`-family instruction,
/// and whether it is a call (link form), for label synthesis.
pub fn branch_target(op: Op, word: u32, address: u32) -> Option<(u32, bool)> {
    match op {
        Op::B => {
            let target_field = get_b_target(word);
            let abs = get_b_abs(word);
            let link = get_b_link(word);
            let target = if abs {
                target_field as u32
            } else {
                address.wrapping_add(target_field as u32)
            };
            Some((target, link))
        }
        Op::Bc => {
            let disp = get_imm_ext(word) & !0x3;
            let abs = get_b_abs(word);
            let link = get_b_link(word);
            let target = if abs {
                disp as u32
            } else {
                address.wrapping_add(disp as u32)
            };
            Some((target, link))
        }
        _ => None,
    }
}

pub fn format_instruction(op: Op, word: u32, address: u32, import_names: &[String]) -> String {
    let body = format_body(op, word, address, import_names);
    format!("{address:08X}  {word:08X}  {body}")
}

fn format_body(op: Op, word: u32, address: u32, import_names: &[String]) -> String {
    if op == Op::Invalid {
        return format!("{}{word:08X}", pad_mnemonic(".invalid"));
    }

    // --- Synthetic mnemonics recognised on the way out, so a round trip
    // through the assembler's encoder table lands on the same text. ---
    if op == Op::Ori && get_reg1(word) == 0 && get_reg2(word) == 0 && get_imm(word) == 0 {
        return pad_mnemonic("nop");
    }
    if op == Op::Or && !get_rec(word) && get_reg1(word) == get_reg3(word) {
        return format!("{}{}, {}", pad_mnemonic("mr"), gpr(get_reg2(word)), gpr(get_reg1(word)));
    }
    if op == Op::Addi && get_reg2(word) == 0 {
        return format!(
            "{}{}, {}",
            pad_mnemonic("li"),
            gpr(get_reg1(word)),
            signed_hex(get_imm_ext(word))
        );
    }
    if op == Op::Addis && get_reg2(word) == 0 {
        return format!(
            "{}{}, {}",
            pad_mnemonic("lis"),
            gpr(get_reg1(word)),
            signed_hex(get_imm_ext(word))
        );
    }
    if matches!(op, Op::Cmpi | Op::Cmpli) && get_reg1(word) >> 2 == 0 {
        let mnemonic = if op == Op::Cmpi { "cmpwi" } else { "cmplwi" };
        let ra = (get_reg1(word) >> 1) & 0xF; // BF field shares reg1 position; rA is reg2
        let _ = ra;
        return format!(
            "{}{}, {}",
            pad_mnemonic(mnemonic),
            gpr(get_reg2(word)),
            signed_hex(get_imm_ext(word))
        );
    }

    use Form::*;
    match op.form() {
        X => format_x(op, word),
        DLogical => format_d_logical(op, word),
        XUnary => format_x_unary(op, word),
        D => format_d(op, word),
        DMem => format_d_mem(op, word, import_names),
        MForm => format_m_form(op, word),
        MFormReg => format_m_form_reg(op, word),
        IForm => format_i_form(op, word, address),
        BForm => format_b_form(op, word, address),
        XlBranch => format_xl_branch(op, word),
        XlCr => format_xl_cr(op, word),
        XlMcrf => format_xl_mcrf(word),
        Spr => format_spr(op, word),
        Tbr => format_tbr(word),
        NoArgs => pad_mnemonic(with_rec_suffix(op, word)),
        Misc => format_misc(op, word),
        DMemMulti => format_d_mem_multi(op, word),
        XCache => format_x_cache(op, word),
        Trap => format_trap(op, word),
    }
}

fn with_rec_suffix(op: Op, word: u32) -> &'static str {
    // Only a handful of ops carry a meaningful rec/oe bit; opcode.rs already
    // bakes `.`/`.`-bearing variants into distinct mnemonics where the
    // encoding calls for one (andi., andis., stwcx.).
    let _ = word;
    op.mnemonic()
}

fn mnemonic_with_suffixes(op: Op, word: u32, has_oe: bool) -> String {
    let mut text = op.mnemonic().to_string();
    if has_oe && get_o(word) {
        text.push('o');
    }
    if get_rec(word) && !text.ends_with('.') {
        text.push('.');
    }
    text
}

fn is_oe_capable(op: Op) -> bool {
    matches!(
        op,
        Op::Add
            | Op::Addc
            | Op::Adde
            | Op::Addze
            | Op::Addme
            | Op::Subf
            | Op::Subfc
            | Op::Subfe
            | Op::Subfze
            | Op::Subfme
            | Op::Neg
            | Op::Mullw
            | Op::Divw
            | Op::Divwu
    )
}

fn format_x(op: Op, word: u32) -> String {
    let rd = get_reg1(word);
    let ra = get_reg2(word);
    let rb = get_reg3(word);
    let mnemonic = mnemonic_with_suffixes(op, word, is_oe_capable(op));
    match op {
        Op::Cmp | Op::Cmpl => {
            let bf = rd >> 2;
            let text = if op == Op::Cmp { "cmpw" } else { "cmplw" };
            if bf == 0 {
                format!("{}{}, {}", pad_mnemonic(text), gpr(ra), gpr(rb))
            } else {
                format!("{}{}, {}, {}", pad_mnemonic(text), crf(bf), gpr(ra), gpr(rb))
            }
        }
        Op::Lwzx | Op::Lbzx | Op::Lhzx | Op::Lhax | Op::Lwarx | Op::Lswx | Op::Lwbrx => {
            format!("{}{}, {}", pad_mnemonic(&mnemonic), gpr(rd), mem_ref_indexed(ra, rb, false))
        }
        Op::Lwzux | Op::Lbzux | Op::Lhzux | Op::Lhaux => {
            format!("{}{}, {}", pad_mnemonic(&mnemonic), gpr(rd), mem_ref_indexed(ra, rb, true))
        }
        Op::Stwx | Op::Stbx | Op::Sthx | Op::Stswx | Op::Stwbrx | Op::Eciwx | Op::Ecowx => {
            format!("{}{}, {}", pad_mnemonic(&mnemonic), gpr(rd), mem_ref_indexed(ra, rb, false))
        }
        Op::Stwux | Op::Stbux | Op::Sthux => {
            format!("{}{}, {}", pad_mnemonic(&mnemonic), gpr(rd), mem_ref_indexed(ra, rb, true))
        }
        Op::Lfsx | Op::Lfdx => {
            format!("{}{}, {}", pad_mnemonic(&mnemonic), fpr(rd), mem_ref_indexed(ra, rb, false))
        }
        Op::Lfsux | Op::Lfdux => {
            format!("{}{}, {}", pad_mnemonic(&mnemonic), fpr(rd), mem_ref_indexed(ra, rb, true))
        }
        Op::Stfsx | Op::Stfdx | Op::Stfiwx => {
            format!("{}{}, {}", pad_mnemonic(&mnemonic), fpr(rd), mem_ref_indexed(ra, rb, false))
        }
        Op::Stfsux | Op::Stfdux => {
            format!("{}{}, {}", pad_mnemonic(&mnemonic), fpr(rd), mem_ref_indexed(ra, rb, true))
        }
        Op::Fadd | Op::Fsub | Op::Fmul | Op::Fdiv => {
            format!("{}{}, {}, {}", pad_mnemonic(&mnemonic), fpr(rd), fpr(ra), fpr(rb))
        }
        Op::Fcmpo | Op::Fcmpu => {
            let bf = rd >> 2;
            format!("{}{}, {}, {}", pad_mnemonic(&mnemonic), crf(bf), fpr(ra), fpr(rb))
        }
        _ => format!("{}{}, {}, {}", pad_mnemonic(&mnemonic), gpr(rd), gpr(ra), gpr(rb)),
    }
}

fn format_d_logical(op: Op, word: u32) -> String {
    let rs = get_reg1(word);
    let ra = get_reg2(word);
    let imm = get_imm(word);
    format!("{}{}, {}, 0x{:X}", pad_mnemonic(op.mnemonic()), gpr(ra), gpr(rs), imm)
}

fn format_x_unary(op: Op, word: u32) -> String {
    let rd = get_reg1(word);
    let ra = get_reg2(word);
    let mnemonic = mnemonic_with_suffixes(op, word, is_oe_capable(op));
    match op {
        Op::Srawi => format!(
            "{}{}, {}, {}",
            pad_mnemonic(&mnemonic),
            gpr(rd),
            gpr(ra),
            get_reg3(word)
        ),
        Op::Fabs | Op::Fneg | Op::Fmr | Op::Fctiw | Op::Fctiwz | Op::Frsp => {
            format!("{}{}, {}", pad_mnemonic(&mnemonic), fpr(rd), fpr(ra))
        }
        // cntlzw/extsb/extsh/neg/addze/addme/subfze/subfme: rA holds the source, rD the dest.
        Op::Addze | Op::Addme | Op::Subfze | Op::Subfme | Op::Neg => {
            format!("{}{}, {}", pad_mnemonic(&mnemonic), gpr(rd), gpr(ra))
        }
        _ => format!("{}{}, {}", pad_mnemonic(&mnemonic), gpr(ra), gpr(rd)),
    }
}

fn format_d(op: Op, word: u32) -> String {
    let rd = get_reg1(word);
    let ra = get_reg2(word);
    let imm = get_imm_ext(word);
    let mnemonic = mnemonic_with_suffixes(op, word, false);
    match op {
        Op::Cmpi | Op::Cmpli => {
            let bf = rd >> 2;
            let text = if op == Op::Cmpi { "cmpwi" } else { "cmplwi" };
            if bf == 0 {
                format!("{}{}, {}", pad_mnemonic(text), gpr(ra), signed_hex(imm))
            } else {
                format!("{}{}, {}, {}", pad_mnemonic(text), crf(bf), gpr(ra), signed_hex(imm))
            }
        }
        _ => format!("{}{}, {}, {}", pad_mnemonic(&mnemonic), gpr(rd), gpr(ra), signed_hex(imm)),
    }
}

fn format_d_mem(op: Op, word: u32, import_names: &[String]) -> String {
    let rd = get_reg1(word);
    let ra = get_reg2(word);
    let disp = get_imm_ext(word);
    let comment = import_comment(ra, disp, import_names);
    let is_float = matches!(
        op,
        Op::Lfs | Op::Lfsu | Op::Lfd | Op::Lfdu | Op::Stfs | Op::Stfsu | Op::Stfd | Op::Stfdu
    );
    let reg_text = if is_float { fpr(rd) } else { gpr(rd) };
    format!(
        "{}{}, {}{}",
        pad_mnemonic(op.mnemonic()),
        reg_text,
        mem_ref(ra, disp),
        comment
    )
}

fn format_d_mem_multi(op: Op, word: u32) -> String {
    let rd = get_reg1(word);
    let ra = get_reg2(word);
    match op {
        Op::Lmw | Op::Stmw => {
            let disp = get_imm_ext(word);
            format!("{}{}, {}", pad_mnemonic(op.mnemonic()), gpr(rd), mem_ref(ra, disp))
        }
        Op::Lswi | Op::Stswi => {
            let nb = get_reg3(word);
            format!("{}{}, {}, {}", pad_mnemonic(op.mnemonic()), gpr(rd), gpr(ra), nb)
        }
        _ => unreachable!("DMemMulti form restricted to lmw/stmw/lswi/stswi"),
    }
}

fn format_m_form(op: Op, word: u32) -> String {
    let rs = get_reg1(word);
    let ra = get_reg2(word);
    let sh = get_reg3(word);
    let mb = get_reg4(word);
    let me = get_reg5(word);
    let mnemonic = mnemonic_with_suffixes(op, word, false);
    format!(
        "{}{}, {}, {}, {}, {}",
        pad_mnemonic(&mnemonic),
        gpr(ra),
        gpr(rs),
        sh,
        mb,
        me
    )
}

fn format_m_form_reg(op: Op, word: u32) -> String {
    let rs = get_reg1(word);
    let ra = get_reg2(word);
    let rb = get_reg3(word);
    let mb = get_reg4(word);
    let me = get_reg5(word);
    let mnemonic = mnemonic_with_suffixes(op, word, false);
    format!(
        "{}{}, {}, {}, {}, {}",
        pad_mnemonic(&mnemonic),
        gpr(ra),
        gpr(rs),
        gpr(rb),
        mb,
        me
    )
}

fn format_i_form(op: Op, word: u32, address: u32) -> String {
    let link = get_b_link(word);
    let abs_bit = get_b_abs(word);
    let mut mnemonic = op.mnemonic().to_string();
    if link {
        mnemonic.push('l');
    }
    if abs_bit {
        mnemonic.push('a');
    }
    let (target, _) = branch_target(op, word, address).unwrap();
    format!("{}{} /* {:#010X} */", pad_mnemonic(&mnemonic), signed_hex(target as i32 - address as i32), target)
}

fn format_b_form(op: Op, word: u32, address: u32) -> String {
    let bo = get_bo(word);
    let bi = get_bi(word);
    let link = get_b_link(word);
    let abs = get_b_abs(word);
    let (mnemonic, folded) = branch_mnemonic(op.mnemonic(), bo, bi, link, abs);
    let (target, _) = branch_target(op, word, address).unwrap();
    let disp = target as i32 - address as i32;
    if folded && bo != 0x10 && !(bo == 0x12 && (bi & 0x3) == 3) {
        // conditional-on-CR forms still need the CR bit operand unless it's BI=0 of cr0
        if bi >= 4 {
            return format!(
                "{}{}, {} /* {:#010X} */",
                pad_mnemonic(&mnemonic),
                crb(bi),
                signed_hex(disp),
                target
            );
        }
        format!("{}{} /* {:#010X} */", pad_mnemonic(&mnemonic), signed_hex(disp), target)
    } else if folded {
        format!("{}{} /* {:#010X} */", pad_mnemonic(&mnemonic), signed_hex(disp), target)
    } else {
        format!(
            "{}{}, {}, {} /* {:#010X} */",
            pad_mnemonic(&mnemonic),
            bo,
            bi,
            signed_hex(disp),
            target
        )
    }
}

fn format_xl_branch(op: Op, word: u32) -> String {
    let bo = get_bo(word);
    let bi = get_bi(word);
    let link = get_b_link(word);
    let (mnemonic, folded) = branch_mnemonic(op.mnemonic(), bo, bi, link, false);
    if folded {
        if bi >= 4 && bo != 0x10 && bo != 0x14 {
            format!("{}{}", pad_mnemonic(&mnemonic), crb(bi))
        } else {
            pad_mnemonic(&mnemonic)
        }
    } else {
        format!("{}{}, {}", pad_mnemonic(&mnemonic), bo, bi)
    }
}

fn format_xl_cr(op: Op, word: u32) -> String {
    let bt = get_reg1(word);
    let ba = get_reg2(word);
    let bb = get_reg3(word);
    format!("{}{}, {}, {}", pad_mnemonic(op.mnemonic()), crb(bt), crb(ba), crb(bb))
}

fn format_xl_mcrf(word: u32) -> String {
    let bf = get_reg1(word) >> 2;
    let bfa = get_reg2(word) >> 2;
    format!("{}{}, {}", pad_mnemonic("mcrf"), crf(bf), crf(bfa))
}

fn format_spr(op: Op, word: u32) -> String {
    let reg = get_reg1(word);
    let spr_num = get_spr(word);
    let name = spr::name_for_spr(spr_num);
    match op {
        Op::Mfspr => format!("{}{}, {}", pad_mnemonic("mfspr"), gpr(reg), name),
        Op::Mtspr => format!("{}{}, {}", pad_mnemonic("mtspr"), name, gpr(reg)),
        _ => unreachable!("Spr form restricted to mfspr/mtspr"),
    }
}

fn format_tbr(word: u32) -> String {
    let reg = get_reg1(word);
    let tbr_num = get_spr(word);
    let name = spr::name_for_tbr(tbr_num);
    format!("{}{}, {}", pad_mnemonic("mftb"), gpr(reg), name)
}

fn format_misc(op: Op, word: u32) -> String {
    let rd = get_reg1(word);
    match op {
        Op::Mfcr => format!("{}{}", pad_mnemonic("mfcr"), gpr(rd)),
        Op::Mtcrf => {
            let crm = (word >> 12) & 0xFF;
            format!("{}0x{:02X}, {}", pad_mnemonic("mtcrf"), crm, gpr(rd))
        }
        Op::Mfmsr => format!("{}{}", pad_mnemonic("mfmsr"), gpr(rd)),
        Op::Mtmsr => format!("{}{}", pad_mnemonic("mtmsr"), gpr(rd)),
        Op::Mfsr => {
            let sr = get_reg2(word) & 0xF;
            format!("{}{}, {}", pad_mnemonic("mfsr"), gpr(rd), sr)
        }
        Op::Mtsr => {
            let sr = get_reg2(word) & 0xF;
            format!("{}{}, {}", pad_mnemonic("mtsr"), sr, gpr(rd))
        }
        Op::Mfsrin => format!("{}{}, {}", pad_mnemonic("mfsrin"), gpr(rd), gpr(get_reg3(word))),
        Op::Mtsrin => format!("{}{}, {}", pad_mnemonic("mtsrin"), gpr(rd), gpr(get_reg3(word))),
        Op::Mffs => format!("{}{}", pad_mnemonic("mffs"), fpr(rd)),
        Op::Mtfsf => {
            let flm = (word >> 17) & 0xFF;
            format!("{}0x{:02X}, {}", pad_mnemonic("mtfsf"), flm, fpr(get_reg3(word)))
        }
        Op::Mtfsb0 => format!("{}{}", pad_mnemonic("mtfsb0"), rd),
        Op::Mtfsb1 => format!("{}{}", pad_mnemonic("mtfsb1"), rd),
        Op::Mtfsfi => {
            let bf = rd >> 2;
            let imm = get_reg4(word);
            format!("{}{}, {}", pad_mnemonic("mtfsfi"), bf, imm)
        }
        Op::Mcrfs => {
            let bf = rd >> 2;
            let bfa = get_reg2(word) >> 2;
            format!("{}{}, {}", pad_mnemonic("mcrfs"), crf(bf), crf(bfa))
        }
        _ => unreachable!("Misc form handled exhaustively above"),
    }
}

fn format_x_cache(op: Op, word: u32) -> String {
    let ra = get_reg2(word);
    let rb = get_reg3(word);
    match op {
        Op::Mcrxr => {
            let bf = get_reg1(word) >> 2;
            format!("{}{}", pad_mnemonic("mcrxr"), crf(bf))
        }
        Op::Stwcx => format!("{}{}, {}", pad_mnemonic("stwcx."), gpr(get_reg1(word)), mem_ref_indexed(ra, rb, false)),
        Op::Tlbia => pad_mnemonic("tlbia"),
        _ => format!("{}{}", pad_mnemonic(op.mnemonic()), mem_ref_indexed(ra, rb, false)),
    }
}

fn format_trap(op: Op, word: u32) -> String {
    let to = get_reg1(word);
    let ra = get_reg2(word);
    match op {
        Op::Tw => format!("{}{}, {}, {}", pad_mnemonic("tw"), to, gpr(ra), gpr(get_reg3(word))),
        Op::Twi => format!("{}{}, {}, {}", pad_mnemonic("twi"), to, gpr(ra), signed_hex(get_imm_ext(word))),
        _ => unreachable!("Trap form restricted to tw/twi"),
    }
}
