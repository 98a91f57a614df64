//! Tokenising a single line of assembly source into a label declaration, a
//! pseudo-directive, or a mnemonic plus its argument list.

use crate::argument::{Argument, BranchTarget};
use crate::error::AsmError;

#[derive(Debug, Clone)]
pub enum ParsedLine {
    Label(String),
    Directive { name: String, args_text: String },
    Instruction { mnemonic: String, args: Vec<Argument> },
}

/// Strips `//`, `#`, and `;` line comments (outside of quoted strings) and
/// trims whitespace. Returns `None` for a blank line.
pub fn strip_comment(line: &str) -> Option<&str> {
    let mut in_string = false;
    let mut end = line.len();
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => in_string = !in_string,
            b'/' if !in_string && i + 1 < bytes.len() && bytes[i + 1] == b'/' => {
                end = i;
                break;
            }
            b'#' | b';' if !in_string => {
                end = i;
                break;
            }
            _ => {}
        }
        i += 1;
    }
    let trimmed = line[..end].trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

pub fn parse_line(line_no: usize, text: &str) -> Result<ParsedLine, AsmError> {
    if let Some(label) = text.strip_suffix(':') {
        return Ok(ParsedLine::Label(label.trim().to_string()));
    }
    if let Some(rest) = text.strip_prefix('.') {
        let (name, args_text) = match rest.find(char::is_whitespace) {
            Some(idx) => (&rest[..idx], rest[idx..].trim()),
            None => (rest, ""),
        };
        return Ok(ParsedLine::Directive {
            name: name.to_string(),
            args_text: args_text.to_string(),
        });
    }

    let (mnemonic, rest) = match text.find(char::is_whitespace) {
        Some(idx) => (&text[..idx], text[idx..].trim()),
        None => (text, ""),
    };

    let args = if rest.is_empty() {
        Vec::new()
    } else {
        split_args(rest)
            .into_iter()
            .map(|tok| parse_argument(line_no, tok.trim()))
            .collect::<Result<Vec<_>, _>>()?
    };

    Ok(ParsedLine::Instruction {
        mnemonic: mnemonic.to_string(),
        args,
    })
}

/// Splits on top-level commas, i.e. commas not nested inside `[...]`.
fn split_args(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth -= 1,
            ',' if depth == 0 => {
                out.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&text[start..]);
    out
}

fn parse_argument(line_no: usize, token: &str) -> Result<Argument, AsmError> {
    if let Some(inner) = token.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        return parse_memory_reference(line_no, inner);
    }
    if let Some(n) = token.strip_prefix('r').or_else(|| token.strip_prefix('R')) {
        if let Ok(n) = n.parse::<u8>() {
            if n < 32 {
                return Ok(Argument::IntReg(n));
            }
        }
    }
    if let Some(n) = token.strip_prefix('f').or_else(|| token.strip_prefix('F')) {
        if let Ok(n) = n.parse::<u8>() {
            if n < 32 {
                return Ok(Argument::FloatReg(n));
            }
        }
    }
    if let Some(n) = token.strip_prefix("crb") {
        if let Ok(n) = n.parse::<u8>() {
            return Ok(Argument::CondBit(n));
        }
    }
    if let Some(n) = token.strip_prefix("cr") {
        if let Ok(n) = n.parse::<u8>() {
            return Ok(Argument::CondField(n));
        }
    }
    if let Some(value) = parse_numeric_literal(token) {
        return Ok(Argument::Immediate(value));
    }
    if token.starts_with('"') && token.ends_with('"') && token.len() >= 2 {
        return Ok(Argument::Raw(token[1..token.len() - 1].to_string()));
    }
    Ok(Argument::BranchTarget(BranchTarget::Label(token.to_string())))
}

fn parse_memory_reference(line_no: usize, inner: &str) -> Result<Argument, AsmError> {
    if let Some(rest) = inner.strip_prefix('(') {
        let close = rest.find(')').ok_or_else(|| AsmError::Parse {
            line: line_no,
            reason: format!("unterminated `(` in memory reference `[{inner}]`"),
        })?;
        let base_tok = &rest[..close];
        let base = parse_gpr_strict(line_no, base_tok)?;
        let tail = rest[close + 1..].trim();
        let index_tok = tail.strip_prefix('+').unwrap_or(tail).trim();
        let index = parse_gpr_strict(line_no, index_tok)?;
        return Ok(Argument::RegMemRef {
            base,
            index,
            updates: true,
        });
    }

    let (base_tok, disp_part) = match inner.find(['+', '-']) {
        Some(idx) => (&inner[..idx], Some(&inner[idx..])),
        None => (inner, None),
    };
    let base = parse_gpr_strict(line_no, base_tok.trim())?;
    let Some(part) = disp_part else {
        return Ok(Argument::ImmMemRef {
            base,
            disp: 0,
            updates: false,
        });
    };
    let part = part.trim();
    if let Some(d) = part.strip_prefix('+') {
        let d = d.trim();
        if let Ok(index) = parse_gpr_strict(line_no, d) {
            return Ok(Argument::RegMemRef {
                base,
                index,
                updates: false,
            });
        }
    }
    let (sign, digits) = if let Some(d) = part.strip_prefix('+') {
        (1, d.trim())
    } else if let Some(d) = part.strip_prefix('-') {
        (-1, d.trim())
    } else {
        (1, part)
    };
    let value = parse_numeric_literal(digits).ok_or_else(|| AsmError::Parse {
        line: line_no,
        reason: format!("bad displacement or index `{part}` in memory reference"),
    })?;
    Ok(Argument::ImmMemRef {
        base,
        disp: sign * value as i32,
        updates: false,
    })
}

fn parse_gpr_strict(line_no: usize, token: &str) -> Result<u8, AsmError> {
    token
        .strip_prefix('r')
        .or_else(|| token.strip_prefix('R'))
        .and_then(|n| n.parse::<u8>().ok())
        .filter(|n| *n < 32)
        .ok_or_else(|| AsmError::Parse {
            line: line_no,
            reason: format!("expected a GPR, found `{token}`"),
        })
}

/// C-style numeric literal: `0x...`/`0X...` hex, otherwise decimal, with an
/// optional leading `-`.
fn parse_numeric_literal(token: &str) -> Option<i64> {
    let (negative, rest) = match token.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, token),
    };
    let value = if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()) {
        rest.parse().ok()?
    } else {
        return None;
    };
    Some(if negative { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_line_comments() {
        assert_eq!(strip_comment("addi r3, r4, 5 // comment"), Some("addi r3, r4, 5"));
        assert_eq!(strip_comment("  // only a comment"), None);
        assert_eq!(strip_comment(""), None);
    }

    #[test]
    fn parses_label_declaration() {
        let line = parse_line(1, "loop:").unwrap();
        assert!(matches!(line, ParsedLine::Label(name) if name == "loop"));
    }

    #[test]
    fn parses_instruction_with_registers_and_immediate() {
        let line = parse_line(1, "addi r3, r4, 5").unwrap();
        match line {
            ParsedLine::Instruction { mnemonic, args } => {
                assert_eq!(mnemonic, "addi");
                assert_eq!(args[0], Argument::IntReg(3));
                assert_eq!(args[1], Argument::IntReg(4));
                assert_eq!(args[2], Argument::Immediate(5));
            }
            _ => panic!("expected instruction"),
        }
    }

    #[test]
    fn parses_memory_reference_with_negative_displacement() {
        let line = parse_line(1, "lwz r3, [r1 - 0x10]").unwrap();
        match line {
            ParsedLine::Instruction { args, .. } => {
                assert_eq!(
                    args[1],
                    Argument::ImmMemRef {
                        base: 1,
                        disp: -0x10,
                        updates: false
                    }
                );
            }
            _ => panic!("expected instruction"),
        }
    }

    #[test]
    fn parses_indexed_memory_reference_without_update() {
        let line = parse_line(1, "lwzx r3, [r4 + r5]").unwrap();
        match line {
            ParsedLine::Instruction { args, .. } => {
                assert_eq!(
                    args[1],
                    Argument::RegMemRef {
                        base: 4,
                        index: 5,
                        updates: false
                    }
                );
            }
            _ => panic!("expected instruction"),
        }
    }

    #[test]
    fn parses_indexed_update_memory_reference() {
        let line = parse_line(1, "lwzux r3, [(r4) + r5]").unwrap();
        match line {
            ParsedLine::Instruction { args, .. } => {
                assert_eq!(
                    args[1],
                    Argument::RegMemRef {
                        base: 4,
                        index: 5,
                        updates: true
                    }
                );
            }
            _ => panic!("expected instruction"),
        }
    }

    #[test]
    fn unrecognised_bareword_becomes_branch_target_label() {
        let line = parse_line(1, "bne loop").unwrap();
        match line {
            ParsedLine::Instruction { args, .. } => {
                assert_eq!(
                    args[0],
                    Argument::BranchTarget(BranchTarget::Label("loop".to_string()))
                );
            }
            _ => panic!("expected instruction"),
        }
    }

    #[test]
    fn parses_directive() {
        let line = parse_line(1, ".zero 16").unwrap();
        match line {
            ParsedLine::Directive { name, args_text } => {
                assert_eq!(name, "zero");
                assert_eq!(args_text, "16");
            }
            _ => panic!("expected directive"),
        }
    }
}
