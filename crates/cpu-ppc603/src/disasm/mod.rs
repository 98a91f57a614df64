//! Two-pass disassembler: decode + format every word, recording branch
//! targets as it goes, then walk the formatted lines again to interleave
//! labels (caller-supplied and auto-synthesised) at the right addresses.

mod format;

use crate::opcode::{decode, Op};
use std::collections::{BTreeMap, HashMap};

/// A caller-supplied address → name mapping. Several names may share an
/// address (hence a multimap).
pub type Labels = BTreeMap<u32, Vec<String>>;

struct Line {
    address: u32,
    text: String,
}

struct BranchTarget {
    address: u32,
    is_call: bool,
}

/// Disassemble `bytes` (a whole word-aligned instruction stream) starting at
/// `base_address`, interleaving `labels_in` and synthesising labels for
/// branch targets discovered along the way.
pub fn disassemble(bytes: &[u8], base_address: u32, labels_in: &Labels, import_names: &[String]) -> String {
    let mut lines = Vec::with_capacity(bytes.len() / 4);
    let mut branch_targets: BTreeMap<u32, BranchTarget> = BTreeMap::new();

    let mut offset = 0usize;
    while offset + 4 <= bytes.len() {
        let word = u32::from_be_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ]);
        let address = base_address.wrapping_add(offset as u32);
        let op = decode(word);
        let text = format::format_instruction(op, word, address, import_names);

        if let Some((target, is_call)) = format::branch_target(op, word, address) {
            branch_targets
                .entry(target)
                .or_insert(BranchTarget { address: target, is_call });
        }

        lines.push(Line { address, text });
        offset += 4;
    }

    let mut auto_labels: HashMap<u32, String> = HashMap::new();
    for (addr, bt) in &branch_targets {
        let name = if bt.is_call {
            format!("fn{addr:08X}")
        } else {
            format!("label{addr:08X}")
        };
        auto_labels.insert(*addr, name);
    }

    let mut emitted_caller_labels: std::collections::HashSet<u32> = std::collections::HashSet::new();
    let mut out = String::new();
    for line in &lines {
        for (&addr, names) in labels_in.range(..=line.address) {
            if emitted_caller_labels.contains(&addr) {
                continue;
            }
            for name in names {
                emit_label(&mut out, addr, name);
            }
            emitted_caller_labels.insert(addr);
        }
        if let Some(name) = auto_labels.remove(&line.address) {
            emit_label(&mut out, line.address, &name);
        }
        out.push_str(&line.text);
        out.push('\n');
    }

    // Any label whose target fell outside the disassembled range (or landed
    // mid-instruction) is still emitted, flagged misaligned, so the caller
    // never silently loses a reference.
    for (addr, name) in auto_labels {
        emit_misaligned_label(&mut out, addr, &name);
    }

    out
}

fn emit_label(out: &mut String, addr: u32, name: &str) {
    out.push_str(&format!("{name}: // {addr:08X}\n"));
}

fn emit_misaligned_label(out: &mut String, addr: u32, name: &str) {
    out.push_str(&format!("{name}: // {addr:08X} (misaligned)\n"));
}

/// Disassemble a single instruction word, for callers (syscall handler,
/// debug hook) that want one line of text for a diagnostic.
pub fn disassemble_one(word: u32, address: u32) -> String {
    let op = decode(word);
    format::format_instruction(op, word, address, &[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disassembles_li() {
        let bytes = [0x38, 0x60, 0x00, 0x2A];
        let labels = Labels::new();
        let text = disassemble(&bytes, 0x1000, &labels, &[]);
        assert!(text.contains("li"));
        assert!(text.contains("r3"));
        assert!(text.contains("0x2A") || text.contains("0x002A"));
    }

    #[test]
    fn disassembles_blr() {
        let bytes = [0x4E, 0x80, 0x00, 0x20];
        let labels = Labels::new();
        let text = disassemble(&bytes, 0, &labels, &[]);
        assert!(text.trim().ends_with("blr") || text.contains(" blr"));
    }

    #[test]
    fn unknown_word_emits_invalid_line_not_a_panic() {
        let bytes = [0x04, 0x00, 0x00, 0x00];
        let labels = Labels::new();
        let text = disassemble(&bytes, 0, &labels, &[]);
        assert!(text.contains(".invalid"));
    }

    #[test]
    fn synthesises_branch_target_label() {
        // bne -4 at address 4: loops back to 0
        let bytes = [0x40, 0x82, 0xFF, 0xFC];
        let labels = Labels::new();
        let text = disassemble(&bytes, 4, &labels, &[]);
        assert!(text.contains("label00000000"));
    }

    #[test]
    fn caller_supplied_labels_are_interleaved() {
        let bytes = [0x38, 0x60, 0x00, 0x2A];
        let mut labels = Labels::new();
        labels.insert(0x1000, vec!["entry_point".to_string()]);
        let text = disassemble(&bytes, 0x1000, &labels, &[]);
        assert!(text.contains("entry_point"));
    }
}
