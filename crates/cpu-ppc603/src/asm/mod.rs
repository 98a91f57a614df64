//! Two-pass assembler driver: pass one tokenises every line, sizes it, and
//! records label offsets; pass two encodes each instruction (labels are now
//! fully resolved) and emits directive data verbatim.

mod lexer;
mod table;

pub use table::{encode_instruction, EncodeContext};

use crate::error::AsmError;
use lexer::ParsedLine;
use std::collections::HashMap;

/// Resolves an `.include name` to either assemblable source text or a raw
/// binary blob. Binary blobs are emitted as-is (padded to word alignment);
/// text blobs are tokenised and assembled recursively.
pub enum IncludeContent {
    Source(String),
    Binary(Vec<u8>),
}

pub trait IncludeResolver {
    fn resolve(&mut self, name: &str) -> Result<IncludeContent, String>;
}

/// A resolver that always fails; suitable for source with no `.include`s.
pub struct NoIncludes;

impl IncludeResolver for NoIncludes {
    fn resolve(&mut self, name: &str) -> Result<IncludeContent, String> {
        Err(format!("no include resolver configured (wanted `{name}`)"))
    }
}

pub struct AssembledProgram {
    pub bytes: Vec<u8>,
    pub label_offsets: HashMap<String, usize>,
}

enum Item {
    Instruction { mnemonic: String, args: Vec<crate::argument::Argument>, line: usize },
    Data { words: Vec<u32> },
    Raw { bytes: Vec<u8> },
    Offsetof { label: String, line: usize },
}

struct SizedItem {
    offset: usize,
    item: Item,
}

/// Assembles `source_text` into a byte blob plus a label→offset map.
/// `start_address` is used only to resolve `ABSOLUTE_ADDRESS` branch deltas;
/// offsets themselves are always relative to the start of the blob.
pub fn assemble(
    source_text: &str,
    resolver: &mut dyn IncludeResolver,
    start_address: u32,
) -> Result<AssembledProgram, AsmError> {
    let mut include_cache: HashMap<String, IncludeContent> = HashMap::new();
    let mut pending: Vec<String> = Vec::new();
    let mut items = Vec::new();
    let mut label_offsets = HashMap::new();
    let mut label_lines: HashMap<String, usize> = HashMap::new();
    let mut offset = 0usize;

    collect_items(
        source_text,
        resolver,
        &mut include_cache,
        &mut pending,
        &mut items,
        &mut label_offsets,
        &mut label_lines,
        &mut offset,
    )?;

    let sized: Vec<SizedItem> = items;
    let mut bytes = vec![0u8; offset];

    for sized_item in &sized {
        match &sized_item.item {
            Item::Instruction { mnemonic, args, line } => {
                let ctx = EncodeContext {
                    line: *line,
                    item_offset: sized_item.offset,
                    start_address,
                    label_offsets: &label_offsets,
                };
                let word = encode_instruction(mnemonic, args, &ctx)?;
                bytes[sized_item.offset..sized_item.offset + 4].copy_from_slice(&word.to_be_bytes());
            }
            Item::Data { words } => {
                let mut cursor = sized_item.offset;
                for w in words {
                    bytes[cursor..cursor + 4].copy_from_slice(&w.to_be_bytes());
                    cursor += 4;
                }
            }
            Item::Raw { bytes: raw } => {
                bytes[sized_item.offset..sized_item.offset + raw.len()].copy_from_slice(raw);
            }
            Item::Offsetof { label, line } => {
                let target = label_offsets
                    .get(label)
                    .copied()
                    .ok_or_else(|| AsmError::UnknownLabel { name: label.clone() })?;
                let _ = line;
                bytes[sized_item.offset..sized_item.offset + 4].copy_from_slice(&(target as u32).to_be_bytes());
            }
        }
    }

    Ok(AssembledProgram { bytes, label_offsets })
}

fn collect_items(
    source_text: &str,
    resolver: &mut dyn IncludeResolver,
    include_cache: &mut HashMap<String, IncludeContent>,
    pending: &mut Vec<String>,
    items: &mut Vec<SizedItem>,
    label_offsets: &mut HashMap<String, usize>,
    label_lines: &mut HashMap<String, usize>,
    offset: &mut usize,
) -> Result<(), AsmError> {
    for (line_no, raw_line) in source_text.lines().enumerate() {
        let line_no = line_no + 1;
        let Some(text) = lexer::strip_comment(raw_line) else {
            continue;
        };
        let parsed = lexer::parse_line(line_no, text)?;
        match parsed {
            ParsedLine::Label(name) => {
                if let Some(&first_line) = label_lines.get(&name) {
                    return Err(AsmError::DuplicateLabel {
                        name,
                        first_line,
                        second_line: line_no,
                    });
                }
                label_lines.insert(name.clone(), line_no);
                label_offsets.insert(name, *offset);
            }
            ParsedLine::Directive { name, args_text } => {
                handle_directive(
                    &name,
                    &args_text,
                    line_no,
                    resolver,
                    include_cache,
                    pending,
                    items,
                    label_offsets,
                    label_lines,
                    offset,
                )?;
            }
            ParsedLine::Instruction { mnemonic, args } => {
                items.push(SizedItem {
                    offset: *offset,
                    item: Item::Instruction { mnemonic, args, line: line_no },
                });
                *offset += 4;
            }
        }
    }
    Ok(())
}

fn handle_directive(
    name: &str,
    args_text: &str,
    line_no: usize,
    resolver: &mut dyn IncludeResolver,
    include_cache: &mut HashMap<String, IncludeContent>,
    pending: &mut Vec<String>,
    items: &mut Vec<SizedItem>,
    label_offsets: &mut HashMap<String, usize>,
    label_lines: &mut HashMap<String, usize>,
    offset: &mut usize,
) -> Result<(), AsmError> {
    match name {
        "data" => {
            let value = parse_directive_imm(args_text, line_no)?;
            items.push(SizedItem {
                offset: *offset,
                item: Item::Data { words: vec![value] },
            });
            *offset += 4;
        }
        "zero" => {
            let count = parse_directive_imm(args_text, line_no)? as usize;
            if count % 4 != 0 {
                return Err(AsmError::Parse {
                    line: line_no,
                    reason: format!(".zero size {count} is not a multiple of 4"),
                });
            }
            items.push(SizedItem {
                offset: *offset,
                item: Item::Raw { bytes: vec![0u8; count] },
            });
            *offset += count;
        }
        "binary" => {
            let text = parse_directive_string(args_text, line_no)?;
            let mut data = text.into_bytes();
            pad_to_word(&mut data);
            let len = data.len();
            items.push(SizedItem {
                offset: *offset,
                item: Item::Raw { bytes: data },
            });
            *offset += len;
        }
        "offsetof" => {
            let label = args_text.trim().to_string();
            items.push(SizedItem {
                offset: *offset,
                item: Item::Offsetof { label, line: line_no },
            });
            *offset += 4;
        }
        "include" => {
            let include_name = parse_directive_string(args_text, line_no)?;
            if pending.contains(&include_name) {
                return Err(AsmError::IncludeCycle { name: include_name });
            }
            if !include_cache.contains_key(&include_name) {
                let content = resolver.resolve(&include_name).map_err(|reason| AsmError::IncludeNotFound {
                    name: include_name.clone(),
                    reason,
                })?;
                include_cache.insert(include_name.clone(), content);
            }
            match include_cache.get(&include_name).expect("just inserted") {
                IncludeContent::Binary(data) => {
                    let mut data = data.clone();
                    pad_to_word(&mut data);
                    let len = data.len();
                    items.push(SizedItem {
                        offset: *offset,
                        item: Item::Raw { bytes: data },
                    });
                    *offset += len;
                }
                IncludeContent::Source(text) => {
                    let text = text.clone();
                    pending.push(include_name.clone());
                    let result = collect_items(
                        &text,
                        resolver,
                        include_cache,
                        pending,
                        items,
                        label_offsets,
                        label_lines,
                        offset,
                    );
                    pending.pop();
                    result?;
                }
            }
        }
        _ => {
            return Err(AsmError::Parse {
                line: line_no,
                reason: format!("unrecognised directive `.{name}`"),
            })
        }
    }
    Ok(())
}

fn parse_directive_imm(args_text: &str, line_no: usize) -> Result<u32, AsmError> {
    let text = args_text.trim();
    let (negative, rest) = text.strip_prefix('-').map(|r| (true, r)).unwrap_or((false, text));
    let value: i64 = if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).map_err(|_| AsmError::Parse {
            line: line_no,
            reason: format!("bad numeric literal `{text}`"),
        })?
    } else {
        rest.parse().map_err(|_| AsmError::Parse {
            line: line_no,
            reason: format!("bad numeric literal `{text}`"),
        })?
    };
    Ok((if negative { -value } else { value }) as u32)
}

fn parse_directive_string(args_text: &str, line_no: usize) -> Result<String, AsmError> {
    let text = args_text.trim();
    text.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .map(|t| t.to_string())
        .ok_or_else(|| AsmError::Parse {
            line: line_no,
            reason: format!("expected a quoted string, found `{text}`"),
        })
}

fn pad_to_word(data: &mut Vec<u8>) {
    while data.len() % 4 != 0 {
        data.push(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_single_instruction() {
        let program = assemble("addi r3, r4, 5\n", &mut NoIncludes, 0).unwrap();
        assert_eq!(program.bytes, vec![0x38, 0x64, 0x00, 0x05]);
    }

    #[test]
    fn assembles_loop_with_label() {
        let source = "loop:\naddi r3,r3,1\nbne loop\n";
        let program = assemble(source, &mut NoIncludes, 0x1000).unwrap();
        assert_eq!(program.label_offsets.get("loop"), Some(&0));
        assert_eq!(
            program.bytes,
            vec![0x38, 0x63, 0x00, 0x01, 0x40, 0x82, 0xFF, 0xFC]
        );
    }

    #[test]
    fn rejects_branch_to_unknown_label() {
        let err = assemble("b nowhere\n", &mut NoIncludes, 0).unwrap_err();
        assert!(matches!(err, AsmError::UnknownLabel { .. }));
    }

    #[test]
    fn rejects_duplicate_label() {
        let source = "foo:\nnop\nfoo:\nnop\n";
        let err = assemble(source, &mut NoIncludes, 0).unwrap_err();
        assert!(matches!(err, AsmError::DuplicateLabel { .. }));
    }

    #[test]
    fn zero_directive_rejects_non_multiple_of_four() {
        let err = assemble(".zero 3\n", &mut NoIncludes, 0).unwrap_err();
        assert!(matches!(err, AsmError::Parse { .. }));
    }

    #[test]
    fn offsetof_resolves_label_byte_offset() {
        let source = "nop\ntarget:\nnop\n.offsetof target\n";
        let program = assemble(source, &mut NoIncludes, 0).unwrap();
        let value = u32::from_be_bytes(program.bytes[8..12].try_into().unwrap());
        assert_eq!(value, 4);
    }

    struct MapResolver(HashMap<String, IncludeContent>);
    impl IncludeResolver for MapResolver {
        fn resolve(&mut self, name: &str) -> Result<IncludeContent, String> {
            match self.0.remove(name) {
                Some(content) => Ok(content),
                None => Err("not found".to_string()),
            }
        }
    }

    #[test]
    fn include_directive_assembles_nested_source() {
        let mut map = HashMap::new();
        map.insert("helper.s".to_string(), IncludeContent::Source("nop\n".to_string()));
        let mut resolver = MapResolver(map);
        let program = assemble(".include \"helper.s\"\nnop\n", &mut resolver, 0).unwrap();
        assert_eq!(program.bytes.len(), 8);
    }

    #[test]
    fn include_cycle_is_detected() {
        struct SelfResolver;
        impl IncludeResolver for SelfResolver {
            fn resolve(&mut self, _name: &str) -> Result<IncludeContent, String> {
                Ok(IncludeContent::Source(".include \"self.s\"\n".to_string()))
            }
        }
        let mut resolver = SelfResolver;
        let err = assemble(".include \"self.s\"\n", &mut resolver, 0).unwrap_err();
        assert!(matches!(err, AsmError::IncludeCycle { .. }));
    }
}
