//! Nintendo GameCube REL relocatable library loader.
//!
//! A REL file is a header, a section table, and an import table mapping
//! each source module id to a relocation stream. [`relocation`] exposes the
//! stream-walking iterator; this module handles the header/section/import
//! parsing that hands it its input.

pub mod error;
pub mod relocation;

pub use error::RelError;
pub use relocation::{read_record, Patch, RelocationRecord, RelocationType, RelocationWalker};

use cpu_ppc603::MemoryContext;
use std::collections::HashMap;

fn be_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}

#[derive(Debug, Clone)]
pub struct RelHeader {
    pub module_id: u32,
    pub num_sections: u32,
    pub section_headers_offset: u32,
    pub module_name_offset: u32,
    pub module_name_size: u32,
    pub format_version: u32,
    pub bss_size: u32,
    pub relocation_table_offset: u32,
    pub import_table_offset: u32,
    pub import_table_size: u32,
    pub on_load_section: u8,
    pub on_unload_section: u8,
    pub on_missing_section: u8,
    pub on_load_offset: u32,
    pub on_unload_offset: u32,
    pub on_missing_offset: u32,
    /// Absent (reads as 0) when `format_version == 1`.
    pub alignment: u32,
    pub bss_alignment: u32,
    /// Only present when `format_version == 3`.
    pub unknown_a1: u32,
}

fn header_size(format_version: u32) -> usize {
    match format_version {
        1 => 64,
        2 => 72,
        _ => 76,
    }
}

impl RelHeader {
    fn parse(bytes: &[u8]) -> Result<Self, RelError> {
        if bytes.len() < 64 {
            return Err(RelError::HeaderTruncated { len: bytes.len(), needed: 64 });
        }
        let format_version = be_u32(bytes, 28);
        let needed = header_size(format_version);
        if bytes.len() < needed {
            return Err(RelError::HeaderTruncated { len: bytes.len(), needed });
        }
        let (alignment, bss_alignment) = if format_version >= 2 {
            (be_u32(bytes, 64), be_u32(bytes, 68))
        } else {
            (0, 0)
        };
        let unknown_a1 = if format_version >= 3 { be_u32(bytes, 72) } else { 0 };
        Ok(Self {
            module_id: be_u32(bytes, 0),
            num_sections: be_u32(bytes, 12),
            section_headers_offset: be_u32(bytes, 16),
            module_name_offset: be_u32(bytes, 20),
            module_name_size: be_u32(bytes, 24),
            format_version,
            bss_size: be_u32(bytes, 32),
            relocation_table_offset: be_u32(bytes, 36),
            import_table_offset: be_u32(bytes, 40),
            import_table_size: be_u32(bytes, 44),
            on_load_section: bytes[48],
            on_unload_section: bytes[49],
            on_missing_section: bytes[50],
            on_load_offset: be_u32(bytes, 52),
            on_unload_offset: be_u32(bytes, 56),
            on_missing_offset: be_u32(bytes, 60),
            alignment,
            bss_alignment,
            unknown_a1,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Section {
    pub index: u32,
    pub offset: u32,
    pub size: u32,
    pub has_code: bool,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct RelFile {
    pub header: RelHeader,
    pub name: String,
    pub sections: Vec<Section>,
    /// Keyed by the relocation-supplying module's id.
    pub import_table: HashMap<u32, Vec<RelocationRecord>>,
}

impl RelFile {
    pub fn parse(bytes: &[u8]) -> Result<Self, RelError> {
        let header = RelHeader::parse(bytes)?;

        let name = if header.module_name_offset != 0 {
            let start = header.module_name_offset as usize;
            let end = start + header.module_name_size as usize;
            String::from_utf8_lossy(bytes.get(start..end).unwrap_or_default()).into_owned()
        } else {
            String::new()
        };

        let mut sections = Vec::new();
        let mut pos = header.section_headers_offset as usize;
        for index in 0..header.num_sections {
            let type_offset = be_u32(bytes, pos);
            let size = be_u32(bytes, pos + 4);
            pos += 8;
            let has_code = type_offset & 1 != 0;
            let offset = type_offset & !1;
            let data = if offset != 0 {
                let start = offset as usize;
                let end = start
                    .checked_add(size as usize)
                    .filter(|&e| e <= bytes.len())
                    .ok_or(RelError::SectionOutOfRange {
                        section: index as usize,
                        offset,
                        size,
                        file_len: bytes.len(),
                    })?;
                bytes[start..end].to_vec()
            } else {
                Vec::new()
            };
            sections.push(Section { index, offset, size, has_code, data });
        }

        let mut import_table = HashMap::new();
        let num_imports = header.import_table_size / 8;
        let mut pos = header.import_table_offset as usize;
        for _ in 0..num_imports {
            let from_module_id = be_u32(bytes, pos);
            let relocations_offset = be_u32(bytes, pos + 4);
            pos += 8;

            let mut records = Vec::new();
            let mut rpos = relocations_offset as usize;
            loop {
                let record = read_record(bytes, &mut rpos)?;
                let done = record.ty == RelocationType::Stop;
                records.push(record);
                if done {
                    break;
                }
            }
            records.pop(); // the STOP sentinel isn't part of the parsed stream

            if import_table.insert(from_module_id, records).is_some() {
                return Err(RelError::DuplicateImportModule { module_id: from_module_id });
            }
        }

        Ok(Self { header, name, sections, import_table })
    }

    /// Maps every section that carries a file image at its declared offset
    /// (used here as a load address, matching how the emulator interprets
    /// REL sections once relocated). BSS and zero-offset sections are left
    /// unmapped.
    pub fn load_into(&self, mem: &mut MemoryContext) {
        for section in &self.sections {
            if section.offset != 0 && !section.data.is_empty() {
                mem.map(section.offset, section.data.clone());
            }
        }
    }

    /// Walks the relocation stream contributed by `from_module_id`, if any.
    pub fn relocations_from(&self, from_module_id: u32) -> Option<RelocationWalker<'_>> {
        self.import_table.get(&from_module_id).map(|records| RelocationWalker::new(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(buf: &mut Vec<u8>, offset: usize, v: u32) {
        if buf.len() < offset + 4 {
            buf.resize(offset + 4, 0);
        }
        buf[offset..offset + 4].copy_from_slice(&v.to_be_bytes());
    }

    #[test]
    fn parses_v1_header_without_alignment_fields() {
        let mut bytes = vec![0u8; 64];
        put(&mut bytes, 0, 0xAB);
        put(&mut bytes, 12, 0); // num_sections
        put(&mut bytes, 28, 1); // format_version
        let rel = RelFile::parse(&bytes).unwrap();
        assert_eq!(rel.header.module_id, 0xAB);
        assert_eq!(rel.header.alignment, 0);
        assert!(rel.sections.is_empty());
    }

    #[test]
    fn v1_header_shorter_than_v2_is_not_required_to_hold_alignment() {
        let mut bytes = vec![0u8; 64];
        put(&mut bytes, 28, 1);
        assert!(RelFile::parse(&bytes).is_ok());
    }

    #[test]
    fn header_truncated_for_its_own_format_version_is_rejected() {
        let mut bytes = vec![0u8; 68];
        put(&mut bytes, 28, 2); // format_version 2 needs 72 bytes
        assert_eq!(RelFile::parse(&bytes), Err(RelError::HeaderTruncated { len: 68, needed: 72 }));
    }

    #[test]
    fn section_with_code_bit_and_data_round_trips() {
        let mut bytes = vec![0u8; 64];
        put(&mut bytes, 12, 1); // num_sections = 1
        put(&mut bytes, 16, 64); // section_headers_offset
        put(&mut bytes, 28, 1); // format_version
        // section header: type_offset (offset=72, has_code) , size=4
        bytes.extend_from_slice(&[0u8; 8]);
        put(&mut bytes, 64, 72 | 1);
        put(&mut bytes, 68, 4);
        bytes.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        let rel = RelFile::parse(&bytes).unwrap();
        assert_eq!(rel.sections.len(), 1);
        assert!(rel.sections[0].has_code);
        assert_eq!(rel.sections[0].data, vec![0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn duplicate_import_module_is_rejected() {
        let mut bytes = vec![0u8; 64];
        put(&mut bytes, 28, 1);
        put(&mut bytes, 40, 64); // import_table_offset
        put(&mut bytes, 44, 16); // import_table_size = 2 entries * 8
        bytes.extend_from_slice(&[0u8; 32]);
        // two import entries both for module 1, both pointing at a STOP-only stream at 96
        put(&mut bytes, 64, 1);
        put(&mut bytes, 68, 96);
        put(&mut bytes, 72, 1);
        put(&mut bytes, 76, 96);
        bytes.resize(96, 0);
        bytes.extend_from_slice(&[0x00, 0x00, 0xCB, 0x00, 0x00, 0x00, 0x00, 0x00]); // STOP record
        assert_eq!(RelFile::parse(&bytes), Err(RelError::DuplicateImportModule { module_id: 1 }));
    }
}
