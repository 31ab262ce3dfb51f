/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! Deserializes a `CofFile` from bytes written by `writer::write`. Every
//! table is located through the header's recorded offsets rather than
//! assumed contiguous, so a reader built against a newer writer that adds
//! padding between tables still works.

use super::header::CofHeader;
use super::section::{RelocationEntry, Section, SectionEntry, RELOCATION_ENTRY_SIZE, SECTION_ENTRY_SIZE};
use super::symbol::{Symbol, SymbolEntry, SYMBOL_ENTRY_SIZE};
use super::target::{Target, TargetEntry, TARGET_ENTRY_SIZE};
use super::{CofFile, StringPool};
use crate::error::CoilError;

fn slice(buf: &[u8], offset: usize, len: usize) -> Result<&[u8], CoilError> {
    buf.get(offset..offset + len).ok_or_else(|| CoilError::InvalidFormat {
        reason: format!("truncated COF file: wanted {len} bytes at offset {offset}, have {}", buf.len()),
    })
}

pub fn read(buf: &[u8]) -> Result<CofFile, CoilError> {
    let header = CofHeader::decode(buf)?;

    let string_table = slice(buf, header.string_table_offset as usize, header.string_table_size as usize)?;
    let strings = StringPool::from_bytes(string_table.to_vec())?;

    let mut targets = Vec::with_capacity(header.target_count as usize);
    for i in 0..header.target_count as usize {
        let offset = header.target_table_offset as usize + i * TARGET_ENTRY_SIZE;
        let entry = TargetEntry::decode(slice(buf, offset, TARGET_ENTRY_SIZE)?)?;
        let name = strings.get(entry.name_offset)?.to_string();
        let config = if entry.config_size > 0 {
            slice(buf, entry.config_offset as usize, entry.config_size as usize)?.to_vec()
        } else {
            Vec::new()
        };
        targets.push(Target {
            target_id: entry.target_id,
            arch_type: entry.arch_type,
            features: entry.features,
            name,
            config,
        });
    }

    let mut sections = Vec::with_capacity(header.section_count as usize);
    for i in 0..header.section_count as usize {
        let offset = header.section_table_offset as usize + i * SECTION_ENTRY_SIZE;
        let entry = SectionEntry::decode(slice(buf, offset, SECTION_ENTRY_SIZE)?)?;
        let name = strings.get(entry.name_offset)?.to_string();
        let data = slice(buf, entry.offset as usize, entry.size as usize)?.to_vec();
        let mut relocations = Vec::with_capacity(entry.relocation_count as usize);
        for r in 0..entry.relocation_count as usize {
            let reloc_offset = entry.relocation_offset as usize + r * RELOCATION_ENTRY_SIZE;
            relocations.push(RelocationEntry::decode(slice(buf, reloc_offset, RELOCATION_ENTRY_SIZE)?)?);
        }
        sections.push(Section {
            name,
            section_type: entry.section_type,
            flags: entry.flags,
            target_id: entry.target_id,
            address: entry.address,
            alignment: entry.alignment,
            data,
            relocations,
        });
    }

    let mut symbols = Vec::with_capacity(header.symbol_count as usize);
    let mut symbol_index = std::collections::HashMap::new();
    for i in 0..header.symbol_count as usize {
        let offset = header.symbol_table_offset as usize + i * SYMBOL_ENTRY_SIZE;
        let entry = SymbolEntry::decode(slice(buf, offset, SYMBOL_ENTRY_SIZE)?)?;
        let name = strings.get(entry.name_offset)?.to_string();
        symbol_index.insert(name.clone(), symbols.len());
        symbols.push(Symbol {
            name,
            section_index: entry.section_index,
            value: entry.value,
            size: entry.size,
            symbol_type: entry.symbol_type,
            flags: entry.flags,
            target_id: entry.target_id,
        });
    }

    Ok(CofFile {
        header,
        targets,
        sections,
        symbols,
        symbol_index,
    })
}

#[cfg(test)]
mod tests {
    use super::super::section::{SectionFlags, SectionType};
    use super::super::symbol::SymbolType;
    use super::super::CofFile;

    #[test]
    fn roundtrips_a_populated_file() {
        let mut cof = CofFile::with_identity([0x7; 16], 42);
        let target_id = cof.add_target(1, 0, "x86-64");
        let section = cof.add_section("text", SectionType::Code as u32, SectionFlags::Alloc as u32, target_id);
        section.data = vec![1, 2, 3, 4];
        cof.add_symbol("main", 1, 0, 4, SymbolType::Function as u16, 0, target_id);

        let bytes = cof.write().unwrap();
        let decoded = CofFile::read(&bytes).unwrap();

        assert_eq!(decoded.target_count(), 1);
        assert_eq!(decoded.section_count(), 1);
        assert_eq!(decoded.symbol_count(), 1);
        assert_eq!(decoded.targets[0].name, "x86-64");
        assert_eq!(decoded.sections[0].data, vec![1, 2, 3, 4]);
        assert_eq!(decoded.symbol_by_name("main").unwrap().value, 0);
        assert_eq!(decoded.header.uuid, [0x7; 16]);
        assert_eq!(decoded.header.timestamp, 42);
    }

    #[test]
    fn rejects_truncated_buffer() {
        let err = CofFile::read(&[0u8; 4]).unwrap_err();
        assert!(matches!(err, crate::error::CoilError::InvalidFormat { .. }));
    }
}
