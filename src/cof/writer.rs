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

//! Serializes a `CofFile` to bytes. Every offset is computed once, up front,
//! in table order; nothing is written as a placeholder and patched later
//! (a determinism requirement would be pointless with a fixup pass).

use super::header::HEADER_SIZE;
use super::section::{SectionEntry, RELOCATION_ENTRY_SIZE, SECTION_ENTRY_SIZE};
use super::symbol::{SymbolEntry, SYMBOL_ENTRY_SIZE};
use super::target::{TargetEntry, TARGET_ENTRY_SIZE};
use super::{CofFile, StringPool};
use crate::error::CoilError;

fn align_up(offset: u64, alignment: u32) -> u64 {
    let alignment = alignment.max(1) as u64;
    offset.div_ceil(alignment) * alignment
}

pub fn write(cof: &CofFile) -> Result<Vec<u8>, CoilError> {
    let mut strings = StringPool::new();
    for target in &cof.targets {
        strings.add(&target.name);
    }
    for section in &cof.sections {
        strings.add(&section.name);
    }
    for symbol in &cof.symbols {
        strings.add(&symbol.name);
    }

    let target_table_offset = HEADER_SIZE as u64;
    let target_table_size = cof.targets.len() as u64 * TARGET_ENTRY_SIZE as u64;
    let section_table_offset = target_table_offset + target_table_size;
    let section_table_size = cof.sections.len() as u64 * SECTION_ENTRY_SIZE as u64;
    let symbol_table_offset = section_table_offset + section_table_size;
    let symbol_table_size = cof.symbols.len() as u64 * SYMBOL_ENTRY_SIZE as u64;
    let string_table_offset = symbol_table_offset + symbol_table_size;
    let string_table_size = strings.len() as u64;

    let mut cursor = string_table_offset + string_table_size;
    let mut target_config_offsets = Vec::with_capacity(cof.targets.len());
    for target in &cof.targets {
        if target.config.is_empty() {
            target_config_offsets.push(0u64);
        } else {
            target_config_offsets.push(cursor);
            cursor += target.config.len() as u64;
        }
    }

    let mut section_data_offsets = Vec::with_capacity(cof.sections.len());
    let mut section_reloc_offsets = Vec::with_capacity(cof.sections.len());
    for section in &cof.sections {
        cursor = align_up(cursor, section.alignment);
        section_data_offsets.push(cursor);
        cursor += section.data.len() as u64;
        if section.relocations.is_empty() {
            section_reloc_offsets.push(0u64);
        } else {
            section_reloc_offsets.push(cursor);
            cursor += section.relocations.len() as u64 * RELOCATION_ENTRY_SIZE as u64;
        }
    }

    let mut out = Vec::with_capacity(cursor as usize);

    let mut header = cof.header.clone();
    header.target_count = cof.targets.len() as u32;
    header.section_count = cof.sections.len() as u32;
    header.symbol_count = cof.symbols.len() as u32;
    header.string_table_size = string_table_size as u32;
    header.header_size = HEADER_SIZE;
    header.section_table_offset = section_table_offset as u32;
    header.symbol_table_offset = symbol_table_offset as u32;
    header.string_table_offset = string_table_offset as u32;
    header.target_table_offset = target_table_offset as u32;
    out.extend_from_slice(&header.encode());

    for (target, &config_offset) in cof.targets.iter().zip(&target_config_offsets) {
        let entry = TargetEntry {
            target_id: target.target_id,
            arch_type: target.arch_type,
            features: target.features,
            name_offset: strings.add(&target.name),
            config_offset: config_offset as u32,
            config_size: target.config.len() as u32,
        };
        out.extend_from_slice(&entry.encode());
    }

    for (i, section) in cof.sections.iter().enumerate() {
        let entry = SectionEntry {
            name_offset: strings.add(&section.name),
            section_type: section.section_type,
            flags: section.flags,
            target_id: section.target_id,
            address: section.address,
            size: section.data.len() as u64,
            offset: section_data_offsets[i],
            alignment: section.alignment.max(1),
            relocation_count: section.relocations.len() as u32,
            relocation_offset: section_reloc_offsets[i] as u32,
        };
        out.extend_from_slice(&entry.encode());
    }

    for symbol in &cof.symbols {
        let entry = SymbolEntry {
            name_offset: strings.add(&symbol.name),
            section_index: symbol.section_index,
            value: symbol.value,
            size: symbol.size,
            symbol_type: symbol.symbol_type,
            flags: symbol.flags,
            target_id: symbol.target_id,
        };
        out.extend_from_slice(&entry.encode());
    }

    out.extend_from_slice(strings.as_bytes());

    for target in &cof.targets {
        out.extend_from_slice(&target.config);
    }

    for section in &cof.sections {
        let before = out.len() as u64;
        let padded_start = align_up(before, section.alignment);
        out.resize(padded_start as usize, 0);
        out.extend_from_slice(&section.data);
        for relocation in &section.relocations {
            out.extend_from_slice(&relocation.encode());
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::super::{CofFile, SectionFlags, SectionType, SymbolType};
    use super::*;

    #[test]
    fn write_produces_header_sized_prefix_with_magic() {
        let cof = CofFile::with_identity([0x42; 16], 1000);
        let bytes = write(&cof).unwrap();
        assert!(bytes.len() >= HEADER_SIZE as usize);
        assert_eq!(&bytes[0..4], b"COIL");
    }

    #[test]
    fn write_lays_out_tables_in_order() {
        let mut cof = CofFile::with_identity([0x1; 16], 1);
        let target_id = cof.add_target(1, 0, "x86-64");
        let section = cof.add_section("text", SectionType::Code as u32, SectionFlags::Alloc as u32, target_id);
        section.data = vec![0xAA; 16];
        cof.add_symbol("main", 1, 0, 16, SymbolType::Function as u16, 0, target_id);

        let bytes = write(&cof).unwrap();
        let header = super::super::CofHeader::decode(&bytes).unwrap();
        assert_eq!(header.target_count, 1);
        assert_eq!(header.section_count, 1);
        assert_eq!(header.symbol_count, 1);
        assert!(header.section_table_offset > header.target_table_offset);
        assert!(header.symbol_table_offset > header.section_table_offset);
        assert!(header.string_table_offset > header.symbol_table_offset);
    }
}
