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

//! Section table entries, relocations, and the owned `Section` that holds a
//! section's final bytes once the Module's IR section has been finalized.

use crate::error::CoilError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionType {
    Null = 0,
    Code = 1,
    Data = 2,
    Bss = 3,
    Readonly = 4,
    Config = 5,
    Symbol = 6,
    String = 7,
    Reloc = 8,
    Debug = 9,
    Target = 10,
    Abi = 11,
    Comment = 12,
    Note = 13,
    Variable = 14,
    Type = 15,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionFlags {
    None = 0x0000_0000,
    Write = 0x0000_0001,
    Exec = 0x0000_0002,
    Alloc = 0x0000_0004,
    Load = 0x0000_0008,
    Tls = 0x0000_0010,
    Merge = 0x0000_0020,
    Strings = 0x0000_0040,
    Group = 0x0000_0080,
    Compressed = 0x0000_0100,
    Encrypted = 0x0000_0200,
}

/// Fixed fields of a serialized section-table entry. `size`/`offset` are
/// filled in by the writer's up-front layout pass; there is no
/// placeholder-then-fixup step.
pub const SECTION_ENTRY_SIZE: usize = 52;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionEntry {
    pub name_offset: u32,
    pub section_type: u32,
    pub flags: u32,
    pub target_id: u32,
    pub address: u64,
    pub size: u64,
    pub offset: u64,
    pub alignment: u32,
    pub relocation_count: u32,
    pub relocation_offset: u32,
}

impl SectionEntry {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SECTION_ENTRY_SIZE);
        out.extend_from_slice(&self.name_offset.to_le_bytes());
        out.extend_from_slice(&self.section_type.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&self.target_id.to_le_bytes());
        out.extend_from_slice(&self.address.to_le_bytes());
        out.extend_from_slice(&self.size.to_le_bytes());
        out.extend_from_slice(&self.offset.to_le_bytes());
        out.extend_from_slice(&self.alignment.to_le_bytes());
        out.extend_from_slice(&self.relocation_count.to_le_bytes());
        out.extend_from_slice(&self.relocation_offset.to_le_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CoilError> {
        if buf.len() < SECTION_ENTRY_SIZE {
            return Err(CoilError::InvalidFormat {
                reason: "truncated section table entry".to_string(),
            });
        }
        Ok(Self {
            name_offset: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            section_type: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            flags: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            target_id: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            address: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
            size: u64::from_le_bytes(buf[24..32].try_into().unwrap()),
            offset: u64::from_le_bytes(buf[32..40].try_into().unwrap()),
            alignment: u32::from_le_bytes(buf[40..44].try_into().unwrap()),
            relocation_count: u32::from_le_bytes(buf[44..48].try_into().unwrap()),
            relocation_offset: u32::from_le_bytes(buf[48..52].try_into().unwrap()),
        })
    }
}

pub const RELOCATION_ENTRY_SIZE: usize = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocationEntry {
    pub offset: u64,
    pub symbol_index: u32,
    pub reloc_type: u32,
    pub addend: i64,
    pub target_id: u32,
}

impl RelocationEntry {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(RELOCATION_ENTRY_SIZE);
        out.extend_from_slice(&self.offset.to_le_bytes());
        out.extend_from_slice(&self.symbol_index.to_le_bytes());
        out.extend_from_slice(&self.reloc_type.to_le_bytes());
        out.extend_from_slice(&self.addend.to_le_bytes());
        out.extend_from_slice(&self.target_id.to_le_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CoilError> {
        if buf.len() < RELOCATION_ENTRY_SIZE {
            return Err(CoilError::InvalidFormat {
                reason: "truncated relocation table entry".to_string(),
            });
        }
        Ok(Self {
            offset: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            symbol_index: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            reloc_type: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            addend: i64::from_le_bytes(buf[16..24].try_into().unwrap()),
            target_id: u32::from_le_bytes(buf[24..28].try_into().unwrap()),
        })
    }
}

/// An owned section inside a `CofFile`: final bytes plus its relocations.
/// Distinct from `crate::module::Section`, which is the parser's live IR
/// side (pending instructions, not-yet-laid-out address); a Module's
/// `generate_cof` converts one into the other.
#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    pub section_type: u32,
    pub flags: u32,
    pub target_id: u32,
    pub address: u64,
    pub alignment: u32,
    pub data: Vec<u8>,
    pub relocations: Vec<RelocationEntry>,
}

impl Section {
    pub fn new(name: impl Into<String>, section_type: u32, flags: u32, target_id: u32) -> Self {
        Self {
            name: name.into(),
            section_type,
            flags,
            target_id,
            address: 0,
            alignment: 4,
            data: Vec::new(),
            relocations: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_entry_roundtrip() {
        let entry = SectionEntry {
            name_offset: 1,
            section_type: SectionType::Code as u32,
            flags: SectionFlags::Exec as u32 | SectionFlags::Alloc as u32,
            target_id: 1,
            address: 0,
            size: 16,
            offset: 128,
            alignment: 4,
            relocation_count: 0,
            relocation_offset: 144,
        };
        let bytes = entry.encode();
        assert_eq!(bytes.len(), SECTION_ENTRY_SIZE);
        assert_eq!(SectionEntry::decode(&bytes).unwrap(), entry);
    }

    #[test]
    fn relocation_entry_roundtrip() {
        let entry = RelocationEntry {
            offset: 4,
            symbol_index: 2,
            reloc_type: 1,
            addend: -8,
            target_id: 1,
        };
        let bytes = entry.encode();
        assert_eq!(bytes.len(), RELOCATION_ENTRY_SIZE);
        assert_eq!(RelocationEntry::decode(&bytes).unwrap(), entry);
    }
}
