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

//! Symbol table entries and the owned `Symbol` a `CofFile` carries.

use crate::error::CoilError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolType {
    None = 0,
    Object = 1,
    Function = 2,
    Section = 3,
    File = 4,
    Common = 5,
    Label = 6,
    Variable = 7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolFlags {
    None = 0x0000,
    Global = 0x0001,
    Local = 0x0002,
    Weak = 0x0004,
    Hidden = 0x0008,
    Protected = 0x0010,
    Exported = 0x0020,
    Undefined = 0x0040,
    Entry = 0x0080,
    Constructor = 0x0100,
    Destructor = 0x0200,
}

/// 32 bytes: the field list above is the authoritative byte count.
pub const SYMBOL_ENTRY_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolEntry {
    pub name_offset: u32,
    pub section_index: u32,
    pub value: u64,
    pub size: u64,
    pub symbol_type: u16,
    pub flags: u16,
    pub target_id: u32,
}

impl SymbolEntry {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SYMBOL_ENTRY_SIZE);
        out.extend_from_slice(&self.name_offset.to_le_bytes());
        out.extend_from_slice(&self.section_index.to_le_bytes());
        out.extend_from_slice(&self.value.to_le_bytes());
        out.extend_from_slice(&self.size.to_le_bytes());
        out.extend_from_slice(&self.symbol_type.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&self.target_id.to_le_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CoilError> {
        if buf.len() < SYMBOL_ENTRY_SIZE {
            return Err(CoilError::InvalidFormat {
                reason: "truncated symbol table entry".to_string(),
            });
        }
        Ok(Self {
            name_offset: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            section_index: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            value: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            size: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
            symbol_type: u16::from_le_bytes(buf[24..26].try_into().unwrap()),
            flags: u16::from_le_bytes(buf[26..28].try_into().unwrap()),
            target_id: u32::from_le_bytes(buf[28..32].try_into().unwrap()),
        })
    }
}

/// An owned symbol inside a `CofFile`. `section_index` is 1-based; 0 means
/// the symbol is undefined (no owning section, e.g. an external reference).
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub section_index: u32,
    pub value: u64,
    pub size: u64,
    pub symbol_type: u16,
    pub flags: u16,
    pub target_id: u32,
}

impl Symbol {
    pub fn has_flag(&self, flag: SymbolFlags) -> bool {
        self.flags & (flag as u16) != 0
    }

    pub fn is_global(&self) -> bool {
        self.has_flag(SymbolFlags::Global)
    }

    pub fn is_undefined(&self) -> bool {
        self.section_index == 0
    }

    pub fn is_function(&self) -> bool {
        self.symbol_type == SymbolType::Function as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_entry_roundtrip() {
        let entry = SymbolEntry {
            name_offset: 4,
            section_index: 1,
            value: 0,
            size: 16,
            symbol_type: SymbolType::Function as u16,
            flags: SymbolFlags::Global as u16,
            target_id: 1,
        };
        let bytes = entry.encode();
        assert_eq!(bytes.len(), SYMBOL_ENTRY_SIZE);
        assert_eq!(SymbolEntry::decode(&bytes).unwrap(), entry);
    }

    #[test]
    fn symbol_flag_helpers() {
        let symbol = Symbol {
            name: "main".to_string(),
            section_index: 1,
            value: 0,
            size: 4,
            symbol_type: SymbolType::Function as u16,
            flags: SymbolFlags::Global as u16,
            target_id: 1,
        };
        assert!(symbol.is_global());
        assert!(symbol.is_function());
        assert!(!symbol.is_undefined());
    }

    #[test]
    fn undefined_symbol_has_zero_section_index() {
        let symbol = Symbol {
            name: "extern_fn".to_string(),
            section_index: 0,
            value: 0,
            size: 0,
            symbol_type: SymbolType::Function as u16,
            flags: SymbolFlags::Undefined as u16,
            target_id: 0,
        };
        assert!(symbol.is_undefined());
    }
}
