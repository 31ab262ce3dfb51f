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

//! `CofFile`: the in-memory model of a whole COIL Object File — header,
//! targets, sections, symbols and their shared string pool — plus the
//! `write`/`read` entry points that hand off to `writer`/`reader`.

pub mod header;
pub mod reader;
pub mod section;
pub mod string_pool;
pub mod symbol;
pub mod target;
pub mod writer;

pub use header::CofHeader;
pub use section::{RelocationEntry, Section, SectionFlags, SectionType};
pub use string_pool::StringPool;
pub use symbol::{Symbol, SymbolFlags, SymbolType};
pub use target::{ArchType, Target};

use crate::error::CoilError;

pub struct CofFile {
    pub header: CofHeader,
    pub targets: Vec<Target>,
    pub sections: Vec<Section>,
    pub symbols: Vec<Symbol>,
    symbol_index: std::collections::HashMap<String, usize>,
}

impl CofFile {
    pub fn new() -> Self {
        Self::with_identity(CofHeader::random_uuid_v4(), CofHeader::now_timestamp())
    }

    /// Builds a `CofFile` with a caller-pinned UUID/timestamp, so tests can
    /// assert exact golden bytes instead of tolerating nondeterministic ones.
    pub fn with_identity(uuid: [u8; 16], timestamp: u64) -> Self {
        Self {
            header: CofHeader::new(uuid, timestamp),
            targets: Vec::new(),
            sections: Vec::new(),
            symbols: Vec::new(),
            symbol_index: std::collections::HashMap::new(),
        }
    }

    pub fn add_target(&mut self, arch_type: u32, features: u32, name: &str) -> u32 {
        let target_id = self.targets.len() as u32;
        self.targets.push(Target {
            target_id,
            arch_type,
            features,
            name: name.to_string(),
            config: Vec::new(),
        });
        target_id
    }

    pub fn add_section(
        &mut self,
        name: &str,
        section_type: u32,
        flags: u32,
        target_id: u32,
    ) -> &mut Section {
        self.sections.push(Section::new(name, section_type, flags, target_id));
        self.sections.last_mut().unwrap()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_symbol(
        &mut self,
        name: &str,
        section_index: u32,
        value: u64,
        size: u64,
        symbol_type: u16,
        flags: u16,
        target_id: u32,
    ) -> usize {
        let index = self.symbols.len();
        self.symbols.push(Symbol {
            name: name.to_string(),
            section_index,
            value,
            size,
            symbol_type,
            flags,
            target_id,
        });
        self.symbol_index.insert(name.to_string(), index);
        index
    }

    pub fn set_entry_point(&mut self, entry_point: u64) {
        self.header.entry_point = entry_point;
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn section(&self, index: usize) -> Option<&Section> {
        self.sections.get(index)
    }

    pub fn symbol(&self, index: usize) -> Option<&Symbol> {
        self.symbols.get(index)
    }

    pub fn symbol_by_name(&self, name: &str) -> Option<&Symbol> {
        self.symbol_index.get(name).map(|&idx| &self.symbols[idx])
    }

    pub fn write(&self) -> Result<Vec<u8>, CoilError> {
        writer::write(self)
    }

    pub fn read(buf: &[u8]) -> Result<Self, CoilError> {
        reader::read(buf)
    }
}

impl Default for CofFile {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_file_starts_empty() {
        let cof = CofFile::new();
        assert_eq!(cof.target_count(), 0);
        assert_eq!(cof.section_count(), 0);
        assert_eq!(cof.symbol_count(), 0);
    }

    #[test]
    fn symbol_lookup_by_name() {
        let mut cof = CofFile::new();
        cof.add_symbol("main", 1, 0, 4, SymbolType::Function as u16, 0, 0);
        assert!(cof.symbol_by_name("main").is_some());
        assert!(cof.symbol_by_name("missing").is_none());
    }
}
