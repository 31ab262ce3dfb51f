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

//! The in-memory IR the parser builds and the COF writer consumes: Module,
//! Function, AbiDefinition and the section-under-construction state. Label
//! references are never back-patched into operands here (SPEC_FULL.md's
//! resolved Open Question) — they are emitted as `Immediate::Symbol`
//! operands by the parser, and `Function::resolve_labels` only confirms
//! every reference names a label or a module-level symbol, the way a
//! diagnostic pass would, not a code-rewriting one.

use std::collections::HashMap;

use crate::cof::section::{SectionFlags, SectionType};
use crate::cof::symbol::{SymbolFlags, SymbolType};
use crate::cof::{CofFile, RelocationEntry};
use crate::error::CoilError;
use crate::instruction::Instruction;

#[derive(Debug, Clone, Default)]
pub struct AbiDefinition {
    pub name: String,
    pub arg_regs: Vec<u8>,
    pub ret_regs: Vec<u8>,
    pub preserved_regs: Vec<u8>,
    pub volatile_regs: Vec<u8>,
    pub stack_align: u32,
}

impl AbiDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stack_align: 16,
            ..Default::default()
        }
    }
}

/// A function body: an ordered instruction stream, its label table, and the
/// per-variable type/init-value side tables a Function carries.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub flags: u16,
    pub section: String,
    pub instructions: Vec<Instruction>,
    pub labels: HashMap<String, usize>,
    pub unresolved_refs: Vec<(usize, String)>,
    pub variable_types: HashMap<u8, u8>,
    pub variable_init_values: HashMap<u8, Vec<u8>>,
}

impl Function {
    pub fn new(name: impl Into<String>, flags: u16, section: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags,
            section: section.into(),
            instructions: Vec::new(),
            labels: HashMap::new(),
            unresolved_refs: Vec::new(),
            variable_types: HashMap::new(),
            variable_init_values: HashMap::new(),
        }
    }

    pub fn add_instruction(&mut self, instruction: Instruction) -> usize {
        let index = self.instructions.len();
        self.instructions.push(instruction);
        index
    }

    /// Declares a label at the current instruction index. Fails if the name
    /// is already taken within this function (labels are unique per function).
    pub fn add_label(&mut self, name: impl Into<String>) -> Result<(), CoilError> {
        let name = name.into();
        let index = self.instructions.len();
        if self.labels.insert(name.clone(), index).is_some() {
            return Err(CoilError::Semantic {
                location: crate::diagnostics::SourceLocation::new("<module>".into(), 1, 1),
                reason: format!("duplicate label '{name}' in function '{}'", self.name),
            });
        }
        Ok(())
    }

    pub fn add_label_ref(&mut self, instruction_index: usize, label_name: impl Into<String>) {
        self.unresolved_refs.push((instruction_index, label_name.into()));
    }

    pub fn set_variable_type(&mut self, var_id: u8, type_id: u8) {
        self.variable_types.insert(var_id, type_id);
    }

    pub fn variable_type(&self, var_id: u8) -> u8 {
        self.variable_types.get(&var_id).copied().unwrap_or(0)
    }

    pub fn set_variable_init_value(&mut self, var_id: u8, value: Vec<u8>) {
        self.variable_init_values.insert(var_id, value);
    }

    pub fn variable_init_value(&self, var_id: u8) -> &[u8] {
        self.variable_init_values.get(&var_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Confirms every recorded label reference names either a local label or
    /// a global symbol. Never rewrites an operand — see the module doc.
    pub fn resolve_labels(&self, global_symbols: &HashMap<String, u64>) -> Result<(), CoilError> {
        for (_, label_name) in &self.unresolved_refs {
            if self.labels.contains_key(label_name) {
                continue;
            }
            if global_symbols.contains_key(label_name) {
                continue;
            }
            return Err(CoilError::Semantic {
                location: crate::diagnostics::SourceLocation::new("<module>".into(), 1, 1),
                reason: format!("unresolved label reference: {label_name}"),
            });
        }
        Ok(())
    }
}

/// The IR-side half of a section: the live buffer the parser appends into,
/// before `finalize` turns its pending instructions into section bytes.
#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    pub section_type: u32,
    pub flags: u32,
    pub target_id: u32,
    pub virtual_address: u64,
    pub alignment: u32,
    pub data: Vec<u8>,
    pub relocations: Vec<RelocationEntry>,
    pub pending_instructions: Vec<Instruction>,
}

impl Section {
    pub fn new(name: impl Into<String>, section_type: u32, flags: u32, target_id: u32) -> Self {
        Self {
            name: name.into(),
            section_type,
            flags,
            target_id,
            virtual_address: 0,
            alignment: 4,
            data: Vec::new(),
            relocations: Vec::new(),
            pending_instructions: Vec::new(),
        }
    }

    pub fn add_relocation(&mut self, relocation: RelocationEntry) {
        self.relocations.push(relocation);
    }

    /// Appends `instructions`' binary encoding to the section's data buffer,
    /// returning the byte offset at which it begins.
    fn append_encoded(&mut self, instructions: &[Instruction]) -> Result<u64, CoilError> {
        let start = self.data.len() as u64;
        for instruction in instructions {
            self.data.extend_from_slice(&instruction.encode()?);
        }
        Ok(start)
    }

    /// Converts the section's own top-level pending instructions into data
    /// bytes. Functions assigned to this section are appended separately by
    /// `Module::generate_cof`, which needs their individual byte ranges to
    /// size each function symbol.
    pub fn finalize(&mut self) -> Result<(), CoilError> {
        let pending = std::mem::take(&mut self.pending_instructions);
        self.append_encoded(&pending)?;
        Ok(())
    }
}

/// Maps the parser's section-name heuristics and flag keywords (`SECT`)
/// to the fixed `SectionType`/`SectionFlags` values.
pub fn section_type_for_name(name: &str, default: u32) -> u32 {
    match name {
        "text" | "code" => SectionType::Code as u32,
        "data" => SectionType::Data as u32,
        "rodata" => SectionType::Readonly as u32,
        "bss" => SectionType::Bss as u32,
        _ => default,
    }
}

/// A module: the parser's top-level build target. Owns every Function and
/// Section exclusively; destroying the Module releases them.
pub struct Module {
    pub name: String,
    pub functions: Vec<Function>,
    pub function_index: HashMap<String, usize>,
    pub abi_definitions: HashMap<String, AbiDefinition>,
    pub directives: HashMap<String, String>,
    pub sections: Vec<Section>,
    section_index: HashMap<String, usize>,
    pub current_section: String,
    pub current_section_type: u32,
    pub current_section_flags: u32,
    pub current_target_id: u32,
    /// Targets registered by `DIR TARGET <name> <arch>`, in declaration
    /// order; target_id 0 is always the implicit/default target supplied
    /// to `generate_cof`, so these start at id 1.
    pub named_targets: Vec<(String, u32)>,
    named_target_index: HashMap<String, u32>,
    /// `DIR GLOBAL/LOCAL/WEAK <name>` outside any function: a flag to OR
    /// into the named symbol once it is materialized, whether it was
    /// already defined or is still forward-referenced.
    pub pending_symbol_flags: HashMap<String, u16>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        let mut module = Self {
            name: name.into(),
            functions: Vec::new(),
            function_index: HashMap::new(),
            abi_definitions: HashMap::new(),
            directives: HashMap::new(),
            sections: Vec::new(),
            section_index: HashMap::new(),
            current_section: "text".to_string(),
            current_section_type: SectionType::Code as u32,
            current_section_flags: SectionFlags::Alloc as u32,
            current_target_id: 0,
            named_targets: Vec::new(),
            named_target_index: HashMap::new(),
            pending_symbol_flags: HashMap::new(),
        };
        module.get_or_create_section(
            "text",
            SectionType::Code as u32,
            SectionFlags::Alloc as u32,
            0,
        );
        module
    }

    pub fn get_or_create_section(
        &mut self,
        name: &str,
        section_type: u32,
        flags: u32,
        target_id: u32,
    ) -> &mut Section {
        if let Some(&idx) = self.section_index.get(name) {
            return &mut self.sections[idx];
        }
        let idx = self.sections.len();
        self.sections.push(Section::new(name, section_type, flags, target_id));
        self.section_index.insert(name.to_string(), idx);
        &mut self.sections[idx]
    }

    pub fn set_current_section(&mut self, name: impl Into<String>, section_type: u32, flags: u32) {
        let name = name.into();
        self.get_or_create_section(&name, section_type, flags, self.current_target_id);
        self.current_section = name;
        self.current_section_type = section_type;
        self.current_section_flags = flags;
    }

    /// `DIR TARGET <name> <arch>`: registers (or re-selects, if already
    /// registered) a named target and makes it current for every section
    /// and instruction that follows until the next `TARGET` directive.
    pub fn register_target(&mut self, name: impl Into<String>, arch_type: u32) -> u32 {
        let name = name.into();
        if let Some(&id) = self.named_target_index.get(&name) {
            self.current_target_id = id;
            return id;
        }
        let id = 1 + self.named_targets.len() as u32;
        self.named_targets.push((name.clone(), arch_type));
        self.named_target_index.insert(name, id);
        self.current_target_id = id;
        id
    }

    /// `DIR ALIGN <n>`: sets the current section's alignment. Caller must
    /// have already validated `n` is a power of two.
    pub fn set_current_section_alignment(&mut self, alignment: u32) {
        let name = self.current_section.clone();
        let section_type = self.current_section_type;
        let flags = self.current_section_flags;
        let target_id = self.current_target_id;
        self.get_or_create_section(&name, section_type, flags, target_id).alignment = alignment;
    }

    /// `DIR GLOBAL/LOCAL/WEAK <name>`: records a flag to apply to the named
    /// symbol whenever it is materialized, whether it already exists or is
    /// still forward-referenced.
    pub fn mark_symbol_flag(&mut self, name: impl Into<String>, flag: u16) {
        let name = name.into();
        if let Some(idx) = self.function_index.get(&name).copied() {
            self.functions[idx].flags |= flag;
        }
        *self.pending_symbol_flags.entry(name).or_insert(0) |= flag;
    }

    pub fn add_function(&mut self, mut function: Function) -> Result<(), CoilError> {
        if self.function_index.contains_key(&function.name) {
            return Err(CoilError::Semantic {
                location: crate::diagnostics::SourceLocation::new("<module>".into(), 1, 1),
                reason: format!("duplicate function: {}", function.name),
            });
        }
        if let Some(&pending) = self.pending_symbol_flags.get(&function.name) {
            function.flags |= pending;
        }
        let idx = self.functions.len();
        self.function_index.insert(function.name.clone(), idx);
        self.functions.push(function);
        Ok(())
    }

    pub fn function_by_name(&self, name: &str) -> Option<&Function> {
        self.function_index.get(name).map(|&idx| &self.functions[idx])
    }

    pub fn add_abi_definition(&mut self, def: AbiDefinition) -> Result<(), CoilError> {
        if self.abi_definitions.contains_key(&def.name) {
            return Err(CoilError::Semantic {
                location: crate::diagnostics::SourceLocation::new("<module>".into(), 1, 1),
                reason: format!("duplicate ABI definition: {}", def.name),
            });
        }
        self.abi_definitions.insert(def.name.clone(), def);
        Ok(())
    }

    pub fn abi_definition(&self, name: &str) -> Option<&AbiDefinition> {
        self.abi_definitions.get(name)
    }

    pub fn add_directive(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.directives.insert(name.into(), value.into());
    }

    pub fn directive(&self, name: &str) -> Option<&str> {
        self.directives.get(name).map(String::as_str)
    }

    /// Builds the relocatable COF image: the default target plus every
    /// `DIR TARGET`-registered target, every section in declaration order,
    /// and one symbol per function, placed into the
    /// section it was declared under (`HINT ... FUNC` inherits the
    /// Module's current section at the time the function began). A
    /// section's own top-level instructions precede the functions assigned
    /// to it, in declaration order — the corpus's `generateCof` does not
    /// preserve finer interleaving than this, and neither does this build.
    pub fn generate_cof(&self, target_name: &str, arch_type: u32) -> Result<CofFile, CoilError> {
        let mut cof = CofFile::new();
        // The implicit/default target always takes id 0; named targets
        // registered via `DIR TARGET` were assigned ids 1, 2, … in
        // declaration order and must land in the table in that same order.
        cof.add_target(arch_type, 0, target_name);
        for (name, named_arch_type) in &self.named_targets {
            cof.add_target(*named_arch_type, 0, name);
        }

        let mut sections: Vec<Section> = self.sections.clone();
        let mut global_symbols: HashMap<String, u64> = HashMap::new();

        // Each section's own top-level instructions (from statements outside
        // any function) are laid down first, so the functions assigned to
        // that section always follow them, per declaration order.
        for section in &mut sections {
            section.finalize()?;
        }

        let mut function_ranges: Vec<(usize, u64, u64)> = Vec::new(); // (section idx, start, len)
        for function in &self.functions {
            let section_idx = *self
                .section_index
                .get(&function.section)
                .ok_or_else(|| CoilError::Internal {
                    reason: format!("function '{}' references unknown section '{}'", function.name, function.section),
                })?;
            let section = &mut sections[section_idx];
            let start = section.append_encoded(&function.instructions)?;
            let len = section.data.len() as u64 - start;
            function_ranges.push((section_idx, start, len));
        }

        for function in &self.functions {
            global_symbols.insert(function.name.clone(), 0);
        }
        for function in &self.functions {
            function.resolve_labels(&global_symbols)?;
        }

        // Each section already carries the target it was assigned under
        // (defaulting to 0, the implicit target, unless a `DIR TARGET`
        // directive was active when it was created) — the writer must not
        // collapse every section onto a single target id.
        let section_target_ids: Vec<u32> = sections.iter().map(|s| s.target_id).collect();
        for section in sections {
            let cof_section = cof.add_section(&section.name, section.section_type, section.flags, section.target_id);
            cof_section.alignment = section.alignment.max(1);
            cof_section.address = section.virtual_address;
            cof_section.data = section.data;
            cof_section.relocations = section.relocations;
        }

        for (function, (section_idx, start, len)) in self.functions.iter().zip(function_ranges) {
            let target_id = section_target_ids.get(section_idx).copied().unwrap_or(0);
            cof.add_symbol(
                &function.name,
                (section_idx + 1) as u32,
                start,
                len,
                SymbolType::Function as u16,
                function_flags_to_symbol_flags(function.flags),
                target_id,
            );
        }

        Ok(cof)
    }
}

fn function_flags_to_symbol_flags(flags: u16) -> u16 {
    flags
}

pub const SYMBOL_FLAG_GLOBAL: u16 = SymbolFlags::Global as u16;
pub const SYMBOL_FLAG_LOCAL: u16 = SymbolFlags::Local as u16;
pub const SYMBOL_FLAG_WEAK: u16 = SymbolFlags::Weak as u16;
pub const SYMBOL_FLAG_HIDDEN: u16 = SymbolFlags::Hidden as u16;
pub const SYMBOL_FLAG_PROTECTED: u16 = SymbolFlags::Protected as u16;
pub const SYMBOL_FLAG_EXPORTED: u16 = SymbolFlags::Exported as u16;
