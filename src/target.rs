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

//! The target capability boundary: what a backend needs to provide to turn
//! target-neutral COIL instructions into something a concrete architecture
//! can run. This assembler never calls these — emitting the tagged-sum COF
//! output is the whole job — but the trait is the documented seam a
//! lowering/codegen stage downstream of this crate would implement against.

use crate::cof::target::ArchType;
use crate::error::CoilError;
use crate::instruction::Instruction;
use crate::module::Function;

/// Maps a virtual register id to a physical one on a concrete target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterMapping {
    pub vreg_id: u8,
    pub preg_id: u8,
    pub preg_class: u8,
    pub flags: u8,
}

impl RegisterMapping {
    pub fn new(vreg_id: u8, preg_id: u8, preg_class: u8) -> Self {
        Self {
            vreg_id,
            preg_id,
            preg_class,
            flags: 0,
        }
    }
}

/// Sentinel returned by `physical_register_for` when a virtual register has
/// no mapping on this target.
pub const NO_PHYSICAL_REGISTER: u8 = 0xFF;

/// A target architecture's lowering capability. Implementors own register
/// allocation and ABI-specific prologue/epilogue shape; this assembler's job
/// ends at producing the COF image a `Target` implementation would consume.
pub trait Target {
    fn id(&self) -> u32;
    fn arch_type(&self) -> ArchType;
    fn word_size(&self) -> u8;
    fn name(&self) -> &str;

    /// Rewrites `instruction` in place into this target's representation
    /// (e.g. resolving a virtual register operand to a physical one).
    fn transform_instruction(&self, instruction: &mut Instruction) -> Result<(), CoilError>;

    /// Assigns physical registers to every virtual register a function
    /// references, recording the mapping for later `physical_register_for`
    /// lookups.
    fn allocate_registers(&mut self, function: &Function) -> Result<(), CoilError>;

    /// Produces the instruction sequence a function body must be prefixed
    /// with on this target (stack frame setup, callee-saved register saves).
    fn generate_prologue(&self, function: &Function) -> Result<Vec<Instruction>, CoilError>;

    /// Produces the instruction sequence a function body must be suffixed
    /// with on this target (stack frame teardown, register restores).
    fn generate_epilogue(&self, function: &Function) -> Result<Vec<Instruction>, CoilError>;

    /// Looks up the physical register assigned to a virtual register id, or
    /// `NO_PHYSICAL_REGISTER` if none has been allocated.
    fn physical_register_for(&self, vreg_id: u8) -> u8;
}

/// A minimal `Target` that performs no lowering at all: no virtual register
/// is ever mapped to a physical one, prologue/epilogue are empty, and
/// `transform_instruction` is a no-op. Useful as the default wiring for
/// callers that want a concrete `Target` (tests, a driver that hasn't
/// picked a real backend yet) without pulling in per-architecture logic —
/// the core itself never constructs or calls this.
pub struct GenericTarget {
    id: u32,
    arch_type: ArchType,
    name: String,
    word_size: u8,
}

impl GenericTarget {
    pub fn new(id: u32, arch_type: ArchType, name: impl Into<String>, word_size: u8) -> Self {
        Self {
            id,
            arch_type,
            name: name.into(),
            word_size,
        }
    }
}

impl Target for GenericTarget {
    fn id(&self) -> u32 {
        self.id
    }

    fn arch_type(&self) -> ArchType {
        self.arch_type
    }

    fn word_size(&self) -> u8 {
        self.word_size
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn transform_instruction(&self, _instruction: &mut Instruction) -> Result<(), CoilError> {
        Ok(())
    }

    fn allocate_registers(&mut self, _function: &Function) -> Result<(), CoilError> {
        Ok(())
    }

    fn generate_prologue(&self, _function: &Function) -> Result<Vec<Instruction>, CoilError> {
        Ok(Vec::new())
    }

    fn generate_epilogue(&self, _function: &Function) -> Result<Vec<Instruction>, CoilError> {
        Ok(Vec::new())
    }

    fn physical_register_for(&self, _vreg_id: u8) -> u8 {
        NO_PHYSICAL_REGISTER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_mapping_defaults_to_no_flags() {
        let mapping = RegisterMapping::new(1, 0, 0);
        assert_eq!(mapping.flags, 0);
    }

    #[test]
    fn generic_target_maps_nothing_and_transforms_nothing() {
        let mut target = GenericTarget::new(0, ArchType::X86_64, "x86-64", 8);
        assert_eq!(target.physical_register_for(0x00), NO_PHYSICAL_REGISTER);
        let function = Function::new("f", 0, "text");
        assert!(target.allocate_registers(&function).unwrap() == ());
        assert!(target.generate_prologue(&function).unwrap().is_empty());
        assert!(target.generate_epilogue(&function).unwrap().is_empty());
    }
}
