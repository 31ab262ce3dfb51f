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

//! Target architecture table entries and the `ArchType` enumeration.

use crate::error::CoilError;

pub const TARGET_ENTRY_SIZE: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchType {
    X86 = 0,
    X86_64 = 1,
    Arm = 2,
    Arm64 = 3,
    RiscV32 = 4,
    RiscV64 = 5,
    PowerPc = 6,
    PowerPc64 = 7,
    Mips = 8,
    Mips64 = 9,
    Sparc = 10,
    Sparc64 = 11,
    Wasm = 12,
}

impl ArchType {
    /// Maps a CLI `-t` target name to its arch type, the way the driver's
    /// `Default target = x86-64` boundary contract expects. Unknown
    /// names fall back to `X86_64` rather than failing here — the core
    /// only tags sections/targets, it does not validate that a backend for
    /// the requested name actually exists.
    pub fn from_target_name(name: &str) -> Self {
        match name {
            "x86" | "i386" | "i686" => ArchType::X86,
            "x86-64" | "x86_64" | "amd64" => ArchType::X86_64,
            "arm" | "armv7" => ArchType::Arm,
            "arm64" | "aarch64" => ArchType::Arm64,
            "riscv32" => ArchType::RiscV32,
            "riscv64" => ArchType::RiscV64,
            "powerpc" | "ppc" => ArchType::PowerPc,
            "powerpc64" | "ppc64" => ArchType::PowerPc64,
            "mips" => ArchType::Mips,
            "mips64" => ArchType::Mips64,
            "sparc" => ArchType::Sparc,
            "sparc64" => ArchType::Sparc64,
            "wasm" | "wasm32" => ArchType::Wasm,
            _ => ArchType::X86_64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetEntry {
    pub target_id: u32,
    pub arch_type: u32,
    pub features: u32,
    pub name_offset: u32,
    pub config_offset: u32,
    pub config_size: u32,
}

impl TargetEntry {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(TARGET_ENTRY_SIZE);
        out.extend_from_slice(&self.target_id.to_le_bytes());
        out.extend_from_slice(&self.arch_type.to_le_bytes());
        out.extend_from_slice(&self.features.to_le_bytes());
        out.extend_from_slice(&self.name_offset.to_le_bytes());
        out.extend_from_slice(&self.config_offset.to_le_bytes());
        out.extend_from_slice(&self.config_size.to_le_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CoilError> {
        if buf.len() < TARGET_ENTRY_SIZE {
            return Err(CoilError::InvalidFormat {
                reason: "truncated target table entry".to_string(),
            });
        }
        Ok(Self {
            target_id: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            arch_type: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            features: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            name_offset: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            config_offset: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
            config_size: u32::from_le_bytes(buf[20..24].try_into().unwrap()),
        })
    }
}

/// An owned target-architecture entry inside a `CofFile`, before its name
/// and config blob have been assigned string-pool/data offsets.
#[derive(Debug, Clone)]
pub struct Target {
    pub target_id: u32,
    pub arch_type: u32,
    pub features: u32,
    pub name: String,
    pub config: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_entry_roundtrip() {
        let entry = TargetEntry {
            target_id: 1,
            arch_type: ArchType::X86_64 as u32,
            features: 0,
            name_offset: 1,
            config_offset: 0,
            config_size: 0,
        };
        let bytes = entry.encode();
        assert_eq!(bytes.len(), TARGET_ENTRY_SIZE);
        assert_eq!(TargetEntry::decode(&bytes).unwrap(), entry);
    }
}
