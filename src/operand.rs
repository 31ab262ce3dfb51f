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

//! Operand type bytes and payload layouts. Top two bits of the leading byte
//! are the class, bottom six the sub-kind; every variant's payload length is
//! fixed by its sub-kind alone, so decoding never has to look ahead.

use std::fmt;

use crate::error::CoilError;

const CLASS_REGISTER: u8 = 0x00;
const CLASS_IMMEDIATE: u8 = 0x40;
const CLASS_MEMORY: u8 = 0x80;
const CLASS_VARIABLE: u8 = 0xC0;
const CLASS_MASK: u8 = 0xC0;
const SUBKIND_MASK: u8 = 0x3F;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterClass {
    Gp = 0x00,
    Fp = 0x01,
    Vec = 0x02,
    Special = 0x03,
}

impl RegisterClass {
    fn from_subkind(b: u8) -> Result<Self, CoilError> {
        match b {
            0x00 => Ok(RegisterClass::Gp),
            0x01 => Ok(RegisterClass::Fp),
            0x02 => Ok(RegisterClass::Vec),
            0x03 => Ok(RegisterClass::Special),
            _ => Err(CoilError::InvalidFormat {
                reason: format!("unknown register sub-kind 0x{b:02x}"),
            }),
        }
    }

    /// Classifies a concrete register id by the fixed banding the ISA uses:
    /// GP 0x00-0x0F, FP 0x10-0x1F, Vec 0x20-0x2F, the rest special.
    pub fn from_reg_id(id: u8) -> Self {
        match id {
            0x00..=0x0F => RegisterClass::Gp,
            0x10..=0x1F => RegisterClass::Fp,
            0x20..=0x2F => RegisterClass::Vec,
            _ => RegisterClass::Special,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImmediateKind {
    Int8 = 0x00,
    Int16 = 0x01,
    Int32 = 0x02,
    Int64 = 0x03,
    Float32 = 0x04,
    Float64 = 0x05,
    Symbol = 0x06,
}

impl ImmediateKind {
    fn from_subkind(b: u8) -> Result<Self, CoilError> {
        match b {
            0x00 => Ok(ImmediateKind::Int8),
            0x01 => Ok(ImmediateKind::Int16),
            0x02 => Ok(ImmediateKind::Int32),
            0x03 => Ok(ImmediateKind::Int64),
            0x04 => Ok(ImmediateKind::Float32),
            0x05 => Ok(ImmediateKind::Float64),
            0x06 => Ok(ImmediateKind::Symbol),
            _ => Err(CoilError::InvalidFormat {
                reason: format!("unknown immediate sub-kind 0x{b:02x}"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Immediate {
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Symbol(String),
}

impl Immediate {
    fn kind(&self) -> ImmediateKind {
        match self {
            Immediate::Int8(_) => ImmediateKind::Int8,
            Immediate::Int16(_) => ImmediateKind::Int16,
            Immediate::Int32(_) => ImmediateKind::Int32,
            Immediate::Int64(_) => ImmediateKind::Int64,
            Immediate::Float32(_) => ImmediateKind::Float32,
            Immediate::Float64(_) => ImmediateKind::Float64,
            Immediate::Symbol(_) => ImmediateKind::Symbol,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryKind {
    Direct = 0x00,
    Reg = 0x01,
    RegDisp = 0x02,
    RegReg = 0x03,
    RegRegScale = 0x04,
    PreInc = 0x05,
    PreDec = 0x06,
    PostInc = 0x07,
    PostDec = 0x08,
}

impl MemoryKind {
    fn from_subkind(b: u8) -> Result<Self, CoilError> {
        match b {
            0x00 => Ok(MemoryKind::Direct),
            0x01 => Ok(MemoryKind::Reg),
            0x02 => Ok(MemoryKind::RegDisp),
            0x03 => Ok(MemoryKind::RegReg),
            0x04 => Ok(MemoryKind::RegRegScale),
            0x05 => Ok(MemoryKind::PreInc),
            0x06 => Ok(MemoryKind::PreDec),
            0x07 => Ok(MemoryKind::PostInc),
            0x08 => Ok(MemoryKind::PostDec),
            _ => Err(CoilError::InvalidFormat {
                reason: format!("unknown memory sub-kind 0x{b:02x}"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Memory {
    Direct(u32),
    Reg(u8),
    RegDisp(u8, i32),
    RegReg(u8, u8),
    RegRegScale(u8, u8, u8),
    PreInc(u8),
    PreDec(u8),
    PostInc(u8),
    PostDec(u8),
}

impl Memory {
    fn kind(&self) -> MemoryKind {
        match self {
            Memory::Direct(_) => MemoryKind::Direct,
            Memory::Reg(_) => MemoryKind::Reg,
            Memory::RegDisp(..) => MemoryKind::RegDisp,
            Memory::RegReg(..) => MemoryKind::RegReg,
            Memory::RegRegScale(..) => MemoryKind::RegRegScale,
            Memory::PreInc(_) => MemoryKind::PreInc,
            Memory::PreDec(_) => MemoryKind::PreDec,
            Memory::PostInc(_) => MemoryKind::PostInc,
            Memory::PostDec(_) => MemoryKind::PostDec,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableRefKind {
    Direct = 0x00,
    Addr = 0x01,
    Elem = 0x02,
    Field = 0x03,
}

impl VariableRefKind {
    fn from_subkind(b: u8) -> Result<Self, CoilError> {
        match b {
            0x00 => Ok(VariableRefKind::Direct),
            0x01 => Ok(VariableRefKind::Addr),
            0x02 => Ok(VariableRefKind::Elem),
            0x03 => Ok(VariableRefKind::Field),
            _ => Err(CoilError::InvalidFormat {
                reason: format!("unknown variable sub-kind 0x{b:02x}"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Register {
        reg_class: RegisterClass,
        reg_id: u8,
        flags: u8,
    },
    Immediate(Immediate),
    Memory(Memory),
    Variable {
        ref_kind: VariableRefKind,
        var_id: u8,
    },
}

impl Operand {
    pub fn register(reg_id: u8, flags: u8) -> Self {
        Operand::Register {
            reg_class: RegisterClass::from_reg_id(reg_id),
            reg_id,
            flags,
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Operand::Register { reg_class, reg_id, flags } => {
                out.push(CLASS_REGISTER | (*reg_class as u8));
                out.push(*reg_id);
                out.push(*flags);
            }
            Operand::Immediate(imm) => {
                out.push(CLASS_IMMEDIATE | (imm.kind() as u8));
                match imm {
                    Immediate::Int8(v) => out.push(*v as u8),
                    Immediate::Int16(v) => out.extend_from_slice(&v.to_le_bytes()),
                    Immediate::Int32(v) => out.extend_from_slice(&v.to_le_bytes()),
                    Immediate::Int64(v) => out.extend_from_slice(&v.to_le_bytes()),
                    Immediate::Float32(v) => out.extend_from_slice(&v.to_le_bytes()),
                    Immediate::Float64(v) => out.extend_from_slice(&v.to_le_bytes()),
                    Immediate::Symbol(name) => {
                        out.extend_from_slice(name.as_bytes());
                        out.push(0);
                    }
                }
            }
            Operand::Memory(mem) => {
                out.push(CLASS_MEMORY | (mem.kind() as u8));
                match mem {
                    Memory::Direct(addr) => out.extend_from_slice(&addr.to_le_bytes()),
                    Memory::Reg(r) => out.push(*r),
                    Memory::RegDisp(r, disp) => {
                        out.push(*r);
                        out.extend_from_slice(&disp.to_le_bytes());
                    }
                    Memory::RegReg(a, b) => {
                        out.push(*a);
                        out.push(*b);
                    }
                    Memory::RegRegScale(a, b, scale) => {
                        out.push(*a);
                        out.push(*b);
                        out.push(*scale);
                    }
                    Memory::PreInc(r) | Memory::PreDec(r) | Memory::PostInc(r) | Memory::PostDec(r) => {
                        out.push(*r);
                    }
                }
            }
            Operand::Variable { ref_kind, var_id } => {
                out.push(CLASS_VARIABLE | (*ref_kind as u8));
                out.push(*var_id);
            }
        }
    }

    /// Decodes one operand from `buf` starting at `pos`, returning the
    /// operand and the new cursor position.
    pub fn decode(buf: &[u8], pos: usize) -> Result<(Operand, usize), CoilError> {
        let type_byte = *buf.get(pos).ok_or_else(|| truncated("operand type byte"))?;
        let class = type_byte & CLASS_MASK;
        let subkind = type_byte & SUBKIND_MASK;
        let mut p = pos + 1;

        match class {
            CLASS_REGISTER => {
                let reg_class = RegisterClass::from_subkind(subkind)?;
                let reg_id = read_u8(buf, &mut p)?;
                let flags = read_u8(buf, &mut p)?;
                Ok((Operand::Register { reg_class, reg_id, flags }, p))
            }
            CLASS_IMMEDIATE => {
                let kind = ImmediateKind::from_subkind(subkind)?;
                let imm = match kind {
                    ImmediateKind::Int8 => Immediate::Int8(read_u8(buf, &mut p)? as i8),
                    ImmediateKind::Int16 => Immediate::Int16(i16::from_le_bytes(read_n(buf, &mut p)?)),
                    ImmediateKind::Int32 => Immediate::Int32(i32::from_le_bytes(read_n(buf, &mut p)?)),
                    ImmediateKind::Int64 => Immediate::Int64(i64::from_le_bytes(read_n(buf, &mut p)?)),
                    ImmediateKind::Float32 => Immediate::Float32(f32::from_le_bytes(read_n(buf, &mut p)?)),
                    ImmediateKind::Float64 => Immediate::Float64(f64::from_le_bytes(read_n(buf, &mut p)?)),
                    ImmediateKind::Symbol => Immediate::Symbol(read_nul_terminated(buf, &mut p)?),
                };
                Ok((Operand::Immediate(imm), p))
            }
            CLASS_MEMORY => {
                let kind = MemoryKind::from_subkind(subkind)?;
                let mem = match kind {
                    MemoryKind::Direct => Memory::Direct(u32::from_le_bytes(read_n(buf, &mut p)?)),
                    MemoryKind::Reg => Memory::Reg(read_u8(buf, &mut p)?),
                    MemoryKind::RegDisp => {
                        let r = read_u8(buf, &mut p)?;
                        let disp = i32::from_le_bytes(read_n(buf, &mut p)?);
                        Memory::RegDisp(r, disp)
                    }
                    MemoryKind::RegReg => {
                        let a = read_u8(buf, &mut p)?;
                        let b = read_u8(buf, &mut p)?;
                        Memory::RegReg(a, b)
                    }
                    MemoryKind::RegRegScale => {
                        let a = read_u8(buf, &mut p)?;
                        let b = read_u8(buf, &mut p)?;
                        let scale = read_u8(buf, &mut p)?;
                        Memory::RegRegScale(a, b, scale)
                    }
                    MemoryKind::PreInc => Memory::PreInc(read_u8(buf, &mut p)?),
                    MemoryKind::PreDec => Memory::PreDec(read_u8(buf, &mut p)?),
                    MemoryKind::PostInc => Memory::PostInc(read_u8(buf, &mut p)?),
                    MemoryKind::PostDec => Memory::PostDec(read_u8(buf, &mut p)?),
                };
                Ok((Operand::Memory(mem), p))
            }
            CLASS_VARIABLE => {
                let ref_kind = VariableRefKind::from_subkind(subkind)?;
                let var_id = read_u8(buf, &mut p)?;
                Ok((Operand::Variable { ref_kind, var_id }, p))
            }
            _ => unreachable!("class mask only admits the four values above"),
        }
    }
}

fn truncated(what: &str) -> CoilError {
    CoilError::InvalidFormat {
        reason: format!("truncated operand: missing {what}"),
    }
}

fn read_u8(buf: &[u8], pos: &mut usize) -> Result<u8, CoilError> {
    let b = *buf.get(*pos).ok_or_else(|| truncated("operand payload byte"))?;
    *pos += 1;
    Ok(b)
}

fn read_n<const N: usize>(buf: &[u8], pos: &mut usize) -> Result<[u8; N], CoilError> {
    let slice = buf
        .get(*pos..*pos + N)
        .ok_or_else(|| truncated("operand payload"))?;
    *pos += N;
    let mut arr = [0u8; N];
    arr.copy_from_slice(slice);
    Ok(arr)
}

fn read_nul_terminated(buf: &[u8], pos: &mut usize) -> Result<String, CoilError> {
    let start = *pos;
    let end = buf[start..]
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| truncated("NUL-terminated symbol name"))?;
    let name = String::from_utf8_lossy(&buf[start..start + end]).into_owned();
    *pos = start + end + 1;
    Ok(name)
}

fn register_name(reg_class: RegisterClass, reg_id: u8) -> String {
    match reg_class {
        RegisterClass::Gp => format!("R{reg_id}"),
        RegisterClass::Fp => format!("F{}", reg_id - 0x10),
        RegisterClass::Vec => format!("V{}", reg_id - 0x20),
        RegisterClass::Special => match reg_id {
            0x30 => "PC".to_string(),
            0x31 => "SP".to_string(),
            0x32 => "FP".to_string(),
            0x33 => "FLAGS".to_string(),
            0x34 => "LR".to_string(),
            other => format!("S{other}"),
        },
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Register { reg_class, reg_id, flags } => {
                write!(f, "{}", register_name(*reg_class, *reg_id))?;
                if *flags != 0 {
                    write!(f, ".{flags:02x}")?;
                }
                Ok(())
            }
            Operand::Immediate(imm) => match imm {
                Immediate::Int8(v) => write!(f, "{v}"),
                Immediate::Int16(v) => write!(f, "{v}"),
                Immediate::Int32(v) => write!(f, "{v}"),
                Immediate::Int64(v) => write!(f, "{v}"),
                Immediate::Float32(v) => write!(f, "{v:.6}"),
                Immediate::Float64(v) => write!(f, "{v:.15}"),
                Immediate::Symbol(name) => write!(f, "{name}"),
            },
            Operand::Memory(mem) => match mem {
                Memory::Direct(addr) => write!(f, "[0x{addr:x}]"),
                Memory::Reg(r) => write!(f, "[{}]", register_name(RegisterClass::from_reg_id(*r), *r)),
                Memory::RegDisp(r, disp) => {
                    let reg = register_name(RegisterClass::from_reg_id(*r), *r);
                    if *disp >= 0 {
                        write!(f, "[{reg} + {disp}]")
                    } else {
                        write!(f, "[{reg} - {}]", -(*disp as i64))
                    }
                }
                Memory::RegReg(a, b) => write!(
                    f,
                    "[{} + {}]",
                    register_name(RegisterClass::from_reg_id(*a), *a),
                    register_name(RegisterClass::from_reg_id(*b), *b)
                ),
                Memory::RegRegScale(a, b, scale) => write!(
                    f,
                    "[{} + {}*{scale}]",
                    register_name(RegisterClass::from_reg_id(*a), *a),
                    register_name(RegisterClass::from_reg_id(*b), *b)
                ),
                Memory::PreInc(r) => write!(f, "[++{}]", register_name(RegisterClass::from_reg_id(*r), *r)),
                Memory::PreDec(r) => write!(f, "[--{}]", register_name(RegisterClass::from_reg_id(*r), *r)),
                Memory::PostInc(r) => write!(f, "[{}++]", register_name(RegisterClass::from_reg_id(*r), *r)),
                Memory::PostDec(r) => write!(f, "[{}--]", register_name(RegisterClass::from_reg_id(*r), *r)),
            },
            Operand::Variable { ref_kind, var_id } => match ref_kind {
                VariableRefKind::Direct => write!(f, "${var_id}"),
                VariableRefKind::Addr => write!(f, "&${var_id}"),
                VariableRefKind::Elem => write!(f, "${var_id}[idx]"),
                VariableRefKind::Field => write!(f, "${var_id}.field"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(op: Operand) {
        let mut buf = Vec::new();
        op.encode(&mut buf);
        let (decoded, consumed) = Operand::decode(&buf, 0).unwrap();
        assert_eq!(decoded, op);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn register_roundtrip() {
        roundtrip(Operand::register(0x00, 0));
        roundtrip(Operand::register(0x11, 0xff));
        roundtrip(Operand::register(0x30, 0));
    }

    #[test]
    fn register_encoding_matches_s3() {
        // MATH ADD R0, R1, imm32(42) — first two operands begin with 0x00.
        let r0 = Operand::register(0x00, 0);
        let r1 = Operand::register(0x01, 0);
        let mut buf = Vec::new();
        r0.encode(&mut buf);
        assert_eq!(buf[0], 0x00);
        buf.clear();
        r1.encode(&mut buf);
        assert_eq!(buf[0], 0x00);
    }

    #[test]
    fn immediate_int32_encoding_matches_s3() {
        let imm = Operand::Immediate(Immediate::Int32(42));
        let mut buf = Vec::new();
        imm.encode(&mut buf);
        assert_eq!(buf, vec![0x42, 0x2A, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn immediate_roundtrip_all_kinds() {
        roundtrip(Operand::Immediate(Immediate::Int8(-5)));
        roundtrip(Operand::Immediate(Immediate::Int16(-1000)));
        roundtrip(Operand::Immediate(Immediate::Int32(42)));
        roundtrip(Operand::Immediate(Immediate::Int64(-123456789)));
        roundtrip(Operand::Immediate(Immediate::Float32(1.5)));
        roundtrip(Operand::Immediate(Immediate::Float64(3.14159)));
        roundtrip(Operand::Immediate(Immediate::Symbol("main".to_string())));
    }

    #[test]
    fn memory_reg_reg_scale_matches_s4() {
        // [R1 + R2*4]
        let mem = Operand::Memory(Memory::RegRegScale(0x01, 0x02, 4));
        let mut buf = Vec::new();
        mem.encode(&mut buf);
        assert_eq!(buf, vec![0x84, 0x01, 0x02, 0x04]);
    }

    #[test]
    fn memory_roundtrip_all_kinds() {
        roundtrip(Operand::Memory(Memory::Direct(0x1000)));
        roundtrip(Operand::Memory(Memory::Reg(0x01)));
        roundtrip(Operand::Memory(Memory::RegDisp(0x01, -8)));
        roundtrip(Operand::Memory(Memory::RegReg(0x01, 0x02)));
        roundtrip(Operand::Memory(Memory::RegRegScale(0x01, 0x02, 4)));
        roundtrip(Operand::Memory(Memory::PreInc(0x01)));
        roundtrip(Operand::Memory(Memory::PreDec(0x01)));
        roundtrip(Operand::Memory(Memory::PostInc(0x01)));
        roundtrip(Operand::Memory(Memory::PostDec(0x01)));
    }

    #[test]
    fn variable_roundtrip() {
        roundtrip(Operand::Variable { ref_kind: VariableRefKind::Direct, var_id: 3 });
        roundtrip(Operand::Variable { ref_kind: VariableRefKind::Addr, var_id: 3 });
        roundtrip(Operand::Variable { ref_kind: VariableRefKind::Elem, var_id: 3 });
        roundtrip(Operand::Variable { ref_kind: VariableRefKind::Field, var_id: 3 });
    }

    #[test]
    fn unknown_subkind_is_malformed_operand() {
        let buf = [0x40 | 0x3F];
        let err = Operand::decode(&buf, 0).unwrap_err();
        assert!(matches!(err, CoilError::InvalidFormat { .. }));
    }

    #[test]
    fn truncated_payload_is_malformed_operand() {
        let buf = [0x42, 0x2A];
        let err = Operand::decode(&buf, 0).unwrap_err();
        assert!(matches!(err, CoilError::InvalidFormat { .. }));
    }

    #[test]
    fn display_forms() {
        assert_eq!(Operand::register(0x00, 0).to_string(), "R0");
        assert_eq!(Operand::register(0x30, 0).to_string(), "PC");
        assert_eq!(Operand::register(0x00, 0x07).to_string(), "R0.07");
        assert_eq!(Operand::Immediate(Immediate::Int32(42)).to_string(), "42");
        assert_eq!(
            Operand::Memory(Memory::RegRegScale(0x01, 0x02, 4)).to_string(),
            "[R1 + R2*4]"
        );
        assert_eq!(
            Operand::Variable { ref_kind: VariableRefKind::Addr, var_id: 3 }.to_string(),
            "&$3"
        );
    }
}
