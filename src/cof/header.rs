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

//! The fixed COF header: magic, version, table offsets, and the per-file
//! identity (UUID + timestamp) needed for deterministic output.

use crate::error::CoilError;

pub const COF_MAGIC: u32 = 0x4C49_4F43; // on-disk bytes 'C','O','I','L'
pub const COF_VERSION_MAJOR: u16 = 1;
pub const COF_VERSION_MINOR: u16 = 0;

/// On-disk size of `CofHeader::encode`'s output. Every field is written
/// explicitly at its documented offset; there is no host-dependent padding.
pub const HEADER_SIZE: u32 = 80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CofHeader {
    pub magic: u32,
    pub version_major: u16,
    pub version_minor: u16,
    pub flags: u32,
    pub target_count: u32,
    pub section_count: u32,
    pub symbol_count: u32,
    pub string_table_size: u32,
    pub entry_point: u64,
    pub timestamp: u64,
    pub uuid: [u8; 16],
    pub header_size: u32,
    pub section_table_offset: u32,
    pub symbol_table_offset: u32,
    pub string_table_offset: u32,
    pub target_table_offset: u32,
}

impl CofHeader {
    pub fn new(uuid: [u8; 16], timestamp: u64) -> Self {
        Self {
            magic: COF_MAGIC,
            version_major: COF_VERSION_MAJOR,
            version_minor: COF_VERSION_MINOR,
            flags: 0,
            target_count: 0,
            section_count: 0,
            symbol_count: 0,
            string_table_size: 0,
            entry_point: 0,
            timestamp,
            uuid,
            header_size: HEADER_SIZE,
            section_table_offset: 0,
            symbol_table_offset: 0,
            string_table_offset: 0,
            target_table_offset: 0,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE as usize);
        out.extend_from_slice(&self.magic.to_le_bytes());
        out.extend_from_slice(&self.version_major.to_le_bytes());
        out.extend_from_slice(&self.version_minor.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&self.target_count.to_le_bytes());
        out.extend_from_slice(&self.section_count.to_le_bytes());
        out.extend_from_slice(&self.symbol_count.to_le_bytes());
        out.extend_from_slice(&self.string_table_size.to_le_bytes());
        out.extend_from_slice(&self.entry_point.to_le_bytes());
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.uuid);
        out.extend_from_slice(&self.header_size.to_le_bytes());
        out.extend_from_slice(&self.section_table_offset.to_le_bytes());
        out.extend_from_slice(&self.symbol_table_offset.to_le_bytes());
        out.extend_from_slice(&self.string_table_offset.to_le_bytes());
        out.extend_from_slice(&self.target_table_offset.to_le_bytes());
        debug_assert_eq!(out.len(), HEADER_SIZE as usize);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CoilError> {
        if buf.len() < HEADER_SIZE as usize {
            return Err(CoilError::InvalidFormat {
                reason: format!("truncated COF header: need {HEADER_SIZE} bytes, got {}", buf.len()),
            });
        }
        let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        if magic != COF_MAGIC {
            return Err(CoilError::InvalidFormat {
                reason: format!("bad COF magic: expected 0x{COF_MAGIC:08x}, got 0x{magic:08x}"),
            });
        }
        let mut uuid = [0u8; 16];
        uuid.copy_from_slice(&buf[44..60]);
        Ok(Self {
            magic,
            version_major: u16::from_le_bytes(buf[4..6].try_into().unwrap()),
            version_minor: u16::from_le_bytes(buf[6..8].try_into().unwrap()),
            flags: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            target_count: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            section_count: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
            symbol_count: u32::from_le_bytes(buf[20..24].try_into().unwrap()),
            string_table_size: u32::from_le_bytes(buf[24..28].try_into().unwrap()),
            entry_point: u64::from_le_bytes(buf[28..36].try_into().unwrap()),
            timestamp: u64::from_le_bytes(buf[36..44].try_into().unwrap()),
            uuid,
            header_size: u32::from_le_bytes(buf[60..64].try_into().unwrap()),
            section_table_offset: u32::from_le_bytes(buf[64..68].try_into().unwrap()),
            symbol_table_offset: u32::from_le_bytes(buf[68..72].try_into().unwrap()),
            string_table_offset: u32::from_le_bytes(buf[72..76].try_into().unwrap()),
            target_table_offset: u32::from_le_bytes(buf[76..80].try_into().unwrap()),
        })
    }

    /// A version-4 UUID with bytes 6 and 8 adjusted per RFC 4122, generated
    /// with `rand` when the caller does not pin one for deterministic tests.
    pub fn random_uuid_v4() -> [u8; 16] {
        use rand::RngCore;
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        bytes[6] = (bytes[6] & 0x0F) | 0x40;
        bytes[8] = (bytes[8] & 0x3F) | 0x80;
        bytes
    }

    pub fn now_timestamp() -> u64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let mut header = CofHeader::new([0x11; 16], 123456);
        header.target_count = 1;
        header.section_count = 2;
        header.symbol_count = 3;
        let bytes = header.encode();
        let decoded = CofHeader::decode(&bytes).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn bad_magic_is_invalid_format() {
        let bytes = vec![0u8; HEADER_SIZE as usize];
        let err = CofHeader::decode(&bytes).unwrap_err();
        assert!(matches!(err, CoilError::InvalidFormat { .. }));
    }

    #[test]
    fn truncated_header_is_invalid_format() {
        let err = CofHeader::decode(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, CoilError::InvalidFormat { .. }));
    }

    #[test]
    fn uuid_v4_has_rfc4122_marker_bits() {
        let uuid = CofHeader::random_uuid_v4();
        assert_eq!(uuid[6] & 0xF0, 0x40);
        assert_eq!(uuid[8] & 0xC0, 0x80);
    }
}
