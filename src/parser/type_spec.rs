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

//! Type-specifier grammar used by variable declarations:
//! `void | int{8,16,32,64,128} | uint{…} | fp{16,32,64,80,128} | ptr(T) |
//! vec128(T) | vec256(T) | vec512(T)`.

pub const TYPE_VOID: u8 = 0x00;
pub const TYPE_INT8: u8 = 0x01;
pub const TYPE_INT16: u8 = 0x02;
pub const TYPE_INT32: u8 = 0x03;
pub const TYPE_INT64: u8 = 0x04;
pub const TYPE_INT128: u8 = 0x05;
pub const TYPE_UINT8: u8 = 0x06;
pub const TYPE_UINT16: u8 = 0x07;
pub const TYPE_UINT32: u8 = 0x08;
pub const TYPE_UINT64: u8 = 0x09;
pub const TYPE_UINT128: u8 = 0x0A;
pub const TYPE_FP16: u8 = 0x0B;
pub const TYPE_FP32: u8 = 0x0C;
pub const TYPE_FP64: u8 = 0x0D;
pub const TYPE_FP80: u8 = 0x0E;
pub const TYPE_FP128: u8 = 0x0F;
pub const TYPE_PTR: u8 = 0x10;
pub const TYPE_VEC128: u8 = 0x20;
pub const TYPE_VEC256: u8 = 0x21;
pub const TYPE_VEC512: u8 = 0x22;

/// Resolves a bare type-specifier keyword (everything except `ptr(...)` and
/// `vec*(...)`, which need a nested specifier and are handled by the caller).
pub fn scalar_type_for_name(name: &str) -> Option<u8> {
    match name {
        "void" => Some(TYPE_VOID),
        "int8" => Some(TYPE_INT8),
        "int16" => Some(TYPE_INT16),
        "int32" => Some(TYPE_INT32),
        "int64" => Some(TYPE_INT64),
        "int128" => Some(TYPE_INT128),
        "uint8" => Some(TYPE_UINT8),
        "uint16" => Some(TYPE_UINT16),
        "uint32" => Some(TYPE_UINT32),
        "uint64" => Some(TYPE_UINT64),
        "uint128" => Some(TYPE_UINT128),
        "fp16" => Some(TYPE_FP16),
        "fp32" => Some(TYPE_FP32),
        "fp64" => Some(TYPE_FP64),
        "fp80" => Some(TYPE_FP80),
        "fp128" => Some(TYPE_FP128),
        _ => None,
    }
}

pub fn vector_base_tag(name: &str) -> Option<u8> {
    match name {
        "vec128" => Some(TYPE_VEC128),
        "vec256" => Some(TYPE_VEC256),
        "vec512" => Some(TYPE_VEC512),
        _ => None,
    }
}

/// True for any `ptr(...)` or `vec{128,256,512}(...)` encoded tag — the two
/// families that have no literal initializer form in `VAR DECL`'s grammar.
/// `ptr` sets the `TYPE_PTR` flag bit over its base tag; `vecN` tags occupy
/// the `0x20..` range regardless of their nested base type.
pub fn is_ptr_or_vector_tag(tag: u8) -> bool {
    tag & TYPE_PTR != 0 || tag >= TYPE_VEC128
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_names_resolve() {
        assert_eq!(scalar_type_for_name("void"), Some(TYPE_VOID));
        assert_eq!(scalar_type_for_name("int32"), Some(TYPE_INT32));
        assert_eq!(scalar_type_for_name("uint128"), Some(TYPE_UINT128));
        assert_eq!(scalar_type_for_name("fp128"), Some(TYPE_FP128));
        assert_eq!(scalar_type_for_name("bogus"), None);
    }

    #[test]
    fn vector_tags_resolve() {
        assert_eq!(vector_base_tag("vec128"), Some(TYPE_VEC128));
        assert_eq!(vector_base_tag("vec512"), Some(TYPE_VEC512));
    }

    #[test]
    fn ptr_and_vec_encode_as_tag_or_base() {
        let ptr_of_int32 = TYPE_PTR | TYPE_INT32;
        assert_eq!(ptr_of_int32, 0x13);
        let vec128_of_fp32 = TYPE_VEC128 | TYPE_FP32;
        assert_eq!(vec128_of_fp32, 0x2C);
    }
}
