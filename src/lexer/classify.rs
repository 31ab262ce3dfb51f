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

use super::{Token, TokenKind, TokenPayload};
use crate::diagnostics::SourceLocation;

const CATEGORY_MNEMONICS: &[&str] = &["CF", "MEM", "MATH", "BIT", "VEC", "ATM", "VAR", "FRAME"];

const DIRECTIVE_KEYWORDS: &[&str] = &[
    "DIR", "SECT", "LABEL", "HINT", "FUNC", "ENDFUNC", "GLOBAL", "LOCAL", "WEAK", "ALIGN", "ABI",
    "TARGET", "CONFIG", "INST", "ZERO", "ASCII", "UNICODE", "PADD", "INCLUDE", "MACRO", "ENDM",
    "STRUCT", "ENDSTRUCT", "CONST",
];

/// Classifies a greedily-scanned `[A-Za-z_][A-Za-z0-9_]*` run in the strict
/// order the lexer mandates: register, named-special register, category
/// mnemonic, directive keyword, else a plain identifier.
pub fn classify_identifier(text: String, location: SourceLocation) -> Token {
    if let Some(reg_id) = numbered_register_id(&text) {
        return Token {
            kind: TokenKind::Register,
            text,
            location,
            payload: TokenPayload::Register(reg_id),
        };
    }

    if let Some(reg_id) = named_special_register_id(&text) {
        return Token {
            kind: TokenKind::Register,
            text,
            location,
            payload: TokenPayload::Register(reg_id),
        };
    }

    if CATEGORY_MNEMONICS.contains(&text.as_str()) {
        return Token {
            kind: TokenKind::Instruction,
            text,
            location,
            payload: TokenPayload::None,
        };
    }

    if DIRECTIVE_KEYWORDS.contains(&text.as_str()) {
        return Token {
            kind: TokenKind::Directive,
            text,
            location,
            payload: TokenPayload::None,
        };
    }

    Token {
        kind: TokenKind::Identifier,
        text,
        location,
        payload: TokenPayload::None,
    }
}

fn numbered_register_id(text: &str) -> Option<u8> {
    let mut chars = text.chars();
    let prefix = chars.next()?;
    let base: u8 = match prefix {
        'R' => 0x00,
        'F' => 0x10,
        'V' => 0x20,
        _ => return None,
    };
    let rest = chars.as_str();
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n: u32 = rest.parse().ok()?;
    if n <= 15 { Some(base + n as u8) } else { None }
}

fn named_special_register_id(text: &str) -> Option<u8> {
    match text {
        "PC" => Some(0x30),
        "SP" => Some(0x31),
        "FP" => Some(0x32),
        "FLAGS" => Some(0x33),
        "LR" => Some(0x34),
        _ => None,
    }
}
