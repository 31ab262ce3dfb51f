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

//! Single-pass recursive-descent parser driving the directive state machine
//! and building a Module. Never panics on malformed input: every failure
//! path records a diagnostic and resynchronizes on the next `DIR` token;
//! the final `parse` returns `None` only if the diagnostics sink latched
//! an error somewhere along the way.

mod type_spec;

use crate::diagnostics::{Diagnostics, SourceLocation};
use crate::instruction::{self, Instruction};
use crate::lexer::{Token, TokenKind};
use crate::module::{section_type_for_name, AbiDefinition, Function, Module};
use crate::operand::{Immediate, Memory, Operand};

const SECTION_READ: u32 = 0;
const SECTION_WRITE: u32 = crate::cof::section::SectionFlags::Write as u32;
const SECTION_EXEC: u32 = crate::cof::section::SectionFlags::Exec as u32;
const SECTION_ALLOC: u32 = crate::cof::section::SectionFlags::Alloc as u32;
const SECTION_TLS: u32 = crate::cof::section::SectionFlags::Tls as u32;

const SYMBOL_GLOBAL: u16 = crate::module::SYMBOL_FLAG_GLOBAL;
const SYMBOL_LOCAL: u16 = crate::module::SYMBOL_FLAG_LOCAL;
const SYMBOL_WEAK: u16 = crate::module::SYMBOL_FLAG_WEAK;
const SYMBOL_HIDDEN: u16 = crate::module::SYMBOL_FLAG_HIDDEN;
const SYMBOL_PROTECTED: u16 = crate::module::SYMBOL_FLAG_PROTECTED;
const SYMBOL_EXPORTED: u16 = crate::module::SYMBOL_FLAG_EXPORTED;

pub struct Parser<'t, 'd> {
    tokens: &'t [Token],
    pos: usize,
    diagnostics: &'d mut Diagnostics,
}

/// Parses a complete token stream into a Module. Returns `None` if any
/// diagnostic of severity Error or above was recorded, per the
/// "the final parse returns no module if the latch is set".
pub fn parse(tokens: &[Token], diagnostics: &mut Diagnostics, module_name: &str) -> Option<Module> {
    let mut parser = Parser { tokens, pos: 0, diagnostics };
    let module = parser.parse_module(module_name);
    if parser.diagnostics.has_errors() {
        None
    } else {
        Some(module)
    }
}

impl<'t, 'd> Parser<'t, 'd> {
    fn current(&self) -> &'t Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_next(&self) -> &'t Token {
        let idx = (self.pos + 1).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn at_eof(&self) -> bool {
        self.current().kind == TokenKind::EndOfFile
    }

    fn advance(&mut self) -> &'t Token {
        let token = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn here(&self) -> SourceLocation {
        self.current().location.clone()
    }

    fn error(&mut self, message: impl Into<String>) {
        self.diagnostics.error(self.here(), message);
    }

    /// Checks the current token's text, case-sensitively, against `text`.
    fn is(&self, text: &str) -> bool {
        self.current().text == text
    }

    /// Advances past the current token if it is an Identifier/Directive
    /// token whose text matches `text`; returns whether it matched.
    fn eat_keyword(&mut self, text: &str) -> bool {
        if matches!(self.current().kind, TokenKind::Directive | TokenKind::Identifier) && self.is(text) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_kind(&mut self, kind: TokenKind, what: &str) -> Option<&'t Token> {
        if self.current().kind == kind {
            Some(self.advance())
        } else {
            self.error(format!("expected {what}, found '{}'", self.current().text));
            None
        }
    }

    /// Skips tokens until the next `DIR` keyword or end of input, per the
    /// parser's documented error-recovery strategy.
    fn resync_to_dir(&mut self) {
        while !self.at_eof() && !(self.current().kind == TokenKind::Directive && self.is("DIR")) {
            self.advance();
        }
    }

    fn parse_module(&mut self, module_name: &str) -> Module {
        let mut module = Module::new(module_name);
        let mut current_function: Option<Function> = None;

        while !self.at_eof() {
            if self.current().kind == TokenKind::Directive && self.is("DIR") {
                self.advance();
                self.parse_directive(&mut module, &mut current_function);
                continue;
            }

            if self.current().kind == TokenKind::Instruction {
                self.parse_instruction_statement(&mut module, &mut current_function);
                continue;
            }

            self.error(format!("expected DIR or an instruction, found '{}'", self.current().text));
            self.advance();
            self.resync_to_dir();
        }

        if let Some(function) = current_function.take() {
            self.error(format!("function '{}' missing ENDFUNC before end of input", function.name));
        }

        module
    }

    fn parse_directive(&mut self, module: &mut Module, current_function: &mut Option<Function>) {
        if self.eat_keyword("SECT") {
            self.parse_sect(module);
        } else if self.eat_keyword("LABEL") {
            self.parse_label(module, current_function);
        } else if self.eat_keyword("HINT") {
            self.parse_hint(module, current_function);
        } else if self.eat_keyword("ABI") {
            self.parse_abi(module);
        } else if self.eat_keyword("TARGET") {
            self.parse_target(module);
        } else if self.eat_keyword("ALIGN") {
            self.parse_align(module);
        } else if self.eat_keyword("GLOBAL") {
            self.parse_symbol_flag_directive(module, SYMBOL_GLOBAL);
        } else if self.eat_keyword("LOCAL") {
            self.parse_symbol_flag_directive(module, SYMBOL_LOCAL);
        } else if self.eat_keyword("WEAK") {
            self.parse_symbol_flag_directive(module, SYMBOL_WEAK);
        } else {
            self.error(format!("unrecognized directive '{}'", self.current().text));
            self.resync_to_dir();
        }
    }

    /// `DIR TARGET <name> <arch>`: registers a named target tag and makes it
    /// current for subsequent sections/instructions until the next `TARGET`.
    fn parse_target(&mut self, module: &mut Module) {
        let Some(name_token) = self.expect_kind(TokenKind::Identifier, "target name") else {
            self.resync_to_dir();
            return;
        };
        let name = name_token.text.clone();
        let Some(arch_token) = self.expect_kind(TokenKind::Identifier, "architecture name") else {
            self.resync_to_dir();
            return;
        };
        let arch_type = crate::cof::target::ArchType::from_target_name(&arch_token.text) as u32;
        module.register_target(name, arch_type);
    }

    /// `DIR ALIGN <n>`: sets the current section's alignment. `n` must be a
    /// power of two, per §4.4's directive grammar.
    fn parse_align(&mut self, module: &mut Module) {
        let Some(token) = self.expect_kind(TokenKind::Integer, "alignment") else {
            self.resync_to_dir();
            return;
        };
        let value = token.as_integer().unwrap_or(0);
        if value <= 0 || (value as u64).count_ones() != 1 {
            self.error(format!("ALIGN value must be a power of two, found {value}"));
            return;
        }
        module.set_current_section_alignment(value as u32);
    }

    /// `DIR GLOBAL/LOCAL/WEAK <name>`: marks a not-yet-defined or
    /// already-defined symbol with the corresponding flag, applied when the
    /// symbol is materialized.
    fn parse_symbol_flag_directive(&mut self, module: &mut Module, flag: u16) {
        let Some(name_token) = self.expect_kind(TokenKind::Identifier, "symbol name") else {
            self.resync_to_dir();
            return;
        };
        let name = name_token.text.clone();
        module.mark_symbol_flag(name, flag);
    }

    fn parse_sect(&mut self, module: &mut Module) {
        let Some(name_token) = self.expect_kind(TokenKind::Identifier, "section name") else {
            self.resync_to_dir();
            return;
        };
        let name = name_token.text.clone();

        let mut flags = SECTION_ALLOC;
        loop {
            if self.eat_keyword("READ") {
                flags |= SECTION_READ;
            } else if self.eat_keyword("WRITE") {
                flags |= SECTION_WRITE;
            } else if self.eat_keyword("EXEC") {
                flags |= SECTION_EXEC;
            } else if self.eat_keyword("ALLOC") {
                flags |= SECTION_ALLOC;
            } else if self.eat_keyword("NOALLOC") {
                flags &= !SECTION_ALLOC;
            } else if self.eat_keyword("TLS") {
                flags |= SECTION_TLS;
            } else {
                break;
            }
        }

        let section_type = section_type_for_name(&name, crate::cof::section::SectionType::Code as u32);
        module.set_current_section(name, section_type, flags);
    }

    fn parse_label(&mut self, module: &mut Module, current_function: &mut Option<Function>) {
        let Some(name_token) = self.expect_kind(TokenKind::Identifier, "label name") else {
            self.resync_to_dir();
            return;
        };
        let name = name_token.text.clone();

        match current_function.as_mut() {
            Some(function) => {
                if let Err(err) = function.add_label(name) {
                    self.error(err.to_string());
                }
            }
            // A label outside any function marks a position in the current
            // section's pending instruction stream; Section carries no label
            // table of its own (only Function does), so a bare section-level
            // label is accepted syntactically but not retained for resolution.
            None => {
                let _ = module;
            }
        }
    }

    fn parse_hint(&mut self, module: &mut Module, current_function: &mut Option<Function>) {
        let Some(name_token) = self.expect_kind(TokenKind::Identifier, "function name") else {
            self.resync_to_dir();
            return;
        };
        let name = name_token.text.clone();

        if self.eat_keyword("FUNC") {
            self.parse_function_body(module, current_function, name);
        } else if self.eat_keyword("ENDFUNC") {
            self.error("ENDFUNC with no matching FUNC");
        } else {
            self.error(format!("expected FUNC or ENDFUNC after HINT {name}, found '{}'", self.current().text));
            self.resync_to_dir();
        }
    }

    fn parse_function_body(&mut self, module: &mut Module, current_function: &mut Option<Function>, name: String) {
        if current_function.is_some() {
            self.error(format!("nested function '{name}' is not supported"));
            self.resync_to_dir();
            return;
        }

        let mut flags = 0u16;
        loop {
            if self.eat_keyword("GLOBAL") {
                flags |= SYMBOL_GLOBAL;
            } else if self.eat_keyword("LOCAL") {
                flags |= SYMBOL_LOCAL;
            } else if self.eat_keyword("WEAK") {
                flags |= SYMBOL_WEAK;
            } else if self.eat_keyword("HIDDEN") {
                flags |= SYMBOL_HIDDEN;
            } else if self.eat_keyword("PROTECTED") {
                flags |= SYMBOL_PROTECTED;
            } else if self.eat_keyword("EXPORTED") {
                flags |= SYMBOL_EXPORTED;
            } else {
                break;
            }
        }

        if !self.eat_keyword("DIR") || !self.eat_keyword("LABEL") {
            self.error(format!("expected 'DIR LABEL {name}' immediately after HINT {name} FUNC"));
            self.resync_to_dir();
            return;
        }
        let Some(label_token) = self.expect_kind(TokenKind::Identifier, "label name") else {
            self.resync_to_dir();
            return;
        };
        if label_token.text != name {
            self.error(format!(
                "function label mismatch: HINT {name} FUNC must be followed by DIR LABEL {name}, found {}",
                label_token.text
            ));
        }

        let section_name = module.current_section.clone();
        *current_function = Some(Function::new(name.clone(), flags, section_name));

        loop {
            if self.at_eof() {
                self.error(format!("unexpected end of input inside function '{name}'"));
                break;
            }
            if self.current().kind == TokenKind::Directive && self.is("DIR") {
                // Peek ahead: is this the closing `DIR HINT <name> ENDFUNC`?
                if self.peek_next().text == "HINT" {
                    let save = self.pos;
                    self.advance(); // DIR
                    self.advance(); // HINT
                    if self.current().kind == TokenKind::Identifier && self.current().text == name {
                        self.advance();
                        if self.eat_keyword("ENDFUNC") {
                            break;
                        }
                    }
                    self.pos = save;
                }
                self.advance(); // DIR
                self.parse_directive(module, current_function);
                continue;
            }
            if self.current().kind == TokenKind::Instruction {
                self.parse_instruction_statement(module, current_function);
                continue;
            }
            self.error(format!("expected an instruction or directive inside function '{name}', found '{}'", self.current().text));
            self.advance();
        }

        if let Some(function) = current_function.take() {
            if let Err(err) = module.add_function(function) {
                self.error(err.to_string());
            }
        }
    }

    fn parse_abi(&mut self, module: &mut Module) {
        let Some(name_token) = self.expect_kind(TokenKind::Identifier, "ABI name") else {
            self.resync_to_dir();
            return;
        };
        let mut def = AbiDefinition::new(name_token.text.clone());

        if self.expect_kind(TokenKind::LBrace, "'{'").is_none() {
            self.resync_to_dir();
            return;
        }

        while !self.at_eof() && self.current().kind != TokenKind::RBrace {
            if self.current().kind == TokenKind::Comma {
                self.advance();
                continue;
            }
            let Some(field_token) = self.expect_kind(TokenKind::Identifier, "ABI field name") else {
                self.skip_to_field_boundary();
                continue;
            };
            let field = field_token.text.clone();

            if self.expect_kind(TokenKind::Equals, "'='").is_none() {
                self.skip_to_field_boundary();
                continue;
            }

            match field.as_str() {
                "args" => def.arg_regs = self.parse_register_list(),
                "rets" => def.ret_regs = self.parse_register_list(),
                "preserved" => def.preserved_regs = self.parse_register_list(),
                "volatile" => def.volatile_regs = self.parse_register_list(),
                "stack_align" => {
                    if let Some(token) = self.expect_kind(TokenKind::Integer, "integer") {
                        def.stack_align = token.as_integer().unwrap_or(16) as u32;
                    }
                }
                other => {
                    self.error(format!("unknown ABI field '{other}'"));
                    self.skip_to_field_boundary();
                }
            }
        }
        self.expect_kind(TokenKind::RBrace, "'}'");

        if let Err(err) = module.add_abi_definition(def) {
            self.error(err.to_string());
        }
    }

    /// Recovers from a malformed ABI field by skipping to the next comma-free
    /// boundary: the next field name or the closing brace.
    fn skip_to_field_boundary(&mut self) {
        while !self.at_eof() && self.current().kind != TokenKind::RBrace {
            if self.peek_next().kind == TokenKind::Equals {
                return;
            }
            self.advance();
        }
    }

    fn parse_register_list(&mut self) -> Vec<u8> {
        let mut regs = Vec::new();
        if self.expect_kind(TokenKind::LBracket, "'['").is_none() {
            return regs;
        }
        if self.current().kind != TokenKind::RBracket {
            loop {
                if self.current().kind == TokenKind::Register {
                    regs.push(self.advance().as_register().unwrap_or(0));
                } else {
                    self.error(format!("expected register, found '{}'", self.current().text));
                    self.advance();
                }
                if self.current().kind == TokenKind::Comma {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        self.expect_kind(TokenKind::RBracket, "']'");
        regs
    }

    fn parse_instruction_statement(&mut self, module: &mut Module, current_function: &mut Option<Function>) {
        let category_token = self.advance();
        let category = category_token.text.clone();
        let category_loc = category_token.location.clone();

        let Some(operation_token) = self.expect_kind(TokenKind::Identifier, "operation mnemonic") else {
            self.resync_to_dir();
            return;
        };
        let operation = operation_token.text.clone();

        if category == "VAR" && operation == "DECL" {
            if let Some(inst) = self.parse_var_decl(current_function) {
                match current_function.as_mut() {
                    Some(function) => {
                        function.add_instruction(inst);
                    }
                    None => {
                        let section = module.get_or_create_section(
                            &module.current_section.clone(),
                            module.current_section_type,
                            module.current_section_flags,
                            module.current_target_id,
                        );
                        section.pending_instructions.push(inst);
                    }
                }
            }
            return;
        }

        let mut operands = Vec::new();
        let mut label_refs: Vec<String> = Vec::new();
        if !self.at_statement_end() {
            loop {
                match self.parse_operand() {
                    Some((operand, label_ref)) => {
                        if let Some(name) = label_ref {
                            label_refs.push(name);
                        }
                        operands.push(operand);
                    }
                    None => break,
                }
                if self.current().kind == TokenKind::Comma {
                    self.advance();
                    continue;
                }
                break;
            }
        }

        let Some(opcode) = instruction::resolve_opcode(&category, &operation) else {
            self.diagnostics.error(category_loc, format!("unknown instruction '{category} {operation}'"));
            return;
        };

        let inst = Instruction::new(opcode, operands, Vec::new());

        match current_function.as_mut() {
            Some(function) => {
                let index = function.add_instruction(inst);
                for name in label_refs {
                    function.add_label_ref(index, name);
                }
            }
            None => {
                let section = module.get_or_create_section(
                    &module.current_section.clone(),
                    module.current_section_type,
                    module.current_section_flags,
                    module.current_target_id,
                );
                section.pending_instructions.push(inst);
            }
        }
    }

    fn at_statement_end(&self) -> bool {
        matches!(self.current().kind, TokenKind::EndOfFile)
            || (self.current().kind == TokenKind::Directive && self.is("DIR"))
            || self.current().kind == TokenKind::Instruction
    }

    /// Parses one operand. Returns `(operand, Some(label_name))` when the
    /// operand was a bare identifier resolved as a symbol reference, so the
    /// caller can record it against the enclosing function for later
    /// validation by `Function::resolve_labels`.
    fn parse_operand(&mut self) -> Option<(Operand, Option<String>)> {
        match self.current().kind {
            TokenKind::Register => {
                let reg_id = self.advance().as_register().unwrap_or(0);
                Some((Operand::register(reg_id, 0), None))
            }
            TokenKind::Variable => self.parse_variable_operand(),
            TokenKind::Integer => {
                let value = self.advance().as_integer().unwrap_or(0);
                Some((Operand::Immediate(integer_immediate(value)), None))
            }
            TokenKind::Float => {
                let value = self.advance().as_float().unwrap_or(0.0);
                Some((Operand::Immediate(Immediate::Float64(value)), None))
            }
            TokenKind::String => {
                let text = self.advance().text.clone();
                Some((Operand::Immediate(Immediate::Symbol(text)), None))
            }
            TokenKind::Identifier => {
                let name = self.advance().text.clone();
                Some((Operand::Immediate(Immediate::Symbol(name.clone())), Some(name)))
            }
            TokenKind::LBracket => self.parse_memory_operand(),
            _ => {
                self.error(format!("expected an operand, found '{}'", self.current().text));
                None
            }
        }
    }

    fn parse_variable_operand(&mut self) -> Option<(Operand, Option<String>)> {
        let var_id = self.advance().as_variable().unwrap_or(0);

        if self.current().kind == TokenKind::LBracket {
            self.advance();
            // index expression is consumed but not retained: COF only needs the element ref-kind tag.
            while !self.at_eof() && self.current().kind != TokenKind::RBracket {
                self.advance();
            }
            self.expect_kind(TokenKind::RBracket, "']'");
            return Some((
                Operand::Variable { ref_kind: crate::operand::VariableRefKind::Elem, var_id },
                None,
            ));
        }
        if self.current().kind == TokenKind::Dot {
            self.advance();
            self.expect_kind(TokenKind::Identifier, "field name");
            return Some((
                Operand::Variable { ref_kind: crate::operand::VariableRefKind::Field, var_id },
                None,
            ));
        }
        Some((Operand::Variable { ref_kind: crate::operand::VariableRefKind::Direct, var_id }, None))
    }

    /// Memory operand grammar:
    /// `[ Register ] | [ Register + Register ] | [ Register + Register * Integer ]
    ///  | [ Register + Integer ] | [ Integer ] | [++R] | [--R] | [R++] | [R--]`
    fn parse_memory_operand(&mut self) -> Option<(Operand, Option<String>)> {
        self.advance(); // '['

        if self.current().kind == TokenKind::Plus && self.peek_next().kind == TokenKind::Plus {
            self.advance();
            self.advance();
            let reg = self.expect_kind(TokenKind::Register, "register")?.as_register().unwrap_or(0);
            self.expect_kind(TokenKind::RBracket, "']'");
            return Some((Operand::Memory(Memory::PreInc(reg)), None));
        }
        if self.current().kind == TokenKind::Minus && self.peek_next().kind == TokenKind::Minus {
            self.advance();
            self.advance();
            let reg = self.expect_kind(TokenKind::Register, "register")?.as_register().unwrap_or(0);
            self.expect_kind(TokenKind::RBracket, "']'");
            return Some((Operand::Memory(Memory::PreDec(reg)), None));
        }

        if self.current().kind == TokenKind::Integer {
            let value = self.advance().as_integer().unwrap_or(0);
            self.expect_kind(TokenKind::RBracket, "']'");
            return Some((Operand::Memory(Memory::Direct(value as u32)), None));
        }

        let reg = self.expect_kind(TokenKind::Register, "register")?.as_register().unwrap_or(0);

        if self.current().kind == TokenKind::Plus && self.peek_next().kind == TokenKind::Plus {
            self.advance();
            self.advance();
            self.expect_kind(TokenKind::RBracket, "']'");
            return Some((Operand::Memory(Memory::PostInc(reg)), None));
        }
        if self.current().kind == TokenKind::Minus && self.peek_next().kind == TokenKind::Minus {
            self.advance();
            self.advance();
            self.expect_kind(TokenKind::RBracket, "']'");
            return Some((Operand::Memory(Memory::PostDec(reg)), None));
        }

        if self.current().kind == TokenKind::RBracket {
            self.advance();
            return Some((Operand::Memory(Memory::Reg(reg)), None));
        }

        if self.current().kind == TokenKind::Plus {
            self.advance();
            if self.current().kind == TokenKind::Register {
                let reg_b = self.advance().as_register().unwrap_or(0);
                if self.current().kind == TokenKind::Star {
                    self.advance();
                    let scale_token = self.expect_kind(TokenKind::Integer, "scale")?;
                    let scale = scale_token.as_integer().unwrap_or(1) as u8;
                    self.expect_kind(TokenKind::RBracket, "']'");
                    return Some((Operand::Memory(Memory::RegRegScale(reg, reg_b, scale)), None));
                }
                self.expect_kind(TokenKind::RBracket, "']'");
                return Some((Operand::Memory(Memory::RegReg(reg, reg_b)), None));
            }
            if self.current().kind == TokenKind::Integer {
                let disp = self.advance().as_integer().unwrap_or(0) as i32;
                self.expect_kind(TokenKind::RBracket, "']'");
                return Some((Operand::Memory(Memory::RegDisp(reg, disp)), None));
            }
            self.error(format!("expected register or integer after '+', found '{}'", self.current().text));
            None
        } else if self.current().kind == TokenKind::Minus {
            self.advance();
            let disp_token = self.expect_kind(TokenKind::Integer, "integer")?;
            let disp = -(disp_token.as_integer().unwrap_or(0) as i32);
            self.expect_kind(TokenKind::RBracket, "']'");
            Some((Operand::Memory(Memory::RegDisp(reg, disp)), None))
        } else {
            self.error(format!("expected '+', '-', or ']', found '{}'", self.current().text));
            None
        }
    }

    /// Parses `VAR DECL $<id>, <type-spec>[, <init-value>]` specially: the
    /// type specifier is not an Operand (the operand union has no type
    /// variant), so it is recorded directly against the enclosing Function's
    /// `variable_types`/`variable_init_values` side tables rather than
    /// folded into the instruction's operand list.
    fn parse_var_decl(&mut self, current_function: &mut Option<Function>) -> Option<Instruction> {
        let var_token = self.expect_kind(TokenKind::Variable, "variable")?;
        let var_id = var_token.as_variable().unwrap_or(0);

        self.expect_kind(TokenKind::Comma, "','")?;
        let type_tag = self.parse_type_spec()?;

        let mut init_bytes: Vec<u8> = Vec::new();
        if self.current().kind == TokenKind::Comma {
            self.advance();
            // No literal form is defined for `ptr`/`vecN` types (§4.4): an
            // initializer on one of those is a SyntaxError, not a value to
            // encode. Consume the initializer token anyway so parsing can
            // resynchronize normally rather than misreading it as the next
            // statement.
            if type_spec::is_ptr_or_vector_tag(type_tag) {
                self.error(format!("type specifier 0x{type_tag:02x} has no literal initializer form"));
                self.parse_var_init_value();
            } else {
                init_bytes = self.parse_var_init_value();
            }
        }

        if let Some(function) = current_function.as_mut() {
            function.set_variable_type(var_id, type_tag);
            if !init_bytes.is_empty() {
                function.set_variable_init_value(var_id, init_bytes.clone());
            }
        } else {
            self.error("VAR DECL outside a function body");
        }

        let mut extended_data = vec![type_tag];
        extended_data.extend_from_slice(&init_bytes);

        Some(Instruction::new(
            instruction::resolve_opcode("VAR", "DECL").expect("VAR DECL is a fixed opcode"),
            vec![Operand::Variable { ref_kind: crate::operand::VariableRefKind::Direct, var_id }],
            extended_data,
        ))
    }

    /// `void | int{8,16,32,64,128} | uint{…} | fp{16,32,64,80,128} |
    /// ptr(<type>) | vec128(<type>) | vec256(<type>) | vec512(<type>)`.
    fn parse_type_spec(&mut self) -> Option<u8> {
        let name_token = self.expect_kind(TokenKind::Identifier, "type specifier")?;
        let name = name_token.text.clone();

        if name == "ptr" {
            self.expect_kind(TokenKind::LParen, "'('")?;
            let inner = self.parse_type_spec()?;
            self.expect_kind(TokenKind::RParen, "')'")?;
            return Some(type_spec::TYPE_PTR | inner);
        }
        if let Some(base) = type_spec::vector_base_tag(&name) {
            self.expect_kind(TokenKind::LParen, "'('")?;
            let inner = self.parse_type_spec()?;
            self.expect_kind(TokenKind::RParen, "')'")?;
            return Some(base | inner);
        }
        if let Some(tag) = type_spec::scalar_type_for_name(&name) {
            return Some(tag);
        }
        self.error(format!("unknown type specifier '{name}'"));
        None
    }

    fn parse_var_init_value(&mut self) -> Vec<u8> {
        match self.current().kind {
            TokenKind::Integer => self.advance().as_integer().unwrap_or(0).to_le_bytes().to_vec(),
            TokenKind::Float => self.advance().as_float().unwrap_or(0.0).to_le_bytes().to_vec(),
            TokenKind::String => {
                let mut bytes = self.advance().text.clone().into_bytes();
                bytes.push(0);
                bytes
            }
            _ => {
                self.error(format!("expected an initial value, found '{}'", self.current().text));
                Vec::new()
            }
        }
    }
}

fn integer_immediate(value: i64) -> Immediate {
    if let Ok(v) = i8::try_from(value) {
        Immediate::Int8(v)
    } else if let Ok(v) = i16::try_from(value) {
        Immediate::Int16(v)
    } else if let Ok(v) = i32::try_from(value) {
        Immediate::Int32(v)
    } else {
        Immediate::Int64(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse_source(src: &str) -> (Option<Module>, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let tokens = Lexer::new("test.coil", src).tokenize(&mut diagnostics);
        let module = parse(&tokens, &mut diagnostics, "test");
        (module, diagnostics)
    }

    #[test]
    fn minimal_function_parses() {
        // S1: a function with a single FRAME ENTER / FRAME LEAVE / CF RET body.
        let src = r#"
            DIR HINT main FUNC GLOBAL
            DIR LABEL main
            FRAME ENTER
            CF RET
            DIR HINT main ENDFUNC
        "#;
        let (module, diagnostics) = parse_source(src);
        assert!(!diagnostics.has_errors(), "{:?}", diagnostics.messages());
        let module = module.unwrap();
        let function = module.function_by_name("main").unwrap();
        assert_eq!(function.instructions.len(), 2);
        assert_eq!(function.flags, SYMBOL_GLOBAL);
    }

    #[test]
    fn abi_definition_parses_register_lists_and_stack_align() {
        // S2
        let src = r#"
            DIR ABI sysv {
                args = [R0, R1],
                rets = [R0],
                preserved = [R4, R5],
                volatile = [R0, R1, R2],
                stack_align = 16
            }
        "#;
        let (module, diagnostics) = parse_source(src);
        assert!(!diagnostics.has_errors(), "{:?}", diagnostics.messages());
        let module = module.unwrap();
        let abi = module.abi_definition("sysv").unwrap();
        assert_eq!(abi.arg_regs, vec![0x00, 0x01]);
        assert_eq!(abi.ret_regs, vec![0x00]);
        assert_eq!(abi.preserved_regs, vec![0x04, 0x05]);
        assert_eq!(abi.volatile_regs, vec![0x00, 0x01, 0x02]);
        assert_eq!(abi.stack_align, 16);
    }

    #[test]
    fn section_directive_sets_type_and_flags() {
        let src = r#"
            DIR SECT data WRITE
            DIR HINT f FUNC
            DIR LABEL f
            CF RET
            DIR HINT f ENDFUNC
        "#;
        let (module, diagnostics) = parse_source(src);
        assert!(!diagnostics.has_errors(), "{:?}", diagnostics.messages());
        let module = module.unwrap();
        let function = module.function_by_name("f").unwrap();
        assert_eq!(function.section, "data");
    }

    #[test]
    fn memory_operand_forms_parse() {
        let src = r#"
            DIR HINT f FUNC
            DIR LABEL f
            MEM MOV R0, [R1]
            MEM MOV R0, [R1 + 8]
            MEM MOV R0, [R1 + R2]
            MEM MOV R0, [R1 + R2*4]
            MEM MOV R0, [++R1]
            MEM MOV R0, [R1--]
            DIR HINT f ENDFUNC
        "#;
        let (module, diagnostics) = parse_source(src);
        assert!(!diagnostics.has_errors(), "{:?}", diagnostics.messages());
        let module = module.unwrap();
        let function = module.function_by_name("f").unwrap();
        assert_eq!(function.instructions.len(), 6);
        assert!(matches!(function.instructions[0].operands[1], Operand::Memory(Memory::Reg(_))));
        assert!(matches!(function.instructions[1].operands[1], Operand::Memory(Memory::RegDisp(_, 8))));
        assert!(matches!(function.instructions[2].operands[1], Operand::Memory(Memory::RegReg(..))));
        assert!(matches!(function.instructions[3].operands[1], Operand::Memory(Memory::RegRegScale(..))));
        assert!(matches!(function.instructions[4].operands[1], Operand::Memory(Memory::PreInc(_))));
        assert!(matches!(function.instructions[5].operands[1], Operand::Memory(Memory::PostDec(_))));
    }

    #[test]
    fn label_reference_becomes_symbol_operand_and_resolves() {
        let src = r#"
            DIR HINT f FUNC
            DIR LABEL f
            DIR LABEL loop_start
            CF BR loop_start
            DIR HINT f ENDFUNC
        "#;
        let (module, diagnostics) = parse_source(src);
        assert!(!diagnostics.has_errors(), "{:?}", diagnostics.messages());
        let module = module.unwrap();
        let function = module.function_by_name("f").unwrap();
        assert!(matches!(
            &function.instructions[0].operands[0],
            Operand::Immediate(Immediate::Symbol(name)) if name == "loop_start"
        ));
        assert_eq!(function.unresolved_refs, vec![(0, "loop_start".to_string())]);
    }

    #[test]
    fn unknown_instruction_mnemonic_is_an_error() {
        let src = r#"
            DIR HINT f FUNC
            DIR LABEL f
            MATH FROB R0, R1
            DIR HINT f ENDFUNC
        "#;
        let (module, diagnostics) = parse_source(src);
        assert!(diagnostics.has_errors());
        assert!(module.is_none());
    }

    #[test]
    fn mismatched_function_label_is_an_error() {
        let src = r#"
            DIR HINT f FUNC
            DIR LABEL other
            CF RET
            DIR HINT f ENDFUNC
        "#;
        let (module, diagnostics) = parse_source(src);
        assert!(diagnostics.has_errors());
        assert!(module.is_none());
    }

    #[test]
    fn unexpected_top_level_token_resyncs_to_next_dir() {
        let src = r#"
            ???
            DIR HINT f FUNC
            DIR LABEL f
            CF RET
            DIR HINT f ENDFUNC
        "#;
        let (module, diagnostics) = parse_source(src);
        assert!(diagnostics.has_errors());
        // Parsing still recovers far enough to build the function that follows.
        assert!(module.is_none());
    }

    #[test]
    fn var_decl_records_type_and_init_value_on_the_function() {
        let src = r#"
            DIR HINT f FUNC
            DIR LABEL f
            VAR DECL $0, int32, 42
            VAR DECL $1, ptr(int32)
            CF RET
            DIR HINT f ENDFUNC
        "#;
        let (module, diagnostics) = parse_source(src);
        assert!(!diagnostics.has_errors(), "{:?}", diagnostics.messages());
        let module = module.unwrap();
        let function = module.function_by_name("f").unwrap();
        assert_eq!(function.variable_type(0), type_spec::TYPE_INT32);
        assert_eq!(function.variable_init_value(0), &42i64.to_le_bytes());
        assert_eq!(function.variable_type(1), type_spec::TYPE_PTR | type_spec::TYPE_INT32);
        assert_eq!(function.instructions.len(), 3);
    }

    #[test]
    fn var_decl_with_a_pointer_initializer_is_a_syntax_error() {
        // §4.4: `ptr`/`vecN` types have no literal initializer form.
        let src = r#"
            DIR HINT f FUNC
            DIR LABEL f
            VAR DECL $0, ptr(int32), 42
            CF RET
            DIR HINT f ENDFUNC
        "#;
        let (module, diagnostics) = parse_source(src);
        assert!(diagnostics.has_errors());
        assert!(module.is_none());
    }

    #[test]
    fn var_decl_outside_function_is_an_error() {
        let src = "VAR DECL $0, int32\n";
        let (_module, diagnostics) = parse_source(src);
        assert!(diagnostics.has_errors());
    }

    #[test]
    fn target_directive_registers_a_named_target_and_tags_subsequent_sections() {
        let src = r#"
            DIR TARGET gpu wasm
            DIR SECT shader READ EXEC
            DIR HINT kernel FUNC GLOBAL
            DIR LABEL kernel
            CF RET
            DIR HINT kernel ENDFUNC
        "#;
        let (module, diagnostics) = parse_source(src);
        assert!(!diagnostics.has_errors(), "{:?}", diagnostics.messages());
        let module = module.unwrap();
        assert_eq!(module.named_targets, vec![("gpu".to_string(), crate::cof::target::ArchType::Wasm as u32)]);
        assert_eq!(module.current_target_id, 1);
    }

    #[test]
    fn align_directive_sets_current_section_alignment() {
        let src = r#"
            DIR SECT rodata READ
            DIR ALIGN 64
            DIR HINT f FUNC
            DIR LABEL f
            CF RET
            DIR HINT f ENDFUNC
        "#;
        let (module, diagnostics) = parse_source(src);
        assert!(!diagnostics.has_errors(), "{:?}", diagnostics.messages());
        let module = module.unwrap();
        let section = module
            .sections
            .iter()
            .find(|s| s.name == "rodata")
            .expect("rodata section created by DIR SECT");
        assert_eq!(section.alignment, 64);
    }

    #[test]
    fn align_directive_rejects_non_power_of_two() {
        let src = "DIR ALIGN 3\n";
        let (_module, diagnostics) = parse_source(src);
        assert!(diagnostics.has_errors());
    }

    #[test]
    fn global_directive_marks_a_forward_declared_function_global() {
        let src = r#"
            DIR GLOBAL later
            DIR HINT later FUNC
            DIR LABEL later
            CF RET
            DIR HINT later ENDFUNC
        "#;
        let (module, diagnostics) = parse_source(src);
        assert!(!diagnostics.has_errors(), "{:?}", diagnostics.messages());
        let module = module.unwrap();
        let function = module.function_by_name("later").unwrap();
        assert_eq!(function.flags & SYMBOL_GLOBAL, SYMBOL_GLOBAL);
    }
}
