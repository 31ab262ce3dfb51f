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

//! `coilasm`: the COIL assembler core. Text in, a relocatable COF byte
//! stream out, in one straight-line, single-threaded pass: lex, parse
//! into a `Module`, then `Module::generate_cof` + `CofFile::write`.
//!
//! The command-line driver, diagnostic sink formatting, and any per-target
//! backend are external collaborators — this crate exposes the
//! pipeline and the `Target` capability boundary they plug into, nothing
//! more.

pub mod cof;
pub mod diagnostics;
pub mod error;
pub mod file_reader;
pub mod instruction;
pub mod lexer;
pub mod module;
pub mod operand;
pub mod parser;
pub mod target;

use std::path::Path;

use diagnostics::Diagnostics;
use error::CoilError;
use file_reader::FileReader;

/// Runs the whole core pipeline over one source file: lex, parse, and emit
/// a COF byte buffer tagged for `target_name`. Returns `Err` if the file
/// could not be read, or if lexing/parsing ever latched an Error-or-above
/// diagnostic — callers should inspect `diagnostics` either
/// way, since a successful build may still carry Notes/Warnings.
pub fn assemble<F: FileReader>(
    source_path: &Path,
    target_name: &str,
    reader: &F,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<u8>, CoilError> {
    let source = reader.read_to_string(source_path).map_err(|e| CoilError::Io(
        std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
    ))?;

    let module_name = source_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("module")
        .to_string();
    let file_name: std::sync::Arc<str> = source_path
        .to_str()
        .unwrap_or(&module_name)
        .into();

    log::debug!("lexing {} ({} bytes)", source_path.display(), source.len());
    let tokens = lexer::Lexer::new(file_name, &source).tokenize(diagnostics);
    log::debug!("lexing done: {} tokens", tokens.len());

    log::debug!("parsing {}", source_path.display());
    let module = parser::parse(&tokens, diagnostics, &module_name);

    let Some(module) = module else {
        log::warn!("parse of {} aborted: diagnostics latched an error", source_path.display());
        return Err(CoilError::Semantic {
            location: diagnostics::SourceLocation::new(module_name.clone().into(), 1, 1),
            reason: "build aborted: one or more diagnostics reached error severity".to_string(),
        });
    };
    log::debug!("parsing done: {} function(s), {} section(s)", module.functions.len(), module.sections.len());

    let arch_type = cof::target::ArchType::from_target_name(target_name) as u32;
    let cof_file = module.generate_cof(target_name, arch_type)?;
    log::debug!("writing COF for target {target_name}");
    let bytes = cof_file.write()?;
    log::debug!("write done: {} bytes", bytes.len());
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use file_reader::MockFileReader;
    use std::path::PathBuf;

    #[test]
    fn assembles_minimal_function_to_cof() {
        let mut reader = MockFileReader::default();
        reader.add_file(
            "main.asm",
            "DIR SECT text READ EXEC\n\
             DIR HINT main FUNC GLOBAL\n\
             DIR LABEL main\n\
             FRAME ENTER\n\
             MEM MOV R0, 42\n\
             FRAME LEAVE\n\
             CF RET\n\
             DIR HINT main ENDFUNC\n",
        );
        let mut diagnostics = Diagnostics::new();
        let bytes = assemble(&PathBuf::from("main.asm"), "x86-64", &reader, &mut diagnostics).unwrap();
        assert!(!diagnostics.has_errors());
        let cof = cof::CofFile::read(&bytes).unwrap();
        assert_eq!(cof.symbol_count(), 1);
        assert_eq!(cof.symbol(0).unwrap().name, "main");
    }

    #[test]
    fn unknown_directive_latches_and_fails_build() {
        let mut reader = MockFileReader::default();
        reader.add_file("bad.asm", "DIR BOGUS\n");
        let mut diagnostics = Diagnostics::new();
        let err = assemble(&PathBuf::from("bad.asm"), "x86-64", &reader, &mut diagnostics).unwrap_err();
        assert!(diagnostics.has_errors());
        assert!(matches!(err, CoilError::Semantic { .. }));
    }
}
