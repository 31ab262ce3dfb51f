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

use coilasm::cof::section::{SectionFlags, SectionType};
use coilasm::cof::symbol::{SymbolFlags, SymbolType};
use coilasm::cof::CofFile;
use coilasm::diagnostics::Diagnostics;
use coilasm::file_reader::MockFileReader;
use std::path::Path;

fn assemble_ok(src: &str) -> (Vec<u8>, Diagnostics) {
    let mut reader = MockFileReader::default();
    reader.add_file("test.coil", src);
    let mut diagnostics = Diagnostics::new();
    let bytes = coilasm::assemble(Path::new("test.coil"), "x86-64", &reader, &mut diagnostics)
        .expect("assemble should succeed");
    (bytes, diagnostics)
}

#[test]
fn s1_minimal_function_produces_expected_cof() {
    let src = "DIR SECT text READ EXEC\n\
               DIR HINT main FUNC GLOBAL\n\
               DIR LABEL main\n\
               FRAME ENTER\n\
               MEM MOV R0, 42\n\
               FRAME LEAVE\n\
               CF RET\n\
               DIR HINT main ENDFUNC\n";

    let (bytes, diagnostics) = assemble_ok(src);
    assert!(!diagnostics.has_errors());

    let cof = CofFile::read(&bytes).unwrap();
    assert!(cof.target_count() >= 1);
    assert_eq!(cof.section_count(), 1);
    let section = cof.section(0).unwrap();
    assert_eq!(section.name, "text");
    assert_eq!(section.section_type, SectionType::Code as u32);
    assert_ne!(section.flags & SectionFlags::Exec as u32, 0);
    assert_ne!(section.flags & SectionFlags::Alloc as u32, 0);

    assert_eq!(cof.symbol_count(), 1);
    let symbol = cof.symbol_by_name("main").unwrap();
    assert_eq!(symbol.symbol_type, SymbolType::Function as u16);
    assert_ne!(symbol.flags & SymbolFlags::Global as u16, 0);
}

#[test]
fn s2_abi_definition_round_trips_through_the_parser() {
    let src = "DIR ABI abi-linux-x86_64 {\n\
               args = [R0, R4, R5, R3, R6, R7]\n\
               rets = [R0]\n\
               preserved = [R1, R10, R11, R12, R13]\n\
               volatile = [R0, R2, R3, R4, R5, R6, R7, R8, R9]\n\
               stack_align = 16\n\
               }\n";

    let mut reader = MockFileReader::default();
    reader.add_file("abi.coil", src);
    let mut diagnostics = Diagnostics::new();
    coilasm::assemble(Path::new("abi.coil"), "x86-64", &reader, &mut diagnostics).unwrap();
    assert!(!diagnostics.has_errors());
}

#[test]
fn s6_cof_round_trip_preserves_section_bytes_and_symbol() {
    let src = "DIR SECT text READ EXEC\n\
               DIR HINT main FUNC GLOBAL\n\
               DIR LABEL main\n\
               FRAME ENTER\n\
               MEM MOV R0, 42\n\
               FRAME LEAVE\n\
               CF RET\n\
               DIR HINT main ENDFUNC\n";

    let (bytes, _diagnostics) = assemble_ok(src);
    let first = CofFile::read(&bytes).unwrap();

    // Re-serialize the decoded file and decode it again: byte content for
    // every section and the symbol table must be stable across the hop.
    let rewritten = first.write().unwrap();
    let second = CofFile::read(&rewritten).unwrap();

    assert_eq!(first.section_count(), second.section_count());
    for i in 0..first.section_count() {
        assert_eq!(first.section(i).unwrap().data, second.section(i).unwrap().data);
        assert_eq!(first.section(i).unwrap().name, second.section(i).unwrap().name);
    }
    assert_eq!(first.symbol_count(), second.symbol_count());
    assert_eq!(
        first.symbol_by_name("main").unwrap().value,
        second.symbol_by_name("main").unwrap().value
    );
}

#[test]
fn multiple_functions_land_in_declaration_order_with_distinct_symbols() {
    let src = "DIR HINT first FUNC GLOBAL\n\
               DIR LABEL first\n\
               CF RET\n\
               DIR HINT first ENDFUNC\n\
               DIR HINT second FUNC LOCAL\n\
               DIR LABEL second\n\
               FRAME ENTER\n\
               CF RET\n\
               DIR HINT second ENDFUNC\n";

    let (bytes, diagnostics) = assemble_ok(src);
    assert!(!diagnostics.has_errors());
    let cof = CofFile::read(&bytes).unwrap();
    assert_eq!(cof.symbol_count(), 2);
    assert!(cof.symbol_by_name("first").is_some());
    assert!(cof.symbol_by_name("second").is_some());
    // "second" starts where "first"'s single RET instruction ends.
    let first = cof.symbol_by_name("first").unwrap();
    let second = cof.symbol_by_name("second").unwrap();
    assert_eq!(second.value, first.value + first.size);
}

#[test]
fn data_section_directive_places_function_in_a_distinct_section() {
    let src = "DIR SECT data WRITE\n\
               DIR HINT table FUNC\n\
               DIR LABEL table\n\
               VAR DECL $0, int32, 7\n\
               CF RET\n\
               DIR HINT table ENDFUNC\n";

    let (bytes, diagnostics) = assemble_ok(src);
    assert!(!diagnostics.has_errors());
    let cof = CofFile::read(&bytes).unwrap();
    let section = cof.section(0).unwrap();
    assert_eq!(section.name, "data");
    assert_eq!(section.section_type, SectionType::Data as u32);
    assert_ne!(section.flags & SectionFlags::Write as u32, 0);
}

#[test]
fn unresolved_label_reference_fails_the_whole_build() {
    let src = "DIR HINT f FUNC\n\
               DIR LABEL f\n\
               CF BR nowhere\n\
               DIR HINT f ENDFUNC\n";

    let mut reader = MockFileReader::default();
    reader.add_file("bad.coil", src);
    let mut diagnostics = Diagnostics::new();
    let err = coilasm::assemble(Path::new("bad.coil"), "x86-64", &reader, &mut diagnostics).unwrap_err();
    assert!(matches!(err, coilasm::error::CoilError::Semantic { .. }));
}

#[test]
fn missing_input_file_is_an_io_error() {
    let reader = MockFileReader::default();
    let mut diagnostics = Diagnostics::new();
    let err = coilasm::assemble(Path::new("absent.coil"), "x86-64", &reader, &mut diagnostics).unwrap_err();
    assert!(matches!(err, coilasm::error::CoilError::Io(_)));
}

#[test]
fn label_within_a_function_resolves_to_itself() {
    let src = "DIR HINT loopy FUNC\n\
               DIR LABEL loopy\n\
               DIR LABEL top\n\
               CF BR top\n\
               CF RET\n\
               DIR HINT loopy ENDFUNC\n";

    let (_bytes, diagnostics) = assemble_ok(src);
    assert!(!diagnostics.has_errors());
}
