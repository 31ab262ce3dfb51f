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

use std::fmt;
use std::sync::Arc;

/// A position within a single source file. Immutable once built; shared by
/// every token and diagnostic that points into that file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub file: Arc<str>,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(file: Arc<str>, line: u32, column: u32) -> Self {
        debug_assert!(line >= 1 && column >= 1);
        Self { file, line, column }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Note,
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Note => "note",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal error",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub location: SourceLocation,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.location, self.severity, self.message)
    }
}

/// Severity-tagged message buffer with an error-latch flag. Threaded
/// explicitly through the lexer and parser rather than kept as a global
/// singleton (permitted refactor, see SPEC_FULL.md Design Notes).
#[derive(Debug, Default)]
pub struct Diagnostics {
    messages: Vec<Diagnostic>,
    latched: bool,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, severity: Severity, location: SourceLocation, message: impl Into<String>) {
        if severity >= Severity::Error {
            self.latched = true;
        }
        self.messages.push(Diagnostic {
            severity,
            location,
            message: message.into(),
        });
    }

    pub fn note(&mut self, location: SourceLocation, message: impl Into<String>) {
        self.push(Severity::Note, location, message);
    }

    pub fn warning(&mut self, location: SourceLocation, message: impl Into<String>) {
        self.push(Severity::Warning, location, message);
    }

    pub fn error(&mut self, location: SourceLocation, message: impl Into<String>) {
        self.push(Severity::Error, location, message);
    }

    pub fn fatal(&mut self, location: SourceLocation, message: impl Into<String>) {
        self.push(Severity::Fatal, location, message);
    }

    /// True once any diagnostic of severity >= Error has been recorded.
    pub fn has_errors(&self) -> bool {
        self.latched
    }

    pub fn messages(&self) -> &[Diagnostic] {
        &self.messages
    }

    /// Prints every buffered diagnostic to stdout/stderr per its severity,
    /// in recorded (source-position) order.
    pub fn emit(&self) {
        for diag in &self.messages {
            if diag.severity >= Severity::Error {
                eprintln!("{diag}");
            } else {
                println!("{diag}");
            }
        }
    }
}
