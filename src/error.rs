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

use thiserror::Error;

use crate::diagnostics::SourceLocation;

/// Error taxonomy for the core pipeline (kind, not type name, per the
/// error-handling design). `lex`/`parse` buffer diagnostics internally and
/// only surface this type at stage boundaries that must fail fast: the COF
/// writer and reader, and malformed-build-time preconditions.
#[derive(Error, Debug)]
pub enum CoilError {
    #[error("{location}: lexical error: {reason}")]
    Lexical {
        location: SourceLocation,
        reason: String,
    },

    #[error("{location}: syntax error: {reason}")]
    Syntax {
        location: SourceLocation,
        reason: String,
    },

    #[error("{location}: semantic error: {reason}")]
    Semantic {
        location: SourceLocation,
        reason: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid COF format: {reason}")]
    InvalidFormat { reason: String },

    #[error("internal error: {reason}")]
    Internal { reason: String },
}
