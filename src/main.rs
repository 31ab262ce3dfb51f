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

//! The `coilasm` command-line driver. An external collaborator around
//! the core library: it owns argument parsing, log-level selection, and
//! diagnostic-to-stderr/stdout routing, then hands the actual lex/parse/
//! write work to `coilasm::assemble`.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use coilasm::diagnostics::Diagnostics;
use coilasm::file_reader::AsmFileReader;

/// COIL assembler: turns COIL assembly text into a relocatable COF object.
#[derive(Parser)]
#[clap(name = "coilasm", version, author = "Connor Nolan")]
struct Opts {
    /// Input COIL assembly source file.
    input: PathBuf,

    /// Output COF file. Defaults to the input path with its extension
    /// replaced by `.cof` (or `.cof` appended if it had none).
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Target architecture tag recorded in the COF target table.
    #[clap(short, long, default_value = "x86-64")]
    target: String,

    /// Raise logging to debug level.
    #[clap(short, long)]
    verbose: bool,
}

fn default_output_path(input: &PathBuf) -> PathBuf {
    let mut output = input.clone();
    output.set_extension("cof");
    output
}

fn main() -> ExitCode {
    let opts = Opts::parse();

    let log_level = if opts.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let output_path = opts.output.clone().unwrap_or_else(|| default_output_path(&opts.input));

    log::debug!(
        "assembling {} -> {} (target {})",
        opts.input.display(),
        output_path.display(),
        opts.target
    );

    let reader = AsmFileReader;
    let mut diagnostics = Diagnostics::new();

    let bytes = match coilasm::assemble(&opts.input, &opts.target, &reader, &mut diagnostics) {
        Ok(bytes) => bytes,
        Err(err) => {
            diagnostics.emit();
            log::error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = std::fs::write(&output_path, &bytes) {
        log::error!("failed to write {}: {err}", output_path.display());
        return ExitCode::FAILURE;
    }

    diagnostics.emit();
    log::info!(
        "wrote {} ({} bytes)",
        output_path.display(),
        bytes.len()
    );

    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_replaces_extension() {
        assert_eq!(default_output_path(&PathBuf::from("main.asm")), PathBuf::from("main.cof"));
    }

    #[test]
    fn default_output_appends_extension_when_absent() {
        assert_eq!(default_output_path(&PathBuf::from("main")), PathBuf::from("main.cof"));
    }
}
