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

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser as clap_parser;
use sasm::{translate, MapResolver, MockResolver};
use serde::Serialize;

#[derive(clap_parser)]
#[clap(version = "0.1.0", author = "Connor Nolan")]
struct Opts {
    /// Path to the .sasm source file to translate.
    #[clap(short, long)]
    input: PathBuf,
    /// Path to write the assembled byte buffer to.
    #[clap(short, long)]
    output: PathBuf,
    /// Optional JSON file of the form {"library": {"symbol": "0x..."}}
    /// resolving `extern` declarations; omit to run with no externs defined.
    #[clap(short, long)]
    externs: Option<PathBuf>,
    /// Install the $first/$second/$this/$return stack-frame constants
    /// before translating.
    #[clap(long)]
    with_prolog: bool,
}

#[derive(Serialize)]
struct ProgramMap {
    variable_offsets: HashMap<String, usize>,
}

fn main() -> Result<()> {
    let opts: Opts = Opts::parse();

    let source = fs::read_to_string(&opts.input)
        .with_context(|| format!("Failed to read input file: {}", opts.input.display()))?;

    let program = match &opts.externs {
        Some(path) => {
            let table_text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read externs file: {}", path.display()))?;
            let table: HashMap<String, HashMap<String, String>> = serde_json::from_str(&table_text)
                .with_context(|| format!("Failed to parse externs file: {}", path.display()))?;
            let resolver = MapResolver::new(table);
            translate(&source, &resolver, opts.with_prolog)
                .context("Failed during translation")?
        }
        None => {
            let resolver = MockResolver::new();
            translate(&source, &resolver, opts.with_prolog)
                .context("Failed during translation")?
        }
    };

    fs::write(&opts.output, &program.bytes)
        .with_context(|| format!("Failed to write output file: {}", opts.output.display()))?;

    let map = ProgramMap {
        variable_offsets: program.variable_offsets.clone(),
    };
    let map_path = opts.output.with_extension("map.json");
    let map_json = serde_json::to_string_pretty(&map).context("Failed to serialize variable map")?;
    fs::write(&map_path, map_json)
        .with_context(|| format!("Failed to write map file: {}", map_path.display()))?;

    println!(
        "Successfully assembled {} to {} ({} bytes)",
        opts.input.display(),
        opts.output.display(),
        program.bytes.len()
    );

    Ok(())
}
