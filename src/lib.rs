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

pub mod ast;
pub mod encoder;
pub mod errors;
pub mod expand;
pub mod fixup;
pub mod numeric;
pub mod operand;
pub mod preprocess;
pub mod resolver;

pub use ast::AssembledProgram;
pub use errors::TranslationError;
pub use resolver::{LibraryResolver, MapResolver, MockResolver};

/// The four fixed argument-slot constants every translated routine inherits
/// from its caller's stack frame, counting past the return address and the
/// saved `ebp` the standard prolog pushes.
const PROLOG_CONSTANTS: &[(&str, &str)] = &[
    ("$first", "[ebp+18h]"),
    ("$second", "[ebp+1Ch]"),
    ("$this", "[ebp+20h]"),
    ("$return", "[ebp+28h]"),
];

/// Translates one complete source unit into an assembled program.
///
/// `with_prolog` installs the `$first`/`$second`/`$this`/`$return` stack
/// frame constants ahead of translation and emits the fixed literal prolog
/// instruction sequence (`preprocess::PROLOG_EXPANSION`) that those offsets
/// assume is in place; callers assembling a routine meant to be invoked
/// through the fixed calling convention should set it. `asmret` expands to
/// the mirroring epilog wherever it appears in `source`.
pub fn translate(
    source: &str,
    resolver: &dyn LibraryResolver,
    with_prolog: bool,
) -> Result<AssembledProgram, TranslationError> {
    let mut lines = Vec::new();
    if with_prolog {
        for (name, replacement) in PROLOG_CONSTANTS {
            lines.push(format!("{name} equ {replacement}"));
        }
        lines.extend(preprocess::PROLOG_EXPANSION.iter().map(|s| s.to_string()));
    }
    lines.extend(preprocess::preprocess_source(source)?);

    let state = expand::expand_and_encode(lines, resolver)?;
    fixup::run_fixup_pass(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_trivial_program() {
        let resolver = MockResolver::new();
        let program = translate("nop\nnop\n", &resolver, false).unwrap();
        assert_eq!(program.bytes, vec![0x90, 0x90]);
    }

    #[test]
    fn prolog_constants_resolve_to_fixed_frame_offsets() {
        let resolver = MockResolver::new();
        let program = translate("mov eax, $first\n", &resolver, true).unwrap();
        // push eax; pushf; push ebp; mov ebp,esp; push ebx; push esi; push edi;
        // mov eax, [ebp+18h] -> 8B 45 18
        assert_eq!(
            program.bytes,
            vec![
                0x50, 0x9C, 0x55, 0x89, 0xE5, 0x53, 0x56, 0x57, 0x8B, 0x45, 0x18,
            ]
        );
    }

    #[test]
    fn with_prolog_and_asmret_mirror_each_other() {
        let resolver = MockResolver::new();
        let program = translate("asmret\n", &resolver, true).unwrap();
        assert_eq!(
            program.bytes,
            vec![
                0x50, 0x9C, 0x55, 0x89, 0xE5, 0x53, 0x56, 0x57, // prolog
                0x5F, 0x5E, 0x5B, 0x89, 0xEC, 0x5D, 0x9D, 0x58, 0xC3, // epilog
            ]
        );
    }

    #[test]
    fn full_scenario_extern_call_and_variable() {
        let resolver = MockResolver::new().with_symbol("kernel32", "ExitProcess", 0x7700_0000);
        let source = "\
extern ExitProcess lib kernel32
msg db \"hi\", 0
proc main
invoke ExitProcess, 0
endp
";
        let program = translate(source, &resolver, false).unwrap();
        assert!(program.variable_offsets.contains_key("msg"));
        assert!(!program.bytes.is_empty());
    }
}
