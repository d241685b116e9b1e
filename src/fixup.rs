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

use crate::ast::{AssembledProgram, FixupKind, Label, TranslationState, Width};
use crate::errors::TranslationError;

/// Sweep 1: assigns each instruction its byte offset as the running sum of
/// `prefix_len + bytecode_len` of the instructions before it.
fn assign_instruction_offsets(state: &mut TranslationState) {
    let mut offset = 0usize;
    for instruction in &mut state.instructions {
        instruction.byte_offset = offset;
        offset += instruction.total_len();
    }
}

/// Sweep 2: now that every instruction has a final byte offset, resolve
/// each label's offset from its instruction index, then drain the
/// deferred fixups, patching the placeholder bytes each instruction
/// reserved for its symbolic operands.
fn resolve_labels_and_patch(state: &mut TranslationState) -> Result<(), TranslationError> {
    for label in state.labels.values_mut() {
        let target = state
            .instructions
            .get(label.instruction_index)
            .map(|i| i.byte_offset as i64)
            .unwrap_or(state.instructions.iter().map(|i| i.total_len()).sum::<usize>() as i64);
        label.byte_offset = target;
    }

    let labels_snapshot: HashMap<String, Label> = state.labels.clone();

    for instruction in &mut state.instructions {
        if instruction.fixups.is_empty() {
            continue;
        }
        let fixups = std::mem::take(&mut instruction.fixups);
        for fixup in fixups {
            let label = labels_snapshot
                .get(&fixup.label)
                .ok_or_else(|| TranslationError::UndefinedLabel {
                    name: fixup.label.clone(),
                })?;
            let value: i64 = match fixup.kind {
                FixupKind::Absolute => label.byte_offset,
                FixupKind::Relative => {
                    let instruction_end = (instruction.byte_offset + instruction.total_len()) as i64;
                    label.byte_offset - instruction_end
                }
            };
            write_patch(&mut instruction.bytecode, fixup.patch_offset, fixup.width, value)?;
        }
    }

    Ok(())
}

fn write_patch(
    bytecode: &mut [u8],
    patch_offset: usize,
    width: Width,
    value: i64,
) -> Result<(), TranslationError> {
    match width {
        Width::Byte => {
            if !(i8::MIN as i64..=i8::MAX as i64).contains(&value) {
                return Err(TranslationError::BadImmediate {
                    reason: format!("fixup displacement {value} does not fit in a byte"),
                });
            }
            bytecode[patch_offset] = value as i8 as u8;
        }
        Width::Word => {
            let v = value as i16;
            bytecode[patch_offset..patch_offset + 2].copy_from_slice(&v.to_le_bytes());
        }
        Width::Dword => {
            let v = value as i32;
            bytecode[patch_offset..patch_offset + 4].copy_from_slice(&v.to_le_bytes());
        }
    }
    Ok(())
}

/// Runs both fixup sweeps and produces the final assembled program: the
/// flat byte buffer, the variable-offset table, and the initial-bytes
/// snapshot used by `AssembledProgram::restore_variables`.
pub fn run_fixup_pass(mut state: TranslationState) -> Result<AssembledProgram, TranslationError> {
    assign_instruction_offsets(&mut state);
    resolve_labels_and_patch(&mut state)?;

    let mut bytes = Vec::new();
    for instruction in &state.instructions {
        bytes.extend_from_slice(&instruction.prefixes);
        bytes.extend_from_slice(&instruction.bytecode);
    }

    let mut variable_offsets = HashMap::new();
    let mut initial_variable_bytes = HashMap::new();
    for name in &state.variable_labels {
        let label = &state.labels[name];
        let offset = label.byte_offset as usize;
        variable_offsets.insert(name.clone(), offset);

        // A variable is a contiguous run of store* primitives; snapshot the
        // whole run, not just its first byte, so restore_variables can undo
        // writes anywhere in a multi-byte string or dup block.
        let mut run = Vec::new();
        for instruction in &state.instructions[label.instruction_index..] {
            if instruction.store_width.is_none() {
                break;
            }
            run.extend_from_slice(&instruction.bytecode);
        }
        initial_variable_bytes.insert(offset, run);
    }

    Ok(AssembledProgram {
        bytes,
        variable_offsets,
        initial_variable_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Fixup, InstructionRecord};

    fn instr(bytecode: Vec<u8>, fixups: Vec<Fixup>) -> InstructionRecord {
        InstructionRecord {
            mnemonic: "test".to_string(),
            prefixes: Vec::new(),
            bytecode,
            byte_offset: 0,
            fixups,
            store_width: None,
        }
    }

    #[test]
    fn assigns_sequential_offsets() {
        let mut state = TranslationState::default();
        state.instructions.push(instr(vec![0x90], vec![]));
        state.instructions.push(instr(vec![0x90, 0x90], vec![]));
        assign_instruction_offsets(&mut state);
        assert_eq!(state.instructions[0].byte_offset, 0);
        assert_eq!(state.instructions[1].byte_offset, 1);
    }

    #[test]
    fn patches_relative_backward_jump() {
        let mut state = TranslationState::default();
        // L: jmp L -> EB FE
        state.instructions.push(instr(
            vec![0xEB, 0x00],
            vec![Fixup {
                label: "l".to_string(),
                patch_offset: 1,
                width: Width::Byte,
                kind: FixupKind::Relative,
            }],
        ));
        state.labels.insert(
            "l".to_string(),
            Label {
                name: "l".to_string(),
                instruction_index: 0,
                byte_offset: Label::UNRESOLVED,
            },
        );
        let program = run_fixup_pass(state).unwrap();
        assert_eq!(program.bytes, vec![0xEB, 0xFE]);
    }

    #[test]
    fn undefined_label_is_an_error() {
        let mut state = TranslationState::default();
        state.instructions.push(instr(
            vec![0xE9, 0, 0, 0, 0],
            vec![Fixup {
                label: "missing".to_string(),
                patch_offset: 1,
                width: Width::Dword,
                kind: FixupKind::Relative,
            }],
        ));
        let err = run_fixup_pass(state).unwrap_err();
        assert!(matches!(err, TranslationError::UndefinedLabel { .. }));
    }
}
