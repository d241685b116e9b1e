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

pub mod constants;
pub mod modrm;
pub mod one_op;
pub mod three_op;
pub mod two_op;
pub mod zero_op;

use crate::ast::{Fixup, Operand, Width};
use crate::errors::TranslationError;

pub struct Encoded {
    pub prefixes: Vec<u8>,
    pub bytecode: Vec<u8>,
    pub fixups: Vec<Fixup>,
    pub store_width: Option<Width>,
}

/// Encodes one instruction: prefix selection, then dispatch by operand
/// count. `current_offset` is the byte offset this instruction will start
/// at (known already, since the forward walk assigns offsets as it goes);
/// `known_label` looks up the byte offset of a label already defined
/// earlier in that same walk, used only to decide `jmp`'s short vs long
/// form.
pub fn encode_instruction(
    mnemonic: &str,
    operands: &[Operand],
    current_offset: i64,
    known_label: &dyn Fn(&str) -> Option<i64>,
    raw_line: &str,
) -> Result<Encoded, TranslationError> {
    let (rep_prefix, base_mnemonic) = zero_op::split_rep_prefix(mnemonic);
    let mut prefixes = Vec::new();
    if let Some(p) = rep_prefix {
        prefixes.push(p);
    }

    let needs_operand_size = operands
        .iter()
        .any(|op| matches!(op, Operand::Reg16_32 { is16: true, .. }));
    let needs_address_size = operands
        .iter()
        .any(|op| matches!(op, Operand::Address16_32 { is16: true, .. }));

    match operands.len() {
        0 => {
            let (extra_prefix, bytes) = zero_op::encode_zero_op(base_mnemonic)?;
            if let Some(p) = extra_prefix {
                prefixes.push(p);
            }
            Ok(Encoded {
                prefixes,
                bytecode: bytes,
                fixups: Vec::new(),
                store_width: None,
            })
        }
        1 => {
            if needs_operand_size {
                prefixes.push(0x66);
            }
            if needs_address_size {
                prefixes.push(0x67);
            }
            let result = one_op::encode_one_op(
                base_mnemonic,
                &operands[0],
                current_offset,
                known_label,
                raw_line,
            )?;
            Ok(Encoded {
                prefixes,
                bytecode: result.bytecode,
                fixups: result.fixups,
                store_width: result.store_width,
            })
        }
        2 => {
            if needs_operand_size {
                prefixes.push(0x66);
            }
            if needs_address_size {
                prefixes.push(0x67);
            }
            let result = two_op::encode_two_op(base_mnemonic, &operands[0], &operands[1], raw_line)?;
            Ok(Encoded {
                prefixes,
                bytecode: result.bytecode,
                fixups: result.fixups,
                store_width: None,
            })
        }
        3 => {
            if needs_operand_size {
                prefixes.push(0x66);
            }
            if needs_address_size {
                prefixes.push(0x67);
            }
            let result = three_op::encode_three_op(
                base_mnemonic,
                &operands[0],
                &operands[1],
                &operands[2],
                raw_line,
            )?;
            Ok(Encoded {
                prefixes,
                bytecode: result.bytecode,
                fixups: result.fixups,
                store_width: None,
            })
        }
        _ => Err(TranslationError::BadOperandCombination {
            reason: raw_line.to_string(),
        }),
    }
}
