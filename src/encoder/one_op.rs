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

use crate::ast::{Fixup, FixupKind, Operand, Width};
use crate::encoder::constants::{check_i32, check_i8, fits_i8, unary_f6_digit};
use crate::encoder::modrm::encode_modrm;
use crate::errors::TranslationError;

pub struct OneOpResult {
    pub bytecode: Vec<u8>,
    pub fixups: Vec<Fixup>,
    pub store_width: Option<Width>,
}

fn simple(bytecode: Vec<u8>) -> OneOpResult {
    OneOpResult {
        bytecode,
        fixups: Vec::new(),
        store_width: None,
    }
}

/// Known byte offset of `label` right now (the instruction about to be
/// encoded), if the label has already been defined earlier in the walk.
/// When `None`, a forward reference, a deferred fixup must be registered.
pub type KnownLabel<'a> = dyn Fn(&str) -> Option<i64> + 'a;

#[allow(clippy::too_many_arguments)]
pub fn encode_one_op(
    mnemonic: &str,
    op: &Operand,
    current_offset: i64,
    known_label: &KnownLabel,
    context: &str,
) -> Result<OneOpResult, TranslationError> {
    match mnemonic {
        "push" => encode_push(op, current_offset, known_label, context),
        "pop" => encode_pop(op, context),
        "inc" => encode_inc_dec(op, 0, context),
        "dec" => encode_inc_dec(op, 1, context),
        "not" | "neg" | "mul" | "imul" | "div" | "idiv" => encode_unary_f6(mnemonic, op, context),
        "call" => encode_call(op, current_offset, known_label, context),
        "jmp" => encode_jmp(op, current_offset, known_label, context),
        "jcxz" | "jecxz" => encode_short_only(0xE3, op, current_offset, known_label, context),
        "loop" => encode_short_only(0xE2, op, current_offset, known_label, context),
        "loopz" | "loope" => encode_short_only(0xE1, op, current_offset, known_label, context),
        "loopnz" | "loopne" => encode_short_only(0xE0, op, current_offset, known_label, context),
        "storeb" => encode_store(op, Width::Byte, context),
        "storew" => encode_store(op, Width::Word, context),
        "stored" => encode_store(op, Width::Dword, context),
        "retn" => encode_ret_imm(0xC2, op, context),
        "ret" => encode_ret_imm(0xC2, op, context),
        "retf" => encode_ret_imm(0xCA, op, context),
        "int" => encode_imm8_op(0xCD, op, context),
        "in" => encode_imm8_op(0xE5, op, context),
        "out" => encode_imm8_op(0xE7, op, context),
        _ => {
            if let Some(cc_opcode) = super::constants::condition_code(mnemonic) {
                encode_cc_jump(cc_opcode, op, current_offset, known_label, context)
            } else {
                Err(TranslationError::UnknownMnemonic {
                    reason: context.to_string(),
                })
            }
        }
    }
}

fn encode_push(
    op: &Operand,
    _current_offset: i64,
    _known_label: &KnownLabel,
    context: &str,
) -> Result<OneOpResult, TranslationError> {
    match op {
        Operand::Const(v) => {
            if fits_i8(*v as i64) {
                Ok(simple(vec![0x6A, *v as i8 as u8]))
            } else {
                let v32 = check_i32(*v as i64, context)?;
                let mut bytes = vec![0x68];
                bytes.extend_from_slice(&v32.to_le_bytes());
                Ok(simple(bytes))
            }
        }
        Operand::Reg16_32 { reg, .. } => Ok(simple(vec![0x50 + reg.code()])),
        Operand::Address8(_) => Err(TranslationError::BadOperandCombination {
            reason: context.to_string(),
        }),
        Operand::Address16_32 { .. } => {
            let modrm = encode_modrm(6, op)?;
            let mut bytes = vec![0xFF];
            bytes.extend(modrm);
            Ok(simple(bytes))
        }
        Operand::Symbolic(name) => {
            let mut bytes = vec![0x68];
            let patch_offset = bytes.len();
            emit_dword_slot(&mut bytes);
            let fixups = vec![Fixup {
                label: name.clone(),
                patch_offset,
                width: Width::Dword,
                kind: FixupKind::Absolute,
            }];
            Ok(OneOpResult {
                bytecode: bytes,
                fixups,
                store_width: None,
            })
        }
        Operand::Reg8(_) => Err(TranslationError::BadOperandCombination {
            reason: context.to_string(),
        }),
    }
}

fn encode_pop(op: &Operand, context: &str) -> Result<OneOpResult, TranslationError> {
    match op {
        Operand::Reg16_32 { reg, .. } => Ok(simple(vec![0x58 + reg.code()])),
        Operand::Address8(_) => Err(TranslationError::BadOperandCombination {
            reason: context.to_string(),
        }),
        Operand::Address16_32 { .. } => {
            let modrm = encode_modrm(0, op)?;
            let mut bytes = vec![0x8F];
            bytes.extend(modrm);
            Ok(simple(bytes))
        }
        _ => Err(TranslationError::BadOperandCombination {
            reason: context.to_string(),
        }),
    }
}

fn encode_inc_dec(op: &Operand, digit: u8, context: &str) -> Result<OneOpResult, TranslationError> {
    match op {
        Operand::Reg16_32 { reg, .. } => {
            let base = if digit == 0 { 0x40 } else { 0x48 };
            Ok(simple(vec![base + reg.code()]))
        }
        Operand::Reg8(_) => {
            let modrm = encode_modrm(digit, op)?;
            let mut bytes = vec![0xFE];
            bytes.extend(modrm);
            Ok(simple(bytes))
        }
        Operand::Address8(_) => {
            let modrm = encode_modrm(digit, op)?;
            let mut bytes = vec![0xFE];
            bytes.extend(modrm);
            Ok(simple(bytes))
        }
        Operand::Address16_32 { .. } => {
            let modrm = encode_modrm(digit, op)?;
            let mut bytes = vec![0xFF];
            bytes.extend(modrm);
            Ok(simple(bytes))
        }
        _ => Err(TranslationError::BadOperandCombination {
            reason: context.to_string(),
        }),
    }
}

fn encode_unary_f6(mnemonic: &str, op: &Operand, context: &str) -> Result<OneOpResult, TranslationError> {
    let digit = unary_f6_digit(mnemonic).expect("dispatcher only calls with known mnemonics");
    match op {
        Operand::Reg8(_) | Operand::Address8(_) => {
            let modrm = encode_modrm(digit, op)?;
            let mut bytes = vec![0xF6];
            bytes.extend(modrm);
            Ok(simple(bytes))
        }
        Operand::Reg16_32 { .. } | Operand::Address16_32 { .. } => {
            let modrm = encode_modrm(digit, op)?;
            let mut bytes = vec![0xF7];
            bytes.extend(modrm);
            Ok(simple(bytes))
        }
        _ => Err(TranslationError::BadOperandCombination {
            reason: context.to_string(),
        }),
    }
}

fn encode_call(
    op: &Operand,
    _current_offset: i64,
    _known_label: &KnownLabel,
    context: &str,
) -> Result<OneOpResult, TranslationError> {
    match op {
        Operand::Const(v) => {
            let v32 = check_i32(*v as i64, context)?;
            let mut bytes = vec![0xE8];
            bytes.extend_from_slice(&v32.to_le_bytes());
            Ok(simple(bytes))
        }
        Operand::Symbolic(name) => {
            let mut bytes = vec![0xE8];
            let patch_offset = bytes.len();
            emit_dword_slot(&mut bytes);
            let fixups = vec![Fixup {
                label: name.clone(),
                patch_offset,
                width: Width::Dword,
                kind: FixupKind::Relative,
            }];
            Ok(OneOpResult {
                bytecode: bytes,
                fixups,
                store_width: None,
            })
        }
        Operand::Reg16_32 { .. } | Operand::Address16_32 { .. } => {
            let modrm = encode_modrm(2, op)?;
            let mut bytes = vec![0xFF];
            bytes.extend(modrm);
            Ok(simple(bytes))
        }
        _ => Err(TranslationError::BadOperandCombination {
            reason: context.to_string(),
        }),
    }
}

fn encode_jmp(
    op: &Operand,
    current_offset: i64,
    known_label: &KnownLabel,
    context: &str,
) -> Result<OneOpResult, TranslationError> {
    match op {
        Operand::Const(v) => {
            if fits_i8(*v as i64) {
                Ok(simple(vec![0xEB, *v as i8 as u8]))
            } else {
                let v32 = check_i32(*v as i64, context)?;
                let mut bytes = vec![0xE9];
                bytes.extend_from_slice(&v32.to_le_bytes());
                Ok(simple(bytes))
            }
        }
        Operand::Symbolic(name) => {
            // Decide short vs long form: provably short only when the
            // label is already defined (a backward or self reference).
            if let Some(label_offset) = known_label(name) {
                let short_end = current_offset + 2;
                let disp = label_offset - short_end;
                if fits_i8(disp) {
                    let mut bytes = vec![0xEB];
                    let patch_offset = bytes.len();
                    bytes.push(0);
                    let fixups = vec![Fixup {
                        label: name.clone(),
                        patch_offset,
                        width: Width::Byte,
                        kind: FixupKind::Relative,
                    }];
                    return Ok(OneOpResult {
                        bytecode: bytes,
                        fixups,
                        store_width: None,
                    });
                }
            }
            let mut bytes = vec![0xE9];
            let patch_offset = bytes.len();
            emit_dword_slot(&mut bytes);
            Ok(OneOpResult {
                fixups: vec![Fixup {
                    label: name.clone(),
                    patch_offset,
                    width: Width::Dword,
                    kind: FixupKind::Relative,
                }],
                bytecode: bytes,
                store_width: None,
            })
        }
        Operand::Reg16_32 { .. } => {
            let modrm = encode_modrm(4, op)?;
            let mut bytes = vec![0xFF];
            bytes.extend(modrm);
            Ok(simple(bytes))
        }
        Operand::Address16_32 { .. } => {
            let modrm = encode_modrm(5, op)?;
            let mut bytes = vec![0xFF];
            bytes.extend(modrm);
            Ok(simple(bytes))
        }
        _ => Err(TranslationError::BadOperandCombination {
            reason: context.to_string(),
        }),
    }
}

fn encode_cc_jump(
    cc_opcode: u8,
    op: &Operand,
    _current_offset: i64,
    _known_label: &KnownLabel,
    context: &str,
) -> Result<OneOpResult, TranslationError> {
    match op {
        Operand::Const(v) => {
            let v32 = check_i32(*v as i64, context)?;
            let mut bytes = vec![0x0F, cc_opcode];
            bytes.extend_from_slice(&v32.to_le_bytes());
            Ok(simple(bytes))
        }
        Operand::Symbolic(name) => {
            let mut bytes = vec![0x0F, cc_opcode];
            let patch_offset = bytes.len();
            emit_dword_slot(&mut bytes);
            let fixups = vec![Fixup {
                label: name.clone(),
                patch_offset,
                width: Width::Dword,
                kind: FixupKind::Relative,
            }];
            Ok(OneOpResult {
                bytecode: bytes,
                fixups,
                store_width: None,
            })
        }
        _ => Err(TranslationError::BadOperandCombination {
            reason: context.to_string(),
        }),
    }
}

fn encode_short_only(
    opcode: u8,
    op: &Operand,
    _current_offset: i64,
    _known_label: &KnownLabel,
    context: &str,
) -> Result<OneOpResult, TranslationError> {
    match op {
        Operand::Const(v) => {
            let v8 = check_i8(*v as i64, context)?;
            Ok(simple(vec![opcode, v8 as u8]))
        }
        Operand::Symbolic(name) => {
            let bytes = vec![opcode, 0];
            Ok(OneOpResult {
                fixups: vec![Fixup {
                    label: name.clone(),
                    patch_offset: 1,
                    width: Width::Byte,
                    kind: FixupKind::Relative,
                }],
                bytecode: bytes,
                store_width: None,
            })
        }
        _ => Err(TranslationError::BadOperandCombination {
            reason: context.to_string(),
        }),
    }
}

fn encode_store(op: &Operand, width: Width, context: &str) -> Result<OneOpResult, TranslationError> {
    let value = match op {
        Operand::Const(v) => *v as i64,
        _ => {
            return Err(TranslationError::BadOperandCombination {
                reason: context.to_string(),
            });
        }
    };
    let bytes = match width {
        Width::Byte => vec![check_i8(value, context)? as u8],
        Width::Word => {
            let v16 = value as i16;
            v16.to_le_bytes().to_vec()
        }
        Width::Dword => {
            let v32 = check_i32(value, context)?;
            v32.to_le_bytes().to_vec()
        }
    };
    Ok(OneOpResult {
        bytecode: bytes,
        fixups: Vec::new(),
        store_width: Some(width),
    })
}

fn encode_ret_imm(opcode: u8, op: &Operand, context: &str) -> Result<OneOpResult, TranslationError> {
    match op {
        Operand::Const(v) => {
            // Dialect behaviour: emit a 32-bit immediate, not the
            // architectural 16-bit one; see the design notes on this point.
            let v32 = check_i32(*v as i64, context)?;
            let mut bytes = vec![opcode];
            bytes.extend_from_slice(&v32.to_le_bytes());
            Ok(simple(bytes))
        }
        _ => Err(TranslationError::BadOperandCombination {
            reason: context.to_string(),
        }),
    }
}

fn encode_imm8_op(opcode: u8, op: &Operand, context: &str) -> Result<OneOpResult, TranslationError> {
    match op {
        Operand::Const(v) => {
            let v8 = check_i8(*v as i64, context)?;
            Ok(simple(vec![opcode, v8 as u8]))
        }
        _ => Err(TranslationError::BadOperandCombination {
            reason: context.to_string(),
        }),
    }
}

fn emit_dword_slot(bytes: &mut Vec<u8>) {
    bytes.extend_from_slice(&[0, 0, 0, 0]);
}
