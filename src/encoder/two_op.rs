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
use crate::encoder::constants::{arith_group, check_i32, check_i8, fits_i8, shift_group_digit};
use crate::encoder::modrm::encode_modrm;
use crate::errors::TranslationError;

pub struct TwoOpResult {
    pub bytecode: Vec<u8>,
    pub fixups: Vec<Fixup>,
}

fn simple(bytecode: Vec<u8>) -> TwoOpResult {
    TwoOpResult {
        bytecode,
        fixups: Vec::new(),
    }
}

/// `mov`/`add`/`sub` to a symbolic value reserve a dword immediate-to-rm
/// slot and defer it to an absolute fixup, mirroring `one_op::encode_push`'s
/// handling of `push <label>`. Only these mnemonics are specified to accept
/// a symbolic source; the rest of the arithmetic group falls through to the
/// ordinary reg/rm path, which rejects `Symbolic` at the ModR/M stage.
fn symbolic_to_rm(
    opcode_imm: u8,
    digit: u8,
    dst: &Operand,
    name: &str,
    context: &str,
) -> Result<TwoOpResult, TranslationError> {
    if matches!(dst, Operand::Reg8(_) | Operand::Address8(_)) {
        return Err(TranslationError::BadOperandCombination {
            reason: context.to_string(),
        });
    }
    let modrm = encode_modrm(digit, dst)?;
    let mut bytes = vec![opcode_imm];
    bytes.extend(modrm);
    let patch_offset = bytes.len();
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    let fixups = vec![Fixup {
        label: name.to_string(),
        patch_offset,
        width: Width::Dword,
        kind: FixupKind::Absolute,
    }];
    Ok(TwoOpResult { bytecode: bytes, fixups })
}

pub fn encode_two_op(
    mnemonic: &str,
    dst: &Operand,
    src: &Operand,
    context: &str,
) -> Result<TwoOpResult, TranslationError> {
    if let Some((base_opcode, digit)) = arith_group(mnemonic) {
        return encode_arith(mnemonic, base_opcode, digit, dst, src, context);
    }
    if let Some(digit) = shift_group_digit(mnemonic) {
        return encode_shift(digit, dst, src, context);
    }
    match mnemonic {
        "test" => encode_test(dst, src, context),
        "xchg" => encode_reg_rm(0x86, 0x87, dst, src, context),
        "mov" => encode_mov(dst, src, context),
        "lea" => encode_lea(dst, src, context),
        "imul" => encode_imul_2op(dst, src, context),
        "movzx" => encode_movzx(dst, src, context),
        _ => Err(TranslationError::UnknownMnemonic {
            reason: context.to_string(),
        }),
    }
}

fn reject_mem_to_mem(dst: &Operand, src: &Operand, context: &str) -> Result<(), TranslationError> {
    if dst.is_memory() && src.is_memory() {
        return Err(TranslationError::BadOperandCombination {
            reason: context.to_string(),
        });
    }
    Ok(())
}

/// Encodes the four-variant `op reg,rm` / `op rm,reg` family shared by
/// mnemonics whose reg/rm opcodes are `base+0`/`base+1`/`base+2`/`base+3`
/// (8-bit rm/reg, 32-bit rm/reg, 8-bit reg/rm, 32-bit reg/rm).
fn encode_reg_rm(
    opcode8: u8,
    opcode32: u8,
    dst: &Operand,
    src: &Operand,
    context: &str,
) -> Result<TwoOpResult, TranslationError> {
    reject_mem_to_mem(dst, src, context)?;
    // Prefer the register operand as "reg" and keep the memory/const
    // operand as "rm"; when both are registers, dst plays "reg".
    let (reg_op, rm_op, opcode) = pick_reg_rm(dst, src, opcode8, opcode32, context)?;
    let reg_field = register_code(reg_op, context)?;
    let modrm = encode_modrm(reg_field, rm_op)?;
    let mut bytes = vec![opcode];
    bytes.extend(modrm);
    Ok(simple(bytes))
}

fn pick_reg_rm<'a>(
    dst: &'a Operand,
    src: &'a Operand,
    opcode8: u8,
    opcode32: u8,
    context: &str,
) -> Result<(&'a Operand, &'a Operand, u8), TranslationError> {
    let eight_bit = dst.is_register() && matches!(dst, Operand::Reg8(_))
        || src.is_register() && matches!(src, Operand::Reg8(_));
    let opcode = if eight_bit { opcode8 } else { opcode32 };
    if dst.is_register() {
        Ok((dst, src, opcode))
    } else if src.is_register() {
        Ok((src, dst, opcode + 2))
    } else {
        Err(TranslationError::BadOperandCombination {
            reason: context.to_string(),
        })
    }
}

fn register_code(op: &Operand, context: &str) -> Result<u8, TranslationError> {
    match op {
        Operand::Reg8(r) => Ok(r.code()),
        Operand::Reg16_32 { reg, .. } => Ok(reg.code()),
        _ => Err(TranslationError::BadOperandCombination {
            reason: context.to_string(),
        }),
    }
}

fn encode_arith(
    mnemonic: &str,
    base_opcode: u8,
    digit: u8,
    dst: &Operand,
    src: &Operand,
    context: &str,
) -> Result<TwoOpResult, TranslationError> {
    reject_mem_to_mem(dst, src, context)?;
    if let Operand::Symbolic(name) = src {
        if mnemonic == "add" || mnemonic == "sub" {
            return symbolic_to_rm(0x81, digit, dst, name, context);
        }
    }
    if let Operand::Const(v) = src {
        if matches!(dst, Operand::Reg8(_) | Operand::Address8(_)) {
            let modrm = encode_modrm(digit, dst)?;
            let mut bytes = vec![0x80];
            bytes.extend(modrm);
            bytes.push(check_i8(*v as i64, context)? as u8);
            return Ok(simple(bytes));
        }
        if !dst.is_register() && !dst.is_memory() {
            return Err(TranslationError::BadOperandCombination {
                reason: context.to_string(),
            });
        }
        let modrm = encode_modrm(digit, dst)?;
        if fits_i8(*v as i64) {
            let mut bytes = vec![0x83];
            bytes.extend(modrm);
            bytes.push(*v as i8 as u8);
            Ok(simple(bytes))
        } else {
            let v32 = check_i32(*v as i64, context)?;
            let mut bytes = vec![0x81];
            bytes.extend(modrm);
            bytes.extend_from_slice(&v32.to_le_bytes());
            Ok(simple(bytes))
        }
    } else {
        encode_reg_rm(base_opcode, base_opcode + 1, dst, src, context)
    }
}

fn encode_test(dst: &Operand, src: &Operand, context: &str) -> Result<TwoOpResult, TranslationError> {
    reject_mem_to_mem(dst, src, context)?;
    if let Operand::Const(v) = src {
        let eight_bit = matches!(dst, Operand::Reg8(_) | Operand::Address8(_));
        let modrm = encode_modrm(0, dst)?;
        if eight_bit {
            let mut bytes = vec![0xF6];
            bytes.extend(modrm);
            bytes.push(check_i8(*v as i64, context)? as u8);
            Ok(simple(bytes))
        } else {
            let v32 = check_i32(*v as i64, context)?;
            let mut bytes = vec![0xF7];
            bytes.extend(modrm);
            bytes.extend_from_slice(&v32.to_le_bytes());
            Ok(simple(bytes))
        }
    } else {
        encode_reg_rm(0x84, 0x85, dst, src, context)
    }
}

fn encode_mov(dst: &Operand, src: &Operand, context: &str) -> Result<TwoOpResult, TranslationError> {
    reject_mem_to_mem(dst, src, context)?;
    if let Operand::Symbolic(name) = src {
        return symbolic_to_rm(0xC7, 0, dst, name, context);
    }
    if let Operand::Const(v) = src {
        let eight_bit = matches!(dst, Operand::Reg8(_) | Operand::Address8(_));
        let modrm = encode_modrm(0, dst)?;
        if eight_bit {
            let mut bytes = vec![0xC6];
            bytes.extend(modrm);
            bytes.push(check_i8(*v as i64, context)? as u8);
            Ok(simple(bytes))
        } else {
            let v32 = check_i32(*v as i64, context)?;
            let mut bytes = vec![0xC7];
            bytes.extend(modrm);
            bytes.extend_from_slice(&v32.to_le_bytes());
            Ok(simple(bytes))
        }
    } else {
        encode_reg_rm(0x88, 0x89, dst, src, context)
    }
}

fn encode_lea(dst: &Operand, src: &Operand, context: &str) -> Result<TwoOpResult, TranslationError> {
    if !matches!(dst, Operand::Reg16_32 { .. }) || !src.is_memory() {
        return Err(TranslationError::BadOperandCombination {
            reason: context.to_string(),
        });
    }
    let reg_field = register_code(dst, context)?;
    let modrm = encode_modrm(reg_field, src)?;
    let mut bytes = vec![0x8D];
    bytes.extend(modrm);
    Ok(simple(bytes))
}

fn encode_shift(digit: u8, dst: &Operand, src: &Operand, context: &str) -> Result<TwoOpResult, TranslationError> {
    if !dst.is_register() && !dst.is_memory() {
        return Err(TranslationError::BadOperandCombination {
            reason: context.to_string(),
        });
    }
    match src {
        Operand::Const(v) => {
            let modrm = encode_modrm(digit, dst)?;
            let opcode = if matches!(dst, Operand::Reg8(_) | Operand::Address8(_)) {
                0xC0
            } else {
                0xC1
            };
            let mut bytes = vec![opcode];
            bytes.extend(modrm);
            bytes.push(check_i8(*v as i64, context)? as u8);
            Ok(simple(bytes))
        }
        Operand::Reg8(cl) if cl.code() == 1 => {
            let modrm = encode_modrm(digit, dst)?;
            let opcode = if matches!(dst, Operand::Reg8(_) | Operand::Address8(_)) {
                0xD2
            } else {
                0xD3
            };
            let mut bytes = vec![opcode];
            bytes.extend(modrm);
            Ok(simple(bytes))
        }
        _ => Err(TranslationError::BadOperandCombination {
            reason: context.to_string(),
        }),
    }
}

fn encode_imul_2op(dst: &Operand, src: &Operand, context: &str) -> Result<TwoOpResult, TranslationError> {
    if !matches!(dst, Operand::Reg16_32 { .. }) {
        return Err(TranslationError::BadOperandCombination {
            reason: context.to_string(),
        });
    }
    let reg_field = register_code(dst, context)?;
    let modrm = encode_modrm(reg_field, src)?;
    let mut bytes = vec![0x0F, 0xAF];
    bytes.extend(modrm);
    Ok(simple(bytes))
}

fn encode_movzx(dst: &Operand, src: &Operand, context: &str) -> Result<TwoOpResult, TranslationError> {
    if !matches!(dst, Operand::Reg16_32 { .. }) {
        return Err(TranslationError::BadOperandCombination {
            reason: context.to_string(),
        });
    }
    let reg_field = register_code(dst, context)?;
    let modrm = encode_modrm(reg_field, src)?;
    let opcode_second = if src.is_16bit() || matches!(src, Operand::Reg16_32 { .. } | Operand::Address16_32 { .. }) {
        0xB7
    } else {
        0xB6
    };
    let mut bytes = vec![0x0F, opcode_second];
    bytes.extend(modrm);
    Ok(simple(bytes))
}
