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

use crate::ast::{Fixup, Operand};
use crate::encoder::constants::{check_i32, check_i8, fits_i8};
use crate::encoder::modrm::encode_modrm;
use crate::errors::TranslationError;

pub struct ThreeOpResult {
    pub bytecode: Vec<u8>,
    pub fixups: Vec<Fixup>,
}

/// The only three-operand form in this dialect: `imul reg, rm, imm`.
pub fn encode_three_op(
    mnemonic: &str,
    dst: &Operand,
    src: &Operand,
    imm: &Operand,
    context: &str,
) -> Result<ThreeOpResult, TranslationError> {
    if mnemonic != "imul" {
        return Err(TranslationError::UnknownMnemonic {
            reason: context.to_string(),
        });
    }
    let reg = match dst {
        Operand::Reg16_32 { reg, .. } => reg.code(),
        _ => {
            return Err(TranslationError::BadOperandCombination {
                reason: context.to_string(),
            });
        }
    };
    let value = match imm {
        Operand::Const(v) => *v as i64,
        _ => {
            return Err(TranslationError::BadOperandCombination {
                reason: context.to_string(),
            });
        }
    };
    let modrm = encode_modrm(reg, src)?;
    if fits_i8(value) {
        let mut bytes = vec![0x6B];
        bytes.extend(modrm);
        bytes.push(check_i8(value, context)? as u8);
        Ok(ThreeOpResult {
            bytecode: bytes,
            fixups: Vec::new(),
        })
    } else {
        let v32 = check_i32(value, context)?;
        let mut bytes = vec![0x69];
        bytes.extend(modrm);
        bytes.extend_from_slice(&v32.to_le_bytes());
        Ok(ThreeOpResult {
            bytecode: bytes,
            fixups: Vec::new(),
        })
    }
}
