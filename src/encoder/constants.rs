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

use crate::errors::TranslationError;

/// Base opcode (reg/rm form, `op r/m, r`) and `/digit` group index for the
/// eight arithmetic/logic mnemonics sharing the `0x00..0x3B` and
/// `0x80/0x81/0x83` encoding families.
pub fn arith_group(mnemonic: &str) -> Option<(u8, u8)> {
    Some(match mnemonic {
        "add" => (0x00, 0),
        "or" => (0x08, 1),
        "adc" => (0x10, 2),
        "sbb" => (0x18, 3),
        "and" => (0x20, 4),
        "sub" => (0x28, 5),
        "xor" => (0x30, 6),
        "cmp" => (0x38, 7),
        _ => return None,
    })
}

/// `/digit` for the shift/rotate family sharing `0xC0/0xC1/0xD2/0xD3`.
pub fn shift_group_digit(mnemonic: &str) -> Option<u8> {
    Some(match mnemonic {
        "rol" => 0,
        "ror" => 1,
        "rcl" => 2,
        "rcr" => 3,
        "shl" | "sal" => 4,
        "shr" => 5,
        "sar" => 7,
        _ => return None,
    })
}

/// `/digit` for the `0xF6/0xF7` unary group (`not`/`neg`/`mul`/`imul`/
/// `div`/`idiv`/`test`).
pub fn unary_f6_digit(mnemonic: &str) -> Option<u8> {
    Some(match mnemonic {
        "test" => 0,
        "not" => 2,
        "neg" => 3,
        "mul" => 4,
        "imul" => 5,
        "div" => 6,
        "idiv" => 7,
        _ => return None,
    })
}

/// Two-byte opcode for a conditional jump mnemonic (`0x0F <cc>`).
pub fn condition_code(mnemonic: &str) -> Option<u8> {
    Some(match mnemonic {
        "jo" => 0x80,
        "jno" => 0x81,
        "jb" | "jc" | "jnae" => 0x82,
        "jae" | "jnb" | "jnc" => 0x83,
        "je" | "jz" => 0x84,
        "jne" | "jnz" => 0x85,
        "jbe" | "jna" => 0x86,
        "ja" | "jnbe" => 0x87,
        "js" => 0x88,
        "jns" => 0x89,
        "jp" | "jpe" => 0x8A,
        "jnp" | "jpo" => 0x8B,
        "jl" | "jnge" => 0x8C,
        "jge" | "jnl" => 0x8D,
        "jle" | "jng" => 0x8E,
        "jg" | "jnle" => 0x8F,
        _ => return None,
    })
}

pub fn fits_i8(value: i64) -> bool {
    (i8::MIN as i64..=i8::MAX as i64).contains(&value)
}

pub fn check_i32(value: i64, context: &str) -> Result<i32, TranslationError> {
    if (i32::MIN as i64..=u32::MAX as i64).contains(&value) {
        Ok(value as i32)
    } else {
        Err(TranslationError::BadImmediate {
            reason: context.to_string(),
        })
    }
}

pub fn check_i8(value: i64, context: &str) -> Result<i8, TranslationError> {
    if fits_i8(value) {
        Ok(value as i8)
    } else {
        Err(TranslationError::BadImmediate {
            reason: context.to_string(),
        })
    }
}
