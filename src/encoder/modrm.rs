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

use crate::ast::{MemOperand, Operand, RegWide};
use crate::errors::TranslationError;

/// Encodes the ModR/M (+ SIB + displacement) bytes for an `rm` operand
/// paired with a `reg`/opcode-extension field. `rm` must be a register or
/// memory operand; anything else is a caller bug surfaced as
/// `BadOperandCombination`.
pub fn encode_modrm(reg_field: u8, rm: &Operand) -> Result<Vec<u8>, TranslationError> {
    let reg_field = reg_field & 0x07;
    match rm {
        Operand::Reg8(r) => Ok(vec![0xC0 | (reg_field << 3) | r.code()]),
        Operand::Reg16_32 { reg, .. } => Ok(vec![0xC0 | (reg_field << 3) | reg.code()]),
        Operand::Address8(mem) => encode_memory(reg_field, mem),
        Operand::Address16_32 { mem, .. } => encode_memory(reg_field, mem),
        _ => Err(TranslationError::BadOperandCombination {
            reason: format!("{:?} cannot appear in the rm position", rm),
        }),
    }
}

fn disp_mode(disp: i32, force_disp8: bool) -> (u8, Vec<u8>) {
    if disp == 0 && !force_disp8 {
        (0b00, Vec::new())
    } else if (i8::MIN as i32..=i8::MAX as i32).contains(&disp) {
        (0b01, vec![disp as i8 as u8])
    } else {
        (0b10, disp.to_le_bytes().to_vec())
    }
}

fn encode_memory(reg_field: u8, mem: &MemOperand) -> Result<Vec<u8>, TranslationError> {
    let mut bytes = Vec::new();

    match (mem.base, mem.index) {
        (None, None) => {
            // Rule 1: pure displacement, mod=00 rm=101, 4-byte disp always.
            bytes.push((reg_field << 3) | 0b101);
            bytes.extend_from_slice(&mem.disp.to_le_bytes());
        }
        (Some(base), None) if base == RegWide::Esp => {
            // Rule 4: esp as base always needs a SIB byte.
            let (mod_bits, disp_bytes) = disp_mode(mem.disp, false);
            bytes.push((mod_bits << 6) | (reg_field << 3) | 0b100);
            bytes.push(0b00_100_100); // scale=1, index=none(100), base=esp(100)
            bytes.extend(disp_bytes);
        }
        (Some(base), None) => {
            // Rule 2: [ebp] with zero displacement must force disp8.
            let force_disp8 = base == RegWide::Ebp && mem.disp == 0;
            let (mod_bits, disp_bytes) = disp_mode(mem.disp, force_disp8);
            bytes.push((mod_bits << 6) | (reg_field << 3) | base.code());
            bytes.extend(disp_bytes);
        }
        (base_opt, Some((index_reg, scale))) => {
            if index_reg == RegWide::Esp {
                return Err(TranslationError::BadAddress {
                    reason: "esp cannot be used as an index register".to_string(),
                });
            }
            let force_disp8 = base_opt == Some(RegWide::Ebp) && mem.disp == 0;
            let (mod_bits, disp_bytes) = if base_opt.is_none() {
                (0b00, mem.disp.to_le_bytes().to_vec())
            } else {
                disp_mode(mem.disp, force_disp8)
            };
            bytes.push((mod_bits << 6) | (reg_field << 3) | 0b100);
            let base_field = base_opt.map(|b| b.code()).unwrap_or(0b101);
            bytes.push((scale.bits() << 6) | (index_reg.code() << 3) | base_field);
            bytes.extend(disp_bytes);
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Scale;

    #[test]
    fn pure_displacement() {
        let mem = MemOperand {
            base: None,
            index: None,
            disp: 0x10,
        };
        let bytes = encode_memory(0, &mem).unwrap();
        assert_eq!(bytes, vec![0b00_000_101, 0x10, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn ebp_zero_displacement_forces_disp8() {
        let mem = MemOperand {
            base: Some(RegWide::Ebp),
            index: None,
            disp: 0,
        };
        let bytes = encode_memory(0, &mem).unwrap();
        assert_eq!(bytes, vec![0b01_000_101, 0x00]);
    }

    #[test]
    fn esp_base_needs_sib() {
        let mem = MemOperand {
            base: Some(RegWide::Esp),
            index: None,
            disp: 0,
        };
        let bytes = encode_memory(0, &mem).unwrap();
        assert_eq!(bytes, vec![0b00_000_100, 0b00_100_100]);
    }

    #[test]
    fn base_index_scale_disp8() {
        let mem = MemOperand {
            base: Some(RegWide::Ebx),
            index: Some((RegWide::Ecx, Scale::Four)),
            disp: 0x10,
        };
        let bytes = encode_memory(0b000, &mem).unwrap();
        // mod=01 reg=000 rm=100 ; scale=10 index=001(ecx) base=011(ebx) ; disp8=0x10
        assert_eq!(bytes, vec![0b01_000_100, 0b10_001_011, 0x10]);
    }
}
