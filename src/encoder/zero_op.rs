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

/// Encodes a zero-operand mnemonic. Returns the extra operand-size prefix
/// byte (only the string-primitive `w` variants need one, since their `d`
/// sibling is the architecture default) plus the opcode bytes.
pub fn encode_zero_op(mnemonic: &str) -> Result<(Option<u8>, Vec<u8>), TranslationError> {
    let bytes = |b: &[u8]| -> Vec<u8> { b.to_vec() };

    let (prefix, opcode): (Option<u8>, Vec<u8>) = match mnemonic {
        "nop" => (None, bytes(&[0x90])),
        "pusha" => (None, bytes(&[0x60])),
        "popa" => (None, bytes(&[0x61])),
        "pushf" => (None, bytes(&[0x9C])),
        "popf" => (None, bytes(&[0x9D])),
        "ret" | "retn" => (None, bytes(&[0xC3])),
        "retf" => (None, bytes(&[0xCB])),
        "int1" => (None, bytes(&[0xF1])),
        "int3" => (None, bytes(&[0xCC])),
        "lahf" => (None, bytes(&[0x9F])),
        "sahf" => (None, bytes(&[0x9E])),
        "cbw" => (Some(0x66), bytes(&[0x98])),
        "cwde" => (None, bytes(&[0x98])),
        "cwd" => (Some(0x66), bytes(&[0x99])),
        "cdq" => (None, bytes(&[0x99])),
        "salc" => (None, bytes(&[0xD6])),
        "xlat" => (None, bytes(&[0xD7])),
        "clc" => (None, bytes(&[0xF8])),
        "stc" => (None, bytes(&[0xF9])),
        "cli" => (None, bytes(&[0xFA])),
        "sti" => (None, bytes(&[0xFB])),
        "cld" => (None, bytes(&[0xFC])),
        "std" => (None, bytes(&[0xFD])),
        "movsb" => (None, bytes(&[0xA4])),
        "movsw" => (Some(0x66), bytes(&[0xA5])),
        "movsd" => (None, bytes(&[0xA5])),
        "cmpsb" => (None, bytes(&[0xA6])),
        "cmpsw" => (Some(0x66), bytes(&[0xA7])),
        "cmpsd" => (None, bytes(&[0xA7])),
        "stosb" => (None, bytes(&[0xAA])),
        "stosw" => (Some(0x66), bytes(&[0xAB])),
        "stosd" => (None, bytes(&[0xAB])),
        "lodsb" => (None, bytes(&[0xAC])),
        "lodsw" => (Some(0x66), bytes(&[0xAD])),
        "lodsd" => (None, bytes(&[0xAD])),
        "scasb" => (None, bytes(&[0xAE])),
        "scasw" => (Some(0x66), bytes(&[0xAF])),
        "scasd" => (None, bytes(&[0xAF])),
        _ => {
            return Err(TranslationError::UnknownMnemonic {
                reason: mnemonic.to_string(),
            });
        }
    };

    Ok((prefix, opcode))
}

/// Splits a leading `rep`/`repe`/`repne` prefix word off a mnemonic,
/// returning the prefix byte and the remaining (string-primitive) mnemonic.
pub fn split_rep_prefix(mnemonic: &str) -> (Option<u8>, &str) {
    if let Some(rest) = mnemonic.strip_prefix("repne ") {
        return (Some(0xF2), rest);
    }
    if let Some(rest) = mnemonic.strip_prefix("repnz ") {
        return (Some(0xF2), rest);
    }
    if let Some(rest) = mnemonic.strip_prefix("repe ") {
        return (Some(0xF3), rest);
    }
    if let Some(rest) = mnemonic.strip_prefix("repz ") {
        return (Some(0xF3), rest);
    }
    if let Some(rest) = mnemonic.strip_prefix("rep ") {
        return (Some(0xF3), rest);
    }
    (None, mnemonic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nop_encodes_single_byte() {
        let (prefix, bytes) = encode_zero_op("nop").unwrap();
        assert_eq!(prefix, None);
        assert_eq!(bytes, vec![0x90]);
    }

    #[test]
    fn word_string_op_needs_operand_size_prefix() {
        let (prefix, bytes) = encode_zero_op("movsw").unwrap();
        assert_eq!(prefix, Some(0x66));
        assert_eq!(bytes, vec![0xA5]);
    }

    #[test]
    fn rep_prefix_splits() {
        assert_eq!(split_rep_prefix("rep movsb"), (Some(0xF3), "movsb"));
        assert_eq!(split_rep_prefix("repne cmpsb"), (Some(0xF2), "cmpsb"));
        assert_eq!(split_rep_prefix("movsb"), (None, "movsb"));
    }
}
