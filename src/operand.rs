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

use std::collections::{HashMap, HashSet};

use crate::ast::{MemOperand, Operand, RegWide, Scale};
use crate::errors::TranslationError;
use crate::numeric::{fold_signed_terms, parse_numeric_literal};

/// Parses a single textual operand, honouring the constant table and the
/// set of constants that have gone out of scope (a use of one of those is
/// a `ShadowedConstant` error rather than a plain "unknown symbol").
pub fn parse_operand(
    text: &str,
    constants: &HashMap<String, String>,
    removed_constants: &HashSet<String>,
    externs: &HashMap<String, i64>,
) -> Result<Operand, TranslationError> {
    let mut operand = text.trim().to_string();
    let mut size_hint: Option<bool> = None; // Some(true) = 16-bit hint

    if let Some(rest) = operand.strip_prefix("byte ") {
        size_hint = Some(false);
        operand = rest.trim().to_string();
    } else if let Some(rest) = operand.strip_prefix("word ") {
        size_hint = Some(true);
        operand = rest.trim().to_string();
    }

    operand = operand.replace(' ', "");

    for removed in removed_constants {
        if contains_identifier(&operand, removed) {
            return Err(TranslationError::ShadowedConstant {
                name: removed.clone(),
                reason: text.to_string(),
            });
        }
    }

    operand = substitute_constants(&operand, constants);

    if let Some(reg) = crate::ast::Reg8::from_name(&operand) {
        return Ok(Operand::Reg8(reg));
    }
    if let Some((reg, is16)) = RegWide::from_name(&operand) {
        return Ok(Operand::Reg16_32 { reg, is16 });
    }

    if !operand.contains('[') {
        if let Some(value) = parse_numeric_literal(&operand) {
            return Ok(Operand::Const(value as i32));
        }
        if let Some(addr) = externs.get(&operand) {
            return Ok(Operand::Const(*addr as i32));
        }
        return Ok(Operand::Symbolic(operand));
    }

    let inner = operand
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string();
    let mem = parse_address_body(&inner, text)?;

    Ok(match size_hint {
        Some(false) => Operand::Address8(mem),
        _ => Operand::Address16_32 {
            mem,
            is16: size_hint == Some(true),
        },
    })
}

fn contains_identifier(haystack: &str, needle: &str) -> bool {
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(needle) {
        let abs = start + pos;
        let before_ok = abs == 0 || !is_ident_char(haystack.as_bytes()[abs - 1]);
        let after = abs + needle.len();
        let after_ok = after >= haystack.len() || !is_ident_char(haystack.as_bytes()[after]);
        if before_ok && after_ok {
            return true;
        }
        start = abs + needle.len().max(1);
    }
    false
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

fn substitute_constants(text: &str, constants: &HashMap<String, String>) -> String {
    let mut result = text.to_string();
    for (name, replacement) in constants {
        if contains_identifier(&result, name) {
            result = replace_identifier(&result, name, replacement);
        }
    }
    result
}

fn replace_identifier(haystack: &str, needle: &str, replacement: &str) -> String {
    let mut out = String::new();
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(needle) {
        let abs = start + pos;
        let before_ok = abs == 0 || !is_ident_char(haystack.as_bytes()[abs - 1]);
        let after = abs + needle.len();
        let after_ok = after >= haystack.len() || !is_ident_char(haystack.as_bytes()[after]);
        out.push_str(&haystack[start..abs]);
        if before_ok && after_ok {
            out.push_str(replacement);
        } else {
            out.push_str(needle);
        }
        start = abs + needle.len();
    }
    out.push_str(&haystack[start..]);
    out
}

/// Parses the inside of an address's brackets into base/index/disp. Numeric
/// sub-terms are folded into a single running displacement before the
/// top-level term count is checked, so e.g. `ebx+ecx*4+4+6` (four raw terms)
/// folds to three (`ebx`, `ecx*4`, and a summed displacement of `10`) before
/// the three-term limit is enforced.
fn parse_address_body(inner: &str, context: &str) -> Result<MemOperand, TranslationError> {
    let (unrecognized, literal_sum) = fold_signed_terms(inner);
    let terms = split_top_level(&unrecognized);
    if terms.len() > 3 {
        return Err(TranslationError::BadAddress {
            reason: context.to_string(),
        });
    }

    let mut base: Option<RegWide> = None;
    let mut index: Option<(RegWide, Scale)> = None;
    let mut disp: i64 = literal_sum;

    for (sign, term) in terms {
        let term = term.trim();
        if term.is_empty() {
            continue;
        }
        if let Some(star) = term.find('*') {
            if sign < 0 {
                return Err(TranslationError::BadAddress {
                    reason: context.to_string(),
                });
            }
            let reg_part = term[..star].trim();
            let scale_part = term[star + 1..].trim();
            let (reg, _) = RegWide::from_name(reg_part).ok_or_else(|| {
                TranslationError::BadAddress {
                    reason: context.to_string(),
                }
            })?;
            let scale_value = parse_numeric_literal(scale_part).ok_or_else(|| {
                TranslationError::BadAddress {
                    reason: context.to_string(),
                }
            })?;
            let scale = Scale::from_value(scale_value).ok_or_else(|| TranslationError::BadAddress {
                reason: context.to_string(),
            })?;
            if index.is_some() {
                return Err(TranslationError::BadAddress {
                    reason: context.to_string(),
                });
            }
            index = Some((reg, scale));
            continue;
        }

        if let Some((reg, _)) = RegWide::from_name(term) {
            if sign < 0 {
                return Err(TranslationError::BadAddress {
                    reason: context.to_string(),
                });
            }
            if base.is_none() {
                base = Some(reg);
            } else if index.is_none() {
                index = Some((reg, Scale::One));
            } else {
                return Err(TranslationError::BadAddress {
                    reason: context.to_string(),
                });
            }
            continue;
        }

        return Err(TranslationError::BadAddress {
            reason: context.to_string(),
        });
    }

    // esp can never be an index; swap base/index (scale forced to 1) when legal.
    if let Some((idx_reg, scale)) = index {
        if idx_reg == RegWide::Esp {
            if scale != Scale::One {
                return Err(TranslationError::BadAddress {
                    reason: context.to_string(),
                });
            }
            match base {
                Some(base_reg) if base_reg != RegWide::Esp => {
                    index = Some((base_reg, Scale::One));
                    base = Some(idx_reg);
                }
                _ => {
                    return Err(TranslationError::BadAddress {
                        reason: context.to_string(),
                    });
                }
            }
        }
    }

    // keep ebp out of the index-only field: if ebp ended up as index with
    // another register as base, swap them back.
    if let (Some(base_reg), Some((idx_reg, scale))) = (base, index) {
        if idx_reg == RegWide::Ebp && base_reg != RegWide::Ebp {
            index = Some((base_reg, scale));
            base = Some(idx_reg);
        }
    }

    Ok(MemOperand {
        base,
        index,
        disp: disp as i32,
    })
}

/// Splits on top-level `+`/`-`, returning each term with the sign that
/// precedes it (default +1 for the first term). Does not look inside `*`
/// expressions since those never contain `+`/`-` in this dialect.
fn split_top_level(s: &str) -> Vec<(i64, String)> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut sign = 1i64;
    for ch in s.chars() {
        if ch == '+' || ch == '-' {
            if !current.is_empty() {
                out.push((sign, std::mem::take(&mut current)));
            }
            sign = if ch == '-' { -1 } else { 1 };
            continue;
        }
        current.push(ch);
    }
    if !current.is_empty() {
        out.push((sign, current));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty() -> (
        HashMap<String, String>,
        HashSet<String>,
        HashMap<String, i64>,
    ) {
        (HashMap::new(), HashSet::new(), HashMap::new())
    }

    #[test]
    fn parses_registers() {
        let (c, r, e) = empty();
        assert_eq!(
            parse_operand("eax", &c, &r, &e).unwrap(),
            Operand::Reg16_32 {
                reg: RegWide::Eax,
                is16: false
            }
        );
        assert_eq!(
            parse_operand("al", &c, &r, &e).unwrap(),
            Operand::Reg8(crate::ast::Reg8::Al)
        );
    }

    #[test]
    fn parses_constant() {
        let (c, r, e) = empty();
        assert_eq!(parse_operand("5", &c, &r, &e).unwrap(), Operand::Const(5));
        assert_eq!(
            parse_operand("10h", &c, &r, &e).unwrap(),
            Operand::Const(16)
        );
    }

    #[test]
    fn parses_symbolic() {
        let (c, r, e) = empty();
        assert_eq!(
            parse_operand("mylabel", &c, &r, &e).unwrap(),
            Operand::Symbolic("mylabel".to_string())
        );
    }

    #[test]
    fn parses_complex_address() {
        let (c, r, e) = empty();
        let op = parse_operand("[ebx+ecx*4+10h]", &c, &r, &e).unwrap();
        match op {
            Operand::Address16_32 { mem, .. } => {
                assert_eq!(mem.base, Some(RegWide::Ebx));
                assert_eq!(mem.index, Some((RegWide::Ecx, Scale::Four)));
                assert_eq!(mem.disp, 0x10);
            }
            _ => panic!("expected address operand"),
        }
    }

    #[test]
    fn pure_displacement_address() {
        let (c, r, e) = empty();
        let op = parse_operand("[1234h]", &c, &r, &e).unwrap();
        match op {
            Operand::Address16_32 { mem, .. } => {
                assert_eq!(mem.base, None);
                assert_eq!(mem.index, None);
                assert_eq!(mem.disp, 0x1234);
            }
            _ => panic!("expected address operand"),
        }
    }

    #[test]
    fn folds_trailing_literals_before_counting_terms() {
        let (c, r, e) = empty();
        let op = parse_operand("[ebx+ecx*4+4+6]", &c, &r, &e).unwrap();
        match op {
            Operand::Address16_32 { mem, .. } => {
                assert_eq!(mem.base, Some(RegWide::Ebx));
                assert_eq!(mem.index, Some((RegWide::Ecx, Scale::Four)));
                assert_eq!(mem.disp, 10);
            }
            _ => panic!("expected address operand"),
        }
    }

    #[test]
    fn esp_as_index_is_swapped() {
        let (c, r, e) = empty();
        let op = parse_operand("[eax+esp]", &c, &r, &e).unwrap();
        match op {
            Operand::Address16_32 { mem, .. } => {
                assert_eq!(mem.base, Some(RegWide::Esp));
                assert_eq!(mem.index, Some((RegWide::Eax, Scale::One)));
            }
            _ => panic!("expected address operand"),
        }
    }

    #[test]
    fn shadowed_constant_rejected() {
        let (c, _, e) = empty();
        let mut removed = HashSet::new();
        removed.insert("arg1".to_string());
        let err = parse_operand("arg1", &c, &removed, &e).unwrap_err();
        assert!(matches!(err, TranslationError::ShadowedConstant { .. }));
    }

    #[test]
    fn constant_substitution() {
        let mut constants = HashMap::new();
        constants.insert("myconst".to_string(), "eax".to_string());
        let (_, r, e) = empty();
        let op = parse_operand("myconst", &constants, &r, &e).unwrap();
        assert_eq!(
            op,
            Operand::Reg16_32 {
                reg: RegWide::Eax,
                is16: false
            }
        );
    }
}
