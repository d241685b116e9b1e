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

use std::collections::VecDeque;

use crate::ast::{InstructionRecord, Label, TranslationState, Width};
use crate::encoder;
use crate::errors::TranslationError;
use crate::numeric::parse_numeric_literal;
use crate::operand::parse_operand;
use crate::preprocess;
use crate::resolver::LibraryResolver;

struct ProcFrame {
    names_to_remove: Vec<String>,
    locals_shift: i64,
    sub_esp_emitted: bool,
}

/// Runs the fused structural-expansion / label / operand / encoding walk
/// described as a single forward pass: each primitive instruction is
/// encoded as soon as it is produced, using the constant/removed-constant
/// tables' state at that point, so procedure-scoped shadowing is visible
/// only inside its own procedure body.
pub fn expand_and_encode(
    lines: Vec<String>,
    resolver: &dyn LibraryResolver,
) -> Result<TranslationState, TranslationError> {
    let mut state = TranslationState::default();
    let mut proc_stack: Vec<ProcFrame> = Vec::new();
    let mut running_offset: i64 = 0;
    let mut pending_label: Option<String> = None;
    let mut queue: VecDeque<String> = lines.into_iter().collect();

    while let Some(line) = queue.pop_front() {
        let label_for_this_line = pending_label.take();

        if let Some((name, library)) = parse_extern(&line)? {
            // The declaration line alone keeps the symbol's original case
            // (needed to resolve it against the real library); every other
            // line has already been folded to lowercase by normalization,
            // so the translator-local alias is keyed by lowercase too.
            let key = name.to_ascii_lowercase();
            if state.externs.contains_key(&key) {
                return Err(TranslationError::DuplicateExtern {
                    name: name.clone(),
                    reason: line.clone(),
                });
            }
            let address = resolver.resolve(&library, &name).ok_or_else(|| {
                TranslationError::BadExternSyntax {
                    reason: format!("could not resolve {name} in {library}"),
                }
            })?;
            state.externs.insert(key, address);
            continue;
        }

        if let Some(decl) = preprocess::parse_equ(&line) {
            if state.constants.contains_key(&decl.name) {
                return Err(TranslationError::DuplicateConstant {
                    name: decl.name,
                    reason: line.clone(),
                });
            }
            state.constants.insert(decl.name, decl.replacement);
            continue;
        }

        if let Some(name) = line.strip_suffix(':') {
            validate_label_name(name, &line)?;
            if state.labels.contains_key(name) {
                return Err(TranslationError::DuplicateLabel {
                    name: name.to_string(),
                    reason: line.clone(),
                });
            }
            state.labels.insert(
                name.to_string(),
                Label {
                    name: name.to_string(),
                    instruction_index: state.instructions.len(),
                    // Known immediately: every label precedes the instruction
                    // it names, so its offset is exactly the running offset
                    // reached so far in this same forward walk.
                    byte_offset: running_offset,
                },
            );
            pending_label = Some(name.to_string());
            continue;
        }

        if let Some(rest) = line.strip_prefix("proc ") {
            handle_proc(rest, &mut state, &mut proc_stack, &mut running_offset)?;
            continue;
        }

        if let Some(rest) = line.strip_prefix("local ") {
            handle_local(rest, &mut state, &mut proc_stack, &line)?;
            continue;
        }

        if line == "endp" {
            handle_endp(&mut state, &mut proc_stack, &mut running_offset, &line)?;
            continue;
        }

        ensure_sub_esp(&mut state, &mut proc_stack, &mut running_offset)?;

        if let Some((reg_text, operand_text)) = parse_mov_addr(&line) {
            expand_mov_addr(reg_text, operand_text, &mut state, &mut running_offset)?;
            continue;
        }

        if let Some(operand_text) = line.strip_prefix("push addr ") {
            expand_push_addr(operand_text, &mut state, &mut running_offset)?;
            continue;
        }

        if let Some(rest) = line.strip_prefix("invoke ") {
            expand_invoke(rest, &mut state, &mut running_offset)?;
            continue;
        }

        let first_word = line.split_whitespace().next().unwrap_or("");
        if !proc_stack.is_empty() && matches!(first_word, "ret" | "retn" | "retf") {
            encode_plain_instruction("mov esp, ebp", &mut state, &mut running_offset)?;
            encode_plain_instruction("pop ebp", &mut state, &mut running_offset)?;
            encode_plain_instruction(&line, &mut state, &mut running_offset)?;
            continue;
        }

        if first_word == "call" {
            let target = line["call".len()..].trim();
            emit_call(target, &mut state, &mut running_offset)?;
            continue;
        }

        if let Some((name, width, list)) = parse_data_decl(&line) {
            let var_name = name.or(label_for_this_line);
            if let Some(ref n) = var_name {
                if !state.labels.contains_key(n) {
                    validate_label_name(n, &line)?;
                    state.labels.insert(
                        n.clone(),
                        Label {
                            name: n.clone(),
                            instruction_index: state.instructions.len(),
                            byte_offset: running_offset,
                        },
                    );
                }
                state.variable_labels.push(n.clone());
            }
            let values = parse_data_elements(width, &list, &line)?;
            for value in values {
                append_store(&mut state, width, value, &mut running_offset, &line)?;
            }
            continue;
        }

        encode_plain_instruction(&line, &mut state, &mut running_offset)?;
    }

    Ok(state)
}

fn ensure_sub_esp(
    state: &mut TranslationState,
    proc_stack: &mut [ProcFrame],
    running_offset: &mut i64,
) -> Result<(), TranslationError> {
    if let Some(frame) = proc_stack.last_mut() {
        if !frame.sub_esp_emitted {
            frame.sub_esp_emitted = true;
            if frame.locals_shift > 0 {
                let shift = frame.locals_shift;
                encode_plain_instruction(&format!("sub esp, {shift}"), state, running_offset)?;
            }
        }
    }
    Ok(())
}

fn encode_plain_instruction(
    line: &str,
    state: &mut TranslationState,
    running_offset: &mut i64,
) -> Result<(), TranslationError> {
    let has_rep_prefix = ["rep ", "repe ", "repne ", "repz ", "repnz "]
        .iter()
        .any(|p| line.starts_with(p));

    let (mnemonic, operand_text) = if has_rep_prefix {
        (line.to_string(), "")
    } else {
        match line.split_once(' ') {
            Some((m, rest)) => (m.to_string(), rest.trim()),
            None => (line.to_string(), ""),
        }
    };

    let operand_strings = split_top_level_commas(operand_text);
    let mut operands = Vec::new();
    for text in &operand_strings {
        operands.push(parse_operand(
            text,
            &state.constants,
            &state.removed_constants,
            &state.externs,
        )?);
    }

    let labels = &state.labels;
    let known_label = |name: &str| -> Option<i64> {
        labels
            .get(name)
            .map(|l| l.byte_offset)
            .filter(|&offset| offset != Label::UNRESOLVED)
    };

    let encoded = encoder::encode_instruction(&mnemonic, &operands, *running_offset, &known_label, line)?;

    let record = InstructionRecord {
        mnemonic,
        prefixes: encoded.prefixes,
        bytecode: encoded.bytecode,
        byte_offset: *running_offset as usize,
        fixups: encoded.fixups,
        store_width: encoded.store_width,
    };
    *running_offset += record.total_len() as i64;
    state.instructions.push(record);
    Ok(())
}

fn append_store(
    state: &mut TranslationState,
    width: Width,
    value: i64,
    running_offset: &mut i64,
    context: &str,
) -> Result<(), TranslationError> {
    let mnemonic = match width {
        Width::Byte => "storeb",
        Width::Word => "storew",
        Width::Dword => "stored",
    };
    encode_plain_instruction(&format!("{mnemonic} {value}"), state, running_offset).map_err(|e| {
        if matches!(e, TranslationError::BadImmediate { .. }) {
            TranslationError::BadImmediate {
                reason: context.to_string(),
            }
        } else {
            e
        }
    })
}

fn emit_call(
    target: &str,
    state: &mut TranslationState,
    running_offset: &mut i64,
) -> Result<(), TranslationError> {
    if state.externs.contains_key(target) {
        // An extern's address is a plain constant, not a relative target a
        // `call rel32` fixup could reach, so it's loaded and called indirectly.
        encode_plain_instruction(&format!("mov ecx, {target}"), state, running_offset)?;
        encode_plain_instruction("call ecx", state, running_offset)?;
    } else {
        encode_plain_instruction(&format!("call {target}"), state, running_offset)?;
    }
    Ok(())
}

fn expand_invoke(
    rest: &str,
    state: &mut TranslationState,
    running_offset: &mut i64,
) -> Result<(), TranslationError> {
    let parts = split_top_level_commas(rest);
    if parts.is_empty() {
        return Err(TranslationError::BadOperandCombination {
            reason: format!("invoke {rest}"),
        });
    }
    let callee = parts[0].trim().to_string();
    for arg in parts[1..].iter().rev() {
        encode_plain_instruction(&format!("push {}", arg.trim()), state, running_offset)?;
    }
    emit_call(&callee, state, running_offset)
}

fn expand_push_addr(
    operand_text: &str,
    state: &mut TranslationState,
    running_offset: &mut i64,
) -> Result<(), TranslationError> {
    let operand_text = operand_text.trim();
    encode_plain_instruction("push ecx", state, running_offset)?;
    if operand_text.contains('[') {
        encode_plain_instruction(&format!("lea ecx, {operand_text}"), state, running_offset)?;
    } else {
        encode_plain_instruction(&format!("mov ecx, {operand_text}"), state, running_offset)?;
        encode_plain_instruction("add ecx, $this", state, running_offset)?;
    }
    encode_plain_instruction("xchg [esp], ecx", state, running_offset)
}

fn parse_mov_addr(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix("mov ")?;
    let marker = ", addr ";
    let idx = rest.find(marker)?;
    let reg_text = &rest[..idx];
    let operand_text = &rest[idx + marker.len()..];
    Some((reg_text, operand_text))
}

fn expand_mov_addr(
    reg_text: &str,
    operand_text: &str,
    state: &mut TranslationState,
    running_offset: &mut i64,
) -> Result<(), TranslationError> {
    let operand_text = operand_text.trim();
    if operand_text.contains('[') {
        encode_plain_instruction(&format!("lea {reg_text}, {operand_text}"), state, running_offset)
    } else if state.externs.contains_key(operand_text) {
        encode_plain_instruction(&format!("mov {reg_text}, {operand_text}"), state, running_offset)
    } else {
        encode_plain_instruction(&format!("mov {reg_text}, {operand_text}"), state, running_offset)?;
        encode_plain_instruction(&format!("add {reg_text}, $this"), state, running_offset)
    }
}

fn handle_proc(
    rest: &str,
    state: &mut TranslationState,
    proc_stack: &mut Vec<ProcFrame>,
    running_offset: &mut i64,
) -> Result<(), TranslationError> {
    let rest = rest.trim();
    let (name, args_text) = match rest.split_once(' ') {
        Some((n, a)) => (n.trim(), a.trim()),
        None => (rest, ""),
    };

    if state.labels.contains_key(name) {
        return Err(TranslationError::DuplicateLabel {
            name: name.to_string(),
            reason: format!("proc {rest}"),
        });
    }
    state.labels.insert(
        name.to_string(),
        Label {
            name: name.to_string(),
            instruction_index: state.instructions.len(),
            byte_offset: *running_offset,
        },
    );

    let mut names_to_remove = Vec::new();
    let mut offset: i64 = 8;
    if !args_text.is_empty() {
        for token in split_top_level_commas(args_text) {
            let (argname, sizeword) = token
                .split_once(':')
                .ok_or_else(|| TranslationError::BadLocalSyntax {
                    reason: token.clone(),
                })?;
            let (argname, sizeword) = (argname.trim(), sizeword.trim());
            let size = match sizeword {
                "dword" => 4,
                "word" => 2,
                _ => {
                    return Err(TranslationError::BadLocalSyntax {
                        reason: token.clone(),
                    });
                }
            };
            state
                .constants
                .insert(argname.to_string(), format!("[ebp+{offset}]"));
            names_to_remove.push(argname.to_string());
            offset += size;
        }
    }

    proc_stack.push(ProcFrame {
        names_to_remove,
        locals_shift: 0,
        sub_esp_emitted: false,
    });

    encode_plain_instruction("push ebp", state, running_offset)?;
    encode_plain_instruction("mov ebp, esp", state, running_offset)
}

fn handle_local(
    rest: &str,
    state: &mut TranslationState,
    proc_stack: &mut [ProcFrame],
    context: &str,
) -> Result<(), TranslationError> {
    let frame = proc_stack
        .last_mut()
        .ok_or_else(|| TranslationError::BadLocalSyntax {
            reason: context.to_string(),
        })?;
    for token in split_top_level_commas(rest) {
        let (varname, sizeword) = token
            .split_once(':')
            .ok_or_else(|| TranslationError::BadLocalSyntax {
                reason: token.clone(),
            })?;
        let (varname, sizeword) = (varname.trim(), sizeword.trim());
        let size = match sizeword {
            "dword" => 4,
            "word" => 2,
            _ => {
                return Err(TranslationError::BadLocalSyntax {
                    reason: token.clone(),
                });
            }
        };
        frame.locals_shift += size;
        state
            .constants
            .insert(varname.to_string(), format!("[ebp-{}]", frame.locals_shift));
        frame.names_to_remove.push(varname.to_string());
    }
    Ok(())
}

fn handle_endp(
    state: &mut TranslationState,
    proc_stack: &mut Vec<ProcFrame>,
    running_offset: &mut i64,
    context: &str,
) -> Result<(), TranslationError> {
    ensure_sub_esp(state, proc_stack, running_offset)?;
    let frame = proc_stack
        .pop()
        .ok_or_else(|| TranslationError::BadLocalSyntax {
            reason: context.to_string(),
        })?;
    for name in frame.names_to_remove {
        state.constants.remove(&name);
        state.removed_constants.insert(name);
    }
    Ok(())
}

fn parse_extern(line: &str) -> Result<Option<(String, String)>, TranslationError> {
    if !line.starts_with("extern ") {
        return Ok(None);
    }
    let rest = &line["extern ".len()..];
    let idx = rest.find(" lib ").ok_or_else(|| TranslationError::BadExternSyntax {
        reason: line.to_string(),
    })?;
    let name = rest[..idx].trim().to_string();
    let library = rest[idx + " lib ".len()..].trim().to_string();
    if name.is_empty() || library.is_empty() {
        return Err(TranslationError::BadExternSyntax {
            reason: line.to_string(),
        });
    }
    Ok(Some((name, library)))
}

fn validate_label_name(name: &str, context: &str) -> Result<(), TranslationError> {
    let invalid = name.contains('[')
        || name.contains(']')
        || parse_numeric_literal(name).is_some()
        || crate::ast::Reg8::from_name(name).is_some()
        || crate::ast::RegWide::from_name(name).is_some();
    if invalid {
        return Err(TranslationError::BadOperandCombination {
            reason: context.to_string(),
        });
    }
    Ok(())
}

fn parse_data_decl(line: &str) -> Option<(Option<String>, Width, String)> {
    let mut tokens = line.splitn(2, ' ');
    let first = tokens.next()?;
    let remainder = tokens.next().unwrap_or("").to_string();

    if let Some(width) = width_of(first) {
        return Some((None, width, remainder));
    }

    let mut rest_tokens = remainder.splitn(2, ' ');
    let second = rest_tokens.next()?;
    if let Some(width) = width_of(second) {
        let list = rest_tokens.next().unwrap_or("").to_string();
        return Some((Some(first.to_string()), width, list));
    }

    None
}

fn width_of(token: &str) -> Option<Width> {
    match token {
        "db" => Some(Width::Byte),
        "dw" => Some(Width::Word),
        "dd" => Some(Width::Dword),
        _ => None,
    }
}

fn parse_data_elements(width: Width, list: &str, context: &str) -> Result<Vec<i64>, TranslationError> {
    let mut values = Vec::new();
    for term in split_top_level_commas(list) {
        let term = term.trim();
        if let Some(stripped) = term.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
            if width == Width::Dword {
                return Err(TranslationError::BadOperandCombination {
                    reason: context.to_string(),
                });
            }
            for ch in stripped.chars() {
                values.push(ch as i64);
            }
            continue;
        }

        if let Some(dup_idx) = term.to_ascii_lowercase().find(" dup(").or_else(|| term.to_ascii_lowercase().find(" dup (")) {
            let count_text = term[..dup_idx].trim();
            let count = parse_numeric_literal(count_text).ok_or_else(|| TranslationError::BadOperandCombination {
                reason: context.to_string(),
            })?;
            let open = term[dup_idx..].find('(').unwrap() + dup_idx;
            let inner = term[open + 1..term.len() - 1].to_string();
            let repeated = parse_data_elements(width, &inner, context)?;
            for _ in 0..count {
                values.extend_from_slice(&repeated);
            }
            continue;
        }

        let value = parse_numeric_literal(term).ok_or_else(|| TranslationError::BadOperandCombination {
            reason: context.to_string(),
        })?;
        values.push(value);
    }
    Ok(values)
}

/// Splits on top-level commas, ignoring commas nested inside `[...]`,
/// `(...)`, or `"..."`.
fn split_top_level_commas(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut depth_brackets = 0i32;
    let mut depth_parens = 0i32;
    let mut in_quotes = false;

    for ch in s.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            '[' if !in_quotes => {
                depth_brackets += 1;
                current.push(ch);
            }
            ']' if !in_quotes => {
                depth_brackets -= 1;
                current.push(ch);
            }
            '(' if !in_quotes => {
                depth_parens += 1;
                current.push(ch);
            }
            ')' if !in_quotes => {
                depth_parens -= 1;
                current.push(ch);
            }
            ',' if !in_quotes && depth_brackets == 0 && depth_parens == 0 => {
                out.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() || !out.is_empty() {
        out.push(current);
    }
    out.into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::MockResolver;

    #[test]
    fn encodes_simple_instructions() {
        let lines = vec!["nop".to_string(), "mov eax, ebx".to_string()];
        let resolver = MockResolver::new();
        let state = expand_and_encode(lines, &resolver).unwrap();
        assert_eq!(state.instructions.len(), 2);
        assert_eq!(state.instructions[0].bytecode, vec![0x90]);
        assert_eq!(state.instructions[1].bytecode, vec![0x89, 0xD8]);
    }

    #[test]
    fn backward_label_and_jump() {
        let lines = vec!["l:".to_string(), "jmp l".to_string()];
        let resolver = MockResolver::new();
        let state = expand_and_encode(lines, &resolver).unwrap();
        assert_eq!(state.instructions.len(), 1);
        assert_eq!(state.instructions[0].bytecode[0], 0xEB);
    }

    #[test]
    fn data_declaration_with_implicit_label() {
        let lines = vec!["foo db \"AB\", 0".to_string()];
        let resolver = MockResolver::new();
        let state = expand_and_encode(lines, &resolver).unwrap();
        assert_eq!(state.instructions.len(), 3);
        assert_eq!(state.variable_labels, vec!["foo".to_string()]);
        assert_eq!(state.labels["foo"].instruction_index, 0);
    }

    #[test]
    fn proc_with_args_and_locals() {
        let lines = vec![
            "proc myproc a:dword, b:word".to_string(),
            "local tmp:dword".to_string(),
            "mov eax, a".to_string(),
            "ret".to_string(),
            "endp".to_string(),
        ];
        let resolver = MockResolver::new();
        let state = expand_and_encode(lines, &resolver).unwrap();
        // push ebp, mov ebp esp, sub esp 4, mov eax [ebp+8], mov esp ebp, pop ebp, ret
        assert_eq!(state.instructions.len(), 7);
        assert!(state.removed_constants.contains("a"));
        assert!(state.removed_constants.contains("tmp"));
    }

    #[test]
    fn extern_resolution() {
        let lines = vec!["extern ExitProcess lib kernel32".to_string()];
        let resolver = MockResolver::new().with_symbol("kernel32", "ExitProcess", 0x1000);
        let state = expand_and_encode(lines, &resolver).unwrap();
        assert_eq!(state.externs["exitprocess"], 0x1000);
    }

    #[test]
    fn dd_of_string_is_rejected() {
        let lines = vec!["foo dd \"AB\"".to_string()];
        let resolver = MockResolver::new();
        let err = expand_and_encode(lines, &resolver).unwrap_err();
        assert!(matches!(err, TranslationError::BadOperandCombination { .. }));
    }

    #[test]
    fn split_commas_respects_brackets() {
        let parts = split_top_level_commas("eax, [ebx+ecx*4+10h]");
        assert_eq!(parts, vec!["eax".to_string(), "[ebx+ecx*4+10h]".to_string()]);
    }
}
