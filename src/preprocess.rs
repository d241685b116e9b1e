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

/// The fixed prolog sequence installed ahead of a routine translated with
/// `with_prolog`: saves `eax` and the caller's flags, establishes the
/// `ebp` frame, then saves the callee-saved registers. `asmret`'s
/// expansion mirrors this exactly in reverse.
pub const PROLOG_EXPANSION: &[&str] = &[
    "push eax",
    "pushf",
    "push ebp",
    "mov ebp, esp",
    "push ebx",
    "push esi",
    "push edi",
];

/// The fixed epilog sequence that `asmret` expands to — the mirror image
/// of `PROLOG_EXPANSION`.
pub const ASMRET_EXPANSION: &[&str] = &[
    "pop edi",
    "pop esi",
    "pop ebx",
    "mov esp, ebp",
    "pop ebp",
    "popf",
    "pop eax",
    "ret",
];

/// Strips a trailing `; comment`, honouring double-quoted spans so a `;`
/// inside a string literal is not treated as a comment marker.
fn strip_comment(line: &str) -> &str {
    let mut in_quotes = false;
    for (i, ch) in line.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => return &line[..i],
            _ => {}
        }
    }
    line
}

/// Lowercases everything outside double-quoted spans, and leaves the whole
/// line untouched if it is an `extern ... lib ...` declaration (the
/// external symbol name must keep its original case).
fn fold_case(line: &str) -> String {
    if line.contains(" lib ") || line.trim_start().starts_with("extern ") {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len());
    let mut in_quotes = false;
    for ch in line.chars() {
        if ch == '"' {
            in_quotes = !in_quotes;
            out.push(ch);
        } else if in_quotes {
            out.push(ch);
        } else {
            out.push(ch.to_ascii_lowercase());
        }
    }
    out
}

fn collapse_spaces(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut last_was_space = false;
    for ch in line.chars() {
        if ch == ' ' {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    out
}

/// Normalizes a single raw source line: quote folding, case folding,
/// comment stripping, whitespace collapsing and trimming. Returns `None`
/// for lines that normalize to nothing (to be dropped by the caller).
pub fn normalize_line(raw: &str) -> Option<String> {
    let quoted = raw.replace('\'', "\"");
    let commentless = strip_comment(&quoted);
    let folded = fold_case(commentless);
    let collapsed = collapse_spaces(&folded);
    let trimmed = collapsed.trim().to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// A constant declaration: `name equ value`.
pub struct ConstantDecl {
    pub name: String,
    pub replacement: String,
}

/// Recognizes an `equ` declaration line.
pub fn parse_equ(line: &str) -> Option<ConstantDecl> {
    let lower = line;
    let idx = lower.find(" equ ")?;
    let name = lower[..idx].trim().to_string();
    let replacement = lower[idx + " equ ".len()..].trim().to_string();
    Some(ConstantDecl { name, replacement })
}

/// Runs normalization over the whole source, expanding `asmret` lines and
/// dropping blanks, but leaves `equ` lines in place for the caller to
/// install into the constant table (installation needs access to the
/// shared constant map, which lives one layer up in the expander).
pub fn preprocess_source(source: &str) -> Result<Vec<String>, TranslationError> {
    let mut out = Vec::new();
    for raw in source.lines() {
        let Some(line) = normalize_line(raw) else {
            continue;
        };
        if line == "asmret" {
            out.extend(ASMRET_EXPANSION.iter().map(|s| s.to_string()));
        } else {
            out.push(line);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_comments_outside_strings() {
        assert_eq!(strip_comment("mov eax, 1 ; load one").trim(), "mov eax, 1 ");
        assert_eq!(strip_comment("foo db \"a;b\", 0"), "foo db \"a;b\", 0");
    }

    #[test]
    fn folds_case_preserves_strings_and_extern() {
        assert_eq!(fold_case("MOV EAX, EBX"), "mov eax, ebx");
        assert_eq!(fold_case("foo db \"HELLO\""), "foo db \"HELLO\"");
        assert_eq!(
            fold_case("extern ExitProcess lib KERNEL32.DLL"),
            "extern ExitProcess lib KERNEL32.DLL"
        );
    }

    #[test]
    fn normalizes_and_drops_blanks() {
        assert_eq!(normalize_line("   ; just a comment"), None);
        assert_eq!(
            normalize_line("  MOV   EAX,  EBX  ; move").as_deref(),
            Some("mov eax, ebx")
        );
    }

    #[test]
    fn expands_asmret() {
        let lines = preprocess_source("nop\nasmret\n").unwrap();
        assert_eq!(lines[0], "nop");
        assert_eq!(&lines[1..], ASMRET_EXPANSION);
    }

    #[test]
    fn parses_equ() {
        let decl = parse_equ("foo equ eax").unwrap();
        assert_eq!(decl.name, "foo");
        assert_eq!(decl.replacement, "eax");
    }
}
