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

/// Recognizes and parses a signed integer literal of the form accepted by
/// the dialect: an optional leading sign, then either a hex literal ending
/// in `h` (first digit `0-9`), or a string of `0-9`/`b`/`d` digits whose
/// trailing letter selects base 2 or base 10 (absence of a letter means
/// decimal).
pub fn parse_numeric_literal(text: &str) -> Option<i64> {
    let (sign, rest) = match text.as_bytes().first() {
        Some(b'+') => (1i64, &text[1..]),
        Some(b'-') => (-1i64, &text[1..]),
        _ => (1i64, text),
    };

    if rest.is_empty() {
        return None;
    }

    if is_hex_literal(rest) {
        let digits = &rest[..rest.len() - 1];
        let value = i64::from_str_radix(digits, 16).ok()?;
        return Some(sign * value);
    }

    if is_digit_string(rest) {
        let lower = rest.to_ascii_lowercase();
        let last = lower.as_bytes()[lower.len() - 1];
        return match last {
            b'b' => {
                let digits = &lower[..lower.len() - 1];
                i64::from_str_radix(digits, 2).ok().map(|v| sign * v)
            }
            b'd' => {
                let digits = &lower[..lower.len() - 1];
                digits.parse::<i64>().ok().map(|v| sign * v)
            }
            _ => lower.parse::<i64>().ok().map(|v| sign * v),
        };
    }

    None
}

fn is_hex_literal(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() < 2 {
        return false;
    }
    let last = bytes[bytes.len() - 1];
    if !last.eq_ignore_ascii_case(&b'h') {
        return false;
    }
    let digits = &s[..s.len() - 1];
    if digits.is_empty() {
        return false;
    }
    if !digits.as_bytes()[0].is_ascii_digit() {
        return false;
    }
    digits.chars().all(|c| c.is_ascii_hexdigit())
}

fn is_digit_string(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_digit() || c == 'b' || c == 'd' || c == 'B' || c == 'D')
        && s.chars().next().unwrap().is_ascii_digit()
}

/// Folds a bracket-expression body by splitting on top-level `+`/`-` and
/// summing the recognized numeric terms, leaving unrecognized terms
/// concatenated (with their separating sign) ahead of the folded sum.
///
/// Returns `(unrecognized_prefix, signed_sum)`.
pub fn fold_signed_terms(body: &str) -> (String, i64) {
    let mut terms: Vec<(i64, String)> = Vec::new();
    let mut current = String::new();
    let mut current_sign = 1i64;
    let mut pending_sign = 1i64;

    for ch in body.chars() {
        if (ch == '+' || ch == '-') && !current.is_empty() {
            terms.push((current_sign, std::mem::take(&mut current)));
            pending_sign = if ch == '-' { -1 } else { 1 };
            current_sign = pending_sign;
            continue;
        }
        if (ch == '+' || ch == '-') && current.is_empty() {
            pending_sign *= if ch == '-' { -1 } else { 1 };
            current_sign = pending_sign;
            continue;
        }
        current.push(ch);
    }
    if !current.is_empty() {
        terms.push((current_sign, current));
    }

    let mut sum: i64 = 0;
    let mut unrecognized = String::new();
    for (sign, term) in terms {
        let trimmed = term.trim();
        if let Some(value) = parse_numeric_literal(trimmed) {
            sum += sign * value;
        } else {
            if !unrecognized.is_empty() {
                unrecognized.push(if sign < 0 { '-' } else { '+' });
            } else if sign < 0 {
                unrecognized.push('-');
            }
            unrecognized.push_str(trimmed);
        }
    }

    (unrecognized, sum)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal() {
        assert_eq!(parse_numeric_literal("5"), Some(5));
        assert_eq!(parse_numeric_literal("5d"), Some(5));
        assert_eq!(parse_numeric_literal("-5d"), Some(-5));
    }

    #[test]
    fn parses_hex() {
        assert_eq!(parse_numeric_literal("10h"), Some(16));
        assert_eq!(parse_numeric_literal("0FFh"), Some(255));
        assert_eq!(parse_numeric_literal("+10h"), Some(16));
    }

    #[test]
    fn parses_binary() {
        assert_eq!(parse_numeric_literal("101b"), Some(5));
    }

    #[test]
    fn rejects_non_literal() {
        assert_eq!(parse_numeric_literal("eax"), None);
        assert_eq!(parse_numeric_literal("foo"), None);
    }

    #[test]
    fn folds_simple_sum() {
        let (rest, sum) = fold_signed_terms("10h+4");
        assert_eq!(rest, "");
        assert_eq!(sum, 20);
    }

    #[test]
    fn folds_with_unrecognized_term() {
        let (rest, sum) = fold_signed_terms("ebx+ecx*4+10h");
        assert_eq!(sum, 16);
        assert_eq!(rest, "ebx+ecx*4");
    }
}
