//! Quote-aware scanning used to cut a statement into clauses before the
//! clause grammars in `parser` run.
//!
//! Keywords, separators and placeholders only count when they appear in
//! top-level code: outside quoted strings, backtick identifiers and
//! parentheses.

use crate::ast::Placeholder;

/// Paren depth for every byte of code, `None` for bytes inside quotes
fn code_mask(input: &str) -> Vec<Option<u32>> {
    let mut mask = Vec::with_capacity(input.len());
    let mut quote: Option<u8> = None;
    let mut escaped = false;
    let mut depth = 0u32;

    for b in input.bytes() {
        match quote {
            Some(q) => {
                mask.push(None);
                if escaped {
                    escaped = false;
                } else if b == b'\\' && q != b'`' {
                    escaped = true;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'\'' | b'"' | b'`' => {
                    quote = Some(b);
                    mask.push(None);
                }
                b'(' => {
                    mask.push(Some(depth));
                    depth += 1;
                }
                b')' => {
                    depth = depth.saturating_sub(1);
                    mask.push(Some(depth));
                }
                _ => mask.push(Some(depth)),
            },
        }
    }

    mask
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Find the first top-level occurrence of `keyword` (case-insensitive,
/// whole words, any run of whitespace between words). Returns the byte
/// range of the match.
pub(crate) fn find_keyword(input: &str, keyword: &str) -> Option<(usize, usize)> {
    let mask = code_mask(input);
    let bytes = input.as_bytes();
    let words: Vec<&[u8]> = keyword.split_whitespace().map(str::as_bytes).collect();
    if words.is_empty() {
        return None;
    }

    (0..bytes.len()).find_map(|start| {
        if mask[start] != Some(0) || (start > 0 && is_word_byte(bytes[start - 1])) {
            return None;
        }
        match_words(bytes, &mask, start, &words).map(|end| (start, end))
    })
}

fn match_words(bytes: &[u8], mask: &[Option<u32>], mut pos: usize, words: &[&[u8]]) -> Option<usize> {
    for (i, word) in words.iter().enumerate() {
        if i > 0 {
            let gap = pos;
            while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            if pos == gap {
                return None;
            }
        }
        let end = pos + word.len();
        if end > bytes.len() || !bytes[pos..end].eq_ignore_ascii_case(word) {
            return None;
        }
        if mask[pos..end].iter().any(|m| *m != Some(0)) {
            return None;
        }
        pos = end;
    }

    if pos < bytes.len() && is_word_byte(bytes[pos]) {
        return None;
    }
    Some(pos)
}

/// Split on a top-level separator byte, trimming each part
pub(crate) fn split_top_level(input: &str, sep: u8) -> Vec<&str> {
    let mask = code_mask(input);
    let mut parts = Vec::new();
    let mut start = 0;

    for (i, b) in input.bytes().enumerate() {
        if b == sep && mask[i] == Some(0) {
            parts.push(input[start..i].trim());
            start = i + 1;
        }
    }
    parts.push(input[start..].trim());
    parts
}

/// Split a WHERE body into its AND-combined terms
pub(crate) fn split_conjunction(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = input;

    while let Some((start, end)) = find_keyword(rest, "and") {
        parts.push(rest[..start].trim());
        rest = &rest[end..];
    }
    parts.push(rest.trim());
    parts.retain(|p| !p.is_empty());
    parts
}

/// Placeholders outside quotes, in text order. Parentheses do not hide
/// placeholders.
pub(crate) fn placeholders(input: &str) -> Vec<Placeholder> {
    let mask = code_mask(input);
    let bytes = input.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if mask[i].is_none() {
            i += 1;
            continue;
        }
        match bytes[i] {
            b'?' => {
                found.push(Placeholder::Positional);
                i += 1;
            }
            b':' if i == 0 || (!is_word_byte(bytes[i - 1]) && bytes[i - 1] != b':') => {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && is_word_byte(bytes[end]) {
                    end += 1;
                }
                let named = end > start && !bytes[start].is_ascii_digit();
                if named {
                    found.push(Placeholder::Named(input[start..end].to_string()));
                }
                i = end;
            }
            _ => i += 1,
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_keyword_skips_quotes() {
        let sql = "x = 'a where b' where y = 1";
        let (start, end) = find_keyword(sql, "where").unwrap();
        assert_eq!(&sql[start..end], "where");
        assert_eq!(start, 16);
    }

    #[test]
    fn test_find_keyword_multi_word() {
        let sql = "t (a) values (?) ON  DUPLICATE\nKEY update a = 1";
        let (start, _) = find_keyword(sql, "on duplicate key update").unwrap();
        assert_eq!(&sql[start..start + 2], "ON");
    }

    #[test]
    fn test_find_keyword_word_boundary() {
        assert!(find_keyword("brand = 1", "and").is_none());
        assert!(find_keyword("coordination = ?", "order").is_none());
    }

    #[test]
    fn test_split_top_level_ignores_nested() {
        let parts = split_top_level("a, count(b, c), 'x,y'", b',');
        assert_eq!(parts, vec!["a", "count(b, c)", "'x,y'"]);
    }

    #[test]
    fn test_split_conjunction() {
        let parts = split_conjunction("a = ? AND b = 'x and y' and c > 2");
        assert_eq!(parts, vec!["a = ?", "b = 'x and y'", "c > 2"]);
    }

    #[test]
    fn test_placeholders_in_order() {
        let found = placeholders("a = ? and b = :name and c = '?' and d::text = ?");
        assert_eq!(
            found,
            vec![
                Placeholder::Positional,
                Placeholder::Named("name".to_string()),
                Placeholder::Positional,
            ]
        );
    }
}
