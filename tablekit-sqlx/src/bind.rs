//! `@name` placeholders to positional `?` markers.
//!
//! Both MySQL and SQLite accept `?`. Placeholders inside string literals,
//! quoted identifiers and comments are left alone, as are `@@system`
//! variables and `@names` that no parameter provides (MySQL user variables).

use serde_json::Value;
use tablekit::Params;

/// SQL with positional markers and the values to bind, in marker order.
#[derive(Debug, Clone, PartialEq)]
pub struct Expanded {
    pub sql: String,
    pub values: Vec<Value>,
}

pub fn expand(sql: &str, params: &Params) -> Expanded {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut values = Vec::new();
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"' | b'`') => i = skip_quoted(bytes, i, quote),
            b'-' if bytes.get(i + 1) == Some(&b'-') => i = skip_line(bytes, i),
            b'#' => i = skip_line(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = sql[i + 2..].find("*/").map_or(bytes.len(), |n| i + 2 + n + 2);
            }
            b'@' if bytes.get(i + 1) == Some(&b'@') => {
                i = word_end(bytes, i + 2);
            }
            b'@' => {
                let end = word_end(bytes, i + 1);
                let name = &sql[i + 1..end];
                match params.get(name) {
                    Some(value) if !name.is_empty() => {
                        out.push_str(&sql[copied..i]);
                        out.push('?');
                        values.push(value.clone());
                        copied = end;
                    }
                    _ => {}
                }
                i = end.max(i + 1);
            }
            _ => i += 1,
        }
    }
    out.push_str(&sql[copied..]);
    Expanded { sql: out, values }
}

fn word_end(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
    }
    i
}

fn skip_quoted(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if quote != b'`' => i += 2,
            b if b == quote => {
                if bytes.get(i + 1) == Some(&quote) {
                    i += 2;
                } else {
                    return i + 1;
                }
            }
            _ => i += 1,
        }
    }
    bytes.len()
}

fn skip_line(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |n| start + n)
}
