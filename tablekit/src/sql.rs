//! Structural analysis of caller-supplied SELECT statements.
//!
//! No parsing into an AST: the text is scanned once to learn, for every byte,
//! whether it is code (outside string literals, quoted identifiers and
//! comments) and at which parenthesis depth it sits. Keyword searches then
//! only consider code at depth 0, so `FROM`/`ORDER BY` inside subqueries and
//! function calls are never mistaken for the outer clause.

use std::ops::Range;

use crate::error::DataError;

/// Keywords that end an `ORDER BY` expression list.
const ORDER_BY_TERMINATORS: &[&str] = &["LIMIT", "OFFSET", "FOR", "LOCK", "PROCEDURE", "INTO"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    /// Code at the given parenthesis depth.
    Code(usize),
    /// A `)` with no matching `(`, i.e. the end of an enclosing fragment.
    Stray,
    Quoted,
    Comment,
}

/// Byte-level classification of a statement.
struct Layout<'a> {
    sql: &'a str,
    kinds: Vec<Kind>,
}

impl<'a> Layout<'a> {
    fn scan(sql: &'a str) -> Self {
        let bytes = sql.as_bytes();
        let mut kinds = vec![Kind::Comment; bytes.len()];
        let mut level = 0usize;
        let mut i = 0;
        while i < bytes.len() {
            let (end, kind) = match bytes[i] {
                quote @ (b'\'' | b'"' | b'`') => (skip_quoted(bytes, i, quote), Kind::Quoted),
                b'-' if bytes.get(i + 1) == Some(&b'-') => (skip_line(bytes, i), Kind::Comment),
                b'#' => (skip_line(bytes, i), Kind::Comment),
                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    let end = sql[i + 2..].find("*/").map_or(bytes.len(), |n| i + 2 + n + 2);
                    (end, Kind::Comment)
                }
                b'(' => {
                    level += 1;
                    (i + 1, Kind::Code(level - 1))
                }
                b')' if level == 0 => (i + 1, Kind::Stray),
                b')' => {
                    level -= 1;
                    (i + 1, Kind::Code(level + 1))
                }
                _ => (i + 1, Kind::Code(level)),
            };
            kinds[i..end].fill(kind);
            i = end;
        }
        Layout { sql, kinds }
    }

    fn is_top(&self, pos: usize) -> bool {
        matches!(self.kinds.get(pos), Some(Kind::Code(0)))
    }

    /// Whether `keyword` starts at `pos` as a whole top-level word.
    fn keyword_at(&self, pos: usize, keyword: &str) -> bool {
        let bytes = self.sql.as_bytes();
        let end = pos + keyword.len();
        if end > bytes.len() || !(pos..end).all(|p| self.is_top(p)) {
            return false;
        }
        if !bytes[pos..end].eq_ignore_ascii_case(keyword.as_bytes()) {
            return false;
        }
        let before = pos == 0 || !is_word(bytes[pos - 1]);
        let after = end == bytes.len() || !is_word(bytes[end]);
        before && after
    }

    /// First top-level occurrence of `keyword` at or after `from`.
    fn find_keyword(&self, from: usize, keyword: &str) -> Option<usize> {
        (from..self.sql.len()).find(|&p| self.keyword_at(p, keyword))
    }

    /// Skip whitespace and comments.
    fn skip_blank(&self, mut pos: usize) -> usize {
        let bytes = self.sql.as_bytes();
        while pos < bytes.len()
            && (self.kinds[pos] == Kind::Comment || bytes[pos].is_ascii_whitespace())
        {
            pos += 1;
        }
        pos
    }

    /// Last byte before `pos` that is neither whitespace nor comment.
    fn previous_byte(&self, pos: usize) -> Option<u8> {
        let bytes = self.sql.as_bytes();
        (0..pos)
            .rev()
            .find(|&p| self.kinds[p] != Kind::Comment && !bytes[p].is_ascii_whitespace())
            .map(|p| bytes[p])
    }
}

fn is_word(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
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

/// Span of the column list between the leading `SELECT` and its top-level `FROM`.
///
/// A `FROM` directly after a comma is treated as a column name, not the clause.
pub fn select_list(sql: &str) -> Option<Range<usize>> {
    let layout = Layout::scan(sql);
    let select = layout.skip_blank(0);
    if !layout.keyword_at(select, "SELECT") {
        return None;
    }
    let start = layout.skip_blank(select + "SELECT".len());
    let mut pos = start;
    loop {
        let from = layout.find_keyword(pos, "FROM")?;
        if from > start && layout.previous_byte(from) != Some(b',') {
            return Some(start..from);
        }
        pos = from + "FROM".len();
    }
}

/// Rewrite a SELECT into one counting its rows.
///
/// The column list becomes `COUNT(*)`, or `COUNT(DISTINCT ...)` when the list
/// starts with `DISTINCT`; a top-level `ORDER BY` is removed.
pub fn count_query(sql: &str) -> Result<String, DataError> {
    let span = select_list(sql).ok_or_else(|| {
        DataError::invalid(format!(
            "cannot derive a count query: no top-level SELECT ... FROM in {sql:?}"
        ))
    })?;
    let columns = sql[span.clone()].trim();
    let counted = if starts_with_distinct(columns) {
        columns
    } else {
        "*"
    };
    let counting = format!("{}COUNT({counted}) {}", &sql[..span.start], &sql[span.end..]);
    Ok(strip_order_by(&counting))
}

fn starts_with_distinct(columns: &str) -> bool {
    let bytes = columns.as_bytes();
    bytes.len() > "DISTINCT".len()
        && bytes[..8].eq_ignore_ascii_case(b"DISTINCT")
        && (bytes[8].is_ascii_whitespace() || bytes[8] == b'(')
}

/// Remove the first top-level `ORDER BY` clause and its expression list.
///
/// The list ends at the next top-level `LIMIT`/`OFFSET`/`FOR`/`LOCK`/
/// `PROCEDURE`/`INTO`, a `;`, an unbalanced `)`, or the end of the text.
pub fn strip_order_by(sql: &str) -> String {
    let layout = Layout::scan(sql);
    let mut pos = 0;
    let (start, list) = loop {
        let Some(order) = layout.find_keyword(pos, "ORDER") else {
            return sql.to_string();
        };
        let by = layout.skip_blank(order + "ORDER".len());
        if layout.keyword_at(by, "BY") {
            break (order, by + "BY".len());
        }
        pos = order + "ORDER".len();
    };

    let bytes = sql.as_bytes();
    let end = (list..sql.len())
        .find(|&p| {
            layout.kinds[p] == Kind::Stray
                || (layout.is_top(p) && bytes[p] == b';')
                || ORDER_BY_TERMINATORS
                    .iter()
                    .any(|kw| layout.keyword_at(p, kw))
        })
        .unwrap_or(sql.len());

    let before = sql[..start].trim_end();
    let after = sql[end..].trim_start();
    if after.is_empty() {
        before.to_string()
    } else {
        format!("{before} {after}")
    }
}

/// Append the page window to a SELECT; binds `@limit` and `@offset`.
pub fn window_query(sql: &str) -> String {
    format!("{sql}\n LIMIT @limit OFFSET @offset")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_count() {
        assert_eq!(
            count_query("SELECT * FROM `profiles`").unwrap(),
            "SELECT COUNT(*) FROM `profiles`"
        );
    }

    #[test]
    fn nested_from_is_not_the_clause() {
        let sql = "SELECT a, (SELECT COUNT(*) FROM b) AS cnt FROM t WHERE x = @x";
        assert_eq!(
            count_query(sql).unwrap(),
            "SELECT COUNT(*) FROM t WHERE x = @x"
        );
    }

    #[test]
    fn function_arguments_are_opaque() {
        let sql = "select EXTRACT(YEAR FROM created) y, TRIM(LEADING 'x' FROM name) from t";
        assert_eq!(count_query(sql).unwrap(), "select COUNT(*) from t");
    }

    #[test]
    fn distinct_is_preserved() {
        let sql = "SELECT DISTINCT city FROM profiles ORDER BY city";
        assert_eq!(
            count_query(sql).unwrap(),
            "SELECT COUNT(DISTINCT city) FROM profiles"
        );
    }

    #[test]
    fn parenthesized_distinct_is_preserved() {
        assert_eq!(
            count_query("SELECT DISTINCT(city) FROM profiles").unwrap(),
            "SELECT COUNT(DISTINCT(city)) FROM profiles"
        );
        assert_eq!(
            count_query("SELECT distinctive FROM t").unwrap(),
            "SELECT COUNT(*) FROM t"
        );
    }

    #[test]
    fn literals_and_comments_are_skipped() {
        let sql = "SELECT 'from' AS a, `from` /* FROM */ FROM t -- ORDER BY a\n";
        let span = select_list(sql).unwrap();
        assert_eq!(sql[span].trim(), "'from' AS a, `from` /* FROM */");
        assert_eq!(strip_order_by(sql), sql);
    }

    #[test]
    fn comma_from_is_a_column() {
        let sql = "SELECT a, from FROM t";
        assert_eq!(count_query(sql).unwrap(), "SELECT COUNT(*) FROM t");
    }

    #[test]
    fn not_a_select() {
        assert!(matches!(
            count_query("UPDATE t SET a = 1"),
            Err(DataError::InvalidArgument(_))
        ));
        assert!(select_list("SELECT 1").is_none());
    }

    #[test]
    fn order_by_parenthesized_expression_is_stripped_whole() {
        let sql = "SELECT * FROM t ORDER BY (CASE WHEN x THEN 1 ELSE (2) END)";
        assert_eq!(strip_order_by(sql), "SELECT * FROM t");
        assert_eq!(count_query(sql).unwrap(), "SELECT COUNT(*) FROM t");
    }

    #[test]
    fn order_by_stops_at_limit() {
        let sql = "SELECT * FROM t ORDER BY a DESC, b.c ASC LIMIT 5";
        assert_eq!(strip_order_by(sql), "SELECT * FROM t LIMIT 5");
    }

    #[test]
    fn nested_order_by_is_kept() {
        let sql = "SELECT * FROM (SELECT * FROM u ORDER BY id) x WHERE ROW_NUMBER() OVER (ORDER BY id) > 1";
        assert_eq!(strip_order_by(sql), sql);
    }

    #[test]
    fn window_appends_limit_offset() {
        assert_eq!(
            window_query("SELECT * FROM t"),
            "SELECT * FROM t\n LIMIT @limit OFFSET @offset"
        );
    }
}
