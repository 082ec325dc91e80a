use serde::Serialize;
use serde_json::Value;

use crate::error::DataError;
use crate::params::Params;
use crate::sql;
use crate::statement::Statement;

/// Number of page links shown on either side of the current page.
pub const PAGE_WINDOW: u64 = 9;

/// A requested page: 1-based page number and page size, both non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pageable {
    pub page: u32,
    pub items_per_page: u32,
}

impl Pageable {
    pub fn new(page: u32, items_per_page: u32) -> Result<Self, DataError> {
        if page == 0 {
            return Err(DataError::invalid("page numbers start at 1"));
        }
        if items_per_page == 0 {
            return Err(DataError::invalid("items per page must be at least 1"));
        }
        Ok(Self {
            page,
            items_per_page,
        })
    }

    /// Absolute row offset of the first item on this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.items_per_page)
    }

    /// `SELECT COUNT(...)` derived from `sql`, bound with the caller's params.
    pub fn count_statement(&self, sql: &str, params: &Params) -> Result<Statement, DataError> {
        Ok(Statement::new(sql::count_query(sql)?, params.clone()))
    }

    /// `sql` restricted to this page; `limit`/`offset` are bound last.
    pub fn window_statement(&self, sql: &str, params: &Params) -> Statement {
        let mut params = params.clone();
        params.insert("limit", self.items_per_page);
        params.insert("offset", self.offset());
        Statement::new(sql::window_query(sql), params)
    }

    pub fn info(&self, total_items: u64) -> PageInfo {
        PageInfo::compute(*self, total_items)
    }
}

/// Page bookkeeping, computed before the items are fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    pub items_per_page: u64,
    pub current_page: u64,
    pub total_items: u64,
    pub total_pages: u64,
    pub window_start: u64,
    pub window_end: u64,
    pub numbering: u64,
    pub has_previous: bool,
    pub has_next: bool,
}

impl PageInfo {
    pub fn compute(pageable: Pageable, total_items: u64) -> Self {
        let page = u64::from(pageable.page);
        let per_page = u64::from(pageable.items_per_page);
        let total_pages = total_items.div_ceil(per_page);
        let window_start = page.saturating_sub(PAGE_WINDOW).max(1);
        Self {
            items_per_page: per_page,
            current_page: page,
            total_items,
            total_pages,
            window_start,
            window_end: (page + PAGE_WINDOW).min(total_pages),
            numbering: pageable.offset(),
            has_previous: page - 1 >= window_start,
            has_next: page + 1 <= total_pages,
        }
    }

    pub fn with_items<T>(self, items: Vec<T>) -> Page<T> {
        Page {
            items_per_page: self.items_per_page,
            current_page: self.current_page,
            total_items: self.total_items,
            total_pages: self.total_pages,
            window_start: self.window_start,
            window_end: self.window_end,
            numbering: self.numbering,
            has_previous: self.has_previous,
            has_next: self.has_next,
            items,
        }
    }
}

/// A page of results with pagination metadata.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items_per_page: u64,
    pub current_page: u64,
    pub total_items: u64,
    pub total_pages: u64,
    pub window_start: u64,
    /// Last page number to display; never beyond `total_pages`.
    pub window_end: u64,
    /// Row offset of the first item, for 1-based row numbering.
    pub numbering: u64,
    pub has_previous: bool,
    pub has_next: bool,
    pub items: Vec<T>,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items_per_page: self.items_per_page,
            current_page: self.current_page,
            total_items: self.total_items,
            total_pages: self.total_pages,
            window_start: self.window_start,
            window_end: self.window_end,
            numbering: self.numbering,
            has_previous: self.has_previous,
            has_next: self.has_next,
            items: self.items.into_iter().map(f).collect(),
        }
    }
}

/// Interpret the first column of a count query's first row.
///
/// Drivers report counts as integers, unsigned integers or decimal strings.
pub fn total_from(value: Option<&Value>) -> Result<u64, DataError> {
    match value {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .ok_or_else(|| DataError::Decode(format!("row count {n} is not a natural number"))),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| DataError::Decode(format!("row count {s:?} is not a number"))),
        Some(other) => Err(DataError::Decode(format!("row count {other} is not a number"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn info(page: u32, per_page: u32, total: u64) -> PageInfo {
        Pageable::new(page, per_page).unwrap().info(total)
    }

    #[test]
    fn zero_page_or_size_is_rejected() {
        assert!(matches!(Pageable::new(0, 10), Err(DataError::InvalidArgument(_))));
        assert!(matches!(Pageable::new(1, 0), Err(DataError::InvalidArgument(_))));
    }

    #[test]
    fn first_page() {
        let info = info(1, 1, 2);
        assert_eq!(info.total_pages, 2);
        assert_eq!(info.window_start, 1);
        assert_eq!(info.window_end, 2);
        assert_eq!(info.numbering, 0);
        assert!(!info.has_previous);
        assert!(info.has_next);
    }

    #[test]
    fn last_page_has_no_next() {
        let info = info(3, 10, 25);
        assert_eq!(info.total_pages, 3);
        assert_eq!(info.numbering, 20);
        assert!(info.has_previous);
        assert!(!info.has_next);
    }

    #[test]
    fn window_is_clamped_on_both_sides() {
        let middle = info(15, 10, 1000);
        assert_eq!(middle.window_start, 6);
        assert_eq!(middle.window_end, 24);

        let tail = info(10, 10, 115);
        assert_eq!(tail.total_pages, 12);
        assert_eq!(tail.window_end, 12);
    }

    #[test]
    fn empty_result() {
        let info = info(1, 10, 0);
        assert_eq!(info.total_pages, 0);
        assert_eq!(info.window_end, 0);
        assert!(!info.has_next);
        assert!(!info.has_previous);
    }

    #[test]
    fn window_params_are_bound_last() {
        let pageable = Pageable::new(3, 5).unwrap();
        let params = Params::new().with("limit", 99).with("city", "Kajang");
        let stmt = pageable.window_statement("SELECT * FROM t", &params);
        assert_eq!(stmt.params.get("limit"), Some(&json!(5)));
        assert_eq!(stmt.params.get("offset"), Some(&json!(10)));
        assert!(stmt.sql.ends_with("LIMIT @limit OFFSET @offset"));
    }

    #[test]
    fn totals_from_driver_values() {
        assert_eq!(total_from(None).unwrap(), 0);
        assert_eq!(total_from(Some(&json!(7))).unwrap(), 7);
        assert_eq!(total_from(Some(&json!("12"))).unwrap(), 12);
        assert!(matches!(
            total_from(Some(&json!(-1))),
            Err(DataError::Decode(_))
        ));
    }

    #[test]
    fn page_serializes_camel_case() {
        let page = info(1, 1, 2).with_items(vec![json!({"id": 1})]);
        let value = serde_json::to_value(&page).unwrap();
        assert_eq!(value["totalItems"], json!(2));
        assert_eq!(value["hasNext"], json!(true));
        assert_eq!(value["items"][0]["id"], json!(1));
    }
}
