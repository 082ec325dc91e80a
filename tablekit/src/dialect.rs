/// SQL dialect spoken by an executor.
///
/// Both dialects quote identifiers with backticks and page with
/// `LIMIT/OFFSET`; they differ in catalog probing, generated-id retrieval
/// and upsert syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// MySQL / MariaDB (`ON DUPLICATE KEY UPDATE`, `LAST_INSERT_ID`).
    MySql,
    /// SQLite 3.35+ (`ON CONFLICT ... DO UPDATE`, `RETURNING`).
    Sqlite,
}

/// How an upsert-by-key reports the resulting key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// The execution's last-insert-id carries the key.
    LastInsertId,
    /// The statement returns the key as its single row.
    Returning,
}

impl Dialect {
    pub fn quote_char(self) -> char {
        '`'
    }

    /// Quote an identifier, doubling embedded quote characters.
    pub fn quote(self, ident: &str) -> String {
        let q = self.quote_char();
        let escaped = ident.replace(q, &format!("{q}{q}"));
        format!("{q}{escaped}{q}")
    }

    /// Named placeholder for a parameter.
    pub fn placeholder(self, name: &str) -> String {
        format!("@{name}")
    }

    /// Existence probe for a table in the current database; binds `@name`.
    pub fn table_exists_sql(self) -> &'static str {
        match self {
            Dialect::MySql => {
                "SELECT 1 FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_NAME = @name AND TABLE_SCHEMA = DATABASE()"
            }
            Dialect::Sqlite => "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = @name",
        }
    }

    /// Statement removing every row of `table`.
    pub fn delete_all_sql(self, table: &str) -> String {
        match self {
            Dialect::MySql => format!("TRUNCATE {}", self.quote(table)),
            Dialect::Sqlite => format!("DELETE FROM {}", self.quote(table)),
        }
    }

    pub fn key_source(self) -> KeySource {
        match self {
            Dialect::MySql => KeySource::LastInsertId,
            Dialect::Sqlite => KeySource::Returning,
        }
    }

    /// Conflict clause for an upsert keyed on `key` that rewrites `columns`.
    pub(crate) fn upsert_by_key_clause(self, key: &str, columns: &[String]) -> String {
        let k = self.quote(key);
        match self {
            Dialect::MySql => {
                let mut sets = vec![format!("{k} = LAST_INSERT_ID({k})")];
                sets.extend(columns.iter().map(|c| self.assign(c)));
                format!(" ON DUPLICATE KEY UPDATE {}", sets.join(", "))
            }
            Dialect::Sqlite => {
                let sets: Vec<_> = columns.iter().map(|c| self.assign_excluded(c)).collect();
                // `DO UPDATE` needs at least one assignment; re-assigning the key is a no-op.
                let sets = if sets.is_empty() {
                    format!("{k} = excluded.{k}")
                } else {
                    sets.join(", ")
                };
                format!(" ON CONFLICT({k}) DO UPDATE SET {sets} RETURNING {k}")
            }
        }
    }

    /// Conflict clause for an upsert keyed on whatever unique key the data hits.
    pub(crate) fn upsert_clause(self, columns: &[String]) -> String {
        match self {
            Dialect::MySql => {
                let sets: Vec<_> = columns.iter().map(|c| self.assign(c)).collect();
                format!(" ON DUPLICATE KEY UPDATE {}", sets.join(", "))
            }
            Dialect::Sqlite => {
                let sets: Vec<_> = columns.iter().map(|c| self.assign_excluded(c)).collect();
                format!(" ON CONFLICT DO UPDATE SET {}", sets.join(", "))
            }
        }
    }

    fn assign(self, column: &str) -> String {
        format!("{} = {}", self.quote(column), self.placeholder(column))
    }

    fn assign_excluded(self, column: &str) -> String {
        let c = self.quote(column);
        format!("{c} = excluded.{c}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_escapes_backticks() {
        assert_eq!(Dialect::MySql.quote("city"), "`city`");
        assert_eq!(Dialect::Sqlite.quote("we`ird"), "`we``ird`");
    }

    #[test]
    fn mysql_upsert_reaffirms_key() {
        let clause = Dialect::MySql.upsert_by_key_clause("id", &["city".into()]);
        assert_eq!(
            clause,
            " ON DUPLICATE KEY UPDATE `id` = LAST_INSERT_ID(`id`), `city` = @city"
        );
    }

    #[test]
    fn sqlite_upsert_returns_key() {
        let clause = Dialect::Sqlite.upsert_by_key_clause("id", &["city".into()]);
        assert_eq!(
            clause,
            " ON CONFLICT(`id`) DO UPDATE SET `city` = excluded.`city` RETURNING `id`"
        );
        let bare = Dialect::Sqlite.upsert_by_key_clause("id", &[]);
        assert!(bare.contains("SET `id` = excluded.`id`"));
    }

    #[test]
    fn delete_all_per_dialect() {
        assert_eq!(Dialect::MySql.delete_all_sql("t"), "TRUNCATE `t`");
        assert_eq!(Dialect::Sqlite.delete_all_sql("t"), "DELETE FROM `t`");
    }
}
