//! SQL synthesis for the convention-based table operations.
//!
//! Every function is pure: it takes a table name, resolved parameter names and
//! their [`Args`], and returns the SQL text together with the bag of values to
//! bind. Predicates are always `col = @col` joined by `AND`.

use serde_json::Value;

use crate::dialect::Dialect;
use crate::error::DataError;
use crate::params::{Args, Params};

/// SQL text plus the named values it binds.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Params,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Params) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    pub fn unbound(sql: impl Into<String>) -> Self {
        Self::new(sql, Params::new())
    }
}

/// Names plus the values they were resolved from.
#[derive(Debug, Clone, Copy)]
pub struct Bound<'a> {
    pub names: &'a [String],
    pub args: &'a Args,
}

impl<'a> Bound<'a> {
    pub fn new(names: &'a [String], args: &'a Args) -> Self {
        Self { names, args }
    }

    fn params(&self) -> Params {
        self.args.to_params(self.names)
    }
}

/// `INSERT` of every column except the primary key.
pub fn insert(
    dialect: Dialect,
    table: &str,
    id_column: &str,
    data: Bound<'_>,
) -> Result<Statement, DataError> {
    let columns = without(data.names, id_column);
    check_names(&columns)?;
    let t = dialect.quote(table);
    let sql = if columns.is_empty() {
        match dialect {
            Dialect::MySql => format!("INSERT INTO {t} () VALUES ()"),
            Dialect::Sqlite => format!("INSERT INTO {t} DEFAULT VALUES"),
        }
    } else {
        format!(
            "INSERT INTO {t} ({}) VALUES ({})",
            column_list(dialect, &columns),
            placeholder_list(dialect, &columns)
        )
    };
    Ok(Statement::new(sql, data.args.to_params(&columns)))
}

/// `UPDATE ... SET data WHERE predicate`; predicate values win on name collisions.
pub fn update(
    dialect: Dialect,
    table: &str,
    predicate: Bound<'_>,
    data: Bound<'_>,
) -> Result<Statement, DataError> {
    if data.names.is_empty() {
        return Err(DataError::invalid("update needs at least one column to set"));
    }
    check_names(data.names)?;
    let condition = where_clause(dialect, predicate.names)?;
    let sets: Vec<_> = data
        .names
        .iter()
        .map(|c| format!("{} = {}", dialect.quote(c), dialect.placeholder(c)))
        .collect();
    let sql = format!(
        "UPDATE {} SET {} WHERE {condition}",
        dialect.quote(table),
        sets.join(", ")
    );
    let mut params = data.params();
    params.extend(predicate.params());
    Ok(Statement::new(sql, params))
}

/// Upsert keyed on exactly one column; the statement yields the resulting key.
pub fn insert_or_update_by(
    dialect: Dialect,
    table: &str,
    key: Bound<'_>,
    data: Bound<'_>,
) -> Result<Statement, DataError> {
    let k = match key.names {
        [single] => single.as_str(),
        names => {
            return Err(DataError::invalid(format!(
                "upsert key must have exactly one field, got {}",
                names.len()
            )))
        }
    };
    let columns = without(data.names, k);
    check_names(&columns)?;
    check_names(key.names)?;

    let mut all = columns.clone();
    all.push(k.to_string());
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}){}",
        dialect.quote(table),
        column_list(dialect, &all),
        placeholder_list(dialect, &all),
        dialect.upsert_by_key_clause(k, &columns)
    );
    let mut params = data.params();
    params.extend(key.params());
    Ok(Statement::new(sql, params))
}

/// Upsert of `data` against whatever unique key it collides with.
pub fn insert_or_update(
    dialect: Dialect,
    table: &str,
    data: Bound<'_>,
) -> Result<Statement, DataError> {
    if data.names.is_empty() {
        return Err(DataError::invalid("upsert needs at least one column"));
    }
    check_names(data.names)?;
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}){}",
        dialect.quote(table),
        column_list(dialect, data.names),
        placeholder_list(dialect, data.names),
        dialect.upsert_clause(data.names)
    );
    Ok(Statement::new(sql, data.params()))
}

pub fn delete_by_id(dialect: Dialect, table: &str, id_column: &str, id: Value) -> Statement {
    let sql = format!(
        "DELETE FROM {} WHERE {} = {}",
        dialect.quote(table),
        dialect.quote(id_column),
        dialect.placeholder(id_column)
    );
    let mut params = Params::new();
    params.insert(id_column, id);
    Statement::new(sql, params)
}

pub fn delete_where(
    dialect: Dialect,
    table: &str,
    predicate: Bound<'_>,
) -> Result<Statement, DataError> {
    let condition = where_clause(dialect, predicate.names)?;
    let sql = format!("DELETE FROM {} WHERE {condition}", dialect.quote(table));
    Ok(Statement::new(sql, predicate.params()))
}

pub fn delete_all(dialect: Dialect, table: &str) -> Statement {
    Statement::unbound(dialect.delete_all_sql(table))
}

pub fn get_by_id(dialect: Dialect, table: &str, id_column: &str, id: Value) -> Statement {
    let sql = format!(
        "SELECT * FROM {} WHERE {} = {}",
        dialect.quote(table),
        dialect.quote(id_column),
        dialect.placeholder(id_column)
    );
    let mut params = Params::new();
    params.insert(id_column, id);
    Statement::new(sql, params)
}

/// `SELECT *` with an optional equality predicate.
pub fn select(
    dialect: Dialect,
    table: &str,
    predicate: Option<Bound<'_>>,
) -> Result<Statement, DataError> {
    let mut sql = format!("SELECT * FROM {}", dialect.quote(table));
    let params = match predicate {
        Some(predicate) => {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause(dialect, predicate.names)?);
            predicate.params()
        }
        None => Params::new(),
    };
    Ok(Statement::new(sql, params))
}

/// [`select`] restricted to one row.
pub fn first(
    dialect: Dialect,
    table: &str,
    predicate: Option<Bound<'_>>,
) -> Result<Statement, DataError> {
    let mut stmt = select(dialect, table, predicate)?;
    stmt.sql.push_str(" LIMIT 1");
    Ok(stmt)
}

/// `` `a` = @a AND `b` = @b ``
pub fn where_clause(dialect: Dialect, names: &[String]) -> Result<String, DataError> {
    if names.is_empty() {
        return Err(DataError::invalid("predicate has no fields"));
    }
    check_names(names)?;
    Ok(names
        .iter()
        .map(|c| format!("{} = {}", dialect.quote(c), dialect.placeholder(c)))
        .collect::<Vec<_>>()
        .join(" AND "))
}

pub fn create_table(dialect: Dialect, table: &str, columns: &[&str], if_not_exists: bool) -> Statement {
    let guard = if if_not_exists { "IF NOT EXISTS " } else { "" };
    Statement::unbound(format!(
        "CREATE TABLE {guard}{} ({})",
        dialect.quote(table),
        columns.join(", ")
    ))
}

pub fn drop_table(dialect: Dialect, table: &str) -> Statement {
    Statement::unbound(format!("DROP TABLE IF EXISTS {}", dialect.quote(table)))
}

fn without(names: &[String], column: &str) -> Vec<String> {
    names
        .iter()
        .filter(|n| !n.eq_ignore_ascii_case(column))
        .cloned()
        .collect()
}

fn column_list(dialect: Dialect, names: &[String]) -> String {
    names
        .iter()
        .map(|n| dialect.quote(n))
        .collect::<Vec<_>>()
        .join(", ")
}

fn placeholder_list(dialect: Dialect, names: &[String]) -> String {
    names
        .iter()
        .map(|n| dialect.placeholder(n))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parameter names double as placeholders, so they must be plain words.
fn check_names(names: &[String]) -> Result<(), DataError> {
    for name in names {
        let mut chars = name.chars();
        let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(DataError::invalid(format!("invalid parameter name: {name:?}")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::IntoArgs;
    use serde_json::json;

    fn bag(value: Value) -> (Vec<String>, Args) {
        let args = value.into_args().unwrap();
        let names = match &args {
            Args::Bag(p) => p.names(),
            Args::Record { .. } => unreachable!(),
        };
        (names, args)
    }

    #[test]
    fn insert_skips_primary_key() {
        let (names, args) = bag(json!({ "Id": 9, "city": "Kajang", "facultyId": 1 }));
        let stmt = insert(Dialect::MySql, "profiles", "id", Bound::new(&names, &args)).unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO `profiles` (`city`, `facultyId`) VALUES (@city, @facultyId)"
        );
        assert_eq!(stmt.params.names(), vec!["city", "facultyId"]);
    }

    #[test]
    fn insert_without_columns_uses_defaults() {
        let (names, args) = bag(json!({ "id": 1 }));
        let stmt = insert(Dialect::Sqlite, "t", "id", Bound::new(&names, &args)).unwrap();
        assert_eq!(stmt.sql, "INSERT INTO `t` DEFAULT VALUES");
    }

    #[test]
    fn update_binds_predicate_last() {
        let (dn, data) = bag(json!({ "city": "Bangi", "id": 100 }));
        let (wn, pred) = bag(json!({ "id": 1, "facultyId": 1 }));
        let stmt = update(
            Dialect::MySql,
            "profiles",
            Bound::new(&wn, &pred),
            Bound::new(&dn, &data),
        )
        .unwrap();
        assert_eq!(
            stmt.sql,
            "UPDATE `profiles` SET `city` = @city, `id` = @id WHERE `id` = @id AND `facultyId` = @facultyId"
        );
        assert_eq!(stmt.params.get("id"), Some(&json!(1)));
        assert_eq!(stmt.params.names(), vec!["city", "id", "facultyId"]);
    }

    #[test]
    fn update_requires_predicate_and_data() {
        let (dn, data) = bag(json!({ "city": "Bangi" }));
        let (wn, pred) = bag(json!({}));
        let err = update(Dialect::MySql, "t", Bound::new(&wn, &pred), Bound::new(&dn, &data));
        assert!(matches!(err, Err(DataError::InvalidArgument(_))));
        let err = update(Dialect::MySql, "t", Bound::new(&dn, &data), Bound::new(&wn, &pred));
        assert!(matches!(err, Err(DataError::InvalidArgument(_))));
    }

    #[test]
    fn upsert_by_key_mysql() {
        let (dn, data) = bag(json!({ "id": 5, "city": "Kajang" }));
        let (kn, key) = bag(json!({ "id": 5 }));
        let stmt = insert_or_update_by(
            Dialect::MySql,
            "profiles",
            Bound::new(&kn, &key),
            Bound::new(&dn, &data),
        )
        .unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO `profiles` (`city`, `id`) VALUES (@city, @id) \
             ON DUPLICATE KEY UPDATE `id` = LAST_INSERT_ID(`id`), `city` = @city"
        );
    }

    #[test]
    fn upsert_by_key_rejects_zero_or_many_keys() {
        let (dn, data) = bag(json!({ "city": "Kajang" }));
        for key in [json!({}), json!({ "a": 1, "b": 2 })] {
            let (kn, key) = bag(key);
            let err = insert_or_update_by(
                Dialect::Sqlite,
                "t",
                Bound::new(&kn, &key),
                Bound::new(&dn, &data),
            )
            .unwrap_err();
            assert!(matches!(err, DataError::InvalidArgument(ref m) if m.contains("exactly one")));
        }
    }

    #[test]
    fn upsert_without_key() {
        let (dn, data) = bag(json!({ "id": 1, "city": "Kajang" }));
        let stmt = insert_or_update(Dialect::MySql, "t", Bound::new(&dn, &data)).unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO `t` (`id`, `city`) VALUES (@id, @city) \
             ON DUPLICATE KEY UPDATE `id` = @id, `city` = @city"
        );
    }

    #[test]
    fn delete_and_get_by_id() {
        let stmt = delete_by_id(Dialect::MySql, "t", "id", json!(3));
        assert_eq!(stmt.sql, "DELETE FROM `t` WHERE `id` = @id");
        assert_eq!(stmt.params.get("id"), Some(&json!(3)));
        let stmt = get_by_id(Dialect::MySql, "t", "id", json!(3));
        assert_eq!(stmt.sql, "SELECT * FROM `t` WHERE `id` = @id");
    }

    #[test]
    fn first_and_all() {
        let (wn, pred) = bag(json!({ "facultyId": 1 }));
        let stmt = first(Dialect::Sqlite, "profiles", Some(Bound::new(&wn, &pred))).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT * FROM `profiles` WHERE `facultyId` = @facultyId LIMIT 1"
        );
        let stmt = select(Dialect::Sqlite, "profiles", None).unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM `profiles`");
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn rejects_names_unusable_as_placeholders() {
        let (wn, pred) = bag(json!({ "faculty-id": 1 }));
        let err = select(Dialect::MySql, "t", Some(Bound::new(&wn, &pred))).unwrap_err();
        assert!(matches!(err, DataError::InvalidArgument(_)));
    }
}
