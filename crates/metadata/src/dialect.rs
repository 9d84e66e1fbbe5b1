//! SQL dialect differences.
//!
//! Queries are written once with `?` placeholders and rewritten for drivers
//! that number their parameters.

use archivista_core::config::SqlDialect;
use std::borrow::Cow;

/// Rewrite `?` placeholders for the target dialect.
///
/// Postgres uses `$1, $2, ...`; SQLite and MySQL accept `?` as written.
/// Queries never contain `?` inside string literals.
pub fn rewrite_placeholders(dialect: SqlDialect, sql: &str) -> Cow<'_, str> {
    if dialect != SqlDialect::Postgres || !sql.contains('?') {
        return Cow::Borrowed(sql);
    }
    let mut out = String::with_capacity(sql.len() + 16);
    let mut n = 0;
    for ch in sql.chars() {
        if ch == '?' {
            n += 1;
            out.push('$');
            out.push_str(&n.to_string());
        } else {
            out.push(ch);
        }
    }
    Cow::Owned(out)
}

/// Maximum number of bound parameters in one statement.
pub fn max_bind_params(dialect: SqlDialect) -> usize {
    match dialect {
        // SQLITE_MAX_VARIABLE_NUMBER since 3.32.
        SqlDialect::Sqlite => 32_766,
        SqlDialect::Postgres | SqlDialect::Mysql => 65_535,
    }
}

/// Rows per multi-row insert, bounded by both the configured batch size and
/// the driver's parameter limit.
pub fn batch_rows(dialect: SqlDialect, batch_size: usize, params_per_row: usize) -> usize {
    batch_size
        .min(max_bind_params(dialect) / params_per_row.max(1))
        .max(1)
}

/// Schema statements for a dialect.
pub fn schema(dialect: SqlDialect) -> &'static str {
    match dialect {
        SqlDialect::Sqlite => include_str!("schema/sqlite.sql"),
        SqlDialect::Postgres => include_str!("schema/postgres.sql"),
        SqlDialect::Mysql => include_str!("schema/mysql.sql"),
    }
}

/// Split a schema file into executable statements, skipping empty and
/// comment-only chunks.
pub fn schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}
