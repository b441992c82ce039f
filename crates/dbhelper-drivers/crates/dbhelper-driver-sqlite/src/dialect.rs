//! SQLite SQL templating

use dbhelper_core::{DatabaseType, SqlDialect};

/// SQLite dialect: `LIMIT`/`OFFSET` paging and double-quoted identifiers
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Sqlite
    }

    fn page_row_num_sql(&self, data_sql: &str, start_row: u64, end_row: u64) -> String {
        format!(
            "{} limit {} offset {}",
            data_sql,
            end_row.saturating_sub(start_row),
            start_row
        )
    }

    fn row_limit_sql(&self, data_sql: &str, row_limit: u64) -> String {
        format!("select z_.* from ({}) z_ limit {}", data_sql, row_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_row_num_sql() {
        assert_eq!(
            SqliteDialect.page_row_num_sql("select * from t order by id", 20, 30),
            "select * from t order by id limit 10 offset 20"
        );
    }

    #[test]
    fn test_page_row_num_sql_inverted_range_is_empty_page() {
        assert_eq!(
            SqliteDialect.page_row_num_sql("select * from t", 30, 20),
            "select * from t limit 0 offset 30"
        );
    }

    #[test]
    fn test_row_limit_sql() {
        assert_eq!(
            SqliteDialect.row_limit_sql("select * from t", 5),
            "select z_.* from (select * from t) z_ limit 5"
        );
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(SqliteDialect.quote_identifier("order"), "\"order\"");
        assert_eq!(SqliteDialect.quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_procedures_not_supported() {
        assert!(SqliteDialect.procedure_call_sql("usp_x", &[]).is_err());
    }
}
