//! SQL Server (T-SQL) templating

use dbhelper_core::{DatabaseType, Parameter, ParameterDirection, Result, SqlDialect};

/// SQL Server dialect
///
/// Uses square-bracket identifiers, `OFFSET .. FETCH NEXT` paging and
/// `TOP n` row limits.
///
/// # Example
///
/// ```
/// use dbhelper_core::SqlDialect;
/// use dbhelper_driver_mssql::MssqlDialect;
///
/// assert_eq!(MssqlDialect.quote_identifier("user[data]"), "[user[data]]]");
/// assert_eq!(
///     MssqlDialect.row_limit_sql("select * from t", 10),
///     "select top 10 z_.* from (select * from t) z_"
/// );
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MssqlDialect;

impl MssqlDialect {
    /// Create a new SQL Server dialect instance
    pub fn new() -> Self {
        Self
    }

    /// Quote a possibly schema-qualified object name part by part
    ///
    /// Parts that are already bracketed are kept as written.
    pub fn quote_object_name(&self, name: &str) -> String {
        name.split('.')
            .map(|part| {
                let part = part.trim();
                if part.starts_with('[') && part.ends_with(']') && part.len() >= 2 {
                    part.to_string()
                } else {
                    self.quote_identifier(part)
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl SqlDialect for MssqlDialect {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::SqlServer
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("[{}]", ident.replace(']', "]]"))
    }

    /// The query must carry its own `ORDER BY`; T-SQL rejects `OFFSET` without one.
    fn page_row_num_sql(&self, data_sql: &str, start_row: u64, end_row: u64) -> String {
        format!(
            "{} offset {} row fetch next {} row only",
            data_sql,
            start_row,
            end_row.saturating_sub(start_row)
        )
    }

    fn row_limit_sql(&self, data_sql: &str, row_limit: u64) -> String {
        format!("select top {} z_.* from ({}) z_", row_limit, data_sql)
    }

    /// `EXEC [name] @a = @P1, @b = @P2 OUTPUT`
    ///
    /// Placeholders are numbered over the parameters actually passed, so
    /// `ReturnValue` parameters consume no `@Pn`. Unnamed parameters are
    /// passed positionally.
    fn procedure_call_sql(&self, name: &str, params: &[Parameter]) -> Result<String> {
        let args: Vec<String> = params
            .iter()
            .filter(|p| p.direction != ParameterDirection::ReturnValue)
            .enumerate()
            .map(|(idx, p)| {
                let mut arg = if p.is_named() {
                    format!("@{} = @P{}", p.bare_name(), idx + 1)
                } else {
                    format!("@P{}", idx + 1)
                };
                if p.direction.is_output() {
                    arg.push_str(" OUTPUT");
                }
                arg
            })
            .collect();

        let mut sql = format!("EXEC {}", self.quote_object_name(name));
        if !args.is_empty() {
            sql.push(' ');
            sql.push_str(&args.join(", "));
        }
        Ok(sql)
    }
}
