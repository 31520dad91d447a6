//! Result surface returned by every operation.

use crate::client::ExecOutcome;
use crate::value::Value;

/// The final statement text, its bound arguments and the executor outcome.
///
/// Fetch operations carry no outcome: `rows_affected` and `last_insert_id`
/// report zero for them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecResult {
    sql: String,
    args: Vec<Value>,
    outcome: Option<ExecOutcome>,
    not_found: bool,
}

impl ExecResult {
    pub fn new(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            args,
            outcome: None,
            not_found: false,
        }
    }

    pub(crate) fn with_outcome(mut self, outcome: ExecOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub(crate) fn into_not_found(mut self) -> Self {
        self.not_found = true;
        self
    }

    /// Identifier generated by the statement (0 if not reported).
    pub fn last_insert_id(&self) -> i64 {
        self.outcome
            .and_then(|o| o.last_insert_id)
            .unwrap_or_default()
    }

    /// Rows affected by the statement (0 for queries).
    pub fn rows_affected(&self) -> u64 {
        self.outcome.map(|o| o.rows_affected).unwrap_or_default()
    }

    /// The statement text actually sent to the executor.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The arguments bound to the statement, in placeholder order.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Whether this result belongs to a fetch that returned no rows.
    pub fn is_not_found(&self) -> bool {
        self.not_found
    }

    /// Render `[sql], [arg, ...]` for logs.
    pub fn statement(&self) -> String {
        let args = self
            .args
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        format!("[{}], [{}]", self.sql, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_results_report_zero_outcome() {
        let result = ExecResult::new("select * from users", vec![]);
        assert_eq!(result.rows_affected(), 0);
        assert_eq!(result.last_insert_id(), 0);
        assert!(!result.is_not_found());
    }

    #[test]
    fn exec_outcome_is_exposed() {
        let result = ExecResult::new("insert into t(a) values(?)", vec![Value::Int(1)])
            .with_outcome(ExecOutcome::new(1).with_last_insert_id(42));
        assert_eq!(result.rows_affected(), 1);
        assert_eq!(result.last_insert_id(), 42);
    }

    #[test]
    fn statement_renders_sql_and_args() {
        let result = ExecResult::new(
            "update users set name=? where id=?",
            vec![Value::Text("a".into()), Value::Int(7)],
        );
        assert_eq!(
            result.statement(),
            "[update users set name=? where id=?], [\"a\", 7]"
        );
    }
}
