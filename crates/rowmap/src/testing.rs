//! In-memory executor.
//!
//! [`MemoryExecutor`] answers queries and statements from a script and records
//! everything it was asked to run. It exercises the whole mapping engine
//! without a database:
//!
//! ```ignore
//! use rowmap::testing::{MemoryExecutor, MemoryRows};
//! use rowmap::{args, Db};
//!
//! let executor = MemoryExecutor::new();
//! executor.push_rows(MemoryRows::new(["id", "name"]).row(args![1, "alice"]));
//!
//! let db = Db::new(executor);
//! let mut user = User::default();
//! db.fetch_one(&mut user, "select id, name from users where id = $1", args![1]).await?;
//! ```

use crate::client::{check_scan_arity, ExecOutcome, Executor, RowCursor, ScanTarget};
use crate::error::{OrmError, OrmResult};
use crate::value::Value;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Scripted result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryRows {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl MemoryRows {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row. Values are matched to columns by position.
    pub fn row(mut self, values: Vec<Value>) -> Self {
        self.rows.push(values);
        self
    }
}

/// How a statement reached the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Execute,
    Query,
    Prepare,
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    pub kind: CallKind,
    pub sql: String,
    pub args: Vec<Value>,
    /// Whether the call went through a prepared statement.
    pub prepared: bool,
}

#[derive(Debug, Default)]
struct Script {
    rows: VecDeque<MemoryRows>,
    outcomes: VecDeque<ExecOutcome>,
    failures: VecDeque<String>,
    log: Vec<ExecutedStatement>,
}

/// Error returned for scripted failures.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct MemoryError(pub String);

/// Scripted [`Executor`].
///
/// Queries pop the next scripted [`MemoryRows`] (an empty result with no
/// columns once the script runs out); statements pop the next
/// [`ExecOutcome`] (zero rows affected once it runs out). A queued failure
/// fails the next call of any kind.
#[derive(Debug, Default)]
pub struct MemoryExecutor {
    script: Mutex<Script>,
}

/// Prepared statement handle of [`MemoryExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryStatement {
    pub sql: String,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_rows(&self, rows: MemoryRows) -> &Self {
        self.script.lock().rows.push_back(rows);
        self
    }

    pub fn push_outcome(&self, outcome: ExecOutcome) -> &Self {
        self.script.lock().outcomes.push_back(outcome);
        self
    }

    /// Fail the next call with a [`OrmError::Driver`] carrying `message`.
    pub fn fail_next(&self, message: impl Into<String>) -> &Self {
        self.script.lock().failures.push_back(message.into());
        self
    }

    /// Every call received so far, in order.
    pub fn executed(&self) -> Vec<ExecutedStatement> {
        self.script.lock().log.clone()
    }

    /// The most recent call.
    pub fn last(&self) -> Option<ExecutedStatement> {
        self.script.lock().log.last().cloned()
    }

    fn record(&self, kind: CallKind, sql: &str, args: &[Value], prepared: bool) -> OrmResult<()> {
        let mut script = self.script.lock();
        script.log.push(ExecutedStatement {
            kind,
            sql: sql.to_string(),
            args: args.to_vec(),
            prepared,
        });
        match script.failures.pop_front() {
            Some(message) => Err(OrmError::driver(MemoryError(message))),
            None => Ok(()),
        }
    }

    fn run_execute(&self, sql: &str, args: &[Value], prepared: bool) -> OrmResult<ExecOutcome> {
        self.record(CallKind::Execute, sql, args, prepared)?;
        Ok(self.script.lock().outcomes.pop_front().unwrap_or_default())
    }

    fn run_query(&self, sql: &str, args: &[Value], prepared: bool) -> OrmResult<MemoryCursor> {
        self.record(CallKind::Query, sql, args, prepared)?;
        let rows = self.script.lock().rows.pop_front().unwrap_or_default();
        Ok(MemoryCursor::new(rows))
    }
}

impl Executor for MemoryExecutor {
    type Cursor = MemoryCursor;
    type Statement = MemoryStatement;

    async fn execute(&self, sql: &str, args: &[Value]) -> OrmResult<ExecOutcome> {
        self.run_execute(sql, args, false)
    }

    async fn query(&self, sql: &str, args: &[Value]) -> OrmResult<MemoryCursor> {
        self.run_query(sql, args, false)
    }

    async fn prepare(&self, sql: &str) -> OrmResult<MemoryStatement> {
        self.record(CallKind::Prepare, sql, &[], false)?;
        Ok(MemoryStatement {
            sql: sql.to_string(),
        })
    }

    async fn execute_prepared(
        &self,
        stmt: &MemoryStatement,
        args: &[Value],
    ) -> OrmResult<ExecOutcome> {
        self.run_execute(&stmt.sql, args, true)
    }

    async fn query_prepared(&self, stmt: &MemoryStatement, args: &[Value]) -> OrmResult<MemoryCursor> {
        self.run_query(&stmt.sql, args, true)
    }
}

/// Cursor over a [`MemoryRows`] script entry.
#[derive(Debug)]
pub struct MemoryCursor {
    columns: Vec<String>,
    rows: VecDeque<Vec<Value>>,
    current: Option<Vec<Value>>,
    closed: bool,
}

impl MemoryCursor {
    pub fn new(rows: MemoryRows) -> Self {
        Self {
            columns: rows.columns,
            rows: rows.rows.into(),
            current: None,
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl RowCursor for MemoryCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next(&mut self) -> OrmResult<bool> {
        if self.closed {
            return Ok(false);
        }
        self.current = self.rows.pop_front();
        Ok(self.current.is_some())
    }

    fn scan(&mut self, targets: &mut [&mut dyn ScanTarget]) -> OrmResult<()> {
        check_scan_arity(self.columns.len(), targets.len())?;
        let row = self
            .current
            .as_ref()
            .ok_or_else(|| OrmError::Other("scan called without a current row".to_string()))?;
        for (target, value) in targets.iter_mut().zip(row) {
            target.scan(value.clone())?;
        }
        Ok(())
    }

    fn close(&mut self) -> OrmResult<()> {
        self.closed = true;
        self.current = None;
        self.rows.clear();
        Ok(())
    }
}

/// Hand-written records used by unit tests inside the crate.
#[cfg(test)]
pub(crate) mod fixtures {
    use crate::client::RowCursor;
    use crate::error::OrmResult;
    use crate::materialize::Materializer;
    use crate::record::{
        load_single, single_shape, Destination, FieldDescriptor, FieldSlot, Record,
        RecordDescriptor, Shape,
    };
    use crate::value::Value;

    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct User {
        pub id: i64,
        pub name: String,
        pub age: i64,
    }

    static USER: RecordDescriptor = RecordDescriptor {
        type_name: "User",
        fields: &[
            FieldDescriptor {
                name: "id",
                tags: &[("db", "id")],
            },
            FieldDescriptor {
                name: "name",
                tags: &[("db", "name")],
            },
            FieldDescriptor {
                name: "age",
                tags: &[("db", "age")],
            },
        ],
    };

    impl Record for User {
        fn descriptor() -> &'static RecordDescriptor {
            &USER
        }

        fn record_descriptor(&self) -> &'static RecordDescriptor {
            &USER
        }

        fn field_value(&self, index: usize) -> Option<Value> {
            match index {
                0 => Some(self.id.into()),
                1 => Some(self.name.as_str().into()),
                2 => Some(self.age.into()),
                _ => None,
            }
        }

        fn field_slots(&mut self) -> Vec<Option<&mut dyn FieldSlot>> {
            vec![
                Some(&mut self.id as &mut dyn FieldSlot),
                Some(&mut self.name),
                Some(&mut self.age),
            ]
        }
    }

    impl Destination for User {
        fn shape() -> Shape {
            single_shape::<Self>()
        }

        fn load(&mut self, cursor: &mut dyn RowCursor, engine: &Materializer<'_>) -> OrmResult<usize> {
            load_single(self, cursor, engine)
        }
    }

    /// A record without an id whose last field has no column.
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Person {
        pub name: String,
        pub age: i64,
        pub note: String,
    }

    static PERSON: RecordDescriptor = RecordDescriptor {
        type_name: "Person",
        fields: &[
            FieldDescriptor {
                name: "name",
                tags: &[("db", "name")],
            },
            FieldDescriptor {
                name: "age",
                tags: &[("db", "age")],
            },
            FieldDescriptor {
                name: "note",
                tags: &[],
            },
        ],
    };

    impl Person {
        pub fn new(name: &str, age: i64) -> Self {
            Self {
                name: name.to_string(),
                age,
                note: String::new(),
            }
        }
    }

    impl Record for Person {
        fn descriptor() -> &'static RecordDescriptor {
            &PERSON
        }

        fn record_descriptor(&self) -> &'static RecordDescriptor {
            &PERSON
        }

        fn field_value(&self, index: usize) -> Option<Value> {
            match index {
                0 => Some(self.name.as_str().into()),
                1 => Some(self.age.into()),
                2 => Some(self.note.as_str().into()),
                _ => None,
            }
        }

        fn field_slots(&mut self) -> Vec<Option<&mut dyn FieldSlot>> {
            vec![
                Some(&mut self.name as &mut dyn FieldSlot),
                Some(&mut self.age),
                Some(&mut self.note),
            ]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_queries_and_log() {
        let executor = MemoryExecutor::new();
        executor.push_rows(MemoryRows::new(["a"]).row(vec![Value::Int(1)]));

        let mut cursor = executor.query("select a", &[Value::Int(9)]).await.unwrap();
        assert_eq!(cursor.columns(), &["a".to_string()]);
        assert!(cursor.next().unwrap());

        let mut target = crate::scratch::ScratchValue::new();
        cursor.scan(&mut [&mut target]).unwrap();
        assert_eq!(target.raw(), &Value::Int(1));
        assert!(!cursor.next().unwrap());

        let last = executor.last().unwrap();
        assert_eq!(last.kind, CallKind::Query);
        assert_eq!(last.args, vec![Value::Int(9)]);
    }

    #[tokio::test]
    async fn scan_checks_target_count() {
        let executor = MemoryExecutor::new();
        executor.push_rows(MemoryRows::new(["a", "b"]).row(vec![Value::Int(1), Value::Int(2)]));
        let mut cursor = executor.query("select a, b", &[]).await.unwrap();
        cursor.next().unwrap();
        let mut only = crate::client::Discard;
        let err = cursor.scan(&mut [&mut only]).unwrap_err();
        assert!(matches!(err, OrmError::Validation(_)));
    }

    #[tokio::test]
    async fn failures_are_driver_errors() {
        let executor = MemoryExecutor::new();
        executor.fail_next("connection reset");
        let err = executor.execute("delete from t", &[]).await.unwrap_err();
        assert!(matches!(err, OrmError::Driver(_)));
        assert_eq!(err.to_string(), "Driver error: connection reset");

        let outcome = executor.execute("delete from t", &[]).await.unwrap();
        assert_eq!(outcome, ExecOutcome::default());
    }

    #[tokio::test]
    async fn closed_cursor_is_exhausted() {
        let executor = MemoryExecutor::new();
        executor.push_rows(MemoryRows::new(["a"]).row(vec![Value::Int(1)]));
        let mut cursor = executor.query("select a", &[]).await.unwrap();
        cursor.close().unwrap();
        assert!(cursor.is_closed());
        assert!(!cursor.next().unwrap());
    }
}
