//! Prepared statements.

use crate::client::Executor;
use crate::db::{first_of_one_type, found_or_not, split_args, Arg, Db, SplitArgs};
use crate::error::{OrmError, OrmResult};
use crate::head;
use crate::mapping::OpKind;
use crate::record::{Destination, Record, RecordCollection};
use crate::result::ExecResult;
use crate::value::Value;

/// A statement prepared on the executor of a [`Db`].
///
/// The statement text is fixed; operations only supply arguments. Mappings
/// are keyed by the statement text and shared with the owning handle.
pub struct Stmt<'db, E: Executor> {
    db: &'db Db<E>,
    statement: E::Statement,
    sql: String,
}

impl<'db, E: Executor> Stmt<'db, E> {
    pub(crate) fn new(db: &'db Db<E>, statement: E::Statement, sql: &str) -> Self {
        Self {
            db,
            statement,
            sql: sql.to_string(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn statement(&self) -> &E::Statement {
        &self.statement
    }

    pub async fn fetch_one<R: Record>(&self, record: &mut R, args: Vec<Value>) -> OrmResult<ExecResult> {
        self.db.log_sql(OpKind::Select.as_str(), &self.sql, args.len());
        let mut cursor = self.db.executor().query_prepared(&self.statement, &args).await?;
        let found = self.db.materializer(&self.sql).fetch_one(&mut cursor, record)?;
        found_or_not(found, ExecResult::new(self.sql.as_str(), args))
    }

    pub async fn fetch_many<C: RecordCollection>(
        &self,
        collection: &mut C,
        args: Vec<Value>,
    ) -> OrmResult<ExecResult> {
        self.db.log_sql(OpKind::Select.as_str(), &self.sql, args.len());
        let mut cursor = self.db.executor().query_prepared(&self.statement, &args).await?;
        let count = self.db.materializer(&self.sql).fetch_all(&mut cursor, collection)?;
        found_or_not(count > 0, ExecResult::new(self.sql.as_str(), args))
    }

    pub async fn select<D: Destination>(&self, destination: &mut D, args: Vec<Value>) -> OrmResult<ExecResult> {
        self.db.log_sql(OpKind::Select.as_str(), &self.sql, args.len());
        let mut cursor = self.db.executor().query_prepared(&self.statement, &args).await?;
        let count = destination.load(&mut cursor, &self.db.materializer(&self.sql))?;
        found_or_not(count > 0, ExecResult::new(self.sql.as_str(), args))
    }

    pub async fn insert<R: Record>(&self, records: &[R]) -> OrmResult<ExecResult> {
        let records: Vec<&dyn Record> = records.iter().map(|r| r as &dyn Record).collect();
        self.insert_records(&records).await
    }

    pub async fn insert_one<R: Record>(&self, record: &R) -> OrmResult<ExecResult> {
        self.insert_records(&[record as &dyn Record]).await
    }

    /// Bind the fields of every record, in the statement's column order.
    ///
    /// The statement must hold one placeholder per bound field and record.
    pub async fn insert_records(&self, records: &[&dyn Record]) -> OrmResult<ExecResult> {
        let first = first_of_one_type(records)?;
        let mapping = self.db.insert_mapping(&self.sql, first)?;
        let mut args = Vec::with_capacity(records.len() * mapping.field_names.len());
        for record in records {
            head::bound_values(&mapping, *record, &mut args)?;
        }
        self.run(OpKind::Insert.as_str(), args).await
    }

    pub async fn insert_values(&self, args: Vec<Value>) -> OrmResult<ExecResult> {
        self.run(OpKind::Insert.as_str(), args).await
    }

    pub async fn insert_args(&self, args: Vec<Arg<'_>>) -> OrmResult<ExecResult> {
        match split_args(args)? {
            SplitArgs::Values(values) => self.insert_values(values).await,
            SplitArgs::Records(records, values) if values.is_empty() => {
                self.insert_records(&records).await
            }
            SplitArgs::Records(..) => Err(OrmError::invalid_destination(
                "insert does not take values after records",
            )),
        }
    }

    pub async fn update_from_record<R: Record>(
        &self,
        record: &R,
        trailing: Vec<Value>,
    ) -> OrmResult<ExecResult> {
        self.update_record(record, trailing).await
    }

    async fn update_record(&self, record: &dyn Record, trailing: Vec<Value>) -> OrmResult<ExecResult> {
        let mapping = self.db.update_mapping(&self.sql, record)?;
        let mut args = Vec::with_capacity(mapping.field_names.len() + trailing.len());
        head::bound_values(&mapping, record, &mut args)?;
        args.extend(trailing);
        self.run(OpKind::Update.as_str(), args).await
    }

    pub async fn update_from_args(&self, args: Vec<Value>) -> OrmResult<ExecResult> {
        self.run(OpKind::Update.as_str(), args).await
    }

    pub async fn update(&self, args: Vec<Arg<'_>>) -> OrmResult<ExecResult> {
        match split_args(args)? {
            SplitArgs::Values(values) => self.update_from_args(values).await,
            SplitArgs::Records(records, trailing) => match records.as_slice() {
                [record] => self.update_record(*record, trailing).await,
                _ => Err(OrmError::invalid_destination(
                    "update takes exactly one record",
                )),
            },
        }
    }

    pub async fn delete(&self, args: Vec<Value>) -> OrmResult<ExecResult> {
        self.run(OpKind::Delete.as_str(), args).await
    }

    pub async fn exec(&self, args: Vec<Value>) -> OrmResult<ExecResult> {
        self.run("exec", args).await
    }

    async fn run(&self, op: &str, args: Vec<Value>) -> OrmResult<ExecResult> {
        self.db.log_sql(op, &self.sql, args.len());
        let outcome = self
            .db
            .executor()
            .execute_prepared(&self.statement, &args)
            .await?;
        Ok(ExecResult::new(self.sql.as_str(), args).with_outcome(outcome))
    }
}

impl<E: Executor> std::fmt::Debug for Stmt<'_, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stmt").field("sql", &self.sql).finish_non_exhaustive()
    }
}
