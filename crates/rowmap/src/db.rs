//! Database handle.

use crate::client::Executor;
use crate::config::{DbConfig, FieldNameResolver, Placeholder};
use crate::error::{OrmError, OrmResult};
use crate::head;
use crate::mapping::{Mapping, MappingCache, MappingKey, OpKind};
use crate::materialize::Materializer;
use crate::record::{Destination, Record, RecordCollection};
use crate::result::ExecResult;
use crate::scratch::ScratchPool;
use crate::stmt::Stmt;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// One argument of [`Db::insert_args`] / [`Db::update`].
///
/// Records are only accepted in the first position.
#[derive(Clone)]
pub enum Arg<'a> {
    Value(Value),
    Record(&'a dyn Record),
    Records(Vec<&'a dyn Record>),
}

impl<'a> Arg<'a> {
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    pub fn record(record: &'a dyn Record) -> Self {
        Self::Record(record)
    }

    pub fn records<R: Record>(records: &'a [R]) -> Self {
        Self::Records(records.iter().map(|r| r as &dyn Record).collect())
    }
}

impl From<Value> for Arg<'_> {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl fmt::Debug for Arg<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Record(r) => f
                .debug_tuple("Record")
                .field(&r.record_descriptor().type_name)
                .finish(),
            Self::Records(rs) => f.debug_tuple("Records").field(&rs.len()).finish(),
        }
    }
}

/// Leading records of an argument list, and the plain values after them.
pub(crate) enum SplitArgs<'a> {
    Values(Vec<Value>),
    Records(Vec<&'a dyn Record>, Vec<Value>),
}

pub(crate) fn split_args(args: Vec<Arg<'_>>) -> OrmResult<SplitArgs<'_>> {
    let mut iter = args.into_iter().peekable();
    let records = match iter.peek() {
        Some(Arg::Record(_)) | Some(Arg::Records(_)) => match iter.next() {
            Some(Arg::Record(r)) => Some(vec![r]),
            Some(Arg::Records(rs)) => Some(rs),
            _ => None,
        },
        _ => None,
    };

    let values = iter
        .enumerate()
        .map(|(i, arg)| match arg {
            Arg::Value(v) => Ok(v),
            _ => Err(OrmError::invalid_destination(format!(
                "record argument at position {} (records are only accepted first)",
                i + usize::from(records.is_some())
            ))),
        })
        .collect::<OrmResult<Vec<_>>>()?;

    Ok(match records {
        Some(records) => SplitArgs::Records(records, values),
        None => SplitArgs::Values(values),
    })
}

/// Mapping-aware handle over an [`Executor`].
///
/// Owns the configuration, the mapping cache and the scratch pool. Cloning the
/// handle or deriving one with [`Db::scoped`] shares the cache and the pool.
#[derive(Debug, Clone)]
pub struct Db<E> {
    executor: E,
    config: DbConfig,
    cache: Arc<MappingCache>,
    pool: Arc<ScratchPool>,
}

impl<E: Executor> Db<E> {
    /// Wrap an executor with the default configuration.
    pub fn new(executor: E) -> Self {
        Self::with_config(executor, DbConfig::default())
    }

    pub fn with_config(executor: E, config: DbConfig) -> Self {
        Self {
            executor,
            config,
            cache: Arc::new(MappingCache::new()),
            pool: Arc::new(ScratchPool::default()),
        }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn into_inner(self) -> E {
        self.executor
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub fn mapping_cache(&self) -> &MappingCache {
        &self.cache
    }

    /// A handle over another executor (typically a transaction) that shares
    /// this handle's configuration, mapping cache and scratch pool.
    pub fn scoped<T: Executor>(&self, executor: T) -> Db<T> {
        Db {
            executor,
            config: self.config.clone(),
            cache: Arc::clone(&self.cache),
            pool: Arc::clone(&self.pool),
        }
    }

    pub fn set_field_name_resolver(&mut self, resolver: FieldNameResolver) {
        self.config.resolver = resolver;
        self.invalidate_mappings("field name resolver");
    }

    pub fn set_tag(&mut self, tag: impl Into<String>) {
        self.config = std::mem::take(&mut self.config).tag(tag);
        self.invalidate_mappings("tag");
    }

    pub fn set_raw_scan(&mut self, enabled: bool) {
        self.config.raw_scan = enabled;
    }

    pub fn set_placeholder(&mut self, placeholder: Placeholder) {
        self.config.placeholder = placeholder;
        self.invalidate_mappings("placeholder");
    }

    // Existing entries were built with the old naming; start a new cache so
    // scoped handles created earlier keep a consistent view.
    fn invalidate_mappings(&mut self, what: &str) {
        if !self.cache.is_empty() {
            tracing::warn!(
                changed = what,
                entries = self.cache.len(),
                "mapping cache invalidated"
            );
        }
        self.cache = Arc::new(MappingCache::new());
    }

    pub(crate) fn materializer<'a>(&'a self, sql: &'a str) -> Materializer<'a> {
        Materializer::new(
            &self.cache,
            &self.pool,
            &self.config.resolver,
            self.config.raw_scan,
            sql,
        )
    }

    pub(crate) fn log_sql(&self, op: &str, sql: &str, arg_count: usize) {
        tracing::debug!(
            target: "rowmap.sql",
            op,
            sql = %truncate_sql(sql, self.config.log_max_sql_length),
            arg_count,
            "executing statement"
        );
    }

    pub(crate) fn insert_mapping(&self, head: &str, record: &dyn Record) -> OrmResult<Arc<Mapping>> {
        let descriptor = record.record_descriptor();
        let key = MappingKey::new(OpKind::Insert, head, record.type_key());
        self.cache.get_or_try_insert_with(key, descriptor, || {
            head::analyze_insert(head, descriptor, &self.config.resolver)
        })
    }

    pub(crate) fn update_mapping(&self, head: &str, record: &dyn Record) -> OrmResult<Arc<Mapping>> {
        let descriptor = record.record_descriptor();
        let key = MappingKey::new(OpKind::Update, head, record.type_key());
        self.cache.get_or_try_insert_with(key, descriptor, || {
            head::analyze_update(head, descriptor, &self.config.resolver, self.config.placeholder)
        })
    }

    /// Map the first row of `sql` into `record`.
    ///
    /// Fails with [`OrmError::NotFound`] (record untouched) when there are no rows.
    pub async fn fetch_one<R: Record>(
        &self,
        record: &mut R,
        sql: &str,
        args: Vec<Value>,
    ) -> OrmResult<ExecResult> {
        self.log_sql(OpKind::Select.as_str(), sql, args.len());
        let mut cursor = self.executor.query(sql, &args).await?;
        let found = self.materializer(sql).fetch_one(&mut cursor, record)?;
        found_or_not(found, ExecResult::new(sql, args))
    }

    /// Replace the contents of `collection` with every row of `sql`.
    ///
    /// Fails with [`OrmError::NotFound`] (collection emptied) when there are no rows.
    pub async fn fetch_many<C: RecordCollection>(
        &self,
        collection: &mut C,
        sql: &str,
        args: Vec<Value>,
    ) -> OrmResult<ExecResult> {
        self.log_sql(OpKind::Select.as_str(), sql, args.len());
        let mut cursor = self.executor.query(sql, &args).await?;
        let count = self.materializer(sql).fetch_all(&mut cursor, collection)?;
        found_or_not(count > 0, ExecResult::new(sql, args))
    }

    /// [`Db::fetch_one`] or [`Db::fetch_many`], chosen by the destination shape.
    pub async fn select<D: Destination>(
        &self,
        destination: &mut D,
        sql: &str,
        args: Vec<Value>,
    ) -> OrmResult<ExecResult> {
        self.log_sql(OpKind::Select.as_str(), sql, args.len());
        let mut cursor = self.executor.query(sql, &args).await?;
        let count = destination.load(&mut cursor, &self.materializer(sql))?;
        found_or_not(count > 0, ExecResult::new(sql, args))
    }

    /// Insert every record of `records` in one statement.
    pub async fn insert<R: Record>(&self, head: &str, records: &[R]) -> OrmResult<ExecResult> {
        let records: Vec<&dyn Record> = records.iter().map(|r| r as &dyn Record).collect();
        self.insert_records(head, &records).await
    }

    pub async fn insert_one<R: Record>(&self, head: &str, record: &R) -> OrmResult<ExecResult> {
        self.insert_records(head, &[record as &dyn Record]).await
    }

    /// Insert records of one type, completing `head` from their fields.
    pub async fn insert_records(
        &self,
        head: &str,
        records: &[&dyn Record],
    ) -> OrmResult<ExecResult> {
        let first = first_of_one_type(records)?;
        let mapping = self.insert_mapping(head, first)?;
        let sql_head = mapping.sql_head.as_deref().unwrap_or(head);

        let mut args = Vec::with_capacity(records.len() * mapping.field_names.len());
        for record in records {
            head::bound_values(&mapping, *record, &mut args)?;
        }
        let sql = head::insert_sql(
            sql_head,
            records.len(),
            mapping.field_names.len(),
            self.config.placeholder,
        );
        self.run(OpKind::Insert.as_str(), sql, args).await
    }

    /// Insert plain values grouped by the head's column list.
    ///
    /// Heads with literal `VALUES (...)`, or calls without arguments, run unchanged.
    pub async fn insert_values(&self, head: &str, args: Vec<Value>) -> OrmResult<ExecResult> {
        let sql_head = head::complete_insert_head(head)?;
        if args.is_empty() || head::has_literal_values(&sql_head) {
            return self.run(OpKind::Insert.as_str(), sql_head, args).await;
        }

        let columns = head::insert_columns(&sql_head)?.ok_or_else(|| {
            OrmError::malformed_head(
                OpKind::Insert,
                head,
                "a column list is required to insert plain values",
            )
        })?;
        if args.len() % columns.len() != 0 {
            return Err(OrmError::validation(format!(
                "{} values do not fill rows of {} columns",
                args.len(),
                columns.len()
            )));
        }
        let sql = head::insert_sql(
            &sql_head,
            args.len() / columns.len(),
            columns.len(),
            self.config.placeholder,
        );
        self.run(OpKind::Insert.as_str(), sql, args).await
    }

    /// Insert records (first argument) or plain values.
    pub async fn insert_args(&self, head: &str, args: Vec<Arg<'_>>) -> OrmResult<ExecResult> {
        match split_args(args)? {
            SplitArgs::Values(values) => self.insert_values(head, values).await,
            SplitArgs::Records(records, values) if values.is_empty() => {
                self.insert_records(head, &records).await
            }
            SplitArgs::Records(..) => Err(OrmError::invalid_destination(
                "insert does not take values after records",
            )),
        }
    }

    /// Update from `record`'s bound fields, followed by `trailing` arguments.
    pub async fn update_from_record<R: Record>(
        &self,
        head: &str,
        record: &R,
        trailing: Vec<Value>,
    ) -> OrmResult<ExecResult> {
        self.update_record(head, record, trailing).await
    }

    async fn update_record(
        &self,
        head: &str,
        record: &dyn Record,
        trailing: Vec<Value>,
    ) -> OrmResult<ExecResult> {
        let mapping = self.update_mapping(head, record)?;
        let sql = mapping.sql_head.clone().unwrap_or_else(|| head.to_string());

        let mut args = Vec::with_capacity(mapping.field_names.len() + trailing.len());
        head::bound_values(&mapping, record, &mut args)?;
        args.extend(trailing);
        self.run(OpKind::Update.as_str(), sql, args).await
    }

    /// Run `sql` as written.
    pub async fn update_from_args(&self, sql: &str, args: Vec<Value>) -> OrmResult<ExecResult> {
        self.run(OpKind::Update.as_str(), sql.to_string(), args).await
    }

    /// Record path when the first argument is a record, literal passthrough otherwise.
    pub async fn update(&self, head: &str, args: Vec<Arg<'_>>) -> OrmResult<ExecResult> {
        match split_args(args)? {
            SplitArgs::Values(values) => self.update_from_args(head, values).await,
            SplitArgs::Records(records, trailing) => match records.as_slice() {
                [record] => self.update_record(head, *record, trailing).await,
                _ => Err(OrmError::invalid_destination(
                    "update takes exactly one record",
                )),
            },
        }
    }

    pub async fn delete(&self, sql: &str, args: Vec<Value>) -> OrmResult<ExecResult> {
        self.run(OpKind::Delete.as_str(), sql.to_string(), args).await
    }

    pub async fn exec(&self, sql: &str, args: Vec<Value>) -> OrmResult<ExecResult> {
        self.run("exec", sql.to_string(), args).await
    }

    /// Prepare `sql` on the executor.
    pub async fn prepare(&self, sql: &str) -> OrmResult<Stmt<'_, E>> {
        let statement = self.executor.prepare(sql).await?;
        Ok(Stmt::new(self, statement, sql))
    }

    async fn run(&self, op: &str, sql: String, args: Vec<Value>) -> OrmResult<ExecResult> {
        self.log_sql(op, &sql, args.len());
        let outcome = self.executor.execute(&sql, &args).await?;
        Ok(ExecResult::new(sql, args).with_outcome(outcome))
    }
}

pub(crate) fn found_or_not(found: bool, result: ExecResult) -> OrmResult<ExecResult> {
    if found {
        Ok(result)
    } else {
        Err(OrmError::not_found(result))
    }
}

/// The first record, after checking every record has its type.
pub(crate) fn first_of_one_type<'r>(records: &[&'r dyn Record]) -> OrmResult<&'r dyn Record> {
    let first = *records
        .first()
        .ok_or_else(|| OrmError::invalid_destination("no records to insert"))?;
    let type_id = first.type_key();
    if records.iter().any(|r| r.type_key() != type_id) {
        return Err(OrmError::invalid_destination(
            "records of different types in one insert",
        ));
    }
    Ok(first)
}

fn truncate_sql(sql: &str, max: Option<usize>) -> String {
    match max {
        Some(max) if sql.len() > max => {
            let mut end = max;
            while end > 0 && !sql.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &sql[..end])
        }
        _ => sql.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::{Person, User};

    #[test]
    fn split_args_takes_leading_records() {
        let person = Person::new("a", 3);
        let split = split_args(vec![Arg::record(&person), Arg::value(7)]).unwrap();
        match split {
            SplitArgs::Records(records, values) => {
                assert_eq!(records.len(), 1);
                assert_eq!(values, vec![Value::Int(7)]);
            }
            SplitArgs::Values(_) => panic!("expected records"),
        }
    }

    #[test]
    fn split_args_rejects_misplaced_records() {
        let person = Person::new("a", 3);
        let err = split_args(vec![Arg::value(1), Arg::record(&person)])
            .err()
            .expect("a record after a value is rejected");
        assert!(err.is_invalid_destination());
    }

    #[test]
    fn mixed_record_types_are_rejected() {
        let user = User::default();
        let person = Person::default();
        let err = first_of_one_type(&[&user, &person])
            .err()
            .expect("mixed record types are rejected");
        assert!(err.is_invalid_destination());
        assert!(matches!(first_of_one_type(&[]), Err(e) if e.is_invalid_destination()));
    }

    #[test]
    fn long_sql_is_truncated_on_char_boundaries() {
        assert_eq!(truncate_sql("select 1", Some(200)), "select 1");
        assert_eq!(truncate_sql("select 1", None), "select 1");
        assert_eq!(truncate_sql("héllo", Some(2)), "h...");
    }
}
