//! Row materialization.
//!
//! Drives a [`RowCursor`], resolves the column mapping for the destination
//! record type and copies each mapped column into its field. Unmapped columns
//! are scanned and dropped; fields without a column keep their value.

use crate::client::{Discard, RowCursor, ScanTarget};
use crate::config::FieldNameResolver;
use crate::error::{OrmError, OrmResult};
use crate::mapping::{Mapping, MappingCache, MappingKey, OpKind};
use crate::record::{FieldSlot, Record, RecordCollection, RecordDescriptor};
use crate::scratch::{ScratchPool, ScratchRow};
use crate::value::Value;
use std::any::TypeId;
use std::sync::Arc;

/// Per-call view of the engine state needed to map rows for one statement.
#[derive(Debug, Clone, Copy)]
pub struct Materializer<'a> {
    cache: &'a MappingCache,
    pool: &'a ScratchPool,
    resolver: &'a FieldNameResolver,
    raw_scan: bool,
    sql: &'a str,
}

impl<'a> Materializer<'a> {
    pub fn new(
        cache: &'a MappingCache,
        pool: &'a ScratchPool,
        resolver: &'a FieldNameResolver,
        raw_scan: bool,
        sql: &'a str,
    ) -> Self {
        Self {
            cache,
            pool,
            resolver,
            raw_scan,
            sql,
        }
    }

    /// Map the first row into `record`. Returns `false` (record untouched) when
    /// the cursor has no rows.
    pub fn fetch_one(&self, cursor: &mut dyn RowCursor, record: &mut dyn Record) -> OrmResult<bool> {
        let columns = lower_columns(cursor);
        let mapping = self.resolve(record.type_key(), record.record_descriptor(), &columns);

        if !cursor.next()? {
            cursor.close()?;
            return Ok(false);
        }

        let mut scratch = (!self.raw_scan).then(|| self.pool.acquire(columns.len()));
        self.scan_row(cursor, &columns, &mapping, record, scratch.as_mut())?;
        cursor.close()?;
        Ok(true)
    }

    /// Replace the contents of `collection` with one record per row, in cursor
    /// order. Returns the number of rows mapped.
    pub fn fetch_all<C>(&self, cursor: &mut dyn RowCursor, collection: &mut C) -> OrmResult<usize>
    where
        C: RecordCollection + ?Sized,
    {
        collection.clear_records();

        let columns = lower_columns(cursor);
        let mapping = self.resolve(
            TypeId::of::<C::Item>(),
            <C::Item as Record>::descriptor(),
            &columns,
        );

        let mut scratch = (!self.raw_scan).then(|| self.pool.acquire(columns.len()));
        while cursor.next()? {
            let mut item = C::Item::default();
            self.scan_row(cursor, &columns, &mapping, &mut item, scratch.as_mut())?;
            collection.push_record(item);
        }
        cursor.close()?;
        Ok(collection.record_count())
    }

    // A cursor without columns has nothing to map; caching its empty mapping
    // would hide the real columns of later executions.
    fn resolve(
        &self,
        type_id: TypeId,
        descriptor: &RecordDescriptor,
        columns: &[String],
    ) -> Arc<Mapping> {
        if columns.is_empty() {
            return Arc::new(Mapping::default());
        }
        let key = MappingKey::new(OpKind::Select, self.sql, type_id);
        self.cache
            .resolve_select(key, descriptor, columns, self.resolver)
    }

    fn scan_row(
        &self,
        cursor: &mut dyn RowCursor,
        columns: &[String],
        mapping: &Mapping,
        record: &mut dyn Record,
        scratch: Option<&mut ScratchRow<'_>>,
    ) -> OrmResult<()> {
        match scratch {
            Some(row) => scan_coerced(cursor, columns, mapping, record, row),
            None => scan_raw(cursor, columns, mapping, record),
        }
    }
}

fn lower_columns(cursor: &dyn RowCursor) -> Vec<String> {
    cursor.columns().iter().map(|c| c.to_lowercase()).collect()
}

fn scan_coerced(
    cursor: &mut dyn RowCursor,
    columns: &[String],
    mapping: &Mapping,
    record: &mut dyn Record,
    row: &mut ScratchRow<'_>,
) -> OrmResult<()> {
    row.reset();
    cursor.scan(&mut row.targets())?;

    let mut slots = record.field_slots();
    for (value, column) in row.iter_mut().zip(columns) {
        let Some(index) = mapping.index_of(column) else {
            continue;
        };
        if let Some(Some(slot)) = slots.get_mut(index) {
            value.apply_to(&mut **slot);
        }
    }
    Ok(())
}

enum RawTarget<'r> {
    Field {
        column: &'r str,
        slot: &'r mut dyn FieldSlot,
    },
    Discard(Discard),
}

impl ScanTarget for RawTarget<'_> {
    fn scan(&mut self, raw: Value) -> OrmResult<()> {
        match self {
            Self::Field { column, slot } => slot.scan_raw(raw).map_err(|kind| {
                OrmError::decode(
                    *column,
                    format!("cannot store {kind} value in {}", slot.type_name()),
                )
            }),
            Self::Discard(discard) => discard.scan(raw),
        }
    }
}

fn scan_raw(
    cursor: &mut dyn RowCursor,
    columns: &[String],
    mapping: &Mapping,
    record: &mut dyn Record,
) -> OrmResult<()> {
    let mut slots = record.field_slots();
    let mut targets: Vec<RawTarget<'_>> = columns
        .iter()
        .map(|column| {
            let slot = mapping
                .index_of(column)
                .and_then(|index| slots.get_mut(index))
                .and_then(Option::take);
            match slot {
                Some(slot) => RawTarget::Field { column, slot },
                None => RawTarget::Discard(Discard),
            }
        })
        .collect();

    let mut refs: Vec<&mut dyn ScanTarget> = targets
        .iter_mut()
        .map(|t| t as &mut dyn ScanTarget)
        .collect();
    cursor.scan(&mut refs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::User;
    use crate::testing::{MemoryCursor, MemoryRows};

    struct Engine {
        cache: MappingCache,
        pool: ScratchPool,
        resolver: FieldNameResolver,
    }

    impl Engine {
        fn new() -> Self {
            Self {
                cache: MappingCache::new(),
                pool: ScratchPool::default(),
                resolver: FieldNameResolver::default(),
            }
        }

        fn materializer(&self, raw_scan: bool) -> Materializer<'_> {
            Materializer::new(&self.cache, &self.pool, &self.resolver, raw_scan, "select * from users")
        }
    }

    fn cursor(rows: MemoryRows) -> MemoryCursor {
        MemoryCursor::new(rows)
    }

    #[test]
    fn fetch_one_populates_exactly_mapped_fields() {
        let engine = Engine::new();
        let mut c = cursor(
            MemoryRows::new(["ID", "Name", "ignored"])
                .row(vec![Value::Int(1), Value::Text("alice".into()), Value::Int(5)]),
        );
        let mut user = User {
            age: 99,
            ..User::default()
        };
        assert!(engine.materializer(false).fetch_one(&mut c, &mut user).unwrap());
        assert_eq!(user.id, 1);
        assert_eq!(user.name, "alice");
        assert_eq!(user.age, 99);
        assert!(c.is_closed());
        assert_eq!(engine.pool.idle(), 1);
    }

    #[test]
    fn fetch_one_without_rows_leaves_record_untouched() {
        let engine = Engine::new();
        let mut c = cursor(MemoryRows::new(["id", "name"]));
        let mut user = User {
            id: 3,
            name: "keep".into(),
            age: 4,
        };
        let before = user.clone();
        assert!(!engine.materializer(false).fetch_one(&mut c, &mut user).unwrap());
        assert_eq!(user, before);
    }

    #[test]
    fn fetch_all_truncates_and_appends_in_order() {
        let engine = Engine::new();
        let mut c = cursor(
            MemoryRows::new(["id", "age"])
                .row(vec![Value::Int(1), Value::Text("20".into())])
                .row(vec![Value::Int(2), Value::Float(30.7)]),
        );
        let mut users = vec![User::default(); 5];
        let count = engine.materializer(false).fetch_all(&mut c, &mut users).unwrap();
        assert_eq!(count, 2);
        assert_eq!(users.iter().map(|u| (u.id, u.age)).collect::<Vec<_>>(), vec![(1, 20), (2, 30)]);
    }

    #[test]
    fn fetch_all_without_rows_empties_collection() {
        let engine = Engine::new();
        let mut c = cursor(MemoryRows::new(["id"]));
        let mut users: Vec<Arc<User>> = vec![Arc::new(User::default())];
        let count = engine.materializer(false).fetch_all(&mut c, &mut users).unwrap();
        assert_eq!(count, 0);
        assert!(users.is_empty());
    }

    #[test]
    fn coercion_is_lenient() {
        let engine = Engine::new();
        let mut c = cursor(
            MemoryRows::new(["id", "name", "age"]).row(vec![
                Value::Text("abc".into()),
                Value::Int(7),
                Value::Null,
            ]),
        );
        let mut user = User {
            age: 12,
            ..User::default()
        };
        engine.materializer(false).fetch_one(&mut c, &mut user).unwrap();
        assert_eq!(user.id, 0);
        assert_eq!(user.name, "7");
        assert_eq!(user.age, 0);
    }

    #[test]
    fn raw_scan_stores_exact_kinds() {
        let engine = Engine::new();
        let mut c = cursor(
            MemoryRows::new(["id", "name", "other"]).row(vec![
                Value::Int(8),
                Value::Text("bob".into()),
                Value::Bool(true),
            ]),
        );
        let mut user = User::default();
        engine.materializer(true).fetch_one(&mut c, &mut user).unwrap();
        assert_eq!(user.id, 8);
        assert_eq!(user.name, "bob");
        assert_eq!(engine.pool.idle(), 0);
    }

    #[test]
    fn raw_scan_mismatch_names_the_column() {
        let engine = Engine::new();
        let mut c = cursor(MemoryRows::new(["id"]).row(vec![Value::Text("8".into())]));
        let mut user = User::default();
        let err = engine.materializer(true).fetch_one(&mut c, &mut user).unwrap_err();
        match err {
            OrmError::Decode { column, message } => {
                assert_eq!(column, "id");
                assert!(message.contains("text"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn cursors_without_columns_are_not_cached() {
        let engine = Engine::new();
        let mut c = cursor(MemoryRows::default());
        let mut user = User::default();
        assert!(!engine.materializer(false).fetch_one(&mut c, &mut user).unwrap());
        assert!(engine.cache.is_empty());
    }

    #[test]
    fn mapping_is_shared_between_fetches() {
        let engine = Engine::new();
        for _ in 0..3 {
            let mut c = cursor(MemoryRows::new(["id"]).row(vec![Value::Int(1)]));
            let mut user = User::default();
            engine.materializer(false).fetch_one(&mut c, &mut user).unwrap();
        }
        assert_eq!(engine.cache.len(), 1);
    }
}
