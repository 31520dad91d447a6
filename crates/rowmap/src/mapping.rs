//! Column-to-field mapping cache.
//!
//! Entries are keyed by (operation, statement text, record type) and never
//! evicted. Concurrent first-time builders may both build an entry; the
//! results are equivalent and the last insert wins.

use crate::config::FieldNameResolver;
use crate::error::OrmResult;
use crate::record::RecordDescriptor;
use dashmap::DashMap;
use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Operation a mapping was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl OpKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MappingKey {
    pub op: OpKind,
    pub sql: String,
    pub type_id: TypeId,
}

impl MappingKey {
    pub fn new(op: OpKind, sql: impl Into<String>, type_id: TypeId) -> Self {
        Self {
            op,
            sql: sql.into(),
            type_id,
        }
    }
}

/// A published mapping entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mapping {
    /// Finalized statement head (insert/update only).
    pub sql_head: Option<String>,
    /// Ordered external names. For heads this is the bound field list.
    pub field_names: Vec<String>,
    /// Lower-cased external name to record field index.
    pub field_indexes: HashMap<String, usize>,
}

impl Mapping {
    /// Field index mapped to `column` (already lower-cased).
    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.field_indexes.get(column).copied()
    }

    /// Field indices of the head field list, in order.
    ///
    /// Names without a record field are skipped.
    pub fn bound_indexes(&self) -> impl Iterator<Item = usize> + '_ {
        self.field_names
            .iter()
            .filter_map(|name| self.field_indexes.get(name).copied())
    }
}

/// Concurrent mapping cache shared by a database handle and its scoped and
/// prepared handles.
#[derive(Debug, Default)]
pub struct MappingCache {
    entries: DashMap<MappingKey, Arc<Mapping>>,
}

impl MappingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &MappingKey) -> Option<Arc<Mapping>> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Mapping from result columns to the fields of `descriptor`.
    ///
    /// Columns are matched case-insensitively. When two fields resolve to the
    /// same column, the later field wins.
    pub fn resolve_select(
        &self,
        key: MappingKey,
        descriptor: &RecordDescriptor,
        columns: &[String],
        resolver: &FieldNameResolver,
    ) -> Arc<Mapping> {
        if let Some(found) = self.get(&key) {
            return found;
        }

        let present: HashSet<String> = columns.iter().map(|c| c.to_lowercase()).collect();
        let mut mapping = Mapping::default();
        for (index, field) in descriptor.fields.iter().enumerate() {
            let Some(name) = resolver.resolve(field) else {
                continue;
            };
            if present.contains(&name) {
                if mapping.field_indexes.insert(name.clone(), index).is_none() {
                    mapping.field_names.push(name);
                }
            }
        }

        self.publish(key, descriptor, mapping)
    }

    /// Cached entry for `key`, building it with `build` on a miss.
    ///
    /// A failed build publishes nothing.
    pub fn get_or_try_insert_with<F>(
        &self,
        key: MappingKey,
        descriptor: &RecordDescriptor,
        build: F,
    ) -> OrmResult<Arc<Mapping>>
    where
        F: FnOnce() -> OrmResult<Mapping>,
    {
        if let Some(found) = self.get(&key) {
            return Ok(found);
        }
        let mapping = build()?;
        Ok(self.publish(key, descriptor, mapping))
    }

    fn publish(&self, key: MappingKey, descriptor: &RecordDescriptor, mapping: Mapping) -> Arc<Mapping> {
        tracing::trace!(
            target: "rowmap.mapping",
            op = %key.op,
            record = descriptor.type_name,
            fields = mapping.field_indexes.len(),
            "mapping built"
        );
        let mapping = Arc::new(mapping);
        self.entries.insert(key, Arc::clone(&mapping));
        mapping
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
