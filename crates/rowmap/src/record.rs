//! Record capability and destination shapes.
//!
//! Any type the engine fills or reads from must implement [`Record`]. The
//! `#[derive(Record)]` macro generates the implementation from the struct
//! definition; hand-written implementations follow the same pattern:
//!
//! ```ignore
//! use rowmap::Record;
//!
//! #[derive(Debug, Default, Record)]
//! struct User {
//!     #[orm(db = "id")]
//!     id: i64,
//!     #[orm(db = "user_name")]
//!     name: String,
//!     #[orm(skip)]
//!     cache: Vec<String>,
//! }
//! ```

use crate::error::OrmResult;
use crate::materialize::Materializer;
use crate::scratch::ScratchValue;
use crate::client::RowCursor;
use crate::value::{Timestamp, Value, ValueKind};
use chrono::NaiveDateTime;
use std::any::TypeId;
use std::sync::Arc;

/// Static description of one record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Rust field name.
    pub name: &'static str,
    /// `key = "value"` pairs from `#[orm(...)]`.
    pub tags: &'static [(&'static str, &'static str)],
}

impl FieldDescriptor {
    /// Look up a tag value by key.
    pub fn tag(&self, key: &str) -> Option<&'static str> {
        self.tags
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
    }
}

/// Static description of a record type: its name and fields in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordDescriptor {
    pub type_name: &'static str,
    pub fields: &'static [FieldDescriptor],
}

/// A typed aggregate of fields that rows can be mapped into and statements
/// can be bound from.
///
/// Field indices are positions in [`RecordDescriptor::fields`].
pub trait Record: Send + Sync + 'static {
    /// The descriptor for this record type.
    fn descriptor() -> &'static RecordDescriptor
    where
        Self: Sized;

    /// Same as [`Record::descriptor`], callable through `dyn Record`.
    fn record_descriptor(&self) -> &'static RecordDescriptor;

    /// Read a field as a bound argument. `None` for out-of-range indices.
    fn field_value(&self, index: usize) -> Option<Value>;

    /// Mutable slots for every field, indexed like the descriptor.
    ///
    /// `#[orm(skip)]` fields are not in the descriptor and have no slot. A
    /// hand-written impl may yield `None` for a field the engine must leave
    /// untouched.
    fn field_slots(&mut self) -> Vec<Option<&mut dyn FieldSlot>>;

    /// Type identity used in mapping cache keys.
    fn type_key(&self) -> TypeId {
        TypeId::of::<Self>()
    }
}

/// A destination field the engine can write into.
pub trait FieldSlot {
    /// Store the lenient coercion of `value`.
    ///
    /// Text and byte slots may move the payload out of `value`.
    fn assign(&mut self, value: &mut ScratchValue);

    /// Store `raw` without coercion.
    ///
    /// Returns the offending kind when the value is not directly acceptable.
    fn scan_raw(&mut self, raw: Value) -> Result<(), ValueKind>;

    /// Name of the slot type, for error messages.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

macro_rules! impl_int_slot {
    ($($t:ty => $coerce:ident),* $(,)?) => {
        $(
            impl FieldSlot for $t {
                fn assign(&mut self, value: &mut ScratchValue) {
                    *self = value.$coerce() as $t;
                }

                fn scan_raw(&mut self, raw: Value) -> Result<(), ValueKind> {
                    match raw {
                        Value::Int(v) => {
                            *self = <$t>::try_from(v).map_err(|_| ValueKind::Int)?;
                            Ok(())
                        }
                        other => Err(other.kind()),
                    }
                }
            }
        )*
    };
}

impl_int_slot!(
    i8 => to_i64,
    i16 => to_i64,
    i32 => to_i64,
    i64 => to_i64,
    isize => to_i64,
    u8 => to_u64,
    u16 => to_u64,
    u32 => to_u64,
    u64 => to_u64,
    usize => to_u64,
);

impl FieldSlot for f64 {
    fn assign(&mut self, value: &mut ScratchValue) {
        *self = value.to_f64();
    }

    fn scan_raw(&mut self, raw: Value) -> Result<(), ValueKind> {
        match raw {
            Value::Float(v) => {
                *self = v;
                Ok(())
            }
            other => Err(other.kind()),
        }
    }
}

impl FieldSlot for f32 {
    fn assign(&mut self, value: &mut ScratchValue) {
        *self = value.to_f64() as f32;
    }

    fn scan_raw(&mut self, raw: Value) -> Result<(), ValueKind> {
        match raw {
            Value::Float(v) => {
                *self = v as f32;
                Ok(())
            }
            other => Err(other.kind()),
        }
    }
}

impl FieldSlot for bool {
    fn assign(&mut self, value: &mut ScratchValue) {
        *self = value.to_bool();
    }

    fn scan_raw(&mut self, raw: Value) -> Result<(), ValueKind> {
        match raw {
            Value::Bool(v) => {
                *self = v;
                Ok(())
            }
            other => Err(other.kind()),
        }
    }
}

impl FieldSlot for String {
    fn assign(&mut self, value: &mut ScratchValue) {
        *self = value.take_text();
    }

    fn scan_raw(&mut self, raw: Value) -> Result<(), ValueKind> {
        match raw {
            Value::Text(v) => {
                *self = v;
                Ok(())
            }
            other => Err(other.kind()),
        }
    }
}

impl FieldSlot for Vec<u8> {
    fn assign(&mut self, value: &mut ScratchValue) {
        *self = value.take_bytes();
    }

    fn scan_raw(&mut self, raw: Value) -> Result<(), ValueKind> {
        match raw {
            Value::Bytes(v) => {
                *self = v;
                Ok(())
            }
            other => Err(other.kind()),
        }
    }
}

impl FieldSlot for Timestamp {
    fn assign(&mut self, value: &mut ScratchValue) {
        *self = value.to_time();
    }

    fn scan_raw(&mut self, raw: Value) -> Result<(), ValueKind> {
        match raw {
            Value::Timestamp(v) => {
                *self = v;
                Ok(())
            }
            other => Err(other.kind()),
        }
    }
}

impl FieldSlot for NaiveDateTime {
    fn assign(&mut self, value: &mut ScratchValue) {
        *self = value.to_time().naive_utc();
    }

    fn scan_raw(&mut self, raw: Value) -> Result<(), ValueKind> {
        match raw {
            Value::Timestamp(v) => {
                *self = v.naive_utc();
                Ok(())
            }
            other => Err(other.kind()),
        }
    }
}

// NULL maps to `None`; anything else goes through the inner slot.
impl<T: FieldSlot + Default> FieldSlot for Option<T> {
    fn assign(&mut self, value: &mut ScratchValue) {
        if value.is_null() {
            *self = None;
            return;
        }
        let mut inner = T::default();
        inner.assign(value);
        *self = Some(inner);
    }

    fn scan_raw(&mut self, raw: Value) -> Result<(), ValueKind> {
        if raw.is_null() {
            *self = None;
            return Ok(());
        }
        let mut inner = T::default();
        inner.scan_raw(raw)?;
        *self = Some(inner);
        Ok(())
    }
}

/// Whether a destination is one record or a collection of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Single,
    Collection,
}

/// Normalized description of a destination: its kind, the underlying record
/// type, and whether collection elements are shared pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    pub kind: ShapeKind,
    pub record: &'static RecordDescriptor,
    pub element_is_reference: bool,
}

/// A growable sequence of records filled by `fetch_many`.
pub trait RecordCollection: Send {
    /// The record type of each element.
    type Item: Record + Default;

    /// Whether elements are stored behind a pointer.
    const ELEMENT_IS_REFERENCE: bool;

    /// Drop every element.
    fn clear_records(&mut self);

    /// Append one record at the end.
    fn push_record(&mut self, item: Self::Item);

    /// Number of elements.
    fn record_count(&self) -> usize;
}

impl<T: Record + Default> RecordCollection for Vec<T> {
    type Item = T;
    const ELEMENT_IS_REFERENCE: bool = false;

    fn clear_records(&mut self) {
        self.clear();
    }

    fn push_record(&mut self, item: T) {
        self.push(item);
    }

    fn record_count(&self) -> usize {
        self.len()
    }
}

impl<T: Record + Default> RecordCollection for Vec<Arc<T>> {
    type Item = T;
    const ELEMENT_IS_REFERENCE: bool = true;

    fn clear_records(&mut self) {
        self.clear();
    }

    fn push_record(&mut self, item: T) {
        self.push(Arc::new(item));
    }

    fn record_count(&self) -> usize {
        self.len()
    }
}

/// Anything `Db::select` can load rows into.
///
/// Implemented for `Vec<T>` and `Vec<Arc<T>>`; `#[derive(Record)]` also
/// implements it for the record itself.
pub trait Destination: Send {
    fn shape() -> Shape
    where
        Self: Sized;

    /// Load rows from `cursor`, returning how many were mapped.
    fn load(&mut self, cursor: &mut dyn RowCursor, engine: &Materializer<'_>) -> OrmResult<usize>;
}

impl<T: Record + Default> Destination for Vec<T> {
    fn shape() -> Shape {
        collection_shape::<Self>()
    }

    fn load(&mut self, cursor: &mut dyn RowCursor, engine: &Materializer<'_>) -> OrmResult<usize> {
        engine.fetch_all(cursor, self)
    }
}

impl<T: Record + Default> Destination for Vec<Arc<T>> {
    fn shape() -> Shape {
        collection_shape::<Self>()
    }

    fn load(&mut self, cursor: &mut dyn RowCursor, engine: &Materializer<'_>) -> OrmResult<usize> {
        engine.fetch_all(cursor, self)
    }
}

/// Shape of a single record destination.
pub fn single_shape<R: Record>() -> Shape {
    Shape {
        kind: ShapeKind::Single,
        record: R::descriptor(),
        element_is_reference: false,
    }
}

/// Shape of a collection destination.
pub fn collection_shape<C: RecordCollection>() -> Shape {
    Shape {
        kind: ShapeKind::Collection,
        record: <C::Item as Record>::descriptor(),
        element_is_reference: C::ELEMENT_IS_REFERENCE,
    }
}

/// Load a single record from a cursor; used by the derived `Destination` impl.
#[doc(hidden)]
pub fn load_single<R: Record>(
    record: &mut R,
    cursor: &mut dyn RowCursor,
    engine: &Materializer<'_>,
) -> OrmResult<usize> {
    engine.fetch_one(cursor, record).map(usize::from)
}
