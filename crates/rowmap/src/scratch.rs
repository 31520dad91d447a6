//! Typed scratch values and their pool.
//!
//! A [`ScratchValue`] holds one column's raw driver value for the duration of a
//! single row scan and coerces it into whatever the destination field needs.
//! Coercion is lenient: unparseable text becomes the zero value instead of an
//! error.

use crate::client::ScanTarget;
use crate::error::OrmResult;
use crate::record::FieldSlot;
use crate::value::{Timestamp, Value};
use chrono::{NaiveDateTime, SecondsFormat, TimeZone, Utc};
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};

/// Layout accepted when coercing text into a timestamp.
pub const TEXT_TIME_LAYOUT: &str = "%Y-%m-%d %H:%M:%S";

/// The value every timestamp coercion falls back to.
pub fn zero_timestamp() -> Timestamp {
    Timestamp::default()
}

/// Reusable holder for one scanned column value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScratchValue {
    raw: Value,
}

impl ScratchValue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a driver value, replacing whatever was held before.
    pub fn scan(&mut self, raw: Value) {
        self.raw = raw;
    }

    /// Reset to NULL.
    pub fn clear(&mut self) {
        self.raw = Value::Null;
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn is_null(&self) -> bool {
        self.raw.is_null()
    }

    pub fn to_i64(&self) -> i64 {
        match &self.raw {
            Value::Int(v) => *v,
            Value::Float(v) => *v as i64,
            Value::Bool(v) => i64::from(*v),
            Value::Text(s) => parse_i64(s),
            Value::Bytes(b) => std::str::from_utf8(b).map(parse_i64).unwrap_or(0),
            Value::Timestamp(_) | Value::Null => 0,
        }
    }

    pub fn to_u64(&self) -> u64 {
        self.to_i64() as u64
    }

    pub fn to_f64(&self) -> f64 {
        match &self.raw {
            Value::Int(v) => *v as f64,
            Value::Float(v) => *v,
            Value::Bool(v) => f64::from(u8::from(*v)),
            Value::Text(s) => s.parse().unwrap_or(0.0),
            Value::Bytes(b) => std::str::from_utf8(b)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.0),
            Value::Timestamp(_) | Value::Null => 0.0,
        }
    }

    pub fn to_bool(&self) -> bool {
        match &self.raw {
            Value::Int(v) => *v != 0,
            Value::Float(v) => (*v as i64) != 0,
            Value::Bool(v) => *v,
            Value::Text(s) => truthy(s.as_bytes()),
            Value::Bytes(b) => truthy(b),
            Value::Timestamp(_) | Value::Null => false,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match &self.raw {
            Value::Bytes(b) => b.clone(),
            Value::Null => Vec::new(),
            _ => self.to_text().into_bytes(),
        }
    }

    pub fn to_text(&self) -> String {
        match &self.raw {
            Value::Null => String::new(),
            Value::Int(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Bool(v) => v.to_string(),
            Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            Value::Text(s) => s.clone(),
            Value::Timestamp(t) => t.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        }
    }

    pub fn to_time(&self) -> Timestamp {
        match &self.raw {
            Value::Int(secs) => Utc
                .timestamp_opt(*secs, 0)
                .single()
                .unwrap_or_else(zero_timestamp),
            Value::Text(s) => parse_time(s),
            Value::Bytes(b) => std::str::from_utf8(b)
                .map(parse_time)
                .unwrap_or_else(|_| zero_timestamp()),
            Value::Timestamp(t) => *t,
            Value::Float(_) | Value::Bool(_) | Value::Null => zero_timestamp(),
        }
    }

    /// [`ScratchValue::to_text`], moving a held text payload out instead of
    /// cloning it. The value is spent afterwards.
    pub fn take_text(&mut self) -> String {
        if let Value::Text(s) = &mut self.raw {
            return std::mem::take(s);
        }
        self.to_text()
    }

    /// [`ScratchValue::to_bytes`], moving a held byte payload out instead of
    /// cloning it. The value is spent afterwards.
    pub fn take_bytes(&mut self) -> Vec<u8> {
        match &mut self.raw {
            Value::Bytes(b) => return std::mem::take(b),
            Value::Text(s) => return std::mem::take(s).into_bytes(),
            _ => {}
        }
        self.to_bytes()
    }

    /// Write the coerced value into a destination field.
    pub fn apply_to(&mut self, slot: &mut dyn FieldSlot) {
        slot.assign(self);
    }
}

impl ScanTarget for ScratchValue {
    fn scan(&mut self, raw: Value) -> OrmResult<()> {
        ScratchValue::scan(self, raw);
        Ok(())
    }
}

fn parse_i64(s: &str) -> i64 {
    if s.contains('.') {
        s.parse::<f64>().map(|v| v as i64).unwrap_or(0)
    } else {
        s.parse().unwrap_or(0)
    }
}

fn truthy(b: &[u8]) -> bool {
    !matches!(b, b"" | b"0" | b"false")
}

fn parse_time(s: &str) -> Timestamp {
    NaiveDateTime::parse_from_str(s, TEXT_TIME_LAYOUT)
        .map(|t| t.and_utc())
        .unwrap_or_else(|_| zero_timestamp())
}

/// Pool of scratch rows.
///
/// Each acquired [`ScratchRow`] is exclusively owned by one materialization
/// call; dropping it clears every value and hands the buffer back.
#[derive(Debug)]
pub struct ScratchPool {
    inner: Mutex<Vec<Vec<ScratchValue>>>,
    max_idle: usize,
}

impl Default for ScratchPool {
    fn default() -> Self {
        Self::new(64)
    }
}

impl ScratchPool {
    /// Create a pool that keeps at most `max_idle` released buffers.
    pub fn new(max_idle: usize) -> Self {
        Self {
            inner: Mutex::new(Vec::new()),
            max_idle,
        }
    }

    /// Take a row buffer with `columns` NULL scratch values.
    pub fn acquire(&self, columns: usize) -> ScratchRow<'_> {
        let mut values = self.inner.lock().pop().unwrap_or_default();
        values.resize_with(columns, ScratchValue::default);
        ScratchRow { pool: self, values }
    }

    /// Number of buffers waiting for reuse.
    pub fn idle(&self) -> usize {
        self.inner.lock().len()
    }

    fn release(&self, mut values: Vec<ScratchValue>) {
        values.clear();
        let mut idle = self.inner.lock();
        if idle.len() < self.max_idle {
            idle.push(values);
        }
    }
}

/// A pooled row of scratch values.
#[derive(Debug)]
pub struct ScratchRow<'a> {
    pool: &'a ScratchPool,
    values: Vec<ScratchValue>,
}

impl ScratchRow<'_> {
    /// Reset every value to NULL before the next row.
    pub fn reset(&mut self) {
        self.values.iter_mut().for_each(ScratchValue::clear);
    }

    /// Borrow every value as a scan target, in column order.
    pub fn targets(&mut self) -> Vec<&mut dyn ScanTarget> {
        self.values
            .iter_mut()
            .map(|v| v as &mut dyn ScanTarget)
            .collect()
    }
}

impl Deref for ScratchRow<'_> {
    type Target = [ScratchValue];

    fn deref(&self) -> &Self::Target {
        &self.values
    }
}

impl DerefMut for ScratchRow<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.values
    }
}

impl Drop for ScratchRow<'_> {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.values));
    }
}
