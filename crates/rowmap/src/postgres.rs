//! PostgreSQL adapter.
//!
//! Implements [`Executor`] for `tokio_postgres::Client`,
//! `tokio_postgres::Transaction` and (feature `pool`) pooled
//! `deadpool_postgres::Client`s and their transactions. Queries are prepared
//! first so the cursor reports column names even when no rows come back.

use crate::client::{check_scan_arity, ExecOutcome, Executor, RowCursor, ScanTarget};
use crate::error::{OrmError, OrmResult};
use crate::value::{Timestamp, Value};
use bytes::BytesMut;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat};
use rust_decimal::Decimal;
use std::error::Error;
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, ToSql, Type, WrongType};
use tokio_postgres::{GenericClient, Row, Statement, Transaction};
use uuid::Uuid;

type BoxError = Box<dyn Error + Sync + Send>;

fn is_text(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN
    )
}

fn wrong_type(ty: &Type) -> BoxError {
    Box::new(WrongType::new::<Value>(ty.clone()))
}

// NULL binds to any parameter type; every other value is checked against the
// parameter type here and rejected with `WrongType` when it has no encoding.
impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Int(v) => match *ty {
                Type::CHAR => i8::try_from(*v)?.to_sql(ty, out),
                Type::INT2 => i16::try_from(*v)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*v)?.to_sql(ty, out),
                Type::INT8 => v.to_sql(ty, out),
                Type::OID => u32::try_from(*v)?.to_sql(ty, out),
                Type::FLOAT4 => (*v as f32).to_sql(ty, out),
                Type::FLOAT8 => (*v as f64).to_sql(ty, out),
                Type::NUMERIC => Decimal::from(*v).to_sql(ty, out),
                Type::BOOL => (*v != 0).to_sql(ty, out),
                _ if is_text(ty) => v.to_string().to_sql(ty, out),
                _ => Err(wrong_type(ty)),
            },
            Value::Float(v) => match *ty {
                Type::FLOAT4 => (*v as f32).to_sql(ty, out),
                Type::FLOAT8 => v.to_sql(ty, out),
                Type::NUMERIC => Decimal::try_from(*v)?.to_sql(ty, out),
                _ if is_text(ty) => v.to_string().to_sql(ty, out),
                _ => Err(wrong_type(ty)),
            },
            Value::Bool(v) => match *ty {
                Type::BOOL => v.to_sql(ty, out),
                _ if is_text(ty) => v.to_string().to_sql(ty, out),
                _ => Err(wrong_type(ty)),
            },
            Value::Bytes(v) => match *ty {
                Type::BYTEA => v.to_sql(ty, out),
                _ => Err(wrong_type(ty)),
            },
            Value::Text(v) => match *ty {
                Type::NUMERIC => v.trim().parse::<Decimal>()?.to_sql(ty, out),
                Type::UUID => v.trim().parse::<Uuid>()?.to_sql(ty, out),
                Type::JSON | Type::JSONB => {
                    serde_json::from_str::<serde_json::Value>(v)?.to_sql(ty, out)
                }
                _ if is_text(ty) => v.as_str().to_sql(ty, out),
                _ => Err(wrong_type(ty)),
            },
            Value::Timestamp(v) => match *ty {
                Type::TIMESTAMPTZ => v.to_sql(ty, out),
                Type::TIMESTAMP => v.naive_utc().to_sql(ty, out),
                Type::DATE => v.date_naive().to_sql(ty, out),
                _ if is_text(ty) => v
                    .to_rfc3339_opts(SecondsFormat::AutoSi, true)
                    .to_sql(ty, out),
                _ => Err(wrong_type(ty)),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

// NUMERIC, UUID, JSON and TIME columns arrive as text so the lenient
// coercions can still read them. Other types without a variant decode as NULL.
impl<'a> FromSql<'a> for Value {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        Ok(match *ty {
            Type::BOOL => Value::Bool(bool::from_sql(ty, raw)?),
            Type::CHAR => Value::Int(i8::from_sql(ty, raw)?.into()),
            Type::INT2 => Value::Int(i16::from_sql(ty, raw)?.into()),
            Type::INT4 => Value::Int(i32::from_sql(ty, raw)?.into()),
            Type::INT8 => Value::Int(i64::from_sql(ty, raw)?),
            Type::OID => Value::Int(u32::from_sql(ty, raw)?.into()),
            Type::FLOAT4 => Value::Float(f32::from_sql(ty, raw)?.into()),
            Type::FLOAT8 => Value::Float(f64::from_sql(ty, raw)?),
            Type::NUMERIC => Value::Text(Decimal::from_sql(ty, raw)?.to_string()),
            Type::UUID => Value::Text(Uuid::from_sql(ty, raw)?.to_string()),
            Type::JSON | Type::JSONB => {
                Value::Text(serde_json::Value::from_sql(ty, raw)?.to_string())
            }
            Type::TIME => Value::Text(NaiveTime::from_sql(ty, raw)?.to_string()),
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
                Value::Text(String::from_sql(ty, raw)?)
            }
            Type::BYTEA => Value::Bytes(Vec::<u8>::from_sql(ty, raw)?),
            Type::TIMESTAMP => Value::Timestamp(NaiveDateTime::from_sql(ty, raw)?.and_utc()),
            Type::TIMESTAMPTZ => Value::Timestamp(Timestamp::from_sql(ty, raw)?),
            Type::DATE => {
                Value::Timestamp(NaiveDate::from_sql(ty, raw)?.and_time(NaiveTime::MIN).and_utc())
            }
            _ => Value::Null,
        })
    }

    fn from_sql_null(_ty: &Type) -> Result<Self, BoxError> {
        Ok(Value::Null)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

/// Cursor over the rows of one PostgreSQL query.
#[derive(Debug)]
pub struct PgCursor {
    columns: Vec<String>,
    rows: std::vec::IntoIter<Row>,
    current: Option<Row>,
}

impl PgCursor {
    pub fn new(statement: &Statement, rows: Vec<Row>) -> Self {
        Self {
            columns: statement
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect(),
            rows: rows.into_iter(),
            current: None,
        }
    }
}

impl RowCursor for PgCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next(&mut self) -> OrmResult<bool> {
        self.current = self.rows.next();
        Ok(self.current.is_some())
    }

    fn scan(&mut self, targets: &mut [&mut dyn ScanTarget]) -> OrmResult<()> {
        check_scan_arity(self.columns.len(), targets.len())?;
        let row = self
            .current
            .as_ref()
            .ok_or_else(|| OrmError::Other("scan called without a current row".to_string()))?;
        for (index, target) in targets.iter_mut().enumerate() {
            let value: Value = row
                .try_get(index)
                .map_err(|e| OrmError::decode(self.columns[index].as_str(), e.to_string()))?;
            target.scan(value)?;
        }
        Ok(())
    }

    fn close(&mut self) -> OrmResult<()> {
        self.current = None;
        self.rows = Vec::new().into_iter();
        Ok(())
    }
}

fn params(args: &[Value]) -> Vec<&(dyn ToSql + Sync)> {
    args.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
}

async fn pg_prepare<C: GenericClient + Sync>(client: &C, sql: &str) -> OrmResult<Statement> {
    Ok(client.prepare(sql).await?)
}

async fn pg_execute<C: GenericClient + Sync>(
    client: &C,
    statement: &Statement,
    args: &[Value],
) -> OrmResult<ExecOutcome> {
    let params = params(args);
    let rows_affected = client.execute(statement, &params).await?;
    Ok(ExecOutcome::new(rows_affected))
}

async fn pg_query<C: GenericClient + Sync>(
    client: &C,
    statement: &Statement,
    args: &[Value],
) -> OrmResult<PgCursor> {
    let params = params(args);
    let rows = client.query(statement, &params).await?;
    Ok(PgCursor::new(statement, rows))
}

macro_rules! impl_pg_executor {
    ($ty:ty, |$this:ident| $client:expr) => {
        impl Executor for $ty {
            type Cursor = PgCursor;
            type Statement = Statement;

            async fn execute(&self, sql: &str, args: &[Value]) -> OrmResult<ExecOutcome> {
                let $this = self;
                let client = $client;
                let params = params(args);
                let rows_affected = GenericClient::execute(client, sql, &params).await?;
                Ok(ExecOutcome::new(rows_affected))
            }

            async fn query(&self, sql: &str, args: &[Value]) -> OrmResult<PgCursor> {
                let $this = self;
                let client = $client;
                let statement = pg_prepare(client, sql).await?;
                pg_query(client, &statement, args).await
            }

            async fn prepare(&self, sql: &str) -> OrmResult<Statement> {
                let $this = self;
                pg_prepare($client, sql).await
            }

            async fn execute_prepared(
                &self,
                stmt: &Statement,
                args: &[Value],
            ) -> OrmResult<ExecOutcome> {
                let $this = self;
                pg_execute($client, stmt, args).await
            }

            async fn query_prepared(&self, stmt: &Statement, args: &[Value]) -> OrmResult<PgCursor> {
                let $this = self;
                pg_query($client, stmt, args).await
            }
        }
    };
}

impl_pg_executor!(tokio_postgres::Client, |this| this);
impl_pg_executor!(Transaction<'_>, |this| this);

#[cfg(feature = "pool")]
impl_pg_executor!(deadpool_postgres::Client, |this| {
    let client: &tokio_postgres::Client = this;
    client
});

#[cfg(feature = "pool")]
impl_pg_executor!(deadpool_postgres::Transaction<'_>, |this| {
    let tx: &Transaction<'_> = this;
    tx
});

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldSlot;
    use crate::scratch::ScratchValue;
    use chrono::TimeZone;

    fn encode(value: &Value, ty: &Type) -> Vec<u8> {
        let mut out = BytesMut::new();
        value.to_sql(ty, &mut out).unwrap();
        out.to_vec()
    }

    #[test]
    fn ints_are_narrowed_to_the_column_type() {
        assert_eq!(encode(&Value::Int(7), &Type::INT4), 7_i32.to_be_bytes());
        assert_eq!(encode(&Value::Int(7), &Type::INT2), 7_i16.to_be_bytes());
        assert_eq!(encode(&Value::Int(7), &Type::INT8), 7_i64.to_be_bytes());

        let mut out = BytesMut::new();
        assert!(Value::Int(i64::MAX).to_sql(&Type::INT4, &mut out).is_err());
    }

    #[test]
    fn null_encodes_as_null() {
        let mut out = BytesMut::new();
        assert!(matches!(
            Value::Null.to_sql(&Type::INT4, &mut out).unwrap(),
            IsNull::Yes
        ));
    }

    #[test]
    fn decodes_known_types() {
        assert_eq!(
            Value::from_sql(&Type::INT4, &42_i32.to_be_bytes()).unwrap(),
            Value::Int(42)
        );
        assert_eq!(
            Value::from_sql(&Type::TEXT, b"hello").unwrap(),
            Value::Text("hello".into())
        );
        assert_eq!(Value::from_sql(&Type::BOOL, &[1]).unwrap(), Value::Bool(true));
        assert_eq!(Value::from_sql_null(&Type::INT4).unwrap(), Value::Null);
    }

    #[test]
    fn timestamps_round_trip() {
        let t = chrono::Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        for ty in [Type::TIMESTAMPTZ, Type::TIMESTAMP] {
            let raw = encode(&Value::Timestamp(t), &ty);
            assert_eq!(Value::from_sql(&ty, &raw).unwrap(), Value::Timestamp(t));
        }
    }

    #[test]
    fn numeric_uuid_json_and_time_decode_as_text() {
        let raw = encode(&Value::Text("12.50".into()), &Type::NUMERIC);
        assert_eq!(
            Value::from_sql(&Type::NUMERIC, &raw).unwrap(),
            Value::Text("12.50".into())
        );

        assert_eq!(
            Value::from_sql(&Type::UUID, &[0; 16]).unwrap(),
            Value::Text("00000000-0000-0000-0000-000000000000".into())
        );
        assert_eq!(
            Value::from_sql(&Type::JSONB, b"\x01{\"a\": 1}").unwrap(),
            Value::Text(r#"{"a":1}"#.into())
        );
        assert_eq!(
            Value::from_sql(&Type::JSON, b"[1, 2]").unwrap(),
            Value::Text("[1,2]".into())
        );
        assert_eq!(
            Value::from_sql(&Type::TIME, &3_600_000_000_i64.to_be_bytes()).unwrap(),
            Value::Text("01:00:00".into())
        );
    }

    #[test]
    fn numeric_columns_coerce_into_float_fields() {
        let raw = encode(&Value::Float(12.5), &Type::NUMERIC);
        let mut scratch = ScratchValue::new();
        scratch.scan(Value::from_sql(&Type::NUMERIC, &raw).unwrap());

        let mut price = 0.0_f64;
        price.assign(&mut scratch);
        assert_eq!(price, 12.5);
    }

    #[test]
    fn values_are_encoded_for_the_parameter_type() {
        assert_eq!(
            encode(&Value::Int(7), &Type::NUMERIC),
            encode(&Value::Text("7".into()), &Type::NUMERIC)
        );
        assert_eq!(encode(&Value::Int(7), &Type::TEXT), b"7");
        assert_eq!(encode(&Value::Bool(true), &Type::VARCHAR), b"true");

        let t = chrono::Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        assert_eq!(encode(&Value::Timestamp(t), &Type::TEXT), b"2024-05-06T07:08:09Z");

        let id = "67e55044-10b1-426f-9247-bb680e5fe0c8";
        assert_eq!(
            encode(&Value::Text(id.into()), &Type::UUID),
            Uuid::parse_str(id).unwrap().as_bytes()
        );
        assert_eq!(encode(&Value::Text(r#"{"a":1}"#.into()), &Type::JSONB)[0], 1);
    }

    #[test]
    fn mismatched_values_are_rejected() {
        let t = chrono::Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        let cases = [
            (Value::Timestamp(t), Type::INT4),
            (Value::Bytes(vec![1, 2]), Type::TEXT),
            (Value::Bool(true), Type::INT4),
            (Value::Float(1.5), Type::INT8),
            (Value::Int(1), Type::TIMESTAMPTZ),
            (Value::Text("abc".into()), Type::UUID),
            (Value::Text("abc".into()), Type::NUMERIC),
            (Value::Text("abc".into()), Type::INT4),
        ];
        for (value, ty) in cases {
            let mut out = BytesMut::new();
            assert!(
                value.to_sql_checked(&ty, &mut out).is_err(),
                "{value:?} should not encode as {ty}"
            );
        }
    }

    #[test]
    fn unknown_types_decode_as_null() {
        assert_eq!(Value::from_sql(&Type::POINT, &[0; 16]).unwrap(), Value::Null);
    }
}
