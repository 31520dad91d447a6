//! # rowmap
//!
//! A lightweight mapping layer between query results and Rust records.
//!
//! ## Features
//!
//! - **Column mapping**: result columns are matched to record fields by their
//!   external names (the `db` tag by default), case-insensitively. Mappings are
//!   cached per (operation, statement text, record type).
//! - **Lenient coercion**: column values are converted into whatever the field
//!   needs; unparseable text becomes the zero value instead of an error. Raw
//!   scan mode stores values without coercion and reports mismatches.
//! - **Head synthesis**: `insert("users", &records)` and
//!   `update("users set name=?,age=? where id=?", ...)` complete the statement
//!   from the record's fields and bind them in order.
//! - **Executor-agnostic**: everything runs through the [`Executor`] trait.
//!   `tokio_postgres` clients, transactions and pooled clients implement it;
//!   [`testing::MemoryExecutor`] runs scripted results without a database.
//!
//! ## Example
//!
//! ```ignore
//! use rowmap::{args, Db, Record};
//!
//! #[derive(Debug, Default, Record)]
//! struct User {
//!     #[orm(db = "id")]
//!     id: i64,
//!     #[orm(db = "name")]
//!     name: String,
//!     #[orm(db = "age")]
//!     age: i32,
//! }
//!
//! let db = Db::new(client);
//!
//! db.insert("users", &[User { id: 0, name: "alice".into(), age: 30 }]).await?;
//! // insert into users(id,name,age) values($1,$2,$3)
//!
//! let mut user = User::default();
//! db.fetch_one(&mut user, "select * from users where name = $1", args!["alice"]).await?;
//!
//! let mut users: Vec<User> = Vec::new();
//! db.fetch_many(&mut users, "select * from users", args![]).await?;
//! ```

// Derived impls name `::rowmap::...` paths; this makes them resolve inside the crate too.
extern crate self as rowmap;

pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod head;
pub mod mapping;
pub mod materialize;
pub mod record;
pub mod result;
pub mod scratch;
pub mod stmt;
pub mod testing;
pub mod value;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "pool")]
pub mod pool;

pub use client::{Discard, ExecOutcome, Executor, RowCursor, ScanTarget};
pub use config::{DbConfig, FieldNameResolver, Placeholder};
pub use db::{Arg, Db};
pub use error::{OptionalExt, OrmError, OrmResult};
pub use mapping::{Mapping, MappingCache, MappingKey, OpKind};
pub use materialize::Materializer;
pub use record::{
    Destination, FieldDescriptor, FieldSlot, Record, RecordCollection, RecordDescriptor, Shape,
    ShapeKind,
};
pub use result::ExecResult;
pub use scratch::{ScratchPool, ScratchValue};
pub use stmt::Stmt;
pub use value::{Timestamp, ToValue, Value, ValueKind};

#[cfg(feature = "postgres")]
pub use postgres::PgCursor;

#[cfg(feature = "pool")]
pub use pool::{create_pool, create_pool_with_config, create_pool_with_tls, pooled_db, pooled_scope};

#[cfg(feature = "derive")]
pub use rowmap_derive::Record;
