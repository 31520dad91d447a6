//! Derive macros for rowmap
//!
//! Provides `#[derive(Record)]`.

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod record;

/// Derive `Record` (and `Destination`) for a struct with named fields.
///
/// # Example
///
/// ```ignore
/// use rowmap::Record;
///
/// #[derive(Debug, Default, Record)]
/// struct User {
///     #[orm(db = "id")]
///     id: i64,
///     #[orm(db = "user_name", json = "name")]
///     name: String,
///     #[orm(skip)]
///     scratch: Vec<String>,
/// }
/// ```
///
/// # Attributes
///
/// - `#[orm(key = "value", ...)]` - Attach tags to a field. The engine reads
///   the external column name from the configured tag key (`db` by default).
/// - `#[orm(skip)]` - Leave the field out of the record entirely.
#[proc_macro_derive(Record, attributes(orm))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    record::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
