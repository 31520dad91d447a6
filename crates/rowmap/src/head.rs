//! INSERT/UPDATE statement head analysis.
//!
//! A head is the literal prefix a caller passes to `insert` or `update`, for
//! example `users`, `users(name,age)` or `users set name=?,age=? where id=?`.
//! The analyzer completes the head and works out which record fields are bound
//! and in what order. This is string splitting, not parsing: commas or `=`
//! inside quoted literals of an assignment list are mis-split.

use crate::config::{FieldNameResolver, Placeholder};
use crate::error::{OrmError, OrmResult};
use crate::mapping::{Mapping, OpKind};
use crate::record::{Record, RecordDescriptor};
use crate::value::Value;
use std::collections::HashMap;

pub(crate) fn starts_with_keyword(s: &str, keyword: &str) -> bool {
    find_keyword(s.trim_start(), keyword) == Some(0)
}

/// Byte offset of the first whole-word, case-insensitive occurrence of `keyword`.
pub(crate) fn find_keyword(haystack: &str, keyword: &str) -> Option<usize> {
    let bytes = haystack.as_bytes();
    let len = keyword.len();
    if len == 0 || bytes.len() < len {
        return None;
    }
    (0..=bytes.len() - len).find(|&start| {
        bytes[start..start + len].eq_ignore_ascii_case(keyword.as_bytes())
            && (start == 0 || !is_word_byte(bytes[start - 1]))
            && bytes.get(start + len).is_none_or(|b| !is_word_byte(*b))
    })
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Parenthesized column list of an INSERT head, lower-cased.
///
/// Only a `(` before any `values` keyword opens a column list. Returns `None`
/// when the head has no list.
pub fn insert_columns(head: &str) -> OrmResult<Option<Vec<String>>> {
    let prefix_end = find_keyword(head, "values").unwrap_or(head.len());
    let prefix = &head[..prefix_end];
    let Some(open) = prefix.find('(') else {
        return Ok(None);
    };
    let Some(close) = prefix[open..].find(')').map(|pos| open + pos) else {
        return Err(OrmError::malformed_head(
            OpKind::Insert,
            head,
            "unterminated column list",
        ));
    };

    let columns: Vec<String> = prefix[open + 1..close]
        .split(',')
        .map(|c| c.trim().to_lowercase())
        .collect();
    if columns.iter().any(String::is_empty) {
        return Err(OrmError::malformed_head(
            OpKind::Insert,
            head,
            "empty column in column list",
        ));
    }
    Ok(Some(columns))
}

/// Prepend `insert into ` unless the head already starts with `insert`.
pub fn complete_insert_head(head: &str) -> OrmResult<String> {
    let head = head.trim();
    if head.is_empty() {
        return Err(OrmError::malformed_head(OpKind::Insert, head, "empty head"));
    }
    if starts_with_keyword(head, "insert") {
        Ok(head.to_string())
    } else {
        Ok(format!("insert into {head}"))
    }
}

/// Whether the completed head already carries literal `VALUES (...)` groups.
pub fn has_literal_values(sql_head: &str) -> bool {
    find_keyword(sql_head, "values").is_some() && sql_head.matches('(').count() > 1
}

/// Build the insert mapping for records of `descriptor`.
pub fn analyze_insert(
    head: &str,
    descriptor: &RecordDescriptor,
    resolver: &FieldNameResolver,
) -> OrmResult<Mapping> {
    let mut sql_head = complete_insert_head(head)?;
    let names = resolved_names(descriptor, resolver);

    let mapping = match insert_columns(&sql_head)? {
        Some(columns) => bind_listed(descriptor, &names, columns)?,
        None => {
            let mapping = bind_all(descriptor, names)?;
            let list = format!("({})", mapping.field_names.join(","));
            match find_keyword(&sql_head, "values") {
                Some(pos) => {
                    let rest = sql_head[pos..].to_string();
                    sql_head.truncate(pos);
                    sql_head = format!("{}{list} {rest}", sql_head.trim_end());
                }
                None => sql_head.push_str(&list),
            }
            mapping
        }
    };

    Ok(Mapping {
        sql_head: Some(sql_head),
        ..mapping
    })
}

/// Build the update mapping for records of `descriptor`.
pub fn analyze_update(
    head: &str,
    descriptor: &RecordDescriptor,
    resolver: &FieldNameResolver,
    placeholder: Placeholder,
) -> OrmResult<Mapping> {
    let trimmed = head.trim();
    if trimmed.is_empty() {
        return Err(OrmError::malformed_head(OpKind::Update, head, "empty head"));
    }
    let sql_head = if starts_with_keyword(trimmed, "update") {
        trimmed.to_string()
    } else {
        format!("update {trimmed}")
    };

    let Some(set_pos) = find_keyword(&sql_head, "set") else {
        return Err(OrmError::malformed_head(
            OpKind::Update,
            head,
            "missing SET clause",
        ));
    };
    let list_start = set_pos + "set".len();
    let list_end = find_keyword(&sql_head[list_start..], "where")
        .map(|pos| list_start + pos)
        .unwrap_or(sql_head.len());
    let assignments = &sql_head[list_start..list_end];
    let names = resolved_names(descriptor, resolver);

    if assignments.trim().is_empty() {
        let mapping = bind_all(descriptor, names)?;
        let list = mapping
            .field_names
            .iter()
            .enumerate()
            .map(|(i, name)| format!("{name}={}", placeholder.render(i + 1)))
            .collect::<Vec<_>>()
            .join(",");
        let mut completed = format!("{} {list}", sql_head[..list_start].trim_end());
        if list_end < sql_head.len() {
            completed.push(' ');
            completed.push_str(&sql_head[list_end..]);
        }
        return Ok(Mapping {
            sql_head: Some(completed),
            ..mapping
        });
    }

    let bound: Vec<String> = assignments
        .split(',')
        .filter_map(|assignment| {
            let (column, rhs) = assignment.split_once('=')?;
            if !placeholder.is_placeholder(rhs.trim()) {
                return None;
            }
            let column = column.trim();
            let column = column.rsplit_once('.').map_or(column, |(_, c)| c);
            Some(column.trim().to_lowercase())
        })
        .collect();

    let mapping = bind_listed(descriptor, &names, bound)?;
    Ok(Mapping {
        sql_head: Some(sql_head),
        ..mapping
    })
}

/// ` values(p,p),(p,p)` tail for `groups` rows of `width` columns.
///
/// Placeholders are numbered continuously across groups. `with_keyword`
/// controls the leading ` values`.
pub fn values_tail(groups: usize, width: usize, placeholder: Placeholder, with_keyword: bool) -> String {
    let mut tail = String::new();
    if with_keyword {
        tail.push_str(" values");
    }
    let mut index = 0;
    for group in 0..groups {
        if group > 0 {
            tail.push(',');
        }
        tail.push('(');
        for column in 0..width {
            if column > 0 {
                tail.push(',');
            }
            index += 1;
            tail.push_str(&placeholder.render(index));
        }
        tail.push(')');
    }
    tail
}

/// Complete an insert head with its value groups.
///
/// Heads that already carry literal `VALUES (...)` are returned unchanged.
pub fn insert_sql(sql_head: &str, groups: usize, width: usize, placeholder: Placeholder) -> String {
    if has_literal_values(sql_head) {
        return sql_head.to_string();
    }
    let with_keyword = find_keyword(sql_head, "values").is_none();
    format!("{sql_head}{}", values_tail(groups, width, placeholder, with_keyword))
}

/// Read the bound field values of `record` in field-list order.
pub fn bound_values(mapping: &Mapping, record: &dyn Record, out: &mut Vec<Value>) -> OrmResult<()> {
    let descriptor = record.record_descriptor();
    for index in mapping.bound_indexes() {
        let value = record.field_value(index).ok_or_else(|| {
            let field = descriptor.fields.get(index).map_or("?", |f| f.name);
            OrmError::invalid_destination(format!(
                "field `{field}` of `{}` cannot be read",
                descriptor.type_name
            ))
        })?;
        out.push(value);
    }
    Ok(())
}

fn resolved_names(descriptor: &RecordDescriptor, resolver: &FieldNameResolver) -> Vec<Option<String>> {
    descriptor.fields.iter().map(|f| resolver.resolve(f)).collect()
}

// Every field with an external name, in declaration order.
fn bind_all(descriptor: &RecordDescriptor, names: Vec<Option<String>>) -> OrmResult<Mapping> {
    let mut mapping = Mapping::default();
    for (index, name) in names.into_iter().enumerate() {
        if let Some(name) = name {
            if mapping.field_indexes.insert(name.clone(), index).is_none() {
                mapping.field_names.push(name);
            }
        }
    }
    if mapping.field_names.is_empty() {
        return Err(OrmError::invalid_destination(format!(
            "`{}` has no fields with a column name",
            descriptor.type_name
        )));
    }
    Ok(mapping)
}

// The listed columns, each of which must name a record field.
fn bind_listed(
    descriptor: &RecordDescriptor,
    names: &[Option<String>],
    columns: Vec<String>,
) -> OrmResult<Mapping> {
    let mut field_indexes = HashMap::with_capacity(columns.len());
    for column in &columns {
        let index = names
            .iter()
            .rposition(|name| name.as_deref() == Some(column.as_str()))
            .ok_or_else(|| {
                OrmError::invalid_destination(format!(
                    "`{}` has no field for column `{column}`",
                    descriptor.type_name
                ))
            })?;
        field_indexes.insert(column.clone(), index);
    }
    Ok(Mapping {
        sql_head: None,
        field_names: columns,
        field_indexes,
    })
}
