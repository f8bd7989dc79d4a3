//! Row and column types for query results.
//!
//! Values arrive in text format and are kept as raw bytes; decoding to a
//! [`SqlValue`] happens on access, using the column's type OID.

use std::sync::Arc;

use bytes::Bytes;
use pg_protocol::FieldDescription;
use pg_types::{FromSql, SqlValue, TypeError, decode_text};

/// Column metadata from a RowDescription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: String,
    type_oid: u32,
    type_size: i16,
    type_modifier: i32,
    table_oid: u32,
    column_id: i16,
}

impl Column {
    pub(crate) fn from_field(field: &FieldDescription) -> Self {
        Self {
            name: field.name.clone(),
            type_oid: field.type_oid,
            type_size: field.type_size,
            type_modifier: field.type_modifier,
            table_oid: field.table_oid,
            column_id: field.column_id,
        }
    }

    /// Column name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type OID.
    #[must_use]
    pub fn type_oid(&self) -> u32 {
        self.type_oid
    }

    /// Type size in bytes, negative for variable-length types.
    #[must_use]
    pub fn type_size(&self) -> i16 {
        self.type_size
    }

    /// Type modifier (e.g. `varchar(n)` length), `-1` if none.
    #[must_use]
    pub fn type_modifier(&self) -> i32 {
        self.type_modifier
    }

    /// OID of the source table, or 0 for computed columns.
    #[must_use]
    pub fn table_oid(&self) -> u32 {
        self.table_oid
    }

    /// Attribute number within the source table, or 0.
    #[must_use]
    pub fn column_id(&self) -> i16 {
        self.column_id
    }
}

pub(crate) fn columns_from_fields(fields: &[FieldDescription]) -> Arc<[Column]> {
    fields.iter().map(Column::from_field).collect()
}

/// A single result row.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<[Column]>,
    values: Vec<Option<Bytes>>,
}

impl Row {
    pub(crate) fn new(columns: Arc<[Column]>, values: Vec<Option<Bytes>>) -> Self {
        Self { columns, values }
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Get a value by column index with type conversion.
    pub fn get<T: FromSql>(&self, index: usize) -> Result<T, TypeError> {
        let value = self.get_raw(index).ok_or_else(|| TypeError::TypeMismatch {
            expected: "valid column index",
            actual: format!("index {index} out of bounds"),
        })??;
        T::from_sql(&value)
    }

    /// Get a value by column name with type conversion.
    pub fn get_by_name<T: FromSql>(&self, name: &str) -> Result<T, TypeError> {
        let index = self
            .index_of(name)
            .ok_or_else(|| TypeError::TypeMismatch {
                expected: "valid column name",
                actual: format!("column '{name}' not found"),
            })?;
        self.get(index)
    }

    /// Try to get a value by column index, returning `None` if NULL, out
    /// of range or not convertible.
    pub fn try_get<T: FromSql>(&self, index: usize) -> Option<T> {
        let value = self.get_raw(index)?.ok()?;
        T::from_sql_nullable(&value).ok().flatten()
    }

    /// Decode the value at `index` by its column type.
    ///
    /// Returns `None` if the index is out of range.
    pub fn get_raw(&self, index: usize) -> Option<Result<SqlValue, TypeError>> {
        let column = self.columns.get(index)?;
        let raw = self.values.get(index)?;
        Some(decode_text(column.type_oid, raw.as_deref()))
    }

    /// Check if a column value is NULL. Out-of-range indexes count as NULL.
    #[must_use]
    pub fn is_null(&self, index: usize) -> bool {
        self.values.get(index).is_none_or(Option::is_none)
    }

    /// Get the number of columns in the row.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get the column metadata.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn field(name: &str, type_oid: u32) -> FieldDescription {
        FieldDescription {
            name: name.to_string(),
            table_oid: 0,
            column_id: 0,
            type_oid,
            type_size: -1,
            type_modifier: -1,
            format: 0,
        }
    }

    fn sample() -> Row {
        let columns = columns_from_fields(&[field("id", 23), field("name", 25), field("note", 25)]);
        Row::new(
            columns,
            vec![
                Some(Bytes::from_static(b"42")),
                Some(Bytes::from_static(b"Alice")),
                None,
            ],
        )
    }

    #[test]
    fn test_get_by_index_and_name() {
        let row = sample();
        assert_eq!(row.get::<i32>(0).unwrap(), 42);
        assert_eq!(row.get::<i64>(0).unwrap(), 42);
        assert_eq!(row.get_by_name::<String>("name").unwrap(), "Alice");
        assert_eq!(row.len(), 3);
        assert_eq!(row.columns()[1].name(), "name");
    }

    #[test]
    fn test_null_handling() {
        let row = sample();
        assert!(row.is_null(2));
        assert!(row.is_null(10));
        assert!(matches!(row.get::<String>(2), Err(TypeError::UnexpectedNull)));
        assert_eq!(row.get::<Option<String>>(2).unwrap(), None);
        assert_eq!(row.try_get::<String>(2), None);
    }

    #[test]
    fn test_missing_column() {
        let row = sample();
        assert!(row.get::<i32>(9).is_err());
        assert!(row.get_by_name::<i32>("missing").is_err());
        assert_eq!(row.try_get::<i32>(9), None);
    }
}
