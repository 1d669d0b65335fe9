//! Entity addressing, load masks, and the backend-agnostic row model.

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Physical database a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Origin {
    /// Primary read/write database.
    Main,
    /// Attached read-only overlay database.
    Aux,
}

/// Identity of a record inside either physical database.
///
/// The origin is never persisted; it is inferred from which database
/// produced the row. An id of 0 means "not present".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityAddress {
    /// Row id, 0 when invalid.
    pub id: i64,
    /// Database the record belongs to.
    pub origin: Origin,
}

impl Default for EntityAddress {
    fn default() -> Self {
        Self::invalid()
    }
}

impl EntityAddress {
    /// Address of a main-database record.
    pub fn main(id: i64) -> Self {
        Self {
            id,
            origin: Origin::Main,
        }
    }

    /// Address of an aux-database record.
    pub fn aux(id: i64) -> Self {
        Self {
            id,
            origin: Origin::Aux,
        }
    }

    /// Invalid sentinel address.
    pub fn invalid() -> Self {
        Self::main(0)
    }

    /// True when the address refers to a stored record.
    pub fn is_present(&self) -> bool {
        self.id != 0
    }
}

/// Bitmask selecting which parts of a record a read hydrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadMask(u32);

impl LoadMask {
    /// Identity and source key only.
    pub const IDENT: LoadMask = LoadMask(0x1);
    /// Point or bounding-box geometry.
    pub const GEOMETRY: LoadMask = LoadMask(0x2);
    /// All remaining descriptor columns.
    pub const ATTRIBUTES: LoadMask = LoadMask(0x4);
    /// Descriptor-declared child collections.
    pub const SUBTABLES: LoadMask = LoadMask(0x8);
    /// Everything.
    pub const ALL: LoadMask = LoadMask(0xF);

    /// True when every bit of `other` is set in `self`.
    pub fn contains(self, other: LoadMask) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of both masks.
    pub fn with(self, other: LoadMask) -> LoadMask {
        LoadMask(self.0 | other.0)
    }
}

impl Default for LoadMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// Backend-agnostic SQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,
    /// 64-bit integer.
    Integer(i64),
    /// Double-precision float.
    Real(f64),
    /// Text.
    Text(String),
    /// Binary blob.
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Optional text helper for descriptor bind code.
    pub fn opt_text(value: Option<&str>) -> SqlValue {
        match value {
            Some(s) => SqlValue::Text(s.to_string()),
            None => SqlValue::Null,
        }
    }

    /// Optional integer helper for descriptor bind code.
    pub fn opt_integer(value: Option<i64>) -> SqlValue {
        match value {
            Some(v) => SqlValue::Integer(v),
            None => SqlValue::Null,
        }
    }
}

/// One materialized result row, decoupled from the producing backend.
#[derive(Debug, Clone)]
pub struct RowView {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl RowView {
    /// Builds a row from parallel column and value vectors.
    pub fn new(columns: Vec<String>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    /// Raw value by column name.
    pub fn value(&self, column: &str) -> StoreResult<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
            .ok_or_else(|| StoreError::MissingColumn {
                column: column.to_string(),
            })
    }

    /// Integer column; NULL reads as 0.
    pub fn get_i64(&self, column: &str) -> StoreResult<i64> {
        match self.value(column)? {
            SqlValue::Integer(v) => Ok(*v),
            SqlValue::Null => Ok(0),
            other => Err(type_error(column, other)),
        }
    }

    /// Nullable integer column.
    pub fn get_opt_i64(&self, column: &str) -> StoreResult<Option<i64>> {
        match self.value(column)? {
            SqlValue::Integer(v) => Ok(Some(*v)),
            SqlValue::Null => Ok(None),
            other => Err(type_error(column, other)),
        }
    }

    /// Float column; integer values widen, NULL reads as 0.
    pub fn get_f64(&self, column: &str) -> StoreResult<f64> {
        match self.value(column)? {
            SqlValue::Real(v) => Ok(*v),
            SqlValue::Integer(v) => Ok(*v as f64),
            SqlValue::Null => Ok(0.0),
            other => Err(type_error(column, other)),
        }
    }

    /// Text column; NULL reads as empty.
    pub fn get_text(&self, column: &str) -> StoreResult<String> {
        match self.value(column)? {
            SqlValue::Text(v) => Ok(v.clone()),
            SqlValue::Null => Ok(String::new()),
            other => Err(type_error(column, other)),
        }
    }

    /// Nullable text column.
    pub fn get_opt_text(&self, column: &str) -> StoreResult<Option<String>> {
        match self.value(column)? {
            SqlValue::Text(v) => Ok(Some(v.clone())),
            SqlValue::Null => Ok(None),
            other => Err(type_error(column, other)),
        }
    }
}

fn type_error(column: &str, value: &SqlValue) -> StoreError {
    StoreError::ColumnType {
        column: column.to_string(),
        found: match value {
            SqlValue::Null => "null",
            SqlValue::Integer(_) => "integer",
            SqlValue::Real(_) => "real",
            SqlValue::Text(_) => "text",
            SqlValue::Blob(_) => "blob",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_presence() {
        assert!(!EntityAddress::invalid().is_present());
        assert!(EntityAddress::main(7).is_present());
        assert_ne!(EntityAddress::main(7), EntityAddress::aux(7));
    }

    #[test]
    fn load_mask_composition() {
        let mask = LoadMask::IDENT.with(LoadMask::GEOMETRY);
        assert!(mask.contains(LoadMask::IDENT));
        assert!(!mask.contains(LoadMask::ATTRIBUTES));
        assert!(LoadMask::ALL.contains(mask));
    }

    #[test]
    fn row_view_typed_access() {
        let row = RowView::new(
            vec!["id".into(), "name".into(), "freq".into()],
            vec![
                SqlValue::Integer(3),
                SqlValue::Text("ABC".into()),
                SqlValue::Null,
            ],
        );
        assert_eq!(row.get_i64("id").unwrap(), 3);
        assert_eq!(row.get_text("name").unwrap(), "ABC");
        assert_eq!(row.get_opt_i64("freq").unwrap(), None);
        assert!(row.get_i64("missing").is_err());
    }
}
