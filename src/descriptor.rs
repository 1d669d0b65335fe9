//! Entity descriptor contract consumed by the generic engines.
//!
//! Each entity type (navaid, airport, airway, ...) supplies one
//! [`EntityDescriptor`] value describing its table, projection, and
//! searchable fields. The engines never know column meanings beyond the
//! fixed geometry layout below; everything else flows through the
//! descriptor's row/bind hooks.
//!
//! Persisted geometry layout, by convention:
//! - point entities carry [`COL_LONX`] and [`COL_LATY`];
//! - area entities carry [`COL_MIN_LONX`], [`COL_MAX_LONX`],
//!   [`COL_MIN_LATY`], [`COL_MAX_LATY`], with the max longitude stored
//!   unwrapped (`west + width`);
//! - both carry an engine-maintained [`COL_TILE`] cache column;
//! - an optional `<table>_rtree` shadow table `(ID, min_lat, max_lat,
//!   min_lon, max_lon)` backs the native-index query path;
//! - a `<table>_deleted` table keyed by the delete-key column records
//!   overlay tombstones.

use crate::error::StoreResult;
use crate::geo::{Pos, Rect};
use crate::record::{EntityAddress, LoadMask, RowView, SqlValue};

/// Longitude column of point entities.
pub const COL_LONX: &str = "lonx";
/// Latitude column of point entities.
pub const COL_LATY: &str = "laty";
/// West bound column of area entities.
pub const COL_MIN_LONX: &str = "min_lonx";
/// Unwrapped east bound column of area entities.
pub const COL_MAX_LONX: &str = "max_lonx";
/// South bound column of area entities.
pub const COL_MIN_LATY: &str = "min_laty";
/// North bound column of area entities.
pub const COL_MAX_LATY: &str = "max_laty";
/// Engine-maintained tile cache column.
pub const COL_TILE: &str = "tile";

/// Descriptor-declared child collection.
#[derive(Debug, Clone, Copy)]
pub struct SubtableSpec {
    /// Child table name.
    pub table: &'static str,
    /// Column of the child table referencing the parent id.
    pub parent_key: &'static str,
    /// Projected child columns.
    pub columns: &'static [&'static str],
}

/// Record-side contract: identity plus the geometry the engines index.
pub trait SpatialRecord {
    /// Current address; id 0 when the record is not stored.
    fn address(&self) -> EntityAddress;

    /// Updates the address after save or load.
    fn set_address(&mut self, address: EntityAddress);

    /// Point geometry of point entities.
    fn pos(&self) -> Option<Pos> {
        None
    }

    /// Bounding box of area entities.
    fn bbox(&self) -> Option<Rect> {
        None
    }

    /// Stable external key used for dedup and overlay tombstones.
    fn source_key(&self) -> Option<&str> {
        None
    }
}

/// Compile-time plug-in describing one entity type to the generic engine.
pub trait EntityDescriptor {
    /// Record type produced and consumed by the engine.
    type Rec: SpatialRecord + Clone;

    /// Entity table name.
    fn table(&self) -> &str;

    /// Ordered column projection for the main database. Must include the
    /// id column first and the geometry columns of the declared kind.
    fn columns(&self) -> &[&str];

    /// Id column; by convention the first projected column.
    fn id_column(&self) -> &str {
        self.columns()[0]
    }

    /// Projection for the aux database; defaults to the main projection.
    fn aux_columns(&self) -> &[&str] {
        self.columns()
    }

    /// Free-text searchable columns.
    fn text_columns(&self) -> &[&str];

    /// Time-range searchable columns.
    fn time_columns(&self) -> &[&str];

    /// Column ordering full scans.
    fn order_column(&self) -> &str;

    /// Delete/tombstone key column.
    fn delete_key_column(&self) -> &str;

    /// True when the primary geometry is a bounding box rather than a
    /// point.
    fn is_area(&self) -> bool;

    /// Factory for the invalid sentinel record.
    fn empty(&self) -> Self::Rec;

    /// Populates a record from one result row under the load mask.
    fn read_row(&self, row: &RowView, mask: LoadMask) -> StoreResult<Self::Rec>;

    /// Binds a record's fields in [`EntityDescriptor::columns`] order.
    /// The id column position receives the value the engine assigns.
    fn bind_row(&self, rec: &Self::Rec) -> Vec<SqlValue>;

    /// Declared child collections, if any.
    fn subtables(&self) -> &[SubtableSpec] {
        &[]
    }

    /// Attaches loaded child rows for `subtables()[index]` to a record.
    fn attach_subtable(&self, _rec: &mut Self::Rec, _index: usize, _rows: Vec<RowView>) {}
}
