//! Embedded-SQL backend built on rusqlite.

/// Generic engine over the embedded backend.
pub mod engine;

pub use engine::SqliteEngine;

use std::path::Path;

use hashbrown::HashMap;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{Connection, InterruptHandle, OpenFlags, OptionalExtension, params};
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::geo::{self, Pos, Rect};
use crate::query::prefix_upper;
use crate::record::{Origin, RowView, SqlValue};

impl rusqlite::ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Integer(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            SqlValue::Real(v) => ToSqlOutput::Owned(Value::Real(*v)),
            SqlValue::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            SqlValue::Blob(v) => ToSqlOutput::Borrowed(ValueRef::Blob(v)),
        })
    }
}

/// Connection core for the embedded backend.
///
/// Owns the primary connection, the optional read-only aux attachment,
/// and the scalar functions generated SQL relies on. The lifecycle is
/// `closed → main-open → aux-open`, back to `main-open` via
/// [`SqliteCore::detach`], and closed by dropping the core.
pub struct SqliteCore {
    pub(crate) conn: Connection,
    aux_attached: bool,
    read_only: bool,
    rtree_probe: HashMap<(String, Origin), bool>,
}

impl SqliteCore {
    /// Opens (or creates) the primary database at `path`.
    pub fn open(path: impl AsRef<Path>, config: &StoreConfig) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref()).map_err(open_error)?;
        Self::init(conn, config, false)
    }

    /// Opens the primary database read-only.
    pub fn open_read_only(path: impl AsRef<Path>, config: &StoreConfig) -> StoreResult<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI;
        let conn = Connection::open_with_flags(path.as_ref(), flags).map_err(open_error)?;
        Self::init(conn, config, true)
    }

    /// Opens a transient in-memory database.
    pub fn open_in_memory(config: &StoreConfig) -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(open_error)?;
        Self::init(conn, config, false)
    }

    fn init(conn: Connection, config: &StoreConfig, read_only: bool) -> StoreResult<Self> {
        register_functions(&conn).map_err(open_error)?;
        if !read_only {
            apply_pragmas(&conn, config).map_err(open_error)?;
        }
        debug!(read_only, "sqlite session open");
        Ok(Self {
            conn,
            aux_attached: false,
            read_only,
            rtree_probe: HashMap::new(),
        })
    }

    /// Attaches a read-only aux database layered underneath the primary.
    pub fn attach(&mut self, path: impl AsRef<Path>) -> StoreResult<()> {
        let uri = format!("file:{}?mode=ro", path.as_ref().display());
        self.conn
            .execute("ATTACH DATABASE ?1 AS \"aux\"", params![uri])
            .map_err(open_error)?;
        self.aux_attached = true;
        self.rtree_probe.clear();
        debug!(path = %path.as_ref().display(), "aux database attached");
        Ok(())
    }

    /// Detaches the aux database.
    pub fn detach(&mut self) -> StoreResult<()> {
        if self.aux_attached {
            self.conn.execute("DETACH DATABASE \"aux\"", [])?;
            self.aux_attached = false;
            self.rtree_probe.clear();
            debug!("aux database detached");
        }
        Ok(())
    }

    /// True while an aux database is attached.
    pub fn has_aux(&self) -> bool {
        self.aux_attached
    }

    /// True when the session refuses mutations.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Handle for cancelling an in-flight query from another thread. The
    /// interrupted call returns [`StoreError::Interrupted`].
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.conn.get_interrupt_handle()
    }

    /// Probes whether `table` has a usable native spatial index in the
    /// given database: the `_rtree` shadow table exists and its first ID
    /// agrees with the base table. Results are cached until the aux
    /// attachment changes.
    pub fn has_native_index(
        &mut self,
        table: &str,
        id_column: &str,
        origin: Origin,
    ) -> StoreResult<bool> {
        if origin == Origin::Aux && !self.aux_attached {
            return Ok(false);
        }
        let key = (table.to_string(), origin);
        if let Some(&known) = self.rtree_probe.get(&key) {
            return Ok(known);
        }
        let found = self.probe_native_index(table, id_column, origin)?;
        self.rtree_probe.insert(key, found);
        Ok(found)
    }

    fn probe_native_index(
        &self,
        table: &str,
        id_column: &str,
        origin: Origin,
    ) -> StoreResult<bool> {
        let schema = schema_name(origin);
        let exists: Option<String> = self
            .conn
            .query_row(
                &format!(
                    "SELECT name FROM \"{schema}\".sqlite_master WHERE type = 'table' AND name = ?1"
                ),
                params![format!("{table}_rtree")],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Ok(false);
        }
        let first_id: Option<i64> = self
            .conn
            .query_row(
                &format!("SELECT \"ID\" FROM \"{schema}\".\"{table}_rtree\" ORDER BY \"ID\" LIMIT 1"),
                [],
                |row| row.get(0),
            )
            .optional()?;
        let Some(first_id) = first_id else {
            // Empty shadow table agrees with anything.
            return Ok(true);
        };
        let present: Option<i64> = self
            .conn
            .query_row(
                &format!(
                    "SELECT \"{id_column}\" FROM \"{schema}\".\"{table}\" WHERE \"{id_column}\" = ?1"
                ),
                params![first_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(present.is_some())
    }

    /// Runs raw DDL/SQL batches. The engines never create schema; this
    /// is the hook the external schema-reflection collaborator uses.
    pub fn execute_batch(&self, sql: &str) -> StoreResult<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    /// Best-effort statistics refresh; failures are logged, not raised.
    pub fn analyze(&self) {
        if let Err(err) = self.conn.execute_batch("ANALYZE") {
            warn!(%err, "analyze failed");
        }
    }

    /// Best-effort storage compaction; failures are logged, not raised.
    pub fn vacuum(&self) {
        if let Err(err) = self.conn.execute_batch("VACUUM") {
            warn!(%err, "vacuum failed");
        }
    }
}

/// Runs a query on `conn` and materializes every row. Usable both on the
/// plain connection and inside a transaction.
pub(crate) fn query_rows(
    conn: &Connection,
    sql: &str,
    sql_params: &[SqlValue],
) -> StoreResult<Vec<RowView>> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let mut rows = stmt.query(rusqlite::params_from_iter(sql_params.iter()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            values.push(match row.get_ref(i)? {
                ValueRef::Null => SqlValue::Null,
                ValueRef::Integer(v) => SqlValue::Integer(v),
                ValueRef::Real(v) => SqlValue::Real(v),
                ValueRef::Text(v) => SqlValue::Text(String::from_utf8_lossy(v).into_owned()),
                ValueRef::Blob(v) => SqlValue::Blob(v.to_vec()),
            });
        }
        out.push(RowView::new(columns.clone(), values));
    }
    Ok(out)
}

/// Executes one statement on `conn`.
pub(crate) fn exec(conn: &Connection, sql: &str, sql_params: &[SqlValue]) -> StoreResult<usize> {
    Ok(conn.execute(sql, rusqlite::params_from_iter(sql_params.iter()))?)
}

/// Schema qualifier of a physical database on the shared connection.
pub(crate) fn schema_name(origin: Origin) -> &'static str {
    match origin {
        Origin::Main => "main",
        Origin::Aux => "aux",
    }
}

fn open_error(err: rusqlite::Error) -> StoreError {
    StoreError::Open {
        detail: err.to_string(),
    }
}

fn apply_pragmas(conn: &Connection, config: &StoreConfig) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    let synchronous = if config.force_sync_off { "OFF" } else { "NORMAL" };
    conn.pragma_update(None, "synchronous", synchronous)?;
    if let Some(kb) = config.cache_size_kb {
        // Negative cache_size means kilobytes.
        conn.pragma_update(None, "cache_size", -kb)?;
    }
    if config.exclusive {
        conn.pragma_update(None, "locking_mode", "EXCLUSIVE")?;
    }
    Ok(())
}

fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

    conn.create_scalar_function("geo_dist_sq", 4, flags, |ctx| {
        let lonx1: Option<i64> = ctx.get(0)?;
        let laty1: Option<i64> = ctx.get(1)?;
        let lonx2: Option<i64> = ctx.get(2)?;
        let laty2: Option<i64> = ctx.get(3)?;
        Ok(match (lonx1, laty1, lonx2, laty2) {
            (Some(lonx1), Some(laty1), Some(lonx2), Some(laty2)) => geo::approx_dist_sq(
                Pos::new(lonx1 as u32, laty1 as i32),
                Pos::new(lonx2 as u32, laty2 as i32),
            ),
            _ => f64::MAX,
        })
    })?;

    conn.create_scalar_function("geo_rect_dist_sq", 6, flags, |ctx| {
        let lonx: Option<i64> = ctx.get(0)?;
        let laty: Option<i64> = ctx.get(1)?;
        let west: Option<i64> = ctx.get(2)?;
        let south: Option<i64> = ctx.get(3)?;
        let east: Option<i64> = ctx.get(4)?;
        let north: Option<i64> = ctx.get(5)?;
        Ok(match (lonx, laty, west, south, east, north) {
            (Some(lonx), Some(laty), Some(west), Some(south), Some(east), Some(north)) => {
                let rect = Rect::from_spans(
                    south as i32,
                    west as u32,
                    north as i32,
                    (east - west).max(0) as u64,
                );
                geo::approx_rect_dist_sq(Pos::new(lonx as u32, laty as i32), &rect)
            }
            _ => f64::MAX,
        })
    })?;

    conn.create_scalar_function("prefix_upper", 1, flags, |ctx| {
        let pattern: String = ctx.get(0)?;
        Ok(prefix_upper(&pattern))
    })?;

    Ok(())
}
