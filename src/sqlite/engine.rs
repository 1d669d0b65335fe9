//! Generic engine over the embedded backend.

use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::descriptor::{EntityDescriptor, SpatialRecord};
use crate::error::{StoreError, StoreResult};
use crate::geo::{Pos, Rect};
use crate::query::{QueryInterface, RecordSink, TextMode, apply_limit, rank_by_distance};
use crate::record::{EntityAddress, LoadMask, Origin, RowView, SqlValue};
use crate::sql::{
    Dialect, SqlBuilder, push_distance_order, push_spatial_filter, push_text_filter,
    push_time_filter, push_tombstone_filter, select_from,
};
use crate::tile::{tile_from_pos, tile_from_rect};

use super::{SqliteCore, exec, query_rows, schema_name};

/// Embedded-backend implementation of [`QueryInterface`], parameterized
/// by an entity descriptor.
///
/// Multiple engines (one per entity type) share one [`SqliteCore`]; the
/// aux database rides on the same connection as an attached schema, so
/// aux-side predicates can reference the main-side tombstone table
/// directly.
pub struct SqliteEngine<D: EntityDescriptor> {
    core: Arc<Mutex<SqliteCore>>,
    desc: D,
}

impl<D: EntityDescriptor> SqliteEngine<D> {
    /// Creates an engine for one entity type on a shared core.
    pub fn new(core: Arc<Mutex<SqliteCore>>, desc: D) -> Self {
        Self { core, desc }
    }

    /// The plugged-in descriptor.
    pub fn descriptor(&self) -> &D {
        &self.desc
    }

    fn lock(&self) -> MutexGuard<'_, SqliteCore> {
        self.core.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn origin_columns(&self, origin: Origin) -> &[&str] {
        match origin {
            Origin::Main => self.desc.columns(),
            Origin::Aux => self.desc.aux_columns(),
        }
    }

    fn select(&self, origin: Origin) -> SqlBuilder {
        select_from(
            Dialect::Sqlite,
            Some(schema_name(origin)),
            self.desc.table(),
            self.origin_columns(origin),
        )
    }

    /// Aux reads hide rows shadowed by a main row with the same id and
    /// rows whose delete key is tombstoned.
    fn push_aux_read_filters(&self, b: &mut SqlBuilder) {
        b.push_ident(self.desc.id_column());
        b.push(" NOT IN (SELECT ");
        b.push_ident(self.desc.id_column());
        b.push(" FROM ");
        b.push_table(Some("main"), self.desc.table());
        b.push(") AND ");
        push_tombstone_filter(b, self.desc.table(), self.desc.delete_key_column());
    }

    fn row_to_record(
        &self,
        row: &RowView,
        origin: Origin,
        mask: LoadMask,
    ) -> StoreResult<D::Rec> {
        let mut rec = self.desc.read_row(row, mask)?;
        rec.set_address(EntityAddress {
            id: row.get_i64(self.desc.id_column())?,
            origin,
        });
        Ok(rec)
    }

    fn query_records(
        &self,
        conn: &Connection,
        builder: SqlBuilder,
        origin: Origin,
        mask: LoadMask,
    ) -> StoreResult<Vec<D::Rec>> {
        let (sql, params) = builder.finish();
        let rows = query_rows(conn, &sql, &params)?;
        rows.iter()
            .map(|row| self.row_to_record(row, origin, mask))
            .collect()
    }

    /// Runs one find-style query against main and, when requested, aux,
    /// and merges main-first.
    fn find_merged<F>(
        &self,
        core: &mut SqliteCore,
        mut push_filters: F,
        order_by: Option<&str>,
        limit: Option<u32>,
        mask: LoadMask,
        include_aux: bool,
    ) -> StoreResult<Vec<D::Rec>>
    where
        F: FnMut(&mut SqlBuilder, Origin, &mut SqliteCore) -> StoreResult<()>,
    {
        let mut out = Vec::new();
        let mut origins = vec![Origin::Main];
        if include_aux && core.has_aux() {
            origins.push(Origin::Aux);
        }
        for origin in origins {
            let mut b = self.select(origin);
            b.push(" WHERE ");
            push_filters(&mut b, origin, core)?;
            if origin == Origin::Aux {
                b.push(" AND ");
                self.push_aux_read_filters(&mut b);
            }
            if let Some(order) = order_by {
                b.push(" ORDER BY ");
                b.push_ident(order);
            }
            if let Some(limit) = limit {
                b.push(&format!(" LIMIT {limit}"));
            }
            out.extend(self.query_records(&core.conn, b, origin, mask)?);
        }
        apply_limit(&mut out, limit);
        Ok(out)
    }

    fn cursor_next(
        &self,
        core: &SqliteCore,
        after: EntityAddress,
        include_aux: bool,
        mask: LoadMask,
    ) -> StoreResult<D::Rec> {
        if after.origin == Origin::Main {
            let mut b = self.select(Origin::Main);
            b.push(" WHERE ");
            b.push_ident(self.desc.id_column());
            b.push(" > ");
            b.bind(SqlValue::Integer(after.id));
            b.push(" ORDER BY ");
            b.push_ident(self.desc.id_column());
            b.push(" LIMIT 1");
            let recs = self.query_records(&core.conn, b, Origin::Main, mask)?;
            if let Some(rec) = recs.into_iter().next() {
                return Ok(rec);
            }
            if include_aux && core.has_aux() {
                return self.cursor_aux_next(core, 0, mask);
            }
            return Ok(self.desc.empty());
        }
        if core.has_aux() {
            return self.cursor_aux_next(core, after.id, mask);
        }
        Ok(self.desc.empty())
    }

    fn cursor_aux_next(
        &self,
        core: &SqliteCore,
        after_id: i64,
        mask: LoadMask,
    ) -> StoreResult<D::Rec> {
        let mut b = self.select(Origin::Aux);
        b.push(" WHERE ");
        b.push_ident(self.desc.id_column());
        b.push(" > ");
        b.bind(SqlValue::Integer(after_id));
        b.push(" AND ");
        self.push_aux_read_filters(&mut b);
        b.push(" ORDER BY ");
        b.push_ident(self.desc.id_column());
        b.push(" LIMIT 1");
        let recs = self.query_records(&core.conn, b, Origin::Aux, mask)?;
        Ok(recs.into_iter().next().unwrap_or_else(|| self.desc.empty()))
    }

    fn stream_deleted_keys(
        &self,
        core: &SqliteCore,
        sink: &mut dyn RecordSink<D::Rec>,
    ) -> StoreResult<bool> {
        let delete_key = self.desc.delete_key_column();
        let mut b = select_from(
            Dialect::Sqlite,
            Some("main"),
            &format!("{}_deleted", self.desc.table()),
            &[delete_key],
        );
        b.push(" ORDER BY ");
        b.push_ident(delete_key);
        let (sql, params) = b.finish();
        for row in query_rows(&core.conn, &sql, &params)? {
            if !sink.deleted_key(&row.get_text(delete_key)?) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn scan_into_sink(
        &self,
        core: &mut SqliteCore,
        sink: &mut dyn RecordSink<D::Rec>,
        rect: Option<&Rect>,
        include_aux: bool,
        mask: LoadMask,
    ) -> StoreResult<()> {
        let mut origins = vec![Origin::Main];
        if include_aux && core.has_aux() {
            origins.push(Origin::Aux);
        }
        for origin in origins {
            let mut b = self.select(origin);
            let mut has_where = false;
            if let Some(rect) = rect {
                let native = core.has_native_index(
                    self.desc.table(),
                    self.desc.id_column(),
                    origin,
                )?;
                b.push(" WHERE ");
                push_spatial_filter(
                    &mut b,
                    Some(schema_name(origin)),
                    self.desc.table(),
                    self.desc.id_column(),
                    rect,
                    self.desc.is_area(),
                    native,
                );
                has_where = true;
            }
            if origin == Origin::Aux {
                b.push(if has_where { " AND " } else { " WHERE " });
                self.push_aux_read_filters(&mut b);
            }
            b.push(" ORDER BY ");
            b.push_ident(self.desc.order_column());
            for rec in self.query_records(&core.conn, b, origin, mask)? {
                if !sink.record(rec) {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    fn load_subtables_with(
        &self,
        core: &SqliteCore,
        recs: &mut [D::Rec],
        mask: LoadMask,
    ) -> StoreResult<()> {
        if !mask.contains(LoadMask::SUBTABLES) || self.desc.subtables().is_empty() {
            return Ok(());
        }
        for rec in recs.iter_mut() {
            let addr = rec.address();
            if !addr.is_present() || (addr.origin == Origin::Aux && !core.has_aux()) {
                continue;
            }
            for (index, spec) in self.desc.subtables().iter().enumerate() {
                let mut b = select_from(
                    Dialect::Sqlite,
                    Some(schema_name(addr.origin)),
                    spec.table,
                    spec.columns,
                );
                b.push(" WHERE ");
                b.push_ident(spec.parent_key);
                b.push(" = ");
                b.bind(SqlValue::Integer(addr.id));
                let (sql, params) = b.finish();
                let rows = query_rows(&core.conn, &sql, &params)?;
                self.desc.attach_subtable(rec, index, rows);
            }
        }
        Ok(())
    }

    fn tile_value(&self, rec: &D::Rec) -> SqlValue {
        if self.desc.is_area() {
            rec.bbox()
                .map(|b| SqlValue::Integer(i64::from(tile_from_rect(&b))))
                .unwrap_or(SqlValue::Null)
        } else {
            rec.pos()
                .map(|p| SqlValue::Integer(i64::from(tile_from_pos(p))))
                .unwrap_or(SqlValue::Null)
        }
    }

    /// Shadow-row bounds `(min_lat, max_lat, min_lon, max_lon)`.
    fn shadow_bounds(&self, rec: &D::Rec) -> Option<(i64, i64, i64, i64)> {
        if self.desc.is_area() {
            rec.bbox().map(|b| {
                (
                    i64::from(b.south()),
                    i64::from(b.north()),
                    i64::from(b.west()),
                    b.east_unwrapped() as i64,
                )
            })
        } else {
            rec.pos().map(|p| {
                (
                    i64::from(p.laty),
                    i64::from(p.laty),
                    i64::from(p.lonx),
                    i64::from(p.lonx),
                )
            })
        }
    }

    fn refresh_shadow(&self, conn: &Connection, id: i64, rec: &D::Rec) -> StoreResult<()> {
        let shadow = format!("{}_rtree", self.desc.table());
        exec(
            conn,
            &format!("DELETE FROM \"main\".\"{shadow}\" WHERE \"ID\" = ?"),
            &[SqlValue::Integer(id)],
        )?;
        if let Some((min_lat, max_lat, min_lon, max_lon)) = self.shadow_bounds(rec) {
            exec(
                conn,
                &format!(
                    "INSERT INTO \"main\".\"{shadow}\" \
                     (\"ID\", \"min_lat\", \"max_lat\", \"min_lon\", \"max_lon\") \
                     VALUES (?, ?, ?, ?, ?)"
                ),
                &[
                    SqlValue::Integer(id),
                    SqlValue::Integer(min_lat),
                    SqlValue::Integer(max_lat),
                    SqlValue::Integer(min_lon),
                    SqlValue::Integer(max_lon),
                ],
            )?;
        }
        Ok(())
    }

    fn write_tombstone(&self, conn: &Connection, key: &str) -> StoreResult<()> {
        let deleted = format!("{}_deleted", self.desc.table());
        let delete_key = self.desc.delete_key_column();
        exec(
            conn,
            &format!(
                "INSERT INTO \"main\".\"{deleted}\" (\"{delete_key}\") \
                 SELECT ?1 WHERE NOT EXISTS \
                 (SELECT 1 FROM \"main\".\"{deleted}\" WHERE \"{delete_key}\" = ?1)"
            ),
            &[SqlValue::Text(key.to_string())],
        )?;
        Ok(())
    }

    fn insert_row(&self, conn: &Connection, rec: &D::Rec) -> StoreResult<i64> {
        let next_id: i64 = conn
            .query_row(
                &format!(
                    "SELECT COALESCE(MAX(\"{id}\"), 0) + 1 FROM \"main\".\"{table}\"",
                    id = self.desc.id_column(),
                    table = self.desc.table()
                ),
                [],
                |row| row.get(0),
            )
            .map_err(StoreError::from)?;
        let mut values = self.desc.bind_row(rec);
        values[0] = SqlValue::Integer(next_id);

        let mut b = SqlBuilder::new(Dialect::Sqlite);
        b.push("INSERT INTO ");
        b.push_table(Some("main"), self.desc.table());
        b.push(" (");
        for (i, col) in self.desc.columns().iter().enumerate() {
            if i > 0 {
                b.push(", ");
            }
            b.push_ident(col);
        }
        b.push(", \"tile\") VALUES (");
        for (i, value) in values.into_iter().enumerate() {
            if i > 0 {
                b.push(", ");
            }
            b.push_value(value);
        }
        b.push(", ");
        b.push_value(self.tile_value(rec));
        b.push(")");
        let (sql, params) = b.finish();
        exec(conn, &sql, &params)?;
        Ok(next_id)
    }

    fn update_row(&self, conn: &Connection, id: i64, rec: &D::Rec) -> StoreResult<()> {
        let values = self.desc.bind_row(rec);
        let mut b = SqlBuilder::new(Dialect::Sqlite);
        b.push("UPDATE ");
        b.push_table(Some("main"), self.desc.table());
        b.push(" SET ");
        let mut first = true;
        for (col, value) in self.desc.columns().iter().zip(values).skip(1) {
            if !first {
                b.push(", ");
            }
            first = false;
            b.push_ident(col);
            b.push(" = ");
            b.push_value(value);
        }
        b.push(", \"tile\" = ");
        b.push_value(self.tile_value(rec));
        b.push(" WHERE ");
        b.push_ident(self.desc.id_column());
        b.push(" = ");
        b.bind(SqlValue::Integer(id));
        let (sql, params) = b.finish();
        exec(conn, &sql, &params)?;
        Ok(())
    }

    /// Id of an existing main row with the record's source key, for
    /// update-in-place dedup.
    fn dedup_id(&self, conn: &Connection, rec: &D::Rec) -> StoreResult<Option<i64>> {
        let Some(key) = rec.source_key() else {
            return Ok(None);
        };
        let mut b = SqlBuilder::new(Dialect::Sqlite);
        b.push("SELECT ");
        b.push_ident(self.desc.id_column());
        b.push(" FROM ");
        b.push_table(Some("main"), self.desc.table());
        b.push(" WHERE ");
        b.push_ident(self.desc.delete_key_column());
        b.push(" = ");
        b.bind(SqlValue::Text(key.to_string()));
        b.push(" LIMIT 1");
        let (sql, params) = b.finish();
        let rows = query_rows(conn, &sql, &params)?;
        match rows.first() {
            Some(row) => Ok(Some(row.get_i64(self.desc.id_column())?)),
            None => Ok(None),
        }
    }
}

impl<D: EntityDescriptor> QueryInterface for SqliteEngine<D> {
    type Rec = D::Rec;

    fn get(&mut self, id: i64, origin: Origin, mask: LoadMask) -> StoreResult<Self::Rec> {
        let mut core = self.lock();
        if origin == Origin::Aux && !core.has_aux() {
            return Ok(self.desc.empty());
        }
        let mut b = self.select(origin);
        b.push(" WHERE ");
        b.push_ident(self.desc.id_column());
        b.push(" = ");
        b.bind(SqlValue::Integer(id));
        if origin == Origin::Aux {
            b.push(" AND ");
            push_tombstone_filter(&mut b, self.desc.table(), self.desc.delete_key_column());
        }
        let mut recs = self.query_records(&core.conn, b, origin, mask)?;
        let Some(rec) = recs.pop() else {
            return Ok(self.desc.empty());
        };
        let mut recs = vec![rec];
        self.load_subtables_with(&mut core, &mut recs, mask)?;
        Ok(recs.pop().unwrap_or_else(|| self.desc.empty()))
    }

    fn load_first(&mut self, include_aux: bool, mask: LoadMask) -> StoreResult<Self::Rec> {
        let core = self.lock();
        self.cursor_next(&core, EntityAddress::main(0), include_aux, mask)
    }

    fn load_next(
        &mut self,
        current: &Self::Rec,
        include_aux: bool,
        mask: LoadMask,
    ) -> StoreResult<Self::Rec> {
        let core = self.lock();
        let after = if current.address().is_present() {
            current.address()
        } else {
            EntityAddress::main(0)
        };
        self.cursor_next(&core, after, include_aux, mask)
    }

    fn for_each(
        &mut self,
        sink: &mut dyn RecordSink<Self::Rec>,
        include_aux: bool,
        mask: LoadMask,
    ) -> StoreResult<()> {
        let mut core = self.lock();
        if !include_aux && !self.stream_deleted_keys(&core, sink)? {
            return Ok(());
        }
        self.scan_into_sink(&mut core, sink, None, include_aux, mask)
    }

    fn for_each_by_rect(
        &mut self,
        sink: &mut dyn RecordSink<Self::Rec>,
        rect: &Rect,
        include_aux: bool,
        mask: LoadMask,
    ) -> StoreResult<()> {
        let mut core = self.lock();
        self.scan_into_sink(&mut core, sink, Some(rect), include_aux, mask)
    }

    fn find_by_text(
        &mut self,
        column: Option<&str>,
        pattern: &str,
        escape: Option<char>,
        mode: TextMode,
        limit: Option<u32>,
        mask: LoadMask,
    ) -> StoreResult<Vec<Self::Rec>> {
        let columns: Vec<&str> = match column {
            Some(col) => vec![col],
            None => self.desc.text_columns().to_vec(),
        };
        if columns.is_empty() {
            return Err(StoreError::NoSearchableFields {
                table: self.desc.table().to_string(),
            });
        }
        let mut core = self.lock();
        let order = self.desc.order_column();
        let mut recs = self.find_merged(
            &mut core,
            |b, _origin, _core| {
                push_text_filter(b, &columns, pattern, escape, mode);
                Ok(())
            },
            Some(order),
            limit,
            mask,
            true,
        )?;
        self.load_subtables_with(&core, &mut recs, mask)?;
        Ok(recs)
    }

    fn find_by_time(
        &mut self,
        from: i64,
        to: i64,
        limit: Option<u32>,
        mask: LoadMask,
    ) -> StoreResult<Vec<Self::Rec>> {
        let columns = self.desc.time_columns();
        if columns.is_empty() {
            return Ok(Vec::new());
        }
        let columns = columns.to_vec();
        let mut core = self.lock();
        let order = self.desc.order_column();
        let mut recs = self.find_merged(
            &mut core,
            |b, _origin, _core| {
                push_time_filter(b, &columns, from, to);
                Ok(())
            },
            Some(order),
            limit,
            mask,
            true,
        )?;
        self.load_subtables_with(&core, &mut recs, mask)?;
        Ok(recs)
    }

    fn find_nearest(
        &mut self,
        pos: Pos,
        search_rect: &Rect,
        limit: Option<u32>,
        mask: LoadMask,
    ) -> StoreResult<Vec<Self::Rec>> {
        let mut core = self.lock();
        let table = self.desc.table().to_string();
        let id_column = self.desc.id_column().to_string();
        let is_area = self.desc.is_area();
        let mut recs = Vec::new();
        let mut origins = vec![Origin::Main];
        if core.has_aux() {
            origins.push(Origin::Aux);
        }
        for origin in origins {
            let native = core.has_native_index(&table, &id_column, origin)?;
            let mut b = self.select(origin);
            b.push(" WHERE ");
            push_spatial_filter(
                &mut b,
                Some(schema_name(origin)),
                &table,
                &id_column,
                search_rect,
                is_area,
                native,
            );
            if origin == Origin::Aux {
                b.push(" AND ");
                self.push_aux_read_filters(&mut b);
            }
            push_distance_order(&mut b, pos, is_area);
            if let Some(limit) = limit {
                b.push(&format!(" LIMIT {limit}"));
            }
            recs.extend(self.query_records(&core.conn, b, origin, mask)?);
        }
        // Final ranking over the merged set uses the same function the
        // SQL sort key projects, so both backends agree exactly.
        rank_by_distance(&mut recs, pos, limit);
        self.load_subtables_with(&core, &mut recs, mask)?;
        Ok(recs)
    }

    fn find_nulltile(
        &mut self,
        limit: Option<u32>,
        mask: LoadMask,
    ) -> StoreResult<Vec<Self::Rec>> {
        let core = self.lock();
        let mut b = self.select(Origin::Main);
        b.push(" WHERE \"tile\" IS NULL ORDER BY ");
        b.push_ident(self.desc.order_column());
        if let Some(limit) = limit {
            b.push(&format!(" LIMIT {limit}"));
        }
        self.query_records(&core.conn, b, Origin::Main, mask)
    }

    fn save(&mut self, rec: &mut Self::Rec) -> StoreResult<EntityAddress> {
        let mut core = self.lock();
        if core.is_read_only() {
            return Err(StoreError::ReadOnly);
        }
        let native = core.has_native_index(self.desc.table(), self.desc.id_column(), Origin::Main)?;
        let address = rec.address();
        let aux_key = if address.is_present() && address.origin == Origin::Aux {
            Some(
                rec.source_key()
                    .ok_or_else(|| StoreError::MissingKey {
                        table: self.desc.table().to_string(),
                    })?
                    .to_string(),
            )
        } else {
            None
        };

        let tx = core.conn.transaction()?;
        let id = if let Some(key) = aux_key {
            // Writes targeting an aux record land in main; the aux row is
            // masked by a tombstone.
            self.write_tombstone(&tx, &key)?;
            self.insert_row(&tx, rec)?
        } else if address.is_present() {
            self.update_row(&tx, address.id, rec)?;
            address.id
        } else if let Some(existing) = self.dedup_id(&tx, rec)? {
            self.update_row(&tx, existing, rec)?;
            existing
        } else {
            self.insert_row(&tx, rec)?
        };
        if native {
            self.refresh_shadow(&tx, id, rec)?;
        }
        tx.commit()?;

        let stored = EntityAddress::main(id);
        rec.set_address(stored);
        Ok(stored)
    }

    fn erase(&mut self, rec: &Self::Rec) -> StoreResult<()> {
        let mut core = self.lock();
        if core.is_read_only() {
            return Err(StoreError::ReadOnly);
        }
        let address = rec.address();
        if !address.is_present() {
            return Ok(());
        }
        match address.origin {
            Origin::Main => {
                let native =
                    core.has_native_index(self.desc.table(), self.desc.id_column(), Origin::Main)?;
                let tx = core.conn.transaction()?;
                exec(
                    &tx,
                    &format!(
                        "DELETE FROM \"main\".\"{table}\" WHERE \"{id}\" = ?",
                        table = self.desc.table(),
                        id = self.desc.id_column()
                    ),
                    &[SqlValue::Integer(address.id)],
                )?;
                if native {
                    exec(
                        &tx,
                        &format!(
                            "DELETE FROM \"main\".\"{}_rtree\" WHERE \"ID\" = ?",
                            self.desc.table()
                        ),
                        &[SqlValue::Integer(address.id)],
                    )?;
                }
                tx.commit()?;
            }
            Origin::Aux => {
                let key = rec
                    .source_key()
                    .ok_or_else(|| StoreError::MissingKey {
                        table: self.desc.table().to_string(),
                    })?
                    .to_string();
                let tx = core.conn.transaction()?;
                self.write_tombstone(&tx, &key)?;
                tx.commit()?;
            }
        }
        Ok(())
    }

    fn update_index(&mut self, rec: &Self::Rec) -> StoreResult<()> {
        let mut core = self.lock();
        if core.is_read_only() {
            return Err(StoreError::ReadOnly);
        }
        let address = rec.address();
        if !address.is_present() {
            return Ok(());
        }
        if address.origin == Origin::Aux {
            return Err(StoreError::ReadOnly);
        }
        let native = core.has_native_index(self.desc.table(), self.desc.id_column(), Origin::Main)?;
        let tx = core.conn.transaction()?;
        let mut b = SqlBuilder::new(Dialect::Sqlite);
        b.push("UPDATE ");
        b.push_table(Some("main"), self.desc.table());
        b.push(" SET \"tile\" = ");
        b.push_value(self.tile_value(rec));
        b.push(" WHERE ");
        b.push_ident(self.desc.id_column());
        b.push(" = ");
        b.bind(SqlValue::Integer(address.id));
        let (sql, params) = b.finish();
        exec(&tx, &sql, &params)?;
        if native {
            self.refresh_shadow(&tx, address.id, rec)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn load_subtables(&mut self, recs: &mut [Self::Rec], mask: LoadMask) -> StoreResult<()> {
        let core = self.lock();
        self.load_subtables_with(&core, recs, mask)
    }
}
