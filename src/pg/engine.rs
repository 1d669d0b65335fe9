//! Generic engine over the client/server backend.

use std::sync::{Arc, Mutex, MutexGuard};

use hashbrown::HashSet;

use crate::descriptor::{EntityDescriptor, SpatialRecord};
use crate::error::{StoreError, StoreResult};
use crate::geo::{Pos, Rect};
use crate::query::{QueryInterface, RecordSink, TextMode, apply_limit, rank_by_distance};
use crate::record::{EntityAddress, LoadMask, Origin, RowView, SqlValue};
use crate::sql::{
    Dialect, SqlBuilder, push_spatial_filter, push_text_filter, push_time_filter, select_from,
};
use crate::tile::{tile_from_pos, tile_from_rect};

use super::{PgCore, exec, query_rows};

/// Client/server-backend implementation of [`QueryInterface`].
///
/// Main and aux are separate server sessions, so the overlay semantics
/// (tombstone exclusion, main shadowing of aux ids) run client-side with
/// the same outcomes as the embedded backend's SQL-side filters.
pub struct PgEngine<D: EntityDescriptor> {
    core: Arc<Mutex<PgCore>>,
    desc: D,
}

impl<D: EntityDescriptor> PgEngine<D> {
    /// Creates an engine for one entity type on a shared core.
    pub fn new(core: Arc<Mutex<PgCore>>, desc: D) -> Self {
        Self { core, desc }
    }

    /// The plugged-in descriptor.
    pub fn descriptor(&self) -> &D {
        &self.desc
    }

    fn lock(&self) -> MutexGuard<'_, PgCore> {
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
            Dialect::Postgres,
            None,
            self.desc.table(),
            self.origin_columns(origin),
        )
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

    fn query_origin(
        &self,
        core: &mut PgCore,
        origin: Origin,
        builder: SqlBuilder,
        mask: LoadMask,
    ) -> StoreResult<Vec<D::Rec>> {
        let (sql, params) = builder.finish();
        let client = match origin {
            Origin::Main => &mut core.main,
            Origin::Aux => match core.aux.as_mut() {
                Some(client) => client,
                None => return Ok(Vec::new()),
            },
        };
        let rows = query_rows(client, &sql, &params)?;
        rows.iter()
            .map(|row| self.row_to_record(row, origin, mask))
            .collect()
    }

    fn tombstone_keys(&self, core: &mut PgCore) -> StoreResult<HashSet<String>> {
        let delete_key = self.desc.delete_key_column();
        let sql = format!(
            "SELECT \"{delete_key}\" FROM \"{}_deleted\"",
            self.desc.table()
        );
        let rows = query_rows(&mut core.main, &sql, &[])?;
        let mut keys = HashSet::new();
        for row in rows {
            keys.insert(row.get_text(delete_key)?);
        }
        Ok(keys)
    }

    /// Ids of main rows shadowing the given aux ids.
    fn shadowed_ids(&self, core: &mut PgCore, ids: &[i64]) -> StoreResult<HashSet<i64>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let id_column = self.desc.id_column();
        let list = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT \"{id_column}\" FROM \"{}\" WHERE \"{id_column}\" IN ({list})",
            self.desc.table()
        );
        let rows = query_rows(&mut core.main, &sql, &[])?;
        let mut out = HashSet::new();
        for row in rows {
            out.insert(row.get_i64(id_column)?);
        }
        Ok(out)
    }

    /// Applies the overlay semantics to aux-side results: rows shadowed
    /// by a main row with the same id or matching a tombstone disappear.
    fn filter_aux(&self, core: &mut PgCore, recs: Vec<D::Rec>) -> StoreResult<Vec<D::Rec>> {
        if recs.is_empty() {
            return Ok(recs);
        }
        let tombstones = self.tombstone_keys(core)?;
        let ids: Vec<i64> = recs.iter().map(|r| r.address().id).collect();
        let shadowed = self.shadowed_ids(core, &ids)?;
        Ok(recs
            .into_iter()
            .filter(|rec| {
                if shadowed.contains(&rec.address().id) {
                    return false;
                }
                match rec.source_key() {
                    Some(key) => !tombstones.contains(key),
                    None => true,
                }
            })
            .collect())
    }

    fn find_merged<F>(
        &self,
        core: &mut PgCore,
        mut push_filters: F,
        limit: Option<u32>,
        mask: LoadMask,
    ) -> StoreResult<Vec<D::Rec>>
    where
        F: FnMut(&mut SqlBuilder, Origin, &mut PgCore) -> StoreResult<()>,
    {
        let order = self.desc.order_column().to_string();
        let mut b = self.select(Origin::Main);
        b.push(" WHERE ");
        push_filters(&mut b, Origin::Main, core)?;
        b.push(" ORDER BY ");
        b.push_ident(&order);
        if let Some(limit) = limit {
            b.push(&format!(" LIMIT {limit}"));
        }
        let mut out = self.query_origin(core, Origin::Main, b, mask)?;

        if core.has_aux() {
            let mut b = self.select(Origin::Aux);
            b.push(" WHERE ");
            push_filters(&mut b, Origin::Aux, core)?;
            b.push(" ORDER BY ");
            b.push_ident(&order);
            let aux = self.query_origin(core, Origin::Aux, b, mask)?;
            out.extend(self.filter_aux(core, aux)?);
        }
        apply_limit(&mut out, limit);
        Ok(out)
    }

    fn cursor_next(
        &self,
        core: &mut PgCore,
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
            let recs = self.query_origin(core, Origin::Main, b, mask)?;
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
        core: &mut PgCore,
        after_id: i64,
        mask: LoadMask,
    ) -> StoreResult<D::Rec> {
        let tombstones = self.tombstone_keys(core)?;
        let mut after_id = after_id;
        loop {
            let mut b = self.select(Origin::Aux);
            b.push(" WHERE ");
            b.push_ident(self.desc.id_column());
            b.push(" > ");
            b.bind(SqlValue::Integer(after_id));
            b.push(" ORDER BY ");
            b.push_ident(self.desc.id_column());
            b.push(" LIMIT 1");
            let recs = self.query_origin(core, Origin::Aux, b, mask)?;
            let Some(rec) = recs.into_iter().next() else {
                return Ok(self.desc.empty());
            };
            let id = rec.address().id;
            let shadowed = !self.shadowed_ids(core, &[id])?.is_empty();
            let tombstoned = rec
                .source_key()
                .is_some_and(|key| tombstones.contains(key));
            if shadowed || tombstoned {
                after_id = id;
                continue;
            }
            return Ok(rec);
        }
    }

    fn stream_deleted_keys(
        &self,
        core: &mut PgCore,
        sink: &mut dyn RecordSink<D::Rec>,
    ) -> StoreResult<bool> {
        let delete_key = self.desc.delete_key_column();
        let sql = format!(
            "SELECT \"{delete_key}\" FROM \"{table}_deleted\" ORDER BY \"{delete_key}\"",
            table = self.desc.table()
        );
        for row in query_rows(&mut core.main, &sql, &[])? {
            if !sink.deleted_key(&row.get_text(delete_key)?) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn scan_into_sink(
        &self,
        core: &mut PgCore,
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
            if let Some(rect) = rect {
                let native =
                    core.has_native_index(self.desc.table(), self.desc.id_column(), origin)?;
                b.push(" WHERE ");
                push_spatial_filter(
                    &mut b,
                    None,
                    self.desc.table(),
                    self.desc.id_column(),
                    rect,
                    self.desc.is_area(),
                    native,
                );
            }
            b.push(" ORDER BY ");
            b.push_ident(self.desc.order_column());
            let mut recs = self.query_origin(core, origin, b, mask)?;
            if origin == Origin::Aux {
                recs = self.filter_aux(core, recs)?;
            }
            for rec in recs {
                if !sink.record(rec) {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    fn load_subtables_with(
        &self,
        core: &mut PgCore,
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
                let mut b = select_from(Dialect::Postgres, None, spec.table, spec.columns);
                b.push(" WHERE ");
                b.push_ident(spec.parent_key);
                b.push(" = ");
                b.bind(SqlValue::Integer(addr.id));
                let (sql, params) = b.finish();
                let client = match addr.origin {
                    Origin::Main => &mut core.main,
                    Origin::Aux => match core.aux.as_mut() {
                        Some(client) => client,
                        None => continue,
                    },
                };
                let rows = query_rows(client, &sql, &params)?;
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

    fn refresh_shadow<C: postgres::GenericClient>(
        &self,
        client: &mut C,
        id: i64,
        rec: &D::Rec,
    ) -> StoreResult<()> {
        let shadow = format!("{}_rtree", self.desc.table());
        exec(
            client,
            &format!("DELETE FROM \"{shadow}\" WHERE \"ID\" = $1"),
            &[SqlValue::Integer(id)],
        )?;
        if let Some((min_lat, max_lat, min_lon, max_lon)) = self.shadow_bounds(rec) {
            exec(
                client,
                &format!(
                    "INSERT INTO \"{shadow}\" \
                     (\"ID\", \"min_lat\", \"max_lat\", \"min_lon\", \"max_lon\") \
                     VALUES ($1, $2, $3, $4, $5)"
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

    fn write_tombstone<C: postgres::GenericClient>(
        &self,
        client: &mut C,
        key: &str,
    ) -> StoreResult<()> {
        let deleted = format!("{}_deleted", self.desc.table());
        let delete_key = self.desc.delete_key_column();
        exec(
            client,
            &format!(
                "INSERT INTO \"{deleted}\" (\"{delete_key}\") \
                 SELECT $1 WHERE NOT EXISTS \
                 (SELECT 1 FROM \"{deleted}\" WHERE \"{delete_key}\" = $2)"
            ),
            &[
                SqlValue::Text(key.to_string()),
                SqlValue::Text(key.to_string()),
            ],
        )?;
        Ok(())
    }

    fn insert_row<C: postgres::GenericClient>(
        &self,
        client: &mut C,
        rec: &D::Rec,
    ) -> StoreResult<i64> {
        let next_id_sql = format!(
            "SELECT COALESCE(MAX(\"{id}\"), 0) + 1 AS \"next_id\" FROM \"{table}\"",
            id = self.desc.id_column(),
            table = self.desc.table()
        );
        let rows = query_rows(client, &next_id_sql, &[])?;
        let next_id = match rows.first() {
            Some(row) => row.get_i64("next_id")?,
            None => 1,
        };

        let mut values = self.desc.bind_row(rec);
        values[0] = SqlValue::Integer(next_id);

        let mut b = SqlBuilder::new(Dialect::Postgres);
        b.push("INSERT INTO ");
        b.push_ident(self.desc.table());
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
        exec(client, &sql, &params)?;
        Ok(next_id)
    }

    fn update_row<C: postgres::GenericClient>(
        &self,
        client: &mut C,
        id: i64,
        rec: &D::Rec,
    ) -> StoreResult<()> {
        let values = self.desc.bind_row(rec);
        let mut b = SqlBuilder::new(Dialect::Postgres);
        b.push("UPDATE ");
        b.push_ident(self.desc.table());
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
        exec(client, &sql, &params)?;
        Ok(())
    }

    fn dedup_id<C: postgres::GenericClient>(
        &self,
        client: &mut C,
        rec: &D::Rec,
    ) -> StoreResult<Option<i64>> {
        let Some(key) = rec.source_key() else {
            return Ok(None);
        };
        let mut b = SqlBuilder::new(Dialect::Postgres);
        b.push("SELECT ");
        b.push_ident(self.desc.id_column());
        b.push(" FROM ");
        b.push_ident(self.desc.table());
        b.push(" WHERE ");
        b.push_ident(self.desc.delete_key_column());
        b.push(" = ");
        b.bind(SqlValue::Text(key.to_string()));
        b.push(" LIMIT 1");
        let (sql, params) = b.finish();
        let rows = query_rows(client, &sql, &params)?;
        match rows.first() {
            Some(row) => Ok(Some(row.get_i64(self.desc.id_column())?)),
            None => Ok(None),
        }
    }
}

impl<D: EntityDescriptor> QueryInterface for PgEngine<D> {
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
        let mut recs = self.query_origin(&mut core, origin, b, mask)?;
        if origin == Origin::Aux {
            // Tombstones also suppress addressed lookups.
            let tombstones = self.tombstone_keys(&mut core)?;
            recs.retain(|rec| {
                rec.source_key()
                    .map_or(true, |key| !tombstones.contains(key))
            });
        }
        let Some(rec) = recs.pop() else {
            return Ok(self.desc.empty());
        };
        let mut recs = vec![rec];
        self.load_subtables_with(&mut core, &mut recs, mask)?;
        Ok(recs.pop().unwrap_or_else(|| self.desc.empty()))
    }

    fn load_first(&mut self, include_aux: bool, mask: LoadMask) -> StoreResult<Self::Rec> {
        let mut core = self.lock();
        self.cursor_next(&mut core, EntityAddress::main(0), include_aux, mask)
    }

    fn load_next(
        &mut self,
        current: &Self::Rec,
        include_aux: bool,
        mask: LoadMask,
    ) -> StoreResult<Self::Rec> {
        let mut core = self.lock();
        let after = if current.address().is_present() {
            current.address()
        } else {
            EntityAddress::main(0)
        };
        self.cursor_next(&mut core, after, include_aux, mask)
    }

    fn for_each(
        &mut self,
        sink: &mut dyn RecordSink<Self::Rec>,
        include_aux: bool,
        mask: LoadMask,
    ) -> StoreResult<()> {
        let mut core = self.lock();
        if !include_aux && !self.stream_deleted_keys(&mut core, sink)? {
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
        let mut recs = self.find_merged(
            &mut core,
            |b, _origin, _core| {
                push_text_filter(b, &columns, pattern, escape, mode);
                Ok(())
            },
            limit,
            mask,
        )?;
        self.load_subtables_with(&mut core, &mut recs, mask)?;
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
        let mut recs = self.find_merged(
            &mut core,
            |b, _origin, _core| {
                push_time_filter(b, &columns, from, to);
                Ok(())
            },
            limit,
            mask,
        )?;
        self.load_subtables_with(&mut core, &mut recs, mask)?;
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
        let mut recs = Vec::new();
        let mut origins = vec![Origin::Main];
        if core.has_aux() {
            origins.push(Origin::Aux);
        }
        for origin in origins {
            let native =
                core.has_native_index(self.desc.table(), self.desc.id_column(), origin)?;
            let mut b = self.select(origin);
            b.push(" WHERE ");
            push_spatial_filter(
                &mut b,
                None,
                self.desc.table(),
                self.desc.id_column(),
                search_rect,
                self.desc.is_area(),
                native,
            );
            let mut found = self.query_origin(&mut core, origin, b, mask)?;
            if origin == Origin::Aux {
                found = self.filter_aux(&mut core, found)?;
            }
            recs.extend(found);
        }
        // The ranking function is the same Rust code the embedded backend
        // registers as its SQL sort key, so both backends agree exactly.
        rank_by_distance(&mut recs, pos, limit);
        self.load_subtables_with(&mut core, &mut recs, mask)?;
        Ok(recs)
    }

    fn find_nulltile(
        &mut self,
        limit: Option<u32>,
        mask: LoadMask,
    ) -> StoreResult<Vec<Self::Rec>> {
        let mut core = self.lock();
        let mut b = self.select(Origin::Main);
        b.push(" WHERE \"tile\" IS NULL ORDER BY ");
        b.push_ident(self.desc.order_column());
        if let Some(limit) = limit {
            b.push(&format!(" LIMIT {limit}"));
        }
        self.query_origin(&mut core, Origin::Main, b, mask)
    }

    fn save(&mut self, rec: &mut Self::Rec) -> StoreResult<EntityAddress> {
        let mut core = self.lock();
        if core.is_read_only() {
            return Err(StoreError::ReadOnly);
        }
        let native =
            core.has_native_index(self.desc.table(), self.desc.id_column(), Origin::Main)?;
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

        let mut tx = core.main.transaction()?;
        let id = if let Some(key) = aux_key {
            self.write_tombstone(&mut tx, &key)?;
            self.insert_row(&mut tx, rec)?
        } else if address.is_present() {
            self.update_row(&mut tx, address.id, rec)?;
            address.id
        } else if let Some(existing) = self.dedup_id(&mut tx, rec)? {
            self.update_row(&mut tx, existing, rec)?;
            existing
        } else {
            self.insert_row(&mut tx, rec)?
        };
        if native {
            self.refresh_shadow(&mut tx, id, rec)?;
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
                let mut tx = core.main.transaction()?;
                exec(
                    &mut tx,
                    &format!(
                        "DELETE FROM \"{table}\" WHERE \"{id}\" = $1",
                        table = self.desc.table(),
                        id = self.desc.id_column()
                    ),
                    &[SqlValue::Integer(address.id)],
                )?;
                if native {
                    exec(
                        &mut tx,
                        &format!(
                            "DELETE FROM \"{}_rtree\" WHERE \"ID\" = $1",
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
                let mut tx = core.main.transaction()?;
                self.write_tombstone(&mut tx, &key)?;
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
        let native =
            core.has_native_index(self.desc.table(), self.desc.id_column(), Origin::Main)?;
        let mut tx = core.main.transaction()?;
        let mut b = SqlBuilder::new(Dialect::Postgres);
        b.push("UPDATE ");
        b.push_ident(self.desc.table());
        b.push(" SET \"tile\" = ");
        b.push_value(self.tile_value(rec));
        b.push(" WHERE ");
        b.push_ident(self.desc.id_column());
        b.push(" = ");
        b.bind(SqlValue::Integer(address.id));
        let (sql, params) = b.finish();
        exec(&mut tx, &sql, &params)?;
        if native {
            self.refresh_shadow(&mut tx, address.id, rec)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn load_subtables(&mut self, recs: &mut [Self::Rec], mask: LoadMask) -> StoreResult<()> {
        let mut core = self.lock();
        self.load_subtables_with(&mut core, recs, mask)
    }
}
