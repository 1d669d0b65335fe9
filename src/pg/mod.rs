//! Client/server-SQL backend built on the synchronous postgres client.
//!
//! Unlike the embedded backend, main and aux are separate server
//! connections, so cross-database predicates (tombstone exclusion, main
//! shadowing of aux ids) are evaluated client-side, and the distance
//! ranking of `find_nearest` is computed in the client instead of a
//! registered SQL function. The result sets match the embedded backend
//! exactly.

/// Generic engine over the client/server backend.
pub mod engine;

pub use engine::PgEngine;

use hashbrown::HashMap;
use postgres::types::{ToSql, Type};
use postgres::{CancelToken, Client, GenericClient, NoTls, Row};
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::record::{Origin, RowView, SqlValue};

/// Connection core for the client/server backend.
pub struct PgCore {
    pub(crate) main: Client,
    pub(crate) aux: Option<Client>,
    read_only: bool,
    rtree_probe: HashMap<(String, Origin), bool>,
    cancel: CancelToken,
}

/// Cross-thread cancellation handle for an in-flight query.
pub struct PgInterruptHandle {
    token: CancelToken,
}

impl PgInterruptHandle {
    /// Requests cancellation; the interrupted call returns
    /// [`StoreError::Interrupted`]. Best-effort: a failure to reach the
    /// server is logged and ignored.
    pub fn interrupt(&self) {
        if let Err(err) = self.token.cancel_query(NoTls) {
            warn!(%err, "query cancel failed");
        }
    }
}

impl PgCore {
    /// Connects the primary session using a libpq-style parameter string.
    pub fn open(params: &str, config: &StoreConfig) -> StoreResult<Self> {
        Self::open_session(params, config, false)
    }

    /// Connects the primary session read-only.
    pub fn open_read_only(params: &str, config: &StoreConfig) -> StoreResult<Self> {
        Self::open_session(params, config, true)
    }

    fn open_session(params: &str, config: &StoreConfig, read_only: bool) -> StoreResult<Self> {
        let mut client = Client::connect(params, NoTls).map_err(open_error)?;
        apply_session_config(&mut client, config, read_only).map_err(open_error)?;
        let cancel = client.cancel_token();
        debug!(read_only, "postgres session open");
        Ok(Self {
            main: client,
            aux: None,
            read_only,
            rtree_probe: HashMap::new(),
            cancel,
        })
    }

    /// Attaches a second, read-only server session as the aux overlay.
    pub fn attach(&mut self, params: &str) -> StoreResult<()> {
        let mut client = Client::connect(params, NoTls).map_err(open_error)?;
        client
            .batch_execute("SET default_transaction_read_only = on")
            .map_err(open_error)?;
        self.aux = Some(client);
        self.rtree_probe.clear();
        debug!("aux session attached");
        Ok(())
    }

    /// Drops the aux session.
    pub fn detach(&mut self) -> StoreResult<()> {
        if self.aux.take().is_some() {
            self.rtree_probe.clear();
            debug!("aux session detached");
        }
        Ok(())
    }

    /// True while an aux session is attached.
    pub fn has_aux(&self) -> bool {
        self.aux.is_some()
    }

    /// True when the session refuses mutations.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Handle for cancelling an in-flight query from another thread.
    pub fn interrupt_handle(&self) -> PgInterruptHandle {
        PgInterruptHandle {
            token: self.cancel.clone(),
        }
    }

    fn client_mut(&mut self, origin: Origin) -> Option<&mut Client> {
        match origin {
            Origin::Main => Some(&mut self.main),
            Origin::Aux => self.aux.as_mut(),
        }
    }

    /// Probes for a usable native spatial index, mirroring the embedded
    /// backend: shadow table present and its first ID present in the base
    /// table. Cached until the aux attachment changes.
    pub fn has_native_index(
        &mut self,
        table: &str,
        id_column: &str,
        origin: Origin,
    ) -> StoreResult<bool> {
        if origin == Origin::Aux && self.aux.is_none() {
            return Ok(false);
        }
        let key = (table.to_string(), origin);
        if let Some(&known) = self.rtree_probe.get(&key) {
            return Ok(known);
        }
        let shadow = format!("{table}_rtree");
        let client = match self.client_mut(origin) {
            Some(client) => client,
            None => return Ok(false),
        };
        let exists = !client
            .query(
                "SELECT 1 FROM information_schema.tables WHERE table_name = $1",
                &[&shadow],
            )?
            .is_empty();
        let found = if !exists {
            false
        } else {
            let first_sql = format!("SELECT \"ID\" FROM \"{shadow}\" ORDER BY \"ID\" LIMIT 1");
            let first = client.query(first_sql.as_str(), &[])?;
            match first.first() {
                None => true,
                Some(row) => {
                    let first_id: i64 = row.try_get(0)?;
                    let agree_sql =
                        format!("SELECT 1 FROM \"{table}\" WHERE \"{id_column}\" = $1");
                    !client.query(agree_sql.as_str(), &[&first_id])?.is_empty()
                }
            }
        };
        self.rtree_probe.insert(key, found);
        Ok(found)
    }

    /// Runs raw DDL/SQL batches on the primary session. The engines
    /// never create schema; this is the hook the external
    /// schema-reflection collaborator uses.
    pub fn execute_batch(&mut self, sql: &str) -> StoreResult<()> {
        self.main.batch_execute(sql)?;
        Ok(())
    }

    /// Best-effort statistics refresh; failures are logged, not raised.
    pub fn analyze(&mut self) {
        if let Err(err) = self.main.batch_execute("ANALYZE") {
            warn!(%err, "analyze failed");
        }
    }

    /// Best-effort storage compaction; failures are logged, not raised.
    pub fn vacuum(&mut self) {
        if let Err(err) = self.main.batch_execute("VACUUM") {
            warn!(%err, "vacuum failed");
        }
    }
}

fn open_error(err: postgres::Error) -> StoreError {
    StoreError::Open {
        detail: err.to_string(),
    }
}

fn apply_session_config(
    client: &mut Client,
    config: &StoreConfig,
    read_only: bool,
) -> Result<(), postgres::Error> {
    if config.force_sync_off {
        client.batch_execute("SET synchronous_commit = off")?;
    }
    if config.cache_size_kb.is_some() {
        // No client-settable equivalent of a page-cache budget.
        debug!("cache size hint ignored on client/server backend");
    }
    if config.exclusive {
        debug!("exclusive locking is server-managed on client/server backend");
    }
    if read_only {
        client.batch_execute("SET default_transaction_read_only = on")?;
    }
    Ok(())
}

/// Borrows bind values as postgres parameters. NULLs never reach this
/// point; the SQL builder inlines them as literals.
pub(crate) fn pg_params(values: &[SqlValue]) -> Vec<&(dyn ToSql + Sync)> {
    const NULL: Option<i64> = None;
    values
        .iter()
        .map(|value| match value {
            SqlValue::Null => &NULL as &(dyn ToSql + Sync),
            SqlValue::Integer(v) => v as &(dyn ToSql + Sync),
            SqlValue::Real(v) => v as &(dyn ToSql + Sync),
            SqlValue::Text(v) => v as &(dyn ToSql + Sync),
            SqlValue::Blob(v) => v as &(dyn ToSql + Sync),
        })
        .collect()
}

fn row_to_view(row: &Row) -> StoreResult<RowView> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());
    for (i, col) in row.columns().iter().enumerate() {
        columns.push(col.name().to_string());
        let ty = col.type_();
        let value = if *ty == Type::INT8 {
            row.try_get::<_, Option<i64>>(i)?
                .map_or(SqlValue::Null, SqlValue::Integer)
        } else if *ty == Type::INT4 {
            row.try_get::<_, Option<i32>>(i)?
                .map_or(SqlValue::Null, |v| SqlValue::Integer(i64::from(v)))
        } else if *ty == Type::INT2 {
            row.try_get::<_, Option<i16>>(i)?
                .map_or(SqlValue::Null, |v| SqlValue::Integer(i64::from(v)))
        } else if *ty == Type::FLOAT8 {
            row.try_get::<_, Option<f64>>(i)?
                .map_or(SqlValue::Null, SqlValue::Real)
        } else if *ty == Type::FLOAT4 {
            row.try_get::<_, Option<f32>>(i)?
                .map_or(SqlValue::Null, |v| SqlValue::Real(f64::from(v)))
        } else if *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR {
            row.try_get::<_, Option<String>>(i)?
                .map_or(SqlValue::Null, SqlValue::Text)
        } else if *ty == Type::BYTEA {
            row.try_get::<_, Option<Vec<u8>>>(i)?
                .map_or(SqlValue::Null, SqlValue::Blob)
        } else if *ty == Type::BOOL {
            row.try_get::<_, Option<bool>>(i)?
                .map_or(SqlValue::Null, |v| SqlValue::Integer(i64::from(v)))
        } else {
            return Err(StoreError::ColumnType {
                column: col.name().to_string(),
                found: "unsupported",
            });
        };
        values.push(value);
    }
    Ok(RowView::new(columns, values))
}

/// Runs a query on any client or transaction and materializes the rows.
pub(crate) fn query_rows<C: GenericClient>(
    client: &mut C,
    sql: &str,
    params: &[SqlValue],
) -> StoreResult<Vec<RowView>> {
    let rows = client.query(sql, &pg_params(params))?;
    rows.iter().map(row_to_view).collect()
}

/// Executes one statement on any client or transaction.
pub(crate) fn exec<C: GenericClient>(
    client: &mut C,
    sql: &str,
    params: &[SqlValue],
) -> StoreResult<u64> {
    Ok(client.execute(sql, &pg_params(params))?)
}
