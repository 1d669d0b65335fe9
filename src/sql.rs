//! Dialect-aware SQL construction shared by both generic engines.
//!
//! The spatial filter, text filter, and time filter are built here once,
//! parameterized only by dialect and by whether a native spatial index
//! exists, so the two engines cannot diverge in predicate semantics.

use crate::geo::{LON_CIRCLE, Pos, Rect};
use crate::query::{TextMode, prefix_upper};
use crate::record::SqlValue;
use crate::tile::{TileCover, tile_range};

/// SQL dialect of the producing backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Embedded backend: `?` placeholders, registered scalar functions,
    /// NOCASE collation.
    Sqlite,
    /// Client/server backend: `$n` placeholders, `upper()`/`ILIKE` for
    /// case folding, distance ranking done client-side.
    Postgres,
}

/// Incremental statement builder carrying SQL text and bind values.
#[derive(Debug)]
pub struct SqlBuilder {
    dialect: Dialect,
    sql: String,
    params: Vec<SqlValue>,
}

impl SqlBuilder {
    /// Empty builder for the dialect.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Dialect this builder emits.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Appends raw SQL text.
    pub fn push(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    /// Appends a quoted identifier.
    pub fn push_ident(&mut self, name: &str) {
        self.sql.push('"');
        self.sql.push_str(&name.replace('"', "\"\""));
        self.sql.push('"');
    }

    /// Appends a table reference with an optional schema qualifier.
    pub fn push_table(&mut self, qualifier: Option<&str>, name: &str) {
        if let Some(schema) = qualifier {
            self.push_ident(schema);
            self.sql.push('.');
        }
        self.push_ident(name);
    }

    /// Appends a placeholder and records the bind value.
    pub fn bind(&mut self, value: SqlValue) {
        self.params.push(value);
        match self.dialect {
            Dialect::Sqlite => self.sql.push('?'),
            Dialect::Postgres => {
                self.sql.push('$');
                self.sql.push_str(&self.params.len().to_string());
            }
        }
    }

    /// Appends a value, inlining NULL as a literal so the client/server
    /// backend never has to infer the type of a null parameter.
    pub fn push_value(&mut self, value: SqlValue) {
        if matches!(value, SqlValue::Null) {
            self.push("NULL");
        } else {
            self.bind(value);
        }
    }

    /// SQL text so far.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Consumes the builder into SQL text and bind values.
    pub fn finish(self) -> (String, Vec<SqlValue>) {
        (self.sql, self.params)
    }
}

/// Starts a `SELECT <columns> FROM <table>` statement.
pub fn select_from(
    dialect: Dialect,
    qualifier: Option<&str>,
    table: &str,
    columns: &[&str],
) -> SqlBuilder {
    let mut b = SqlBuilder::new(dialect);
    b.push("SELECT ");
    for (i, col) in columns.iter().enumerate() {
        if i > 0 {
            b.push(", ");
        }
        b.push_ident(col);
    }
    b.push(" FROM ");
    b.push_table(qualifier, table);
    b
}

/// Escapes LIKE metacharacters in a contains pattern with `\`.
pub fn escape_like(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn push_like(b: &mut SqlBuilder, column: &str, pattern: &str, escape: char) {
    b.push_ident(column);
    match b.dialect() {
        // SQLite LIKE is case-insensitive for ASCII; ILIKE matches that
        // behavior on the client/server side.
        Dialect::Sqlite => b.push(" LIKE "),
        Dialect::Postgres => b.push(" ILIKE "),
    }
    b.bind(SqlValue::Text(pattern.to_string()));
    b.push(" ESCAPE '");
    if escape == '\'' {
        b.push("''");
    } else {
        let mut buf = [0u8; 4];
        b.push(escape.encode_utf8(&mut buf));
    }
    b.push("'");
}

/// Appends one text predicate for `column` under the given mode.
fn push_text_column(b: &mut SqlBuilder, column: &str, pattern: &str, escape: Option<char>, mode: TextMode) {
    match mode {
        TextMode::StartsWith => {
            b.push("(");
            match b.dialect() {
                Dialect::Sqlite => {
                    b.push_ident(column);
                    b.push(" COLLATE NOCASE >= ");
                    b.bind(SqlValue::Text(pattern.to_string()));
                    if prefix_upper(pattern).is_some() {
                        b.push(" AND ");
                        b.push_ident(column);
                        b.push(" COLLATE NOCASE < prefix_upper(");
                        b.bind(SqlValue::Text(pattern.to_string()));
                        b.push(")");
                    }
                }
                Dialect::Postgres => {
                    b.push("upper(");
                    b.push_ident(column);
                    b.push(") >= upper(");
                    b.bind(SqlValue::Text(pattern.to_string()));
                    b.push(")");
                    if let Some(upper) = prefix_upper(pattern) {
                        b.push(" AND upper(");
                        b.push_ident(column);
                        b.push(") < upper(");
                        b.bind(SqlValue::Text(upper));
                        b.push(")");
                    }
                }
            }
            b.push(")");
        }
        TextMode::Exact => match b.dialect() {
            Dialect::Sqlite => {
                b.push_ident(column);
                b.push(" COLLATE NOCASE = ");
                b.bind(SqlValue::Text(pattern.to_string()));
            }
            Dialect::Postgres => {
                b.push("upper(");
                b.push_ident(column);
                b.push(") = upper(");
                b.bind(SqlValue::Text(pattern.to_string()));
                b.push(")");
            }
        },
        TextMode::ExactCaseSensitive => {
            b.push_ident(column);
            b.push(" = ");
            b.bind(SqlValue::Text(pattern.to_string()));
        }
        TextMode::Contains => {
            let escaped = format!("%{}%", escape_like(pattern));
            push_like(b, column, &escaped, '\\');
        }
        TextMode::Like => {
            push_like(b, column, pattern, escape.unwrap_or('\\'));
        }
    }
}

/// Appends the text filter OR-ed across `columns`, parenthesized.
pub fn push_text_filter(
    b: &mut SqlBuilder,
    columns: &[&str],
    pattern: &str,
    escape: Option<char>,
    mode: TextMode,
) {
    b.push("(");
    for (i, col) in columns.iter().enumerate() {
        if i > 0 {
            b.push(" OR ");
        }
        push_text_column(b, col, pattern, escape, mode);
    }
    b.push(")");
}

/// Appends the inclusive time-range filter OR-ed across `columns`.
pub fn push_time_filter(b: &mut SqlBuilder, columns: &[&str], from: i64, to: i64) {
    b.push("(");
    for (i, col) in columns.iter().enumerate() {
        if i > 0 {
            b.push(" OR ");
        }
        b.push_ident(col);
        b.push(" BETWEEN ");
        b.bind(SqlValue::Integer(from));
        b.push(" AND ");
        b.bind(SqlValue::Integer(to));
    }
    b.push(")");
}

/// Appends the spatial rectangle filter, parenthesized.
///
/// With a native index the filter is the box-overlap subselect against
/// the `_rtree` shadow table. Without one it is the quadtree tile
/// pre-filter AND-ed with the exact bounding predicate; the longitude
/// side of the exact predicate always runs the three offset hypotheses
/// against the unwrapped east bound, so antimeridian-crossing boxes take
/// the same path as ordinary ones.
pub fn push_spatial_filter(
    b: &mut SqlBuilder,
    qualifier: Option<&str>,
    table: &str,
    id_column: &str,
    rect: &Rect,
    is_area: bool,
    has_native_index: bool,
) {
    b.push("(");
    if has_native_index {
        push_native_filter(b, qualifier, table, id_column, rect);
    } else {
        if push_tile_filter(b, rect, is_area) {
            b.push(" AND ");
        }
        if is_area {
            push_exact_area_filter(b, rect);
        } else {
            push_exact_point_filter(b, rect);
        }
    }
    b.push(")");
}

fn push_native_filter(
    b: &mut SqlBuilder,
    qualifier: Option<&str>,
    table: &str,
    id_column: &str,
    rect: &Rect,
) {
    b.push_ident(id_column);
    b.push(" IN (SELECT \"ID\" FROM ");
    b.push_table(qualifier, &format!("{table}_rtree"));
    b.push(" WHERE \"max_lat\" >= ");
    b.bind(SqlValue::Integer(i64::from(rect.south())));
    b.push(" AND \"min_lat\" <= ");
    b.bind(SqlValue::Integer(i64::from(rect.north())));
    b.push(" AND \"min_lon\" <= ");
    b.bind(SqlValue::Integer(rect.east_unwrapped() as i64));
    b.push(" AND \"max_lon\" >= ");
    b.bind(SqlValue::Integer(i64::from(rect.west())));
    b.push(")");
}

/// Appends the tile pre-filter. Returns false when tile filtering is
/// unavailable for this rectangle and only the exact predicate applies.
fn push_tile_filter(b: &mut SqlBuilder, rect: &Rect, is_area: bool) -> bool {
    if is_area {
        // Area tiles are coarse ancestor cells; match the whole
        // ancestor/descendant ladder of the enclosing sibling range. The
        // ladder is a superset filter, made exact by the bbox predicate.
        let (lo, hi) = tile_range(rect);
        let mut ranges: Vec<(u32, u32)> = Vec::new();
        for shift in (0..=crate::tile::TILE_BITS).step_by(2) {
            let pair = (lo >> shift, hi >> shift);
            if ranges.last() != Some(&pair) {
                ranges.push(pair);
            }
        }
        b.push("(");
        for (i, (lo, hi)) in ranges.iter().enumerate() {
            if i > 0 {
                b.push(" OR ");
            }
            b.push("\"tile\" BETWEEN ");
            b.push(&lo.to_string());
            b.push(" AND ");
            b.push(&hi.to_string());
        }
        b.push(")");
        return true;
    }

    let cover = TileCover::new(rect);
    if !cover.is_available() {
        return false;
    }
    let spans: Vec<_> = cover.collect();
    if spans.iter().all(|s| s.min == s.max) {
        b.push("\"tile\" IN (");
        for (i, span) in spans.iter().enumerate() {
            if i > 0 {
                b.push(", ");
            }
            b.push(&span.min.to_string());
        }
        b.push(")");
    } else {
        b.push("(");
        for (i, span) in spans.iter().enumerate() {
            if i > 0 {
                b.push(" OR ");
            }
            b.push("\"tile\" BETWEEN ");
            b.push(&span.min.to_string());
            b.push(" AND ");
            b.push(&span.max.to_string());
        }
        b.push(")");
    }
    true
}

fn push_exact_point_filter(b: &mut SqlBuilder, rect: &Rect) {
    b.push("(\"laty\" BETWEEN ");
    b.bind(SqlValue::Integer(i64::from(rect.south())));
    b.push(" AND ");
    b.bind(SqlValue::Integer(i64::from(rect.north())));
    b.push(") AND (");
    let west = i64::from(rect.west());
    let east = rect.east_unwrapped() as i64;
    for (i, offset) in [0i64, -(LON_CIRCLE as i64), LON_CIRCLE as i64]
        .iter()
        .enumerate()
    {
        if i > 0 {
            b.push(" OR ");
        }
        b.push("\"lonx\" + ");
        b.push(&offset.to_string());
        b.push(" BETWEEN ");
        b.bind(SqlValue::Integer(west));
        b.push(" AND ");
        b.bind(SqlValue::Integer(east));
    }
    b.push(")");
}

fn push_exact_area_filter(b: &mut SqlBuilder, rect: &Rect) {
    b.push("(\"max_laty\" >= ");
    b.bind(SqlValue::Integer(i64::from(rect.south())));
    b.push(" AND \"min_laty\" <= ");
    b.bind(SqlValue::Integer(i64::from(rect.north())));
    b.push(") AND (");
    let west = i64::from(rect.west());
    let east = rect.east_unwrapped() as i64;
    for (i, offset) in [0i64, -(LON_CIRCLE as i64), LON_CIRCLE as i64]
        .iter()
        .enumerate()
    {
        if i > 0 {
            b.push(" OR ");
        }
        b.push("(\"min_lonx\" + ");
        b.push(&offset.to_string());
        b.push(" <= ");
        b.bind(SqlValue::Integer(east));
        b.push(" AND \"max_lonx\" + ");
        b.push(&offset.to_string());
        b.push(" >= ");
        b.bind(SqlValue::Integer(west));
        b.push(")");
    }
    b.push(")");
}

/// Appends the approximate-distance sort key for the embedded backend,
/// which projects the registered scalar functions.
pub fn push_distance_order(b: &mut SqlBuilder, pos: Pos, is_area: bool) {
    b.push(" ORDER BY ");
    if is_area {
        b.push("geo_rect_dist_sq(");
        b.bind(SqlValue::Integer(i64::from(pos.lonx)));
        b.push(", ");
        b.bind(SqlValue::Integer(i64::from(pos.laty)));
        b.push(", \"min_lonx\", \"min_laty\", \"max_lonx\", \"max_laty\")");
    } else {
        b.push("geo_dist_sq(");
        b.bind(SqlValue::Integer(i64::from(pos.lonx)));
        b.push(", ");
        b.bind(SqlValue::Integer(i64::from(pos.laty)));
        b.push(", \"lonx\", \"laty\")");
    }
}

/// Appends the tombstone exclusion for aux-side scans on the embedded
/// backend, where main and aux share one connection.
pub fn push_tombstone_filter(b: &mut SqlBuilder, table: &str, delete_key_column: &str) {
    b.push_ident(delete_key_column);
    b.push(" NOT IN (SELECT ");
    b.push_ident(delete_key_column);
    b.push(" FROM ");
    b.push_table(Some("main"), &format!("{table}_deleted"));
    b.push(")");
}
