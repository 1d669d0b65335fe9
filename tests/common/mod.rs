#![allow(dead_code)]

use navstore::descriptor::{EntityDescriptor, SpatialRecord, SubtableSpec};
use navstore::error::StoreResult;
use navstore::geo::{Pos, Rect};
use navstore::record::{EntityAddress, LoadMask, RowView, SqlValue};

/// Point-entity fixture modelled on a radio navaid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Navaid {
    pub address: EntityAddress,
    pub ident: String,
    pub name: String,
    pub region: String,
    pub freq_hz: Option<i64>,
    pub mod_time: Option<i64>,
    pub source_id: Option<String>,
    pub pos: Option<Pos>,
    pub remarks: Vec<String>,
}

impl SpatialRecord for Navaid {
    fn address(&self) -> EntityAddress {
        self.address
    }

    fn set_address(&mut self, address: EntityAddress) {
        self.address = address;
    }

    fn pos(&self) -> Option<Pos> {
        self.pos
    }

    fn source_key(&self) -> Option<&str> {
        self.source_id.as_deref()
    }
}

pub struct NavaidTable;

const NAVAID_COLUMNS: &[&str] = &[
    "navaid_id",
    "ident",
    "name",
    "region",
    "freq",
    "mod_time",
    "source_id",
    "lonx",
    "laty",
];

const NAVAID_SUBTABLES: &[SubtableSpec] = &[SubtableSpec {
    table: "navaid_remark",
    parent_key: "navaid_id",
    columns: &["navaid_id", "remark"],
}];

impl EntityDescriptor for NavaidTable {
    type Rec = Navaid;

    fn table(&self) -> &str {
        "navaid"
    }

    fn columns(&self) -> &[&str] {
        NAVAID_COLUMNS
    }

    fn text_columns(&self) -> &[&str] {
        &["ident", "name"]
    }

    fn time_columns(&self) -> &[&str] {
        &["mod_time"]
    }

    fn order_column(&self) -> &str {
        "navaid_id"
    }

    fn delete_key_column(&self) -> &str {
        "source_id"
    }

    fn is_area(&self) -> bool {
        false
    }

    fn empty(&self) -> Navaid {
        Navaid::default()
    }

    fn read_row(&self, row: &RowView, mask: LoadMask) -> StoreResult<Navaid> {
        let mut rec = Navaid {
            ident: row.get_text("ident")?,
            source_id: row.get_opt_text("source_id")?,
            ..Navaid::default()
        };
        if mask.contains(LoadMask::ATTRIBUTES) {
            rec.name = row.get_text("name")?;
            rec.region = row.get_text("region")?;
            rec.freq_hz = row.get_opt_i64("freq")?;
            rec.mod_time = row.get_opt_i64("mod_time")?;
        }
        if mask.contains(LoadMask::GEOMETRY) {
            rec.pos = match (row.get_opt_i64("lonx")?, row.get_opt_i64("laty")?) {
                (Some(lonx), Some(laty)) => Some(Pos::new(lonx as u32, laty as i32)),
                _ => None,
            };
        }
        Ok(rec)
    }

    fn bind_row(&self, rec: &Navaid) -> Vec<SqlValue> {
        vec![
            SqlValue::Integer(rec.address.id),
            SqlValue::Text(rec.ident.clone()),
            SqlValue::Text(rec.name.clone()),
            SqlValue::Text(rec.region.clone()),
            SqlValue::opt_integer(rec.freq_hz),
            SqlValue::opt_integer(rec.mod_time),
            SqlValue::opt_text(rec.source_id.as_deref()),
            SqlValue::opt_integer(rec.pos.map(|p| i64::from(p.lonx))),
            SqlValue::opt_integer(rec.pos.map(|p| i64::from(p.laty))),
        ]
    }

    fn subtables(&self) -> &[SubtableSpec] {
        NAVAID_SUBTABLES
    }

    fn attach_subtable(&self, rec: &mut Navaid, _index: usize, rows: Vec<RowView>) {
        rec.remarks = rows
            .iter()
            .filter_map(|row| row.get_text("remark").ok())
            .collect();
    }
}

/// Area-entity fixture modelled on an airspace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Airspace {
    pub address: EntityAddress,
    pub name: String,
    pub source_id: Option<String>,
    pub bbox: Option<Rect>,
}

impl SpatialRecord for Airspace {
    fn address(&self) -> EntityAddress {
        self.address
    }

    fn set_address(&mut self, address: EntityAddress) {
        self.address = address;
    }

    fn bbox(&self) -> Option<Rect> {
        self.bbox
    }

    fn source_key(&self) -> Option<&str> {
        self.source_id.as_deref()
    }
}

pub struct AirspaceTable;

const AIRSPACE_COLUMNS: &[&str] = &[
    "airspace_id",
    "name",
    "source_id",
    "min_lonx",
    "max_lonx",
    "min_laty",
    "max_laty",
];

impl EntityDescriptor for AirspaceTable {
    type Rec = Airspace;

    fn table(&self) -> &str {
        "airspace"
    }

    fn columns(&self) -> &[&str] {
        AIRSPACE_COLUMNS
    }

    fn text_columns(&self) -> &[&str] {
        &["name"]
    }

    fn time_columns(&self) -> &[&str] {
        &[]
    }

    fn order_column(&self) -> &str {
        "airspace_id"
    }

    fn delete_key_column(&self) -> &str {
        "source_id"
    }

    fn is_area(&self) -> bool {
        true
    }

    fn empty(&self) -> Airspace {
        Airspace::default()
    }

    fn read_row(&self, row: &RowView, mask: LoadMask) -> StoreResult<Airspace> {
        let mut rec = Airspace {
            name: row.get_text("name")?,
            source_id: row.get_opt_text("source_id")?,
            ..Airspace::default()
        };
        if mask.contains(LoadMask::GEOMETRY) {
            rec.bbox = match (
                row.get_opt_i64("min_lonx")?,
                row.get_opt_i64("max_lonx")?,
                row.get_opt_i64("min_laty")?,
                row.get_opt_i64("max_laty")?,
            ) {
                (Some(west), Some(east), Some(south), Some(north)) => Some(Rect::from_spans(
                    south as i32,
                    west as u32,
                    north as i32,
                    (east - west).max(0) as u64,
                )),
                _ => None,
            };
        }
        Ok(rec)
    }

    fn bind_row(&self, rec: &Airspace) -> Vec<SqlValue> {
        let bbox = rec.bbox;
        vec![
            SqlValue::Integer(rec.address.id),
            SqlValue::Text(rec.name.clone()),
            SqlValue::opt_text(rec.source_id.as_deref()),
            SqlValue::opt_integer(bbox.map(|b| i64::from(b.west()))),
            SqlValue::opt_integer(bbox.map(|b| b.east_unwrapped() as i64)),
            SqlValue::opt_integer(bbox.map(|b| i64::from(b.south()))),
            SqlValue::opt_integer(bbox.map(|b| i64::from(b.north()))),
        ]
    }
}

/// Schema for the navaid fixture; `with_rtree` adds the native shadow
/// table so the engines take the native-index path.
pub fn navaid_schema(with_rtree: bool) -> String {
    let mut sql = String::from(
        "CREATE TABLE IF NOT EXISTS navaid(
             navaid_id INTEGER PRIMARY KEY,
             ident TEXT,
             name TEXT,
             region TEXT,
             freq INTEGER,
             mod_time INTEGER,
             source_id TEXT,
             lonx INTEGER,
             laty INTEGER,
             tile INTEGER);
         CREATE TABLE IF NOT EXISTS navaid_deleted(source_id TEXT);
         CREATE TABLE IF NOT EXISTS navaid_remark(navaid_id INTEGER, remark TEXT);",
    );
    if with_rtree {
        sql.push_str(
            "CREATE TABLE IF NOT EXISTS navaid_rtree(
                 \"ID\" INTEGER,
                 min_lat INTEGER,
                 max_lat INTEGER,
                 min_lon INTEGER,
                 max_lon INTEGER);",
        );
    }
    sql
}

pub fn airspace_schema() -> String {
    String::from(
        "CREATE TABLE IF NOT EXISTS airspace(
             airspace_id INTEGER PRIMARY KEY,
             name TEXT,
             source_id TEXT,
             min_lonx INTEGER,
             max_lonx INTEGER,
             min_laty INTEGER,
             max_laty INTEGER,
             tile INTEGER);
         CREATE TABLE IF NOT EXISTS airspace_deleted(source_id TEXT);",
    )
}

pub fn navaid(ident: &str, source: &str, lat: f64, lon: f64) -> Navaid {
    Navaid {
        ident: ident.to_string(),
        name: format!("{ident} VOR"),
        region: "ED".to_string(),
        freq_hz: Some(112_500_000),
        mod_time: Some(1_000),
        source_id: Some(source.to_string()),
        pos: Some(Pos::from_deg(lat, lon)),
        ..Navaid::default()
    }
}
