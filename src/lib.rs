//! Embeddable spatial record store for aviation reference data.
//!
//! Entities (navaids, airports, airspaces, tracks, ...) are stored in a
//! relational backend and retrieved by identity, full scan, free-text
//! search, time range, geographic rectangle, or nearest point. Geography
//! is indexed without a native spatial index through a quadtree tile
//! column; where the backend provides an R-tree-like shadow table the
//! engines use it instead. Two backends implement one contract
//! ([`query::QueryInterface`]): the embedded SQLite backend
//! ([`sqlite::SqliteEngine`]) and the client/server PostgreSQL backend
//! ([`pg::PgEngine`]). A read-only "aux" overlay database can be layered
//! underneath the primary one; deleting an aux record writes a tombstone
//! instead of touching the overlay.
//!
//! # Examples
//!
//! Tile addressing is pure and self-contained:
//! ```
//! use navstore::geo::{Pos, Rect};
//! use navstore::tile::{TileCover, tile_from_pos};
//!
//! let pos = Pos::from_deg(47.0, 8.0);
//! let cover: Vec<_> = TileCover::new(&Rect::from_pos(pos)).collect();
//! assert_eq!(cover.len(), 1);
//! assert_eq!(cover[0].min, tile_from_pos(pos));
//! ```
//!
//! A complete round trip with an entity descriptor on the embedded
//! backend:
//! ```
//! use std::sync::{Arc, Mutex};
//!
//! use navstore::config::StoreConfig;
//! use navstore::descriptor::{EntityDescriptor, SpatialRecord};
//! use navstore::error::StoreResult;
//! use navstore::geo::{Pos, Rect};
//! use navstore::query::QueryInterface;
//! use navstore::record::{EntityAddress, LoadMask, RowView, SqlValue};
//! use navstore::sqlite::{SqliteCore, SqliteEngine};
//!
//! #[derive(Debug, Clone, Default)]
//! struct Waypoint {
//!     address: EntityAddress,
//!     ident: String,
//!     source_id: Option<String>,
//!     pos: Option<Pos>,
//! }
//!
//! impl SpatialRecord for Waypoint {
//!     fn address(&self) -> EntityAddress { self.address }
//!     fn set_address(&mut self, address: EntityAddress) { self.address = address; }
//!     fn pos(&self) -> Option<Pos> { self.pos }
//!     fn source_key(&self) -> Option<&str> { self.source_id.as_deref() }
//! }
//!
//! struct WaypointTable;
//!
//! impl EntityDescriptor for WaypointTable {
//!     type Rec = Waypoint;
//!
//!     fn table(&self) -> &str { "waypoint" }
//!     fn columns(&self) -> &[&str] { &["waypoint_id", "ident", "source_id", "lonx", "laty"] }
//!     fn text_columns(&self) -> &[&str] { &["ident"] }
//!     fn time_columns(&self) -> &[&str] { &[] }
//!     fn order_column(&self) -> &str { "waypoint_id" }
//!     fn delete_key_column(&self) -> &str { "source_id" }
//!     fn is_area(&self) -> bool { false }
//!     fn empty(&self) -> Waypoint { Waypoint::default() }
//!
//!     fn read_row(&self, row: &RowView, _mask: LoadMask) -> StoreResult<Waypoint> {
//!         let pos = match (row.get_opt_i64("lonx")?, row.get_opt_i64("laty")?) {
//!             (Some(lonx), Some(laty)) => Some(Pos::new(lonx as u32, laty as i32)),
//!             _ => None,
//!         };
//!         Ok(Waypoint {
//!             address: EntityAddress::invalid(),
//!             ident: row.get_text("ident")?,
//!             source_id: row.get_opt_text("source_id")?,
//!             pos,
//!         })
//!     }
//!
//!     fn bind_row(&self, rec: &Waypoint) -> Vec<SqlValue> {
//!         vec![
//!             SqlValue::Integer(rec.address.id),
//!             SqlValue::Text(rec.ident.clone()),
//!             SqlValue::opt_text(rec.source_id.as_deref()),
//!             SqlValue::opt_integer(rec.pos.map(|p| i64::from(p.lonx))),
//!             SqlValue::opt_integer(rec.pos.map(|p| i64::from(p.laty))),
//!         ]
//!     }
//! }
//!
//! let core = SqliteCore::open_in_memory(&StoreConfig::default()).expect("open");
//! core.execute_batch(
//!     "CREATE TABLE waypoint(waypoint_id INTEGER PRIMARY KEY, ident TEXT,
//!                            source_id TEXT, lonx INTEGER, laty INTEGER, tile INTEGER);
//!      CREATE TABLE waypoint_deleted(source_id TEXT);",
//! ).expect("schema");
//!
//! let mut engine = SqliteEngine::new(Arc::new(Mutex::new(core)), WaypointTable);
//! let mut wp = Waypoint {
//!     ident: "ABC".to_string(),
//!     source_id: Some("WP-ABC".to_string()),
//!     pos: Some(Pos::from_deg(0.0, 0.0)),
//!     ..Waypoint::default()
//! };
//! let address = engine.save(&mut wp).expect("save");
//! let rect = Rect::from_corners(Pos::from_deg(-1.0, -1.0), Pos::from_deg(1.0, 1.0));
//! let hits = engine
//!     .find_nearest(Pos::from_deg(0.0, 0.0), &rect, Some(1), LoadMask::ALL)
//!     .expect("nearest");
//! assert_eq!(hits[0].address(), address);
//! assert_eq!(hits[0].ident, "ABC");
//! ```
#![deny(missing_docs)]

/// Backend-neutral session tuning.
pub mod config;
/// Entity descriptor and record contracts.
pub mod descriptor;
/// Store error type and result alias.
pub mod error;
/// Fixed-point coordinate and rectangle primitives.
pub mod geo;
/// Client/server-SQL backend (PostgreSQL).
pub mod pg;
/// Abstract query contract and shared query helpers.
pub mod query;
/// Entity addressing, load masks, and the row model.
pub mod record;
/// Dialect-aware SQL construction shared by both backends.
pub mod sql;
/// Embedded-SQL backend (SQLite).
pub mod sqlite;
/// Quadtree tile addressing.
pub mod tile;
