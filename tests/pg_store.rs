//! Client/server backend integration tests.
//!
//! These need a reachable PostgreSQL server and are ignored by default:
//!
//! ```text
//! NAVSTORE_PG="host=localhost user=postgres dbname=navstore_test" \
//!     cargo test -- --ignored
//! ```
//!
//! The dialect-level SQL is unit-tested in `src/sql.rs` without a
//! server; these tests exercise the live wire path.

mod common;

use std::sync::{Arc, Mutex};

use navstore::config::StoreConfig;
use navstore::descriptor::SpatialRecord;
use navstore::geo::{Pos, Rect};
use navstore::pg::{PgCore, PgEngine};
use navstore::query::{CollectSink, QueryInterface, TextMode};
use navstore::record::{LoadMask, Origin};

use common::{NavaidTable, navaid};

fn pg_params() -> String {
    std::env::var("NAVSTORE_PG").expect("set NAVSTORE_PG to run client/server tests")
}

fn pg_schema() -> &'static str {
    "DROP TABLE IF EXISTS navaid;
     DROP TABLE IF EXISTS navaid_deleted;
     DROP TABLE IF EXISTS navaid_remark;
     CREATE TABLE navaid(
         navaid_id BIGINT PRIMARY KEY,
         ident TEXT,
         name TEXT,
         region TEXT,
         freq BIGINT,
         mod_time BIGINT,
         source_id TEXT,
         lonx BIGINT,
         laty BIGINT,
         tile BIGINT);
     CREATE TABLE navaid_deleted(source_id TEXT);
     CREATE TABLE navaid_remark(navaid_id BIGINT, remark TEXT);"
}

fn setup() -> PgEngine<NavaidTable> {
    let mut core = PgCore::open(&pg_params(), &StoreConfig::default()).expect("connect");
    core.execute_batch(pg_schema()).expect("schema");
    PgEngine::new(Arc::new(Mutex::new(core)), NavaidTable)
}

#[test]
#[ignore = "requires a PostgreSQL server via NAVSTORE_PG"]
fn save_get_and_rect_query_round_trip() {
    let mut engine = setup();
    let mut vor = navaid("ABC", "N-ABC", 0.0, 0.0);
    let address = engine.save(&mut vor).expect("save");
    assert_eq!(address.origin, Origin::Main);

    let loaded = engine
        .get(address.id, Origin::Main, LoadMask::ALL)
        .expect("get");
    assert_eq!(loaded, vor);

    let rect = Rect::from_corners(Pos::from_deg(-1.0, -1.0), Pos::from_deg(1.0, 1.0));
    let mut sink = CollectSink::new();
    engine
        .for_each_by_rect(&mut sink, &rect, true, LoadMask::ALL)
        .expect("rect");
    assert_eq!(sink.records.len(), 1);
    assert_eq!(sink.records[0].ident, "ABC");

    let nearest = engine
        .find_nearest(Pos::from_deg(0.0, 0.0), &rect, Some(1), LoadMask::ALL)
        .expect("nearest");
    assert_eq!(nearest[0].address(), address);
}

#[test]
#[ignore = "requires a PostgreSQL server via NAVSTORE_PG"]
fn starts_with_matches_embedded_backend_semantics() {
    let mut engine = setup();
    for ident in ["ABC", "abc", "AAB"] {
        let mut vor = navaid(ident, &format!("N-{ident}"), 10.0, 10.0);
        engine.save(&mut vor).expect("save");
    }
    let hits = engine
        .find_by_text(
            Some("ident"),
            "AB",
            None,
            TextMode::StartsWith,
            None,
            LoadMask::ALL,
        )
        .expect("search");
    let mut idents: Vec<_> = hits.iter().map(|r| r.ident.clone()).collect();
    idents.sort();
    assert_eq!(idents, vec!["ABC", "abc"]);
}

#[test]
#[ignore = "requires a PostgreSQL server via NAVSTORE_PG"]
fn same_source_id_updates_in_place() {
    let mut engine = setup();
    let mut first = navaid("OLD", "N-DUP", 10.0, 10.0);
    let address = engine.save(&mut first).expect("save");

    let mut second = navaid("NEW", "N-DUP", 10.0, 10.5);
    let address2 = engine.save(&mut second).expect("dedup save");
    assert_eq!(address, address2);

    let mut sink = CollectSink::new();
    engine.for_each(&mut sink, true, LoadMask::ALL).expect("scan");
    assert_eq!(sink.records.len(), 1);
    assert_eq!(sink.records[0].ident, "NEW");
}
