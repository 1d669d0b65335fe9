mod common;

use std::path::Path;
use std::sync::{Arc, Mutex};

use navstore::config::StoreConfig;
use navstore::descriptor::SpatialRecord;
use navstore::geo::{Pos, Rect};
use navstore::query::{CollectSink, QueryInterface, TextMode};
use navstore::record::{LoadMask, Origin};
use navstore::sqlite::{SqliteCore, SqliteEngine};
use tempfile::TempDir;

use common::{NavaidTable, navaid, navaid_schema};

/// Builds the base (future aux) database with navaids AAA and BBB.
fn build_base(path: &Path) {
    let core = SqliteCore::open(path, &StoreConfig::default()).expect("open base");
    core.execute_batch(&navaid_schema(false)).expect("base schema");
    let mut engine = SqliteEngine::new(Arc::new(Mutex::new(core)), NavaidTable);
    let mut aaa = navaid("AAA", "S-AAA", 10.0, 10.0);
    let mut bbb = navaid("BBB", "S-BBB", 11.0, 11.0);
    engine.save(&mut aaa).expect("save AAA");
    engine.save(&mut bbb).expect("save BBB");
}

/// Opens a user database layered over the base.
fn open_pair(tmp: &TempDir) -> (Arc<Mutex<SqliteCore>>, SqliteEngine<NavaidTable>) {
    let base_path = tmp.path().join("base.db");
    build_base(&base_path);

    let mut core =
        SqliteCore::open(tmp.path().join("user.db"), &StoreConfig::default()).expect("open user");
    core.execute_batch(&navaid_schema(false)).expect("user schema");
    core.attach(&base_path).expect("attach");
    let core = Arc::new(Mutex::new(core));
    let engine = SqliteEngine::new(Arc::clone(&core), NavaidTable);
    (core, engine)
}

fn rect_around(lat: f64, lon: f64) -> Rect {
    Rect::from_corners(
        Pos::from_deg(lat - 0.5, lon - 0.5),
        Pos::from_deg(lat + 0.5, lon + 0.5),
    )
}

#[test]
fn aux_records_visible_on_every_read_path() {
    let tmp = TempDir::new().expect("tmp");
    let (_core, mut engine) = open_pair(&tmp);

    let rec = engine.get(1, Origin::Aux, LoadMask::ALL).expect("get aux");
    assert!(rec.address().is_present());
    assert_eq!(rec.address().origin, Origin::Aux);
    assert_eq!(rec.ident, "AAA");

    let mut sink = CollectSink::new();
    engine.for_each(&mut sink, true, LoadMask::ALL).expect("scan");
    assert_eq!(sink.records.len(), 2);
    assert!(sink.records.iter().all(|r| r.address().origin == Origin::Aux));

    let mut sink = CollectSink::new();
    engine
        .for_each_by_rect(&mut sink, &rect_around(10.0, 10.0), true, LoadMask::ALL)
        .expect("rect");
    assert_eq!(sink.records.len(), 1);
    assert_eq!(sink.records[0].ident, "AAA");

    let hits = engine
        .find_by_text(Some("ident"), "AAA", None, TextMode::Exact, None, LoadMask::ALL)
        .expect("text");
    assert_eq!(hits.len(), 1);

    let first = engine.load_first(true, LoadMask::ALL).expect("first");
    assert_eq!(first.ident, "AAA");
    let second = engine.load_next(&first, true, LoadMask::ALL).expect("next");
    assert_eq!(second.ident, "BBB");
    let end = engine.load_next(&second, true, LoadMask::ALL).expect("end");
    assert!(!end.address().is_present());
}

#[test]
fn erased_aux_record_disappears_from_every_read_path() {
    let tmp = TempDir::new().expect("tmp");
    let (_core, mut engine) = open_pair(&tmp);

    let doomed = engine.get(1, Origin::Aux, LoadMask::ALL).expect("get");
    assert_eq!(doomed.ident, "AAA");
    engine.erase(&doomed).expect("erase aux");

    // Point lookup.
    let gone = engine.get(1, Origin::Aux, LoadMask::ALL).expect("get");
    assert!(!gone.address().is_present());

    // Full scan.
    let mut sink = CollectSink::new();
    engine.for_each(&mut sink, true, LoadMask::ALL).expect("scan");
    let idents: Vec<_> = sink.records.iter().map(|r| r.ident.as_str()).collect();
    assert_eq!(idents, vec!["BBB"]);

    // Spatial query.
    let mut sink = CollectSink::new();
    engine
        .for_each_by_rect(&mut sink, &rect_around(10.0, 10.0), true, LoadMask::ALL)
        .expect("rect");
    assert!(sink.records.is_empty());

    // Text query.
    let hits = engine
        .find_by_text(Some("ident"), "AAA", None, TextMode::Exact, None, LoadMask::ALL)
        .expect("text");
    assert!(hits.is_empty());

    // Time query.
    let hits = engine.find_by_time(0, 2_000, None, LoadMask::ALL).expect("time");
    let idents: Vec<_> = hits.iter().map(|r| r.ident.as_str()).collect();
    assert_eq!(idents, vec!["BBB"]);

    // Cursor.
    let first = engine.load_first(true, LoadMask::ALL).expect("first");
    assert_eq!(first.ident, "BBB");

    // Nearest.
    let hits = engine
        .find_nearest(
            Pos::from_deg(10.0, 10.0),
            &rect_around(10.0, 10.0),
            None,
            LoadMask::ALL,
        )
        .expect("nearest");
    assert!(hits.is_empty());
}

#[test]
fn main_only_scan_streams_tombstone_keys_first() {
    let tmp = TempDir::new().expect("tmp");
    let (_core, mut engine) = open_pair(&tmp);

    let doomed = engine.get(1, Origin::Aux, LoadMask::ALL).expect("get");
    engine.erase(&doomed).expect("erase aux");

    let mut sink = CollectSink::new();
    engine.for_each(&mut sink, false, LoadMask::ALL).expect("scan");
    assert_eq!(sink.deleted_keys, vec!["S-AAA".to_string()]);
    assert!(sink.records.is_empty());
}

#[test]
fn saving_aux_record_redirects_to_main_with_tombstone() {
    let tmp = TempDir::new().expect("tmp");
    let (_core, mut engine) = open_pair(&tmp);

    let mut rec = engine.get(1, Origin::Aux, LoadMask::ALL).expect("get");
    rec.name = "AAA VORTAC".to_string();
    let address = engine.save(&mut rec).expect("save");
    assert_eq!(address.origin, Origin::Main);

    // Exactly one AAA remains visible, the main copy.
    let mut sink = CollectSink::new();
    engine.for_each(&mut sink, true, LoadMask::ALL).expect("scan");
    let mut seen: Vec<_> = sink
        .records
        .iter()
        .map(|r| (r.ident.as_str(), r.address().origin))
        .collect();
    seen.sort();
    assert_eq!(seen, vec![("AAA", Origin::Main), ("BBB", Origin::Aux)]);
    assert_eq!(
        sink.records
            .iter()
            .find(|r| r.ident == "AAA")
            .map(|r| r.name.as_str()),
        Some("AAA VORTAC")
    );
}

#[test]
fn main_row_shadows_aux_row_with_same_id() {
    let tmp = TempDir::new().expect("tmp");
    let (_core, mut engine) = open_pair(&tmp);

    // The first main insert takes id 1, the same id as aux AAA.
    let mut ccc = navaid("CCC", "S-CCC", 20.0, 20.0);
    let address = engine.save(&mut ccc).expect("save");
    assert_eq!(address.id, 1);

    let mut sink = CollectSink::new();
    engine.for_each(&mut sink, true, LoadMask::ALL).expect("scan");
    let mut seen: Vec<_> = sink
        .records
        .iter()
        .map(|r| (r.ident.as_str(), r.address().origin))
        .collect();
    seen.sort();
    assert_eq!(seen, vec![("BBB", Origin::Aux), ("CCC", Origin::Main)]);
}

#[test]
fn detach_removes_overlay() {
    let tmp = TempDir::new().expect("tmp");
    let (core, mut engine) = open_pair(&tmp);

    core.lock().expect("lock").detach().expect("detach");

    let mut sink = CollectSink::new();
    engine.for_each(&mut sink, true, LoadMask::ALL).expect("scan");
    assert!(sink.records.is_empty());

    let rec = engine.get(1, Origin::Aux, LoadMask::ALL).expect("get");
    assert!(!rec.address().is_present());
}
