use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use navstore::geo::{Pos, Rect, approx_dist_sq};
use navstore::tile::{TileCover, tile_from_pos};

fn bench_tile_encode(c: &mut Criterion) {
    let pos = Pos::from_deg(48.62, 9.26);
    c.bench_function("tile_from_pos", |b| {
        b.iter(|| tile_from_pos(pos));
    });
}

fn bench_cover(c: &mut Criterion) {
    let mut group = c.benchmark_group("tile_cover");
    for span_deg in [0.5f64, 5.0, 60.0] {
        let rect = Rect::from_corners(
            Pos::from_deg(-span_deg, -span_deg),
            Pos::from_deg(span_deg, span_deg),
        );
        group.bench_with_input(
            BenchmarkId::from_parameter(span_deg),
            &rect,
            |b, rect| {
                b.iter(|| TileCover::new(rect).count());
            },
        );
    }
    group.finish();
}

fn bench_distance(c: &mut Criterion) {
    let a = Pos::from_deg(48.62, 9.26);
    let b_pos = Pos::from_deg(50.05, 8.57);
    c.bench_function("approx_dist_sq", |b| {
        b.iter(|| approx_dist_sq(a, b_pos));
    });
}

criterion_group!(benches, bench_tile_encode, bench_cover, bench_distance);
criterion_main!(benches);
