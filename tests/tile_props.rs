use proptest::prelude::*;

use navstore::geo::{LON_CIRCLE, Pos, Rect};
use navstore::tile::{TileCover, TileSpan, is_full_depth, tile_from_pos, tile_from_rect, tile_range};

fn arb_pos() -> impl Strategy<Value = Pos> {
    (any::<u32>(), any::<i32>()).prop_map(|(lonx, laty)| Pos::new(lonx, laty))
}

fn arb_rect() -> impl Strategy<Value = Rect> {
    (
        any::<u32>(),
        0u64..=LON_CIRCLE,
        any::<i32>(),
        any::<i32>(),
    )
        .prop_map(|(west, width, lat_a, lat_b)| {
            let (south, north) = if lat_a <= lat_b {
                (lat_a, lat_b)
            } else {
                (lat_b, lat_a)
            };
            Rect::from_spans(south, west, north, width)
        })
}

fn spans(rect: &Rect) -> Vec<TileSpan> {
    let cover = TileCover::new(rect);
    assert!(cover.is_available());
    cover.collect()
}

fn covered(spans: &[TileSpan], tile: u32) -> bool {
    spans.iter().any(|s| tile >= s.min && tile <= s.max)
}

proptest! {
    #[test]
    fn tile_round_trips_through_degenerate_rect(pos in arb_pos()) {
        let tile = tile_from_pos(pos);
        prop_assert_eq!(tile_from_rect(&Rect::from_pos(pos)), tile);

        let spans = spans(&Rect::from_pos(pos));
        prop_assert_eq!(spans.len(), 1);
        prop_assert_eq!(spans[0].min, tile);
        prop_assert_eq!(spans[0].max, tile);
    }

    #[test]
    fn cover_spans_are_full_resolution_and_bounded(rect in arb_rect()) {
        let spans = spans(&rect);
        prop_assert!(!spans.is_empty());
        prop_assert!(spans.len() <= 64);
        for span in &spans {
            prop_assert!(is_full_depth(span.min), "min {:#x}", span.min);
            prop_assert!(is_full_depth(span.max), "max {:#x}", span.max);
            prop_assert!(span.min <= span.max);
        }
    }

    #[test]
    fn cover_contains_every_inner_point(
        rect in arb_rect(),
        fx in 0u64..=1000,
        fy in 0u64..=1000,
    ) {
        let width = rect.east_unwrapped() - u64::from(rect.west());
        let lonx = (u64::from(rect.west()) + width * fx / 1000) % LON_CIRCLE;
        let span = i64::from(rect.north()) - i64::from(rect.south());
        let laty = i64::from(rect.south()) + span * fy as i64 / 1000;
        let pos = Pos::new(lonx as u32, laty as i32);
        prop_assert!(rect.contains(pos));
        prop_assert!(covered(&spans(&rect), tile_from_pos(pos)));
    }

    #[test]
    fn cover_is_invariant_under_subtile_translation(
        lon_cell in 0u32..256,
        lat_cell in 0u32..256,
        west_off in 0u32..(1 << 23),
        south_off in 0u32..(1 << 23),
        width in 0u32..(1 << 22),
        height in 0u32..(1 << 22),
        dx in 0u32..(1 << 22),
        dy in 0u32..(1 << 22),
    ) {
        let base_west = lon_cell << 24;
        let base_south = ((u64::from(lat_cell) << 24) as i64 - (1i64 << 31)) as i32;

        let rect = |shift_x: u32, shift_y: u32| {
            let west = base_west.wrapping_add(west_off + shift_x);
            let south = base_south + (south_off + shift_y) as i32;
            Rect::from_spans(south, west, south + height as i32, u64::from(width))
        };

        // Both corners stay in the same full-depth tiles, so the cover
        // must not change.
        prop_assert_eq!(spans(&rect(0, 0)), spans(&rect(dx, dy)));
    }

    #[test]
    fn tile_range_encloses_cover(rect in arb_rect()) {
        let (lo, hi) = tile_range(&rect);
        prop_assert!(lo <= hi);
        prop_assert!(is_full_depth(lo));
        prop_assert!(is_full_depth(hi));
        for span in spans(&rect) {
            prop_assert!(span.min >= lo);
            prop_assert!(span.max <= hi);
        }
    }
}
