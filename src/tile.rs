//! Quadtree tile addressing over the fixed-point coordinate space.
//!
//! A tile address is a `u32` built by interleaving, most significant bit
//! first, eight bit-pairs of (longitude high bit, latitude high bit)
//! below a leading sentinel `1` bit. Longitude is biased by half a circle
//! before encoding so cell boundaries align on the Greenwich meridian;
//! latitude is re-biased to unsigned.
//!
//! Sentinel convention: a full-depth tile occupies 17 bits with the
//! sentinel at bit 16. Right-shifting by two ascends one quadtree level
//! (dropping one longitude/latitude bit-pair); the sentinel stays the
//! most significant set bit, so the bit position of the sentinel encodes
//! the depth of the cell. A coarse cell `c` re-expressed at full
//! resolution covers the inclusive range `[c << 2k, (c << 2k) | (2^2k - 1)]`.

use crate::geo::{Pos, Rect};

/// Number of interleaved bits below the sentinel in a full-depth tile.
pub const TILE_BITS: u32 = 16;
/// Interleaved bits contributed by each axis.
const AXIS_BITS: u32 = TILE_BITS / 2;
/// Sentinel bit of a full-depth tile.
const SENTINEL: u32 = 1 << TILE_BITS;
/// Longitude bias aligning tile boundaries on the Greenwich meridian.
const LON_TILE_BIAS: u32 = 0x8000_0000;
/// Latitude bias mapping the signed axis to unsigned.
const LAT_BIAS: u32 = 0x8000_0000;
/// Longitude bit positions in the interleaved field.
const LON_MASK: u32 = 0xAAAA;
/// Latitude bit positions in the interleaved field.
const LAT_MASK: u32 = 0x5555;
/// Cardinality bound for [`TileCover`]; larger covers widen to a coarser
/// depth.
const MAX_COVER_TILES: u64 = 64;

/// Encodes a position as a full-depth tile address.
pub fn tile_from_pos(pos: Pos) -> u32 {
    let lon = pos.lonx.wrapping_add(LON_TILE_BIAS);
    let lat = (pos.laty as u32).wrapping_add(LAT_BIAS);
    let mut tile = 1u32;
    for i in 0..AXIS_BITS {
        let shift = 31 - i;
        tile = (tile << 1) | ((lon >> shift) & 1);
        tile = (tile << 1) | ((lat >> shift) & 1);
    }
    tile
}

/// Smallest quadtree cell containing the whole rectangle.
///
/// Encodes both corners and right-shifts them in lock-step until they
/// agree; the sentinel keeps the result self-describing.
pub fn tile_from_rect(rect: &Rect) -> u32 {
    let mut a = tile_from_pos(rect.sw());
    let mut b = tile_from_pos(rect.ne());
    while a != b {
        a >>= 1;
        b >>= 1;
    }
    a
}

/// Sibling range enclosing the rectangle, expressed at full resolution.
///
/// Stops one lock-step shift before [`tile_from_rect`] and shifts both
/// siblings back to full depth, filling the vacated low bits of the upper
/// bound with ones. Corners already sharing a full-depth tile yield a
/// degenerate range.
pub fn tile_range(rect: &Rect) -> (u32, u32) {
    let mut a = tile_from_pos(rect.sw());
    let mut b = tile_from_pos(rect.ne());
    let mut shift = 0u32;
    while (a >> 1) != (b >> 1) {
        a >>= 1;
        b >>= 1;
        shift += 1;
    }
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    (lo << shift, (hi << shift) | ((1u32 << shift) - 1))
}

/// Inclusive full-resolution tile range aligned to one quadtree cell.
///
/// At the finest depth `min == max`, a single full-depth tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileSpan {
    /// Lowest full-depth tile of the cell.
    pub min: u32,
    /// Highest full-depth tile of the cell.
    pub max: u32,
}

/// Iterator over the quadtree cells covering a rectangle, at bounded
/// cardinality.
///
/// Walks longitude first with a masked modular increment over the
/// interleaved field, resetting and advancing latitude when longitude
/// exhausts. When the enumeration at the current depth would exceed the
/// cardinality bound the cover widens to the next coarser depth by
/// masking off the lowest bit-pair of both endpoints and restarting.
/// Should widening run past the maximum depth the cover reports
/// unavailable and yields nothing; callers fall back to a plain bbox
/// scan.
#[derive(Debug, Clone)]
pub struct TileCover {
    level: u32,
    cur: u32,
    row_start: u32,
    lon_count: u32,
    lon_remaining: u32,
    lat_remaining: u32,
    available: bool,
    done: bool,
}

impl TileCover {
    /// Builds the cover for `rect`.
    pub fn new(rect: &Rect) -> Self {
        let west_b = u64::from(rect.west().wrapping_add(LON_TILE_BIAS));
        let width = rect.east_unwrapped() - u64::from(rect.west());
        let south_b = u64::from((rect.south() as u32).wrapping_add(LAT_BIAS));
        let north_b = u64::from((rect.north() as u32).wrapping_add(LAT_BIAS));

        let mut level = 0u32;
        loop {
            if level > AXIS_BITS {
                // Tile filtering unavailable at any depth.
                return Self {
                    level,
                    cur: 0,
                    row_start: 0,
                    lon_count: 0,
                    lon_remaining: 0,
                    lat_remaining: 0,
                    available: false,
                    done: true,
                };
            }
            let cell_shift = 32 - AXIS_BITS + level;
            let cells = 1u64 << (AXIS_BITS - level);
            let lon_first = west_b >> cell_shift;
            let lon_last = (west_b + width) >> cell_shift;
            let lon_count = (lon_last - lon_first + 1).min(cells);
            let lat_first = south_b >> cell_shift;
            let lat_last = north_b >> cell_shift;
            let lat_count = lat_last - lat_first + 1;
            if lon_count * lat_count > MAX_COVER_TILES {
                level += 1;
                continue;
            }
            let start = interleave_planes(
                ((lon_first % cells) << level) as u32,
                (lat_first << level) as u32,
            );
            return Self {
                level,
                cur: start,
                row_start: start,
                lon_count: lon_count as u32,
                lon_remaining: lon_count as u32,
                lat_remaining: lat_count as u32,
                available: true,
                done: false,
            };
        }
    }

    /// False when widening exhausted the maximum depth and the cover
    /// cannot be used as a filter.
    pub fn is_available(&self) -> bool {
        self.available
    }

    fn span_at(&self, field: u32) -> TileSpan {
        let min = SENTINEL | field;
        TileSpan {
            min,
            max: min | ((1u32 << (2 * self.level)) - 1),
        }
    }

    fn lon_inc(&self, field: u32) -> u32 {
        let unit = 1u32 << (2 * self.level + 1);
        (((field | LAT_MASK) + unit) & LON_MASK) | (field & LAT_MASK)
    }

    fn lat_inc(&self, field: u32) -> u32 {
        let unit = 1u32 << (2 * self.level);
        (((field | LON_MASK) + unit) & LAT_MASK) | (field & LON_MASK)
    }
}

impl Iterator for TileCover {
    type Item = TileSpan;

    fn next(&mut self) -> Option<TileSpan> {
        if self.done {
            return None;
        }
        let span = self.span_at(self.cur);
        self.lon_remaining -= 1;
        if self.lon_remaining == 0 {
            self.lat_remaining -= 1;
            if self.lat_remaining == 0 {
                self.done = true;
            } else {
                self.row_start = self.lat_inc(self.row_start);
                self.cur = self.row_start;
                self.lon_remaining = self.lon_count;
            }
        } else {
            self.cur = self.lon_inc(self.cur);
        }
        Some(span)
    }
}

/// Interleaves two 8-bit axis planes, longitude first, without sentinel.
fn interleave_planes(lon: u32, lat: u32) -> u32 {
    let mut field = 0u32;
    for i in (0..AXIS_BITS).rev() {
        field = (field << 1) | ((lon >> i) & 1);
        field = (field << 1) | ((lat >> i) & 1);
    }
    field
}

/// True when `tile` carries the sentinel at full depth.
pub fn is_full_depth(tile: u32) -> bool {
    tile >> TILE_BITS == 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{LON_CIRCLE, Pos};

    #[test]
    fn pos_tile_has_sentinel_at_full_depth() {
        for &(lat, lon) in &[(0.0, 0.0), (89.9, 179.9), (-89.9, -179.9), (47.0, 8.0)] {
            let tile = tile_from_pos(Pos::from_deg(lat, lon));
            assert!(is_full_depth(tile), "tile {tile:#x} for ({lat}, {lon})");
        }
    }

    #[test]
    fn rect_tile_is_ancestor_of_corner_tiles() {
        let rect = Rect::from_corners(Pos::from_deg(10.0, 10.0), Pos::from_deg(11.0, 11.0));
        let cell = tile_from_rect(&rect);
        let mut sw = tile_from_pos(rect.sw());
        while sw > cell {
            sw >>= 1;
        }
        assert_eq!(sw, cell);
    }

    #[test]
    fn degenerate_rect_covers_one_tile() {
        let pos = Pos::from_deg(51.3, 6.7);
        let cover: Vec<_> = TileCover::new(&Rect::from_pos(pos)).collect();
        assert_eq!(cover.len(), 1);
        assert_eq!(cover[0].min, cover[0].max);
        assert_eq!(cover[0].min, tile_from_pos(pos));
    }

    #[test]
    fn cover_spans_contain_inner_points() {
        let rect = Rect::from_corners(Pos::from_deg(-5.0, -5.0), Pos::from_deg(5.0, 5.0));
        let spans: Vec<_> = TileCover::new(&rect).collect();
        assert!(!spans.is_empty());
        for &(lat, lon) in &[(0.0, 0.0), (-4.9, 4.9), (4.9, -4.9)] {
            let tile = tile_from_pos(Pos::from_deg(lat, lon));
            assert!(
                spans.iter().any(|s| tile >= s.min && tile <= s.max),
                "({lat}, {lon}) not covered"
            );
        }
    }

    #[test]
    fn cover_is_bounded_for_huge_rects() {
        let rect = Rect::from_spans(
            Pos::from_deg(-80.0, 0.0).laty,
            0,
            Pos::from_deg(80.0, 0.0).laty,
            LON_CIRCLE,
        );
        let cover = TileCover::new(&rect);
        assert!(cover.is_available());
        let spans: Vec<_> = cover.collect();
        assert!(spans.len() as u64 <= 64);
        let tile = tile_from_pos(Pos::from_deg(33.0, -118.0));
        assert!(spans.iter().any(|s| tile >= s.min && tile <= s.max));
    }

    #[test]
    fn antimeridian_cover_wraps() {
        let rect = Rect::from_corners(Pos::from_deg(-2.0, 178.0), Pos::from_deg(2.0, -178.0));
        let spans: Vec<_> = TileCover::new(&rect).collect();
        for lon in [178.5, 179.9, -179.9, -178.5] {
            let tile = tile_from_pos(Pos::from_deg(0.0, lon));
            assert!(
                spans.iter().any(|s| tile >= s.min && tile <= s.max),
                "lon {lon} not covered"
            );
        }
    }

    #[test]
    fn tile_range_bounds_cover() {
        let rect = Rect::from_corners(Pos::from_deg(40.0, -74.5), Pos::from_deg(41.0, -73.5));
        let (lo, hi) = tile_range(&rect);
        assert!(lo <= hi);
        for span in TileCover::new(&rect) {
            assert!(span.min >= lo && span.max <= hi);
        }
    }
}
