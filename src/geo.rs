//! Fixed-point coordinate and rectangle primitives.
//!
//! Longitude is an unsigned 32-bit value covering the full circle, so all
//! longitude arithmetic is modular: `0x0000_0000` is 180°W and
//! `0x8000_0000` is the Greenwich meridian. Latitude is a signed 32-bit
//! value whose full range maps to ±90°. A [`Rect`] keeps its east bound
//! *unwrapped* (`west + width`, never reduced modulo the circle) so that
//! `west <= east` holds for comparisons even when the box crosses the
//! antimeridian.

use serde::{Deserialize, Serialize};

/// Unsigned fixed-point longitude, wrapping modulo 2^32.
pub type Lonx = u32;
/// Signed fixed-point latitude, full range mapping to ±90°.
pub type Laty = i32;

/// One full longitude circle in fixed-point units.
pub const LON_CIRCLE: u64 = 1 << 32;

const LON_UNITS_PER_DEG: f64 = 4_294_967_296.0 / 360.0;
const LAT_UNITS_PER_DEG: f64 = 4_294_967_296.0 / 180.0;

/// Fixed-point geographic position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pos {
    /// Longitude in wrapping fixed-point units.
    pub lonx: Lonx,
    /// Latitude in signed fixed-point units.
    pub laty: Laty,
}

impl Pos {
    /// Constructs a position from raw fixed-point units.
    pub fn new(lonx: Lonx, laty: Laty) -> Self {
        Self { lonx, laty }
    }

    /// Constructs a position from degrees.
    ///
    /// Longitude is taken in [-180, 180) and wraps; latitude is clamped
    /// to the representable ±90° range.
    pub fn from_deg(lat: f64, lon: f64) -> Self {
        let lonx = ((lon + 180.0) * LON_UNITS_PER_DEG).round() as i64;
        let laty = (lat * LAT_UNITS_PER_DEG).round() as i64;
        Self {
            lonx: (lonx.rem_euclid(LON_CIRCLE as i64)) as u32,
            laty: laty.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32,
        }
    }

    /// Longitude in degrees, in [-180, 180).
    pub fn lon_deg(&self) -> f64 {
        f64::from(self.lonx) / LON_UNITS_PER_DEG - 180.0
    }

    /// Latitude in degrees.
    pub fn lat_deg(&self) -> f64 {
        f64::from(self.laty) / LAT_UNITS_PER_DEG
    }
}

/// Shortest signed longitude difference `a - b` in fixed-point units.
///
/// Two's-complement wrapping makes this the modular shortest path: the
/// result is in [-2^31, 2^31).
pub fn lon_diff(a: Lonx, b: Lonx) -> i32 {
    a.wrapping_sub(b) as i32
}

/// Axis-aligned rectangle with an unwrapped east bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    south: Laty,
    west: Lonx,
    north: Laty,
    east: u64,
}

impl Rect {
    /// Builds a rectangle from its southwest and northeast corners.
    ///
    /// The longitudinal width is the modular distance from `sw` to `ne`,
    /// so a box given across the antimeridian unwraps east past 2^32.
    /// Equal corner longitudes produce a zero-width box, not a full
    /// circle; use [`Rect::from_spans`] for an explicit width.
    pub fn from_corners(sw: Pos, ne: Pos) -> Self {
        let width = u64::from(ne.lonx.wrapping_sub(sw.lonx));
        Self {
            south: sw.laty,
            west: sw.lonx,
            north: ne.laty,
            east: u64::from(sw.lonx) + width,
        }
    }

    /// Builds a rectangle from a south/west origin and explicit spans.
    pub fn from_spans(south: Laty, west: Lonx, north: Laty, lon_width: u64) -> Self {
        Self {
            south,
            west,
            north,
            east: u64::from(west) + lon_width.min(LON_CIRCLE),
        }
    }

    /// Degenerate rectangle covering exactly one position.
    pub fn from_pos(pos: Pos) -> Self {
        Self::from_corners(pos, pos)
    }

    /// South bound in fixed-point latitude units.
    pub fn south(&self) -> Laty {
        self.south
    }

    /// West bound in fixed-point longitude units.
    pub fn west(&self) -> Lonx {
        self.west
    }

    /// North bound in fixed-point latitude units.
    pub fn north(&self) -> Laty {
        self.north
    }

    /// Unwrapped east bound: `west + width`, possibly exceeding 2^32.
    pub fn east_unwrapped(&self) -> u64 {
        self.east
    }

    /// Southwest corner.
    pub fn sw(&self) -> Pos {
        Pos::new(self.west, self.south)
    }

    /// Northeast corner, with the east bound wrapped back into range.
    pub fn ne(&self) -> Pos {
        Pos::new((self.east % LON_CIRCLE) as u32, self.north)
    }

    /// Tests whether `pos` lies inside the rectangle, bounds inclusive.
    ///
    /// The longitude test runs the three offset hypotheses against the
    /// unwrapped east bound, which handles antimeridian-crossing boxes
    /// without a separate branch.
    pub fn contains(&self, pos: Pos) -> bool {
        if pos.laty < self.south || pos.laty > self.north {
            return false;
        }
        let west = i64::from(self.west);
        let east = self.east as i64;
        let x = i64::from(pos.lonx);
        [x, x - LON_CIRCLE as i64, x + LON_CIRCLE as i64]
            .iter()
            .any(|&h| h >= west && h <= east)
    }
}

/// Planar approximate squared distance between two positions, in degrees
/// squared. Longitude is scaled by the cosine of the mean latitude. Cheap
/// by design; not a great-circle distance.
pub fn approx_dist_sq(a: Pos, b: Pos) -> f64 {
    let dlat = (f64::from(a.laty) - f64::from(b.laty)) / LAT_UNITS_PER_DEG;
    let mean_lat_rad = ((a.lat_deg() + b.lat_deg()) * 0.5).to_radians();
    let dlon = f64::from(lon_diff(a.lonx, b.lonx)) / LON_UNITS_PER_DEG * mean_lat_rad.cos();
    dlat * dlat + dlon * dlon
}

/// Approximate squared distance from a position to a rectangle under the
/// same metric as [`approx_dist_sq`]. Returns 0 when the position is
/// inside; otherwise the distance to the nearest edge or corner.
pub fn approx_rect_dist_sq(pos: Pos, rect: &Rect) -> f64 {
    if rect.contains(pos) {
        return 0.0;
    }
    let clamped_lat = pos.laty.clamp(rect.south(), rect.north());
    let west = i64::from(rect.west());
    let east = rect.east_unwrapped() as i64;
    let mut best = f64::INFINITY;
    for off in [-(LON_CIRCLE as i64), 0, LON_CIRCLE as i64] {
        let x = i64::from(pos.lonx) + off;
        let clamped = x.clamp(west, east);
        let edge = Pos::new((clamped.rem_euclid(LON_CIRCLE as i64)) as u32, clamped_lat);
        let d = approx_dist_sq(pos, edge);
        if d < best {
            best = d;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degrees_round_trip() {
        let pos = Pos::from_deg(47.5, 8.5);
        assert!((pos.lat_deg() - 47.5).abs() < 1e-6);
        assert!((pos.lon_deg() - 8.5).abs() < 1e-6);
    }

    #[test]
    fn lon_diff_is_shortest_path() {
        let east_of_am = Pos::from_deg(0.0, -179.5);
        let west_of_am = Pos::from_deg(0.0, 179.5);
        let d = lon_diff(east_of_am.lonx, west_of_am.lonx);
        assert!((f64::from(d) / LON_UNITS_PER_DEG - 1.0).abs() < 1e-6);
    }

    #[test]
    fn rect_across_antimeridian_contains() {
        let rect = Rect::from_corners(Pos::from_deg(-10.0, 170.0), Pos::from_deg(10.0, -170.0));
        assert!(rect.west() as u64 <= rect.east_unwrapped());
        assert!(rect.east_unwrapped() > LON_CIRCLE);
        assert!(rect.contains(Pos::from_deg(0.0, 179.0)));
        assert!(rect.contains(Pos::from_deg(0.0, -179.0)));
        assert!(!rect.contains(Pos::from_deg(0.0, 0.0)));
        assert!(!rect.contains(Pos::from_deg(20.0, 179.0)));
    }

    #[test]
    fn degenerate_rect_contains_boundary() {
        let pos = Pos::from_deg(12.0, 34.0);
        let rect = Rect::from_pos(pos);
        assert!(rect.contains(pos));
    }

    #[test]
    fn rect_distance_zero_inside() {
        let rect = Rect::from_corners(Pos::from_deg(-1.0, -1.0), Pos::from_deg(1.0, 1.0));
        assert_eq!(approx_rect_dist_sq(Pos::from_deg(0.0, 0.0), &rect), 0.0);
        assert!(approx_rect_dist_sq(Pos::from_deg(2.0, 0.0), &rect) > 0.0);
    }
}
