//! Backend-agnostic query contract and the helpers both engines share.

use crate::descriptor::SpatialRecord;
use crate::error::StoreResult;
use crate::geo::{self, Pos, Rect};
use crate::record::{EntityAddress, LoadMask, Origin};

/// Free-text match semantics. Both backends must agree bit-for-bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMode {
    /// Case-insensitive prefix match via an exclusive upper bound.
    StartsWith,
    /// Case-insensitive equality.
    Exact,
    /// Case-sensitive equality.
    ExactCaseSensitive,
    /// Substring match; the pattern is escaped for LIKE metacharacters.
    Contains,
    /// Raw LIKE pattern with a caller-supplied escape character.
    Like,
}

/// Streaming consumer for full and spatial scans.
///
/// Returning `false` from either hook stops the scan early.
pub trait RecordSink<R> {
    /// Receives one record.
    fn record(&mut self, rec: R) -> bool;

    /// Receives one tombstone delete-key before main-only scans, so
    /// observers can reconcile overlay deletions.
    fn deleted_key(&mut self, _key: &str) -> bool {
        true
    }
}

/// Collects every record; convenience sink for tests and callers that
/// want a vector.
#[derive(Debug, Default)]
pub struct CollectSink<R> {
    /// Collected records.
    pub records: Vec<R>,
    /// Collected tombstone keys.
    pub deleted_keys: Vec<String>,
}

impl<R> CollectSink<R> {
    /// Empty sink.
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            deleted_keys: Vec::new(),
        }
    }
}

impl<R> RecordSink<R> for CollectSink<R> {
    fn record(&mut self, rec: R) -> bool {
        self.records.push(rec);
        true
    }

    fn deleted_key(&mut self, key: &str) -> bool {
        self.deleted_keys.push(key.to_string());
        true
    }
}

/// Abstract contract implemented by both generic engines.
///
/// Implementations guarantee identical result sets for identical stored
/// data and queries; order matches wherever an order column is declared.
/// Not-found is always a normal result (invalid record), never an error.
pub trait QueryInterface {
    /// Record type of the plugged-in entity descriptor.
    type Rec: SpatialRecord + Clone;

    /// Point lookup by id and origin table.
    fn get(&mut self, id: i64, origin: Origin, mask: LoadMask) -> StoreResult<Self::Rec>;

    /// First record of the id-ordered cursor.
    fn load_first(&mut self, include_aux: bool, mask: LoadMask) -> StoreResult<Self::Rec>;

    /// Successor of `current` in the id-ordered cursor, interleaving main
    /// then aux, tombstone-filtered.
    fn load_next(
        &mut self,
        current: &Self::Rec,
        include_aux: bool,
        mask: LoadMask,
    ) -> StoreResult<Self::Rec>;

    /// Full scan in declared order. With `include_aux == false`, streams
    /// tombstone keys first through the sink's string overload.
    fn for_each(
        &mut self,
        sink: &mut dyn RecordSink<Self::Rec>,
        include_aux: bool,
        mask: LoadMask,
    ) -> StoreResult<()>;

    /// Spatial scan over a rectangle.
    fn for_each_by_rect(
        &mut self,
        sink: &mut dyn RecordSink<Self::Rec>,
        rect: &Rect,
        include_aux: bool,
        mask: LoadMask,
    ) -> StoreResult<()>;

    /// Free-text search. Without a named column the predicate is OR-ed
    /// across every descriptor text column.
    fn find_by_text(
        &mut self,
        column: Option<&str>,
        pattern: &str,
        escape: Option<char>,
        mode: TextMode,
        limit: Option<u32>,
        mask: LoadMask,
    ) -> StoreResult<Vec<Self::Rec>>;

    /// Time-range search, inclusive, OR-ed across all time columns.
    fn find_by_time(
        &mut self,
        from: i64,
        to: i64,
        limit: Option<u32>,
        mask: LoadMask,
    ) -> StoreResult<Vec<Self::Rec>>;

    /// Spatial scan ordered by approximate distance ascending.
    fn find_nearest(
        &mut self,
        pos: Pos,
        search_rect: &Rect,
        limit: Option<u32>,
        mask: LoadMask,
    ) -> StoreResult<Vec<Self::Rec>>;

    /// Maintenance query for records whose tile cache is unset.
    fn find_nulltile(&mut self, limit: Option<u32>, mask: LoadMask)
    -> StoreResult<Vec<Self::Rec>>;

    /// Insert (id 0) or full-column update (id set); re-derives the
    /// tile/bbox index. Returns the stored address.
    fn save(&mut self, rec: &mut Self::Rec) -> StoreResult<EntityAddress>;

    /// Physical delete from main, logical tombstone for aux records.
    fn erase(&mut self, rec: &Self::Rec) -> StoreResult<()>;

    /// Recomputes only the tile and shadow columns of a stored record.
    fn update_index(&mut self, rec: &Self::Rec) -> StoreResult<()>;

    /// Hydrates descriptor-declared child collections under the mask.
    fn load_subtables(&mut self, recs: &mut [Self::Rec], mask: LoadMask) -> StoreResult<()>;
}

/// Exclusive upper bound for case-insensitive prefix search: increments
/// the last character, carrying over the surrogate gap and dropping
/// trailing characters that cannot be incremented. `None` means no upper
/// bound exists (empty pattern).
pub fn prefix_upper(pattern: &str) -> Option<String> {
    let mut chars: Vec<char> = pattern.chars().collect();
    while let Some(last) = chars.pop() {
        let next = char::from_u32(last as u32 + 1)
            .or_else(|| char::from_u32(last as u32 + 1 + 0x800));
        if let Some(next) = next {
            chars.push(next);
            return Some(chars.into_iter().collect());
        }
    }
    None
}

/// Approximate squared distance from `pos` to a record's geometry; used
/// as the nearest-neighbor sort key on both backends.
pub fn record_dist_sq<R: SpatialRecord>(rec: &R, pos: Pos) -> f64 {
    if let Some(p) = rec.pos() {
        geo::approx_dist_sq(p, pos)
    } else if let Some(bbox) = rec.bbox() {
        geo::approx_rect_dist_sq(pos, &bbox)
    } else {
        f64::INFINITY
    }
}

/// Ranks records by approximate distance ascending and applies the limit.
pub fn rank_by_distance<R: SpatialRecord>(recs: &mut Vec<R>, pos: Pos, limit: Option<u32>) {
    recs.sort_by(|a, b| record_dist_sq(a, pos).total_cmp(&record_dist_sq(b, pos)));
    apply_limit(recs, limit);
}

/// Truncates a merged result set to the caller's limit.
pub fn apply_limit<R>(recs: &mut Vec<R>, limit: Option<u32>) {
    if let Some(limit) = limit {
        recs.truncate(limit as usize);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_upper_increments_last_char() {
        assert_eq!(prefix_upper("AB").as_deref(), Some("AC"));
        assert_eq!(prefix_upper("AZ").as_deref(), Some("A["));
        assert_eq!(prefix_upper(""), None);
    }

    #[test]
    fn prefix_upper_is_strict_bound() {
        let upper = prefix_upper("AB").unwrap();
        for value in ["AB", "ABC", "ABZZZZ"] {
            assert!(value < upper.as_str());
        }
        assert!("AC" >= upper.as_str());
    }

    #[test]
    fn prefix_upper_skips_surrogate_gap() {
        let upper = prefix_upper("A\u{D7FF}").unwrap();
        assert_eq!(upper, "A\u{E000}");
    }
}
