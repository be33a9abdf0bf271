//! Lazy name index over the central directory.
//!
//! The directory has no name lookup of its own: records can only be walked
//! front to back or revisited at a remembered location. [`EntryIndex`]
//! remembers every record the archive has visited, under its exact name and
//! under its lower-cased name, together with the furthest record reached by
//! a contiguous scan. Lookups that miss resume scanning from there, so each
//! record is read at most once by name lookups over the life of an open
//! archive.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

/// Longest name accepted by a lookup, in characters.
pub const MAX_FILE_NAME_LENGTH: usize = 256;

/// Where a central directory record lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryLocation {
    /// Position in directory order, starting at 0.
    pub index: u64,
    /// Absolute offset of the record in the archive.
    pub offset: u64,
}

impl EntryLocation {
    /// Location of the record at directory position `index`.
    pub fn new(index: u64, offset: u64) -> Self {
        Self { index, offset }
    }
}

/// How names are compared by lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaseSensitivity {
    /// Platform convention: insensitive on Windows, sensitive elsewhere.
    #[default]
    Default,
    /// Exact comparison.
    Sensitive,
    /// Comparison of lower-cased names.
    Insensitive,
}

impl CaseSensitivity {
    /// Resolve [`CaseSensitivity::Default`] for the current platform.
    pub fn resolve(self) -> Self {
        match self {
            Self::Default if cfg!(windows) => Self::Insensitive,
            Self::Default => Self::Sensitive,
            other => other,
        }
    }

    /// Whether names are compared exactly.
    pub fn is_sensitive(self) -> bool {
        self.resolve() == Self::Sensitive
    }

    /// Whether two names match under this sensitivity.
    pub fn matches(self, a: &str, b: &str) -> bool {
        if self.is_sensitive() {
            a == b
        } else {
            a == b || a.to_lowercase() == b.to_lowercase()
        }
    }
}

/// Name → location maps plus the scan high-water mark.
#[derive(Debug, Clone, Default)]
pub struct EntryIndex {
    sensitive: HashMap<String, EntryLocation>,
    insensitive: HashMap<String, EntryLocation>,
    /// Furthest contiguous record and its encoded length.
    high_water: Option<(EntryLocation, u64)>,
}

impl EntryIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a visited directory entry occupying `record_len` bytes.
    ///
    /// For both maps the record earliest in directory order wins when names
    /// collide. The high-water mark only moves to `location` when it is the
    /// record directly after the current mark, so a record visited out of
    /// order never lets a later scan skip the records before it.
    pub fn record(&mut self, name: &str, location: EntryLocation, record_len: u64) {
        if name.is_empty() {
            return;
        }
        insert_earliest(&mut self.sensitive, name.to_string(), location);
        insert_earliest(&mut self.insensitive, name.to_lowercase(), location);

        let next = self.high_water.map_or(0, |(mark, _)| mark.index + 1);
        if location.index == next {
            log::trace!("index high-water mark -> #{}", location.index);
            self.high_water = Some((location, record_len));
        }
    }

    /// Look a name up without scanning.
    pub fn lookup(&self, name: &str, cs: CaseSensitivity) -> Option<EntryLocation> {
        if cs.is_sensitive() {
            self.sensitive.get(name).copied()
        } else {
            self.insensitive.get(&name.to_lowercase()).copied()
        }
    }

    /// Furthest record reached by a contiguous scan from the first entry.
    pub fn high_water_mark(&self) -> Option<EntryLocation> {
        self.high_water.map(|(mark, _)| mark)
    }

    /// Where a scan for unrecorded names continues: the record after the
    /// high-water mark, or `None` to start from the first entry.
    pub fn resume_point(&self) -> Option<EntryLocation> {
        self.high_water
            .map(|(mark, len)| EntryLocation::new(mark.index + 1, mark.offset + len))
    }

    /// Number of distinct exact names recorded.
    pub fn len(&self) -> usize {
        self.sensitive.len()
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.sensitive.is_empty()
    }

    /// Forget everything; used when the archive closes.
    pub fn clear(&mut self) {
        self.sensitive.clear();
        self.insensitive.clear();
        self.high_water = None;
    }
}

fn insert_earliest(map: &mut HashMap<String, EntryLocation>, key: String, location: EntryLocation) {
    match map.entry(key) {
        Entry::Vacant(slot) => {
            slot.insert(location);
        }
        Entry::Occupied(mut slot) => {
            if location.index < slot.get().index {
                slot.insert(location);
            }
        }
    }
}

/// The currently selected directory entry, if any.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryCursor {
    current: Option<EntryLocation>,
}

impl EntryCursor {
    /// Select an entry.
    pub fn select(&mut self, location: EntryLocation) {
        self.current = Some(location);
    }

    /// Select nothing.
    pub fn clear(&mut self) {
        self.current = None;
    }

    /// The selected entry.
    pub fn current(&self) -> Option<EntryLocation> {
        self.current
    }

    /// Whether an entry is selected.
    pub fn has_current(&self) -> bool {
        self.current.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn loc(index: u64) -> EntryLocation {
        EntryLocation::new(index, 100 + index * 50)
    }

    #[test]
    fn test_sensitive_and_insensitive_lookup() {
        let mut index = EntryIndex::new();
        index.record("a.txt", loc(0), 50);
        index.record("B.TXT", loc(1), 50);

        assert_eq!(index.lookup("B.TXT", CaseSensitivity::Sensitive), Some(loc(1)));
        assert_eq!(index.lookup("b.txt", CaseSensitivity::Sensitive), None);
        assert_eq!(index.lookup("b.txt", CaseSensitivity::Insensitive), Some(loc(1)));
        assert_eq!(index.lookup("A.TXT", CaseSensitivity::Insensitive), Some(loc(0)));
    }

    #[test]
    fn test_case_fold_collision_keeps_first() {
        let mut index = EntryIndex::new();
        index.record("Readme", loc(0), 50);
        index.record("README", loc(1), 50);

        assert_eq!(index.lookup("readme", CaseSensitivity::Insensitive), Some(loc(0)));
        assert_eq!(index.lookup("README", CaseSensitivity::Sensitive), Some(loc(1)));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_collision_recorded_out_of_order() {
        let mut index = EntryIndex::new();
        // Reached by enumeration before the earlier record was seen.
        index.record("README", loc(3), 50);
        index.record("Readme", loc(1), 50);
        assert_eq!(index.lookup("readme", CaseSensitivity::Insensitive), Some(loc(1)));
    }

    #[test]
    fn test_high_water_mark_is_contiguous() {
        let mut index = EntryIndex::new();
        assert_eq!(index.high_water_mark(), None);

        index.record("x", loc(2), 50);
        assert_eq!(index.high_water_mark(), None);

        index.record("a", loc(0), 50);
        index.record("b", loc(1), 50);
        assert_eq!(index.high_water_mark(), Some(loc(1)));

        // Revisiting does not move it backwards.
        index.record("a", loc(0), 50);
        assert_eq!(index.high_water_mark(), Some(loc(1)));
        assert_eq!(index.resume_point(), Some(loc(2)));
    }

    #[test]
    fn test_empty_name_ignored() {
        let mut index = EntryIndex::new();
        index.record("", loc(0), 50);
        assert!(index.is_empty());
        assert_eq!(index.high_water_mark(), None);
    }

    #[test]
    fn test_clear() {
        let mut index = EntryIndex::new();
        index.record("a", loc(0), 50);
        index.clear();
        assert!(index.is_empty());
        assert_eq!(index.lookup("a", CaseSensitivity::Sensitive), None);
        assert_eq!(index.high_water_mark(), None);
    }

    #[test]
    fn test_default_sensitivity_resolution() {
        let resolved = CaseSensitivity::Default.resolve();
        if cfg!(windows) {
            assert_eq!(resolved, CaseSensitivity::Insensitive);
        } else {
            assert_eq!(resolved, CaseSensitivity::Sensitive);
        }
        assert!(CaseSensitivity::Insensitive.matches("ABC", "abc"));
        assert!(!CaseSensitivity::Sensitive.matches("ABC", "abc"));
    }

    #[test]
    fn test_cursor() {
        let mut cursor = EntryCursor::default();
        assert!(!cursor.has_current());
        cursor.select(loc(4));
        assert_eq!(cursor.current(), Some(loc(4)));
        cursor.clear();
        assert_eq!(cursor.current(), None);
    }

    proptest! {
        #[test]
        fn prop_maps_grow_and_mark_never_decreases(
            visits in prop::collection::vec((0u64..32, "[a-cA-C]{1,3}"), 1..64)
        ) {
            let mut index = EntryIndex::new();
            let mut last_len = 0;
            let mut last_mark: Option<EntryLocation> = None;
            for (i, name) in &visits {
                index.record(name, loc(*i), 50);
                prop_assert!(index.len() >= last_len);
                prop_assert!(index.high_water_mark() >= last_mark);
                prop_assert!(index.lookup(name, CaseSensitivity::Insensitive).is_some());
                last_len = index.len();
                last_mark = index.high_water_mark();
            }
        }

        #[test]
        fn prop_insensitive_holder_is_earliest(
            names in prop::collection::vec("[a-bA-B]{1,2}", 1..24)
        ) {
            let mut index = EntryIndex::new();
            for (i, name) in names.iter().enumerate().rev() {
                index.record(name, loc(i as u64), 50);
            }
            for name in &names {
                let first = names
                    .iter()
                    .position(|n| n.to_lowercase() == name.to_lowercase())
                    .unwrap() as u64;
                prop_assert_eq!(
                    index.lookup(name, CaseSensitivity::Insensitive),
                    Some(loc(first))
                );
            }
        }
    }
}
