//! Output file map (C8): maps a read type to a stable writer-slot index,
//! allowing several read types to share one physical output (interleaved
//! mode folds mate 1 and mate 2 into the same slot).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Mirrors the reference implementation's `read_type` enum (mate_1, mate_2,
/// singleton, collapsed, discarded), minus its `max` sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadType {
    Mate1,
    Mate2,
    Singleton,
    Collapsed,
    Discarded,
}

/// A per-sample (or per-run, in non-demultiplexed mode) map from read type
/// to output slot index, plus the physical path backing each slot.
#[derive(Debug, Clone, Default)]
pub struct FilenameMap {
    slot_of: HashMap<ReadType, usize>,
    paths:   Vec<PathBuf>,
}

impl FilenameMap {
    pub fn new() -> Self {
        FilenameMap::default()
    }

    /// Routes `read_type` to `path`'s slot, reusing an existing slot if
    /// `path` has already been registered (the interleaved-output case).
    pub fn route(&mut self, read_type: ReadType, path: PathBuf) -> usize {
        if let Some(existing) = self.paths.iter().position(|p| p == &path) {
            self.slot_of.insert(read_type, existing);
            return existing;
        }
        let slot = self.paths.len();
        self.paths.push(path);
        self.slot_of.insert(read_type, slot);
        slot
    }

    pub fn slot_for(&self, read_type: ReadType) -> Option<usize> {
        self.slot_of.get(&read_type).copied()
    }

    pub fn slot_count(&self) -> usize {
        self.paths.len()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

/// Builds the standard layout for one sample: `{prefix}.{suffix}.fastq`
/// per read type, folding mate 1/mate 2 together when `interleaved`, and
/// omitting the collapsed slot unless `merge_enabled`.
pub fn for_sample(output_dir: &Path, sample_name: &str, paired: bool, interleaved: bool, merge_enabled: bool) -> FilenameMap {
    let mut map = FilenameMap::new();
    let path_for = |suffix: &str| output_dir.join(format!("{sample_name}.{suffix}.fastq"));

    if !paired {
        map.route(ReadType::Mate1, path_for("mate1"));
        map.route(ReadType::Discarded, path_for("discarded"));
        return map;
    }

    if interleaved {
        let interleaved_path = path_for("interleaved");
        map.route(ReadType::Mate1, interleaved_path.clone());
        map.route(ReadType::Mate2, interleaved_path);
    } else {
        map.route(ReadType::Mate1, path_for("mate1"));
        map.route(ReadType::Mate2, path_for("mate2"));
    }

    map.route(ReadType::Singleton, path_for("singleton"));
    if merge_enabled {
        map.route(ReadType::Collapsed, path_for("collapsed"));
    }
    map.route(ReadType::Discarded, path_for("discarded"));
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleaved_output_shares_one_slot() {
        let map = for_sample(Path::new("/tmp"), "sampleA", true, true, false);
        assert_eq!(map.slot_for(ReadType::Mate1), map.slot_for(ReadType::Mate2));
        // mate1/mate2 (shared), singleton, discarded.
        assert_eq!(map.slot_count(), 3);
    }

    #[test]
    fn non_interleaved_paired_output_has_distinct_mate_slots() {
        let map = for_sample(Path::new("/tmp"), "sampleA", true, false, true);
        assert_ne!(map.slot_for(ReadType::Mate1), map.slot_for(ReadType::Mate2));
        assert!(map.slot_for(ReadType::Collapsed).is_some());
    }
}
