//! Step-id constants (§3, §9 "Global constants for step ids"), grounded on
//! the reference implementation's `analyses_id` enum.

/// Step for reading of SE or PE reads.
pub const READ_FASTQ: usize = 0;
/// Step for demultiplexing SE or PE reads.
pub const DEMULTIPLEX: usize = 1;
/// Step for writing mate 1 reads which were not identified.
pub const UNIDENT_1: usize = 2;
/// Step for writing mate 2 reads which were not identified.
pub const UNIDENT_2: usize = 5;

/// Offset for post-demultiplexing analytical steps: if enabled, the
/// demultiplexing step forwards reads to `(nth + 1) * ANALYSES_OFFSET`.
pub const ANALYSES_OFFSET: usize = 16;

/// Step for trimming/adapter-identification of SE or PE reads, relative to
/// a sample's base offset.
pub const TRIM: usize = 0;

/// Steps for writing trimmed reads, relative to a sample's base offset.
pub const WRITE_MATE_1: usize = 1;
pub const WRITE_MATE_2: usize = 4;
pub const WRITE_SINGLETON: usize = 7;
pub const WRITE_COLLAPSED: usize = 10;
pub const WRITE_DISCARDED: usize = 13;

/// Offset added to write steps when a split step is inserted in front.
pub const SPLIT_OFFSET: usize = 1;
/// Offset added to write steps when a compressor step is inserted in front.
pub const ZIP_OFFSET: usize = 2;

/// Computes the base step id for the `nth` sample (0-based); `nth = 0` is
/// used for un-demultiplexed (single-sample) runs too.
pub const fn sample_base(nth: usize) -> usize {
    (nth + 1) * ANALYSES_OFFSET
}
