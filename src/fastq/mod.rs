//! The FASTQ record model (C2): parse/emit, trimming, reverse-complement,
//! and mate-pair validation.

mod record;

pub use record::{FastqRecord, MateSide, validate_paired_reads};
