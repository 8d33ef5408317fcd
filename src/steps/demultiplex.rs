//! The demultiplexer step (§4.7): classifies each record (or pair) by
//! barcode prefix, forwarding assigned reads to their sample's processor
//! and unidentified reads straight to the unidentified-write steps.

use crate::chunk::{Chunk, OutputChunk, ReadChunk};
use crate::config::BarcodeEntry;
use crate::error::Result;
use crate::fastq::FastqRecord;
use crate::quality::QualityEncoding;
use crate::scheduler::step_ids;
use crate::scheduler::OrderedStep;
use crate::stats::StatsSlot;
use std::sync::{Arc, Mutex};

enum Classification {
    Assigned(usize),
    Ambiguous,
    Unidentified,
}

fn hamming(barcode: &[u8], read_prefix: &[u8]) -> usize {
    if read_prefix.len() < barcode.len() {
        return usize::MAX;
    }
    barcode.iter().zip(read_prefix).filter(|(a, b)| !a.eq_ignore_ascii_case(b)).count()
}

fn classify(barcodes: &[BarcodeEntry], seq1: &[u8], seq2: Option<&[u8]>, max_mismatches: usize) -> Classification {
    let mut best: Option<(usize, usize)> = None; // (sample_index, mismatches)
    let mut best_ties = 0usize;

    for (index, entry) in barcodes.iter().enumerate() {
        let mut mismatches = hamming(&entry.barcode1, seq1);
        if let (Some(barcode2), Some(seq2)) = (&entry.barcode2, seq2) {
            let m2 = hamming(barcode2, seq2);
            mismatches = mismatches.saturating_add(m2);
        }
        if mismatches > max_mismatches {
            continue;
        }
        match best {
            None => {
                best = Some((index, mismatches));
                best_ties = 1;
            }
            Some((_, best_mismatches)) if mismatches < best_mismatches => {
                best = Some((index, mismatches));
                best_ties = 1;
            }
            Some((_, best_mismatches)) if mismatches == best_mismatches => {
                best_ties += 1;
            }
            _ => {}
        }
    }

    match best {
        Some((index, _)) if best_ties == 1 => Classification::Assigned(index),
        Some(_) => Classification::Ambiguous,
        None => Classification::Unidentified,
    }
}

pub struct DemultiplexStep {
    barcodes: Vec<BarcodeEntry>,
    mismatches: usize,
    paired: bool,
    encoding: QualityEncoding,
    stats: Arc<Mutex<StatsSlot>>,
}

impl DemultiplexStep {
    pub fn new(barcodes: Vec<BarcodeEntry>, mismatches: usize, paired: bool, encoding: QualityEncoding, stats: Arc<Mutex<StatsSlot>>) -> Self {
        DemultiplexStep { barcodes, mismatches, paired, encoding, stats }
    }

    fn strip_barcode(record: &mut FastqRecord, barcode_len: usize) {
        if barcode_len == 0 {
            return;
        }
        record.sequence.drain(0..barcode_len.min(record.sequence.len()));
        record.qualities.drain(0..barcode_len.min(record.qualities.len()));
    }
}

impl OrderedStep for DemultiplexStep {
    fn name(&self) -> &'static str {
        "demultiplex"
    }

    fn process(&mut self, chunk: Chunk) -> Result<Vec<(usize, Chunk)>> {
        let read_chunk = chunk.into_read()?;
        let eof = read_chunk.eof;

        let sample_count = self.barcodes.len();
        let mut sample_buckets: Vec<ReadChunk> = (0..sample_count).map(|_| ReadChunk::default()).collect();
        let mut unident1 = OutputChunk::default();
        let mut unident2 = OutputChunk::default();

        for i in 0..read_chunk.reads_1.len() {
            let mut m1 = read_chunk.reads_1[i].clone();
            let m2 = read_chunk.reads_2.get(i).cloned();

            let classification = classify(
                &self.barcodes,
                &m1.sequence,
                m2.as_ref().map(|m| m.sequence.as_slice()),
                self.mismatches,
            );

            match classification {
                Classification::Assigned(sample_index) => {
                    self.stats.lock().expect("stats mutex poisoned").record_demultiplexed(sample_index);
                    let entry = &self.barcodes[sample_index];
                    Self::strip_barcode(&mut m1, entry.barcode1.len());
                    let mut m2 = m2;
                    if let (Some(barcode2), Some(m2)) = (&entry.barcode2, m2.as_mut()) {
                        Self::strip_barcode(m2, barcode2.len());
                    }
                    sample_buckets[sample_index].reads_1.push(m1);
                    if let Some(m2) = m2 {
                        sample_buckets[sample_index].reads_2.push(m2);
                    }
                }
                Classification::Ambiguous | Classification::Unidentified => {
                    let mut stats = self.stats.lock().expect("stats mutex poisoned");
                    if matches!(classification, Classification::Ambiguous) {
                        stats.demultiplex_ambiguous += 1;
                    } else {
                        stats.demultiplex_unidentified += 1;
                    }
                    drop(stats);
                    unident1.add(self.encoding, &m1, 1)?;
                    if let Some(m2) = m2 {
                        unident2.add(self.encoding, &m2, 1)?;
                    }
                }
            }
        }

        let mut out = Vec::new();
        for (sample_index, bucket) in sample_buckets.into_iter().enumerate() {
            if !bucket.reads_1.is_empty() {
                out.push((step_ids::sample_base(sample_index) + step_ids::TRIM, Chunk::Read(bucket)));
            }
        }
        if !unident1.is_empty() {
            out.push((step_ids::UNIDENT_1, Chunk::Output(unident1)));
        }
        if !unident2.is_empty() {
            out.push((step_ids::UNIDENT_2, Chunk::Output(unident2)));
        }

        if eof {
            for sample_index in 0..sample_count {
                out.push((step_ids::sample_base(sample_index) + step_ids::TRIM, Chunk::Read(ReadChunk::eof())));
            }
            out.push((step_ids::UNIDENT_1, Chunk::Output(OutputChunk::eof())));
            if self.paired {
                out.push((step_ids::UNIDENT_2, Chunk::Output(OutputChunk::eof())));
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn barcode(name: &str, b1: &[u8]) -> BarcodeEntry {
        BarcodeEntry { sample_name: name.to_string(), barcode1: b1.to_vec(), barcode2: None }
    }

    #[test]
    fn assigns_exact_match_and_strips_barcode() {
        let barcodes = vec![barcode("A", b"ACGT"), barcode("B", b"TGCA")];
        match classify(&barcodes, b"ACGTAAAA", None, 0) {
            Classification::Assigned(0) => {}
            _ => panic!("expected sample A"),
        }
    }

    #[test]
    fn unidentified_below_threshold() {
        let barcodes = vec![barcode("A", b"ACGT")];
        assert!(matches!(classify(&barcodes, b"NNNNNNNN", None, 0), Classification::Unidentified));
    }

    #[test]
    fn ambiguous_on_tie() {
        let barcodes = vec![barcode("A", b"ACGT"), barcode("B", b"ACGA")];
        assert!(matches!(classify(&barcodes, b"ACGCAAAA", None, 1), Classification::Ambiguous));
    }
}
