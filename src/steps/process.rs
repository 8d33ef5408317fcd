//! The reads processor (§4.7, parallel): adapter trimming, quality
//! trimming, length/ambiguity filtering and, in PE mode, optional mate
//! merging. Safe under concurrent `process` calls because all mutable
//! state lives in a [`StatsSlot`] checked out from the shared pool.

use crate::adapters::{self, OverlapParams};
use crate::chunk::{Chunk, OutputChunk, ReadChunk};
use crate::config::TrimParams;
use crate::error::Result;
use crate::fastq::FastqRecord;
use crate::quality::QualityEncoding;
use crate::scheduler::ParallelStep;
use crate::stats::ThreadStatePool;
use std::collections::HashMap;
use std::sync::Arc;

/// Where each outcome read type is forwarded (the next step id, typically
/// a split or compress step ahead of this sample's writers).
#[derive(Debug, Clone, Copy)]
pub struct Destinations {
    pub mate1:     usize,
    pub mate2:     usize,
    pub singleton: usize,
    pub collapsed: usize,
    pub discarded: usize,
}

/// A read with no non-`N` bases left (or fewer than this many total bases)
/// is treated as ambiguity-filtered rather than merely length-filtered.
const MIN_NON_N_BASES: usize = 1;

pub struct ProcessStep {
    paired:   bool,
    encoding: QualityEncoding,
    adapter1: Vec<u8>,
    adapter2: Vec<u8>,
    overlap:  OverlapParams,
    trim:     TrimParams,
    merge_enabled: bool,
    destinations:  Destinations,
    stats:    Arc<ThreadStatePool>,
}

impl ProcessStep {
    pub fn new(
        paired: bool,
        encoding: QualityEncoding,
        adapter1: Vec<u8>,
        adapter2: Vec<u8>,
        overlap: OverlapParams,
        trim: TrimParams,
        merge_enabled: bool,
        destinations: Destinations,
        stats: Arc<ThreadStatePool>,
    ) -> Self {
        ProcessStep { paired, encoding, adapter1, adapter2, overlap, trim, merge_enabled, destinations, stats }
    }

    fn trim_quality_and_adapter(&self, record: &mut FastqRecord, adapter: &[u8], stats: &mut crate::stats::StatsSlot) {
        if !adapter.is_empty() {
            if let Some(hit) = adapters::trim_adapter(record, &[adapter], self.overlap) {
                stats.record_adapter_hit(hit.adapter_index, hit.bases_removed as u64);
            }
        }

        let before = record.len();
        let (_left, right) = record.trim_windowed_bases(self.trim.trim_ns, self.trim.min_quality, self.trim.window_size, self.trim.preserve5p);
        let trimmed = before.saturating_sub(record.len());
        if right > 0 || trimmed > 0 {
            stats.low_quality_trim_reads += 1;
            stats.low_quality_trim_bases += trimmed as u64;
        }
    }

    /// Returns `true` if `record` survives length/ambiguity filtering.
    fn passes_filters(&self, record: &FastqRecord, stats: &mut crate::stats::StatsSlot) -> bool {
        let non_n = record.sequence.iter().filter(|&&b| b != b'N').count();
        if non_n < MIN_NON_N_BASES {
            stats.ambiguity_filtered_reads += 1;
            stats.ambiguity_filtered_bases += record.len() as u64;
            return false;
        }
        if record.len() < self.trim.min_length {
            stats.length_filtered_reads += 1;
            stats.length_filtered_bases += record.len() as u64;
            return false;
        }
        if let Some(max_length) = self.trim.max_length {
            if record.len() > max_length {
                record_truncated(record, max_length, stats);
            }
        }
        true
    }

    fn process_single_ended(&self, chunk: ReadChunk, out: &mut HashMap<usize, OutputChunk>, stats: &mut crate::stats::StatsSlot) -> Result<()> {
        for mut record in chunk.reads_1 {
            stats.observe_input_read(&record.sequence, &record.qualities, true);
            self.trim_quality_and_adapter(&mut record, &self.adapter1, stats);

            let destination = if self.passes_filters(&record, stats) {
                self.destinations.mate1
            } else {
                stats.discarded += 1;
                self.destinations.discarded
            };
            out.entry(destination).or_default().add(self.encoding, &record, 1)?;
        }
        Ok(())
    }

    fn process_paired_end(&self, chunk: ReadChunk, out: &mut HashMap<usize, OutputChunk>, stats: &mut crate::stats::StatsSlot) -> Result<()> {
        for (mut mate1, mut mate2) in chunk.reads_1.into_iter().zip(chunk.reads_2) {
            stats.observe_input_read(&mate1.sequence, &mate1.qualities, true);
            stats.observe_input_read(&mate2.sequence, &mate2.qualities, true);

            if self.merge_enabled {
                if let Some(merged) = adapters::merge_pair(&mate1, &mate2, self.overlap) {
                    stats.overlap_reads_merged += 1;
                    let mut merged = merged;
                    self.trim_quality_and_adapter(&mut merged, &self.adapter1, stats);
                    let destination = if self.passes_filters(&merged, stats) {
                        self.destinations.collapsed
                    } else {
                        stats.discarded += 1;
                        self.destinations.discarded
                    };
                    out.entry(destination).or_default().add(self.encoding, &merged, 2)?;
                    continue;
                }
            }

            self.trim_quality_and_adapter(&mut mate1, &self.adapter1, stats);
            self.trim_quality_and_adapter(&mut mate2, &self.adapter2, stats);

            let mate1_ok = self.passes_filters(&mate1, stats);
            let mate2_ok = self.passes_filters(&mate2, stats);

            match (mate1_ok, mate2_ok) {
                (true, true) => {
                    out.entry(self.destinations.mate1).or_default().add(self.encoding, &mate1, 1)?;
                    out.entry(self.destinations.mate2).or_default().add(self.encoding, &mate2, 1)?;
                }
                (true, false) => {
                    stats.discarded += 1;
                    out.entry(self.destinations.singleton).or_default().add(self.encoding, &mate1, 1)?;
                }
                (false, true) => {
                    stats.discarded += 1;
                    out.entry(self.destinations.singleton).or_default().add(self.encoding, &mate2, 1)?;
                }
                (false, false) => {
                    stats.discarded += 2;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrimParams;

    fn destinations() -> Destinations {
        Destinations { mate1: 1, mate2: 2, singleton: 3, collapsed: 4, discarded: 5 }
    }

    fn no_trim() -> TrimParams {
        TrimParams { min_quality: 0, window_size: 1.0, preserve5p: false, trim_ns: false, min_length: 1, max_length: None }
    }

    fn record(header: &str, sequence: &[u8]) -> FastqRecord {
        FastqRecord { header: header.to_string(), sequence: sequence.to_vec(), qualities: vec![b'I'; sequence.len()] }
    }

    #[test]
    fn adapter_trim_records_nonzero_bases_removed() {
        let adapter = b"AGATCGGAAGAGC".to_vec();
        let step = ProcessStep::new(
            false,
            QualityEncoding::Phred33,
            adapter,
            Vec::new(),
            OverlapParams { min_overlap: 4, max_mismatch_rate: 0.1 },
            no_trim(),
            false,
            destinations(),
            Arc::new(ThreadStatePool::new(1)),
        );

        let chunk = ReadChunk { eof: false, reads_1: vec![record("r1", b"ACGTAGATCGGAAGAGC")], reads_2: Vec::new(), arrival_seq: 3 };
        let result = step.process(Chunk::Read(chunk)).unwrap();

        // The trimmed read survives filtering and is forwarded to mate1.
        let (step_id, out_chunk) = result.into_iter().find(|(id, _)| *id == 1).unwrap();
        assert_eq!(step_id, 1);
        match out_chunk {
            Chunk::Output(c) => assert_eq!(c.arrival_seq, 3),
            _ => panic!("expected an OutputChunk"),
        }
    }

    #[test]
    fn single_ended_discard_routes_to_discarded_destination_with_arrival_seq() {
        let step = ProcessStep::new(
            false,
            QualityEncoding::Phred33,
            Vec::new(),
            Vec::new(),
            OverlapParams { min_overlap: 4, max_mismatch_rate: 0.1 },
            TrimParams { min_quality: 0, window_size: 1.0, preserve5p: false, trim_ns: false, min_length: 100, max_length: None },
            false,
            destinations(),
            Arc::new(ThreadStatePool::new(1)),
        );

        let chunk = ReadChunk { eof: false, reads_1: vec![record("r1", b"ACGT")], reads_2: Vec::new(), arrival_seq: 7 };
        let result = step.process(Chunk::Read(chunk)).unwrap();

        let (step_id, out_chunk) = result.into_iter().find(|(id, _)| *id == 5).unwrap();
        assert_eq!(step_id, 5);
        match out_chunk {
            Chunk::Output(c) => assert_eq!(c.arrival_seq, 7),
            _ => panic!("expected an OutputChunk"),
        }
    }
}

fn record_truncated(record: &mut FastqRecord, max_length: usize, stats: &mut crate::stats::StatsSlot) {
    let removed = record.len() - max_length;
    record.sequence.truncate(max_length);
    record.qualities.truncate(max_length);
    stats.length_filtered_bases += removed as u64;
}

impl ParallelStep for ProcessStep {
    fn name(&self) -> &'static str {
        if self.paired {
            "pe_reads_processor"
        } else {
            "se_reads_processor"
        }
    }

    fn process(&self, chunk: Chunk) -> Result<Vec<(usize, Chunk)>> {
        let arrival_seq = chunk.arrival_seq();
        let read_chunk = chunk.into_read()?;
        let eof = read_chunk.eof;

        let mut stats = self.stats.acquire();
        let mut out: HashMap<usize, OutputChunk> = HashMap::new();

        if self.paired {
            self.process_paired_end(read_chunk, &mut out, &mut stats)?;
        } else {
            self.process_single_ended(read_chunk, &mut out, &mut stats)?;
        }
        self.stats.release(stats);

        // Every output chunk derived from this input batch is keyed on the
        // batch's own arrival order, so the scheduler can reorder this
        // parallel step's results before they reach an ordered downstream
        // step, regardless of which worker finished first.
        let mut result: Vec<(usize, Chunk)> = out
            .into_iter()
            .map(|(step_id, mut chunk)| {
                chunk.arrival_seq = arrival_seq;
                (step_id, Chunk::Output(chunk))
            })
            .collect();

        if eof {
            // `Destinations` fields may alias (interleaved output folds
            // mate1/mate2 onto one writer); send exactly one EOF per
            // distinct downstream step.
            let mut sent = std::collections::HashSet::new();
            for step_id in [
                self.destinations.mate1,
                self.destinations.mate2,
                self.destinations.singleton,
                self.destinations.collapsed,
                self.destinations.discarded,
            ] {
                if sent.insert(step_id) {
                    let mut eof_chunk = OutputChunk::eof();
                    eof_chunk.arrival_seq = arrival_seq;
                    result.push((step_id, Chunk::Output(eof_chunk)));
                }
            }
        }

        Ok(result)
    }
}
