//! Per-worker statistics and their merge (C9): a bounded pool of
//! [`StatsSlot`]s, exclusively owned between `acquire` and `release`,
//! summed once at [`ThreadStatePool::finalize`].

use std::sync::{Condvar, Mutex};

/// Counts and per-position distributions accumulated by one worker over
/// some number of chunks. Merge is element-wise addition; per-position
/// vectors are extended (not truncated) to the longer of the two operands.
#[derive(Debug, Clone, Default)]
pub struct StatsSlot {
    pub input_reads:   u64,
    pub sampled_reads: u64,

    /// Index 0..=4 is A, C, G, T, N; `nucleotide_counts[base][position]`.
    pub nucleotide_counts: [Vec<u64>; 5],
    pub quality_sums:      Vec<f64>,
    pub quality_counts:    Vec<u64>,
    pub length_histogram:  Vec<u64>,

    pub q20_bases: u64,
    pub q30_bases: u64,
    pub total_bases: u64,

    pub adapter_trimmed_reads: Vec<u64>,
    pub adapter_trimmed_bases: Vec<u64>,
    pub overlap_reads_merged:  u64,
    pub terminal_bases_trimmed: u64,
    pub low_quality_trim_reads: u64,
    pub low_quality_trim_bases: u64,
    pub length_filtered_reads:  u64,
    pub length_filtered_bases:  u64,
    pub ambiguity_filtered_reads: u64,
    pub ambiguity_filtered_bases: u64,
    pub discarded: u64,

    pub demultiplexed_per_sample: Vec<u64>,
    pub demultiplex_ambiguous:    u64,
    pub demultiplex_unidentified: u64,
}

fn extend_u64(dst: &mut Vec<u64>, src: &[u64]) {
    if dst.len() < src.len() {
        dst.resize(src.len(), 0);
    }
    for (d, s) in dst.iter_mut().zip(src) {
        *d += s;
    }
}

fn extend_f64(dst: &mut Vec<f64>, src: &[f64]) {
    if dst.len() < src.len() {
        dst.resize(src.len(), 0.0);
    }
    for (d, s) in dst.iter_mut().zip(src) {
        *d += s;
    }
}

impl StatsSlot {
    /// Records one read's sequence/quality into the per-position curves.
    /// `sampled` gates whether the read also contributes to the full
    /// per-position distributions (§3's sampling rate).
    pub fn observe_input_read(&mut self, sequence: &[u8], qualities: &[u8], sampled: bool) {
        self.input_reads += 1;
        if self.length_histogram.len() <= sequence.len() {
            self.length_histogram.resize(sequence.len() + 1, 0);
        }
        self.length_histogram[sequence.len()] += 1;

        for &q in qualities {
            self.total_bases += 1;
            let phred = q.saturating_sub(33);
            if phred >= 20 {
                self.q20_bases += 1;
            }
            if phred >= 30 {
                self.q30_bases += 1;
            }
        }

        if !sampled {
            return;
        }
        self.sampled_reads += 1;

        if self.quality_sums.len() < sequence.len() {
            self.quality_sums.resize(sequence.len(), 0.0);
            self.quality_counts.resize(sequence.len(), 0);
            for bucket in &mut self.nucleotide_counts {
                bucket.resize(sequence.len(), 0);
            }
        }

        for (i, (&base, &q)) in sequence.iter().zip(qualities).enumerate() {
            self.quality_sums[i] += f64::from(q.saturating_sub(33));
            self.quality_counts[i] += 1;
            let slot = match base {
                b'A' => 0,
                b'C' => 1,
                b'G' => 2,
                b'T' => 3,
                _ => 4,
            };
            self.nucleotide_counts[slot][i] += 1;
        }
    }

    pub fn record_adapter_hit(&mut self, adapter_index: usize, bases_removed: u64) {
        if self.adapter_trimmed_reads.len() <= adapter_index {
            self.adapter_trimmed_reads.resize(adapter_index + 1, 0);
            self.adapter_trimmed_bases.resize(adapter_index + 1, 0);
        }
        self.adapter_trimmed_reads[adapter_index] += 1;
        self.adapter_trimmed_bases[adapter_index] += bases_removed;
    }

    pub fn record_demultiplexed(&mut self, sample_index: usize) {
        if self.demultiplexed_per_sample.len() <= sample_index {
            self.demultiplexed_per_sample.resize(sample_index + 1, 0);
        }
        self.demultiplexed_per_sample[sample_index] += 1;
    }

    /// Merges `other` into `self` in place; the result is independent of
    /// argument order or grouping (commutative/associative).
    pub fn merge(&mut self, other: &StatsSlot) {
        self.input_reads += other.input_reads;
        self.sampled_reads += other.sampled_reads;

        for (dst, src) in self.nucleotide_counts.iter_mut().zip(&other.nucleotide_counts) {
            extend_u64(dst, src);
        }
        extend_f64(&mut self.quality_sums, &other.quality_sums);
        extend_u64(&mut self.quality_counts, &other.quality_counts);
        extend_u64(&mut self.length_histogram, &other.length_histogram);

        self.q20_bases += other.q20_bases;
        self.q30_bases += other.q30_bases;
        self.total_bases += other.total_bases;

        extend_u64(&mut self.adapter_trimmed_reads, &other.adapter_trimmed_reads);
        extend_u64(&mut self.adapter_trimmed_bases, &other.adapter_trimmed_bases);
        self.overlap_reads_merged += other.overlap_reads_merged;
        self.terminal_bases_trimmed += other.terminal_bases_trimmed;
        self.low_quality_trim_reads += other.low_quality_trim_reads;
        self.low_quality_trim_bases += other.low_quality_trim_bases;
        self.length_filtered_reads += other.length_filtered_reads;
        self.length_filtered_bases += other.length_filtered_bases;
        self.ambiguity_filtered_reads += other.ambiguity_filtered_reads;
        self.ambiguity_filtered_bases += other.ambiguity_filtered_bases;
        self.discarded += other.discarded;

        extend_u64(&mut self.demultiplexed_per_sample, &other.demultiplexed_per_sample);
        self.demultiplex_ambiguous += other.demultiplex_ambiguous;
        self.demultiplex_unidentified += other.demultiplex_unidentified;
    }
}

/// A bounded pool of [`StatsSlot`]s shared by the parallel reads-processor
/// step. `acquire` blocks only if every slot is checked out, which cannot
/// happen when the pool is sized to `max_threads` and at most `max_threads`
/// workers call `process` concurrently.
pub struct ThreadStatePool {
    slots: Mutex<Vec<StatsSlot>>,
    cv:    Condvar,
}

impl ThreadStatePool {
    pub fn new(capacity: usize) -> Self {
        let slots = (0..capacity.max(1)).map(|_| StatsSlot::default()).collect();
        ThreadStatePool { slots: Mutex::new(slots), cv: Condvar::new() }
    }

    pub fn acquire(&self) -> StatsSlot {
        let mut slots = self.slots.lock().expect("stats pool poisoned");
        loop {
            if let Some(slot) = slots.pop() {
                return slot;
            }
            slots = self.cv.wait(slots).expect("stats pool condvar poisoned");
        }
    }

    pub fn release(&self, slot: StatsSlot) {
        let mut slots = self.slots.lock().expect("stats pool poisoned");
        slots.push(slot);
        self.cv.notify_one();
    }

    /// Consumes the pool, summing every outstanding slot. Call only after
    /// every worker has released its slot (i.e. after `Scheduler::run`
    /// returns).
    pub fn finalize(self) -> StatsSlot {
        let mut total = StatsSlot::default();
        for slot in self.slots.into_inner().expect("stats pool poisoned") {
            total.merge(&slot);
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_is_additive_and_extends_shorter_vectors() {
        let mut a = StatsSlot::default();
        a.observe_input_read(b"ACGT", &[b'I'; 4], true);
        let mut b = StatsSlot::default();
        b.observe_input_read(b"ACGTAC", &[b'I'; 6], true);

        a.merge(&b);
        assert_eq!(a.input_reads, 2);
        assert_eq!(a.length_histogram.len(), 7);
        assert_eq!(a.quality_counts.len(), 6);
        assert_eq!(a.quality_counts[4], 1);
        assert_eq!(a.quality_counts[0], 2);
    }

    #[test]
    fn pool_round_trips_slots() {
        let pool = ThreadStatePool::new(2);
        let mut slot = pool.acquire();
        slot.input_reads += 1;
        pool.release(slot);
        let total = pool.finalize();
        assert_eq!(total.input_reads, 1);
    }
}
