//! The JSON report writer (C10): serializes merged statistics into the
//! structure described in SPEC_FULL.md §6, mirroring the reference
//! implementation's "summary digest + detail sections" shape.

use crate::error::{Result, WithPath};
use crate::stats::StatsSlot;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
pub struct ReportMeta {
    pub version: String,
    pub command: String,
    pub runtime: f64,
}

#[derive(Serialize)]
pub struct InputSummary {
    pub reads:   u64,
    pub bases:   u64,
    pub q20_rate: f64,
    pub q30_rate: f64,
}

#[derive(Serialize, Clone)]
pub struct DemultiplexSummary {
    pub per_sample:   Vec<u64>,
    pub ambiguous:    u64,
    pub unidentified: u64,
}

#[derive(Serialize)]
pub struct TrimmingSummary {
    pub adapter_trimmed_reads:    Vec<u64>,
    pub adapter_trimmed_bases:    Vec<u64>,
    pub overlap_reads_merged:     u64,
    pub terminal_bases_trimmed:   u64,
    pub low_quality_trim_reads:   u64,
    pub low_quality_trim_bases:   u64,
    pub length_filtered_reads:    u64,
    pub length_filtered_bases:    u64,
    pub ambiguity_filtered_reads: u64,
    pub ambiguity_filtered_bases: u64,
}

#[derive(Serialize)]
pub struct OutputSummary {
    pub passed:         u64,
    pub unidentified_1: Option<u64>,
    pub unidentified_2: Option<u64>,
    pub discarded:      u64,
}

#[derive(Serialize)]
pub struct Summary {
    pub input:                  InputSummary,
    pub demultiplexing:         Option<DemultiplexSummary>,
    pub trimming_and_filtering: Option<TrimmingSummary>,
    pub output:                 OutputSummary,
}

#[derive(Serialize)]
pub struct DetailSection {
    pub lengths:         Vec<u64>,
    pub quality_curves:  Vec<f64>,
    pub content_curves:  [Vec<u64>; 5],
}

#[derive(Serialize)]
pub struct Report {
    pub meta:  ReportMeta,
    pub summary: Summary,
    pub input:   DetailSection,
    pub demultiplexing: Option<DemultiplexSummary>,
    pub output:  OutputSummary,
}

fn quality_curve(stats: &StatsSlot) -> Vec<f64> {
    stats
        .quality_sums
        .iter()
        .zip(&stats.quality_counts)
        .map(|(&sum, &count)| if count == 0 { 0.0 } else { sum / count as f64 })
        .collect()
}

/// Builds the report document from merged statistics. `demultiplexed`
/// selects whether the `demultiplexing`/`trimming_and_filtering` sections
/// are populated or `null`, matching §6.
pub fn build_report(meta: ReportMeta, stats: &StatsSlot, demultiplexed: bool, unident_paired: bool) -> Report {
    let q20_rate = if stats.total_bases == 0 { 0.0 } else { stats.q20_bases as f64 / stats.total_bases as f64 };
    let q30_rate = if stats.total_bases == 0 { 0.0 } else { stats.q30_bases as f64 / stats.total_bases as f64 };

    let input_summary = InputSummary { reads: stats.input_reads, bases: stats.total_bases, q20_rate, q30_rate };

    let demultiplexing = demultiplexed.then(|| DemultiplexSummary {
        per_sample:   stats.demultiplexed_per_sample.clone(),
        ambiguous:    stats.demultiplex_ambiguous,
        unidentified: stats.demultiplex_unidentified,
    });

    let trimming = Some(TrimmingSummary {
        adapter_trimmed_reads:    stats.adapter_trimmed_reads.clone(),
        adapter_trimmed_bases:    stats.adapter_trimmed_bases.clone(),
        overlap_reads_merged:     stats.overlap_reads_merged,
        terminal_bases_trimmed:   stats.terminal_bases_trimmed,
        low_quality_trim_reads:   stats.low_quality_trim_reads,
        low_quality_trim_bases:   stats.low_quality_trim_bases,
        length_filtered_reads:    stats.length_filtered_reads,
        length_filtered_bases:    stats.length_filtered_bases,
        ambiguity_filtered_reads: stats.ambiguity_filtered_reads,
        ambiguity_filtered_bases: stats.ambiguity_filtered_bases,
    });

    let output_summary = OutputSummary {
        passed:         stats.input_reads.saturating_sub(stats.discarded),
        unidentified_1: demultiplexed.then_some(stats.demultiplex_unidentified),
        unidentified_2: (demultiplexed && unident_paired).then_some(stats.demultiplex_unidentified),
        discarded:      stats.discarded,
    };

    let detail = DetailSection {
        lengths:        stats.length_histogram.clone(),
        quality_curves: quality_curve(stats),
        content_curves: stats.nucleotide_counts.clone(),
    };

    Report {
        meta,
        summary: Summary {
            input: input_summary,
            demultiplexing: demultiplexing.clone(),
            trimming_and_filtering: trimming,
            output: OutputSummary {
                passed:         output_summary.passed,
                unidentified_1: output_summary.unidentified_1,
                unidentified_2: output_summary.unidentified_2,
                discarded:      output_summary.discarded,
            },
        },
        input: detail,
        demultiplexing,
        output: output_summary,
    }
}

pub fn write_report(path: &Path, report: &Report) -> Result<()> {
    let file = std::fs::File::create(path).with_path(path)?;
    serde_json::to_writer_pretty(file, report).map_err(|e| crate::error::ReadCleanError::internal(format!("failed to serialize report: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> ReportMeta {
        ReportMeta { version: "test 0.0.0".to_string(), command: "readclean trim".to_string(), runtime: 0.5 }
    }

    #[test]
    fn non_demultiplexed_run_nulls_out_demultiplexing_section() {
        let mut stats = StatsSlot::default();
        stats.observe_input_read(b"ACGT", &[b'I'; 4], true);
        stats.discarded = 1;

        let report = build_report(meta(), &stats, false, false);
        assert!(report.summary.demultiplexing.is_none());
        assert!(report.demultiplexing.is_none());
        assert_eq!(report.summary.output.unidentified_1, None);
        assert_eq!(report.output.passed, 0);
    }

    #[test]
    fn demultiplexed_run_populates_per_sample_counts() {
        let mut stats = StatsSlot::default();
        stats.record_demultiplexed(0);
        stats.record_demultiplexed(0);
        stats.demultiplex_unidentified = 3;

        let report = build_report(meta(), &stats, true, true);
        let demux = report.demultiplexing.unwrap();
        assert_eq!(demux.per_sample, vec![2]);
        assert_eq!(demux.unidentified, 3);
        assert_eq!(report.summary.output.unidentified_2, Some(3));
    }

    #[test]
    fn q20_q30_rates_are_zero_with_no_bases_observed() {
        let stats = StatsSlot::default();
        let report = build_report(meta(), &stats, false, false);
        assert_eq!(report.summary.input.q20_rate, 0.0);
        assert_eq!(report.summary.input.q30_rate, 0.0);
    }

    #[test]
    fn write_report_round_trips_through_json() {
        let stats = StatsSlot::default();
        let report = build_report(meta(), &stats, false, false);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        write_report(&path, &report).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["meta"]["command"], "readclean trim");
    }
}
