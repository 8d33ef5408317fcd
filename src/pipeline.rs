//! Wires a validated [`Config`] into a concrete step graph and runs it to
//! completion (§3 "Pipeline graph", §4.6, §4.7).

use crate::adapters::OverlapParams;
use crate::chunk::ReadChunk;
use crate::config::{Config, OutputCompression, RunMode};
use crate::error::Result;
use crate::io::linereader::JoinedLineReader;
use crate::io::writers::LazySink;
use crate::output_map::{self, ReadType};
use crate::report::{self, ReportMeta};
use crate::scheduler::{step_ids, Scheduler};
use crate::stats::{StatsSlot, ThreadStatePool};
use crate::steps::compress::{Bzip2CompressStep, GzipCompressStep};
use crate::steps::demultiplex::DemultiplexStep;
use crate::steps::process::{Destinations, ProcessStep};
use crate::steps::read::ReadStep;
use crate::steps::split::SplitStep;
use crate::steps::write::WriteStep;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Registers the split/(compress)/write chain feeding one physical output
/// path, returning the step id a producer should send its `OutputChunk`s
/// to (the chain's entry point).
fn wire_chain(scheduler: &mut Scheduler, config: &Config, entry_id: usize, path: PathBuf) {
    // Each destination reserves a 3-wide id span: `entry` (split),
    // `entry + SPLIT_OFFSET` (compress, if any), and the write step at
    // `entry + SPLIT_OFFSET` (no compression) or `entry + ZIP_OFFSET`
    // (compression) — never both additively, so the span never exceeds
    // the gap between two destinations' base offsets.
    let split_id = entry_id;
    let compress_id = split_id + step_ids::SPLIT_OFFSET;
    let write_id = match config.compression {
        OutputCompression::None => split_id + step_ids::SPLIT_OFFSET,
        _ => split_id + step_ids::ZIP_OFFSET,
    };

    scheduler.add_ordered_step(split_id, Box::new(SplitStep::new(if config.compression == OutputCompression::None { write_id } else { compress_id })), 1);

    match config.compression {
        OutputCompression::None => {}
        OutputCompression::Gzip => scheduler.add_ordered_step(compress_id, Box::new(GzipCompressStep::new(write_id)), 1),
        OutputCompression::Bzip2 => scheduler.add_ordered_step(compress_id, Box::new(Bzip2CompressStep::new(write_id)), 1),
    }

    let sink = LazySink::new(path, config.compression.into());
    scheduler.add_ordered_step(write_id, Box::new(WriteStep::new(sink)), 1);
}

fn register_sample(
    scheduler: &mut Scheduler,
    config: &Config,
    sample_index: usize,
    sample_name: &str,
    adapter1: Vec<u8>,
    adapter2: Vec<u8>,
    stats_pool: Arc<ThreadStatePool>,
) {
    let base = step_ids::sample_base(sample_index);
    let paired = config.is_paired();
    let filename_map = output_map::for_sample(&config.output_dir, sample_name, paired, config.interleaved, config.merge);

    let path_of = |read_type: ReadType| filename_map.paths()[filename_map.slot_for(read_type).expect("read type not mapped")].clone();

    let mate1_entry = base + step_ids::WRITE_MATE_1;
    wire_chain(scheduler, config, mate1_entry, path_of(ReadType::Mate1));

    let mate2_entry = if !paired {
        mate1_entry
    } else if config.interleaved {
        mate1_entry
    } else {
        let entry = base + step_ids::WRITE_MATE_2;
        wire_chain(scheduler, config, entry, path_of(ReadType::Mate2));
        entry
    };

    let singleton_entry = if paired {
        let entry = base + step_ids::WRITE_SINGLETON;
        wire_chain(scheduler, config, entry, path_of(ReadType::Singleton));
        entry
    } else {
        mate1_entry
    };

    let collapsed_entry = if paired && config.merge {
        let entry = base + step_ids::WRITE_COLLAPSED;
        wire_chain(scheduler, config, entry, path_of(ReadType::Collapsed));
        entry
    } else {
        singleton_entry
    };

    let discarded_entry = base + step_ids::WRITE_DISCARDED;
    wire_chain(scheduler, config, discarded_entry, path_of(ReadType::Discarded));

    let destinations = Destinations {
        mate1: mate1_entry,
        mate2: mate2_entry,
        singleton: singleton_entry,
        collapsed: collapsed_entry,
        discarded: discarded_entry,
    };

    let overlap = OverlapParams { min_overlap: config.min_overlap, max_mismatch_rate: config.max_mismatch_rate };
    let process_step = ProcessStep::new(paired, config.quality_encoding, adapter1, adapter2, overlap, config.trim, config.merge, destinations, stats_pool);
    scheduler.add_parallel_step(base + step_ids::TRIM, Box::new(process_step), 1);
}

fn open_readers(config: &Config) -> Result<ReadStep> {
    let encoding = config.quality_encoding;
    let sep = config.mate_separator;

    if config.interleaved {
        let reader = JoinedLineReader::new(&config.input1)?;
        let next = if matches!(config.mode, RunMode::Demultiplex) { step_ids::DEMULTIPLEX } else { step_ids::sample_base(0) + step_ids::TRIM };
        return Ok(ReadStep::interleaved(reader, encoding, sep, step_ids::READ_FASTQ, next));
    }

    if !config.input2.is_empty() {
        let reader1 = JoinedLineReader::new(&config.input1)?;
        let reader2 = JoinedLineReader::new(&config.input2)?;
        let next = if matches!(config.mode, RunMode::Demultiplex) { step_ids::DEMULTIPLEX } else { step_ids::sample_base(0) + step_ids::TRIM };
        return Ok(ReadStep::paired(reader1, reader2, encoding, sep, step_ids::READ_FASTQ, next));
    }

    let reader = JoinedLineReader::new(&config.input1)?;
    let next = if matches!(config.mode, RunMode::Demultiplex) { step_ids::DEMULTIPLEX } else { step_ids::sample_base(0) + step_ids::TRIM };
    Ok(ReadStep::single(reader, encoding, sep, step_ids::READ_FASTQ, next))
}

pub fn run(config: Config, command_line: String) -> Result<()> {
    if matches!(config.mode, RunMode::IdentifyAdapters) {
        return crate::identify_adapters::run(&config);
    }

    let started = Instant::now();
    std::fs::create_dir_all(&config.output_dir).map_err(crate::error::ReadCleanError::from)?;

    let mut scheduler = Scheduler::new(step_ids::READ_FASTQ);
    let stats_pool = Arc::new(ThreadStatePool::new(config.max_threads));
    let demux_stats = Arc::new(Mutex::new(StatsSlot::default()));

    let read_step = open_readers(&config)?;
    scheduler.add_ordered_step(step_ids::READ_FASTQ, Box::new(read_step), 1);

    let demultiplexed = matches!(config.mode, RunMode::Demultiplex);

    if demultiplexed {
        let demux_step = DemultiplexStep::new(config.barcodes.clone(), config.barcode_mismatches, config.is_paired(), config.quality_encoding, Arc::clone(&demux_stats));
        scheduler.add_ordered_step(step_ids::DEMULTIPLEX, Box::new(demux_step), 1);

        let unident1_path = config.output_dir.join("unidentified.mate1.fastq");
        scheduler.add_ordered_step(step_ids::UNIDENT_1, Box::new(WriteStep::new(LazySink::new(unident1_path, config.compression.into()))), 1);
        if config.is_paired() {
            let unident2_path = config.output_dir.join("unidentified.mate2.fastq");
            scheduler.add_ordered_step(step_ids::UNIDENT_2, Box::new(WriteStep::new(LazySink::new(unident2_path, config.compression.into()))), 1);
        }

        for (sample_index, entry) in config.barcodes.iter().enumerate() {
            let pair = config.adapters.pairs.get(sample_index);
            let (adapter1, adapter2) = pair.map(|p| (p.adapter1.clone(), p.adapter2.clone())).unwrap_or_default();
            register_sample(&mut scheduler, &config, sample_index, &entry.sample_name, adapter1, adapter2, Arc::clone(&stats_pool));
        }
    } else {
        let pair = config.adapters.pairs.first();
        let (adapter1, adapter2) = pair.map(|p| (p.adapter1.clone(), p.adapter2.clone())).unwrap_or_default();
        register_sample(&mut scheduler, &config, 0, "output", adapter1, adapter2, Arc::clone(&stats_pool));
    }

    scheduler.run(config.max_threads)?;

    let mut merged = Arc::try_unwrap(stats_pool)
        .map_err(|_| crate::error::ReadCleanError::internal("stats pool still has outstanding references after scheduler shutdown"))?
        .finalize();
    let demux_totals = demux_stats.lock().expect("demux stats mutex poisoned").clone();
    merged.merge(&demux_totals);

    let meta = ReportMeta {
        version: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        command: command_line,
        runtime: started.elapsed().as_secs_f64(),
    };
    let report = report::build_report(meta, &merged, demultiplexed, demultiplexed && config.is_paired());
    report::write_report(&config.output_dir.join("report.json"), &report)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::AdapterSet;
    use crate::config::{OutputCompression as ConfigCompression, RunMode, TrimParams};
    use crate::quality::QualityEncoding;
    use std::io::Write;

    fn write_fastq(dir: &std::path::Path, name: &str, records: &[(&str, &str, &str)]) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        for (header, seq, qual) in records {
            writeln!(file, "@{header}\n{seq}\n+\n{qual}").unwrap();
        }
        path
    }

    fn base_config(dir: &std::path::Path, input1: Vec<PathBuf>, input2: Vec<PathBuf>) -> Config {
        Config {
            mode: RunMode::Trim,
            input1,
            input2,
            interleaved: false,
            output_dir: dir.join("out"),
            compression: ConfigCompression::None,
            quality_encoding: QualityEncoding::Phred33,
            mate_separator: b'/',
            adapters: AdapterSet::single(Vec::new(), Vec::new()),
            min_overlap: 11,
            max_mismatch_rate: 0.1,
            trim: TrimParams { min_quality: 2, window_size: 10.0, preserve5p: false, trim_ns: false, min_length: 1, max_length: None },
            merge: false,
            barcodes: Vec::new(),
            barcode_mismatches: 0,
            kmer_length: 0,
            max_threads: 2,
            sample_rate: 1.0,
        }
    }

    #[test]
    fn single_ended_trim_run_writes_output_and_report() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_fastq(
            dir.path(),
            "in.fastq",
            &[("r1", "ACGTACGTACGTACGT", "IIIIIIIIIIIIIIII"), ("r2", "TTTTACGTACGTACGT", "IIIIIIIIIIIIIIII")],
        );
        let config = base_config(dir.path(), vec![input], Vec::new());

        run(config, "readclean trim".to_string()).unwrap();

        let output_dir = dir.path().join("out");
        assert!(output_dir.join("output.mate1.fastq").exists());
        assert!(output_dir.join("report.json").exists());

        let contents = std::fs::read_to_string(output_dir.join("output.mate1.fastq")).unwrap();
        assert!(contents.contains("r1"));
        assert!(contents.contains("r2"));
    }

    #[test]
    fn paired_end_trim_run_writes_both_mates() {
        let dir = tempfile::tempdir().unwrap();
        let input1 = write_fastq(dir.path(), "in_1.fastq", &[("r1/1", "ACGTACGTACGTACGT", "IIIIIIIIIIIIIIII")]);
        let input2 = write_fastq(dir.path(), "in_2.fastq", &[("r1/2", "TGCATGCATGCATGCA", "IIIIIIIIIIIIIIII")]);
        let config = base_config(dir.path(), vec![input1], vec![input2]);

        run(config, "readclean trim".to_string()).unwrap();

        let output_dir = dir.path().join("out");
        assert!(output_dir.join("output.mate1.fastq").exists());
        assert!(output_dir.join("output.mate2.fastq").exists());
    }
}
