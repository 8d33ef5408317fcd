//! CLI surface (C11): one `#[derive(Args)]` struct per concern, flattened
//! into subcommands, validated into an immutable [`Config`].

use crate::adapters::{AdapterPair, AdapterSet};
use crate::config::{BarcodeEntry, Config, ConfigError, OutputCompression, RunMode, TrimParams};
use crate::quality::QualityEncoding;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "readclean", version, about = "Cleans NGS FASTQ reads: demultiplexing, adapter/quality trimming, and PE merging.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Trim adapters/quality and optionally merge mate pairs (the default pipeline).
    Trim(TrimArgs),
    /// Demultiplex by barcode, then trim each sample.
    Demultiplex(DemultiplexArgs),
    /// Report overrepresented 3' k-mers per mate instead of trimming.
    IdentifyAdapters(IdentifyAdaptersArgs),
}

#[derive(Args, Clone)]
pub struct IoArgs {
    #[arg(short = '1', long)]
    pub input1: Vec<PathBuf>,
    #[arg(short = '2', long)]
    pub input2: Vec<PathBuf>,
    #[arg(long)]
    pub interleaved: bool,
    #[arg(short, long, default_value = "out")]
    pub output_dir: PathBuf,
    #[arg(long, group = "compression")]
    pub gzip: bool,
    #[arg(long, group = "compression")]
    pub bzip2: bool,
    #[arg(short, long)]
    pub threads: Option<usize>,
    #[arg(long, value_enum, default_value = "phred33")]
    pub quality_encoding: QualityEncoding,
    #[arg(long, default_value = "/")]
    pub mate_separator: char,
    #[arg(short, long)]
    pub verbose: bool,
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Args, Clone)]
pub struct TrimmingArgs {
    #[arg(long, default_value_t = 2)]
    pub min_quality: u8,
    #[arg(long, default_value_t = 10.0)]
    pub trim_window: f64,
    #[arg(long)]
    pub preserve5p: bool,
    #[arg(long)]
    pub trim_ns: bool,
    #[arg(long, default_value_t = 15)]
    pub min_length: usize,
    #[arg(long)]
    pub max_length: Option<usize>,
    #[arg(long)]
    pub merge: bool,
    #[arg(long, default_value_t = 11)]
    pub min_overlap: usize,
    #[arg(long, default_value_t = 0.1)]
    pub max_mismatch_rate: f64,
    #[arg(long, default_value_t = 1.0)]
    pub sample_rate: f64,
    #[arg(long)]
    pub adapter1: Option<String>,
    #[arg(long)]
    pub adapter2: Option<String>,
}

#[derive(Args)]
pub struct TrimArgs {
    #[command(flatten)]
    pub io: IoArgs,
    #[command(flatten)]
    pub trimming: TrimmingArgs,
}

#[derive(Args)]
pub struct DemultiplexArgs {
    #[command(flatten)]
    pub io: IoArgs,
    #[command(flatten)]
    pub trimming: TrimmingArgs,
    #[arg(long)]
    pub barcodes: PathBuf,
    #[arg(long, default_value_t = 1)]
    pub barcode_mismatches: usize,
}

#[derive(Args)]
pub struct IdentifyAdaptersArgs {
    #[command(flatten)]
    pub io: IoArgs,
    #[arg(long, default_value_t = 13)]
    pub kmer_length: usize,
}

fn resolve_threads(threads: Option<usize>) -> usize {
    threads.unwrap_or_else(num_cpus::get)
}

fn validate_io(io: &IoArgs) -> Result<(), ConfigError> {
    if io.input1.is_empty() {
        return Err(ConfigError::new("at least one --input1 file is required"));
    }
    if !io.input2.is_empty() && io.interleaved {
        return Err(ConfigError::new("--input2 and --interleaved are mutually exclusive"));
    }
    if !io.input2.is_empty() && io.input2.len() != io.input1.len() {
        return Err(ConfigError::new("--input1 and --input2 must list the same number of files"));
    }
    if io.gzip && io.bzip2 {
        return Err(ConfigError::new("--gzip and --bzip2 are mutually exclusive"));
    }
    Ok(())
}

fn compression_of(io: &IoArgs) -> OutputCompression {
    if io.gzip {
        OutputCompression::Gzip
    } else if io.bzip2 {
        OutputCompression::Bzip2
    } else {
        OutputCompression::None
    }
}

fn trim_params_of(trimming: &TrimmingArgs) -> TrimParams {
    TrimParams {
        min_quality: trimming.min_quality,
        window_size: trimming.trim_window,
        preserve5p:  trimming.preserve5p,
        trim_ns:     trimming.trim_ns,
        min_length:  trimming.min_length,
        max_length:  trimming.max_length,
    }
}

pub fn build_trim_config(args: TrimArgs) -> Result<Config, ConfigError> {
    validate_io(&args.io)?;

    let adapters = AdapterSet::single(
        args.trimming.adapter1.clone().unwrap_or_default().into_bytes(),
        args.trimming.adapter2.clone().unwrap_or_default().into_bytes(),
    );

    Ok(Config {
        mode: RunMode::Trim,
        input1: args.io.input1,
        input2: args.io.input2,
        interleaved: args.io.interleaved,
        output_dir: args.io.output_dir,
        compression: compression_of(&args.io),
        quality_encoding: args.io.quality_encoding,
        mate_separator: args.io.mate_separator as u8,
        adapters,
        min_overlap: args.trimming.min_overlap,
        max_mismatch_rate: args.trimming.max_mismatch_rate,
        trim: trim_params_of(&args.trimming),
        merge: args.trimming.merge,
        barcodes: Vec::new(),
        barcode_mismatches: 0,
        kmer_length: 0,
        max_threads: resolve_threads(args.io.threads),
        sample_rate: args.trimming.sample_rate,
    })
}

fn parse_barcode_file(path: &std::path::Path) -> Result<Vec<BarcodeEntry>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::new(format!("failed to read barcodes file {}: {e}", path.display())))?;
    let mut entries = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let columns: Vec<&str> = line.split_whitespace().collect();
        match columns.as_slice() {
            [name, barcode1] => entries.push(BarcodeEntry { sample_name: name.to_string(), barcode1: barcode1.as_bytes().to_vec(), barcode2: None }),
            [name, barcode1, barcode2] => entries.push(BarcodeEntry {
                sample_name: name.to_string(),
                barcode1:    barcode1.as_bytes().to_vec(),
                barcode2:    Some(barcode2.as_bytes().to_vec()),
            }),
            _ => return Err(ConfigError::new(format!("malformed barcodes line: {line}"))),
        }
    }
    if entries.is_empty() {
        return Err(ConfigError::new("barcodes file contained no entries"));
    }
    Ok(entries)
}

pub fn build_demultiplex_config(args: DemultiplexArgs) -> Result<Config, ConfigError> {
    validate_io(&args.io)?;
    let barcodes = parse_barcode_file(&args.barcodes)?;

    let adapters = AdapterSet {
        pairs: barcodes
            .iter()
            .map(|b| AdapterPair {
                sample_name: b.sample_name.clone(),
                adapter1:    args.trimming.adapter1.clone().unwrap_or_default().into_bytes(),
                adapter2:    args.trimming.adapter2.clone().unwrap_or_default().into_bytes(),
            })
            .collect(),
    };

    Ok(Config {
        mode: RunMode::Demultiplex,
        input1: args.io.input1,
        input2: args.io.input2,
        interleaved: args.io.interleaved,
        output_dir: args.io.output_dir,
        compression: compression_of(&args.io),
        quality_encoding: args.io.quality_encoding,
        mate_separator: args.io.mate_separator as u8,
        adapters,
        min_overlap: args.trimming.min_overlap,
        max_mismatch_rate: args.trimming.max_mismatch_rate,
        trim: trim_params_of(&args.trimming),
        merge: args.trimming.merge,
        barcodes,
        barcode_mismatches: args.barcode_mismatches,
        kmer_length: 0,
        max_threads: resolve_threads(args.io.threads),
        sample_rate: args.trimming.sample_rate,
    })
}

pub fn build_identify_adapters_config(args: IdentifyAdaptersArgs) -> Result<Config, ConfigError> {
    validate_io(&args.io)?;

    Ok(Config {
        mode: RunMode::IdentifyAdapters,
        input1: args.io.input1,
        input2: args.io.input2,
        interleaved: args.io.interleaved,
        output_dir: args.io.output_dir,
        compression: compression_of(&args.io),
        quality_encoding: args.io.quality_encoding,
        mate_separator: args.io.mate_separator as u8,
        adapters: AdapterSet::default(),
        min_overlap: 0,
        max_mismatch_rate: 0.0,
        trim: TrimParams { min_quality: 0, window_size: 1.0, preserve5p: false, trim_ns: false, min_length: 0, max_length: None },
        merge: false,
        barcodes: Vec::new(),
        barcode_mismatches: 0,
        kmer_length: args.kmer_length,
        max_threads: resolve_threads(args.io.threads),
        sample_rate: 1.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn io_args(input1: Vec<PathBuf>, input2: Vec<PathBuf>) -> IoArgs {
        IoArgs {
            input1,
            input2,
            interleaved: false,
            output_dir: PathBuf::from("out"),
            gzip: false,
            bzip2: false,
            threads: Some(1),
            quality_encoding: QualityEncoding::Phred33,
            mate_separator: '/',
            verbose: false,
            quiet: false,
        }
    }

    #[test]
    fn rejects_missing_input1() {
        let err = validate_io(&io_args(Vec::new(), Vec::new())).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_mismatched_mate_file_counts() {
        let io = io_args(vec![PathBuf::from("a_1.fastq")], vec![PathBuf::from("a_2.fastq"), PathBuf::from("b_2.fastq")]);
        assert!(validate_io(&io).is_err());
    }

    #[test]
    fn rejects_interleaved_with_input2() {
        let mut io = io_args(vec![PathBuf::from("a.fastq")], vec![PathBuf::from("b.fastq")]);
        io.interleaved = true;
        assert!(validate_io(&io).is_err());
    }

    #[test]
    fn accepts_well_formed_single_end_input() {
        let io = io_args(vec![PathBuf::from("a.fastq")], Vec::new());
        assert!(validate_io(&io).is_ok());
    }

    #[test]
    fn build_trim_config_resolves_thread_default_and_compression() {
        let args = TrimArgs {
            io: io_args(vec![PathBuf::from("a.fastq")], Vec::new()),
            trimming: TrimmingArgs {
                min_quality: 2,
                trim_window: 10.0,
                preserve5p: false,
                trim_ns: false,
                min_length: 15,
                max_length: None,
                merge: false,
                min_overlap: 11,
                max_mismatch_rate: 0.1,
                sample_rate: 1.0,
                adapter1: Some("AGATCGGAAGAGC".to_string()),
                adapter2: None,
            },
        };
        let config = build_trim_config(args).unwrap();
        assert_eq!(config.mode, RunMode::Trim);
        assert_eq!(config.max_threads, 1);
        assert_eq!(config.adapters.pairs[0].adapter1, b"AGATCGGAAGAGC");
    }

    #[test]
    fn parse_barcode_file_reads_single_and_dual_barcode_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        writeln!(file, "# comment\nsampleA\tACGT\nsampleB\tACGT\tTGCA\n").unwrap();

        let entries = parse_barcode_file(file.path()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].sample_name, "sampleA");
        assert!(entries[0].barcode2.is_none());
        assert_eq!(entries[1].barcode2.as_deref(), Some(b"TGCA".as_slice()));
    }

    #[test]
    fn parse_barcode_file_rejects_malformed_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        writeln!(file, "sampleA\tACGT\tTGCA\textra").unwrap();
        assert!(parse_barcode_file(file.path()).is_err());
    }
}
