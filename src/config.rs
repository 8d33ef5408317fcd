//! Run configuration (C11, part of §3): the validated, immutable value
//! built once from CLI arguments and shared via `Arc` across every worker.

use crate::adapters::AdapterSet;
use crate::quality::QualityEncoding;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Trim,
    Demultiplex,
    IdentifyAdapters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputCompression {
    #[default]
    None,
    Gzip,
    Bzip2,
}

impl From<OutputCompression> for crate::io::writers::OutputCompression {
    fn from(value: OutputCompression) -> Self {
        match value {
            OutputCompression::None => crate::io::writers::OutputCompression::None,
            OutputCompression::Gzip => crate::io::writers::OutputCompression::Gzip,
            OutputCompression::Bzip2 => crate::io::writers::OutputCompression::Bzip2,
        }
    }
}

/// One barcode entry parsed from a `--barcodes` file: sample name plus one
/// or two barcode sequences.
#[derive(Debug, Clone)]
pub struct BarcodeEntry {
    pub sample_name: String,
    pub barcode1:    Vec<u8>,
    pub barcode2:    Option<Vec<u8>>,
}

/// Trimming thresholds shared by the reads processor.
#[derive(Debug, Clone, Copy)]
pub struct TrimParams {
    pub min_quality:  u8,
    pub window_size:  f64,
    pub preserve5p:   bool,
    pub trim_ns:      bool,
    pub min_length:   usize,
    pub max_length:   Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: RunMode,

    pub input1:      Vec<PathBuf>,
    pub input2:      Vec<PathBuf>,
    pub interleaved: bool,

    pub output_dir:   PathBuf,
    pub compression:  OutputCompression,

    pub quality_encoding: QualityEncoding,
    pub mate_separator:   u8,

    pub adapters:          AdapterSet,
    pub min_overlap:       usize,
    pub max_mismatch_rate: f64,
    pub trim:              TrimParams,
    pub merge:             bool,

    pub barcodes:            Vec<BarcodeEntry>,
    pub barcode_mismatches:  usize,

    pub kmer_length: usize,

    pub max_threads: usize,
    pub sample_rate: f64,
}

impl Config {
    pub fn is_paired(&self) -> bool {
        self.interleaved || !self.input2.is_empty()
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Invalid(String),
}

impl ConfigError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        ConfigError::Invalid(message.into())
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid(message) => write!(f, "ConfigError: {message}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for crate::error::ReadCleanError {
    fn from(err: ConfigError) -> Self {
        crate::error::ReadCleanError::config(err.to_string())
    }
}
