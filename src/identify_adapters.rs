//! `identify-adapters` diagnostic (§6): a single-pass, rayon-parallel tally
//! of overrepresented 3' k-mers per mate, reported instead of running the
//! full trimming pipeline (§5 "Worker pool implementation").

use crate::config::Config;
use crate::error::{Result, WithPath};
use crate::fastq::FastqRecord;
use crate::io::linereader::JoinedLineReader;
use crate::quality::QualityEncoding;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// How many of the most frequent k-mers are kept per mate.
const TOP_N: usize = 10;

#[derive(Serialize)]
pub struct KmerCount {
    pub kmer:  String,
    pub count: u64,
}

#[derive(Serialize)]
pub struct AdapterIdentificationReport {
    pub kmer_length: usize,
    pub reads_scanned_1: u64,
    pub reads_scanned_2: Option<u64>,
    pub mate1: Vec<KmerCount>,
    pub mate2: Option<Vec<KmerCount>>,
}

fn tally_mate(paths: &[PathBuf], encoding: QualityEncoding, kmer_length: usize) -> Result<(u64, HashMap<Vec<u8>, u64>)> {
    let mut reader = JoinedLineReader::new(paths)?;
    let mut records = Vec::new();
    while let Some(record) = FastqRecord::read(&mut reader, encoding)? {
        records.push(record);
    }

    let scanned = records.len() as u64;

    let fold_one = |mut acc: HashMap<Vec<u8>, u64>, record: &FastqRecord| {
        if record.len() >= kmer_length {
            let tail = &record.sequence[record.len() - kmer_length..];
            *acc.entry(tail.to_vec()).or_insert(0) += 1;
        }
        acc
    };
    #[cfg(not(feature = "dev_no_rayon"))]
    let counts = {
        let merge = |mut a: HashMap<Vec<u8>, u64>, b: HashMap<Vec<u8>, u64>| {
            for (kmer, count) in b {
                *a.entry(kmer).or_insert(0) += count;
            }
            a
        };
        records.par_iter().fold(HashMap::new, fold_one).reduce(HashMap::new, merge)
    };
    #[cfg(feature = "dev_no_rayon")]
    let counts = records.iter().fold(HashMap::new(), fold_one);

    Ok((scanned, counts))
}

fn top_n(counts: HashMap<Vec<u8>, u64>, n: usize) -> Vec<KmerCount> {
    let mut ranked: Vec<KmerCount> = counts
        .into_iter()
        .map(|(kmer, count)| KmerCount { kmer: String::from_utf8_lossy(&kmer).into_owned(), count })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.kmer.cmp(&b.kmer)));
    ranked.truncate(n);
    ranked
}

fn write_report(path: &Path, report: &AdapterIdentificationReport) -> Result<()> {
    let file = std::fs::File::create(path).with_path(path)?;
    serde_json::to_writer_pretty(file, report).map_err(|e| crate::error::ReadCleanError::internal(format!("failed to serialize adapter report: {e}")))
}

/// Runs the k-mer tally over `config`'s inputs and writes
/// `<output_dir>/adapters.json`, logging the top hits for each mate.
pub fn run(config: &Config) -> Result<()> {
    std::fs::create_dir_all(&config.output_dir).map_err(crate::error::ReadCleanError::from)?;

    let (scanned1, counts1) = tally_mate(&config.input1, config.quality_encoding, config.kmer_length)?;
    let mate1 = top_n(counts1, TOP_N);
    for hit in &mate1 {
        log::info!("mate1 3' {}-mer {} occurs {} times", config.kmer_length, hit.kmer, hit.count);
    }

    let (scanned2, mate2) = if config.input2.is_empty() {
        (None, None)
    } else {
        let (scanned, counts) = tally_mate(&config.input2, config.quality_encoding, config.kmer_length)?;
        let ranked = top_n(counts, TOP_N);
        for hit in &ranked {
            log::info!("mate2 3' {}-mer {} occurs {} times", config.kmer_length, hit.kmer, hit.count);
        }
        (Some(scanned), Some(ranked))
    };

    let report = AdapterIdentificationReport {
        kmer_length: config.kmer_length,
        reads_scanned_1: scanned1,
        reads_scanned_2: scanned2,
        mate1,
        mate2,
    };
    write_report(&config.output_dir.join("adapters.json"), &report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn tallies_most_frequent_trailing_kmer() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "@r1\nACGTACGT\n+\n!!!!!!!!\n@r2\nTTTTACGT\n+\n!!!!!!!!\n@r3\nGGGGTTTT\n+\n!!!!!!!!").unwrap();

        let (scanned, counts) = tally_mate(&[file.path().to_path_buf()], QualityEncoding::Phred33, 4).unwrap();
        assert_eq!(scanned, 3);
        let ranked = top_n(counts, 10);
        assert_eq!(ranked[0].kmer, "ACGT");
        assert_eq!(ranked[0].count, 2);
    }
}
