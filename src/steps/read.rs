//! The reader step (§4.7): owns one, two, or one interleaved joined line
//! reader and parses records in batches, requeuing itself until exhausted.

use super::FASTQ_CHUNK_SIZE;
use crate::chunk::{Chunk, ReadChunk};
use crate::error::Result;
use crate::fastq::{validate_paired_reads, FastqRecord};
use crate::io::linereader::JoinedLineReader;
use crate::quality::QualityEncoding;
use crate::scheduler::OrderedStep;

enum ReadSource {
    Single(JoinedLineReader),
    Paired(JoinedLineReader, JoinedLineReader),
    Interleaved(JoinedLineReader),
}

pub struct ReadStep {
    source:         ReadSource,
    encoding:       QualityEncoding,
    mate_separator: u8,
    self_id:        usize,
    next_step:      usize,
}

impl ReadStep {
    pub fn single(reader: JoinedLineReader, encoding: QualityEncoding, mate_separator: u8, self_id: usize, next_step: usize) -> Self {
        ReadStep { source: ReadSource::Single(reader), encoding, mate_separator, self_id, next_step }
    }

    pub fn paired(
        reader1: JoinedLineReader,
        reader2: JoinedLineReader,
        encoding: QualityEncoding,
        mate_separator: u8,
        self_id: usize,
        next_step: usize,
    ) -> Self {
        ReadStep { source: ReadSource::Paired(reader1, reader2), encoding, mate_separator, self_id, next_step }
    }

    pub fn interleaved(reader: JoinedLineReader, encoding: QualityEncoding, mate_separator: u8, self_id: usize, next_step: usize) -> Self {
        ReadStep { source: ReadSource::Interleaved(reader), encoding, mate_separator, self_id, next_step }
    }

    fn read_one(&mut self) -> Result<Option<(FastqRecord, Option<FastqRecord>)>> {
        match &mut self.source {
            ReadSource::Single(reader) => {
                let Some(mut record) = FastqRecord::read(reader, self.encoding)? else {
                    return Ok(None);
                };
                record.fix_mate_info(self.mate_separator);
                Ok(Some((record, None)))
            }
            ReadSource::Paired(reader1, reader2) => {
                let first = FastqRecord::read(reader1, self.encoding)?;
                let second = FastqRecord::read(reader2, self.encoding)?;
                match (first, second) {
                    (Some(mut m1), Some(mut m2)) => {
                        validate_paired_reads(&mut m1, &mut m2, self.mate_separator)?;
                        Ok(Some((m1, Some(m2))))
                    }
                    (None, None) => Ok(None),
                    _ => Err(crate::error::ReadCleanError::fastq("mate files have differing record counts")),
                }
            }
            ReadSource::Interleaved(reader) => {
                let Some(mut m1) = FastqRecord::read(reader, self.encoding)? else {
                    return Ok(None);
                };
                let Some(mut m2) = FastqRecord::read(reader, self.encoding)? else {
                    return Err(crate::error::ReadCleanError::fastq("interleaved input has an odd number of records"));
                };
                validate_paired_reads(&mut m1, &mut m2, self.mate_separator)?;
                Ok(Some((m1, Some(m2))))
            }
        }
    }
}

impl OrderedStep for ReadStep {
    fn name(&self) -> &'static str {
        "read"
    }

    fn process(&mut self, _chunk: Chunk) -> Result<Vec<(usize, Chunk)>> {
        let mut reads_1 = Vec::with_capacity(FASTQ_CHUNK_SIZE);
        let mut reads_2 = Vec::with_capacity(FASTQ_CHUNK_SIZE);
        let mut exhausted = false;

        for _ in 0..FASTQ_CHUNK_SIZE {
            match self.read_one()? {
                Some((m1, Some(m2))) => {
                    reads_1.push(m1);
                    reads_2.push(m2);
                }
                Some((m1, None)) => reads_1.push(m1),
                None => {
                    exhausted = true;
                    break;
                }
            }
        }

        let mut out = Vec::new();
        if !reads_1.is_empty() {
            out.push((self.next_step, Chunk::Read(ReadChunk { eof: false, reads_1, reads_2, arrival_seq: 0 })));
        }
        if exhausted {
            out.push((self.next_step, Chunk::Read(ReadChunk::eof())));
        } else {
            out.push((self.self_id, Chunk::Read(ReadChunk { eof: false, reads_1: Vec::new(), reads_2: Vec::new(), arrival_seq: 0 })));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fastq_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn single_ended_emits_one_batch_then_eof() {
        let file = fastq_file("@r1\nACGT\n+\nIIII\n@r2\nTTTT\n+\nIIII\n");
        let reader = JoinedLineReader::new(&[file.path().to_path_buf()]).unwrap();
        let mut step = ReadStep::single(reader, QualityEncoding::Phred33, b'/', 0, 16);

        let mut first = step.process(Chunk::Read(ReadChunk::default())).unwrap();
        assert_eq!(first.len(), 2);
        let eof_chunk = first.pop().unwrap();
        let (next_step, batch) = first.pop().unwrap();
        assert_eq!(next_step, 16);
        let ReadChunk { eof, reads_1, reads_2, arrival_seq: _ } = match batch {
            Chunk::Read(c) => c,
            _ => panic!("expected a ReadChunk"),
        };
        assert!(!eof);
        assert_eq!(reads_1.len(), 2);
        assert!(reads_2.is_empty());
        // Fewer records than FASTQ_CHUNK_SIZE means the reader hit EOF this
        // call, so the second emission is the terminal EOF chunk, not a
        // self-requeue.
        assert_eq!(eof_chunk.0, 16);
        assert!(eof_chunk.1.is_eof());
    }

    #[test]
    fn paired_rejects_mismatched_record_counts() {
        let file1 = fastq_file("@r1\nACGT\n+\nIIII\n@r2\nACGT\n+\nIIII\n");
        let file2 = fastq_file("@r1\nACGT\n+\nIIII\n");
        let reader1 = JoinedLineReader::new(&[file1.path().to_path_buf()]).unwrap();
        let reader2 = JoinedLineReader::new(&[file2.path().to_path_buf()]).unwrap();
        let mut step = ReadStep::paired(reader1, reader2, QualityEncoding::Phred33, b'/', 0, 16);

        assert!(step.process(Chunk::Read(ReadChunk::default())).is_err());
    }

    #[test]
    fn interleaved_rejects_odd_record_count() {
        let file = fastq_file("@r1\nACGT\n+\nIIII\n");
        let reader = JoinedLineReader::new(&[file.path().to_path_buf()]).unwrap();
        let mut step = ReadStep::interleaved(reader, QualityEncoding::Phred33, b'/', 0, 16);

        assert!(step.process(Chunk::Read(ReadChunk::default())).is_err());
    }
}
