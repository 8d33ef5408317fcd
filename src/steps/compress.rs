//! Gzip / bzip2 compressor steps (§4.7): ordered, streaming encoders that
//! feed input bytes in and append produced bytes to the chunk's `buffers`
//! list before forwarding it on.

use crate::chunk::{Chunk, OutputChunk};
use crate::error::{ReadCleanError, Result};
use crate::scheduler::OrderedStep;
use bzip2::write::BzEncoder;
use bzip2::Compression as Bzip2Compression;
use flate2::write::GzEncoder;
use flate2::Compression as GzCompression;
use std::io::Write;

pub struct GzipCompressStep {
    next_step: usize,
    encoder:   GzEncoder<Vec<u8>>,
}

impl GzipCompressStep {
    pub fn new(next_step: usize) -> Self {
        GzipCompressStep { next_step, encoder: GzEncoder::new(Vec::new(), GzCompression::default()) }
    }
}

impl OrderedStep for GzipCompressStep {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn process(&mut self, chunk: Chunk) -> Result<Vec<(usize, Chunk)>> {
        let chunk = chunk.into_output()?;
        let eof = chunk.eof;

        if !chunk.reads.is_empty() {
            self.encoder
                .write_all(&chunk.reads)
                .map_err(|e| ReadCleanError::Gzip { message: e.to_string(), path: None })?;
        }

        let mut out_chunk = OutputChunk { eof: false, count: chunk.count, reads: Vec::new(), buffers: Vec::new(), arrival_seq: chunk.arrival_seq };
        let produced = self.encoder.get_mut().split_off(0);
        if !produced.is_empty() {
            out_chunk.buffers.push(produced);
        }

        let mut out = Vec::new();
        if !out_chunk.is_empty() {
            out.push((self.next_step, Chunk::Output(out_chunk)));
        }

        if eof {
            let encoder = std::mem::replace(&mut self.encoder, GzEncoder::new(Vec::new(), GzCompression::default()));
            let finished = encoder.finish().map_err(|e| ReadCleanError::Gzip { message: e.to_string(), path: None })?;
            let mut final_chunk = OutputChunk::eof();
            if !finished.is_empty() {
                final_chunk.buffers.push(finished);
            }
            out.push((self.next_step, Chunk::Output(final_chunk)));
        }

        Ok(out)
    }
}

pub struct Bzip2CompressStep {
    next_step: usize,
    encoder:   BzEncoder<Vec<u8>>,
}

impl Bzip2CompressStep {
    pub fn new(next_step: usize) -> Self {
        Bzip2CompressStep { next_step, encoder: BzEncoder::new(Vec::new(), Bzip2Compression::default()) }
    }
}

impl OrderedStep for Bzip2CompressStep {
    fn name(&self) -> &'static str {
        "bzip2"
    }

    fn process(&mut self, chunk: Chunk) -> Result<Vec<(usize, Chunk)>> {
        let chunk = chunk.into_output()?;
        let eof = chunk.eof;

        if !chunk.reads.is_empty() {
            self.encoder
                .write_all(&chunk.reads)
                .map_err(|e| ReadCleanError::Bzip2 { message: e.to_string(), path: None })?;
        }

        let mut out_chunk = OutputChunk { eof: false, count: chunk.count, reads: Vec::new(), buffers: Vec::new(), arrival_seq: chunk.arrival_seq };
        let produced = self.encoder.get_mut().split_off(0);
        if !produced.is_empty() {
            out_chunk.buffers.push(produced);
        }

        let mut out = Vec::new();
        if !out_chunk.is_empty() {
            out.push((self.next_step, Chunk::Output(out_chunk)));
        }

        if eof {
            let encoder = std::mem::replace(&mut self.encoder, BzEncoder::new(Vec::new(), Bzip2Compression::default()));
            let finished = encoder.finish().map_err(|e| ReadCleanError::Bzip2 { message: e.to_string(), path: None })?;
            let mut final_chunk = OutputChunk::eof();
            if !finished.is_empty() {
                final_chunk.buffers.push(finished);
            }
            out.push((self.next_step, Chunk::Output(final_chunk)));
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn input_chunk(reads: &[u8], eof: bool) -> Chunk {
        Chunk::Output(OutputChunk { eof, count: 1, reads: reads.to_vec(), buffers: Vec::new(), arrival_seq: 0 })
    }

    #[test]
    fn gzip_round_trips_through_flate2() {
        let mut step = GzipCompressStep::new(9);
        let mut compressed = Vec::new();
        for (chunk, done) in [(input_chunk(b"@r1\nACGT\n+\nIIII\n", false), false), (input_chunk(b"", true), true)] {
            for (_, chunk) in step.process(chunk).unwrap() {
                if let Chunk::Output(c) = chunk {
                    compressed.extend(c.buffers.into_iter().flatten());
                }
            }
            let _ = done;
        }
        assert!(!compressed.is_empty());

        let mut decoded = Vec::new();
        flate2::read::MultiGzDecoder::new(compressed.as_slice()).read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, b"@r1\nACGT\n+\nIIII\n");
    }

    #[test]
    fn bzip2_round_trips_through_bzip2_crate() {
        let mut step = Bzip2CompressStep::new(9);
        let mut compressed = Vec::new();
        for chunk in [input_chunk(b"@r1\nACGT\n+\nIIII\n", false), input_chunk(b"", true)] {
            for (_, chunk) in step.process(chunk).unwrap() {
                if let Chunk::Output(c) = chunk {
                    compressed.extend(c.buffers.into_iter().flatten());
                }
            }
        }
        assert!(!compressed.is_empty());

        let mut decoded = Vec::new();
        bzip2::read::BzDecoder::new(compressed.as_slice()).read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, b"@r1\nACGT\n+\nIIII\n");
    }
}
