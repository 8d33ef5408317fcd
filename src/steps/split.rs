//! The splitter step (§4.7): buffers encoded bytes across incoming chunks
//! until a fixed block size accumulates, preserving byte order (hence
//! ordered).

use super::FASTQ_COMPRESSED_CHUNK;
use crate::chunk::{Chunk, OutputChunk};
use crate::error::Result;
use crate::scheduler::OrderedStep;

pub struct SplitStep {
    next_step: usize,
    buffer:    Vec<u8>,
    count:     usize,
}

impl SplitStep {
    pub fn new(next_step: usize) -> Self {
        SplitStep { next_step, buffer: Vec::with_capacity(FASTQ_COMPRESSED_CHUNK), count: 0 }
    }

    fn flush(&mut self) -> Option<(usize, Chunk)> {
        if self.buffer.is_empty() && self.count == 0 {
            return None;
        }
        let mut chunk = OutputChunk::default();
        chunk.reads = std::mem::take(&mut self.buffer);
        chunk.count = self.count;
        self.count = 0;
        Some((self.next_step, Chunk::Output(chunk)))
    }
}

impl OrderedStep for SplitStep {
    fn name(&self) -> &'static str {
        "split"
    }

    fn process(&mut self, chunk: Chunk) -> Result<Vec<(usize, Chunk)>> {
        let chunk = chunk.into_output()?;
        let eof = chunk.eof;

        self.buffer.extend_from_slice(&chunk.reads);
        self.count += chunk.count;

        let mut out = Vec::new();
        while self.buffer.len() >= FASTQ_COMPRESSED_CHUNK {
            let tail = self.buffer.split_off(FASTQ_COMPRESSED_CHUNK);
            let mut block = OutputChunk::default();
            block.reads = std::mem::replace(&mut self.buffer, tail);
            block.count = self.count;
            self.count = 0;
            out.push((self.next_step, Chunk::Output(block)));
        }

        if eof {
            if let Some(last) = self.flush() {
                out.push(last);
            }
            out.push((self.next_step, Chunk::Output(OutputChunk::eof())));
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes_chunk(reads: &[u8], count: usize) -> Chunk {
        Chunk::Output(OutputChunk { eof: false, count, reads: reads.to_vec(), buffers: Vec::new(), arrival_seq: 0 })
    }

    #[test]
    fn buffers_below_threshold_without_emitting() {
        let mut step = SplitStep::new(7);
        let out = step.process(bytes_chunk(b"short", 1)).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn flushes_a_block_once_threshold_is_crossed() {
        let mut step = SplitStep::new(7);
        let block = vec![b'A'; FASTQ_COMPRESSED_CHUNK + 10];
        let out = step.process(bytes_chunk(&block, 3)).unwrap();
        assert_eq!(out.len(), 1);
        let (next_step, chunk) = &out[0];
        assert_eq!(*next_step, 7);
        let chunk = match chunk {
            Chunk::Output(c) => c,
            _ => panic!("expected an OutputChunk"),
        };
        assert_eq!(chunk.reads.len(), FASTQ_COMPRESSED_CHUNK);
        assert_eq!(chunk.count, 3);
    }

    #[test]
    fn eof_flushes_remainder_then_forwards_eof() {
        let mut step = SplitStep::new(7);
        step.process(bytes_chunk(b"tail", 2)).unwrap();
        let out = step.process(Chunk::Output(OutputChunk::eof())).unwrap();
        assert_eq!(out.len(), 2);
        match &out[0].1 {
            Chunk::Output(c) => {
                assert_eq!(c.reads, b"tail");
                assert_eq!(c.count, 2);
                assert!(!c.eof);
            }
            _ => panic!("expected an OutputChunk"),
        }
        assert!(out[1].1.is_eof());
    }
}
