//! The writer step (§4.7): ordered, lazily opens its destination on first
//! chunk and writes either raw encoded bytes or already-compressed
//! buffers.

use crate::chunk::Chunk;
use crate::error::Result;
use crate::io::writers::LazySink;
use crate::scheduler::OrderedStep;

pub struct WriteStep {
    sink: LazySink,
}

impl WriteStep {
    pub fn new(sink: LazySink) -> Self {
        WriteStep { sink }
    }
}

impl OrderedStep for WriteStep {
    fn name(&self) -> &'static str {
        "write"
    }

    fn process(&mut self, chunk: Chunk) -> Result<Vec<(usize, Chunk)>> {
        let chunk = chunk.into_output()?;
        let eof = chunk.eof;

        if !chunk.reads.is_empty() {
            self.sink.write_block(&chunk.reads)?;
        }
        for buffer in &chunk.buffers {
            self.sink.write_block(buffer)?;
        }

        if eof {
            self.sink.close()?;
        }

        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::OutputChunk;
    use crate::io::writers::OutputCompression;

    #[test]
    fn writes_raw_bytes_and_precompressed_buffers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.fastq");
        let mut step = WriteStep::new(LazySink::new(path.clone(), OutputCompression::None));

        let chunk = Chunk::Output(OutputChunk {
            eof: false,
            count: 1,
            reads: b"@r1\nACGT\n+\nIIII\n".to_vec(),
            buffers: vec![b"@r2\nTTTT\n+\nIIII\n".to_vec()],
            arrival_seq: 0,
        });
        step.process(chunk).unwrap();
        step.process(Chunk::Output(OutputChunk::eof())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("@r1"));
        assert!(contents.contains("@r2"));
    }

    #[test]
    fn a_sink_that_never_receives_a_chunk_creates_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("untouched.fastq");
        let mut step = WriteStep::new(LazySink::new(path.clone(), OutputCompression::None));
        step.process(Chunk::Output(OutputChunk::eof())).unwrap();
        assert!(!path.exists());
    }
}
