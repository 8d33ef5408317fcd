//! Typed payloads exchanged between pipeline steps (C5).

use crate::fastq::FastqRecord;
use crate::quality::QualityEncoding;

/// A batch of parsed records flowing out of the reader/demultiplexer.
#[derive(Debug, Default)]
pub struct ReadChunk {
    pub eof:          bool,
    pub reads_1:      Vec<FastqRecord>,
    pub reads_2:      Vec<FastqRecord>,
    /// The position of this chunk in its producer's emission order, carried
    /// across a `ParallelStep` hop so the reorder buffer downstream can key
    /// on true input order rather than parallel finish order.
    pub arrival_seq:  u64,
}

impl ReadChunk {
    pub fn eof() -> Self {
        ReadChunk { eof: true, ..Default::default() }
    }

    pub fn is_paired(&self) -> bool {
        !self.reads_2.is_empty()
    }
}

/// Encoded bytes in transit toward a writer, possibly already compressed.
#[derive(Debug, Default)]
pub struct OutputChunk {
    pub eof:         bool,
    pub count:       usize,
    pub reads:       Vec<u8>,
    pub buffers:     Vec<Vec<u8>>,
    /// See [`ReadChunk::arrival_seq`].
    pub arrival_seq: u64,
}

impl OutputChunk {
    pub fn eof() -> Self {
        OutputChunk { eof: true, ..Default::default() }
    }

    /// §4.5 `OutputChunk::add`: appends the record's encoded FASTQ bytes
    /// and increments `count` by `count` (which may exceed 1 for a merged
    /// read representing two source reads).
    pub fn add(&mut self, encoding: QualityEncoding, record: &FastqRecord, count: usize) -> crate::error::Result<()> {
        record.encode_into(encoding, &mut self.reads)?;
        self.count += count;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.reads.is_empty() && self.buffers.is_empty()
    }
}

/// The sum type a step actually exchanges with the scheduler (§9 "Polymorphic
/// chunks"): downcasting is a pattern match validated once at the
/// producer/consumer boundary. A mismatched variant is an internal error.
#[derive(Debug)]
pub enum Chunk {
    Read(ReadChunk),
    Output(OutputChunk),
}

impl Chunk {
    pub fn is_eof(&self) -> bool {
        match self {
            Chunk::Read(c) => c.eof,
            Chunk::Output(c) => c.eof,
        }
    }

    pub fn arrival_seq(&self) -> u64 {
        match self {
            Chunk::Read(c) => c.arrival_seq,
            Chunk::Output(c) => c.arrival_seq,
        }
    }

    pub fn set_arrival_seq(&mut self, seq: u64) {
        match self {
            Chunk::Read(c) => c.arrival_seq = seq,
            Chunk::Output(c) => c.arrival_seq = seq,
        }
    }

    pub fn into_read(self) -> crate::error::Result<ReadChunk> {
        match self {
            Chunk::Read(c) => Ok(c),
            Chunk::Output(_) => Err(crate::error::ReadCleanError::internal("expected a ReadChunk, got an OutputChunk")),
        }
    }

    pub fn into_output(self) -> crate::error::Result<OutputChunk> {
        match self {
            Chunk::Output(c) => Ok(c),
            Chunk::Read(_) => Err(crate::error::ReadCleanError::internal("expected an OutputChunk, got a ReadChunk")),
        }
    }
}

impl From<ReadChunk> for Chunk {
    fn from(c: ReadChunk) -> Self {
        Chunk::Read(c)
    }
}

impl From<OutputChunk> for Chunk {
    fn from(c: OutputChunk) -> Self {
        Chunk::Output(c)
    }
}
