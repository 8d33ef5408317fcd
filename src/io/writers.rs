//! Output sinks (part of C8): lazily opened writers with raw / gzip / bzip2
//! framing chosen by configuration, not by path.

use crate::error::{Result, WithPath};
use crate::utils::whichever::define_whichever;
use bzip2::Compression as Bzip2Compression;
use bzip2::write::BzEncoder;
use flate2::Compression as GzCompression;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

define_whichever! {
    #[doc = "The framing chosen for one output slot."]
    pub enum SinkWriter {
        Raw(BufWriter<File>),
        Gzip(GzEncoder<BufWriter<File>>),
        Bzip2(BzEncoder<BufWriter<File>>),
    }

    impl Write for SinkWriter {}
}

/// The compression requested for pipeline output, chosen by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputCompression {
    #[default]
    None,
    Gzip,
    Bzip2,
}

/// Lazily opens `path` (creating parent directories) on first use, so an
/// output slot that never receives a chunk never creates a file.
pub struct LazySink {
    path:        PathBuf,
    compression: OutputCompression,
    inner:       Option<SinkWriter>,
}

impl LazySink {
    pub fn new(path: PathBuf, compression: OutputCompression) -> Self {
        LazySink { path, compression, inner: None }
    }

    fn open(&mut self) -> Result<&mut SinkWriter> {
        if self.inner.is_none() {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent).with_path(parent)?;
            }
            let file = File::create(&self.path).with_path(&self.path)?;
            let buffered = BufWriter::new(file);
            let writer = match self.compression {
                OutputCompression::None => SinkWriter::Raw(buffered),
                OutputCompression::Gzip => SinkWriter::Gzip(GzEncoder::new(buffered, GzCompression::default())),
                OutputCompression::Bzip2 => SinkWriter::Bzip2(BzEncoder::new(buffered, Bzip2Compression::default())),
            };
            self.inner = Some(writer);
        }
        Ok(self.inner.as_mut().expect("just initialized"))
    }

    /// Writes a block of already-framed bytes (raw FASTQ, or a
    /// compressor's output buffers concatenated by the caller).
    pub fn write_block(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.open()?.write_all(bytes).with_path(&self.path)
    }

    /// Flushes and drops the inner writer. A sink that never opened does
    /// nothing, matching §4.7's "no chunk ever received -> no file".
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.inner.take() {
            writer.flush().with_path(&self.path)?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LazySink {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
