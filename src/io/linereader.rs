//! The line reader (C1): transparently decodes raw / gzip / bzip2 input and
//! yields logical lines, with multiple files joined into a single stream.

use crate::error::{ReadCleanError, Result, WithPath};
use bzip2::read::BzDecoder;
use flate2::bufread::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
const BZIP2_MAGIC: [u8; 3] = [0x42, 0x5A, 0x68];

/// Anything that can hand back logical lines one at a time and report its
/// current file/line for diagnostics. Implemented by [`LineReader`],
/// [`JoinedLineReader`], and a test-only in-memory source.
pub trait LineSource {
    /// Appends the next line (without its trailing `\n`/`\r\n`) to `dst`.
    /// Returns `Ok(false)` at a clean end of stream.
    fn read_line(&mut self, dst: &mut String) -> Result<bool>;

    /// The path currently being read, if any (for diagnostics).
    fn path(&self) -> Option<&Path> {
        None
    }

    /// The 1-based line number of the last line returned, if tracked.
    fn line_number(&self) -> Option<usize> {
        None
    }
}

crate::utils::whichever::define_whichever! {
    #[doc = "The transparently-decoding byte source behind a `LineReader`."]
    enum Decoder {
        Raw(BufReader<File>),
        Gzip(MultiGzDecoder<BufReader<File>>),
        Bzip2(BzDecoder<BufReader<File>>),
    }

    impl Read for Decoder {}
}

/// Reads logical lines from a single path, auto-detecting gzip/bzip2 by
/// magic bytes and falling back to raw bytes otherwise.
pub struct LineReader {
    path:        PathBuf,
    inner:       BufReader<Decoder>,
    line_number: usize,
    at_eof:      bool,
}

impl LineReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).with_path(&path)?;
        let mut buf = BufReader::new(file);

        let prefix = buf.fill_buf().with_path(&path)?;
        let decoder = if prefix.starts_with(&GZIP_MAGIC) {
            Decoder::Gzip(MultiGzDecoder::new(buf))
        } else if prefix.starts_with(&BZIP2_MAGIC) {
            Decoder::Bzip2(BzDecoder::new(buf))
        } else {
            Decoder::Raw(buf)
        };

        Ok(LineReader {
            path,
            inner: BufReader::new(decoder),
            line_number: 0,
            at_eof: false,
        })
    }

    fn map_decode_error(&self, source: std::io::Error) -> ReadCleanError {
        // `flate2`/`bzip2` surface decode failures as `std::io::Error`s of
        // kind `InvalidData`; distinguish them from plain OS I/O failures so
        // callers get `GzipError`/`Bzip2Error` rather than `IoError`.
        if source.kind() == std::io::ErrorKind::InvalidData {
            ReadCleanError::Gzip {
                message: source.to_string(),
                path:    Some(self.path.clone()),
            }
        } else {
            ReadCleanError::Io {
                source,
                path: Some(self.path.clone()),
            }
        }
    }
}

impl LineSource for LineReader {
    fn read_line(&mut self, dst: &mut String) -> Result<bool> {
        if self.at_eof {
            return Ok(false);
        }

        let mut raw = Vec::new();
        let bytes_read = self
            .inner
            .read_until(b'\n', &mut raw)
            .map_err(|e| self.map_decode_error(e))?;

        if bytes_read == 0 {
            self.at_eof = true;
            return Ok(false);
        }

        if raw.last() == Some(&b'\n') {
            raw.pop();
        }
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }

        let line = String::from_utf8(raw).map_err(|e| {
            ReadCleanError::fastq_at(format!("line is not valid UTF-8: {e}"), &self.path, self.line_number + 1)
        })?;
        dst.push_str(&line);
        self.line_number += 1;
        Ok(true)
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn line_number(&self) -> Option<usize> {
        Some(self.line_number)
    }
}

/// Concatenates a list of filenames as if they were a single logical
/// stream, tracking the currently-open path and its line number.
pub struct JoinedLineReader {
    paths:   std::vec::IntoIter<PathBuf>,
    current: Option<LineReader>,
}

impl JoinedLineReader {
    pub fn new<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut paths: std::vec::IntoIter<PathBuf> = paths.iter().map(|p| p.as_ref().to_path_buf()).collect::<Vec<_>>().into_iter();
        let current = match paths.next() {
            Some(first) => Some(LineReader::open(first)?),
            None => None,
        };
        Ok(JoinedLineReader { paths, current })
    }
}

impl LineSource for JoinedLineReader {
    fn read_line(&mut self, dst: &mut String) -> Result<bool> {
        loop {
            let Some(reader) = self.current.as_mut() else {
                return Ok(false);
            };

            if reader.read_line(dst)? {
                return Ok(true);
            }

            self.current = match self.paths.next() {
                Some(next) => Some(LineReader::open(next)?),
                None => None,
            };
        }
    }

    fn path(&self) -> Option<&Path> {
        self.current.as_ref().and_then(LineSource::path)
    }

    fn line_number(&self) -> Option<usize> {
        self.current.as_ref().and_then(LineSource::line_number)
    }
}

/// A test-only in-memory [`LineSource`] for fixture-driven unit tests.
#[cfg(test)]
pub struct StringLineSource {
    lines: std::vec::IntoIter<String>,
    n:     usize,
}

#[cfg(test)]
impl StringLineSource {
    pub fn new(text: &str) -> Self {
        StringLineSource {
            lines: text.lines().map(str::to_string).collect::<Vec<_>>().into_iter(),
            n:     0,
        }
    }
}

#[cfg(test)]
impl LineSource for StringLineSource {
    fn read_line(&mut self, dst: &mut String) -> Result<bool> {
        match self.lines.next() {
            Some(line) => {
                dst.push_str(&line);
                self.n += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn line_number(&self) -> Option<usize> {
        Some(self.n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn raw_file_round_trips_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "first\nsecond\r\nthird").unwrap();

        let mut reader = LineReader::open(file.path()).unwrap();
        let mut line = String::new();
        assert!(reader.read_line(&mut line).unwrap());
        assert_eq!(line, "first");

        line.clear();
        assert!(reader.read_line(&mut line).unwrap());
        assert_eq!(line, "second");

        line.clear();
        assert!(reader.read_line(&mut line).unwrap());
        assert_eq!(line, "third");

        line.clear();
        assert!(!reader.read_line(&mut line).unwrap());
    }

    #[test]
    fn joined_reader_concatenates_files() {
        let mut file_a = tempfile::NamedTempFile::new().unwrap();
        write!(file_a, "a1\na2").unwrap();
        let mut file_b = tempfile::NamedTempFile::new().unwrap();
        write!(file_b, "b1").unwrap();

        let mut reader = JoinedLineReader::new(&[file_a.path(), file_b.path()]).unwrap();
        let mut seen = Vec::new();
        let mut line = String::new();
        while reader.read_line(&mut line).unwrap() {
            seen.push(line.clone());
            line.clear();
        }
        assert_eq!(seen, vec!["a1", "a2", "b1"]);
    }

    #[test]
    fn detects_gzip_magic() {
        use std::io::Write as _;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        {
            let mut encoder = flate2::write::GzEncoder::new(&mut file, flate2::Compression::default());
            encoder.write_all(b"gzipped line\n").unwrap();
            encoder.finish().unwrap();
        }

        let mut reader = LineReader::open(file.path()).unwrap();
        let mut line = String::new();
        assert!(reader.read_line(&mut line).unwrap());
        assert_eq!(line, "gzipped line");
    }
}
