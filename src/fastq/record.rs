use crate::error::{ReadCleanError, Result};
use crate::io::linereader::LineSource;
use crate::quality::QualityEncoding;

/// Which mate a record belongs to, per its header's trailing `<sep><digit>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MateSide {
    Mate1,
    Mate2,
    Unindexed,
}

/// The canonical mate separator written on output (`/1`, `/2`).
pub const CANONICAL_MATE_SEPARATOR: u8 = b'/';

/// A parsed FASTQ record. Qualities are always stored as Phred+33 bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastqRecord {
    pub header:    String,
    pub sequence:  Vec<u8>,
    pub qualities: Vec<u8>,
}

impl FastqRecord {
    /// Reads one record from `reader`. Returns `Ok(None)` at a clean EOF
    /// (no bytes read before the header line), `Err` on any other
    /// malformed input, per §4.2.
    pub fn read(reader: &mut impl LineSource, encoding: QualityEncoding) -> Result<Option<Self>> {
        let mut line = String::new();

        // 1. Skip leading blank lines.
        loop {
            line.clear();
            if !reader.read_line(&mut line)? {
                return Ok(None);
            }
            if !line.is_empty() {
                break;
            }
        }

        // 2. Header.
        if !line.starts_with('@') {
            return Err(ReadCleanError::fastq_at(
                "FASTQ header must start with '@'",
                reader.path(),
                reader.line_number(),
            ));
        }
        let header = line[1..].to_string();

        // 3. Sequence.
        line.clear();
        if !reader.read_line(&mut line)? {
            return Err(ReadCleanError::fastq_at(
                "unexpected end of file reading FASTQ sequence",
                reader.path(),
                reader.line_number(),
            ));
        }
        if line.is_empty() {
            return Err(ReadCleanError::fastq_at(
                "FASTQ sequence line must not be empty",
                reader.path(),
                reader.line_number(),
            ));
        }
        let mut sequence = line.clone().into_bytes();

        // 4. Separator.
        line.clear();
        if !reader.read_line(&mut line)? || !line.starts_with('+') {
            return Err(ReadCleanError::fastq_at(
                "FASTQ separator line must start with '+'",
                reader.path(),
                reader.line_number(),
            ));
        }

        // 5. Qualities.
        line.clear();
        if !reader.read_line(&mut line)? {
            return Err(ReadCleanError::fastq_at(
                "unexpected end of file reading FASTQ qualities",
                reader.path(),
                reader.line_number(),
            ));
        }
        if line.len() != sequence.len() {
            return Err(ReadCleanError::fastq_at(
                format!(
                    "quality length {} does not match sequence length {}",
                    line.len(),
                    sequence.len()
                ),
                reader.path(),
                reader.line_number(),
            ));
        }

        clean_sequence(&mut sequence)?;

        let mut qualities = line.into_bytes();
        for byte in &mut qualities {
            *byte = encoding.decode(*byte)?;
        }

        Ok(Some(FastqRecord { header, sequence, qualities }))
    }

    /// `OutputChunk::add`'s per-record encoding, per §4.5: the bytes are
    /// `"@header\nsequence\n+\nencoded_qualities\n"`.
    pub fn encode_into(&self, encoding: QualityEncoding, out: &mut Vec<u8>) -> Result<()> {
        out.push(b'@');
        out.extend_from_slice(self.header.as_bytes());
        out.push(b'\n');
        out.extend_from_slice(&self.sequence);
        out.extend_from_slice(b"\n+\n");
        for &byte in &self.qualities {
            out.push(encoding.encode(byte)?);
        }
        out.push(b'\n');
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// §4.2 `trim_trailing_bases`. Returns `(left_trimmed, right_trimmed)`.
    pub fn trim_trailing_bases(&mut self, trim_ns: bool, threshold: u8, preserve5p: bool) -> (usize, usize) {
        let n = self.len();
        let floor = threshold + 33;

        let is_quality_base = |i: usize, seq: &[u8], qual: &[u8]| -> bool {
            qual[i] > floor && (!trim_ns || seq[i] != b'N')
        };

        let mut r = n;
        while r > 0 && !is_quality_base(r - 1, &self.sequence, &self.qualities) {
            r -= 1;
        }

        let l = if preserve5p {
            0
        } else {
            let mut l = 0;
            while l < r && !is_quality_base(l, &self.sequence, &self.qualities) {
                l += 1;
            }
            l
        };

        self.truncate_to(l, r);
        (l, n - r)
    }

    /// §4.2 `trim_windowed_bases`.
    pub fn trim_windowed_bases(&mut self, trim_ns: bool, threshold: u8, window_size: f64, preserve5p: bool) -> (usize, usize) {
        let n = self.len();
        if n == 0 {
            return (0, 0);
        }

        let w = if window_size >= 1.0 {
            window_size.floor() as usize
        } else {
            (window_size * n as f64).floor() as usize
        }
        .clamp(1, n);

        let floor = f64::from(threshold + 33);
        let is_quality_base =
            |i: usize, seq: &[u8], qual: &[u8]| -> bool { f64::from(qual[i]) > floor && (!trim_ns || seq[i] != b'N') };

        let mut running_sum: f64 = self.qualities[..w].iter().map(|&q| f64::from(q)).sum();
        let mut left: Option<usize> = None;
        let mut right = n - w;

        for start in 0..=(n - w) {
            if start > 0 {
                running_sum -= f64::from(self.qualities[start - 1]);
                running_sum += f64::from(self.qualities[start + w - 1]);
            }
            let avg = running_sum / w as f64;

            if left.is_none() {
                if is_quality_base(start, &self.sequence, &self.qualities) && avg > floor {
                    left = Some(start);
                }
            } else if avg <= floor {
                right = start;
                break;
            }
        }

        let Some(mut l) = left else {
            // No acceptable window found: fully trim.
            self.truncate_to(0, 0);
            return (0, n);
        };

        let mut r = right;
        while r < n && is_quality_base(r, &self.sequence, &self.qualities) {
            r += 1;
        }

        if preserve5p {
            l = 0;
        }

        self.truncate_to(l, r);
        (l, n - r)
    }

    fn truncate_to(&mut self, l: usize, r: usize) {
        if l >= r {
            self.sequence.clear();
            self.qualities.clear();
            return;
        }
        self.sequence = self.sequence[l..r].to_vec();
        self.qualities = self.qualities[l..r].to_vec();
    }

    /// §4.2 `reverse_complement`: reverses both strings, then complements
    /// bases via their low 4 bits so that `A<->T, C<->G, N<->N`.
    pub fn reverse_complement(&mut self) {
        self.sequence.reverse();
        self.qualities.reverse();
        for base in &mut self.sequence {
            *base = complement_base(*base);
        }
    }

    /// Returns the mate indicator found in the header before the first
    /// space/tab, normalizing the separator in place to `/` if present.
    /// Absence of an indicator is not an error (`MateSide::Unindexed`).
    pub fn fix_mate_info(&mut self, separator: u8) -> MateSide {
        let name_end = self.header.find([' ', '\t']).unwrap_or(self.header.len());
        let bytes = self.header.as_bytes();

        if name_end >= 2 {
            let sep_idx = name_end - 2;
            let sep = bytes[sep_idx];
            let digit = bytes[name_end - 1];
            if sep == separator || sep == CANONICAL_MATE_SEPARATOR {
                match digit {
                    b'1' => {
                        self.normalize_separator(sep_idx);
                        return MateSide::Mate1;
                    }
                    b'2' => {
                        self.normalize_separator(sep_idx);
                        return MateSide::Mate2;
                    }
                    _ => {}
                }
            }
        }
        MateSide::Unindexed
    }

    fn normalize_separator(&mut self, sep_idx: usize) {
        // SAFETY: both the existing separator and `/` are single ASCII bytes,
        // so the byte-level replacement preserves UTF-8 validity.
        unsafe {
            self.header.as_bytes_mut()[sep_idx] = CANONICAL_MATE_SEPARATOR;
        }
    }

    /// The name portion of the header, up to the first space/tab, with any
    /// trailing `<sep><digit>` mate indicator removed. `side` selects
    /// whether the indicator is actually present to strip.
    pub fn base_name(&self, side: MateSide) -> &str {
        let end = self.header.find([' ', '\t']).unwrap_or(self.header.len());
        let end = match side {
            MateSide::Unindexed => end,
            MateSide::Mate1 | MateSide::Mate2 => end.saturating_sub(2),
        };
        &self.header[..end]
    }
}

/// The low-4-bits reverse-complement lookup table from the reference
/// implementation, indexed by `base & 0xf`.
const COMPLEMENT_TABLE: [u8; 16] = *b"-T-GA--C------N-";

fn complement_base(base: u8) -> u8 {
    COMPLEMENT_TABLE[(base & 0xf) as usize]
}

/// Uppercases `{a,c,g,t,n}` in place; any other byte is a `FastqError`.
pub fn clean_sequence(sequence: &mut [u8]) -> Result<()> {
    for base in sequence.iter_mut() {
        *base = match base.to_ascii_uppercase() {
            b'A' | b'C' | b'G' | b'T' | b'N' => base.to_ascii_uppercase(),
            _ => {
                return Err(ReadCleanError::fastq(
                    "invalid character in FASTQ sequence; only A, C, G, T and N are expected!",
                ));
            }
        };
    }
    Ok(())
}

/// §4.2 `validate_paired_reads`: strips/normalizes mate indicators on both
/// mates and requires equal names and consistent (or absent) numbering.
pub fn validate_paired_reads(mate1: &mut FastqRecord, mate2: &mut FastqRecord, separator: u8) -> Result<()> {
    if mate1.is_empty() || mate2.is_empty() {
        return Err(ReadCleanError::fastq("Pair contains empty reads"));
    }

    let side1 = mate1.fix_mate_info(separator);
    let side2 = mate2.fix_mate_info(separator);

    if mate1.base_name(side1) != mate2.base_name(side2) {
        return Err(ReadCleanError::fastq("Pair contains reads with mismatching names"));
    }

    match (side1, side2) {
        (MateSide::Unindexed, MateSide::Unindexed) => Ok(()),
        (MateSide::Mate1, MateSide::Mate2) => Ok(()),
        _ => Err(ReadCleanError::fastq(
            "Pair contains reads with inconsistent mate numbering",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::linereader::StringLineSource;

    fn parse(bytes: &str) -> FastqRecord {
        let mut src = StringLineSource::new(bytes);
        FastqRecord::read(&mut src, QualityEncoding::Phred33).unwrap().unwrap()
    }

    #[test]
    fn round_trip_simple_record() {
        let record = parse("@r1\nACGT\n+\n!!!!\n");
        let mut bytes = Vec::new();
        record.encode_into(QualityEncoding::Phred33, &mut bytes).unwrap();
        assert_eq!(bytes, b"@r1\nACGT\n+\n!!!!\n");
    }

    #[test]
    fn rejects_invalid_base() {
        let mut src = StringLineSource::new("@r\nACBT\n+\n!!!!\n");
        let err = FastqRecord::read(&mut src, QualityEncoding::Phred33).unwrap_err();
        assert!(err.to_string().contains("invalid character in FASTQ sequence"));
    }

    #[test]
    fn eof_before_header_is_clean() {
        let mut src = StringLineSource::new("");
        assert!(FastqRecord::read(&mut src, QualityEncoding::Phred33).unwrap().is_none());
    }

    #[test]
    fn trailing_trim_matches_scenario_2() {
        let mut record = parse("@r\nACGTNN\n+\nIIIIAA\n");
        let (left, right) = record.trim_trailing_bases(true, b'H' - 33, false);
        assert_eq!((left, right), (0, 2));
        assert_eq!(record.sequence, b"ACGT");
        assert_eq!(record.qualities, b"IIII");
    }

    #[test]
    fn trim_monotonicity_no_trim_when_all_pass() {
        let mut record = parse("@r\nACGT\n+\n!!!!\n");
        let before = record.len();
        record.trim_trailing_bases(false, 0, false);
        assert_eq!(record.len(), before);
    }

    #[test]
    fn reverse_complement_is_involution() {
        let mut record = parse("@r\nACGTN\n+\n!!!!!\n");
        let original = record.clone();
        record.reverse_complement();
        record.reverse_complement();
        assert_eq!(record, original);
    }

    #[test]
    fn reverse_complement_complements_bases() {
        let mut record = parse("@r\nACGTN\n+\n!!!!!\n");
        record.reverse_complement();
        assert_eq!(record.sequence, b"NACGT");
    }

    #[test]
    fn mate_validation_accepts_matching_indicators() {
        let mut r1 = parse("@x/1\nACGT\n+\n!!!!\n");
        let mut r2 = parse("@x/2\nACGT\n+\n!!!!\n");
        assert!(validate_paired_reads(&mut r1, &mut r2, b'/').is_ok());
    }

    #[test]
    fn mate_validation_rejects_name_mismatch() {
        let mut r1 = parse("@x/1\nACGT\n+\n!!!!\n");
        let mut r2 = parse("@y/2\nACGT\n+\n!!!!\n");
        let err = validate_paired_reads(&mut r1, &mut r2, b'/').unwrap_err();
        assert!(err.to_string().contains("mismatching names"));
    }

    #[test]
    fn mate_validation_accepts_unindexed_pairs() {
        let mut r1 = parse("@x\nACGT\n+\n!!!!\n");
        let mut r2 = parse("@x\nACGT\n+\n!!!!\n");
        assert!(validate_paired_reads(&mut r1, &mut r2, b'/').is_ok());
    }
}
