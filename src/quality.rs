//! Quality encoding bijections (C3): ASCII quality bytes <-> internal Phred+33.

use crate::error::{ReadCleanError, Result};
use clap::ValueEnum;

/// The three quality encodings accepted on input; output is always Phred+33.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum QualityEncoding {
    Phred33,
    Phred64,
    Solexa,
}

impl QualityEncoding {
    /// Inclusive byte range this encoding accepts on input.
    pub const fn input_range(self) -> (u8, u8) {
        match self {
            QualityEncoding::Phred33 => (33, 104),
            QualityEncoding::Phred64 => (64, 104),
            QualityEncoding::Solexa => (59, 104),
        }
    }

    /// Decodes one input byte to an internal Phred+33 byte.
    pub fn decode(self, byte: u8) -> Result<u8> {
        let (lo, hi) = self.input_range();
        if byte < lo || byte > hi {
            return Err(ReadCleanError::fastq(format!(
                "quality byte {byte} outside the declared {self:?} range [{lo}, {hi}]"
            )));
        }

        Ok(match self {
            QualityEncoding::Phred33 => byte,
            QualityEncoding::Phred64 => byte - 31,
            QualityEncoding::Solexa => {
                let q_solexa = f64::from(byte) - 64.0;
                let q_phred = 10.0 * (1.0 + 10f64.powf(q_solexa / 10.0)).log10();
                33 + q_phred.round() as u8
            }
        })
    }

    /// Encodes an internal Phred+33 byte back to this encoding's alphabet.
    pub fn encode(self, byte: u8) -> Result<u8> {
        match self {
            QualityEncoding::Phred33 => Ok(byte),
            QualityEncoding::Phred64 => {
                let encoded = byte + 31;
                let (lo, hi) = self.input_range();
                if encoded < lo || encoded > hi {
                    return Err(ReadCleanError::internal(format!(
                        "phred+33 byte {byte} has no {self:?} representation"
                    )));
                }
                Ok(encoded)
            }
            QualityEncoding::Solexa => {
                let q_phred = f64::from(byte) - 33.0;
                let q_solexa = 10.0 * (10f64.powf(q_phred / 10.0) - 1.0).max(1e-10).log10();
                let encoded = (64.0 + q_solexa.round()).max(0.0) as u8;
                let (lo, hi) = self.input_range();
                Ok(encoded.clamp(lo, hi))
            }
        }
    }
}

impl Default for QualityEncoding {
    fn default() -> Self {
        QualityEncoding::Phred33
    }
}

/// Converts an error probability to a Phred+33 byte, per the reference
/// implementation's `p_to_phred_33`: floors the probability and caps the
/// resulting byte at `'~'`.
pub fn p_to_phred33(p: f64) -> u8 {
    let p = p.max(5e-10);
    let q = -10.0 * p.log10();
    (33 + q.round() as u32).min(126) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phred33_decode_is_identity_within_range() {
        for byte in 33..=104u8 {
            assert_eq!(QualityEncoding::Phred33.decode(byte).unwrap(), byte);
        }
    }

    #[test]
    fn phred33_rejects_out_of_range() {
        assert!(QualityEncoding::Phred33.decode(32).is_err());
        assert!(QualityEncoding::Phred33.decode(105).is_err());
    }

    #[test]
    fn phred64_round_trips() {
        for byte in 64..=104u8 {
            let decoded = QualityEncoding::Phred64.decode(byte).unwrap();
            let encoded = QualityEncoding::Phred64.encode(decoded).unwrap();
            assert_eq!(encoded, byte);
        }
    }

    #[test]
    fn solexa_round_trips_approximately() {
        for byte in 59..=104u8 {
            let decoded = QualityEncoding::Solexa.decode(byte).unwrap();
            let encoded = QualityEncoding::Solexa.encode(decoded).unwrap();
            // Solexa <-> Phred is a lossy log transform; require it to be
            // close, not bit-identical.
            assert!((i32::from(encoded) - i32::from(byte)).abs() <= 1);
        }
    }

    #[test]
    fn p_to_phred33_caps_at_tilde() {
        assert_eq!(p_to_phred33(0.0), b'~');
        assert_eq!(p_to_phred33(1.0), 33);
    }
}
