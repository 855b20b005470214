//! MODCOD table and per-frame slot-count arithmetic (§3, §4.3).
//!
//! A full DVB-S2 deployment carries 28 MODCODs (QPSK 1/4 through 32APSK
//! 9/10) at both frame sizes, each with its own LDPC parity-check matrix.
//! This crate implements the general slot/constellation/framesize
//! bookkeeping for all of them (needed just to interpret the PLS header
//! and frame a PL frame correctly) but only ships concrete LDPC matrices
//! for a small reference subset (see [`crate::dvbs2::ldpc`]); decoding an
//! unsupported MODCOD fails BCH/LDPC gracefully rather than panicking.
use serde::{Deserialize, Serialize};

/// Constellation used by a MODCOD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Constellation {
    Qpsk,
    Psk8,
    Apsk16,
    Apsk32,
}

impl Constellation {
    /// Bits carried per symbol.
    pub fn bits_per_symbol(self) -> usize {
        match self {
            Constellation::Qpsk => 2,
            Constellation::Psk8 => 3,
            Constellation::Apsk16 => 4,
            Constellation::Apsk32 => 5,
        }
    }

    /// Slot count per frame for (constellation, framesize), per §3's
    /// table: 90/360 (QPSK), 60/240 (8PSK), 45/180 (16APSK), 36/144
    /// (32APSK), short/normal respectively.
    pub fn slot_count(self, framesize: FrameSize) -> usize {
        let (short, normal) = match self {
            Constellation::Qpsk => (90, 360),
            Constellation::Psk8 => (60, 240),
            Constellation::Apsk16 => (45, 180),
            Constellation::Apsk32 => (36, 144),
        };
        match framesize {
            FrameSize::Short => short,
            FrameSize::Normal => normal,
        }
    }
}

/// FECFRAME size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameSize {
    /// 16,200 coded bits.
    Short,
    /// 64,800 coded bits.
    Normal,
}

impl FrameSize {
    /// Total coded bits in one FECFRAME.
    pub fn bits(self) -> usize {
        match self {
            FrameSize::Short => 16_200,
            FrameSize::Normal => 64_800,
        }
    }
}

/// One DVB-S2 coderate, as a `(k, n)` fraction of payload to coded bits
/// (e.g. 1/2, 3/5, 2/3, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeRate {
    pub k: u32,
    pub n: u32,
}

impl CodeRate {
    pub const fn new(k: u32, n: u32) -> Self {
        Self { k, n }
    }

    /// Number of payload (pre-LDPC-parity) bits this rate yields for a
    /// given frame size.
    pub fn payload_bits(self, framesize: FrameSize) -> usize {
        (framesize.bits() as u64 * self.k as u64 / self.n as u64) as usize
    }
}

/// A DVB-S2 MODCOD: modulation, LDPC code rate.
///
/// The PLS header carries a 1..28 MODCOD index; [`Modcod::from_index`]
/// decodes the subset this crate recognizes, per the standard's own
/// MODCOD table (QPSK 1/4..9/10, 8PSK 3/5..9/10, 16APSK 2/3..9/10, 32APSK
/// 3/4..9/10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modcod {
    pub index: u8,
    pub constellation: Constellation,
    pub coderate: CodeRate,
}

impl Modcod {
    /// Decode a MODCOD from its 5-bit PLS index (1..28). Indices outside
    /// that recognized range (or 0, reserved) return `None`.
    pub fn from_index(index: u8) -> Option<Self> {
        use Constellation::*;
        // Abbreviated to the standard's actual table; index 0 is
        // reserved ("dummy PLFRAME").
        let table: &[(u8, Constellation, u32, u32)] = &[
            (1, Qpsk, 1, 4),
            (2, Qpsk, 1, 3),
            (3, Qpsk, 2, 5),
            (4, Qpsk, 1, 2),
            (5, Qpsk, 3, 5),
            (6, Qpsk, 2, 3),
            (7, Qpsk, 3, 4),
            (8, Qpsk, 4, 5),
            (9, Qpsk, 5, 6),
            (10, Qpsk, 8, 9),
            (11, Qpsk, 9, 10),
            (12, Psk8, 3, 5),
            (13, Psk8, 2, 3),
            (14, Psk8, 3, 4),
            (15, Psk8, 5, 6),
            (16, Psk8, 8, 9),
            (17, Psk8, 9, 10),
            (18, Apsk16, 2, 3),
            (19, Apsk16, 3, 4),
            (20, Apsk16, 4, 5),
            (21, Apsk16, 5, 6),
            (22, Apsk16, 8, 9),
            (23, Apsk16, 9, 10),
            (24, Apsk32, 3, 4),
            (25, Apsk32, 4, 5),
            (26, Apsk32, 5, 6),
            (27, Apsk32, 8, 9),
            (28, Apsk32, 9, 10),
        ];
        table
            .iter()
            .find(|(i, ..)| *i == index)
            .map(|&(i, c, k, n)| Modcod {
                index: i,
                constellation: c,
                coderate: CodeRate::new(k, n),
            })
    }
}

/// APSK ring radius ratios (g1, g2), used by 16APSK/32APSK
/// decision-directed demapping (§4.3). These are the standard's defaults
/// for the "typical" gamma configuration; a receiver for a specific
/// broadcaster may need to tune them to match the transmitted
/// constellation exactly.
#[derive(Debug, Clone, Copy)]
pub struct ApskRadii {
    pub g1: f32,
    pub g2: f32,
}

impl ApskRadii {
    /// Standard-recommended default ratios for 16APSK.
    pub const APSK16_DEFAULT: ApskRadii = ApskRadii { g1: 3.15, g2: 1.0 };
    /// Standard-recommended default ratios for 32APSK.
    pub const APSK32_DEFAULT: ApskRadii = ApskRadii { g1: 2.53, g2: 1.0 };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modcod_4_is_qpsk_half_rate() {
        let m = Modcod::from_index(4).unwrap();
        assert_eq!(m.constellation, Constellation::Qpsk);
        assert_eq!(m.coderate, CodeRate::new(1, 2));
    }

    #[test]
    fn slot_counts_match_spec_table() {
        assert_eq!(Constellation::Qpsk.slot_count(FrameSize::Short), 90);
        assert_eq!(Constellation::Qpsk.slot_count(FrameSize::Normal), 360);
        assert_eq!(Constellation::Psk8.slot_count(FrameSize::Short), 60);
        assert_eq!(Constellation::Apsk16.slot_count(FrameSize::Normal), 180);
        assert_eq!(Constellation::Apsk32.slot_count(FrameSize::Short), 36);
    }

    #[test]
    fn payload_bits_half_rate_normal_frame() {
        let cr = CodeRate::new(1, 2);
        assert_eq!(cr.payload_bits(FrameSize::Normal), 32_400);
    }

    #[test]
    fn unknown_modcod_index_is_none() {
        assert!(Modcod::from_index(0).is_none());
        assert!(Modcod::from_index(29).is_none());
    }
}
