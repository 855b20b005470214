//! Core DSP/FEC/CCSDS pipeline for turning satellite I/Q baseband capture
//! into validated transport frames (§1-§6 of the design this crate
//! implements).
//!
//! The crate is organized the way the dataflow graph it runs is organized:
//! [`stream`]/[`block`] are the plumbing every block is built from;
//! [`blocks`] holds general DSP primitives (AGC, FIR/RRC, resampling,
//! clock recovery, ...); [`dvbs2`] is the physical-layer receiver chain;
//! [`ccsds`] is the CADU deframer; [`pipeline`] is the declarative
//! orchestrator that wires blocks (or whole file-oriented modules) together
//! from a JSON description; [`graph`] is the thread-per-block scheduler
//! that runs them.
pub mod block;
pub mod blocks;
pub mod ccsds;
pub mod circular_buffer;
pub mod dvbs2;
pub mod error;
pub mod graph;
pub mod pipeline;
pub mod stream;

pub use error::{Error, Result};

use num_complex::Complex;

/// The floating-point type used throughout the signal chain.
pub type Float = f32;

/// A complex sample, real and imaginary parts both [`Float`].
pub type Complex32 = Complex<Float>;

/// Raw sample formats a baseband capture file may be stored in (§6).
///
/// `file_source`/`file_sink` convert between these on-disk byte encodings
/// and the in-memory `Complex32` stream every DSP block operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BasebandFormat {
    /// 8-bit signed I/Q, interleaved.
    Cs8,
    /// 16-bit signed I/Q, interleaved, little-endian.
    Cs16,
    /// 32-bit float I/Q, interleaved, little-endian (native `Complex32`).
    Cf32,
    /// 8-bit unsigned I/Q, interleaved (common RTL-SDR on-air format,
    /// offset-binary around 127).
    Wav8,
}

impl BasebandFormat {
    /// Bytes on disk per complex sample.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            BasebandFormat::Cs8 | BasebandFormat::Wav8 => 2,
            BasebandFormat::Cs16 => 4,
            BasebandFormat::Cf32 => 8,
        }
    }

    /// Decode one complex sample from its on-disk byte representation.
    pub fn decode(self, bytes: &[u8]) -> Complex32 {
        match self {
            BasebandFormat::Cs8 => {
                Complex32::new(bytes[0] as i8 as Float / 128.0, bytes[1] as i8 as Float / 128.0)
            }
            BasebandFormat::Wav8 => Complex32::new(
                (bytes[0] as Float - 127.5) / 127.5,
                (bytes[1] as Float - 127.5) / 127.5,
            ),
            BasebandFormat::Cs16 => {
                let i = i16::from_le_bytes([bytes[0], bytes[1]]);
                let q = i16::from_le_bytes([bytes[2], bytes[3]]);
                Complex32::new(i as Float / 32768.0, q as Float / 32768.0)
            }
            BasebandFormat::Cf32 => {
                let i = Float::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                let q = Float::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
                Complex32::new(i, q)
            }
        }
    }

    /// Encode one complex sample into its on-disk byte representation.
    pub fn encode(self, s: Complex32, out: &mut Vec<u8>) {
        match self {
            BasebandFormat::Cs8 => {
                out.push((s.re.clamp(-1.0, 1.0) * 127.0) as i8 as u8);
                out.push((s.im.clamp(-1.0, 1.0) * 127.0) as i8 as u8);
            }
            BasebandFormat::Wav8 => {
                out.push((s.re.clamp(-1.0, 1.0) * 127.5 + 127.5) as u8);
                out.push((s.im.clamp(-1.0, 1.0) * 127.5 + 127.5) as u8);
            }
            BasebandFormat::Cs16 => {
                out.extend_from_slice(&((s.re.clamp(-1.0, 1.0) * 32767.0) as i16).to_le_bytes());
                out.extend_from_slice(&((s.im.clamp(-1.0, 1.0) * 32767.0) as i16).to_le_bytes());
            }
            BasebandFormat::Cf32 => {
                out.extend_from_slice(&s.re.to_le_bytes());
                out.extend_from_slice(&s.im.to_le_bytes());
            }
        }
    }
}

/// Test-only helpers shared by this crate's unit tests.
#[cfg(test)]
pub(crate) mod testutil {
    use super::Float;

    pub fn assert_almost_eq(a: Float, b: Float, eps: Float) {
        assert!(
            (a - b).abs() <= eps,
            "expected {a} ~= {b} (eps {eps}), diff {}",
            (a - b).abs()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cs8_roundtrip_within_quantization() {
        let s = Complex32::new(0.5, -0.25);
        let mut bytes = Vec::new();
        BasebandFormat::Cs8.encode(s, &mut bytes);
        let back = BasebandFormat::Cs8.decode(&bytes);
        testutil::assert_almost_eq(back.re, s.re, 1.0 / 127.0);
        testutil::assert_almost_eq(back.im, s.im, 1.0 / 127.0);
    }

    #[test]
    fn cf32_roundtrip_exact() {
        let s = Complex32::new(0.123_456, -0.987_654);
        let mut bytes = Vec::new();
        BasebandFormat::Cf32.encode(s, &mut bytes);
        assert_eq!(bytes.len(), 8);
        let back = BasebandFormat::Cf32.decode(&bytes);
        assert_eq!(back, s);
    }
}
