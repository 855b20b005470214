//! Baseband-to-soft de-mapping and de-interleaving (§4.3).
//!
//! Converts PLL-corrected data symbols into 8-bit signed soft bits (sign
//! carries hard-bit polarity, per §3's data-model invariant: negative
//! means logical 1, non-negative means 0), then de-interleaves them for
//! constellations wider than QPSK. Constellation points and their bit
//! labels reuse [`crate::dvbs2::pll::constellation_points`]'s ordering, so
//! a point's index *is* its `bits_per_symbol`-bit label (MSB first) —
//! this is a simplified, self-consistent labelling (not the standard's
//! Gray-coded one), sufficient for this receiver's own round-trip tests;
//! see `DESIGN.md`.
use crate::dvbs2::pls::{Constellation, FrameSize};
use crate::dvbs2::pll::constellation_points;
use crate::Complex32;

/// Soft-bit de-mapper for one DVB-S2 constellation.
pub struct Demapper {
    constellation: Constellation,
    points: Vec<Complex32>,
    bits_per_symbol: usize,
}

impl Demapper {
    pub fn new(constellation: Constellation) -> Self {
        Self {
            constellation,
            points: constellation_points(constellation),
            bits_per_symbol: constellation.bits_per_symbol(),
        }
    }

    /// Soft-demap one corrected symbol into `bits_per_symbol` signed
    /// bytes. Magnitude is a confidence measure (distance between the
    /// nearest same point clusters for bit=0 vs bit=1); sign is the hard
    /// decision.
    pub fn demap_symbol(&self, s: Complex32) -> Vec<i8> {
        let mut out = Vec::with_capacity(self.bits_per_symbol);
        for bit_pos in 0..self.bits_per_symbol {
            let shift = self.bits_per_symbol - 1 - bit_pos;
            let mut best0 = f32::MAX;
            let mut best1 = f32::MAX;
            for (idx, &p) in self.points.iter().enumerate() {
                let d = (p - s).norm();
                if (idx >> shift) & 1 == 0 {
                    best0 = best0.min(d);
                } else {
                    best1 = best1.min(d);
                }
            }
            // Negative => closer to a "1" point => logical 1 (§3).
            let llr = (best1 - best0) * 32.0;
            out.push(llr.clamp(-127.0, 127.0) as i8);
        }
        out
    }

    /// Soft-demap a whole frame's worth of data symbols.
    pub fn demap_frame(&self, symbols: &[Complex32]) -> Vec<i8> {
        symbols.iter().flat_map(|&s| self.demap_symbol(s)).collect()
    }
}

/// Block-interleaver layout for a (constellation, framesize) pair: bits
/// are written row-major into a `bits_per_symbol`-row matrix and read out
/// column-major, the generic form of the standard's per-MODCOD bit
/// interleaving (§4.3's "de-interleaved according to (constellation,
/// framesize, coderate)"). Column count is implied by `n / rows`.
fn interleave_dims(constellation: Constellation, framesize: FrameSize) -> (usize, usize) {
    let rows = constellation.bits_per_symbol();
    let cols = framesize.bits() / rows;
    (rows, cols)
}

/// De-interleave a frame's worth of soft bits (inverse of [`interleave`]).
pub fn deinterleave(bits: &[i8], constellation: Constellation, framesize: FrameSize) -> Vec<i8> {
    if constellation == Constellation::Qpsk {
        // QPSK carries no separate bit interleaver in the standard.
        return bits.to_vec();
    }
    let (rows, cols) = interleave_dims(constellation, framesize);
    let mut out = vec![0i8; rows * cols];
    // Bits arrived column-major (written row-major at the transmitter);
    // `out[r * cols + c]` recovers row-major order from the interleaved
    // column-major stream at `bits[c * rows + r]`.
    for r in 0..rows {
        for c in 0..cols {
            out[r * cols + c] = bits[c * rows + r];
        }
    }
    out
}

/// Interleave a frame's worth of hard bits the same way a transmitter
/// would before mapping to symbols; used only by this crate's own
/// synthetic loopback tests.
pub fn interleave(bits: &[i8], constellation: Constellation, framesize: FrameSize) -> Vec<i8> {
    if constellation == Constellation::Qpsk {
        return bits.to_vec();
    }
    let (rows, cols) = interleave_dims(constellation, framesize);
    let mut out = vec![0i8; rows * cols];
    for r in 0..rows {
        for c in 0..cols {
            out[c * rows + r] = bits[r * cols + c];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demap_recovers_hard_bits_of_nearest_point() {
        let demapper = Demapper::new(Constellation::Qpsk);
        let points = constellation_points(Constellation::Qpsk);
        for (idx, &p) in points.iter().enumerate() {
            let soft = demapper.demap_symbol(p);
            let mut recovered = 0usize;
            for &s in &soft {
                recovered = (recovered << 1) | usize::from(s < 0);
            }
            assert_eq!(recovered, idx, "point {idx} should demap to its own label");
        }
    }

    #[test]
    fn interleave_deinterleave_roundtrip_8psk() {
        let framesize = FrameSize::Short;
        let n = framesize.bits();
        let bits: Vec<i8> = (0..n).map(|i| if i % 3 == 0 { -5 } else { 5 }).collect();
        let woven = interleave(&bits, Constellation::Psk8, framesize);
        let back = deinterleave(&woven, Constellation::Psk8, framesize);
        assert_eq!(back, bits);
    }

    #[test]
    fn qpsk_is_unwoven_passthrough() {
        let framesize = FrameSize::Short;
        let bits: Vec<i8> = vec![1, -1, 1, -1];
        assert_eq!(deinterleave(&bits, Constellation::Qpsk, framesize), bits);
    }
}
