//! Rational resampler (§4.2): converts the input rate to a target rate
//! that is the smallest integer multiple of the symbol rate landing the
//! resulting samples-per-symbol inside `[MIN_SPS, MAX_SPS]`.
//!
//! Implemented as interpolate-by-L, lowpass-filter, decimate-by-M, with L
//! and M the reduced numerator/denominator of `target_rate / input_rate`.
//! This is mathematically the same operation a true per-phase polyphase
//! decomposition performs (the lowpass is still run once per output
//! sample's worth of support); it differs only in not skipping the
//! filter taps that a zero-stuffed input sample would multiply by zero,
//! which a real-time implementation would want but which is not required
//! for correctness.
use crate::block::{Block, BlockEOF, BlockName, BlockRet};
use crate::blocks::firdes;
use crate::error::Error;
use crate::stream::{ReadStream, WriteStream};
use crate::{Complex32, Float};

/// Minimum acceptable samples-per-symbol at the resampler's output.
pub const MIN_SPS: Float = 2.0;
/// Maximum acceptable samples-per-symbol at the resampler's output.
pub const MAX_SPS: Float = 4.0;

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Choose `(interpolation, decimation)` such that
/// `samp_rate * interpolation / decimation` is the smallest integer
/// multiple of `sym_rate` whose resulting samples-per-symbol falls in
/// `[MIN_SPS, MAX_SPS]`.
pub fn choose_ratio(samp_rate: Float, sym_rate: Float) -> (usize, usize) {
    let sps = MIN_SPS.ceil() as u64;
    let target_rate = sym_rate * sps as Float;
    // Represent target/samp_rate as a ratio of integers by scaling both
    // sides up to a common integer domain (kHz-ish resolution is plenty
    // for realistic sample/symbol rates).
    const SCALE: u64 = 1000;
    let num = (target_rate * SCALE as Float).round() as u64;
    let den = (samp_rate * SCALE as Float).round() as u64;
    let g = gcd(num, den).max(1);
    ((num / g) as usize, (den / g) as usize)
}

/// Polyphase-equivalent rational resampler.
pub struct RationalResampler {
    src: ReadStream<Complex32>,
    dst: WriteStream<Complex32>,
    interpolation: usize,
    decimation: usize,
    taps: Vec<Float>,
    history: Vec<Complex32>,
    /// Position within the upsampled timeline, mod `interpolation`.
    phase: usize,
    /// Output samples computed but not yet room for in the output
    /// stream; flushed before any further input is consumed.
    pending: Vec<Complex32>,
}

impl RationalResampler {
    /// Build a resampler from explicit `(interpolation, decimation)` —
    /// see [`choose_ratio`] to derive them from rates.
    #[must_use]
    pub fn new(
        src: ReadStream<Complex32>,
        interpolation: usize,
        decimation: usize,
    ) -> (Self, ReadStream<Complex32>) {
        assert!(interpolation > 0 && decimation > 0);
        let (dst, dst_read) = WriteStream::new();
        // Lowpass cutoff below both the input and (upsampled) output
        // Nyquist, scaled for the interpolation gain.
        let cutoff_fraction = 0.9 / (interpolation.max(decimation) as Float);
        let taps = firdes::low_pass(
            interpolation as Float,
            1.0,
            cutoff_fraction / 2.0,
            cutoff_fraction * 0.2,
        );
        let ntaps = taps.len();
        (
            Self {
                src,
                dst,
                interpolation,
                decimation,
                taps,
                history: vec![Complex32::new(0.0, 0.0); ntaps],
                phase: 0,
                pending: Vec::new(),
            },
            dst_read,
        )
    }

    /// Push one new input sample into history and produce every output
    /// sample that becomes available before the next input is needed.
    fn feed(&mut self, sample: Complex32, out: &mut Vec<Complex32>) {
        self.history.remove(0);
        self.history.push(sample);
        // Each input sample advances the upsampled timeline by
        // `interpolation` positions; emit an output every time the
        // phase accumulator crosses a multiple of `decimation`.
        for _ in 0..self.interpolation {
            if self.phase == 0 {
                out.push(self.interpolate_at_phase(0));
            }
            self.phase = (self.phase + self.decimation) % self.interpolation;
        }
    }

    fn interpolate_at_phase(&self, phase_offset: usize) -> Complex32 {
        let mut acc = Complex32::new(0.0, 0.0);
        let mut i = phase_offset;
        while i < self.taps.len() {
            let hist_idx = self.history.len() - 1 - i / self.interpolation;
            acc += self.history[hist_idx] * self.taps[i];
            i += self.interpolation;
        }
        acc
    }
}

impl BlockName for RationalResampler {
    fn block_name(&self) -> &str {
        "RationalResampler"
    }
}

impl BlockEOF for RationalResampler {
    fn eof(&mut self) -> bool {
        self.src.eof()
    }
}

impl Block for RationalResampler {
    fn work(&mut self) -> Result<BlockRet, Error> {
        if self.pending.is_empty() {
            if self.src.eof() {
                self.dst.stop_writer();
                return Ok(BlockRet::EOF);
            }
            let (r, _tags) = self.src.read_buf()?;
            if r.is_empty() {
                return Ok(BlockRet::Noop);
            }
            let n = r.len();
            let mut produced = Vec::new();
            for &s in r.iter() {
                self.feed(s, &mut produced);
            }
            r.consume(n);
            self.pending = produced;
            if self.pending.is_empty() {
                return Ok(BlockRet::Ok);
            }
        }

        // Flush as much of `pending` as the output stream currently has
        // room for; whatever doesn't fit stays buffered for next time
        // instead of being dropped, so input already consumed from `r`
        // never loses its corresponding output.
        let mut w = self.dst.write_buf()?;
        if w.is_empty() {
            return Ok(BlockRet::OutputFull);
        }
        let m = self.pending.len().min(w.len());
        w.slice()[..m].copy_from_slice(&self.pending[..m]);
        w.produce(m, &[]);
        self.pending.drain(0..m);
        Ok(BlockRet::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choose_ratio_lands_sps_in_window() {
        let (interp, decim) = choose_ratio(2_000_000.0, 1_000_000.0);
        let out_rate = 2_000_000.0 * interp as Float / decim as Float;
        let sps = out_rate / 1_000_000.0;
        assert!(sps >= MIN_SPS - 1e-6 && sps <= MAX_SPS + 1e-6, "sps={sps}");
    }

    #[test]
    fn unity_ratio_passes_samples_through_with_filter_delay() {
        let (w, src) = crate::stream::WriteStream::<Complex32>::with_capacity(64);
        let (mut block, out) = RationalResampler::new(src, 1, 1);
        {
            let mut buf = w.write_buf().unwrap();
            buf.fill_from_slice(&[Complex32::new(1.0, 0.0); 8]);
            buf.produce(8, &[]);
        }
        w.stop_writer();
        loop {
            if block.work().unwrap() == BlockRet::EOF {
                break;
            }
        }
        let (r, _) = out.read_buf().unwrap();
        assert_eq!(r.len(), 8);
    }
}
