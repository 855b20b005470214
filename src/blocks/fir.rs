//! Streaming FIR filter (§4.2 FIR block): real-valued taps applied to a
//! complex sample stream, with a history buffer carrying the last
//! `ntaps - 1` samples across `work()` calls so the output is a sample for
//! sample convolution rather than a blockwise approximation.
use std::collections::VecDeque;

use crate::block::{Block, BlockEOF, BlockName, BlockRet};
use crate::error::Error;
use crate::stream::{ReadStream, WriteStream};
use crate::{Complex32, Float};

/// A real-tapped FIR filter over a complex sample stream. Used as the
/// root-raised-cosine matched filter ahead of clock recovery, and as the
/// anti-alias filter inside [`crate::blocks::rational_resampler`].
pub struct FirFilter {
    src: ReadStream<Complex32>,
    dst: WriteStream<Complex32>,
    taps: Vec<Float>,
    /// Last `ntaps - 1` samples seen, oldest first.
    history: VecDeque<Complex32>,
}

impl FirFilter {
    /// Create a new FIR filter with the given taps (see [`super::firdes`]).
    #[must_use]
    pub fn new(src: ReadStream<Complex32>, taps: Vec<Float>) -> (Self, ReadStream<Complex32>) {
        assert!(!taps.is_empty(), "FIR needs at least one tap");
        let (dst, dst_read) = WriteStream::new();
        let mut history = VecDeque::with_capacity(taps.len());
        history.resize(taps.len() - 1, Complex32::new(0.0, 0.0));
        (
            Self {
                src,
                dst,
                taps,
                history,
            },
            dst_read,
        )
    }

    fn tap_one(&self, window: impl Iterator<Item = Complex32>) -> Complex32 {
        // Taps are applied reversed: the first tap multiplies the oldest
        // sample in the window, the last tap the newest.
        window
            .zip(self.taps.iter())
            .fold(Complex32::new(0.0, 0.0), |acc, (s, &t)| acc + s * t)
    }
}

impl BlockName for FirFilter {
    fn block_name(&self) -> &str {
        "FirFilter"
    }
}

impl BlockEOF for FirFilter {
    fn eof(&mut self) -> bool {
        self.src.eof()
    }
}

impl Block for FirFilter {
    fn work(&mut self) -> Result<BlockRet, Error> {
        let (r, tags) = self.src.read_buf()?;
        if r.is_empty() {
            if self.src.eof() {
                self.dst.stop_writer();
                return Ok(BlockRet::EOF);
            }
            return Ok(BlockRet::Noop);
        }
        let mut w = self.dst.write_buf()?;
        if w.is_empty() {
            return Ok(BlockRet::OutputFull);
        }
        let n = r.len().min(w.len());
        for (i, out) in w.slice()[..n].iter_mut().enumerate() {
            self.history.push_back(r.slice()[i]);
            let window: Vec<Complex32> = self.history.iter().copied().collect();
            self.history.pop_front();
            *out = self.tap_one(window.into_iter());
        }
        w.produce(n, &tags);
        r.consume(n);
        Ok(BlockRet::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::firdes;
    use crate::stream::WriteStream as WS;

    #[test]
    fn unit_impulse_tap_is_identity() {
        let (w, src) = WS::<Complex32>::with_capacity(64);
        let (mut fir, out) = FirFilter::new(src, vec![1.0]);
        {
            let mut buf = w.write_buf().unwrap();
            buf.fill_from_slice(&[Complex32::new(1.0, 2.0), Complex32::new(-1.0, 0.5)]);
            buf.produce(2, &[]);
        }
        w.stop_writer();
        loop {
            if fir.work().unwrap() == BlockRet::EOF {
                break;
            }
        }
        let (r, _) = out.read_buf().unwrap();
        assert_eq!(r.slice(), &[Complex32::new(1.0, 2.0), Complex32::new(-1.0, 0.5)]);
    }

    /// Drives `input` through a fresh [`FirFilter`] built from `taps` and
    /// returns every output sample.
    fn run_through(taps: Vec<Float>, input: &[Complex32]) -> Vec<Complex32> {
        let (w, src) = WS::<Complex32>::with_capacity(input.len() + taps.len() + 16);
        let (mut fir, out) = FirFilter::new(src, taps);
        {
            let mut buf = w.write_buf().unwrap();
            buf.fill_from_slice(input);
            buf.produce(input.len(), &[]);
        }
        w.stop_writer();
        loop {
            if fir.work().unwrap() == BlockRet::EOF {
                break;
            }
        }
        let (r, _) = out.read_buf().unwrap();
        r.slice().to_vec()
    }

    /// Two back-to-back root-raised-cosine filters built from the same
    /// taps form a full raised-cosine matched pair: the cascade's impulse
    /// response must peak at the center tap and cross zero at every
    /// non-zero multiple of the symbol period (in samples), per Nyquist's
    /// zero-ISI criterion.
    #[test]
    fn rrc_matched_pair_satisfies_nyquist_zero_isi() {
        let samp_rate = 2_000_000.0;
        let sym_rate = 1_000_000.0;
        let sps = (samp_rate / sym_rate).round() as usize; // samples per symbol
        let ntaps = 33;
        let taps = firdes::root_raised_cosine(1.0, samp_rate, sym_rate, 0.35, ntaps);

        let mut impulse = vec![Complex32::new(0.0, 0.0); 4 * ntaps];
        impulse[0] = Complex32::new(1.0, 0.0);

        let half_response = run_through(taps.clone(), &impulse);
        let full_response = run_through(taps, &half_response);

        let center = ntaps - 1; // index of the single-filter impulse response's peak
        let (peak_idx, peak) = full_response
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.norm().partial_cmp(&b.1.norm()).unwrap())
            .unwrap();
        assert_eq!(peak_idx, center, "matched-pair response should peak at the center tap");
        assert!(peak.norm() > 0.0);

        let tol = peak.norm() * 1e-3;
        let mut lag = sps;
        while lag <= center && center + lag < full_response.len() {
            let above = full_response[center + lag].norm();
            let below = full_response[center - lag].norm();
            assert!(
                above < tol,
                "expected near-zero ISI at lag +{lag} symbols, got {above} (tol {tol})"
            );
            assert!(
                below < tol,
                "expected near-zero ISI at lag -{lag} symbols, got {below} (tol {tol})"
            );
            lag += sps;
        }
    }
}
