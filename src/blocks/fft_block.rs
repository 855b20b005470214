//! Diagnostic FFT block (§4.2 FFT block): windows the last `m` samples
//! and publishes a magnitude-in-dB spectrum for a UI tap. Not on the
//! decode path — failing to keep up just means a stale spectrum, never a
//! stalled pipeline, so this block drops input rather than applying
//! backpressure.
use std::sync::{Arc, Mutex};

use rustfft::{num_complex::Complex as RustfftComplex, FftPlanner};

use crate::block::{Block, BlockEOF, BlockName, BlockRet};
use crate::error::Error;
use crate::stream::ReadStream;
use crate::{Complex32, Float};

/// Shared, latest-wins spectrum snapshot a UI can poll.
#[derive(Clone, Default)]
pub struct SpectrumHandle {
    inner: Arc<Mutex<Vec<Float>>>,
}

impl SpectrumHandle {
    /// The most recently published magnitude-in-dB spectrum, oldest bin
    /// (most negative frequency) first. Empty until the first window
    /// fills.
    pub fn snapshot(&self) -> Vec<Float> {
        self.inner.lock().unwrap().clone()
    }
}

/// Windowed FFT magnitude spectrum, recomputed every `m` input samples.
pub struct FftBlock {
    src: ReadStream<Complex32>,
    m: usize,
    window: Vec<Float>,
    history: Vec<Complex32>,
    planner: FftPlanner<Float>,
    handle: SpectrumHandle,
}

impl FftBlock {
    /// Create a new diagnostic FFT tap with window size `m` (should be a
    /// power of two; 8,192 is typical).
    #[must_use]
    pub fn new(src: ReadStream<Complex32>, m: usize) -> (Self, SpectrumHandle) {
        assert!(m.is_power_of_two(), "FFT window size should be a power of two");
        let window: Vec<Float> = (0..m)
            .map(|n| {
                0.5 - 0.5
                    * (2.0 * std::f32::consts::PI * n as Float / (m - 1) as Float).cos()
            })
            .collect();
        let handle = SpectrumHandle::default();
        (
            Self {
                src,
                m,
                window,
                history: Vec::with_capacity(m),
                planner: FftPlanner::new(),
                handle: handle.clone(),
            },
            handle,
        )
    }
}

impl BlockName for FftBlock {
    fn block_name(&self) -> &str {
        "FftBlock"
    }
}

impl BlockEOF for FftBlock {
    fn eof(&mut self) -> bool {
        self.src.eof()
    }
}

impl Block for FftBlock {
    fn work(&mut self) -> Result<BlockRet, Error> {
        if self.src.eof() {
            return Ok(BlockRet::EOF);
        }
        let (r, _tags) = self.src.read_buf()?;
        if r.is_empty() {
            return Ok(BlockRet::Noop);
        }
        self.history.extend(r.iter().copied());
        let n = r.len();
        r.consume(n);
        if self.history.len() < self.m {
            return Ok(BlockRet::Ok);
        }
        let mut buf: Vec<RustfftComplex<Float>> = self
            .history
            .iter()
            .zip(self.window.iter())
            .map(|(s, &w)| RustfftComplex::new(s.re * w, s.im * w))
            .collect();
        self.history.clear();
        let fft = self.planner.plan_fft_forward(self.m);
        fft.process(&mut buf);
        let mags: Vec<Float> = buf
            .iter()
            .map(|c| 20.0 * (c.norm() + 1e-12).log10())
            .collect();
        // Shift so bin 0 (DC) lands in the middle, matching a conventional
        // centered display.
        let half = self.m / 2;
        let mut shifted = Vec::with_capacity(self.m);
        shifted.extend_from_slice(&mags[half..]);
        shifted.extend_from_slice(&mags[..half]);
        *self.handle.inner.lock().unwrap() = shifted;
        Ok(BlockRet::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::WriteStream as WS;

    #[test]
    fn publishes_a_spectrum_once_a_window_fills() {
        let (w, src) = WS::<Complex32>::with_capacity(4096);
        let (mut block, handle) = FftBlock::new(src, 64);
        assert!(handle.snapshot().is_empty());
        {
            let mut buf = w.write_buf().unwrap();
            let n = 64;
            for (i, slot) in buf.slice()[..n].iter_mut().enumerate() {
                *slot = Complex32::new((i as Float * 0.3).sin(), 0.0);
            }
            buf.produce(n, &[]);
        }
        w.stop_writer();
        loop {
            if block.work().unwrap() == BlockRet::EOF {
                break;
            }
        }
        assert_eq!(handle.snapshot().len(), 64);
    }
}
