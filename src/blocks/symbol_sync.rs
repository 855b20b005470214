//! Mueller–Müller symbol timing recovery (§4.2).
//!
//! Consumes several samples per symbol (typically the `[MIN_SPS,
//! MAX_SPS]` window the rational resampler targets) and emits one
//! interpolated sample per recovered symbol. Timing error is
//! `ε = Re(y·(p − pp)) − Re(p·(y − yp))`, where `y` is the newly
//! interpolated symbol and `p`/`pp` the previous two; `ω` (the running
//! estimate of samples-per-symbol) is nudged by `ε` and clamped to
//! `ω0·(1 ± ω_limit)`, `μ` (the fractional sample offset to the next
//! symbol) by a faster-gain term of the same error.
use crate::block::{Block, BlockEOF, BlockName, BlockRet};
use crate::error::Error;
use crate::stream::{ReadStream, WriteStream};
use crate::{Complex32, Float};

/// Mueller-Müller timing recovery loop.
pub struct SymbolSync {
    src: ReadStream<Complex32>,
    dst: WriteStream<Complex32>,
    /// Nominal samples per symbol, as configured at construction.
    omega0: Float,
    /// Current running samples-per-symbol estimate.
    omega: Float,
    omega_limit: Float,
    /// Fractional position, in samples, until the next interpolated
    /// symbol.
    mu: Float,
    gain_mu: Float,
    gain_omega: Float,
    history: Vec<Complex32>,
    p: Complex32,
    pp: Complex32,
    /// Recovered symbols computed but not yet room for in the output
    /// stream; flushed before any further history is consumed.
    pending: Vec<Complex32>,
}

impl SymbolSync {
    /// `omega0` is the nominal samples/symbol (from the upstream
    /// resampler's target rate); `omega_limit` bounds how far the loop
    /// may drift from it, as a fraction (e.g. 0.01 for ±1%).
    #[must_use]
    pub fn new(
        src: ReadStream<Complex32>,
        omega0: Float,
        omega_limit: Float,
        gain_mu: Float,
        gain_omega: Float,
    ) -> (Self, ReadStream<Complex32>) {
        let (dst, dst_read) = WriteStream::new();
        (
            Self {
                src,
                dst,
                omega0,
                omega: omega0,
                omega_limit,
                mu: 0.0,
                gain_mu,
                gain_omega,
                history: Vec::new(),
                p: Complex32::new(0.0, 0.0),
                pp: Complex32::new(0.0, 0.0),
                pending: Vec::new(),
            },
            dst_read,
        )
    }

    /// Linearly interpolate between `history[idx]` and `history[idx+1]`
    /// at fractional offset `self.mu`.
    fn interpolate(&self, idx: usize) -> Complex32 {
        let a = self.history[idx];
        let b = self.history[idx + 1];
        a + (b - a) * self.mu
    }

    fn clamp_omega(&mut self) {
        let lo = self.omega0 * (1.0 - self.omega_limit);
        let hi = self.omega0 * (1.0 + self.omega_limit);
        self.omega = self.omega.clamp(lo, hi);
    }
}

impl BlockName for SymbolSync {
    fn block_name(&self) -> &str {
        "SymbolSync"
    }
}

impl BlockEOF for SymbolSync {
    fn eof(&mut self) -> bool {
        self.src.eof()
    }
}

impl Block for SymbolSync {
    fn work(&mut self) -> Result<BlockRet, Error> {
        if self.pending.is_empty() {
            if self.src.eof() && self.history.len() < 2 {
                self.dst.stop_writer();
                return Ok(BlockRet::EOF);
            }
            let (r, _tags) = self.src.read_buf()?;
            if !r.is_empty() {
                self.history.extend(r.iter().copied());
                let n = r.len();
                r.consume(n);
            } else if !self.src.eof() {
                return Ok(BlockRet::Noop);
            }

            // `mu` is kept normalized to [0, 1) before every interpolation:
            // the fractional offset from `history[idx]` to the next symbol.
            // After producing a symbol, the full `omega` is added back onto
            // `mu`, then normalized down again by walking `idx` forward.
            let mut idx = 0usize;
            loop {
                while self.mu >= 1.0 {
                    if idx + 1 >= self.history.len() {
                        break;
                    }
                    self.mu -= 1.0;
                    idx += 1;
                }
                if self.mu >= 1.0 || idx + 1 >= self.history.len() {
                    // Either not enough history to normalize mu below 1, or
                    // no pair left to interpolate between; wait for more
                    // input.
                    break;
                }
                let y = self.interpolate(idx);
                let error =
                    (y * (self.p - self.pp).conj()).re - (self.p * (y - self.p).conj()).re;
                self.omega += self.gain_omega * error;
                self.clamp_omega();
                self.mu += self.omega + self.gain_mu * error;
                self.pp = self.p;
                self.p = y;
                self.pending.push(y);
            }
            self.history.drain(0..idx);

            if self.pending.is_empty() {
                if self.src.eof() {
                    self.dst.stop_writer();
                    return Ok(BlockRet::EOF);
                }
                return Ok(BlockRet::Ok);
            }
        }

        // Flush as much of `pending` as the output stream currently has
        // room for; whatever doesn't fit stays buffered for next time
        // instead of being dropped, so input already drained from
        // `history` never loses its corresponding output.
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
    use crate::stream::WriteStream as WS;

    #[test]
    fn recovers_roughly_one_symbol_per_sps_samples() {
        let sps = 4.0_f32;
        let (w, src) = WS::<Complex32>::with_capacity(4096);
        let (mut block, out) = SymbolSync::new(src, sps, 0.01, 0.05, 0.01);
        let nsyms = 50;
        let mut samples = Vec::new();
        for i in 0..nsyms {
            let bit = if i % 2 == 0 { 1.0 } else { -1.0 };
            for _ in 0..(sps as usize) {
                samples.push(Complex32::new(bit, 0.0));
            }
        }
        {
            let mut buf = w.write_buf().unwrap();
            buf.fill_from_slice(&samples);
            buf.produce(samples.len(), &[]);
        }
        w.stop_writer();
        loop {
            if block.work().unwrap() == BlockRet::EOF {
                break;
            }
        }
        let (r, _) = out.read_buf().unwrap();
        // Recovered symbol count should be in the right ballpark (a
        // sample or two of slop at start/end from interpolation warm-up).
        assert!(
            r.len() as i64 >= nsyms as i64 - 3 && (r.len() as i64) <= nsyms as i64 + 3,
            "got {} symbols, expected ~{nsyms}",
            r.len()
        );
    }
}
