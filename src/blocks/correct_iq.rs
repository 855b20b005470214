//! DC blocker (§4.2 CorrectIQ): subtracts a leaky running mean of I and Q.
use crate::block::{Block, BlockEOF, BlockRet};
use crate::error::Error;
use crate::stream::{ReadStream, WriteStream};
use crate::Complex32;

/// Tracks a leaky running mean of I/Q and removes it from every sample,
/// correcting the DC offset and LO leakage typical of direct-conversion
/// front ends.
#[derive(rustradio_macros::Block)]
#[rustradio(crate, new)]
pub struct CorrectIq {
    #[rustradio(in)]
    src: ReadStream<Complex32>,
    #[rustradio(out)]
    dst: WriteStream<Complex32>,
    /// Smoothing time constant, in (0, 1]. Smaller tracks slower drift.
    alpha: f32,
    #[rustradio(default)]
    mean: Complex32,
}

impl BlockEOF for CorrectIq {
    fn eof(&mut self) -> bool {
        self.src.eof()
    }
}

impl Block for CorrectIq {
    fn work(&mut self) -> Result<BlockRet, Error> {
        if self.src.eof() {
            self.dst.stop_writer();
            return Ok(BlockRet::EOF);
        }
        let (r, tags) = self.src.read_buf()?;
        if r.is_empty() {
            return Ok(BlockRet::Noop);
        }
        let mut w = self.dst.write_buf()?;
        if w.is_empty() {
            return Ok(BlockRet::OutputFull);
        }
        let n = r.len().min(w.len());
        for (out, &s) in w.slice()[..n].iter_mut().zip(r.iter().take(n)) {
            self.mean = self.mean * (1.0 - self.alpha) + s * self.alpha;
            *out = s - self.mean;
        }
        w.produce(n, &tags);
        r.consume(n);
        Ok(BlockRet::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::WriteStream as WS;

    #[test]
    fn removes_constant_dc_offset() {
        let (dst_w, src) = WS::<Complex32>::with_capacity(4096);
        let (mut block, out) = CorrectIq::new(src, 0.05);
        {
            let mut w = dst_w.write_buf().unwrap();
            let n = w.len();
            for slot in w.slice()[..n].iter_mut() {
                *slot = Complex32::new(0.5, -0.3);
            }
            w.produce(n, &[]);
        }
        dst_w.stop_writer();
        loop {
            match block.work().unwrap() {
                BlockRet::EOF => break,
                _ => continue,
            }
        }
        let (r, _) = out.read_buf().unwrap();
        let last = *r.slice().last().unwrap();
        assert!(last.norm() < 0.05, "DC should have converged out, got {last}");
    }
}
