//! Automatic gain control (§4.2 AGC): multiplicative gain tracking a unit
//! reference magnitude.
use crate::block::{Block, BlockEOF, BlockRet};
use crate::error::Error;
use crate::stream::{ReadStream, WriteStream};
use crate::{Complex32, Float};

const GAIN_CLAMP: Float = 65_536.0;

/// Multiplicative AGC: scales every sample by a running gain chasing a
/// reference magnitude of 1.0, adapting at rate `rate` per sample.
#[derive(rustradio_macros::Block)]
#[rustradio(crate, new)]
pub struct Agc {
    #[rustradio(in)]
    src: ReadStream<Complex32>,
    #[rustradio(out)]
    dst: WriteStream<Complex32>,
    /// Adaptation rate; larger converges faster but noisier.
    rate: Float,
    #[rustradio(default)]
    gain: Float,
}

impl BlockEOF for Agc {
    fn eof(&mut self) -> bool {
        self.src.eof()
    }
}

impl Block for Agc {
    fn work(&mut self) -> Result<BlockRet, Error> {
        if self.gain == 0.0 {
            self.gain = 1.0;
        }
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
            let y = s * self.gain;
            *out = y;
            let mag = y.norm();
            if mag > 1e-12 {
                self.gain += self.rate * (1.0 - mag) * self.gain;
            }
            self.gain = self.gain.clamp(-GAIN_CLAMP, GAIN_CLAMP);
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
    fn converges_toward_unit_magnitude() {
        let (w, src) = WS::<Complex32>::with_capacity(4096);
        let (mut agc, out) = Agc::new(src, 0.01);
        {
            let mut buf = w.write_buf().unwrap();
            let n = buf.len();
            for slot in buf.slice()[..n].iter_mut() {
                *slot = Complex32::new(0.01, 0.0);
            }
            buf.produce(n, &[]);
        }
        w.stop_writer();
        loop {
            if agc.work().unwrap() == BlockRet::EOF {
                break;
            }
        }
        let (r, _) = out.read_buf().unwrap();
        let last = r.slice().last().unwrap().norm();
        assert!((last - 1.0).abs() < 0.2, "expected convergence near 1.0, got {last}");
    }
}
