//! FM quadrature demodulator (§4.2 QuadratureDemod): `gain · arg(z_n ·
//! conj(z_{n-1}))` for successive complex samples. Not on the DVB-S2
//! decode path (that receiver stays in the complex domain through the
//! PLL), but kept as a general real-output DSP primitive for
//! frame-oriented links whose demodulation is plain FM (LRPT/HRPT style).
use crate::block::{Block, BlockEOF, BlockName, BlockRet};
use crate::error::Error;
use crate::stream::{ReadStream, WriteStream};
use crate::{Complex32, Float};

/// Differentiates the phase of a complex stream into a real-valued
/// frequency estimate, one output sample per input sample after the
/// first.
pub struct QuadratureDemod {
    src: ReadStream<Complex32>,
    dst: WriteStream<Float>,
    gain: Float,
    last: Complex32,
}

impl QuadratureDemod {
    /// Create a new demodulator with multiplicative output `gain`.
    #[must_use]
    pub fn new(src: ReadStream<Complex32>, gain: Float) -> (Self, ReadStream<Float>) {
        let (dst, dst_read) = WriteStream::new();
        (
            Self {
                src,
                dst,
                gain,
                last: Complex32::new(0.0, 0.0),
            },
            dst_read,
        )
    }

    fn demod_one(&self, z: Complex32) -> Float {
        #[cfg(feature = "fast-math")]
        {
            self.gain * fast_math::atan2(z.im, z.re)
        }
        #[cfg(not(feature = "fast-math"))]
        {
            self.gain * z.im.atan2(z.re)
        }
    }
}

impl BlockName for QuadratureDemod {
    fn block_name(&self) -> &str {
        "QuadratureDemod"
    }
}

impl BlockEOF for QuadratureDemod {
    fn eof(&mut self) -> bool {
        self.src.eof()
    }
}

impl Block for QuadratureDemod {
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
            let conj_prod = s * self.last.conj();
            *out = self.demod_one(conj_prod);
            self.last = s;
        }
        w.produce(n, &tags);
        r.consume(n);
        Ok(BlockRet::Ok)
    }
}
