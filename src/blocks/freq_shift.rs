//! Frequency shifter (§4.2 Frequency shift): a running-phase rotator whose
//! increment is adjustable at runtime, so the outer PLL (§4.3) can feed
//! back slow frequency corrections without rebuilding the graph.
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::block::{Block, BlockEOF, BlockName, BlockRet};
use crate::error::Error;
use crate::stream::{ReadStream, WriteStream};
use crate::{Complex32, Float};

/// A handle the outer PLL uses to update a [`FreqShift`]'s rotation rate
/// while the graph is running.
#[derive(Clone)]
pub struct FreqShiftControl {
    delta_phi_bits: Arc<AtomicU32>,
}

impl FreqShiftControl {
    /// Set the per-sample phase increment, in radians.
    pub fn set_delta_phi(&self, delta_phi: Float) {
        self.delta_phi_bits.store(delta_phi.to_bits(), Ordering::Relaxed);
    }

    fn delta_phi(&self) -> Float {
        Float::from_bits(self.delta_phi_bits.load(Ordering::Relaxed))
    }
}

/// Rotates every sample by a running phase, incremented by a runtime
/// settable `delta_phi` radians per sample.
pub struct FreqShift {
    src: ReadStream<Complex32>,
    dst: WriteStream<Complex32>,
    phase: Float,
    control: FreqShiftControl,
}

impl FreqShift {
    /// Create a new frequency shifter, starting with phase increment
    /// `delta_phi` radians/sample. Returns the block, its output stream,
    /// and a [`FreqShiftControl`] for runtime adjustment.
    #[must_use]
    pub fn new(
        src: ReadStream<Complex32>,
        delta_phi: Float,
    ) -> (Self, ReadStream<Complex32>, FreqShiftControl) {
        let (dst, dst_read) = WriteStream::new();
        let control = FreqShiftControl {
            delta_phi_bits: Arc::new(AtomicU32::new(delta_phi.to_bits())),
        };
        (
            Self {
                src,
                dst,
                phase: 0.0,
                control: control.clone(),
            },
            dst_read,
            control,
        )
    }
}

impl BlockName for FreqShift {
    fn block_name(&self) -> &str {
        "FreqShift"
    }
}

impl BlockEOF for FreqShift {
    fn eof(&mut self) -> bool {
        self.src.eof()
    }
}

impl Block for FreqShift {
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
        let delta_phi = self.control.delta_phi();
        for (out, &s) in w.slice()[..n].iter_mut().zip(r.iter().take(n)) {
            let rot = Complex32::new(self.phase.cos(), self.phase.sin());
            *out = s * rot;
            self.phase += delta_phi;
            if self.phase > std::f32::consts::PI {
                self.phase -= 2.0 * std::f32::consts::PI;
            } else if self.phase < -std::f32::consts::PI {
                self.phase += 2.0 * std::f32::consts::PI;
            }
        }
        w.produce(n, &tags);
        r.consume(n);
        Ok(BlockRet::Ok)
    }
}
