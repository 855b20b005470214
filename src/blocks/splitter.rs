//! Stream splitter (§4.2 Splitter): duplicates one input to N outputs,
//! each independently enabled/disabled at runtime (diagnostic taps like
//! the FFT display shouldn't block the decode path when nobody's
//! watching).
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::block::{Block, BlockEOF, BlockName, BlockRet};
use crate::error::Error;
use crate::stream::{ReadStream, WriteStream};
use crate::Complex32;

/// A handle to enable/disable one of a [`Splitter`]'s output taps without
/// touching the graph.
#[derive(Clone)]
pub struct TapGate {
    enabled: Arc<AtomicBool>,
}

impl TapGate {
    /// Turn this tap's output on or off. When off, samples are dropped
    /// instead of queued, so a disabled diagnostic tap never backs up the
    /// splitter.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }
}

struct Output {
    dst: WriteStream<Complex32>,
    gate: TapGate,
}

/// Duplicates one complex input stream to N outputs.
pub struct Splitter {
    src: ReadStream<Complex32>,
    outputs: Vec<Output>,
}

impl Splitter {
    /// Create a splitter with `n` outputs, all enabled by default.
    #[must_use]
    pub fn new(src: ReadStream<Complex32>, n: usize) -> (Self, Vec<(ReadStream<Complex32>, TapGate)>) {
        let mut outputs = Vec::with_capacity(n);
        let mut handles = Vec::with_capacity(n);
        for _ in 0..n {
            let (dst, read) = WriteStream::new();
            let gate = TapGate {
                enabled: Arc::new(AtomicBool::new(true)),
            };
            outputs.push(Output {
                dst,
                gate: gate.clone(),
            });
            handles.push((read, gate));
        }
        (Self { src, outputs }, handles)
    }
}

impl BlockName for Splitter {
    fn block_name(&self) -> &str {
        "Splitter"
    }
}

impl BlockEOF for Splitter {
    fn eof(&mut self) -> bool {
        self.src.eof()
    }
}

impl Block for Splitter {
    fn work(&mut self) -> Result<BlockRet, Error> {
        if self.src.eof() {
            for o in &self.outputs {
                o.dst.stop_writer();
            }
            return Ok(BlockRet::EOF);
        }
        let (r, tags) = self.src.read_buf()?;
        if r.is_empty() {
            return Ok(BlockRet::Noop);
        }
        let mut n = r.len();
        for o in &self.outputs {
            if !o.gate.is_enabled() {
                continue;
            }
            n = n.min(o.dst.free());
        }
        if n == 0 {
            return Ok(BlockRet::OutputFull);
        }
        for o in &self.outputs {
            if !o.gate.is_enabled() {
                continue;
            }
            let mut w = o.dst.write_buf()?;
            let m = n.min(w.len());
            w.slice()[..m].copy_from_slice(&r.slice()[..m]);
            w.produce(m, &tags);
        }
        r.consume(n);
        Ok(BlockRet::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::WriteStream as WS;

    #[test]
    fn disabled_tap_does_not_receive_samples() {
        let (w, src) = WS::<Complex32>::with_capacity(64);
        let (mut splitter, mut handles) = Splitter::new(src, 2);
        handles[1].1.set_enabled(false);
        {
            let mut buf = w.write_buf().unwrap();
            buf.fill_from_slice(&[Complex32::new(1.0, 0.0); 4]);
            buf.produce(4, &[]);
        }
        w.stop_writer();
        loop {
            if splitter.work().unwrap() == BlockRet::EOF {
                break;
            }
        }
        let (r0, _) = handles[0].0.read_buf().unwrap();
        assert_eq!(r0.len(), 4);
        let (r1, _) = handles[1].0.read_buf().unwrap();
        assert_eq!(r1.len(), 0, "disabled tap should receive nothing");
    }
}
