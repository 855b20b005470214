//! Graph block wrapping [`super::deframer::CaduDeframer`] (§2's
//! frame-oriented pipeline path): consumes a stream of bits (one `0`/`1`
//! per item) and emits a stream of packed 224-byte CADUs.
use crate::block::{Block, BlockEOF, BlockName, BlockRet};
use crate::ccsds::deframer::{CaduDeframer, CADU_SIZE};
use crate::error::Error;
use crate::stream::{ReadStream, WriteStream};

/// CADU deframer as a dataflow block.
pub struct CaduDeframerBlock {
    src: ReadStream<u8>,
    dst: WriteStream<u8>,
    deframer: CaduDeframer,
    /// Packed CADU bytes decoded but not yet room for in the output
    /// stream; flushed before any further input bits are consumed.
    pending: Vec<u8>,
}

impl CaduDeframerBlock {
    /// `sep_errors`/`max_consecutive_miss` as in [`CaduDeframer::new`].
    #[must_use]
    pub fn new(
        src: ReadStream<u8>,
        sep_errors: u32,
        max_consecutive_miss: u32,
    ) -> (Self, ReadStream<u8>) {
        let (dst, dst_read) = WriteStream::new();
        (
            Self {
                src,
                dst,
                deframer: CaduDeframer::new(sep_errors, max_consecutive_miss),
                pending: Vec::new(),
            },
            dst_read,
        )
    }

    /// Current deframer state, for diagnostics/UI taps.
    pub fn state(&self) -> super::deframer::DeframerState {
        self.deframer.state()
    }

    /// Frames emitted so far.
    pub fn frame_count(&self) -> u64 {
        self.deframer.frame_count()
    }
}

impl BlockName for CaduDeframerBlock {
    fn block_name(&self) -> &str {
        "CaduDeframerBlock"
    }
}

impl BlockEOF for CaduDeframerBlock {
    fn eof(&mut self) -> bool {
        self.src.eof()
    }
}

impl Block for CaduDeframerBlock {
    fn work(&mut self) -> Result<BlockRet, Error> {
        if self.pending.is_empty() {
            let (r, _tags) = self.src.read_buf()?;
            if r.is_empty() {
                if self.src.eof() {
                    self.dst.stop_writer();
                    return Ok(BlockRet::EOF);
                }
                return Ok(BlockRet::Noop);
            }
            let n = r.len();
            let cadus = self.deframer.work(r.slice());
            r.consume(n);
            if cadus.is_empty() {
                return Ok(BlockRet::Ok);
            }
            self.pending = cadus.iter().flat_map(|c| c.iter().copied()).collect();
        }

        // Flush as much of `pending` as the output stream currently has
        // room for; whatever doesn't fit stays buffered for next time
        // instead of being dropped, so bits already consumed by the
        // deframer never lose their corresponding CADU bytes.
        let mut w = self.dst.write_buf()?;
        if w.is_empty() {
            return Ok(BlockRet::OutputFull);
        }
        let n = self.pending.len().min(w.len());
        w.slice()[..n].copy_from_slice(&self.pending[..n]);
        w.produce(n, &[]);
        self.pending.drain(0..n);
        Ok(BlockRet::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ccsds::deframer::{bytes_to_bits, ASM};
    use crate::stream::WriteStream as WS;

    #[test]
    fn block_emits_packed_cadus_downstream() {
        let (w, src) = WS::<u8>::with_capacity(1 << 16);
        let (mut block, out) = CaduDeframerBlock::new(src, 4, 8);
        let payload = [0x42u8; CADU_SIZE - 4];
        let mut bits = Vec::new();
        for _ in 0..3 {
            bits.extend(bytes_to_bits(&ASM.to_be_bytes()));
            bits.extend(bytes_to_bits(&payload));
        }
        {
            let mut buf = w.write_buf().unwrap();
            buf.fill_from_slice(&bits);
            buf.produce(bits.len(), &[]);
        }
        w.stop_writer();
        loop {
            if block.work().unwrap() == BlockRet::EOF {
                break;
            }
        }
        assert_eq!(block.frame_count(), 3);
        let (r, _) = out.read_buf().unwrap();
        assert_eq!(r.len(), 3 * CADU_SIZE);
        assert_eq!(&r.slice()[0..4], &ASM.to_be_bytes());
    }
}
