//! Streams connecting blocks.
//!
//! A block has zero or more input streams and reads from them; it writes
//! to zero or more output streams. `Stream<T>` is the typed, in-process
//! channel; [`RingBuffer`] is the untyped byte channel used when the
//! pipeline orchestrator fuses two file-oriented modules into a streaming
//! pair (§4.5).
use std::sync::Arc;

use crate::circular_buffer::{Buffer, BufferReader, BufferWriter};
use crate::error::Result;

/// Default stream capacity, in samples. Tunable per stream.
pub const DEFAULT_STREAM_CAPACITY: usize = 8_192;

/// Position of a [`Tag`] within the window it was produced in.
pub type TagPos = usize;

/// The value carried by a [`Tag`].
#[derive(Clone, Debug, PartialEq, PartialOrd)]
pub enum TagValue {
    /// String value.
    String(String),
    /// Float value.
    Float(crate::Float),
    /// Boolean value.
    Bool(bool),
    /// Unsigned 64-bit value.
    U64(u64),
    /// Signed 64-bit value.
    I64(i64),
}

impl std::fmt::Display for TagValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TagValue::String(s) => write!(f, "String:{s}"),
            TagValue::Float(s) => write!(f, "Float:{s}"),
            TagValue::Bool(s) => write!(f, "Bool:{s}"),
            TagValue::U64(s) => write!(f, "U64:{s}"),
            TagValue::I64(s) => write!(f, "I64:{s}"),
        }
    }
}

/// Out-of-band metadata attached to a sample position in a stream.
///
/// Used in this crate to carry diagnostic/detection metrics downstream
/// without a second side channel: ASM/SOF lock positions, detected
/// MODCOD, frame boundaries.
#[derive(Debug, Clone, PartialEq, PartialOrd)]
pub struct Tag {
    pos: TagPos,
    key: String,
    val: TagValue,
}

impl Tag {
    /// Create a new tag at `pos` (relative to the window it's attached to).
    pub fn new<T: Into<String>>(pos: TagPos, key: T, val: TagValue) -> Self {
        Self {
            pos,
            key: key.into(),
            val,
        }
    }

    /// Position within the current window.
    pub fn pos(&self) -> TagPos {
        self.pos
    }

    /// Set the position within the current window.
    pub fn set_pos(&mut self, pos: TagPos) {
        self.pos = pos;
    }

    /// The tag's key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The tag's value.
    pub fn val(&self) -> &TagValue {
        &self.val
    }
}

/// The read side of a stream.
pub struct ReadStream<T> {
    circ: Arc<Buffer<T>>,
}

impl<T> Clone for ReadStream<T> {
    fn clone(&self) -> Self {
        Self {
            circ: self.circ.clone(),
        }
    }
}

impl<T> ReadStream<T> {
    /// True if there is, and will never be, anything more to read.
    pub fn eof(&self) -> bool {
        self.circ.writer_closed() && self.circ.is_empty()
    }

    /// Tell the writer that this side is no longer interested: blocked or
    /// future writes are dropped rather than applied.
    pub fn stop_reader(&self) {
        self.circ.stop_reader();
    }

    /// Block until `need` samples are available, or they will never come.
    /// Returns true if `need` will never be satisfied.
    pub fn wait_for_read(&self, need: usize) -> bool {
        self.circ.wait_for_read(need) < need && self.circ.writer_closed()
    }
}

impl<T: Copy + Default> ReadStream<T> {
    /// Borrow the currently available items. Call `consume()` on the
    /// returned [`BufferReader`] to release what was processed.
    pub fn read_buf(&self) -> Result<(BufferReader<T>, Vec<Tag>)> {
        self.circ.clone().read_buf()
    }
}

/// Maps a block's output field type to the type returned to the caller of
/// `new()` for it. The derive macro in `rustradio_macros` needs this to
/// spell the return type of the generated constructor without knowing the
/// concrete stream type in advance.
pub trait StreamReadSide {
    /// The type handed back to the block's creator for this output.
    type ReadSide;
}

impl<T> StreamReadSide for WriteStream<T> {
    type ReadSide = ReadStream<T>;
}

/// The write side of a stream.
pub struct WriteStream<T> {
    circ: Arc<Buffer<T>>,
}

impl<T> Clone for WriteStream<T> {
    fn clone(&self) -> Self {
        Self {
            circ: self.circ.clone(),
        }
    }
}

impl<T> WriteStream<T> {
    /// Create a new stream pair with the default capacity.
    pub fn new() -> (WriteStream<T>, ReadStream<T>) {
        Self::with_capacity(DEFAULT_STREAM_CAPACITY)
    }

    /// Create a new stream pair with an explicit capacity, in samples.
    pub fn with_capacity(capacity: usize) -> (WriteStream<T>, ReadStream<T>) {
        let circ = Arc::new(Buffer::new(capacity).expect("capacity > 0"));
        (
            WriteStream { circ: circ.clone() },
            ReadStream { circ },
        )
    }

    /// Tell the reader that no more data is coming. Future reads observe
    /// EOF once the buffer drains.
    pub fn stop_writer(&self) {
        self.circ.stop_writer();
    }

    /// True if the reader has disconnected.
    pub fn reader_closed(&self) -> bool {
        self.circ.reader_closed()
    }

    /// Block until `need` slots are free to write, or they never will be.
    pub fn wait_for_write(&self, need: usize) -> bool {
        self.circ.wait_for_write(need) < need && self.circ.reader_closed()
    }
}

impl<T> Default for WriteStream<T> {
    fn default() -> Self {
        Self::new().0
    }
}

impl<T: Copy + Default> WriteStream<T> {
    /// Borrow the writable window. Call `produce(n, tags)` on the returned
    /// [`BufferWriter`] to publish what was written.
    pub fn write_buf(&self) -> Result<BufferWriter<T>> {
        self.circ.clone().write_buf()
    }

    /// Free space currently available to write.
    pub fn free(&self) -> usize {
        self.circ.free()
    }
}

/// Create a new stream pair for `T`, with the default capacity.
pub fn new_stream<T>() -> (WriteStream<T>, ReadStream<T>) {
    WriteStream::new()
}

/// A bounded, blocking, byte-oriented ring buffer.
///
/// Used between two fused pipeline modules (§4.5) instead of a pair of
/// typed `Stream`s, since the two modules on either side may not agree on
/// a sample type — one produces bytes, the other consumes bytes.
pub struct RingBuffer {
    buf: Arc<Buffer<u8>>,
}

impl RingBuffer {
    /// Create a new byte ring buffer with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Arc::new(Buffer::new(capacity).expect("capacity > 0")),
        }
    }

    /// Split into a writer and reader handle sharing the same backing
    /// buffer.
    pub fn split(self) -> (RingBufferWriter, RingBufferReader) {
        (
            RingBufferWriter {
                buf: self.buf.clone(),
            },
            RingBufferReader { buf: self.buf },
        )
    }
}

/// Write half of a [`RingBuffer`].
#[derive(Clone)]
pub struct RingBufferWriter {
    buf: Arc<Buffer<u8>>,
}

impl RingBufferWriter {
    /// Blocking write of `data`, in chunks bounded by the ring's capacity.
    pub fn write_all(&self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            if self.buf.reader_closed() {
                return Err(crate::error::Error::stream("ring buffer reader closed"));
            }
            let free = self.buf.wait_for_write(1);
            if free == 0 {
                continue;
            }
            let n = free.min(data.len());
            let mut w = self.buf.clone().write_buf()?;
            w.fill_from_slice(&data[..n]);
            w.produce(n, &[]);
            data = &data[n..];
        }
        Ok(())
    }

    /// Close the writer side.
    pub fn close(&self) {
        self.buf.stop_writer();
    }
}

/// Read half of a [`RingBuffer`].
#[derive(Clone)]
pub struct RingBufferReader {
    buf: Arc<Buffer<u8>>,
}

impl RingBufferReader {
    /// Read up to `max` bytes, blocking until at least one byte is
    /// available or the writer has closed and drained. Returns an empty
    /// vector at EOF.
    pub fn read_some(&self, max: usize) -> Result<Vec<u8>> {
        loop {
            let have = self.buf.wait_for_read(1);
            if have == 0 {
                if self.buf.writer_closed() {
                    return Ok(Vec::new());
                }
                continue;
            }
            let (r, _) = self.buf.clone().read_buf()?;
            let n = have.min(max);
            let out = r.slice()[..n].to_vec();
            r.consume(n);
            return Ok(out);
        }
    }

    /// Close the reader side.
    pub fn close(&self) {
        self.buf.stop_reader();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_preserved() {
        let (w, r) = WriteStream::<u8>::with_capacity(16);
        let mut buf = w.write_buf().unwrap();
        buf.fill_from_slice(&[1, 2, 3, 4, 5]);
        buf.produce(5, &[]);
        let (rb, _) = r.read_buf().unwrap();
        assert_eq!(rb.slice(), &[1, 2, 3, 4, 5]);
        rb.consume(5);
    }

    #[test]
    fn eof_after_writer_closed_and_drained() {
        let (w, r) = WriteStream::<u8>::with_capacity(4);
        assert!(!r.eof());
        w.stop_writer();
        assert!(r.eof(), "empty + writer closed => eof");
    }

    #[test]
    fn ring_buffer_roundtrip() {
        let (w, r) = RingBuffer::new(64).split();
        w.write_all(b"hello world").unwrap();
        w.close();
        let mut got = Vec::new();
        loop {
            let chunk = r.read_some(1024).unwrap();
            if chunk.is_empty() {
                break;
            }
            got.extend(chunk);
        }
        assert_eq!(got, b"hello world");
    }
}
