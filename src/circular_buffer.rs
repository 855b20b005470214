//! Bounded, blocking, typed ring buffer backing [`crate::stream::Stream`].
//!
//! The upstream framework this crate is modeled on implements its ring
//! buffer with a double `mmap` of the same backing file, so that a read or
//! write window is always contiguous even across the wraparound point,
//! without ever copying. That trick needs `unsafe`. This crate instead
//! keeps the same external contract (`write_buf`/`produce`,
//! `read_buf`/`consume`, blocking on full/empty, symmetric half-close) on
//! top of a `Mutex<VecDeque<T>>` plus a `Condvar`, which is exactly how
//! this crate's own non-`Copy` message streams already work (see
//! `NCReadStream`/`NCWriteStream` in the teacher crate this was grown
//! from) generalized to the batched, `Copy`-typed scalar/complex case.
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::error::{Error, Result};
use crate::stream::Tag;

static NEXT_BUFFER_ID: AtomicUsize = AtomicUsize::new(1);

struct Inner<T> {
    data: VecDeque<T>,
    tags: Vec<Tag>,
    writer_closed: bool,
    reader_closed: bool,
}

/// Shared, bounded, blocking ring buffer of `T`.
pub struct Buffer<T> {
    id: usize,
    capacity: usize,
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> Buffer<T> {
    /// Create a new buffer with room for `capacity` items.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::stream("buffer capacity must be > 0"));
        }
        Ok(Self {
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            capacity,
            inner: Mutex::new(Inner {
                data: VecDeque::with_capacity(capacity),
                tags: Vec::new(),
                writer_closed: false,
                reader_closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        })
    }

    /// Identity shared between a stream's read and write handles.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Total buffer capacity, in samples.
    pub fn total_size(&self) -> usize {
        self.capacity
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().data.is_empty()
    }

    /// Free space currently available to a writer.
    pub fn free(&self) -> usize {
        let g = self.inner.lock().unwrap();
        self.capacity - g.data.len()
    }

    /// Block (up to a coarse quantum) until at least `need` items are
    /// available to read, or the writer has closed. Returns the number of
    /// items actually available when it returns.
    pub fn wait_for_read(&self, need: usize) -> usize {
        let g = self.inner.lock().unwrap();
        let (g, _) = self
            .not_empty
            .wait_timeout_while(g, std::time::Duration::from_millis(50), |s| {
                s.data.len() < need && !s.writer_closed
            })
            .unwrap();
        g.data.len()
    }

    /// Block (up to a coarse quantum) until at least `need` slots are free
    /// to write, or the reader has closed.
    pub fn wait_for_write(&self, need: usize) -> usize {
        let g = self.inner.lock().unwrap();
        let (g, _) = self
            .not_full
            .wait_timeout_while(g, std::time::Duration::from_millis(50), |s| {
                self.capacity - s.data.len() < need && !s.reader_closed
            })
            .unwrap();
        self.capacity - g.data.len()
    }

    /// Mark the writer side closed: future reads drain what's left, then
    /// report EOF.
    pub fn stop_writer(&self) {
        let mut g = self.inner.lock().unwrap();
        g.writer_closed = true;
        self.not_empty.notify_all();
    }

    /// Mark the reader side closed: a blocked/future writer stops waiting
    /// and its writes are dropped.
    pub fn stop_reader(&self) {
        let mut g = self.inner.lock().unwrap();
        g.reader_closed = true;
        self.not_full.notify_all();
    }

    pub(crate) fn writer_closed(&self) -> bool {
        self.inner.lock().unwrap().writer_closed
    }

    pub(crate) fn reader_closed(&self) -> bool {
        self.inner.lock().unwrap().reader_closed
    }
}

impl<T: Copy + Default> Buffer<T> {
    /// Borrow up to `free()` staging slots to write into, followed by a
    /// call to [`BufferWriter::produce`].
    pub fn write_buf(self: Arc<Self>) -> Result<BufferWriter<T>> {
        let free = {
            let g = self.inner.lock().unwrap();
            self.capacity - g.data.len()
        };
        Ok(BufferWriter {
            buf: self,
            staging: vec![T::default(); free],
        })
    }

    /// Borrow the currently available items to read, followed by a call to
    /// [`BufferReader::consume`].
    pub fn read_buf(self: Arc<Self>) -> Result<(BufferReader<T>, Vec<Tag>)> {
        let (snapshot, tags) = {
            let mut g = self.inner.lock().unwrap();
            g.data.make_contiguous();
            let snapshot: Vec<T> = g.data.iter().copied().collect();
            (snapshot, g.tags.clone())
        };
        Ok((
            BufferReader {
                buf: self,
                snapshot,
            },
            tags,
        ))
    }
}

/// A writable window into a [`Buffer`]. Fill it, then call [`Self::produce`]
/// to publish the first `n` items (and any tags at those positions).
pub struct BufferWriter<T> {
    buf: Arc<Buffer<T>>,
    staging: Vec<T>,
}

impl<T: Copy> BufferWriter<T> {
    /// Number of writable slots available.
    pub fn len(&self) -> usize {
        self.staging.len()
    }

    /// True if there's no room to write anything.
    pub fn is_empty(&self) -> bool {
        self.staging.is_empty()
    }

    /// Mutable view of the writable slots.
    pub fn slice(&mut self) -> &mut [T] {
        &mut self.staging
    }

    /// Copy `data` into the start of the writable window.
    pub fn fill_from_slice(&mut self, data: &[T]) {
        self.staging[..data.len()].copy_from_slice(data);
    }

    /// Fill the writable window from an iterator, up to its capacity.
    pub fn fill_from_iter(&mut self, it: impl IntoIterator<Item = T>) {
        for (place, val) in self.staging.iter_mut().zip(it) {
            *place = val;
        }
    }

    /// Publish the first `n` items written into the window, tagging them
    /// with `tags` (tag positions are relative to this call's window).
    pub fn produce(self, n: usize, tags: &[Tag]) {
        assert!(n <= self.staging.len(), "produce({n}) exceeds window");
        let mut g = self.buf.inner.lock().unwrap();
        if g.reader_closed {
            return;
        }
        let base = g.data.len();
        g.data.extend(self.staging[..n].iter().copied());
        for t in tags {
            let mut t = t.clone();
            t.set_pos(t.pos() + base);
            g.tags.push(t);
        }
        drop(g);
        self.buf.not_empty.notify_all();
    }
}

/// A readable snapshot of a [`Buffer`]. Call [`Self::consume`] to release
/// the items actually processed.
pub struct BufferReader<T> {
    buf: Arc<Buffer<T>>,
    snapshot: Vec<T>,
}

impl<T: Copy> BufferReader<T> {
    /// Number of items available to read.
    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    /// True if nothing is available.
    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    /// The readable slice.
    pub fn slice(&self) -> &[T] {
        &self.snapshot
    }

    /// Iterate the readable items.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.snapshot.iter()
    }

    /// Release the first `n` items: they will not be seen again by any
    /// future `read_buf`.
    pub fn consume(self, n: usize) {
        assert!(n <= self.snapshot.len(), "consume({n}) exceeds window");
        let mut g = self.buf.inner.lock().unwrap();
        for _ in 0..n {
            g.data.pop_front();
        }
        g.tags.retain_mut(|t| {
            if t.pos() < n {
                false
            } else {
                t.set_pos(t.pos() - n);
                true
            }
        });
        drop(g);
        self.buf.not_full.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_roundtrip() {
        let buf = Arc::new(Buffer::<u8>::new(8).unwrap());
        {
            let mut w = buf.clone().write_buf().unwrap();
            assert_eq!(w.len(), 8);
            w.fill_from_slice(&[1, 2, 3]);
            w.produce(3, &[]);
        }
        let (r, tags) = buf.clone().read_buf().unwrap();
        assert!(tags.is_empty());
        assert_eq!(r.slice(), &[1, 2, 3]);
        r.consume(2);
        let (r, _) = buf.clone().read_buf().unwrap();
        assert_eq!(r.slice(), &[3]);
        r.consume(1);
        assert!(buf.is_empty());
    }

    #[test]
    fn produce_past_window_panics() {
        let buf = Arc::new(Buffer::<u8>::new(4).unwrap());
        let w = buf.write_buf().unwrap();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            w.produce(99, &[]);
        }));
        assert!(res.is_err());
    }

    #[test]
    fn stop_writer_unblocks_reader() {
        let buf = Arc::new(Buffer::<u8>::new(4).unwrap());
        buf.stop_writer();
        assert_eq!(buf.wait_for_read(1), 0);
        assert!(buf.writer_closed());
    }

    #[test]
    fn tags_shift_with_consume() {
        let buf = Arc::new(Buffer::<u8>::new(8).unwrap());
        {
            let mut w = buf.clone().write_buf().unwrap();
            w.fill_from_slice(&[1, 2, 3, 4]);
            w.produce(
                4,
                &[Tag::new(2, "mark", crate::stream::TagValue::Bool(true))],
            );
        }
        let (r, tags) = buf.clone().read_buf().unwrap();
        assert_eq!(tags[0].pos(), 2);
        r.consume(2);
        let (r, tags) = buf.clone().read_buf().unwrap();
        assert_eq!(tags[0].pos(), 0, "tag position shifts with consume()");
        r.consume(2);
    }
}
