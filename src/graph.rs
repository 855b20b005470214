//! Thread-per-block scheduler.
//!
//! Each block added to a [`Graph`] runs on its own OS thread, calling
//! `work()` in a loop until it reports [`crate::block::BlockRet::EOF`] or
//! the graph is cancelled. A shared [`CancellationToken`] lets any thread
//! (or the process's Ctrl-C handler) ask every block to wind down early.
//! `Pending`/`Noop`/`OutputFull` results back the thread off with a short
//! sleep rather than busy-spinning; `Ok` retries immediately, since more
//! work is likely still available.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::block::{Block, BlockRet};

/// Shared flag blocks can poll to notice a graph-wide shutdown request.
#[derive(Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a fresh, not-yet-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// True once [`Self::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Per-block timing, collected after the graph finishes running.
#[derive(Debug, Clone)]
pub struct BlockStats {
    /// The block's type name, from [`crate::block::BlockName`].
    pub name: String,
    /// Wall-clock time this block's thread spent inside `work()`.
    pub busy: Duration,
    /// Number of `work()` calls made.
    pub calls: u64,
}

/// A dataflow graph: an unordered bag of blocks, each run to completion on
/// its own thread.
///
/// Unlike a single-threaded scheduler that must round-robin blocks itself,
/// correctness here doesn't depend on call order between blocks: each
/// block blocks on its own input/output streams, and the bounded stream
/// capacity (§4.1) provides backpressure between producer and consumer
/// threads.
pub struct Graph {
    blocks: Vec<(String, Box<dyn Block>)>,
    cancel: CancellationToken,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// A token that can be used to cancel this graph from outside (e.g. a
    /// Ctrl-C handler installed by the caller).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Add a block to the graph. Blocks are connected to each other before
    /// being added, by sharing [`crate::stream::ReadStream`]/
    /// [`crate::stream::WriteStream`] handles constructed by each block's
    /// own `new()`.
    pub fn add(&mut self, block: impl Block + 'static) {
        let name = block.block_name().to_string();
        self.blocks.push((name, Box::new(block)));
    }

    /// Run every block to completion, one OS thread each, blocking until
    /// all of them report EOF (or the graph is cancelled).
    ///
    /// A block's thread polls `work()` repeatedly: on `Ok` it retries
    /// immediately since more input or output room may already be
    /// available; on `Pending`/`Noop`/`OutputFull` it backs off briefly to
    /// avoid busy-spinning a thread that can't currently make progress;
    /// on `EOF` it stops. This two-outcome split (retry-now vs. back-off)
    /// is what the backing scheduler otherwise does with an exit-monitor
    /// thread watching every block at once: here, each block is its own
    /// monitor, so there's nothing cross-block to coordinate beyond the
    /// shared cancellation flag.
    pub fn run(self) -> Vec<BlockStats> {
        let cancel = self.cancel;
        let mut handles = Vec::with_capacity(self.blocks.len());
        for (name, mut block) in self.blocks {
            let cancel = cancel.clone();
            let handle = std::thread::Builder::new()
                .name(name.clone())
                .spawn(move || {
                    let started = Instant::now();
                    let mut busy = Duration::ZERO;
                    let mut calls = 0u64;
                    let mut backoff = Duration::from_micros(100);
                    const MAX_BACKOFF: Duration = Duration::from_millis(20);
                    loop {
                        if cancel.is_cancelled() {
                            debug!("{name}: cancelled");
                            break;
                        }
                        let t0 = Instant::now();
                        let ret = block.work();
                        busy += t0.elapsed();
                        calls += 1;
                        match ret {
                            Ok(BlockRet::Ok) => {
                                backoff = Duration::from_micros(100);
                            }
                            Ok(BlockRet::EOF) => {
                                debug!("{name}: EOF after {calls} calls");
                                break;
                            }
                            Ok(BlockRet::Pending | BlockRet::Noop | BlockRet::OutputFull) => {
                                std::thread::sleep(backoff);
                                backoff = (backoff * 2).min(MAX_BACKOFF);
                            }
                            Err(e) => {
                                warn!("{name}: work() failed: {e}");
                                break;
                            }
                        }
                    }
                    info!(
                        "{name}: done in {:?} ({busy:?} busy, {calls} calls)",
                        started.elapsed()
                    );
                    BlockStats { name, busy, calls }
                })
                .expect("failed to spawn block thread");
            handles.push(handle);
        }
        handles
            .into_iter()
            .map(|h| h.join().expect("block thread panicked"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockEOF, BlockName};
    use crate::error::Error;
    use crate::stream::{ReadStream, WriteStream};

    struct CountingSource {
        remaining: usize,
        dst: WriteStream<u8>,
    }

    impl BlockName for CountingSource {
        fn block_name(&self) -> &str {
            "CountingSource"
        }
    }
    impl BlockEOF for CountingSource {}
    impl Block for CountingSource {
        fn work(&mut self) -> Result<BlockRet, Error> {
            if self.remaining == 0 {
                self.dst.stop_writer();
                return Ok(BlockRet::EOF);
            }
            let mut w = self.dst.write_buf()?;
            if w.is_empty() {
                return Ok(BlockRet::OutputFull);
            }
            let n = w.len().min(self.remaining);
            for slot in w.slice()[..n].iter_mut() {
                *slot = 1;
            }
            w.produce(n, &[]);
            self.remaining -= n;
            Ok(BlockRet::Ok)
        }
    }

    struct CountingSink {
        src: ReadStream<u8>,
        total: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    }
    impl BlockName for CountingSink {
        fn block_name(&self) -> &str {
            "CountingSink"
        }
    }
    impl BlockEOF for CountingSink {}
    impl Block for CountingSink {
        fn work(&mut self) -> Result<BlockRet, Error> {
            if self.src.eof() {
                return Ok(BlockRet::EOF);
            }
            if self.src.wait_for_read(1) {
                return Ok(BlockRet::EOF);
            }
            let (r, _) = self.src.read_buf()?;
            let n = r.len();
            if n == 0 {
                return Ok(BlockRet::Noop);
            }
            self.total
                .fetch_add(n, std::sync::atomic::Ordering::SeqCst);
            r.consume(n);
            Ok(BlockRet::Ok)
        }
    }

    #[test]
    fn graph_runs_source_to_sink_to_completion() {
        let (dst, src) = WriteStream::<u8>::with_capacity(64);
        let total = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut g = Graph::new();
        g.add(CountingSource {
            remaining: 1000,
            dst,
        });
        g.add(CountingSink {
            src,
            total: total.clone(),
        });
        let stats = g.run();
        assert_eq!(stats.len(), 2);
        assert_eq!(total.load(std::sync::atomic::Ordering::SeqCst), 1000);
    }

    #[test]
    fn cancellation_stops_a_would_be_infinite_source() {
        struct Infinite {
            dst: WriteStream<u8>,
        }
        impl BlockName for Infinite {
            fn block_name(&self) -> &str {
                "Infinite"
            }
        }
        impl BlockEOF for Infinite {}
        impl Block for Infinite {
            fn work(&mut self) -> Result<BlockRet, Error> {
                let mut w = self.dst.write_buf()?;
                if w.is_empty() {
                    return Ok(BlockRet::OutputFull);
                }
                let n = w.len();
                w.produce(n, &[]);
                Ok(BlockRet::Ok)
            }
        }
        let (dst, src) = WriteStream::<u8>::with_capacity(64);
        let mut g = Graph::new();
        g.add(Infinite { dst });
        let token = g.cancellation_token();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            token.cancel();
        });
        let stats = g.run();
        assert_eq!(stats.len(), 1);
        src.stop_reader();
    }
}
