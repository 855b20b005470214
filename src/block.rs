//! Block framework.
//!
//! Blocks are the nodes of the dataflow graph (§4.1). Each block owns its
//! input and output stream handles and exposes a `work()` that the
//! scheduler calls repeatedly from a dedicated worker thread until it
//! reports [`BlockRet::EOF`] or the graph is cancelled.
use crate::error::Error;

/// Result of a single `work()` invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockRet {
    /// At least one sample was produced or consumed.
    Ok,

    /// Nothing happened this call, but a background process (e.g. a
    /// batched decoder still accumulating a SIMD batch) may yet produce
    /// output without new input.
    Pending,

    /// Nothing happened: not enough input to do anything useful yet.
    Noop,

    /// All downstream outputs are currently full; try again later.
    OutputFull,

    /// This block will never produce anything more. Once every block in
    /// the graph reports this (in two consecutive scheduler passes, so a
    /// block that is mid-flight isn't mistaken for quiescent), the graph
    /// is done.
    EOF,
}

/// A block's human-readable type name, for logging/metrics.
pub trait BlockName {
    /// Name of the block type (not of the particular instance).
    fn block_name(&self) -> &str;
}

/// EOF propagation hook, generated by the derive macro for most blocks:
/// when every input stream is at EOF, the block sets EOF on (closes) its
/// own outputs.
pub trait BlockEOF {
    /// Return whether the block has reached end of stream, propagating
    /// closure to outputs as a side effect.
    fn eof(&mut self) -> bool {
        false
    }
}

/// The trait every block in the graph implements.
pub trait Block: BlockName + BlockEOF + Send {
    /// Do one unit of work: read available input, process it, write
    /// whatever output resulted.
    fn work(&mut self) -> Result<BlockRet, Error>;
}
