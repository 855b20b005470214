//! The CADU sync state machine itself (§4.4), independent of the stream
//! framework: a pure function of a bit sequence in, CADU bytes out, so it
//! can be driven directly by tests as well as by [`super::block::CaduDeframerBlock`].
use crate::stream::{Tag, TagValue};

/// CCSDS attached sync marker.
pub const ASM: u32 = 0x1ACF_FC1D;
/// Bitwise complement of [`ASM`]; seeing this instead means the bit
/// stream is polarity-inverted for the rest of the run.
pub const ASM_INV: u32 = 0xE530_03E2;
/// Total CADU size in bytes, ASM included.
pub const CADU_SIZE: usize = 224;
/// Bits in a CADU's transfer-frame body, i.e. everything after the ASM.
pub const CADU_DATA_BITS: usize = (CADU_SIZE - 4) * 8;

/// Deframer state, observable for diagnostics (§4.4 "public observables").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeframerState {
    /// Shifting bits through a 32-bit register looking for the ASM.
    Search,
    /// ASM found; recovering the transfer-frame body and re-validating
    /// the ASM at each subsequent frame boundary.
    Locked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Search,
    Body,
    AsmCheck,
}

/// Bit-level CADU sync state machine (§4.4).
///
/// Consumes one-bit-per-byte (`0`/`1`) soft-or-hard-decision input via
/// repeated [`Self::work`] calls and emits complete, ASM-first 224-byte
/// CADUs in arrival order.
pub struct CaduDeframer {
    phase: Phase,
    shift: u32,
    bit_inversion: bool,
    body: Vec<u8>,
    asm_bits: Vec<u8>,
    /// Bit errors tolerated in a re-validated ASM before it's counted as
    /// a miss (`sep_errors`).
    sep_errors: u32,
    /// Consecutive ASM misses tolerated before dropping back to SEARCH.
    max_consecutive_miss: u32,
    consecutive_miss: u32,
    frame_count: u64,
}

impl CaduDeframer {
    /// `sep_errors` bounds how many bit errors a re-validated ASM may
    /// have and still count as a hit; `max_consecutive_miss` bounds how
    /// many consecutive misses are tolerated before losing lock.
    pub fn new(sep_errors: u32, max_consecutive_miss: u32) -> Self {
        Self {
            phase: Phase::Search,
            shift: 0,
            bit_inversion: false,
            body: Vec::with_capacity(CADU_DATA_BITS),
            asm_bits: Vec::with_capacity(32),
            sep_errors,
            max_consecutive_miss,
            consecutive_miss: 0,
            frame_count: 0,
        }
    }

    /// High-level observable state.
    pub fn state(&self) -> DeframerState {
        match self.phase {
            Phase::Search => DeframerState::Search,
            Phase::Body | Phase::AsmCheck => DeframerState::Locked,
        }
    }

    /// Whether the bit stream has been found to be polarity-inverted
    /// (the complemented ASM was seen instead of the ASM proper).
    pub fn bit_inversion(&self) -> bool {
        self.bit_inversion
    }

    /// Count of CADUs emitted so far this run.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn enter_locked(&mut self) {
        self.phase = Phase::Body;
        self.body.clear();
        self.consecutive_miss = 0;
    }

    fn reset_to_search(&mut self) {
        self.phase = Phase::Search;
        self.shift = 0;
        self.body.clear();
        self.asm_bits.clear();
    }

    /// Run the state machine over `bits` (each `0`/`1`), returning every
    /// CADU completed during this call, in arrival order.
    pub fn work(&mut self, bits: &[u8]) -> Vec<[u8; CADU_SIZE]> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < bits.len() {
            match self.phase {
                Phase::Search => {
                    self.shift = (self.shift << 1) | (bits[i] as u32 & 1);
                    i += 1;
                    if self.shift == ASM {
                        self.bit_inversion = false;
                        self.enter_locked();
                    } else if self.shift == ASM_INV {
                        self.bit_inversion = true;
                        self.enter_locked();
                    }
                }
                Phase::Body => {
                    let need = CADU_DATA_BITS - self.body.len();
                    let take = need.min(bits.len() - i);
                    self.body.extend_from_slice(&bits[i..i + take]);
                    i += take;
                    if self.body.len() == CADU_DATA_BITS {
                        self.phase = Phase::AsmCheck;
                        self.asm_bits.clear();
                    }
                }
                Phase::AsmCheck => {
                    let need = 32 - self.asm_bits.len();
                    let take = need.min(bits.len() - i);
                    self.asm_bits.extend_from_slice(&bits[i..i + take]);
                    i += take;
                    if self.asm_bits.len() == 32 {
                        let errors = asm_bit_errors(&self.asm_bits, self.bit_inversion);
                        if errors <= self.sep_errors {
                            self.consecutive_miss = 0;
                        } else {
                            self.consecutive_miss += 1;
                        }
                        out.push(self.emit_cadu());
                        self.frame_count += 1;
                        if self.consecutive_miss > self.max_consecutive_miss {
                            self.reset_to_search();
                        } else {
                            // Re-use the just-validated ASM bits as the
                            // start of the next frame's body window.
                            self.phase = Phase::Body;
                            self.body.clear();
                        }
                    }
                }
            }
        }
        out
    }

    fn emit_cadu(&self) -> [u8; CADU_SIZE] {
        let mut out = [0u8; CADU_SIZE];
        out[0..4].copy_from_slice(&ASM.to_be_bytes());
        pack_bits(&self.body, self.bit_inversion, &mut out[4..]);
        out
    }
}

/// Hamming distance between `bits` and the expected ASM pattern (or its
/// complement, accounting for `inverted`).
fn asm_bit_errors(bits: &[u8], inverted: bool) -> u32 {
    let want = if inverted { ASM_INV } else { ASM };
    let mut errors = 0u32;
    for (i, &b) in bits.iter().enumerate() {
        let expect = (want >> (31 - i)) & 1;
        if b as u32 != expect {
            errors += 1;
        }
    }
    errors
}

/// Pack MSB-first bits into bytes, inverting each bit first if `invert`.
fn pack_bits(bits: &[u8], invert: bool, out: &mut [u8]) {
    for (byte_idx, chunk) in bits.chunks(8).enumerate() {
        let mut byte = 0u8;
        for (bit_idx, &b) in chunk.iter().enumerate() {
            let v = if invert { 1 - (b & 1) } else { b & 1 };
            byte |= v << (7 - bit_idx);
        }
        out[byte_idx] = byte;
    }
}

/// Unpack bytes into MSB-first bits.
pub fn bytes_to_bits(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() * 8);
    for &byte in bytes {
        for i in (0..8).rev() {
            out.push((byte >> i) & 1);
        }
    }
    out
}

/// Build a [`Tag`] marking a detected frame boundary at `pos`, carried
/// downstream on the deframer's output stream for diagnostic taps.
pub fn frame_boundary_tag(pos: usize) -> Tag {
    Tag::new(pos, "cadu_frame_boundary", TagValue::Bool(true))
}
