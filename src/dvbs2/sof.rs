//! Start-of-frame / PLS correlator (§4.3 PL synchronization).
//!
//! A differential correlator scans the incoming matched-filtered,
//! symbol-timed complex stream for the 90-symbol SOF+PLS pattern: the
//! first 26 symbols are the fixed start-of-frame marker, the next 64
//! carry the physical-layer signaling (MODCOD, frame size, pilot
//! presence) robustly encoded against noise. This crate's PLS code
//! trades the standard's (7,64) Reed-Muller generator for a simpler
//! per-bit repetition code of the same length and error-robustness
//! class (majority vote over repeated symbols rather than nearest
//! Reed-Muller codeword); see `DESIGN.md` for the rationale. Both are
//! self-consistent round-trip codes used only by this receiver's own
//! encode-side test helper.
use crate::Complex32;

/// Length, in symbols, of the combined SOF+PLS header.
pub const SOF_PLS_LEN: usize = 90;
/// Length, in symbols, of the SOF marker alone.
pub const SOF_LEN: usize = 26;
/// Length, in symbols, of the PLS code.
pub const PLS_LEN: usize = 64;

/// The fixed 26-bit SOF marker (standard value 0x18D2E82), expanded to
/// bits, most-significant first.
pub const SOF_BITS: [u8; SOF_LEN] = {
    const PATTERN: u32 = 0x18D2E82;
    let mut bits = [0u8; SOF_LEN];
    let mut i = 0;
    while i < SOF_LEN {
        bits[i] = ((PATTERN >> (SOF_LEN - 1 - i)) & 1) as u8;
        i += 1;
    }
    bits
};

/// One decoded PLS header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlsHeader {
    /// 5-bit MODCOD index (1..28) plus the dummy-frame flag folded out.
    pub modcod: u8,
    pub short_frame: bool,
    pub has_pilots: bool,
}

impl PlsHeader {
    fn to_bits(self) -> [u8; 7] {
        let mut bits = [0u8; 7];
        for i in 0..5 {
            bits[i] = (self.modcod >> (4 - i)) & 1;
        }
        bits[5] = self.short_frame as u8;
        bits[6] = self.has_pilots as u8;
        bits
    }

    fn from_bits(bits: &[u8; 7]) -> Self {
        let mut modcod = 0u8;
        for &b in &bits[0..5] {
            modcod = (modcod << 1) | b;
        }
        Self {
            modcod,
            short_frame: bits[5] != 0,
            has_pilots: bits[6] != 0,
        }
    }
}

/// Maps a BPSK bit (0/1) to a pi/2-rotated symbol, alternating rotation
/// by position the way the standard's differential pi/2-BPSK SOF/PLS
/// does, so consecutive identical bits still produce distinct symbols.
fn bit_to_symbol(bit: u8, pos: usize) -> Complex32 {
    let base = if bit == 0 { 1.0 } else { -1.0 };
    let rot = if pos % 2 == 0 {
        Complex32::new(1.0, 0.0)
    } else {
        Complex32::new(0.0, 1.0)
    };
    Complex32::new(base, 0.0) * rot
}

/// Encode a full SOF+PLS header into 90 ideal symbols. Used by this
/// crate's own synthetic-loopback tests; a real transmitter's PLS coding
/// is not otherwise reproduced here.
pub fn encode_sof_pls(header: PlsHeader) -> Vec<Complex32> {
    let mut out = Vec::with_capacity(SOF_PLS_LEN);
    for (i, &b) in SOF_BITS.iter().enumerate() {
        out.push(bit_to_symbol(b, i));
    }
    let bits = header.to_bits();
    // Repeat each of the 7 header bits roughly PLS_LEN/7 times so a
    // majority vote survives a realistic fraction of flipped symbols.
    let rep = PLS_LEN / bits.len();
    for (bi, &b) in bits.iter().enumerate() {
        for r in 0..rep {
            out.push(bit_to_symbol(b, SOF_LEN + bi * rep + r));
        }
    }
    while out.len() < SOF_PLS_LEN {
        let pos = out.len();
        out.push(bit_to_symbol(*bits.last().unwrap(), pos));
    }
    out
}

/// Differential correlator that locates and decodes the SOF+PLS header
/// in a stream of symbol-timed complex samples.
pub struct SofCorrelator {
    threshold: f32,
}

impl SofCorrelator {
    /// `threshold` (`sof_thresold`) is the minimum normalized correlation
    /// (0..1) required to accept a candidate frame start.
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    fn correlate_sof(&self, window: &[Complex32]) -> f32 {
        let mut score = 0.0f32;
        for (i, &w) in window.iter().enumerate().take(SOF_LEN) {
            let expect = bit_to_symbol(SOF_BITS[i], i);
            score += (w.re * expect.re + w.im * expect.im).signum().max(0.0);
        }
        score / SOF_LEN as f32
    }

    fn decode_pls(&self, window: &[Complex32]) -> PlsHeader {
        let rep = PLS_LEN / 7;
        let mut bits = [0u8; 7];
        for (bi, bit) in bits.iter_mut().enumerate() {
            let mut votes = 0i32;
            for r in 0..rep {
                let pos = SOF_LEN + bi * rep + r;
                let expect_pos_even = bit_to_symbol(0, pos);
                let s = window[pos];
                let dot0 = s.re * expect_pos_even.re + s.im * expect_pos_even.im;
                votes += if dot0 >= 0.0 { -1 } else { 1 };
            }
            *bit = if votes > 0 { 1 } else { 0 };
        }
        PlsHeader::from_bits(&bits)
    }

    /// Scan `samples` for a frame start. Returns the symbol offset of the
    /// first sample after the header (i.e. where frame data begins) and
    /// the decoded PLS header, or `None` if nothing in `samples` clears
    /// `threshold`.
    pub fn find_frame(&mut self, samples: &[Complex32]) -> Option<(usize, PlsHeader)> {
        if samples.len() < SOF_PLS_LEN {
            return None;
        }
        let mut best: Option<(usize, f32)> = None;
        for start in 0..=(samples.len() - SOF_PLS_LEN) {
            let score = self.correlate_sof(&samples[start..]);
            if score >= self.threshold && best.map(|(_, b)| score > b).unwrap_or(true) {
                best = Some((start, score));
            }
        }
        best.map(|(start, _)| {
            let header = self.decode_pls(&samples[start..start + SOF_PLS_LEN]);
            (start + SOF_PLS_LEN, header)
        })
    }
}
