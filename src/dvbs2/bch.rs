//! BCH outer decoder (§4.3): an algebraic cyclic code operating on the
//! hard-bit repack of each LDPC-decoded baseband frame, correcting a
//! bounded number of residual bit errors LDPC left behind.
//!
//! The real DVB-S2 standard ships a handful of concrete (t, n, k) BCH
//! parameter sets, one per framesize. This module implements the
//! general algebraic machinery instead — GF(2^m) arithmetic, a
//! systematic cyclic encoder, and a Berlekamp-Massey/Chien-search
//! decoder, over a shortened narrow-sense binary BCH code parameterized
//! by `(m, t, n)` — and [`BchDecoder::reference_for`] picks the smallest
//! field size that fits the length this crate's LDPC reference code
//! needs, with a fixed small `t`. This is a deliberate scope reduction
//! from the standard's literal per-MODCOD tables (`DESIGN.md`).
use crate::dvbs2::pls::{CodeRate, FrameSize};

/// GF(2^m) log/antilog tables for multiplication and division.
struct GaloisField {
    field_size: usize,
    exp: Vec<u32>,
    log: Vec<i32>,
}

impl GaloisField {
    fn new(m: u32) -> Self {
        let poly = Self::primitive_poly(m);
        let field_size = (1usize << m) - 1;
        let mut exp = vec![0u32; field_size * 2];
        let mut log = vec![-1i32; field_size + 1];
        let mut reg: u32 = 1;
        for i in 0..field_size {
            exp[i] = reg;
            log[reg as usize] = i as i32;
            reg <<= 1;
            if reg & (1 << m) != 0 {
                reg ^= poly;
            }
        }
        for i in field_size..field_size * 2 {
            exp[i] = exp[i - field_size];
        }
        Self { field_size, exp, log }
    }

    fn primitive_poly(m: u32) -> u32 {
        match m {
            4 => 0b1_0011,
            5 => 0b10_0101,
            6 => 0b100_0011,
            7 => 0b1000_1001,
            8 => 0b1_0001_1101,
            9 => 0b1_0001_0000_1,
            10 => 0b100_0000_0011,
            11 => 0b1000_0000_0101,
            12 => 0b1_0000_1010_0011,
            13 => 0b10_0000_0001_1011,
            14 => 0b100_0010_1011_0011,
            15 => 0b1000_0000_0000_0011,
            16 => 0b1_0000_1000_0010_1101,
            other => panic!("no primitive polynomial tabulated for GF(2^{other})"),
        }
    }

    fn mul(&self, a: u32, b: u32) -> u32 {
        if a == 0 || b == 0 {
            0
        } else {
            self.exp[(self.log[a as usize] + self.log[b as usize]) as usize]
        }
    }

    fn div(&self, a: u32, b: u32) -> u32 {
        if a == 0 {
            0
        } else {
            let diff = self.log[a as usize] - self.log[b as usize];
            let diff = diff.rem_euclid(self.field_size as i32) as usize;
            self.exp[diff]
        }
    }

    fn pow_of_alpha(&self, exponent: i64) -> u32 {
        let e = exponent.rem_euclid(self.field_size as i64) as usize;
        self.exp[e]
    }
}

/// GF(2) (binary) polynomial helpers, coefficients ascending (index =
/// degree).
fn poly_degree(p: &[u8]) -> isize {
    p.iter().rposition(|&c| c != 0).map(|i| i as isize).unwrap_or(-1)
}

fn poly_mod(dividend: &[u8], divisor: &[u8]) -> Vec<u8> {
    let mut rem = dividend.to_vec();
    let dv_deg = poly_degree(divisor);
    if dv_deg < 0 {
        return rem;
    }
    loop {
        let deg = poly_degree(&rem);
        if deg < dv_deg {
            break;
        }
        let shift = (deg - dv_deg) as usize;
        for i in 0..=dv_deg as usize {
            rem[i + shift] ^= divisor[i];
        }
    }
    rem.truncate(dv_deg as usize);
    rem
}

fn poly_mul_binary(a: &[u8], b: &[u8]) -> Vec<u8> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }
    let mut out = vec![0u8; a.len() + b.len() - 1];
    for (i, &ai) in a.iter().enumerate() {
        if ai == 0 {
            continue;
        }
        for (j, &bj) in b.iter().enumerate() {
            out[i + j] ^= ai & bj;
        }
    }
    out
}

/// Minimal polynomial of `alpha^i` over GF(2), as a GF(2) coefficient
/// vector (ascending), computed from its cyclotomic coset.
fn minimal_poly(i: usize, gf: &GaloisField) -> Vec<u8> {
    let fs = gf.field_size;
    let mut coset = vec![i % fs];
    let mut x = (i * 2) % fs;
    while x != coset[0] {
        coset.push(x);
        x = (x * 2) % fs;
    }
    // Product over the coset of (X + alpha^j) in GF(2^m); since this is
    // exactly the minimal polynomial, the result collapses to binary
    // coefficients.
    let mut poly: Vec<u32> = vec![1];
    for &j in &coset {
        let root = gf.exp[j];
        let mut new_poly = vec![0u32; poly.len() + 1];
        for (k, &c) in poly.iter().enumerate() {
            new_poly[k + 1] ^= c;
            new_poly[k] ^= gf.mul(c, root);
        }
        poly = new_poly;
    }
    poly.iter()
        .map(|&c| {
            debug_assert!(c == 0 || c == 1, "minimal polynomial must have binary coefficients");
            c as u8
        })
        .collect()
}

/// Binary BCH decoder over a shortened narrow-sense code: field `GF(2^m)`,
/// designed distance correcting up to `t` errors, shortened to codeword
/// length `n` (`n <= 2^m - 1`).
pub struct BchDecoder {
    gf: GaloisField,
    t: usize,
    n: usize,
    k: usize,
    generator: Vec<u8>,
}

impl BchDecoder {
    /// Build the decoder: `m`/`t` choose the field and error-correcting
    /// power, `n` the (possibly shortened) codeword length.
    pub fn new(m: u32, t: usize, n: usize) -> Self {
        let gf = GaloisField::new(m);
        assert!(n <= gf.field_size, "shortened length can't exceed 2^m - 1");
        let mut generator = vec![1u8];
        let mut seen_degrees = std::collections::HashSet::new();
        for i in (1..=2 * t).step_by(2) {
            let coset_rep = {
                // Skip cosets already folded into the generator (even
                // members of an odd coset's class are covered already).
                let mut x = i % gf.field_size;
                let mut rep = x;
                loop {
                    x = (x * 2) % gf.field_size;
                    if x == i % gf.field_size {
                        break;
                    }
                    rep = rep.min(x);
                }
                rep
            };
            if !seen_degrees.insert(coset_rep) {
                continue;
            }
            let mp = minimal_poly(i, &gf);
            generator = poly_mul_binary(&generator, &mp);
        }
        let r = poly_degree(&generator) as usize;
        let k = n - r;
        Self { gf, t, n, k, generator }
    }

    /// Smallest `(m, t=3)` reference decoder whose natural field covers
    /// `n` bits, shortened to exactly `n`. `t=3` is a fixed, modest
    /// error-correcting capability chosen for this crate's reference
    /// receiver chain, not a literal standard parameter (`DESIGN.md`).
    pub fn reference_for(n: usize) -> Self {
        let mut m = 4u32;
        while (1usize << m) - 1 < n {
            m += 1;
        }
        Self::new(m, 3, n)
    }

    /// A reference decoder sized to match [`crate::dvbs2::ldpc::LdpcCode::reference`]'s
    /// systematic message length for the given (framesize, coderate), or
    /// `None` if no LDPC reference code exists for that pair.
    pub fn reference(framesize: FrameSize, coderate: CodeRate) -> Option<Self> {
        let half = CodeRate::new(1, 2);
        match (framesize, coderate) {
            (FrameSize::Short, cr) if cr == half => Some(Self::reference_for(8_100)),
            _ => None,
        }
    }

    /// Codeword length (== the LDPC message length this decoder sits
    /// behind).
    pub fn n(&self) -> usize {
        self.n
    }

    /// Payload length (`dataSize`, §6): the final baseband-frame size
    /// handed to the descrambler.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Systematically encode a `k`-bit payload into an `n`-bit codeword
    /// (parity-first, ascending-degree convention: `codeword[0..r]` is
    /// parity, `codeword[r..]` is the payload verbatim). Used only by
    /// this crate's own synthetic loopback tests.
    pub fn encode(&self, payload: &[u8]) -> Vec<u8> {
        assert_eq!(payload.len(), self.k);
        let r = self.n - self.k;
        let mut shifted = vec![0u8; r];
        shifted.extend_from_slice(payload);
        let remainder = poly_mod(&shifted, &self.generator);
        let mut codeword = vec![0u8; self.n];
        codeword[..r].copy_from_slice(&remainder);
        codeword[r..].copy_from_slice(payload);
        codeword
    }

    fn syndromes(&self, received: &[u8]) -> Vec<u32> {
        (1..=2 * self.t)
            .map(|i| {
                let mut acc = 0u32;
                for &c in received.iter().rev() {
                    acc = self.gf.mul(acc, self.gf.pow_of_alpha(i as i64)) ^ (c as u32);
                }
                acc
            })
            .collect()
    }

    /// Berlekamp-Massey over GF(2^m): returns the error-locator
    /// polynomial (ascending, ≤ degree `t`).
    fn berlekamp_massey(&self, synd: &[u32]) -> Vec<u32> {
        let mut c = vec![1u32];
        let mut b = vec![1u32];
        let mut l = 0usize;
        let mut m = 1i64;
        let mut bb = 1u32;
        for n in 0..synd.len() {
            let mut delta = synd[n];
            for i in 1..=l {
                if i < c.len() {
                    delta ^= self.gf.mul(c[i], synd[n - i]);
                }
            }
            if delta == 0 {
                m += 1;
            } else if 2 * l <= n {
                let t_poly = c.clone();
                let coef = self.gf.div(delta, bb);
                let shift = m as usize;
                let mut shifted_scaled = vec![0u32; b.len() + shift];
                for (i, &bc) in b.iter().enumerate() {
                    shifted_scaled[i + shift] = self.gf.mul(coef, bc);
                }
                let newlen = c.len().max(shifted_scaled.len());
                let mut newc = vec![0u32; newlen];
                for (i, &v) in c.iter().enumerate() {
                    newc[i] ^= v;
                }
                for (i, &v) in shifted_scaled.iter().enumerate() {
                    newc[i] ^= v;
                }
                c = newc;
                l = n + 1 - l;
                b = t_poly;
                bb = delta;
                m = 1;
            } else {
                let coef = self.gf.div(delta, bb);
                let shift = m as usize;
                let mut shifted_scaled = vec![0u32; b.len() + shift];
                for (i, &bc) in b.iter().enumerate() {
                    shifted_scaled[i + shift] = self.gf.mul(coef, bc);
                }
                let newlen = c.len().max(shifted_scaled.len());
                let mut newc = vec![0u32; newlen];
                for (i, &v) in c.iter().enumerate() {
                    newc[i] ^= v;
                }
                for (i, &v) in shifted_scaled.iter().enumerate() {
                    newc[i] ^= v;
                }
                c = newc;
                m += 1;
            }
        }
        c
    }

    /// Decode one `n`-bit hard-decision codeword. Returns the corrected
    /// `k`-bit payload and the number of bits corrected, or `(payload,
    /// -1)` if more errors were found than the code can reliably
    /// correct (§4.3: "returns the number of corrected bits, or -1 on
    /// failure").
    pub fn decode(&self, received: &[u8]) -> (Vec<u8>, i32) {
        assert_eq!(received.len(), self.n);
        let synd = self.syndromes(received);
        if synd.iter().all(|&s| s == 0) {
            let r = self.n - self.k;
            return (received[r..].to_vec(), 0);
        }
        let sigma = self.berlekamp_massey(&synd);
        let sigma_deg = poly_degree(&sigma.iter().map(|&c| u8::from(c != 0)).collect::<Vec<_>>());
        if sigma_deg <= 0 || sigma_deg as usize > self.t {
            return (received[self.n - self.k..].to_vec(), -1);
        }
        // Chien search: error at position d iff sigma(alpha^{-d}) == 0.
        let mut corrected = received.to_vec();
        let mut found = 0usize;
        for d in 0..self.n {
            let x_inv = self.gf.pow_of_alpha(-(d as i64));
            // sigma(x_inv) = sum coeff * x_inv^deg, accumulated via Horner.
            let mut val = 0u32;
            let mut pw = 1u32;
            for &coeff in &sigma {
                val ^= self.gf.mul(coeff, pw);
                pw = self.gf.mul(pw, x_inv);
            }
            if val == 0 {
                corrected[d] ^= 1;
                found += 1;
            }
        }
        let r = self.n - self.k;
        if found != sigma_deg as usize {
            return (received[r..].to_vec(), -1);
        }
        (corrected[r..].to_vec(), found as i32)
    }
}
