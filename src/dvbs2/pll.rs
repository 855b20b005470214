//! Pilot-aware carrier tracking PLL (§4.3).
//!
//! Runs once per physical-layer frame over the frame's data symbols,
//! correcting residual frequency/phase error left after the outer
//! [`crate::blocks::FreqShift`] coarse correction. Uses data-aided updates
//! when a symbol's position is known in advance (SOF/pilot symbols, which
//! carry a known constellation point) and decision-directed updates
//! otherwise (slicing the corrected symbol to its nearest constellation
//! point and using that as the reference).
use crate::dvbs2::pls::{ApskRadii, Constellation};
use crate::{Complex32, Float};

/// Reference constellation points for one DVB-S2 modulation, used both to
/// slice a corrected symbol to its nearest point (decision-directed) and
/// to phase-correct against a known point (data-aided).
pub fn constellation_points(c: Constellation) -> Vec<Complex32> {
    use std::f32::consts::PI;
    match c {
        Constellation::Qpsk => (0..4)
            .map(|k| {
                let a = PI / 4.0 + k as Float * PI / 2.0;
                Complex32::new(a.cos(), a.sin())
            })
            .collect(),
        Constellation::Psk8 => (0..8)
            .map(|k| {
                let a = k as Float * PI / 4.0;
                Complex32::new(a.cos(), a.sin())
            })
            .collect(),
        Constellation::Apsk16 => {
            let r = ApskRadii::APSK16_DEFAULT;
            let mut pts = Vec::with_capacity(16);
            for k in 0..4 {
                let a = PI / 4.0 + k as Float * PI / 2.0;
                pts.push(Complex32::new(a.cos(), a.sin()) * r.g2);
            }
            for k in 0..12 {
                let a = k as Float * PI / 6.0;
                pts.push(Complex32::new(a.cos(), a.sin()) * r.g1);
            }
            pts
        }
        Constellation::Apsk32 => {
            let r = ApskRadii::APSK32_DEFAULT;
            let mut pts = Vec::with_capacity(32);
            for k in 0..4 {
                let a = PI / 4.0 + k as Float * PI / 2.0;
                pts.push(Complex32::new(a.cos(), a.sin()) * r.g2);
            }
            for k in 0..12 {
                let a = k as Float * PI / 6.0;
                pts.push(Complex32::new(a.cos(), a.sin()) * r.g1 * 0.6);
            }
            for k in 0..16 {
                let a = PI / 16.0 + k as Float * PI / 8.0;
                pts.push(Complex32::new(a.cos(), a.sin()) * r.g1);
            }
            pts
        }
    }
}

fn nearest_point(points: &[Complex32], s: Complex32) -> Complex32 {
    *points
        .iter()
        .min_by(|a, b| (**a - s).norm().partial_cmp(&(**b - s).norm()).unwrap())
        .unwrap()
}

/// Carrier-tracking loop, run per frame over its data symbols.
pub struct Pll {
    pub bw: Float,
    pub freq_propagation_factor: Float,
    freq: Float,
    phase: Float,
    points: Vec<Complex32>,
}

impl Pll {
    /// `bw` is the loop bandwidth (`pll_bw`); `freq_propagation_factor`
    /// is the fraction of the PLL's accumulated frequency error fed back
    /// to the upstream frequency shifter each frame.
    pub fn new(constellation: Constellation, bw: Float, freq_propagation_factor: Float) -> Self {
        Self {
            bw,
            freq_propagation_factor,
            freq: 0.0,
            phase: 0.0,
            points: constellation_points(constellation),
        }
    }

    /// The PLL's current running frequency error estimate, radians/symbol.
    pub fn freq_error(&self) -> Float {
        self.freq
    }

    /// Fraction of [`Self::freq_error`] the outer pipeline should feed
    /// back into the upstream frequency shifter this frame.
    pub fn propagate(&self) -> Float {
        self.freq * self.freq_propagation_factor
    }

    fn derotate(&self, s: Complex32) -> Complex32 {
        s * Complex32::new(self.phase.cos(), -self.phase.sin())
    }

    fn update(&mut self, corrected: Complex32, reference: Complex32) {
        let error = (corrected * reference.conj()).im.atan2((corrected * reference.conj()).re);
        // Proportional + integral (Costas-like) update, scaled by the
        // configured loop bandwidth.
        self.freq += self.bw * self.bw * error;
        self.phase += self.freq + self.bw * error;
        if self.phase > std::f32::consts::PI {
            self.phase -= 2.0 * std::f32::consts::PI;
        } else if self.phase < -std::f32::consts::PI {
            self.phase += 2.0 * std::f32::consts::PI;
        }
    }

    /// Data-aided update: `symbol` is known in advance to equal
    /// `expected` (a SOF or pilot symbol).
    pub fn track_known(&mut self, symbol: Complex32, expected: Complex32) -> Complex32 {
        let corrected = self.derotate(symbol);
        self.update(corrected, expected);
        corrected
    }

    /// Decision-directed update: slice `symbol` to the nearest
    /// constellation point and track against that.
    pub fn track_data(&mut self, symbol: Complex32) -> Complex32 {
        let corrected = self.derotate(symbol);
        let decided = nearest_point(&self.points, corrected);
        self.update(corrected, decided);
        corrected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_out_a_constant_phase_offset() {
        let mut pll = Pll::new(Constellation::Qpsk, 0.01, 0.001);
        let points = constellation_points(Constellation::Qpsk);
        let offset = 0.3_f32;
        let rot = Complex32::new(offset.cos(), offset.sin());
        let mut last = Complex32::new(0.0, 0.0);
        for _ in 0..500 {
            for &p in &points {
                last = pll.track_data(p * rot);
            }
        }
        let nearest = nearest_point(&points, last);
        assert!((last - nearest).norm() < 0.05, "should converge near a constellation point, got {last}");
    }

    #[test]
    fn constellation_points_have_unit_or_scaled_radius() {
        for c in [
            Constellation::Qpsk,
            Constellation::Psk8,
            Constellation::Apsk16,
            Constellation::Apsk32,
        ] {
            let pts = constellation_points(c);
            assert_eq!(pts.len(), 1 << c.bits_per_symbol());
            for p in pts {
                assert!(p.norm() > 0.1 && p.norm() < 4.0);
            }
        }
    }
}
