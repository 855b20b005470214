//! Filter design helpers (§4.2 FIR block): windowed-sinc low-pass and the
//! root-raised-cosine matched filter used ahead of clock recovery.
use crate::Float;

/// Windowed-sinc low-pass FIR design, Hamming-windowed.
///
/// `samp_rate`/`cutoff`/`twidth` are all in Hz. `gain` scales every tap so
/// the filter's DC response is `gain`.
pub fn low_pass(gain: Float, samp_rate: Float, cutoff: Float, twidth: Float) -> Vec<Float> {
    assert!(cutoff > 0.0 && cutoff < samp_rate / 2.0, "cutoff out of range");
    let delta = twidth / samp_rate;
    // Empirical Hamming-window tap count, matching the behavior of other
    // windowed-sinc designers: more transition narrowing needs more taps.
    let ntaps = {
        let n = (4.0 / delta).ceil() as usize;
        n | 1 // force odd, so there's a single center tap
    };
    let fc = cutoff / samp_rate;
    let m = (ntaps - 1) as Float;
    let mut taps = Vec::with_capacity(ntaps);
    for n in 0..ntaps {
        let x = n as Float - m / 2.0;
        let sinc = if x == 0.0 {
            2.0 * fc
        } else {
            (2.0 * std::f32::consts::PI * fc * x).sin() / (std::f32::consts::PI * x)
        };
        let window = 0.54 - 0.46 * (2.0 * std::f32::consts::PI * n as Float / m).cos();
        taps.push(sinc * window);
    }
    let sum: Float = taps.iter().sum();
    let scale = gain / sum;
    taps.iter_mut().for_each(|t| *t *= scale);
    taps
}

/// Root-raised-cosine matched filter design.
///
/// `samp_rate` is the sample rate of the stream the filter runs on,
/// `sym_rate` the symbol rate, `alpha` the roll-off factor in (0, 1], and
/// `ntaps` the (odd) number of filter taps.
pub fn root_raised_cosine(gain: Float, samp_rate: Float, sym_rate: Float, alpha: Float, ntaps: usize) -> Vec<Float> {
    assert!(ntaps % 2 == 1, "root_raised_cosine wants an odd tap count");
    assert!(alpha > 0.0 && alpha <= 1.0);
    let spb = samp_rate / sym_rate; // samples per symbol (baud)
    let m = (ntaps / 2) as isize;
    let mut taps = vec![0.0 as Float; ntaps];
    for (i, tap) in taps.iter_mut().enumerate() {
        let t = (i as isize - m) as Float / spb;
        *tap = if t == 0.0 {
            1.0 - alpha + 4.0 * alpha / std::f32::consts::PI
        } else if (4.0 * alpha * t).abs() == 1.0 {
            let x = std::f32::consts::PI / (4.0 * alpha);
            (alpha / (2.0f32).sqrt())
                * (((1.0 + 2.0 / std::f32::consts::PI) * x.sin())
                    + ((1.0 - 2.0 / std::f32::consts::PI) * x.cos()))
        } else {
            let num = (std::f32::consts::PI * t * (1.0 - alpha)).sin()
                + 4.0 * alpha * t * (std::f32::consts::PI * t * (1.0 + alpha)).cos();
            let den = std::f32::consts::PI * t * (1.0 - (4.0 * alpha * t).powi(2));
            num / den
        };
    }
    let energy: Float = taps.iter().map(|t| t * t).sum::<Float>().sqrt();
    let scale = gain / energy;
    taps.iter_mut().for_each(|t| *t *= scale);
    taps
}
