//! Seeded synthetic scenes and the late-correlation measure used to judge
//! dereverberation without audio files.

use ndarray::{Array1, Array2, Array3, ArrayView2, Axis, Zip, s};
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Circular complex Gaussian samples with unit variance.
pub fn complex_gaussian<R: Rng + ?Sized>(rng: &mut R, shape: (usize, usize)) -> Array2<Complex64> {
    let scale = std::f64::consts::FRAC_1_SQRT_2;
    Array2::from_shape_simple_fn(shape, || {
        let re: f64 = rng.sample(StandardNormal);
        let im: f64 = rng.sample(StandardNormal);
        Complex64::new(re * scale, im * scale)
    })
}

/// Multi-channel STFT-domain recording of one white source in a room.
///
/// Each channel sees the source through its own response: a unit direct
/// path followed by `tail` random taps whose amplitude decays by `decay`
/// per frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReverberantScene {
    pub bins: usize,
    pub channels: usize,
    pub frames: usize,
    pub tail: usize,
    pub decay: f64,
    pub noise: f64,
    pub seed: u64,
}

impl Default for ReverberantScene {
    fn default() -> Self {
        Self {
            bins: 8,
            channels: 2,
            frames: 200,
            tail: 12,
            decay: 0.75,
            noise: 1e-3,
            seed: 0,
        }
    }
}

impl ReverberantScene {
    /// Observations shaped (bins, channels, frames).
    pub fn generate(&self) -> Array3<Complex64> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut out = Array3::zeros((self.bins, self.channels, self.frames));
        for mut bin in out.outer_iter_mut() {
            let source = complex_gaussian(&mut rng, (1, self.frames));
            let source = source.row(0);
            let response = self.response(&mut rng);
            for (d, mut channel) in bin.outer_iter_mut().enumerate() {
                for (lag, &h) in response.row(d).iter().enumerate() {
                    if lag >= self.frames {
                        break;
                    }
                    channel
                        .slice_mut(s![lag..])
                        .scaled_add(h, &source.slice(s![..self.frames - lag]));
                }
            }
            let noise = complex_gaussian(&mut rng, (self.channels, self.frames));
            bin.scaled_add(Complex64::new(self.noise, 0.0), &noise);
        }
        out
    }

    // (channels, tail + 1), column 0 is the direct path
    fn response<R: Rng + ?Sized>(&self, rng: &mut R) -> Array2<Complex64> {
        let mut response = complex_gaussian(rng, (self.channels, self.tail + 1));
        let envelope = Array1::from_shape_fn(self.tail + 1, |lag| self.decay.powi(lag as i32));
        response *= &envelope.mapv(|e| Complex64::new(e, 0.0));
        response.column_mut(0).fill(Complex64::new(1.0, 0.0));
        response
    }
}

/// Normalised energy of the channel-pair correlations at lags
/// `delay..delay + taps`.
///
/// ```text
/// sum_{d, e, lag} |sum_t x[d, t] conj(x[e, t - lag])|^2 / (sum |x|^2)^2
/// ```
pub fn late_correlation(x: ArrayView2<Complex64>, delay: usize, taps: usize) -> f64 {
    let energy: f64 = x.iter().map(|v| v.norm_sqr()).sum();
    if energy == 0.0 {
        return 0.0;
    }
    let frames = x.ncols();
    let mut total = 0.0;
    for lag in delay..delay.saturating_add(taps).min(frames) {
        for current in x.axis_iter(Axis(0)) {
            for past in x.axis_iter(Axis(0)) {
                let c = Zip::from(current.slice(s![lag..]))
                    .and(past.slice(s![..frames - lag]))
                    .fold(Complex64::new(0.0, 0.0), |acc, &a, &b| acc + a * b.conj());
                total += c.norm_sqr();
            }
        }
    }
    total / (energy * energy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_is_deterministic() {
        let scene = ReverberantScene {
            bins: 2,
            frames: 40,
            ..ReverberantScene::default()
        };
        let a = scene.generate();
        assert_eq!(a.dim(), (2, 2, 40));
        assert_eq!(a, scene.generate());
        assert_ne!(a, ReverberantScene { seed: 1, ..scene }.generate());
    }

    #[test]
    fn test_gaussian_variance() {
        let mut rng = StdRng::seed_from_u64(3);
        let x = complex_gaussian(&mut rng, (4, 2000));
        let power = x.iter().map(|v| v.norm_sqr()).sum::<f64>() / x.len() as f64;
        assert!((power - 1.0).abs() < 0.1, "{power}");
    }

    fn mean_late(scene: &ReverberantScene) -> f64 {
        let x = scene.generate();
        let total: f64 = x.outer_iter().map(|bin| late_correlation(bin, 2, 4)).sum();
        total / scene.bins as f64
    }

    #[test]
    fn test_reverb_raises_late_correlation() {
        let dry = ReverberantScene {
            bins: 4,
            tail: 0,
            ..ReverberantScene::default()
        };
        let wet = ReverberantScene {
            tail: 12,
            decay: 0.9,
            ..dry
        };
        let (dry, wet) = (mean_late(&dry), mean_late(&wet));
        assert!(wet > 2.0 * dry, "wet {wet} dry {dry}");
    }

    #[test]
    fn test_silence_has_no_correlation() {
        let x = Array2::<Complex64>::zeros((2, 16));
        assert_eq!(late_correlation(x.view(), 1, 3), 0.0);
    }
}
