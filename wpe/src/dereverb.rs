//! Iterative WPE estimation.
//!
//! Each iteration estimates the inverse power of the current estimate,
//! accumulates the weighted statistics of the delayed observation stack,
//! solves for the prediction filter and subtracts the predicted late
//! reverberation from the observation:
//!
//! ```text
//! X = Y
//! repeat iterations:
//!     w = 1 / power(X)
//!     R, P = correlation(w, Y~, Y)
//!     G = solve(R, P)
//!     X = Y - G^H Y~
//! ```
//!
//! The step entry points take an externally estimated inverse power and
//! run one filter update, e.g. with a power shared across frequency bins.

use ndarray::{
    Array1, Array2, Array3, ArrayD, ArrayView1, ArrayView2, ArrayViewD, CowArray, Ix2, Ix3, IxDyn,
};
use num_complex::Complex64;
use tracing::{debug, trace};

use crate::complex::{ComplexMatrix, SignalView, SplitComplex};
use crate::config::WpeConfig;
use crate::correlation::StatisticsMode;
use crate::error::{WpeError, WpeResult};
use crate::filter;
use crate::power::{PsdContext, inverse_power, inverse_power_split};

/// Dereverberates one frequency bin, `y` shaped (channels, frames).
pub fn wpe(y: ArrayView2<Complex64>, config: &WpeConfig) -> WpeResult<Array2<Complex64>> {
    iterate(SignalView::Native(y), config).map(ComplexMatrix::into_native)
}

/// [`wpe`] for a paired real/imaginary signal.
pub fn wpe_split(y: &SplitComplex, config: &WpeConfig) -> WpeResult<SplitComplex> {
    iterate(SignalView::Split(y), config).map(ComplexMatrix::into_split)
}

/// One filter update with a precomputed inverse power of length `frames`.
///
/// `valid` statistics are not supported here.
pub fn wpe_step(
    y: ArrayView2<Complex64>,
    inverse_power: ArrayView1<f64>,
    config: &WpeConfig,
) -> WpeResult<Array2<Complex64>> {
    step(SignalView::Native(y), inverse_power, config).map(ComplexMatrix::into_native)
}

pub fn wpe_step_split(
    y: &SplitComplex,
    inverse_power: ArrayView1<f64>,
    config: &WpeConfig,
) -> WpeResult<SplitComplex> {
    step(SignalView::Split(y), inverse_power, config).map(ComplexMatrix::into_split)
}

/// [`wpe`] over arbitrary leading dimensions, `y` shaped (..., channels, frames).
pub fn wpe_batched(y: ArrayViewD<Complex64>, config: &WpeConfig) -> WpeResult<ArrayD<Complex64>> {
    config.validate()?;
    let batch = Batch::of(y.shape())?;
    let flat = batch.flatten(&y)?;
    let mut out = Array3::zeros(flat.raw_dim());
    for (index, (slice, mut target)) in flat
        .outer_iter()
        .zip(out.outer_iter_mut())
        .enumerate()
    {
        trace!(index, of = batch.count, "dereverberating slice");
        target.assign(&wpe(slice, config)?);
    }
    batch.restore(out)
}

/// [`wpe_step`] over leading dimensions.
///
/// `inverse_power` is either shaped (..., frames) matching the leading
/// dimensions of `y`, or a single (frames) vector shared by every slice.
pub fn wpe_step_batched(
    y: ArrayViewD<Complex64>,
    inverse_power: ArrayViewD<f64>,
    config: &WpeConfig,
) -> WpeResult<ArrayD<Complex64>> {
    config.validate()?;
    reject_valid(config)?;
    let batch = Batch::of(y.shape())?;
    let flat = batch.flatten(&y)?;

    let weights: CowArray<f64, Ix2> = if inverse_power.ndim() == 1 {
        if inverse_power.len() != batch.frames {
            return Err(WpeError::shape(
                "inverse power",
                &[batch.frames],
                inverse_power.shape(),
            ));
        }
        inverse_power
            .broadcast((batch.count, batch.frames))
            .ok_or_else(|| {
                WpeError::shape("inverse power", &[batch.frames], inverse_power.shape())
            })?
            .into()
    } else {
        let mut expected = batch.leading.clone();
        expected.push(batch.frames);
        if inverse_power.shape() != expected.as_slice() {
            return Err(WpeError::shape("inverse power", &expected, inverse_power.shape()));
        }
        inverse_power
            .to_shape((batch.count, batch.frames))
            .map_err(|err| WpeError::invalid(format!("inverse power layout: {err}")))?
    };

    let mut out = Array3::zeros(flat.raw_dim());
    for (index, (slice, mut target)) in flat
        .outer_iter()
        .zip(out.outer_iter_mut())
        .enumerate()
    {
        target.assign(&wpe_step(slice, weights.row(index), config)?);
    }
    batch.restore(out)
}

fn iterate(y: SignalView, config: &WpeConfig) -> WpeResult<ComplexMatrix> {
    let context = config.validate()?;
    debug!(%config, dim = ?y.dim(), "running wpe");

    let mut x = y.to_matrix();
    for iteration in 0..config.iterations {
        let weights = estimate_inverse_power(&x, context);
        let (next, filter_energy) = update(y, weights.view(), config, config.statistics)?;
        x = next;
        debug!(
            iteration,
            filter_energy,
            mean_weight = weights.mean().unwrap_or(0.0),
            "wpe iteration done"
        );
    }
    Ok(x)
}

fn step(
    y: SignalView,
    inverse_power: ArrayView1<f64>,
    config: &WpeConfig,
) -> WpeResult<ComplexMatrix> {
    config.validate()?;
    reject_valid(config)?;
    let (x, filter_energy) = update(y, inverse_power, config, StatisticsMode::Full)?;
    trace!(filter_energy, "wpe step done");
    Ok(x)
}

fn reject_valid(config: &WpeConfig) -> WpeResult<()> {
    if config.statistics == StatisticsMode::Valid {
        return Err(WpeError::not_implemented(
            "statistics_mode 'valid' in step-wise wpe",
        ));
    }
    Ok(())
}

fn estimate_inverse_power(x: &ComplexMatrix, context: PsdContext) -> Array1<f64> {
    match x {
        ComplexMatrix::Native(x) => inverse_power(x.view(), context),
        ComplexMatrix::Split(x) => inverse_power_split(x, context),
    }
}

// Weighted statistics, solve, filter. Also returns the filter energy.
fn update(
    y: SignalView,
    inverse_power: ArrayView1<f64>,
    config: &WpeConfig,
    mode: StatisticsMode,
) -> WpeResult<(ComplexMatrix, f64)> {
    let stats = config
        .estimator
        .estimate(y, inverse_power, config.taps, config.delay, mode)?;
    let g = config.solver.solve(&stats.r, &stats.p)?;
    let x = filter::apply(y, &g, config.taps, config.delay)?;
    Ok((x, g.energy()))
}

/// Leading dimensions of a (..., channels, frames) array.
struct Batch {
    leading: Vec<usize>,
    count: usize,
    channels: usize,
    frames: usize,
}

impl Batch {
    fn of(shape: &[usize]) -> WpeResult<Self> {
        let Some((&frames, rest)) = shape.split_last() else {
            return Err(WpeError::invalid("signal needs (..., channels, frames) dimensions"));
        };
        let Some((&channels, leading)) = rest.split_last() else {
            return Err(WpeError::invalid("signal needs (..., channels, frames) dimensions"));
        };
        Ok(Self {
            leading: leading.to_vec(),
            count: leading.iter().product(),
            channels,
            frames,
        })
    }

    fn flatten<'a>(
        &self,
        y: &'a ArrayViewD<Complex64>,
    ) -> WpeResult<CowArray<'a, Complex64, Ix3>> {
        y.to_shape((self.count, self.channels, self.frames))
            .map_err(|err| WpeError::invalid(format!("signal layout: {err}")))
    }

    fn restore(&self, out: Array3<Complex64>) -> WpeResult<ArrayD<Complex64>> {
        let mut shape = self.leading.clone();
        shape.extend([self.channels, self.frames]);
        out.into_shape_with_order(IxDyn(&shape))
            .map_err(|err| WpeError::invalid(format!("output layout: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complex::max_abs_diff;
    use crate::correlation::Estimator;
    use crate::solve::Solver;
    use crate::synthetic::complex_gaussian;
    use ndarray::Axis;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn signal(seed: u64, channels: usize, frames: usize) -> Array2<Complex64> {
        let mut rng = StdRng::seed_from_u64(seed);
        complex_gaussian(&mut rng, (channels, frames))
    }

    #[test]
    fn test_zero_iterations_returns_input() {
        let y = signal(1, 2, 30);
        let config = WpeConfig::new(3, 1, 0);
        assert_eq!(wpe(y.view(), &config).unwrap(), y);
    }

    #[test]
    fn test_invalid_configuration_fails_before_work() {
        let y = signal(2, 2, 30);
        let config = WpeConfig::new(3, 1, 0).with_psd_context(-3.0);
        assert!(matches!(
            wpe(y.view(), &config),
            Err(WpeError::InvalidArgument(_))
        ));
        let config = WpeConfig::new(3, 1, 2).with_psd_context(4.0);
        assert!(matches!(
            wpe(y.view(), &config),
            Err(WpeError::NotImplemented(_))
        ));
    }

    #[test]
    fn test_step_equals_single_iteration() {
        let y = signal(3, 3, 60);
        let config = WpeConfig::new(4, 2, 1);
        let looped = wpe(y.view(), &config).unwrap();
        let weights = inverse_power(y.view(), PsdContext::Frame);
        let stepped = wpe_step(y.view(), weights.view(), &config).unwrap();
        assert!(max_abs_diff(&looped.view(), &stepped.view()) < 1e-12);
    }

    #[test]
    fn test_valid_statistics() {
        let y = signal(4, 2, 50);
        let config = WpeConfig::new(3, 2, 2).with_statistics(StatisticsMode::Valid);
        let x = wpe(y.view(), &config).unwrap();
        assert_eq!(x.dim(), y.dim());
        assert_ne!(x, wpe(y.view(), &config.with_statistics(StatisticsMode::Full)).unwrap());

        let weights = Array1::ones(50);
        assert!(matches!(
            wpe_step(y.view(), weights.view(), &config),
            Err(WpeError::NotImplemented(_))
        ));
        let split = SplitComplex::from_native(y.view());
        assert!(matches!(
            wpe_step_split(&split, weights.view(), &config),
            Err(WpeError::NotImplemented(_))
        ));
    }

    #[test]
    fn test_split_entry_point() {
        let y = signal(5, 2, 40);
        let split = SplitComplex::from_native(y.view());
        let config = WpeConfig::new(3, 1, 3)
            .with_estimator(Estimator::FourReal)
            .with_solver(Solver::RealBlockLu);
        let native = wpe(y.view(), &config).unwrap();
        let paired = wpe_split(&split, &config).unwrap();
        assert!(max_abs_diff(&native.view(), &paired.to_native().view()) < 1e-10);
    }

    #[test]
    fn test_step_batched_shared_power() {
        let mut rng = StdRng::seed_from_u64(6);
        let y = complex_gaussian(&mut rng, (6, 40))
            .into_shape_with_order((3, 2, 40))
            .unwrap();
        let weights = inverse_power(y.index_axis(Axis(0), 0), PsdContext::Frame);
        let config = WpeConfig::new(2, 1, 1);

        let batched = wpe_step_batched(y.view().into_dyn(), weights.view().into_dyn(), &config)
            .unwrap();
        for (index, slice) in y.outer_iter().enumerate() {
            let single = wpe_step(slice, weights.view(), &config).unwrap();
            let got = batched.index_axis(Axis(0), index);
            let got = got.into_dimensionality::<Ix2>().unwrap();
            assert!(max_abs_diff(&got, &single.view()) < 1e-12);
        }

        let wrong = Array2::<f64>::ones((2, 40));
        assert!(matches!(
            wpe_step_batched(y.view().into_dyn(), wrong.view().into_dyn(), &config),
            Err(WpeError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_step_batched_shared_power_length() {
        let mut rng = StdRng::seed_from_u64(7);
        let y = complex_gaussian(&mut rng, (6, 40))
            .into_shape_with_order((3, 2, 40))
            .unwrap();
        let config = WpeConfig::new(2, 1, 1);
        for frames in [1, 39] {
            let short = Array1::<f64>::ones(frames);
            let err = wpe_step_batched(y.view().into_dyn(), short.view().into_dyn(), &config)
                .unwrap_err();
            assert!(
                matches!(err, WpeError::ShapeMismatch { what: "inverse power", .. }),
                "{frames}: {err}"
            );
        }
    }

    #[test]
    fn test_batched_needs_two_dimensions() {
        let y = ndarray::Array1::<Complex64>::zeros(10);
        assert!(matches!(
            wpe_batched(y.view().into_dyn(), &WpeConfig::default()),
            Err(WpeError::InvalidArgument(_))
        ));
    }
}
