//! Power-weighted correlation statistics of the delayed stack.
//!
//! ```text
//! R[i, j] = sum_t w[t] * Y~[i, t] * conj(Y~[j, t])
//! P[i, d] = sum_t w[t] * Y~[i, t] * conj(Y[d, t])
//! ```
//!
//! The sum runs over every frame (`full`) or over frames with complete
//! history, `t >= delay + taps - 1` (`valid`).

use std::fmt;
use std::ops::{Add, Mul};
use std::str::FromStr;

use ndarray::{Array2, ArrayView1, ArrayView2, Axis, Zip, s};
use num_complex::Complex64;
use num_traits::Zero;
use tracing::trace;

use crate::complex::{ComplexMatrix, Representation, SignalView, SplitComplex, hermite};
use crate::embedding::{DelayedStack, SplitStack};
use crate::error::{WpeError, WpeResult};

/// Frames the statistics are accumulated over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatisticsMode {
    #[default]
    Full,
    Valid,
}

impl StatisticsMode {
    pub fn name(&self) -> &'static str {
        match self {
            StatisticsMode::Full => "full",
            StatisticsMode::Valid => "valid",
        }
    }

    /// First frame included in the statistics.
    pub fn first_frame(&self, taps: usize, delay: usize, frames: usize) -> usize {
        match self {
            StatisticsMode::Full => 0,
            StatisticsMode::Valid => delay.saturating_add(taps).saturating_sub(1).min(frames),
        }
    }
}

impl fmt::Display for StatisticsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StatisticsMode {
    type Err = WpeError;

    fn from_str(s: &str) -> WpeResult<Self> {
        match s {
            "full" => Ok(StatisticsMode::Full),
            "valid" => Ok(StatisticsMode::Valid),
            _ => Err(WpeError::invalid(format!("unknown statistics mode '{s}'"))),
        }
    }
}

/// How R and P are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Estimator {
    /// Complex contraction straight off the lazy stack, no copy of Y~.
    #[default]
    Strided,
    /// Dense weighted stack and matrix products.
    Materialized,
    /// Four real contractions per complex product on the split components.
    FourReal,
}

impl Estimator {
    pub const ALL: [Estimator; 3] = [
        Estimator::Strided,
        Estimator::Materialized,
        Estimator::FourReal,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Estimator::Strided => "strided",
            Estimator::Materialized => "materialized",
            Estimator::FourReal => "four-real",
        }
    }

    /// Representation of the R and P this estimator produces.
    pub fn representation(&self) -> Representation {
        match self {
            Estimator::Strided | Estimator::Materialized => Representation::Native,
            Estimator::FourReal => Representation::Split,
        }
    }

    pub fn estimate(
        &self,
        signal: SignalView,
        inverse_power: ArrayView1<f64>,
        taps: usize,
        delay: usize,
        mode: StatisticsMode,
    ) -> WpeResult<Correlation> {
        let (_, frames) = signal.dim();
        if inverse_power.len() != frames {
            return Err(WpeError::shape(
                "inverse power",
                &[frames],
                &[inverse_power.len()],
            ));
        }
        let from = mode.first_frame(taps, delay, frames);
        trace!(estimator = %self, taps, delay, from, frames, "estimating correlation");

        match (self, signal) {
            (Estimator::Strided | Estimator::Materialized, SignalView::Native(y)) => {
                self.native(y, inverse_power, taps, delay, from)
            }
            (Estimator::Strided | Estimator::Materialized, SignalView::Split(y)) => {
                self.native(y.to_native().view(), inverse_power, taps, delay, from)
            }
            (Estimator::FourReal, SignalView::Native(y)) => {
                split(&SplitComplex::from_native(y), inverse_power, taps, delay, from)
            }
            (Estimator::FourReal, SignalView::Split(y)) => {
                split(y, inverse_power, taps, delay, from)
            }
        }
    }

    fn native(
        &self,
        y: ArrayView2<Complex64>,
        inverse_power: ArrayView1<f64>,
        taps: usize,
        delay: usize,
        from: usize,
    ) -> WpeResult<Correlation> {
        let stack = DelayedStack::new(y, taps, delay)?;
        let (r, p) = if *self == Estimator::Strided {
            strided(&stack, y, inverse_power, from)
        } else {
            materialized(&stack, y, inverse_power, from)
        };
        Ok(Correlation {
            r: ComplexMatrix::Native(r),
            p: ComplexMatrix::Native(p),
        })
    }
}

fn split(
    y: &SplitComplex,
    inverse_power: ArrayView1<f64>,
    taps: usize,
    delay: usize,
    from: usize,
) -> WpeResult<Correlation> {
    let stack = SplitStack::new(y, taps, delay)?;
    let (r, p) = four_real(&stack, y, inverse_power, from);
    Ok(Correlation {
        r: ComplexMatrix::Split(r),
        p: ComplexMatrix::Split(p),
    })
}

impl fmt::Display for Estimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Estimator {
    type Err = WpeError;

    fn from_str(s: &str) -> WpeResult<Self> {
        Estimator::ALL
            .into_iter()
            .find(|estimator| estimator.name() == s)
            .ok_or_else(|| WpeError::invalid(format!("unknown estimator '{s}'")))
    }
}

/// Weighted correlation `R` (taps·D × taps·D) and cross-correlation `P` (taps·D × D).
#[derive(Debug, Clone, PartialEq)]
pub struct Correlation {
    pub r: ComplexMatrix,
    pub p: ComplexMatrix,
}

/// Rows addressed as `(first non-zero frame, values from there on)`.
trait Segments<'a, A> {
    fn count(&self) -> usize;
    fn segment(&self, index: usize) -> (usize, ArrayView1<'a, A>);
}

impl<'a, A: Copy + Zero> Segments<'a, A> for DelayedStack<'a, A> {
    fn count(&self) -> usize {
        self.rows()
    }

    fn segment(&self, index: usize) -> (usize, ArrayView1<'a, A>) {
        DelayedStack::segment(self, index)
    }
}

impl<'a, A> Segments<'a, A> for ArrayView2<'a, A> {
    fn count(&self) -> usize {
        self.nrows()
    }

    fn segment(&self, index: usize) -> (usize, ArrayView1<'a, A>) {
        let rows = *self;
        (0, rows.index_axis_move(Axis(0), index))
    }
}

// out[i, j] = sum_{t >= from} w[t] * product(x[i, t], y[j, t])
fn contract<'a, A, X, Y>(
    x: &X,
    y: &Y,
    weights: ArrayView1<f64>,
    from: usize,
    product: impl Fn(A, A) -> A,
) -> Array2<A>
where
    A: Copy + Zero + Add<Output = A> + Mul<f64, Output = A> + 'a,
    X: Segments<'a, A>,
    Y: Segments<'a, A>,
{
    let frames = weights.len();
    let mut out = Array2::zeros((x.count(), y.count()));
    for i in 0..x.count() {
        let (x_start, x_values) = x.segment(i);
        for j in 0..y.count() {
            let (y_start, y_values) = y.segment(j);
            let lo = from.max(x_start).max(y_start);
            if lo >= frames {
                continue;
            }
            out[[i, j]] = Zip::from(weights.slice(s![lo..]))
                .and(x_values.slice(s![lo - x_start..]))
                .and(y_values.slice(s![lo - y_start..]))
                .fold(A::zero(), |acc, &w, &a, &b| acc + product(a, b) * w);
        }
    }
    out
}

fn times_conj(a: Complex64, b: Complex64) -> Complex64 {
    a * b.conj()
}

fn strided<'a>(
    stack: &DelayedStack<'a, Complex64>,
    y: ArrayView2<'a, Complex64>,
    weights: ArrayView1<f64>,
    from: usize,
) -> (Array2<Complex64>, Array2<Complex64>) {
    let r = contract(stack, stack, weights, from, times_conj);
    let p = contract(stack, &y, weights, from, times_conj);
    (r, p)
}

fn materialized(
    stack: &DelayedStack<Complex64>,
    y: ArrayView2<Complex64>,
    weights: ArrayView1<f64>,
    from: usize,
) -> (Array2<Complex64>, Array2<Complex64>) {
    let dense = stack.materialize();
    let dense = dense.slice(s![.., from..]);
    let weights = weights.slice(s![from..]).mapv(|w| Complex64::new(w, 0.0));
    let weighted = &dense * &weights;
    let r = weighted.dot(&hermite(dense));
    let p = weighted.dot(&hermite(y.slice(s![.., from..])));
    (r, p)
}

// a * conj(b) = (ar br + ai bi) + i (ai br - ar bi)
fn four_real<'a>(
    stack: &SplitStack<'a>,
    y: &'a SplitComplex,
    weights: ArrayView1<f64>,
    from: usize,
) -> (SplitComplex, SplitComplex) {
    let mul = |a: f64, b: f64| a * b;
    let (yr, yi) = (y.re.view(), y.im.view());

    let rr = contract(&stack.re, &stack.re, weights, from, mul);
    let ii = contract(&stack.im, &stack.im, weights, from, mul);
    let ir = contract(&stack.im, &stack.re, weights, from, mul);
    let ri = contract(&stack.re, &stack.im, weights, from, mul);
    let r = SplitComplex {
        re: rr + ii,
        im: ir - ri,
    };

    let rr = contract(&stack.re, &yr, weights, from, mul);
    let ii = contract(&stack.im, &yi, weights, from, mul);
    let ir = contract(&stack.im, &yr, weights, from, mul);
    let ri = contract(&stack.re, &yi, weights, from, mul);
    let p = SplitComplex {
        re: rr + ii,
        im: ir - ri,
    };
    (r, p)
}
