//! Prediction filter application, `X = Y - G^H Y~`.
//!
//! The delayed stack is never materialised: each stack row is a shifted
//! prefix of a source row, so the update is a sequence of scaled adds on
//! the tail of every output channel.

use ndarray::{Array2, ArrayView2, s};
use num_complex::Complex64;

use crate::complex::{ComplexMatrix, SignalView, SplitComplex};
use crate::embedding::{DelayedStack, SplitStack};
use crate::error::{WpeError, WpeResult};

/// Subtracts the predicted late reverberation from `signal`.
///
/// The result has the representation of `signal`; `filter` is converted
/// when it was solved in the other one.
pub fn apply(
    signal: SignalView,
    filter: &ComplexMatrix,
    taps: usize,
    delay: usize,
) -> WpeResult<ComplexMatrix> {
    let (channels, _) = signal.dim();
    let expected = [taps * channels, channels];
    let (rows, cols) = filter.dim();
    if rows != expected[0] || cols != expected[1] {
        return Err(WpeError::shape("filter", &expected, &[rows, cols]));
    }

    match signal {
        SignalView::Native(y) => {
            let converted;
            let g = match filter {
                ComplexMatrix::Native(g) => g,
                ComplexMatrix::Split(g) => {
                    converted = g.to_native();
                    &converted
                }
            };
            let stack = DelayedStack::new(y, taps, delay)?;
            Ok(ComplexMatrix::Native(apply_native(y, g.view(), &stack)))
        }
        SignalView::Split(y) => {
            let converted;
            let g = match filter {
                ComplexMatrix::Split(g) => g,
                ComplexMatrix::Native(g) => {
                    converted = SplitComplex::from_native(g.view());
                    &converted
                }
            };
            let stack = SplitStack::new(y, taps, delay)?;
            Ok(ComplexMatrix::Split(apply_split(y, g, &stack)))
        }
    }
}

fn apply_native(
    y: ArrayView2<Complex64>,
    g: ArrayView2<Complex64>,
    stack: &DelayedStack<Complex64>,
) -> Array2<Complex64> {
    let mut x = y.to_owned();
    for row in 0..stack.rows() {
        let (start, values) = stack.segment(row);
        for (d, coefficient) in g.row(row).iter().enumerate() {
            x.slice_mut(s![d, start..])
                .scaled_add(-coefficient.conj(), &values);
        }
    }
    x
}

// conj(g) * y~ = (gr yr + gi yi) + i (gr yi - gi yr)
fn apply_split(y: &SplitComplex, g: &SplitComplex, stack: &SplitStack) -> SplitComplex {
    let mut x = y.clone();
    for row in 0..stack.rows() {
        let (start, re) = stack.re.segment(row);
        let (_, im) = stack.im.segment(row);
        for d in 0..g.re.ncols() {
            let (gr, gi) = (g.re[[row, d]], g.im[[row, d]]);
            let mut x_re = x.re.slice_mut(s![d, start..]);
            x_re.scaled_add(-gr, &re);
            x_re.scaled_add(-gi, &im);
            let mut x_im = x.im.slice_mut(s![d, start..]);
            x_im.scaled_add(-gr, &im);
            x_im.scaled_add(gi, &re);
        }
    }
    x
}
