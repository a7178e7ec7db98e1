//! Paired real/imaginary representation and conversions to native complex.

use ndarray::{Array2, ArrayView, ArrayView2, Dimension, Zip};
use num_complex::Complex64;

use crate::error::{WpeError, WpeResult};

/// Complex matrix stored as two real matrices of identical shape.
///
/// Every WPE entry point accepts this form next to `Array2<Complex64>`;
/// the `FourReal` estimator and the real-block solvers work on it directly.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitComplex {
    pub re: Array2<f64>,
    pub im: Array2<f64>,
}

impl SplitComplex {
    pub fn new(re: Array2<f64>, im: Array2<f64>) -> WpeResult<Self> {
        if re.dim() != im.dim() {
            return Err(WpeError::shape("imaginary part", re.shape(), im.shape()));
        }
        Ok(Self { re, im })
    }

    /// Purely real signal, imaginary part zero.
    pub fn from_real(re: Array2<f64>) -> Self {
        let im = Array2::zeros(re.raw_dim());
        Self { re, im }
    }

    pub fn from_native(x: ArrayView2<Complex64>) -> Self {
        Self {
            re: x.mapv(|v| v.re),
            im: x.mapv(|v| v.im),
        }
    }

    pub fn to_native(&self) -> Array2<Complex64> {
        Zip::from(&self.re)
            .and(&self.im)
            .map_collect(|&re, &im| Complex64::new(re, im))
    }

    pub fn dim(&self) -> (usize, usize) {
        self.re.dim()
    }
}

impl From<&Array2<Complex64>> for SplitComplex {
    fn from(x: &Array2<Complex64>) -> Self {
        SplitComplex::from_native(x.view())
    }
}

/// Representation a complex matrix is stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    Native,
    Split,
}

/// Complex matrix in either representation.
#[derive(Debug, Clone, PartialEq)]
pub enum ComplexMatrix {
    Native(Array2<Complex64>),
    Split(SplitComplex),
}

impl ComplexMatrix {
    pub fn representation(&self) -> Representation {
        match self {
            ComplexMatrix::Native(_) => Representation::Native,
            ComplexMatrix::Split(_) => Representation::Split,
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        match self {
            ComplexMatrix::Native(m) => m.dim(),
            ComplexMatrix::Split(m) => m.dim(),
        }
    }

    pub fn to_native(&self) -> Array2<Complex64> {
        match self {
            ComplexMatrix::Native(m) => m.clone(),
            ComplexMatrix::Split(m) => m.to_native(),
        }
    }

    pub fn into_native(self) -> Array2<Complex64> {
        match self {
            ComplexMatrix::Native(m) => m,
            ComplexMatrix::Split(m) => m.to_native(),
        }
    }

    pub fn into_split(self) -> SplitComplex {
        match self {
            ComplexMatrix::Native(m) => SplitComplex::from_native(m.view()),
            ComplexMatrix::Split(m) => m,
        }
    }

    /// Sum of squared magnitudes.
    pub fn energy(&self) -> f64 {
        match self {
            ComplexMatrix::Native(m) => m.iter().map(|v| v.norm_sqr()).sum(),
            ComplexMatrix::Split(m) => m.re.iter().chain(m.im.iter()).map(|v| v * v).sum(),
        }
    }

    pub fn view(&self) -> SignalView<'_> {
        match self {
            ComplexMatrix::Native(m) => SignalView::Native(m.view()),
            ComplexMatrix::Split(m) => SignalView::Split(m),
        }
    }
}

/// Borrowed signal in either representation.
#[derive(Debug, Clone, Copy)]
pub enum SignalView<'a> {
    Native(ArrayView2<'a, Complex64>),
    Split(&'a SplitComplex),
}

impl SignalView<'_> {
    pub fn representation(&self) -> Representation {
        match self {
            SignalView::Native(_) => Representation::Native,
            SignalView::Split(_) => Representation::Split,
        }
    }

    /// (channels, frames)
    pub fn dim(&self) -> (usize, usize) {
        match self {
            SignalView::Native(y) => y.dim(),
            SignalView::Split(y) => y.dim(),
        }
    }

    pub fn to_matrix(&self) -> ComplexMatrix {
        match self {
            SignalView::Native(y) => ComplexMatrix::Native(y.to_owned()),
            SignalView::Split(y) => ComplexMatrix::Split((*y).clone()),
        }
    }
}

/// Conjugate transpose.
pub fn hermite(x: ArrayView2<Complex64>) -> Array2<Complex64> {
    x.t().mapv(|v| v.conj())
}

/// Largest elementwise distance between two complex arrays of equal shape.
///
/// Returns `f64::INFINITY` when the shapes differ.
pub fn max_abs_diff<D: Dimension>(
    a: &ArrayView<Complex64, D>,
    b: &ArrayView<Complex64, D>,
) -> f64 {
    if a.shape() != b.shape() {
        return f64::INFINITY;
    }
    Zip::from(a)
        .and(b)
        .fold(0.0f64, |acc, x, y| acc.max((x - y).norm()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_native_round_trip() {
        let x = array![
            [Complex64::new(1.0, -2.0), Complex64::new(0.5, 0.25)],
            [Complex64::new(-3.0, 4.0), Complex64::new(0.0, 1.0)]
        ];
        let split = SplitComplex::from(&x);
        assert_eq!(split.re, array![[1.0, 0.5], [-3.0, 0.0]]);
        assert_eq!(split.im, array![[-2.0, 0.25], [4.0, 1.0]]);
        assert_eq!(split.to_native(), x);
    }

    #[test]
    fn test_mismatched_parts_rejected() {
        let err = SplitComplex::new(Array2::zeros((2, 3)), Array2::zeros((3, 2))).unwrap_err();
        assert!(matches!(err, WpeError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_hermite() {
        let x = array![[Complex64::new(1.0, 1.0), Complex64::new(2.0, -1.0)]];
        let h = hermite(x.view());
        assert_eq!(h.dim(), (2, 1));
        assert_eq!(h[[0, 0]], Complex64::new(1.0, -1.0));
        assert_eq!(h[[1, 0]], Complex64::new(2.0, 1.0));
    }
}
