//! Dense linear solves for the WPE normal equations `R G = P`.
//!
//! All strategies solve the same system and agree to rounding error; the
//! choice only affects which representation the operands live in and how
//! the work is organised. A pivot that is zero, non-finite, or below
//! `n * eps * |R|_inf` is reported as [`WpeError::Singular`]; there is no
//! silent pseudo-inverse fallback.

use std::fmt;
use std::str::FromStr;

use faer::linalg::solvers::{PartialPivLu, Solve};
use faer::traits::ComplexField;
use faer::{Mat, MatRef};
use ndarray::{Array2, ArrayView2, LinalgScalar, s};
use num_complex::Complex64;
use tracing::trace;

use crate::complex::{ComplexMatrix, Representation, SplitComplex};
use crate::error::{WpeError, WpeResult};

/// Field element the factorisations work over.
pub trait Scalar: ComplexField + LinalgScalar + fmt::Debug {
    fn magnitude(self) -> f64;
}

impl Scalar for f64 {
    fn magnitude(self) -> f64 {
        self.abs()
    }
}

impl Scalar for Complex64 {
    fn magnitude(self) -> f64 {
        self.norm()
    }
}

/// Linear solve strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Solver {
    /// LU with partial pivoting on native complex operands.
    #[default]
    Lu,
    /// Explicit inverse of `R` from its LU factors, then `R^-1 P`.
    Inverse,
    /// Converts split operands to native complex and runs [`Solver::Lu`].
    ConvertLu,
    /// LU on the real embedding `[[Rr, -Ri], [Ri, Rr]]` of split operands.
    RealBlockLu,
    /// Inverse of the real embedding, then a real matrix product.
    RealBlockInverse,
}

impl Solver {
    pub const ALL: [Solver; 5] = [
        Solver::Lu,
        Solver::Inverse,
        Solver::ConvertLu,
        Solver::RealBlockLu,
        Solver::RealBlockInverse,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Solver::Lu => "lu",
            Solver::Inverse => "inverse",
            Solver::ConvertLu => "convert-lu",
            Solver::RealBlockLu => "real-block-lu",
            Solver::RealBlockInverse => "real-block-inverse",
        }
    }

    pub fn accepts(&self, representation: Representation) -> bool {
        match self {
            Solver::Lu | Solver::Inverse => representation == Representation::Native,
            Solver::ConvertLu => true,
            Solver::RealBlockLu | Solver::RealBlockInverse => {
                representation == Representation::Split
            }
        }
    }

    /// Solves `r g = p`; `g` comes back in the representation of the inputs.
    pub fn solve(&self, r: &ComplexMatrix, p: &ComplexMatrix) -> WpeResult<ComplexMatrix> {
        let representation = r.representation();
        if p.representation() != representation {
            return Err(WpeError::invalid(
                "correlation matrices R and P use different representations",
            ));
        }
        if !self.accepts(representation) {
            return Err(WpeError::invalid(format!(
                "solver '{self}' does not accept {representation:?} operands"
            )));
        }
        let (rows, cols) = r.dim();
        if rows != cols {
            return Err(WpeError::shape("R", &[rows, rows], &[rows, cols]));
        }
        if p.dim().0 != rows {
            return Err(WpeError::shape("P", &[rows, p.dim().1], &[p.dim().0, p.dim().1]));
        }
        trace!(solver = %self, size = rows, rhs = p.dim().1, "solving correlation system");

        match (self, r, p) {
            (Solver::Lu, ComplexMatrix::Native(r), ComplexMatrix::Native(p)) => {
                Ok(ComplexMatrix::Native(lu_solve(r.view(), p.view())?))
            }
            (Solver::Inverse, ComplexMatrix::Native(r), ComplexMatrix::Native(p)) => {
                Ok(ComplexMatrix::Native(invert(r.view())?.dot(p)))
            }
            (Solver::ConvertLu, ComplexMatrix::Native(r), ComplexMatrix::Native(p)) => {
                Ok(ComplexMatrix::Native(lu_solve(r.view(), p.view())?))
            }
            (Solver::ConvertLu, ComplexMatrix::Split(r), ComplexMatrix::Split(p)) => {
                let g = lu_solve(r.to_native().view(), p.to_native().view())?;
                Ok(ComplexMatrix::Split(SplitComplex::from_native(g.view())))
            }
            (Solver::RealBlockLu, ComplexMatrix::Split(r), ComplexMatrix::Split(p)) => {
                let stacked = lu_solve(real_block(r).view(), stack_parts(p).view())?;
                Ok(ComplexMatrix::Split(unstack_parts(stacked, rows)))
            }
            (Solver::RealBlockInverse, ComplexMatrix::Split(r), ComplexMatrix::Split(p)) => {
                let stacked = invert(real_block(r).view())?.dot(&stack_parts(p));
                Ok(ComplexMatrix::Split(unstack_parts(stacked, rows)))
            }
            // `accepts` rules out every other pairing
            _ => Err(WpeError::invalid(format!(
                "solver '{self}' does not accept {representation:?} operands"
            ))),
        }
    }
}

impl fmt::Display for Solver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Solver {
    type Err = WpeError;

    fn from_str(s: &str) -> WpeResult<Self> {
        Solver::ALL
            .into_iter()
            .find(|solver| solver.name() == s)
            .ok_or_else(|| WpeError::invalid(format!("unknown solver '{s}'")))
    }
}

/// faer's partial-pivot LU, rejected when a pivot of `U` is not finite or
/// not above `n * eps * |A|_inf`.
pub struct Lu<A: Scalar> {
    factors: PartialPivLu<A>,
    size: usize,
}

impl<A: Scalar> Lu<A> {
    pub fn factor(matrix: ArrayView2<A>) -> WpeResult<Self> {
        let n = matrix.nrows();
        if matrix.ncols() != n {
            return Err(WpeError::shape("matrix", &[n, n], matrix.shape()));
        }
        let factors = PartialPivLu::new(to_faer(matrix).as_ref());
        check_pivots(factors.U(), singular_tolerance(matrix))?;
        Ok(Self { factors, size: n })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn solve(&self, rhs: ArrayView2<A>) -> WpeResult<Array2<A>> {
        let n = self.size;
        if rhs.nrows() != n {
            return Err(WpeError::shape("right-hand side", &[n, rhs.ncols()], rhs.shape()));
        }
        let x = self.factors.solve(to_faer(rhs).as_ref());
        Ok(from_faer(&x))
    }

    pub fn inverse(&self) -> Array2<A> {
        let identity = to_faer(Array2::<A>::eye(self.size).view());
        from_faer(&self.factors.solve(identity.as_ref()))
    }
}

/// Solves `a x = b`.
pub fn lu_solve<A: Scalar>(a: ArrayView2<A>, b: ArrayView2<A>) -> WpeResult<Array2<A>> {
    Lu::factor(a)?.solve(b)
}

pub fn invert<A: Scalar>(a: ArrayView2<A>) -> WpeResult<Array2<A>> {
    Ok(Lu::factor(a)?.inverse())
}

fn to_faer<A: Scalar>(a: ArrayView2<A>) -> Mat<A> {
    Mat::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

fn from_faer<A: Scalar>(m: &Mat<A>) -> Array2<A> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

fn singular_tolerance<A: Scalar>(a: ArrayView2<A>) -> f64 {
    let norm = a
        .rows()
        .into_iter()
        .map(|row| row.iter().map(|v| v.magnitude()).sum::<f64>())
        .fold(0.0f64, f64::max);
    a.nrows() as f64 * f64::EPSILON * norm
}

fn check_pivots<A: Scalar>(u: MatRef<'_, A>, tolerance: f64) -> WpeResult<()> {
    let n = u.nrows();
    let mut smallest = f64::INFINITY;
    for column in 0..n {
        let pivot = u[(column, column)].magnitude();
        if !pivot.is_finite() || pivot <= tolerance {
            return Err(WpeError::Singular {
                size: n,
                column,
                pivot,
            });
        }
        smallest = smallest.min(pivot);
    }
    trace!(size = n, smallest_pivot = smallest, tolerance, "lu pivots accepted");
    Ok(())
}

// [[re, -im], [im, re]]
fn real_block(m: &SplitComplex) -> Array2<f64> {
    let (rows, cols) = m.dim();
    let mut block = Array2::zeros((2 * rows, 2 * cols));
    block.slice_mut(s![..rows, ..cols]).assign(&m.re);
    block.slice_mut(s![..rows, cols..]).assign(&m.im.mapv(|v| -v));
    block.slice_mut(s![rows.., ..cols]).assign(&m.im);
    block.slice_mut(s![rows.., cols..]).assign(&m.re);
    block
}

// [re; im]
fn stack_parts(m: &SplitComplex) -> Array2<f64> {
    let (rows, cols) = m.dim();
    let mut stacked = Array2::zeros((2 * rows, cols));
    stacked.slice_mut(s![..rows, ..]).assign(&m.re);
    stacked.slice_mut(s![rows.., ..]).assign(&m.im);
    stacked
}

fn unstack_parts(stacked: Array2<f64>, rows: usize) -> SplitComplex {
    SplitComplex {
        re: stacked.slice(s![..rows, ..]).to_owned(),
        im: stacked.slice(s![rows.., ..]).to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complex::max_abs_diff;
    use crate::synthetic::complex_gaussian;
    use ndarray::array;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn hermitian_system(n: usize, m: usize, seed: u64) -> (Array2<Complex64>, Array2<Complex64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let b = complex_gaussian(&mut rng, (n, 3 * n));
        let r = b.dot(&crate::complex::hermite(b.view()));
        let p = complex_gaussian(&mut rng, (n, m));
        (r, p)
    }

    #[test]
    fn test_lu_residual() {
        let (r, p) = hermitian_system(8, 2, 1);
        let g = lu_solve(r.view(), p.view()).unwrap();
        let residual = r.dot(&g);
        assert!(max_abs_diff(&residual.view(), &p.view()) < 1e-9);
    }

    #[test]
    fn test_real_lu_and_inverse() {
        let a = array![[4.0, 3.0, 0.0], [6.0, 3.0, 1.0], [0.0, 2.0, 5.0]];
        let b = array![[1.0], [2.0], [3.0]];
        let x = lu_solve(a.view(), b.view()).unwrap();
        let back = a.dot(&x);
        for (got, want) in back.iter().zip(b.iter()) {
            assert!((got - want).abs() < 1e-12);
        }
        let inv = invert(a.view()).unwrap();
        let eye = a.dot(&inv);
        for ((i, j), v) in eye.indexed_iter() {
            let want = if i == j { 1.0 } else { 0.0 };
            assert!((v - want).abs() < 1e-12);
        }
    }

    #[test]
    fn test_strategies_agree() {
        let (r, p) = hermitian_system(12, 3, 7);
        let reference = Solver::Lu
            .solve(&ComplexMatrix::Native(r.clone()), &ComplexMatrix::Native(p.clone()))
            .unwrap()
            .into_native();
        let scale = reference.iter().fold(0.0f64, |acc, v| acc.max(v.norm()));

        let r_split = ComplexMatrix::Split(SplitComplex::from_native(r.view()));
        let p_split = ComplexMatrix::Split(SplitComplex::from_native(p.view()));
        for solver in Solver::ALL {
            let (r_in, p_in) = if solver.accepts(Representation::Native) {
                (ComplexMatrix::Native(r.clone()), ComplexMatrix::Native(p.clone()))
            } else {
                (r_split.clone(), p_split.clone())
            };
            let g = solver.solve(&r_in, &p_in).unwrap().into_native();
            let diff = max_abs_diff(&g.view(), &reference.view());
            assert!(diff <= 1e-6 * scale, "{solver}: {diff}");
        }

        let g = Solver::ConvertLu.solve(&r_split, &p_split).unwrap();
        assert_eq!(g.representation(), Representation::Split);
    }

    #[test]
    fn test_singular_matrix_detected() {
        // rank one: [1, -2i]^T [1, -2i]^H
        let r = array![
            [Complex64::new(1.0, 0.0), Complex64::new(0.0, 2.0)],
            [Complex64::new(0.0, -2.0), Complex64::new(4.0, 0.0)]
        ];
        let p = Array2::from_elem((2, 1), Complex64::new(1.0, 0.0));
        for solver in Solver::ALL {
            let (r_in, p_in) = if solver.accepts(Representation::Native) {
                (ComplexMatrix::Native(r.clone()), ComplexMatrix::Native(p.clone()))
            } else {
                (
                    ComplexMatrix::Split(SplitComplex::from_native(r.view())),
                    ComplexMatrix::Split(SplitComplex::from_native(p.view())),
                )
            };
            let err = solver.solve(&r_in, &p_in).unwrap_err();
            assert!(err.is_numerical(), "{solver}: {err}");
        }

        let zeros = Array2::<f64>::zeros((3, 3));
        assert!(matches!(invert(zeros.view()), Err(WpeError::Singular { .. })));
    }

    #[test]
    fn test_lu_rejects_bad_pivots() {
        let a = array![[2.0, 0.0], [0.0, 0.0]];
        assert!(matches!(
            Lu::factor(a.view()),
            Err(WpeError::Singular { size: 2, column: 1, .. })
        ));
        let wide = Array2::<f64>::zeros((2, 3));
        assert!(matches!(
            Lu::factor(wide.view()),
            Err(WpeError::ShapeMismatch { what: "matrix", .. })
        ));
        let lu = Lu::factor(array![[2.0, 1.0], [1.0, 3.0]].view()).unwrap();
        assert_eq!(lu.size(), 2);
        assert!(matches!(
            lu.solve(Array2::<f64>::zeros((3, 1)).view()),
            Err(WpeError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_representation_mismatch() {
        let (r, p) = hermitian_system(4, 1, 3);
        let native = (ComplexMatrix::Native(r.clone()), ComplexMatrix::Native(p.clone()));
        let split = (
            ComplexMatrix::Split(SplitComplex::from_native(r.view())),
            ComplexMatrix::Split(SplitComplex::from_native(p.view())),
        );
        for solver in [Solver::RealBlockLu, Solver::RealBlockInverse] {
            assert!(matches!(
                solver.solve(&native.0, &native.1),
                Err(WpeError::InvalidArgument(_))
            ));
        }
        for solver in [Solver::Lu, Solver::Inverse] {
            assert!(matches!(
                solver.solve(&split.0, &split.1),
                Err(WpeError::InvalidArgument(_))
            ));
        }
        assert!(matches!(
            Solver::ConvertLu.solve(&native.0, &split.1),
            Err(WpeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_shape_checks() {
        let (r, _) = hermitian_system(4, 1, 5);
        let p = Array2::zeros((3, 1));
        let err = Solver::Lu
            .solve(&ComplexMatrix::Native(r), &ComplexMatrix::Native(p))
            .unwrap_err();
        assert!(matches!(err, WpeError::ShapeMismatch { what: "P", .. }));
    }

    #[test]
    fn test_names_round_trip() {
        for solver in Solver::ALL {
            assert_eq!(solver.name().parse::<Solver>().unwrap(), solver);
        }
        assert!(matches!(
            "cholesky".parse::<Solver>(),
            Err(WpeError::InvalidArgument(_))
        ));
    }
}
