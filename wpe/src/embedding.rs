//! Delay embedding ("Y tilde") of a multi-channel spectrum.
//!
//! The stack has `taps * channels` rows. Row `k * D + d` holds channel `d`
//! shifted right by `delay + k` frames, zero-padded on the left:
//!
//! ```text
//! stack[k * D + d, t] = Y[d, t - delay - k]   if t >= delay + k
//!                     = 0                     otherwise
//! ```
//!
//! [`DelayedStack`] never copies the signal. Every logical row is a prefix
//! of one source row, so consumers walk [`DelayedStack::segment`] instead of
//! touching the zero padding. [`DelayedStack::materialize`] builds the dense
//! `(taps * D, T)` array for code that wants plain matrix products.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, s};
use num_traits::Zero;

use crate::complex::SplitComplex;
use crate::error::{WpeError, WpeResult};

/// Lazy, non-owning view of the delayed observation stack.
#[derive(Debug, Clone, Copy)]
pub struct DelayedStack<'a, A> {
    source: ArrayView2<'a, A>,
    taps: usize,
    delay: usize,
}

impl<'a, A: Copy + Zero> DelayedStack<'a, A> {
    pub fn new(source: ArrayView2<'a, A>, taps: usize, delay: usize) -> WpeResult<Self> {
        if taps == 0 {
            return Err(WpeError::invalid("taps must be at least 1"));
        }
        if delay.checked_add(taps).is_none() {
            return Err(WpeError::invalid("delay plus taps overflows the frame index"));
        }
        Ok(Self {
            source,
            taps,
            delay,
        })
    }

    pub fn source(&self) -> ArrayView2<'a, A> {
        self.source
    }

    pub fn taps(&self) -> usize {
        self.taps
    }

    pub fn delay(&self) -> usize {
        self.delay
    }

    pub fn channels(&self) -> usize {
        self.source.nrows()
    }

    pub fn frames(&self) -> usize {
        self.source.ncols()
    }

    pub fn rows(&self) -> usize {
        self.taps * self.channels()
    }

    /// First frame at which every row has full causal history.
    pub fn valid_start(&self) -> usize {
        self.delay + self.taps - 1
    }

    /// Channel and shift backing a logical row.
    pub fn source_row(&self, row: usize) -> (usize, usize) {
        let channels = self.channels();
        (row % channels, self.delay + row / channels)
    }

    pub fn get(&self, row: usize, col: usize) -> A {
        let (channel, shift) = self.source_row(row);
        if col < shift {
            A::zero()
        } else {
            self.source[[channel, col - shift]]
        }
    }

    /// Non-zero part of a row.
    ///
    /// Returns `(start, values)`: stack frames `start..T` equal `values`,
    /// everything before `start` is zero. `values` borrows the source.
    pub fn segment(&self, row: usize) -> (usize, ArrayView1<'a, A>) {
        let (channel, shift) = self.source_row(row);
        let frames = self.frames();
        let start = shift.min(frames);
        let source = self.source;
        (start, source.slice_move(s![channel, ..frames - start]))
    }

    pub fn row(&self, row: usize) -> Array1<A> {
        let mut out = Array1::zeros(self.frames());
        let (start, values) = self.segment(row);
        out.slice_mut(s![start..]).assign(&values);
        out
    }

    pub fn materialize(&self) -> Array2<A> {
        let mut out = Array2::zeros((self.rows(), self.frames()));
        for row in 0..self.rows() {
            let (start, values) = self.segment(row);
            out.slice_mut(s![row, start..]).assign(&values);
        }
        out
    }
}

/// Dense delay embedding of `y`.
pub fn build_y_tilde<A: Copy + Zero>(
    y: ArrayView2<A>,
    taps: usize,
    delay: usize,
) -> WpeResult<Array2<A>> {
    Ok(DelayedStack::new(y, taps, delay)?.materialize())
}

/// Delay embedding of a split signal, one real stack per component.
#[derive(Debug, Clone, Copy)]
pub struct SplitStack<'a> {
    pub re: DelayedStack<'a, f64>,
    pub im: DelayedStack<'a, f64>,
}

impl<'a> SplitStack<'a> {
    pub fn new(y: &'a SplitComplex, taps: usize, delay: usize) -> WpeResult<Self> {
        Ok(Self {
            re: DelayedStack::new(y.re.view(), taps, delay)?,
            im: DelayedStack::new(y.im.view(), taps, delay)?,
        })
    }

    pub fn rows(&self) -> usize {
        self.re.rows()
    }

    pub fn materialize(&self) -> SplitComplex {
        SplitComplex {
            re: self.re.materialize(),
            im: self.im.materialize(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    // Y[d, t] = 2 t + d + 1, i.e. 1..=40 laid out frame-major
    fn ramp(channels: usize, frames: usize) -> Array2<f64> {
        Array2::from_shape_fn((channels, frames), |(d, t)| (channels * t + d + 1) as f64)
    }

    #[test]
    fn test_shift_layout() {
        let y = ramp(2, 20);
        let stack = build_y_tilde(y.view(), 4, 2).unwrap();
        assert_eq!(stack.dim(), (8, 20));

        // block 0: shifted by the delay only
        assert_eq!(stack.row(0).to_vec()[..5], [0.0, 0.0, 1.0, 3.0, 5.0]);
        assert_eq!(stack.row(1).to_vec()[..5], [0.0, 0.0, 2.0, 4.0, 6.0]);
        assert_eq!(stack[[0, 19]], 35.0);
        // last block: shifted by delay + taps - 1
        assert_eq!(stack.row(6).to_vec()[..7], [0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 3.0]);
        assert_eq!(stack[[7, 19]], 30.0);
    }

    #[test]
    fn test_zero_padding_for_all_configurations() {
        let y = ramp(3, 12);
        for taps in 1..5 {
            for delay in 0..4 {
                let view = DelayedStack::new(y.view(), taps, delay).unwrap();
                let dense = view.materialize();
                for k in 0..taps {
                    for d in 0..3 {
                        let row = k * 3 + d;
                        for t in 0..12 {
                            let expected = if t >= delay + k {
                                y[[d, t - delay - k]]
                            } else {
                                0.0
                            };
                            assert_eq!(dense[[row, t]], expected);
                            assert_eq!(view.get(row, t), expected);
                        }
                    }
                }
                for t in 0..delay.min(12) {
                    assert!(dense.column(t).iter().all(|&v| v == 0.0));
                }
                for t in view.valid_start()..12 {
                    assert!(dense.column(t).iter().all(|&v| v != 0.0));
                }
            }
        }
    }

    #[test]
    fn test_shift_beyond_signal() {
        let y = ramp(1, 3);
        let view = DelayedStack::new(y.view(), 2, 3).unwrap();
        let (start, values) = view.segment(1);
        assert_eq!(start, 3);
        assert_eq!(values.len(), 0);
        assert!(view.materialize().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_zero_taps_rejected() {
        let y = ramp(2, 4);
        assert!(matches!(
            DelayedStack::new(y.view(), 0, 1),
            Err(WpeError::InvalidArgument(_))
        ));
        assert!(matches!(
            DelayedStack::new(y.view(), 3, usize::MAX - 1),
            Err(WpeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_split_matches_native() {
        let y = Array2::from_shape_fn((2, 9), |(d, t)| {
            Complex64::new(t as f64 + 1.0, -(d as f64) - 0.5)
        });
        let split = SplitComplex::from_native(y.view());
        let native = build_y_tilde(y.view(), 3, 1).unwrap();
        let stacked = SplitStack::new(&split, 3, 1).unwrap().materialize();
        assert_eq!(stacked.to_native(), native);
    }
}
