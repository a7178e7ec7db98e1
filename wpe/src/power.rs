//! Per-frame inverse power used to weight the correlation statistics.

use std::fmt;

use ndarray::{Array1, ArrayView2, Axis, Zip};
use num_complex::Complex64;

use crate::complex::SplitComplex;
use crate::error::{WpeError, WpeResult};

/// Relative floor applied before inverting the power.
pub const POWER_FLOOR: f64 = 1e-10;

/// Temporal context of the power estimate.
///
/// Only the two extremes are supported: no smoothing (`psd_context = 0`)
/// and a single global average (`psd_context = +inf`). A finite positive
/// half-window is recognised but reported as not implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PsdContext {
    #[default]
    Frame,
    Global,
}

impl TryFrom<f64> for PsdContext {
    type Error = WpeError;

    fn try_from(value: f64) -> WpeResult<Self> {
        if value == f64::INFINITY {
            Ok(PsdContext::Global)
        } else if value == 0.0 {
            Ok(PsdContext::Frame)
        } else if value.is_finite() && value > 0.0 {
            Err(WpeError::not_implemented(format!(
                "psd_context = {value} (local power smoothing)"
            )))
        } else {
            Err(WpeError::invalid(format!("psd_context = {value}")))
        }
    }
}

impl From<PsdContext> for f64 {
    fn from(context: PsdContext) -> f64 {
        match context {
            PsdContext::Frame => 0.0,
            PsdContext::Global => f64::INFINITY,
        }
    }
}

impl fmt::Display for PsdContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PsdContext::Frame => write!(f, "0"),
            PsdContext::Global => write!(f, "inf"),
        }
    }
}

/// Mean squared magnitude over channels, one value per frame.
pub fn power(signal: ArrayView2<Complex64>) -> Array1<f64> {
    signal
        .mapv(|v| v.norm_sqr())
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(signal.ncols()))
}

pub fn power_split(signal: &SplitComplex) -> Array1<f64> {
    Zip::from(&signal.re)
        .and(&signal.im)
        .map_collect(|&re, &im| re * re + im * im)
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(signal.re.ncols()))
}

pub fn inverse_power(signal: ArrayView2<Complex64>, context: PsdContext) -> Array1<f64> {
    invert(power(signal), context)
}

pub fn inverse_power_split(signal: &SplitComplex, context: PsdContext) -> Array1<f64> {
    invert(power_split(signal), context)
}

fn invert(mut power: Array1<f64>, context: PsdContext) -> Array1<f64> {
    if context == PsdContext::Global {
        let mean = power.mean().unwrap_or(0.0);
        power.fill(mean);
    }
    let floor = POWER_FLOOR * power.fold(0.0f64, |acc, &p| acc.max(p));
    power.mapv_into(|p| 1.0 / p.max(floor))
}
