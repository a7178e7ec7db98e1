//! Weighted Prediction Error (WPE) dereverberation of multi-channel STFT
//! signals.
//!
//! A frequency bin is a (channels, frames) complex array. WPE predicts the
//! late reverberation of every frame from frames at least `delay` frames in
//! the past and subtracts it, re-weighting the prediction by the inverse
//! power of the current estimate on every iteration.
//!
//! Complex data is accepted either natively ([`Complex64`]) or as a pair of
//! real arrays ([`SplitComplex`]); the estimator and solver strategies in
//! [`WpeConfig`] pick how the statistics are accumulated and solved.

pub mod complex;
pub mod config;
pub mod correlation;
pub mod dereverb;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod power;
pub mod solve;
pub mod synthetic;

pub use num_complex::Complex64;

pub use complex::{ComplexMatrix, Representation, SignalView, SplitComplex, hermite, max_abs_diff};
pub use config::WpeConfig;
pub use correlation::{Correlation, Estimator, StatisticsMode};
pub use dereverb::{wpe, wpe_batched, wpe_split, wpe_step, wpe_step_batched, wpe_step_split};
pub use embedding::{DelayedStack, build_y_tilde};
pub use error::{WpeError, WpeResult};
pub use power::{PsdContext, inverse_power, inverse_power_split};
pub use solve::Solver;
