//! WPE configuration.

use std::fmt;

use crate::correlation::{Estimator, StatisticsMode};
use crate::error::{WpeError, WpeResult};
use crate::power::PsdContext;
use crate::solve::Solver;

pub const DEFAULT_TAPS: usize = 10;
pub const DEFAULT_DELAY: usize = 3;
pub const DEFAULT_ITERATIONS: usize = 3;

/// Options recognised by every WPE entry point.
///
/// `psd_context` stays a plain number so that out-of-domain values can be
/// reported the way they were given; [`WpeConfig::validate`] maps it onto
/// [`PsdContext`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WpeConfig {
    /// Prediction filter order per channel.
    pub taps: usize,
    /// Minimum prediction lag in frames.
    pub delay: usize,
    /// Refinement rounds; `0` returns the input unchanged.
    pub iterations: usize,
    /// `0` for per-frame power, `f64::INFINITY` for one global power.
    pub psd_context: f64,
    pub statistics: StatisticsMode,
    pub estimator: Estimator,
    pub solver: Solver,
}

impl Default for WpeConfig {
    fn default() -> Self {
        Self {
            taps: DEFAULT_TAPS,
            delay: DEFAULT_DELAY,
            iterations: DEFAULT_ITERATIONS,
            psd_context: 0.0,
            statistics: StatisticsMode::Full,
            estimator: Estimator::Strided,
            solver: Solver::Lu,
        }
    }
}

impl WpeConfig {
    pub fn new(taps: usize, delay: usize, iterations: usize) -> Self {
        Self {
            taps,
            delay,
            iterations,
            ..Self::default()
        }
    }

    pub fn with_psd_context(mut self, psd_context: f64) -> Self {
        self.psd_context = psd_context;
        self
    }

    pub fn with_statistics(mut self, statistics: StatisticsMode) -> Self {
        self.statistics = statistics;
        self
    }

    pub fn with_estimator(mut self, estimator: Estimator) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_solver(mut self, solver: Solver) -> Self {
        self.solver = solver;
        self
    }

    pub fn psd(&self) -> WpeResult<PsdContext> {
        PsdContext::try_from(self.psd_context)
    }

    /// Checks every option before any array work is done.
    pub fn validate(&self) -> WpeResult<PsdContext> {
        if self.taps == 0 {
            return Err(WpeError::invalid("taps must be at least 1"));
        }
        if self.delay.checked_add(self.taps).is_none() {
            return Err(WpeError::invalid(format!(
                "delay {} plus taps {} overflows the frame index",
                self.delay, self.taps
            )));
        }
        let context = self.psd()?;
        let representation = self.estimator.representation();
        if !self.solver.accepts(representation) {
            return Err(WpeError::invalid(format!(
                "solver '{}' cannot solve the {representation:?} statistics of estimator '{}'",
                self.solver, self.estimator
            )));
        }
        Ok(context)
    }
}

impl fmt::Display for WpeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "taps={} delay={} iterations={} psd_context={} statistics={} estimator={} solver={}",
            self.taps,
            self.delay,
            self.iterations,
            self.psd_context,
            self.statistics,
            self.estimator,
            self.solver
        )
    }
}
