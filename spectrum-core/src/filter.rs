//! # Digital Filter Module
//!
//! Butterworth coefficient design and zero-phase (forward-backward) IIR
//! filtering for the incoming sample blocks.
//!
//! ## Features
//! - Butterworth low-pass and high-pass design via the bilinear transform
//! - Steady-state initial conditions so constant input produces no start-up transient
//! - Odd-symmetric edge extension before the forward and backward passes

use rustfft::num_complex::Complex64;
use std::f64::consts::PI;

use crate::error::FilterDesignError;

/// Order of the high-pass stage derived from the low cutoff.
pub const HIGH_PASS_ORDER: usize = 4;

/// Order of the low-pass stage derived from the high cutoff.
pub const LOW_PASS_ORDER: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    LowPass,
    HighPass,
}

/// Transfer function coefficients `b` (numerator) and `a` (denominator),
/// normalized so that `a[0] == 1` and both vectors share the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct Coefficients {
    b: Vec<f64>,
    a: Vec<f64>,
}

impl Coefficients {
    /// Builds coefficients from raw polynomials, normalizing by `a[0]` and
    /// zero-padding the shorter one. Returns `None` for an empty or
    /// degenerate denominator.
    pub fn from_ba(b: &[f64], a: &[f64]) -> Option<Self> {
        let a0 = *a.first()?;
        if b.is_empty() || a0 == 0.0 || !a0.is_finite() {
            return None;
        }
        let len = a.len().max(b.len());
        let mut b: Vec<f64> = b.iter().map(|v| v / a0).collect();
        let mut a: Vec<f64> = a.iter().map(|v| v / a0).collect();
        b.resize(len, 0.0);
        a.resize(len, 0.0);
        Some(Self { b, a })
    }

    /// Designs a digital Butterworth filter.
    ///
    /// # Arguments
    /// * `order` - Number of poles
    /// * `cutoff` - -3 dB frequency in Hz
    /// * `sample_rate` - Sample rate in Hz
    /// * `response` - Low-pass or high-pass
    ///
    /// # Returns
    /// * `Err(FilterDesignError::CutoffOutOfRange)` when the cutoff is not strictly
    ///   between 0 Hz and the Nyquist frequency
    pub fn butterworth(
        order: usize,
        cutoff: f64,
        sample_rate: u32,
        response: Response,
    ) -> Result<Self, FilterDesignError> {
        if order == 0 {
            return Err(FilterDesignError::ZeroOrder);
        }
        let wn = 2.0 * cutoff / sample_rate as f64;
        if !(wn > 0.0 && wn < 1.0) {
            return Err(FilterDesignError::CutoffOutOfRange(wn));
        }

        // Pre-warp for a bilinear transform with fs = 2.
        let fs = 2.0;
        let warped = 2.0 * fs * (PI * wn / fs).tan();
        let prototype = analog_prototype(order);

        let (zeros, poles, gain) = match response {
            Response::LowPass => {
                let poles: Vec<Complex64> = prototype.iter().map(|p| *p * warped).collect();
                (Vec::new(), poles, warped.powi(order as i32))
            }
            Response::HighPass => {
                let poles: Vec<Complex64> = prototype
                    .iter()
                    .map(|p| Complex64::new(warped, 0.0) / *p)
                    .collect();
                let gain = 1.0 / product(prototype.iter().map(|p| -*p)).re;
                (vec![Complex64::new(0.0, 0.0); order], poles, gain)
            }
        };

        let (zeros, poles, gain) = bilinear(zeros, poles, gain, fs);
        let b: Vec<f64> = expand(&zeros).iter().map(|c| c.re * gain).collect();
        let a: Vec<f64> = expand(&poles).iter().map(|c| c.re).collect();

        Self::from_ba(&b, &a).ok_or(FilterDesignError::CutoffOutOfRange(wn))
    }

    pub fn b(&self) -> &[f64] {
        &self.b
    }

    pub fn a(&self) -> &[f64] {
        &self.a
    }

    /// Applies the filter forward and then backward over `signal`.
    ///
    /// The output has zero phase shift and is time-aligned with the input.
    /// The signal is extended at both ends by odd reflection of length
    /// `3 * taps` (clamped for short blocks) and each pass starts from the
    /// steady state that matches its first sample.
    pub fn filtfilt(&self, signal: &[f64]) -> Vec<f64> {
        if signal.is_empty() {
            return Vec::new();
        }
        let len = signal.len();
        let pad = (3 * self.a.len()).min(len - 1);
        let first = signal[0];
        let last = signal[len - 1];

        let mut extended = Vec::with_capacity(len + 2 * pad);
        extended.extend((1..=pad).rev().map(|i| 2.0 * first - signal[i]));
        extended.extend_from_slice(signal);
        extended.extend((len - 1 - pad..len - 1).rev().map(|i| 2.0 * last - signal[i]));

        let zi = self.steady_state();

        let mut state: Vec<f64> = zi.iter().map(|z| z * extended[0]).collect();
        let mut forward = self.lfilter(&extended, &mut state);

        forward.reverse();
        let mut state: Vec<f64> = zi.iter().map(|z| z * forward[0]).collect();
        let mut backward = self.lfilter(&forward, &mut state);
        backward.reverse();

        backward[pad..pad + len].to_vec()
    }

    /// Direct form II transposed filtering of `signal`, updating `state` in place.
    fn lfilter(&self, signal: &[f64], state: &mut [f64]) -> Vec<f64> {
        let taps = self.a.len();
        signal
            .iter()
            .map(|&x| {
                let y = self.b[0] * x + state.first().copied().unwrap_or(0.0);
                for i in 0..taps - 1 {
                    let carried = if i + 1 < taps - 1 { state[i + 1] } else { 0.0 };
                    state[i] = self.b[i + 1] * x + carried - self.a[i + 1] * y;
                }
                y
            })
            .collect()
    }

    /// Filter state for a unit step that has been applied forever.
    fn steady_state(&self) -> Vec<f64> {
        let m = self.a.len() - 1;
        if m == 0 {
            return Vec::new();
        }
        // Solve (I - A) zi = B where A is the transposed companion matrix of `a`.
        let mut matrix = vec![vec![0.0; m]; m];
        for (i, row) in matrix.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                let companion = if j == 0 {
                    -self.a[i + 1]
                } else if i + 1 == j {
                    1.0
                } else {
                    0.0
                };
                let identity = if i == j { 1.0 } else { 0.0 };
                *cell = identity - companion;
            }
        }
        let rhs: Vec<f64> = (0..m)
            .map(|i| self.b[i + 1] - self.a[i + 1] * self.b[0])
            .collect();

        solve(matrix, rhs).unwrap_or_else(|| {
            log::warn!("[FILTER] Singular steady-state system, starting from rest");
            vec![0.0; m]
        })
    }
}

/// Poles of the normalized analog Butterworth prototype.
fn analog_prototype(order: usize) -> Vec<Complex64> {
    let n = order as f64;
    (0..order)
        .map(|k| {
            let m = (2 * k) as f64 - n + 1.0;
            -Complex64::from_polar(1.0, PI * m / (2.0 * n))
        })
        .collect()
}

/// Maps analog zeros, poles and gain to the z-plane.
fn bilinear(
    zeros: Vec<Complex64>,
    poles: Vec<Complex64>,
    gain: f64,
    fs: f64,
) -> (Vec<Complex64>, Vec<Complex64>, f64) {
    let fs2 = Complex64::new(2.0 * fs, 0.0);
    let degree = poles.len() - zeros.len();

    let mut digital_zeros: Vec<Complex64> = zeros.iter().map(|z| (fs2 + *z) / (fs2 - *z)).collect();
    digital_zeros.extend(std::iter::repeat_n(Complex64::new(-1.0, 0.0), degree));
    let digital_poles: Vec<Complex64> = poles.iter().map(|p| (fs2 + *p) / (fs2 - *p)).collect();

    let ratio = product(zeros.iter().map(|z| fs2 - *z)) / product(poles.iter().map(|p| fs2 - *p));
    (digital_zeros, digital_poles, gain * ratio.re)
}

fn product(values: impl Iterator<Item = Complex64>) -> Complex64 {
    values.fold(Complex64::new(1.0, 0.0), |acc, v| acc * v)
}

/// Monic polynomial coefficients (highest power first) with the given roots.
fn expand(roots: &[Complex64]) -> Vec<Complex64> {
    let mut coefficients = vec![Complex64::new(1.0, 0.0)];
    for root in roots {
        let mut next = vec![Complex64::new(0.0, 0.0); coefficients.len() + 1];
        for (i, c) in coefficients.iter().enumerate() {
            next[i] += *c;
            next[i + 1] -= *c * *root;
        }
        coefficients = next;
    }
    coefficients
}

/// Gaussian elimination with partial pivoting.
fn solve(mut matrix: Vec<Vec<f64>>, mut rhs: Vec<f64>) -> Option<Vec<f64>> {
    let n = rhs.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&x, &y| {
            matrix[x][col]
                .abs()
                .partial_cmp(&matrix[y][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if matrix[pivot][col].abs() < 1e-300 {
            return None;
        }
        matrix.swap(col, pivot);
        rhs.swap(col, pivot);

        for row in col + 1..n {
            let factor = matrix[row][col] / matrix[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                matrix[row][k] -= factor * matrix[col][k];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut solution = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| matrix[row][k] * solution[k]).sum();
        solution[row] = (rhs[row] - tail) / matrix[row][row];
    }
    Some(solution)
}

/// The high-pass / optional low-pass pair applied to every block.
#[derive(Debug, Clone)]
pub struct FilterBank {
    high_pass: Option<Coefficients>,
    low_pass: Option<Coefficients>,
}

impl FilterBank {
    pub fn new(sample_rate: u32, low_cutoff: f64, high_cutoff: f64) -> Self {
        let mut bank = Self {
            high_pass: None,
            low_pass: None,
        };
        bank.configure(sample_rate, low_cutoff, high_cutoff);
        bank
    }

    /// Recomputes both coefficient sets.
    ///
    /// A stage whose design fails is dropped and skipped by [`FilterBank::apply`].
    /// The low-pass stage is only designed while `high_cutoff` is below Nyquist.
    pub fn configure(&mut self, sample_rate: u32, low_cutoff: f64, high_cutoff: f64) {
        self.high_pass = design_stage(HIGH_PASS_ORDER, low_cutoff, sample_rate, Response::HighPass);

        self.low_pass = if high_cutoff < sample_rate as f64 / 2.0 {
            design_stage(LOW_PASS_ORDER, high_cutoff, sample_rate, Response::LowPass)
        } else {
            log::debug!(
                "[FILTER] Low-pass cutoff {} Hz is not below Nyquist at {} Hz, stage disabled",
                high_cutoff,
                sample_rate
            );
            None
        };
    }

    /// Runs the high-pass stage and then, if present, the low-pass stage.
    pub fn apply(&self, block: &[f64]) -> Vec<f64> {
        let mut filtered = match &self.high_pass {
            Some(stage) => stage.filtfilt(block),
            None => block.to_vec(),
        };
        if let Some(stage) = &self.low_pass {
            filtered = stage.filtfilt(&filtered);
        }
        filtered
    }

    pub fn high_pass(&self) -> Option<&Coefficients> {
        self.high_pass.as_ref()
    }

    pub fn low_pass(&self) -> Option<&Coefficients> {
        self.low_pass.as_ref()
    }
}

fn design_stage(order: usize, cutoff: f64, sample_rate: u32, response: Response) -> Option<Coefficients> {
    match Coefficients::butterworth(order, cutoff, sample_rate, response) {
        Ok(coefficients) => Some(coefficients),
        Err(e) => {
            log::warn!("[FILTER] Skipping {:?} stage at {} Hz: {}", response, cutoff, e);
            None
        }
    }
}
