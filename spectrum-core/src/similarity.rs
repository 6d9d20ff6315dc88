//! Structural similarity between two spectrograms.
//!
//! Mean SSIM over a uniform square window, using sample covariance and the
//! usual stabilising constants `C1 = (0.01 L)^2` and `C2 = (0.03 L)^2` for a
//! data range `L`. Only window positions that lie entirely inside the matrix
//! contribute. Identical inputs score exactly 1.0.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, SimilarityError};
use crate::spectrogram::Spectrogram;

const K1: f64 = 0.01;
const K2: f64 = 0.03;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SsimParams {
    /// Side of the square window. Clamped to the largest odd size that fits.
    #[serde(default = "default_window")]
    pub window: usize,
    /// Dynamic range `L` used for the stabilising constants.
    #[serde(default = "default_data_range")]
    pub data_range: f64,
}

impl Default for SsimParams {
    fn default() -> Self {
        Self {
            window: default_window(),
            data_range: default_data_range(),
        }
    }
}

impl SsimParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window == 0 || !self.data_range.is_finite() || self.data_range <= 0.0 {
            return Err(ConfigError::Similarity);
        }
        Ok(())
    }

    /// Window side actually used for a `rows x cols` matrix.
    pub fn effective_window(&self, rows: usize, cols: usize) -> usize {
        let side = self.window.min(rows).min(cols).max(1);
        if side % 2 == 0 { side - 1 } else { side }
    }
}

fn default_window() -> usize { 51 }
fn default_data_range() -> f64 { 2.0 }

/// Inclusive prefix sums with a zero border row and column.
struct SummedArea {
    cols: usize,
    table: Vec<f64>,
}

impl SummedArea {
    fn new(rows: usize, cols: usize, value: impl Fn(usize, usize) -> f64) -> Self {
        let stride = cols + 1;
        let mut table = vec![0.0; (rows + 1) * stride];
        for r in 0..rows {
            let mut running = 0.0;
            for c in 0..cols {
                running += value(r, c);
                table[(r + 1) * stride + c + 1] = table[r * stride + c + 1] + running;
            }
        }
        Self { cols, table }
    }

    /// Sum over the `side x side` window whose top-left corner is (`r`, `c`).
    fn window(&self, r: usize, c: usize, side: usize) -> f64 {
        let stride = self.cols + 1;
        let at = |row: usize, col: usize| self.table[row * stride + col];
        at(r + side, c + side) - at(r, c + side) - at(r + side, c) + at(r, c)
    }
}

/// Mean structural similarity of two equally shaped spectrograms.
///
/// The score is symmetric, bounded by 1.0, and reaches 1.0 for identical inputs.
pub fn structural_similarity(
    left: &Spectrogram,
    right: &Spectrogram,
    params: &SsimParams,
) -> Result<f64, SimilarityError> {
    if !left.is_rectangular() || !right.is_rectangular() {
        return Err(SimilarityError::Ragged);
    }
    let (rows, cols) = (left.depth(), left.bins());
    if rows != right.depth() || cols != right.bins() {
        return Err(SimilarityError::ShapeMismatch {
            left_rows: rows,
            left_cols: cols,
            right_rows: right.depth(),
            right_cols: right.bins(),
        });
    }
    if rows == 0 || cols == 0 {
        return Err(SimilarityError::Empty);
    }

    let side = params.effective_window(rows, cols);
    let samples = (side * side) as f64;
    let cov_norm = if side > 1 { samples / (samples - 1.0) } else { 1.0 };
    let c1 = (K1 * params.data_range).powi(2);
    let c2 = (K2 * params.data_range).powi(2);

    let x = |r: usize, c: usize| left.get(r, c);
    let y = |r: usize, c: usize| right.get(r, c);
    let sum_x = SummedArea::new(rows, cols, x);
    let sum_y = SummedArea::new(rows, cols, y);
    let sum_xx = SummedArea::new(rows, cols, |r, c| x(r, c) * x(r, c));
    let sum_yy = SummedArea::new(rows, cols, |r, c| y(r, c) * y(r, c));
    let sum_xy = SummedArea::new(rows, cols, |r, c| x(r, c) * y(r, c));

    let positions_r = rows - side + 1;
    let positions_c = cols - side + 1;
    let mut total = 0.0;
    for r in 0..positions_r {
        for c in 0..positions_c {
            let ux = sum_x.window(r, c, side) / samples;
            let uy = sum_y.window(r, c, side) / samples;
            let uxx = sum_xx.window(r, c, side) / samples;
            let uyy = sum_yy.window(r, c, side) / samples;
            let uxy = sum_xy.window(r, c, side) / samples;

            let vx = cov_norm * (uxx - ux * ux);
            let vy = cov_norm * (uyy - uy * uy);
            let vxy = cov_norm * (uxy - ux * uy);

            let numerator = (2.0 * ux * uy + c1) * (2.0 * vxy + c2);
            let denominator = (ux * ux + uy * uy + c1) * (vx + vy + c2);
            total += numerator / denominator;
        }
    }

    Ok(total / (positions_r * positions_c) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(rows: usize, cols: usize, scale: f64) -> Spectrogram {
        Spectrogram::from_rows(
            (0..rows)
                .map(|r| (0..cols).map(|c| scale * ((r * 7 + c * 3) % 23) as f64).collect())
                .collect(),
        )
        .unwrap()
    }

    /// Direct windowed computation without prefix sums.
    fn brute_force(left: &Spectrogram, right: &Spectrogram, params: &SsimParams) -> f64 {
        let (rows, cols) = (left.depth(), left.bins());
        let side = params.effective_window(rows, cols);
        let n = (side * side) as f64;
        let c1 = (K1 * params.data_range).powi(2);
        let c2 = (K2 * params.data_range).powi(2);
        let mut total = 0.0;
        let mut count = 0.0;
        for r in 0..=rows - side {
            for c in 0..=cols - side {
                let cells: Vec<(f64, f64)> = (r..r + side)
                    .flat_map(|i| (c..c + side).map(move |j| (i, j)))
                    .map(|(i, j)| (left.get(i, j), right.get(i, j)))
                    .collect();
                let ux = cells.iter().map(|p| p.0).sum::<f64>() / n;
                let uy = cells.iter().map(|p| p.1).sum::<f64>() / n;
                let vx = cells.iter().map(|p| (p.0 - ux).powi(2)).sum::<f64>() / (n - 1.0);
                let vy = cells.iter().map(|p| (p.1 - uy).powi(2)).sum::<f64>() / (n - 1.0);
                let vxy = cells.iter().map(|p| (p.0 - ux) * (p.1 - uy)).sum::<f64>() / (n - 1.0);
                total += ((2.0 * ux * uy + c1) * (2.0 * vxy + c2))
                    / ((ux * ux + uy * uy + c1) * (vx + vy + c2));
                count += 1.0;
            }
        }
        total / count
    }

    #[test]
    fn identical_inputs_score_one() {
        let a = ramp(20, 40, 3.0);
        let score = structural_similarity(&a, &a, &SsimParams::default()).unwrap();
        assert!((score - 1.0).abs() < 1e-12, "score = {score}");
    }

    #[test]
    fn matches_direct_computation() {
        let a = ramp(12, 30, 2.5);
        let b = ramp(12, 30, -1.0);
        let params = SsimParams { window: 7, data_range: 2.0 };
        let fast = structural_similarity(&a, &b, &params).unwrap();
        let slow = brute_force(&a, &b, &params);
        assert!((fast - slow).abs() < 1e-9, "{fast} vs {slow}");
    }

    #[test]
    fn score_is_symmetric() {
        let a = ramp(15, 25, 4.0);
        let b = Spectrogram::from_rows(
            a.rows().iter().map(|r| r.iter().map(|v| v * 0.5 + 3.0).collect()).collect(),
        )
        .unwrap();
        let params = SsimParams { window: 5, data_range: 2.0 };
        let ab = structural_similarity(&a, &b, &params).unwrap();
        let ba = structural_similarity(&b, &a, &params).unwrap();
        assert!((ab - ba).abs() < 1e-12);
        assert!(ab < 1.0);
    }

    #[test]
    fn flat_input_against_structure_scores_low() {
        let silent = Spectrogram::filled(20, 60, -20.0);
        let loud = ramp(20, 60, 5.0);
        let score = structural_similarity(&silent, &loud, &SsimParams::default()).unwrap();
        assert!(score.abs() < 0.05, "score = {score}");
    }

    #[test]
    fn window_is_clamped_to_odd_fit() {
        let params = SsimParams::default();
        assert_eq!(params.effective_window(100, 1025), 51);
        assert_eq!(params.effective_window(100, 33), 33);
        assert_eq!(params.effective_window(10, 129), 9);
        assert_eq!(params.effective_window(1, 1), 1);
    }

    #[test]
    fn shape_mismatch_is_an_error() {
        let a = Spectrogram::filled(4, 5, 0.0);
        let b = Spectrogram::filled(4, 6, 0.0);
        assert!(matches!(
            structural_similarity(&a, &b, &SsimParams::default()),
            Err(SimilarityError::ShapeMismatch { .. })
        ));
        let empty = Spectrogram::filled(0, 0, 0.0);
        assert_eq!(
            structural_similarity(&empty, &empty, &SsimParams::default()),
            Err(SimilarityError::Empty)
        );
    }

    #[test]
    fn ragged_matrices_are_refused_rather_than_indexed() {
        let ragged: Spectrogram = serde_json::from_str(r#"{ "rows": [[1.0, 2.0], [3.0]] }"#).unwrap();
        let square = Spectrogram::filled(2, 2, 0.0);
        assert_eq!(
            structural_similarity(&ragged, &square, &SsimParams::default()),
            Err(SimilarityError::Ragged)
        );
        assert_eq!(
            structural_similarity(&square, &ragged, &SsimParams::default()),
            Err(SimilarityError::Ragged)
        );
    }
}
