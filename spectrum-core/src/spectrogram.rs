//! Rolling spectrogram history.
//!
//! The buffer always holds exactly `depth` rows of `bins` decibel values.
//! Row 0 is the newest; pushing a row evicts the oldest.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::error::InputError;

/// An immutable `depth x bins` decibel matrix, newest row first.
///
/// This is also the payload persisted for a fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrogram {
    rows: Vec<Vec<f64>>,
}

impl Spectrogram {
    /// Wraps a matrix, returning `None` when the rows are ragged.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Option<Self> {
        let width = rows.first().map_or(0, Vec::len);
        rows.iter().all(|r| r.len() == width).then_some(Self { rows })
    }

    /// A matrix filled with a single value.
    pub fn filled(depth: usize, bins: usize, value: f64) -> Self {
        Self {
            rows: vec![vec![value; bins]; depth],
        }
    }

    pub fn depth(&self) -> usize {
        self.rows.len()
    }

    pub fn bins(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&[f64]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    pub fn get(&self, row: usize, bin: usize) -> f64 {
        self.rows[row][bin]
    }

    /// True when every row is well-formed, i.e. the matrix was not
    /// assembled from a ragged file.
    pub fn is_rectangular(&self) -> bool {
        let width = self.bins();
        self.rows.iter().all(|r| r.len() == width)
    }
}

/// Fixed-depth circular history of decibel rows.
#[derive(Debug, Clone)]
pub struct SpectrogramBuffer {
    rows: VecDeque<Vec<f64>>,
    bins: usize,
}

impl SpectrogramBuffer {
    /// Allocates `depth` all-zero rows of `bins` values.
    pub fn new(depth: usize, bins: usize) -> Self {
        let mut buffer = Self {
            rows: VecDeque::new(),
            bins,
        };
        buffer.reset(depth, bins);
        buffer
    }

    /// Reallocates the history and clears it to zero.
    pub fn reset(&mut self, depth: usize, bins: usize) {
        self.bins = bins;
        self.rows = std::iter::repeat_with(|| vec![0.0; bins]).take(depth).collect();
    }

    /// Rolls the history by one row and writes `row` at index 0.
    ///
    /// The evicted row's allocation is reused for the new one.
    pub fn push(&mut self, row: &[f64]) -> Result<(), InputError> {
        if row.len() != self.bins {
            return Err(InputError::BlockLength {
                expected: self.bins,
                got: row.len(),
            });
        }
        if let Some(mut slot) = self.rows.pop_back() {
            slot.copy_from_slice(row);
            self.rows.push_front(slot);
        }
        Ok(())
    }

    pub fn depth(&self) -> usize {
        self.rows.len()
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    /// Row `index` of the history, 0 being the newest.
    pub fn row(&self, index: usize) -> Option<&[f64]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    /// Iterates rows from newest to oldest.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.rows.iter().map(Vec::as_slice)
    }

    /// Copies the current history into an immutable matrix.
    pub fn snapshot(&self) -> Spectrogram {
        Spectrogram {
            rows: self.rows.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_zeroed_at_full_depth() {
        let buffer = SpectrogramBuffer::new(100, 513);
        assert_eq!(buffer.depth(), 100);
        assert_eq!(buffer.bins(), 513);
        assert!(buffer.rows().all(|r| r.iter().all(|&v| v == 0.0)));
    }

    #[test]
    fn push_keeps_depth_and_newest_first() {
        let mut buffer = SpectrogramBuffer::new(4, 3);
        for i in 0..10 {
            buffer.push(&[i as f64; 3]).unwrap();
            assert_eq!(buffer.depth(), 4);
            assert_eq!(buffer.row(0), Some(&[i as f64; 3][..]));
        }
        let firsts: Vec<f64> = buffer.rows().map(|r| r[0]).collect();
        assert_eq!(firsts, vec![9.0, 8.0, 7.0, 6.0]);
    }

    #[test]
    fn rejects_rows_of_wrong_width() {
        let mut buffer = SpectrogramBuffer::new(2, 3);
        buffer.push(&[1.0, 2.0, 3.0]).unwrap();
        assert!(buffer.push(&[1.0]).is_err());
        assert_eq!(buffer.row(0), Some(&[1.0, 2.0, 3.0][..]));
    }

    #[test]
    fn reset_clears_and_resizes() {
        let mut buffer = SpectrogramBuffer::new(3, 2);
        buffer.push(&[5.0, 5.0]).unwrap();
        buffer.reset(5, 4);
        assert_eq!(buffer.depth(), 5);
        assert_eq!(buffer.bins(), 4);
        assert!(buffer.rows().all(|r| r.len() == 4 && r.iter().all(|&v| v == 0.0)));
    }

    #[test]
    fn snapshot_is_detached_from_later_pushes() {
        let mut buffer = SpectrogramBuffer::new(2, 2);
        buffer.push(&[1.0, 1.0]).unwrap();
        let snapshot = buffer.snapshot();
        buffer.push(&[2.0, 2.0]).unwrap();
        assert_eq!(snapshot.row(0), Some(&[1.0, 1.0][..]));
        assert_eq!(snapshot.depth(), 2);
        assert_eq!(snapshot.bins(), 2);
    }

    #[test]
    fn ragged_rows_are_refused() {
        assert!(Spectrogram::from_rows(vec![vec![1.0, 2.0], vec![3.0]]).is_none());
        let matrix = Spectrogram::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(matrix.get(1, 0), 3.0);
    }
}
