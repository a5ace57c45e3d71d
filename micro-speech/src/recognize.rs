//! Classification boundary and score handling.
//!
//! The keyword model itself is external; [`Classifier`] is the `Invoke()`
//! seam. The model writes one quantized `i8` score per category.

use crate::constants::{CATEGORY_COUNT, CATEGORY_LABELS};

/// Runs the keyword model over a feature matrix.
pub trait Classifier {
    /// Engine error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Classify `features` (the whole matrix, oldest slice first), writing
    /// one quantized score per category into `scores`.
    fn classify(&mut self, features: &[i8], scores: &mut [i8; CATEGORY_COUNT]) -> Result<(), Self::Error>;
}

/// Affine int8 quantization: `real = (q - zero_point) * scale`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantization {
    pub scale: f32,
    pub zero_point: i32,
}

impl Quantization {
    /// Softmax output quantization: `[-128, 127]` → `[0, 1)`.
    pub const SOFTMAX: Quantization = Quantization {
        scale: 1.0 / 256.0,
        zero_point: -128,
    };

    #[inline]
    pub fn dequantize(&self, q: i8) -> f32 {
        (q as i32 - self.zero_point) as f32 * self.scale
    }
}

impl Default for Quantization {
    fn default() -> Self {
        Self::SOFTMAX
    }
}

/// Raw model output with its quantization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoryScores {
    pub raw: [i8; CATEGORY_COUNT],
    pub quantization: Quantization,
}

/// The best-scoring category of one inference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub index: usize,
    pub label: &'static str,
    pub score: f32,
}

impl CategoryScores {
    pub fn new(raw: [i8; CATEGORY_COUNT], quantization: Quantization) -> Self {
        CategoryScores { raw, quantization }
    }

    /// Scores as real values.
    pub fn dequantized(&self) -> [f32; CATEGORY_COUNT] {
        self.raw.map(|q| self.quantization.dequantize(q))
    }

    /// Highest scoring category. Ties go to the lower index.
    pub fn top(&self) -> Detection {
        let mut index = 0;
        for (i, &q) in self.raw.iter().enumerate().skip(1) {
            if q > self.raw[index] {
                index = i;
            }
        }
        Detection {
            index,
            label: CATEGORY_LABELS[index],
            score: self.quantization.dequantize(self.raw[index]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn softmax_dequantization() {
        let q = Quantization::SOFTMAX;
        assert_eq!(q.dequantize(-128), 0.0);
        assert_eq!(q.dequantize(0), 0.5);
        assert_eq!(q.dequantize(127), 255.0 / 256.0);
    }

    #[test]
    fn top_picks_the_highest_score() {
        let scores = CategoryScores::new([-120, -100, 90, -60], Quantization::SOFTMAX);
        let d = scores.top();
        assert_eq!(d.index, 2);
        assert_eq!(d.label, "yes");
        assert_eq!(d.score, 218.0 / 256.0);
    }

    #[test]
    fn ties_go_to_the_first_category() {
        let scores = CategoryScores::new([10, 10, -5, 10], Quantization::SOFTMAX);
        assert_eq!(scores.top().label, "silence");
    }

    #[test]
    fn dequantized_covers_every_category() {
        let scores = CategoryScores::new([-128, 0, 64, 127], Quantization::SOFTMAX);
        let real = scores.dequantized();
        assert_eq!(real.len(), CATEGORY_COUNT);
        assert_eq!(real[0], 0.0);
        assert_eq!(real[2], 0.75);
    }
}
