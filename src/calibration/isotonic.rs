use serde::{Deserialize, Serialize};

/// Non-decreasing step function fitted with the pool adjacent violators algorithm.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct IsotonicCalibrator {
    /// Lowest input covered by each block.
    pub lower: Vec<f64>,
    /// Highest input covered by each block.
    pub upper: Vec<f64>,
    /// Fitted value of each block, non-decreasing.
    pub values: Vec<f64>,
}

impl IsotonicCalibrator {
    /// Fit `y` as a non-decreasing function of `x`.
    pub fn fit(x: &[f64], y: &[f64]) -> Self {
        if x.is_empty() {
            return Self::default();
        }

        let mut data: Vec<(f64, f64)> = x.iter().zip(y.iter()).map(|(&a, &b)| (a, b)).collect();
        data.sort_by(|a, b| a.0.total_cmp(&b.0));

        // Equal inputs must share one fitted value, so they are pooled before PAVA.
        // Each point is (x, sum_y, weight).
        let mut points: Vec<(f64, f64, f64)> = Vec::with_capacity(data.len());
        for (px, py) in data {
            match points.last_mut() {
                Some(last) if last.0 == px => {
                    last.1 += py;
                    last.2 += 1.0;
                }
                _ => points.push((px, py, 1.0)),
            }
        }

        // Stack of blocks: (sum_y, weight, x_lo, x_hi)
        let mut blocks: Vec<(f64, f64, f64, f64)> = Vec::with_capacity(points.len());
        for (px, sum_y, w) in points {
            let mut current = (sum_y, w, px, px);
            // Merge down
            while let Some(prev) = blocks.last() {
                if prev.0 / prev.1 > current.0 / current.1 {
                    current = (current.0 + prev.0, current.1 + prev.1, prev.2, current.3);
                    blocks.pop();
                } else {
                    break;
                }
            }
            blocks.push(current);
        }

        let mut calibrator = IsotonicCalibrator {
            lower: Vec::with_capacity(blocks.len()),
            upper: Vec::with_capacity(blocks.len()),
            values: Vec::with_capacity(blocks.len()),
        };
        for (sum_y, w, lo, hi) in blocks {
            calibrator.lower.push(lo);
            calibrator.upper.push(hi);
            calibrator.values.push(sum_y / w);
        }
        calibrator
    }

    /// Fitted value at `x`. Inputs between two blocks are linearly interpolated,
    /// inputs outside the fitted range take the value of the nearest block.
    pub fn value_at(&self, x: f64) -> f64 {
        let n = self.values.len();
        if n == 0 {
            return f64::NAN;
        }
        // First block whose upper end is >= x
        let idx = self.upper.partition_point(|u| *u < x);
        if idx == n {
            return self.values[n - 1];
        }
        if x >= self.lower[idx] || idx == 0 {
            return self.values[idx];
        }
        let (x0, x1) = (self.upper[idx - 1], self.lower[idx]);
        let (y0, y1) = (self.values[idx - 1], self.values[idx]);
        y0 + (y1 - y0) * (x - x0) / (x1 - x0)
    }
}
