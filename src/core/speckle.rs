//! Speckle filtering for radar backscatter.
//!
//! VH backscatter carries multiplicative speckle noise; a focal filter
//! over a square window smooths it before any thresholding. Filters run
//! on the dB image, so negative values are valid data and only NaN is
//! treated as nodata.

use ndarray::Array2;

use crate::types::{Grid, HydroError, HydroResult, Pixel};

/// Speckle filtering parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeckleFilterParams {
    /// Focal window radius in pixels; the window spans `2 * radius + 1`
    pub radius: usize,
}

impl Default for SpeckleFilterParams {
    fn default() -> Self {
        SpeckleFilterParams { radius: 3 }
    }
}

impl SpeckleFilterParams {
    pub fn window_size(&self) -> usize {
        2 * self.radius + 1
    }
}

/// Available focal filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeckleFilterType {
    Mean,
    Median,
}

/// Focal speckle filter
#[derive(Debug, Clone)]
pub struct SpeckleFilter {
    params: SpeckleFilterParams,
}

impl SpeckleFilter {
    pub fn new() -> Self {
        Self::with_params(SpeckleFilterParams::default())
    }

    pub fn with_params(params: SpeckleFilterParams) -> Self {
        SpeckleFilter { params }
    }

    /// Apply the selected filter to `image`. NaN pixels are excluded from
    /// every window and stay NaN in the output.
    pub fn apply(&self, image: &Grid, filter_type: SpeckleFilterType) -> HydroResult<Grid> {
        let (height, width) = image.dim();
        let window = self.params.window_size();
        if height < window || width < window {
            return Err(HydroError::Processing(format!(
                "image {}x{} is smaller than the {}x{} filter window",
                height, width, window, window
            )));
        }
        log::debug!(
            "applying {:?} speckle filter, window {}x{}",
            filter_type,
            window,
            window
        );
        match filter_type {
            SpeckleFilterType::Mean => Ok(self.focal_mean(image)),
            SpeckleFilterType::Median => Ok(self.focal_median(image)),
        }
    }

    fn focal_mean(&self, image: &Grid) -> Grid {
        let (height, width) = image.dim();
        let radius = self.params.radius;
        let mut filtered = Array2::zeros((height, width));

        for i in 0..height {
            for j in 0..width {
                if image[[i, j]].is_nan() {
                    filtered[[i, j]] = Pixel::NAN;
                    continue;
                }
                let mut sum = 0.0f64;
                let mut count = 0usize;
                let i_start = i.saturating_sub(radius);
                let i_end = (i + radius + 1).min(height);
                let j_start = j.saturating_sub(radius);
                let j_end = (j + radius + 1).min(width);
                for wi in i_start..i_end {
                    for wj in j_start..j_end {
                        let value = image[[wi, wj]];
                        if value.is_finite() {
                            sum += value as f64;
                            count += 1;
                        }
                    }
                }
                filtered[[i, j]] = if count > 0 {
                    (sum / count as f64) as Pixel
                } else {
                    image[[i, j]]
                };
            }
        }

        filtered
    }

    fn focal_median(&self, image: &Grid) -> Grid {
        let (height, width) = image.dim();
        let radius = self.params.radius;
        let window = self.params.window_size();
        let mut filtered = Array2::zeros((height, width));

        for i in 0..height {
            for j in 0..width {
                if image[[i, j]].is_nan() {
                    filtered[[i, j]] = Pixel::NAN;
                    continue;
                }
                let mut window_values = Vec::with_capacity(window * window);
                let i_start = i.saturating_sub(radius);
                let i_end = (i + radius + 1).min(height);
                let j_start = j.saturating_sub(radius);
                let j_end = (j + radius + 1).min(width);
                for wi in i_start..i_end {
                    for wj in j_start..j_end {
                        let value = image[[wi, wj]];
                        if value.is_finite() {
                            window_values.push(value);
                        }
                    }
                }
                if window_values.is_empty() {
                    filtered[[i, j]] = image[[i, j]];
                } else {
                    window_values
                        .sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                    filtered[[i, j]] = window_values[window_values.len() / 2];
                }
            }
        }

        filtered
    }
}

impl Default for SpeckleFilter {
    fn default() -> Self {
        Self::new()
    }
}
