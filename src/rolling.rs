//! Rolling-window statistics over a regularized series.
//!
//! Windows are expressed in whole days and converted to samples with the
//! table's samples-per-day. A window with fewer eligible samples than
//! `days * min_daily_samples` yields no estimate (`None`). Ineligible and
//! missing samples are left out of the statistics entirely.

use serde::{Deserialize, Serialize};

/// Where the window sits relative to the point it summarizes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowAnchor {
    /// Half the window before the point, half after
    #[default]
    Centered,
    /// The window starts at the point
    Leading,
}

/// Rolling window geometry and minimum-count requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollingWindow {
    pub days: usize,
    pub samples_per_day: usize,
    pub min_daily_samples: usize,
    pub anchor: WindowAnchor,
}

/// Rolling mean and residual spread at one point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub mean: f64,
    pub std: f64,
}

impl Band {
    /// True when `value` lies within `mean ± sigmas * std`
    pub fn contains(&self, value: f64, sigmas: f64) -> bool {
        (value - self.mean).abs() <= sigmas * self.std
    }
}

impl RollingWindow {
    pub fn new(days: usize, samples_per_day: usize, min_daily_samples: usize) -> Self {
        Self {
            days,
            samples_per_day,
            min_daily_samples,
            anchor: WindowAnchor::Centered,
        }
    }

    pub fn with_anchor(mut self, anchor: WindowAnchor) -> Self {
        self.anchor = anchor;
        self
    }

    /// Window length in samples
    pub fn sample_len(&self) -> usize {
        (self.days * self.samples_per_day).max(1)
    }

    /// Minimum number of eligible samples for an estimate
    pub fn min_count(&self) -> usize {
        (self.days * self.min_daily_samples).max(1)
    }

    /// Half-open row range covered by the window at `row`
    fn bounds(&self, row: usize, n: usize) -> (usize, usize) {
        let len = self.sample_len();
        match self.anchor {
            WindowAnchor::Centered => {
                let lo = row.saturating_sub(len / 2);
                let hi = (row + (len - 1) / 2 + 1).min(n);
                (lo, hi)
            }
            WindowAnchor::Leading => (row, (row + len).min(n)),
        }
    }
}

/// Count, mean and sum of squared deviations of one window
///
/// Accumulated with Welford's update, so a window of identical values has
/// exactly that value as its mean and a spread of exactly zero.
#[derive(Debug, Clone, Copy, Default)]
struct Moments {
    count: usize,
    mean: f64,
    m2: f64,
}

impl Moments {
    fn over(values: &[Option<f64>], eligible: &[bool], lo: usize, hi: usize) -> Self {
        let mut moments = Self::default();
        for row in lo..hi {
            if eligible[row]
                && let Some(v) = values[row]
                && v.is_finite()
            {
                moments.push(v);
            }
        }
        moments
    }

    fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    fn mean(&self, min_count: usize) -> Option<f64> {
        if self.count == 0 || self.count < min_count {
            return None;
        }
        Some(self.mean)
    }

    fn std(&self, min_count: usize) -> Option<f64> {
        if self.count < min_count.max(2) {
            return None;
        }
        Some((self.m2 / (self.count - 1) as f64).max(0.0).sqrt())
    }
}

/// Moments of every window along the series
fn window_moments(
    values: &[Option<f64>],
    eligible: &[bool],
    window: &RollingWindow,
) -> impl Iterator<Item = Moments> {
    debug_assert_eq!(values.len(), eligible.len());
    let n = values.len();
    (0..n).map(move |row| {
        let (lo, hi) = window.bounds(row, n);
        Moments::over(values, eligible, lo, hi)
    })
}

/// Rolling mean of the eligible samples
pub fn rolling_mean(
    values: &[Option<f64>],
    eligible: &[bool],
    window: &RollingWindow,
) -> Vec<Option<f64>> {
    let min_count = window.min_count();
    window_moments(values, eligible, window)
        .map(|moments| moments.mean(min_count))
        .collect()
}

/// Rolling sample standard deviation (ddof = 1) of the eligible samples
pub fn rolling_std(
    values: &[Option<f64>],
    eligible: &[bool],
    window: &RollingWindow,
) -> Vec<Option<f64>> {
    let min_count = window.min_count();
    window_moments(values, eligible, window)
        .map(|moments| moments.std(min_count))
        .collect()
}

/// Rolling mean plus the rolling standard deviation of residuals around it
pub fn deviation_bands(
    values: &[Option<f64>],
    eligible: &[bool],
    window: &RollingWindow,
) -> Vec<Option<Band>> {
    let means = rolling_mean(values, eligible, window);
    let residuals: Vec<Option<f64>> = values
        .iter()
        .zip(&means)
        .map(|(v, m)| match (v, m) {
            (Some(v), Some(m)) => Some(v - m),
            _ => None,
        })
        .collect();
    let spreads = rolling_std(&residuals, eligible, window);

    means
        .into_iter()
        .zip(spreads)
        .map(|(mean, std)| Some(Band { mean: mean?, std: std? }))
        .collect()
}
