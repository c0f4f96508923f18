// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Region-level geometric features, computed from a region's scan line runs
//! without revisiting the source image.
//!
//! All computations are O(number of runs), not O(number of pixels): the
//! per-run coordinate sums are evaluated in closed form (arithmetic series and
//! sum of squares). The sums are kept as exact integers, so forming the
//! covariance matrix does not suffer from floating point cancellation even
//! for regions far from the image origin.

use std::cell::OnceCell;
use std::f64::consts::PI;

use imageproc::rect::Rect;

use crate::labeler::ScanLineRun;

/// Principal component analysis of a region's pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PcaInfo {
    /// Larger eigenvalue of the coordinate covariance matrix, i.e. the
    /// variance (in squared pixel units) along the major axis.
    pub len1: f32,
    /// Smaller eigenvalue; variance along the minor axis. Never negative.
    pub len2: f32,
    /// Angle of the major axis in radians, in [0, pi). Measured from the +x
    /// axis towards +y (image rows grow downward).
    pub angle1: f32,
    /// Angle of the minor axis; always `angle1 + pi/2`.
    pub angle2: f32,
}

impl PcaInfo {
    /// Returned for regions whose covariance is not computable (a single
    /// pixel).
    pub const NULL: PcaInfo = PcaInfo{len1: 0.0, len2: 0.0, angle1: 0.0, angle2: 0.0};

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    /// Full major/minor axis lengths, taken as twice the standard deviation
    /// along each axis.
    pub fn axis_lengths(&self) -> (f32, f32) {
        (2.0 * self.len1.sqrt(), 2.0 * self.len2.sqrt())
    }

    /// 0 for isotropic regions, approaching 1 for line-like regions.
    pub fn eccentricity(&self) -> f32 {
        if self.len1 <= 0.0 {
            return 0.0;
        }
        (1.0 - self.len2 / self.len1).max(0.0).sqrt()
    }
}

// Sum of k for k in 0..=m. Zero for m == -1.
fn sum_to(m: i128) -> i128 {
    m * (m + 1) / 2
}

// Sum of k*k for k in 0..=m. Zero for m == -1.
fn sum_of_squares_to(m: i128) -> i128 {
    m * (m + 1) * (2 * m + 1) / 6
}

/// Raw (non-central) coordinate moments of a set of pixels, up to second
/// order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Moments {
    pub count: i128,
    pub sum_x: i128,
    pub sum_y: i128,
    pub sum_xx: i128,
    pub sum_yy: i128,
    pub sum_xy: i128,
}

impl Moments {
    pub fn from_runs(runs: &[ScanLineRun]) -> Self {
        let mut m = Moments::default();
        for run in runs {
            m.add_run(run);
        }
        m
    }

    fn add_run(&mut self, run: &ScanLineRun) {
        let n = run.len() as i128;
        let y = run.y as i128;
        let first = run.x_start as i128;
        let last = run.x_end as i128 - 1;
        let sx = sum_to(last) - sum_to(first - 1);
        let sxx = sum_of_squares_to(last) - sum_of_squares_to(first - 1);
        self.count += n;
        self.sum_x += sx;
        self.sum_y += n * y;
        self.sum_xx += sxx;
        self.sum_yy += n * y * y;
        self.sum_xy += y * sx;
    }

    pub fn centroid(&self) -> (f32, f32) {
        if self.count == 0 {
            return (0.0, 0.0);
        }
        let n = self.count as f64;
        ((self.sum_x as f64 / n) as f32, (self.sum_y as f64 / n) as f32)
    }

    // Population covariance (sxx, syy, sxy). The numerators are formed
    // exactly in integer arithmetic before the single division.
    fn covariance(&self) -> (f64, f64, f64) {
        let n = self.count;
        let n2 = (n * n) as f64;
        let sxx = (n * self.sum_xx - self.sum_x * self.sum_x) as f64 / n2;
        let syy = (n * self.sum_yy - self.sum_y * self.sum_y) as f64 / n2;
        let sxy = (n * self.sum_xy - self.sum_x * self.sum_y) as f64 / n2;
        (sxx, syy, sxy)
    }

    pub fn pca(&self) -> PcaInfo {
        if self.count <= 1 {
            return PcaInfo::NULL;
        }
        let (sxx, syy, sxy) = self.covariance();
        let mean = 0.5 * (sxx + syy);
        let spread = (0.5 * (sxx - syy)).hypot(sxy);
        let len1 = mean + spread;
        let len2 = (mean - spread).max(0.0);
        if len1 <= 0.0 {
            return PcaInfo::NULL;
        }
        // Orientation of the major axis. The half-angle form stays well
        // defined when sxy is zero, where the eigenvector form degenerates
        // into atan2(~0, 0).
        let mut angle1 = 0.5 * (2.0 * sxy).atan2(sxx - syy);
        if angle1 < 0.0 {
            angle1 += PI;
        }
        if angle1 >= PI {
            angle1 -= PI;
        }
        PcaInfo{len1: len1 as f32,
                len2: len2 as f32,
                angle1: angle1 as f32,
                angle2: (angle1 + 0.5 * PI) as f32}
    }
}

/// Bounding box of the runs. `runs` must be non-empty.
pub(crate) fn bounding_box(runs: &[ScanLineRun]) -> Rect {
    debug_assert!(!runs.is_empty());
    let mut x_min = i32::MAX;
    let mut x_max = i32::MIN;
    let mut y_min = i32::MAX;
    let mut y_max = i32::MIN;
    for run in runs {
        x_min = x_min.min(run.x_start);
        x_max = x_max.max(run.x_end - 1);
        y_min = y_min.min(run.y);
        y_max = y_max.max(run.y);
    }
    Rect::at(x_min, y_min).of_size((x_max - x_min + 1) as u32,
                                   (y_max - y_min + 1) as u32)
}

// Number of x positions covered by both rows. Each row is sorted by x and its
// runs are disjoint.
fn row_overlap(upper: &[ScanLineRun], lower: &[ScanLineRun]) -> u64 {
    let mut overlap = 0_u64;
    let mut u = 0;
    let mut l = 0;
    while u < upper.len() && l < lower.len() {
        let start = upper[u].x_start.max(lower[l].x_start);
        let end = upper[u].x_end.min(lower[l].x_end);
        if end > start {
            overlap += (end - start) as u64;
        }
        // Advance whichever run finishes first.
        if upper[u].x_end <= lower[l].x_end {
            u += 1;
        } else {
            l += 1;
        }
    }
    overlap
}

/// Counts the region-pixel/non-region-pixel 4-adjacencies of a region whose
/// runs are given in row-major order.
///
/// Each run is a maximal span of its value, so both of its horizontal ends
/// face a non-region pixel (or the edge of the scanned area). Each pixel also
/// faces up and down; those faces are interior exactly where the adjacent row
/// of the same region covers the same x. Pixels beyond the image or scan
/// rectangle are never region pixels, so the edge counts as boundary.
pub(crate) fn boundary_length(runs: &[ScanLineRun]) -> u32 {
    let mut pixels = 0_u64;
    let mut shared = 0_u64;
    let mut prev_row: &[ScanLineRun] = &[];
    let mut start = 0;
    while start < runs.len() {
        let y = runs[start].y;
        let mut end = start + 1;
        while end < runs.len() && runs[end].y == y {
            end += 1;
        }
        let row = &runs[start..end];
        if let Some(prev) = prev_row.first() {
            if prev.y + 1 == y {
                shared += row_overlap(prev_row, row);
            }
        }
        pixels += row.iter().map(|r| r.len() as u64).sum::<u64>();
        prev_row = row;
        start = end;
    }
    (2 * runs.len() as u64 + 2 * pixels - 2 * shared) as u32
}

/// `4*pi*area / boundary_length^2`. Returns 0 for a zero boundary length,
/// which no non-empty region has.
pub(crate) fn form_factor(pixel_count: u32, boundary_length: u32) -> f32 {
    if boundary_length == 0 {
        return 0.0;
    }
    let b = boundary_length as f64;
    (4.0 * PI * pixel_count as f64 / (b * b)) as f32
}

/// Memoized features of one region. Lives in the labeler's region arena next
/// to the region's span, so it is discarded when the next labeling pass
/// begins.
#[derive(Debug, Default)]
pub(crate) struct FeatureCache {
    moments: OnceCell<Moments>,
    centroid: OnceCell<(f32, f32)>,
    bounding_box: OnceCell<Rect>,
    boundary_length: OnceCell<u32>,
    pca: OnceCell<PcaInfo>,
}

impl FeatureCache {
    fn moments(&self, runs: &[ScanLineRun]) -> &Moments {
        self.moments.get_or_init(|| Moments::from_runs(runs))
    }

    pub fn centroid(&self, runs: &[ScanLineRun]) -> (f32, f32) {
        *self.centroid.get_or_init(|| self.moments(runs).centroid())
    }

    pub fn bounding_box(&self, runs: &[ScanLineRun]) -> Rect {
        *self.bounding_box.get_or_init(|| bounding_box(runs))
    }

    pub fn boundary_length(&self, runs: &[ScanLineRun]) -> u32 {
        *self.boundary_length.get_or_init(|| boundary_length(runs))
    }

    pub fn pca(&self, runs: &[ScanLineRun]) -> PcaInfo {
        *self.pca.get_or_init(|| self.moments(runs).pca())
    }

    #[cfg(test)]
    pub fn is_populated(&self) -> bool {
        self.moments.get().is_some() || self.bounding_box.get().is_some() ||
            self.boundary_length.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};
    use super::*;

    fn run(y: i32, x_start: i32, x_end: i32) -> ScanLineRun {
        ScanLineRun{y, x_start, x_end, value: 255}
    }

    fn rectangle_runs(x: i32, y: i32, w: i32, h: i32) -> Vec<ScanLineRun> {
        (y..y + h).map(|row| run(row, x, x + w)).collect()
    }

    #[test]
    fn test_series_helpers() {
        assert_eq!(sum_to(-1), 0);
        assert_eq!(sum_to(0), 0);
        assert_eq!(sum_to(4), 10);
        assert_eq!(sum_of_squares_to(-1), 0);
        assert_eq!(sum_of_squares_to(3), 14);
    }

    #[test]
    fn test_moments_match_per_pixel_sums() {
        let runs = vec![run(3, 5, 9), run(4, 2, 7), run(5, 6, 7)];
        let m = Moments::from_runs(&runs);
        let mut expected = Moments::default();
        for r in &runs {
            for x in r.x_start..r.x_end {
                let (x, y) = (x as i128, r.y as i128);
                expected.count += 1;
                expected.sum_x += x;
                expected.sum_y += y;
                expected.sum_xx += x * x;
                expected.sum_yy += y * y;
                expected.sum_xy += x * y;
            }
        }
        assert_eq!(m, expected);
    }

    #[test]
    fn test_rectangle_centroid_is_exact() {
        let runs = rectangle_runs(0, 0, 7, 4);
        assert_eq!(Moments::from_runs(&runs).centroid(), (3.0, 1.5));
        let runs = rectangle_runs(100, 40, 10, 10);
        assert_eq!(Moments::from_runs(&runs).centroid(), (104.5, 44.5));
    }

    #[test]
    fn test_rectangle_pca() {
        let (w, h) = (20.0_f32, 6.0_f32);
        let runs = rectangle_runs(0, 0, w as i32, h as i32);
        let pca = Moments::from_runs(&runs).pca();
        // Variance of a discrete uniform distribution over n values.
        assert_relative_eq!(pca.len1, (w * w - 1.0) / 12.0, max_relative = 1e-3);
        assert_relative_eq!(pca.len2, (h * h - 1.0) / 12.0, max_relative = 1e-3);
        assert_abs_diff_eq!(pca.angle1, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(pca.angle2, FRAC_PI_2, epsilon = 1e-6);

        // Tall rectangle: major axis is vertical.
        let runs = rectangle_runs(3, 3, 2, 9);
        let pca = Moments::from_runs(&runs).pca();
        assert_relative_eq!(pca.len1, 80.0 / 12.0, max_relative = 1e-3);
        assert_relative_eq!(pca.len2, 3.0 / 12.0, max_relative = 1e-3);
        assert_abs_diff_eq!(pca.angle1, FRAC_PI_2, epsilon = 1e-6);
    }

    #[test]
    fn test_pca_far_from_origin_is_stable() {
        let near = Moments::from_runs(&rectangle_runs(0, 0, 13, 5)).pca();
        let far = Moments::from_runs(&rectangle_runs(1_000_000, 2_000_000, 13, 5)).pca();
        assert_eq!(near, far);
    }

    #[test]
    fn test_pca_degenerate() {
        // Single pixel.
        let pca = Moments::from_runs(&[run(4, 4, 5)]).pca();
        assert!(pca.is_null());
        assert_eq!(pca.axis_lengths(), (0.0, 0.0));
        assert_eq!(pca.eccentricity(), 0.0);

        // Horizontal line: zero minor variance, no failure.
        let pca = Moments::from_runs(&[run(4, 0, 5)]).pca();
        assert_relative_eq!(pca.len1, 2.0);
        assert_eq!(pca.len2, 0.0);
        assert_abs_diff_eq!(pca.angle1, 0.0);
        assert_abs_diff_eq!(pca.angle2, FRAC_PI_2);
        assert_abs_diff_eq!(pca.eccentricity(), 1.0);

        // Diagonal line (8-connected).
        let pca = Moments::from_runs(&[run(0, 0, 1), run(1, 1, 2), run(2, 2, 3)]).pca();
        assert_relative_eq!(pca.len1, 4.0 / 3.0, max_relative = 1e-5);
        assert_abs_diff_eq!(pca.len2, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(pca.angle1, FRAC_PI_4, epsilon = 1e-6);
    }

    #[test]
    fn test_bounding_box() {
        let runs = vec![run(3, 5, 9), run(4, 2, 7), run(5, 6, 7)];
        let bbox = bounding_box(&runs);
        assert_eq!(bbox, Rect::at(2, 3).of_size(7, 3));
        assert_eq!(bounding_box(&[run(0, 0, 1)]), Rect::at(0, 0).of_size(1, 1));
    }

    #[test]
    fn test_boundary_length() {
        assert_eq!(boundary_length(&[run(7, 7, 8)]), 4);
        assert_eq!(boundary_length(&rectangle_runs(0, 0, 5, 3)), 16);
        // L shape:
        // x x x
        // x . .
        assert_eq!(boundary_length(&[run(0, 0, 3), run(1, 0, 1)]), 10);
        // U shape: two runs on the lower row share one face each with the
        // upper row.
        // x x x
        // x . x
        assert_eq!(boundary_length(&[run(0, 0, 3), run(1, 0, 1), run(1, 2, 3)]), 12);
        // Diagonal (8-connected) pixels share no faces.
        assert_eq!(boundary_length(&[run(0, 0, 1), run(1, 1, 2)]), 8);
        // Ring around a hole: the inner faces count too.
        let ring = vec![run(0, 0, 3), run(1, 0, 1), run(1, 2, 3), run(2, 0, 3)];
        assert_eq!(boundary_length(&ring), 16);
    }

    #[test]
    fn test_form_factor() {
        assert_abs_diff_eq!(form_factor(1, 4), FRAC_PI_4, epsilon = 1e-6);
        assert_abs_diff_eq!(form_factor(100, 40), FRAC_PI_4, epsilon = 1e-6);
        assert_eq!(form_factor(5, 0), 0.0);
    }

    #[test]
    fn test_feature_cache_memoizes() {
        let runs = rectangle_runs(1, 1, 4, 4);
        let cache = FeatureCache::default();
        assert!(!cache.is_populated());
        assert_eq!(cache.centroid(&runs), (2.5, 2.5));
        assert!(cache.is_populated());
        // The cached value is returned even if different runs are passed.
        assert_eq!(cache.centroid(&rectangle_runs(0, 0, 1, 1)), (2.5, 2.5));
        assert_eq!(cache.boundary_length(&runs), 16);
        assert_eq!(cache.boundary_length(&[]), 16);
    }
}
