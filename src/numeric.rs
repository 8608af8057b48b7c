//! Small 1-D numeric helpers shared by the primitives and the training engine.

/// Piecewise-linear interpolation of `(xp, fp)` at `x`.
///
/// `xp` must be increasing. Outside `[xp[0], xp[n-1]]` the end values are
/// returned (no extrapolation). An empty table yields 0.
pub fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let n = xp.len().min(fp.len());
    if n == 0 {
        return 0.0;
    }
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[n - 1] {
        return fp[n - 1];
    }
    // First index with xp[i] > x; guaranteed in 1..n by the checks above.
    let hi = xp[..n].partition_point(|&v| v <= x);
    let lo = hi - 1;
    let dx = xp[hi] - xp[lo];
    if dx <= 0.0 {
        return fp[lo];
    }
    let t = (x - xp[lo]) / dx;
    fp[lo] + t * (fp[hi] - fp[lo])
}

/// Interpolate `(xp, fp)` at every point of `x`.
pub fn interp_many(x: &[f64], xp: &[f64], fp: &[f64]) -> Vec<f64> {
    x.iter().map(|&xi| interp(xi, xp, fp)).collect()
}

/// Median of a slice; the mean of the two middle values for even lengths.
/// Returns `None` for an empty slice or when any value is NaN.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() || values.iter().any(|v| v.is_nan()) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    if n % 2 == 1 {
        Some(sorted[n / 2])
    } else {
        Some(0.5 * (sorted[n / 2 - 1] + sorted[n / 2]))
    }
}

/// Sliding-window median filter.
///
/// An even `kernel_size` is rounded up to the next odd one. The input is
/// zero-padded at both ends, so values near the edges are pulled toward zero
/// the same way a classic signal-processing `medfilt` does.
pub fn median_filter(values: &[f64], kernel_size: usize) -> Vec<f64> {
    let kernel_size = kernel_size | 1;
    let half = kernel_size / 2;
    let n = values.len();
    let mut window = Vec::with_capacity(kernel_size);
    (0..n)
        .map(|i| {
            window.clear();
            for k in 0..kernel_size {
                let j = i as isize + k as isize - half as isize;
                let v = if j < 0 || j as usize >= n {
                    0.0
                } else {
                    values[j as usize]
                };
                window.push(v);
            }
            window.sort_by(|a, b| a.total_cmp(b));
            window[half]
        })
        .collect()
}

/// Index of the smallest value, ignoring NaNs. `None` if nothing qualifies.
pub fn argmin(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .min_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(i, _)| i)
}

/// Index of the grid point closest to `x`.
pub fn idx_closest(x: f64, grid: &[f64]) -> Option<usize> {
    let dists: Vec<f64> = grid.iter().map(|&g| (g - x).abs()).collect();
    argmin(&dists)
}

/// `start, start + step, ...` up to but excluding `stop`.
pub fn arange(start: f64, stop: f64, step: f64) -> Vec<f64> {
    if step <= 0.0 || stop <= start {
        return Vec::new();
    }
    let n = ((stop - start) / step).ceil() as usize;
    (0..n).map(|i| start + i as f64 * step).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interp_clamps_and_interpolates() {
        let xp = [0.0, 1.0, 2.0];
        let fp = [0.0, 10.0, 30.0];
        assert_eq!(interp(-1.0, &xp, &fp), 0.0);
        assert_eq!(interp(5.0, &xp, &fp), 30.0);
        assert!((interp(0.5, &xp, &fp) - 5.0).abs() < 1e-12);
        assert!((interp(1.5, &xp, &fp) - 20.0).abs() < 1e-12);
        assert!((interp(1.0, &xp, &fp) - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[1.0, f64::NAN]), None);
    }

    #[test]
    fn test_median_filter_zero_pads_edges() {
        let v = [5.0, 5.0, 5.0, 5.0, 5.0];
        let out = median_filter(&v, 3);
        assert_eq!(out, vec![5.0, 5.0, 5.0, 5.0, 5.0]);
        let out = median_filter(&v, 5);
        // first element sees [0, 0, 5, 5, 5]
        assert_eq!(out[0], 5.0);
        let out = median_filter(&[1.0, 9.0, 1.0, 1.0], 3);
        assert_eq!(out, vec![1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_median_filter_rounds_even_kernel_up() {
        let v = [1.0, 9.0, 1.0, 1.0];
        assert_eq!(median_filter(&v, 2), median_filter(&v, 3));
        assert_eq!(median_filter(&v, 0), v.to_vec());
    }

    #[test]
    fn test_arange_excludes_stop() {
        let g = arange(0.0, 300.0, 100.0);
        assert_eq!(g, vec![0.0, 100.0, 200.0]);
        assert!(arange(1.0, 1.0, 1.0).is_empty());
    }

    #[test]
    fn test_idx_closest() {
        let g = [4000.0, 4500.0, 5000.0];
        assert_eq!(idx_closest(4700.0, &g), Some(1));
        assert_eq!(idx_closest(9000.0, &g), Some(2));
    }
}
