use std::cmp::Ordering;

/// Create a string of all available items.
pub fn items_to_strings(items: &[&str]) -> String {
    items.join(", ")
}

pub fn fmt_vec_output(v: &[f64]) -> String {
    v.iter().map(|n| format!("{:.4}", n)).collect::<Vec<_>>().join(", ")
}

#[inline]
pub fn precision_round(n: f64, precision: i32) -> f64 {
    let p = (10.0_f64).powi(precision);
    (n * p).round() / p
}

/// Median of the values, the mean of the two middle values for even counts.
/// NaN for an empty slice.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Quantile with linear interpolation between the closest ranks.
///
/// `sorted` must be sorted ascending and free of NaN; `q` is within `[0, 1]`.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    if lo == hi {
        sorted[lo]
    } else {
        sorted[lo] + (sorted[hi] - sorted[lo]) * frac
    }
}

/// The finite values, sorted ascending.
pub fn sorted_finite(values: &[f64]) -> Vec<f64> {
    let mut v: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    v.sort_by(f64::total_cmp);
    v
}

/// Minimum and maximum over the finite values, `None` if there are none.
pub fn finite_range(values: &[f64]) -> Option<(f64, f64)> {
    values.iter().filter(|v| v.is_finite()).fold(None, |acc, v| match acc {
        None => Some((*v, *v)),
        Some((lo, hi)) => Some((lo.min(*v), hi.max(*v))),
    })
}

/// Pearson correlation, 0 when either side has no variance.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return 0.0;
    }
    let mx = x[..n].iter().sum::<f64>() / n as f64;
    let my = y[..n].iter().sum::<f64>() / n as f64;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for i in 0..n {
        let dx = x[i] - mx;
        let dy = y[i] - my;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    let denom = (sxx * syy).sqrt();
    if denom == 0.0 || !denom.is_finite() {
        0.0
    } else {
        sxy / denom
    }
}

/// Order NaN after every number.
pub fn nan_last(a: &f64, b: &f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.total_cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round() {
        assert_eq!(0.3, precision_round(0.3333, 1));
        assert_eq!(0.2343, precision_round(0.2343123123123, 4));
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[0.2, 0.4]), 0.30000000000000004);
        assert_eq!(median(&[3., 1., 2.]), 2.);
        assert_eq!(median(&[-0.1]), -0.1);
        assert!(median(&[]).is_nan());
    }

    #[test]
    fn test_quantile_sorted() {
        let v = vec![1., 2., 3., 4., 5., 6., 7., 8., 9., 10.];
        assert_eq!(quantile_sorted(&v, 0.0), 1.0);
        assert_eq!(quantile_sorted(&v, 0.25), 3.25);
        assert_eq!(quantile_sorted(&v, 0.5), 5.5);
        assert_eq!(quantile_sorted(&v, 1.0), 10.0);
    }

    #[test]
    fn test_finite_range() {
        assert_eq!(finite_range(&[3., f64::NAN, -1., 7.]), Some((-1., 7.)));
        assert_eq!(finite_range(&[f64::NAN]), None);
    }

    #[test]
    fn test_pearson() {
        assert!((pearson(&[1., 2., 3.], &[2., 4., 6.]) - 1.0).abs() < 1e-12);
        assert!((pearson(&[1., 2., 3.], &[3., 2., 1.]) + 1.0).abs() < 1e-12);
        assert_eq!(pearson(&[1., 1., 1.], &[1., 2., 3.]), 0.0);
    }

    #[test]
    fn test_fmt_vec_output() {
        assert_eq!(fmt_vec_output(&[1.0, 0.5]), "1.0000, 0.5000");
        assert_eq!(items_to_strings(&["dot", "bar"]), "dot, bar");
    }
}
