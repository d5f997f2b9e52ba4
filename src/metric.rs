/// Share of rows whose prediction, rounded to the nearest integer, equals the target.
pub fn rounded_accuracy(y: &[f64], yhat: &[f64]) -> f64 {
    if y.is_empty() {
        return f64::NAN;
    }
    let hits = y.iter().zip(yhat).filter(|(t, p)| p.round() == **t).count();
    hits as f64 / y.len() as f64
}

pub fn root_mean_squared_error(y: &[f64], yhat: &[f64]) -> f64 {
    if y.is_empty() {
        return f64::NAN;
    }
    let mse = y.iter().zip(yhat).map(|(t, p)| (t - p) * (t - p)).sum::<f64>() / y.len() as f64;
    mse.sqrt()
}

/// Coefficient of determination. NaN when the target is constant.
pub fn r2_score(y: &[f64], yhat: &[f64]) -> f64 {
    if y.is_empty() {
        return f64::NAN;
    }
    let mean = y.iter().sum::<f64>() / y.len() as f64;
    let ss_tot: f64 = y.iter().map(|t| (t - mean) * (t - mean)).sum();
    let ss_res: f64 = y.iter().zip(yhat).map(|(t, p)| (t - p) * (t - p)).sum();
    if ss_tot == 0.0 {
        f64::NAN
    } else {
        1.0 - ss_res / ss_tot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::precision_round;

    #[test]
    fn test_rounded_accuracy() {
        let y = vec![1., 2., 3., 4.];
        let yhat = vec![1.2, 2.6, 2.9, 4.4];
        assert_eq!(rounded_accuracy(&y, &yhat), 0.75);
        assert!(rounded_accuracy(&[], &[]).is_nan());
    }

    #[test]
    fn test_root_mean_squared_error() {
        let y = vec![1., 3., 4., 5., 2., 4., 6.];
        let yhat = vec![3., 2., 3., 4., 4., 4., 4.];
        let res = root_mean_squared_error(&y, &yhat);
        assert_eq!(precision_round(res, 6), 1.46385);
    }

    #[test]
    fn test_r2_score() {
        let y = vec![1., 2., 3.];
        assert_eq!(r2_score(&y, &y), 1.0);
        assert!(r2_score(&[2., 2.], &[1., 3.]).is_nan());
    }
}
