//! Small descriptive statistics shared by the analyzers.

/// Arithmetic mean; 0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation; 0 for fewer than two values.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Upper-tail probability of the standard normal distribution.
///
/// Abramowitz & Stegun 7.1.26 approximation of `erfc`, absolute error below
/// 1.5e-7.
pub fn normal_sf(z: f64) -> f64 {
    let x = z.abs() / std::f64::consts::SQRT_2;
    let t = 1.0 / (1.0 + 0.3275911 * x);
    let poly = t
        * (0.254829592
            + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    let erfc = poly * (-x * x).exp();
    let upper = 0.5 * erfc;
    if z >= 0.0 { upper } else { 1.0 - upper }
}

/// Approximate `P(X >= x)` for `X ~ chi-square(df)`.
///
/// Wilson–Hilferty cube-root transform to a standard normal.
pub fn chi_square_sf(x: f64, df: usize) -> f64 {
    if df == 0 {
        return 1.0;
    }
    if x <= 0.0 {
        return 1.0;
    }
    let k = df as f64;
    let h = 2.0 / (9.0 * k);
    let z = ((x / k).powf(1.0 / 3.0) - (1.0 - h)) / h.sqrt();
    normal_sf(z).clamp(0.0, 1.0)
}

/// Pearson chi-square statistic of `observed` against a uniform expectation.
pub fn chi_square_uniform(observed: &[u64]) -> f64 {
    let total: u64 = observed.iter().sum();
    if observed.is_empty() || total == 0 {
        return 0.0;
    }
    let expected = total as f64 / observed.len() as f64;
    observed
        .iter()
        .map(|&o| {
            let diff = o as f64 - expected;
            diff * diff / expected
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_and_std_dev_basic() {
        let data = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((mean(&data) - 5.0).abs() < 1e-12);
        assert!((std_dev(&data) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn degenerate_inputs() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(std_dev(&[3.0]), 0.0);
    }

    #[test]
    fn normal_sf_reference_points() {
        assert!((normal_sf(0.0) - 0.5).abs() < 1e-6);
        assert!((normal_sf(1.96) - 0.025).abs() < 1e-3);
        assert!((normal_sf(-1.96) - 0.975).abs() < 1e-3);
    }

    #[test]
    fn chi_square_sf_near_table_values() {
        // 14.067 is the 0.05 critical value at 7 degrees of freedom.
        let p = chi_square_sf(14.067, 7);
        assert!((p - 0.05).abs() < 0.01, "p = {p}");
        assert_eq!(chi_square_sf(0.0, 5), 1.0);
    }

    #[test]
    fn uniform_counts_have_zero_chi_square() {
        assert_eq!(chi_square_uniform(&[3, 3, 3, 3]), 0.0);
        assert_eq!(chi_square_uniform(&[0, 0]), 0.0);
        // expected 1.0 per bucket: (4-1)^2/1 + 3 * (0-1)^2/1 = 12
        assert!((chi_square_uniform(&[4, 0, 0, 0]) - 12.0).abs() < 1e-12);
    }
}
