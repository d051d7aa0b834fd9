//! Numerical helpers for DIM and exposure statistics.

/// Empirical quantile of `values` at level `q` (sorted copy, index
/// `round((n - 1) q)`). Zero for an empty slice.
pub fn empirical_quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let idx = ((sorted.len() - 1) as f64 * q.clamp(0.0, 1.0)).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Arithmetic mean, zero for an empty slice.
#[inline]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64).sqrt()
}

/// Inverse standard normal CDF (Acklam's rational approximation).
///
/// Returns `±∞` at 0 and 1 and NaN outside `[0, 1]`.
pub fn norm_inv_cdf(p: f64) -> f64 {
    if p.is_nan() || !(0.0..=1.0).contains(&p) {
        return f64::NAN;
    }
    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }

    const A: [f64; 6] = [
        -3.969_683_028_665_376e1,
        2.209_460_984_245_205e2,
        -2.759_285_104_469_687e2,
        1.383_577_518_672_69e2,
        -3.066_479_806_614_716e1,
        2.506_628_277_459_239,
    ];
    const B: [f64; 5] = [
        -5.447_609_879_822_406e1,
        1.615_858_368_580_409e2,
        -1.556_989_798_598_866e2,
        6.680_131_188_771_972e1,
        -1.328_068_155_288_572e1,
    ];
    const C: [f64; 6] = [
        -7.784_894_002_430_293e-3,
        -3.223_964_580_411_365e-1,
        -2.400_758_277_161_838,
        -2.549_732_539_343_734,
        4.374_664_141_464_968,
        2.938_163_982_698_783,
    ];
    const D: [f64; 4] = [
        7.784_695_709_041_462e-3,
        3.224_671_290_700_398e-1,
        2.445_134_137_142_996,
        3.754_408_661_907_416,
    ];
    const P_LOW: f64 = 0.024_25;

    let tail = |q: f64| {
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };

    if p < P_LOW {
        tail((-2.0 * p.ln()).sqrt())
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        -tail((-2.0 * (1.0 - p).ln()).sqrt())
    }
}

/// Solves `A x = b` for symmetric positive definite `A` by Cholesky
/// decomposition. `None` if `A` is not positive definite.
pub fn solve_cholesky(a: &[Vec<f64>], b: &[f64]) -> Option<Vec<f64>> {
    let n = b.len();
    if n == 0 || a.len() != n {
        return None;
    }

    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[i][j];
            for k in 0..j {
                sum -= l[i][k] * l[j][k];
            }
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                l[i][j] = sum.sqrt();
            } else {
                l[i][j] = sum / l[j][j];
            }
        }
    }

    let mut y = vec![0.0; n];
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i][j] * y[j];
        }
        y[i] = sum / l[i][i];
    }

    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = y[i];
        for j in (i + 1)..n {
            sum -= l[j][i] * x[j];
        }
        x[i] = sum / l[i][i];
    }
    Some(x)
}

/// Exponent vectors of every monomial in `vars` variables with total degree
/// at most `order`, constant term first.
pub fn total_degree_monomials(vars: usize, order: usize) -> Vec<Vec<u32>> {
    fn fill(vars: usize, remaining: u32, current: &mut Vec<u32>, out: &mut Vec<Vec<u32>>) {
        if current.len() + 1 == vars {
            current.push(remaining);
            out.push(current.clone());
            current.pop();
            return;
        }
        for e in (0..=remaining).rev() {
            current.push(e);
            fill(vars, remaining - e, current, out);
            current.pop();
        }
    }

    let mut out = Vec::new();
    if vars == 0 {
        out.push(Vec::new());
        return out;
    }
    for degree in 0..=order as u32 {
        fill(vars, degree, &mut Vec::with_capacity(vars), &mut out);
    }
    out
}

/// Evaluates the monomial basis at point `x`.
pub fn evaluate_basis(basis: &[Vec<u32>], x: &[f64]) -> Vec<f64> {
    basis
        .iter()
        .map(|exps| {
            exps.iter()
                .zip(x)
                .map(|(&e, &v)| v.powi(e as i32))
                .product()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_quantile_index() {
        let values: Vec<f64> = (0..101).rev().map(f64::from).collect();
        assert_eq!(empirical_quantile(&values, 0.99), 99.0);
        assert_eq!(empirical_quantile(&values, 0.0), 0.0);
        assert_eq!(empirical_quantile(&[], 0.5), 0.0);
    }

    #[test]
    fn test_norm_inv_cdf_known_values() {
        assert!(norm_inv_cdf(0.5).abs() < 1e-9);
        assert_relative_eq!(norm_inv_cdf(0.99), 2.326_347_874, epsilon = 1e-6);
        assert_relative_eq!(norm_inv_cdf(0.01), -2.326_347_874, epsilon = 1e-6);
        assert_relative_eq!(norm_inv_cdf(0.841_344_746_068_543), 1.0, epsilon = 1e-6);
        assert!(norm_inv_cdf(1.5).is_nan());
    }

    #[test]
    fn test_solve_cholesky() {
        let a = vec![vec![4.0, 2.0], vec![2.0, 3.0]];
        let x = solve_cholesky(&a, &[2.0, 1.0]).unwrap();
        assert_relative_eq!(4.0 * x[0] + 2.0 * x[1], 2.0, epsilon = 1e-12);
        assert_relative_eq!(2.0 * x[0] + 3.0 * x[1], 1.0, epsilon = 1e-12);

        let singular = vec![vec![1.0, 1.0], vec![1.0, 1.0]];
        assert!(solve_cholesky(&singular, &[1.0, 1.0]).is_none());
    }

    #[test]
    fn test_monomial_count() {
        // C(k + p, p)
        assert_eq!(total_degree_monomials(1, 2).len(), 3);
        assert_eq!(total_degree_monomials(2, 2).len(), 6);
        assert_eq!(total_degree_monomials(3, 1).len(), 4);
        assert_eq!(total_degree_monomials(2, 2)[0], vec![0, 0]);
    }

    #[test]
    fn test_mean_std() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(mean(&v), 2.5);
        assert_relative_eq!(std_dev(&v), 1.25_f64.sqrt());
    }
}
