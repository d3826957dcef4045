//! Coefficient vector helpers: norms, relative change, linear combinations.

/// Largest element, `None` for an empty slice.
pub fn max(vec: &[f64]) -> Option<f64> {
    vec.iter().cloned().max_by(f64::total_cmp)
}

/// Euclidean norm.
pub fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Euclidean norm of `a - b`. Missing trailing elements count as zero.
pub fn diff_norm(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().max(b.len());
    (0..n)
        .map(|i| {
            let d = a.get(i).copied().unwrap_or(0.0) - b.get(i).copied().unwrap_or(0.0);
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// Relative change of `new` with respect to `old` in percent:
/// `100 * |new - old| / |new|`.
///
/// Two zero vectors have zero change. A zero `new` after a non-zero `old`
/// is a 100 % change.
pub fn relative_change_percent(new: &[f64], old: &[f64]) -> f64 {
    let diff = diff_norm(new, old);
    if diff == 0.0 {
        return 0.0;
    }
    let n = norm(new);
    if n == 0.0 {
        return 100.0;
    }
    100.0 * diff / n
}

/// `y + alpha * (x - y)`, element-wise.
pub fn blend(y: &[f64], x: &[f64], alpha: f64) -> Vec<f64> {
    y.iter().zip(x.iter()).map(|(&a, &b)| a + alpha * (b - a)).collect()
}

/// `a - b`, element-wise.
pub fn sub(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b.iter()).map(|(x, y)| x - y).collect()
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Checks if two arrays or vectors are almost equal.
///
/// Elements in both containers must be in the same order.
pub fn almost_equal(a: &[f64], b: &[f64], eps: f64) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).all(|(&x, &y)| (x - y).abs() <= eps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max() {
        assert_eq!(max(&[1.0, 3.0, 2.0]), Some(3.0));
        assert_eq!(max(&[]), None);
    }

    #[test]
    fn test_norms() {
        assert_eq!(norm(&[3.0, 4.0]), 5.0);
        assert_eq!(diff_norm(&[3.0, 4.0], &[0.0, 0.0]), 5.0);
        assert_eq!(diff_norm(&[3.0, 4.0], &[3.0]), 4.0);
    }

    #[test]
    fn test_relative_change() {
        assert_eq!(relative_change_percent(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
        assert_eq!(relative_change_percent(&[0.0], &[1.0]), 100.0);
        assert!((relative_change_percent(&[2.0], &[1.0]) - 50.0).abs() < 1e-12);
    }

    #[test]
    fn test_blend() {
        let y = vec![0.0, 2.0];
        let x = vec![1.0, 4.0];
        assert!(almost_equal(&blend(&y, &x, 0.5), &[0.5, 3.0], 1e-12));
        assert!(almost_equal(&blend(&y, &x, 1.0), &x, 1e-12));
        assert!(almost_equal(&sub(&x, &y), &[1.0, 2.0], 1e-12));
        assert_eq!(dot(&x, &y), 8.0);
    }

    #[test]
    fn test_almost_equal_different_lengths() {
        assert!(!almost_equal(&[1.0, 2.0], &[1.0, 2.0, 3.0], 1e-10));
    }
}
