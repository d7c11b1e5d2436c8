//! Helper functions

use rand::Rng;

/// Draws from the exponential distribution with the given mean.
pub fn exponential<R: Rng + ?Sized>(mean: f64, rng: &mut R) -> f64 {
    // gen::<f64>() is in [0, 1), so 1 - u is never 0
    let u: f64 = rng.gen();
    -mean * (1.0 - u).ln()
}

/// Draws uniformly from `[min, max)`. Returns `min` when the range is empty.
pub fn uniform<R: Rng + ?Sized>(min: f64, max: f64, rng: &mut R) -> f64 {
    if max <= min {
        return min;
    }
    rng.gen_range(min..max)
}

/// Median of a list of floats, with NaN values sorted last.
pub fn median_of_floats(mut values: Vec<f64>) -> f64 {
    assert!(!values.is_empty(), "cannot take the median of no values");

    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn exponential_sample_mean() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let n = 20_000;
        let mean =
            (0..n).map(|_| exponential(4.0, &mut rng)).sum::<f64>() / n as f64;

        assert!((mean - 4.0).abs() < 0.2, "sample mean was {}", mean);
    }

    #[test]
    fn uniform_stays_in_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..1000 {
            let x = uniform(1.0, 3.0, &mut rng);
            assert!((1.0..3.0).contains(&x));
        }
        assert_eq!(uniform(5.0, 5.0, &mut rng), 5.0);
        assert_eq!(uniform(5.0, 2.0, &mut rng), 5.0);
    }

    #[test]
    fn median_even_and_odd() {
        assert_eq!(median_of_floats(vec![3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median_of_floats(vec![4.0, 1.0, 3.0, 2.0]), 2.5);
    }
}
