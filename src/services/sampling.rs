use rand::Rng;

/// Draws `k` distinct elements from `pool`, every size-`k` subset equally
/// likely, via a partial Fisher-Yates shuffle: O(n) and unbiased, unlike
/// sorting by a random comparator. The order of the returned sample is the
/// presentation order.
pub(crate) fn sample_distinct<T, R>(mut pool: Vec<T>, k: usize, rng: &mut R) -> Vec<T>
where
    R: Rng + ?Sized,
{
    let n = pool.len();
    let k = k.min(n);

    for i in 0..k {
        let j = rng.gen_range(i..n);
        pool.swap(i, j);
    }

    pool.truncate(k);
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::{HashMap, HashSet};

    #[test]
    fn sample_is_distinct_and_sized() {
        let mut rng = StdRng::seed_from_u64(7);
        let pool: Vec<u32> = (0..100).collect();

        let sample = sample_distinct(pool, 40, &mut rng);

        assert_eq!(sample.len(), 40);
        let unique: HashSet<u32> = sample.iter().copied().collect();
        assert_eq!(unique.len(), 40);
    }

    #[test]
    fn sample_of_full_pool_is_the_pool() {
        let mut rng = StdRng::seed_from_u64(11);
        let pool: Vec<u32> = (0..40).collect();

        let sample = sample_distinct(pool.clone(), 40, &mut rng);

        let expected: HashSet<u32> = pool.into_iter().collect();
        let got: HashSet<u32> = sample.into_iter().collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn sample_larger_than_pool_is_clamped() {
        let mut rng = StdRng::seed_from_u64(13);
        let sample = sample_distinct(vec![1, 2, 3], 10, &mut rng);
        assert_eq!(sample.len(), 3);
    }

    #[test]
    fn every_element_is_drawn_with_roughly_equal_frequency() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut hits: HashMap<u32, u32> = HashMap::new();
        let rounds = 10_000;

        for _ in 0..rounds {
            let pool: Vec<u32> = (0..10).collect();
            for item in sample_distinct(pool, 4, &mut rng) {
                *hits.entry(item).or_default() += 1;
            }
        }

        // Expected hits per element: rounds * k / n = 4000.
        for element in 0..10 {
            let count = *hits.get(&element).unwrap_or(&0);
            assert!(
                (3700..=4300).contains(&count),
                "element {element} drawn {count} times, expected ~4000"
            );
        }
    }
}
