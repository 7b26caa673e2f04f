//! Sampler
//!
//! Row sampling strategies used by the forest before fitting each tree:
//! bootstrap resampling, and the split of rows into a structure set and a
//! fixed size honest set.
use rand::rngs::StdRng;
use rand::Rng;

// A sampler can be used to subset the data prior to fitting a new tree.
pub trait Sampler {
    /// Sample the data, returning a tuple, where the first item is the samples
    /// chosen for training, and the second are the samples excluded.
    fn sample(&mut self, rng: &mut StdRng, index: &[usize]) -> (Vec<usize>, Vec<usize>);
}

/// Holds out exactly `n_held_out` rows drawn without replacement, by a
/// partial Fisher-Yates shuffle. Both sets are returned in index order.
pub struct HoldOutSampler {
    n_held_out: usize,
}

impl HoldOutSampler {
    pub fn new(n_held_out: usize) -> Self {
        HoldOutSampler { n_held_out }
    }
}

impl Sampler for HoldOutSampler {
    fn sample(&mut self, rng: &mut StdRng, index: &[usize]) -> (Vec<usize>, Vec<usize>) {
        let n = index.len();
        let k = self.n_held_out.min(n);
        let mut shuffled = index.to_vec();
        for i in 0..k {
            let j = rng.gen_range(i..n);
            shuffled.swap(i, j);
        }
        let mut chosen = shuffled.split_off(k);
        let mut excluded = shuffled;
        chosen.sort_unstable();
        excluded.sort_unstable();
        (chosen, excluded)
    }
}

/// Draws `index.len()` rows with replacement. Chosen rows may repeat, the
/// excluded rows are the out-of-bag ones, in index order.
pub struct BootstrapSampler;

impl Sampler for BootstrapSampler {
    fn sample(&mut self, rng: &mut StdRng, index: &[usize]) -> (Vec<usize>, Vec<usize>) {
        let n = index.len();
        let mut drawn = vec![false; n];
        let mut chosen = Vec::with_capacity(n);
        for _ in 0..n {
            let k = rng.gen_range(0..n);
            drawn[k] = true;
            chosen.push(index[k]);
        }
        let excluded = index.iter().zip(drawn).filter(|(_, d)| !d).map(|(i, _)| *i).collect();
        (chosen, excluded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_hold_out_sampler() {
        let mut rng = StdRng::seed_from_u64(42);
        let index: Vec<usize> = (0..100).collect();
        let (chosen, excluded) = HoldOutSampler::new(30).sample(&mut rng, &index);
        assert_eq!(excluded.len(), 30);
        assert_eq!(chosen.len(), 70);
        let mut all: Vec<usize> = chosen.iter().chain(&excluded).copied().collect();
        all.sort();
        assert_eq!(all, index);
        assert!(chosen.windows(2).all(|w| w[0] < w[1]));

        let (chosen, excluded) = HoldOutSampler::new(0).sample(&mut rng, &index);
        assert_eq!(chosen, index);
        assert!(excluded.is_empty());

        let (chosen, excluded) = HoldOutSampler::new(500).sample(&mut rng, &[3, 7]);
        assert!(chosen.is_empty());
        assert_eq!(excluded, vec![3, 7]);
    }

    #[test]
    fn test_hold_out_sampler_small_index_is_exact() {
        let mut rng = StdRng::seed_from_u64(1);
        let index = [4, 8, 15, 16, 23, 42];
        let mut seen = [0usize; 43];
        for _ in 0..200 {
            let (chosen, excluded) = HoldOutSampler::new(3).sample(&mut rng, &index);
            assert_eq!(chosen.len(), 3);
            assert_eq!(excluded.len(), 3);
            excluded.iter().for_each(|i| seen[*i] += 1);
        }
        assert!(index.iter().all(|i| seen[*i] > 0));
    }

    #[test]
    fn test_bootstrap_sampler() {
        let mut rng = StdRng::seed_from_u64(0);
        let index: Vec<usize> = (10..60).collect();
        let (chosen, excluded) = BootstrapSampler.sample(&mut rng, &index);
        assert_eq!(chosen.len(), index.len());
        assert!(chosen.iter().all(|i| (10..60).contains(i)));
        assert!(excluded.iter().all(|i| !chosen.contains(i)));
        let mut unique = chosen.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len() + excluded.len(), index.len());
        assert!(!excluded.is_empty());
    }
}
