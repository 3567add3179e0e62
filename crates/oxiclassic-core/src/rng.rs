use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Build the random source for a fit: seeded when `seed` is set, from OS
/// entropy otherwise.
pub fn seeded(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

/// Draw `n` independent child seeds, one per parallel unit of work.
pub fn child_seeds<R: Rng>(rng: &mut R, n: usize) -> Vec<u64> {
    (0..n).map(|_| rng.gen()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_stream() {
        let a = child_seeds(&mut seeded(Some(7)), 4);
        let b = child_seeds(&mut seeded(Some(7)), 4);
        assert_eq!(a, b);
        assert_ne!(a, child_seeds(&mut seeded(Some(8)), 4));
    }
}
