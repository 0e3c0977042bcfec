use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum WeightError {
    #[error("A weighted choice needs at least one option")]
    Empty,
    #[error("Weight {0} is invalid, weights must be finite and not negative")]
    InvalidWeight(f64),
    #[error("The weights of a weighted choice must not all be zero")]
    ZeroTotal,
    #[error("Could not build weighted choice: {0}")]
    Rejected(String),
}

/// Picks one of several values with a probability proportional to its weight.
#[derive(Debug, Clone)]
pub struct WeightedChoice<T> {
    values: Vec<T>,
    index: WeightedIndex<f64>,
}

impl<T> WeightedChoice<T> {
    pub fn new(options: impl IntoIterator<Item = (f64, T)>) -> Result<Self, WeightError> {
        let (weights, values): (Vec<f64>, Vec<T>) = options.into_iter().unzip();

        if weights.is_empty() {
            return Err(WeightError::Empty);
        }
        if let Some(invalid) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(WeightError::InvalidWeight(*invalid));
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            return Err(WeightError::ZeroTotal);
        }

        let index =
            WeightedIndex::new(&weights).map_err(|e| WeightError::Rejected(e.to_string()))?;

        Ok(Self { values, index })
    }

    /// A choice between two values, picking `first` with probability `p`.
    pub fn either(p: f64, first: T, second: T) -> Result<Self, WeightError> {
        Self::new([(p, first), (1.0 - p, second)])
    }

    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> &T {
        &self.values[self.index.sample(rng)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn rejects_bad_tables() {
        assert_eq!(
            WeightedChoice::<u8>::new([]).unwrap_err(),
            WeightError::Empty
        );
        assert_eq!(
            WeightedChoice::new([(1.0, 'a'), (-0.5, 'b')]).unwrap_err(),
            WeightError::InvalidWeight(-0.5)
        );
        assert!(matches!(
            WeightedChoice::new([(f64::NAN, 'a')]).unwrap_err(),
            WeightError::InvalidWeight(_)
        ));
        assert_eq!(
            WeightedChoice::new([(0.0, 'a'), (0.0, 'b')]).unwrap_err(),
            WeightError::ZeroTotal
        );
        assert!(WeightedChoice::either(1.5, 'a', 'b').is_err());
    }

    #[test]
    fn zero_weight_is_never_chosen() {
        let choice = WeightedChoice::new([(0.0, "never"), (1.0, "always")]).unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..1000 {
            assert_eq!(*choice.choose(&mut rng), "always");
        }
    }

    #[test]
    fn choices_follow_weights() {
        let choice = WeightedChoice::new([(40.0, 0), (30.0, 1), (20.0, 2), (10.0, 3)]).unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        let mut counts = [0usize; 4];
        for _ in 0..20_000 {
            counts[*choice.choose(&mut rng)] += 1;
        }

        for (count, expected) in counts.iter().zip([0.4, 0.3, 0.2, 0.1]) {
            let observed = *count as f64 / 20_000.0;
            assert!(
                (observed - expected).abs() < 0.02,
                "observed {observed}, expected {expected}"
            );
        }
    }
}
