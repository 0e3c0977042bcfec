use pass_services_client::prelude::{Coordinate, ElevationRange};
use rand::Rng;

/// Sample data the workloads pick request parameters from.
///
/// Built once by the setup hook and shared by every worker behind an `Arc`. There is no way to
/// change the data after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Fixtures {
    coordinates: Vec<Coordinate>,
    elevation_ranges: Vec<ElevationRange>,
}

impl Fixtures {
    pub fn new(
        coordinates: Vec<Coordinate>,
        elevation_ranges: Vec<ElevationRange>,
    ) -> anyhow::Result<Self> {
        if coordinates.is_empty() {
            anyhow::bail!("At least one coordinate is required");
        }
        if elevation_ranges.is_empty() {
            anyhow::bail!("At least one elevation range is required");
        }
        if let Some(range) = elevation_ranges.iter().find(|r| r.min > r.max) {
            anyhow::bail!("Elevation range {}..{} is inverted", range.min, range.max);
        }

        Ok(Self {
            coordinates,
            elevation_ranges,
        })
    }

    /// Well known mountain passes and a few elevation bands around them.
    pub fn sample() -> anyhow::Result<Self> {
        let coordinate = |name: &str, latitude: f64, longitude: f64, radius: f64| Coordinate {
            name: name.to_string(),
            latitude,
            longitude,
            radius,
            size: 500,
        };

        Self::new(
            vec![
                coordinate("Grosse Scheidegg", 46.655559, 8.102121, 1.5),
                coordinate("Stelvio Pass", 46.5309, 10.4515, 1.2),
                coordinate("Alpe d'Huez", 45.0909, 6.0736, 1.0),
                coordinate("Col du Galibier", 45.0644, 6.4077, 1.3),
                coordinate("Passo Giau", 46.4833, 12.0667, 1.1),
            ],
            vec![
                ElevationRange { min: 1000, max: 2000 },
                ElevationRange { min: 1500, max: 2500 },
                ElevationRange { min: 2000, max: 3000 },
                ElevationRange { min: 1000, max: 3000 },
            ],
        )
    }

    pub fn coordinates(&self) -> &[Coordinate] {
        &self.coordinates
    }

    pub fn elevation_ranges(&self) -> &[ElevationRange] {
        &self.elevation_ranges
    }

    pub fn random_coordinate<R: Rng + ?Sized>(&self, rng: &mut R) -> &Coordinate {
        &self.coordinates[rng.gen_range(0..self.coordinates.len())]
    }

    pub fn random_elevation_range<R: Rng + ?Sized>(&self, rng: &mut R) -> ElevationRange {
        self.elevation_ranges[rng.gen_range(0..self.elevation_ranges.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn sample_fixtures_are_valid() {
        let sample = Fixtures::sample().unwrap();
        assert_eq!(sample.coordinates().len(), 5);
        assert_eq!(sample.elevation_ranges().len(), 4);
        assert!(sample.coordinates().iter().all(|c| c.size == 500));
    }

    #[test]
    fn empty_or_inverted_fixtures_are_rejected() {
        let sample = Fixtures::sample().unwrap();

        assert!(Fixtures::new(Vec::new(), sample.elevation_ranges().to_vec()).is_err());
        assert!(Fixtures::new(sample.coordinates().to_vec(), Vec::new()).is_err());
        assert!(Fixtures::new(
            sample.coordinates().to_vec(),
            vec![ElevationRange { min: 3000, max: 1000 }]
        )
        .is_err());
    }

    #[test]
    fn random_picks_cover_every_fixture() {
        let fixtures = Fixtures::sample().unwrap();
        let mut rng = StdRng::seed_from_u64(11);

        let mut names = (0..500)
            .map(|_| fixtures.random_coordinate(&mut rng).name.clone())
            .collect::<Vec<_>>();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 5);

        let mut ranges = (0..500)
            .map(|_| {
                let range = fixtures.random_elevation_range(&mut rng);
                (range.min, range.max)
            })
            .collect::<Vec<_>>();
        ranges.sort();
        ranges.dedup();
        assert_eq!(ranges.len(), 4);
    }
}
