use serde::Deserialize;

/// A pass as returned by the passes API. Only the fields the workloads use are decoded.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Pass {
    pub id: i64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Pass {
    /// Both coordinates are present and non-zero. A zero coordinate is treated as unset by the
    /// passes API.
    pub fn has_coordinates(&self) -> bool {
        matches!(
            (self.latitude, self.longitude),
            (Some(latitude), Some(longitude)) if latitude != 0.0 && longitude != 0.0
        )
    }
}

/// A location to request a map image for.
#[derive(Debug, Clone, PartialEq)]
pub struct Coordinate {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Radius around the point, in kilometres.
    pub radius: f64,
    /// Image size in pixels.
    pub size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElevationRange {
    pub min: u32,
    pub max: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_passes_with_missing_and_zero_coordinates() {
        let passes: Vec<Pass> = serde_json::from_str(
            r#"[
                {"id": 1, "name": "Stelvio", "latitude": 46.5309, "longitude": 10.4515},
                {"id": 2, "latitude": 0, "longitude": 10.1},
                {"id": 3, "latitude": null},
                {"id": 4}
            ]"#,
        )
        .unwrap();

        let with_coordinates = passes
            .iter()
            .filter(|p| p.has_coordinates())
            .map(|p| p.id)
            .collect::<Vec<_>>();
        assert_eq!(with_coordinates, vec![1]);
    }
}
