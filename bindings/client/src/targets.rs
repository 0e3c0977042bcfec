use crate::error::ClientError;
use crate::model::{Coordinate, ElevationRange};
use url::Url;

/// Base URLs of the three services under test.
///
/// Trailing slashes are removed so that paths can be appended directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTargets {
    pass_api: String,
    image_api: String,
    summary_api: String,
}

impl ServiceTargets {
    pub fn new(pass_api: &str, image_api: &str, summary_api: &str) -> Result<Self, ClientError> {
        Ok(Self {
            pass_api: validate_base_url("pass-api", pass_api)?,
            image_api: validate_base_url("pass-image-api", image_api)?,
            summary_api: validate_base_url("pass-summary-api", summary_api)?,
        })
    }

    pub fn pass_api(&self) -> &str {
        &self.pass_api
    }

    pub fn image_api(&self) -> &str {
        &self.image_api
    }

    pub fn summary_api(&self) -> &str {
        &self.summary_api
    }

    pub fn passes_url(&self) -> String {
        format!("{}/passes", self.pass_api)
    }

    pub fn passes_by_elevation_url(&self, range: ElevationRange) -> String {
        format!(
            "{}/passes/elevation?min={}&max={}",
            self.pass_api, range.min, range.max
        )
    }

    pub fn pass_url(&self, id: i64) -> String {
        format!("{}/passes/{}", self.pass_api, id)
    }

    pub fn pass_image_url(&self, id: i64) -> String {
        format!("{}/passes/{}/image", self.pass_api, id)
    }

    /// The image service takes the longitude before the latitude.
    pub fn direct_image_url(&self, coordinate: &Coordinate) -> String {
        format!(
            "{}/images/{}/{}/{}?radius={}",
            self.image_api,
            coordinate.longitude,
            coordinate.latitude,
            coordinate.size,
            coordinate.radius
        )
    }

    pub fn pass_summary_url(&self) -> String {
        format!("{}/pass-summary", self.summary_api)
    }

    pub fn pass_summary_slow_url(&self) -> String {
        format!("{}/pass-summary/slow", self.summary_api)
    }
}

fn validate_base_url(service: &'static str, url: &str) -> Result<String, ClientError> {
    let trimmed = url.trim().trim_end_matches('/');
    let parsed = Url::parse(trimmed).map_err(|source| ClientError::InvalidUrl {
        service,
        url: url.to_string(),
        source,
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ClientError::UnsupportedScheme {
            service,
            url: url.to_string(),
        });
    }

    Ok(trimmed.to_string())
}
