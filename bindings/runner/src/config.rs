use pass_load_runner::prelude::ArrivalRate;
use pass_services_client::prelude::{ClientError, ServiceTargets};

pub const DEFAULT_PASS_API_URL: &str = "http://pass-api:8080";
pub const DEFAULT_PASS_IMAGE_API_URL: &str = "http://pass-image-api:8080";
pub const DEFAULT_PASS_SUMMARY_API_URL: &str = "http://pass-summary-api:8080";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} must be a whole number, got `{value}`")]
    InvalidNumber { key: &'static str, value: String },
    #[error(transparent)]
    InvalidTarget(#[from] ClientError),
}

/// Request rate and concurrency cap for one of the services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateConfig {
    /// Iterations started per second.
    pub rps: u32,
    pub max_vus: usize,
}

impl RateConfig {
    /// Arrival rate for this config with up to `pre_allocated_vus` workers started up front.
    ///
    /// The pre-allocated count never exceeds `max_vus`.
    pub fn arrival_rate(&self, pre_allocated_vus: usize) -> ArrivalRate {
        ArrivalRate::per_second(f64::from(self.rps))
            .with_max_vus(self.max_vus)
            .with_pre_allocated_vus(pre_allocated_vus.min(self.max_vus))
    }
}

/// Service locations and load settings, read from the environment.
///
/// | Key | Default |
/// |---|---|
/// | `PASS_API_URL` | `http://pass-api:8080` |
/// | `PASS_IMAGE_API_URL` | `http://pass-image-api:8080` |
/// | `PASS_SUMMARY_API_URL` | `http://pass-summary-api:8080` |
/// | `PASS_API_RPS` / `PASS_API_MAX_VUS` | 2 / 20 |
/// | `PASS_IMAGE_API_RPS` / `PASS_IMAGE_API_MAX_VUS` | 1 / 10 |
/// | `PASS_SUMMARY_API_RPS` / `PASS_SUMMARY_API_MAX_VUS` | 2 / 20 |
#[derive(Debug, Clone, PartialEq)]
pub struct LoadConfig {
    pub pass_api_url: String,
    pub image_api_url: String,
    pub summary_api_url: String,
    pub pass_api: RateConfig,
    pub image_api: RateConfig,
    pub summary_api: RateConfig,
}

impl LoadConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup. Missing and empty values take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let value = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let url = |key: &str, default: &str| value(key).unwrap_or_else(|| default.to_string());

        let rate = |rps_key: &'static str,
                    rps: u32,
                    max_vus_key: &'static str,
                    max_vus: usize|
         -> Result<RateConfig, ConfigError> {
            Ok(RateConfig {
                rps: parse_number(rps_key, value(rps_key), rps)?,
                max_vus: parse_number(max_vus_key, value(max_vus_key), max_vus)?,
            })
        };

        Ok(Self {
            pass_api_url: url("PASS_API_URL", DEFAULT_PASS_API_URL),
            image_api_url: url("PASS_IMAGE_API_URL", DEFAULT_PASS_IMAGE_API_URL),
            summary_api_url: url("PASS_SUMMARY_API_URL", DEFAULT_PASS_SUMMARY_API_URL),
            pass_api: rate("PASS_API_RPS", 2, "PASS_API_MAX_VUS", 20)?,
            image_api: rate("PASS_IMAGE_API_RPS", 1, "PASS_IMAGE_API_MAX_VUS", 10)?,
            summary_api: rate("PASS_SUMMARY_API_RPS", 2, "PASS_SUMMARY_API_MAX_VUS", 20)?,
        })
    }

    pub fn targets(&self) -> Result<ServiceTargets, ConfigError> {
        Ok(ServiceTargets::new(
            &self.pass_api_url,
            &self.image_api_url,
            &self.summary_api_url,
        )?)
    }

    /// Rate of the continuous profile, a fifth of the passes API rate but at least 1/s.
    pub fn continuous_rate(&self) -> u32 {
        (self.pass_api.rps / 5).max(1)
    }
}

fn parse_number<T: std::str::FromStr>(
    key: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { key, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let values = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |key| values.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = LoadConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(
            config,
            LoadConfig {
                pass_api_url: DEFAULT_PASS_API_URL.to_string(),
                image_api_url: DEFAULT_PASS_IMAGE_API_URL.to_string(),
                summary_api_url: DEFAULT_PASS_SUMMARY_API_URL.to_string(),
                pass_api: RateConfig { rps: 2, max_vus: 20 },
                image_api: RateConfig { rps: 1, max_vus: 10 },
                summary_api: RateConfig { rps: 2, max_vus: 20 },
            }
        );
        assert_eq!(config.continuous_rate(), 1);
    }

    #[test]
    fn empty_values_fall_back_to_defaults() {
        let config =
            LoadConfig::from_lookup(lookup(&[("PASS_API_URL", "  "), ("PASS_API_RPS", "")]))
                .unwrap();

        assert_eq!(config.pass_api_url, DEFAULT_PASS_API_URL);
        assert_eq!(config.pass_api.rps, 2);
    }

    #[test]
    fn overrides_are_read() {
        let config = LoadConfig::from_lookup(lookup(&[
            ("PASS_API_URL", "http://localhost:8081/"),
            ("PASS_API_RPS", "12"),
            ("PASS_IMAGE_API_MAX_VUS", "3"),
        ]))
        .unwrap();

        assert_eq!(config.pass_api.rps, 12);
        assert_eq!(config.image_api.max_vus, 3);
        assert_eq!(config.continuous_rate(), 2);
        assert_eq!(config.targets().unwrap().pass_api(), "http://localhost:8081");
    }

    #[test]
    fn non_numeric_rate_is_an_error() {
        let err = LoadConfig::from_lookup(lookup(&[("PASS_SUMMARY_API_RPS", "fast")])).unwrap_err();

        assert_eq!(
            err.to_string(),
            "PASS_SUMMARY_API_RPS must be a whole number, got `fast`"
        );
    }

    #[test]
    fn pre_allocated_vus_are_capped_by_max_vus() {
        let rate = RateConfig { rps: 4, max_vus: 3 }.arrival_rate(5);

        assert_eq!(rate.rate, 4.0);
        assert_eq!(rate.pre_allocated_vus, 3);
        assert_eq!(rate.max_vus, 3);
    }
}
