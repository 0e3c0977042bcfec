#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
    #[error("Request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("Failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Invalid URL `{url}` for {service}: {source}")]
    InvalidUrl {
        service: &'static str,
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("URL `{url}` for {service} must use http or https")]
    UnsupportedScheme { service: &'static str, url: String },
}
