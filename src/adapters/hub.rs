//! Content type hub client.
//!
//! The hub lists the latest published version of each content type.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use super::UpdateSource;
use crate::domain::HubVersion;

/// Default hub endpoint for content type metadata
pub const DEFAULT_HUB_URL: &str = "https://api.h5p.org/v1/content-types/";

/// Response from the hub
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HubResponse {
    #[serde(default)]
    content_types: Vec<HubContentType>,
}

#[derive(Debug, Deserialize)]
struct HubContentType {
    id: String,
    version: HubVersionNumber,
}

#[derive(Debug, Deserialize)]
struct HubVersionNumber {
    major: u32,
    minor: u32,
    patch: u32,
}

pub struct HubClient {
    url: String,
    client: reqwest::Client,
}

impl HubClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl UpdateSource for HubClient {
    async fn latest_versions(&self) -> Result<Vec<HubVersion>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("Failed to reach content type hub at {}", self.url))?
            .error_for_status()
            .context("Content type hub returned an error")?;

        let body: HubResponse = response
            .json()
            .await
            .context("Failed to parse content type hub response")?;

        Ok(parse_content_types(body))
    }
}

fn parse_content_types(body: HubResponse) -> Vec<HubVersion> {
    body.content_types
        .into_iter()
        .map(|content_type| HubVersion {
            machine_name: content_type.id,
            major_version: content_type.version.major,
            minor_version: content_type.version.minor,
            patch_version: content_type.version.patch,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hub_response() {
        let body: HubResponse = serde_json::from_str(
            r#"{"contentTypes": [
                {"id": "H5P.Accordion", "version": {"major": 1, "minor": 0, "patch": 3}, "title": "Accordion"}
            ]}"#,
        )
        .unwrap();

        let versions = parse_content_types(body);
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].machine_name, "H5P.Accordion");
        assert_eq!(versions[0].patch_version, 3);
    }

    #[test]
    fn test_missing_content_types_is_empty() {
        let body: HubResponse = serde_json::from_str("{}").unwrap();
        assert!(parse_content_types(body).is_empty());
    }
}
