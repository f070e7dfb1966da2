use crate::domain::Coordinates;
use crate::error::Result;
use crate::ports::GeocoderPort;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

const DEFAULT_BASE_URL: &str =
    "https://geocode-api.arcgis.com/arcgis/rest/services/World/GeocodeServer";

/// Environment variable holding the ArcGIS API token.
pub const API_KEY_ENV: &str = "ARCGIS_API_KEY";

/// ArcGIS world geocoder adapter. Constructed once at process start and
/// injected wherever a `GeocoderPort` is needed.
pub struct ArcGisGeocoder {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl ArcGisGeocoder {
    /// Build a geocoder using the token from `ARCGIS_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let token = std::env::var(API_KEY_ENV)?;
        Ok(Self::new(DEFAULT_BASE_URL, token))
    }

    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            token: token.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CandidatesResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    location: CandidateLocation,
}

/// ArcGIS reports longitude as `x` and latitude as `y`.
#[derive(Debug, Deserialize)]
struct CandidateLocation {
    x: f64,
    y: f64,
}

#[async_trait]
impl GeocoderPort for ArcGisGeocoder {
    async fn lookup(&self, address: &str) -> Result<Option<Coordinates>> {
        let url = format!("{}/findAddressCandidates", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("f", "json"),
                ("singleLine", address),
                ("maxLocations", "1"),
                ("token", &self.token),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body: CandidatesResponse = response.json().await?;
        let best = body.candidates.into_iter().next().map(|candidate| Coordinates {
            latitude: candidate.location.y,
            longitude: candidate.location.x,
        });
        if best.is_none() {
            debug!("no geocode candidate for address");
        }
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_response_parsing() {
        let raw = r#"{
            "candidates": [
                {"address": "100 Main St", "location": {"x": -83.7430, "y": 42.2808}, "score": 100}
            ]
        }"#;
        let parsed: CandidatesResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.candidates.len(), 1);
        assert_eq!(parsed.candidates[0].location.y, 42.2808);
        assert_eq!(parsed.candidates[0].location.x, -83.7430);
    }

    #[test]
    fn test_empty_candidate_list_parses() {
        let parsed: CandidatesResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.candidates.is_empty());
    }
}
