//! Reverse geocoding
//!
//! Resolves shared coordinates into a structured address through the public
//! Nominatim API. The result is consumed by the adapter as an enrichment.

use crate::llm::http_utils::create_http_client;
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::debug;

/// Default Nominatim host
pub const NOMINATIM_BASE_URL: &str = "https://nominatim.openstreetmap.org";

const NOMINATIM_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36";

/// Errors returned by a geocoder
#[derive(Debug, Error)]
pub enum GeoError {
    /// Transport failure or non-success status
    #[error("Network error: {0}")]
    Network(String),
    /// Response did not match the expected record
    #[error("Invalid response: {0}")]
    Decode(String),
}

/// Postal address of a resolved location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default, deserialize_with = "non_empty", skip_serializing_if = "Option::is_none")]
    pub road: Option<String>,
    #[serde(default, deserialize_with = "non_empty", skip_serializing_if = "Option::is_none")]
    pub village: Option<String>,
    #[serde(default, deserialize_with = "non_empty", skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "non_empty", skip_serializing_if = "Option::is_none")]
    pub state_district: Option<String>,
    #[serde(default, deserialize_with = "non_empty", skip_serializing_if = "Option::is_none")]
    pub city_district: Option<String>,
    #[serde(default, deserialize_with = "non_empty", skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "non_empty", skip_serializing_if = "Option::is_none")]
    pub house_number: Option<String>,
    #[serde(default, deserialize_with = "non_empty", skip_serializing_if = "Option::is_none")]
    pub neighbourhood: Option<String>,
    #[serde(default, deserialize_with = "non_empty", skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,
    pub country: String,
}

/// Reverse geocoding result, shaped after Nominatim's `jsonv2` format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub osm_type: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub lat: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub lon: f64,
    #[serde(default, deserialize_with = "non_empty", skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(alias = "addresstype")]
    pub address_type: String,
    pub display_name: String,
    #[serde(default, deserialize_with = "non_empty", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub address: Address,
}

fn non_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("error converting '{s}' to a float"))),
    }
}

/// Reverse lookup capability
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolve coordinates into an address record.
    async fn reverse(&self, lat: f64, lon: f64) -> Result<LocationRecord, GeoError>;
}

/// Nominatim-backed geocoder
pub struct NominatimGeocoder {
    http_client: HttpClient,
    base_url: String,
}

impl Default for NominatimGeocoder {
    fn default() -> Self {
        Self::new()
    }
}

impl NominatimGeocoder {
    /// Geocoder against the public Nominatim instance
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_url(NOMINATIM_BASE_URL)
    }

    /// Geocoder against a custom host (self-hosted instance or tests)
    #[must_use]
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            http_client: create_http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn reverse(&self, lat: f64, lon: f64) -> Result<LocationRecord, GeoError> {
        let url = format!("{}/reverse", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .header("user-agent", NOMINATIM_USER_AGENT)
            .header("referer", format!("{}/", self.base_url))
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("format", "jsonv2".to_string()),
            ])
            .send()
            .await
            .map_err(|e| GeoError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GeoError::Network(format!(
                "Nominatim returned {}",
                response.status()
            )));
        }

        let record: LocationRecord = response
            .json()
            .await
            .map_err(|e| GeoError::Decode(e.to_string()))?;
        debug!(display_name = %record.display_name, "Reverse geocoding resolved");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn nominatim_body() -> serde_json::Value {
        json!({
            "place_id": 1,
            "osm_type": "way",
            "lat": "52.5170365",
            "lon": "13.3888599",
            "category": "",
            "type": "residential",
            "addresstype": "road",
            "name": "",
            "display_name": "Unter den Linden, Mitte, Berlin, 10117, Deutschland",
            "address": {
                "road": "Unter den Linden",
                "city_district": "Mitte",
                "city": "Berlin",
                "house_number": "",
                "postcode": "10117",
                "country": "Deutschland",
                "country_code": "de"
            }
        })
    }

    #[test]
    fn record_accepts_nominatim_quirks() -> Result<(), serde_json::Error> {
        let record: LocationRecord = serde_json::from_value(nominatim_body())?;
        assert!((record.lat - 52.517_036_5).abs() < 1e-9);
        assert_eq!(record.address_type, "road");
        assert_eq!(record.category, None);
        assert_eq!(record.name, None);
        assert_eq!(record.address.house_number, None);
        assert_eq!(record.address.city.as_deref(), Some("Berlin"));
        Ok(())
    }

    #[test]
    fn record_serializes_without_empty_fields() -> Result<(), serde_json::Error> {
        let record: LocationRecord = serde_json::from_value(nominatim_body())?;
        let encoded = serde_json::to_value(&record)?;
        assert!(encoded.get("name").is_none());
        assert!(encoded["address"].get("village").is_none());
        assert_eq!(encoded["address_type"], "road");
        Ok(())
    }

    #[test]
    fn record_rejects_garbage_coordinates() {
        let mut body = nominatim_body();
        body["lat"] = json!("north-ish");
        assert!(serde_json::from_value::<LocationRecord>(body).is_err());
    }

    #[tokio::test]
    async fn reverse_queries_jsonv2() -> Result<(), GeoError> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/reverse"))
            .and(query_param("format", "jsonv2"))
            .and(query_param("lat", "52.5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(nominatim_body()))
            .expect(1)
            .mount(&server)
            .await;

        let geocoder = NominatimGeocoder::with_base_url(&server.uri());
        let record = geocoder.reverse(52.5, 13.4).await?;
        assert_eq!(record.osm_type, "way");
        Ok(())
    }

    #[tokio::test]
    async fn reverse_reports_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let geocoder = NominatimGeocoder::with_base_url(&server.uri());
        let result = geocoder.reverse(0.0, 0.0).await;
        assert!(matches!(result, Err(GeoError::Network(_))));
    }
}
