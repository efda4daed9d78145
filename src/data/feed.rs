//! Bikeshare station feed client
//!
//! Fetches the upstream station feed and converts it into a GeoJSON
//! FeatureCollection, one Point feature per station.

use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use geojson::{Feature, FeatureCollection, Geometry};
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::StationRecord;

/// Default upstream feed URL
pub const DEFAULT_FEED_URL: &str = "https://www.bayareabikeshare.com/stations/json";

/// Field of the upstream document holding the station list
const STATION_LIST_FIELD: &str = "stationBeanList";

/// Errors that can occur when fetching or transforming the station feed
#[derive(Debug, Error)]
pub enum FeedError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Request(#[source] reqwest::Error),

    /// Upstream did not answer within the configured timeout
    #[error("Upstream feed timed out")]
    Timeout,

    /// Upstream answered with a non-success status
    #[error("Upstream feed returned status {0}")]
    Status(u16),

    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Document has no `stationBeanList` array
    #[error("Feed is missing the stationBeanList array")]
    MissingStationList,

    /// A station entry is not a JSON object
    #[error("Station {index} is not an object")]
    InvalidStation { index: usize },

    /// A station lacks a numeric coordinate
    #[error("Station {index} has no numeric {field}")]
    InvalidCoordinate { index: usize, field: &'static str },
}

impl FeedError {
    /// Whether the failure was the upstream timing out
    pub fn is_timeout(&self) -> bool {
        matches!(self, FeedError::Timeout)
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FeedError::Timeout
        } else {
            FeedError::Request(err)
        }
    }
}

/// Something that can produce a fresh FeatureCollection
///
/// The refresh cache only talks to its upstream through this trait, so tests
/// can swap in a source that counts calls or never completes.
pub trait FeedSource: Send + Sync {
    /// Fetches the feed and transforms it
    fn fetch(&self) -> BoxFuture<'static, Result<FeatureCollection, FeedError>>;
}

/// Client for fetching the station feed over HTTPS
#[derive(Debug, Clone)]
pub struct FeedClient {
    /// HTTP client for making requests
    http_client: Client,
    /// URL of the upstream feed
    feed_url: String,
}

impl FeedClient {
    /// Creates a new FeedClient whose requests give up after `timeout`
    pub fn new(feed_url: impl Into<String>, timeout: Duration) -> Result<Self, FeedError> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(http_client, feed_url))
    }

    /// Create a new FeedClient with a custom HTTP client
    pub fn with_client(http_client: Client, feed_url: impl Into<String>) -> Self {
        Self {
            http_client,
            feed_url: feed_url.into(),
        }
    }

    /// The upstream URL this client fetches
    pub fn feed_url(&self) -> &str {
        &self.feed_url
    }

    /// Fetch the station feed and convert it to GeoJSON
    ///
    /// # Returns
    /// * `Ok(FeatureCollection)` - One feature per upstream station, in feed order
    /// * `Err(FeedError)` - If the request, the status, the JSON or the shape is bad
    pub async fn fetch_feed(&self) -> Result<FeatureCollection, FeedError> {
        let response = self.http_client.get(&self.feed_url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }

        let text = response.text().await?;
        let raw: Value = serde_json::from_str(&text)?;
        debug!(url = %self.feed_url, bytes = text.len(), "fetched station feed");

        transform_feed(raw)
    }
}

impl FeedSource for FeedClient {
    fn fetch(&self) -> BoxFuture<'static, Result<FeatureCollection, FeedError>> {
        let client = self.clone();
        async move { client.fetch_feed().await }.boxed()
    }
}

/// Converts an upstream feed document into a GeoJSON FeatureCollection
///
/// Each station becomes a Point feature at `[longitude, latitude]` carrying the
/// untouched station object as its properties. Output order follows the feed.
pub fn transform_feed(raw: Value) -> Result<FeatureCollection, FeedError> {
    let stations = match raw {
        Value::Object(mut document) => match document.remove(STATION_LIST_FIELD) {
            Some(Value::Array(stations)) => stations,
            _ => return Err(FeedError::MissingStationList),
        },
        _ => return Err(FeedError::MissingStationList),
    };

    let features = stations
        .into_iter()
        .enumerate()
        .map(|(index, station)| station_to_feature(index, station))
        .collect::<Result<Vec<Feature>, FeedError>>()?;

    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

fn station_to_feature(index: usize, station: Value) -> Result<Feature, FeedError> {
    let Value::Object(properties) = station else {
        return Err(FeedError::InvalidStation { index });
    };

    let longitude = coordinate(&properties, index, "longitude")?;
    let latitude = coordinate(&properties, index, "latitude")?;

    Ok(Feature {
        bbox: None,
        geometry: Some(Geometry::new(geojson::Value::Point(vec![
            longitude, latitude,
        ]))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    })
}

fn coordinate(
    station: &StationRecord,
    index: usize,
    field: &'static str,
) -> Result<f64, FeedError> {
    station
        .get(field)
        .and_then(Value::as_f64)
        .ok_or(FeedError::InvalidCoordinate { index, field })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Sample feed in the upstream shape, trimmed to three stations
    const VALID_FEED: &str = r#"{
        "executionTime": "2016-08-31 04:19:03 PM",
        "stationBeanList": [
            {
                "id": 2,
                "stationName": "San Jose Diridon Caltrain Station",
                "availableDocks": 14,
                "totalDocks": 27,
                "latitude": 37.329732,
                "longitude": -121.901782,
                "statusValue": "In Service",
                "availableBikes": 12,
                "testStation": false
            },
            {
                "id": 3,
                "stationName": "San Jose Civic Center",
                "availableDocks": 8,
                "totalDocks": 15,
                "latitude": 37.330698,
                "longitude": -121.888979,
                "statusValue": "In Service",
                "availableBikes": 7,
                "testStation": false
            },
            {
                "id": 4,
                "stationName": "Santa Clara at Almaden",
                "availableDocks": 6,
                "totalDocks": 11,
                "latitude": 37.333988,
                "longitude": -121.894902,
                "statusValue": "In Service",
                "availableBikes": 5,
                "testStation": false
            }
        ]
    }"#;

    fn valid_feed() -> Value {
        serde_json::from_str(VALID_FEED).expect("Fixture should be valid JSON")
    }

    fn coordinates(feature: &Feature) -> Vec<f64> {
        match &feature.geometry.as_ref().expect("Feature should have geometry").value {
            geojson::Value::Point(position) => position.clone(),
            other => panic!("Expected a point, got {:?}", other),
        }
    }

    #[test]
    fn test_transform_single_station() {
        let raw = json!({
            "stationBeanList": [{ "id": 1, "longitude": -122.4, "latitude": 37.8 }]
        });

        let collection = transform_feed(raw).expect("Feed should transform");

        assert_eq!(collection.features.len(), 1);
        let feature = &collection.features[0];
        assert_eq!(coordinates(feature), vec![-122.4, 37.8]);
        assert_eq!(
            Value::Object(feature.properties.clone().expect("Properties should be set")),
            json!({ "id": 1, "longitude": -122.4, "latitude": 37.8 })
        );
    }

    #[test]
    fn test_transform_serializes_as_geojson() {
        let raw = json!({
            "stationBeanList": [{ "id": 1, "longitude": -122.4, "latitude": 37.8 }]
        });

        let collection = transform_feed(raw).expect("Feed should transform");
        let value = serde_json::to_value(&collection).expect("Should serialize");

        assert_eq!(
            value,
            json!({
                "type": "FeatureCollection",
                "features": [{
                    "type": "Feature",
                    "geometry": { "type": "Point", "coordinates": [-122.4, 37.8] },
                    "properties": { "id": 1, "longitude": -122.4, "latitude": 37.8 }
                }]
            })
        );
    }

    #[test]
    fn test_transform_preserves_station_order() {
        let collection = transform_feed(valid_feed()).expect("Feed should transform");

        let ids: Vec<i64> = collection
            .features
            .iter()
            .map(|f| {
                f.properties.as_ref().expect("Properties should be set")["id"]
                    .as_i64()
                    .expect("id should be numeric")
            })
            .collect();

        assert_eq!(ids, vec![2, 3, 4]);
    }

    #[test]
    fn test_transform_keeps_every_station_field() {
        let raw = valid_feed();
        let stations = raw["stationBeanList"]
            .as_array()
            .expect("Fixture has a station list")
            .clone();

        let collection = transform_feed(raw).expect("Feed should transform");

        for (station, feature) in stations.iter().zip(&collection.features) {
            let properties = Value::Object(feature.properties.clone().expect("Properties should be set"));
            assert_eq!(&properties, station);
            assert_eq!(
                coordinates(feature),
                vec![
                    station["longitude"].as_f64().unwrap(),
                    station["latitude"].as_f64().unwrap()
                ]
            );
        }
    }

    #[test]
    fn test_transform_keeps_field_order() {
        let collection = transform_feed(valid_feed()).expect("Feed should transform");
        let keys: Vec<&str> = collection.features[0]
            .properties
            .as_ref()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();

        assert_eq!(&keys[..3], &["id", "stationName", "availableDocks"]);
    }

    #[test]
    fn test_transform_is_idempotent() {
        let first = transform_feed(valid_feed()).expect("Feed should transform");
        let second = transform_feed(valid_feed()).expect("Feed should transform");

        assert_eq!(first, second);
    }

    #[test]
    fn test_transform_empty_station_list() {
        let collection =
            transform_feed(json!({ "stationBeanList": [] })).expect("Empty feed is valid");
        assert!(collection.features.is_empty());
    }

    #[test]
    fn test_transform_missing_station_list() {
        let result = transform_feed(json!({ "stations": [] }));
        assert!(matches!(result, Err(FeedError::MissingStationList)));

        let result = transform_feed(json!({ "stationBeanList": "nope" }));
        assert!(matches!(result, Err(FeedError::MissingStationList)));

        let result = transform_feed(json!([1, 2, 3]));
        assert!(matches!(result, Err(FeedError::MissingStationList)));
    }

    #[test]
    fn test_transform_station_not_an_object() {
        let result = transform_feed(json!({
            "stationBeanList": [{ "longitude": 1.0, "latitude": 2.0 }, 42]
        }));
        assert!(matches!(result, Err(FeedError::InvalidStation { index: 1 })));
    }

    #[test]
    fn test_transform_missing_coordinates() {
        let result = transform_feed(json!({
            "stationBeanList": [{ "id": 1, "latitude": 37.8 }]
        }));
        assert!(matches!(
            result,
            Err(FeedError::InvalidCoordinate { index: 0, field: "longitude" })
        ));

        let result = transform_feed(json!({
            "stationBeanList": [{ "id": 1, "longitude": -122.4, "latitude": "37.8" }]
        }));
        assert!(matches!(
            result,
            Err(FeedError::InvalidCoordinate { index: 0, field: "latitude" })
        ));
    }

    #[test]
    fn test_integer_coordinates_are_accepted() {
        let collection = transform_feed(json!({
            "stationBeanList": [{ "longitude": -122, "latitude": 37 }]
        }))
        .expect("Integer coordinates are numeric");

        let feature = &collection.features[0];
        assert_eq!(coordinates(feature), vec![-122.0, 37.0]);

        // GeoJSON positions are floats; the station's own fields keep their form
        let properties = feature.properties.as_ref().unwrap();
        assert_eq!(properties["longitude"], json!(-122));
        assert!(properties["longitude"].is_i64());

        let serialized = serde_json::to_value(feature).unwrap();
        assert_eq!(serialized["geometry"]["coordinates"], json!([-122.0, 37.0]));
        assert_eq!(serialized["properties"]["latitude"], json!(37));
    }

    #[test]
    fn test_error_messages() {
        let err = FeedError::InvalidCoordinate {
            index: 7,
            field: "latitude",
        };
        assert_eq!(err.to_string(), "Station 7 has no numeric latitude");
        assert!(!err.is_timeout());
        assert!(FeedError::Timeout.is_timeout());
        assert_eq!(
            FeedError::Status(503).to_string(),
            "Upstream feed returned status 503"
        );
    }

    #[test]
    fn test_parse_malformed_json() {
        let result: Result<Value, FeedError> =
            serde_json::from_str("{ invalid json }").map_err(FeedError::from);
        assert!(matches!(result, Err(FeedError::Parse(_))));
    }

    #[test]
    fn test_client_keeps_feed_url() {
        let client = FeedClient::with_client(Client::new(), "http://localhost/stations");
        assert_eq!(client.feed_url(), "http://localhost/stations");
    }
}
