//! Free-text address lookup against a Nominatim-compatible search endpoint.
use serde::Deserialize;
use thiserror::Error;

use crate::capabilities::{response_parts, HttpError, HttpMethod, HttpRequest, HttpResult};
use crate::config::GeocoderConfig;
use crate::model::{CoordinateError, LatLon, Place};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeocodeError {
    #[error("search query is empty")]
    EmptyQuery,

    #[error("no match for the query")]
    NotFound,

    #[error("cannot build geocoder request: {0}")]
    Request(#[from] HttpError),

    #[error("geocoder unreachable: {0}")]
    Transport(String),

    #[error("geocoder returned status {0}")]
    Status(u16),

    #[error("geocoder returned malformed data: {0}")]
    Malformed(String),

    #[error("geocoder returned unusable coordinates: {0}")]
    InvalidCoordinates(#[from] CoordinateError),
}

impl GeocodeError {
    /// Translation key for the notification shown to the user.
    pub fn message_key(&self) -> &'static str {
        match self {
            Self::EmptyQuery => "enter_address",
            Self::NotFound => "address_not_found",
            Self::Request(_)
            | Self::Transport(_)
            | Self::Status(_)
            | Self::Malformed(_)
            | Self::InvalidCoordinates(_) => "search_error",
        }
    }
}

/// A trimmed, non-empty search term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeocodeQuery(String);

impl GeocodeQuery {
    pub fn new(raw: &str) -> Result<Self, GeocodeError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(GeocodeError::EmptyQuery);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// `GET {endpoint}?format=json&q={query}`
pub fn build_request(
    config: &GeocoderConfig,
    query: &GeocodeQuery,
) -> Result<HttpRequest, HttpError> {
    let url = config
        .endpoint_url()?
        .with_query([("format", "json"), ("q", query.as_str())])?;
    HttpRequest::new(HttpMethod::Get, url)
        .with_header("Accept", "application/json")?
        .with_header("User-Agent", config.user_agent.as_str())
}

// Nominatim sends coordinates as strings; some mirrors send numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Coordinate {
    Text(String),
    Number(f64),
}

impl Coordinate {
    /// Strict: surrounding whitespace is allowed, anything else that is not a
    /// plain float (`"38.5N"`, `""`) is malformed.
    fn parse(&self) -> Result<f64, GeocodeError> {
        match self {
            Self::Number(value) => Ok(*value),
            Self::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| GeocodeError::Malformed(format!("coordinate '{text}'"))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    display_name: String,
    lat: Coordinate,
    lon: Coordinate,
}

impl Candidate {
    fn into_place(self) -> Result<Place, GeocodeError> {
        let coordinate = LatLon::new(self.lat.parse()?, self.lon.parse()?)?;
        Ok(Place::new(self.display_name, coordinate.lat, coordinate.lon))
    }
}

/// Turns the shell's HTTP outcome into the best match.
pub fn interpret_response(result: HttpResult) -> Result<Place, GeocodeError> {
    let response = result.map_err(|e| GeocodeError::Transport(e.to_string()))?;
    let (status, body) = response_parts(&response);
    interpret_body(status, body)
}

/// Only the first candidate is considered.
pub fn interpret_body(status: u16, body: &[u8]) -> Result<Place, GeocodeError> {
    if !(200..300).contains(&status) {
        return Err(GeocodeError::Status(status));
    }
    let candidates: Vec<Candidate> =
        serde_json::from_slice(body).map_err(|e| GeocodeError::Malformed(e.to_string()))?;
    candidates
        .into_iter()
        .next()
        .ok_or(GeocodeError::NotFound)?
        .into_place()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn respond(status: u16, body: &str) -> Result<Place, GeocodeError> {
        interpret_body(status, body.as_bytes())
    }

    #[test]
    fn query_is_trimmed() {
        assert_eq!(GeocodeQuery::new("  Khorog ").unwrap().as_str(), "Khorog");
        assert_eq!(GeocodeQuery::new(""), Err(GeocodeError::EmptyQuery));
        assert_eq!(GeocodeQuery::new(" \t\n"), Err(GeocodeError::EmptyQuery));
    }

    #[test]
    fn request_targets_search_endpoint() {
        let config = GeocoderConfig::default();
        let query = GeocodeQuery::new("Iskanderkul Lake").unwrap();
        let request = build_request(&config, &query).unwrap();

        assert_eq!(request.method(), HttpMethod::Get);
        assert_eq!(
            request.url().as_str(),
            "https://nominatim.openstreetmap.org/search?format=json&q=Iskanderkul+Lake"
        );
        assert_eq!(request.headers().get("user-agent"), Some(config.user_agent.as_str()));
        assert!(request.body().is_none());
    }

    #[test]
    fn first_candidate_wins() {
        let body = r#"[
            {"display_name": "Khujand, Sughd", "lat": "40.2837", "lon": "69.6219", "importance": 0.7},
            {"display_name": "Khujand street", "lat": "38.5", "lon": "68.7"}
        ]"#;
        let place = respond(200, body).unwrap();
        assert_eq!(place, Place::new("Khujand, Sughd", 40.2837, 69.6219));
    }

    #[test]
    fn numeric_coordinates_are_accepted() {
        let body = r#"[{"display_name": "Hisor", "lat": 38.5263, "lon": 68.5514}]"#;
        let place = respond(200, body).unwrap();
        assert_eq!(place.lat, 38.5263);
    }

    #[test]
    fn padded_text_coordinates_are_accepted() {
        let body = r#"[{"display_name": "Hisor", "lat": " 38.5263 ", "lon": "68.5514"}]"#;
        assert_eq!(respond(200, body).unwrap().lat, 38.5263);
    }

    #[test]
    fn empty_result_is_not_found() {
        let err = respond(200, "[]").unwrap_err();
        assert_eq!(err, GeocodeError::NotFound);
        assert_eq!(err.message_key(), "address_not_found");
    }

    #[test]
    fn failures_map_to_search_error() {
        let cases = [
            respond(503, "[]"),
            respond(200, "<html>"),
            respond(200, r#"[{"display_name": "x", "lat": "north", "lon": "1"}]"#),
            respond(200, r#"[{"display_name": "x", "lat": "38.5N", "lon": "1"}]"#),
            respond(200, r#"[{"display_name": "x", "lat": "95", "lon": "1"}]"#),
            Err(GeocodeError::Transport("offline".into())),
        ];
        for result in cases {
            assert_eq!(result.unwrap_err().message_key(), "search_error");
        }
    }

    #[test]
    fn coordinate_text_is_parsed_strictly() {
        let padded = respond(200, r#"[{"display_name": "x", "lat": " 40.28 ", "lon": "69.6"}]"#);
        assert_eq!(padded.unwrap().lat, 40.28);
        assert!(matches!(
            respond(200, r#"[{"display_name": "x", "lat": "40.28abc", "lon": "69.6"}]"#),
            Err(GeocodeError::Malformed(_))
        ));
    }

    #[test]
    fn error_shapes() {
        assert!(matches!(respond(429, ""), Err(GeocodeError::Status(429))));
        assert!(matches!(
            respond(200, r#"{"error": "bad"}"#),
            Err(GeocodeError::Malformed(_))
        ));
        assert!(matches!(
            respond(200, r#"[{"display_name": "x", "lat": "1", "lon": "200"}]"#),
            Err(GeocodeError::InvalidCoordinates(CoordinateError::LongitudeOutOfRange(_)))
        ));
        assert_eq!(GeocodeError::EmptyQuery.message_key(), "enter_address");
    }
}
