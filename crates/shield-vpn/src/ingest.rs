//! Server Ingestion
//!
//! Turns scanned or manually entered text into a [`Server`].
//!
//! # Parser Chain
//!
//! ```text
//!  text ──▶ trim ──▶ JsonPayloadParser ──▶ SchemeUrlParser ──▶ MalformedServerData
//!                          │                     │
//!                     Matched/Rejected        Matched
//!                          ▼                     ▼
//!                      ServerDraft ──▶ into_server(id, rng) ──▶ Server
//! ```
//!
//! Each parser answers `Matched`, `NoMatch` or `Rejected`. The first answer
//! other than `NoMatch` ends the chain. Camera and manual entry share the
//! same pipeline.

use crate::server::{CatalogError, Server, PLACEHOLDER_FLAG};
use rand::Rng;
use serde_json::Value;
use std::ops::Range;
use tracing::debug;

/// Country label for servers added from a bare URL
pub const CUSTOM_COUNTRY: &str = "Пользовательский";

/// Ping assigned when the payload has none (ms)
pub const RANDOM_PING_MS: Range<u32> = 10..160;

/// Load assigned when the payload has none (percent)
pub const RANDOM_LOAD_PERCENT: Range<u8> = 10..70;

/// Scheme separator that marks URL payloads
const SCHEME_SEPARATOR: &str = "://";

/// Parsed server fields before an id is assigned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDraft {
    pub country: String,
    pub city: String,
    pub flag: Option<String>,
    pub ping: Option<u32>,
    pub load: Option<u8>,
}

impl ServerDraft {
    /// Fill in missing fields and build the server
    pub fn into_server<R: Rng + ?Sized>(self, id: String, rng: &mut R) -> Server {
        Server {
            id,
            country: self.country,
            city: self.city,
            flag: self.flag.unwrap_or_else(|| PLACEHOLDER_FLAG.to_string()),
            ping: self.ping.unwrap_or_else(|| rng.gen_range(RANDOM_PING_MS)),
            load: self.load.unwrap_or_else(|| rng.gen_range(RANDOM_LOAD_PERCENT)),
        }
    }
}

/// Result of one parser strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// The text was recognized
    Matched(ServerDraft),
    /// Not this parser's format, try the next one
    NoMatch,
    /// This parser's format, but unusable; stops the chain
    Rejected(IngestError),
}

/// One strategy in the ingestion chain
pub trait ServerParser: Send + Sync {
    /// Short name for logging
    fn name(&self) -> &'static str;

    /// Parse trimmed, non-empty text
    fn parse(&self, text: &str) -> ParseOutcome;
}

/// JSON object payload: `{"country": .., "city": .., "flag": .., "ping": .., "load": ..}`
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonPayloadParser;

impl JsonPayloadParser {
    fn non_empty_str(object: &Value, key: &str) -> Option<String> {
        object
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

impl ServerParser for JsonPayloadParser {
    fn name(&self) -> &'static str {
        "json"
    }

    fn parse(&self, text: &str) -> ParseOutcome {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(_) => return ParseOutcome::NoMatch,
        };

        let country = Self::non_empty_str(&value, "country");
        let city = Self::non_empty_str(&value, "city");

        let (Some(country), Some(city)) = (country, city) else {
            return ParseOutcome::Rejected(IngestError::IncompleteServerData);
        };

        // Out-of-range numbers count as absent
        let ping = value
            .get("ping")
            .and_then(Value::as_u64)
            .and_then(|p| u32::try_from(p).ok());
        let load = value
            .get("load")
            .and_then(Value::as_u64)
            .filter(|l| *l <= 100)
            .map(|l| l as u8);

        ParseOutcome::Matched(ServerDraft {
            country,
            city,
            flag: Self::non_empty_str(&value, "flag"),
            ping,
            load,
        })
    }
}

/// Bare link payload such as `vpn://example.com/path`
///
/// The host part becomes the city; the country is [`CUSTOM_COUNTRY`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SchemeUrlParser;

impl ServerParser for SchemeUrlParser {
    fn name(&self) -> &'static str {
        "url"
    }

    fn parse(&self, text: &str) -> ParseOutcome {
        let Some((_, rest)) = text.split_once(SCHEME_SEPARATOR) else {
            return ParseOutcome::NoMatch;
        };

        let authority = rest.split(SCHEME_SEPARATOR).next().unwrap_or(rest);
        let host = authority.split('/').next().unwrap_or_default();
        let city = if host.is_empty() { text } else { host };

        ParseOutcome::Matched(ServerDraft {
            country: CUSTOM_COUNTRY.to_string(),
            city: city.to_string(),
            flag: None,
            ping: None,
            load: None,
        })
    }
}

/// Ordered chain of parsers
pub struct IngestPipeline {
    parsers: Vec<Box<dyn ServerParser>>,
}

impl IngestPipeline {
    /// Default chain: JSON, then URL
    pub fn new() -> Self {
        Self::with_parsers(vec![Box::new(JsonPayloadParser), Box::new(SchemeUrlParser)])
    }

    /// Custom chain, tried in order
    pub fn with_parsers(parsers: Vec<Box<dyn ServerParser>>) -> Self {
        Self { parsers }
    }

    /// Run the chain and return the first match
    pub fn parse(&self, text: &str) -> Result<ServerDraft, IngestError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(IngestError::EmptyInput);
        }

        for parser in &self.parsers {
            match parser.parse(text) {
                ParseOutcome::Matched(draft) => {
                    debug!("Server data recognized by {} parser", parser.name());
                    return Ok(draft);
                }
                ParseOutcome::Rejected(err) => {
                    debug!("Server data rejected by {} parser: {}", parser.name(), err);
                    return Err(err);
                }
                ParseOutcome::NoMatch => {}
            }
        }

        Err(IngestError::MalformedServerData)
    }

    /// Parse and build a server with the given id
    pub fn ingest<R: Rng + ?Sized>(
        &self,
        text: &str,
        id: String,
        rng: &mut R,
    ) -> Result<Server, IngestError> {
        self.parse(text).map(|draft| draft.into_server(id, rng))
    }
}

impl Default for IngestPipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Validation errors shown to the user; state is left untouched
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    #[error("No server data entered")]
    EmptyInput,

    #[error("Invalid QR code format: country and city are required")]
    IncompleteServerData,

    #[error("Could not recognize server data")]
    MalformedServerData,

    #[error("Server rejected: {0}")]
    Catalog(#[from] CatalogError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_json_full_payload() {
        let pipeline = IngestPipeline::new();
        let text = r#"{"country":"Германия","city":"Берлин","flag":"🇩🇪","ping":30,"load":45}"#;

        let server = pipeline.ingest(text, "qr-1".into(), &mut rng()).unwrap();

        assert_eq!(server, Server::new("qr-1", "Германия", "Берлин", "🇩🇪", 30, 45));
    }

    #[test]
    fn test_json_missing_numbers_are_randomized() {
        let pipeline = IngestPipeline::new();
        let text = r#"{"country":"США","city":"Нью-Йорк","flag":"🇺🇸"}"#;
        let mut rng = rng();

        for _ in 0..200 {
            let server = pipeline.ingest(text, "qr-1".into(), &mut rng).unwrap();
            assert_eq!(server.country, "США");
            assert_eq!(server.city, "Нью-Йорк");
            assert_eq!(server.flag, "🇺🇸");
            assert!((10..=160).contains(&server.ping));
            assert!((10..=70).contains(&server.load));
        }
    }

    #[test]
    fn test_json_placeholder_flag() {
        let draft = JsonPayloadParser.parse(r#"{"country":"X","city":"Y","flag":""}"#);
        let ParseOutcome::Matched(draft) = draft else {
            panic!("expected match");
        };

        let server = draft.into_server("qr-1".into(), &mut rng());
        assert_eq!(server.flag, PLACEHOLDER_FLAG);
    }

    #[test]
    fn test_json_out_of_range_load_is_randomized() {
        let ParseOutcome::Matched(draft) =
            JsonPayloadParser.parse(r#"{"country":"X","city":"Y","load":150,"ping":-3}"#)
        else {
            panic!("expected match");
        };

        assert_eq!(draft.load, None);
        assert_eq!(draft.ping, None);
    }

    #[test]
    fn test_json_without_city_is_rejected() {
        let pipeline = IngestPipeline::new();

        assert_eq!(
            pipeline.parse(r#"{"country":"X"}"#),
            Err(IngestError::IncompleteServerData)
        );
        assert_eq!(
            pipeline.parse(r#"{"country":"X","city":"   "}"#),
            Err(IngestError::IncompleteServerData)
        );
    }

    #[test]
    fn test_url_payload() {
        let pipeline = IngestPipeline::new();

        let server = pipeline
            .ingest("vpn://example.com/path", "qr-1".into(), &mut rng())
            .unwrap();

        assert_eq!(server.city, "example.com");
        assert_eq!(server.country, CUSTOM_COUNTRY);
        assert_eq!(server.flag, PLACEHOLDER_FLAG);
        assert!((10..=160).contains(&server.ping));
        assert!((10..=70).contains(&server.load));
    }

    #[test]
    fn test_url_without_host_uses_whole_text() {
        let ParseOutcome::Matched(draft) = SchemeUrlParser.parse("vpn:///path") else {
            panic!("expected match");
        };
        assert_eq!(draft.city, "vpn:///path");
    }

    #[test]
    fn test_malformed_data() {
        let pipeline = IngestPipeline::new();

        assert_eq!(
            pipeline.parse("not valid data"),
            Err(IngestError::MalformedServerData)
        );
        assert_eq!(pipeline.parse("   "), Err(IngestError::EmptyInput));
    }

    #[test]
    fn test_input_is_trimmed() {
        let pipeline = IngestPipeline::new();
        let draft = pipeline.parse("  vpn://host.example  \n").unwrap();
        assert_eq!(draft.city, "host.example");
    }

    #[test]
    fn test_custom_chain() {
        let pipeline = IngestPipeline::with_parsers(vec![Box::new(SchemeUrlParser)]);

        assert_eq!(
            pipeline.parse(r#"{"country":"X","city":"Y"}"#),
            Err(IngestError::MalformedServerData)
        );
    }
}
