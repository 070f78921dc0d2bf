//! Collection rendering, request body parsing and media type negotiation

mod json;
mod text;
mod xml;

use crate::category::CategoryId;
use crate::collection::Collection;
use crate::entity::{ActionInstance, Entity};
use crate::error::{CoreError, Result};
use crate::registry::Registry;
use std::fmt;

/// Supported wire formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    OcciJson,
    Json,
    OcciXml,
    Xml,
    TextPlain,
    UriList,
}

impl MediaType {
    pub const ALL: [MediaType; 6] = [
        MediaType::OcciJson,
        MediaType::Json,
        MediaType::OcciXml,
        MediaType::Xml,
        MediaType::TextPlain,
        MediaType::UriList,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OcciJson => "application/occi+json",
            Self::Json => "application/json",
            Self::OcciXml => "application/occi+xml",
            Self::Xml => "application/xml",
            Self::TextPlain => "text/plain",
            Self::UriList => "text/uri-list",
        }
    }

    /// Match a bare `type/subtype`
    pub fn parse(essence: &str) -> Option<Self> {
        let essence = essence.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|m| m.as_str() == essence)
    }

    /// Media type of a request body from its `Content-Type` header
    ///
    /// An absent header means `text/plain`.
    pub fn from_content_type(content_type: Option<&str>) -> Result<Self> {
        let Some(raw) = content_type else {
            return Ok(Self::TextPlain);
        };
        let essence = raw.split(';').next().unwrap_or_default();
        Self::parse(essence).ok_or_else(|| CoreError::UnsupportedMediaType(raw.to_string()))
    }

    /// Comma separated list of every supported type
    pub fn supported_list() -> String {
        Self::ALL
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn matches_range(&self, range: &str) -> bool {
        match range {
            "*/*" => true,
            _ => match range.strip_suffix("/*") {
                Some(top) => self.as_str().starts_with(&format!("{}/", top)),
                None => self.as_str() == range,
            },
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct AcceptRange {
    range: String,
    q: f32,
    specificity: u8,
    position: usize,
}

fn parse_accept(accept: &str) -> Vec<AcceptRange> {
    accept
        .split(',')
        .enumerate()
        .filter_map(|(position, item)| {
            let mut parts = item.split(';');
            let range = parts.next()?.trim().to_ascii_lowercase();
            if range.is_empty() {
                return None;
            }
            let q = parts
                .filter_map(|p| p.trim().strip_prefix("q="))
                .next()
                .and_then(|q| q.trim().parse::<f32>().ok())
                .unwrap_or(1.0);
            let specificity = match range.as_str() {
                "*/*" => 0,
                r if r.ends_with("/*") => 1,
                _ => 2,
            };
            Some(AcceptRange {
                range,
                q,
                specificity,
                position,
            })
        })
        .collect()
}

/// Pick the response media type for an `Accept` header
///
/// Honours q-values and wildcards. An absent header or `*/*` selects
/// `text/plain`. Fails with `NotAcceptable` when nothing matches.
pub fn negotiate(accept: Option<&str>) -> Result<MediaType> {
    let Some(accept) = accept.filter(|a| !a.trim().is_empty()) else {
        return Ok(MediaType::TextPlain);
    };

    let mut ranges = parse_accept(accept);
    ranges.sort_by(|a, b| {
        b.q.total_cmp(&a.q)
            .then(b.specificity.cmp(&a.specificity))
            .then(a.position.cmp(&b.position))
    });

    for range in ranges.iter().filter(|r| r.q > 0.0) {
        // wildcards prefer text/plain, then the OCCI flavours in declaration order
        let preferred = std::iter::once(MediaType::TextPlain).chain(MediaType::ALL);
        let excluded = |m: &MediaType| {
            ranges
                .iter()
                .any(|r| r.q <= 0.0 && r.specificity == 2 && r.range == m.as_str())
        };
        if let Some(media) = preferred
            .filter(|m| m.matches_range(&range.range))
            .find(|m| !excluded(m))
        {
            return Ok(media);
        }
    }

    Err(CoreError::NotAcceptable(accept.to_string()))
}

/// Decoded request body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestBody {
    /// Entities or category definitions
    pub collection: Collection,
    /// Action invocation, if the body carries one
    pub action: Option<ActionInstance>,
    /// Entity locations (mixin tagging, uri lists)
    pub locations: Vec<String>,
}

/// Parse a request body of type `media`
pub fn parse(body: &str, media: MediaType) -> Result<RequestBody> {
    if body.trim().is_empty() {
        return Ok(RequestBody::default());
    }
    match media {
        MediaType::OcciJson | MediaType::Json => json::parse(body),
        MediaType::OcciXml | MediaType::Xml => xml::parse(body),
        MediaType::TextPlain => text::parse(body),
        MediaType::UriList => Ok(RequestBody {
            locations: text::parse_uri_list(body),
            ..Default::default()
        }),
    }
}

/// Serializes collections for one base URL
pub struct Renderer<'a> {
    base_url: &'a str,
    registry: &'a Registry,
}

impl<'a> Renderer<'a> {
    pub fn new(base_url: &'a str, registry: &'a Registry) -> Self {
        Self { base_url, registry }
    }

    /// Path of an entity: its kind's location followed by the id
    pub fn entity_location(&self, kind: &CategoryId, id: &str) -> String {
        let location = self
            .registry
            .kind(kind)
            .ok()
            .and_then(|k| k.location.as_deref())
            .unwrap_or("/");
        format!("{}{}", location, id)
    }

    /// Absolute URI of an entity
    pub fn entity_uri(&self, kind: &CategoryId, id: &str) -> String {
        self.absolute(&self.entity_location(kind, id))
    }

    /// Prefix a path with the base URL
    pub fn absolute(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Absolute URIs of every entity in the collection, resources first
    pub fn entity_uris(&self, collection: &Collection) -> Vec<String> {
        collection
            .resources
            .iter()
            .map(|r| self.entity_uri(r.kind(), r.id()))
            .chain(
                collection
                    .links
                    .iter()
                    .map(|l| self.entity_uri(l.kind(), l.id())),
            )
            .collect()
    }

    pub fn render(&self, collection: &Collection, media: MediaType) -> Result<String> {
        match media {
            MediaType::OcciJson | MediaType::Json => json::render(collection),
            MediaType::OcciXml | MediaType::Xml => xml::render(collection),
            MediaType::TextPlain => Ok(text::render(self, collection)),
            MediaType::UriList => Ok(uri_lines(&self.entity_uris(collection))),
        }
    }

    /// Link-only rendering of absolute URIs
    pub fn render_locations(&self, uris: &[String], media: MediaType) -> Result<String> {
        match media {
            MediaType::OcciJson | MediaType::Json => json::render_locations(uris),
            MediaType::OcciXml | MediaType::Xml => xml::render_locations(uris),
            MediaType::TextPlain | MediaType::UriList => Ok(uri_lines(uris)),
        }
    }
}

fn uri_lines(uris: &[String]) -> String {
    let mut out = String::new();
    for uri in uris {
        out.push_str(uri);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Resource;
    use crate::schema::infrastructure;

    #[test]
    fn test_negotiate_defaults_to_text_plain() {
        assert_eq!(negotiate(None).unwrap(), MediaType::TextPlain);
        assert_eq!(negotiate(Some("")).unwrap(), MediaType::TextPlain);
        assert_eq!(negotiate(Some("*/*")).unwrap(), MediaType::TextPlain);
    }

    #[test]
    fn test_negotiate_honours_q_values() {
        let accept = "text/plain;q=0.5, application/occi+json";
        assert_eq!(negotiate(Some(accept)).unwrap(), MediaType::OcciJson);
        let accept = "application/xml;q=0.9, text/uri-list";
        assert_eq!(negotiate(Some(accept)).unwrap(), MediaType::UriList);
    }

    #[test]
    fn test_negotiate_wildcards() {
        assert_eq!(negotiate(Some("application/*")).unwrap(), MediaType::OcciJson);
        assert_eq!(negotiate(Some("text/*")).unwrap(), MediaType::TextPlain);
        assert_eq!(
            negotiate(Some("text/*, text/plain;q=0")).unwrap(),
            MediaType::UriList
        );
    }

    #[test]
    fn test_negotiate_not_acceptable() {
        assert!(matches!(
            negotiate(Some("image/png")),
            Err(CoreError::NotAcceptable(_))
        ));
        assert!(negotiate(Some("application/json;q=0")).is_err());
    }

    #[test]
    fn test_content_type() {
        assert_eq!(
            MediaType::from_content_type(Some("application/json; charset=utf-8")).unwrap(),
            MediaType::Json
        );
        assert_eq!(
            MediaType::from_content_type(None).unwrap(),
            MediaType::TextPlain
        );
        assert!(matches!(
            MediaType::from_content_type(Some("application/yaml")),
            Err(CoreError::UnsupportedMediaType(_))
        ));
    }

    #[test]
    fn test_uri_list_has_one_uri_per_entity() {
        let registry = Registry::with_builtin().unwrap();
        let renderer = Renderer::new("http://localhost:3000/", &registry);
        let collection = Collection::from(vec![
            Resource::new(infrastructure::storage()).with_id("a"),
            Resource::new(infrastructure::storage()).with_id("b"),
        ]);
        let body = renderer.render(&collection, MediaType::UriList).unwrap();
        assert_eq!(
            body.lines().collect::<Vec<_>>(),
            vec![
                "http://localhost:3000/storage/a",
                "http://localhost:3000/storage/b"
            ]
        );
    }

    #[test]
    fn test_render_locations() {
        let registry = Registry::new();
        let renderer = Renderer::new("http://h", &registry);
        let uris = vec!["http://h/storage/1".to_string()];
        assert_eq!(
            renderer.render_locations(&uris, MediaType::UriList).unwrap(),
            "http://h/storage/1\n"
        );
        let json = renderer.render_locations(&uris, MediaType::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["locations"][0], "http://h/storage/1");
        let xml = renderer.render_locations(&uris, MediaType::Xml).unwrap();
        assert!(xml.contains("<location>http://h/storage/1</location>"));
    }

    #[test]
    fn test_parse_empty_body() {
        for media in MediaType::ALL {
            assert_eq!(parse("  \n", media).unwrap(), RequestBody::default());
        }
    }
}
