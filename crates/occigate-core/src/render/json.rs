//! `application/occi+json` and `application/json`

use super::RequestBody;
use crate::category::CategoryId;
use crate::collection::Collection;
use crate::entity::{ActionInstance, Attributes};
use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
struct JsonRequest {
    #[serde(flatten)]
    collection: Collection,
    #[serde(default)]
    action: Option<CategoryId>,
    #[serde(default)]
    attributes: Attributes,
    #[serde(default)]
    locations: Vec<String>,
}

#[derive(Serialize)]
struct Locations<'a> {
    locations: &'a [String],
}

pub(super) fn render(collection: &Collection) -> Result<String> {
    Ok(serde_json::to_string_pretty(collection)?)
}

pub(super) fn render_locations(uris: &[String]) -> Result<String> {
    Ok(serde_json::to_string_pretty(&Locations { locations: uris })?)
}

/// Accepts a collection, an action invocation
/// (`{"action": "<id>", "attributes": {...}}`) or a location list
pub(super) fn parse(body: &str) -> Result<RequestBody> {
    let request: JsonRequest =
        serde_json::from_str(body).map_err(|e| CoreError::Parse(e.to_string()))?;

    let action = match request.action {
        Some(action) => Some(ActionInstance {
            action,
            attributes: request.attributes,
        }),
        None if !request.attributes.is_empty() => {
            return Err(CoreError::Parse(
                "attributes given without an action".to_string(),
            ));
        }
        None => None,
    };

    Ok(RequestBody {
        collection: request.collection,
        action,
        locations: request.locations,
    })
}
