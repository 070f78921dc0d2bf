//! Query interface: category discovery and user mixins

use super::entities::set_tag;
use super::{request_body, respond, response_media};
use crate::error::{ApiError, Result};
use crate::state::SharedState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use occigate_backend::{Filter, ResourceKind};
use occigate_core::{CategoryId, Collection, Renderer};
use tracing::{info, warn};

/// `GET /-/`
///
/// Categories named in the request body restrict the listing.
pub async fn list_categories(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let media = response_media(&headers)?;
    let request = request_body(&headers, &body)?;
    let filter: Vec<CategoryId> = request
        .collection
        .categories()
        .map(|c| c.id().clone())
        .chain(request.action.map(|a| a.action))
        .collect();

    let registry = state.registry.read().await;
    let categories = registry.get((!filter.is_empty()).then_some(filter.as_slice()));
    let rendered = Renderer::new(&state.base_url, &registry).render(&categories, media)?;
    Ok(respond(StatusCode::OK, media, rendered))
}

/// `POST /-/`: register user mixins
///
/// All mixins in the body are registered or none are.
pub async fn register_mixins(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let media = response_media(&headers)?;
    let request = request_body(&headers, &body)?;
    let collection = request.collection;
    if !collection.kinds.is_empty() || !collection.actions.is_empty() {
        return Err(ApiError::BadRequest(
            "only mixins can be registered through the query interface".to_string(),
        ));
    }
    if collection.mixins.is_empty() {
        return Err(ApiError::BadRequest("no mixin in request".to_string()));
    }

    let mut mixins = collection.mixins;
    for mixin in &mut mixins {
        let location = mixin
            .location
            .as_deref()
            .ok_or_else(|| ApiError::BadRequest(format!("mixin {} has no location", mixin.id)))?;
        mixin.location = Some(state.to_path(location).to_string());
    }

    let mut registry = state.registry.write().await;
    let mut staged = registry.clone();
    for mixin in &mixins {
        staged.register(mixin.clone())?;
    }
    *registry = staged;
    for mixin in &mixins {
        info!("Registered mixin {}", mixin.id);
    }

    let registered = Collection {
        mixins,
        ..Default::default()
    };
    let rendered = Renderer::new(&state.base_url, &registry).render(&registered, media)?;
    Ok(respond(StatusCode::OK, media, rendered))
}

/// `DELETE /-/`: remove user mixins and untag every entity carrying them
pub async fn delete_mixins(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let request = request_body(&headers, &body)?;
    let ids: Vec<CategoryId> = request
        .collection
        .mixins
        .into_iter()
        .map(|m| m.id)
        .collect();
    if ids.is_empty() {
        return Err(ApiError::BadRequest("no mixin in request".to_string()));
    }

    {
        let mut registry = state.registry.write().await;
        let mut staged = registry.clone();
        for id in &ids {
            staged.unregister(id)?;
        }
        *registry = staged;
    }

    for mixin in &ids {
        info!("Removed mixin {}", mixin);
        let filter = Filter::all().with_mixin(mixin.clone());
        for kind in ResourceKind::ALL {
            for id in state.manager.list_ids(kind, &filter).await? {
                if let Err(e) = set_tag(&state, kind, &id, mixin, false).await {
                    warn!("Failed to untag {} from {} {}: {}", mixin, kind, id, e);
                }
            }
        }
    }

    Ok(StatusCode::OK.into_response())
}
