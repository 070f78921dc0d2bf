//! Entity collections: kind locations, link locations and mixin locations

use super::{ActionQuery, created, not_modified, request_body, respond, response_media};
use crate::error::{ApiError, Result, backend_status};
use crate::state::{AppState, SharedState};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use occigate_backend::{BackendError, BatchOutcome, Filter, LinkKind, ResourceKind};
use occigate_core::validate::{apply_update, validate_new_link, validate_new_resource};
use occigate_core::{
    ActionInstance, Category, CategoryId, Collection, CoreError, Kind, MediaType, Mixin, Registry,
    RequestBody, Renderer, Resource,
};
use tracing::{debug, info, warn};

/// What a request path addresses
enum Target {
    Resources(Kind, ResourceKind),
    Links(Kind, LinkKind),
    Mixin(Mixin),
}

/// Resolve a path to its collection and optional instance id
fn resolve(registry: &Registry, path: &str) -> Result<(Target, Option<String>)> {
    let category = registry
        .get_by_location(path)
        .ok_or_else(|| ApiError::NotFound(path.to_string()))?;
    let location = category.location().unwrap_or("/");
    let id = path.strip_prefix(location).unwrap_or_default().trim_matches('/');
    if id.contains('/') {
        return Err(ApiError::NotFound(path.to_string()));
    }
    let id = (!id.is_empty()).then(|| id.to_string());

    let target = match category {
        Category::Kind(kind) => {
            if let Some(resource_kind) = ResourceKind::from_kind(&kind.id) {
                Target::Resources(kind.clone(), resource_kind)
            } else if let Some(link_kind) = LinkKind::from_kind(&kind.id) {
                Target::Links(kind.clone(), link_kind)
            } else {
                return Err(BackendError::MethodNotImplemented(format!(
                    "no backend serves {}",
                    kind.id
                ))
                .into());
            }
        }
        Category::Mixin(mixin) if id.is_none() => Target::Mixin(mixin.clone()),
        _ => return Err(ApiError::NotFound(path.to_string())),
    };
    Ok((target, id))
}

/// Resolve an entity location to a resource kind and id
fn locate_resource(state: &AppState, registry: &Registry, location: &str) -> Result<(ResourceKind, String)> {
    let path = state.to_path(location);
    match resolve(registry, path)? {
        (Target::Resources(_, kind), Some(id)) => Ok((kind, id)),
        _ => Err(ApiError::BadRequest(format!("{} is not a resource", location))),
    }
}

/// Build the action instance for `term` among `declared`
///
/// Parameters from the body are coerced to the action's declared types.
fn resolve_action(
    registry: &Registry,
    declared: &[CategoryId],
    term: &str,
    requested: Option<ActionInstance>,
) -> Result<ActionInstance> {
    let id = declared
        .iter()
        .find(|a| a.term() == term || a.to_string() == term)
        .ok_or_else(|| BackendError::MethodNotImplemented(format!("action {} is not declared", term)))?;

    let mut instance = ActionInstance::new(id.clone());
    let Some(requested) = requested else {
        return Ok(instance);
    };
    if &requested.action != id {
        return Err(ApiError::BadRequest(format!(
            "body names action {}, query names {}",
            requested.action, id
        )));
    }

    let schema = &registry.action(id)?.attributes;
    for (name, value) in requested.attributes {
        let def = schema.get(&name).ok_or_else(|| CoreError::AttributeNotDeclared {
            name: name.clone(),
            kind: id.to_string(),
        })?;
        let value = value
            .coerce(def.attr_type)
            .ok_or_else(|| CoreError::AttributeTypeMismatch {
                name: name.clone(),
                expected: def.attr_type,
            })?;
        instance.attributes.insert(name, value);
    }
    Ok(instance)
}

fn mixin_filter(request: &RequestBody) -> Filter {
    request
        .collection
        .mixins
        .iter()
        .fold(Filter::all(), |filter, m| filter.with_mixin(m.id.clone()))
}

async fn render(
    state: &AppState,
    status: StatusCode,
    media: MediaType,
    collection: &Collection,
) -> Result<Response> {
    let registry = state.registry.read().await;
    let body = Renderer::new(&state.base_url, &registry).render(collection, media)?;
    Ok(respond(status, media, body))
}

/// Rewrite batch ids as absolute entity URIs
async fn qualify(state: &AppState, kind: &CategoryId, outcome: BatchOutcome) -> BatchOutcome {
    let registry = state.registry.read().await;
    let renderer = Renderer::new(&state.base_url, &registry);
    let mut qualified = BatchOutcome::new();
    for id in outcome.succeeded {
        qualified.add_success(renderer.entity_uri(kind, &id));
    }
    for failure in outcome.failed {
        qualified.add_failure(renderer.entity_uri(kind, &failure.id), failure.error);
    }
    qualified
}

/// Response for a batch operation
///
/// Nothing matched: 304. Every entity succeeded: 200 with their URIs.
/// Otherwise the status of the first failure, with one line per failure.
async fn outcome_response(state: &AppState, media: MediaType, outcome: BatchOutcome) -> Result<Response> {
    if outcome.is_empty() {
        return Ok(not_modified());
    }
    if let Some(first) = outcome.first_failure() {
        let status = backend_status(&first.error);
        warn!(
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            "Batch operation partially failed"
        );
        let mut body = String::new();
        for failure in &outcome.failed {
            body.push_str(&format!("{}: {}\n", failure.id, failure.error));
        }
        return Ok((status, [(header::CONTENT_TYPE, "text/plain")], body).into_response());
    }
    let registry = state.registry.read().await;
    let body = Renderer::new(&state.base_url, &registry).render_locations(&outcome.succeeded, media)?;
    Ok(respond(StatusCode::OK, media, body))
}

/// `GET /`: every entity of every kind with a backend
pub async fn list_all(State(state): State<SharedState>, headers: HeaderMap) -> Result<Response> {
    let media = response_media(&headers)?;
    let mut collection = Collection::from(state.manager.list_all(&Filter::all()).await?);
    for kind in LinkKind::ALL {
        collection.links.extend(state.manager.list_links(kind).await?);
    }
    render(&state, StatusCode::OK, media, &collection).await
}

/// Every path below a kind or mixin location
pub async fn dispatch(
    State(state): State<SharedState>,
    method: Method,
    uri: Uri,
    Query(query): Query<ActionQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let path = uri.path();
    debug!("{} {}", method, path);
    let media = response_media(&headers)?;
    let request = request_body(&headers, &body)?;
    let (target, id) = resolve(&*state.registry.read().await, path)?;
    let action = query.action.as_deref();

    match (target, id, &method) {
        (Target::Resources(_, rk), None, &Method::GET) => {
            let resources = state.manager.list(rk, &mixin_filter(&request)).await?;
            render(&state, StatusCode::OK, media, &Collection::from(resources)).await
        }
        (Target::Resources(_, rk), Some(id), &Method::GET) => match state.manager.get(rk, &id).await {
            Ok(resource) => render(&state, StatusCode::OK, media, &Collection::from(vec![resource])).await,
            Err(BackendError::ResourceNotFound(_)) => {
                render(&state, StatusCode::NOT_FOUND, media, &Collection::new()).await
            }
            Err(e) => Err(e.into()),
        },
        (Target::Resources(kind, _), None, &Method::POST) => match action {
            Some(term) => trigger_on_collection(&state, media, &kind, term, request).await,
            None => create_resource(&state, media, &kind, request).await,
        },
        (Target::Resources(kind, rk), Some(id), &Method::POST) => match action {
            Some(term) => trigger_on_instance(&state, media, &kind, &id, term, request).await,
            None => update_resource(&state, media, rk, &id, request).await,
        },
        (Target::Resources(_, rk), Some(id), &Method::PUT) => {
            update_resource(&state, media, rk, &id, request).await
        }
        (Target::Resources(kind, rk), None, &Method::DELETE) => {
            let outcome = state.manager.delete_all(rk, &mixin_filter(&request)).await?;
            let outcome = qualify(&state, &kind.id, outcome).await;
            outcome_response(&state, media, outcome).await
        }
        (Target::Resources(_, rk), Some(id), &Method::DELETE) => {
            if state.manager.delete(rk, &id).await? {
                Ok(StatusCode::OK.into_response())
            } else {
                Ok(not_modified())
            }
        }

        (Target::Links(_, lk), None, &Method::GET) => {
            let collection = Collection {
                links: state.manager.list_links(lk).await?,
                ..Default::default()
            };
            render(&state, StatusCode::OK, media, &collection).await
        }
        (Target::Links(_, lk), Some(id), &Method::GET) => match state.manager.get_link(lk, &id).await {
            Ok(link) => {
                let collection = Collection {
                    links: vec![link],
                    ..Default::default()
                };
                render(&state, StatusCode::OK, media, &collection).await
            }
            Err(BackendError::ResourceNotFound(_)) => {
                render(&state, StatusCode::NOT_FOUND, media, &Collection::new()).await
            }
            Err(e) => Err(e.into()),
        },
        (Target::Links(kind, _), None, &Method::POST) => create_link(&state, media, &kind, request).await,
        (Target::Links(kind, lk), None, &Method::DELETE) => {
            let mut outcome = BatchOutcome::new();
            for link in state.manager.list_links(lk).await? {
                match state.manager.detach_link(lk, &link.id).await {
                    Ok(true) => outcome.add_success(link.id),
                    Ok(false) => {}
                    Err(e) => outcome.add_failure(link.id, e),
                }
            }
            let outcome = qualify(&state, &kind.id, outcome).await;
            outcome_response(&state, media, outcome).await
        }
        (Target::Links(_, lk), Some(id), &Method::DELETE) => {
            if state.manager.detach_link(lk, &id).await? {
                Ok(StatusCode::OK.into_response())
            } else {
                Ok(not_modified())
            }
        }

        (Target::Mixin(mixin), _, &Method::GET) => {
            let tagged = state
                .manager
                .list_all(&Filter::all().with_mixin(mixin.id.clone()))
                .await?;
            render(&state, StatusCode::OK, media, &Collection::from(tagged)).await
        }
        (Target::Mixin(mixin), _, &Method::POST) => match action {
            Some(term) => trigger_on_mixin(&state, media, &mixin, term, request).await,
            None => tag(&state, &mixin, &request.locations).await,
        },
        (Target::Mixin(mixin), _, &Method::PUT) => replace_tags(&state, &mixin, &request.locations).await,
        (Target::Mixin(mixin), _, &Method::DELETE) => untag(&state, &mixin, &request.locations).await,

        (_, _, method) => Err(ApiError::MethodNotAllowed {
            method: method.to_string(),
            path: path.to_string(),
        }),
    }
}

async fn create_resource(
    state: &AppState,
    media: MediaType,
    kind: &Kind,
    request: RequestBody,
) -> Result<Response> {
    let mut resources = request.collection.resources;
    if resources.len() != 1 {
        return Err(ApiError::BadRequest(format!(
            "expected exactly one resource, found {}",
            resources.len()
        )));
    }
    let mut resource = resources.remove(0);
    if resource.kind != kind.id {
        return Err(CoreError::KindMismatch {
            expected: kind.id.to_string(),
            found: resource.kind.to_string(),
        }
        .into());
    }
    validate_new_resource(&*state.registry.read().await, &mut resource)?;

    let id = state.manager.create(&resource).await?;
    let registry = state.registry.read().await;
    let renderer = Renderer::new(&state.base_url, &registry);
    let uri = renderer.entity_uri(&kind.id, &id);
    let body = renderer.render_locations(std::slice::from_ref(&uri), media)?;
    Ok(created(media, &uri, body))
}

/// Merge the request into the stored resource; 304 when nothing changes
async fn update_resource(
    state: &AppState,
    media: MediaType,
    kind: ResourceKind,
    id: &str,
    request: RequestBody,
) -> Result<Response> {
    let changes = match request.collection.resources.into_iter().next() {
        Some(changes) => changes,
        None if !request.collection.mixins.is_empty() => {
            let mut changes = Resource::new(kind.kind_id());
            for mixin in request.collection.mixins {
                changes.add_mixin(mixin.id);
            }
            changes
        }
        None => return Err(ApiError::BadRequest("no resource in request".to_string())),
    };
    if !changes.id.is_empty() && changes.id != id {
        return Err(ApiError::BadRequest(format!(
            "body describes {}, path names {}",
            changes.id, id
        )));
    }

    let updated = {
        let registry = state.registry.read().await;
        state
            .manager
            .update_with(kind, id, |stored| Ok(apply_update(&registry, stored, &changes)?))
            .await?
    };
    if !updated {
        return Ok(not_modified());
    }
    let current = state.manager.get(kind, id).await?;
    render(state, StatusCode::OK, media, &Collection::from(vec![current])).await
}

async fn trigger_on_instance(
    state: &AppState,
    media: MediaType,
    kind: &Kind,
    id: &str,
    term: &str,
    request: RequestBody,
) -> Result<Response> {
    let action = resolve_action(&*state.registry.read().await, &kind.actions, term, request.action)?;
    let updated = state.manager.trigger(kind, id, &action).await?;
    render(state, StatusCode::OK, media, &Collection::from(vec![updated])).await
}

async fn trigger_on_collection(
    state: &AppState,
    media: MediaType,
    kind: &Kind,
    term: &str,
    request: RequestBody,
) -> Result<Response> {
    let filter = mixin_filter(&request);
    let action = resolve_action(&*state.registry.read().await, &kind.actions, term, request.action)?;
    let outcome = state
        .manager
        .trigger_action_on_all(kind, &action, &filter)
        .await?;
    let outcome = qualify(state, &kind.id, outcome).await;
    outcome_response(state, media, outcome).await
}

/// Run an action on every resource tagged with `mixin`
///
/// Each kind declaring the action runs it on its own tagged resources.
async fn trigger_on_mixin(
    state: &AppState,
    media: MediaType,
    mixin: &Mixin,
    term: &str,
    request: RequestBody,
) -> Result<Response> {
    let (kinds, action) = {
        let registry = state.registry.read().await;
        let kinds: Vec<Kind> = ResourceKind::ALL
            .iter()
            .filter_map(|rk| registry.kind(&rk.kind_id()).ok().cloned())
            .collect();
        let mut declared = mixin.actions.clone();
        declared.extend(kinds.iter().flat_map(|k| k.actions.iter().cloned()));
        let action = resolve_action(&registry, &declared, term, request.action)?;
        (kinds, action)
    };

    let filter = Filter::all().with_mixin(mixin.id.clone());
    let mut outcome = BatchOutcome::new();
    let mut dispatched = false;
    for kind in kinds.iter().filter(|k| k.actions.contains(&action.action)) {
        dispatched = true;
        let triggered = state
            .manager
            .trigger_action_on_all(kind, &action, &filter)
            .await?;
        outcome.merge(qualify(state, &kind.id, triggered).await);
    }
    if !dispatched {
        return Err(BackendError::MethodNotImplemented(format!(
            "no backend implements {}",
            action.action
        ))
        .into());
    }
    outcome_response(state, media, outcome).await
}

async fn create_link(
    state: &AppState,
    media: MediaType,
    kind: &Kind,
    request: RequestBody,
) -> Result<Response> {
    let mut links = request.collection.links;
    if links.len() != 1 {
        return Err(ApiError::BadRequest(format!(
            "expected exactly one link, found {}",
            links.len()
        )));
    }
    let mut link = links.remove(0);
    if link.kind != kind.id {
        return Err(CoreError::KindMismatch {
            expected: kind.id.to_string(),
            found: link.kind.to_string(),
        }
        .into());
    }
    link.source = state.to_path(&link.source).to_string();
    link.target = state.to_path(&link.target).to_string();
    validate_new_link(&*state.registry.read().await, &mut link)?;

    let id = state.manager.attach_link(&link).await?;
    let registry = state.registry.read().await;
    let renderer = Renderer::new(&state.base_url, &registry);
    let uri = renderer.entity_uri(&kind.id, &id);
    let body = renderer.render_locations(std::slice::from_ref(&uri), media)?;
    Ok(created(media, &uri, body))
}

/// Add (`true`) or remove (`false`) `mixin` on one stored resource
pub(crate) async fn set_tag(
    state: &AppState,
    kind: ResourceKind,
    id: &str,
    mixin: &CategoryId,
    tagged: bool,
) -> Result<bool> {
    let registry = state.registry.read().await;
    let changed = state
        .manager
        .update_with(kind, id, |stored| {
            if tagged {
                let changes = Resource::new(stored.kind.clone()).with_mixin(mixin.clone());
                Ok(apply_update(&registry, stored, &changes)?)
            } else {
                let mut untagged = stored.clone();
                untagged.remove_mixin(mixin);
                Ok(untagged)
            }
        })
        .await?;
    Ok(changed)
}

fn tagged_response(changed: usize) -> Response {
    if changed == 0 {
        not_modified()
    } else {
        StatusCode::OK.into_response()
    }
}

/// Add `mixin` to each resource at `locations`
async fn tag(state: &AppState, mixin: &Mixin, locations: &[String]) -> Result<Response> {
    if locations.is_empty() {
        return Err(ApiError::BadRequest("no entity location in request".to_string()));
    }
    let mut changed = 0;
    for location in locations {
        let (kind, id) = locate_resource(state, &*state.registry.read().await, location)?;
        if set_tag(state, kind, &id, &mixin.id, true).await? {
            changed += 1;
        }
    }
    info!("Tagged {} resources with {}", changed, mixin.id);
    Ok(tagged_response(changed))
}

/// Remove `mixin` from each resource at `locations`, or from all tagged
/// resources when no location is given
async fn untag(state: &AppState, mixin: &Mixin, locations: &[String]) -> Result<Response> {
    let mut targets = Vec::new();
    if locations.is_empty() {
        let filter = Filter::all().with_mixin(mixin.id.clone());
        for kind in ResourceKind::ALL {
            for id in state.manager.list_ids(kind, &filter).await? {
                targets.push((kind, id));
            }
        }
    } else {
        for location in locations {
            targets.push(locate_resource(state, &*state.registry.read().await, location)?);
        }
    }

    let mut changed = 0;
    for (kind, id) in targets {
        if set_tag(state, kind, &id, &mixin.id, false).await? {
            changed += 1;
        }
    }
    info!("Untagged {} resources from {}", changed, mixin.id);
    Ok(tagged_response(changed))
}

/// Make the resources at `locations` exactly the set tagged with `mixin`
async fn replace_tags(state: &AppState, mixin: &Mixin, locations: &[String]) -> Result<Response> {
    let mut wanted = Vec::new();
    for location in locations {
        wanted.push(locate_resource(state, &*state.registry.read().await, location)?);
    }

    let filter = Filter::all().with_mixin(mixin.id.clone());
    let mut changed = 0;
    for kind in ResourceKind::ALL {
        for id in state.manager.list_ids(kind, &filter).await? {
            let keep = wanted.iter().any(|(k, w)| *k == kind && *w == id);
            if !keep && set_tag(state, kind, &id, &mixin.id, false).await? {
                changed += 1;
            }
        }
    }
    for (kind, id) in wanted {
        if set_tag(state, kind, &id, &mixin.id, true).await? {
            changed += 1;
        }
    }
    Ok(tagged_response(changed))
}
