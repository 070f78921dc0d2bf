//! occigate HTTP interface
//!
//! Serves the OCCI query interface at `/-/` and
//! `/.well-known/org/ogf/occi/-/`, and every kind and mixin collection at
//! its registered location.

pub mod error;
pub mod handlers;
pub mod state;

pub use error::{ApiError, Result};
pub use state::{AppState, SharedState};

use axum::http::{HeaderValue, header};
use axum::response::Response;
use axum::routing::{any, get};
use axum::{Router, middleware};
use handlers::{entities, query};
use occigate_core::MediaType;

/// Value of the `Server` response header
pub const SERVER_HEADER: &str = concat!("occigate/", env!("CARGO_PKG_VERSION"), " OCCI/1.1");

/// Build the router
pub fn create_router(state: SharedState) -> Router {
    let query_interface = get(query::list_categories)
        .post(query::register_mixins)
        .delete(query::delete_mixins);

    Router::new()
        .route("/-/", query_interface.clone())
        .route("/.well-known/org/ogf/occi/-/", query_interface)
        .route("/", get(entities::list_all))
        .route("/{*path}", any(entities::dispatch))
        .layer(middleware::map_response(occi_headers))
        .with_state(state)
}

async fn occi_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(header::SERVER, HeaderValue::from_static(SERVER_HEADER));
    if let Ok(accept) = HeaderValue::from_str(&MediaType::supported_list()) {
        headers.insert(header::ACCEPT, accept);
    }
    response
}
