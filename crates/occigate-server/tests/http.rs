use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode, header};
use http_body_util::BodyExt;
use occigate_backend::Manager;
use occigate_backend_dummy::{DummyBackend, OS_TEMPLATES};
use occigate_core::{Registry, template};
use occigate_server::{AppState, SERVER_HEADER, create_router};
use tower::ServiceExt;

const BASE: &str = "http://occi.test";

const STORAGE: &str =
    "Category: storage; scheme=\"http://schemas.ogf.org/occi/infrastructure#\"; class=\"kind\"\n\
     X-OCCI-Attribute: occi.core.title=\"disk\"\n";

async fn app() -> Router {
    let dummy = DummyBackend::new();
    let backend = dummy.backend();
    let mut registry = Registry::with_builtin().unwrap();
    for mixin in backend.templates().await.unwrap() {
        registry.register(mixin).unwrap();
    }
    registry.seal();
    create_router(AppState::new(registry, Manager::new(backend), BASE))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, String) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
}

fn request(method: &str, uri: &str) -> axum::http::request::Builder {
    Request::builder().method(method).uri(uri)
}

/// Create an entity and return its absolute URI
async fn create(app: &Router, path: &str, body: &str) -> String {
    let (status, headers, _) = send(
        app,
        request("POST", path)
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    headers[header::LOCATION].to_str().unwrap().to_string()
}

fn compute_body() -> String {
    let os = template::os_template(OS_TEMPLATES[0]).id;
    format!(
        "Category: compute; scheme=\"http://schemas.ogf.org/occi/infrastructure#\"; class=\"kind\"\n\
         Category: {}; scheme=\"{}\"; class=\"mixin\"\n\
         X-OCCI-Attribute: occi.core.title=\"vm\"\n",
        os.term(),
        os.scheme()
    )
}

fn path_of(uri: &str) -> &str {
    uri.strip_prefix(BASE).unwrap()
}

#[tokio::test]
async fn test_create_storage_returns_one_uri() {
    let app = app().await;
    let (status, headers, body) = send(
        &app,
        request("POST", "/storage/")
            .header(header::CONTENT_TYPE, "text/plain")
            .header(header::ACCEPT, "text/uri-list")
            .body(Body::from(STORAGE))
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("http://occi.test/storage/"));
    assert_eq!(headers[header::LOCATION].to_str().unwrap(), lines[0]);
}

#[tokio::test]
async fn test_storage_uri_list() {
    let app = app().await;
    let mut created = vec![
        create(&app, "/storage/", STORAGE).await,
        create(&app, "/storage/", STORAGE).await,
    ];
    // unrelated kinds stay out of the listing
    create(&app, "/network/", &STORAGE.replace("storage", "network")).await;

    let (status, headers, body) = send(
        &app,
        request("GET", "/storage/")
            .header(header::ACCEPT, "text/uri-list")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "text/uri-list");
    let mut listed: Vec<String> = body.lines().map(str::to_string).collect();
    listed.sort();
    created.sort();
    assert_eq!(listed, created);
}

#[tokio::test]
async fn test_delete_absent_is_not_modified() {
    let app = app().await;
    let (status, _, _) = send(&app, request("DELETE", "/storage/missing").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::NOT_MODIFIED);

    let uri = create(&app, "/storage/", STORAGE).await;
    let (status, _, _) = send(&app, request("DELETE", path_of(&uri)).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = send(&app, request("DELETE", path_of(&uri)).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::NOT_MODIFIED);
}

#[tokio::test]
async fn test_get_missing_instance() {
    let app = app().await;
    let (status, _, body) = send(
        &app,
        request("GET", "/storage/missing")
            .header(header::ACCEPT, "application/occi+json")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "{}");

    let (status, _, _) = send(&app, request("GET", "/nowhere/").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_suspend_then_start() {
    let app = app().await;
    let uri = create(&app, "/compute/", &compute_body()).await;
    let path = path_of(&uri).to_string();

    let (status, _, body) = send(
        &app,
        request("POST", &format!("{}?action=suspend", path))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("occi.core.state=\"suspended\""), "{body}");

    let (status, _, body) = send(
        &app,
        request("POST", &format!("{}?action=start", path))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("occi.core.state=\"active\""), "{body}");

    let (status, _, _) = send(
        &app,
        request("POST", &format!("{}?action=start", path))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_compute_without_os_template() {
    let app = app().await;
    let body = "Category: compute; scheme=\"http://schemas.ogf.org/occi/infrastructure#\"; class=\"kind\"\n";
    let (status, _, _) = send(
        &app,
        request("POST", "/compute/")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from(body))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_undeclared_action_is_not_implemented() {
    let app = app().await;
    let uri = create(&app, "/storage/", STORAGE).await;
    let (status, _, _) = send(
        &app,
        request("POST", &format!("{}?action=explode", path_of(&uri)))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn test_batch_stop_reports_failures() {
    let app = app().await;
    let running = create(&app, "/compute/", &compute_body()).await;
    let stopped = create(&app, "/compute/", &compute_body()).await;
    let (status, _, _) = send(
        &app,
        request("POST", &format!("{}?action=stop", path_of(&stopped)))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = send(
        &app,
        request("POST", "/compute/?action=stop").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body.contains(&stopped), "{body}");
    assert!(!body.contains(&running), "{body}");

    // now every compute is inactive
    let (status, _, _) = send(
        &app,
        request("POST", "/compute/?action=restart").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_update_title() {
    let app = app().await;
    let uri = create(&app, "/storage/", STORAGE).await;
    let renamed = STORAGE.replace("\"disk\"", "\"backup\"");

    let (status, _, body) = send(
        &app,
        request("PUT", path_of(&uri))
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from(renamed.clone()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("occi.core.title=\"backup\""), "{body}");

    let (status, _, _) = send(
        &app,
        request("POST", path_of(&uri))
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from(renamed))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_MODIFIED);
}

#[tokio::test]
async fn test_user_mixin_lifecycle() {
    let app = app().await;
    let uri = create(&app, "/storage/", STORAGE).await;
    let mixin = "Category: prod; scheme=\"http://example.org/tags#\"; class=\"mixin\"; location=\"/tags/prod/\"\n";

    let (status, _, _) = send(
        &app,
        request("POST", "/-/")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from(mixin))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = send(
        &app,
        request("POST", "/tags/prod/")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from(format!("X-OCCI-Location: {}\n", uri)))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = send(
        &app,
        request("GET", "/tags/prod/")
            .header(header::ACCEPT, "text/uri-list")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.trim(), uri);

    let (status, _, _) = send(
        &app,
        request("DELETE", "/-/")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from(mixin))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = send(&app, request("GET", "/tags/prod/").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_builtin_categories_are_protected() {
    let app = app().await;
    let os_tpl = "Category: os_tpl; scheme=\"http://schemas.ogf.org/occi/infrastructure#\"; class=\"mixin\"\n";
    let (status, _, _) = send(
        &app,
        request("DELETE", "/.well-known/org/ogf/occi/-/")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from(os_tpl))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_content_negotiation_errors() {
    let app = app().await;
    let (status, _, _) = send(
        &app,
        request("GET", "/storage/")
            .header(header::ACCEPT, "image/png")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_ACCEPTABLE);

    let (status, _, _) = send(
        &app,
        request("POST", "/storage/")
            .header(header::CONTENT_TYPE, "application/pdf")
            .body(Body::from("%PDF"))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_query_interface_headers() {
    let app = app().await;
    let (status, headers, body) = send(&app, request("GET", "/-/").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::SERVER], SERVER_HEADER);
    assert!(headers[header::ACCEPT].to_str().unwrap().contains("application/occi+json"));
    assert!(body.contains("Category: compute;"), "{body}");
}
