use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use crate::handlers;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    // Imports can be whole libraries.
    let body_limit = axum::extract::DefaultBodyLimit::max(50 * 1024 * 1024);

    Router::new()
        .route("/web", post(handlers::web::web))
        .route("/search", post(handlers::search::search))
        .route("/import", post(handlers::convert::import))
        .route("/export", post(handlers::convert::export))
        .route("/translators", get(handlers::translators::list))
        .route("/reload", post(handlers::translators::reload))
        .layer(body_limit)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use scrivener_core::fetch::mock::{MockFetcher, MockResponse};
    use scrivener_core::{Config, EngineSet, TranslationService};
    use serde_json::Value;
    use tower::ServiceExt;

    const LISTING_URL: &str = "https://journal.example.org/search?q=finches";

    fn app() -> Router {
        let listing = r#"<ul class="search-results">
            <li><a class="result-title" href="/article/1">Beak Size</a></li>
            <li><a class="result-title" href="/article/2">Song Drift</a></li></ul>"#;
        let article = r#"<html><body><h1 class="article-title">Song Drift</h1>
            <div class="authors"><span class="author">Grant, Peter</span></div></body></html>"#;
        let fetcher = MockFetcher::new()
            .route(LISTING_URL, MockResponse::html(listing))
            .route(
                "https://journal.example.org/article/2",
                MockResponse::html(article),
            );
        let service = TranslationService::new(
            &Config::default(),
            EngineSet::builtin(),
            Arc::new(fetcher),
            Some(scrivener_codecs::format_ids()),
        );
        let report = service.load();
        assert!(report.errors.is_empty(), "{:?}", report.errors);
        router(Arc::new(AppState { service }))
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    fn post(uri: &str, content_type: &str, body: impl Into<Body>) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, content_type)
            .body(body.into())
            .unwrap()
    }

    fn json(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn web_selection_round_trip() {
        let app = app();
        let (status, body) = send(&app, post("/web", "text/plain", LISTING_URL)).await;
        assert_eq!(status, StatusCode::MULTIPLE_CHOICES);
        let selection = json(&body);
        let token = selection["token"].as_str().unwrap().to_string();
        assert!(token.len() >= 32);
        let items = selection["items"].as_object().unwrap();
        assert_eq!(items.len(), 2);
        let (id, entry) = items
            .iter()
            .find(|(_, v)| v["title"] == "Song Drift")
            .unwrap();
        assert_eq!(entry.as_object().unwrap().len(), 1);

        let mut chosen = serde_json::Map::new();
        chosen.insert(id.clone(), entry.clone());
        let follow_up = serde_json::json!({ "token": token, "items": chosen });
        let (status, body) = send(
            &app,
            post("/web", "application/json", follow_up.to_string()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let items = json(&body);
        assert_eq!(items[0]["title"], "Song Drift");
        assert_eq!(items[0]["creators"][0]["lastName"], "Grant");

        let (status, body) = send(
            &app,
            post("/web", "application/json", follow_up.to_string()),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json(&body)["kind"], "session_not_found");
    }

    #[tokio::test]
    async fn unrecognized_identifiers_are_not_implemented() {
        let (status, body) = send(&app(), post("/search", "text/plain", "hello")).await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        assert_eq!(json(&body)["kind"], "unrecognized_identifier");
    }

    #[tokio::test]
    async fn empty_bodies_are_bad_requests() {
        let (status, body) = send(&app(), post("/search", "text/plain", "  ")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json(&body)["kind"], "bad_request");
    }

    #[tokio::test]
    async fn import_then_export() {
        let app = app();
        let bib = "@book{walden, title={Walden}, author={Thoreau, Henry David}, year={1854}}\n\
                   @book{walden2, title={Walden}, author={Thoreau, Henry David}, year={1854}}";
        let (status, body) = send(
            &app,
            post("/import?format=bibtex&dedupe=true", "application/x-bibtex", bib),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let items = json(&body);
        assert_eq!(items.as_array().unwrap().len(), 1);

        let (status, body) = send(
            &app,
            post("/export?format=ris", "application/json", items.to_string()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8(body).unwrap();
        assert!(text.starts_with("TY  - BOOK\r\n"));
    }

    #[tokio::test]
    async fn unknown_export_format_lists_the_valid_ones() {
        let (status, body) = send(
            &app(),
            post("/export?format=not-a-real-format", "application/json", "[]"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let error = json(&body);
        assert_eq!(error["kind"], "unsupported_format");
        assert!(error["message"].as_str().unwrap().contains("bibtex"));
    }

    #[tokio::test]
    async fn translators_by_target() {
        let app = app();
        let request = Request::get("/translators?target=search")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<String> = json(&body)
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["id"].as_str().unwrap().to_string())
            .collect();
        assert!(ids.contains(&"doi".to_string()));
        assert!(!ids.contains(&"embedded-metadata".to_string()));

        let request = Request::get("/translators?target=nope")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn reload_can_withdraw_an_import_format() {
        let dir = tempfile::tempdir().unwrap();
        let entry = |id: &str, format: &str| {
            format!("id = '{id}'\nlabel = '{format}'\ntarget = 'import'\nformat = '{format}'\n")
        };
        std::fs::write(dir.path().join("bibtex.toml"), entry("bibtex-import", "bibtex")).unwrap();
        std::fs::write(dir.path().join("ris.toml"), entry("ris-import", "ris")).unwrap();

        let config = Config {
            include_builtin: false,
            translator_dirs: vec![dir.path().to_path_buf()],
            ..Config::default()
        };
        let service = TranslationService::new(
            &config,
            EngineSet::builtin(),
            Arc::new(MockFetcher::new()),
            Some(scrivener_codecs::format_ids()),
        );
        assert!(service.load().errors.is_empty());
        let app = router(Arc::new(AppState { service }));

        let ris = "TY  - BOOK\nTI  - Walden\nER  - \n";
        let (status, _) = send(&app, post("/import", "text/plain", ris)).await;
        assert_eq!(status, StatusCode::OK);

        std::fs::remove_file(dir.path().join("ris.toml")).unwrap();
        let (status, _) = send(&app, post("/reload", "text/plain", "")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, post("/import", "text/plain", ris)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json(&body)["kind"], "unsupported_format");

        // The sniffed format wins over a hint, registered or not.
        let bib = "@book{walden, title={Walden}, year={1854}}";
        let (status, body) = send(&app, post("/import?format=ris", "text/plain", bib)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)[0]["title"], "Walden");
    }

    #[tokio::test]
    async fn reload_bumps_the_generation() {
        let (status, body) = send(&app(), post("/reload", "text/plain", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["generation"], 2);
    }
}
