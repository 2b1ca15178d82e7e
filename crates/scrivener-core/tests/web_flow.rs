use std::sync::Arc;

use scrivener_core::fetch::mock::{MockFetcher, MockResponse};
use scrivener_core::{
    CancellationToken, Config, EngineSet, RegistrySource, SessionError, TranslationError,
    TranslationService, WebOutcome,
};

const LISTING_URL: &str = "https://journal.example.org/search?q=birds";

const LISTING: &str = r#"<html><body>
<ul class="search-results">
  <li><a class="result-title" href="/article/1">Song Learning in Sparrows</a></li>
  <li><a class="result-title" href="/article/2">Dialects of the Chaffinch</a></li>
  <li><a class="result-title" href="/article/3">Migration and Memory</a></li>
</ul>
</body></html>"#;

fn article(title: &str, authors: &[&str]) -> String {
    let authors: String = authors
        .iter()
        .map(|a| format!(r#"<span class="author">{}</span>"#, a))
        .collect();
    format!(
        r#"<html><head><meta name="dc.date" content="2020-05-01"></head><body>
        <h1 class="article-title">{title}</h1>
        <div class="authors">{authors}</div>
        <div class="journal-name">Journal of Examples</div>
        <div class="citation"><span class="volume">12</span><span class="issue">3</span><span class="pages">45-67</span></div>
        <ul class="keywords"><li>birds</li><li>song</li></ul>
        </body></html>"#
    )
}

fn journal_fetcher() -> MockFetcher {
    MockFetcher::new()
        .route(LISTING_URL, MockResponse::html(LISTING))
        .route(
            "https://journal.example.org/article/1",
            MockResponse::html(&article("Song Learning in Sparrows", &["Marler, Peter"])),
        )
        .route(
            "https://journal.example.org/article/2",
            MockResponse::html(&article(
                "Dialects of the Chaffinch",
                &["Thorpe, William", "Hinde, Robert"],
            )),
        )
        .route(
            "https://journal.example.org/article/3",
            MockResponse::html(&article("Migration and Memory", &["Nottebohm, Fernando"])),
        )
}

fn service(fetcher: MockFetcher) -> TranslationService {
    let service = TranslationService::new(
        &Config::default(),
        EngineSet::builtin(),
        Arc::new(fetcher),
        None,
    );
    let report = service.load();
    assert!(report.errors.is_empty(), "{:?}", report.errors);
    service
}

#[tokio::test]
async fn multi_result_page_parks_a_selection() {
    let service = service(journal_fetcher());
    let cancel = CancellationToken::new();

    let outcome = service.translate_web(LISTING_URL, &cancel).await.unwrap();
    let WebOutcome::Selection { url, token, items } = outcome else {
        panic!("expected a selection, got {:?}", outcome);
    };
    assert_eq!(url, LISTING_URL);
    assert!(token.len() >= 32);
    assert_eq!(items.len(), 3);
    assert_eq!(
        items.values().cloned().collect::<Vec<_>>(),
        vec![
            "Song Learning in Sparrows",
            "Dialects of the Chaffinch",
            "Migration and Memory"
        ]
    );
    assert_eq!(service.sessions().len(), 1);
}

#[tokio::test]
async fn completing_one_of_three_returns_one_full_item() {
    let service = service(journal_fetcher());
    let cancel = CancellationToken::new();

    let WebOutcome::Selection { token, items, .. } =
        service.translate_web(LISTING_URL, &cancel).await.unwrap()
    else {
        panic!("expected a selection");
    };
    let (id, title) = items.get_index(1).unwrap();

    let result = service
        .select(&token, &[id.clone()], &cancel)
        .await
        .unwrap();
    assert_eq!(result.len(), 1);
    let item = &result[0];
    assert_eq!(item.title(), Some(title.as_str()));
    assert_eq!(item.item_type, "journalArticle");
    assert_eq!(item.get("publicationTitle"), Some("Journal of Examples"));
    assert_eq!(item.get("libraryCatalog"), Some("Example Journal"));
    // Creator order survives extraction.
    assert_eq!(item.creators[0].last_name(), "Thorpe");
    assert_eq!(item.creators[1].last_name(), "Hinde");

    // The session is gone after one successful completion.
    let err = service
        .select(&token, &[id.clone()], &cancel)
        .await
        .unwrap_err();
    assert_eq!(err, TranslationError::Session(SessionError::NotFound));
    assert_eq!(err.kind(), "session_not_found");
}

#[tokio::test]
async fn invalid_selection_leaves_session_open() {
    let service = service(journal_fetcher());
    let cancel = CancellationToken::new();
    let WebOutcome::Selection { token, items, .. } =
        service.translate_web(LISTING_URL, &cancel).await.unwrap()
    else {
        panic!("expected a selection");
    };

    let err = service
        .select(&token, &["https://elsewhere.test/".to_string()], &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_selection");

    let all: Vec<String> = items.keys().cloned().collect();
    let result = service.select(&token, &all, &cancel).await.unwrap();
    assert_eq!(result.len(), 3);
    assert_eq!(result[2].title(), Some("Migration and Memory"));
}

#[tokio::test]
async fn single_article_translates_directly() {
    let service = service(journal_fetcher());
    let outcome = service
        .translate_web(
            "https://journal.example.org/article/1",
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    let WebOutcome::Items(items) = outcome else {
        panic!("expected items");
    };
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].get("date"), Some("2020-05-01"));
    assert_eq!(items[0].get("pages"), Some("45-67"));
    assert_eq!(items[0].tags.len(), 2);
    assert!(service.sessions().is_empty());
}

#[tokio::test]
async fn generic_pages_fall_back_to_embedded_metadata() {
    let page = r#"<html><head>
        <meta name="citation_title" content="A Generic Paper">
        <meta name="citation_author" content="Doe, Jane">
        <meta name="citation_journal_title" content="Generic Letters">
        <meta name="citation_doi" content="10.1000/generic.1">
        </head><body></body></html>"#;
    let fetcher = MockFetcher::new().route("https://generic.test/p/1", MockResponse::html(page));
    let service = service(fetcher);

    let WebOutcome::Items(items) = service
        .translate_web("https://generic.test/p/1", &CancellationToken::new())
        .await
        .unwrap()
    else {
        panic!("expected items");
    };
    assert_eq!(items[0].item_type, "journalArticle");
    assert_eq!(items[0].get("DOI"), Some("10.1000/generic.1"));
    assert_eq!(items[0].get("libraryCatalog"), Some("generic.test"));
}

#[tokio::test]
async fn pages_nothing_understands_report_no_translator() {
    let fetcher = MockFetcher::new().route(
        "https://plain.test/",
        MockResponse::html("<html><body><p>hello</p></body></html>"),
    );
    let service = service(fetcher);
    let err = service
        .translate_web("https://plain.test/", &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "no_translator");
}

#[tokio::test]
async fn unreachable_pages_report_fetch_failure() {
    let service = service(MockFetcher::new());
    let err = service
        .translate_web("https://gone.test/", &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "fetch_failed");
}

#[tokio::test]
async fn reload_with_same_translators_keeps_detection_stable() {
    let service = service(journal_fetcher());
    let cancel = CancellationToken::new();

    let before = service
        .translate_web("https://journal.example.org/article/3", &cancel)
        .await
        .unwrap();
    let report = service.reload();
    assert_eq!(report.generation, 2);
    let after = service
        .translate_web("https://journal.example.org/article/3", &cancel)
        .await
        .unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn sessions_complete_under_the_snapshot_they_were_opened_with() {
    let service = service(journal_fetcher());
    let cancel = CancellationToken::new();
    let WebOutcome::Selection { token, items, .. } =
        service.translate_web(LISTING_URL, &cancel).await.unwrap()
    else {
        panic!("expected a selection");
    };

    // Swap in a registry without the site translator.
    let service = service.with_source(RegistrySource::Inline(Vec::new()));
    service.reload();
    assert!(service.snapshot().is_empty());

    let id = items.keys().next().unwrap().clone();
    let result = service.select(&token, &[id], &cancel).await.unwrap();
    assert_eq!(result.len(), 1);
}
