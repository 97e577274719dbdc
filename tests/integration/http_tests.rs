//! HTTP-level tests for the search client, the session provider, and a
//! small end-to-end harvest
//!
//! These tests use wiremock to stand in for the remote search endpoint.

use issuer_harvest::catalog::RawRecord;
use issuer_harvest::config::{parse_config, Config};
use issuer_harvest::harvest::{
    build_http_client, CandidateQuery, HarvestOutcome, Harvester, HttpQueryClient,
    HttpSessionProvider, QueryClient, QueryResult, SessionContext, SessionError, SessionProvider,
};
use issuer_harvest::output::{write_documents, CatalogDocument};
use issuer_harvest::Entry;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a configuration pointing at the mock server
fn create_test_config(server: &MockServer, db: &Path, endpoint_extra: &str) -> Config {
    parse_config(&format!(
        r#"
[harvester]
alphabet = "AB"
min-delay-ms = 1
max-delay-ms = 2
cooldown-ms = 10
resume-delay-ms = 1

[endpoint]
source = "MUFG"
url = "{uri}/OpenAccess/IssuersList/"
{endpoint_extra}

[output]
database-path = "{db}"
catalog-path = "{dir}/catalog.json"
failed-path = "{dir}/failed.json"
"#,
        uri = server.uri(),
        db = db.display(),
        dir = db.parent().unwrap().display(),
    ))
    .unwrap()
}

fn client_for(config: &Config) -> HttpQueryClient {
    HttpQueryClient::from_config(&config.endpoint).unwrap()
}

#[tokio::test]
async fn test_get_request_carries_query_and_static_params() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(
        &server,
        &dir.path().join("h.db"),
        "[endpoint.params]\nisAffirm = \"false\"",
    );

    Mock::given(method("GET"))
        .and(path("/OpenAccess/IssuersList/"))
        .and(query_param("searchText", "B"))
        .and(query_param("isAffirm", "false"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"["BHP - BHP Group","BXB - Brambles"]"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let result = client_for(&config)
        .fetch(&CandidateQuery::from("B"), &SessionContext::default())
        .await;

    assert_eq!(
        result,
        QueryResult::Success(vec![
            RawRecord::text("BHP - BHP Group"),
            RawRecord::text("BXB - Brambles"),
        ])
    );
}

#[tokio::test]
async fn test_post_request_sends_json_body() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(
        &server,
        &dir.path().join("h.db"),
        "method = \"post\"\nquery-param = \"prefixText\"\nlowercase-query = true\n[endpoint.params]\ncount = \"10\"",
    );

    Mock::given(method("POST"))
        .and(path("/OpenAccess/IssuersList/"))
        .and(body_json(serde_json::json!({"prefixText": "bh", "count": "10"})))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"[{"Text":"BHP Group","Value":"BHP:SCAUBHPLL"}]"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let result = client_for(&config)
        .fetch(&CandidateQuery::from("BH"), &SessionContext::default())
        .await;

    assert!(matches!(result, QueryResult::Success(ref records) if records.len() == 1));
}

#[tokio::test]
async fn test_session_cookie_is_sent() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &dir.path().join("h.db"), "");

    Mock::given(method("GET"))
        .and(header("cookie", "ASP.NET_SessionId=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .expect(1)
        .mount(&server)
        .await;

    let session = SessionContext {
        generation: 1,
        cookie: Some("ASP.NET_SessionId=abc".to_string()),
    };
    let result = client_for(&config)
        .fetch(&CandidateQuery::from("A"), &session)
        .await;

    assert_eq!(result, QueryResult::Success(vec![]));
}

#[tokio::test]
async fn test_status_classification() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &dir.path().join("h.db"), "");

    for (query, status) in [("A", 401u16), ("B", 204), ("C", 500), ("D", 403)] {
        Mock::given(method("GET"))
            .and(query_param("searchText", query))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
    }

    let client = client_for(&config);
    let session = SessionContext::default();

    assert!(client.fetch(&"A".into(), &session).await.is_catastrophic());
    assert_eq!(
        client.fetch(&"B".into(), &session).await,
        QueryResult::EmptyQueryFailure
    );
    assert!(matches!(
        client.fetch(&"C".into(), &session).await,
        QueryResult::TransientFailure(_)
    ));
    assert!(client.fetch(&"D".into(), &session).await.is_catastrophic());
}

#[tokio::test]
async fn test_html_login_page_is_transient() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &dir.path().join("h.db"), "");

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>Please log in</html>"))
        .mount(&server)
        .await;

    let result = client_for(&config)
        .fetch(&"A".into(), &SessionContext::default())
        .await;

    assert!(matches!(result, QueryResult::TransientFailure(_)));
}

#[tokio::test]
async fn test_session_refresh_collects_cookies() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Login"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "ASP.NET_SessionId=xyz; path=/; HttpOnly"),
        )
        .mount(&server)
        .await;

    let provider =
        HttpSessionProvider::new(reqwest::Client::new(), Some(format!("{}/Login", server.uri())));
    provider.invalidate().await;
    let session = provider.refresh().await.unwrap();

    assert_eq!(session.generation, 1);
    assert_eq!(session.cookie.as_deref(), Some("ASP.NET_SessionId=xyz"));
}

#[tokio::test]
async fn test_invalidate_drops_held_cookie() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Login"))
        .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "sid=one; path=/"))
        .mount(&server)
        .await;

    let provider =
        HttpSessionProvider::new(reqwest::Client::new(), Some(format!("{}/Login", server.uri())));
    provider.refresh().await.unwrap();
    assert_eq!(provider.current_cookie().await.as_deref(), Some("sid=one"));

    provider.invalidate().await;
    assert_eq!(provider.current_cookie().await, None);
    assert_eq!(provider.current_generation(), 1);

    let renewed = provider.refresh().await.unwrap();
    assert_eq!(renewed.generation, 2);
    assert_eq!(provider.current_cookie().await.as_deref(), Some("sid=one"));
}

#[tokio::test]
async fn test_session_refresh_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let provider =
        HttpSessionProvider::new(reqwest::Client::new(), Some(format!("{}/Login", server.uri())));
    let result = provider.refresh().await;

    assert!(matches!(result, Err(SessionError::Rejected { status: 503 })));
}

#[tokio::test]
async fn test_end_to_end_harvest_writes_catalog() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("harvest.db");
    let config = create_test_config(&server, &db, &format!("session-url = \"{}/Login\"", server.uri()));

    Mock::given(method("GET"))
        .and(path("/Login"))
        .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "sid=1; path=/"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/OpenAccess/IssuersList/"))
        .and(query_param("searchText", "B"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"["BHP - BHP Group"]"#))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/OpenAccess/IssuersList/"))
        .and(query_param("searchText", "BA"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"["BHP - BHP Group","BAP - Bapcor Limited"]"#),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/OpenAccess/IssuersList/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .mount(&server)
        .await;

    let mut harvester = Harvester::from_config(&config, "hash").unwrap();
    let outcome = harvester.start(false).await.unwrap();

    let HarvestOutcome::Completed(report) = outcome else {
        panic!("expected completion, got {:?}", outcome);
    };
    assert_eq!(
        report.entries,
        vec![
            Entry::new("BHP", None, "BHP Group"),
            Entry::new("BAP", None, "Bapcor Limited"),
        ]
    );

    let written =
        write_documents(&config.output, &config.endpoint.source, &report.entries, &report.failed_queries)
            .unwrap();
    let catalog: CatalogDocument =
        serde_json::from_str(&std::fs::read_to_string(&written.catalog).unwrap()).unwrap();
    assert_eq!(catalog.metadata.source, "MUFG");
    assert_eq!(catalog.metadata.total_companies, 2);
    assert!(written.failures.is_none());

    let requests = server.received_requests().await.unwrap();
    let searches: Vec<String> = requests
        .iter()
        .filter(|r| r.url.path() == "/OpenAccess/IssuersList/")
        .filter_map(|r| {
            r.url
                .query_pairs()
                .find(|(k, _)| k == "searchText")
                .map(|(_, v)| v.into_owned())
        })
        .collect();
    assert_eq!(searches, vec!["A", "B", "BA", "BB"]);
}

#[test]
fn test_build_http_client() {
    let dir = TempDir::new().unwrap();
    let config = parse_config(&format!(
        r#"
[endpoint]
source = "X"
url = "https://example.com/"

[output]
database-path = "{0}/h.db"
catalog-path = "{0}/c.json"
failed-path = "{0}/f.json"
"#,
        dir.path().display()
    ))
    .unwrap();

    assert!(build_http_client(&config.endpoint).is_ok());
}
