//! Integration tests for HTTP API endpoints.

mod common;

use axum::http::StatusCode;
use common::{FailingCache, FailingPublisher, RecordingPublisher, TestServer, new_article_json};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_health_check() {
    let server = TestServer::new().await;

    let response = server.send("GET", "/api/health", None, &[]).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
    let timestamp = response.body["timestamp"].as_str().unwrap();
    assert!(
        time::OffsetDateTime::parse(timestamp, &time::format_description::well_known::Rfc3339)
            .is_ok()
    );
}

#[tokio::test]
async fn test_readiness_ok() {
    let server = TestServer::new().await;

    let response = server.send("GET", "/api/health/ready", None, &[]).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
    assert_eq!(response.body["checks"]["metadata"]["backend"], "sqlite");
    assert_eq!(response.body["checks"]["cache"]["backend"], "memory");
}

#[tokio::test]
async fn test_readiness_degraded_when_cache_down() {
    let server = TestServer::with_cache(Arc::new(FailingCache)).await;

    let response = server.send("GET", "/api/health/ready", None, &[]).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "degraded");
    assert_eq!(response.body["checks"]["cache"]["status"], "down");
    assert_eq!(response.body["checks"]["metadata"]["status"], "ok");
}

#[tokio::test]
async fn test_create_article() {
    let server = TestServer::new().await;
    let body = new_article_json("rss");

    let response = server
        .send("POST", "/api/articles", Some(body.clone()), &[])
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body["status"], "ok");
    assert_eq!(response.body["message"], "News stored and queued");

    let id = response.body["id"].as_str().unwrap();
    let fetched = server
        .send("GET", &format!("/api/articles/{id}"), None, &[])
        .await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.body["id"], id);
    assert_eq!(fetched.body["title"], body["title"]);
    assert_eq!(fetched.body["link"], body["link"]);
    assert!(fetched.body["created_at"].is_string());
}

#[tokio::test]
async fn test_create_article_duplicate_link_conflicts() {
    let server = TestServer::new().await;
    let body = new_article_json("rss");

    let first = server
        .send("POST", "/api/articles", Some(body.clone()), &[])
        .await;
    assert_eq!(first.status, StatusCode::CREATED);

    let second = server.send("POST", "/api/articles", Some(body), &[]).await;
    assert_eq!(second.status, StatusCode::CONFLICT);
    assert_eq!(second.body["code"], "conflict");
}

#[tokio::test]
async fn test_create_article_validation() {
    let server = TestServer::new().await;

    let mut body = new_article_json("rss");
    body["title"] = json!("");
    let response = server.send("POST", "/api/articles", Some(body), &[]).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["code"], "bad_request");

    let mut body = new_article_json("rss");
    body["link"] = json!("not a url");
    let response = server.send("POST", "/api/articles", Some(body), &[]).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = server
        .send("POST", "/api/articles", Some(json!({"title": "only"})), &[])
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(
        response.body["message"]
            .as_str()
            .unwrap()
            .contains("invalid JSON")
    );
}

#[tokio::test]
async fn test_list_articles_pagination_and_filter() {
    let server = TestServer::new().await;

    for _ in 0..3 {
        let response = server
            .send("POST", "/api/articles", Some(new_article_json("rss")), &[])
            .await;
        assert_eq!(response.status, StatusCode::CREATED);
        // Distinct creation timestamps for a stable order
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let response = server
        .send("POST", "/api/articles", Some(new_article_json("wire")), &[])
        .await;
    assert_eq!(response.status, StatusCode::CREATED);

    let page = server.send("GET", "/api/articles", None, &[]).await;
    assert_eq!(page.status, StatusCode::OK);
    assert_eq!(page.body["total"], 4);
    assert_eq!(page.body["page"], 1);
    assert_eq!(page.body["limit"], 20);
    assert_eq!(page.body["data"].as_array().unwrap().len(), 4);

    let page = server
        .send("GET", "/api/articles?source=rss&limit=2&offset=2", None, &[])
        .await;
    assert_eq!(page.status, StatusCode::OK);
    assert_eq!(page.body["total"], 3);
    assert_eq!(page.body["page"], 2);
    assert_eq!(page.body["data"].as_array().unwrap().len(), 1);

    let asc = server
        .send("GET", "/api/articles?source=rss&sortOrder=ASC", None, &[])
        .await;
    let desc = server
        .send("GET", "/api/articles?source=rss&sort_order=DESC", None, &[])
        .await;
    let ids = |body: &serde_json::Value| -> Vec<serde_json::Value> {
        body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["id"].clone())
            .collect()
    };
    let asc_ids = ids(&asc.body);
    let mut desc_ids = ids(&desc.body);
    assert_eq!(asc_ids.len(), 3);
    desc_ids.reverse();
    assert_eq!(asc_ids, desc_ids);
}

#[tokio::test]
async fn test_list_articles_rejects_bad_query() {
    let server = TestServer::new().await;

    for uri in [
        "/api/articles?limit=0",
        "/api/articles?limit=101",
        "/api/articles?limit=abc",
        "/api/articles?sort_order=sideways",
    ] {
        let response = server.send("GET", uri, None, &[]).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "{uri}");
    }
}

#[tokio::test]
async fn test_get_article_errors() {
    let server = TestServer::new().await;

    let response = server.send("GET", "/api/articles/not-a-uuid", None, &[]).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = server
        .send(
            "GET",
            &format!("/api/articles/{}", uuid::Uuid::new_v4()),
            None,
            &[],
        )
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["code"], "not_found");
}

#[tokio::test]
async fn test_create_article_publishes_event() {
    let publisher = Arc::new(RecordingPublisher::default());
    let server = TestServer::with_events(publisher.clone()).await;
    let body = new_article_json("rss");

    let response = server
        .send("POST", "/api/articles", Some(body.clone()), &[])
        .await;
    assert_eq!(response.status, StatusCode::CREATED);

    // Publication is detached from the request
    let mut events = Vec::new();
    for _ in 0..50 {
        events = publisher.events();
        if !events.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, "news.created");
    assert_eq!(events[0].version, 1);
    assert_eq!(
        events[0].data.id.to_string(),
        response.body["id"].as_str().unwrap()
    );
    assert_eq!(events[0].data.link, body["link"].as_str().unwrap());
    assert_eq!(events[0].data.content, body["content"].as_str().unwrap());
}

#[tokio::test]
async fn test_publish_failure_does_not_fail_request() {
    let server = TestServer::with_events(Arc::new(FailingPublisher)).await;

    let response = server
        .send("POST", "/api/articles", Some(new_article_json("rss")), &[])
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_custom_api_prefix() {
    let server = TestServer::with_config(|config| {
        config.server.api_prefix = "/v2".to_string();
    })
    .await;

    let response = server.send("GET", "/v2/health", None, &[]).await;
    assert_eq!(response.status, StatusCode::OK);

    let response = server.send("GET", "/api/health", None, &[]).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    keyward_server::metrics::register_metrics();
    let server = TestServer::new().await;

    let response = server
        .send("POST", "/api/articles", Some(new_article_json("rss")), &[])
        .await;
    assert_eq!(response.status, StatusCode::CREATED);

    let response = server.send("GET", "/metrics", None, &[]).await;
    assert_eq!(response.status, StatusCode::OK);
    let text = response.body.as_str().unwrap();
    assert!(text.contains("keyward_articles_created_total"));
    assert!(text.contains("keyward_idempotency_outcomes_total"));
}

#[tokio::test]
async fn test_metrics_endpoint_disabled() {
    let server = TestServer::with_config(|config| {
        config.server.metrics_enabled = false;
    })
    .await;

    let response = server.send("GET", "/metrics", None, &[]).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}
