//! Real `DiscordSink`/`SlackSink` against a mock webhook endpoint: exact POST
//! counts and 429 retry-after handling (the allowlist check itself is covered
//! by each sink's own unit tests, not re-exercised here).

use chrono::{TimeZone, Utc};
use courier::context::Context;
use courier::rate_limit::store::InMemoryTokenStore;
use courier::rate_limit::strategies::TokenBucket;
use courier::sinks::{DiscordSink, Sink, SlackSink};
use courier::sleeper::TrackingSleeper;
use courier::types::{Article, Source, SourceKind};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn article() -> Article {
    Article {
        id: "1".into(),
        source_id: "s1".into(),
        title: "t".into(),
        url: "https://x/1".into(),
        summary: "s".into(),
        published_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
    }
}

fn source() -> Source {
    Source { id: "s1".into(), name: "S".into(), feed_url: "https://x/feed".into(), kind: SourceKind::Rss, active: true }
}

fn unlimited_bucket(name: &str) -> Arc<dyn courier::rate_limit::RateLimiter> {
    Arc::new(TokenBucket::new(InMemoryTokenStore::default(), name, 100.0, 100.0))
}

#[tokio::test]
async fn discord_sink_retries_once_after_a_429_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/webhooks/1/a"))
        .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({ "retry_after": 1.0 })))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/webhooks/1/a"))
        .respond_with(ResponseTemplate::new(204))
        .with_priority(2)
        .mount(&server)
        .await;

    let sleeper = Arc::new(TrackingSleeper::new());
    let sink = DiscordSink::for_testing(
        format!("{}/api/webhooks/1/a", server.uri()),
        Client::new(),
        unlimited_bucket("discord"),
        sleeper.clone(),
        Duration::from_secs(5),
    );

    let ctx = Context::root();
    sink.send(&ctx, &article(), &source()).await.unwrap();

    assert_eq!(server.received_requests().await.unwrap().len(), 2);
    assert_eq!(sleeper.calls(), 1);
    assert!(sleeper.call_at(0).unwrap() >= Duration::from_millis(900), "retry-after was not honored: {:?}", sleeper.call_at(0));
}

#[tokio::test]
async fn discord_sink_does_not_retry_a_client_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).and(path("/api/webhooks/1/a")).respond_with(ResponseTemplate::new(400)).mount(&server).await;

    let sleeper = Arc::new(TrackingSleeper::new());
    let sink = DiscordSink::for_testing(
        format!("{}/api/webhooks/1/a", server.uri()),
        Client::new(),
        unlimited_bucket("discord"),
        sleeper.clone(),
        Duration::from_secs(5),
    );

    let ctx = Context::root();
    let err = sink.send(&ctx, &article(), &source()).await.unwrap_err();

    assert!(matches!(err, courier::error::SinkError::ClientError { status: 400 }));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
    assert_eq!(sleeper.calls(), 0);
}

#[tokio::test]
async fn slack_sink_retries_once_after_a_429_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/1/a"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/services/1/a"))
        .respond_with(ResponseTemplate::new(200))
        .with_priority(2)
        .mount(&server)
        .await;

    let sleeper = Arc::new(TrackingSleeper::new());
    let sink = SlackSink::for_testing(
        format!("{}/services/1/a", server.uri()),
        Client::new(),
        unlimited_bucket("slack"),
        sleeper.clone(),
        Duration::from_secs(5),
    );

    let ctx = Context::root();
    sink.send(&ctx, &article(), &source()).await.unwrap();

    assert_eq!(server.received_requests().await.unwrap().len(), 2);
    assert_eq!(sleeper.calls(), 1);
    assert!(sleeper.call_at(0).unwrap() >= Duration::from_millis(900), "retry-after was not honored: {:?}", sleeper.call_at(0));
}

#[tokio::test]
async fn slack_sink_exhausts_after_repeated_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).and(path("/services/1/a")).respond_with(ResponseTemplate::new(500)).mount(&server).await;

    let sleeper = Arc::new(TrackingSleeper::new());
    let sink = SlackSink::for_testing(
        format!("{}/services/1/a", server.uri()),
        Client::new(),
        unlimited_bucket("slack"),
        sleeper.clone(),
        Duration::from_secs(5),
    );

    let ctx = Context::root();
    let err = sink.send(&ctx, &article(), &source()).await.unwrap_err();

    assert!(matches!(err, courier::error::SinkError::Exhausted { attempts: 2, .. }));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}
