//! No-op sink: always enabled, always succeeds. Used for local runs and tests
//! where sending a real webhook would be wrong.

use super::Sink;
use crate::context::Context;
use crate::error::SinkError;
use crate::types::{Article, Source};
use async_trait::async_trait;

#[derive(Debug, Default)]
pub struct NoopSink;

#[async_trait]
impl Sink for NoopSink {
    fn name(&self) -> &str {
        "noop"
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn send(&self, _ctx: &Context, _article: &Article, _source: &Source) -> Result<(), SinkError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn always_succeeds() {
        let sink = NoopSink;
        let article = Article {
            id: "1".into(),
            source_id: "s1".into(),
            title: "t".into(),
            url: "https://x/1".into(),
            summary: "s".into(),
            published_at: Utc::now(),
        };
        let source = Source {
            id: "s1".into(),
            name: "S".into(),
            feed_url: "https://x/feed".into(),
            kind: crate::types::SourceKind::Rss,
            active: true,
        };
        assert!(sink.send(&Context::root(), &article, &source).await.is_ok());
    }
}
