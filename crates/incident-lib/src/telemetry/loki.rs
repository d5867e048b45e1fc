//! Loki push API log sink

use super::sink::{LogEntry, LogSink};
use crate::error::{SinkError, SinkResult};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Map, Value};
use std::time::Duration;
use url::Url;

pub const DEFAULT_LOKI_URL: &str = "http://localhost:3100/loki/api/v1/push";

/// Ships log entries to Loki, one stream per entry
pub struct LokiLogSink {
    client: Client,
    push_url: Url,
}

impl LokiLogSink {
    pub fn new(push_url: &str, timeout: Duration) -> SinkResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let push_url = Url::parse(push_url)?;
        Ok(Self { client, push_url })
    }

    pub fn push_url(&self) -> &Url {
        &self.push_url
    }

    /// Push request body for a single entry
    ///
    /// Stream labels are `service`, `level`, `pod` (when known) and any
    /// extra labels; the line reads `<time> <LEVEL> [<service>] <message>`.
    pub fn payload(entry: &LogEntry) -> Value {
        let mut stream = Map::new();
        for (key, value) in &entry.labels {
            stream.insert(key.clone(), Value::String(value.clone()));
        }
        stream.insert("service".to_string(), Value::String(entry.service.clone()));
        stream.insert(
            "level".to_string(),
            Value::String(entry.level.as_str().to_string()),
        );
        if let Some(pod) = &entry.pod {
            stream.insert("pod".to_string(), Value::String(pod.clone()));
        }

        let ts_nanos = entry.timestamp.timestamp_nanos_opt().unwrap_or_default();
        let line = format!(
            "{} {} [{}] {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.level.as_str().to_uppercase(),
            entry.service,
            entry.message
        );

        json!({
            "streams": [{
                "stream": stream,
                "values": [[ts_nanos.to_string(), line]],
            }]
        })
    }
}

#[async_trait]
impl LogSink for LokiLogSink {
    async fn push_log(&self, entry: &LogEntry) -> SinkResult<()> {
        let response = self
            .client
            .post(self.push_url.clone())
            .json(&Self::payload(entry))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Status { status, body });
        }
        Ok(())
    }
}
