//! External time-series sources

use crate::{MetricsError, MetricsResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Query interface of an external time-series backend
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Evaluate `query` at `at` and return a single scalar
    async fn query(&self, query: &str, at: DateTime<Utc>) -> MetricsResult<f64>;
}

/// Prometheus HTTP API client (`/api/v1/query`)
pub struct PrometheusSource {
    client: Client,
    base_url: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    result_type: String,
    result: Value,
}

impl PrometheusSource {
    /// Create a client whose every request is bounded by `timeout`
    pub fn new(base_url: &str, timeout: Duration) -> MetricsResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl MetricsSource for PrometheusSource {
    async fn query(&self, query: &str, at: DateTime<Utc>) -> MetricsResult<f64> {
        let time = format!("{:.3}", at.timestamp_millis() as f64 / 1000.0);
        let response = self
            .client
            .get(format!("{}/api/v1/query", self.base_url))
            .query(&[("query", query), ("time", time.as_str())])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MetricsError::Timeout(self.timeout.as_millis() as u64)
                } else {
                    MetricsError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(MetricsError::BadStatus(status.as_u16()));
        }

        let body: QueryResponse = response.json().await?;
        let value = parse_response(body)?;
        debug!(query, value, "Metrics query answered");
        Ok(value)
    }
}

fn parse_response(body: QueryResponse) -> MetricsResult<f64> {
    if body.status != "success" {
        return Err(MetricsError::Query(
            body.error.unwrap_or_else(|| body.status.clone()),
        ));
    }
    let data = body
        .data
        .ok_or_else(|| MetricsError::Parse("missing data".to_string()))?;

    let sample = match data.result_type.as_str() {
        "scalar" => data.result,
        "vector" => data
            .result
            .as_array()
            .and_then(|series| series.first())
            .and_then(|s| s.get("value"))
            .cloned()
            .ok_or(MetricsError::EmptyResult)?,
        other => return Err(MetricsError::Parse(format!("unsupported result type {other}"))),
    };

    let raw = sample
        .as_array()
        .and_then(|pair| pair.get(1))
        .and_then(Value::as_str)
        .ok_or_else(|| MetricsError::Parse(sample.to_string()))?;
    let value: f64 = raw
        .parse()
        .map_err(|_| MetricsError::Parse(format!("non-numeric sample {raw:?}")))?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(MetricsError::Parse(format!("non-finite sample {raw:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> MetricsResult<f64> {
        parse_response(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn test_parse_vector() {
        let value = parse(
            r#"{"status":"success","data":{"resultType":"vector","result":[{"metric":{},"value":[1700000000.0,"42.5"]}]}}"#,
        )
        .unwrap();
        assert_eq!(value, 42.5);
    }

    #[test]
    fn test_parse_scalar() {
        let value =
            parse(r#"{"status":"success","data":{"resultType":"scalar","result":[1700000000.0,"7"]}}"#)
                .unwrap();
        assert_eq!(value, 7.0);
    }

    #[test]
    fn test_parse_empty_vector() {
        let err = parse(r#"{"status":"success","data":{"resultType":"vector","result":[]}}"#)
            .unwrap_err();
        assert!(matches!(err, MetricsError::EmptyResult));
    }

    #[test]
    fn test_parse_query_error() {
        let err = parse(r#"{"status":"error","errorType":"bad_data","error":"parse error"}"#)
            .unwrap_err();
        assert!(matches!(err, MetricsError::Query(msg) if msg == "parse error"));
    }

    #[test]
    fn test_parse_nan_rejected() {
        let err = parse(
            r#"{"status":"success","data":{"resultType":"vector","result":[{"metric":{},"value":[1.0,"NaN"]}]}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, MetricsError::Parse(_)));
    }

    #[tokio::test]
    async fn test_unreachable_backend_errors() {
        let source = PrometheusSource::new("http://127.0.0.1:1/", Duration::from_millis(500)).unwrap();
        assert_eq!(source.base_url(), "http://127.0.0.1:1");
        let result = source.query("up", Utc::now()).await;
        assert!(result.is_err());
    }
}
