/// Remote data gateway
///
/// The two HTTP calls the HMI makes against the supervisory API:
/// read the latest tag log entries and write a control value.

use async_trait::async_trait;
use log::debug;
use reqwest::{StatusCode, Url};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

const FETCH_OP: &str = "fetch latest values";
const COMMAND_OP: &str = "send command";

/// Coarse classification used by callers that only care whether the
/// remote end or the payload was at fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Parse,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid API url '{0}'")]
    InvalidUrl(String),
    #[error("Failed to {operation}: HTTP {status}")]
    Status { operation: &'static str, status: u16 },
    #[error("Failed to {operation}: {source}")]
    Network {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected response: {0}")]
    Parse(String),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Parse(_) => ErrorKind::Parse,
            GatewayError::InvalidUrl(_)
            | GatewayError::Status { .. }
            | GatewayError::Network { .. } => ErrorKind::Transport,
        }
    }
}

/// One tag log entry as served by `/logs/`. Only `value` is required;
/// `tag` and `timestamp` are informational and never fail a tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub tag: Option<i64>,
    pub value: f64,
    pub timestamp: Option<String>,
}

impl Reading {
    /// Interpret element 0 of a `/logs/` response as the latest reading.
    ///
    /// Empty array yields `Ok(None)`. An element without a numeric `value`
    /// is a parse error; no default is substituted.
    pub fn latest(entries: &[Value]) -> Result<Option<Reading>, GatewayError> {
        let Some(first) = entries.first() else {
            return Ok(None);
        };
        let value = match first.get("value") {
            Some(v) => v.as_f64().ok_or_else(|| {
                GatewayError::Parse(format!("latest log entry: `value` is {}, expected a number", json_type_name(v)))
            })?,
            None => {
                return Err(GatewayError::Parse(format!(
                    "latest log entry: no `value` field in {}",
                    json_type_name(first)
                )))
            }
        };
        let tag = first.get("tag")
            .and_then(Value::as_i64)
            .or_else(|| first.get("tag_id").and_then(Value::as_i64));
        let timestamp = first.get("timestamp")
            .and_then(Value::as_str)
            .map(|s| s.to_string());
        Ok(Some(Reading { tag, value, timestamp }))
    }
}

/// Control write sent to `/control/`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Command {
    pub tag_id: i64,
    pub value: f64,
}

impl Command {
    /// Value is rounded to two decimals, the precision the API stores.
    pub fn new(tag_id: i64, value: f64) -> Self {
        Self { tag_id, value: (value * 100.0).round() / 100.0 }
    }
}

/// The operations the dashboard needs from the remote API.
#[async_trait]
pub trait ControlApi: Send + Sync {
    /// GET `<base>/logs/`; succeeds only on HTTP 200.
    async fn fetch_latest(&self) -> Result<Vec<Value>, GatewayError>;

    /// POST `<base>/control/`; succeeds on HTTP 200 or 201 and returns the raw body.
    async fn send_command(&self, command: &Command) -> Result<String, GatewayError>;
}

/// `reqwest`-backed gateway bound to one base URL.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    logs_url: Url,
    control_url: Url,
}

impl HttpGateway {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let base = endpoint_base(base_url)?;
        let logs_url = base.join("logs/")
            .map_err(|e| GatewayError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        let control_url = base.join("control/")
            .map_err(|e| GatewayError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| GatewayError::Network { operation: "build HTTP client", source })?;
        Ok(Self { client, logs_url, control_url })
    }

    pub fn logs_url(&self) -> &Url {
        &self.logs_url
    }

    pub fn control_url(&self) -> &Url {
        &self.control_url
    }
}

/// Parse the base URL, forcing a trailing slash so `join` appends
/// instead of replacing the last path segment.
fn endpoint_base(base_url: &str) -> Result<Url, GatewayError> {
    let trimmed = base_url.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    };
    Url::parse(&with_slash).map_err(|e| GatewayError::InvalidUrl(format!("{}: {}", base_url, e)))
}

/// Body of `/logs/` must be a JSON array; element shape is checked later.
pub fn parse_log_entries(body: &str) -> Result<Vec<Value>, GatewayError> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Array(entries)) => Ok(entries),
        Ok(other) => Err(GatewayError::Parse(format!("expected a JSON array, got {}", json_type_name(&other)))),
        Err(e) => Err(GatewayError::Parse(e.to_string())),
    }
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[async_trait]
impl ControlApi for HttpGateway {
    async fn fetch_latest(&self) -> Result<Vec<Value>, GatewayError> {
        let response = self.client
            .get(self.logs_url.clone())
            .send()
            .await
            .map_err(|source| GatewayError::Network { operation: FETCH_OP, source })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(GatewayError::Status { operation: FETCH_OP, status: status.as_u16() });
        }

        let body = response
            .text()
            .await
            .map_err(|source| GatewayError::Network { operation: FETCH_OP, source })?;
        parse_log_entries(&body)
    }

    async fn send_command(&self, command: &Command) -> Result<String, GatewayError> {
        debug!(target: "gateway", "→ POST {} tag_id={} value={:.2}", self.control_url, command.tag_id, command.value);
        let response = self.client
            .post(self.control_url.clone())
            .json(command)
            .send()
            .await
            .map_err(|source| GatewayError::Network { operation: COMMAND_OP, source })?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::CREATED {
            return Err(GatewayError::Status { operation: COMMAND_OP, status: status.as_u16() });
        }

        response
            .text()
            .await
            .map_err(|source| GatewayError::Network { operation: COMMAND_OP, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::{header, HeaderMap, StatusCode as AxumStatus};
    use axum::routing::{get, post};
    use axum::Router;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    struct StubApi {
        logs_status: AxumStatus,
        logs_body: String,
        control_status: AxumStatus,
        posted: Mutex<Vec<(Option<String>, String)>>,
    }

    impl StubApi {
        fn new(logs_status: AxumStatus, logs_body: &str, control_status: AxumStatus) -> Arc<Self> {
            Arc::new(Self {
                logs_status,
                logs_body: logs_body.to_string(),
                control_status,
                posted: Mutex::new(Vec::new()),
            })
        }
    }

    async fn logs(State(stub): State<Arc<StubApi>>) -> (AxumStatus, String) {
        (stub.logs_status, stub.logs_body.clone())
    }

    async fn control(State(stub): State<Arc<StubApi>>, headers: HeaderMap, body: String) -> (AxumStatus, String) {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        stub.posted.lock().unwrap().push((content_type, body));
        (stub.control_status, r#"{"status":"queued"}"#.to_string())
    }

    async fn spawn_stub(stub: Arc<StubApi>) -> String {
        let app = Router::new()
            .route("/api/logs/", get(logs))
            .route("/api/control/", post(control))
            .with_state(stub);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/api/", addr)
    }

    fn gateway(base: &str) -> HttpGateway {
        HttpGateway::new(base, Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_endpoints_join_onto_base_with_or_without_slash() {
        let with = gateway("http://127.0.0.1:8000/api/");
        let without = gateway("http://127.0.0.1:8000/api");
        assert_eq!(with.logs_url().as_str(), "http://127.0.0.1:8000/api/logs/");
        assert_eq!(without.control_url().as_str(), "http://127.0.0.1:8000/api/control/");
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let err = HttpGateway::new("not a url", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidUrl(_)));
    }

    #[test]
    fn test_latest_takes_element_zero() {
        let entries = vec![
            json!({"tag": 1, "value": 42.5, "timestamp": "2024-05-01T10:00:00Z"}),
            json!({"tag": 1, "value": 10.0}),
        ];
        let reading = Reading::latest(&entries).unwrap().unwrap();
        assert_eq!(reading.value, 42.5);
        assert_eq!(reading.tag, Some(1));
        assert_eq!(reading.timestamp.as_deref(), Some("2024-05-01T10:00:00Z"));
    }

    #[test]
    fn test_latest_of_empty_array_is_none() {
        assert_eq!(Reading::latest(&[]).unwrap(), None);
    }

    #[test]
    fn test_missing_or_non_numeric_value_is_parse_error() {
        let missing = Reading::latest(&[json!({"tag": 1})]).unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::Parse);

        let text = Reading::latest(&[json!({"tag": 1, "value": "high"})]).unwrap_err();
        assert_eq!(text.kind(), ErrorKind::Parse);

        let not_object = Reading::latest(&[json!(3.5)]).unwrap_err();
        assert_eq!(not_object.kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_tag_and_timestamp_shapes_never_fail_a_reading() {
        let named_tag = Reading::latest(&[json!({"tag": "boiler", "value": 42.0})]).unwrap().unwrap();
        assert_eq!(named_tag.value, 42.0);
        assert_eq!(named_tag.tag, None);

        let both_ids = Reading::latest(&[json!({"tag": 1, "tag_id": 1, "value": 42.0})]).unwrap().unwrap();
        assert_eq!(both_ids.value, 42.0);
        assert_eq!(both_ids.tag, Some(1));

        let epoch_ts = Reading::latest(&[json!({"tag": 1, "value": 42.0, "timestamp": 1714557600})]).unwrap().unwrap();
        assert_eq!(epoch_ts.value, 42.0);
        assert_eq!(epoch_ts.timestamp, None);

        let tag_id_only = Reading::latest(&[json!({"tag_id": 7, "value": 1.5})]).unwrap().unwrap();
        assert_eq!(tag_id_only.tag, Some(7));
    }

    #[test]
    fn test_integer_value_is_accepted() {
        assert_eq!(Reading::latest(&[json!({"value": 120})]).unwrap().unwrap().value, 120.0);
    }

    #[test]
    fn test_only_first_entry_is_validated() {
        let entries = vec![json!({"value": 1.0}), json!({"garbage": true})];
        assert_eq!(Reading::latest(&entries).unwrap().unwrap().value, 1.0);
    }

    #[test]
    fn test_parse_log_entries_requires_array() {
        assert_eq!(parse_log_entries("[]").unwrap().len(), 0);
        assert_eq!(parse_log_entries(r#"{"value": 1}"#).unwrap_err().kind(), ErrorKind::Parse);
        assert_eq!(parse_log_entries("<html>").unwrap_err().kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_command_rounds_to_two_decimals() {
        let cmd = Command::new(1, 12.3456);
        assert_eq!(cmd.value, 12.35);
        let body = serde_json::to_value(Command::new(1, 0.0)).unwrap();
        assert_eq!(body, json!({"tag_id": 1, "value": 0.0}));
    }

    #[tokio::test]
    async fn test_fetch_latest_returns_entries_on_200() {
        let stub = StubApi::new(AxumStatus::OK, r#"[{"tag":1,"value":100.0},{"tag":1,"value":90.0}]"#, AxumStatus::OK);
        let gw = gateway(&spawn_stub(stub).await);

        let entries = gw.fetch_latest().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(Reading::latest(&entries).unwrap().unwrap().value, 100.0);
    }

    #[tokio::test]
    async fn test_fetch_latest_non_200_is_transport_error() {
        let stub = StubApi::new(AxumStatus::SERVICE_UNAVAILABLE, "down", AxumStatus::OK);
        let gw = gateway(&spawn_stub(stub).await);

        let err = gw.fetch_latest().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(matches!(err, GatewayError::Status { status: 503, .. }));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_fetch_latest_rejects_201() {
        let stub = StubApi::new(AxumStatus::CREATED, "[]", AxumStatus::OK);
        let gw = gateway(&spawn_stub(stub).await);
        assert!(matches!(gw.fetch_latest().await, Err(GatewayError::Status { status: 201, .. })));
    }

    #[tokio::test]
    async fn test_fetch_latest_connection_refused_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let gw = gateway(&format!("http://{}/api/", addr));
        let err = gw.fetch_latest().await.unwrap_err();
        assert!(matches!(err, GatewayError::Network { .. }));
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn test_send_command_posts_json_body() {
        let stub = StubApi::new(AxumStatus::OK, "[]", AxumStatus::CREATED);
        let gw = gateway(&spawn_stub(Arc::clone(&stub)).await);

        let body = gw.send_command(&Command::new(1, 0.0)).await.unwrap();
        assert_eq!(body, r#"{"status":"queued"}"#);

        let posted = stub.posted.lock().unwrap();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].0.as_deref(), Some("application/json"));
        let sent: Value = serde_json::from_str(&posted[0].1).unwrap();
        assert_eq!(sent, json!({"tag_id": 1, "value": 0.0}));
    }

    #[tokio::test]
    async fn test_send_command_accepts_200() {
        let stub = StubApi::new(AxumStatus::OK, "[]", AxumStatus::OK);
        let gw = gateway(&spawn_stub(Arc::clone(&stub)).await);

        let body = gw.send_command(&Command::new(1, 0.0)).await.unwrap();
        assert_eq!(body, r#"{"status":"queued"}"#);
        assert_eq!(stub.posted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_send_command_500_is_transport_error() {
        let stub = StubApi::new(AxumStatus::OK, "[]", AxumStatus::INTERNAL_SERVER_ERROR);
        let gw = gateway(&spawn_stub(stub).await);

        let err = gw.send_command(&Command::new(1, 0.0)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(err.to_string(), "Failed to send command: HTTP 500");
    }
}
