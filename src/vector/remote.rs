//! Networked vector backend speaking an HTTP+JSON protocol to a
//! multi-model query server.
//!
//! Connection lifecycle: the first operation (or an explicit health check)
//! triggers `ensure_connected`, which exchanges credentials for a session
//! token at `POST /signin` and then runs idempotent schema setup through
//! `POST /sql`. Every subsequent request carries `Authorization: Bearer`
//! plus namespace/database headers. Failures surface immediately to the
//! caller; there is no internal retry loop.
//!
//! Statements are always submitted as `{query, vars}` with parameter
//! bindings. Values never get interpolated into query text, so quoting and
//! backslash handling are the server's problem, not ours.
//!
//! Once started, a periodic timer issues at most one authenticated probe
//! per tick against the existing session; it never signs in. A failed
//! probe marks the session disconnected (the next real call reconnects)
//! but the timer always reschedules.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{BackendTier, VectorBackend, VectorHit, VectorItem, VectorSearchOptions, VectorStats};
use crate::config::RemoteBackendConfig;
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct ConnState {
    token: Option<String>,
    connected: bool,
    last_health_check: Option<i64>,
}

struct Inner {
    config: RemoteBackendConfig,
    /// Client for real operations, full timeout.
    client: reqwest::Client,
    /// Client for the availability probe, short timeout, so detection
    /// never blocks on a slow or down server.
    probe_client: reqwest::Client,
    state: Mutex<ConnState>,
}

pub struct RemoteBackend {
    inner: Arc<Inner>,
    health_check_secs: u64,
    health_task: StdMutex<Option<JoinHandle<()>>>,
}

impl RemoteBackend {
    pub fn new(config: RemoteBackendConfig, health_check_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let probe_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.probe_timeout_secs))
            .build()?;

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                client,
                probe_client,
                state: Mutex::new(ConnState::default()),
            }),
            health_check_secs,
            health_task: StdMutex::new(None),
        })
    }

    /// Whether the session is currently marked connected.
    pub async fn connected(&self) -> bool {
        self.inner.state.lock().await.connected
    }
}

impl Drop for RemoteBackend {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.health_task.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}

impl Inner {
    /// Sign in and set up the schema if not already connected. Returns the
    /// session token.
    async fn ensure_connected(&self) -> Result<String> {
        {
            let state = self.state.lock().await;
            if state.connected {
                if let Some(token) = &state.token {
                    return Ok(token.clone());
                }
            }
        }

        let token = self.signin().await?;
        self.setup_schema(&token).await?;

        let mut state = self.state.lock().await;
        state.token = Some(token.clone());
        state.connected = true;
        debug!(endpoint = %self.config.endpoint, "remote vector backend connected");
        Ok(token)
    }

    /// Exchange credentials for a session token.
    async fn signin(&self) -> Result<String> {
        let url = format!("{}/signin", self.config.endpoint.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("Accept", "application/json")
            .json(&json!({
                "ns": self.config.namespace,
                "db": self.config.database,
                "user": self.config.user,
                "pass": self.config.pass,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::RemoteBackend(format!(
                "sign-in rejected: HTTP {}",
                status
            )));
        }

        let body: Value = response.json().await?;
        parse_signin_token(&body)
    }

    /// Idempotent schema setup: table plus source and vector indexes. The
    /// dimensionality comes from validated config, not user input.
    async fn setup_schema(&self, token: &str) -> Result<()> {
        let query = format!(
            "DEFINE TABLE IF NOT EXISTS vectors SCHEMALESS;\n\
             DEFINE INDEX IF NOT EXISTS vectors_source ON TABLE vectors COLUMNS source_id;\n\
             DEFINE INDEX IF NOT EXISTS vectors_embedding ON TABLE vectors \
             FIELDS embedding MTREE DIMENSION {} DIST COSINE;",
            self.config.dims
        );
        self.exec_sql(token, &query, None).await?;
        Ok(())
    }

    /// Submit statements to `POST /sql` and return one JSON result per
    /// statement. Any per-statement error fails the whole call.
    async fn exec_sql(
        &self,
        token: &str,
        query: &str,
        vars: Option<Value>,
    ) -> Result<Vec<Value>> {
        let url = format!("{}/sql", self.config.endpoint.trim_end_matches('/'));
        let body = match vars {
            Some(vars) => json!({ "query": query, "vars": vars }),
            None => json!({ "query": query }),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header("Accept", "application/json")
            .header("Surreal-NS", &self.config.namespace)
            .header("Surreal-DB", &self.config.database)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            // Session expired; force a fresh sign-in on the next call.
            let mut state = self.state.lock().await;
            state.connected = false;
            state.token = None;
            return Err(Error::RemoteBackend(format!(
                "session rejected: HTTP {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(Error::RemoteBackend(format!(
                "query failed: HTTP {}",
                status
            )));
        }

        let body: Value = response.json().await?;
        parse_sql_response(&body)
    }

    /// One authenticated round trip against the existing session. Never
    /// signs in; returns `None` when there is no session to probe, leaving
    /// reconnection to the next real call.
    async fn probe_session(&self) -> Option<bool> {
        let token = self.state.lock().await.token.clone()?;
        let healthy = self.exec_sql(&token, "RETURN 1;", None).await.is_ok();
        self.note_health(healthy).await;
        Some(healthy)
    }

    /// Record a health check outcome; an unhealthy one drops the session.
    async fn note_health(&self, healthy: bool) {
        let mut state = self.state.lock().await;
        state.last_health_check = Some(chrono::Utc::now().timestamp());
        if !healthy {
            state.connected = false;
            state.token = None;
        }
    }
}

#[async_trait]
impl VectorBackend for RemoteBackend {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn tier(&self) -> BackendTier {
        BackendTier::Server
    }

    /// Short-timeout network probe, distinct from the full sign-in flow.
    async fn available(&self) -> bool {
        let url = format!(
            "{}/health",
            self.inner.config.endpoint.trim_end_matches('/')
        );
        match self.inner.probe_client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Connect eagerly and spawn the periodic health check.
    async fn start(&self) -> Result<()> {
        self.inner.ensure_connected().await?;

        let mut guard = self
            .health_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.is_none() {
            let inner = Arc::clone(&self.inner);
            let period = Duration::from_secs(self.health_check_secs.max(1));
            *guard = Some(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                ticker.tick().await; // immediate first tick
                loop {
                    ticker.tick().await;
                    match inner.probe_session().await {
                        Some(false) => warn!(
                            "remote vector backend health check failed; will reconnect on next call"
                        ),
                        Some(true) => {}
                        None => debug!("no session to probe; waiting for next call to reconnect"),
                    }
                }
            }));
        }
        Ok(())
    }

    async fn store(&self, item: VectorItem) -> Result<()> {
        self.store_batch(vec![item]).await?;
        Ok(())
    }

    /// One multi-row insert per batch, applied atomically server-side.
    async fn store_batch(&self, items: Vec<VectorItem>) -> Result<usize> {
        if items.is_empty() {
            return Ok(0);
        }
        let token = self.inner.ensure_connected().await?;

        let now = chrono::Utc::now().timestamp();
        let rows: Vec<Value> = items
            .iter()
            .map(|item| {
                json!({
                    "chunk_id": item.chunk_id,
                    "source_id": item.source_id,
                    "embedding": item.embedding,
                    "created_at": now,
                })
            })
            .collect();

        self.inner
            .exec_sql(
                &token,
                "INSERT INTO vectors $rows;",
                Some(json!({ "rows": rows })),
            )
            .await?;

        Ok(items.len())
    }

    async fn search(
        &self,
        embedding: &[f32],
        opts: &VectorSearchOptions,
    ) -> Result<Vec<VectorHit>> {
        let token = self.inner.ensure_connected().await?;
        let limit = if opts.limit > 0 { opts.limit } else { 10 };

        let (query, vars) = match &opts.source_id {
            Some(source_id) => (
                "SELECT chunk_id, source_id, \
                 vector::similarity::cosine(embedding, $query) AS score \
                 FROM vectors WHERE source_id = $source_id \
                 ORDER BY score DESC LIMIT $limit;",
                json!({ "query": embedding, "source_id": source_id, "limit": limit }),
            ),
            None => (
                "SELECT chunk_id, source_id, \
                 vector::similarity::cosine(embedding, $query) AS score \
                 FROM vectors ORDER BY score DESC LIMIT $limit;",
                json!({ "query": embedding, "limit": limit }),
            ),
        };

        let results = self.inner.exec_sql(&token, query, Some(vars)).await?;
        let rows = results
            .last()
            .ok_or_else(|| Error::RemoteBackend("empty response".into()))?;
        parse_hits(rows)
    }

    async fn delete_for_source(&self, source_id: &str) -> Result<u64> {
        let token = self.inner.ensure_connected().await?;
        let results = self
            .inner
            .exec_sql(
                &token,
                "SELECT count() AS n FROM vectors WHERE source_id = $source_id GROUP ALL;\n\
                 DELETE vectors WHERE source_id = $source_id;",
                Some(json!({ "source_id": source_id })),
            )
            .await?;

        let count = results
            .first()
            .and_then(|rows| rows.as_array())
            .and_then(|rows| rows.first())
            .and_then(|row| row.get("n"))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        Ok(count)
    }

    async fn stats(&self) -> Result<VectorStats> {
        let token = self.inner.ensure_connected().await?;
        let results = self
            .inner
            .exec_sql(
                &token,
                "SELECT count() AS n FROM vectors GROUP ALL;",
                None,
            )
            .await?;

        let records = results
            .first()
            .and_then(|rows| rows.as_array())
            .and_then(|rows| rows.first())
            .and_then(|row| row.get("n"))
            .and_then(Value::as_u64)
            .unwrap_or(0);

        Ok(VectorStats {
            backend: "remote".to_string(),
            records,
        })
    }

    /// Full health check: connects if needed, then one round trip.
    async fn healthy(&self) -> bool {
        let healthy = match self.inner.ensure_connected().await {
            Ok(token) => self.inner.exec_sql(&token, "RETURN 1;", None).await.is_ok(),
            Err(_) => false,
        };
        self.inner.note_health(healthy).await;
        healthy
    }
}

/// Extract the session token from a sign-in response.
fn parse_signin_token(body: &Value) -> Result<String> {
    body.get("token")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::RemoteBackend("sign-in response missing token".into()))
}

/// Flatten a `/sql` response into per-statement result values, failing on
/// the first statement the server reports as an error.
fn parse_sql_response(body: &Value) -> Result<Vec<Value>> {
    let statements = body
        .as_array()
        .ok_or_else(|| Error::RemoteBackend("malformed response: expected array".into()))?;

    let mut results = Vec::with_capacity(statements.len());
    for statement in statements {
        let status = statement
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("ERR");
        if status != "OK" {
            let detail = statement
                .get("result")
                .and_then(Value::as_str)
                .or_else(|| statement.get("detail").and_then(Value::as_str))
                .unwrap_or("statement failed");
            return Err(Error::RemoteBackend(detail.to_string()));
        }
        results.push(statement.get("result").cloned().unwrap_or(Value::Null));
    }
    Ok(results)
}

/// Decode similarity rows into the shared hit shape.
fn parse_hits(rows: &Value) -> Result<Vec<VectorHit>> {
    let rows = rows
        .as_array()
        .ok_or_else(|| Error::RemoteBackend("malformed response: expected rows".into()))?;

    rows.iter()
        .map(|row| {
            let chunk_id = row
                .get("chunk_id")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::RemoteBackend("row missing chunk_id".into()))?;
            let source_id = row
                .get("source_id")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let score = row.get("score").and_then(Value::as_f64).unwrap_or(0.0);
            Ok(VectorHit {
                chunk_id: chunk_id.to_string(),
                source_id: source_id.to_string(),
                score,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signin_token_parsing() {
        let ok = json!({ "code": 200, "token": "abc.def.ghi" });
        assert_eq!(parse_signin_token(&ok).unwrap(), "abc.def.ghi");

        let missing = json!({ "code": 200 });
        assert!(matches!(
            parse_signin_token(&missing),
            Err(Error::RemoteBackend(_))
        ));
    }

    #[test]
    fn sql_response_ok_statements() {
        let body = json!([
            { "status": "OK", "result": [{ "n": 3 }] },
            { "status": "OK", "result": [] }
        ]);
        let results = parse_sql_response(&body).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0][0]["n"], 3);
    }

    #[test]
    fn sql_response_statement_error_fails_whole_call() {
        let body = json!([
            { "status": "OK", "result": [] },
            { "status": "ERR", "result": "index already exists" }
        ]);
        let err = parse_sql_response(&body).unwrap_err();
        match err {
            Error::RemoteBackend(msg) => assert!(msg.contains("index already exists")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn sql_response_rejects_non_array() {
        let body = json!({ "unexpected": true });
        assert!(parse_sql_response(&body).is_err());
    }

    #[test]
    fn hit_parsing() {
        let rows = json!([
            { "chunk_id": "c1", "source_id": "s1", "score": 0.97 },
            { "chunk_id": "c2", "source_id": "s1", "score": 0.42 }
        ]);
        let hits = parse_hits(&rows).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_id, "c1");
        assert!((hits[0].score - 0.97).abs() < 1e-9);
    }

    #[test]
    fn hit_parsing_requires_chunk_id() {
        let rows = json!([{ "score": 0.5 }]);
        assert!(parse_hits(&rows).is_err());
    }

    fn test_config() -> crate::config::RemoteBackendConfig {
        crate::config::RemoteBackendConfig {
            endpoint: "http://127.0.0.1:1".to_string(),
            namespace: "docs".to_string(),
            database: "docs".to_string(),
            user: "root".to_string(),
            pass: "root".to_string(),
            dims: 4,
            timeout_secs: 1,
            probe_timeout_secs: 1,
        }
    }

    #[tokio::test]
    async fn session_probe_skips_when_disconnected() {
        let backend = RemoteBackend::new(test_config(), 30).unwrap();

        // Without a session there is nothing to probe: no sign-in attempt,
        // no state change.
        assert!(backend.inner.probe_session().await.is_none());
        assert!(!backend.connected().await);
        assert!(backend.inner.state.lock().await.last_health_check.is_none());
    }
}
