//! Client for the remote inference API.
//!
//! The service exposes two endpoints:
//!
//! - `GET /health`: any successful status within the health timeout means
//!   the service is live. The body is ignored.
//! - `POST /predict`: takes a JSON object mapping every schema feature
//!   name to its value and replies with
//!   `{"status": "success", "predicted_housing_stress_index": <number>}`.
//!
//! Every failure mode (timeout, connection error, non-success status,
//! error body, malformed body) is reported as [`RemoteUnavailable`].

use async_trait::async_trait;
use housing_stress_scenario_models::FeatureVector;
use thiserror::Error;

use crate::service_config::RemoteServiceConfig;

/// Response field carrying the prediction.
pub const PREDICTION_FIELD: &str = "predicted_housing_stress_index";

/// The remote path could not produce a prediction.
///
/// Never surfaced to callers of the resolver; it only triggers the local
/// fallback.
#[derive(Debug, Error)]
pub enum RemoteUnavailable {
    /// The remote path is disabled by configuration.
    #[error("Remote inference is disabled")]
    Disabled,

    /// The request failed to complete (connection, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("Remote service returned status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// The service reported an error in its response body.
    #[error("Remote service reported an error: {message}")]
    Reported {
        /// Message from the service, if any.
        message: String,
    },

    /// The response body did not match the prediction contract.
    #[error("Malformed remote response: {message}")]
    Malformed {
        /// What was wrong with the body.
        message: String,
    },
}

impl RemoteUnavailable {
    fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}

/// A remote scoring service.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Whether the remote path should be attempted at all.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Liveness check. Must never block longer than its own timeout.
    async fn is_healthy(&self) -> bool;

    /// Scores one feature vector.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteUnavailable`] on any failure.
    async fn predict(&self, vector: &FeatureVector) -> Result<f64, RemoteUnavailable>;
}

/// HTTP implementation of [`RemoteService`].
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    config: RemoteServiceConfig,
}

impl HttpRemote {
    /// Creates a client for `config` with a default HTTP client.
    #[must_use]
    pub fn new(config: RemoteServiceConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Creates a client for `config` reusing an existing HTTP client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client, config: RemoteServiceConfig) -> Self {
        Self { client, config }
    }

    /// Creates a client from the embedded configuration and environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(RemoteServiceConfig::from_env())
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &RemoteServiceConfig {
        &self.config
    }
}

#[async_trait]
impl RemoteService for HttpRemote {
    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn is_healthy(&self) -> bool {
        if !self.config.enabled {
            return false;
        }

        let url = format!("{}/health", self.config.base_url());
        let healthy = self
            .client
            .get(&url)
            .timeout(self.config.health_timeout())
            .send()
            .await
            .is_ok_and(|r| r.status().is_success());

        log::debug!("Health check {url}: {}", if healthy { "up" } else { "down" });
        healthy
    }

    async fn predict(&self, vector: &FeatureVector) -> Result<f64, RemoteUnavailable> {
        if !self.config.enabled {
            return Err(RemoteUnavailable::Disabled);
        }

        let url = format!("{}/predict", self.config.base_url());
        let body: serde_json::Map<String, serde_json::Value> = vector
            .named_values()
            .map(|(name, value)| (name.to_string(), serde_json::Value::from(value)))
            .collect();

        log::debug!("POST {url} with {} features", body.len());

        let resp = self
            .client
            .post(&url)
            .timeout(self.config.predict_timeout())
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(RemoteUnavailable::Status {
                status: resp.status().as_u16(),
            });
        }

        let text = resp.text().await?;
        let body: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| RemoteUnavailable::malformed(format!("invalid JSON: {e}")))?;
        parse_response(&body)
    }
}

/// Extracts the prediction from a `/predict` response body.
///
/// # Errors
///
/// Returns [`RemoteUnavailable::Reported`] when `status` is present and
/// not `"success"`, and [`RemoteUnavailable::Malformed`] when the
/// prediction field is missing, not a number, or not finite.
pub fn parse_response(body: &serde_json::Value) -> Result<f64, RemoteUnavailable> {
    if let Some(status) = body.get("status") {
        if status.as_str() != Some("success") {
            let message = body
                .get("message")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("no message")
                .to_string();
            return Err(RemoteUnavailable::Reported { message });
        }
    }

    let value = body
        .get(PREDICTION_FIELD)
        .ok_or_else(|| RemoteUnavailable::malformed(format!("missing '{PREDICTION_FIELD}'")))?
        .as_f64()
        .ok_or_else(|| RemoteUnavailable::malformed(format!("'{PREDICTION_FIELD}' is not a number")))?;

    if !value.is_finite() {
        return Err(RemoteUnavailable::malformed(format!(
            "'{PREDICTION_FIELD}' is not finite"
        )));
    }

    Ok(value)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use housing_stress_scenario_models::{ModelSchema, SchemaSource};
    use serde_json::json;
    use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    use super::*;

    pub fn vector() -> FeatureVector {
        let schema = Arc::new(ModelSchema::new(
            vec!["avg_weekly_income".to_string(), "avg_weekly_rent".to_string()],
            SchemaSource::Scaler,
        ));
        FeatureVector::try_new(schema, vec![1800.0, 420.0]).unwrap()
    }

    pub fn client_for(base_url: &str) -> HttpRemote {
        let mut config = RemoteServiceConfig::embedded().with_overrides(Some(base_url), None);
        config.health_timeout_secs = 1;
        config.predict_timeout_secs = 1;
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        HttpRemote::with_client(client, config)
    }

    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0_u8; 1024];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(key, _)| key.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Serves one canned response and yields the raw request it received.
    pub async fn serve_once(status_line: &str, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_request(&mut stream).await;
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
            request
        });
        (format!("http://{addr}"), handle)
    }

    /// Accepts connections and never answers.
    pub async fn serve_silence() -> (String, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        (format!("http://{addr}"), handle)
    }

    /// A base URL nothing listens on.
    pub async fn refused_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }

    #[test]
    fn parses_success_body() {
        let body = json!({"status": "success", "predicted_housing_stress_index": 12.5});
        assert!((parse_response(&body).unwrap() - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn accepts_body_without_status() {
        let body = json!({"predicted_housing_stress_index": 7});
        assert!((parse_response(&body).unwrap() - 7.0).abs() < f64::EPSILON);
    }

    #[test]
    fn error_status_is_reported() {
        let body = json!({"status": "error", "message": "model not loaded"});
        let err = parse_response(&body).unwrap_err();
        assert!(
            matches!(err, RemoteUnavailable::Reported { ref message } if message == "model not loaded")
        );
    }

    #[test]
    fn malformed_bodies_are_rejected() {
        for body in [
            json!({"status": "success"}),
            json!({"predicted_housing_stress_index": "high"}),
            json!([1.0]),
        ] {
            assert!(matches!(
                parse_response(&body),
                Err(RemoteUnavailable::Malformed { .. })
            ));
        }
    }

    #[tokio::test]
    async fn predict_posts_named_features() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"status": "success", "predicted_housing_stress_index": 18.25}"#,
        )
        .await;
        let remote = client_for(&url);

        let value = remote.predict(&vector()).await.unwrap();
        assert!((value - 18.25).abs() < f64::EPSILON);

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /predict "));
        let body = &request[request.find("\r\n\r\n").unwrap() + 4..];
        let sent: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(
            sent,
            json!({"avg_weekly_income": 1800.0, "avg_weekly_rent": 420.0})
        );
    }

    #[tokio::test]
    async fn non_success_status_is_unavailable() {
        let (url, _server) = serve_once("500 Internal Server Error", "{}").await;
        let remote = client_for(&url);
        assert!(matches!(
            remote.predict(&vector()).await,
            Err(RemoteUnavailable::Status { status: 500 })
        ));
    }

    #[tokio::test]
    async fn non_json_body_is_malformed() {
        let (url, _server) = serve_once("200 OK", "<html>oops</html>").await;
        let remote = client_for(&url);
        assert!(matches!(
            remote.predict(&vector()).await,
            Err(RemoteUnavailable::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn silent_service_times_out() {
        let (url, server) = serve_silence().await;
        let remote = client_for(&url);

        assert!(matches!(
            remote.predict(&vector()).await,
            Err(RemoteUnavailable::Http(ref e)) if e.is_timeout()
        ));
        assert!(!remote.is_healthy().await);
        server.abort();
    }

    #[tokio::test]
    async fn health_reflects_status() {
        let (url, server) = serve_once("200 OK", "{}").await;
        assert!(client_for(&url).is_healthy().await);
        assert!(server.await.unwrap().starts_with("GET /health "));

        let (url, _server) = serve_once("503 Service Unavailable", "{}").await;
        assert!(!client_for(&url).is_healthy().await);

        let url = refused_url().await;
        assert!(!client_for(&url).is_healthy().await);
    }

    #[tokio::test]
    async fn disabled_service_is_never_contacted() {
        let url = refused_url().await;
        let mut remote = client_for(&url);
        remote.config.enabled = false;

        assert!(!remote.is_enabled());
        assert!(!remote.is_healthy().await);
        assert!(matches!(
            remote.predict(&vector()).await,
            Err(RemoteUnavailable::Disabled)
        ));
    }
}
