//! Thin reqwest wrapper shared by every view: base-URL joining, bearer-token
//! injection, one refresh-and-retry on 401, and a bounded call history.

use crate::config::DashboardConfig;
use crate::credentials::CredentialProvider;
use crate::error::DashboardError;
use log::{debug, warn};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;
use tokio::time::Duration;

const USER_AGENT: &str = "flowdash-core/0.1";
const ACCEPT: &str = "application/json, */*";
const MAX_API_HISTORY: usize = 100;
const TOKEN_REFRESH_PATH: &str = "/users/token/refresh/";

#[derive(Debug, Clone)]
pub struct ApiCall {
    pub method: String,
    pub url: String,
    pub timestamp: OffsetDateTime,
    pub status_code: u16,
    pub success: bool,
}

/// A file part for multipart uploads.
#[derive(Debug, Clone)]
pub struct UploadPart {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
    history: Mutex<Vec<ApiCall>>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.credentials.is_authenticated())
            .finish()
    }
}

impl ApiClient {
    pub fn new(
        config: &DashboardConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, DashboardError> {
        config.validate()?;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static(USER_AGENT),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static(ACCEPT),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(ApiClient {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            credentials,
            history: Mutex::new(Vec::new()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialProvider> {
        &self.credentials
    }

    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Sends a request built by `build`, attaching the bearer token. `build` is
    /// invoked again for the retry after a token refresh, so it must be cheap and
    /// repeatable.
    pub async fn send<F>(&self, method: Method, path: &str, build: F) -> Result<Response, DashboardError>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let url = self.url(path);
        let mut refreshed = false;

        loop {
            let mut request = build(self.client.request(method.clone(), &url));
            if let Some(token) = self.credentials.access_token() {
                request = request.bearer_auth(token);
            }

            debug!("{} {}", method, url);
            let timestamp = OffsetDateTime::now_utc();
            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    self.record(&method, &url, timestamp, 0, false);
                    return Err(DashboardError::Network(e));
                }
            };

            let status = response.status();
            self.record(&method, &url, timestamp, status.as_u16(), status.is_success());

            if status == StatusCode::UNAUTHORIZED {
                if !refreshed && self.credentials.refresh_token().is_some() {
                    refreshed = true;
                    self.refresh_access().await?;
                    continue;
                }
                return Err(DashboardError::Auth(format!("Unauthorized: {}", url)));
            }

            if !status.is_success() {
                return Err(DashboardError::Http {
                    status: status.as_u16(),
                    url,
                });
            }

            return Ok(response);
        }
    }

    /// Exchanges the stored refresh token for a new access token.
    pub async fn refresh_access(&self) -> Result<(), DashboardError> {
        let refresh = self
            .credentials
            .refresh_token()
            .ok_or_else(|| DashboardError::Auth("No refresh token available".to_string()))?;

        let url = self.url(TOKEN_REFRESH_PATH);
        debug!("Refreshing access token at {}", url);
        let timestamp = OffsetDateTime::now_utc();
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "refresh": refresh }))
            .send()
            .await?;
        let status = response.status();
        self.record(&Method::POST, &url, timestamp, status.as_u16(), status.is_success());

        if !status.is_success() {
            warn!("Token refresh rejected with status {}", status);
            self.credentials.clear()?;
            return Err(DashboardError::Auth("Session expired, please log in again".to_string()));
        }

        let body: Value = response.json().await?;
        let access = body["access"]
            .as_str()
            .ok_or_else(|| DashboardError::MalformedResponse("Refresh response without access token".to_string()))?;
        self.credentials.replace_access(access.to_string())
    }

    pub async fn get_json(&self, path: &str, query: &[(String, String)]) -> Result<Value, DashboardError> {
        let response = self.send(Method::GET, path, |req| req.query(query)).await?;
        json_or_null(response).await
    }

    pub async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value, DashboardError> {
        let response = self.send(Method::POST, path, |req| req.json(body)).await?;
        json_or_null(response).await
    }

    pub async fn post_empty(&self, path: &str) -> Result<Value, DashboardError> {
        let response = self.send(Method::POST, path, |req| req).await?;
        json_or_null(response).await
    }

    pub async fn put_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value, DashboardError> {
        let response = self.send(Method::PUT, path, |req| req.json(body)).await?;
        json_or_null(response).await
    }

    pub async fn put_empty(&self, path: &str) -> Result<Value, DashboardError> {
        let response = self.send(Method::PUT, path, |req| req).await?;
        json_or_null(response).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), DashboardError> {
        self.send(Method::DELETE, path, |req| req).await?;
        Ok(())
    }

    /// POST a JSON body and return the raw response bytes (file downloads).
    pub async fn post_for_bytes<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Vec<u8>, DashboardError> {
        let response = self.send(Method::POST, path, |req| req.json(body)).await?;
        Ok(response.bytes().await?.to_vec())
    }

    pub async fn post_multipart(
        &self,
        path: &str,
        fields: &[(String, String)],
        files: &[UploadPart],
    ) -> Result<Value, DashboardError> {
        let response = self
            .send(Method::POST, path, |req| {
                let mut form = reqwest::multipart::Form::new();
                for (key, value) in fields {
                    form = form.text(key.clone(), value.clone());
                }
                for part in files {
                    form = form.part(
                        "files",
                        reqwest::multipart::Part::bytes(part.bytes.clone())
                            .file_name(part.file_name.clone()),
                    );
                }
                req.multipart(form)
            })
            .await?;
        json_or_null(response).await
    }

    fn record(&self, method: &Method, url: &str, timestamp: OffsetDateTime, status_code: u16, success: bool) {
        let api_call = ApiCall {
            method: method.to_string(),
            url: url.to_string(),
            timestamp,
            status_code,
            success,
        };

        if let Ok(mut history) = self.history.lock() {
            history.push(api_call);
            if history.len() > MAX_API_HISTORY {
                let excess = history.len() - MAX_API_HISTORY;
                history.drain(0..excess);
            }
        }
    }

    /// Recent calls, oldest first.
    pub fn call_history(&self) -> Vec<ApiCall> {
        self.history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default()
    }

    pub fn clear_call_history(&self) {
        if let Ok(mut history) = self.history.lock() {
            history.clear();
        }
    }
}

/// Mutation endpoints frequently answer with an empty body.
async fn json_or_null(response: Response) -> Result<Value, DashboardError> {
    let text = response.text().await?;
    if text.trim().is_empty() {
        Ok(Value::Null)
    } else {
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{MemoryTokenStore, TokenPair};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn client_for(base: &str) -> ApiClient {
        let config = DashboardConfig {
            api_base_url: base.to_string(),
            ..Default::default()
        };
        ApiClient::new(&config, Arc::new(MemoryTokenStore::new())).unwrap()
    }

    #[test]
    fn test_url_joining() {
        let client = client_for("http://localhost:8000/");
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(
            client.url("/api/workflow/"),
            "http://localhost:8000/api/workflow/"
        );
        assert_eq!(
            client.url("files/list/wheel"),
            "http://localhost:8000/files/list/wheel"
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = DashboardConfig {
            api_base_url: String::new(),
            ..Default::default()
        };
        assert!(ApiClient::new(&config, Arc::new(MemoryTokenStore::new())).is_err());
    }

    #[test]
    fn test_history_is_bounded() {
        let client = client_for("http://localhost:8000");
        for i in 0..(MAX_API_HISTORY + 25) {
            client.record(
                &Method::GET,
                &format!("http://localhost:8000/{}", i),
                OffsetDateTime::now_utc(),
                200,
                true,
            );
        }
        let history = client.call_history();
        assert_eq!(history.len(), MAX_API_HISTORY);
        assert_eq!(history[0].url, "http://localhost:8000/25");

        client.clear_call_history();
        assert!(client.call_history().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_error() {
        // Port 9 (discard) on loopback is expected to refuse connections.
        let client = client_for("http://127.0.0.1:9");
        let result = client.get_json("/api/workflow/", &[]).await;
        match result {
            Err(e) => assert!(e.is_network_or_server()),
            Ok(_) => panic!("Expected a network error"),
        }
        let history = client.call_history();
        assert_eq!(history.len(), 1);
        assert!(!history[0].success);
        assert_eq!(history[0].status_code, 0);
    }

    #[tokio::test]
    async fn test_refresh_without_token_is_auth_error() {
        let client = client_for("http://127.0.0.1:9");
        assert!(matches!(
            client.refresh_access().await,
            Err(DashboardError::Auth(_))
        ));
    }

    /// Answers one connection per canned `(status, body)` and records each
    /// request head, lowercased.
    async fn canned_server(responses: Vec<(u16, &'static str)>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut request = Vec::new();
                let mut chunk = [0u8; 4096];
                loop {
                    let n = socket.read(&mut chunk).await.unwrap();
                    request.extend_from_slice(&chunk[..n]);
                    let text = String::from_utf8_lossy(&request).to_lowercase();
                    if let Some(end) = text.find("\r\n\r\n") {
                        let length = text
                            .lines()
                            .find_map(|line| line.strip_prefix("content-length:"))
                            .and_then(|value| value.trim().parse::<usize>().ok())
                            .unwrap_or(0);
                        if n == 0 || request.len() >= end + 4 + length {
                            break;
                        }
                    } else if n == 0 {
                        break;
                    }
                }
                log.lock()
                    .unwrap()
                    .push(String::from_utf8_lossy(&request).to_lowercase());

                let reply = format!(
                    "HTTP/1.1 {} Canned\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                socket.write_all(reply.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });

        (base, seen)
    }

    fn signed_in_client(base: &str) -> (ApiClient, Arc<MemoryTokenStore>) {
        let store = Arc::new(MemoryTokenStore::with_tokens(TokenPair {
            access: Some("stale".to_string()),
            refresh: Some("keep-me".to_string()),
        }));
        let config = DashboardConfig {
            api_base_url: base.to_string(),
            ..Default::default()
        };
        let client = ApiClient::new(&config, store.clone()).unwrap();
        (client, store)
    }

    #[tokio::test]
    async fn test_unauthorized_request_refreshes_and_retries_once() {
        let (base, seen) = canned_server(vec![
            (401, ""),
            (200, r#"{"access":"fresh"}"#),
            (200, r#"{"results":[],"count":0}"#),
        ])
        .await;
        let (client, store) = signed_in_client(&base);

        let body = client.get_json("/api/workflow/", &[]).await.unwrap();
        assert_eq!(body["count"], 0);
        assert_eq!(store.access_token().as_deref(), Some("fresh"));

        let requests = seen.lock().unwrap().clone();
        assert_eq!(requests.len(), 3);
        assert!(requests[0].contains("bearer stale"));
        assert!(requests[1].starts_with("post /users/token/refresh/"));
        assert!(requests[1].contains(r#""refresh":"keep-me""#));
        assert!(requests[2].starts_with("get /api/workflow/"));
        assert!(requests[2].contains("bearer fresh"));
    }

    #[tokio::test]
    async fn test_second_unauthorized_is_auth_error() {
        let (base, seen) = canned_server(vec![
            (401, ""),
            (200, r#"{"access":"fresh"}"#),
            (401, ""),
        ])
        .await;
        let (client, _store) = signed_in_client(&base);

        let result = client.get_json("/api/workflow/", &[]).await;
        assert!(matches!(result, Err(DashboardError::Auth(_))));
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_rejected_refresh_clears_credentials() {
        let (base, _seen) = canned_server(vec![(401, ""), (401, "")]).await;
        let (client, store) = signed_in_client(&base);

        let result = client.get_json("/api/workflow/run", &[]).await;
        assert!(matches!(result, Err(DashboardError::Auth(_))));
        assert_eq!(store.access_token(), None);
        assert_eq!(store.refresh_token(), None);
        assert!(!client.credentials().is_authenticated());
    }
}
