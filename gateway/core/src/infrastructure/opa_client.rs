// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! OPA REST Adapter
//!
//! Implements [`PolicyEvaluator`] against an Open Policy Agent server.
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | compile   | `PUT {url}/v1/policies/{tenant}` (text/plain body) |
//! | evaluate  | `POST {url}/v1/data/{rule/path}` with `{"input": ...}` |
//! | health    | `GET {url}/health` |
//!
//! Mediation re-installs the cached policy before every evaluation, so the
//! adapter remembers the SHA-256 digest of the last document OPA accepted
//! per tenant and skips identical pushes. An entry exists only while OPA is
//! known to hold that document: it is dropped before every push and
//! restored on a 2xx reply, so an abandoned push leaves no entry behind.
//! An undefined result or a transport failure on evaluation also drops it.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::domain::evaluator::{EvaluatorError, PolicyEvaluator};
use crate::domain::tenant::TenantId;

pub struct OpaClient {
    client: reqwest::Client,
    base_url: String,
    installed: DashMap<String, String>,
}

impl OpaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            installed: DashMap::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn digest(document: &str) -> String {
        hex::encode(Sha256::digest(document.as_bytes()))
    }

    /// Forget what OPA holds for the tenant owning `rule_path`
    fn forget_rule_owner(&self, rule_path: &str) {
        if let Some(tenant) = rule_path.split('.').next() {
            if self.installed.remove(tenant).is_some() {
                debug!(tenant, "Dropped installed-policy digest");
            }
        }
    }

    async fn error_body(response: reqwest::Response) -> String {
        let text = response.text().await.unwrap_or_default();
        serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or(text)
    }
}

#[async_trait]
impl PolicyEvaluator for OpaClient {
    async fn compile(&self, tenant: &TenantId, document: &str) -> Result<(), EvaluatorError> {
        let digest = Self::digest(document);
        if self
            .installed
            .get(tenant.as_str())
            .is_some_and(|current| *current == digest)
        {
            debug!(tenant = %tenant, "Policy unchanged, skipping push");
            return Ok(());
        }

        // Unknown until OPA answers; the future may be dropped mid-request.
        self.installed.remove(tenant.as_str());

        let url = format!("{}/v1/policies/{}", self.base_url, tenant);
        let response = self
            .client
            .put(&url)
            .header("Content-Type", "text/plain")
            .body(document.to_string())
            .send()
            .await
            .map_err(|e| EvaluatorError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            self.installed.insert(tenant.to_string(), digest);
            debug!(tenant = %tenant, "Policy installed");
            return Ok(());
        }

        let body = Self::error_body(response).await;
        if status.as_u16() == 400 {
            Err(EvaluatorError::Compile(body))
        } else {
            Err(EvaluatorError::Http {
                status: status.as_u16(),
                body,
            })
        }
    }

    async fn evaluate(&self, rule_path: &str, input: &Value) -> Result<Value, EvaluatorError> {
        let url = format!("{}/v1/data/{}", self.base_url, rule_path.replace('.', "/"));
        let response = self
            .client
            .post(&url)
            .json(&json!({ "input": input }))
            .send()
            .await
            .map_err(|e| {
                self.forget_rule_owner(rule_path);
                EvaluatorError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(EvaluatorError::Http {
                status: status.as_u16(),
                body: Self::error_body(response).await,
            });
        }

        let mut body: Value = response
            .json()
            .await
            .map_err(|e| EvaluatorError::MalformedResponse(e.to_string()))?;

        match body.get_mut("result") {
            Some(result) => Ok(result.take()),
            None => {
                // OPA may have restarted and lost the package.
                self.forget_rule_owner(rule_path);
                Err(EvaluatorError::MalformedResponse(format!(
                    "rule '{}' produced no result",
                    rule_path
                )))
            }
        }
    }

    async fn health_check(&self) -> Result<(), EvaluatorError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(|e| EvaluatorError::Network(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(EvaluatorError::Http {
                status: response.status().as_u16(),
                body: Self::error_body(response).await,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn tenant() -> TenantId {
        TenantId::parse("acme").unwrap()
    }

    /// Minimal OPA stand-in: answers every PUT with 200 except one whose body
    /// equals `stalled`, which is held open without a reply. Returns the base
    /// URL and the bodies of the pushes it acknowledged.
    async fn spawn_stalling_opa(stalled: &'static str) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let accepted = Arc::new(Mutex::new(Vec::new()));

        let log = accepted.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let log = log.clone();
                tokio::spawn(async move {
                    let body = read_request_body(&mut socket).await;
                    if body == stalled {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        return;
                    }
                    log.lock().push(body);
                    let _ = socket
                        .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\n{}")
                        .await;
                });
            }
        });
        (url, accepted)
    }

    async fn read_request_body(socket: &mut TcpStream) -> String {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let read = socket.read(&mut chunk).await.unwrap();
            if read == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..read]);

            let text = String::from_utf8_lossy(&buffer).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buffer.len() >= end + 4 + length {
                    return String::from_utf8_lossy(&buffer[end + 4..end + 4 + length]).to_string();
                }
            }
        }
        String::new()
    }

    #[tokio::test]
    async fn test_abandoned_push_forces_next_push() {
        let (url, accepted) = spawn_stalling_opa("package acme.access # draft").await;
        let client = OpaClient::new(url);

        client.compile(&tenant(), "package acme.access").await.unwrap();
        let abandoned = tokio::time::timeout(
            Duration::from_millis(100),
            client.compile(&tenant(), "package acme.access # draft"),
        )
        .await;
        assert!(abandoned.is_err());

        // OPA may hold the draft now, so the committed document goes out again.
        client.compile(&tenant(), "package acme.access").await.unwrap();
        assert_eq!(
            *accepted.lock(),
            vec!["package acme.access".to_string(), "package acme.access".to_string()]
        );
    }

    #[tokio::test]
    async fn test_undefined_result_forces_next_push() {
        let mut server = mockito::Server::new_async().await;
        let put = server
            .mock("PUT", "/v1/policies/acme")
            .with_status(200)
            .with_body("{}")
            .expect(2)
            .create_async()
            .await;
        let _post = server
            .mock("POST", "/v1/data/acme/access/result")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = OpaClient::new(server.url());
        client.compile(&tenant(), "package acme.access").await.unwrap();
        assert!(client.evaluate("acme.access.result", &json!({})).await.is_err());
        client.compile(&tenant(), "package acme.access").await.unwrap();
        put.assert_async().await;
    }

    #[tokio::test]
    async fn test_unreachable_evaluator_forgets_installed_policy() {
        let mut server = mockito::Server::new_async().await;
        let _put = server
            .mock("PUT", "/v1/policies/acme")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let mut client = OpaClient::new(server.url());
        client.compile(&tenant(), "package acme.access").await.unwrap();
        assert!(client.installed.contains_key("acme"));

        // Nothing listens on port 9 (discard) locally.
        client.base_url = "http://127.0.0.1:9".to_string();
        let err = client.evaluate("acme.access.result", &json!({})).await.unwrap_err();
        assert!(matches!(err, EvaluatorError::Network(_)));
        assert!(!client.installed.contains_key("acme"));
    }

    #[tokio::test]
    async fn test_compile_skips_identical_document() {
        let mut server = mockito::Server::new_async().await;
        let put = server
            .mock("PUT", "/v1/policies/acme")
            .match_header("content-type", "text/plain")
            .match_body("package acme.access")
            .with_status(200)
            .with_body("{}")
            .expect(1)
            .create_async()
            .await;

        let client = OpaClient::new(server.url());
        client.compile(&tenant(), "package acme.access").await.unwrap();
        client.compile(&tenant(), "package acme.access").await.unwrap();
        put.assert_async().await;
    }

    #[tokio::test]
    async fn test_compile_error_is_reported_and_forgotten() {
        let mut server = mockito::Server::new_async().await;
        let put = server
            .mock("PUT", "/v1/policies/acme")
            .with_status(400)
            .with_body(r#"{"code":"invalid_parameter","message":"1 error occurred: rego_parse_error"}"#)
            .expect(2)
            .create_async()
            .await;

        let client = OpaClient::new(server.url());
        let err = client.compile(&tenant(), "package").await.unwrap_err();
        assert!(matches!(err, EvaluatorError::Compile(ref m) if m.contains("rego_parse_error")));

        // A rejected document is never memoised, so the retry hits OPA again.
        assert!(client.compile(&tenant(), "package").await.is_err());
        put.assert_async().await;
    }

    #[tokio::test]
    async fn test_evaluate_reads_result() {
        let mut server = mockito::Server::new_async().await;
        let post = server
            .mock("POST", "/v1/data/acme/access/result")
            .match_body(Matcher::Json(json!({"input": {"user": {"user_id": "u1"}}})))
            .with_status(200)
            .with_body(json!({"result": {"allowed": true, "allowed_columns": ["*"]}}).to_string())
            .create_async()
            .await;

        let client = OpaClient::new(format!("{}/", server.url()));
        let result = client
            .evaluate("acme.access.result", &json!({"user": {"user_id": "u1"}}))
            .await
            .unwrap();
        assert_eq!(result["allowed"], true);
        post.assert_async().await;
    }

    #[tokio::test]
    async fn test_evaluate_undefined_rule_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        let _post = server
            .mock("POST", "/v1/data/acme/access/result")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = OpaClient::new(server.url());
        let err = client.evaluate("acme.access.result", &json!({})).await.unwrap_err();
        assert!(matches!(err, EvaluatorError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_health_check() {
        let mut server = mockito::Server::new_async().await;
        let _health = server.mock("GET", "/health").with_status(200).create_async().await;
        assert!(OpaClient::new(server.url()).health_check().await.is_ok());
    }
}
