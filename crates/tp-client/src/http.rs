//! reqwest-backed transport.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

use crate::credentials::IdentitySnapshot;
use crate::error::{ClientError, TransportError};
use crate::session::{ApiRequest, ApiResponse, Method, TokenGrant, Transport};

/// Default per-request timeout.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// HTTP transport against a Taskpay API server.
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn read_body(response: reqwest::Response) -> Result<(StatusCode, serde_json::Value), TransportError> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;
        let body = if text.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&text).map_err(|e| {
                TransportError::InvalidResponse(format!(
                    "failed to parse response (status {status}): {e}"
                ))
            })?
        };
        Ok((status, body))
    }

    fn error_message(body: &serde_json::Value) -> String {
        body.get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("request failed")
            .to_string()
    }
}

fn map_send_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_connect() {
        TransportError::Connection(e.to_string())
    } else {
        TransportError::Connection(e.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    id: Uuid,
    username: String,
    role: String,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
    refresh_token: String,
    user: Option<UserInfo>,
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        request: &ApiRequest,
        access_token: Option<&str>,
    ) -> Result<ApiResponse, TransportError> {
        let url = self.url(&request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Patch => self.client.patch(&url),
            Method::Delete => self.client.delete(&url),
        };
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(token) = access_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(map_send_error)?;
        let (status, body) = Self::read_body(response).await?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(TransportError::Unauthorized);
        }
        if !status.is_success() {
            return Err(TransportError::Api {
                status: status.as_u16(),
                message: Self::error_message(&body),
            });
        }

        Ok(ApiResponse {
            status: status.as_u16(),
            body,
        })
    }

    async fn login(&self, username: &str, password: &str) -> Result<TokenGrant, TransportError> {
        let response = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await
            .map_err(map_send_error)?;
        let (status, body) = Self::read_body(response).await?;

        if !status.is_success() {
            return Err(TransportError::Api {
                status: status.as_u16(),
                message: Self::error_message(&body),
            });
        }

        let login: LoginResponse = serde_json::from_value(body)
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;
        Ok(TokenGrant {
            access_token: login.access_token,
            refresh_token: login.refresh_token,
            identity: login.user.map(|u| IdentitySnapshot {
                user_id: u.id,
                username: u.username,
                role: u.role,
            }),
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, TransportError> {
        let response = self
            .client
            .post(self.url("/api/auth/refresh"))
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(map_send_error)?;
        let (status, body) = Self::read_body(response).await?;

        if !status.is_success() {
            return Err(TransportError::Api {
                status: status.as_u16(),
                message: Self::error_message(&body),
            });
        }

        let grant: LoginResponse = serde_json::from_value(body)
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;
        Ok(TokenGrant {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            identity: grant.user.map(|u| IdentitySnapshot {
                user_id: u.id,
                username: u.username,
                role: u.role,
            }),
        })
    }
}
