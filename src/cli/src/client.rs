//! HTTP client for communicating with the Bastion API server.

use anyhow::{Context, Result};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// API response wrapper matching the server's ApiResponse format.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub error_code: Option<String>,
}

/// Error body rendered by the server for failed requests.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    error_code: Option<String>,
}

/// A request the server answered with an error.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{code}: {message} (HTTP {status})")]
    Rejected {
        status: StatusCode,
        code: String,
        message: String,
    },

    #[error("Not signed in; pass --token or run `bastion config set token <value>`")]
    MissingToken,

    #[error("API returned success but no data")]
    EmptyData,
}

impl ApiError {
    fn from_body(status: StatusCode, body: &str) -> Self {
        let parsed: Option<ErrorBody> = serde_json::from_str(body).ok();
        let (code, message) = match parsed {
            Some(ErrorBody { error, error_code }) => (
                error_code.unwrap_or_else(|| "UNKNOWN_ERROR".into()),
                error.unwrap_or_else(|| body.to_string()),
            ),
            None => ("UNKNOWN_ERROR".into(), body.to_string()),
        };
        Self::Rejected {
            status,
            code,
            message,
        }
    }
}

/// HTTP client for the Bastion API.
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client pointing at the given base URL.
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    /// Return the configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let token = self.token.as_deref().ok_or(ApiError::MissingToken)?;
        let url = format!("{}{}", self.base_url, path);
        Ok(self.client.request(method, url).bearer_auth(token))
    }

    async fn send(&self, builder: RequestBuilder, what: String) -> Result<Response> {
        let resp = builder
            .send()
            .await
            .with_context(|| format!("{} failed", what))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::from_body(status, &body).into());
        }
        Ok(resp)
    }

    async fn decode<T: DeserializeOwned>(resp: Response, what: &str) -> Result<T> {
        let api_resp: ApiResponse<T> = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", what))?;

        if api_resp.success {
            api_resp.data.ok_or_else(|| ApiError::EmptyData.into())
        } else {
            Err(ApiError::Rejected {
                status: StatusCode::OK,
                code: api_resp.error_code.unwrap_or_else(|| "UNKNOWN_ERROR".into()),
                message: api_resp.error.unwrap_or_else(|| "Unknown error".into()),
            }
            .into())
        }
    }

    /// Perform a GET request and deserialize the response data.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let what = format!("GET {}", path);
        let resp = self.send(self.request(Method::GET, path)?, what.clone()).await?;
        Self::decode(resp, &what).await
    }

    /// Send a JSON body with the given method and deserialize the response.
    pub async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let what = format!("{} {}", method, path);
        let builder = self.request(method, path)?.json(body);
        let resp = self.send(builder, what.clone()).await?;
        Self::decode(resp, &what).await
    }

    /// Perform a POST request with a JSON body and deserialize the response.
    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.send_json(Method::POST, path, body).await
    }

    /// Perform a DELETE request and deserialize the response.
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let what = format!("DELETE {}", path);
        let resp = self.send(self.request(Method::DELETE, path)?, what.clone()).await?;
        Self::decode(resp, &what).await
    }

    /// Perform a DELETE request that answers with an empty body.
    pub async fn delete_empty(&self, path: &str) -> Result<()> {
        let what = format!("DELETE {}", path);
        self.send(self.request(Method::DELETE, path)?, what).await?;
        Ok(())
    }

    /// Perform an unauthenticated GET request and return the full JSON value
    /// (for the health endpoint).
    pub async fn get_raw(&self, path: &str) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.send(self.client.get(&url), format!("GET {}", url)).await?;

        resp.json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_is_parsed() {
        let err = ApiError::from_body(
            StatusCode::FORBIDDEN,
            r#"{"success":false,"error":"Only superadmins can grant the superadmin role","error_code":"PRIVILEGE_ESCALATION_BLOCKED","numeric_code":4013}"#,
        );
        assert_eq!(
            err.to_string(),
            "PRIVILEGE_ESCALATION_BLOCKED: Only superadmins can grant the superadmin role (HTTP 403 Forbidden)"
        );
    }

    #[test]
    fn test_non_json_error_body_is_kept() {
        let err = ApiError::from_body(StatusCode::BAD_GATEWAY, "upstream down");
        match err {
            ApiError::Rejected { code, message, .. } => {
                assert_eq!(code, "UNKNOWN_ERROR");
                assert_eq!(message, "upstream down");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_requests_require_token() {
        let client = ApiClient::new("http://localhost:8080/", Some("  ".into())).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert!(client.request(Method::GET, "/api/v1/me").is_err());
    }
}
