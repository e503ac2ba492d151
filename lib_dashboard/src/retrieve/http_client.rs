//! # HTTP Client
//!
//! A thin asynchronous client around `reqwest` with retry middleware.
//! Relative paths are joined to a base URL, an optional bearer token is
//! attached to every request, and responses come back as an
//! [`ApiResponse`] whether or not the status was 2xx.
//!
//! Only `GET` goes through the retry middleware. Operator actions (`POST`)
//! are sent once, so a transient failure never applies them twice.

use std::time::Duration;

use anyhow::Context;
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

/// Response body and metadata of one request.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// Decoded body. `None` for non-2xx answers and for empty bodies
    /// (`204 No Content`, zero-length 200).
    pub data: Option<T>,
    /// Raw body of a non-2xx answer.
    pub error_body: Option<String>,
    pub status: u16,
    pub success: bool,
    pub headers: HeaderMap,
}

impl<T> ApiResponse<T> {
    /// Delay requested by a `Retry-After: <seconds>` header. The HTTP-date
    /// form is not interpreted.
    pub fn retry_after(&self) -> Option<Duration> {
        let value = self.headers.get(RETRY_AFTER)?.to_str().ok()?;
        value.trim().parse::<u64>().ok().map(Duration::from_secs)
    }
}

pub struct ApiClient {
    inner: ClientWithMiddleware,
    single_shot: ClientWithMiddleware,
    base_url: Url,
    auth_token: Option<String>,
}

impl ApiClient {
    /// Builds a client for `base_url`, which must be absolute. A missing
    /// trailing slash is added so that relative paths extend the base
    /// instead of replacing its last segment.
    pub fn new(base_url: &str, auth_token: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let mut normalized = base_url.to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        let base_url = Url::parse(&normalized)
            .with_context(|| format!("invalid API base URL '{}'", base_url))?;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("lib_dashboard/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let single_shot = ClientBuilder::new(http.clone()).build();
        let inner = ClientBuilder::new(http)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            inner,
            single_shot,
            base_url,
            auth_token,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn build(&self, method: Method, path: &str, query: &[(&str, String)]) -> anyhow::Result<RequestBuilder> {
        let url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .with_context(|| format!("cannot join '{}' to the base URL", path))?;

        let client = if method == Method::GET {
            &self.inner
        } else {
            &self.single_shot
        };
        let mut req = client.request(method, url).header(ACCEPT, "application/json");
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(token) = &self.auth_token {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        Ok(req)
    }

    async fn execute<T: DeserializeOwned>(&self, req: RequestBuilder) -> anyhow::Result<ApiResponse<T>> {
        let response: reqwest::Response = req.send().await?;
        let status = response.status();
        let headers = response.headers().clone();

        if !status.is_success() {
            let error_body = response.text().await.ok();
            return Ok(ApiResponse {
                data: None,
                error_body,
                status: status.as_u16(),
                success: false,
                headers,
            });
        }

        let data = if status == StatusCode::NO_CONTENT {
            None
        } else {
            let body = response.text().await?;
            if body.trim().is_empty() {
                None
            } else {
                Some(serde_json::from_str::<T>(&body).context("response body is not the expected JSON")?)
            }
        };

        Ok(ApiResponse {
            data,
            error_body: None,
            status: status.as_u16(),
            success: true,
            headers,
        })
    }

    /// Issues a request without a body and decodes a 2xx JSON answer into `T`.
    pub async fn request<T>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
    ) -> anyhow::Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
    {
        let req = self.build(method, path, query)?;
        self.execute(req).await
    }

    /// Issues a request with `body` encoded as JSON.
    pub async fn request_json<T, B>(&self, method: Method, path: &str, body: &B) -> anyhow::Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let payload = serde_json::to_vec(body).context("request body could not be encoded")?;
        let req = self
            .build(method, path, &[])?
            .header(CONTENT_TYPE, "application/json")
            .body(payload);
        self.execute(req).await
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> anyhow::Result<ApiResponse<T>> {
        self.request(Method::GET, path, query).await
    }

    pub async fn post<T: DeserializeOwned>(&self, path: &str) -> anyhow::Result<ApiResponse<T>> {
        self.request(Method::POST, path, &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gets_trailing_slash() {
        let client = ApiClient::new("http://localhost:8080/api", None, Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:8080/api/");
        assert_eq!(
            client.base_url().join("dashboard/stats").unwrap().as_str(),
            "http://localhost:8080/api/dashboard/stats"
        );
    }

    fn response_with(headers: &[(&'static str, &'static str)]) -> ApiResponse<()> {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.insert(*name, reqwest::header::HeaderValue::from_static(*value));
        }
        ApiResponse {
            data: None,
            error_body: None,
            status: 503,
            success: false,
            headers: map,
        }
    }

    #[test]
    fn retry_after_reads_delay_seconds() {
        assert_eq!(response_with(&[("retry-after", "120")]).retry_after(), Some(Duration::from_secs(120)));
        assert_eq!(response_with(&[("retry-after", "Wed, 21 Oct 2015 07:28:00 GMT")]).retry_after(), None);
        assert_eq!(response_with(&[]).retry_after(), None);
    }

    #[test]
    fn relative_base_url_is_an_error() {
        assert!(ApiClient::new("/only/a/path", None, Duration::from_secs(1)).is_err());
    }
}
