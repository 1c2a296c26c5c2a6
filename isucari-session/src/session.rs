//! Cookie-bearing HTTP session against the target application.

use crate::config::TargetUrls;
use isucari_core::constants::USER_AGENT;
use isucari_core::{md5_hex, Error, Result};
use reqwest::header::{CONTENT_TYPE, HOST};
use reqwest::{redirect, Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default per-request timeout.
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(10);

/// Error body returned by the target for rejected requests.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    /// Human readable reason
    #[serde(default)]
    pub error: String,
}

/// One simulated user.
///
/// Owns its cookie jar, so a session must never be used by two scenario
/// iterations at once.
#[derive(Debug)]
pub struct Session {
    /// Id of the logged-in user, 0 before `/settings` succeeded
    pub user_id: i64,
    pub(crate) csrf_token: String,
    client: Client,
    urls: Arc<TargetUrls>,
}

impl Session {
    /// Create a logged-out session.
    ///
    /// Redirects are not followed; a 3xx response is reported as a failure.
    ///
    /// # Errors
    /// Returns [`Error::Internal`] if the HTTP client cannot be built.
    pub fn new(urls: Arc<TargetUrls>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .redirect(redirect::Policy::none())
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::internal(format!("failed to build http client: {e}")))?;

        Ok(Self { user_id: 0, csrf_token: String::new(), client, urls })
    }

    /// Endpoints this session talks to.
    #[must_use]
    pub fn urls(&self) -> &TargetUrls {
        &self.urls
    }

    /// CSRF token from the last `/settings` call.
    #[must_use]
    pub fn csrf_token(&self) -> &str {
        &self.csrf_token
    }

    pub(crate) fn app_url(&self, path: &str) -> String {
        join(self.urls.app_url.as_str(), path)
    }

    pub(crate) fn get(&self, path: &str) -> RequestBuilder {
        self.client.get(self.app_url(path)).header(HOST, self.urls.target_host.as_str())
    }

    pub(crate) fn post(&self, path: &str) -> RequestBuilder {
        self.client.post(self.app_url(path)).header(HOST, self.urls.target_host.as_str())
    }

    pub(crate) fn post_json<T: serde::Serialize>(&self, path: &str, body: &T) -> Result<RequestBuilder> {
        let payload = serde_json::to_vec(body)?;
        Ok(self.post(path).header(CONTENT_TYPE, "application/json").body(payload))
    }

    /// Raw client for requests outside the target (simulators).
    pub(crate) const fn client(&self) -> &Client {
        &self.client
    }

    /// Send a request, classifying transport failures.
    pub(crate) async fn send(&self, label: &str, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(|e| transport_error(label, &e))?;
        debug!(label, status = %response.status(), "response");
        if response.status().is_redirection() {
            return Err(Error::application_with(
                format!("{label}: redirects are not allowed"),
                format!("status code: {}", response.status()),
            ));
        }
        Ok(response)
    }

    /// Fetch `path` on the target and return the md5 of the body.
    ///
    /// # Errors
    /// Returns an application failure on a non-200 response.
    pub async fn download_md5(&self, path: &str) -> Result<String> {
        let label = format!("GET {path}");
        let response = self.send(&label, self.get(path)).await?;
        let response = check_status(&label, response, StatusCode::OK).await?;
        let body = response.bytes().await.map_err(|e| body_error(&label, &e))?;
        Ok(md5_hex(&body))
    }
}

pub(crate) fn join(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

pub(crate) fn transport_error(label: &str, err: &reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::trivial(format!("{label}: request timed out"))
    } else {
        Error::application_with(format!("{label}: request failed"), err.to_string())
    }
}

pub(crate) fn body_error(label: &str, err: &reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::trivial(format!("{label}: request timed out"))
    } else {
        Error::application_with(format!("{label}: failed to read body"), err.to_string())
    }
}

/// Fail unless `response` has `expected` status.
pub(crate) async fn check_status(
    label: &str,
    response: Response,
    expected: StatusCode,
) -> Result<Response> {
    if response.status() == expected {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(Error::application_with(
        format!("{label}: got response status code {}; expected {}", status.as_u16(), expected.as_u16()),
        format!("status code: {}; body: {body}", status.as_u16()),
    ))
}

/// Decode a JSON body.
pub(crate) async fn decode<T: DeserializeOwned>(label: &str, response: Response) -> Result<T> {
    let body = response.bytes().await.map_err(|e| body_error(label, &e))?;
    serde_json::from_slice(&body).map_err(|e| {
        Error::application_with(format!("{label}: failed to decode JSON"), e.to_string())
    })
}

/// Expect `status` and an error body equal to `message` (when given).
pub(crate) async fn expect_rejection(
    label: &str,
    response: Response,
    status: StatusCode,
    message: Option<&str>,
) -> Result<()> {
    let response = check_status(label, response, status).await?;
    let body: ErrorBody = decode(label, response).await?;
    match message {
        Some(expected) if body.error != expected => Err(Error::application(format!(
            "{label}: expected error message: {expected}; actual: {}",
            body.error
        ))),
        _ => Ok(()),
    }
}
