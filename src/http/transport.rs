// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP transport for the stateless send device.
//!
//! The device talks to the outside world through the narrow
//! [`HttpTransport`] trait; production uses [`ReqwestTransport`], tests
//! substitute a mock that scripts failures.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{NetworkErrorKind, TransportError};

/// Default request timeout for the production transport.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The HTTP methods the send device can fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpMethod {
    /// HTTP GET; params become the query string.
    Get,
    /// HTTP POST; params become the JSON body.
    Post,
    /// HTTP PUT; params become the JSON body.
    Put,
    /// HTTP DELETE; params become the query string.
    Delete,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// Response to a fired request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// The HTTP status code.
    pub status_code: u16,
    /// The raw response body.
    pub body: String,
}

impl HttpResponse {
    /// Returns `true` for a 2xx status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Protocol surface the send device's executor calls.
pub trait HttpTransport: Send + Sync + 'static {
    /// Fires one request and returns the response.
    ///
    /// `params` is a JSON value: for GET/DELETE it is appended to the URL
    /// as a query string, for POST/PUT it is sent as the JSON body. A null
    /// value means no parameters.
    fn http_request(
        &self,
        method: HttpMethod,
        url: &str,
        params: &serde_json::Value,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

impl<T: HttpTransport> HttpTransport for Arc<T> {
    async fn http_request(
        &self,
        method: HttpMethod,
        url: &str,
        params: &serde_json::Value,
    ) -> Result<HttpResponse, TransportError> {
        self.as_ref().http_request(method, url, params).await
    }
}

/// Production transport backed by [`reqwest`].
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Creates the transport with the default request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client cannot be constructed.
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(TransportError::Http)?;
        Ok(Self { client })
    }

    /// Appends `params` to `url` as an encoded query string.
    fn url_with_query(url: &str, params: &serde_json::Value) -> String {
        let Some(object) = params.as_object() else {
            return url.to_string();
        };
        if object.is_empty() {
            return url.to_string();
        }

        let query: Vec<String> = object
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                format!(
                    "{}={}",
                    urlencoding::encode(key),
                    urlencoding::encode(&value)
                )
            })
            .collect();

        let separator = if url.contains('?') { '&' } else { '?' };
        format!("{url}{separator}{}", query.join("&"))
    }
}

impl HttpTransport for ReqwestTransport {
    async fn http_request(
        &self,
        method: HttpMethod,
        url: &str,
        params: &serde_json::Value,
    ) -> Result<HttpResponse, TransportError> {
        let request = match method {
            HttpMethod::Get => self.client.get(Self::url_with_query(url, params)),
            HttpMethod::Delete => self.client.delete(Self::url_with_query(url, params)),
            HttpMethod::Post => {
                let builder = self.client.post(url);
                if params.is_null() {
                    builder
                } else {
                    builder.json(params)
                }
            }
            HttpMethod::Put => {
                let builder = self.client.put(url);
                if params.is_null() {
                    builder
                } else {
                    builder.json(params)
                }
            }
        };

        tracing::debug!(%method, url, "sending HTTP request");

        let response = request.send().await.map_err(classify_reqwest_error)?;
        let status_code = response.status().as_u16();
        let body = response.text().await.map_err(classify_reqwest_error)?;

        tracing::debug!(%method, url, status_code, "received HTTP response");

        Ok(HttpResponse { status_code, body })
    }
}

/// Maps reqwest failures onto the engine's network taxonomy, so the retry
/// policy can tell transient socket failures from everything else.
fn classify_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::Network {
            kind: NetworkErrorKind::Timeout,
            message: err.to_string(),
        };
    }
    if err.is_connect() {
        return TransportError::Network {
            kind: NetworkErrorKind::ConnectionRefused,
            message: err.to_string(),
        };
    }
    TransportError::Http(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_display_matches_wire_names() {
        assert_eq!(HttpMethod::Get.to_string(), "GET");
        assert_eq!(HttpMethod::Delete.to_string(), "DELETE");
    }

    #[test]
    fn query_string_from_object_params() {
        let url = ReqwestTransport::url_with_query(
            "http://host/api",
            &serde_json::json!({ "a": 1, "b": "x y" }),
        );
        assert_eq!(url, "http://host/api?a=1&b=x%20y");
    }

    #[test]
    fn query_string_appends_to_existing_query() {
        let url = ReqwestTransport::url_with_query(
            "http://host/api?fixed=1",
            &serde_json::json!({ "a": 2 }),
        );
        assert_eq!(url, "http://host/api?fixed=1&a=2");
    }

    #[test]
    fn null_params_leave_url_unchanged() {
        let url = ReqwestTransport::url_with_query("http://host/api", &serde_json::Value::Null);
        assert_eq!(url, "http://host/api");
    }

    #[test]
    fn response_success_range() {
        let ok = HttpResponse {
            status_code: 204,
            body: String::new(),
        };
        let bad = HttpResponse {
            status_code: 404,
            body: String::new(),
        };
        assert!(ok.is_success());
        assert!(!bad.is_success());
    }
}
