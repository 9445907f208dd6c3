//! Blocking HTTP client bound to the application under test.
//!
//! Steps run synchronously on the test thread, so the client is the blocking
//! flavour of `reqwest`. It must never be created or dropped inside the
//! fixture's async runtime.

use std::fmt;
use std::time::Duration;

use reqwest::Method;
use reqwest::blocking::{Client, RequestBuilder};
use scenic::{IsolationKey, StepFailure, StepResult};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::FixtureError;

/// Header carrying the scenario's isolation key to the application.
pub const ISOLATION_HEADER: &str = "x-scenic-tenant";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Client for the live application, shared by every scenario in a session.
///
/// Cloning is cheap; clones share one connection pool.
#[derive(Clone)]
pub struct ServiceClient {
    http: Client,
    base_url: String,
}

impl ServiceClient {
    /// Client for the service listening at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::Client`] when the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, FixtureError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Ok(Self { http, base_url })
    }

    /// Base URL, without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for `path`.
    ///
    /// # Examples
    ///
    /// ```
    /// use scenic_fixture::ServiceClient;
    ///
    /// let client = ServiceClient::new("http://127.0.0.1:8080/").unwrap();
    /// assert_eq!(client.url("/events"), "http://127.0.0.1:8080/events");
    /// assert_eq!(client.url("events"), "http://127.0.0.1:8080/events");
    /// ```
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Start a request with an arbitrary method.
    #[must_use]
    pub fn request(&self, method: Method, path: &str) -> ServiceRequest {
        ServiceRequest {
            builder: self.http.request(method.clone(), self.url(path)),
            method,
            path: path.to_owned(),
        }
    }

    /// Start a `GET` request.
    #[must_use]
    pub fn get(&self, path: &str) -> ServiceRequest {
        self.request(Method::GET, path)
    }

    /// Start a `POST` request.
    #[must_use]
    pub fn post(&self, path: &str) -> ServiceRequest {
        self.request(Method::POST, path)
    }

    /// Start a `PUT` request.
    #[must_use]
    pub fn put(&self, path: &str) -> ServiceRequest {
        self.request(Method::PUT, path)
    }

    /// Start a `DELETE` request.
    #[must_use]
    pub fn delete(&self, path: &str) -> ServiceRequest {
        self.request(Method::DELETE, path)
    }

    /// Readiness probe: succeeds when `path` answers with a 2xx status.
    ///
    /// # Errors
    ///
    /// Returns a description of the connection error or unexpected status.
    pub fn probe(&self, path: &str) -> Result<(), String> {
        let response = self
            .http
            .get(self.url(path))
            .timeout(PROBE_TIMEOUT)
            .send()
            .map_err(|error| error.to_string())?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(format!("{path} answered {status}"))
        }
    }
}

impl fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// A request being assembled by a step.
#[derive(Debug)]
pub struct ServiceRequest {
    builder: RequestBuilder,
    method: Method,
    path: String,
}

impl ServiceRequest {
    /// Tag the request with the scenario's isolation key.
    #[must_use]
    pub fn isolated(mut self, key: &IsolationKey) -> Self {
        self.builder = self.builder.header(ISOLATION_HEADER, key.as_str());
        self
    }

    /// Send `body` as JSON.
    #[must_use]
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Self {
        self.builder = self.builder.json(body);
        self
    }

    /// Append query parameters.
    #[must_use]
    pub fn query<Q: Serialize + ?Sized>(mut self, query: &Q) -> Self {
        self.builder = self.builder.query(query);
        self
    }

    /// Send the request and read the whole body.
    ///
    /// Any HTTP status is a successful exchange; judging the status is the
    /// caller's job.
    ///
    /// # Errors
    ///
    /// Returns an infrastructure failure when the service cannot be reached
    /// or the body cannot be read.
    pub fn send(self) -> Result<ApiResponse, StepFailure> {
        let label = format!("{} {}", self.method, self.path);
        debug!(request = %label, "sending request");
        let response = self
            .builder
            .send()
            .map_err(|error| StepFailure::infrastructure_with(label.clone(), error))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .map_err(|error| StepFailure::infrastructure_with(label.clone(), error))?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        debug!(request = %label, status, "received response");
        Ok(ApiResponse { status, body })
    }
}

/// Status and body of a completed exchange.
///
/// Bodies that are not JSON are kept as a JSON string.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiResponse {
    status: u16,
    body: Value,
}

impl ApiResponse {
    /// Build a response directly, for step unit tests.
    #[must_use]
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// HTTP status code.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Parsed body.
    #[must_use]
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Return `true` for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Application error code from a `{"code": ...}` body.
    #[must_use]
    pub fn error_code(&self) -> Option<&str> {
        self.body.get("code").and_then(Value::as_str)
    }

    /// Fail unless the status equals `expected`.
    ///
    /// # Errors
    ///
    /// Returns an assertion failure naming both statuses.
    pub fn expect_status(&self, expected: u16) -> StepResult {
        if self.status == expected {
            Ok(())
        } else {
            Err(StepFailure::mismatch("status code", expected, self.status))
        }
    }

    /// Deserialize the body.
    ///
    /// # Errors
    ///
    /// Returns an assertion failure when the body does not have the expected
    /// shape.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, StepFailure> {
        T::deserialize(&self.body).map_err(|error| {
            StepFailure::assertion(format!(
                "response body is not a {}: {error}",
                std::any::type_name::<T>()
            ))
        })
    }
}
