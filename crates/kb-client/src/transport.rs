//! The narrow `execute(request) -> RawResponse` seam between the catalog
//! client and the HTTP stack.

use std::str::FromStr;

use http::Method;
use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use tracing::debug;
use url::Url;

use crate::config::ClientConfig;
use crate::error::{ClientError, TransportError};

/// One HTTP request against the catalog.
#[derive(Debug, Clone)]
pub struct CatalogRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
}

impl CatalogRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    /// Replace any authorization already present with `value`.
    pub fn with_authorization(mut self, value: HeaderValue) -> Self {
        self.headers.insert(header::AUTHORIZATION, value);
        self
    }
}

/// A fully read response. Redirect statuses are returned as-is.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// The `Location` header, resolved against the request url.
    pub fn location(&self, request_url: &Url) -> Option<Url> {
        let location = self.headers.get(header::LOCATION)?.to_str().ok()?;
        request_url.join(location).ok()
    }
}

/// Executes one request and reads the whole response.
///
/// Implementations must not follow redirects: migration responses are data.
pub trait HttpExecutor: Send + Sync {
    fn execute(&self, request: &CatalogRequest) -> Result<RawResponse, TransportError>;
}

/// [`HttpExecutor`] backed by a blocking `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestExecutor {
    client: reqwest::blocking::Client,
}

impl ReqwestExecutor {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();

        // Extra headers are sent on every request, including authentication.
        for (key, value) in &config.extra_headers {
            headers.insert(
                HeaderName::from_str(key).map_err(|_| ClientError::InvalidHeader(key.clone()))?,
                HeaderValue::from_str(value)
                    .map_err(|_| ClientError::InvalidHeader(key.clone()))?,
            );
        }

        debug!(
            base_url = %config.base_url,
            extra_headers = config.extra_headers.len(),
            "building catalog HTTP client"
        );

        let client_builder = reqwest::blocking::Client::builder()
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(config.connect_timeout())
            .timeout(config.timeout());

        let client_builder = if let Some(ref user_agent) = config.user_agent {
            client_builder.user_agent(user_agent)
        } else {
            client_builder
        };

        let client = client_builder.build().map_err(ClientError::BuildClient)?;
        Ok(Self { client })
    }
}

impl HttpExecutor for ReqwestExecutor {
    fn execute(&self, request: &CatalogRequest) -> Result<RawResponse, TransportError> {
        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .send()
            .map_err(TransportError::Request)?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().map_err(TransportError::Body)?.to_vec();

        debug!(method = %request.method, url = %request.url, %status, "catalog response");

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}
