pub mod cookie;
pub mod credentials;
pub mod endpoint;
pub mod error;
pub mod response;

pub use error::Error;

use cookie::CookieJar;
use error::map_api_err;
use reqwest::header::{COOKIE, USER_AGENT};
use reqwest::Response;
use std::time::Duration;

/// Upstream blocks default and automation user agents, so requests pose as the mobile app.
pub const APP_USER_AGENT: &str = "ShinePhone/8.1.17 (iPhone; iOS 15.6.1; Scale/2.00)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    /// Parameters sent as `application/x-www-form-urlencoded` body
    PostForm,
}

/// One replayable upstream call.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    /// Short name used in logs and error messages
    pub label: &'static str,
    pub endpoint: String,
    pub method: Method,
    pub params: Vec<(&'static str, String)>,
}

impl UpstreamRequest {
    pub fn get(label: &'static str, endpoint: &endpoint::Endpoint) -> Self {
        Self {
            label,
            endpoint: endpoint.to_string(),
            method: Method::Get,
            params: Vec::new(),
        }
    }

    pub fn post_form(label: &'static str, endpoint: &endpoint::Endpoint) -> Self {
        Self {
            method: Method::PostForm,
            ..Self::get(label, endpoint)
        }
    }

    pub fn param(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.params.push((name, value.into()));
        self
    }
}

/// HTTP client for the vendor API. Owns the cookie jar shared by every request.
#[derive(Debug)]
pub struct Client {
    api_url: String,
    http: reqwest::Client,
    jar: CookieJar,
}

impl Client {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, Error> {
        let http = reqwest::ClientBuilder::new()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_url: api_url.into(),
            http,
            jar: CookieJar::new(),
        })
    }

    /// Absolute endpoints pass through, relative ones are resolved against the API URL.
    pub fn url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!(
                "{}/{}",
                self.api_url.trim_end_matches('/'),
                endpoint.trim_start_matches('/')
            )
        }
    }

    /// Send `request` and capture cookies from the response. The body is left to the caller.
    pub async fn fetch(&mut self, request: &UpstreamRequest) -> Result<Response, Error> {
        let url = self.url(&request.endpoint);
        log::debug!("{}: {:?} {}", request.label, request.method, url);

        let builder = match request.method {
            Method::Get => self.http.get(&url).query(&request.params),
            Method::PostForm => self.http.post(&url).form(&request.params),
        }
        .header(USER_AGENT, APP_USER_AGENT);

        let builder = match self.jar.header() {
            Some(cookies) => builder.header(COOKIE, cookies),
            None => builder,
        };

        let response = builder.send().await.map_err(map_api_err)?;

        self.jar.capture(
            response
                .cookies()
                .map(|cookie| (cookie.name().to_string(), cookie.value().to_string())),
        );

        Ok(response)
    }

    /// Current `Cookie` header value
    pub fn cookies(&self) -> Option<String> {
        self.jar.header()
    }

    pub fn has_cookies(&self) -> bool {
        !self.jar.is_empty()
    }

    pub fn clear_cookies(&mut self) {
        self.jar.clear();
    }
}
