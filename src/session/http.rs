//! reqwest-backed session

use super::auth::{Credentials, AUTH_TOKEN_HEADER};
use super::{RequestOptions, Response, Session};
use crate::config::CloudConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, Method};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Header carrying the client-generated global request id
pub const REQUEST_ID_HEADER: &str = "X-OpenStack-Request-ID";

/// Header selecting a microversion
pub const API_VERSION_HEADER: &str = "OpenStack-API-Version";

/// Sanitize response body for logging
/// Truncates long responses and drops non-printable characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Session talking to real endpoints
#[derive(Clone)]
pub struct HttpSession {
    client: Client,
    credentials: Credentials,
    endpoints: BTreeMap<String, String>,
    api_timeout: Option<Duration>,
    status_code_retries: u32,
    retry_delay: Duration,
}

impl HttpSession {
    /// Create a session for one cloud entry
    pub fn new(cloud: &CloudConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("stacksdk/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            credentials: Credentials::from_cloud(cloud),
            endpoints: cloud.endpoints.clone(),
            api_timeout: cloud.api_timeout(),
            status_code_retries: cloud.status_code_retries,
            retry_delay: cloud.retry_delay(),
        })
    }

    /// Turn a resource path into an absolute URL.
    /// Absolute URLs are used as they are.
    fn resolve_url(&self, url: &str, options: &RequestOptions) -> Result<Url> {
        let full = if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            let base = match (&options.endpoint_override, &options.service) {
                (Some(endpoint), _) => endpoint.as_str(),
                (None, Some(service)) => self
                    .endpoints
                    .get(service)
                    .map(|s| s.as_str())
                    .ok_or_else(|| {
                        Error::Config(format!("no endpoint configured for service '{}'", service))
                    })?,
                (None, None) => {
                    return Err(Error::InvalidRequest(format!(
                        "relative URL {} without a service or endpoint override",
                        url
                    )))
                },
            };
            format!("{}/{}", base.trim_end_matches('/'), url.trim_start_matches('/'))
        };

        Url::parse(&full).map_err(|e| Error::InvalidRequest(format!("bad URL {}: {}", full, e)))
    }

    fn build(&self, method: &Method, url: &Url, options: &RequestOptions, request_id: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .header(REQUEST_ID_HEADER, request_id);

        if let Some(token) = self.credentials.token() {
            request = request.header(AUTH_TOKEN_HEADER, token);
        }

        if let (Some(service), Some(version)) = (&options.service, &options.microversion) {
            request = request.header(API_VERSION_HEADER, format!("{} {}", service, version));
        }

        let has_accept = options
            .headers
            .keys()
            .any(|k| k.eq_ignore_ascii_case("accept"));
        if !has_accept {
            request = request.header("Accept", "application/json");
        }

        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        if !options.params.is_empty() {
            request = request.query(&options.params);
        }

        if let Some(ref body) = options.json {
            request = request.json(body);
        }

        if let Some(timeout) = self.api_timeout {
            request = request.timeout(timeout);
        }

        request
    }
}

#[async_trait]
impl Session for HttpSession {
    async fn request(
        &self,
        method: Method,
        url: &str,
        options: RequestOptions,
    ) -> Result<Response> {
        let full_url = self.resolve_url(url, &options)?;
        let request_id = format!("req-{}", uuid::Uuid::new_v4());
        let mut attempt = 0;

        loop {
            tracing::debug!("{} {}", method, full_url);

            let response = self
                .build(&method, &full_url, &options, &request_id)
                .send()
                .await?;

            let status = response.status();
            let headers: BTreeMap<String, String> = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
                })
                .collect();
            let body = response.text().await?;

            if !status.is_success() {
                if options.retriable_status_codes.contains(&status.as_u16())
                    && attempt < self.status_code_retries
                {
                    attempt += 1;
                    tracing::warn!(
                        "{} {} returned {}, retrying ({}/{})",
                        method,
                        full_url,
                        status,
                        attempt,
                        self.status_code_retries
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    continue;
                }

                // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
                tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
                return Err(Error::from_status(
                    method.as_str(),
                    full_url.as_str(),
                    status.as_u16(),
                    &body,
                    headers.get("x-openstack-request-id").cloned(),
                ));
            }

            tracing::debug!("{} {} -> {}", method, full_url, status);

            let json = if body.trim().is_empty() || method == Method::HEAD {
                None
            } else {
                Some(serde_json::from_str(&body)?)
            };

            return Ok(Response {
                status: status.as_u16(),
                headers,
                body: json,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> HttpSession {
        let mut cloud = CloudConfig::default();
        cloud
            .endpoints
            .insert("baremetal".into(), "http://ironic.local:6385/".into());
        HttpSession::new(&cloud).unwrap()
    }

    #[test]
    fn test_resolve_relative_url_against_service_endpoint() {
        let url = session()
            .resolve_url("/v1/nodes", &RequestOptions::for_service("baremetal"))
            .unwrap();
        assert_eq!(url.as_str(), "http://ironic.local:6385/v1/nodes");
    }

    #[test]
    fn test_endpoint_override_wins() {
        let options = RequestOptions {
            service: Some("baremetal".into()),
            endpoint_override: Some("http://other:1234".into()),
            ..Default::default()
        };
        let url = session().resolve_url("nodes", &options).unwrap();
        assert_eq!(url.as_str(), "http://other:1234/nodes");
    }

    #[test]
    fn test_unknown_service_is_config_error() {
        let err = session()
            .resolve_url("/volumes", &RequestOptions::for_service("volume"))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        let sanitized = sanitize_for_log(&body);
        assert!(sanitized.contains("[truncated, 500 bytes total]"));
    }
}
