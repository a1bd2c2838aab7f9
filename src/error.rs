//! Error types
//!
//! Every fallible operation in the crate returns [`Result`]. Local
//! precondition failures (unsupported operation, invalid request, duplicate
//! match) are raised before any I/O and are never retried.

use std::fmt;

/// Result alias used across the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Metadata of a failed HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    pub method: String,
    pub url: String,
    pub status: u16,
    /// Server-provided message, extracted from the error body when possible
    pub message: String,
    pub request_id: Option<String>,
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} returned {}", self.method, self.url, self.status)?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(ref request_id) = self.request_id {
            write!(f, " (request id {})", request_id)?;
        }
        Ok(())
    }
}

/// Errors raised by sessions, resources, proxies and wait loops
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{method} is not supported for {resource}")]
    MethodNotSupported {
        resource: &'static str,
        method: &'static str,
    },

    #[error("Not found: {0}")]
    NotFound(HttpError),

    #[error("{message}")]
    ResourceNotFound {
        message: String,
        details: Option<HttpError>,
    },

    #[error("More than one {resource} exists with the name or id '{query}'")]
    DuplicateResource {
        resource: &'static str,
        query: String,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("{0}")]
    ResourceFailure(String),

    #[error("{0}")]
    ResourceTimeout(String),

    #[error("HTTP error: {0}")]
    Http(HttpError),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Build the transport-level error for a non-success status
    pub fn from_status(
        method: &str,
        url: &str,
        status: u16,
        body: &str,
        request_id: Option<String>,
    ) -> Self {
        let details = HttpError {
            method: method.to_string(),
            url: url.to_string(),
            status,
            message: extract_error_message(body),
            request_id,
        };
        if status == 404 {
            Error::NotFound(details)
        } else {
            Error::Http(details)
        }
    }

    /// True for both the transport and the translated not-found kinds
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::ResourceNotFound { .. })
    }

    /// HTTP metadata attached to the error, if any
    pub fn http_details(&self) -> Option<&HttpError> {
        match self {
            Error::NotFound(details) | Error::Http(details) => Some(details),
            Error::ResourceNotFound { details, .. } => details.as_ref(),
            _ => None,
        }
    }

    /// Status code of the failed exchange, if any
    pub fn status_code(&self) -> Option<u16> {
        self.http_details().map(|d| d.status)
    }
}

/// Pull a human-readable message out of the usual error envelopes:
/// `{"error_message": ...}`, `{"<kind>": {"message": ...}}`, `{"message": ...}`,
/// `{"error": {"message": ...}}`, `{"faultstring": ...}`.
fn extract_error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.chars().take(200).collect();
    };

    // Ironic double-encodes its error body
    if let Some(inner) = value.get("error_message").and_then(|v| v.as_str()) {
        return match serde_json::from_str::<serde_json::Value>(inner) {
            Ok(parsed) => parsed
                .get("faultstring")
                .and_then(|v| v.as_str())
                .unwrap_or(inner)
                .to_string(),
            Err(_) => inner.to_string(),
        };
    }

    for key in ["message", "faultstring", "error_msg"] {
        if let Some(msg) = value.get(key).and_then(|v| v.as_str()) {
            return msg.to_string();
        }
    }

    if let Some(obj) = value.as_object() {
        for nested in obj.values() {
            if let Some(msg) = nested.get("message").and_then(|v| v.as_str()) {
                return msg.to_string();
            }
        }
    }

    String::new()
}

/// Format an error for display on a terminal.
/// Long messages are truncated and non-printable characters dropped.
pub fn format_api_error(error: &Error) -> String {
    let short = match error.status_code() {
        Some(401) => Some("Authentication failed. Check the token for this cloud."),
        Some(403) => Some("Permission denied."),
        Some(409) => Some("Resource conflict. The resource may be locked or in use."),
        Some(429) => Some("Rate limit exceeded. Please try again later."),
        Some(500) | Some(503) => Some("Service temporarily unavailable. Please try again."),
        _ => None,
    };
    if let Some(short) = short {
        return short.to_string();
    }

    let error_str = error.to_string();
    let sanitized = error_str
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .take(160)
        .collect::<String>();

    if sanitized.len() < error_str.len() {
        format!("{}...", sanitized)
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_maps_404_to_not_found() {
        let err = Error::from_status("GET", "/nodes/x", 404, r#"{"message": "gone"}"#, None);
        assert!(matches!(err, Error::NotFound(_)));
        assert!(err.is_not_found());
        assert_eq!(err.status_code(), Some(404));
    }

    #[test]
    fn test_from_status_other_codes_are_http_errors() {
        let err = Error::from_status("PUT", "/nodes/x", 409, "locked", Some("req-1".into()));
        assert!(!err.is_not_found());
        let details = err.http_details().unwrap();
        assert_eq!(details.message, "locked");
        assert_eq!(details.request_id.as_deref(), Some("req-1"));
    }

    #[test]
    fn test_extract_ironic_error_message() {
        let body = r#"{"error_message": "{\"faultstring\": \"Node x is locked\", \"debuginfo\": null}"}"#;
        assert_eq!(extract_error_message(body), "Node x is locked");
    }

    #[test]
    fn test_extract_nested_error_message() {
        let body = r#"{"itemNotFound": {"message": "Volume could not be found", "code": 404}}"#;
        assert_eq!(extract_error_message(body), "Volume could not be found");
    }

    #[test]
    fn test_format_api_error_uses_short_messages() {
        let err = Error::from_status("GET", "/x", 403, "", None);
        assert_eq!(format_api_error(&err), "Permission denied.");

        let err = Error::InvalidRequest("missing id".into());
        assert_eq!(format_api_error(&err), "Invalid request: missing id");
    }
}
