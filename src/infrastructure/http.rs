//! Blocking JSON client shared by the production and storefront adapters.
//!
//! Callers run on the blocking thread pool (`web::block`), never on an
//! actix worker, so the blocking reqwest client is safe here.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::domain::errors::{DomainError, ExternalApiError};

/// Upper bound on how much of an error body ends up in messages and logs.
const MAX_ERROR_BODY: usize = 500;

#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub connect: Duration,
    /// Deadline for the whole exchange, from connecting until the response
    /// body has been read.
    pub request: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            request: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeouts: Timeouts) -> Result<Self, DomainError> {
        let client = Client::builder()
            .connect_timeout(timeouts.connect)
            .timeout(timeouts.request)
            .build()
            .map_err(|e| DomainError::Internal(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Same connection pool, different base URL.
    pub fn with_base_url(&self, base_url: impl Into<String>) -> Self {
        Self {
            client: self.client.clone(),
            base_url: base_url.into(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn get(&self, path: &str) -> RequestBuilder {
        self.client.get(self.url(path))
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.client.post(self.url(path))
    }

    pub fn delete(&self, path: &str) -> RequestBuilder {
        self.client.delete(self.url(path))
    }
}

/// Send and decode a JSON response, classifying every failure.
pub fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ExternalApiError> {
    let response = send(request)?;
    let status = response.status().as_u16();
    response
        .json()
        .map_err(|e| {
            ExternalApiError::from_status(status, format!("unreadable response body: {e}"))
        })
}

/// Send, keeping only the status check. Bodies of 2xx responses are ignored.
pub fn send_empty(request: RequestBuilder) -> Result<(), ExternalApiError> {
    send(request).map(|_| ())
}

fn send(request: RequestBuilder) -> Result<Response, ExternalApiError> {
    let response = request.send().map_err(transport_error)?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(ExternalApiError::from_status(status.as_u16(), error_message(&body)))
}

pub fn transport_error(e: reqwest::Error) -> ExternalApiError {
    if e.is_timeout() {
        ExternalApiError::Timeout
    } else {
        ExternalApiError::Transport(e.to_string())
    }
}

/// Pull a human readable message out of an error body.
///
/// Understands `{"error": ..}`, `{"message": ..}` and `{"errors": ..}` in
/// their string, object and list shapes; anything else is returned raw.
pub fn error_message(body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return "empty response body".to_string();
    }
    let parsed = serde_json::from_str::<Value>(body).ok();
    let found = parsed.as_ref().and_then(|v| {
        ["error", "message", "errors"]
            .iter()
            .find_map(|key| v.get(key))
            .and_then(flatten)
    });
    let message = found.unwrap_or_else(|| body.to_string());
    truncate(message)
}

fn flatten(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(flatten).collect();
            (!parts.is_empty()).then(|| parts.join("; "))
        }
        Value::Object(map) => match map.get("message") {
            Some(message) => flatten(message),
            None => {
                let parts: Vec<String> = map
                    .iter()
                    .filter_map(|(k, v)| flatten(v).map(|m| format!("{k}: {m}")))
                    .collect();
                (!parts.is_empty()).then(|| parts.join("; "))
            }
        },
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn truncate(mut message: String) -> String {
    if message.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
        message.push('…');
    }
    message
}

/// Storefront variant of the classification: rejected credentials become
/// a typed authentication error instead of a client error.
pub fn platform_error(e: ExternalApiError) -> DomainError {
    match e {
        ExternalApiError::Client {
            status: 401 | 403,
            message,
        } => DomainError::Authentication(message),
        other => DomainError::ExternalApi(other),
    }
}
