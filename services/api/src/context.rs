//! Request id propagation and uploader identity.
//!
//! Identity is established upstream by the auth proxy, which forwards the
//! caller as `X-User-Email` / `X-User-Id`. This service only checks that a
//! caller is present and, when an allowlist is configured, on it.

use crate::error::ApiError;
use crate::state::AppState;
use axum::async_trait;
use axum::body::Body;
use axum::extract::FromRequestParts;
use axum::http::header::HeaderName;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use ingest::Uploader;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_ID_HEADER: &str = "x-user-id";

/// Request id for the current request, taken from `X-Request-Id` or generated.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Injects [`RequestId`] and echoes it on the response.
pub async fn request_id_middleware(mut req: Request<Body>, next: Next) -> Response {
    let request_id =
        header_string(req.headers(), REQUEST_ID_HEADER).unwrap_or_else(|| Uuid::new_v4().to_string());
    req.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

/// Who may upload. Empty lists admit every authenticated caller.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    emails: HashSet<String>,
    subjects: HashSet<String>,
}

impl AccessPolicy {
    pub fn new(emails: impl IntoIterator<Item = String>, subjects: impl IntoIterator<Item = String>) -> Self {
        Self {
            emails: emails.into_iter().map(|e| e.to_lowercase()).collect(),
            subjects: subjects.into_iter().collect(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.emails.is_empty() && self.subjects.is_empty()
    }

    pub fn allows(&self, uploader: &Uploader) -> bool {
        if self.is_open() {
            return true;
        }
        let by_email = uploader
            .email
            .as_ref()
            .is_some_and(|e| self.emails.contains(&e.to_lowercase()));
        let by_subject = uploader
            .subject
            .as_ref()
            .is_some_and(|s| self.subjects.contains(s));
        by_email || by_subject
    }
}

/// An authenticated and authorized admin caller.
#[derive(Debug, Clone, Serialize)]
pub struct Admin(pub Uploader);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Admin {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let uploader = Uploader::new(
            header_string(&parts.headers, USER_ID_HEADER),
            header_string(&parts.headers, USER_EMAIL_HEADER),
        );
        if uploader.is_anonymous() {
            return Err(ApiError::Unauthorized("Not signed in".to_string()));
        }
        if !state.policy.allows(&uploader) {
            return Err(ApiError::Forbidden("Not authorized".to_string()));
        }
        Ok(Admin(uploader))
    }
}
