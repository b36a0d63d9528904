//! Access checks for the REST API
//!
//! Two independent gates:
//! - chunk uploads must carry the shared upload password in their `password`
//!   form field, otherwise they are rejected with 403 before anything is stored;
//! - extracted artifacts can be restricted to an allow-list of origins, taken
//!   from the `Origin` header or, failing that, the `Referer` header.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use url::Url;

use crate::error::{Error, Result};

/// Check a submitted upload password against the configured one
///
/// Without a configured password every upload is rejected.
pub fn check_upload_password(expected: Option<&str>, provided: Option<&str>) -> Result<()> {
    let Some(expected) = expected else {
        return Err(Error::Auth(
            "uploads are disabled: no upload password configured".into(),
        ));
    };

    match provided {
        Some(provided) if constant_time_eq(provided.as_bytes(), expected.as_bytes()) => Ok(()),
        Some(_) => Err(Error::Auth("invalid upload password".into())),
        None => Err(Error::Auth("missing upload password".into())),
    }
}

/// Constant-time byte comparison to prevent timing side-channel attacks.
/// Always compares all bytes regardless of where the first mismatch occurs.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// Origins permitted to fetch extracted artifacts
///
/// An empty list disables gating; `"*"` admits any origin.
#[derive(Clone, Debug, Default)]
pub struct OriginAllowList {
    origins: Vec<String>,
    allow_any: bool,
}

impl OriginAllowList {
    /// Build from configured entries (`scheme://host[:port]`, trailing paths ignored)
    pub fn new(entries: &[String]) -> Self {
        let allow_any = entries.iter().any(|e| e.trim() == "*");
        let origins = entries.iter().filter_map(|e| normalize_origin(e)).collect();
        Self { origins, allow_any }
    }

    /// True when requests are actually checked
    pub fn is_enforced(&self) -> bool {
        !self.allow_any && !self.origins.is_empty()
    }

    /// Whether a request with these headers may proceed
    pub fn permits(&self, headers: &HeaderMap) -> bool {
        if !self.is_enforced() {
            return true;
        }

        let declared = headers
            .get(header::ORIGIN)
            .or_else(|| headers.get(header::REFERER))
            .and_then(|value| value.to_str().ok())
            .and_then(normalize_origin);

        match declared {
            Some(origin) => self.origins.contains(&origin),
            None => false,
        }
    }
}

/// `scheme://host[:port]` of a URL; `None` for opaque origins such as `null`
fn normalize_origin(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    let origin = url.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}

/// Middleware rejecting artifact requests from origins outside the allow-list
pub async fn require_allowed_origin(
    State(allow_list): State<Arc<OriginAllowList>>,
    request: Request,
    next: Next,
) -> Response {
    if allow_list.permits(request.headers()) {
        return next.run(request).await;
    }

    tracing::warn!(uri = %request.uri(), "rejecting artifact request from unlisted origin");
    Error::Auth("origin not allowed".into()).into_response()
}
