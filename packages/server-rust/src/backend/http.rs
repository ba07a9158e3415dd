//! Shared plumbing for the HTTP backend adapters.

use netplane_core::{ErrorKind, ServiceError, ServiceResult};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

/// Maps a non-success HTTP status to the service error taxonomy.
#[must_use]
pub fn status_error(status: StatusCode, context: &str, body: &str) -> ServiceError {
    let kind = match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ErrorKind::InvalidArgument,
        StatusCode::NOT_FOUND => ErrorKind::NotFound,
        StatusCode::CONFLICT => ErrorKind::AlreadyExists,
        StatusCode::NOT_IMPLEMENTED => ErrorKind::Unimplemented,
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT => {
            ErrorKind::Unavailable
        }
        _ => ErrorKind::Internal,
    };
    let body = body.trim();
    if body.is_empty() {
        ServiceError::new(kind, format!("{context} returned {status}"))
    } else {
        ServiceError::new(kind, format!("{context} returned {status}: {body}"))
    }
}

/// Transport failures: refused or timed-out connections are transient.
#[must_use]
pub fn transport_error(err: &reqwest::Error, context: &str) -> ServiceError {
    if err.is_connect() || err.is_timeout() {
        ServiceError::unavailable(format!("{context}: {err}"))
    } else {
        ServiceError::internal(format!("{context}: {err}"))
    }
}

async fn checked(request: RequestBuilder, context: &str) -> ServiceResult<reqwest::Response> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(&e, context))?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, context, &body))
}

/// Sends `request` and decodes a JSON answer.
///
/// # Errors
///
/// Transport failures, non-success statuses, and undecodable bodies.
pub async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
    context: &str,
) -> ServiceResult<T> {
    checked(request, context)
        .await?
        .json::<T>()
        .await
        .map_err(|e| ServiceError::internal(format!("{context}: undecodable answer: {e}")))
}

/// Sends `request`, discarding the body of a successful answer.
///
/// # Errors
///
/// Transport failures and non-success statuses.
pub async fn send_empty(request: RequestBuilder, context: &str) -> ServiceResult<()> {
    checked(request, context).await.map(|_| ())
}

/// Joins `path` onto `base`, treating `base` as a directory.
///
/// # Errors
///
/// `InvalidArgument` when the result is not a valid URL.
pub fn endpoint(base: &reqwest::Url, path: &str) -> ServiceResult<reqwest::Url> {
    base.join(path.trim_start_matches('/'))
        .map_err(|e| ServiceError::invalid_argument(format!("invalid path {path}: {e}")))
}

/// Appends `segments` to `base`, percent-encoding each one.
///
/// Identifiers go through here so a `/`, `?` or `#` inside one cannot
/// change the resource addressed. Bare `.` and `..` segments are dropped.
///
/// # Errors
///
/// `InvalidArgument` when `base` cannot carry a path.
pub fn endpoint_segments(base: &reqwest::Url, segments: &[&str]) -> ServiceResult<reqwest::Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| ServiceError::invalid_argument(format!("{base} cannot be a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Parses a configured base URL, appending the trailing slash `join` needs.
///
/// # Errors
///
/// `InvalidArgument` when `raw` is not an absolute URL.
pub fn parse_base_url(raw: &str) -> ServiceResult<reqwest::Url> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    reqwest::Url::parse(&normalized)
        .map_err(|e| ServiceError::invalid_argument(format!("invalid base url {raw}: {e}")))
}
