//! Request token lookup.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;

/// Find the token a request presents.
///
/// Checked in order: the path segment, the `token` query parameter, then
/// the `Authorization` header with an optional `Bearer ` prefix.
pub fn resolve<'a>(
    path: Option<&'a str>,
    query: Option<&'a str>,
    headers: &'a HeaderMap,
) -> Option<&'a str> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).trim());

    [path, query, header]
        .into_iter()
        .flatten()
        .find(|t| !t.is_empty())
}
