//! Shared utility functions used across multiple modules.

/// Longest remote error text kept in errors and logs
pub const ERROR_EXCERPT_CHARS: usize = 180;

/// Trim a setting or field value, treating blank input as absent.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Whether `url` names an `http` or `https` endpoint with a host part.
pub fn is_http_endpoint(url: &str) -> bool {
    url.trim()
        .split_once("://")
        .is_some_and(|(scheme, rest)| {
            (scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https"))
                && !rest.is_empty()
        })
}

/// One-line excerpt of a remote error body.
///
/// Whitespace runs (newlines from HTML error pages included) collapse to a
/// single space and the result is cut at [`ERROR_EXCERPT_CHARS`].
pub fn error_excerpt(body: &str) -> String {
    body.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(ERROR_EXCERPT_CHARS)
        .collect()
}

/// Current Unix timestamp in milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Parse an RFC 3339 timestamp into Unix milliseconds.
pub fn parse_timestamp_millis(value: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|date_time| date_time.timestamp_millis())
}
