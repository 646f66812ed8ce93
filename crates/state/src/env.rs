use anyhow::Result;
use std::time::Duration;

const DEFAULT_CACHE_TTL_SECONDS: u64 = 300; // 5 minutes

/// Returns the tracker's REST base URL from `MANTIS_API_URL`.
///
/// Trailing slashes are stripped so endpoint paths can be appended
/// verbatim. Fails when the variable is unset or blank, since no request
/// can be addressed without it.
pub fn api_url() -> Result<String> {
    let raw = std::env::var("MANTIS_API_URL")
        .map_err(|_| anyhow::anyhow!("MANTIS_API_URL is not set"))?;
    let url = raw.trim().trim_end_matches('/').to_string();
    if url.is_empty() {
        anyhow::bail!("MANTIS_API_URL is empty");
    }
    Ok(url)
}

/// Returns the raw API key from `MANTIS_API_TOKEN`, if configured.
///
/// Requests go out without an `Authorization` header when this is absent;
/// the tracker then treats them as anonymous.
pub fn api_token() -> Option<String> {
    std::env::var("MANTIS_API_TOKEN")
        .ok()
        .filter(|s| !s.trim().is_empty())
}

/// Returns the `MANTIS_CACHE_ENABLED` setting (default: true).
///
/// Set to "0" or "false" to make every read-through call hit the tracker.
pub fn cache_enabled() -> bool {
    std::env::var("MANTIS_CACHE_ENABLED")
        .map(|s| s != "0" && !s.eq_ignore_ascii_case("false"))
        .unwrap_or(true)
}

/// Computes the general request-cache TTL from `MANTIS_CACHE_TTL_SECONDS`.
pub fn cache_ttl() -> Duration {
    let seconds = std::env::var("MANTIS_CACHE_TTL_SECONDS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_CACHE_TTL_SECONDS);
    Duration::from_secs(seconds)
}
