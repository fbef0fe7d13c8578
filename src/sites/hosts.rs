//! Hostname and url normalization shared by site tracking, classification
//! and the blocking gate.

use url::Url;

use crate::error::{TrackerError, TrackerResult};

/// Lowercased host of `raw` without a leading `www.`, or None for urls that
/// have no host (`about:blank`, `chrome://` pages and the like).
pub fn host_of(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw.trim()).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    parsed.host_str().map(strip_www)
}

fn strip_www(host: &str) -> String {
    let lowered = host.to_ascii_lowercase();
    match lowered.strip_prefix("www.") {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => lowered,
    }
}

/// Accepts `x.com`, `www.x.com` or a full url and returns the bare host.
pub fn normalize_site(input: &str) -> TrackerResult<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(TrackerError::invalid("site is empty"));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let host = host_of(&candidate)
        .ok_or_else(|| TrackerError::invalid(format!("{trimmed:?} is not a valid site")))?;

    if !host.contains('.') && host != "localhost" {
        return Err(TrackerError::invalid(format!(
            "{trimmed:?} is not a valid site"
        )));
    }

    Ok(host)
}

/// Canonical form of a page url used as a rule and cache key: parsed,
/// fragment dropped.
pub fn normalize_page_url(raw: &str) -> TrackerResult<String> {
    let mut parsed = Url::parse(raw.trim())
        .map_err(|err| TrackerError::invalid(format!("{raw:?} is not a valid url: {err}")))?;
    if parsed.host_str().is_none() {
        return Err(TrackerError::invalid(format!("{raw:?} has no host")));
    }
    parsed.set_fragment(None);
    Ok(parsed.to_string())
}

/// Rule and cache key for a page; urls that do not parse are keyed as given.
pub fn page_key(raw: &str) -> String {
    normalize_page_url(raw).unwrap_or_else(|_| raw.trim().to_string())
}

/// `host` is `site` or one of its subdomains.
pub fn site_matches(host: &str, site: &str) -> bool {
    host == site
        || host
            .strip_suffix(site)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

pub fn tracked_site_for<'a>(host: &str, sites: &'a [String]) -> Option<&'a str> {
    sites
        .iter()
        .map(String::as_str)
        .find(|site| site_matches(host, site))
}

/// Host named by a granted origin, which may be a bare host, an origin
/// (`https://a.com`) or a match pattern (`*://*.a.com/*`).
pub fn origin_host(origin: &str) -> Option<String> {
    let trimmed = origin.trim();
    if is_wildcard_origin(trimmed) {
        return None;
    }
    let without_scheme = match trimmed.split_once("://") {
        Some((_, rest)) => rest,
        None => trimmed,
    };
    let authority = without_scheme.split('/').next().unwrap_or_default();
    let host = authority
        .trim_start_matches("*.")
        .split(':')
        .next()
        .unwrap_or_default();

    if host.is_empty() || host == "*" {
        return None;
    }
    Some(strip_www(host))
}

/// Origins that grant access to every host.
pub fn is_wildcard_origin(origin: &str) -> bool {
    matches!(
        origin.trim(),
        "<all_urls>" | "*://*/*" | "http://*/*" | "https://*/*"
    )
}
