//! Endpoint canonicalization and request URL construction.

use hazardmap_core::geo::BoundingBox;
use hazardmap_core::resolve::QueryFilters;

/// Error type for endpoint canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Canonicalize a configured endpoint.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Default scheme to https:// if missing
/// 3. Lowercase the host
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
pub fn canonicalize(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let url_str = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };

    let mut parsed = url::Url::parse(&url_str).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(host) = parsed.host_str() {
        let host = host.to_lowercase();
        parsed
            .set_host(Some(&host))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// `endpoint?...&bbox=minLon,minLat,maxLon,maxLat&<filters>`.
///
/// Query parameters already on the endpoint (API keys, formats) are kept.
pub fn request_url(endpoint: &url::Url, bounds: &BoundingBox, filters: &QueryFilters) -> url::Url {
    let mut url = endpoint.clone();
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("bbox", &bounds.to_query_param());
        for (key, value) in filters {
            pairs.append_pair(key, value);
        }
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_default_scheme() {
        let url = canonicalize("firms.example.org/api/hotspots").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("firms.example.org"));
    }

    #[test]
    fn test_canonicalize_lowercase_host_and_drop_fragment() {
        let url = canonicalize("  https://FIRMS.Example.org/api#top  ").unwrap();
        assert_eq!(url.as_str(), "https://firms.example.org/api");
    }

    #[test]
    fn test_canonicalize_rejects_bad_input() {
        assert!(matches!(canonicalize("   "), Err(UrlError::Empty)));
        assert!(matches!(canonicalize("file:///etc/passwd"), Err(UrlError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_request_url_appends_bbox_and_filters() {
        let endpoint = canonicalize("https://firms.example.org/api?key=abc").unwrap();
        let bounds = BoundingBox::new(49.0, -12.0, 62.0, 3.0).unwrap();
        let mut filters = QueryFilters::new();
        filters.insert("days".into(), "2".into());

        let url = request_url(&endpoint, &bounds, &filters);
        assert_eq!(url.as_str(), "https://firms.example.org/api?key=abc&bbox=-12%2C49%2C3%2C62&days=2");
    }
}
