//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::cache::spatial::MAX_TTL_SECS;
use crate::config::AppConfig;
use crate::geo::geohash;
use crate::resolve::DataMode;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

fn check_timeout(field: &str, ms: u64) -> Result<(), ConfigError> {
    if ms < 100 {
        return Err(invalid(field, "must be at least 100ms"));
    }
    if ms > 300_000 {
        return Err(invalid(field, "must not exceed 5 minutes (300000ms)"));
    }
    Ok(())
}

fn check_url(field: &str, value: Option<&str>) -> Result<(), ConfigError> {
    let Some(raw) = value else {
        return Ok(());
    };
    let parsed = url::Url::parse(raw).map_err(|e| invalid(field, e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(field, format!("unsupported scheme: {}", parsed.scheme())));
    }
    Ok(())
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - a timeout is under 100ms or over 5 minutes
    /// - `cache_precision` is outside 1..=12 or `cache_max_entries` / `cache_ttl_secs` is 0
    /// - `cache_ttl_secs` exceeds 30 days
    /// - `user_agent` is empty
    /// - the clustering settings are out of range
    /// - a remote URL is not http(s)
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_timeout("primary_timeout_ms", self.primary_timeout_ms)?;
        check_timeout("secondary_timeout_ms", self.secondary_timeout_ms)?;

        if !(geohash::MIN_PRECISION..=geohash::MAX_PRECISION).contains(&self.cache_precision) {
            return Err(invalid("cache_precision", "must be between 1 and 12"));
        }
        if self.cache_max_entries == 0 {
            return Err(invalid("cache_max_entries", "must be greater than 0"));
        }
        if self.cache_ttl_secs == 0 {
            return Err(invalid("cache_ttl_secs", "must be greater than 0"));
        }
        if self.cache_ttl_secs > MAX_TTL_SECS as u64 {
            return Err(invalid("cache_ttl_secs", format!("must not exceed 30 days ({MAX_TTL_SECS}s)")));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if !(self.cluster_radius_px.is_finite() && self.cluster_radius_px > 0.0) {
            return Err(invalid("cluster_radius_px", "must be a positive number"));
        }
        if !(0.0..=crate::cluster::MAX_ZOOM).contains(&self.max_cluster_zoom) {
            return Err(invalid("max_cluster_zoom", "must be between 0 and 22"));
        }
        if !(self.zoom_hysteresis.is_finite() && self.zoom_hysteresis >= 0.0) {
            return Err(invalid("zoom_hysteresis", "must not be negative"));
        }

        check_url("primary_url", self.primary_url.as_deref())?;
        check_url("secondary_url", self.secondary_url.as_deref())?;

        if self.primary_url.is_none() && self.secondary_url.is_none() && self.mode != DataMode::Demo {
            tracing::warn!(mode = %self.mode, "No remote hotspot tier configured; only cached or demo data will be served");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(result: Result<(), ConfigError>) -> String {
        match result {
            Err(ConfigError::Invalid { field, .. }) => field,
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_timeout_too_small() {
        let config = AppConfig { primary_timeout_ms: 50, ..Default::default() };
        assert_eq!(field_of(config.validate()), "primary_timeout_ms");
    }

    #[test]
    fn test_validate_timeout_exceeds_limit() {
        let config = AppConfig { secondary_timeout_ms: 301_000, ..Default::default() };
        assert_eq!(field_of(config.validate()), "secondary_timeout_ms");
    }

    #[test]
    fn test_validate_cache_precision() {
        let config = AppConfig { cache_precision: 0, ..Default::default() };
        assert_eq!(field_of(config.validate()), "cache_precision");
        let config = AppConfig { cache_precision: 13, ..Default::default() };
        assert_eq!(field_of(config.validate()), "cache_precision");
    }

    #[test]
    fn test_validate_cache_bounds() {
        let config = AppConfig { cache_max_entries: 0, ..Default::default() };
        assert_eq!(field_of(config.validate()), "cache_max_entries");
        let config = AppConfig { cache_ttl_secs: 0, ..Default::default() };
        assert_eq!(field_of(config.validate()), "cache_ttl_secs");
    }

    #[test]
    fn test_validate_cache_ttl_upper_bound() {
        let config = AppConfig { cache_ttl_secs: MAX_TTL_SECS as u64, ..Default::default() };
        assert!(config.validate().is_ok());

        for secs in [MAX_TTL_SECS as u64 + 1, 300_000_000_000, u64::MAX] {
            let config = AppConfig { cache_ttl_secs: secs, ..Default::default() };
            assert_eq!(field_of(config.validate()), "cache_ttl_secs");
        }
    }

    #[test]
    fn test_validate_empty_user_agent() {
        let config = AppConfig { user_agent: String::new(), ..Default::default() };
        assert_eq!(field_of(config.validate()), "user_agent");
    }

    #[test]
    fn test_validate_cluster_settings() {
        let config = AppConfig { cluster_radius_px: 0.0, ..Default::default() };
        assert_eq!(field_of(config.validate()), "cluster_radius_px");
        let config = AppConfig { max_cluster_zoom: 23.0, ..Default::default() };
        assert_eq!(field_of(config.validate()), "max_cluster_zoom");
        let config = AppConfig { zoom_hysteresis: -0.1, ..Default::default() };
        assert_eq!(field_of(config.validate()), "zoom_hysteresis");
    }

    #[test]
    fn test_validate_urls() {
        let config = AppConfig { primary_url: Some("ftp://example.com/data".into()), ..Default::default() };
        assert_eq!(field_of(config.validate()), "primary_url");
        let config = AppConfig { secondary_url: Some("not a url".into()), ..Default::default() };
        assert_eq!(field_of(config.validate()), "secondary_url");
        let config = AppConfig { primary_url: Some("https://example.com/firms".into()), ..Default::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_edge_case_values() {
        let config = AppConfig {
            primary_timeout_ms: 100,
            secondary_timeout_ms: 300_000,
            cache_precision: 12,
            zoom_hysteresis: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
