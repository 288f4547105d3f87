//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.ingest.max_batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "ingest.max_batch_size must be > 0".into(),
            ));
        }
        if self.ingest.parallel_workers == 0 {
            return Err(ConfigError::ValidationError(
                "ingest.parallel_workers must be > 0".into(),
            ));
        }
        if self.ingest.allowed_domains.is_empty() {
            return Err(ConfigError::ValidationError(
                "ingest.allowed_domains must not be empty".into(),
            ));
        }
        if !(1..=100).contains(&self.ingest.default_quality) {
            return Err(ConfigError::ValidationError(
                "ingest.default_quality must be between 1 and 100".into(),
            ));
        }
        if !(1..=4000).contains(&self.ingest.default_max_width)
            || !(1..=4000).contains(&self.ingest.default_max_height)
        {
            return Err(ConfigError::ValidationError(
                "ingest.default_max_width/default_max_height must be between 1 and 4000".into(),
            ));
        }
        if self.limits.fetch_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "limits.fetch_timeout_ms must be > 0".into(),
            ));
        }
        if self.limits.decode_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "limits.decode_timeout_ms must be > 0".into(),
            ));
        }
        if self.limits.max_file_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_file_size_mb must be > 0".into(),
            ));
        }
        if self.limits.max_total_size_mb < self.limits.max_file_size_mb {
            return Err(ConfigError::ValidationError(
                "limits.max_total_size_mb must be >= limits.max_file_size_mb".into(),
            ));
        }
        if self.limits.max_image_dimension == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_image_dimension must be > 0".into(),
            ));
        }
        if self.rate_limit.window_secs == 0 || self.rate_limit.max_requests == 0 {
            return Err(ConfigError::ValidationError(
                "rate_limit.window_secs and rate_limit.max_requests must be > 0".into(),
            ));
        }
        if self.sync.max_objects == 0 {
            return Err(ConfigError::ValidationError(
                "sync.max_objects must be > 0".into(),
            ));
        }
        if self.storage.bucket.is_empty() {
            return Err(ConfigError::ValidationError(
                "storage.bucket must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_passes_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = Config::default();
        config.ingest.parallel_workers = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("parallel_workers"));
    }

    #[test]
    fn test_validate_rejects_out_of_range_quality() {
        let mut config = Config::default();
        config.ingest.default_quality = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("default_quality"));
    }

    #[test]
    fn test_validate_rejects_total_below_item_ceiling() {
        let mut config = Config::default();
        config.limits.max_total_size_mb = 5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_total_size_mb"));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config::default();
        config.limits.fetch_timeout_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("fetch_timeout_ms"));
    }

    #[test]
    fn test_validate_rejects_empty_allow_list() {
        let mut config = Config::default();
        config.ingest.allowed_domains.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("allowed_domains"));
    }
}
