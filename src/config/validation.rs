use crate::config::types::{
    CheckpointBackend, CheckpointConfig, Config, CrawlConfig, SiteConfig, StorageConfig,
    TransportConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_site_config(&config.site)?;
    validate_transport_config(&config.transport)?;
    validate_crawl_config(&config.crawl)?;
    validate_storage_config(&config.storage)?;
    validate_checkpoint_config(&config.checkpoint)?;
    Ok(())
}

/// Validates site addressing
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    validate_http_url("base-url", &config.base_url)?;
    validate_http_url("api-base", &config.api_base)?;

    if config.listing_path.trim_matches('/').is_empty() {
        return Err(ConfigError::Validation(
            "listing-path cannot be empty".to_string(),
        ));
    }

    if config.source.is_empty() {
        return Err(ConfigError::Validation("source cannot be empty".to_string()));
    }

    Ok(())
}

/// Validates transport configuration
fn validate_transport_config(config: &TransportConfig) -> Result<(), ConfigError> {
    if config.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max-retries must be between 0 and 10, got {}",
            config.max_retries
        )));
    }

    if let Some(user_agent) = &config.user_agent {
        if user_agent.trim().is_empty() {
            return Err(ConfigError::Validation(
                "user-agent cannot be blank when set".to_string(),
            ));
        }
    }

    if let Some(proxy) = &config.proxy {
        if !proxy.url.contains("{session}") {
            return Err(ConfigError::Validation(format!(
                "proxy url must contain a {{session}} placeholder, got '{}'",
                proxy.url
            )));
        }
        Url::parse(&proxy.url.replace("{session}", "probe"))
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy url: {}", e)))?;
    }

    Ok(())
}

/// Validates orchestrator settings
fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    if config.max_api_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max-api-pages must be >= 1, got {}",
            config.max_api_pages
        )));
    }

    if config.max_price == Some(0) {
        return Err(ConfigError::Validation(
            "max-price must be positive when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates storage configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates checkpoint configuration
fn validate_checkpoint_config(config: &CheckpointConfig) -> Result<(), ConfigError> {
    if config.backend == CheckpointBackend::File && config.path.is_empty() {
        return Err(ConfigError::Validation(
            "checkpoint path cannot be empty for the file backend".to_string(),
        ));
    }
    Ok(())
}

/// Requires an absolute http(s) URL
fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, value, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Validation(format!(
            "{} '{}' must use http or https",
            field, value
        )));
    }

    Ok(())
}
