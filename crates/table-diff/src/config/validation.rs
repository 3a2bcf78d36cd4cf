//! Configuration validation.

use super::{CompareSettings, CrossDbConfig, DbTarget, QueryPairConfig};
use crate::error::{CompareError, Result};

/// Validate a database target, naming the offending field.
pub fn validate_db_target(target: &DbTarget, section: &str) -> Result<()> {
    if target.host.trim().is_empty() {
        return Err(CompareError::Config(format!("{section}.host is required")));
    }
    if target.database.trim().is_empty() {
        return Err(CompareError::Config(format!(
            "{section}.database is required"
        )));
    }
    if target.user.trim().is_empty() {
        return Err(CompareError::Config(format!("{section}.user is required")));
    }
    if let Some(0) = target.port {
        return Err(CompareError::Config(format!(
            "{section}.port must be non-zero"
        )));
    }
    Ok(())
}

/// Validate a same-connection comparison config.
pub fn validate_query_pair(config: &QueryPairConfig) -> Result<()> {
    validate_db_target(&config.connection, "connection")?;
    if config.source_query.trim().is_empty() {
        return Err(CompareError::Config("source_query is required".into()));
    }
    if config.target_query.trim().is_empty() {
        return Err(CompareError::Config("target_query is required".into()));
    }
    validate_settings(&config.compare)
}

/// Validate a cross-database comparison config.
pub fn validate_cross_db(config: &CrossDbConfig) -> Result<()> {
    validate_db_target(&config.source.target, "source")?;
    validate_db_target(&config.target.target, "target")?;
    if config.source.query.trim().is_empty() {
        return Err(CompareError::Config("source.query is required".into()));
    }
    if config.target.query.trim().is_empty() {
        return Err(CompareError::Config("target.query is required".into()));
    }
    validate_settings(&config.compare)
}

fn validate_settings(settings: &CompareSettings) -> Result<()> {
    validate_thresholds(&settings.thresholds)?;
    if let Some(0) = settings.timeout_secs {
        return Err(CompareError::Config(
            "compare.timeout_secs must be at least 1".into(),
        ));
    }
    Ok(())
}

/// Validate that every tolerance percentage is a finite, non-negative number.
pub fn validate_thresholds(
    thresholds: &std::collections::HashMap<String, f64>,
) -> Result<()> {
    for (column, pct) in thresholds {
        if !pct.is_finite() {
            return Err(CompareError::threshold(column, "must be a finite number"));
        }
        if *pct < 0.0 {
            return Err(CompareError::threshold(column, "must be non-negative"));
        }
    }
    Ok(())
}
