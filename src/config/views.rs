//! Per-view-type batching configuration.

use serde::Deserialize;

use super::ConfigError;

/// Default number of points applied between commits.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Batch size override for one view type.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ViewBatchConfig {
    pub view_type: String,
    pub batch_size: usize,
}

/// Batching configuration for views.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ViewsConfig {
    /// Batch size for view types without an override.
    pub default_batch_size: usize,
    /// Per-view-type batch sizes.
    pub overrides: Vec<ViewBatchConfig>,
}

impl Default for ViewsConfig {
    fn default() -> Self {
        Self {
            default_batch_size: DEFAULT_BATCH_SIZE,
            overrides: Vec::new(),
        }
    }
}

impl ViewsConfig {
    /// Number of points a view of `view_type` applies between commits.
    pub fn batch_size(&self, view_type: &str) -> usize {
        self.overrides
            .iter()
            .find(|o| o.view_type == view_type)
            .map(|o| o.batch_size)
            .unwrap_or(self.default_batch_size)
    }

    /// Set the batch size for a view type.
    pub fn with_batch_size(mut self, view_type: impl Into<String>, batch_size: usize) -> Self {
        let view_type = view_type.into();
        self.overrides.retain(|o| o.view_type != view_type);
        self.overrides.push(ViewBatchConfig {
            view_type,
            batch_size,
        });
        self
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.default_batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize {
                view_type: "default".to_string(),
            });
        }
        if let Some(invalid) = self.overrides.iter().find(|o| o.batch_size == 0) {
            return Err(ConfigError::InvalidBatchSize {
                view_type: invalid.view_type.clone(),
            });
        }
        Ok(())
    }
}
