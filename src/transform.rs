//! Transform chain configuration and the split arithmetic around it.

use serde::{Deserialize, Serialize};

use crate::api::types::{ConfigInfo, ModelRun};
use crate::config::DashConfig;
use crate::error::DashError;

/// Transforms as currently configured on the client. The server holds the
/// applied state per file; this copy is resynchronised on history reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformConfig {
    /// 1 means no smoothing.
    pub smoothing_window: u32,
    pub log_transform: bool,
    /// 0 means no differencing.
    pub differencing_order: u32,
    pub train_observations: Option<usize>,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            smoothing_window: 1,
            log_transform: false,
            differencing_order: 0,
            train_observations: None,
        }
    }
}

impl TransformConfig {
    /// Configuration a model was fitted with. Missing fields mean "not applied".
    pub fn from_config_info(info: &ConfigInfo) -> Self {
        Self {
            smoothing_window: info.smoothing_window.filter(|w| *w >= 1).unwrap_or(1),
            log_transform: info.log_transform.unwrap_or(false),
            differencing_order: info.differencing_order.unwrap_or(0),
            train_observations: info.train_obs.filter(|t| *t >= 1),
        }
    }

    pub fn from_run(run: &ModelRun) -> Self {
        Self {
            smoothing_window: run.smoothing_window.filter(|w| *w >= 1).unwrap_or(1),
            log_transform: run.log_transform,
            differencing_order: run.differencing_order.unwrap_or(0),
            train_observations: run.train_obs.filter(|t| *t >= 1),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.smoothing_window <= 1 && !self.log_transform && self.differencing_order == 0
    }

    /// Short description such as `smooth=3 log diff=1`, or `none`.
    pub fn label(&self) -> String {
        let mut parts = Vec::new();
        if self.smoothing_window > 1 {
            parts.push(format!("smooth={}", self.smoothing_window));
        }
        if self.log_transform {
            parts.push("log".to_string());
        }
        if self.differencing_order > 0 {
            parts.push(format!("diff={}", self.differencing_order));
        }
        if parts.is_empty() {
            "none".to_string()
        } else {
            parts.join(" ")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSizes {
    pub train: usize,
    pub test: usize,
}

impl SplitSizes {
    pub fn total(&self) -> usize {
        self.train + self.test
    }

    /// Rounded train and test percentages.
    pub fn percentages(&self) -> (u32, u32) {
        let total = self.total();
        if total == 0 {
            return (0, 0);
        }
        let pct = |n: usize| ((n as f64 / total as f64) * 100.0).round() as u32;
        (pct(self.train), pct(self.test))
    }
}

/// Check `1 <= train < total`, so that the test set keeps at least one observation.
pub fn validate_split(train: usize, total: usize) -> Result<SplitSizes, DashError> {
    if train < 1 {
        return Err(DashError::validation(
            "training set must have at least 1 observation",
        ));
    }
    if train >= total {
        return Err(DashError::validation(format!(
            "training observations must be fewer than the total ({}): test set must have at least 1 observation",
            total
        )));
    }
    Ok(SplitSizes {
        train,
        test: total - train,
    })
}

/// Proposed training size for a series of `total` observations:
/// `floor(total * ratio)`, kept inside `[1, total - 1]`.
/// Returns `None` when no valid split exists (fewer than 2 observations).
pub fn default_train_observations(total: usize, ratio: f64) -> Option<usize> {
    if total < 2 {
        return None;
    }
    let proposed = (total as f64 * ratio).floor() as usize;
    Some(proposed.clamp(1, total - 1))
}

/// Keep a pending training size valid after the observation count changed.
/// An out-of-range value is replaced by the default proposal.
pub fn reclamp_train_observations(
    current: Option<usize>,
    total: usize,
    ratio: f64,
) -> Option<usize> {
    match current {
        Some(train) if train >= 1 && train < total => Some(train),
        _ => default_train_observations(total, ratio),
    }
}

pub fn validate_smoothing_window(window: u32, config: &DashConfig) -> Result<(), DashError> {
    if window < 1 || window > config.max_smoothing_window {
        return Err(DashError::validation(format!(
            "smoothing window must be between 1 and {}, got {}",
            config.max_smoothing_window, window
        )));
    }
    Ok(())
}

pub fn validate_differencing_order(order: u32, config: &DashConfig) -> Result<(), DashError> {
    if order > config.max_differencing_order {
        return Err(DashError::validation(format!(
            "differencing order must be between 0 and {}, got {}",
            config.max_differencing_order, order
        )));
    }
    Ok(())
}
