use serde::Serialize;

use crate::transform::TransformConfig;

/// Progress of the active file through the transform chain.
///
/// Variants are ordered: a later variant means a later stage was reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum PipelineState {
    #[default]
    Empty,
    Uploaded,
    Visualized,
    SmoothingApplied,
    LogApplied,
    DifferencingApplied,
    SplitApplied,
    Fitted,
}

impl PipelineState {
    pub fn can_fit(&self) -> bool {
        matches!(self, PipelineState::SplitApplied | PipelineState::Fitted)
    }

    pub fn can_generate_paper(&self) -> bool {
        matches!(self, PipelineState::Fitted)
    }

    /// Drop back from `Fitted`; anything else is unchanged.
    pub fn unfitted(self) -> Self {
        match self {
            PipelineState::Fitted => PipelineState::SplitApplied,
            other => other,
        }
    }

    /// State after a transform completed, given the resulting configuration
    /// and whether the split is still valid for the new observation count.
    pub fn after_transform(config: &TransformConfig, split_applied: bool) -> Self {
        if split_applied {
            return PipelineState::SplitApplied;
        }
        if config.differencing_order > 0 {
            PipelineState::DifferencingApplied
        } else if config.log_transform {
            PipelineState::LogApplied
        } else if config.smoothing_window > 1 {
            PipelineState::SmoothingApplied
        } else {
            PipelineState::Visualized
        }
    }
}
