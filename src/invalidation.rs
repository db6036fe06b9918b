//! Which displayed artifacts each pipeline stage makes obsolete.
//!
//! Every mutation runs [`invalidate`] with its stage before dispatching the
//! request, so no call site decides on its own what to hide.

use serde::Serialize;
use tracing::debug;

use crate::context::AppState;
use crate::paper::PaperAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Stage {
    Upload,
    Smoothing,
    LogTransform,
    Differencing,
    Split,
    Fit,
    HistoryReload,
    Login,
    Logout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Artifact {
    ModelId,
    Coefficients,
    Metrics,
    Summary,
    ForecastCharts,
    PaperActions,
    SplitStatus,
    TransformCharts,
    OriginalSeries,
    AcfPacfAnalyses,
}

const FIT_RESULTS: &[Artifact] = &[
    Artifact::ModelId,
    Artifact::Coefficients,
    Artifact::Metrics,
    Artifact::Summary,
    Artifact::ForecastCharts,
    Artifact::PaperActions,
];

/// A refit keeps the session's model id until the new one arrives.
const REFIT: &[Artifact] = &[
    Artifact::Coefficients,
    Artifact::Metrics,
    Artifact::Summary,
    Artifact::ForecastCharts,
    Artifact::PaperActions,
];

const RELOAD: &[Artifact] = &[
    Artifact::ModelId,
    Artifact::Coefficients,
    Artifact::Metrics,
    Artifact::Summary,
    Artifact::ForecastCharts,
    Artifact::PaperActions,
    Artifact::SplitStatus,
    Artifact::TransformCharts,
    Artifact::AcfPacfAnalyses,
];

const EVERYTHING: &[Artifact] = &[
    Artifact::ModelId,
    Artifact::Coefficients,
    Artifact::Metrics,
    Artifact::Summary,
    Artifact::ForecastCharts,
    Artifact::PaperActions,
    Artifact::SplitStatus,
    Artifact::TransformCharts,
    Artifact::OriginalSeries,
    Artifact::AcfPacfAnalyses,
];

pub fn artifacts_for(stage: Stage) -> &'static [Artifact] {
    match stage {
        Stage::Smoothing | Stage::LogTransform | Stage::Differencing | Stage::Split => FIT_RESULTS,
        Stage::Fit => REFIT,
        Stage::HistoryReload => RELOAD,
        Stage::Upload | Stage::Login | Stage::Logout => EVERYTHING,
    }
}

/// Clear every artifact the stage invalidates.
pub fn invalidate(state: &mut AppState, stage: Stage) {
    debug!("Invalidating artifacts for {:?}", stage);
    for artifact in artifacts_for(stage) {
        clear(state, *artifact);
    }
}

fn clear(state: &mut AppState, artifact: Artifact) {
    match artifact {
        Artifact::ModelId => state.session.clear_model(),
        Artifact::Coefficients => state.results.coefficients.clear(),
        Artifact::Metrics => {
            state.results.order_label = None;
            state.results.aic = None;
            state.results.bic = None;
            state.results.metrics.clear();
            state.results.selection_score = None;
        }
        Artifact::Summary => state.results.summary = None,
        Artifact::ForecastCharts => state.results.forecast = None,
        Artifact::PaperActions => state.results.paper = PaperAction::Hidden,
        Artifact::SplitStatus => state.views.split = None,
        Artifact::TransformCharts => state.views.clear_transform_charts(),
        Artifact::OriginalSeries => {
            state.views.original = None;
            state.views.date_range = None;
        }
        Artifact::AcfPacfAnalyses => state.analyses.clear(),
    }
}
