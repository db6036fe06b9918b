//! Transform chain controller for the active file.
//!
//! Operations run in the order smoothing, log, differencing, split, fit.
//! Each mutation clears the results it makes obsolete before its request is
//! sent and applies its response only if the session has not moved on.

mod state;

pub use state::PipelineState;

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::api::types::{FileId, FitRequest, ModelId, ModelResults, RunId, SarimaxParams};
use crate::api::DashboardApi;
use crate::config::DashConfig;
use crate::context::{AppState, Context};
use crate::error::DashError;
use crate::invalidation::{invalidate, Stage};
use crate::paper::PaperLinks;
use crate::recommendation::{Recommendation, SeriesType};
use crate::session::Ticket;
use crate::transform::{
    reclamp_train_observations, validate_differencing_order, validate_smoothing_window,
    validate_split, TransformConfig,
};
use crate::views::{DifferencingView, SeriesView, SmoothingView, SplitSummary};

/// Who asked for a transform. A history reload restores the server's
/// transform state underneath results it has already loaded, so its
/// requests leave those results in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatch {
    Interactive,
    Resync,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitOutcome {
    pub model_id: ModelId,
    pub run_id: RunId,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    pub series: SeriesType,
    pub description: Option<String>,
    pub recommendation: Recommendation,
}

pub struct Pipeline {
    ctx: Context,
    api: Arc<dyn DashboardApi>,
    config: DashConfig,
    paper: PaperLinks,
}

impl Pipeline {
    pub fn new(ctx: Context, api: Arc<dyn DashboardApi>, config: DashConfig) -> Self {
        let paper = PaperLinks::new(ctx.clone(), api.clone(), config.clone());
        Self {
            ctx,
            api,
            config,
            paper,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.ctx.with(|s| s.stage)
    }

    pub fn paper(&self) -> &PaperLinks {
        &self.paper
    }

    fn dispatch(&self, stage: Stage, mode: Dispatch) -> Result<(FileId, Ticket), DashError> {
        self.ctx.with(|s| {
            s.session.require_user()?;
            let file_id = s.session.require_file()?;
            if mode == Dispatch::Interactive {
                invalidate(s, stage);
                s.stage = s.stage.unfitted();
            }
            Ok::<_, DashError>((file_id, s.session.begin()))
        })
    }

    fn read_ticket(&self) -> Result<(FileId, Ticket), DashError> {
        self.ctx.with(|s| {
            s.session.require_user()?;
            let file_id = s.session.require_file()?;
            Ok::<_, DashError>((file_id, s.session.ticket()))
        })
    }

    /// Record a new observation count. Must run before any other mutation so
    /// a rejected count leaves the state as it was.
    fn update_total(s: &mut AppState, total: Option<usize>, ratio: f64) -> Result<(), DashError> {
        if let Some(total) = total {
            s.session.set_total_observations(total)?;
            s.transform.train_observations =
                reclamp_train_observations(s.transform.train_observations, total, ratio);
        }
        if !s.session.split_applied() {
            s.views.split = None;
        }
        Ok(())
    }

    /// Load the original series, its statistics and ACF/PACF.
    pub async fn load_visualization(&self) -> Result<(), DashError> {
        let (file_id, ticket) = self.read_ticket()?;
        let data = self.api.file_data(file_id).await?;
        info!("Loaded {} points for file {}", data.data.len(), file_id);

        self.ctx.apply_if_current(&ticket, "visualization", |s| {
            if s.session.total_observations().is_none() && !data.data.is_empty() {
                s.session.set_total_observations(data.data.len())?;
            }
            s.views.date_range = data.date_range;
            s.views.original = Some(SeriesView {
                data: data.data,
                statistics: data.statistics,
                acf_pacf: data.acf_pacf,
            });
            if s.stage < PipelineState::Visualized {
                s.stage = PipelineState::Visualized;
            }
            Ok(())
        })
    }

    /// Moving-average smoothing. Window 1 removes it. Returns the new count.
    pub async fn apply_smoothing(&self, window: u32) -> Result<usize, DashError> {
        self.smoothing(window, Dispatch::Interactive).await
    }

    pub(crate) async fn smoothing(&self, window: u32, mode: Dispatch) -> Result<usize, DashError> {
        validate_smoothing_window(window, &self.config)?;
        let (file_id, ticket) = self.dispatch(Stage::Smoothing, mode)?;
        info!("Applying smoothing window {} on file {}", window, file_id);

        let response = self.api.apply_smoothing(file_id, window).await?;
        let ratio = self.config.default_train_ratio;
        self.ctx.apply_if_current(&ticket, "smoothing", |s| {
            let n = response.n_observations;
            Self::update_total(s, Some(n), ratio)?;
            s.transform.smoothing_window = window;
            s.views.smoothing = (window > 1).then(|| SmoothingView {
                window,
                original_obs: response.original_obs,
                n_observations: n,
                comparison: response.comparison_data,
                statistics: response.statistics,
                acf_pacf: response.acf_pacf,
            });
            s.stage = PipelineState::after_transform(&s.transform, s.session.split_applied());
            debug!("Smoothing left {} of {} observations", n, response.original_obs);
            Ok(n)
        })
    }

    /// Returns the new count, or `None` when the transform was removed
    /// (the server does not report a count then).
    pub async fn apply_log_transform(&self, enabled: bool) -> Result<Option<usize>, DashError> {
        self.log_transform(enabled, Dispatch::Interactive).await
    }

    pub(crate) async fn log_transform(
        &self,
        enabled: bool,
        mode: Dispatch,
    ) -> Result<Option<usize>, DashError> {
        let (file_id, ticket) = self.dispatch(Stage::LogTransform, mode)?;
        info!(
            "{} log transform on file {}",
            if enabled { "Applying" } else { "Removing" },
            file_id
        );

        let response = self.api.apply_log_transform(file_id, enabled).await?;
        let ratio = self.config.default_train_ratio;
        self.ctx.apply_if_current(&ticket, "log transform", |s| {
            let total = if enabled { response.n_observations } else { None };
            Self::update_total(s, total, ratio)?;
            s.transform.log_transform = enabled;
            s.views.log = enabled.then(|| SeriesView {
                data: response.data,
                statistics: response.statistics,
                acf_pacf: response.acf_pacf,
            });
            s.stage = PipelineState::after_transform(&s.transform, s.session.split_applied());
            Ok(total)
        })
    }

    /// Order 0 removes differencing. Returns the new count when one is reported.
    pub async fn apply_differencing(&self, order: u32) -> Result<Option<usize>, DashError> {
        self.differencing(order, Dispatch::Interactive).await
    }

    pub(crate) async fn differencing(
        &self,
        order: u32,
        mode: Dispatch,
    ) -> Result<Option<usize>, DashError> {
        validate_differencing_order(order, &self.config)?;
        let (file_id, ticket) = self.dispatch(Stage::Differencing, mode)?;
        info!("Applying differencing order {} on file {}", order, file_id);

        let response = self.api.apply_differencing(file_id, order).await?;
        let ratio = self.config.default_train_ratio;
        self.ctx.apply_if_current(&ticket, "differencing", |s| {
            let total = if order > 0 { response.n_observations } else { None };
            Self::update_total(s, total, ratio)?;
            s.transform.differencing_order = order;
            s.views.differencing = (order > 0).then(|| DifferencingView {
                order,
                removed_obs: response.removed_obs.unwrap_or(order as usize),
                series: SeriesView {
                    data: response.data,
                    statistics: response.statistics,
                    acf_pacf: response.acf_pacf,
                },
            });
            s.stage = PipelineState::after_transform(&s.transform, s.session.split_applied());
            Ok(total)
        })
    }

    /// Split into training and test sets. Invalid sizes are rejected before
    /// any request is made.
    pub async fn apply_split(&self, train: usize) -> Result<SplitSummary, DashError> {
        self.split(train, Dispatch::Interactive).await
    }

    pub(crate) async fn split(
        &self,
        train: usize,
        mode: Dispatch,
    ) -> Result<SplitSummary, DashError> {
        let (file_id, ticket) = self.ctx.with(|s| {
            s.session.require_user()?;
            let file_id = s.session.require_file()?;
            let total = s.session.total_observations().ok_or_else(|| {
                DashError::validation("total number of observations is not available")
            })?;
            validate_split(train, total)?;
            if mode == Dispatch::Interactive {
                invalidate(s, Stage::Split);
                s.stage = s.stage.unfitted();
            }
            Ok::<_, DashError>((file_id, s.session.begin()))
        })?;
        info!("Applying split with {} training observations on file {}", train, file_id);

        let response = self.api.apply_split(file_id, train).await?;
        self.ctx.apply_if_current(&ticket, "split", |s| {
            let sizes = s.session.mark_split_applied(train)?;
            s.transform.train_observations = Some(train);
            let summary = SplitSummary::from_response(sizes, &response);
            s.views.split = Some(summary.clone());
            s.stage = PipelineState::SplitApplied;
            Ok(summary)
        })
    }

    /// Fit a SARIMAX model on the split series, then show its results,
    /// forecast charts and paper action.
    pub async fn run_fit(&self, params: SarimaxParams) -> Result<FitOutcome, DashError> {
        let (file_id, ticket, analyses) = self.ctx.with(|s| {
            s.session.require_user()?;
            let file_id = s.session.require_file()?;
            if !s.session.split_applied() {
                return Err(DashError::SplitNotApplied);
            }
            invalidate(s, Stage::Fit);
            s.sarimax = params.clone();
            Ok::<_, DashError>((file_id, s.session.begin(), s.analyses.clone()))
        })?;

        let label = params.label();
        info!("Fitting {} on file {}", label, file_id);
        let request = FitRequest {
            params,
            acf_pacf_analyses: analyses,
        };
        let response = self.api.fit_sarimax(file_id, &request).await?;

        self.ctx.apply_if_current(&ticket, "fit", |s| {
            s.session.set_model(response.model_id, Some(response.run_id));
            s.stage = PipelineState::Fitted;
            Ok(())
        })?;
        info!("Fitted model {} (run {})", response.model_id, response.run_id);

        self.load_results(response.model_id, false).await?;
        if let Err(e) = self.load_forecast_charts(response.model_id).await {
            warn!("Forecast charts for model {} unavailable: {}", response.model_id, e);
        }
        if let Err(e) = self.paper.check_state(response.run_id).await {
            warn!("Could not refresh paper state for run {}: {}", response.run_id, e);
        }

        Ok(FitOutcome {
            model_id: response.model_id,
            run_id: response.run_id,
            label,
        })
    }

    /// Ask the server for an order recommendation on one series variant and
    /// keep it for the next fit.
    pub async fn analyze_acf_pacf(&self, series: SeriesType) -> Result<AnalysisOutcome, DashError> {
        let (file_id, ticket) = self.read_ticket()?;
        info!(
            "Requesting ACF/PACF analysis of the {} for file {}",
            series.display_name(),
            file_id
        );

        let response = self.api.analyze_acf_pacf(file_id, series).await?;
        if !response.success {
            return Err(DashError::Rejected(
                response
                    .error
                    .unwrap_or_else(|| "ACF/PACF analysis failed".to_string()),
            ));
        }
        let recommendation = response.recommendation.ok_or_else(|| {
            DashError::Decode("analysis response carries no recommendation".to_string())
        })?;

        self.ctx.apply_if_current(&ticket, "ACF/PACF analysis", |s| {
            s.analyses.set(series, Some(recommendation.clone()));
            Ok(())
        })?;
        info!("Recommended {} for the {}", recommendation.label(), series.display_name());

        Ok(AnalysisOutcome {
            series,
            description: response.description,
            recommendation,
        })
    }

    /// Copy a stored recommendation into the SARIMAX parameters.
    pub fn apply_recommendation(&self, series: SeriesType) -> Result<SarimaxParams, DashError> {
        self.ctx.with(|s| {
            let recommendation = s.analyses.get(series).cloned().ok_or_else(|| {
                DashError::validation(format!(
                    "no ACF/PACF analysis available for the {}",
                    series.display_name()
                ))
            })?;
            recommendation.apply_to(&mut s.sarimax);
            info!("Using {} from the {} analysis", recommendation.label(), series.as_str());
            Ok::<_, DashError>(s.sarimax.clone())
        })
    }

    /// Fetch and show a model's results. With `populate`, the SARIMAX
    /// parameters and transform controls are restored from the model's
    /// configuration. Returns `None` when the server has no model.
    pub async fn load_results(
        &self,
        model_id: ModelId,
        populate: bool,
    ) -> Result<Option<ModelResults>, DashError> {
        let ticket = self.ctx.with(|s| s.session.ticket());
        let results = self.api.model_results(model_id).await?;
        self.show_results(&ticket, results, populate)
    }

    /// Results of the latest model fitted on the active file, if any.
    pub async fn load_latest_model(&self) -> Result<Option<ModelResults>, DashError> {
        let (file_id, ticket) = self.read_ticket()?;
        let results = self.api.file_model(file_id).await?;
        let shown = self.show_results(&ticket, results, false)?;
        if let Some(model_id) = shown.as_ref().and_then(|r| r.model_id) {
            self.ctx.apply_if_current(&ticket, "latest model", |s| {
                s.session.set_model(model_id, None);
                Ok(())
            })?;
        }
        Ok(shown)
    }

    pub(crate) fn show_results(
        &self,
        ticket: &Ticket,
        results: ModelResults,
        populate: bool,
    ) -> Result<Option<ModelResults>, DashError> {
        if results.is_no_model() {
            debug!("Server has no model to show");
            return Ok(None);
        }
        self.ctx.apply_if_current(ticket, "model results", |s| {
            s.results.show(&results);
            if populate {
                if let Some(params) = &results.sarimax_params {
                    s.sarimax = params.clone();
                }
                if let Some(info) = &results.config_info {
                    let restored = TransformConfig::from_config_info(info);
                    s.transform = TransformConfig {
                        train_observations: restored
                            .train_observations
                            .or(s.transform.train_observations),
                        ..restored
                    };
                }
            }
            Ok(())
        })?;
        Ok(Some(results))
    }

    pub async fn load_forecast_charts(&self, model_id: ModelId) -> Result<(), DashError> {
        let ticket = self.ctx.with(|s| s.session.ticket());
        let charts = self.api.forecast_charts(model_id).await?;
        debug!(
            "Forecast charts for model {}: {} training and {} test points",
            model_id,
            charts.training.data.len(),
            charts.test.data.len()
        );
        self.ctx.apply_if_current(&ticket, "forecast charts", |s| {
            s.results.forecast = Some(charts);
            Ok(())
        })
    }
}
