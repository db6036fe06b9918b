//! Model run history: listing, two-step deletion and reloading a past run
//! into the dashboard.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::api::types::{FileId, ModelId, ModelRun, RunId};
use crate::api::DashboardApi;
use crate::config::DashConfig;
use crate::context::Context;
use crate::error::DashError;
use crate::invalidation::{invalidate, Stage};
use crate::paper::PaperAction;
use crate::pipeline::{Dispatch, Pipeline, PipelineState};
use crate::transform::TransformConfig;

/// One row of the history table. `index` is 1-based, oldest run first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRow {
    pub index: usize,
    pub run: ModelRun,
}

impl RunRow {
    pub fn model_label(&self) -> String {
        self.run.sarimax_params.label()
    }

    pub fn transform(&self) -> TransformConfig {
        TransformConfig::from_run(&self.run)
    }

    pub fn created(&self) -> String {
        self.run
            .created_at
            .map(|t| t.format("%d/%m/%Y %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string())
    }

    pub fn has_paper(&self) -> bool {
        self.run.has_paper()
    }
}

/// Server order is newest first; rows are numbered oldest first.
pub fn rows_from_runs(runs: Vec<ModelRun>) -> Vec<RunRow> {
    runs.into_iter()
        .rev()
        .enumerate()
        .map(|(i, run)| RunRow { index: i + 1, run })
        .collect()
}

/// Most recent run that produced `model_id`.
pub fn latest_run_for_model(runs: &[ModelRun], model_id: ModelId) -> Option<&ModelRun> {
    runs.iter()
        .filter(|r| r.model_id == model_id)
        .max_by_key(|r| (r.created_at, r.run_id))
}

/// A deletion waiting for the user's confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDelete {
    pub run_id: RunId,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReloadStep {
    Smoothing,
    LogTransform,
    Differencing,
    Split,
    ForecastCharts,
    PaperAction,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedStep {
    pub step: ReloadStep,
    pub reason: String,
}

/// What a reload restored and which resync steps failed along the way.
#[derive(Debug, Clone, Serialize)]
pub struct ReloadReport {
    pub run_id: RunId,
    pub model_id: ModelId,
    pub file_switched: bool,
    pub restored: TransformConfig,
    pub skipped: Vec<SkippedStep>,
}

impl ReloadReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }

    fn skip(&mut self, step: ReloadStep, err: &DashError) {
        warn!("Reload of run {}: {:?} skipped: {}", self.run_id, step, err);
        self.skipped.push(SkippedStep {
            step,
            reason: err.to_string(),
        });
    }

    /// Record a failed step. Only a stale session aborts the reload.
    fn tolerate<T>(
        &mut self,
        step: ReloadStep,
        result: Result<T, DashError>,
    ) -> Result<(), DashError> {
        match result {
            Ok(_) => Ok(()),
            Err(DashError::Stale) => Err(DashError::Stale),
            Err(e) => {
                self.skip(step, &e);
                Ok(())
            }
        }
    }
}

pub struct HistoryManager {
    ctx: Context,
    api: Arc<dyn DashboardApi>,
    pipeline: Pipeline,
}

impl HistoryManager {
    pub fn new(ctx: Context, api: Arc<dyn DashboardApi>, config: DashConfig) -> Self {
        let pipeline = Pipeline::new(ctx.clone(), api.clone(), config);
        Self { ctx, api, pipeline }
    }

    /// Fetch every run of the current user.
    pub async fn list_runs(&self) -> Result<Vec<RunRow>, DashError> {
        let ticket = self.ctx.with(|s| {
            s.session.require_user()?;
            Ok::<_, DashError>(s.session.ticket())
        })?;
        let runs = self.api.list_runs().await?;
        let rows = rows_from_runs(runs);
        info!("Loaded {} model runs", rows.len());

        self.ctx.apply_if_current(&ticket, "run history", |s| {
            s.history = rows.clone();
            Ok(())
        })?;
        Ok(rows)
    }

    /// First step of a deletion: remember which run the user picked.
    pub fn request_delete(&self, run_id: RunId) -> Result<PendingDelete, DashError> {
        self.ctx.with(|s| {
            let row = s
                .history
                .iter()
                .find(|r| r.run.run_id == run_id)
                .ok_or(DashError::RunNotFound(run_id))?;
            let pending = PendingDelete {
                run_id,
                label: format!("#{} {}", row.index, row.model_label()),
            };
            s.pending_delete = Some(pending.clone());
            Ok(pending)
        })
    }

    pub fn cancel_delete(&self) -> Option<PendingDelete> {
        self.ctx.with(|s| s.pending_delete.take())
    }

    /// Second step: delete the pending run on the server, then refetch.
    /// On failure the run stays listed.
    pub async fn confirm_delete(&self) -> Result<Vec<RunRow>, DashError> {
        let pending = self
            .ctx
            .with(|s| s.pending_delete.take())
            .ok_or_else(|| DashError::validation("no deletion is awaiting confirmation"))?;

        info!("Deleting model run {}", pending.run_id);
        let ack = self.api.delete_run(pending.run_id).await?;
        if !ack.success {
            return Err(DashError::Rejected(
                ack.error
                    .unwrap_or_else(|| format!("run {} could not be deleted", pending.run_id)),
            ));
        }

        self.ctx.with(|s| {
            if s.session.run_id() == Some(pending.run_id) {
                s.results.paper = PaperAction::Hidden;
            }
        });
        self.list_runs().await
    }

    /// Load a past run: switch to its file when needed, show its stored
    /// results, then bring the server's transform state back to the
    /// configuration the run was fitted with.
    ///
    /// Only a failure to fetch the results aborts; transform resync failures
    /// are recorded in the report.
    pub async fn reload_run(
        &self,
        run_id: RunId,
        model_id: ModelId,
        file_id: FileId,
    ) -> Result<ReloadReport, DashError> {
        let (file_switched, row) = self.ctx.with(|s| {
            s.session.require_user()?;
            let row = s
                .history
                .iter()
                .find(|r| r.run.run_id == run_id)
                .map(|r| r.run.clone());
            Ok::<_, DashError>((s.session.file_id() != Some(file_id), row))
        })?;
        info!("Reloading run {} (model {}) on file {}", run_id, model_id, file_id);

        if file_switched {
            self.ctx.with(|s| {
                s.session.reset_for_file(file_id, None);
                invalidate(s, Stage::Upload);
                s.reset_options();
                s.stage = PipelineState::Uploaded;
            });
            self.pipeline.load_visualization().await?;
            // The visualization reports the raw count; the run was fitted on
            // the transformed one.
            if let Some(total) = row.as_ref().and_then(|r| r.total_obs) {
                self.ctx.with(|s| {
                    if let Err(e) = s.session.set_total_observations(total) {
                        warn!("Ignoring stored count {} of run {}: {}", total, run_id, e);
                    }
                });
            }
        }

        // Nothing is touched until the results arrive, so a failed fetch
        // leaves the previous model in place.
        let ticket = self.ctx.with(|s| s.session.ticket());
        let fetched = self.api.model_results(model_id).await?;
        if fetched.is_no_model() {
            return Err(DashError::NoModel);
        }
        self.ctx.apply_if_current(&ticket, "reload", |s| {
            invalidate(s, Stage::HistoryReload);
            s.session.set_model(model_id, Some(run_id));
            Ok(())
        })?;
        let results = self
            .pipeline
            .show_results(&ticket, fetched, true)?
            .ok_or(DashError::NoModel)?;

        let info = results.config_info.clone().unwrap_or_default();
        let mut target = TransformConfig::from_config_info(&info);
        if target.train_observations.is_none() {
            target.train_observations = row.as_ref().and_then(|r| r.train_obs);
        }
        self.ctx.with(|s| {
            s.analyses = info.acf_pacf_analyses.clone().unwrap_or_default();
        });

        let mut report = ReloadReport {
            run_id,
            model_id,
            file_switched,
            restored: target.clone(),
            skipped: Vec::new(),
        };

        // Each step depends on the count the previous one left on the server.
        let result = self
            .pipeline
            .smoothing(target.smoothing_window, Dispatch::Resync)
            .await;
        report.tolerate(ReloadStep::Smoothing, result)?;
        let result = self
            .pipeline
            .log_transform(target.log_transform, Dispatch::Resync)
            .await;
        report.tolerate(ReloadStep::LogTransform, result)?;
        let result = self
            .pipeline
            .differencing(target.differencing_order, Dispatch::Resync)
            .await;
        report.tolerate(ReloadStep::Differencing, result)?;
        if let Some(train) = target.train_observations {
            let result = self.pipeline.split(train, Dispatch::Resync).await;
            report.tolerate(ReloadStep::Split, result)?;
        }

        self.ctx.with(|s| {
            s.stage = if s.session.split_applied() {
                PipelineState::Fitted
            } else {
                PipelineState::after_transform(&s.transform, false)
            };
        });

        let result = self.pipeline.load_forecast_charts(model_id).await;
        report.tolerate(ReloadStep::ForecastCharts, result)?;
        let result = self.pipeline.paper().check_state(run_id).await;
        report.tolerate(ReloadStep::PaperAction, result)?;

        info!(
            "Reloaded run {} ({} steps skipped)",
            run_id,
            report.skipped.len()
        );
        Ok(report)
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }
}
