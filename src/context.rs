//! Application state owned by the dashboard shell and handed to every
//! component.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::api::types::SarimaxParams;
use crate::error::DashError;
use crate::history::{PendingDelete, RunRow};
use crate::pipeline::PipelineState;
use crate::recommendation::AcfPacfAnalysisSet;
use crate::session::{Session, Ticket};
use crate::transform::TransformConfig;
use crate::views::{ResultsView, TransformViews};

#[derive(Debug, Clone, Default, Serialize)]
pub struct AppState {
    pub session: Session,
    pub transform: TransformConfig,
    pub stage: PipelineState,
    pub sarimax: SarimaxParams,
    pub analyses: AcfPacfAnalysisSet,
    pub results: ResultsView,
    pub views: TransformViews,
    /// Oldest run first.
    pub history: Vec<RunRow>,
    #[serde(skip)]
    pub pending_delete: Option<PendingDelete>,
}

impl AppState {
    /// Back to the controls' initial values: no transforms, default SARIMAX
    /// order, no analyses.
    pub fn reset_options(&mut self) {
        self.transform = TransformConfig::default();
        self.sarimax = SarimaxParams::default();
        self.analyses.clear();
    }
}

/// Cloneable handle on the shared [`AppState`].
///
/// The lock is only taken inside [`Context::with`], never across an await,
/// so concurrent request chains interleave between their network calls.
#[derive(Debug, Clone, Default)]
pub struct Context {
    inner: Arc<Mutex<AppState>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut AppState) -> R) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }

    /// Copy of the whole state, for rendering.
    pub fn snapshot(&self) -> AppState {
        self.lock().clone()
    }

    pub fn session(&self) -> Session {
        self.lock().session.clone()
    }

    /// Apply `f` only if the ticket is still current; otherwise the
    /// completion is dropped and `Stale` returned.
    pub fn apply_if_current<R>(
        &self,
        ticket: &Ticket,
        what: &str,
        f: impl FnOnce(&mut AppState) -> Result<R, DashError>,
    ) -> Result<R, DashError> {
        let mut guard = self.lock();
        if !guard.session.is_current(ticket) {
            tracing::warn!("Discarding stale {} result", what);
            return Err(DashError::Stale);
        }
        f(&mut guard)
    }

    fn lock(&self) -> MutexGuard<'_, AppState> {
        // A panic while holding the lock leaves plain data behind; keep using it.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_if_current_discards_stale() {
        let ctx = Context::new();
        let ticket = ctx.with(|s| {
            s.session.reset_for_file(1, Some(100));
            s.session.begin()
        });
        ctx.with(|s| s.session.reset_for_file(2, Some(50)));

        let result = ctx.apply_if_current(&ticket, "smoothing", |s| {
            s.session.set_total_observations(99)
        });
        assert!(matches!(result, Err(DashError::Stale)));
        assert_eq!(ctx.session().total_observations(), Some(50));
    }

    #[test]
    fn test_reset_options() {
        let ctx = Context::new();
        ctx.with(|s| {
            s.transform.smoothing_window = 4;
            s.sarimax.p = 3;
            s.reset_options();
        });
        let state = ctx.snapshot();
        assert_eq!(state.transform, TransformConfig::default());
        assert_eq!(state.sarimax, SarimaxParams::default());
    }

    #[test]
    fn test_snapshot_serializes_for_rendering() {
        use crate::api::types::{
            Coefficient, ComparisonData, DataPoint, ForecastCharts, ForecastPoint, ForecastSeries,
        };
        use crate::history::rows_from_runs;
        use crate::testing::fake_run;
        use crate::views::SmoothingView;

        let ctx = Context::new();
        ctx.with(|s| {
            s.history = rows_from_runs(vec![fake_run(1, 10, 1)]);
            s.results.coefficients = vec![Coefficient {
                parameter: "ar.L1".to_string(),
                coefficient: Some(0.4),
                std_error: None,
                t_value: None,
                p_value: Some(0.01),
                ci_lower: None,
                ci_upper: None,
            }];
            s.results.forecast = Some(ForecastCharts {
                training: ForecastSeries::default(),
                test: ForecastSeries {
                    data: vec![ForecastPoint {
                        date: "2025-01-01".to_string(),
                        forecasted: Some(4.2),
                        actual: Some(4.0),
                        ci_lower: None,
                        ci_upper: None,
                    }],
                    label: None,
                },
            });
            s.views.smoothing = Some(SmoothingView {
                window: 3,
                original_obs: 100,
                n_observations: 98,
                comparison: Some(ComparisonData {
                    original: vec![DataPoint {
                        date: "2025-01-01".to_string(),
                        value: 1.0,
                    }],
                    smoothed: Vec::new(),
                }),
                statistics: None,
                acf_pacf: None,
            });
        });

        let value = serde_json::to_value(ctx.snapshot()).unwrap();
        assert_eq!(value["history"][0]["run"]["run_id"], 1);
        assert_eq!(value["results"]["coefficients"][0]["parameter"], "ar.L1");
        assert_eq!(value["results"]["forecast"]["test"]["data"][0]["forecasted"], 4.2);
        assert_eq!(value["views"]["smoothing"]["window"], 3);
    }
}
