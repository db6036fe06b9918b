//! Render-ready state. Each field is something the dashboard displays;
//! `None` or empty means the section is hidden.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::api::types::{
    Coefficient, ComparisonData, DataPoint, DateRange, ForecastCharts, MetricSet, ModelResults,
    SelectionScore, SplitResponse,
};
use crate::paper::PaperAction;
use crate::transform::SplitSizes;

/// Fit results currently on screen.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultsView {
    pub order_label: Option<String>,
    pub aic: Option<f64>,
    pub bic: Option<f64>,
    pub coefficients: Vec<Coefficient>,
    pub metrics: BTreeMap<String, MetricSet>,
    pub selection_score: Option<SelectionScore>,
    pub summary: Option<String>,
    pub forecast: Option<ForecastCharts>,
    pub paper: PaperAction,
}

impl ResultsView {
    /// Replace the displayed tables with a fresh result set. Charts and the
    /// paper action are loaded separately.
    pub fn show(&mut self, results: &ModelResults) {
        self.order_label = Some(results.order_label());
        self.aic = results.aic;
        self.bic = results.bic;
        self.coefficients = results.coefficients.clone();
        self.metrics = results.metrics.clone();
        self.selection_score = results.selection_score.clone();
        self.summary = results.model_summary.clone();
    }

    pub fn has_results(&self) -> bool {
        self.order_label.is_some()
            || !self.coefficients.is_empty()
            || !self.metrics.is_empty()
            || self.summary.is_some()
            || self.forecast.is_some()
    }
}

/// A transformed series as returned by the log and differencing endpoints.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SeriesView {
    pub data: Vec<DataPoint>,
    pub statistics: Option<Value>,
    pub acf_pacf: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SmoothingView {
    pub window: u32,
    pub original_obs: usize,
    pub n_observations: usize,
    pub comparison: Option<ComparisonData>,
    pub statistics: Option<Value>,
    pub acf_pacf: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DifferencingView {
    pub order: u32,
    pub removed_obs: usize,
    pub series: SeriesView,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SplitSummary {
    pub sizes: SplitSizes,
    pub train_pct: u32,
    pub test_pct: u32,
    pub train_start: Option<String>,
    pub train_end: Option<String>,
    pub test_start: Option<String>,
    pub test_end: Option<String>,
}

impl SplitSummary {
    pub fn from_response(sizes: SplitSizes, response: &SplitResponse) -> Self {
        let (train_pct, test_pct) = sizes.percentages();
        Self {
            sizes,
            train_pct,
            test_pct,
            train_start: response.train_start.clone(),
            train_end: response.train_end.clone(),
            test_start: response.test_start.clone(),
            test_end: response.test_end.clone(),
        }
    }

    /// `Train: 80 obs (80%) | Test: 20 obs (20%)`
    pub fn describe(&self) -> String {
        format!(
            "Train: {} obs ({}%) | Test: {} obs ({}%)",
            self.sizes.train, self.train_pct, self.sizes.test, self.test_pct
        )
    }
}

/// Charts and status panels of the transform section.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransformViews {
    /// The uploaded series with its statistics.
    pub original: Option<SeriesView>,
    pub date_range: Option<DateRange>,
    pub smoothing: Option<SmoothingView>,
    pub log: Option<SeriesView>,
    pub differencing: Option<DifferencingView>,
    pub split: Option<SplitSummary>,
}

impl TransformViews {
    pub fn clear_transform_charts(&mut self) {
        self.smoothing = None;
        self.log = None;
        self.differencing = None;
    }
}
