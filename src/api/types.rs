use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::lenient;
use crate::recommendation::{AcfPacfAnalysisSet, Recommendation};

pub type FileId = i64;
pub type ModelId = i64;
pub type RunId = i64;

// -- Auth --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: i64,
    pub name: String,
    pub surname: String,
    pub email: String,
}

impl User {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.name, self.surname)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub success: bool,
    pub user: User,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub name: String,
    pub surname: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileUpdate {
    pub name: String,
    pub surname: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

// -- Files and series --

#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    pub file_id: FileId,
    pub file_name: String,
    pub n_observations: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserFile {
    pub file_id: FileId,
    pub file_name: String,
    pub n_observations: usize,
    #[serde(default)]
    pub uploaded_at: Option<String>,
    #[serde(default)]
    pub has_model: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilesResponse {
    #[serde(default)]
    pub files: Vec<UserFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub date: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

/// Original series with statistics and ACF/PACF. Statistics and ACF/PACF
/// payloads are passed through to the renderer untouched.
#[derive(Debug, Clone, Deserialize)]
pub struct FileData {
    #[serde(default)]
    pub data: Vec<DataPoint>,
    #[serde(default)]
    pub statistics: Option<Value>,
    #[serde(default)]
    pub acf_pacf: Option<Value>,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    #[serde(default)]
    pub is_smoothed: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileMeta {
    #[serde(default)]
    pub train_split_ratio: Option<f64>,
}

// -- Transforms --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonData {
    #[serde(default)]
    pub original: Vec<DataPoint>,
    #[serde(default)]
    pub smoothed: Vec<DataPoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmoothingResponse {
    pub n_observations: usize,
    pub original_obs: usize,
    #[serde(default)]
    pub comparison_data: Option<ComparisonData>,
    #[serde(default)]
    pub statistics: Option<Value>,
    #[serde(default)]
    pub acf_pacf: Option<Value>,
}

/// When the transform is removed the server only echoes `log_applied: false`.
#[derive(Debug, Clone, Deserialize)]
pub struct LogTransformResponse {
    #[serde(default)]
    pub log_applied: bool,
    #[serde(default)]
    pub n_observations: Option<usize>,
    #[serde(default)]
    pub original_obs: Option<usize>,
    #[serde(default)]
    pub data: Vec<DataPoint>,
    #[serde(default)]
    pub statistics: Option<Value>,
    #[serde(default)]
    pub acf_pacf: Option<Value>,
}

/// When order 0 is requested the server only echoes the order.
#[derive(Debug, Clone, Deserialize)]
pub struct DifferencingResponse {
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub n_observations: Option<usize>,
    #[serde(default)]
    pub original_obs: Option<usize>,
    #[serde(default)]
    pub removed_obs: Option<usize>,
    #[serde(default)]
    pub data: Vec<DataPoint>,
    #[serde(default)]
    pub statistics: Option<Value>,
    #[serde(default)]
    pub acf_pacf: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SplitResponse {
    pub train_obs: usize,
    pub test_obs: usize,
    #[serde(default)]
    pub total_obs: Option<usize>,
    #[serde(default)]
    pub train_start: Option<String>,
    #[serde(default)]
    pub train_end: Option<String>,
    #[serde(default)]
    pub test_start: Option<String>,
    #[serde(default)]
    pub test_end: Option<String>,
}

// -- Fitting --

/// SARIMAX order and estimation options. Field names follow the server's
/// JSON (`P`, `D`, `Q` are the seasonal orders).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SarimaxParams {
    #[serde(deserialize_with = "lenient::u32_or_zero")]
    pub p: u32,
    #[serde(deserialize_with = "lenient::u32_or_zero")]
    pub d: u32,
    #[serde(deserialize_with = "lenient::u32_or_zero")]
    pub q: u32,
    #[serde(rename = "P", deserialize_with = "lenient::u32_or_zero")]
    pub seasonal_p: u32,
    #[serde(rename = "D", deserialize_with = "lenient::u32_or_zero")]
    pub seasonal_d: u32,
    #[serde(rename = "Q", deserialize_with = "lenient::u32_or_zero")]
    pub seasonal_q: u32,
    #[serde(deserialize_with = "lenient::u32_or_zero")]
    pub m: u32,
    pub trend: String,
    pub enforce_stationarity: bool,
    pub enforce_invertibility: bool,
    pub cov_type: String,
}

impl Default for SarimaxParams {
    fn default() -> Self {
        Self {
            p: 1,
            d: 1,
            q: 1,
            seasonal_p: 0,
            seasonal_d: 0,
            seasonal_q: 0,
            m: 0,
            trend: "n".to_string(),
            enforce_stationarity: true,
            enforce_invertibility: true,
            cov_type: "robust_approx".to_string(),
        }
    }
}

impl SarimaxParams {
    pub fn is_seasonal(&self) -> bool {
        self.m > 0
    }

    pub fn label(&self) -> String {
        if self.is_seasonal() {
            format!(
                "SARIMA({},{},{})({},{},{},{})",
                self.p, self.d, self.q, self.seasonal_p, self.seasonal_d, self.seasonal_q, self.m
            )
        } else {
            format!("ARIMA({},{},{})", self.p, self.d, self.q)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FitRequest {
    #[serde(flatten)]
    pub params: SarimaxParams,
    pub acf_pacf_analyses: AcfPacfAnalysisSet,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FitResponse {
    pub model_id: ModelId,
    pub run_id: RunId,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub order: Option<String>,
    #[serde(default)]
    pub seasonal_order: Option<String>,
    #[serde(default)]
    pub aic: Option<f64>,
    #[serde(default)]
    pub bic: Option<f64>,
    #[serde(default)]
    pub is_seasonal: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coefficient {
    pub parameter: String,
    #[serde(default)]
    pub coefficient: Option<f64>,
    #[serde(default)]
    pub std_error: Option<f64>,
    #[serde(default)]
    pub t_value: Option<f64>,
    #[serde(default)]
    pub p_value: Option<f64>,
    #[serde(default)]
    pub ci_lower: Option<f64>,
    #[serde(default)]
    pub ci_upper: Option<f64>,
}

impl Coefficient {
    /// Conventional significance stars for the p-value.
    pub fn significance(&self) -> &'static str {
        match self.p_value {
            Some(p) if p < 0.001 => "***",
            Some(p) if p < 0.01 => "**",
            Some(p) if p < 0.05 => "*",
            _ => "",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    #[serde(default)]
    pub r_squared: Option<f64>,
    #[serde(default)]
    pub mape: Option<f64>,
    #[serde(default)]
    pub mae: Option<f64>,
    #[serde(default)]
    pub rmse: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionScore {
    #[serde(default)]
    pub test_r2: Option<f64>,
    #[serde(default)]
    pub test_mape: Option<f64>,
    #[serde(default)]
    pub combined_score: Option<f64>,
}

/// Transform chain and split a model was fitted with.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ConfigInfo {
    #[serde(default, deserialize_with = "lenient::opt_u32")]
    pub smoothing_window: Option<u32>,
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub log_transform: Option<bool>,
    #[serde(default, deserialize_with = "lenient::opt_u32")]
    pub differencing_order: Option<u32>,
    #[serde(default, deserialize_with = "lenient::opt_usize")]
    pub train_obs: Option<usize>,
    #[serde(default)]
    pub trend: Option<String>,
    #[serde(default)]
    pub acf_pacf_analyses: Option<AcfPacfAnalysisSet>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelResults {
    #[serde(default)]
    pub model_id: Option<ModelId>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub order: Option<String>,
    #[serde(default)]
    pub seasonal_order: Option<String>,
    #[serde(default)]
    pub aic: Option<f64>,
    #[serde(default)]
    pub bic: Option<f64>,
    #[serde(default)]
    pub is_seasonal: bool,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub selection_score: Option<SelectionScore>,
    #[serde(default)]
    pub coefficients: Vec<Coefficient>,
    #[serde(default)]
    pub model_summary: Option<String>,
    #[serde(default)]
    pub config_info: Option<ConfigInfo>,
    #[serde(default)]
    pub sarimax_params: Option<SarimaxParams>,
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricSet>,
    #[serde(default)]
    pub forecasts_count: usize,
}

impl ModelResults {
    /// The per-file endpoint answers `{"status": "no_model"}` before any fit.
    pub fn is_no_model(&self) -> bool {
        self.status.as_deref() == Some("no_model")
    }

    /// `ARIMA(1,1,1) x (0,1,1,12)` style label.
    pub fn order_label(&self) -> String {
        let order = self.order.clone().unwrap_or_else(|| "N/A".to_string());
        match &self.seasonal_order {
            Some(seasonal) => format!("{} x {}", order, seasonal),
            None => order,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: String,
    #[serde(default)]
    pub forecasted: Option<f64>,
    #[serde(default)]
    pub actual: Option<f64>,
    #[serde(default)]
    pub ci_lower: Option<f64>,
    #[serde(default)]
    pub ci_upper: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastSeries {
    #[serde(default)]
    pub data: Vec<ForecastPoint>,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastCharts {
    #[serde(default)]
    pub training: ForecastSeries,
    #[serde(default)]
    pub test: ForecastSeries,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub recommendation: Option<Recommendation>,
    #[serde(default)]
    pub error: Option<String>,
}

// -- History --

/// One persisted fitting attempt as listed by `/api/user/model-runs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRun {
    pub run_id: RunId,
    pub model_id: ModelId,
    #[serde(default)]
    pub file_id: Option<FileId>,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_u32")]
    pub smoothing_window: Option<u32>,
    #[serde(default, deserialize_with = "lenient::bool_or_false")]
    pub log_transform: bool,
    #[serde(default, deserialize_with = "lenient::opt_u32")]
    pub differencing_order: Option<u32>,
    #[serde(default, deserialize_with = "lenient::opt_usize")]
    pub train_obs: Option<usize>,
    #[serde(default, deserialize_with = "lenient::opt_usize")]
    pub total_obs: Option<usize>,
    #[serde(default, deserialize_with = "lenient::opt_usize")]
    pub test_obs: Option<usize>,
    #[serde(default)]
    pub sarimax_params: SarimaxParams,
    #[serde(default)]
    pub trend: Option<String>,
    #[serde(default)]
    pub aic: Option<f64>,
    #[serde(default)]
    pub bic: Option<f64>,
    #[serde(default)]
    pub test_r2: Option<f64>,
    #[serde(default)]
    pub test_mape: Option<f64>,
    #[serde(default)]
    pub order_string: Option<String>,
    #[serde(default)]
    pub seasonal_order_string: Option<String>,
    #[serde(default)]
    pub is_seasonal: bool,
    #[serde(default)]
    pub paper_path: Option<String>,
}

impl ModelRun {
    pub fn has_paper(&self) -> bool {
        self.paper_path.as_deref().map(|p| !p.is_empty()).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunsResponse {
    #[serde(default)]
    pub runs: Vec<ModelRun>,
}

/// Generic `{success, error}` acknowledgement (delete, paper generation).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub paper_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
