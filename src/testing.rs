//! Scripted in-memory server for controller tests.
//!
//! Mirrors the observation arithmetic of the real transform chain:
//! smoothing with window `w` drops `w - 1` leading points, the log transform
//! drops non-positive values and differencing of order `d` drops `d` points.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde_json::json;
use tokio::sync::Notify;

use crate::api::types::*;
use crate::api::DashboardApi;
use crate::context::Context;
use crate::error::DashError;
use crate::recommendation::{AcfPacfAnalysisSet, Recommendation, SeriesType, TransformSuggestion};

struct FakeFile {
    file_id: FileId,
    name: String,
    values: Vec<f64>,
    window: u32,
    log: bool,
    order: u32,
    train: Option<usize>,
}

impl FakeFile {
    fn new(file_id: FileId, name: &str, values: Vec<f64>) -> Self {
        Self {
            file_id,
            name: name.to_string(),
            values,
            window: 1,
            log: false,
            order: 0,
            train: None,
        }
    }

    fn after_smoothing(&self) -> usize {
        self.values
            .len()
            .saturating_sub(self.window.saturating_sub(1) as usize)
    }

    fn after_log(&self) -> usize {
        let n = self.after_smoothing();
        if !self.log {
            return n;
        }
        let skip = self.values.len() - n;
        n - self.values.iter().skip(skip).filter(|v| **v <= 0.0).count()
    }

    fn count(&self) -> usize {
        self.after_log().saturating_sub(self.order as usize)
    }

    fn points(&self, n: usize) -> Vec<DataPoint> {
        (0..n)
            .map(|i| DataPoint {
                date: date_at(i),
                value: self.values.get(i).copied().unwrap_or(0.0),
            })
            .collect()
    }
}

#[derive(Default)]
struct FakeState {
    calls: Vec<String>,
    failing: HashSet<&'static str>,
    files: Vec<FakeFile>,
    runs: Vec<ModelRun>,
    analyses: HashMap<ModelId, AcfPacfAnalysisSet>,
    next_file_id: FileId,
    next_model_id: ModelId,
    next_run_id: RunId,
    user: Option<User>,
    papers: Vec<RunId>,
    recommendation: Option<Recommendation>,
    analysis_unavailable: bool,
    reject_delete: bool,
}

pub struct FakeServer {
    state: Mutex<FakeState>,
    gates: Mutex<HashMap<&'static str, Arc<Notify>>>,
}

fn date_at(i: usize) -> String {
    let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    (start + Duration::days(i as i64)).format("%Y-%m-%d").to_string()
}

fn created_at(run_id: RunId) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 3, 1)
        .and_then(|d| d.and_hms_opt(9, 0, 0))
        .unwrap()
        + Duration::minutes(run_id)
}

fn not_found(what: &str) -> DashError {
    DashError::Request {
        status: 404,
        message: format!("{} not found", what),
    }
}

fn bad_request(message: impl Into<String>) -> DashError {
    DashError::Request {
        status: 400,
        message: message.into(),
    }
}

pub fn fake_user() -> User {
    User {
        user_id: 1,
        name: "Ada".to_string(),
        surname: "Rossi".to_string(),
        email: "ada@example.com".to_string(),
    }
}

/// A persisted run with default parameters on a 100-observation file.
pub fn fake_run(run_id: RunId, model_id: ModelId, file_id: FileId) -> ModelRun {
    ModelRun {
        run_id,
        model_id,
        file_id: Some(file_id),
        created_at: Some(created_at(run_id)),
        file_name: Some("sales.csv".to_string()),
        smoothing_window: Some(1),
        log_transform: false,
        differencing_order: Some(0),
        train_obs: Some(80),
        total_obs: Some(100),
        test_obs: Some(20),
        sarimax_params: SarimaxParams::default(),
        trend: Some("n".to_string()),
        aic: Some(120.0),
        bic: Some(125.0),
        test_r2: Some(0.9),
        test_mape: Some(3.5),
        order_string: Some("(1, 1, 1)".to_string()),
        seasonal_order_string: None,
        is_seasonal: false,
        paper_path: None,
    }
}

/// Context with a logged-in user and no file.
pub fn logged_in_context() -> Context {
    let ctx = Context::new();
    ctx.with(|s| s.session.set_user(Some(fake_user())));
    ctx
}

/// Context with a logged-in user and file 1 (100 observations) active.
pub fn context_with_file() -> Context {
    let ctx = logged_in_context();
    ctx.with(|s| s.session.reset_for_file(1, Some(100)));
    ctx
}

impl FakeServer {
    /// Server holding file 1, `sales.csv`, with 100 positive observations.
    pub fn new() -> Self {
        let mut state = FakeState {
            next_file_id: 2,
            next_model_id: 100,
            next_run_id: 1000,
            ..FakeState::default()
        };
        let values = (1..=100).map(|v| v as f64).collect();
        state.files.push(FakeFile::new(1, "sales.csv", values));
        Self {
            state: Mutex::new(state),
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// `runs` are given newest first, as the server lists them.
    pub fn with_runs(runs: Vec<ModelRun>) -> Self {
        let server = Self::new();
        server.state().runs = runs;
        server
    }

    pub fn with_paper(mut run: ModelRun) -> ModelRun {
        run.paper_path = Some(format!("papers/run_{}.pdf", run.run_id));
        run
    }

    pub fn add_file(&self, name: &str, values: Vec<f64>) -> FileId {
        let mut state = self.state();
        let file_id = state.next_file_id;
        state.next_file_id += 1;
        state.files.push(FakeFile::new(file_id, name, values));
        file_id
    }

    /// Make every later call to `endpoint` fail with HTTP 500.
    pub fn fail(&self, endpoint: &'static str) {
        self.state().failing.insert(endpoint);
    }

    pub fn recover(&self, endpoint: &'static str) {
        self.state().failing.remove(endpoint);
    }

    /// Hold calls to `endpoint` until the returned gate is notified.
    pub fn gate(&self, endpoint: &'static str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.gates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(endpoint, notify.clone());
        notify
    }

    pub fn set_recommendation(&self, recommendation: Recommendation) {
        self.state().recommendation = Some(recommendation);
    }

    pub fn disable_analysis(&self) {
        self.state().analysis_unavailable = true;
    }

    pub fn reject_deletes(&self) {
        self.state().reject_delete = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn calls_to(&self, endpoint: &str) -> usize {
        self.state().calls.iter().filter(|c| c.as_str() == endpoint).count()
    }

    pub fn papers_generated(&self) -> Vec<RunId> {
        self.state().papers.clone()
    }

    /// Runs newest first.
    pub fn runs(&self) -> Vec<ModelRun> {
        self.state().runs.clone()
    }

    /// Server-side `(window, log, order, train)` of a file.
    pub fn file_config(&self, file_id: FileId) -> Option<(u32, bool, u32, Option<usize>)> {
        self.state()
            .files
            .iter()
            .find(|f| f.file_id == file_id)
            .map(|f| (f.window, f.log, f.order, f.train))
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn enter(&self, endpoint: &'static str) -> Result<(), DashError> {
        self.state().calls.push(endpoint.to_string());
        let gate = self
            .gates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(endpoint)
            .cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.state().failing.contains(endpoint) {
            return Err(DashError::Request {
                status: 500,
                message: format!("{} failed", endpoint),
            });
        }
        Ok(())
    }

    fn with_file<R>(
        &self,
        file_id: FileId,
        f: impl FnOnce(&mut FakeFile) -> Result<R, DashError>,
    ) -> Result<R, DashError> {
        let mut state = self.state();
        let file = state
            .files
            .iter_mut()
            .find(|f| f.file_id == file_id)
            .ok_or_else(|| not_found("File"))?;
        f(file)
    }

    fn results_for(state: &FakeState, model_id: ModelId) -> Option<ModelResults> {
        let run = state.runs.iter().find(|r| r.model_id == model_id)?;
        let mut metrics = BTreeMap::new();
        metrics.insert(
            "test".to_string(),
            MetricSet {
                r_squared: run.test_r2,
                mape: run.test_mape,
                mae: Some(1.2),
                rmse: Some(1.5),
            },
        );
        Some(ModelResults {
            model_id: Some(model_id),
            status: Some("success".to_string()),
            order: Some(run.sarimax_params.label()),
            aic: run.aic,
            bic: run.bic,
            is_seasonal: run.sarimax_params.is_seasonal(),
            file_name: run.file_name.clone(),
            coefficients: vec![Coefficient {
                parameter: "ar.L1".to_string(),
                coefficient: Some(0.42),
                std_error: Some(0.1),
                t_value: Some(4.2),
                p_value: Some(0.0001),
                ci_lower: Some(0.22),
                ci_upper: Some(0.62),
            }],
            model_summary: Some(format!("SARIMAX Results for model {}", model_id)),
            config_info: Some(ConfigInfo {
                smoothing_window: run.smoothing_window,
                log_transform: Some(run.log_transform),
                differencing_order: run.differencing_order,
                train_obs: run.train_obs,
                trend: run.trend.clone(),
                acf_pacf_analyses: state.analyses.get(&model_id).cloned(),
            }),
            sarimax_params: Some(run.sarimax_params.clone()),
            metrics,
            forecasts_count: run.test_obs.unwrap_or(0),
            ..ModelResults::default()
        })
    }
}

#[async_trait]
impl DashboardApi for FakeServer {
    async fn login(&self, request: &LoginRequest) -> Result<User, DashError> {
        self.enter("login").await?;
        if request.password == "wrong" {
            return Err(DashError::Request {
                status: 401,
                message: "Invalid email or password".to_string(),
            });
        }
        let user = User {
            email: request.email.clone(),
            ..fake_user()
        };
        self.state().user = Some(user.clone());
        Ok(user)
    }

    async fn register(&self, request: &RegisterRequest) -> Result<User, DashError> {
        self.enter("register").await?;
        let user = User {
            user_id: 2,
            name: request.name.clone(),
            surname: request.surname.clone(),
            email: request.email.clone(),
        };
        self.state().user = Some(user.clone());
        Ok(user)
    }

    async fn logout(&self) -> Result<(), DashError> {
        self.enter("logout").await?;
        self.state().user = None;
        Ok(())
    }

    async fn current_user(&self) -> Result<Option<User>, DashError> {
        self.enter("current_user").await?;
        Ok(self.state().user.clone())
    }

    async fn update_profile(&self, request: &ProfileUpdate) -> Result<User, DashError> {
        self.enter("update_profile").await?;
        let user = User {
            name: request.name.clone(),
            surname: request.surname.clone(),
            email: request.email.clone(),
            ..fake_user()
        };
        self.state().user = Some(user.clone());
        Ok(user)
    }

    async fn change_password(&self, request: &PasswordChange) -> Result<(), DashError> {
        self.enter("change_password").await?;
        if request.current_password == "wrong" {
            return Err(bad_request("Current password is incorrect"));
        }
        Ok(())
    }

    async fn upload_file(
        &self,
        file_name: &str,
        contents: Vec<u8>,
    ) -> Result<UploadResponse, DashError> {
        self.enter("upload_file").await?;
        let text = String::from_utf8_lossy(&contents);
        let values: Vec<f64> = text
            .lines()
            .skip(1)
            .filter(|l| !l.trim().is_empty())
            .map(|l| {
                l.rsplit(',')
                    .next()
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(0.0)
            })
            .collect();
        if values.is_empty() {
            return Err(bad_request("The file contains no observations"));
        }
        let n_observations = values.len();
        let file_id = self.add_file(file_name, values);
        Ok(UploadResponse {
            file_id,
            file_name: file_name.to_string(),
            n_observations,
        })
    }

    async fn list_files(&self) -> Result<Vec<UserFile>, DashError> {
        self.enter("list_files").await?;
        let state = self.state();
        Ok(state
            .files
            .iter()
            .rev()
            .map(|f| UserFile {
                file_id: f.file_id,
                file_name: f.name.clone(),
                n_observations: f.values.len(),
                uploaded_at: None,
                has_model: state.runs.iter().any(|r| r.file_id == Some(f.file_id)),
            })
            .collect())
    }

    async fn file_data(&self, file_id: FileId) -> Result<FileData, DashError> {
        self.enter("file_data").await?;
        self.with_file(file_id, |f| {
            let n = f.values.len();
            Ok(FileData {
                data: f.points(n),
                statistics: Some(json!({ "count": n })),
                acf_pacf: Some(json!({ "acf": [], "pacf": [] })),
                date_range: Some(DateRange {
                    start: date_at(0),
                    end: date_at(n.saturating_sub(1)),
                }),
                is_smoothed: f.window > 1,
            })
        })
    }

    async fn file_meta(&self, file_id: FileId) -> Result<FileMeta, DashError> {
        self.enter("file_meta").await?;
        self.with_file(file_id, |f| {
            let count = f.count();
            Ok(FileMeta {
                train_split_ratio: f.train.map(|t| t as f64 / count.max(1) as f64),
            })
        })
    }

    async fn apply_smoothing(
        &self,
        file_id: FileId,
        window_size: u32,
    ) -> Result<SmoothingResponse, DashError> {
        self.enter("apply_smoothing").await?;
        if !(1..=20).contains(&window_size) {
            return Err(bad_request("window_size must be between 1 and 20"));
        }
        self.with_file(file_id, |f| {
            f.window = window_size;
            let n = f.after_smoothing();
            Ok(SmoothingResponse {
                n_observations: n,
                original_obs: f.values.len(),
                comparison_data: Some(ComparisonData {
                    original: f.points(f.values.len()),
                    smoothed: f.points(n),
                }),
                statistics: Some(json!({ "count": n })),
                acf_pacf: None,
            })
        })
    }

    async fn apply_log_transform(
        &self,
        file_id: FileId,
        apply_log: bool,
    ) -> Result<LogTransformResponse, DashError> {
        self.enter("apply_log_transform").await?;
        self.with_file(file_id, |f| {
            f.log = apply_log;
            if !apply_log {
                return Ok(LogTransformResponse {
                    log_applied: false,
                    n_observations: None,
                    original_obs: None,
                    data: Vec::new(),
                    statistics: None,
                    acf_pacf: None,
                });
            }
            let n = f.after_log();
            Ok(LogTransformResponse {
                log_applied: true,
                n_observations: Some(n),
                original_obs: Some(f.after_smoothing()),
                data: f.points(n),
                statistics: Some(json!({ "count": n })),
                acf_pacf: None,
            })
        })
    }

    async fn apply_differencing(
        &self,
        file_id: FileId,
        order: u32,
    ) -> Result<DifferencingResponse, DashError> {
        self.enter("apply_differencing").await?;
        if order > 5 {
            return Err(bad_request("order must be between 0 and 5"));
        }
        self.with_file(file_id, |f| {
            f.order = order;
            if order == 0 {
                return Ok(DifferencingResponse {
                    order: 0,
                    n_observations: None,
                    original_obs: None,
                    removed_obs: None,
                    data: Vec::new(),
                    statistics: None,
                    acf_pacf: None,
                });
            }
            let n = f.count();
            Ok(DifferencingResponse {
                order,
                n_observations: Some(n),
                original_obs: Some(f.after_log()),
                removed_obs: Some(f.after_log() - n),
                data: f.points(n),
                statistics: Some(json!({ "count": n })),
                acf_pacf: None,
            })
        })
    }

    async fn apply_split(
        &self,
        file_id: FileId,
        train_obs: usize,
    ) -> Result<SplitResponse, DashError> {
        self.enter("apply_split").await?;
        self.with_file(file_id, |f| {
            let total = f.count();
            if train_obs < 1 || train_obs >= total {
                return Err(bad_request(format!(
                    "train_obs must be less than the total number of observations ({})",
                    total
                )));
            }
            f.train = Some(train_obs);
            Ok(SplitResponse {
                train_obs,
                test_obs: total - train_obs,
                total_obs: Some(total),
                train_start: Some(date_at(0)),
                train_end: Some(date_at(train_obs - 1)),
                test_start: Some(date_at(train_obs)),
                test_end: Some(date_at(total - 1)),
            })
        })
    }

    async fn fit_sarimax(
        &self,
        file_id: FileId,
        request: &FitRequest,
    ) -> Result<FitResponse, DashError> {
        self.enter("fit_sarimax").await?;
        let mut state = self.state();
        let (name, window, log, order, train, total) = {
            let file = state
                .files
                .iter()
                .find(|f| f.file_id == file_id)
                .ok_or_else(|| not_found("File"))?;
            let train = file.train.ok_or_else(|| bad_request("Apply the split first"))?;
            (file.name.clone(), file.window, file.log, file.order, train, file.count())
        };

        let model_id = state.next_model_id;
        let run_id = state.next_run_id;
        state.next_model_id += 1;
        state.next_run_id += 1;

        let run = ModelRun {
            run_id,
            model_id,
            file_id: Some(file_id),
            created_at: Some(created_at(run_id)),
            file_name: Some(name),
            smoothing_window: Some(window),
            log_transform: log,
            differencing_order: Some(order),
            train_obs: Some(train),
            total_obs: Some(total),
            test_obs: Some(total.saturating_sub(train)),
            sarimax_params: request.params.clone(),
            trend: Some(request.params.trend.clone()),
            aic: Some(110.0),
            bic: Some(118.0),
            test_r2: Some(0.87),
            test_mape: Some(4.2),
            order_string: Some(format!(
                "({}, {}, {})",
                request.params.p, request.params.d, request.params.q
            )),
            seasonal_order_string: None,
            is_seasonal: request.params.is_seasonal(),
            paper_path: None,
        };
        state.runs.insert(0, run);
        state.analyses.insert(model_id, request.acf_pacf_analyses.clone());

        Ok(FitResponse {
            model_id,
            run_id,
            status: Some("success".to_string()),
            order: Some(request.params.label()),
            seasonal_order: None,
            aic: Some(110.0),
            bic: Some(118.0),
            is_seasonal: request.params.is_seasonal(),
        })
    }

    async fn model_results(&self, model_id: ModelId) -> Result<ModelResults, DashError> {
        self.enter("model_results").await?;
        Self::results_for(&self.state(), model_id).ok_or_else(|| not_found("Model"))
    }

    async fn file_model(&self, file_id: FileId) -> Result<ModelResults, DashError> {
        self.enter("file_model").await?;
        let state = self.state();
        let latest = state
            .runs
            .iter()
            .find(|r| r.file_id == Some(file_id))
            .map(|r| r.model_id);
        match latest.and_then(|model_id| Self::results_for(&state, model_id)) {
            Some(results) => Ok(results),
            None => Ok(ModelResults {
                status: Some("no_model".to_string()),
                ..ModelResults::default()
            }),
        }
    }

    async fn forecast_charts(&self, model_id: ModelId) -> Result<ForecastCharts, DashError> {
        self.enter("forecast_charts").await?;
        let state = self.state();
        let run = state
            .runs
            .iter()
            .find(|r| r.model_id == model_id)
            .ok_or_else(|| not_found("Model"))?;
        let train = run.train_obs.unwrap_or(0);
        let point = |i: usize| ForecastPoint {
            date: date_at(i),
            forecasted: Some(i as f64),
            actual: Some(i as f64 + 0.5),
            ci_lower: None,
            ci_upper: None,
        };
        Ok(ForecastCharts {
            training: ForecastSeries {
                data: (0..train).map(point).collect(),
                label: Some("Training".to_string()),
            },
            test: ForecastSeries {
                data: (train..run.total_obs.unwrap_or(train)).map(point).collect(),
                label: Some("Test".to_string()),
            },
        })
    }

    async fn analyze_acf_pacf(
        &self,
        file_id: FileId,
        series: SeriesType,
    ) -> Result<AnalysisResponse, DashError> {
        self.enter("analyze_acf_pacf").await?;
        let state = self.state();
        if !state.files.iter().any(|f| f.file_id == file_id) {
            return Err(not_found("File"));
        }
        if state.analysis_unavailable {
            return Ok(AnalysisResponse {
                success: false,
                description: None,
                recommendation: None,
                error: Some("Analysis service unavailable".to_string()),
            });
        }
        let recommendation = state.recommendation.clone().unwrap_or(Recommendation::Arima {
            p: 1,
            d: 0,
            q: 1,
            transform_suggestion: TransformSuggestion::default(),
        });
        Ok(AnalysisResponse {
            success: true,
            description: Some(format!("ACF/PACF of the {}", series.display_name())),
            recommendation: Some(recommendation),
            error: None,
        })
    }

    async fn list_runs(&self) -> Result<Vec<ModelRun>, DashError> {
        self.enter("list_runs").await?;
        Ok(self.state().runs.clone())
    }

    async fn delete_run(&self, run_id: RunId) -> Result<Ack, DashError> {
        self.enter("delete_run").await?;
        let mut state = self.state();
        if state.reject_delete {
            return Ok(Ack {
                success: false,
                error: Some("Run could not be deleted".to_string()),
                paper_path: None,
            });
        }
        let before = state.runs.len();
        state.runs.retain(|r| r.run_id != run_id);
        if state.runs.len() == before {
            return Err(not_found("Run"));
        }
        Ok(Ack {
            success: true,
            ..Ack::default()
        })
    }

    async fn generate_paper(&self, run_id: RunId) -> Result<Ack, DashError> {
        self.enter("generate_paper").await?;
        let mut state = self.state();
        let path = format!("papers/run_{}.pdf", run_id);
        let run = state
            .runs
            .iter_mut()
            .find(|r| r.run_id == run_id)
            .ok_or_else(|| not_found("Run"))?;
        run.paper_path = Some(path.clone());
        state.papers.push(run_id);
        Ok(Ack {
            success: true,
            error: None,
            paper_path: Some(path),
        })
    }
}
