//! Client side of the dashboard server's HTTP JSON API.
//!
//! [`DashboardApi`] is the seam every controller component talks through;
//! [`http::HttpApi`] is the production implementation.

pub mod http;
pub mod lenient;
pub mod types;

use async_trait::async_trait;

use crate::error::DashError;
use crate::recommendation::SeriesType;

use self::types::*;

#[async_trait]
pub trait DashboardApi: Send + Sync {
    async fn login(&self, request: &LoginRequest) -> Result<User, DashError>;
    async fn register(&self, request: &RegisterRequest) -> Result<User, DashError>;
    async fn logout(&self) -> Result<(), DashError>;
    /// `None` when the session cookie is missing or expired.
    async fn current_user(&self) -> Result<Option<User>, DashError>;
    async fn update_profile(&self, request: &ProfileUpdate) -> Result<User, DashError>;
    async fn change_password(&self, request: &PasswordChange) -> Result<(), DashError>;

    async fn upload_file(
        &self,
        file_name: &str,
        contents: Vec<u8>,
    ) -> Result<UploadResponse, DashError>;
    /// The user's files, most recently uploaded first.
    async fn list_files(&self) -> Result<Vec<UserFile>, DashError>;
    async fn file_data(&self, file_id: FileId) -> Result<FileData, DashError>;
    async fn file_meta(&self, file_id: FileId) -> Result<FileMeta, DashError>;

    async fn apply_smoothing(
        &self,
        file_id: FileId,
        window_size: u32,
    ) -> Result<SmoothingResponse, DashError>;
    async fn apply_log_transform(
        &self,
        file_id: FileId,
        apply_log: bool,
    ) -> Result<LogTransformResponse, DashError>;
    async fn apply_differencing(
        &self,
        file_id: FileId,
        order: u32,
    ) -> Result<DifferencingResponse, DashError>;
    async fn apply_split(
        &self,
        file_id: FileId,
        train_obs: usize,
    ) -> Result<SplitResponse, DashError>;

    async fn fit_sarimax(
        &self,
        file_id: FileId,
        request: &FitRequest,
    ) -> Result<FitResponse, DashError>;
    async fn model_results(&self, model_id: ModelId) -> Result<ModelResults, DashError>;
    /// Results of the latest model fitted on a file.
    async fn file_model(&self, file_id: FileId) -> Result<ModelResults, DashError>;
    async fn forecast_charts(&self, model_id: ModelId) -> Result<ForecastCharts, DashError>;
    async fn analyze_acf_pacf(
        &self,
        file_id: FileId,
        series: SeriesType,
    ) -> Result<AnalysisResponse, DashError>;

    /// Every run of the current user, newest first.
    async fn list_runs(&self) -> Result<Vec<ModelRun>, DashError>;
    async fn delete_run(&self, run_id: RunId) -> Result<Ack, DashError>;
    async fn generate_paper(&self, run_id: RunId) -> Result<Ack, DashError>;
}
