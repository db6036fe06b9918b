use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use url::Url;

use super::types::*;
use super::DashboardApi;
use crate::config::DashConfig;
use crate::error::DashError;
use crate::recommendation::SeriesType;

/// reqwest-backed API client. The cookie store carries the login session,
/// so one client must be shared by everything acting for the same user.
pub struct HttpApi {
    client: reqwest::Client,
    base: Url,
}

impl HttpApi {
    /// Build a client with:
    /// - a cookie store for the session cookie
    /// - User-Agent: SyriasDash/1.0
    /// - the configured request timeout (fits can take minutes)
    pub fn new(config: &DashConfig) -> Result<Self, DashError> {
        let client = reqwest::Client::builder()
            .user_agent("SyriasDash/1.0")
            .cookie_store(true)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| DashError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base: config.base()?,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, DashError> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| DashError::Config(format!("Invalid API path '{}': {}", path, e)))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, DashError> {
        let url = self.endpoint(path)?;
        debug!("GET {}", url);
        self.send(self.client.get(url)).await
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, DashError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        debug!("POST {}", url);
        self.send(self.client.post(url).json(body)).await
    }

    async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T, DashError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        debug!("PUT {}", url);
        self.send(self.client.put(url).json(body)).await
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, DashError> {
        let response = request.send().await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, DashError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = error_message(status, &body);
        warn!("Request failed with {}: {}", status.as_u16(), message);
        return Err(DashError::Request {
            status: status.as_u16(),
            message,
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|e| DashError::Decode(e.to_string()))
}

/// Extract `{"error": "..."}` from a failed response, falling back to the
/// status line when the body is not the server's JSON error shape.
pub fn error_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) if !parsed.error.trim().is_empty() => parsed.error,
        _ => format!(
            "HTTP {}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown")
        ),
    }
}

#[async_trait]
impl DashboardApi for HttpApi {
    async fn login(&self, request: &LoginRequest) -> Result<User, DashError> {
        let response: AuthResponse = self.post_json("api/login", request).await?;
        info!("Logged in as {}", response.user.email);
        Ok(response.user)
    }

    async fn register(&self, request: &RegisterRequest) -> Result<User, DashError> {
        let response: AuthResponse = self.post_json("api/register", request).await?;
        info!("Registered {}", response.user.email);
        Ok(response.user)
    }

    async fn logout(&self) -> Result<(), DashError> {
        let _: Ack = self.post_json("api/logout", &json!({})).await?;
        Ok(())
    }

    async fn current_user(&self) -> Result<Option<User>, DashError> {
        match self.get_json::<User>("api/user/current").await {
            Ok(user) => Ok(Some(user)),
            Err(DashError::Request { status, .. })
                if status == StatusCode::UNAUTHORIZED.as_u16() =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn update_profile(&self, request: &ProfileUpdate) -> Result<User, DashError> {
        let response: AuthResponse = self.put_json("api/user/profile", request).await?;
        Ok(response.user)
    }

    async fn change_password(&self, request: &PasswordChange) -> Result<(), DashError> {
        let _: Ack = self.put_json("api/user/password", request).await?;
        Ok(())
    }

    async fn upload_file(
        &self,
        file_name: &str,
        contents: Vec<u8>,
    ) -> Result<UploadResponse, DashError> {
        let url = self.endpoint("api/upload-temp")?;
        let part = Part::bytes(contents)
            .file_name(file_name.to_string())
            .mime_str("text/csv")
            .map_err(|e| DashError::Network(format!("Failed to build upload body: {}", e)))?;
        let form = Form::new().part("file", part);
        info!("Uploading {} to {}", file_name, url);
        self.send(self.client.post(url).multipart(form)).await
    }

    async fn list_files(&self) -> Result<Vec<UserFile>, DashError> {
        let response: FilesResponse = self.get_json("api/user/files").await?;
        Ok(response.files)
    }

    async fn file_data(&self, file_id: FileId) -> Result<FileData, DashError> {
        self.get_json(&format!("api/file/{}/data", file_id)).await
    }

    async fn file_meta(&self, file_id: FileId) -> Result<FileMeta, DashError> {
        self.get_json(&format!("api/file/{}", file_id)).await
    }

    async fn apply_smoothing(
        &self,
        file_id: FileId,
        window_size: u32,
    ) -> Result<SmoothingResponse, DashError> {
        self.post_json(
            &format!("api/file/{}/apply-smoothing", file_id),
            &json!({ "window_size": window_size }),
        )
        .await
    }

    async fn apply_log_transform(
        &self,
        file_id: FileId,
        apply_log: bool,
    ) -> Result<LogTransformResponse, DashError> {
        self.post_json(
            &format!("api/file/{}/apply-log-transform", file_id),
            &json!({ "apply_log": apply_log }),
        )
        .await
    }

    async fn apply_differencing(
        &self,
        file_id: FileId,
        order: u32,
    ) -> Result<DifferencingResponse, DashError> {
        self.post_json(
            &format!("api/file/{}/apply-differencing", file_id),
            &json!({ "order": order }),
        )
        .await
    }

    async fn apply_split(
        &self,
        file_id: FileId,
        train_obs: usize,
    ) -> Result<SplitResponse, DashError> {
        self.post_json(
            &format!("api/file/{}/apply-split", file_id),
            &json!({ "train_obs": train_obs }),
        )
        .await
    }

    async fn fit_sarimax(
        &self,
        file_id: FileId,
        request: &FitRequest,
    ) -> Result<FitResponse, DashError> {
        info!("Fitting {} on file {}", request.params.label(), file_id);
        self.post_json(&format!("api/file/{}/fit-sarimax", file_id), request)
            .await
    }

    async fn model_results(&self, model_id: ModelId) -> Result<ModelResults, DashError> {
        self.get_json(&format!("api/model/{}/results", model_id)).await
    }

    async fn file_model(&self, file_id: FileId) -> Result<ModelResults, DashError> {
        self.get_json(&format!("api/file/{}/model", file_id)).await
    }

    async fn forecast_charts(&self, model_id: ModelId) -> Result<ForecastCharts, DashError> {
        self.get_json(&format!("api/model/{}/forecasts-chart", model_id))
            .await
    }

    async fn analyze_acf_pacf(
        &self,
        file_id: FileId,
        series: SeriesType,
    ) -> Result<AnalysisResponse, DashError> {
        self.post_json(
            &format!("api/file/{}/analyze-acf-pacf-ai", file_id),
            &json!({ "series_type": series }),
        )
        .await
    }

    async fn list_runs(&self) -> Result<Vec<ModelRun>, DashError> {
        let response: RunsResponse = self.get_json("api/user/model-runs").await?;
        debug!("Fetched {} model runs", response.runs.len());
        Ok(response.runs)
    }

    async fn delete_run(&self, run_id: RunId) -> Result<Ack, DashError> {
        let url = self.endpoint(&format!("api/model-run/{}", run_id))?;
        info!("DELETE {}", url);
        self.send(self.client.delete(url)).await
    }

    async fn generate_paper(&self, run_id: RunId) -> Result<Ack, DashError> {
        self.post_json(
            &format!("api/model-run/{}/generate-paper", run_id),
            &json!({}),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_from_json_body() {
        let msg = error_message(
            StatusCode::BAD_REQUEST,
            r#"{"error": "window_size must be between 1 and 20"}"#,
        );
        assert_eq!(msg, "window_size must be between 1 and 20");
    }

    #[test]
    fn test_error_message_falls_back_to_status() {
        let msg = error_message(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>");
        assert_eq!(msg, "HTTP 502: Bad Gateway");

        let msg = error_message(StatusCode::INTERNAL_SERVER_ERROR, r#"{"error": "  "}"#);
        assert_eq!(msg, "HTTP 500: Internal Server Error");
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let config = DashConfig {
            base_url: "http://localhost:5000/dash".to_string(),
            ..DashConfig::default()
        };
        let api = HttpApi::new(&config).unwrap();
        let url = api.endpoint("/api/file/3/apply-split").unwrap();
        assert_eq!(url.as_str(), "http://localhost:5000/dash/api/file/3/apply-split");
    }
}
