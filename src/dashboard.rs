use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::api::http::HttpApi;
use crate::api::types::{FileId, RegisterRequest, UploadResponse, User, UserFile};
use crate::api::DashboardApi;
use crate::auth::Auth;
use crate::config::DashConfig;
use crate::context::Context;
use crate::error::DashError;
use crate::history::HistoryManager;
use crate::invalidation::{invalidate, Stage};
use crate::pipeline::{Pipeline, PipelineState};
use crate::transform::default_train_observations;

/// Everything a front end needs, wired over one shared [`Context`].
pub struct Dashboard {
    config: DashConfig,
    ctx: Context,
    api: Arc<dyn DashboardApi>,
    auth: Auth,
    history: HistoryManager,
}

impl Dashboard {
    /// Dashboard talking to the server named in `config`.
    pub fn new(config: DashConfig) -> Result<Self, DashError> {
        config.validate()?;
        let api: Arc<dyn DashboardApi> = Arc::new(HttpApi::new(&config)?);
        Ok(Self::with_api(config, api))
    }

    pub fn with_api(config: DashConfig, api: Arc<dyn DashboardApi>) -> Self {
        let ctx = Context::new();
        let auth = Auth::new(ctx.clone(), api.clone(), config.clone());
        let history = HistoryManager::new(ctx.clone(), api.clone(), config.clone());
        Self {
            config,
            ctx,
            api,
            auth,
            history,
        }
    }

    pub fn config(&self) -> &DashConfig {
        &self.config
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn pipeline(&self) -> &Pipeline {
        self.history.pipeline()
    }

    /// Resume an existing server session, reopening the newest file.
    pub async fn start(&self) -> Result<Option<User>, DashError> {
        let user = self.auth.check_login_status().await?;
        if user.is_some() {
            self.refresh_after_login().await;
        }
        Ok(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User, DashError> {
        let user = self.auth.login(email, password).await?;
        self.refresh_after_login().await;
        Ok(user)
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<User, DashError> {
        let user = self.auth.register(request).await?;
        self.refresh_after_login().await;
        Ok(user)
    }

    pub async fn logout(&self) -> Result<(), DashError> {
        self.auth.logout().await
    }

    async fn refresh_after_login(&self) {
        match self.load_last_file().await {
            Ok(Some(_)) => {}
            Ok(None) => {
                if let Err(e) = self.history.list_runs().await {
                    warn!("Failed to load run history: {}", e);
                }
            }
            Err(e) => warn!("Failed to reopen last file: {}", e),
        }
    }

    /// Make `file_id` the active file with every option back to its default.
    fn activate_file(&self, file_id: FileId, n_observations: usize) {
        let ratio = self.config.default_train_ratio;
        self.ctx.with(|s| {
            s.session.reset_for_file(file_id, Some(n_observations));
            invalidate(s, Stage::Upload);
            s.reset_options();
            s.transform.train_observations = default_train_observations(n_observations, ratio);
            s.stage = PipelineState::Uploaded;
            s.pending_delete = None;
        });
    }

    /// Load the series of the active file, then the run history.
    async fn open_active_file(&self) -> Result<(), DashError> {
        self.pipeline().load_visualization().await?;
        if let Err(e) = self.history.list_runs().await {
            warn!("Failed to load run history: {}", e);
        }
        Ok(())
    }

    /// Upload a CSV file and make it the active file.
    pub async fn upload(&self, path: &Path) -> Result<UploadResponse, DashError> {
        self.ctx.with(|s| s.session.require_user().map(|_| ()))?;
        if !path.is_file() {
            return Err(DashError::validation(format!(
                "select a file to upload ({} not found)",
                path.display()
            )));
        }
        let is_csv = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if !is_csv {
            return Err(DashError::validation("only .csv files can be uploaded"));
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.csv".to_string());
        let contents = std::fs::read(path).map_err(|e| {
            DashError::validation(format!("cannot read {}: {}", path.display(), e))
        })?;

        let uploaded = self.api.upload_file(&file_name, contents).await?;
        info!(
            "Uploaded {} as file {} ({} observations)",
            uploaded.file_name, uploaded.file_id, uploaded.n_observations
        );
        self.activate_file(uploaded.file_id, uploaded.n_observations);
        self.open_active_file().await?;
        Ok(uploaded)
    }

    /// Reopen the most recently uploaded file, if the user has any.
    pub async fn load_last_file(&self) -> Result<Option<UserFile>, DashError> {
        self.ctx.with(|s| s.session.require_user().map(|_| ()))?;
        let files = self.api.list_files().await?;
        let Some(last) = files.into_iter().next() else {
            info!("No uploaded files yet");
            return Ok(None);
        };
        info!("Reopening file {} ({})", last.file_id, last.file_name);
        self.activate_file(last.file_id, last.n_observations);
        self.open_active_file().await?;
        self.restore_split(last.file_id).await;
        Ok(Some(last))
    }

    /// Carry over the train/test split the server still holds for a
    /// reopened file. Failures leave the split unapplied.
    async fn restore_split(&self, file_id: FileId) {
        let meta = match self.api.file_meta(file_id).await {
            Ok(meta) => meta,
            Err(e) => {
                warn!("Failed to load metadata for file {}: {}", file_id, e);
                return;
            }
        };
        let Some(ratio) = meta.train_split_ratio.filter(|r| *r > 0.0 && *r < 1.0) else {
            return;
        };
        self.ctx.with(|s| {
            if s.session.file_id() != Some(file_id) {
                return;
            }
            let Some(total) = s.session.total_observations() else {
                return;
            };
            let train = (total as f64 * ratio).round() as usize;
            match s.session.mark_split_applied(train) {
                Ok(sizes) => {
                    info!(
                        "Restored split of file {}: {} train / {} test",
                        file_id, sizes.train, sizes.test
                    );
                    s.transform.train_observations = Some(sizes.train);
                    s.stage = PipelineState::SplitApplied;
                }
                Err(e) => {
                    warn!("Ignoring stored split ratio {} of file {}: {}", ratio, file_id, e)
                }
            }
        });
    }
}
