use std::sync::Arc;

use tracing::info;

use crate::api::types::{LoginRequest, PasswordChange, ProfileUpdate, RegisterRequest, User};
use crate::api::DashboardApi;
use crate::config::DashConfig;
use crate::context::{AppState, Context};
use crate::error::DashError;
use crate::invalidation::{invalidate, Stage};
use crate::pipeline::PipelineState;

/// Reject the request when any `(label, value)` pair is blank.
fn require_fields(fields: &[(&str, &str)]) -> Result<(), DashError> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(label, _)| *label)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(DashError::validation(format!(
            "fill in all fields (missing: {})",
            missing.join(", ")
        )))
    }
}

/// Forget every file, model and option of the previous session, then
/// install `user`. The epoch keeps advancing so in-flight requests go stale.
fn reset_session(s: &mut AppState, stage: Stage, user: Option<User>) {
    s.session.reset_all();
    invalidate(s, stage);
    s.reset_options();
    s.stage = PipelineState::Empty;
    s.history.clear();
    s.pending_delete = None;
    s.session.set_user(user);
}

pub struct Auth {
    ctx: Context,
    api: Arc<dyn DashboardApi>,
    config: DashConfig,
}

impl Auth {
    pub fn new(ctx: Context, api: Arc<dyn DashboardApi>, config: DashConfig) -> Self {
        Self { ctx, api, config }
    }

    fn check_password_len(&self, password: &str) -> Result<(), DashError> {
        if password.chars().count() < self.config.min_password_len {
            return Err(DashError::validation(format!(
                "password must be at least {} characters",
                self.config.min_password_len
            )));
        }
        Ok(())
    }

    /// Ask the server whether the session cookie is still valid.
    pub async fn check_login_status(&self) -> Result<Option<User>, DashError> {
        let user = self.api.current_user().await?;
        match &user {
            Some(u) => info!("Session active for {}", u.email),
            None => info!("No active session"),
        }
        self.ctx.with(|s| {
            let same_user = match (s.session.user(), &user) {
                (Some(current), Some(found)) => current.user_id == found.user_id,
                _ => false,
            };
            if same_user {
                s.session.set_user(user.clone());
            } else {
                reset_session(s, Stage::Login, user.clone());
            }
        });
        Ok(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User, DashError> {
        require_fields(&[("email", email), ("password", password)])?;
        let request = LoginRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        let user = self.api.login(&request).await?;
        info!("Logged in as {}", user.email);
        self.ctx.with(|s| reset_session(s, Stage::Login, Some(user.clone())));
        Ok(user)
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<User, DashError> {
        require_fields(&[
            ("name", &request.name),
            ("surname", &request.surname),
            ("email", &request.email),
            ("password", &request.password),
        ])?;
        self.check_password_len(&request.password)?;

        let user = self.api.register(&request).await?;
        info!("Registered {}", user.email);
        self.ctx.with(|s| reset_session(s, Stage::Login, Some(user.clone())));
        Ok(user)
    }

    /// End the server session and forget all client state.
    pub async fn logout(&self) -> Result<(), DashError> {
        self.api.logout().await?;
        self.ctx.with(|s| reset_session(s, Stage::Logout, None));
        info!("Logged out");
        Ok(())
    }

    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<User, DashError> {
        self.ctx.with(|s| s.session.require_user().map(|_| ()))?;
        require_fields(&[
            ("name", &update.name),
            ("surname", &update.surname),
            ("email", &update.email),
        ])?;
        let user = self.api.update_profile(&update).await?;
        self.ctx.with(|s| s.session.set_user(Some(user.clone())));
        Ok(user)
    }

    pub async fn change_password(&self, change: PasswordChange) -> Result<(), DashError> {
        self.ctx.with(|s| s.session.require_user().map(|_| ()))?;
        require_fields(&[
            ("current password", &change.current_password),
            ("new password", &change.new_password),
            ("confirmation", &change.confirm_password),
        ])?;
        self.check_password_len(&change.new_password)?;
        if change.new_password != change.confirm_password {
            return Err(DashError::validation("the new passwords do not match"));
        }
        self.api.change_password(&change).await?;
        info!("Password changed");
        Ok(())
    }
}
