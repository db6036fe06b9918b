//! Generate/open action for a run's paper report.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use url::Url;

use crate::api::types::{ModelId, RunId};
use crate::api::DashboardApi;
use crate::config::DashConfig;
use crate::context::Context;
use crate::error::DashError;
use crate::history;

/// Exactly one paper action is offered at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum PaperAction {
    #[default]
    Hidden,
    Generate,
    Open { url: String },
}

/// `<base>/paper?run_id=<id>`
pub fn paper_url(base: &Url, run_id: RunId) -> Result<Url, DashError> {
    let mut url = base
        .join("paper")
        .map_err(|e| DashError::Config(format!("Invalid paper URL: {}", e)))?;
    url.query_pairs_mut()
        .append_pair("run_id", &run_id.to_string());
    Ok(url)
}

pub struct PaperLinks {
    ctx: Context,
    api: Arc<dyn DashboardApi>,
    config: DashConfig,
}

impl PaperLinks {
    pub fn new(ctx: Context, api: Arc<dyn DashboardApi>, config: DashConfig) -> Self {
        Self { ctx, api, config }
    }

    fn open_action(&self, run_id: RunId) -> Result<PaperAction, DashError> {
        let url = paper_url(&self.config.base()?, run_id)?;
        Ok(PaperAction::Open {
            url: url.to_string(),
        })
    }

    /// Refetch the run list and offer "open" when the run already has a
    /// paper, "generate" otherwise.
    pub async fn check_state(&self, run_id: RunId) -> Result<PaperAction, DashError> {
        let ticket = self.ctx.with(|s| s.session.ticket());
        let runs = self.api.list_runs().await?;

        let action = match runs.iter().find(|r| r.run_id == run_id) {
            Some(run) if run.has_paper() => self.open_action(run_id)?,
            _ => PaperAction::Generate,
        };

        self.ctx.apply_if_current(&ticket, "paper state", |s| {
            s.history = history::rows_from_runs(runs);
            s.results.paper = action.clone();
            Ok(())
        })?;
        Ok(action)
    }

    /// Generate the paper for the run that produced `model_id`. The run is
    /// looked up in the history when the session does not know it.
    pub async fn generate(&self, model_id: ModelId) -> Result<Url, DashError> {
        let (known_run, ticket) = self.ctx.with(|s| {
            s.session.require_user()?;
            let known = if s.session.model_id() == Some(model_id) {
                s.session.run_id()
            } else {
                None
            };
            Ok::<_, DashError>((known, s.session.ticket()))
        })?;

        let run_id = match known_run {
            Some(run_id) => run_id,
            None => {
                let runs = self.api.list_runs().await?;
                history::latest_run_for_model(&runs, model_id)
                    .map(|r| r.run_id)
                    .ok_or(DashError::ModelNotFound(model_id))?
            }
        };

        info!("Generating paper for run {} (model {})", run_id, model_id);
        let ack = self.api.generate_paper(run_id).await?;
        if !ack.success {
            return Err(DashError::Rejected(
                ack.error
                    .unwrap_or_else(|| "Paper generation failed".to_string()),
            ));
        }

        let url = paper_url(&self.config.base()?, run_id)?;
        self.ctx.apply_if_current(&ticket, "paper generation", |s| {
            if s.session.model_id() == Some(model_id) {
                s.session.set_run_id(run_id);
                s.results.paper = PaperAction::Open {
                    url: url.to_string(),
                };
            }
            if let Some(row) = s.history.iter_mut().find(|r| r.run.run_id == run_id) {
                row.run.paper_path = ack.paper_path.clone().or_else(|| Some(url.to_string()));
            }
            Ok(())
        })?;
        Ok(url)
    }
}
