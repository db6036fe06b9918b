//! Controller for the SYRIAS DASH time-series dashboard.
//!
//! The server owns the data, the transforms and the model fits; this crate
//! keeps the client-side session consistent while the user walks a file
//! through smoothing, log, differencing, train/test split and SARIMAX fit,
//! and while past runs are reloaded from the history.

pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod dashboard;
pub mod error;
pub mod history;
pub mod invalidation;
pub mod paper;
pub mod pipeline;
pub mod recommendation;
pub mod session;
pub mod summary;
pub mod transform;
pub mod views;

#[cfg(test)]
mod testing;

pub use api::types::{FileId, ModelId, RunId, SarimaxParams};
pub use api::DashboardApi;
pub use config::DashConfig;
pub use context::{AppState, Context};
pub use dashboard::Dashboard;
pub use error::DashError;
pub use history::{HistoryManager, ReloadReport, RunRow};
pub use pipeline::{Pipeline, PipelineState};
pub use transform::{SplitSizes, TransformConfig};

/// Install the global `tracing` subscriber. `RUST_LOG` wins over
/// `default_filter` when set.
pub fn init_tracing(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();
}
