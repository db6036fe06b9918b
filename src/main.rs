use std::path::PathBuf;

use anyhow::{anyhow, bail, Context as _, Result};
use clap::{Parser, Subcommand};
use syrias_dash::config::{load_config, load_default_location};
use syrias_dash::recommendation::SeriesType;
use syrias_dash::summary::export_summary;
use syrias_dash::{init_tracing, DashConfig, Dashboard, RunId, SarimaxParams};

#[derive(Parser)]
#[command(name = "syrias-dash")]
#[command(about = "Drive the SYRIAS DASH modelling server from a terminal")]
struct Cli {
    /// Config file (defaults to the user config dir, then built-in values)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Account email, or SYRIAS_DASH_EMAIL
    #[arg(long, global = true)]
    email: Option<String>,

    /// Account password, or SYRIAS_DASH_PASSWORD
    #[arg(long, global = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the credentials and show the active file
    Login,
    /// List every model run, oldest first
    Runs,
    /// Upload a CSV file
    Upload { path: PathBuf },
    /// Transform the active file, split it and fit a model
    Fit {
        /// Upload this CSV first instead of using the newest file
        #[arg(long)]
        csv: Option<PathBuf>,
        #[arg(long, default_value = "1")]
        window: u32,
        #[arg(long)]
        log: bool,
        #[arg(long, default_value = "0")]
        diff: u32,
        /// Training observations (default: configured ratio of the total)
        #[arg(long)]
        train: Option<usize>,
        /// Non-seasonal order as p,d,q
        #[arg(long, default_value = "1,1,1")]
        order: String,
        /// Seasonal order as P,D,Q,m
        #[arg(long)]
        seasonal: Option<String>,
        /// Take the order recommended by the ACF/PACF analysis of this series
        #[arg(long)]
        recommend: Option<SeriesType>,
    },
    /// Reload a past run and report what was restored
    Reload { run_id: RunId },
    /// Delete a run
    Delete { run_id: RunId },
    /// Generate (or locate) the paper of a run
    Paper { run_id: RunId },
    /// Export the model summary of a run as a text file
    Summary {
        run_id: RunId,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
}

fn parse_order<const N: usize>(text: &str) -> Result<[u32; N]> {
    let parts: Vec<u32> = text
        .split(',')
        .map(|p| p.trim().parse::<u32>())
        .collect::<Result<_, _>>()
        .with_context(|| format!("Invalid order '{}'", text))?;
    parts
        .try_into()
        .map_err(|_| anyhow!("Expected {} comma-separated values in '{}'", N, text))
}

fn credential(flag: Option<String>, var: &str) -> Result<String> {
    flag.or_else(|| std::env::var(var).ok())
        .ok_or_else(|| anyhow!("Missing credential: pass it as a flag or set {}", var))
}

fn load(cli: &Cli) -> Result<DashConfig> {
    match &cli.config {
        Some(path) => Ok(load_config(path)?.apply_env()),
        None => load_default_location(),
    }
}

async fn open(cli: &Cli, config: DashConfig) -> Result<Dashboard> {
    let dash = Dashboard::new(config)?;
    let email = credential(cli.email.clone(), "SYRIAS_DASH_EMAIL")?;
    let password = credential(cli.password.clone(), "SYRIAS_DASH_PASSWORD")?;
    let user = dash.login(&email, &password).await?;
    println!("Logged in as {} <{}>", user.display_name(), user.email);
    Ok(dash)
}

/// Reload `run_id` from the history the dashboard just fetched.
async fn reload(dash: &Dashboard, run_id: RunId) -> Result<syrias_dash::ReloadReport> {
    let row = dash
        .context()
        .with(|s| s.history.iter().find(|r| r.run.run_id == run_id).cloned())
        .ok_or_else(|| anyhow!("Run {} not found", run_id))?;
    let file_id = row
        .run
        .file_id
        .ok_or_else(|| anyhow!("Run {} has no file", run_id))?;
    let report = dash.history().reload_run(run_id, row.run.model_id, file_id).await?;
    Ok(report)
}

async fn run(cli: Cli, config: DashConfig) -> Result<()> {
    let dash = open(&cli, config).await?;

    match cli.command {
        Commands::Login => match dash.context().session().file_id() {
            Some(file_id) => println!(
                "Active file {} ({} observations)",
                file_id,
                dash.context().session().total_observations().unwrap_or(0)
            ),
            None => println!("No files uploaded yet"),
        },
        Commands::Runs => {
            let rows = dash.history().list_runs().await?;
            if rows.is_empty() {
                println!("No model runs yet");
            }
            for row in rows {
                println!(
                    "#{:<3} run {:<5} {:<32} {:<22} {:<16} R2 {:>8} MAPE {:>8} {}",
                    row.index,
                    row.run.run_id,
                    row.model_label(),
                    row.transform().label(),
                    row.created(),
                    row.run.test_r2.map(|v| format!("{:.4}", v)).unwrap_or_else(|| "-".into()),
                    row.run.test_mape.map(|v| format!("{:.2}%", v)).unwrap_or_else(|| "-".into()),
                    if row.has_paper() { "paper" } else { "" }
                );
            }
        }
        Commands::Upload { path } => {
            let uploaded = dash.upload(&path).await?;
            println!(
                "Uploaded {} as file {} ({} observations)",
                uploaded.file_name, uploaded.file_id, uploaded.n_observations
            );
        }
        Commands::Fit {
            csv,
            window,
            log,
            diff,
            train,
            order,
            seasonal,
            recommend,
        } => {
            if let Some(path) = csv {
                dash.upload(&path).await?;
            }
            let pipeline = dash.pipeline();
            if dash.context().session().file_id().is_none() {
                bail!("No active file: upload a CSV first");
            }
            if window > 1 {
                let n = pipeline.apply_smoothing(window).await?;
                println!("Smoothing window {}: {} observations", window, n);
            }
            if log {
                pipeline.apply_log_transform(true).await?;
                println!("Log transform applied");
            }
            if diff > 0 {
                pipeline.apply_differencing(diff).await?;
                println!("Differencing order {} applied", diff);
            }
            let train = match train {
                Some(train) => train,
                None => dash
                    .context()
                    .with(|s| s.transform.train_observations)
                    .ok_or_else(|| anyhow!("Not enough observations to split"))?,
            };
            let split = pipeline.apply_split(train).await?;
            println!("{}", split.describe());

            let params = match recommend {
                Some(series) => {
                    let outcome = pipeline.analyze_acf_pacf(series).await?;
                    if let Some(text) = &outcome.description {
                        println!("{}", text);
                    }
                    pipeline.apply_recommendation(series)?
                }
                None => {
                    let [p, d, q] = parse_order::<3>(&order)?;
                    let mut params = SarimaxParams { p, d, q, ..SarimaxParams::default() };
                    if let Some(seasonal) = seasonal {
                        let [sp, sd, sq, m] = parse_order::<4>(&seasonal)?;
                        params.seasonal_p = sp;
                        params.seasonal_d = sd;
                        params.seasonal_q = sq;
                        params.m = m;
                    }
                    params
                }
            };
            let outcome = pipeline.run_fit(params).await?;
            println!(
                "Fitted {} (model {}, run {})",
                outcome.label, outcome.model_id, outcome.run_id
            );
        }
        Commands::Reload { run_id } => {
            let report = reload(&dash, run_id).await?;
            println!(
                "Reloaded run {} (model {}): {}",
                report.run_id,
                report.model_id,
                report.restored.label()
            );
            for skipped in &report.skipped {
                println!("  skipped {:?}: {}", skipped.step, skipped.reason);
            }
        }
        Commands::Delete { run_id } => {
            let pending = dash.history().request_delete(run_id)?;
            let rows = dash.history().confirm_delete().await?;
            println!("Deleted {} ({} runs left)", pending.label, rows.len());
        }
        Commands::Paper { run_id } => {
            let report = reload(&dash, run_id).await?;
            let url = dash.pipeline().paper().generate(report.model_id).await?;
            println!("Paper: {}", url);
        }
        Commands::Summary { run_id, out } => {
            reload(&dash, run_id).await?;
            let (text, order, file) = dash.context().with(|s| {
                let file = s
                    .history
                    .iter()
                    .find(|r| r.run.run_id == run_id)
                    .and_then(|r| r.run.file_name.clone())
                    .unwrap_or_default();
                (
                    s.results.summary.clone().unwrap_or_default(),
                    s.results.order_label.clone().unwrap_or_default(),
                    file,
                )
            });
            let export = export_summary(&text, &order, &file, chrono::Local::now().naive_local())?;
            let path = export.write_to(&out)?;
            println!("Summary written to {}", path.display());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = match load(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    };
    init_tracing(&config.log_filter);

    if let Err(e) = run(cli, config).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
