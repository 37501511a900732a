//! factorlab: turn a research paper into a backtested factor from the terminal.
//!
//! Usage:
//!   factorlab run paper.pdf --dataset stock_daily --start 2020-01-01
//!   factorlab datasets
//!   factorlab models --test gpt-4o

mod console;
mod logging;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use log::info;

use factorlab::config::{resolve_config, validate_config};
use factorlab::{ClientConfig, WorkflowController, WorkflowError};

use console::ConsoleReporter;

#[derive(Parser, Debug)]
#[command(name = "factorlab", version)]
#[command(about = "Extract, generate and backtest factors from research papers")]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend base URL, overriding the config file
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Model forwarded to upload, extraction and code generation
    #[arg(long, global = true)]
    model: Option<String>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run upload, extraction, code generation and backtest on a paper
    Run(RunArgs),

    /// List the datasets available for backtesting
    Datasets,

    /// List the models the backend offers
    Models {
        /// Send a probe prompt to this model instead of listing
        #[arg(long)]
        test: Option<String>,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Paper to process
    pdf: PathBuf,

    /// Backtest dataset id
    #[arg(long)]
    dataset: Option<String>,

    /// First backtest date (YYYY-MM-DD)
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Last backtest date (YYYY-MM-DD)
    #[arg(long)]
    end: Option<NaiveDate>,

    /// Replace the generated code with this file before backtesting
    #[arg(long)]
    edit_code: Option<PathBuf>,

    /// Stop after code generation
    #[arg(long)]
    skip_backtest: bool,

    /// Save the markdown, code and backtest results to this directory
    #[arg(long)]
    output: Option<PathBuf>,

    /// Width of the rendered chart and table
    #[arg(long, default_value_t = 100)]
    width: u16,
}

fn load_client_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = resolve_config(cli.config.as_deref()).context("Failed to load config")?;
    if let Some(base_url) = &cli.base_url {
        config.base_url = base_url.clone();
    }
    if let Some(model) = &cli.model {
        config.model_id = Some(model.clone());
    }
    validate_config(&config)?;
    Ok(config)
}

async fn run(config: &ClientConfig, args: RunArgs) -> Result<()> {
    let controller = WorkflowController::from_config(config, ConsoleReporter::new(args.width))?;

    controller.load_datasets().await;
    if let Some(dataset) = args.dataset {
        controller.select_dataset(dataset);
    }
    controller.set_date_range(args.start, args.end);

    controller.upload_document(Some(&args.pdf)).await?;
    controller.extract_content().await?;
    controller.generate_factor_code().await?;

    if let Some(path) = &args.edit_code {
        let edited = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        controller.open_editor()?;
        controller.save_edit(edited)?;
    }

    if !args.skip_backtest {
        controller.run_backtest().await?;
    }

    if let Some(dir) = args.output.or_else(|| config.output_directory.clone()) {
        let written = controller.save_artifacts(&dir).await?;
        for path in written {
            println!("saved {}", path.display());
        }
    }
    Ok(())
}

async fn datasets(config: &ClientConfig) -> Result<()> {
    let controller = WorkflowController::from_config(config, factorlab::workflow::NoopReporter)?;
    let choices = controller.load_datasets().await;

    let mut any = false;
    for dataset in choices.datasets() {
        any = true;
        println!("{:<20} {:<28} {}", dataset.id, dataset.name, dataset.description);
    }
    if !any {
        println!("(no datasets available)");
    }
    Ok(())
}

async fn models(config: &ClientConfig, test: Option<String>) -> Result<()> {
    let controller = WorkflowController::from_config(config, ConsoleReporter::new(100))?;

    if let Some(model_id) = test {
        let probe = controller.test_model(&model_id).await?;
        println!("{}: {}", probe.model_id, probe.reply);
        return Ok(());
    }

    for model in controller.list_models().await? {
        let current = config.model_id.as_deref() == Some(model.id.as_str());
        println!(
            "{} {:<12} {:<32} {}",
            if current { "*" } else { " " },
            model.provider,
            model.id,
            model.name
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level, cli.json_logs)?;

    let config = load_client_config(&cli)?;
    info!("Using backend at {}", config.trimmed_base_url());

    let result = match cli.command {
        Command::Run(args) => run(&config, args).await,
        Command::Datasets => datasets(&config).await,
        Command::Models { test } => models(&config, test).await,
    };

    // Workflow failures were already shown as alerts.
    if let Err(e) = &result {
        if e.downcast_ref::<WorkflowError>().is_some() {
            std::process::exit(1);
        }
    }
    result
}
