use colored::Colorize;
use edgeflow_cloud::{CloudError, Engine, FileStateStore, RunReport, RunStatus};
use edgeflow_config::EngineConfig;
use edgeflow_core::{NodeState, RawParameters, Template};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

use crate::local::LocalProvider;

pub struct ApplyOptions {
    pub state_dir: Option<PathBuf>,
    pub yes: bool,
    pub json: bool,
    pub failures: Vec<String>,
}

pub async fn handle(
    config: &EngineConfig,
    template: &Template,
    params: &RawParameters,
    options: ApplyOptions,
) -> anyhow::Result<()> {
    let state_dir = super::state_dir(config, options.state_dir);
    let store = Arc::new(FileStateStore::new(&state_dir));
    let engine = Engine::new(Arc::new(LocalProvider::new(options.failures)), store.clone())
        .with_options(super::executor_options(config));

    // Held from planning through execution.
    let lock = store.acquire_lock().await?;

    let planned = match engine.plan(template, params).await {
        Ok(planned) => planned,
        Err(CloudError::Rejected(e)) => {
            lock.release().await?;
            super::print_rejection(&e);
            std::process::exit(1);
        }
        Err(e) => {
            lock.release().await?;
            return Err(e.into());
        }
    };

    if !options.json {
        super::print_plan(&planned.plan);
    }

    if !options.yes {
        lock.release().await?;
        println!();
        println!("Run again with {} to apply this plan", "--yes".bold());
        return Ok(());
    }

    let token = engine.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight operations");
            token.cancel();
        }
    });

    let report = engine.apply(&planned).await;
    lock.release().await?;
    let report = report?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!();
        print_report(&report);
    }

    if !report.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    for node in &report.nodes {
        let (marker, detail) = match node.state {
            NodeState::Provisioned => (
                "✓".green(),
                node.action.map(|a| a.to_string()).unwrap_or_default(),
            ),
            NodeState::Skipped => (
                "-".dimmed(),
                node.skip_reason.clone().unwrap_or_default(),
            ),
            NodeState::Failed => ("✗".red(), node.error.clone().unwrap_or_default()),
            _ => ("○".yellow(), "not attempted".to_string()),
        };
        let attempts = if node.attempts > 1 {
            format!(" after {} attempts", node.attempts)
        } else {
            String::new()
        };
        println!("  {} {} {}{}", marker, node.node.cyan(), detail, attempts);
    }

    println!();
    match &report.status {
        RunStatus::FullyConverged => println!("{}", "✓ Fully converged".green().bold()),
        status => println!("{}", format!("✗ {status}").red().bold()),
    }
    if report.cancelled {
        println!("{}", "Run was cancelled".yellow());
    }

    if !report.outputs.is_empty() {
        println!();
        println!("Outputs:");
        for (name, value) in &report.outputs {
            println!("  {} = {}", name.cyan(), value);
        }
    }
    println!("{}", format!("Finished in {} ms", report.duration_ms).dimmed());
}
