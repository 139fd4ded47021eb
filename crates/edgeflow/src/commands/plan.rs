use colored::Colorize;
use edgeflow_cloud::{CloudError, Engine, FileStateStore};
use edgeflow_config::EngineConfig;
use edgeflow_core::{RawParameters, Template};
use std::path::PathBuf;
use std::sync::Arc;

use crate::local::LocalProvider;

pub async fn handle(
    config: &EngineConfig,
    state_dir: Option<PathBuf>,
    template: &Template,
    params: &RawParameters,
    json: bool,
) -> anyhow::Result<()> {
    let state_dir = super::state_dir(config, state_dir);
    let store = Arc::new(FileStateStore::new(&state_dir));
    let engine = Engine::new(Arc::new(LocalProvider::new(Vec::new())), store)
        .with_options(super::executor_options(config));

    let planned = match engine.plan(template, params).await {
        Ok(planned) => planned,
        Err(CloudError::Rejected(e)) => {
            super::print_rejection(&e);
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&planned.plan)?);
        return Ok(());
    }

    println!(
        "{} {}",
        "Planning against".blue(),
        state_dir.display().to_string().cyan()
    );
    println!();
    super::print_plan(&planned.plan);
    if !planned.plan.has_changes() {
        println!("{}", "No changes. Infrastructure matches the template.".green());
    }
    Ok(())
}
