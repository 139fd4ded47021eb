pub mod apply;
pub mod graph;
pub mod plan;
pub mod validate;

use colored::Colorize;
use edgeflow_cloud::{ActionType, ExecutorOptions, Plan, RetryConfig};
use edgeflow_config::EngineConfig;
use edgeflow_core::FlowError;
use std::path::PathBuf;

/// Executor tuning from the engine config.
pub fn executor_options(config: &EngineConfig) -> ExecutorOptions {
    ExecutorOptions {
        max_parallel: config.max_parallel,
        retry: RetryConfig {
            max_attempts: config.retry.max_attempts,
            initial_delay: config.retry.initial_delay(),
            max_delay: config.retry.max_delay(),
            backoff_multiplier: config.retry.multiplier,
        },
        poll_interval: config.poll_interval(),
        max_polls: config.max_polls,
    }
}

pub fn state_dir(config: &EngineConfig, flag: Option<PathBuf>) -> PathBuf {
    flag.unwrap_or_else(|| config.state_dir.clone())
}

/// Print a pre-execution failure, listing every parameter error separately.
pub fn print_rejection(error: &FlowError) {
    eprintln!();
    eprintln!("{}", "✗ Template rejected".red().bold());
    match error {
        FlowError::Schema(errors) => {
            for e in errors.iter() {
                eprintln!("  {} {}", "•".red(), e);
            }
        }
        other => eprintln!("  {}", other),
    }
}

pub fn print_plan(plan: &Plan) {
    for (index, wave) in plan.waves.iter().enumerate() {
        println!("{}", format!("Wave {}:", index + 1).bold());
        for action in wave {
            let marker = match action.action_type {
                ActionType::Create => "+".green(),
                ActionType::Update => "~".yellow(),
                ActionType::NoOp => "=".dimmed(),
            };
            let mut line = format!("  {} {} ({})", marker, action.node.cyan(), action.kind);
            if !action.pending.is_empty() {
                let pending: Vec<_> = action.pending.iter().map(ToString::to_string).collect();
                line.push_str(&format!(" waits on {}", pending.join(", ")).dimmed().to_string());
            }
            println!("{line}");
        }
    }
    for skipped in &plan.skipped {
        println!(
            "  {} {} ({}) skipped: {}",
            "-".dimmed(),
            skipped.node,
            skipped.kind,
            skipped.reason
        );
    }
    for invalid in &plan.invalid {
        println!(
            "  {} {} ({}) cannot be evaluated: {}",
            "!".red(),
            invalid.node.red(),
            invalid.kind,
            invalid.error
        );
    }
    println!();
    println!("Plan: {}", plan.summary().to_string().bold());
}
