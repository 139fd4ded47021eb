use colored::Colorize;
use edgeflow_core::{RawParameters, Template, prepare};

pub fn handle(template: &Template, params: &RawParameters) -> anyhow::Result<()> {
    println!("{}", "Validating template...".blue());

    match prepare(template, params) {
        Ok(gated) => {
            println!("{}", "✓ Template is valid".green().bold());
            println!();
            println!("Summary:");
            println!("  Parameters: {}", gated.params().len());
            for (name, value) in gated.params().iter() {
                let shown = value
                    .to_json()
                    .map(|json| json.to_string())
                    .unwrap_or_else(|_| "(pending)".to_string());
                println!("    - {} = {}", name.cyan(), shown);
            }
            println!("  Variables: {}", gated.variables().len());
            println!(
                "  Resources: {} ({} planned, {} skipped)",
                gated.graph().len(),
                gated.planned().count(),
                gated.nodes().filter(|n| n.is_skipped()).count()
            );

            let failed: Vec<_> = gated.failed().collect();
            if failed.is_empty() {
                return Ok(());
            }
            eprintln!();
            eprintln!("{}", "✗ Some resources cannot be evaluated".red().bold());
            for node in failed {
                let reason = node.error.as_ref().map(ToString::to_string).unwrap_or_default();
                eprintln!("  {} {}: {}", "•".red(), node.id, reason);
            }
            std::process::exit(1);
        }
        Err(e) => {
            super::print_rejection(&e);
            std::process::exit(1);
        }
    }
}
