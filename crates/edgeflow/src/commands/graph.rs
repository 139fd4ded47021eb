use colored::Colorize;
use edgeflow_core::{GatedGraph, RawParameters, Template, prepare};

pub fn handle(template: &Template, params: &RawParameters, dot: bool) -> anyhow::Result<()> {
    let gated = match prepare(template, params) {
        Ok(gated) => gated,
        Err(e) => {
            super::print_rejection(&e);
            std::process::exit(1);
        }
    };

    if dot {
        print!("{}", render_dot(&gated));
        return Ok(());
    }

    for (index, wave) in gated.graph().waves().iter().enumerate() {
        println!("{}", format!("Wave {}:", index + 1).bold());
        for id in wave {
            let Some(node) = gated.node(id) else { continue };
            let deps = gated.graph().dependencies(id);
            let mut line = format!("  {} ({})", id.cyan(), node.kind);
            if !deps.is_empty() {
                line.push_str(&format!(" <- {}", deps.join(", ")));
            }
            match &node.skip_reason {
                Some(reason) => println!("{} {}", line.dimmed(), format!("[skipped: {reason}]").yellow()),
                None => println!("{line}"),
            }
        }
    }
    Ok(())
}

fn render_dot(gated: &GatedGraph) -> String {
    let mut out = String::from("digraph edgeflow {\n  rankdir=LR;\n");
    for node in gated.nodes() {
        let style = if node.is_skipped() { ", style=dashed" } else { "" };
        out.push_str(&format!(
            "  \"{}\" [label=\"{}\\n{}\"{}];\n",
            node.id, node.id, node.kind, style
        ));
    }
    for node in gated.nodes() {
        for dep in gated.graph().dependencies(&node.id) {
            out.push_str(&format!("  \"{}\" -> \"{}\";\n", dep, node.id));
        }
    }
    out.push_str("}\n");
    out
}
