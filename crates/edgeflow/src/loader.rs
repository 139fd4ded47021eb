//! Template and parameter file loading

use anyhow::{Context, bail};
use edgeflow_core::{ParameterFile, RawParameters, Template};
use std::path::Path;
use tracing::{debug, instrument};

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn parse<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let parsed = if is_yaml(path) {
        serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?
    } else {
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?
    };
    Ok(parsed)
}

#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_template(path: &Path) -> anyhow::Result<Template> {
    let template: Template = parse(path)?;
    debug!(
        parameters = template.parameters.len(),
        resources = template.resources.len(),
        "Template loaded"
    );
    Ok(template)
}

/// Accepts a bare `name: value` map or one wrapped in `parameters`.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_parameters(path: &Path) -> anyhow::Result<RawParameters> {
    let file: ParameterFile = parse(path)?;
    Ok(file.into_values())
}

/// Split `NAME=VALUE`; VALUE is JSON when it parses, a string otherwise.
pub fn parse_override(raw: &str) -> anyhow::Result<(String, serde_json::Value)> {
    let Some((name, value)) = raw.split_once('=') else {
        bail!("invalid override '{raw}', expected NAME=VALUE");
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("invalid override '{raw}', parameter name is empty");
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((name.to_string(), value))
}
