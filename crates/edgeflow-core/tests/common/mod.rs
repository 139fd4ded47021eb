use edgeflow_core::{RawParameters, Template};
use serde_json::json;

const EDGE_SECURITY: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../../templates/edge-security.json"
));

/// The bundled edge security template.
pub fn edge_security() -> Template {
    serde_json::from_str(EDGE_SECURITY).unwrap()
}

/// Parameters for a given tier, optionally with diagnostics configured.
pub fn params(sku: &str, diagnostics: Option<serde_json::Value>) -> RawParameters {
    let mut raw = RawParameters::new();
    raw.insert("profileName".into(), json!("contoso-edge"));
    raw.insert("skuName".into(), json!(sku));
    if let Some(diagnostics) = diagnostics {
        raw.insert("diagnostics".into(), diagnostics);
    }
    raw
}

#[allow(dead_code)]
pub const STANDARD: &str = "Standard_AzureFrontDoor";
#[allow(dead_code)]
pub const PREMIUM: &str = "Premium_AzureFrontDoor";
