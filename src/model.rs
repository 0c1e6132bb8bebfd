use crate::markup::Markup;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub title: Option<String>,
    /// Path to the initial form fragment, relative to the config dir.
    pub form: String,
    /// Command line the transport runs on submit; `${APP_BIN}` and other
    /// `${VARS}` are expanded from the environment.
    pub submit_cmd: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: Some("Infield".to_string()),
            form: "demos/profile.yaml".to_string(),
            submit_cmd: "${APP_BIN} form submit".to_string(),
        }
    }
}

fn config_dir() -> PathBuf {
    env::var("INFIELD_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load `infield.yaml` anchored by INFIELD_CONFIG_DIR or the working dir.
pub fn load_config() -> Result<AppConfig> {
    let path = config_dir().join("infield.yaml");
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let cfg: AppConfig =
        serde_yaml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    Ok(cfg)
}

/// Read the configured form fragment, resolving relative paths against the
/// config dir.
pub fn load_form_fragment(cfg: &AppConfig) -> Result<String> {
    let pb = PathBuf::from(&cfg.form);
    let path = if pb.is_absolute() {
        pb
    } else {
        config_dir().join(&cfg.form)
    };
    fs::read_to_string(&path).with_context(|| format!("reading form {}", path.display()))
}

/// Well-formedness checks run before a controller is built over a fragment.
/// The editing core assumes every named ref resolves; anything the server
/// could plausibly get wrong is rejected here with a pointed message.
pub(crate) fn validate_form_doc(doc: &Markup) -> Result<(), String> {
    use std::collections::HashSet;
    let root = doc.root();
    if doc.role(root) != Some("form") {
        return Err("root node must have role 'form'".to_string());
    }
    for role in [
        "backdrop",
        "actions",
        "save",
        "cancel",
        "submit-error",
        "submit-error-message",
    ] {
        if doc.find_role(root, role).is_none() {
            return Err(format!("form is missing required '{role}' node"));
        }
    }
    let containers = doc.find_all(root, "field");
    if containers.is_empty() {
        return Err("form has no 'field' nodes".to_string());
    }
    let mut ids = HashSet::new();
    for (i, &container) in containers.iter().enumerate() {
        let label = doc.attr(container, "label").unwrap_or("");
        let Some(input) = doc.find_role(container, "input") else {
            return Err(format!("fields[{i}] ('{label}'): missing 'input' node"));
        };
        let id = doc.attr(input, "id").unwrap_or("");
        if id.is_empty() {
            return Err(format!(
                "fields[{i}] ('{label}'): input requires a non-empty 'id'"
            ));
        }
        if !ids.insert(id.to_string()) {
            return Err(format!("duplicate input id: '{id}' at fields[{i}]"));
        }
    }
    Ok(())
}
