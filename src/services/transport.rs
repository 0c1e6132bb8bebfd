use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::mpsc::Sender;
use std::thread;

/// Current content of a form, keyed by input name. Written to the backend's
/// stdin as JSON.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FormContent {
    pub fields: BTreeMap<String, String>,
}

/// Per-submit context captured before the request starts and echoed back
/// with the outcome, so the recovery paths can refocus and carry the
/// snapshot forward after the originating controller is gone.
#[derive(Clone, Debug, PartialEq)]
pub struct SubmitContext {
    pub active_input_id: Option<String>,
    pub original_markup: String,
}

/// The three ways a submit attempt can resolve. Transport-level errors never
/// escape this module; they all collapse into `Failed`.
#[derive(Clone, Debug, PartialEq)]
pub enum SubmitOutcome {
    /// The backend accepted the submission and rendered a replacement form.
    Accepted { form: String },
    /// The backend processed the request but rejected it, answering with a
    /// re-rendered form carrying field-level validation messages.
    Rejected { form: String },
    /// The backend could not be reached or answered garbage.
    Failed { reason: String },
}

pub struct SubmitMsg {
    pub ctx: SubmitContext,
    pub outcome: SubmitOutcome,
}

fn expand_cmdline_env(cmdline: &str) -> String {
    // Expand ${VAR} from environment; special-case ${APP_BIN}
    // -> INFIELD_APP_BIN (quoted if contains whitespace) or "example-app"
    let re = Regex::new(r"\$\{([A-Z0-9_]+)\}").unwrap();
    let env_map: HashMap<String, String> = env::vars().collect();
    re.replace_all(cmdline, |caps: &regex::Captures| {
        let key = &caps[1];
        if key == "APP_BIN" {
            if let Some(v) = env_map.get("INFIELD_APP_BIN") {
                let needs_quote = v.chars().any(|c| c.is_whitespace());
                if needs_quote {
                    let escaped = v.replace('"', "\\\"");
                    return format!("\"{escaped}\"");
                }
                return v.to_string();
            }
            return "example-app".to_string();
        }
        env_map.get(key).cloned().unwrap_or_default()
    })
    .to_string()
}

fn run_transport(cmdline: &str, content: &FormContent) -> Result<JsonValue> {
    let expanded = expand_cmdline_env(cmdline);
    let parts = shlex::split(&expanded).ok_or_else(|| anyhow!("Failed to parse command line"))?;
    if parts.is_empty() {
        return Err(anyhow!("Empty command line"));
    }
    let payload = serde_json::to_string(content).context("encoding form content")?;
    let mut child = Command::new(&parts[0])
        .args(&parts[1..])
        .env("INFIELD_JSON", "1")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("spawning {expanded}"))?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(payload.as_bytes())
            .context("writing form content")?;
    }
    let output = child.wait_with_output().context("waiting for transport")?;
    let text = String::from_utf8_lossy(&output.stdout).to_string();
    // A rejection envelope arrives on stdout even when the exit code is
    // nonzero, so parse first and only then fall back to the exit status.
    match serde_json::from_str::<JsonValue>(text.trim()) {
        Ok(v) => Ok(v),
        Err(e) => {
            if output.status.success() {
                Err(e).context("parsing transport JSON")
            } else {
                let err = String::from_utf8_lossy(&output.stderr).to_string();
                Err(anyhow!("Command failed: {}\n{}", cmdline, err))
            }
        }
    }
}

/// Fragments may arrive inline as node objects or as pre-serialized
/// strings; normalize to the YAML wire form either way.
fn normalize_fragment(v: &JsonValue) -> Result<String> {
    if let Some(s) = v.as_str() {
        return Ok(s.to_string());
    }
    serde_yaml::to_string(v).context("normalizing form fragment")
}

pub fn parse_envelope(v: &JsonValue) -> SubmitOutcome {
    let ok = v.get("ok").and_then(|b| b.as_bool()).unwrap_or(false);
    let form = match v.get("form").map(normalize_fragment).transpose() {
        Ok(f) => f,
        Err(e) => {
            return SubmitOutcome::Failed {
                reason: format!("{e:#}"),
            }
        }
    };
    match (ok, form) {
        (true, Some(form)) => SubmitOutcome::Accepted { form },
        (false, Some(form)) => SubmitOutcome::Rejected { form },
        (false, None) => SubmitOutcome::Failed {
            reason: v
                .get("error")
                .and_then(|s| s.as_str())
                .unwrap_or("submit failed")
                .to_string(),
        },
        (true, None) => SubmitOutcome::Failed {
            reason: "transport envelope missing form".to_string(),
        },
    }
}

pub fn submit_form(cmdline: &str, content: &FormContent) -> SubmitOutcome {
    match run_transport(cmdline, content) {
        Ok(v) => parse_envelope(&v),
        Err(e) => SubmitOutcome::Failed {
            reason: format!("{e:#}"),
        },
    }
}

/// Run the submission on a worker thread and report the outcome through the
/// channel once it resolves.
pub fn spawn_submit(
    cmdline: String,
    content: FormContent,
    ctx: SubmitContext,
    tx: Sender<SubmitMsg>,
) {
    thread::spawn(move || {
        let outcome = submit_form(&cmdline, &content);
        let _ = tx.send(SubmitMsg { ctx, outcome });
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepted_envelope_with_inline_fragment() {
        let v = json!({"ok": true, "form": {"role": "form", "children": []}});
        match parse_envelope(&v) {
            SubmitOutcome::Accepted { form } => assert!(form.contains("role: form")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn rejection_envelope_keeps_the_rendered_form() {
        let v = json!({"ok": false, "form": "role: form\n"});
        assert_eq!(
            parse_envelope(&v),
            SubmitOutcome::Rejected {
                form: "role: form\n".into()
            }
        );
    }

    #[test]
    fn failure_envelope_surfaces_the_reason() {
        let v = json!({"ok": false, "error": "email already taken"});
        assert_eq!(
            parse_envelope(&v),
            SubmitOutcome::Failed {
                reason: "email already taken".into()
            }
        );
        let v = json!({"ok": false});
        assert_eq!(
            parse_envelope(&v),
            SubmitOutcome::Failed {
                reason: "submit failed".into()
            }
        );
    }

    #[test]
    fn success_without_form_is_malformed() {
        let v = json!({"ok": true});
        assert!(matches!(parse_envelope(&v), SubmitOutcome::Failed { .. }));
    }

    #[test]
    fn expand_passes_plain_text_through() {
        assert_eq!(expand_cmdline_env("backend submit"), "backend submit");
    }

    #[test]
    fn expand_drops_unset_vars() {
        assert_eq!(
            expand_cmdline_env("${INFIELD_SURELY_UNSET_VAR} submit"),
            " submit"
        );
    }
}
