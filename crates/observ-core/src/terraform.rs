//! Terraform invocations for the demo stack.
//!
//! All commands run inside the configured terraform directory. Apply
//! streams its output through a `ProgressTracker` so long provisioning
//! waits show movement.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::Result;
use crate::exec::{self, CommandSpec, ExecutionResult, APPLY_TIMEOUT, DESTROY_TIMEOUT, QUERY_TIMEOUT};
use crate::progress::ProgressTracker;

/// The saved plan file produced by `plan` and consumed by `apply`.
pub const PLAN_FILE: &str = "tfplan";

#[derive(Debug, Clone)]
pub struct Workspace {
    dir: PathBuf,
}

impl Workspace {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn command(&self, args: &[&str]) -> CommandSpec {
        CommandSpec::new("terraform").args(args.iter().copied()).cwd(&self.dir)
    }

    /// `terraform init -reconfigure` against the GCS backend.
    pub async fn init(&self, bucket: &str, prefix: &str) -> ExecutionResult {
        let spec = self
            .command(&["init", "-reconfigure", "-input=false"])
            .arg(format!("-backend-config=bucket={bucket}"))
            .arg(format!("-backend-config=prefix={prefix}"))
            .timeout(QUERY_TIMEOUT * 5);
        exec::run(&spec).await
    }

    pub async fn validate(&self) -> ExecutionResult {
        let spec = self.command(&["validate", "-no-color"]);
        exec::run(&spec).await
    }

    /// `terraform plan -out=tfplan`, optionally with a var file.
    pub async fn plan(&self, var_file: Option<&Path>) -> ExecutionResult {
        let mut spec = self.command(&["plan", "-input=false", "-no-color"]).arg(format!("-out={PLAN_FILE}"));
        if let Some(vars) = var_file {
            spec = spec.arg(format!("-var-file={}", vars.display()));
        }
        let spec = spec.timeout(QUERY_TIMEOUT * 5);
        exec::run(&spec).await
    }

    /// Apply the saved plan, reporting progress via `on_progress`.
    pub async fn apply(&self, mut on_progress: impl FnMut(u8)) -> ExecutionResult {
        let spec = self
            .command(&["apply", "-input=false", "-no-color", PLAN_FILE])
            .timeout(APPLY_TIMEOUT);
        let mut tracker = ProgressTracker::terraform_apply();
        let result = exec::run_streaming(&spec, |line| {
            if let Some(percent) = tracker.observe(line) {
                on_progress(percent);
            }
        })
        .await;
        if result.success() {
            on_progress(tracker.finish());
        }
        result
    }

    /// The exact command an operator re-runs after fixing an apply failure.
    pub fn apply_retry_command(&self) -> String {
        format!("cd {} && terraform apply {PLAN_FILE}", self.dir.display())
    }

    pub async fn destroy(&self, var_file: Option<&Path>) -> ExecutionResult {
        let mut spec = self.command(&["destroy", "-auto-approve", "-input=false", "-no-color"]);
        if let Some(vars) = var_file {
            spec = spec.arg(format!("-var-file={}", vars.display()));
        }
        let spec = spec.timeout(DESTROY_TIMEOUT);
        exec::run(&spec).await
    }

    /// `terraform output -json`, flattened to string values. Parse failures
    /// degrade to an empty map so callers report missing keys uniformly.
    pub async fn outputs(&self) -> Result<BTreeMap<String, String>> {
        let spec = self.command(&["output", "-json"]);
        let result = exec::run(&spec).await;
        if !result.success() {
            warn!(stderr = %result.stderr, "terraform output failed");
            return Ok(BTreeMap::new());
        }
        Ok(parse_outputs(&result.stdout))
    }

    /// `terraform show -json` of current state. `None` when state is absent
    /// or unparseable.
    pub async fn show_state(&self) -> Option<serde_json::Value> {
        let spec = self.command(&["show", "-json"]);
        let result = exec::run(&spec).await;
        if !result.success() {
            debug!(stderr = %result.stderr, "terraform show failed");
            return None;
        }
        serde_json::from_str(&result.stdout).ok()
    }

    /// Write terraform variables as a JSON var file next to the plan.
    pub fn write_var_file(&self, vars: &serde_json::Value) -> Result<PathBuf> {
        let path = self.dir.join("observ-demo.auto.tfvars.json");
        std::fs::write(&path, serde_json::to_string_pretty(vars)?)?;
        Ok(path)
    }

    /// Remove local plan and state leftovers after a destroy.
    pub fn clean_local_state(&self) -> Vec<String> {
        let mut removed = Vec::new();
        for name in [PLAN_FILE, ".terraform.lock.hcl", "observ-demo.auto.tfvars.json"] {
            let path = self.dir.join(name);
            if path.exists() && std::fs::remove_file(&path).is_ok() {
                removed.push(name.to_string());
            }
        }
        let dot_terraform = self.dir.join(".terraform");
        if dot_terraform.exists() && std::fs::remove_dir_all(&dot_terraform).is_ok() {
            removed.push(".terraform".to_string());
        }
        removed
    }
}

/// Flatten `terraform output -json` into plain strings. Non-string scalars
/// are rendered with their JSON representation.
fn parse_outputs(raw: &str) -> BTreeMap<String, String> {
    let parsed: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "unparseable terraform output json");
            return BTreeMap::new();
        }
    };
    let mut outputs = BTreeMap::new();
    if let Some(map) = parsed.as_object() {
        for (key, entry) in map {
            let value = &entry["value"];
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => continue,
                other => other.to_string(),
            };
            outputs.insert(key.clone(), rendered);
        }
    }
    outputs
}
