//! gcloud invocations: auth checks, project access, cluster credentials.

use tracing::info;

use crate::error::{ObservError, Result};
use crate::exec::{self, CommandSpec};

/// The account gcloud is currently authenticated as, if any.
pub async fn active_account() -> Result<Option<String>> {
    let spec = CommandSpec::new("gcloud").args([
        "auth",
        "list",
        "--filter=status:ACTIVE",
        "--format=value(account)",
    ]);
    let result = exec::run(&spec).await;
    if !result.success() {
        return Err(ObservError::CommandFailed {
            command: spec.display(),
            stderr: result.diagnostic().to_string(),
        });
    }
    let account = result.stdout.lines().next().unwrap_or("").trim().to_string();
    Ok(if account.is_empty() { None } else { Some(account) })
}

/// Require both user credentials and application-default credentials, which
/// terraform's Google provider reads.
pub async fn ensure_authenticated() -> Result<String> {
    let account = active_account().await?.ok_or(ObservError::NotAuthenticated)?;

    let adc = CommandSpec::new("gcloud").args(["auth", "application-default", "print-access-token"]);
    let result = exec::run(&adc).await;
    if !result.success() {
        return Err(ObservError::NotAuthenticated);
    }
    info!(%account, "authenticated with gcloud");
    Ok(account)
}

/// Confirm the configured project exists and the caller can see it.
pub async fn ensure_project_accessible(project_id: &str) -> Result<()> {
    let spec = CommandSpec::new("gcloud").args([
        "projects",
        "describe",
        project_id,
        "--format=value(projectId)",
    ]);
    let result = exec::run(&spec).await;
    if !result.success() {
        return Err(ObservError::ProjectNotAccessible(project_id.to_string()));
    }
    Ok(())
}

/// Whether the given billing account is open and visible to the caller.
pub async fn billing_account_open(billing_account: &str) -> Result<bool> {
    let spec = CommandSpec::new("gcloud").args([
        "billing",
        "accounts",
        "describe",
        billing_account,
        "--format=value(open)",
    ]);
    let result = exec::run(&spec).await;
    if !result.success() {
        return Err(ObservError::CommandFailed {
            command: spec.display(),
            stderr: result.diagnostic().to_string(),
        });
    }
    Ok(result.stdout.trim().eq_ignore_ascii_case("true"))
}

pub async fn set_default_project(project_id: &str) -> Result<()> {
    let spec = CommandSpec::new("gcloud").args(["config", "set", "project", project_id]);
    let result = exec::run(&spec).await;
    if !result.success() {
        return Err(ObservError::CommandFailed {
            command: spec.display(),
            stderr: result.diagnostic().to_string(),
        });
    }
    Ok(())
}

/// Fetch kubeconfig credentials for the cluster. Writes the entry kubectl
/// uses for every subsequent call.
pub fn get_credentials_command(cluster: &str, region: &str, project_id: &str) -> CommandSpec {
    CommandSpec::new("gcloud").args([
        "container",
        "clusters",
        "get-credentials",
        cluster,
        "--region",
        region,
        "--project",
        project_id,
    ])
}
