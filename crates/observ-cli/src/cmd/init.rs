use std::path::Path;

use anyhow::{bail, Context};
use observ_core::config::Config;
use observ_core::terraform::Workspace;
use observ_core::{gcloud, preflight};
use tracing::warn;

pub fn run(
    config_path: &Path,
    project_id: &str,
    billing_account: &str,
    region: &str,
    skip_terraform: bool,
    force: bool,
) -> anyhow::Result<()> {
    if config_path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }

    let config = Config::starter(project_id, billing_account, region);
    config
        .validate()
        .context("starter configuration is invalid")?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        preflight::check_tools().await?;
        println!("tools: ok");

        let account = gcloud::ensure_authenticated().await?;
        println!("authenticated as: {account}");

        gcloud::ensure_project_accessible(project_id).await?;
        println!("project: {project_id} accessible");

        match gcloud::billing_account_open(billing_account).await {
            Ok(true) => println!("billing account: open"),
            Ok(false) => bail!("billing account {billing_account} is closed"),
            Err(e) => warn!("could not verify billing account: {e}"),
        }

        if skip_terraform {
            println!("terraform: skipped");
        } else {
            let workspace = Workspace::new(&config.terraform.dir);
            let bucket = config
                .terraform
                .state_bucket_name
                .clone()
                .unwrap_or_default();
            let result = workspace.init(&bucket, &config.terraform.state_prefix).await;
            if !result.success() {
                bail!("terraform init failed: {}", result.diagnostic());
            }
            let result = workspace.validate().await;
            if !result.success() {
                bail!("terraform validate failed: {}", result.diagnostic());
            }
            println!("terraform: initialized and validated");
        }
        anyhow::Ok(())
    })?;

    config.save(config_path)?;
    println!("created: {}", config_path.display());
    println!();
    println!("Next steps:");
    println!("  1. Review the configuration, especially monitoring.email_notifications");
    println!("  2. Deploy: observ-demo deploy");
    Ok(())
}
